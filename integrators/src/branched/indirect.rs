//! Indirect Branching

use super::{closure_samples, BranchedPathIntegrator};
use kernel::common::*;
use kernel::geometry::*;
use kernel::path_state::PathState;
use kernel::radiance::PathRadiance;
use kernel::rng::{cmj_hash, SampleDimension};
use kernel::shading::*;
use kernel::spectrum::*;

impl<'a> BranchedPathIntegrator<'a> {
    /// Spawns sub-paths from every scattering closure of a surface. Each
    /// closure gets its configured number of branches, scaled by
    /// `num_samples_adjust`, and each branch continues as a single path.
    ///
    /// * `sd`                 - Shading data of the surface.
    /// * `state`              - Path state at the surface.
    /// * `throughput`         - Path throughput.
    /// * `num_samples_adjust` - Scale for sample counts and weights.
    /// * `l`                  - Receives the light.
    /// * `light_linking`      - Light linking mask inherited by the sub-paths.
    pub(crate) fn surface_indirect_light(
        &mut self,
        sd: &ShaderData,
        state: &PathState,
        throughput: Spectrum,
        num_samples_adjust: Float,
        l: &mut PathRadiance,
        light_linking: u32,
    ) {
        let ctx = self.ctx;

        let sum_sample_weight = if state.denoising_feature_weight > 0.0 {
            sd.closures
                .iter()
                .filter(|sc| sc.kind.is_bsdf() && !sc.kind.is_bsdf_transparent())
                .map(|sc| sc.sample_weight)
                .sum()
        } else {
            1.0
        };

        for (i, sc) in sd.closures.iter().enumerate() {
            if !sc.kind.is_bsdf() || sc.kind.is_bsdf_transparent() {
                continue;
            }

            let num_samples =
                ceil_to_u32(num_samples_adjust * closure_samples(&ctx, sd, sc) as Float);
            if num_samples == 0 {
                continue;
            }
            let num_samples_inv = num_samples_adjust / num_samples as Float;

            for j in 0..num_samples {
                let mut ps = state.clone();
                ps.rng_hash = cmj_hash(state.rng_hash, i as u32);

                let mut tp = throughput;
                let bsdf_ray = match self.branched_surface_bounce(
                    sd,
                    i,
                    j,
                    num_samples,
                    &mut tp,
                    &mut ps,
                    l,
                    sum_sample_weight,
                ) {
                    Some(ray) => ray,
                    None => continue,
                };

                // Sub-paths keep the closure scramble and their own sample
                // index so branches stay decorrelated past the bounce.
                ps.branch(j, num_samples);

                self.path_indirect(&bsdf_ray, tp * num_samples_inv, &mut ps, l, light_linking);

                // Attribute the sub-path before the next branch starts.
                l.sum_indirect();
                l.reset_indirect();
            }
        }
    }

    /// Samples branch `sample` of closure `closure` and updates the state
    /// for the bounce. Returns the continuation ray, or `None` if the
    /// sample is invalid.
    #[allow(clippy::too_many_arguments)]
    fn branched_surface_bounce(
        &self,
        sd: &ShaderData,
        closure: usize,
        sample: u32,
        num_samples: u32,
        throughput: &mut Spectrum,
        state: &mut PathState,
        l: &mut PathRadiance,
        sum_sample_weight: Float,
    ) -> Option<Ray> {
        let ctx = self.ctx;

        let (u, v) = state.branched_rng_2d(
            ctx.sequence,
            state.rng_hash,
            sample,
            num_samples,
            SampleDimension::BsdfU,
        );
        let s = ctx.shading.sample_closure(sd, closure, u, v)?;
        if !s.is_valid() {
            return None;
        }

        l.bsdf_bounce(state, throughput, &s.eval, s.pdf);

        if sum_sample_weight > 0.0 {
            state.denoising_feature_weight *=
                sd.closures[closure].sample_weight / (sum_sample_weight * num_samples as Float);
        }

        state.ray_pdf = s.pdf;
        state.min_ray_pdf = min(s.pdf, state.min_ray_pdf);
        state.next(ctx.settings, s.label);

        let ng = if s.label.contains(ScatterLabel::TRANSMIT) {
            if ctx.settings.features.volumes {
                state.volume_stack.enter_exit(sd);
            }
            -sd.ng
        } else {
            sd.ng
        };
        Some(Ray::new(
            offset_ray_origin(&sd.p, &ng),
            s.omega_in.normalize(),
            INFINITY,
            sd.time,
        ))
    }
}
