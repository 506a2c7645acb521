//! Ambient Occlusion

use super::BranchedPathIntegrator;
use kernel::common::*;
use kernel::geometry::*;
use kernel::path_state::{PathRayFlags, PathState};
use kernel::radiance::PathRadiance;
use kernel::rng::SampleDimension;
use kernel::sampling::sample_cos_hemisphere;
use kernel::shading::ShaderData;
use kernel::spectrum::*;

impl<'a> BranchedPathIntegrator<'a> {
    /// Casts `num_samples` cosine distributed occlusion rays from a surface
    /// and accumulates the unoccluded ones.
    ///
    /// * `sd`          - Shading data of the surface.
    /// * `l`           - Receives the occlusion.
    /// * `state`       - Path state.
    /// * `throughput`  - Path throughput.
    /// * `num_samples` - Number of occlusion rays.
    pub(crate) fn ambient_occlusion(
        &mut self,
        sd: &ShaderData,
        l: &mut PathRadiance,
        state: &mut PathState,
        throughput: Spectrum,
        num_samples: u32,
    ) {
        if num_samples == 0 {
            return;
        }

        let ctx = self.ctx;
        let num_samples_inv = 1.0 / num_samples as Float;
        let (ao_bsdf, ao_n) = ctx.shading.bsdf_ao(sd, ctx.settings.ao_factor);
        let ao_alpha = ctx.shading.bsdf_alpha(sd);
        let shadow_linking = ctx.shading.object_shadow_linking(sd.object);

        for j in 0..num_samples {
            let (u, v) = state.branched_rng_2d(
                ctx.sequence,
                state.rng_hash,
                j,
                num_samples,
                SampleDimension::BsdfU,
            );
            let (ao_d, ao_pdf) = sample_cos_hemisphere(&ao_n, u, v);
            if sd.ng.dot(&ao_d) <= 0.0 || ao_pdf == 0.0 {
                continue;
            }

            let light_ray = Ray::new(
                offset_ray_origin(&sd.p, &sd.ng),
                ao_d,
                ctx.settings.ao_distance,
                sd.time,
            );

            state.flag |= PathRayFlags::AO;
            let ao_environment = ctx.shading.ao_environment(sd, &light_ray, state);
            let shadow = self
                .shadow
                .shadow_blocked(&ctx, sd.shader, state, &light_ray, shadow_linking);

            if !shadow.blocked {
                l.accum_ao(
                    state,
                    throughput * num_samples_inv,
                    ao_alpha,
                    ao_bsdf * ao_environment,
                    shadow.transmittance,
                );
            } else {
                l.accum_total_ao(state, throughput * num_samples_inv, ao_bsdf);
            }
            state.flag.remove(PathRayFlags::AO);
        }
    }
}
