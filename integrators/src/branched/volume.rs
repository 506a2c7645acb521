//! Volume Branching

use super::BranchedPathIntegrator;
use kernel::common::*;
use kernel::geometry::*;
use kernel::path_state::PathState;
use kernel::radiance::PathRadiance;
use kernel::rng::SampleDimension;
use kernel::shading::*;
use kernel::spectrum::*;
use kernel::volume::{SegmentFlags, VolumeIntegrateResult};

impl<'a> BranchedPathIntegrator<'a> {
    /// Integrates the media crossed by a camera path segment. Scattering is
    /// branched `volume_samples` times and `throughput` leaves attenuated
    /// by the segment.
    ///
    /// On CPU-style devices the segment is recorded once and shared by
    /// the light connection and every scatter branch. Otherwise each
    /// branch integrates the segment on its own and may pass through.
    ///
    /// * `volume_ray`     - The segment.
    /// * `throughput`     - Path throughput, attenuated in place.
    /// * `state`          - Path state.
    /// * `l`              - Receives the light.
    /// * `light_linking`  - Light linking mask for the branches.
    /// * `shadow_linking` - Shadow linking mask for light connections.
    pub(crate) fn volume_step(
        &mut self,
        volume_ray: &Ray,
        throughput: &mut Spectrum,
        state: &mut PathState,
        l: &mut PathRadiance,
        light_linking: u32,
        shadow_linking: u32,
    ) {
        let ctx = self.ctx;
        let settings = ctx.settings;
        let seq = ctx.sequence;
        let heterogeneous = state.volume_stack.is_heterogeneous(ctx.volumes);
        let num_samples = max(settings.volume_samples, 1);
        let num_samples_inv = 1.0 / num_samples as Float;

        let mut sd = ShaderData::for_volume(volume_ray);

        if settings.features.decoupled_volumes {
            let segment = ctx.volumes.decoupled_record(state, volume_ray, &mut sd, heterogeneous);

            if segment.closure_flag.contains(SegmentFlags::SCATTER) {
                if settings.use_direct_light {
                    self.volume_connect_light_decoupled(
                        &mut sd,
                        state,
                        *throughput,
                        l,
                        settings.sample_all_lights_direct,
                        volume_ray,
                        &segment,
                        light_linking,
                        shadow_linking,
                    );
                }

                for j in 0..num_samples {
                    let mut ps = state.clone();
                    let mut tp = *throughput;
                    ps.branch(j, num_samples);

                    let rphase = ps.rng_1d_for_decision(seq, SampleDimension::Phase);
                    let rscatter = ps.rng_1d_for_decision(seq, SampleDimension::ScatterDistance);

                    let result = ctx.volumes.decoupled_scatter(
                        &ps, volume_ray, &mut sd, &mut tp, rphase, rscatter, &segment, None, false,
                    );
                    if result != VolumeIntegrateResult::Scattered {
                        continue;
                    }

                    ps.volume_stack.branch_at(sd.ray_length);

                    if let Some(pray) = self.volume_bounce(&sd, &mut tp, &mut ps, l) {
                        self.path_indirect(&pray, tp * num_samples_inv, &mut ps, l, light_linking);
                        l.sum_indirect();
                        l.reset_indirect();
                    }
                }
            }

            if segment.closure_flag.contains(SegmentFlags::EMISSION) {
                l.accum_emission(*throughput, segment.accum_emission, state.bounce);
            }

            *throughput *= segment.accum_transmittance;
        } else {
            for j in 0..num_samples {
                let mut ps = state.clone();
                let mut tp = *throughput * num_samples_inv;
                ps.branch(j, num_samples);

                let result = ctx
                    .volumes
                    .integrate(&mut ps, &mut sd, volume_ray, l, &mut tp, heterogeneous, seq);

                ps.volume_stack.branch_at(sd.ray_length);

                if result != VolumeIntegrateResult::Scattered {
                    continue;
                }

                if settings.use_direct_light {
                    self.volume_connect_light(&sd, &mut ps, tp, l, light_linking, shadow_linking);
                }

                if let Some(pray) = self.volume_bounce(&sd, &mut tp, &mut ps, l) {
                    self.path_indirect(&pray, tp, &mut ps, l, light_linking);
                    l.sum_indirect();
                    l.reset_indirect();
                }
            }

            ctx.volumes.shadow(state, volume_ray, throughput);
        }
    }

    /// Samples the phase function at a scatter point and updates the state
    /// for the bounce. Returns the continuation ray, or `None` if the
    /// sample is invalid.
    ///
    /// * `sd`         - Shading data at the scatter point.
    /// * `throughput` - Path throughput, updated in place.
    /// * `state`      - Path state.
    /// * `l`          - Radiance accumulator tracking the bounce.
    pub(crate) fn volume_bounce(
        &self,
        sd: &ShaderData,
        throughput: &mut Spectrum,
        state: &mut PathState,
        l: &mut PathRadiance,
    ) -> Option<Ray> {
        let ctx = self.ctx;

        let (u, v) = state.rng_2d(ctx.sequence, SampleDimension::PhaseU);
        let s = ctx.volumes.sample_phase(sd, u, v)?;
        if s.pdf == 0.0 || s.eval.is_zero() {
            return None;
        }

        l.bsdf_bounce(state, throughput, &s.eval, s.pdf);

        state.ray_pdf = s.pdf;
        state.min_ray_pdf = min(s.pdf, state.min_ray_pdf);
        state.next(ctx.settings, s.label);

        Some(Ray::new(sd.p, s.omega_in, INFINITY, sd.time))
    }
}
