//! Direct Lighting

use super::BranchedPathIntegrator;
use kernel::common::*;
use kernel::geometry::*;
use kernel::light::LightSample;
use kernel::path_state::PathState;
use kernel::radiance::PathRadiance;
use kernel::rng::{cmj_hash, SampleDimension};
use kernel::sampling::power_heuristic;
use kernel::shading::*;
use kernel::spectrum::*;
use kernel::volume::{VolumeIntegrateResult, VolumeSegment};

impl<'a> BranchedPathIntegrator<'a> {
    /// Samples lights from a surface point and accumulates the unoccluded
    /// contributions. With `sample_all_lights` each linked light gets its
    /// own scaled sample count; otherwise one light is picked at random.
    ///
    /// * `sd`                 - Shading data of the surface.
    /// * `state`              - Path state.
    /// * `throughput`         - Path throughput.
    /// * `num_samples_adjust` - Scale for sample counts and weights.
    /// * `l`                  - Receives the light.
    /// * `sample_all_lights`  - Sample every light instead of one.
    /// * `light_linking`      - Only lights sharing a bit with this mask.
    /// * `shadow_linking`     - Only objects in this mask occlude.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn surface_connect_light(
        &mut self,
        sd: &ShaderData,
        state: &mut PathState,
        throughput: Spectrum,
        num_samples_adjust: Float,
        l: &mut PathRadiance,
        sample_all_lights: bool,
        light_linking: u32,
        shadow_linking: u32,
    ) {
        if !sd.has_bsdf_eval() {
            return;
        }

        let ctx = self.ctx;
        let seq = ctx.sequence;

        if sample_all_lights {
            for i in 0..ctx.lights.num_lights() {
                if ctx.lights.light_linking(i) & light_linking == 0 {
                    continue;
                }

                let num_samples = ceil_to_u32(num_samples_adjust * ctx.lights.light_samples(i) as Float);
                if num_samples == 0 {
                    continue;
                }
                let num_samples_inv = num_samples_adjust / num_samples as Float;
                let lamp_rng_hash = cmj_hash(state.rng_hash, i as u32);

                for j in 0..num_samples {
                    let (u, v) = state.branched_rng_2d(
                        seq,
                        lamp_rng_hash,
                        j,
                        num_samples,
                        SampleDimension::LightU,
                    );
                    if let Some(ls) = ctx.lights.sample(i, u, v, &sd.p, sd.time) {
                        if let Some((eval, light_ray)) = self.surface_light_eval(sd, &ls) {
                            self.accum_light_sample(
                                sd.shader,
                                state,
                                &ls,
                                &eval,
                                &light_ray,
                                throughput * num_samples_inv,
                                num_samples_inv,
                                l,
                                shadow_linking,
                            );
                        }
                    }
                }
            }
        } else {
            let (u, v) = state.rng_2d(seq, SampleDimension::LightU);
            let u_pick = state.rng_1d(seq, SampleDimension::LightPick);
            if let Some(ls) = ctx.lights.sample_one(u_pick, u, v, &sd.p, sd.time) {
                if ctx.lights.light_linking(ls.light) & light_linking == 0 {
                    return;
                }
                if let Some((eval, light_ray)) = self.surface_light_eval(sd, &ls) {
                    self.accum_light_sample(
                        sd.shader,
                        state,
                        &ls,
                        &eval,
                        &light_ray,
                        throughput * num_samples_adjust,
                        num_samples_adjust,
                        l,
                        shadow_linking,
                    );
                }
            }
        }
    }

    /// Connects a volume scatter point to one randomly picked light.
    ///
    /// * `sd`             - Shading data at the scatter point.
    /// * `state`          - Path state.
    /// * `throughput`     - Path throughput.
    /// * `l`              - Receives the light.
    /// * `light_linking`  - Only lights sharing a bit with this mask.
    /// * `shadow_linking` - Only objects in this mask occlude.
    pub(crate) fn volume_connect_light(
        &mut self,
        sd: &ShaderData,
        state: &mut PathState,
        throughput: Spectrum,
        l: &mut PathRadiance,
        light_linking: u32,
        shadow_linking: u32,
    ) {
        let ctx = self.ctx;
        let seq = ctx.sequence;

        let (u, v) = state.rng_2d(seq, SampleDimension::LightU);
        let u_pick = state.rng_1d(seq, SampleDimension::LightPick);
        if let Some(ls) = ctx.lights.sample_one(u_pick, u, v, &sd.p, sd.time) {
            if ctx.lights.light_linking(ls.light) & light_linking == 0 {
                return;
            }
            if let Some((eval, light_ray)) = self.volume_light_eval(sd, &ls) {
                self.accum_light_sample(
                    sd.shader,
                    state,
                    &ls,
                    &eval,
                    &light_ray,
                    throughput,
                    1.0,
                    l,
                    shadow_linking,
                );
            }
        }
    }

    /// Connects a recorded volume segment to lights. Each light sample
    /// first picks a scatter point on the segment, preferring points near
    /// the light when equiangular sampling is enabled, then samples the
    /// light again from that point.
    ///
    /// * `sd`                - Volume shading data, moved to each scatter point.
    /// * `state`             - Path state.
    /// * `throughput`        - Path throughput.
    /// * `l`                 - Receives the light.
    /// * `sample_all_lights` - Sample every light instead of one.
    /// * `ray`               - The volume ray.
    /// * `segment`           - The recorded segment.
    /// * `light_linking`     - Only lights sharing a bit with this mask.
    /// * `shadow_linking`    - Only objects in this mask occlude.
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn volume_connect_light_decoupled(
        &mut self,
        sd: &mut ShaderData,
        state: &mut PathState,
        throughput: Spectrum,
        l: &mut PathRadiance,
        sample_all_lights: bool,
        ray: &Ray,
        segment: &VolumeSegment,
        light_linking: u32,
        shadow_linking: u32,
    ) {
        let ctx = self.ctx;
        let seq = ctx.sequence;

        if sample_all_lights {
            for i in 0..ctx.lights.num_lights() {
                if ctx.lights.light_linking(i) & light_linking == 0 {
                    continue;
                }

                let num_samples = ctx.lights.light_samples(i);
                if num_samples == 0 {
                    continue;
                }
                let num_samples_inv = 1.0 / num_samples as Float;
                let lamp_rng_hash = cmj_hash(state.rng_hash, i as u32);

                for j in 0..num_samples {
                    let (u, v) = state.branched_rng_2d(
                        seq,
                        lamp_rng_hash,
                        j,
                        num_samples,
                        SampleDimension::LightU,
                    );
                    let rphase = state.branched_rng_1d(
                        seq,
                        lamp_rng_hash,
                        j,
                        num_samples,
                        SampleDimension::Phase,
                    );
                    let rscatter = state.branched_rng_1d(
                        seq,
                        lamp_rng_hash,
                        j,
                        num_samples,
                        SampleDimension::ScatterDistance,
                    );

                    let light_p = ctx
                        .lights
                        .sample(i, u, v, &ray.o, ray.time)
                        .filter(|ls| ls.t.is_finite())
                        .map(|ls| ls.p);

                    let mut tp = throughput;
                    let result = ctx.volumes.decoupled_scatter(
                        state,
                        ray,
                        sd,
                        &mut tp,
                        rphase,
                        rscatter,
                        segment,
                        light_p.as_ref(),
                        false,
                    );
                    if result != VolumeIntegrateResult::Scattered {
                        continue;
                    }

                    if let Some(ls) = ctx.lights.sample(i, u, v, &sd.p, sd.time) {
                        if let Some((eval, light_ray)) = self.volume_light_eval(sd, &ls) {
                            self.accum_light_sample(
                                sd.shader,
                                state,
                                &ls,
                                &eval,
                                &light_ray,
                                tp * num_samples_inv,
                                num_samples_inv,
                                l,
                                shadow_linking,
                            );
                        }
                    }
                }
            }
        } else {
            let (u, v) = state.rng_2d(seq, SampleDimension::LightU);
            let u_pick = state.rng_1d(seq, SampleDimension::LightPick);
            let rphase = state.rng_1d_for_decision(seq, SampleDimension::Phase);
            let rscatter = state.rng_1d_for_decision(seq, SampleDimension::ScatterDistance);

            let light_p = ctx
                .lights
                .sample_one(u_pick, u, v, &ray.o, ray.time)
                .filter(|ls| ls.t.is_finite())
                .map(|ls| ls.p);

            let mut tp = throughput;
            let result = ctx.volumes.decoupled_scatter(
                state,
                ray,
                sd,
                &mut tp,
                rphase,
                rscatter,
                segment,
                light_p.as_ref(),
                false,
            );
            if result != VolumeIntegrateResult::Scattered {
                return;
            }

            if let Some(ls) = ctx.lights.sample_one(u_pick, u, v, &sd.p, sd.time) {
                if ctx.lights.light_linking(ls.light) & light_linking == 0 {
                    return;
                }
                if let Some((eval, light_ray)) = self.volume_light_eval(sd, &ls) {
                    self.accum_light_sample(
                        sd.shader,
                        state,
                        &ls,
                        &eval,
                        &light_ray,
                        tp,
                        1.0,
                        l,
                        shadow_linking,
                    );
                }
            }
        }
    }

    /// Evaluates the surface closures toward a light sample. Returns the
    /// weighted evaluation and the shadow ray, or `None` if the sample
    /// cannot contribute.
    ///
    /// * `sd` - Shading data.
    /// * `ls` - The light sample.
    fn surface_light_eval(&self, sd: &ShaderData, ls: &LightSample) -> Option<(BsdfEval, Ray)> {
        if ls.pdf == 0.0 || ls.eval.is_black() {
            return None;
        }

        let (eval, bsdf_pdf) = self.ctx.shading.eval_bsdf(sd, &ls.d);
        let eval = light_weighted(eval, bsdf_pdf, ls)?;

        // Leave from the side of the surface facing the light.
        let ng = if sd.ng.dot(&ls.d) < 0.0 { -sd.ng } else { sd.ng };
        let origin = offset_ray_origin(&sd.p, &ng);
        Some((eval, light_ray(origin, ls, sd.time)))
    }

    /// Evaluates the phase function toward a light sample.
    ///
    /// * `sd` - Volume shading data.
    /// * `ls` - The light sample.
    fn volume_light_eval(&self, sd: &ShaderData, ls: &LightSample) -> Option<(BsdfEval, Ray)> {
        if ls.pdf == 0.0 || ls.eval.is_black() {
            return None;
        }

        let (eval, phase_pdf) = self.ctx.volumes.eval_phase(sd, &ls.d);
        let eval = light_weighted(eval, phase_pdf, ls)?;
        Some((eval, light_ray(sd.p, ls, sd.time)))
    }

    /// Traces the shadow ray of an evaluated light sample and accumulates
    /// the result.
    #[allow(clippy::too_many_arguments)]
    fn accum_light_sample(
        &mut self,
        shader: ShaderId,
        state: &mut PathState,
        ls: &LightSample,
        eval: &BsdfEval,
        light_ray: &Ray,
        throughput: Spectrum,
        shadow_fac: Float,
        l: &mut PathRadiance,
        shadow_linking: u32,
    ) {
        let ctx = self.ctx;
        let shadow = self
            .shadow
            .light_blocked(&ctx, shader, state, light_ray, shadow_linking, ls);

        if !shadow.blocked {
            l.accum_light(state, throughput, eval, shadow.transmittance, shadow_fac, true);
        } else {
            l.accum_total_light(state, throughput, eval);
        }
    }
}

/// Applies the light's radiance, PDF and multiple importance weight to a
/// closure evaluation. Returns `None` if nothing is left.
///
/// * `eval`        - Closure evaluation toward the light.
/// * `scatter_pdf` - PDF of sampling the light direction from the closures.
/// * `ls`          - The light sample.
fn light_weighted(eval: BsdfEval, scatter_pdf: Float, ls: &LightSample) -> Option<BsdfEval> {
    let mis_weight = if ls.is_delta {
        1.0
    } else {
        power_heuristic(1, ls.pdf, 1, scatter_pdf)
    };

    let eval = eval.scaled(ls.eval * (mis_weight / ls.pdf));
    if eval.is_zero() {
        None
    } else {
        Some(eval)
    }
}

/// Returns the shadow ray from `origin` toward a light sample. Rays toward
/// lights at a finite distance stop just short of the light.
///
/// * `origin` - Ray origin.
/// * `ls`     - The light sample.
/// * `time`   - Time value.
fn light_ray(origin: Point3f, ls: &LightSample, time: Float) -> Ray {
    if ls.t.is_finite() {
        let mut ray = Ray::segment(origin, ls.p, time);
        ray.t_max *= 1.0 - SHADOW_EPSILON;
        ray
    } else {
        Ray::new(origin, ls.d, INFINITY, time)
    }
}
