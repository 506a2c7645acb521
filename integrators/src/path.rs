//! Indirect Path

use crate::branched::BranchedPathIntegrator;
use kernel::common::*;
use kernel::geometry::*;
use kernel::intersection::LINK_ALL;
use kernel::path_state::{russian_roulette, PathRayFlags, PathState};
use kernel::radiance::PathRadiance;
use kernel::rng::{lcg_step_float, SampleDimension, LCG_SCRAMBLE_SUBSURFACE};
use kernel::shading::*;
use kernel::spectrum::*;
use kernel::volume::{SegmentFlags, VolumeIntegrateResult};

/// What a path does after crossing the media in front of it.
enum VolumeEvent {
    /// Continue to the surface behind the media.
    PassThrough,

    /// Scattered into a new direction.
    Scattered(Ray),

    /// The path ends.
    Terminate,
}

impl<'a> BranchedPathIntegrator<'a> {
    /// Follows a single sub-path spawned by a branch until it escapes, is
    /// terminated by Russian roulette or runs out of bounces. Every vertex
    /// samples one closure and one light.
    ///
    /// * `ray`           - First ray of the sub-path.
    /// * `throughput`    - Throughput of the sub-path.
    /// * `state`         - Path state, advanced in place.
    /// * `l`             - Receives the light.
    /// * `light_linking` - Light linking mask inherited from the branch.
    pub(crate) fn path_indirect(
        &mut self,
        ray: &Ray,
        throughput: Spectrum,
        state: &mut PathState,
        l: &mut PathRadiance,
        light_linking: u32,
    ) {
        let ctx = self.ctx;
        let settings = ctx.settings;
        let features = settings.features;
        let seq = ctx.sequence;

        let mut ray = *ray;
        let mut throughput = throughput;

        loop {
            let isect = ctx.scene.intersect(&ray, state.ray_visibility(), LINK_ALL);

            if features.volumes {
                if isect.is_none() {
                    state.volume_stack.release_open();
                }

                if !state.volume_stack.is_empty() {
                    let mut volume_ray = ray;
                    volume_ray.t_max = isect.map_or(INFINITY, |isect| isect.t);

                    match self.volume_indirect(&volume_ray, &mut throughput, state, l, light_linking) {
                        VolumeEvent::PassThrough => {}
                        VolumeEvent::Scattered(scatter_ray) => {
                            ray = scatter_ray;
                            continue;
                        }
                        VolumeEvent::Terminate => break,
                    }
                }
            }

            let isect = match isect {
                Some(isect) => isect,
                None => {
                    if features.background {
                        let background = ctx.shading.background(&ray, state);
                        l.accum_background(state, throughput, background);
                    }
                    break;
                }
            };

            let mut sd = ctx.shading.setup_from_ray(&isect, &ray);
            ctx.shading.eval_surface(&mut sd, state, ShaderContext::Indirect);
            ctx.shading.merge_closures(&mut sd);

            if features.emission && sd.runtime_flag.contains(RuntimeFlags::EMISSION) {
                let emission = ctx.shading.emission(&sd, isect.t, state.flag, state.ray_pdf);
                l.accum_emission(throughput, emission, state.bounce);
            }

            let probability = state.continuation_probability(settings, throughput);
            let xi = if probability > 0.0 && probability < 1.0 {
                state.rng_1d_for_decision(seq, SampleDimension::Terminate)
            } else {
                0.0
            };
            if !russian_roulette(probability, xi, &mut throughput) {
                break;
            }

            trace!(
                "Indirect bounce {}, t = {}, throughput = {throughput}",
                state.bounce,
                isect.t
            );

            l.update_denoising_features(&sd, state);

            if features.ao
                && (settings.use_ambient_occlusion || sd.runtime_flag.contains(RuntimeFlags::AO))
            {
                self.ambient_occlusion(&sd, l, state, throughput, 1);
            }

            if features.subsurface && sd.runtime_flag.contains(RuntimeFlags::BSSRDF) {
                match self.subsurface_step(&sd, &mut throughput, state) {
                    SubsurfacePick::Surface => {}
                    SubsurfacePick::Reentered(hit_sd) => sd = hit_sd,
                    SubsurfacePick::Lost => break,
                }
            }

            if features.emission && settings.use_direct_light {
                let shadow_linking = ctx.shading.object_shadow_linking(sd.object);
                self.surface_connect_light(
                    &sd,
                    state,
                    throughput,
                    1.0,
                    l,
                    settings.sample_all_lights_indirect,
                    light_linking,
                    shadow_linking,
                );
            }

            ray = match self.surface_bounce(&sd, &ray, &mut throughput, state, l) {
                Some(next_ray) => next_ray,
                None => break,
            };
        }
    }

    /// Integrates the media in front of a sub-path vertex.
    fn volume_indirect(
        &mut self,
        volume_ray: &Ray,
        throughput: &mut Spectrum,
        state: &mut PathState,
        l: &mut PathRadiance,
        light_linking: u32,
    ) -> VolumeEvent {
        let ctx = self.ctx;
        let settings = ctx.settings;
        let seq = ctx.sequence;
        let heterogeneous = state.volume_stack.is_heterogeneous(ctx.volumes);
        let mut sd = ShaderData::for_volume(volume_ray);

        let result = if settings.features.decoupled_volumes {
            let segment = ctx.volumes.decoupled_record(state, volume_ray, &mut sd, heterogeneous);

            if segment.closure_flag.contains(SegmentFlags::EMISSION) {
                l.accum_emission(*throughput, segment.accum_emission, state.bounce);
            }

            let mut result = VolumeIntegrateResult::Attenuated;
            if segment.closure_flag.contains(SegmentFlags::SCATTER) {
                if settings.use_direct_light {
                    let shadow_linking = ctx.shading.object_shadow_linking(sd.object);
                    self.volume_connect_light_decoupled(
                        &mut sd,
                        state,
                        *throughput,
                        l,
                        settings.sample_all_lights_indirect,
                        volume_ray,
                        &segment,
                        light_linking,
                        shadow_linking,
                    );
                }

                let rphase = state.rng_1d_for_decision(seq, SampleDimension::Phase);
                let rscatter = state.rng_1d_for_decision(seq, SampleDimension::ScatterDistance);
                result = ctx.volumes.decoupled_scatter(
                    state, volume_ray, &mut sd, throughput, rphase, rscatter, &segment, None, true,
                );
            }

            if result != VolumeIntegrateResult::Scattered {
                *throughput *= segment.accum_transmittance;
            }
            result
        } else {
            let result = ctx
                .volumes
                .integrate(state, &mut sd, volume_ray, l, throughput, heterogeneous, seq);

            if result == VolumeIntegrateResult::Scattered && settings.use_direct_light {
                let shadow_linking = ctx.shading.object_shadow_linking(sd.object);
                self.volume_connect_light(&sd, state, *throughput, l, light_linking, shadow_linking);
            }
            result
        };

        if result != VolumeIntegrateResult::Scattered {
            return VolumeEvent::PassThrough;
        }

        // Same bounce limits and roulette as a surface vertex.
        let probability = state.continuation_probability(settings, *throughput);
        let xi = if probability > 0.0 && probability < 1.0 {
            state.rng_1d_for_decision(seq, SampleDimension::Terminate)
        } else {
            0.0
        };
        if !russian_roulette(probability, xi, throughput) || throughput.is_black() {
            debug!(
                "Volume scatter terminated at bounce {} (volume bounce {})",
                state.bounce, state.volume_bounce
            );
            return VolumeEvent::Terminate;
        }

        match self.volume_bounce(&sd, throughput, state, l) {
            Some(ray) => VolumeEvent::Scattered(ray),
            None => VolumeEvent::Terminate,
        }
    }

    /// Decides between the scattering closures and the subsurface closures
    /// of a surface, then for subsurface picks one re-entry point.
    fn subsurface_step(
        &self,
        sd: &ShaderData,
        throughput: &mut Spectrum,
        state: &mut PathState,
    ) -> SubsurfacePick {
        let ctx = self.ctx;
        let seq = ctx.sequence;

        let mut bsdf_sum = 0.0;
        let mut bssrdf_sum = 0.0;
        for sc in sd.closures.iter() {
            if sc.kind.is_bsdf() {
                bsdf_sum += sc.sample_weight;
            } else if sc.kind.is_bssrdf() {
                bssrdf_sum += sc.sample_weight;
            }
        }
        let total = bsdf_sum + bssrdf_sum;
        if bssrdf_sum <= 0.0 {
            return SubsurfacePick::Surface;
        }

        let mut r = state.rng_1d(seq, SampleDimension::BssrdfPick) * total;
        if r < bsdf_sum {
            *throughput *= total / bsdf_sum;
            return SubsurfacePick::Surface;
        }
        r -= bsdf_sum;

        // Subsurface closure proportional to its sample weight.
        let mut closure = None;
        for (i, sc) in sd.closures.iter().enumerate() {
            if !sc.kind.is_bssrdf() {
                continue;
            }
            closure = Some(i);
            if r < sc.sample_weight {
                break;
            }
            r -= sc.sample_weight;
        }
        let closure = match closure {
            Some(closure) => closure,
            None => return SubsurfacePick::Lost,
        };
        *throughput *= total / bssrdf_sum;

        let mut lcg_state = state.lcg_state_init(LCG_SCRAMBLE_SUBSURFACE);
        let (u, v) = state.rng_2d(seq, SampleDimension::BsdfU);
        let hits = ctx.shading.subsurface_probe(sd, closure, u, v, &mut lcg_state);
        if hits.is_empty() {
            return SubsurfacePick::Lost;
        }

        let num_hits = hits.len();
        let k = min((lcg_step_float(&mut lcg_state) * num_hits as Float) as usize, num_hits - 1);
        let mut hit = hits[k];
        hit.weight *= num_hits as Float;

        state.flag |= PathRayFlags::DIFFUSE_ANCESTOR;
        SubsurfacePick::Reentered(sd.with_subsurface_hit(&hit))
    }

    /// Samples one closure of a surface and updates the state for the
    /// bounce. Returns the continuation ray, or `None` if the path ends.
    fn surface_bounce(
        &self,
        sd: &ShaderData,
        ray: &Ray,
        throughput: &mut Spectrum,
        state: &mut PathState,
        l: &mut PathRadiance,
    ) -> Option<Ray> {
        let ctx = self.ctx;
        let settings = ctx.settings;
        let seq = ctx.sequence;

        if sd.runtime_flag.contains(RuntimeFlags::BSDF) {
            let (closure, pick_pdf) = sd.pick_closure(state.rng_1d(seq, SampleDimension::BsdfPick))?;
            let sc = &sd.closures[closure];

            let (omega_in, eval, pdf, label) = if sc.kind.is_bsdf_transparent() {
                (
                    -sd.i,
                    BsdfEval::for_closure(sc.kind, sc.weight),
                    pick_pdf,
                    ScatterLabel::TRANSMIT | ScatterLabel::TRANSPARENT,
                )
            } else {
                let (u, v) = state.rng_2d(seq, SampleDimension::BsdfU);
                let s = ctx.shading.sample_closure(sd, closure, u, v)?;
                if !s.is_valid() {
                    return None;
                }
                if s.label.contains(ScatterLabel::SINGULAR) {
                    (s.omega_in, s.eval, s.pdf * pick_pdf, s.label)
                } else {
                    // Weigh in every closure that could have produced the
                    // direction.
                    let (eval, pdf) = ctx.shading.eval_bsdf(sd, &s.omega_in);
                    (s.omega_in, eval, pdf, s.label)
                }
            };

            if pdf <= 0.0 || eval.is_zero() {
                return None;
            }

            l.bsdf_bounce(state, throughput, &eval, pdf);

            if !label.contains(ScatterLabel::TRANSPARENT) {
                state.ray_pdf = pdf;
                state.min_ray_pdf = min(pdf, state.min_ray_pdf);
            }
            state.next(settings, label);

            let ng = if label.contains(ScatterLabel::TRANSMIT) {
                if settings.features.volumes {
                    state.volume_stack.enter_exit(sd);
                }
                -sd.ng
            } else {
                sd.ng
            };
            Some(Ray::new(
                offset_ray_origin(&sd.p, &ng),
                omega_in.normalize(),
                INFINITY,
                sd.time,
            ))
        } else if sd.shader_flag.contains(ShaderFlags::HAS_ONLY_VOLUME) {
            if !state.volume_bounds_next(settings) {
                return None;
            }
            if settings.features.volumes {
                state.volume_stack.enter_exit(sd);
            }
            Some(Ray::new(
                offset_ray_origin(&sd.p, &-sd.ng),
                ray.d,
                INFINITY,
                sd.time,
            ))
        } else {
            None
        }
    }
}

/// Outcome of choosing between surface and subsurface scattering.
enum SubsurfacePick {
    /// Scatter at the surface.
    Surface,

    /// Continue from a subsurface re-entry point.
    Reentered(ShaderData),

    /// No re-entry point was found.
    Lost,
}
