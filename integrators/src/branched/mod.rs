//! Branched Path Integrator

use crate::context::RenderContext;
use crate::shadow::ShadowResolver;
use kernel::common::*;
use kernel::geometry::*;
use kernel::intersection::LINK_ALL;
use kernel::path_state::{russian_roulette, PathRayFlags, PathState};
use kernel::radiance::{PathRadiance, RenderBuffer};
use kernel::rng::SampleDimension;
use kernel::shading::*;
use kernel::spectrum::*;

mod ao;
mod direct;
mod indirect;
mod subsurface;
mod volume;

/// Implements branched path tracing. At the first surface hit every light,
/// every scattering closure, every subsurface closure and every crossed
/// volume gets its own configurable number of samples; the sub-paths they
/// spawn continue as single paths.
pub struct BranchedPathIntegrator<'a> {
    /// Scene services and settings.
    pub(crate) ctx: RenderContext<'a>,

    /// Shadow queries.
    pub(crate) shadow: ShadowResolver,
}

impl<'a> BranchedPathIntegrator<'a> {
    /// Create a new `BranchedPathIntegrator`.
    ///
    /// * `ctx` - Scene services and settings.
    pub fn new(ctx: RenderContext<'a>) -> Self {
        Self {
            ctx,
            shadow: ShadowResolver::new(),
        }
    }

    /// Returns the render context.
    pub fn context(&self) -> &RenderContext<'a> {
        &self.ctx
    }

    /// Traces one camera sample and writes its result. Camera rays of zero
    /// length write an empty result.
    ///
    /// * `ray`      - The camera ray.
    /// * `rng_hash` - Per pixel scramble.
    /// * `sample`   - Sample index.
    /// * `buffer`   - Receives the result.
    pub fn trace(&mut self, ray: &Ray, rng_hash: u32, sample: u32, buffer: &mut dyn RenderBuffer) {
        if ray.t_max != 0.0 {
            self.integrate(ray, rng_hash, sample, buffer);
        } else {
            buffer.write_result(sample, None, 0.0, false);
        }
    }

    /// Follows a camera path through transparent surfaces and volume
    /// boundaries, branching at every surface it shades.
    ///
    /// * `ray`      - The camera ray.
    /// * `rng_hash` - Per pixel scramble.
    /// * `sample`   - Sample index.
    /// * `buffer`   - Receives the result.
    pub fn integrate(&mut self, ray: &Ray, rng_hash: u32, sample: u32, buffer: &mut dyn RenderBuffer) {
        let ctx = self.ctx;
        let settings = ctx.settings;
        let features = settings.features;
        let seq = ctx.sequence;

        let mut l = PathRadiance::new(settings.use_light_pass);
        let mut throughput = Spectrum::ONE;
        let mut l_transparent: Float = 0.0;
        let mut state = PathState::new(settings, rng_hash, sample);
        let mut ray = *ray;

        // Segment through the media since the last shaded surface.
        let mut volume_ray = ray;
        let mut volumes_entered: i32 = 0;
        if features.volumes
            && !state.volume_stack.is_empty()
            && state.volume_stack.is_heterogeneous(ctx.volumes)
        {
            volumes_entered += 1;
        }

        loop {
            let isect = ctx.scene.intersect(&ray, state.ray_visibility(), LINK_ALL);
            let hit_sd = isect.map(|isect| ctx.shading.setup_from_ray(&isect, &ray));
            let only_volume = hit_sd
                .as_ref()
                .map_or(false, |sd| sd.shader_flag.contains(ShaderFlags::HAS_ONLY_VOLUME));

            if features.volumes {
                // Homogeneous media are integrated at every boundary;
                // heterogeneous ones are deferred until all boundaries
                // along the segment are known.
                let mut do_volume = !state.volume_stack.is_empty()
                    && !state.volume_stack.is_heterogeneous(ctx.volumes);

                match hit_sd.as_ref() {
                    Some(sd) if sd.shader_flag.contains(ShaderFlags::HAS_VOLUME) => {
                        if state.volume_stack.is_empty() {
                            volume_ray = Ray::new(sd.p, ray.d, 0.0, ray.time);
                        } else {
                            volume_ray.t_max = (sd.p - volume_ray.o).length();
                        }

                        if sd.is_backfacing() {
                            volumes_entered -= 1;
                            state.volume_stack.exit(sd.object, volume_ray.t_max);
                        } else {
                            volumes_entered += 1;
                            state.volume_stack.enter(sd.object, sd.shader, volume_ray.t_max);
                        }
                    }
                    Some(_) => {}
                    None => state.volume_stack.release_open(),
                }

                do_volume |= volumes_entered == 0 || hit_sd.is_none() || !only_volume;
                do_volume &= !state.volume_stack.is_empty();

                if do_volume {
                    match hit_sd.as_ref() {
                        Some(sd) if !only_volume => volume_ray.t_max = (sd.p - volume_ray.o).length(),
                        None if settings.background_volume_shader.is_some() => {
                            volume_ray.t_max = INFINITY
                        }
                        _ => {}
                    }

                    let (light_linking, shadow_linking) = match hit_sd.as_ref() {
                        Some(sd) => (
                            ctx.shading.object_light_linking(sd.object),
                            ctx.shading.object_shadow_linking(sd.object),
                        ),
                        None => (LINK_ALL, LINK_ALL),
                    };

                    self.volume_step(
                        &volume_ray,
                        &mut throughput,
                        &mut state,
                        &mut l,
                        light_linking,
                        shadow_linking,
                    );

                    state.volume_stack.compact();
                    if let Some(sd) = hit_sd.as_ref() {
                        volume_ray.o = sd.p;
                    }

                    if throughput.is_black() {
                        break;
                    }
                }
            }

            let (isect, mut sd) = match isect.zip(hit_sd) {
                Some(hit) => hit,
                None => {
                    if settings.background_transparent {
                        l_transparent += throughput.average();
                        if !settings.pass_background {
                            break;
                        }
                    }

                    if features.background {
                        let background = ctx.shading.background(&ray, &state);
                        l.accum_background(&state, throughput, background);
                    }
                    break;
                }
            };

            debug!(
                "Branched path vertex at t = {}, transparent bounce {}, throughput = {throughput}",
                isect.t, state.transparent_bounce
            );

            if !only_volume {
                ctx.shading.eval_surface(&mut sd, &state, ShaderContext::Main);
                ctx.shading.merge_closures(&mut sd);

                if features.shadow_tricks {
                    if sd.object_flag.contains(ObjectFlags::SHADOW_CATCHER) {
                        if state.flag.contains(PathRayFlags::CAMERA) {
                            state.flag |= PathRayFlags::SHADOW_CATCHER
                                | PathRayFlags::STORE_SHADOW_INFO
                                | PathRayFlags::SHADOW_CATCHER_ONLY;
                            state.catcher_object = Some(sd.object);
                            if !settings.background_transparent {
                                l.shadow_catcher.background = ctx.shading.background(&ray, &state);
                            }
                            l.shadow_catcher.throughput = throughput.average();
                            l.shadow_catcher.transparency =
                                ctx.shading.bsdf_transparency(&sd).average();
                        }
                    } else {
                        state.flag.remove(PathRayFlags::SHADOW_CATCHER_ONLY);
                    }
                }

                if features.holdout {
                    let holdout_mask = sd.object_flag.contains(ObjectFlags::HOLDOUT_MASK);
                    if holdout_mask || sd.runtime_flag.contains(RuntimeFlags::HOLDOUT) {
                        if settings.background_transparent {
                            let holdout_weight = if holdout_mask {
                                Spectrum::ONE
                            } else {
                                ctx.shading.holdout_eval(&sd)
                            };
                            l_transparent += (holdout_weight * throughput).average();
                        }
                        if holdout_mask {
                            break;
                        }
                    }
                }

                buffer.write_data_passes(&sd, &state, throughput);

                if features.emission && sd.runtime_flag.contains(RuntimeFlags::EMISSION) {
                    let emission = ctx.shading.emission(&sd, isect.t, state.flag, state.ray_pdf);
                    l.accum_emission(throughput, emission, state.bounce);
                }

                // Transparent surfaces crossed by the camera path are
                // subject to Russian roulette like any other bounce.
                if state.flag.contains(PathRayFlags::TRANSPARENT) {
                    let probability = state.continuation_probability(settings, throughput);
                    let xi = if probability > 0.0 && probability < 1.0 {
                        state.rng_1d_for_decision(seq, SampleDimension::Terminate)
                    } else {
                        0.0
                    };
                    if !russian_roulette(probability, xi, &mut throughput) {
                        break;
                    }
                }

                l.update_denoising_features(&sd, &mut state);

                if features.ao
                    && (settings.use_ambient_occlusion || sd.runtime_flag.contains(RuntimeFlags::AO))
                {
                    self.ambient_occlusion(&sd, &mut l, &mut state, throughput, settings.ao_samples);
                }

                if features.subsurface && sd.runtime_flag.contains(RuntimeFlags::BSSRDF) {
                    self.subsurface_scatter(&sd, &mut l, &mut state, throughput);
                }

                let mut hit_state = state.clone();
                hit_state.volume_stack.reset_spans();

                let light_linking = ctx.shading.object_light_linking(sd.object);
                if features.emission && settings.use_direct_light {
                    let shadow_linking = ctx.shading.object_shadow_linking(sd.object);
                    self.surface_connect_light(
                        &sd,
                        &mut hit_state,
                        throughput,
                        1.0,
                        &mut l,
                        settings.sample_all_lights_direct,
                        light_linking,
                        shadow_linking,
                    );
                }

                self.surface_indirect_light(&sd, &hit_state, throughput, 1.0, &mut l, light_linking);

                // Continue through the transparent part of the surface.
                let transparency = ctx.shading.bsdf_transparency(&sd);
                throughput *= transparency;
                if throughput.is_black() {
                    break;
                }

                state.matte_weight *= transparency.average();
                state.flag |= PathRayFlags::TRANSPARENT;
                state.transparent_bounce += 1;
            } else if !state.volume_bounds_next(settings) {
                break;
            }

            ray.o = offset_ray_origin(&sd.p, &-sd.ng);
            ray.t_max -= sd.ray_length;
        }

        debug!("Branched path done, L = {}, transparent = {l_transparent}", l.sum());

        buffer.write_result(
            sample,
            Some(&l),
            l_transparent,
            state.flag.contains(PathRayFlags::SHADOW_CATCHER),
        );
    }
}

/// Returns the number of branches taken for a scattering closure before
/// the adjustment is applied.
///
/// * `ctx` - Render context.
/// * `sd`  - Shading data.
/// * `sc`  - The closure.
pub(crate) fn closure_samples(ctx: &RenderContext, sd: &ShaderData, sc: &ShaderClosure) -> u32 {
    let settings = ctx.settings;
    let override_samples = sd.shader_flag.contains(ShaderFlags::OVERRIDE_SAMPLES);
    if sc.kind.is_bsdf_diffuse() {
        if override_samples {
            sd.diffuse_samples
        } else {
            settings.diffuse_samples
        }
    } else if sc.kind.is_bsdf_bssrdf() {
        1
    } else if sc.kind.is_bsdf_glossy() {
        if override_samples {
            sd.glossy_samples
        } else {
            settings.glossy_samples
        }
    } else if override_samples {
        sd.transmission_samples
    } else {
        settings.transmission_samples
    }
}
