//! Subsurface Branching

use super::BranchedPathIntegrator;
use kernel::common::*;
use kernel::geometry::*;
use kernel::path_state::{PathRayFlags, PathState};
use kernel::radiance::PathRadiance;
use kernel::rng::{cmj_hash, SampleDimension, LCG_SCRAMBLE_SUBSURFACE};
use kernel::shading::*;
use kernel::spectrum::*;
use kernel::volume::VOLUME_STACK_SIZE;

impl<'a> BranchedPathIntegrator<'a> {
    /// Samples every subsurface closure of a surface and lights each
    /// re-entry point as if it was shaded directly, with direct and
    /// indirect light scaled down by the number of samples.
    ///
    /// * `sd`         - Shading data of the surface.
    /// * `l`          - Receives the light.
    /// * `state`      - Path state at the surface.
    /// * `throughput` - Path throughput.
    pub(crate) fn subsurface_scatter(
        &mut self,
        sd: &ShaderData,
        l: &mut PathRadiance,
        state: &mut PathState,
        throughput: Spectrum,
    ) {
        let ctx = self.ctx;
        let settings = ctx.settings;

        let num_samples = settings.subsurface_samples;
        if num_samples == 0 {
            return;
        }
        let num_samples_inv = 1.0 / num_samples as Float;

        let update_volume_stack = settings.features.volumes
            && sd.object_flag.contains(ObjectFlags::INTERSECTS_VOLUME);

        for (i, sc) in sd.closures.iter().enumerate() {
            if !sc.kind.is_bssrdf() {
                continue;
            }

            let mut lcg_state = state.lcg_state_init(LCG_SCRAMBLE_SUBSURFACE);
            let bssrdf_rng_hash = cmj_hash(state.rng_hash, i as u32);

            for j in 0..num_samples {
                let (u, v) = state.branched_rng_2d(
                    ctx.sequence,
                    bssrdf_rng_hash,
                    j,
                    num_samples,
                    SampleDimension::BsdfU,
                );
                let hits = ctx.shading.subsurface_probe(sd, i, u, v, &mut lcg_state);
                debug!("Subsurface closure {i} sample {j}: {} hits", hits.len());

                for hit in hits.iter() {
                    let bssrdf_sd = sd.with_subsurface_hit(hit);

                    let mut hit_state = state.clone();
                    hit_state.branch(j, num_samples);

                    if update_volume_stack {
                        let volume_ray = Ray::segment(
                            offset_ray_origin(&sd.p, &-sd.ng),
                            offset_ray_origin(&bssrdf_sd.p, &-bssrdf_sd.ng),
                            sd.time,
                        );
                        self.update_volume_stack_along(&volume_ray, &mut hit_state);
                    }

                    let light_linking = ctx.shading.object_light_linking(bssrdf_sd.object);
                    if settings.features.emission && settings.use_direct_light {
                        let all = settings.sample_all_lights_direct
                            || state.flag.contains(PathRayFlags::SHADOW_CATCHER);
                        let shadow_linking = ctx.shading.object_shadow_linking(bssrdf_sd.object);
                        self.surface_connect_light(
                            &bssrdf_sd,
                            &mut hit_state,
                            throughput,
                            num_samples_inv,
                            l,
                            all,
                            light_linking,
                            shadow_linking,
                        );
                    }

                    self.surface_indirect_light(
                        &bssrdf_sd,
                        &hit_state,
                        throughput,
                        num_samples_inv,
                        l,
                        light_linking,
                    );
                }
            }
        }
    }

    /// Updates the volume stack of `state` with every volume boundary
    /// crossed by `ray`.
    ///
    /// * `ray`   - Segment between the entry and re-entry points.
    /// * `state` - Path state to update.
    fn update_volume_stack_along(&self, ray: &Ray, state: &mut PathState) {
        let ctx = self.ctx;
        let end = ray.at(ray.t_max);
        let mut volume_ray = *ray;

        for _ in 0..2 * VOLUME_STACK_SIZE {
            let isect = match ctx
                .scene
                .intersect_volume(&volume_ray, PathRayFlags::ALL_VISIBILITY)
            {
                Some(isect) => isect,
                None => break,
            };

            let stack_sd = ctx.shading.setup_from_ray(&isect, &volume_ray);
            state.volume_stack.enter_exit(&stack_sd);

            volume_ray.advance_to(offset_ray_origin(&stack_sd.p, &-stack_sd.ng), &end);
        }
    }
}
