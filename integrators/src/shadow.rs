//! Shadow Visibility

use crate::context::RenderContext;
use kernel::common::*;
use kernel::geometry::*;
use kernel::intersection::Intersection;
use kernel::light::LightSample;
use kernel::path_state::{PathRayFlags, PathState};
use kernel::settings::ShadowStrategy;
use kernel::shading::*;
use kernel::spectrum::*;
use ordered_float::OrderedFloat;

/// Outcome of a shadow query.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShadowResult {
    /// True if no light arrives.
    pub blocked: bool,

    /// Fraction of light arriving through transparent surfaces and media.
    pub transmittance: Spectrum,
}

impl ShadowResult {
    /// Nothing in the way.
    pub const UNBLOCKED: Self = Self {
        blocked: false,
        transmittance: Spectrum::ONE,
    };

    /// Fully occluded.
    pub const BLOCKED: Self = Self {
        blocked: true,
        transmittance: Spectrum::ZERO,
    };

    /// Returns the result for light arriving with `transmittance`. A black
    /// transmittance counts as blocked.
    ///
    /// * `transmittance` - Accumulated transmittance.
    pub fn from_transmittance(transmittance: Spectrum) -> Self {
        if transmittance.is_black() {
            Self::BLOCKED
        } else {
            Self {
                blocked: false,
                transmittance,
            }
        }
    }
}

/// Answers shadow queries toward lights. Transparent surfaces and
/// participating media along the ray attenuate rather than block.
#[derive(Debug, Default)]
pub struct ShadowResolver {
    /// Hits recorded by the batch strategy, reused across queries.
    hits: Vec<Intersection>,
}

impl ShadowResolver {
    /// Create a new `ShadowResolver`.
    pub fn new() -> Self {
        Self::default()
    }

    /// Resolves visibility along a shadow ray.
    ///
    /// * `ctx`            - Render context.
    /// * `shader`         - Shader of the surface the ray leaves.
    /// * `state`          - Path state of the requesting vertex.
    /// * `ray`            - The shadow ray.
    /// * `shadow_linking` - Only objects in this linking mask occlude.
    pub fn shadow_blocked(
        &mut self,
        ctx: &RenderContext,
        shader: ShaderId,
        state: &mut PathState,
        ray: &Ray,
        shadow_linking: u32,
    ) -> ShadowResult {
        if ray.t_max == 0.0 {
            return ShadowResult::UNBLOCKED;
        }

        if !ctx.settings.transparent_shadows {
            return opaque_blocked(ctx, state, ray, shadow_linking);
        }

        if state.transparent_bounce >= ctx.settings.transparent_max_bounce {
            return ShadowResult::BLOCKED;
        }

        match ctx.settings.shadow_strategy {
            ShadowStrategy::RecordAll => self.record_all(ctx, shader, state, ray, shadow_linking),
            ShadowStrategy::StepThrough => step_through(ctx, shader, state, ray, shadow_linking),
        }
    }

    /// Resolves visibility of a light sample. Lights with a shadow depth
    /// map answer from the map, filling texels on demand; the rest go
    /// through `shadow_blocked`.
    ///
    /// * `ctx`            - Render context.
    /// * `shader`         - Shader of the surface the ray leaves.
    /// * `state`          - Path state of the requesting vertex.
    /// * `ray`            - The shadow ray toward the light.
    /// * `shadow_linking` - Only objects in this linking mask occlude.
    /// * `ls`             - The light sample.
    pub fn light_blocked(
        &mut self,
        ctx: &RenderContext,
        shader: ShaderId,
        state: &mut PathState,
        ray: &Ray,
        shadow_linking: u32,
        ls: &LightSample,
    ) -> ShadowResult {
        if ray.t_max == 0.0 {
            return ShadowResult::UNBLOCKED;
        }

        let map = match ctx.lights.shadow_map(ls.light) {
            Some(map) => map,
            None => return self.shadow_blocked(ctx, shader, state, ray, shadow_linking),
        };

        let texel = match map.texel_index(&ray.o) {
            Some(texel) => texel,
            None => return ShadowResult::UNBLOCKED,
        };

        let depth = map.depth_or_insert_with(texel, || {
            let (d, _) = (ray.o - ls.p).normalize_len();
            let light_ray = Ray::new(ls.p, d, INFINITY, ray.time);
            ctx.scene
                .intersect(&light_ray, PathRayFlags::SHADOW_OPAQUE, shadow_linking)
                .map_or(INFINITY, |isect| isect.t)
        });

        if depth <= ray.t_max {
            ShadowResult::BLOCKED
        } else {
            ShadowResult::UNBLOCKED
        }
    }

    /// Records every transparent hit in one query, then attenuates through
    /// them in distance order.
    fn record_all(
        &mut self,
        ctx: &RenderContext,
        shader: ShaderId,
        state: &mut PathState,
        ray: &Ray,
        shadow_linking: u32,
    ) -> ShadowResult {
        let max_hits = (ctx.settings.transparent_max_bounce - state.transparent_bounce - 1) as usize;

        self.hits.clear();
        if ctx
            .scene
            .intersect_shadow_all(ray, &mut self.hits, max_hits, shadow_linking)
        {
            if self.hits.len() > max_hits {
                debug!("Shadow ray exceeded {} transparent hits", max_hits);
            }
            return ShadowResult::BLOCKED;
        }

        let mut throughput = Spectrum::ONE;
        if self.hits.is_empty() {
            volume_shadow(ctx, state, ray, &mut throughput);
            return ShadowResult::from_transmittance(throughput);
        }

        // Traversal order is arbitrary. The sort is stable so coincident
        // hits keep their recorded order.
        self.hits.sort_by_key(|isect| OrderedFloat(isect.t));

        let end = ray.at(ray.t_max);
        let mut shadow_ray = *ray;
        let mut ps = state.clone();
        let mut last_t = 0.0;

        for isect in self.hits.iter() {
            // Surfaces shared by two primitives are only counted once.
            if isect.t == last_t {
                continue;
            }
            let segment_t = isect.t - last_t;
            last_t = isect.t;

            if ctx.has_volumes(ps.volume_stack.len()) {
                let mut segment_ray = shadow_ray;
                segment_ray.t_max = segment_t;
                ctx.volumes.shadow(&ps, &segment_ray, &mut throughput);
            }

            let local = Intersection {
                t: segment_t,
                ..*isect
            };
            let mut sd = ctx.shading.setup_from_ray(&local, &shadow_ray);
            throughput *= surface_transmittance(ctx, shader, state, &mut sd);
            if throughput.is_black() {
                return ShadowResult::BLOCKED;
            }

            shadow_ray.advance_to(sd.p, &end);
            if ctx.settings.features.volumes {
                ps.volume_stack.enter_exit(&sd);
            }
        }

        volume_shadow(ctx, &ps, &shadow_ray, &mut throughput);
        ShadowResult::from_transmittance(throughput)
    }
}

/// Tests for any occluder and attenuates by the media the ray starts in.
fn opaque_blocked(
    ctx: &RenderContext,
    state: &PathState,
    ray: &Ray,
    shadow_linking: u32,
) -> ShadowResult {
    if ctx
        .scene
        .intersect(ray, PathRayFlags::SHADOW_OPAQUE, shadow_linking)
        .is_some()
    {
        return ShadowResult::BLOCKED;
    }

    let mut throughput = Spectrum::ONE;
    volume_shadow(ctx, state, ray, &mut throughput);
    ShadowResult::from_transmittance(throughput)
}

/// Walks the shadow ray from surface to surface, one query per hit.
fn step_through(
    ctx: &RenderContext,
    shader: ShaderId,
    state: &mut PathState,
    ray: &Ray,
    shadow_linking: u32,
) -> ShadowResult {
    let isect = match ctx
        .scene
        .intersect(ray, PathRayFlags::SHADOW_OPAQUE, shadow_linking)
    {
        Some(isect) => isect,
        None => {
            let mut throughput = Spectrum::ONE;
            volume_shadow(ctx, state, ray, &mut throughput);
            return ShadowResult::from_transmittance(throughput);
        }
    };

    if !ctx.shading.transparent_shadow(&isect) {
        return ShadowResult::BLOCKED;
    }

    let end = ray.at(ray.t_max);
    let mut shadow_ray = *ray;
    let mut ps = state.clone();
    let mut throughput = Spectrum::ONE;
    let mut bounce = state.transparent_bounce;

    loop {
        if bounce >= ctx.settings.transparent_max_bounce {
            debug!("Shadow ray exhausted transparent bounce budget at {}", bounce);
            return ShadowResult::BLOCKED;
        }

        let isect = match ctx
            .scene
            .intersect(&shadow_ray, PathRayFlags::SHADOW_TRANSPARENT, shadow_linking)
        {
            Some(isect) => isect,
            None => break,
        };

        if !ctx.shading.transparent_shadow(&isect) {
            return ShadowResult::BLOCKED;
        }

        if ctx.has_volumes(ps.volume_stack.len()) {
            let mut segment_ray = shadow_ray;
            segment_ray.t_max = isect.t;
            ctx.volumes.shadow(&ps, &segment_ray, &mut throughput);
        }

        let mut sd = ctx.shading.setup_from_ray(&isect, &shadow_ray);
        throughput *= surface_transmittance(ctx, shader, state, &mut sd);
        if throughput.is_black() {
            return ShadowResult::BLOCKED;
        }

        shadow_ray.advance_to(offset_ray_origin(&sd.p, &-sd.ng), &end);
        if ctx.settings.features.volumes {
            ps.volume_stack.enter_exit(&sd);
        }
        bounce += 1;
    }

    volume_shadow(ctx, &ps, &shadow_ray, &mut throughput);
    ShadowResult::from_transmittance(throughput)
}

/// Attenuates by the media on the volume stack of `state`.
fn volume_shadow(ctx: &RenderContext, state: &PathState, ray: &Ray, throughput: &mut Spectrum) {
    if ctx.has_volumes(state.volume_stack.len()) {
        ctx.volumes.shadow(state, ray, throughput);
    }
}

/// Returns the fraction of light a shadow ray carries through the surface
/// of `sd`. Shaders with a uniform alpha answer without evaluation, unless
/// they restrict that to their own shadows and `shader` is another one.
///
/// * `ctx`    - Render context.
/// * `shader` - Shader of the surface the shadow ray leaves.
/// * `state`  - Path state; its bounce is raised during evaluation.
/// * `sd`     - Shading data of the crossed surface.
fn surface_transmittance(
    ctx: &RenderContext,
    shader: ShaderId,
    state: &mut PathState,
    sd: &mut ShaderData,
) -> Spectrum {
    if sd.shader_flag.contains(ShaderFlags::HAS_ONLY_VOLUME) {
        return Spectrum::ONE;
    }

    let uniform_alpha = sd.shader_flag.contains(ShaderFlags::USE_UNIFORM_ALPHA)
        && (!sd.shader_flag.contains(ShaderFlags::USE_UNIFORM_ALPHA_SELF_ONLY)
            || sd.shader == shader);

    if uniform_alpha {
        let alpha = if state.flag.contains(PathRayFlags::AO) {
            sd.ao_alpha
        } else {
            sd.shadow_alpha
        };
        Spectrum::new(1.0 - alpha)
    } else {
        state.modify_bounce(true);
        ctx.shading.eval_surface(sd, state, ShaderContext::Shadow);
        state.modify_bounce(false);
        ctx.shading.bsdf_transparency(sd)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn black_transmittance_is_blocked() {
        assert_eq!(
            ShadowResult::from_transmittance(Spectrum::ZERO),
            ShadowResult::BLOCKED
        );
        let partial = ShadowResult::from_transmittance(Spectrum::new(0.25));
        assert!(!partial.blocked);
        assert_eq!(partial.transmittance, Spectrum::new(0.25));
    }
}
