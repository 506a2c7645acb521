//! Shading

use crate::common::*;
use crate::geometry::*;
use crate::intersection::{Intersection, LINK_ALL};
use crate::path_state::{PathRayFlags, PathState};
use crate::spectrum::*;

mod closure;
mod shader_data;

// Re-export
pub use closure::*;
pub use shader_data::*;

/// Where a shader evaluation is requested from. Shaders may skip work that
/// the context does not need.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShaderContext {
    /// Camera path vertex.
    Main,

    /// Vertex of an indirect sub-path.
    Indirect,

    /// Transparency of a surface crossed by a shadow ray.
    Shadow,

    /// Emission only.
    Emission,

    /// Volume shading.
    Volume,
}

/// The shading system evaluates materials at ray hits.
pub trait ShadingSystem: Sync {
    /// Sets up geometry and shader tables for a hit. Closures are not
    /// evaluated yet.
    ///
    /// * `isect` - The hit.
    /// * `ray`   - The ray that produced it.
    fn setup_from_ray(&self, isect: &Intersection, ray: &Ray) -> ShaderData;

    /// Evaluates the shader, filling the closures.
    ///
    /// * `sd`      - Shading data.
    /// * `state`   - Path state.
    /// * `context` - Evaluation context.
    fn eval_surface(&self, sd: &mut ShaderData, state: &PathState, context: ShaderContext);

    /// Merges duplicate closures.
    fn merge_closures(&self, sd: &mut ShaderData) {
        sd.merge_closures();
    }

    /// Returns the fraction of light passing straight through.
    fn bsdf_transparency(&self, sd: &ShaderData) -> Spectrum {
        sd.transparency()
    }

    /// Returns the opacity.
    fn bsdf_alpha(&self, sd: &ShaderData) -> Spectrum {
        sd.alpha()
    }

    /// Returns the ambient occlusion response and sampling normal.
    fn bsdf_ao(&self, sd: &ShaderData, ao_factor: Float) -> (Spectrum, Vector3f) {
        sd.ambient_occlusion(ao_factor)
    }

    /// Returns the holdout weight.
    fn holdout_eval(&self, sd: &ShaderData) -> Spectrum {
        sd.holdout()
    }

    /// Returns true if shadow rays may pass through the hit surface.
    ///
    /// * `isect` - The hit.
    fn transparent_shadow(&self, isect: &Intersection) -> bool;

    /// Evaluates all scattering closures for a direction. Returns the value
    /// and the combined PDF of sampling that direction, where each closure
    /// PDF is weighted by the probability of picking the closure.
    ///
    /// * `sd`       - Shading data.
    /// * `omega_in` - Direction away from the surface.
    fn eval_bsdf(&self, sd: &ShaderData, omega_in: &Vector3f) -> (BsdfEval, Float);

    /// Samples a direction from one closure. The PDF is that of the
    /// closure alone.
    ///
    /// * `sd`      - Shading data.
    /// * `closure` - Index of the closure.
    /// * `u`       - First random value.
    /// * `v`       - Second random value.
    fn sample_closure(&self, sd: &ShaderData, closure: usize, u: Float, v: Float)
        -> Option<BsdfSample>;

    /// Returns emitted radiance at a hit.
    ///
    /// * `sd`      - Shading data.
    /// * `t`       - Hit distance.
    /// * `flag`    - Flags of the ray that hit.
    /// * `ray_pdf` - PDF of the ray direction.
    fn emission(&self, sd: &ShaderData, _t: Float, _flag: PathRayFlags, _ray_pdf: Float) -> Spectrum {
        sd.emission()
    }

    /// Returns background radiance for an escaping ray.
    ///
    /// * `ray`   - The ray.
    /// * `state` - Path state.
    fn background(&self, ray: &Ray, state: &PathState) -> Spectrum;

    /// Returns the environment term for an ambient occlusion ray.
    fn ao_environment(&self, _sd: &ShaderData, _ray: &Ray, _state: &PathState) -> Spectrum {
        Spectrum::ONE
    }

    /// Probes for subsurface re-entry points on the object of `sd`.
    ///
    /// * `sd`        - Shading data.
    /// * `closure`   - Index of the subsurface closure.
    /// * `u`         - First random value.
    /// * `v`         - Second random value.
    /// * `lcg_state` - Generator for further random decisions.
    fn subsurface_probe(
        &self,
        _sd: &ShaderData,
        _closure: usize,
        _u: Float,
        _v: Float,
        _lcg_state: &mut u32,
    ) -> Vec<SubsurfaceHit> {
        Vec::new()
    }

    /// Returns the light linking mask of an object.
    fn object_light_linking(&self, _object: ObjectId) -> u32 {
        LINK_ALL
    }

    /// Returns the shadow linking mask of an object.
    fn object_shadow_linking(&self, _object: ObjectId) -> u32 {
        LINK_ALL
    }
}
