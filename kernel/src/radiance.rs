//! Path Radiance
//!
//! Accumulates the radiance of one camera path. With light passes enabled
//! contributions are split into direct and indirect buckets per scattering
//! category; otherwise everything is summed into `emission`.

use crate::common::*;
use crate::geometry::*;
use crate::path_state::{PathRayFlags, PathState};
use crate::shading::*;
use crate::spectrum::*;

/// Radiance split by scattering category.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct LightPasses {
    pub diffuse: Spectrum,
    pub glossy: Spectrum,
    pub transmission: Spectrum,
    pub subsurface: Spectrum,
    pub volume: Spectrum,
}

impl LightPasses {
    /// Adds an evaluation scaled by `scale` to the matching buckets.
    ///
    /// * `eval`  - Evaluation split by category.
    /// * `scale` - Scale.
    pub fn accum(&mut self, eval: &BsdfEval, scale: Spectrum) {
        self.diffuse += eval.diffuse * scale;
        self.glossy += eval.glossy * scale;
        self.transmission += eval.transmission * scale;
        self.subsurface += eval.subsurface * scale;
        self.volume += eval.scatter * scale;
    }

    /// Returns the sum of all buckets.
    pub fn sum(&self) -> Spectrum {
        self.diffuse + self.glossy + self.transmission + self.subsurface + self.volume
    }
}

/// Contributions tracked on paths that hit a shadow catcher.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShadowCatcherRadiance {
    /// Light that would arrive without any shadowing.
    pub path_total: Spectrum,

    /// Light that arrives with shadowing.
    pub path_total_shaded: Spectrum,

    /// Background behind the catcher.
    pub background: Spectrum,

    /// Average throughput at the catcher.
    pub throughput: Float,

    /// Average transparency of the catcher and what follows it.
    pub transparency: Float,
}

impl Default for ShadowCatcherRadiance {
    fn default() -> Self {
        Self {
            path_total: Spectrum::ZERO,
            path_total_shaded: Spectrum::ZERO,
            background: Spectrum::ZERO,
            throughput: 0.0,
            transparency: 1.0,
        }
    }
}

/// Auxiliary features for denoising.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct DenoisingFeatures {
    pub normal: Vector3f,
    pub albedo: Spectrum,
    pub depth: Float,
}

/// Radiance accumulated along one camera path.
#[derive(Clone, Debug, PartialEq)]
pub struct PathRadiance {
    pub use_light_pass: bool,

    /// Directly visible emission; the full total without light passes.
    pub emission: Spectrum,

    pub background: Spectrum,
    pub ao: Spectrum,
    pub direct: LightPasses,
    pub indirect: LightPasses,

    /// Shadow pass and number of samples that fed it.
    pub shadow: Spectrum,
    pub shadow_samples: Float,

    /// First bounce throughput of the current sub-path, by category.
    pub path: LightPasses,

    /// Throughput after the first bounce of the current sub-path.
    pub direct_throughput: Spectrum,

    /// Emission found one bounce after the first surface.
    pub direct_emission: Spectrum,

    /// Everything found further along the current sub-path.
    pub indirect_light: Spectrum,

    pub shadow_catcher: ShadowCatcherRadiance,
    pub denoising: DenoisingFeatures,
}

impl PathRadiance {
    /// Returns an empty accumulator.
    ///
    /// * `use_light_pass` - Split contributions into light passes.
    pub fn new(use_light_pass: bool) -> Self {
        Self {
            use_light_pass,
            emission: Spectrum::ZERO,
            background: Spectrum::ZERO,
            ao: Spectrum::ZERO,
            direct: LightPasses::default(),
            indirect: LightPasses::default(),
            shadow: Spectrum::ZERO,
            shadow_samples: 0.0,
            path: LightPasses::default(),
            direct_throughput: Spectrum::ZERO,
            direct_emission: Spectrum::ZERO,
            indirect_light: Spectrum::ZERO,
            shadow_catcher: ShadowCatcherRadiance::default(),
            denoising: DenoisingFeatures::default(),
        }
    }

    /// Routes a contribution by bounce: directly visible, one bounce after
    /// the first surface or further.
    fn accum_by_bounce(&mut self, bounce: u32, value: Spectrum, direct: bool) {
        if !self.use_light_pass {
            self.emission += value;
        } else if bounce == 0 {
            if direct {
                self.emission += value;
            } else {
                self.background += value;
            }
        } else if bounce == 1 {
            self.direct_emission += value;
        } else {
            self.indirect_light += value;
        }
    }

    /// Adds emission seen along the path.
    ///
    /// * `throughput` - Path throughput.
    /// * `value`      - Emitted radiance.
    /// * `bounce`     - Bounce of the path.
    pub fn accum_emission(&mut self, throughput: Spectrum, value: Spectrum, bounce: u32) {
        self.accum_by_bounce(bounce, throughput * value, true);
    }

    /// Adds background radiance for an escaping ray.
    ///
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    /// * `value`      - Background radiance.
    pub fn accum_background(&mut self, state: &PathState, throughput: Spectrum, value: Spectrum) {
        if state.flag.contains(PathRayFlags::STORE_SHADOW_INFO) {
            self.shadow_catcher.path_total += throughput * value;
            self.shadow_catcher.path_total_shaded +=
                throughput * value * self.shadow_catcher.transparency;
            if state.flag.contains(PathRayFlags::SHADOW_CATCHER) {
                return;
            }
        }
        self.accum_by_bounce(state.bounce, throughput * value, false);
    }

    /// Adds an unoccluded ambient occlusion sample.
    ///
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    /// * `alpha`      - Opacity of the surface.
    /// * `bsdf`       - Ambient occlusion response.
    /// * `ao`         - Environment term times transmittance.
    pub fn accum_ao(
        &mut self,
        state: &PathState,
        throughput: Spectrum,
        alpha: Spectrum,
        bsdf: Spectrum,
        ao: Spectrum,
    ) {
        if state.flag.contains(PathRayFlags::STORE_SHADOW_INFO) {
            self.shadow_catcher.path_total += throughput * bsdf;
            self.shadow_catcher.path_total_shaded += throughput * bsdf * ao;
            if state.flag.contains(PathRayFlags::SHADOW_CATCHER) {
                return;
            }
        }

        if !self.use_light_pass {
            self.emission += throughput * bsdf * ao;
        } else if state.bounce == 0 {
            self.direct.diffuse += throughput * bsdf * ao;
            self.ao += alpha * throughput * ao;
        } else {
            self.indirect_light += throughput * bsdf * ao;
        }
    }

    /// Records an occluded ambient occlusion sample for the shadow catcher.
    ///
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    /// * `bsdf`       - Ambient occlusion response.
    pub fn accum_total_ao(&mut self, state: &PathState, throughput: Spectrum, bsdf: Spectrum) {
        if state.flag.contains(PathRayFlags::STORE_SHADOW_INFO) {
            self.shadow_catcher.path_total += throughput * bsdf;
        }
    }

    /// Adds an unoccluded light sample.
    ///
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    /// * `bsdf_eval`  - BSDF times light, divided by the light PDF.
    /// * `shadow`     - Transmittance toward the light.
    /// * `shadow_fac` - Weight for the shadow pass.
    /// * `is_lamp`    - True for lamps, which feed the shadow pass.
    pub fn accum_light(
        &mut self,
        state: &PathState,
        throughput: Spectrum,
        bsdf_eval: &BsdfEval,
        shadow: Spectrum,
        shadow_fac: Float,
        is_lamp: bool,
    ) {
        if state.flag.contains(PathRayFlags::STORE_SHADOW_INFO) {
            let full = throughput * bsdf_eval.sum();
            self.shadow_catcher.path_total += full;
            self.shadow_catcher.path_total_shaded += full * shadow;
            if state.flag.contains(PathRayFlags::SHADOW_CATCHER) {
                return;
            }
        }

        if !self.use_light_pass {
            self.emission += throughput * bsdf_eval.sum() * shadow;
        } else if state.bounce == 0 {
            self.direct.accum(bsdf_eval, throughput * shadow);
            if is_lamp {
                self.shadow += shadow * shadow_fac;
                self.shadow_samples += 1.0;
            }
        } else {
            self.indirect_light += throughput * bsdf_eval.sum() * shadow;
        }
    }

    /// Records an occluded light sample for the shadow catcher.
    ///
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    /// * `bsdf_eval`  - BSDF times light, divided by the light PDF.
    pub fn accum_total_light(&mut self, state: &PathState, throughput: Spectrum, bsdf_eval: &BsdfEval) {
        if state.flag.contains(PathRayFlags::STORE_SHADOW_INFO) {
            self.shadow_catcher.path_total += throughput * bsdf_eval.sum();
        }
    }

    /// Applies a sampled bounce to the throughput. On the first bounce of
    /// a directly visible surface the throughput is remembered per
    /// category so later contributions can be attributed.
    ///
    /// * `state`      - Path state before the bounce.
    /// * `throughput` - Updated in place.
    /// * `bsdf_eval`  - Evaluation of the sampled direction.
    /// * `bsdf_pdf`   - PDF of the sampled direction.
    pub fn bsdf_bounce(
        &mut self,
        state: &PathState,
        throughput: &mut Spectrum,
        bsdf_eval: &BsdfEval,
        bsdf_pdf: Float,
    ) {
        let inverse_pdf = 1.0 / bsdf_pdf;

        if self.use_light_pass
            && state.bounce == 0
            && !state.flag.contains(PathRayFlags::TRANSPARENT)
        {
            let value = *throughput * inverse_pdf;
            self.path = LightPasses::default();
            self.path.accum(bsdf_eval, value);
            *throughput = self.path.sum();
            self.direct_throughput = *throughput;
        } else {
            *throughput *= bsdf_eval.sum() * inverse_pdf;
        }
    }

    /// Attributes the light gathered by the current sub-path to the direct
    /// and indirect buckets of its first bounce.
    pub fn sum_indirect(&mut self) {
        if !self.use_light_pass {
            return;
        }

        let direct_emission = self.direct_emission.safe_divide(&self.direct_throughput);
        self.direct.diffuse += self.path.diffuse * direct_emission;
        self.direct.glossy += self.path.glossy * direct_emission;
        self.direct.transmission += self.path.transmission * direct_emission;
        self.direct.subsurface += self.path.subsurface * direct_emission;
        self.direct.volume += self.path.volume * direct_emission;

        let indirect = self.indirect_light.safe_divide(&self.direct_throughput);
        self.indirect.diffuse += self.path.diffuse * indirect;
        self.indirect.glossy += self.path.glossy * indirect;
        self.indirect.transmission += self.path.transmission * indirect;
        self.indirect.subsurface += self.path.subsurface * indirect;
        self.indirect.volume += self.path.volume * indirect;
    }

    /// Clears the per sub-path buckets so the next branch starts isolated.
    pub fn reset_indirect(&mut self) {
        if !self.use_light_pass {
            return;
        }
        self.path = LightPasses::default();
        self.direct_emission = Spectrum::ZERO;
        self.indirect_light = Spectrum::ZERO;
    }

    /// Returns the combined radiance.
    pub fn sum(&self) -> Spectrum {
        let sum = if self.use_light_pass {
            self.emission + self.background + self.direct.sum() + self.indirect.sum()
        } else {
            self.emission
        };
        sum.ensure_finite()
    }

    /// Returns the combined radiance of a shadow catcher path and adjusts
    /// its alpha by the shadow.
    ///
    /// * `alpha`                  - Transparency of the pixel, updated.
    /// * `background_transparent` - Whether the background is transparent.
    pub fn sum_with_shadow_catcher(&self, alpha: &mut Float, background_transparent: bool) -> Spectrum {
        let total = self.shadow_catcher.path_total.average();
        let shadow = if !total.is_finite() {
            0.0
        } else if total == 0.0 {
            self.shadow_catcher.transparency
        } else {
            self.shadow_catcher.path_total_shaded.average() / total
        };

        let mut sum = self.sum();
        if background_transparent {
            *alpha -= self.shadow_catcher.throughput * shadow;
        } else {
            sum += self.shadow_catcher.background * shadow;
        }
        sum
    }

    /// Accumulates denoising features at a surface. Mostly specular surfaces
    /// defer the features to the next bounce.
    ///
    /// * `sd`    - Shading data.
    /// * `state` - Path state; its feature weight is consumed.
    pub fn update_denoising_features(&mut self, sd: &ShaderData, state: &mut PathState) {
        if state.denoising_feature_weight == 0.0 {
            return;
        }

        let weight = state.denoising_feature_weight;
        let depth = weight * sd.ray_length;
        if depth.is_finite() {
            self.denoising.depth += depth;
        }

        if sd.shader_flag.contains(ShaderFlags::HAS_ONLY_VOLUME) {
            return;
        }

        let mut normal = Vector3f::zero();
        let mut albedo = Spectrum::ZERO;
        let mut sum_weight = 0.0;
        let mut sum_nonspecular_weight = 0.0;
        for sc in sd.closures.iter() {
            if !sc.kind.is_bsdf() && !sc.kind.is_bssrdf() {
                continue;
            }
            normal += sc.n * sc.sample_weight;
            sum_weight += sc.sample_weight;
            if sc.roughness * sc.roughness > 0.075 * 0.075 {
                albedo += sc.weight;
                sum_nonspecular_weight += sc.sample_weight;
            }
        }

        if sum_weight == 0.0 || sum_nonspecular_weight * 4.0 > sum_weight {
            if sum_weight != 0.0 {
                normal /= sum_weight;
            }
            let normal = normal * weight;
            if !normal.has_nans() {
                self.denoising.normal += normal;
            }
            self.denoising.albedo += (albedo * weight).ensure_finite();
            state.denoising_feature_weight = 0.0;
        }
    }
}

/// Receives the result of a camera path.
pub trait RenderBuffer {
    /// Writes the final radiance of a path. `None` marks a path that was
    /// not integrated.
    ///
    /// * `sample`            - Sample index.
    /// * `l`                 - Accumulated radiance.
    /// * `transparency`      - Fraction of the background seen through.
    /// * `is_shadow_catcher` - The path hit a shadow catcher.
    fn write_result(
        &mut self,
        sample: u32,
        l: Option<&PathRadiance>,
        transparency: Float,
        is_shadow_catcher: bool,
    );

    /// Writes data passes at a camera path vertex.
    ///
    /// * `sd`         - Shading data.
    /// * `state`      - Path state.
    /// * `throughput` - Path throughput.
    fn write_data_passes(&mut self, _sd: &ShaderData, _state: &PathState, _throughput: Spectrum) {}
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
