//! Shader Closures

use bitflags::bitflags;
use crate::common::*;
use crate::geometry::*;
use crate::spectrum::*;

bitflags! {
    /// Classification of a scattering event returned with a sampled
    /// direction.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ScatterLabel: u32 {
        const REFLECT = 1 << 0;
        const TRANSMIT = 1 << 1;
        const DIFFUSE = 1 << 2;
        const GLOSSY = 1 << 3;
        const SINGULAR = 1 << 4;
        const TRANSPARENT = 1 << 5;
        const VOLUME_SCATTER = 1 << 6;
    }
}

/// Kinds of closures a shader can emit.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum ClosureType {
    /// Diffuse reflection.
    Diffuse,

    /// Glossy reflection.
    Glossy,

    /// Refraction or other transmission.
    Transmission,

    /// Diffuse stand-in for a subsurface closure at a re-entry point.
    BssrdfDiffuse,

    /// Straight pass-through.
    Transparent,

    /// Subsurface scattering.
    Bssrdf,

    /// Holdout.
    Holdout,

    /// Surface emission.
    Emission,

    /// Ambient occlusion.
    AmbientOcclusion,

    /// Volume in-scattering.
    VolumeScatter,

    /// Volume absorption.
    VolumeAbsorption,
}

impl ClosureType {
    /// Returns true for closures that scatter light at the surface.
    pub fn is_bsdf(&self) -> bool {
        matches!(
            self,
            Self::Diffuse | Self::Glossy | Self::Transmission | Self::BssrdfDiffuse | Self::Transparent
        )
    }

    /// Returns true for diffuse reflection.
    pub fn is_bsdf_diffuse(&self) -> bool {
        *self == Self::Diffuse
    }

    /// Returns true for glossy reflection.
    pub fn is_bsdf_glossy(&self) -> bool {
        *self == Self::Glossy
    }

    /// Returns true for the diffuse stand-in of a subsurface closure.
    pub fn is_bsdf_bssrdf(&self) -> bool {
        *self == Self::BssrdfDiffuse
    }

    /// Returns true for transparent pass-through.
    pub fn is_bsdf_transparent(&self) -> bool {
        *self == Self::Transparent
    }

    /// Returns true for subsurface scattering.
    pub fn is_bssrdf(&self) -> bool {
        *self == Self::Bssrdf
    }

    /// Returns true for volume closures.
    pub fn is_volume(&self) -> bool {
        matches!(self, Self::VolumeScatter | Self::VolumeAbsorption)
    }
}

/// One weighted lobe of a shader.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct ShaderClosure {
    /// Kind of closure.
    pub kind: ClosureType,

    /// Colour weight.
    pub weight: Spectrum,

    /// Weight used to pick this closure among others.
    pub sample_weight: Float,

    /// Shading normal of the lobe.
    pub n: Vector3f,

    /// Lobe roughness in [0, 1].
    pub roughness: Float,

    /// Phase function asymmetry of volume scatter closures.
    pub anisotropy: Float,
}

impl ShaderClosure {
    /// Returns a new closure with the sample weight derived from `weight`.
    /// Diffuse-like closures are fully rough, others start smooth.
    ///
    /// * `kind`   - Kind of closure.
    /// * `weight` - Colour weight.
    /// * `n`      - Shading normal.
    pub fn new(kind: ClosureType, weight: Spectrum, n: Vector3f) -> Self {
        let roughness = match kind {
            ClosureType::Diffuse | ClosureType::BssrdfDiffuse | ClosureType::Bssrdf => 1.0,
            _ => 0.0,
        };
        Self {
            kind,
            weight,
            sample_weight: weight.average().abs(),
            n,
            roughness,
            anisotropy: 0.0,
        }
    }

    /// Returns true when two closures can be merged into one.
    ///
    /// * `other` - The other closure.
    pub fn can_merge(&self, other: &Self) -> bool {
        self.kind == other.kind
            && self.n == other.n
            && self.roughness == other.roughness
            && self.anisotropy == other.anisotropy
    }
}

/// A BSDF evaluation split by scattering category, so light passes can
/// attribute it.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct BsdfEval {
    pub diffuse: Spectrum,
    pub glossy: Spectrum,
    pub transmission: Spectrum,
    pub subsurface: Spectrum,
    pub scatter: Spectrum,
}

impl BsdfEval {
    /// Returns an evaluation attributed to the category of a closure.
    ///
    /// * `kind`  - Closure kind.
    /// * `value` - Evaluated value.
    pub fn for_closure(kind: ClosureType, value: Spectrum) -> Self {
        let mut eval = Self::default();
        eval.accum(kind, value);
        eval
    }

    /// Returns an evaluation of a volume phase function.
    ///
    /// * `value` - Evaluated value.
    pub fn for_scatter(value: Spectrum) -> Self {
        Self {
            scatter: value,
            ..Self::default()
        }
    }

    /// Adds a value to the category of a closure.
    ///
    /// * `kind`  - Closure kind.
    /// * `value` - Evaluated value.
    pub fn accum(&mut self, kind: ClosureType, value: Spectrum) {
        match kind {
            ClosureType::Diffuse => self.diffuse += value,
            ClosureType::Glossy => self.glossy += value,
            ClosureType::BssrdfDiffuse | ClosureType::Bssrdf => self.subsurface += value,
            ClosureType::VolumeScatter | ClosureType::VolumeAbsorption => self.scatter += value,
            _ => self.transmission += value,
        }
    }

    /// Returns the sum over all categories.
    pub fn sum(&self) -> Spectrum {
        self.diffuse + self.glossy + self.transmission + self.subsurface + self.scatter
    }

    /// Returns true if every category is black.
    pub fn is_zero(&self) -> bool {
        self.sum().is_black()
    }

    /// Returns the evaluation scaled by `s` in every category.
    ///
    /// * `s` - Scale.
    pub fn scaled(&self, s: Spectrum) -> Self {
        Self {
            diffuse: self.diffuse * s,
            glossy: self.glossy * s,
            transmission: self.transmission * s,
            subsurface: self.subsurface * s,
            scatter: self.scatter * s,
        }
    }
}

/// A sampled scattering direction.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct BsdfSample {
    /// Sampled direction, away from the surface.
    pub omega_in: Vector3f,

    /// BSDF value for the direction, including the closure weight.
    pub eval: BsdfEval,

    /// Probability density of the direction.
    pub pdf: Float,

    /// Classification of the event.
    pub label: ScatterLabel,
}

impl BsdfSample {
    /// Returns true if the sample can continue a path.
    pub fn is_valid(&self) -> bool {
        self.pdf > 0.0 && !self.eval.is_zero() && !self.omega_in.is_zero()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn eval_categories() {
        let mut eval = BsdfEval::for_closure(ClosureType::Diffuse, Spectrum::new(0.5));
        eval.accum(ClosureType::Glossy, Spectrum::new(0.25));
        eval.accum(ClosureType::BssrdfDiffuse, Spectrum::new(0.25));
        assert_eq!(eval.diffuse, Spectrum::new(0.5));
        assert_eq!(eval.subsurface, Spectrum::new(0.25));
        assert_eq!(eval.sum(), Spectrum::ONE);
        assert_eq!(eval.scaled(Spectrum::new(2.0)).sum(), Spectrum::new(2.0));
    }

    #[test]
    fn closure_classification() {
        assert!(ClosureType::Transparent.is_bsdf());
        assert!(ClosureType::Transparent.is_bsdf_transparent());
        assert!(!ClosureType::Bssrdf.is_bsdf());
        assert!(ClosureType::BssrdfDiffuse.is_bsdf_bssrdf());
        assert!(!ClosureType::BssrdfDiffuse.is_bsdf_diffuse());
    }

    #[test]
    fn invalid_samples() {
        let s = BsdfSample {
            omega_in: Vector3f::new(0.0, 0.0, 1.0),
            eval: BsdfEval::for_closure(ClosureType::Diffuse, Spectrum::ONE),
            pdf: 0.0,
            label: ScatterLabel::REFLECT | ScatterLabel::DIFFUSE,
        };
        assert!(!s.is_valid());
        assert!(BsdfSample { pdf: 1.0, ..s }.is_valid());
    }
}
