//! Shader Data

use super::*;
use bitflags::bitflags;
use smallvec::SmallVec;

/// Maximum number of closures stored inline.
pub const MAX_CLOSURE: usize = 8;

bitflags! {
    /// Properties declared by a shader.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ShaderFlags: u32 {
        const HAS_VOLUME = 1 << 0;
        const HAS_ONLY_VOLUME = 1 << 1;
        const HETEROGENEOUS_VOLUME = 1 << 2;
        const USE_UNIFORM_ALPHA = 1 << 3;
        const USE_UNIFORM_ALPHA_SELF_ONLY = 1 << 4;
        const OVERRIDE_SAMPLES = 1 << 5;
        const HAS_TRANSPARENT_SHADOW = 1 << 6;
        const USE_MIS = 1 << 7;
    }
}

bitflags! {
    /// Properties of the closures produced by one shader evaluation.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct RuntimeFlags: u32 {
        const BACKFACING = 1 << 0;
        const EMISSION = 1 << 1;
        const BSDF = 1 << 2;
        const BSDF_HAS_EVAL = 1 << 3;
        const BSSRDF = 1 << 4;
        const HOLDOUT = 1 << 5;
        const TRANSPARENT = 1 << 6;
        const AO = 1 << 7;
        const SCATTER = 1 << 8;
        const ABSORPTION = 1 << 9;

        const CLOSURE_FLAGS = Self::EMISSION.bits()
            | Self::BSDF.bits()
            | Self::BSDF_HAS_EVAL.bits()
            | Self::BSSRDF.bits()
            | Self::HOLDOUT.bits()
            | Self::TRANSPARENT.bits()
            | Self::AO.bits()
            | Self::SCATTER.bits()
            | Self::ABSORPTION.bits();
    }
}

bitflags! {
    /// Properties of the object that was hit.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct ObjectFlags: u32 {
        const HOLDOUT_MASK = 1 << 0;
        const SHADOW_CATCHER = 1 << 1;
        const INTERSECTS_VOLUME = 1 << 2;
    }
}

/// A re-entry point found by subsurface probing.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct SubsurfaceHit {
    /// Position.
    pub p: Point3f,

    /// Shading normal.
    pub n: Vector3f,

    /// Geometric normal.
    pub ng: Vector3f,

    /// Full weight of the hit, closure weight included.
    pub weight: Spectrum,
}

/// Geometry and closures at a shading point.
#[derive(Clone, Debug)]
pub struct ShaderData {
    /// Position.
    pub p: Point3f,

    /// Shading normal.
    pub n: Vector3f,

    /// Geometric normal, facing the incoming ray.
    pub ng: Vector3f,

    /// Direction toward the previous path vertex.
    pub i: Vector3f,

    /// Distance travelled by the incoming ray.
    pub ray_length: Float,

    pub time: Float,
    pub object: ObjectId,
    pub prim: u32,
    pub shader: ShaderId,
    pub shader_flag: ShaderFlags,
    pub runtime_flag: RuntimeFlags,
    pub object_flag: ObjectFlags,
    pub closures: SmallVec<[ShaderClosure; MAX_CLOSURE]>,

    /// Per shader sample counts used with `ShaderFlags::OVERRIDE_SAMPLES`.
    pub diffuse_samples: u32,
    pub glossy_samples: u32,
    pub transmission_samples: u32,

    /// Precomputed opacity for ambient occlusion rays.
    pub ao_alpha: Float,

    /// Precomputed opacity for shadow rays.
    pub shadow_alpha: Float,
}

impl ShaderData {
    /// Returns shading data without closures.
    ///
    /// * `p`          - Position.
    /// * `ng`         - Geometric normal facing the incoming ray.
    /// * `i`          - Direction toward the previous vertex.
    /// * `ray_length` - Distance travelled by the incoming ray.
    pub fn new(p: Point3f, ng: Vector3f, i: Vector3f, ray_length: Float) -> Self {
        Self {
            p,
            n: ng,
            ng,
            i,
            ray_length,
            time: 0.0,
            object: OBJECT_NONE,
            prim: 0,
            shader: 0,
            shader_flag: ShaderFlags::empty(),
            runtime_flag: RuntimeFlags::empty(),
            object_flag: ObjectFlags::empty(),
            closures: SmallVec::new(),
            diffuse_samples: 1,
            glossy_samples: 1,
            transmission_samples: 1,
            ao_alpha: 0.0,
            shadow_alpha: 0.0,
        }
    }

    /// Returns shading data for a point inside a volume along `ray`.
    ///
    /// * `ray` - The ray through the volume.
    pub fn for_volume(ray: &Ray) -> Self {
        let mut sd = Self::new(ray.o, -ray.d, -ray.d, 0.0);
        sd.time = ray.time;
        sd
    }

    /// Returns true if the surface was hit from behind.
    pub fn is_backfacing(&self) -> bool {
        self.runtime_flag.contains(RuntimeFlags::BACKFACING)
    }

    /// Returns true if any closure can be evaluated for direct light.
    pub fn has_bsdf_eval(&self) -> bool {
        self.runtime_flag.contains(RuntimeFlags::BSDF_HAS_EVAL)
    }

    /// Adds a closure and updates the runtime flags. Closures beyond
    /// `MAX_CLOSURE` spill to the heap.
    ///
    /// * `sc` - The closure.
    pub fn add_closure(&mut self, sc: ShaderClosure) {
        self.runtime_flag |= match sc.kind {
            ClosureType::Transparent => RuntimeFlags::BSDF | RuntimeFlags::TRANSPARENT,
            k if k.is_bsdf() => RuntimeFlags::BSDF | RuntimeFlags::BSDF_HAS_EVAL,
            ClosureType::Bssrdf => RuntimeFlags::BSSRDF,
            ClosureType::Holdout => RuntimeFlags::HOLDOUT,
            ClosureType::Emission => RuntimeFlags::EMISSION,
            ClosureType::AmbientOcclusion => RuntimeFlags::AO,
            ClosureType::VolumeScatter => RuntimeFlags::SCATTER,
            _ => RuntimeFlags::ABSORPTION,
        };
        self.closures.push(sc);
    }

    /// Removes all closures and their runtime flags.
    pub fn clear_closures(&mut self) {
        self.closures.clear();
        self.runtime_flag.remove(RuntimeFlags::CLOSURE_FLAGS);
    }

    /// Merges closures of the same kind with identical parameters by
    /// summing their weights.
    pub fn merge_closures(&mut self) {
        let mut i = 0;
        while i < self.closures.len() {
            let mut j = i + 1;
            while j < self.closures.len() {
                if self.closures[i].can_merge(&self.closures[j]) {
                    let scj = self.closures.remove(j);
                    let sci = &mut self.closures[i];
                    sci.weight += scj.weight;
                    sci.sample_weight += scj.sample_weight;
                } else {
                    j += 1;
                }
            }
            i += 1;
        }
    }

    /// Returns the summed weight of closures matching `f`.
    fn closure_weight<F: Fn(&ShaderClosure) -> bool>(&self, f: F) -> Spectrum {
        self.closures
            .iter()
            .filter(|sc| f(sc))
            .fold(Spectrum::ZERO, |w, sc| w + sc.weight)
    }

    /// Returns the fraction of light passing straight through.
    pub fn transparency(&self) -> Spectrum {
        if self.runtime_flag.contains(RuntimeFlags::TRANSPARENT) {
            self.closure_weight(|sc| sc.kind.is_bsdf_transparent())
        } else {
            Spectrum::ZERO
        }
    }

    /// Returns the opacity.
    pub fn alpha(&self) -> Spectrum {
        (Spectrum::ONE - self.transparency()).clamp(0.0, 1.0)
    }

    /// Returns the holdout weight.
    pub fn holdout(&self) -> Spectrum {
        self.closure_weight(|sc| sc.kind == ClosureType::Holdout)
    }

    /// Returns the emission closure weight.
    pub fn emission(&self) -> Spectrum {
        self.closure_weight(|sc| sc.kind == ClosureType::Emission)
    }

    /// Returns the ambient occlusion response and the normal to sample
    /// around. Diffuse closures respond scaled by `ao_factor`.
    ///
    /// * `ao_factor` - Scale for diffuse closures.
    pub fn ambient_occlusion(&self, ao_factor: Float) -> (Spectrum, Vector3f) {
        let mut eval = Spectrum::ZERO;
        let mut n = Vector3f::zero();
        for sc in self.closures.iter() {
            if sc.kind.is_bsdf_diffuse() {
                eval += sc.weight * ao_factor;
                n += sc.n * sc.weight.average();
            } else if sc.kind == ClosureType::AmbientOcclusion {
                eval += sc.weight;
                n += self.n * sc.weight.average();
            }
        }
        let n = if n.is_zero() { self.n } else { n.normalize() };
        (eval, n)
    }

    /// Returns the summed sample weight of closures that can be sampled for
    /// a bounce.
    pub fn bsdf_sample_weight_sum(&self) -> Float {
        self.closures
            .iter()
            .filter(|sc| sc.kind.is_bsdf())
            .map(|sc| sc.sample_weight)
            .sum()
    }

    /// Picks a scattering closure proportional to its sample weight.
    /// Returns the closure index and the probability of picking it.
    ///
    /// * `u` - Random value in [0, 1).
    pub fn pick_closure(&self, u: Float) -> Option<(usize, Float)> {
        let sum = self.bsdf_sample_weight_sum();
        if sum <= 0.0 {
            return None;
        }
        let target = u * sum;
        let mut acc = 0.0;
        let mut last = None;
        for (i, sc) in self.closures.iter().enumerate() {
            if !sc.kind.is_bsdf() || sc.sample_weight <= 0.0 {
                continue;
            }
            acc += sc.sample_weight;
            last = Some((i, sc.sample_weight / sum));
            if target < acc {
                break;
            }
        }
        last
    }

    /// Returns a copy placed at a subsurface re-entry point whose closures
    /// are replaced by a single diffuse stand-in carrying the hit weight.
    ///
    /// * `hit` - The re-entry point.
    pub fn with_subsurface_hit(&self, hit: &SubsurfaceHit) -> Self {
        let mut sd = self.clone();
        sd.p = hit.p;
        sd.n = hit.n;
        sd.ng = hit.ng;
        sd.clear_closures();
        if !hit.weight.is_black() {
            sd.add_closure(ShaderClosure::new(ClosureType::BssrdfDiffuse, hit.weight, hit.n));
        }
        sd
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
