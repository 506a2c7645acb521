//! Volumes

use crate::common::*;
use crate::geometry::*;
use crate::path_state::PathState;
use crate::radiance::PathRadiance;
use crate::rng::SampleSequence;
use crate::shading::*;
use crate::spectrum::*;
use bitflags::bitflags;

mod stack;

// Re-export
pub use stack::*;

/// Strategy for picking scatter distances along a volume segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VolumeSampling {
    Distance,
    Equiangular,
    MultipleImportance,
}

/// Outcome of integrating a volume segment.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum VolumeIntegrateResult {
    /// The path continues to the end of the segment.
    Attenuated,

    /// The path scattered inside the segment.
    Scattered,

    /// The path was absorbed or left no usable sample.
    Missed,
}

bitflags! {
    /// Properties of a recorded volume segment.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct SegmentFlags: u32 {
        const SCATTER = 1 << 0;
        const EMISSION = 1 << 1;
        const ABSORPTION = 1 << 2;
    }
}

/// One homogeneous step of a recorded segment.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct VolumeStep {
    /// Distance at the end of the step.
    pub t: Float,

    pub sigma_t: Spectrum,
    pub sigma_s: Spectrum,

    /// Transmittance from the segment start to the end of the step.
    pub accum_transmittance: Spectrum,
}

/// A volume segment recorded once and scattered many times.
#[derive(Clone, Debug, PartialEq)]
pub struct VolumeSegment {
    pub steps: Vec<VolumeStep>,
    pub accum_transmittance: Spectrum,
    pub accum_emission: Spectrum,
    pub closure_flag: SegmentFlags,
    pub sampling_method: VolumeSampling,
}

/// Ray marching through participating media.
pub trait VolumeSystem: Sync {
    /// Returns true if a shader needs ray marching.
    ///
    /// * `shader` - Volume shader.
    fn is_heterogeneous(&self, shader: ShaderId) -> bool;

    /// Returns the distance sampling method declared by a shader.
    ///
    /// * `shader` - Volume shader.
    fn sampling_method(&self, _shader: ShaderId) -> VolumeSampling {
        VolumeSampling::Distance
    }

    /// Returns shading data for the start of `ray` inside the media of the
    /// path.
    ///
    /// * `state` - Path state.
    /// * `ray`   - Volume ray.
    fn setup_from_volume(&self, state: &PathState, ray: &Ray) -> ShaderData;

    /// Attenuates `throughput` by the transmittance along `ray`.
    ///
    /// * `state`      - Path state providing the volume stack.
    /// * `ray`        - Shadow segment.
    /// * `throughput` - Attenuated in place.
    fn shadow(&self, state: &PathState, ray: &Ray, throughput: &mut Spectrum);

    /// Integrates one segment, possibly scattering. On scatter `sd` is moved
    /// to the scatter point.
    ///
    /// * `state`         - Path state.
    /// * `sd`            - Volume shading data.
    /// * `ray`           - Volume ray.
    /// * `l`             - Receives emission.
    /// * `throughput`    - Updated in place.
    /// * `heterogeneous` - Whether ray marching is needed.
    /// * `seq`           - Sample sequence.
    #[allow(clippy::too_many_arguments)]
    fn integrate(
        &self,
        state: &mut PathState,
        sd: &mut ShaderData,
        ray: &Ray,
        l: &mut PathRadiance,
        throughput: &mut Spectrum,
        heterogeneous: bool,
        seq: &dyn SampleSequence,
    ) -> VolumeIntegrateResult;

    /// Records a segment for decoupled scattering.
    ///
    /// * `state`         - Path state.
    /// * `ray`           - Volume ray.
    /// * `sd`            - Volume shading data.
    /// * `heterogeneous` - Whether ray marching is needed.
    fn decoupled_record(
        &self,
        state: &PathState,
        ray: &Ray,
        sd: &mut ShaderData,
        heterogeneous: bool,
    ) -> VolumeSegment;

    /// Samples a scatter point on a recorded segment and moves `sd` there.
    /// When `probabilistic` is set the path only scatters with probability
    /// one minus the segment transmittance; otherwise it always scatters.
    ///
    /// * `state`         - Path state.
    /// * `ray`           - Volume ray.
    /// * `sd`            - Volume shading data.
    /// * `throughput`    - Updated in place.
    /// * `rphase`        - Random value for channel selection.
    /// * `rscatter`      - Random value for distance selection.
    /// * `segment`       - The recorded segment.
    /// * `light_p`       - Light position for equiangular sampling.
    /// * `probabilistic` - Decide between scattering and passing through.
    #[allow(clippy::too_many_arguments)]
    fn decoupled_scatter(
        &self,
        state: &PathState,
        ray: &Ray,
        sd: &mut ShaderData,
        throughput: &mut Spectrum,
        rphase: Float,
        rscatter: Float,
        segment: &VolumeSegment,
        light_p: Option<&Point3f>,
        probabilistic: bool,
    ) -> VolumeIntegrateResult;

    /// Samples the phase function at a scatter point.
    ///
    /// * `sd` - Volume shading data.
    /// * `u`  - First random value.
    /// * `v`  - Second random value.
    fn sample_phase(&self, sd: &ShaderData, u: Float, v: Float) -> Option<BsdfSample>;

    /// Evaluates the phase function. Returns the value and its PDF.
    ///
    /// * `sd`       - Volume shading data.
    /// * `omega_in` - Scattered direction.
    fn eval_phase(&self, sd: &ShaderData, omega_in: &Vector3f) -> (BsdfEval, Float);
}
