//! Path State

use crate::common::*;
use crate::rng::*;
use crate::settings::IntegratorSettings;
use crate::shading::ScatterLabel;
use crate::spectrum::*;
use crate::volume::VolumeStack;
use bitflags::bitflags;

bitflags! {
    /// Classification of the ray a path is currently following.
    #[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
    pub struct PathRayFlags: u32 {
        const CAMERA = 1 << 0;
        const REFLECT = 1 << 1;
        const TRANSMIT = 1 << 2;
        const DIFFUSE = 1 << 3;
        const GLOSSY = 1 << 4;
        const SINGULAR = 1 << 5;
        const TRANSPARENT = 1 << 6;
        const SHADOW_OPAQUE = 1 << 7;
        const SHADOW_TRANSPARENT = 1 << 8;
        const VOLUME_SCATTER = 1 << 9;

        const AO = 1 << 10;
        const MIS_SKIP = 1 << 11;
        const DIFFUSE_ANCESTOR = 1 << 12;
        const SHADOW_CATCHER = 1 << 13;
        const STORE_SHADOW_INFO = 1 << 14;
        const SHADOW_CATCHER_ONLY = 1 << 15;
        const TERMINATE_AFTER_TRANSPARENT = 1 << 16;
        const TERMINATE_IMMEDIATE = 1 << 17;

        const SHADOW = Self::SHADOW_OPAQUE.bits() | Self::SHADOW_TRANSPARENT.bits();

        const ALL_VISIBILITY = Self::CAMERA.bits()
            | Self::REFLECT.bits()
            | Self::TRANSMIT.bits()
            | Self::DIFFUSE.bits()
            | Self::GLOSSY.bits()
            | Self::SINGULAR.bits()
            | Self::TRANSPARENT.bits()
            | Self::SHADOW.bits()
            | Self::VOLUME_SCATTER.bits();

        const TERMINATE = Self::TERMINATE_AFTER_TRANSPARENT.bits()
            | Self::TERMINATE_IMMEDIATE.bits();
    }
}

/// Mutable record carried along a path.
#[derive(Clone, Debug)]
pub struct PathState {
    pub flag: PathRayFlags,

    /// Scramble of the random sequence. Branches derive their own.
    pub rng_hash: u32,

    /// First random dimension of the current bounce.
    pub rng_offset: u32,

    pub sample: u32,
    pub num_samples: u32,

    /// Scale used by Russian roulette for branched sub-paths.
    pub branch_factor: Float,

    pub bounce: u32,
    pub diffuse_bounce: u32,
    pub glossy_bounce: u32,
    pub transmission_bounce: u32,
    pub transparent_bounce: u32,
    pub volume_bounce: u32,
    pub volume_bounds_bounce: u32,

    /// PDF of the last scattered direction.
    pub ray_pdf: Float,

    /// Smallest scattering PDF seen along the path.
    pub min_ray_pdf: Float,

    /// Remaining weight of the path for holdout mattes.
    pub matte_weight: Float,

    /// Object of the first shadow catcher hit.
    pub catcher_object: Option<ObjectId>,

    /// Weight of the next denoising feature contribution.
    pub denoising_feature_weight: Float,

    pub volume_stack: VolumeStack,
}

impl PathState {
    /// Returns the state of a new camera path.
    ///
    /// * `settings` - Integrator settings.
    /// * `rng_hash` - Per pixel scramble.
    /// * `sample`   - Sample index.
    pub fn new(settings: &IntegratorSettings, rng_hash: u32, sample: u32) -> Self {
        let mut volume_stack =
            VolumeStack::new(settings.volume_stack_size, settings.volume_stack_growable);
        if settings.features.volumes {
            if let Some(shader) = settings.background_volume_shader {
                volume_stack.push_world(shader);
            }
        }

        Self {
            flag: PathRayFlags::CAMERA | PathRayFlags::MIS_SKIP,
            rng_hash,
            rng_offset: BASE_DIMENSIONS,
            sample,
            num_samples: settings.aa_samples,
            branch_factor: 1.0,
            bounce: 0,
            diffuse_bounce: 0,
            glossy_bounce: 0,
            transmission_bounce: 0,
            transparent_bounce: 0,
            volume_bounce: 0,
            volume_bounds_bounce: 0,
            ray_pdf: 0.0,
            min_ray_pdf: INFINITY,
            matte_weight: 1.0,
            catcher_object: None,
            denoising_feature_weight: if settings.features.denoising_features {
                1.0
            } else {
                0.0
            },
            volume_stack,
        }
    }

    /// Updates the state after scattering with `label`.
    ///
    /// * `settings` - Integrator settings.
    /// * `label`    - Classification of the scattering event.
    pub fn next(&mut self, settings: &IntegratorSettings, label: ScatterLabel) {
        if label.contains(ScatterLabel::TRANSPARENT) {
            self.flag |= PathRayFlags::TRANSPARENT;
            self.transparent_bounce += 1;
            if self.transparent_bounce >= settings.transparent_max_bounce {
                self.flag |= PathRayFlags::TERMINATE_IMMEDIATE;
            }
            if !settings.transparent_shadows {
                self.flag |= PathRayFlags::MIS_SKIP;
            }
            return;
        }

        self.bounce += 1;
        if self.bounce >= settings.max_bounce {
            self.flag |= PathRayFlags::TERMINATE_AFTER_TRANSPARENT;
        }

        self.flag.remove(PathRayFlags::ALL_VISIBILITY | PathRayFlags::MIS_SKIP);

        if label.contains(ScatterLabel::VOLUME_SCATTER) {
            self.flag |= PathRayFlags::VOLUME_SCATTER;
            self.volume_bounce += 1;
            if self.volume_bounce >= settings.max_volume_bounce {
                self.flag |= PathRayFlags::TERMINATE_AFTER_TRANSPARENT;
            }
        } else {
            if label.contains(ScatterLabel::REFLECT) {
                self.flag |= PathRayFlags::REFLECT;
            } else {
                self.flag |= PathRayFlags::TRANSMIT;
                self.transmission_bounce += 1;
            }

            if label.contains(ScatterLabel::DIFFUSE) {
                self.flag |= PathRayFlags::DIFFUSE | PathRayFlags::DIFFUSE_ANCESTOR;
                self.diffuse_bounce += 1;
            } else if label.contains(ScatterLabel::GLOSSY) {
                self.flag |= PathRayFlags::GLOSSY;
                self.glossy_bounce += 1;
            } else {
                self.flag |= PathRayFlags::GLOSSY | PathRayFlags::SINGULAR | PathRayFlags::MIS_SKIP;
            }
        }

        self.volume_bounds_bounce = 0;
        self.rng_offset += BOUNCE_DIMENSIONS;
    }

    /// Counts a crossing of a volume-only surface. Returns false once the
    /// crossing limit is reached.
    ///
    /// * `settings` - Integrator settings.
    pub fn volume_bounds_next(&mut self, settings: &IntegratorSettings) -> bool {
        self.volume_bounds_bounce += 1;
        self.volume_bounds_bounce < settings.max_volume_bounds_bounce
    }

    /// Temporarily raises or lowers the bounce count so shaders evaluated
    /// for shadow rays see the depth of the ray they belong to.
    ///
    /// * `increase` - Raise when true, lower when false.
    pub fn modify_bounce(&mut self, increase: bool) {
        if increase {
            self.bounce += 1;
        } else {
            self.bounce = self.bounce.saturating_sub(1);
        }
    }

    /// Returns the visibility mask for the next scene query.
    pub fn ray_visibility(&self) -> PathRayFlags {
        let mut flag = self.flag & PathRayFlags::ALL_VISIBILITY;

        // Diffuse and glossy visibility only apply to reflection.
        if flag.contains(PathRayFlags::TRANSMIT) {
            flag.remove(PathRayFlags::DIFFUSE | PathRayFlags::GLOSSY);
        }

        if self.flag.contains(PathRayFlags::VOLUME_SCATTER) {
            flag |= PathRayFlags::DIFFUSE;
        }

        flag
    }

    /// Returns the probability of continuing the path. Zero past any
    /// bounce limit, one up to the minimum bounce, otherwise driven by the
    /// throughput.
    ///
    /// * `settings`   - Integrator settings.
    /// * `throughput` - Current path throughput.
    pub fn continuation_probability(
        &self,
        settings: &IntegratorSettings,
        throughput: Spectrum,
    ) -> Float {
        if self.flag.contains(PathRayFlags::TERMINATE_IMMEDIATE) {
            return 0.0;
        }

        if self.flag.contains(PathRayFlags::TRANSPARENT) {
            if self.transparent_bounce >= settings.transparent_max_bounce {
                return 0.0;
            }
            if self.transparent_bounce <= settings.transparent_min_bounce {
                return 1.0;
            }
        } else {
            if self.bounce >= settings.max_bounce
                || self.diffuse_bounce >= settings.max_diffuse_bounce
                || self.glossy_bounce >= settings.max_glossy_bounce
                || self.transmission_bounce >= settings.max_transmission_bounce
                || self.volume_bounce >= settings.max_volume_bounce
            {
                return 0.0;
            }
            if self.bounce <= settings.min_bounce {
                return 1.0;
            }
        }

        let p = (throughput.max_abs_component_value() * self.branch_factor).sqrt();
        min(p, 1.0)
    }

    /// Prepares the state for branch `branch` of `num_branches`.
    ///
    /// * `branch`       - Branch index.
    /// * `num_branches` - Number of branches.
    pub fn branch(&mut self, branch: u32, num_branches: u32) {
        if num_branches > 1 {
            self.sample = self.sample * num_branches + branch;
            self.num_samples *= num_branches;
            self.branch_factor *= num_branches as Float;
        }
    }

    /// Returns a random value for the current bounce.
    ///
    /// * `seq`       - Sample sequence.
    /// * `dimension` - Dimension within the bounce.
    pub fn rng_1d(&self, seq: &dyn SampleSequence, dimension: SampleDimension) -> Float {
        seq.sample_1d(
            self.rng_hash,
            self.sample,
            self.num_samples,
            self.rng_offset + dimension as u32,
        )
    }

    /// Returns a pair of random values for the current bounce.
    ///
    /// * `seq`       - Sample sequence.
    /// * `dimension` - First dimension within the bounce.
    pub fn rng_2d(&self, seq: &dyn SampleSequence, dimension: SampleDimension) -> (Float, Float) {
        seq.sample_2d(
            self.rng_hash,
            self.sample,
            self.num_samples,
            self.rng_offset + dimension as u32,
        )
    }

    /// Returns a random value for a decision that may repeat across
    /// transparent bounces. The offset advances with each transparent
    /// bounce so the same decision is not taken every time.
    ///
    /// * `seq`       - Sample sequence.
    /// * `dimension` - Dimension within the bounce.
    pub fn rng_1d_for_decision(&self, seq: &dyn SampleSequence, dimension: SampleDimension) -> Float {
        let rng_offset = self.rng_offset + self.transparent_bounce * BOUNCE_DIMENSIONS;
        seq.sample_1d(
            self.rng_hash,
            self.sample,
            self.num_samples,
            rng_offset + dimension as u32,
        )
    }

    /// Returns a random value for branch `branch` of `num_branches`.
    ///
    /// * `seq`          - Sample sequence.
    /// * `rng_hash`     - Scramble of the branch set.
    /// * `branch`       - Branch index.
    /// * `num_branches` - Number of branches.
    /// * `dimension`    - Dimension within the bounce.
    pub fn branched_rng_1d(
        &self,
        seq: &dyn SampleSequence,
        rng_hash: u32,
        branch: u32,
        num_branches: u32,
        dimension: SampleDimension,
    ) -> Float {
        seq.sample_1d(
            rng_hash,
            self.sample * num_branches + branch,
            self.num_samples * num_branches,
            self.rng_offset + dimension as u32,
        )
    }

    /// Returns a pair of random values for branch `branch` of
    /// `num_branches`.
    ///
    /// * `seq`          - Sample sequence.
    /// * `rng_hash`     - Scramble of the branch set.
    /// * `branch`       - Branch index.
    /// * `num_branches` - Number of branches.
    /// * `dimension`    - First dimension within the bounce.
    pub fn branched_rng_2d(
        &self,
        seq: &dyn SampleSequence,
        rng_hash: u32,
        branch: u32,
        num_branches: u32,
        dimension: SampleDimension,
    ) -> (Float, Float) {
        seq.sample_2d(
            rng_hash,
            self.sample * num_branches + branch,
            self.num_samples * num_branches,
            self.rng_offset + dimension as u32,
        )
    }

    /// Returns a linear congruential generator seeded from the path.
    ///
    /// * `scramble` - Extra scramble.
    pub fn lcg_state_init(&self, scramble: u32) -> u32 {
        lcg_init(
            self.rng_hash
                .wrapping_add(self.rng_offset)
                .wrapping_add(self.sample.wrapping_mul(scramble)),
        )
    }
}

/// Applies Russian roulette. Returns false if the path is terminated;
/// survivors have their throughput divided by the probability.
///
/// * `probability` - Continuation probability.
/// * `xi`          - Random value in [0, 1).
/// * `throughput`  - Path throughput.
pub fn russian_roulette(probability: Float, xi: Float, throughput: &mut Spectrum) -> bool {
    if probability <= 0.0 {
        false
    } else if probability < 1.0 {
        if xi >= probability {
            false
        } else {
            *throughput /= probability;
            true
        }
    } else {
        true
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use float_cmp::approx_eq;
    use proptest::prelude::*;

    fn settings() -> IntegratorSettings {
        IntegratorSettings {
            max_bounce: 8,
            min_bounce: 2,
            max_diffuse_bounce: 8,
            transparent_max_bounce: 4,
            transparent_min_bounce: 1,
            ..IntegratorSettings::default()
        }
    }

    #[test]
    fn new_camera_state() {
        let state = PathState::new(&settings(), 7, 3);
        assert!(state.flag.contains(PathRayFlags::CAMERA));
        assert_eq!(state.bounce, 0);
        assert!(state.volume_stack.is_empty());
        assert_eq!(state.branch_factor, 1.0);
    }

    #[test]
    fn world_volume_is_entered_at_start() {
        let s = IntegratorSettings {
            background_volume_shader: Some(4),
            ..settings()
        };
        let state = PathState::new(&s, 0, 0);
        assert_eq!(state.volume_stack.len(), 1);
        assert_eq!(state.volume_stack.entries()[0].shader, 4);
    }

    #[test]
    fn diffuse_bounce_updates_counters() {
        let s = settings();
        let mut state = PathState::new(&s, 0, 0);
        state.next(&s, ScatterLabel::REFLECT | ScatterLabel::DIFFUSE);
        assert_eq!(state.bounce, 1);
        assert_eq!(state.diffuse_bounce, 1);
        assert!(!state.flag.contains(PathRayFlags::CAMERA));
        assert!(state.flag.contains(PathRayFlags::DIFFUSE | PathRayFlags::REFLECT));
        assert_eq!(state.rng_offset, BASE_DIMENSIONS + BOUNCE_DIMENSIONS);
    }

    #[test]
    fn transparent_bounce_keeps_rng_offset() {
        let s = settings();
        let mut state = PathState::new(&s, 0, 0);
        state.next(&s, ScatterLabel::TRANSPARENT);
        assert_eq!(state.bounce, 0);
        assert_eq!(state.transparent_bounce, 1);
        assert_eq!(state.rng_offset, BASE_DIMENSIONS);
        assert!(state.flag.contains(PathRayFlags::CAMERA | PathRayFlags::TRANSPARENT));
    }

    #[test]
    fn transmit_visibility_drops_diffuse() {
        let s = settings();
        let mut state = PathState::new(&s, 0, 0);
        state.next(&s, ScatterLabel::TRANSMIT | ScatterLabel::DIFFUSE);
        let vis = state.ray_visibility();
        assert!(vis.contains(PathRayFlags::TRANSMIT));
        assert!(!vis.contains(PathRayFlags::DIFFUSE));
    }

    #[test]
    fn modify_bounce_restores() {
        let mut state = PathState::new(&settings(), 0, 0);
        state.modify_bounce(true);
        assert_eq!(state.bounce, 1);
        state.modify_bounce(false);
        assert_eq!(state.bounce, 0);
    }

    #[test]
    fn continuation_probability_limits() {
        let s = settings();
        let mut state = PathState::new(&s, 0, 0);
        assert_eq!(state.continuation_probability(&s, Spectrum::new(0.01)), 1.0);

        state.bounce = 5;
        let p = state.continuation_probability(&s, Spectrum::new(0.25));
        assert!(approx_eq!(f32, p, 0.5, epsilon = 0.0001));

        state.branch_factor = 16.0;
        assert_eq!(state.continuation_probability(&s, Spectrum::new(0.25)), 1.0);

        state.bounce = 8;
        assert_eq!(state.continuation_probability(&s, Spectrum::ONE), 0.0);
    }

    #[test]
    fn transparent_continuation_uses_transparent_limits() {
        let s = settings();
        let mut state = PathState::new(&s, 0, 0);
        state.flag |= PathRayFlags::TRANSPARENT;
        state.bounce = 100;
        state.transparent_bounce = 1;
        assert_eq!(state.continuation_probability(&s, Spectrum::new(0.01)), 1.0);
        state.transparent_bounce = 4;
        assert_eq!(state.continuation_probability(&s, Spectrum::ONE), 0.0);
    }

    #[test]
    fn branch_scales_samples() {
        let mut state = PathState::new(&settings(), 0, 3);
        state.branch(2, 4);
        assert_eq!(state.sample, 14);
        assert_eq!(state.num_samples, 4);
        assert_eq!(state.branch_factor, 4.0);
    }

    #[test]
    fn russian_roulette_certain_outcomes() {
        let mut tp = Spectrum::new(0.3);
        assert!(russian_roulette(1.0, 0.99, &mut tp));
        assert_eq!(tp, Spectrum::new(0.3));
        assert!(!russian_roulette(0.0, 0.0, &mut tp));
    }

    #[test]
    fn russian_roulette_is_unbiased() {
        let mut rng = RNG::new(17);
        let p = 0.3;
        let n = 100_000;
        let mut terminated = 0;
        let mut sum = 0.0;
        for _ in 0..n {
            let mut tp = Spectrum::ONE;
            if russian_roulette(p, rng.uniform_float(), &mut tp) {
                assert!(approx_eq!(f32, tp[0], 1.0 / p, epsilon = 0.0001));
                sum += tp[0] as f64;
            } else {
                terminated += 1;
            }
        }
        let rate = terminated as f64 / n as f64;
        assert!((rate - 0.7).abs() < 0.01, "termination rate = {}", rate);
        assert!((sum / n as f64 - 1.0).abs() < 0.03, "mean = {}", sum / n as f64);
    }

    proptest! {
        #[test]
        fn continuation_probability_in_unit_interval(
            bounce in 0u32..12,
            t in 0.0f32..4.0f32,
            branch_factor in 1.0f32..16.0f32,
        ) {
            let s = settings();
            let mut state = PathState::new(&s, 0, 0);
            state.bounce = bounce;
            state.branch_factor = branch_factor;
            let p = state.continuation_probability(&s, Spectrum::new(t));
            prop_assert!((0.0..=1.0).contains(&p));
        }
    }
}
