//! Random Numbers
//!
//! Deterministic random streams keyed by pixel, sample, path dimension and
//! branch. Every random number consumed by the integrators comes from a
//! `SampleSequence` so results reproduce exactly for a given seed.

use crate::common::*;

const PCG32_DEFAULT_STATE: u64 = 0x853c49e6748fea9b;
const PCG32_DEFAULT_STREAM: u64 = 0xda3e39cb94b95bdb;
const PCG32_MULT: u64 = 0x5851f42d4c957f2d;

/// Implements the PCG32 pseudo-random number generator.
#[derive(Clone, Debug)]
pub struct RNG {
    state: u64,
    inc: u64,
}

impl Default for RNG {
    /// Return a new instance of `RNG` with default state and stream.
    fn default() -> Self {
        Self {
            state: PCG32_DEFAULT_STATE,
            inc: PCG32_DEFAULT_STREAM,
        }
    }
}

impl RNG {
    /// Create a new `RNG` by seeding it with the given starting sequence.
    ///
    /// * `sequence_index` - The starting sequence to seed with.
    pub fn new(sequence_index: u64) -> Self {
        let mut ret = Self { state: 0, inc: 0 };
        ret.set_sequence(sequence_index);
        ret
    }

    /// Initialize the random number generator sequence.
    ///
    /// * `init_seq` - The starting sequence to seed with.
    fn set_sequence(&mut self, init_seq: u64) {
        self.state = 0;
        self.inc = init_seq.wrapping_shl(1) | 1;
        let _ = self.uniform_u32();
        self.state = self.state.wrapping_add(PCG32_DEFAULT_STATE);
        let _ = self.uniform_u32();
    }

    /// Returns a uniformly distributed u32 value.
    #[inline(always)]
    pub fn uniform_u32(&mut self) -> u32 {
        let old_state = self.state;
        self.state = old_state.wrapping_mul(PCG32_MULT).wrapping_add(self.inc);

        let xor_shifted = (((old_state >> 18) ^ old_state) >> 27) as u32;
        let rot = (old_state >> 59) as u32;
        xor_shifted.rotate_right(rot)
    }

    /// Returns a uniformly distributed value over the half open interval [0.0, 1.0).
    pub fn uniform_float(&mut self) -> Float {
        min(
            self.uniform_u32() as Float * hexf32!("0x1.0p-32"),
            ONE_MINUS_EPSILON,
        )
    }
}

/// Integer hash used to decorrelate random streams. Deriving a new stream
/// for a branch is `cmj_hash(parent_hash, branch_index)`.
///
/// * `i` - Value to hash.
/// * `p` - Scramble.
pub fn cmj_hash(i: u32, p: u32) -> u32 {
    let mut i = i ^ p;
    i ^= i >> 17;
    i ^= i >> 10;
    i = i.wrapping_mul(0xb36534e5);
    i ^= i >> 12;
    i ^= i >> 21;
    i = i.wrapping_mul(0x93fc4795);
    i ^= 0xdf6e307f;
    i ^= i >> 17;
    i.wrapping_mul(1 | (p >> 18))
}

/// Advances a linear congruential generator and returns the new state.
///
/// * `rng` - Generator state.
pub fn lcg_step_u32(rng: &mut u32) -> u32 {
    *rng = rng.wrapping_mul(1103515245).wrapping_add(12345);
    *rng
}

/// Advances a linear congruential generator and returns a value in [0, 1).
///
/// * `rng` - Generator state.
pub fn lcg_step_float(rng: &mut u32) -> Float {
    min(
        lcg_step_u32(rng) as Float * hexf32!("0x1.0p-32"),
        ONE_MINUS_EPSILON,
    )
}

/// Scramble of the generator choosing among subsurface hits.
pub const LCG_SCRAMBLE_SUBSURFACE: u32 = 0x68bc21eb;

/// Returns a seeded linear congruential generator state.
///
/// * `seed` - The seed.
pub fn lcg_init(seed: u32) -> u32 {
    let mut rng = seed;
    lcg_step_u32(&mut rng);
    rng
}

/// Offsets of the random dimensions used within one bounce.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SampleDimension {
    /// Direction sampling, first coordinate.
    BsdfU = 0,

    /// Direction sampling, second coordinate.
    BsdfV = 1,

    /// Light position, first coordinate.
    LightU = 2,

    /// Light position, second coordinate.
    LightV = 3,

    /// Choice of a single light.
    LightPick = 4,

    /// Russian roulette.
    Terminate = 5,

    /// Phase function, first coordinate.
    PhaseU = 6,

    /// Phase function, second coordinate.
    PhaseV = 7,

    /// Choice of a volume channel.
    Phase = 8,

    /// Distance along a volume segment.
    ScatterDistance = 9,

    /// Choice of a closure by the single path walker.
    BsdfPick = 10,

    /// Choice of a subsurface hit.
    BssrdfPick = 11,
}

/// Number of dimensions consumed by one bounce.
pub const BOUNCE_DIMENSIONS: u32 = 12;

/// Number of dimensions consumed by the camera before the first bounce.
pub const BASE_DIMENSIONS: u32 = 4;

/// A source of well distributed sample values.
pub trait SampleSequence: Sync {
    /// Returns a value in [0, 1) for a sample and dimension.
    ///
    /// * `rng_hash`    - Per pixel (or per branch) scramble.
    /// * `sample`      - Sample index.
    /// * `num_samples` - Total number of samples.
    /// * `dimension`   - Dimension.
    fn sample_1d(&self, rng_hash: u32, sample: u32, num_samples: u32, dimension: u32) -> Float;

    /// Returns a pair of values in [0, 1) using `dimension` and the one
    /// following it.
    ///
    /// * `rng_hash`    - Per pixel (or per branch) scramble.
    /// * `sample`      - Sample index.
    /// * `num_samples` - Total number of samples.
    /// * `dimension`   - First dimension.
    fn sample_2d(
        &self,
        rng_hash: u32,
        sample: u32,
        num_samples: u32,
        dimension: u32,
    ) -> (Float, Float) {
        (
            self.sample_1d(rng_hash, sample, num_samples, dimension),
            self.sample_1d(rng_hash, sample, num_samples, dimension + 1),
        )
    }
}

/// Hash based sequence. Each (hash, sample, dimension) triple seeds its own
/// PCG32 stream.
#[derive(Copy, Clone, Debug, Default)]
pub struct HashedSequence;

impl SampleSequence for HashedSequence {
    fn sample_1d(&self, rng_hash: u32, sample: u32, _num_samples: u32, dimension: u32) -> Float {
        let scramble = cmj_hash(rng_hash, dimension.wrapping_add(0x68bc21eb));
        let seed = ((cmj_hash(sample, scramble) as u64) << 32) | cmj_hash(dimension, scramble) as u64;
        RNG::new(seed).uniform_float()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    #[test]
    fn sequences_are_deterministic() {
        let seq = HashedSequence;
        assert_eq!(seq.sample_1d(7, 3, 16, 5), seq.sample_1d(7, 3, 16, 5));
        assert_ne!(seq.sample_1d(7, 3, 16, 5), seq.sample_1d(7, 4, 16, 5));
        assert_ne!(seq.sample_1d(7, 3, 16, 5), seq.sample_1d(8, 3, 16, 5));
    }

    #[test]
    fn hashed_sequence_mean_is_one_half() {
        let seq = HashedSequence;
        let n = 20000;
        let sum: Float = (0..n).map(|i| seq.sample_1d(12345, i, n, 2)).sum();
        let mean = sum / n as Float;
        assert!((mean - 0.5).abs() < 0.01, "mean = {}", mean);
    }

    #[test]
    fn branch_hashes_differ() {
        let h = 0xdeadbeef;
        assert_ne!(cmj_hash(h, 0), cmj_hash(h, 1));
        assert_ne!(cmj_hash(h, 1), cmj_hash(h, 2));
    }

    proptest! {
        #[test]
        fn rng_float_in_unit_interval(seed in any::<u64>()) {
            let mut rng = RNG::new(seed);
            for _ in 0..16 {
                let v = rng.uniform_float();
                prop_assert!((0.0..1.0).contains(&v));
            }
        }

        #[test]
        fn lcg_float_in_unit_interval(seed in any::<u32>()) {
            let mut state = lcg_init(seed);
            for _ in 0..16 {
                let v = lcg_step_float(&mut state);
                prop_assert!((0.0..1.0).contains(&v));
            }
        }

        #[test]
        fn sequence_values_in_unit_interval(
            hash in any::<u32>(),
            sample in 0u32..1024,
            dimension in 0u32..64,
        ) {
            let (u, v) = HashedSequence.sample_2d(hash, sample, 1024, dimension);
            prop_assert!((0.0..1.0).contains(&u));
            prop_assert!((0.0..1.0).contains(&v));
        }
    }
}
