//! RGB Spectrum

use crate::common::*;
use std::fmt;
use std::ops::{
    Add, AddAssign, Div, DivAssign, Index, IndexMut, Mul, MulAssign, Neg, Sub, SubAssign,
};

/// Number of spectral samples to use for `RGBSpectrum`.
pub const RGB_SAMPLES: usize = 3;

/// RGBSpectrum represents radiance and throughput with red, green and blue
/// components.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct RGBSpectrum {
    /// The sampled spectral values.
    c: [Float; RGB_SAMPLES],
}

/// The spectrum representation used throughout the renderer.
pub type Spectrum = RGBSpectrum;

impl RGBSpectrum {
    /// Black.
    pub const ZERO: Self = Self { c: [0.0; RGB_SAMPLES] };

    /// White.
    pub const ONE: Self = Self { c: [1.0; RGB_SAMPLES] };

    /// Create a new `RGBSpectrum` with a constant value across all
    /// channels.
    ///
    /// * `v` - Constant value.
    pub const fn new(v: Float) -> Self {
        Self { c: [v; RGB_SAMPLES] }
    }

    /// Create a new `RGBSpectrum` from individual channels.
    ///
    /// * `r` - Red.
    /// * `g` - Green.
    /// * `b` - Blue.
    pub const fn rgb(r: Float, g: Float, b: Float) -> Self {
        Self { c: [r, g, b] }
    }

    /// Returns true if all channels are zero.
    pub fn is_black(&self) -> bool {
        self.c.iter().all(|&v| v == 0.0)
    }

    /// Returns true if any channel is NaN.
    pub fn has_nans(&self) -> bool {
        self.c.iter().any(|v| v.is_nan())
    }

    /// Returns the mean of the channels.
    pub fn average(&self) -> Float {
        self.c.iter().sum::<Float>() / RGB_SAMPLES as Float
    }

    /// Returns the largest channel value.
    pub fn max_component_value(&self) -> Float {
        self.c.iter().fold(-INFINITY, |m, &v| max(m, v))
    }

    /// Returns the largest absolute channel value.
    pub fn max_abs_component_value(&self) -> Float {
        self.c.iter().fold(0.0, |m, &v| max(m, v.abs()))
    }

    /// Applies `e^x` to each channel.
    pub fn exp(&self) -> Self {
        self.map(|v| v.exp())
    }

    /// Clamps each channel to [low, high].
    ///
    /// * `low`  - Lower bound.
    /// * `high` - Upper bound.
    pub fn clamp(&self, low: Float, high: Float) -> Self {
        self.map(|v| clamp(v, low, high))
    }

    /// Divides channel by channel, yielding zero where the divisor is zero.
    ///
    /// * `other` - Divisor.
    pub fn safe_divide(&self, other: &Self) -> Self {
        Self::rgb(
            safe_divide(self.c[0], other.c[0]),
            safe_divide(self.c[1], other.c[1]),
            safe_divide(self.c[2], other.c[2]),
        )
    }

    /// Replaces non-finite channels with zero.
    pub fn ensure_finite(&self) -> Self {
        self.map(|v| if v.is_finite() { v } else { 0.0 })
    }

    /// Applies a function to every channel.
    ///
    /// * `f` - The function.
    pub fn map<F: Fn(Float) -> Float>(&self, f: F) -> Self {
        Self::rgb(f(self.c[0]), f(self.c[1]), f(self.c[2]))
    }
}

impl Add for RGBSpectrum {
    type Output = Self;

    fn add(self, other: Self) -> Self::Output {
        Self::rgb(
            self.c[0] + other.c[0],
            self.c[1] + other.c[1],
            self.c[2] + other.c[2],
        )
    }
}

impl AddAssign for RGBSpectrum {
    fn add_assign(&mut self, other: Self) {
        *self = *self + other;
    }
}

impl Sub for RGBSpectrum {
    type Output = Self;

    fn sub(self, other: Self) -> Self::Output {
        Self::rgb(
            self.c[0] - other.c[0],
            self.c[1] - other.c[1],
            self.c[2] - other.c[2],
        )
    }
}

impl SubAssign for RGBSpectrum {
    fn sub_assign(&mut self, other: Self) {
        *self = *self - other;
    }
}

impl Mul for RGBSpectrum {
    type Output = Self;

    fn mul(self, other: Self) -> Self::Output {
        Self::rgb(
            self.c[0] * other.c[0],
            self.c[1] * other.c[1],
            self.c[2] * other.c[2],
        )
    }
}

impl Mul<Float> for RGBSpectrum {
    type Output = Self;

    fn mul(self, f: Float) -> Self::Output {
        self.map(|v| v * f)
    }
}

impl Mul<RGBSpectrum> for Float {
    type Output = RGBSpectrum;

    fn mul(self, s: RGBSpectrum) -> Self::Output {
        s * self
    }
}

impl MulAssign for RGBSpectrum {
    fn mul_assign(&mut self, other: Self) {
        *self = *self * other;
    }
}

impl MulAssign<Float> for RGBSpectrum {
    fn mul_assign(&mut self, f: Float) {
        *self = *self * f;
    }
}

impl Div<Float> for RGBSpectrum {
    type Output = Self;

    fn div(self, f: Float) -> Self::Output {
        debug_assert!(f != 0.0);
        self.map(|v| v / f)
    }
}

impl DivAssign<Float> for RGBSpectrum {
    fn div_assign(&mut self, f: Float) {
        *self = *self / f;
    }
}

impl Neg for RGBSpectrum {
    type Output = Self;

    fn neg(self) -> Self::Output {
        self.map(|v| -v)
    }
}

impl Index<usize> for RGBSpectrum {
    type Output = Float;

    fn index(&self, index: usize) -> &Self::Output {
        &self.c[index]
    }
}

impl IndexMut<usize> for RGBSpectrum {
    fn index_mut(&mut self, i: usize) -> &mut Self::Output {
        &mut self.c[i]
    }
}

impl fmt::Display for RGBSpectrum {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}, {}, {}]", self.c[0], self.c[1], self.c[2])
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

    #[test]
    fn constants() {
        assert!(Spectrum::ZERO.is_black());
        assert!(!Spectrum::ONE.is_black());
        assert_eq!(Spectrum::ONE.average(), 1.0);
    }

    #[test]
    fn safe_divide_skips_zero_channels() {
        let s = Spectrum::rgb(1.0, 2.0, 3.0).safe_divide(&Spectrum::rgb(2.0, 0.0, 3.0));
        assert_eq!(s, Spectrum::rgb(0.5, 0.0, 1.0));
    }

    #[test]
    fn ensure_finite_drops_nan_and_inf() {
        let s = Spectrum::rgb(Float::NAN, INFINITY, 2.0).ensure_finite();
        assert_eq!(s, Spectrum::rgb(0.0, 0.0, 2.0));
    }

    proptest! {
        #[test]
        fn max_component_bounds_average(
            r in 0.0f32..10.0f32,
            g in 0.0f32..10.0f32,
            b in 0.0f32..10.0f32,
        ) {
            let s = Spectrum::rgb(r, g, b);
            prop_assert!(s.max_component_value() >= s.average() - 0.0001);
        }

        #[test]
        fn scalar_product_commutes(v in -10.0f32..10.0f32, f in -10.0f32..10.0f32) {
            let s = Spectrum::rgb(v, 2.0 * v, 0.5);
            let a = s * f;
            let b = f * s;
            prop_assert!(approx_eq!(f32, a[0], b[0], epsilon = 0.0001));
            prop_assert!(approx_eq!(f32, a[2], b[2], epsilon = 0.0001));
        }
    }
}
