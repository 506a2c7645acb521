//! Common

use num_traits::Num;

/// Use 32-bit precision for floating point numbers.
pub type Float = f32;

/// Default signed integer to 32-bit.
pub type Int = i32;

/// Identifies an object instance in the scene.
pub type ObjectId = u32;

/// Identifies a shader in the scene.
pub type ShaderId = u32;

/// Object id used for entries that do not belong to any object, such as
/// the world volume.
pub const OBJECT_NONE: ObjectId = u32::MAX;

/// Infinty (∞)
pub const INFINITY: Float = Float::INFINITY;

/// PI (π)
pub const PI: Float = std::f32::consts::PI;

/// 1/PI (1/π)
pub const INV_PI: Float = 1.0 / PI;

/// 2*PI (2π)
pub const TWO_PI: Float = PI * 2.0;

/// 1/2*PI (1/2π)
pub const INV_TWO_PI: Float = 1.0 / TWO_PI;

/// 1/4*PI (1/4π)
pub const INV_FOUR_PI: Float = 1.0 / (PI * 4.0);

/// Shadow Epsilon
pub const SHADOW_EPSILON: Float = 0.0001;

/// The largest floating point value less than 1.
pub const ONE_MINUS_EPSILON: Float = hexf32!("0x1.fffffep-1");

/// Returns the minimum of 2 numbers.
///
/// * `a` - First number.
/// * `b` - Second number.
#[inline(always)]
pub fn min<T>(a: T, b: T) -> T
where
    T: Num + PartialOrd + Copy,
{
    if a < b {
        a
    } else {
        b
    }
}

/// Returns the maximum of 2 numbers.
///
/// * `a` - First number.
/// * `b` - Second number.
#[inline(always)]
pub fn max<T>(a: T, b: T) -> T
where
    T: Num + PartialOrd + Copy,
{
    if a > b {
        a
    } else {
        b
    }
}

/// Clamps a value to the range [low, high].
///
/// * `val` - The value to clamp.
/// * `low` - Lower bound.
/// * `high` - Upper bound.
#[inline(always)]
pub fn clamp<T>(val: T, low: T, high: T) -> T
where
    T: PartialOrd + Copy,
{
    if val < low {
        low
    } else if val > high {
        high
    } else {
        val
    }
}

/// Rounds a scaled sample count up to a whole number of samples. Zero and
/// negative inputs produce no samples.
///
/// * `f` - The scaled count.
#[inline(always)]
pub fn ceil_to_u32(f: Float) -> u32 {
    if f > 0.0 {
        f.ceil() as u32
    } else {
        0
    }
}

/// Divides `a` by `b` returning 0 when `b` is 0.
///
/// * `a` - Dividend.
/// * `b` - Divisor.
#[inline(always)]
pub fn safe_divide(a: Float, b: Float) -> Float {
    if b != 0.0 {
        a / b
    } else {
        0.0
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
    fn ceil_to_u32_rounds_up_partial_samples() {
        assert_eq!(ceil_to_u32(0.0), 0);
        assert_eq!(ceil_to_u32(-3.0), 0);
        assert_eq!(ceil_to_u32(0.25), 1);
        assert_eq!(ceil_to_u32(4.0), 4);
        assert_eq!(ceil_to_u32(4.01), 5);
    }

    #[test]
    fn one_minus_epsilon_is_below_one() {
        assert!(ONE_MINUS_EPSILON < 1.0);
        assert!(ONE_MINUS_EPSILON > 0.9999);
    }

    #[test]
    fn safe_divide_by_zero() {
        assert_eq!(safe_divide(1.0, 0.0), 0.0);
        assert_eq!(safe_divide(1.0, 2.0), 0.5);
    }

    proptest! {
        #[test]
        fn clamp_stays_in_range(v in -100.0f32..100.0f32, lo in -10.0f32..0.0f32, hi in 0.0f32..10.0f32) {
            let c = clamp(v, lo, hi);
            prop_assert!(c >= lo && c <= hi);
        }

        #[test]
        fn min_max_order(a in -100.0f32..100.0f32, b in -100.0f32..100.0f32) {
            prop_assert!(min(a, b) <= max(a, b));
        }
    }
}
