//! Sampling

use crate::common::*;
use crate::geometry::*;

/// Sample a point on a unit disk by mapping from a unit square to the unit
/// circle. The concentric mapping takes points in [-1, 1]^2 to unit disk by
/// uniformly mapping concentric squares to concentric circles.
///
/// * `u` - The random sample point.
pub fn concentric_sample_disk(u: (Float, Float)) -> (Float, Float) {
    // Map uniform random numbers to [-1,1]^2.
    let ox = 2.0 * u.0 - 1.0;
    let oy = 2.0 * u.1 - 1.0;

    // Handle degeneracy at the origin.
    if ox == 0.0 && oy == 0.0 {
        return (0.0, 0.0);
    }

    let (r, theta) = if ox.abs() > oy.abs() {
        (ox, 0.25 * PI * (oy / ox))
    } else {
        (oy, 0.5 * PI - 0.25 * PI * (ox / oy))
    };
    (r * theta.cos(), r * theta.sin())
}

/// Cosine-weighted sample of the hemisphere about `(0, 0, 1)`.
///
/// * `u` - The random sample point.
pub fn cosine_sample_hemisphere(u: (Float, Float)) -> Vector3f {
    let (x, y) = concentric_sample_disk(u);
    let z = max(0.0, 1.0 - x * x - y * y).sqrt();
    Vector3f::new(x, y, z)
}

/// Returns the PDF for cosine-weighted hemisphere sampling.
///
/// * `cos_theta` - Cosine of the angle to the hemisphere axis.
#[inline]
pub fn cosine_hemisphere_pdf(cos_theta: Float) -> Float {
    cos_theta * INV_PI
}

/// Cosine-weighted sample of the hemisphere about the normal `n`. Returns
/// the world space direction and its PDF.
///
/// * `n` - Unit normal.
/// * `u` - First random value.
/// * `v` - Second random value.
pub fn sample_cos_hemisphere(n: &Vector3f, u: Float, v: Float) -> (Vector3f, Float) {
    let local = cosine_sample_hemisphere((u, v));
    let (t, b) = coordinate_system(n);
    let d = t * local.x + b * local.y + *n * local.z;
    (d, cosine_hemisphere_pdf(local.z))
}

/// Uniform sample of the hemisphere about the normal `n`. Returns the
/// world space direction and its PDF.
///
/// * `n` - Unit normal.
/// * `u` - First random value.
/// * `v` - Second random value.
pub fn sample_uniform_hemisphere(n: &Vector3f, u: Float, v: Float) -> (Vector3f, Float) {
    let z = u;
    let r = max(0.0, 1.0 - z * z).sqrt();
    let phi = TWO_PI * v;
    let (t, b) = coordinate_system(n);
    let d = spherical_direction_in_frame(r, z, phi, &t, &b, n);
    (d, INV_TWO_PI)
}

/// Power heuristic for multiple importance sampling with β = 2.
///
/// * `nf`    - Number of samples taken with the first strategy.
/// * `f_pdf` - PDF of the first strategy.
/// * `ng`    - Number of samples taken with the second strategy.
/// * `g_pdf` - PDF of the second strategy.
#[inline]
pub fn power_heuristic(nf: u32, f_pdf: Float, ng: u32, g_pdf: Float) -> Float {
    let f = nf as Float * f_pdf;
    let g = ng as Float * g_pdf;
    let denom = f * f + g * g;
    if denom > 0.0 {
        (f * f) / denom
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
    use float_cmp::approx_eq;
    use proptest::prelude::*;

    proptest! {
        #[test]
        fn cos_hemisphere_stays_above_normal(
            u in 0.0f32..1.0f32,
            v in 0.0f32..1.0f32,
            nz in -1.0f32..1.0f32,
        ) {
            let n = Vector3f::new(0.3, nz, 0.5).normalize();
            let (d, pdf) = sample_cos_hemisphere(&n, u, v);
            prop_assert!(d.dot(&n) >= -0.0001);
            prop_assert!(approx_eq!(f32, d.length(), 1.0, epsilon = 0.001));
            prop_assert!(approx_eq!(f32, pdf, max(0.0, d.dot(&n)) * INV_PI, epsilon = 0.001));
        }

        #[test]
        fn uniform_hemisphere_stays_above_normal(u in 0.0f32..1.0f32, v in 0.0f32..1.0f32) {
            let n = Vector3f::new(0.0, 0.0, -1.0);
            let (d, pdf) = sample_uniform_hemisphere(&n, u, v);
            prop_assert!(d.dot(&n) >= -0.0001);
            prop_assert!(approx_eq!(f32, pdf, INV_TWO_PI, epsilon = 0.00001));
        }

        #[test]
        fn power_heuristic_weights_sum_to_one(a in 0.01f32..10.0f32, b in 0.01f32..10.0f32) {
            let w = power_heuristic(1, a, 1, b) + power_heuristic(1, b, 1, a);
            prop_assert!(approx_eq!(f32, w, 1.0, epsilon = 0.0001));
        }
    }

    #[test]
    fn power_heuristic_with_zero_pdfs() {
        assert_eq!(power_heuristic(1, 0.0, 1, 0.0), 0.0);
        assert_eq!(power_heuristic(1, 1.0, 1, 0.0), 1.0);
    }
}
