//! Henyey-Greenstein

use kernel::common::*;
use kernel::geometry::*;

/// Computes the Henyey-Greenstein phase function.
///
/// * `cos_theta` - Cosine of the angle between the direction back toward
///                 the previous vertex and the scattered direction.
/// * `g`         - Asymmetry parameter.
#[inline]
pub fn phase_hg(cos_theta: Float, g: Float) -> Float {
    let denom = 1.0 + g * g + 2.0 * g * cos_theta;
    INV_FOUR_PI * (1.0 - g * g) / (denom * denom.sqrt())
}

/// Samples a scattered direction from the Henyey-Greenstein phase function.
/// Returns the direction and its PDF, which equals the phase function.
///
/// * `wo` - Unit direction back toward the previous vertex.
/// * `g`  - Asymmetry parameter.
/// * `u`  - First random value.
/// * `v`  - Second random value.
pub fn sample_hg(wo: &Vector3f, g: Float, u: Float, v: Float) -> (Vector3f, Float) {
    // Compute cos(theta) for the sample.
    let cos_theta = if g.abs() < 1e-3 {
        1.0 - 2.0 * u
    } else {
        let sqr_term = (1.0 - g * g) / (1.0 + g - 2.0 * g * u);
        -(1.0 + g * g - sqr_term * sqr_term) / (2.0 * g)
    };

    // Compute the direction in the frame of wo.
    let sin_theta = max(0.0, 1.0 - cos_theta * cos_theta).sqrt();
    let phi = TWO_PI * v;
    let (v1, v2) = coordinate_system(wo);
    let wi = spherical_direction_in_frame(sin_theta, cos_theta, phi, &v1, &v2, wo);
    (wi, phase_hg(cos_theta, g))
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
