//! Geometry

use crate::common::*;

mod matrix4x4;
mod ray;
mod vector3;

// Re-export
pub use matrix4x4::*;
pub use ray::*;
pub use vector3::*;

/// Scale of the offset applied to ray origins leaving a surface.
pub const RAY_EPSILON: Float = 1e-4;

/// Offsets a point along the geometric normal so rays spawned from it do
/// not re-intersect the surface they leave. The offset grows with the
/// magnitude of the point to stay above floating point error.
///
/// * `p`  - Point on the surface.
/// * `ng` - Geometric normal pointing to the side the ray leaves from.
pub fn offset_ray_origin(p: &Point3f, ng: &Vector3f) -> Point3f {
    let scale = max(1.0, p.abs().max_component());
    *p + *ng * (RAY_EPSILON * scale)
}

/// Returns a direction from spherical coordinates in the frame formed by
/// `x`, `y` and `z`.
///
/// * `sin_theta` - Sine of the polar angle.
/// * `cos_theta` - Cosine of the polar angle.
/// * `phi`       - Azimuthal angle.
/// * `x`         - First tangent.
/// * `y`         - Second tangent.
/// * `z`         - Frame axis.
pub fn spherical_direction_in_frame(
    sin_theta: Float,
    cos_theta: Float,
    phi: Float,
    x: &Vector3f,
    y: &Vector3f,
    z: &Vector3f,
) -> Vector3f {
    *x * (sin_theta * phi.cos()) + *y * (sin_theta * phi.sin()) + *z * cos_theta
}
