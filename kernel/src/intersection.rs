//! Scene Intersection

use crate::common::*;
use crate::geometry::*;
use crate::path_state::PathRayFlags;

/// Linking mask that includes everything.
pub const LINK_ALL: u32 = u32::MAX;

/// A ray hit.
#[derive(Copy, Clone, Debug, Default, PartialEq)]
pub struct Intersection {
    /// Distance along the ray.
    pub t: Float,

    /// First barycentric coordinate.
    pub u: Float,

    /// Second barycentric coordinate.
    pub v: Float,

    /// Primitive index.
    pub prim: u32,

    /// Object index.
    pub object: ObjectId,
}

/// Ray queries against the scene's acceleration structure.
pub trait SceneIntersector: Sync {
    /// Returns the closest hit within the ray extent.
    ///
    /// * `ray`            - The ray.
    /// * `visibility`     - Only objects visible to these ray types.
    /// * `shadow_linking` - Only objects in this linking mask.
    fn intersect(&self, ray: &Ray, visibility: PathRayFlags, shadow_linking: u32)
        -> Option<Intersection>;

    /// Records transparent hits along a shadow ray. Returns true if the
    /// ray is blocked, either by an opaque surface or by more than
    /// `max_hits` transparent ones. Hits are appended in traversal order.
    ///
    /// * `ray`            - The shadow ray.
    /// * `hits`           - Receives the hits.
    /// * `max_hits`       - Maximum number of transparent hits.
    /// * `shadow_linking` - Only objects in this linking mask.
    fn intersect_shadow_all(
        &self,
        ray: &Ray,
        hits: &mut Vec<Intersection>,
        max_hits: usize,
        shadow_linking: u32,
    ) -> bool;

    /// Returns the closest hit on a volume boundary.
    ///
    /// * `ray`        - The ray.
    /// * `visibility` - Only objects visible to these ray types.
    fn intersect_volume(&self, ray: &Ray, visibility: PathRayFlags) -> Option<Intersection> {
        self.intersect(ray, visibility, LINK_ALL)
    }
}
