//! Shadow Depth Maps
//!
//! Per-light depth textures filled lazily while rendering. A texel holds 0
//! until a path needs it; the first path to do so traces one ray from the
//! light and stores the distance to the nearest occluder. Concurrent paths
//! may compute the same texel; the value only depends on the scene so the
//! last write wins.

use crate::common::*;
use crate::geometry::*;
use crate::parallel::AtomicFloat;
use std::sync::atomic::Ordering;

/// Lazily filled depth texture of one light.
#[derive(Clone, Debug)]
pub struct ShadowDepthMap {
    /// Maps world space to texture space; x and y in [0, 1] lie on the map.
    transform: Matrix4x4,

    /// Texels per side.
    resolution: usize,

    texels: Vec<AtomicFloat>,
}

impl ShadowDepthMap {
    /// Returns an empty depth map.
    ///
    /// * `transform`  - World to texture space transform.
    /// * `resolution` - Texels per side.
    pub fn new(transform: Matrix4x4, resolution: usize) -> Self {
        let resolution = max(resolution, 1);
        Self {
            transform,
            resolution,
            texels: (0..resolution * resolution)
                .map(|_| AtomicFloat::default())
                .collect(),
        }
    }

    /// Returns the texel a world space point projects to, or `None` when it
    /// falls outside the map.
    ///
    /// * `p` - World space point.
    pub fn texel_index(&self, p: &Point3f) -> Option<usize> {
        let uv = self.transform.transform_perspective(p);
        if !(0.0..=1.0).contains(&uv.x) || !(0.0..=1.0).contains(&uv.y) {
            return None;
        }
        let n = self.resolution;
        let x = min((uv.x * n as Float) as usize, n - 1);
        let y = min((uv.y * n as Float) as usize, n - 1);
        Some(y * n + x)
    }

    /// Returns the cached depth of a texel if it was computed.
    ///
    /// * `texel` - Texel index.
    pub fn depth(&self, texel: usize) -> Option<Float> {
        let d = self.texels[texel].load(Ordering::Acquire);
        if d > 0.0 {
            Some(d)
        } else {
            None
        }
    }

    /// Caches the depth of a texel.
    ///
    /// * `texel` - Texel index.
    /// * `depth` - Distance from the light to the nearest occluder.
    pub fn store(&self, texel: usize, depth: Float) {
        self.texels[texel].store(max(depth, Float::MIN_POSITIVE), Ordering::Release);
    }

    /// Returns the cached depth of a texel, computing it on first access.
    ///
    /// * `texel` - Texel index.
    /// * `f`     - Computes the depth.
    pub fn depth_or_insert_with<F: FnOnce() -> Float>(&self, texel: usize, f: F) -> Float {
        match self.depth(texel) {
            Some(d) => d,
            None => {
                let d = f();
                self.store(texel, d);
                d
            }
        }
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
