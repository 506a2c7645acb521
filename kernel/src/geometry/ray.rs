//! Rays

use super::*;

/// A Ray
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Ray {
    /// Origin.
    pub o: Point3f,

    /// Direction.
    pub d: Vector3f,

    /// Maximum extent of the ray. `INFINITY` for unbounded rays.
    pub t_max: Float,

    /// Time value.
    pub time: Float,
}

impl Default for Ray {
    /// Returns an unbounded ray at the origin pointing down +z.
    fn default() -> Self {
        Self::new(
            Point3f::zero(),
            Vector3f::new(0.0, 0.0, 1.0),
            INFINITY,
            0.0,
        )
    }
}

impl Ray {
    /// Returns a new ray.
    ///
    /// * `o`     - Origin.
    /// * `d`     - Direction.
    /// * `t_max` - Maximum extent of the ray.
    /// * `time`  - Time value.
    pub fn new(o: Point3f, d: Vector3f, t_max: Float, time: Float) -> Self {
        Self { o, d, t_max, time }
    }

    /// Returns a ray from `p0` whose extent ends exactly at `p1`.
    ///
    /// * `p0`   - Origin.
    /// * `p1`   - End point.
    /// * `time` - Time value.
    pub fn segment(p0: Point3f, p1: Point3f, time: Float) -> Self {
        let (d, t_max) = (p1 - p0).normalize_len();
        Self::new(p0, d, t_max, time)
    }

    /// Returns the point at a given distance along the ray.
    ///
    /// * `t` - The distance.
    pub fn at(&self, t: Float) -> Point3f {
        self.o + self.d * t
    }

    /// Returns true if the ray has a finite extent.
    pub fn is_bounded(&self) -> bool {
        self.t_max < INFINITY
    }

    /// Moves the origin to `p`. Bounded rays keep their end point `end` and
    /// have their direction and extent recomputed; unbounded rays keep
    /// their direction.
    ///
    /// * `p`   - New origin.
    /// * `end` - End point of a bounded ray.
    pub fn advance_to(&mut self, p: Point3f, end: &Point3f) {
        if self.is_bounded() {
            let (d, t_max) = (*end - p).normalize_len();
            self.d = d;
            self.t_max = t_max;
        }
        self.o = p;
    }

    /// Returns true if the origin or direction has NaNs.
    pub fn has_nans(&self) -> bool {
        self.o.has_nans() || self.d.has_nans() || self.t_max.is_nan()
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
