//! 4x4 Matrix

use super::*;
use std::ops::Mul;

/// A 4x4 matrix used for projective transforms such as shadow map lookups.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct Matrix4x4 {
    pub m: [[Float; 4]; 4],
}

impl Default for Matrix4x4 {
    fn default() -> Self {
        Self::IDENTITY
    }
}

impl Matrix4x4 {
    /// The identity matrix.
    pub const IDENTITY: Self = Self {
        m: [
            [1.0, 0.0, 0.0, 0.0],
            [0.0, 1.0, 0.0, 0.0],
            [0.0, 0.0, 1.0, 0.0],
            [0.0, 0.0, 0.0, 1.0],
        ],
    };

    /// Create a new matrix from rows.
    ///
    /// * `m` - Row major values.
    pub fn new(m: [[Float; 4]; 4]) -> Self {
        Self { m }
    }

    /// Returns a translation matrix.
    ///
    /// * `delta` - Translation.
    pub fn translate(delta: &Vector3f) -> Self {
        let mut r = Self::IDENTITY;
        r.m[0][3] = delta.x;
        r.m[1][3] = delta.y;
        r.m[2][3] = delta.z;
        r
    }

    /// Returns a scaling matrix.
    ///
    /// * `x` - Scale along x.
    /// * `y` - Scale along y.
    /// * `z` - Scale along z.
    pub fn scale(x: Float, y: Float, z: Float) -> Self {
        let mut r = Self::IDENTITY;
        r.m[0][0] = x;
        r.m[1][1] = y;
        r.m[2][2] = z;
        r
    }

    /// Transforms a point with a homogeneous divide. Points mapping to
    /// `w = 0` are returned without the divide.
    ///
    /// * `p` - The point.
    pub fn transform_perspective(&self, p: &Point3f) -> Point3f {
        let m = &self.m;
        let x = m[0][0] * p.x + m[0][1] * p.y + m[0][2] * p.z + m[0][3];
        let y = m[1][0] * p.x + m[1][1] * p.y + m[1][2] * p.z + m[1][3];
        let z = m[2][0] * p.x + m[2][1] * p.y + m[2][2] * p.z + m[2][3];
        let w = m[3][0] * p.x + m[3][1] * p.y + m[3][2] * p.z + m[3][3];
        if w == 1.0 || w == 0.0 {
            Point3f::new(x, y, z)
        } else {
            Point3f::new(x / w, y / w, z / w)
        }
    }
}

impl Mul for Matrix4x4 {
    type Output = Self;

    fn mul(self, other: Self) -> Self::Output {
        let mut r = [[0.0; 4]; 4];
        for (i, row) in r.iter_mut().enumerate() {
            for (j, v) in row.iter_mut().enumerate() {
                *v = (0..4).map(|k| self.m[i][k] * other.m[k][j]).sum();
            }
        }
        Self::new(r)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
