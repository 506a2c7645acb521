//! Lights

use crate::common::*;
use crate::geometry::*;
use crate::intersection::LINK_ALL;
use crate::shadow_map::ShadowDepthMap;
use crate::spectrum::*;

/// A sampled point on a light as seen from a shading point.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct LightSample {
    /// Index of the light.
    pub light: usize,

    /// Position on the light.
    pub p: Point3f,

    /// Unit direction from the shading point toward the light.
    pub d: Vector3f,

    /// Distance to the light; `INFINITY` for distant lights.
    pub t: Float,

    /// Emitted radiance arriving at the shading point, before dividing by
    /// the PDF.
    pub eval: Spectrum,

    /// Probability density of the sample, light selection included.
    pub pdf: Float,

    /// True for lights that cannot be hit by BSDF sampling.
    pub is_delta: bool,
}

/// The set of lights in the scene.
pub trait LightSystem: Sync {
    /// Number of lights.
    fn num_lights(&self) -> usize;

    /// Number of samples taken from a light when sampling all lights.
    ///
    /// * `light` - Light index.
    fn light_samples(&self, _light: usize) -> u32 {
        1
    }

    /// Linking mask of a light; it only affects objects sharing a bit.
    ///
    /// * `light` - Light index.
    fn light_linking(&self, _light: usize) -> u32 {
        LINK_ALL
    }

    /// Samples a point on one light.
    ///
    /// * `light` - Light index.
    /// * `u`     - First random value.
    /// * `v`     - Second random value.
    /// * `p`     - Shading point.
    /// * `time`  - Time value.
    fn sample(&self, light: usize, u: Float, v: Float, p: &Point3f, time: Float)
        -> Option<LightSample>;

    /// Picks one light uniformly and samples it. The PDF includes the
    /// selection probability.
    ///
    /// * `u_pick` - Random value choosing the light.
    /// * `u`      - First random value.
    /// * `v`      - Second random value.
    /// * `p`      - Shading point.
    /// * `time`   - Time value.
    fn sample_one(&self, u_pick: Float, u: Float, v: Float, p: &Point3f, time: Float)
        -> Option<LightSample> {
        let n = self.num_lights();
        if n == 0 {
            return None;
        }
        let light = min((u_pick * n as Float) as usize, n - 1);
        self.sample(light, u, v, p, time).map(|mut ls| {
            ls.pdf /= n as Float;
            ls
        })
    }

    /// Depth map accelerating shadow queries toward a light.
    ///
    /// * `light` - Light index.
    fn shadow_map(&self, _light: usize) -> Option<&ShadowDepthMap> {
        None
    }
}
