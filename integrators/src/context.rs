//! Render Context

use kernel::intersection::SceneIntersector;
use kernel::light::LightSystem;
use kernel::rng::SampleSequence;
use kernel::settings::IntegratorSettings;
use kernel::shading::ShadingSystem;
use kernel::volume::VolumeSystem;

/// The scene services and settings shared by every path of a render. All
/// of them are read-only while paths are traced.
#[derive(Copy, Clone)]
pub struct RenderContext<'a> {
    /// Ray queries.
    pub scene: &'a dyn SceneIntersector,

    /// Surface and background shading.
    pub shading: &'a dyn ShadingSystem,

    /// Light sampling.
    pub lights: &'a dyn LightSystem,

    /// Participating media.
    pub volumes: &'a dyn VolumeSystem,

    /// Random sequence.
    pub sequence: &'a dyn SampleSequence,

    /// Integrator settings.
    pub settings: &'a IntegratorSettings,
}

impl<'a> RenderContext<'a> {
    /// Create a new `RenderContext`.
    ///
    /// * `scene`    - Ray queries.
    /// * `shading`  - Surface and background shading.
    /// * `lights`   - Light sampling.
    /// * `volumes`  - Participating media.
    /// * `sequence` - Random sequence.
    /// * `settings` - Integrator settings.
    pub fn new(
        scene: &'a dyn SceneIntersector,
        shading: &'a dyn ShadingSystem,
        lights: &'a dyn LightSystem,
        volumes: &'a dyn VolumeSystem,
        sequence: &'a dyn SampleSequence,
        settings: &'a IntegratorSettings,
    ) -> Self {
        Self {
            scene,
            shading,
            lights,
            volumes,
            sequence,
            settings,
        }
    }

    /// Returns true if volumes are enabled and the stack of `stack_len`
    /// entries has anything to attenuate with.
    ///
    /// * `stack_len` - Number of volume stack entries.
    pub(crate) fn has_volumes(&self, stack_len: usize) -> bool {
        self.settings.features.volumes && stack_len > 0
    }
}
