//! Integrator Settings

use crate::common::*;
use crate::paramset::ParamSet;
use crate::volume::VOLUME_STACK_SIZE;

/// How shadow rays through transparent surfaces are resolved.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum ShadowStrategy {
    /// Record every hit along the ray with one query, sort them and walk
    /// them front to back.
    RecordAll,

    /// Step from hit to hit with single hit queries.
    StepThrough,
}

/// Execution model the settings are tuned for.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum DeviceKind {
    Cpu,
    Gpu,
}

/// Optional kernel capabilities. A disabled capability skips the matching
/// stage of the integrator entirely.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct KernelFeatures {
    pub volumes: bool,
    pub subsurface: bool,
    pub ao: bool,
    pub emission: bool,
    pub holdout: bool,
    pub shadow_tricks: bool,
    pub background: bool,
    pub decoupled_volumes: bool,
    pub denoising_features: bool,
}

impl Default for KernelFeatures {
    fn default() -> Self {
        Self {
            volumes: true,
            subsurface: true,
            ao: true,
            emission: true,
            holdout: true,
            shadow_tricks: true,
            background: true,
            decoupled_volumes: true,
            denoising_features: false,
        }
    }
}

/// Every tunable consulted by the branched path integrator.
#[derive(Clone, Debug, PartialEq)]
pub struct IntegratorSettings {
    /// Number of anti-aliasing samples per pixel.
    pub aa_samples: u32,

    pub diffuse_samples: u32,
    pub glossy_samples: u32,
    pub transmission_samples: u32,
    pub ao_samples: u32,
    pub subsurface_samples: u32,
    pub volume_samples: u32,

    pub max_bounce: u32,
    pub min_bounce: u32,
    pub max_diffuse_bounce: u32,
    pub max_glossy_bounce: u32,
    pub max_transmission_bounce: u32,
    pub max_volume_bounce: u32,
    pub transparent_max_bounce: u32,
    pub transparent_min_bounce: u32,

    /// Upper bound on volume-only surfaces crossed between two bounces.
    pub max_volume_bounds_bounce: u32,

    pub use_direct_light: bool,
    pub sample_all_lights_direct: bool,
    pub sample_all_lights_indirect: bool,
    pub transparent_shadows: bool,
    pub use_ambient_occlusion: bool,
    pub ao_factor: Float,
    pub ao_distance: Float,

    /// Camera rays that escape contribute to alpha instead of colour.
    pub background_transparent: bool,

    /// Shader of the world volume, if any.
    pub background_volume_shader: Option<ShaderId>,

    /// Background is still evaluated for its own pass when transparent.
    pub pass_background: bool,

    /// Split radiance into light passes.
    pub use_light_pass: bool,

    pub shadow_strategy: ShadowStrategy,
    pub volume_stack_size: usize,
    pub volume_stack_growable: bool,
    pub features: KernelFeatures,
}

impl Default for IntegratorSettings {
    fn default() -> Self {
        Self::for_device(DeviceKind::Cpu)
    }
}

impl IntegratorSettings {
    /// Returns the preset for a device.
    ///
    /// * `device` - The device kind.
    pub fn for_device(device: DeviceKind) -> Self {
        let cpu = device == DeviceKind::Cpu;
        Self {
            aa_samples: 1,
            diffuse_samples: 1,
            glossy_samples: 1,
            transmission_samples: 1,
            ao_samples: 1,
            subsurface_samples: 1,
            volume_samples: 1,
            max_bounce: 12,
            min_bounce: 3,
            max_diffuse_bounce: 4,
            max_glossy_bounce: 4,
            max_transmission_bounce: 12,
            max_volume_bounce: 2,
            transparent_max_bounce: 8,
            transparent_min_bounce: 8,
            max_volume_bounds_bounce: 1024,
            use_direct_light: true,
            sample_all_lights_direct: true,
            sample_all_lights_indirect: true,
            transparent_shadows: true,
            use_ambient_occlusion: false,
            ao_factor: 1.0,
            ao_distance: 10.0,
            background_transparent: false,
            background_volume_shader: None,
            pass_background: false,
            use_light_pass: false,
            shadow_strategy: if cpu {
                ShadowStrategy::RecordAll
            } else {
                ShadowStrategy::StepThrough
            },
            volume_stack_size: VOLUME_STACK_SIZE,
            volume_stack_growable: cpu,
            features: KernelFeatures {
                decoupled_volumes: cpu,
                ..KernelFeatures::default()
            },
        }
    }
}

/// Reads a sample count or bounce limit, reporting and replacing negative
/// values.
///
/// * `params`  - Parameter set.
/// * `name`    - Parameter name.
/// * `default` - Value used when missing or invalid.
fn find_count(params: &ParamSet, name: &str, default: u32) -> u32 {
    let n = params.find_one_int(name, default as Int);
    if n < 0 {
        error!("'{}' must not be negative ({}). Using {}.", name, n, default);
        default
    } else {
        n as u32
    }
}

impl From<&ParamSet> for IntegratorSettings {
    /// Create `IntegratorSettings` from a `ParamSet`. Invalid values are
    /// reported and replaced by the device preset.
    ///
    /// * `params` - Parameter set.
    fn from(params: &ParamSet) -> Self {
        let device = match params.find_one_string("device", String::from("cpu")).as_str() {
            "cpu" => DeviceKind::Cpu,
            "gpu" => DeviceKind::Gpu,
            other => {
                error!("Unknown device '{}'. Using 'cpu'.", other);
                DeviceKind::Cpu
            }
        };
        let preset = Self::for_device(device);

        let shadow_strategy = match params.find_one_string("shadowstrategy", String::new()).as_str() {
            "" => preset.shadow_strategy,
            "recordall" => ShadowStrategy::RecordAll,
            "stepthrough" => ShadowStrategy::StepThrough,
            other => {
                error!("Unknown shadow strategy '{}'. Using device default.", other);
                preset.shadow_strategy
            }
        };

        let mut volume_samples = find_count(params, "volumesamples", preset.volume_samples);
        if volume_samples == 0 {
            warn!("'volumesamples' must be at least 1. Using 1.");
            volume_samples = 1;
        }

        let mut volume_stack_size =
            params.find_one_int("volumestacksize", preset.volume_stack_size as Int);
        if volume_stack_size < 1 {
            error!(
                "'volumestacksize' must be positive ({}). Using {}.",
                volume_stack_size, VOLUME_STACK_SIZE
            );
            volume_stack_size = VOLUME_STACK_SIZE as Int;
        }

        let background_volume_shader = params.find_one_int("backgroundvolume", -1);

        let mut ao_distance = params.find_one_float("aodistance", preset.ao_distance);
        if ao_distance <= 0.0 {
            error!("'aodistance' must be positive ({}). Using {}.", ao_distance, preset.ao_distance);
            ao_distance = preset.ao_distance;
        }

        let max_bounce = find_count(params, "maxbounce", preset.max_bounce);
        let mut min_bounce = find_count(params, "minbounce", preset.min_bounce);
        if min_bounce > max_bounce {
            warn!("'minbounce' {} exceeds 'maxbounce' {}. Clamping.", min_bounce, max_bounce);
            min_bounce = max_bounce;
        }

        let transparent_max_bounce =
            find_count(params, "transparentmaxbounce", preset.transparent_max_bounce);
        let transparent_min_bounce = min(
            find_count(params, "transparentminbounce", preset.transparent_min_bounce),
            transparent_max_bounce,
        );

        let features = KernelFeatures {
            volumes: params.find_one_bool("volumes", preset.features.volumes),
            subsurface: params.find_one_bool("subsurface", preset.features.subsurface),
            ao: params.find_one_bool("ao", preset.features.ao),
            emission: params.find_one_bool("emission", preset.features.emission),
            holdout: params.find_one_bool("holdout", preset.features.holdout),
            shadow_tricks: params.find_one_bool("shadowtricks", preset.features.shadow_tricks),
            background: params.find_one_bool("background", preset.features.background),
            decoupled_volumes: params
                .find_one_bool("decoupledvolumes", preset.features.decoupled_volumes),
            denoising_features: params
                .find_one_bool("denoisingfeatures", preset.features.denoising_features),
        };

        let settings = Self {
            aa_samples: max(1, find_count(params, "aasamples", preset.aa_samples)),
            diffuse_samples: find_count(params, "diffusesamples", preset.diffuse_samples),
            glossy_samples: find_count(params, "glossysamples", preset.glossy_samples),
            transmission_samples: find_count(
                params,
                "transmissionsamples",
                preset.transmission_samples,
            ),
            ao_samples: find_count(params, "aosamples", preset.ao_samples),
            subsurface_samples: find_count(params, "subsurfacesamples", preset.subsurface_samples),
            volume_samples,
            max_bounce,
            min_bounce,
            max_diffuse_bounce: find_count(params, "maxdiffusebounce", preset.max_diffuse_bounce),
            max_glossy_bounce: find_count(params, "maxglossybounce", preset.max_glossy_bounce),
            max_transmission_bounce: find_count(
                params,
                "maxtransmissionbounce",
                preset.max_transmission_bounce,
            ),
            max_volume_bounce: find_count(params, "maxvolumebounce", preset.max_volume_bounce),
            transparent_max_bounce,
            transparent_min_bounce,
            max_volume_bounds_bounce: preset.max_volume_bounds_bounce,
            use_direct_light: params.find_one_bool("directlight", preset.use_direct_light),
            sample_all_lights_direct: params
                .find_one_bool("samplealllightsdirect", preset.sample_all_lights_direct),
            sample_all_lights_indirect: params
                .find_one_bool("samplealllightsindirect", preset.sample_all_lights_indirect),
            transparent_shadows: params
                .find_one_bool("transparentshadows", preset.transparent_shadows),
            use_ambient_occlusion: params.find_one_bool("ambientocclusion", preset.use_ambient_occlusion),
            ao_factor: params.find_one_float("aofactor", preset.ao_factor),
            ao_distance,
            background_transparent: params
                .find_one_bool("transparentbackground", preset.background_transparent),
            background_volume_shader: if background_volume_shader >= 0 {
                Some(background_volume_shader as ShaderId)
            } else {
                None
            },
            pass_background: params.find_one_bool("passbackground", preset.pass_background),
            use_light_pass: params.find_one_bool("lightpasses", preset.use_light_pass),
            shadow_strategy,
            volume_stack_size: volume_stack_size as usize,
            volume_stack_growable: params
                .find_one_bool("volumestackgrowable", preset.volume_stack_growable),
            features,
        };

        params.report_unused();
        settings
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn device_presets() {
        let cpu = IntegratorSettings::for_device(DeviceKind::Cpu);
        assert_eq!(cpu.shadow_strategy, ShadowStrategy::RecordAll);
        assert!(cpu.volume_stack_growable);
        assert!(cpu.features.decoupled_volumes);

        let gpu = IntegratorSettings::for_device(DeviceKind::Gpu);
        assert_eq!(gpu.shadow_strategy, ShadowStrategy::StepThrough);
        assert!(!gpu.volume_stack_growable);
        assert!(!gpu.features.decoupled_volumes);
    }

    #[test]
    fn from_empty_paramset_is_cpu_preset() {
        let settings = IntegratorSettings::from(&ParamSet::new());
        assert_eq!(settings, IntegratorSettings::for_device(DeviceKind::Cpu));
    }

    #[test]
    fn from_paramset_reads_values() {
        let mut params = ParamSet::new();
        params.add_string("device", &[String::from("gpu")]);
        params.add_string("shadowstrategy", &[String::from("recordall")]);
        params.add_int("diffusesamples", &[4]);
        params.add_int("maxbounce", &[6]);
        params.add_int("backgroundvolume", &[3]);
        params.add_bool("transparentshadows", &[false]);

        let settings = IntegratorSettings::from(&params);
        assert_eq!(settings.shadow_strategy, ShadowStrategy::RecordAll);
        assert!(!settings.volume_stack_growable);
        assert_eq!(settings.diffuse_samples, 4);
        assert_eq!(settings.max_bounce, 6);
        assert_eq!(settings.background_volume_shader, Some(3));
        assert!(!settings.transparent_shadows);
    }

    #[test]
    fn invalid_values_fall_back() {
        let mut params = ParamSet::new();
        params.add_int("diffusesamples", &[-2]);
        params.add_int("volumesamples", &[0]);
        params.add_int("volumestacksize", &[0]);
        params.add_int("maxbounce", &[2]);
        params.add_int("minbounce", &[5]);
        params.add_float("aodistance", &[-1.0]);
        params.add_string("shadowstrategy", &[String::from("sideways")]);

        let settings = IntegratorSettings::from(&params);
        assert_eq!(settings.diffuse_samples, 1);
        assert_eq!(settings.volume_samples, 1);
        assert_eq!(settings.volume_stack_size, VOLUME_STACK_SIZE);
        assert_eq!(settings.min_bounce, 2);
        assert_eq!(settings.ao_distance, 10.0);
        assert_eq!(settings.shadow_strategy, ShadowStrategy::RecordAll);
    }
}
