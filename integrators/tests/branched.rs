mod common;

use common::*;
use float_cmp::approx_eq;
use kernel::common::*;
use kernel::geometry::*;
use kernel::settings::{DeviceKind, IntegratorSettings};
use kernel::shading::ObjectFlags;
use kernel::shadow_map::ShadowDepthMap;
use kernel::spectrum::*;
use media::HomogeneousMedium;
use std::sync::mpsc;
use std::thread;
use std::time::Duration;

const DEVICES: [DeviceKind; 2] = [DeviceKind::Cpu, DeviceKind::Gpu];

fn up() -> Vector3f {
    Vector3f::new(0.0, 0.0, 1.0)
}

fn origin() -> Point3f {
    Point3f::new(0.0, 0.0, 0.0)
}

fn light_p() -> Point3f {
    Point3f::new(0.0, 0.0, 2.0)
}

/// Diffuse floor through the origin, lit by a point light of intensity 4
/// at height 2.
fn lit_floor(albedo: Float) -> MockScene {
    let mut scene = MockScene::new();
    scene.add_plane(origin(), up(), Material::diffuse(albedo));
    scene.lights.push(PointLight::new(light_p(), 4.0));
    scene
}

/// Camera ray straight down onto the origin.
fn down_ray(height: Float) -> Ray {
    camera_ray(Point3f::new(0.0, 0.0, height), origin())
}

fn assert_grey(s: Spectrum, expected: Float, epsilon: Float) {
    for c in 0..RGB_SAMPLES {
        assert!(
            approx_eq!(f32, s[c], expected, epsilon = epsilon),
            "channel {c}: {} != {expected}",
            s[c]
        );
    }
}

#[test]
fn lambertian_floor_under_point_light() {
    let scene = lit_floor(0.5);
    let expected = lambert_direct(0.5, 4.0, origin(), up(), light_p());
    assert!(approx_eq!(f32, expected, 0.5 * INV_PI, epsilon = 1e-6));

    for device in DEVICES {
        let settings = IntegratorSettings::for_device(device);
        let result = trace(&scene, &settings, &down_ray(3.0), 0);
        assert!(!result.is_shadow_catcher);
        assert_eq!(result.transparency, 0.0);
        assert_grey(result.sum(), expected, 1e-5);
    }
}

#[test]
fn light_sample_count_does_not_bias_direct_light() {
    let mut scene = lit_floor(0.5);
    scene.lights[0].samples = 5;
    let expected = lambert_direct(0.5, 4.0, origin(), up(), light_p());

    let settings = IntegratorSettings::default();
    assert_grey(trace(&scene, &settings, &down_ray(3.0), 0).sum(), expected, 1e-5);

    let one_light = IntegratorSettings {
        sample_all_lights_direct: false,
        ..IntegratorSettings::default()
    };
    assert_grey(trace(&scene, &one_light, &down_ray(3.0), 0).sum(), expected, 1e-5);
}

#[test]
fn light_passes_attribute_direct_diffuse() {
    let scene = lit_floor(0.5);
    let expected = lambert_direct(0.5, 4.0, origin(), up(), light_p());
    let settings = IntegratorSettings {
        use_light_pass: true,
        ..IntegratorSettings::default()
    };

    let result = trace(&scene, &settings, &down_ray(3.0), 0);
    let l = result.radiance.expect("integrated path");
    assert_grey(l.direct.diffuse, expected, 1e-5);
    assert!(l.direct.glossy.is_black());
    assert_eq!(l.shadow_samples, 1.0);
    assert_grey(l.shadow, 1.0, 1e-6);
    assert_grey(l.sum(), expected, 1e-5);
}

#[test]
fn tracing_is_deterministic() {
    let mut scene = lit_floor(0.5);
    scene.background = Spectrum::new(0.3);
    let settings = IntegratorSettings {
        diffuse_samples: 3,
        ..IntegratorSettings::default()
    };
    let ray = camera_ray(Point3f::new(1.0, 2.0, 3.0), origin());

    let a = trace(&scene, &settings, &ray, 7);
    let b = trace(&scene, &settings, &ray, 7);
    assert_eq!(a.radiance, b.radiance);
}

#[test]
fn zero_length_camera_ray_writes_empty_result() {
    let scene = lit_floor(0.5);
    let settings = IntegratorSettings::default();
    let ray = Ray::new(Point3f::new(0.0, 0.0, 3.0), -up(), 0.0, 0.0);

    let result = trace(&scene, &settings, &ray, 3);
    assert_eq!(result.sample, 3);
    assert!(result.radiance.is_none());
    assert_eq!(result.transparency, 0.0);
    assert_eq!(scene.queries(), 0);
}

#[test]
fn escaping_ray_with_transparent_background() {
    let mut scene = MockScene::new();
    scene.background = Spectrum::new(3.0);
    let settings = IntegratorSettings {
        background_transparent: true,
        ..IntegratorSettings::default()
    };

    let result = trace(&scene, &settings, &down_ray(3.0), 0);
    assert_eq!(result.transparency, 1.0);
    assert!(result.sum().is_black());

    let visible = IntegratorSettings {
        pass_background: true,
        ..settings
    };
    let result = trace(&scene, &visible, &down_ray(3.0), 0);
    assert_eq!(result.transparency, 1.0);
    assert_grey(result.sum(), 3.0, 1e-6);
}

#[test]
fn uniform_environment_over_grey_floor() {
    let mut scene = MockScene::new();
    scene.add_plane(origin(), up(), Material::diffuse(0.5));
    scene.background = Spectrum::ONE;

    for samples in [1, 4, 7] {
        let settings = IntegratorSettings {
            diffuse_samples: samples,
            ..IntegratorSettings::default()
        };
        let result = trace(&scene, &settings, &down_ray(3.0), 0);
        assert_grey(result.sum(), 0.5, 1e-4);
    }
}

#[test]
fn emissive_ceiling_reached_by_sub_paths() {
    let mut scene = MockScene::new();
    scene.add_plane(origin(), up(), Material::diffuse(0.5));
    scene.add_plane(Point3f::new(0.0, 0.0, 1.0), -up(), Material::emissive(1.0));

    for samples in [1, 4] {
        let settings = IntegratorSettings {
            diffuse_samples: samples,
            ..IntegratorSettings::default()
        };
        let result = trace(&scene, &settings, &down_ray(0.5), 0);
        assert_grey(result.sum(), 0.5, 1e-4);
    }
}

#[test]
fn transparent_sheet_attenuates_view_and_shadow() {
    let mut scene = lit_floor(0.5);
    scene.add_plane(Point3f::new(0.0, 0.0, 1.0), up(), Material::transparent(0.5));
    let expected = 0.25 * lambert_direct(0.5, 4.0, origin(), up(), light_p());

    for device in DEVICES {
        let settings = IntegratorSettings::for_device(device);
        let result = trace(&scene, &settings, &down_ray(3.0), 0);
        assert_grey(result.sum(), expected, 1e-5);
    }
}

#[test]
fn opaque_surface_without_closures_ends_the_path() {
    let mut scene = MockScene::new();
    scene.add_plane(origin(), up(), Material::default());
    scene.lights.push(PointLight::new(light_p(), 4.0));

    let result = trace(&scene, &IntegratorSettings::default(), &down_ray(3.0), 0);
    assert!(result.sum().is_black());
    assert_eq!(scene.queries(), 1);
}

#[test]
fn holdout_mask_is_transparent() {
    let mut scene = MockScene::new();
    let shader = scene.add_material(Material::diffuse(0.5));
    scene.add_disc(Disc::plane(origin(), up(), 0, shader).with_flags(ObjectFlags::HOLDOUT_MASK));
    scene.lights.push(PointLight::new(light_p(), 4.0));

    let settings = IntegratorSettings {
        background_transparent: true,
        ..IntegratorSettings::default()
    };
    let result = trace(&scene, &settings, &down_ray(3.0), 0);
    assert_eq!(result.transparency, 1.0);
    assert!(result.sum().is_black());
}

#[test]
fn holdout_closure_adds_transparency() {
    let mut scene = MockScene::new();
    scene.add_plane(
        origin(),
        up(),
        Material {
            holdout: Spectrum::new(0.25),
            ..Material::default()
        },
    );

    let settings = IntegratorSettings {
        background_transparent: true,
        ..IntegratorSettings::default()
    };
    let result = trace(&scene, &settings, &down_ray(3.0), 0);
    assert!(approx_eq!(f32, result.transparency, 0.25, epsilon = 1e-6));
}

fn catcher_scene(occluded: bool) -> MockScene {
    let mut scene = MockScene::new();
    let floor = scene.add_material(Material::diffuse(0.5));
    scene.add_disc(Disc::plane(origin(), up(), 0, floor).with_flags(ObjectFlags::SHADOW_CATCHER));
    if occluded {
        // Between (1, 0, 0) and the light, away from the camera ray.
        let blocker = scene.add_material(Material::default());
        scene.add_disc(Disc::plane(Point3f::new(0.5, 0.0, 1.0), up(), 1, blocker).with_radius(0.2));
    }
    scene.lights.push(PointLight::new(light_p(), 4.0));
    scene
}

#[test]
fn shadow_catcher_records_occluded_light() {
    let ray = camera_ray(Point3f::new(1.0, 0.0, 3.0), Point3f::new(1.0, 0.0, 0.0));
    let settings = IntegratorSettings::default();

    let result = trace(&catcher_scene(true), &settings, &ray, 0);
    assert!(result.is_shadow_catcher);
    let l = result.radiance.expect("integrated path");
    assert!(l.shadow_catcher.path_total.average() > 0.0);
    assert!(l.shadow_catcher.path_total_shaded.is_black());
    assert!(l.sum().is_black());

    let result = trace(&catcher_scene(false), &settings, &ray, 0);
    let l = result.radiance.expect("integrated path");
    let total = l.shadow_catcher.path_total.average();
    assert!(total > 0.0);
    assert!(approx_eq!(
        f32,
        l.shadow_catcher.path_total_shaded.average(),
        total,
        epsilon = 1e-6
    ));
}

#[test]
fn light_linking_excludes_lights() {
    for (object_mask, expected) in [
        (0b01, 0.0),
        (0b11, lambert_direct(0.5, 4.0, origin(), up(), light_p())),
    ] {
        let mut scene = MockScene::new();
        let shader = scene.add_material(Material::diffuse(0.5));
        let mut floor = Disc::plane(origin(), up(), 0, shader);
        floor.light_linking = object_mask;
        scene.add_disc(floor);
        let mut light = PointLight::new(light_p(), 4.0);
        light.linking = 0b10;
        scene.lights.push(light);

        let result = trace(&scene, &IntegratorSettings::default(), &down_ray(3.0), 0);
        assert_grey(result.sum(), expected, 1e-5);
    }
}

#[test]
fn shadow_depth_map_is_filled_on_demand() {
    // Maps x and y in [-1, 1] onto the texture.
    let transform = Matrix4x4::new([
        [0.5, 0.0, 0.0, 0.5],
        [0.0, 0.5, 0.0, 0.5],
        [0.0, 0.0, 1.0, 0.0],
        [0.0, 0.0, 0.0, 1.0],
    ]);
    // Seen from the side so the camera ray misses the blocker.
    let ray = camera_ray(Point3f::new(2.0, 0.0, 2.0), origin());
    let settings = IntegratorSettings::default();

    let mut scene = lit_floor(0.5);
    scene.lights[0].shadow_map = Some(ShadowDepthMap::new(transform, 1));
    let result = trace(&scene, &settings, &ray, 0);
    let expected = lambert_direct(0.5, 4.0, origin(), up(), light_p());
    assert_grey(result.sum(), expected, 1e-4);

    let mut scene = lit_floor(0.5);
    let blocker = scene.add_material(Material::default());
    scene.add_disc(Disc::plane(Point3f::new(0.0, 0.0, 1.0), up(), 1, blocker).with_radius(0.3));
    scene.lights[0].shadow_map = Some(ShadowDepthMap::new(transform, 1));

    let result = trace(&scene, &settings, &ray, 0);
    assert!(result.sum().is_black());

    let map = scene.lights[0].shadow_map.as_ref().expect("shadow map");
    let texel = map.texel_index(&origin()).expect("origin is on the map");
    let depth = map.depth(texel).expect("texel was filled");
    assert!(approx_eq!(f32, depth, 1.0, epsilon = 1e-3));
}

#[test]
fn subsurface_reentry_is_lit_directly() {
    let mut scene = MockScene::new();
    scene.add_plane(
        origin(),
        up(),
        Material {
            bssrdf: Spectrum::new(0.6),
            ..Material::default()
        },
    );
    scene.lights.push(PointLight::new(light_p(), 4.0));
    let expected = lambert_direct(0.6, 4.0, Point3f::new(0.1, 0.0, 0.0), up(), light_p());

    for samples in [1, 3] {
        let settings = IntegratorSettings {
            subsurface_samples: samples,
            ..IntegratorSettings::default()
        };
        let result = trace(&scene, &settings, &down_ray(3.0), 0);
        assert_grey(result.sum(), expected, 1e-5);
    }
}

#[test]
fn ambient_occlusion_open_and_covered() {
    let settings = IntegratorSettings {
        use_ambient_occlusion: true,
        ao_samples: 4,
        ao_distance: INFINITY,
        ..IntegratorSettings::default()
    };

    let mut open = MockScene::new();
    open.add_plane(origin(), up(), Material::diffuse(0.5));
    let result = trace(&open, &settings, &down_ray(0.5), 0);
    assert_grey(result.sum(), 0.5, 1e-5);

    let mut covered = MockScene::new();
    covered.add_plane(origin(), up(), Material::diffuse(0.5));
    covered.add_plane(Point3f::new(0.0, 0.0, 1.0), -up(), Material::diffuse(0.5));
    let result = trace(&covered, &settings, &down_ray(0.5), 0);
    assert!(result.sum().is_black());
}

#[test]
fn absorbing_world_volume_attenuates_view_and_shadow() {
    for device in DEVICES {
        let mut scene = lit_floor(0.5);
        scene
            .volumes
            .insert(100, HomogeneousMedium::new(Spectrum::new(0.5), Spectrum::ZERO, 0.0));
        let settings = IntegratorSettings {
            background_volume_shader: Some(100),
            ..IntegratorSettings::for_device(device)
        };

        // One unit of medium toward the camera and two toward the light.
        let expected = (-1.5 as Float).exp() * lambert_direct(0.5, 4.0, origin(), up(), light_p());
        let result = trace(&scene, &settings, &down_ray(1.0), 0);
        assert_grey(result.sum(), expected, 1e-5);
    }
}

#[test]
fn volume_only_slab_attenuates_view_and_shadow() {
    for device in DEVICES {
        let mut scene = lit_floor(0.5);
        let slab = scene.add_material(Material::volume_bounds());
        scene.add_disc(Disc::plane(Point3f::new(0.0, 0.0, 0.5), -up(), 7, slab));
        scene.add_disc(Disc::plane(Point3f::new(0.0, 0.0, 1.5), up(), 7, slab));
        scene
            .volumes
            .insert(slab, HomogeneousMedium::new(Spectrum::new(0.5), Spectrum::ZERO, 0.0));
        let settings = IntegratorSettings::for_device(device);

        let expected = (-1.0 as Float).exp() * lambert_direct(0.5, 4.0, origin(), up(), light_p());
        let result = trace(&scene, &settings, &down_ray(3.0), 0);
        assert_grey(result.sum(), expected, 1e-4);
    }
}

#[test]
fn scattering_fog_is_lit_by_the_light() {
    for device in DEVICES {
        let mut scene = MockScene::new();
        scene.add_plane(origin(), up(), Material::default());
        scene.lights.push(PointLight::new(Point3f::new(1.0, 0.0, 1.5), 4.0));
        scene
            .volumes
            .insert(100, HomogeneousMedium::new(Spectrum::ZERO, Spectrum::new(0.3), 0.0));
        let settings = IntegratorSettings {
            background_volume_shader: Some(100),
            volume_samples: 16,
            ..IntegratorSettings::for_device(device)
        };

        let result = trace(&scene, &settings, &down_ray(3.0), 0);
        let sum = result.sum();
        assert!(!sum.has_nans());
        assert!(sum.average() > 0.0, "{device:?}: {sum}");
    }
}

/// Purely scattering world medium with no geometry and no lights.
fn fog_world() -> MockScene {
    let mut scene = MockScene::new();
    scene
        .volumes
        .insert(100, HomogeneousMedium::new(Spectrum::ZERO, Spectrum::new(0.3), 0.0));
    scene
}

fn fog_settings(device: DeviceKind, volume_samples: u32) -> IntegratorSettings {
    IntegratorSettings {
        background_volume_shader: Some(100),
        volume_samples,
        ..IntegratorSettings::for_device(device)
    }
}

#[test]
fn scattering_world_volume_without_geometry_terminates() {
    for device in DEVICES {
        let (tx, rx) = mpsc::channel();
        thread::spawn(move || {
            let scene = fog_world();
            let result = trace(&scene, &fog_settings(device, 4), &down_ray(3.0), 0);
            let _ = tx.send(result.sum());
        });

        let sum = rx
            .recv_timeout(Duration::from_secs(20))
            .unwrap_or_else(|_| panic!("{device:?}: path in a scattering world did not finish"));
        assert!(!sum.has_nans());
        assert!(sum.is_black(), "{device:?}: {sum}");
    }
}

#[test]
fn volume_bounce_limit_stops_scattered_sub_paths() {
    let n = 4;
    for device in DEVICES {
        // Every branch scatters at the camera level and its sub-path ends at
        // the first scatter of its one trace.
        let scene = fog_world();
        let settings = IntegratorSettings {
            max_volume_bounce: 0,
            ..fog_settings(device, n)
        };
        trace(&scene, &settings, &down_ray(3.0), 0);
        assert_eq!(scene.queries(), 1 + n as usize, "{device:?}");

        // With a higher limit the sub-paths keep bouncing.
        let scene = fog_world();
        trace(&scene, &fog_settings(device, n), &down_ray(3.0), 0);
        assert!(scene.queries() > 1 + n as usize, "{device:?}");
    }
}
