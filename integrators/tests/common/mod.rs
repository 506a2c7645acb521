//! Analytic mock scene shared by the integrator tests: discs and planes
//! with simple materials, point lights and a uniform environment.

#![allow(dead_code)]

use integrators::*;
use kernel::common::*;
use kernel::geometry::*;
use kernel::intersection::*;
use kernel::light::*;
use kernel::path_state::{PathRayFlags, PathState};
use kernel::radiance::*;
use kernel::rng::HashedSequence;
use kernel::sampling::sample_cos_hemisphere;
use kernel::settings::IntegratorSettings;
use kernel::shading::*;
use kernel::shadow_map::ShadowDepthMap;
use kernel::spectrum::*;
use media::HomogeneousVolumes;
use std::sync::atomic::{AtomicUsize, Ordering};

/// Initialises logging once for the test binary.
pub fn init_logging() {
    let _ = env_logger::builder().is_test(true).try_init();
}

/// Surface description of a shader.
#[derive(Copy, Clone, Debug, Default)]
pub struct Material {
    /// Lambertian albedo.
    pub diffuse: Spectrum,

    /// Weight of the straight pass-through closure.
    pub transparent: Spectrum,

    pub emission: Spectrum,
    pub holdout: Spectrum,

    /// Subsurface closure weight. Probes return one re-entry point.
    pub bssrdf: Spectrum,

    /// Constant opacity answered to shadow and occlusion rays.
    pub uniform_alpha: Option<Float>,

    /// Surface only bounds a medium.
    pub volume_only: bool,
}

impl Material {
    pub fn diffuse(albedo: Float) -> Self {
        Self {
            diffuse: Spectrum::new(albedo),
            ..Self::default()
        }
    }

    pub fn transparent(t: Float) -> Self {
        Self {
            transparent: Spectrum::new(t),
            ..Self::default()
        }
    }

    pub fn emissive(emission: Float) -> Self {
        Self {
            emission: Spectrum::new(emission),
            ..Self::default()
        }
    }

    pub fn volume_bounds() -> Self {
        Self {
            volume_only: true,
            ..Self::default()
        }
    }

    fn shader_flags(&self) -> ShaderFlags {
        let mut flags = ShaderFlags::empty();
        if self.uniform_alpha.is_some() {
            flags |= ShaderFlags::USE_UNIFORM_ALPHA;
        }
        if self.volume_only {
            flags |= ShaderFlags::HAS_VOLUME | ShaderFlags::HAS_ONLY_VOLUME;
        }
        if self.transparent_shadow() {
            flags |= ShaderFlags::HAS_TRANSPARENT_SHADOW;
        }
        flags
    }

    fn transparent_shadow(&self) -> bool {
        self.volume_only || self.uniform_alpha.is_some() || !self.transparent.is_black()
    }
}

/// A disc, or a plane when the radius is infinite.
#[derive(Copy, Clone, Debug)]
pub struct Disc {
    pub center: Point3f,
    pub normal: Vector3f,
    pub radius: Float,
    pub object: ObjectId,
    pub shader: ShaderId,
    pub object_flag: ObjectFlags,
    pub light_linking: u32,
    pub shadow_linking: u32,
}

impl Disc {
    pub fn plane(center: Point3f, normal: Vector3f, object: ObjectId, shader: ShaderId) -> Self {
        Self {
            center,
            normal: normal.normalize(),
            radius: INFINITY,
            object,
            shader,
            object_flag: ObjectFlags::empty(),
            light_linking: LINK_ALL,
            shadow_linking: LINK_ALL,
        }
    }

    pub fn with_radius(mut self, radius: Float) -> Self {
        self.radius = radius;
        self
    }

    pub fn with_flags(mut self, flags: ObjectFlags) -> Self {
        self.object_flag = flags;
        self
    }

    fn intersect(&self, ray: &Ray) -> Option<Float> {
        let denom = self.normal.dot(&ray.d);
        if denom.abs() < 1e-8 {
            return None;
        }
        let t = (self.center - ray.o).dot(&self.normal) / denom;
        if t <= 0.0 || t >= ray.t_max {
            return None;
        }
        let p = ray.at(t);
        if (p - self.center).length_squared() > self.radius * self.radius {
            return None;
        }
        Some(t)
    }
}

/// A point light.
#[derive(Clone, Debug)]
pub struct PointLight {
    pub p: Point3f,
    pub intensity: Spectrum,
    pub samples: u32,
    pub linking: u32,
    pub shadow_map: Option<ShadowDepthMap>,
}

impl PointLight {
    pub fn new(p: Point3f, intensity: Float) -> Self {
        Self {
            p,
            intensity: Spectrum::new(intensity),
            samples: 1,
            linking: LINK_ALL,
            shadow_map: None,
        }
    }
}

/// The mock scene. Shaders index `materials`.
#[derive(Default)]
pub struct MockScene {
    pub discs: Vec<Disc>,
    pub materials: Vec<Material>,
    pub lights: Vec<PointLight>,
    pub background: Spectrum,
    pub volumes: HomogeneousVolumes,

    /// Number of scene queries issued.
    pub queries: AtomicUsize,
}

impl MockScene {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adds a material and returns its shader.
    pub fn add_material(&mut self, material: Material) -> ShaderId {
        self.materials.push(material);
        (self.materials.len() - 1) as ShaderId
    }

    pub fn add_disc(&mut self, disc: Disc) {
        self.discs.push(disc);
    }

    /// Adds an infinite plane with its own material and returns its object.
    pub fn add_plane(&mut self, center: Point3f, normal: Vector3f, material: Material) -> ObjectId {
        let shader = self.add_material(material);
        let object = self.discs.len() as ObjectId;
        self.discs.push(Disc::plane(center, normal, object, shader));
        object
    }

    pub fn queries(&self) -> usize {
        self.queries.load(Ordering::Relaxed)
    }

    fn material(&self, shader: ShaderId) -> Material {
        self.materials
            .get(shader as usize)
            .copied()
            .unwrap_or_default()
    }

    fn disc_of(&self, object: ObjectId) -> Option<&Disc> {
        self.discs.iter().find(|d| d.object == object)
    }

    /// Hits of `ray` in disc order.
    fn hits(&self, ray: &Ray, shadow_linking: u32) -> Vec<Intersection> {
        self.discs
            .iter()
            .enumerate()
            .filter(|(_, d)| d.shadow_linking & shadow_linking != 0)
            .filter_map(|(i, d)| {
                d.intersect(ray).map(|t| Intersection {
                    t,
                    u: 0.0,
                    v: 0.0,
                    prim: i as u32,
                    object: d.object,
                })
            })
            .collect()
    }
}

impl SceneIntersector for MockScene {
    fn intersect(&self, ray: &Ray, _visibility: PathRayFlags, shadow_linking: u32) -> Option<Intersection> {
        self.queries.fetch_add(1, Ordering::Relaxed);
        self.hits(ray, shadow_linking)
            .into_iter()
            .min_by(|a, b| a.t.total_cmp(&b.t))
    }

    fn intersect_shadow_all(
        &self,
        ray: &Ray,
        hits: &mut Vec<Intersection>,
        max_hits: usize,
        shadow_linking: u32,
    ) -> bool {
        self.queries.fetch_add(1, Ordering::Relaxed);
        // Report hits back to front so the resolver has to sort them.
        for isect in self.hits(ray, shadow_linking).into_iter().rev() {
            if !self.transparent_shadow(&isect) {
                return true;
            }
            hits.push(isect);
            if hits.len() > max_hits {
                return true;
            }
        }
        false
    }
}

impl ShadingSystem for MockScene {
    fn setup_from_ray(&self, isect: &Intersection, ray: &Ray) -> ShaderData {
        let disc = self.discs[isect.prim as usize];
        let backfacing = disc.normal.dot(&ray.d) > 0.0;
        let ng = if backfacing { -disc.normal } else { disc.normal };

        let mut sd = ShaderData::new(ray.at(isect.t), ng, -ray.d, isect.t);
        sd.time = ray.time;
        sd.object = disc.object;
        sd.prim = isect.prim;
        sd.shader = disc.shader;
        sd.shader_flag = self.material(disc.shader).shader_flags();
        sd.object_flag = disc.object_flag;
        if backfacing {
            sd.runtime_flag |= RuntimeFlags::BACKFACING;
        }
        if let Some(alpha) = self.material(disc.shader).uniform_alpha {
            sd.shadow_alpha = alpha;
            sd.ao_alpha = alpha;
        }
        sd
    }

    fn eval_surface(&self, sd: &mut ShaderData, _state: &PathState, _context: ShaderContext) {
        let m = self.material(sd.shader);
        sd.clear_closures();
        if !m.diffuse.is_black() {
            sd.add_closure(ShaderClosure::new(ClosureType::Diffuse, m.diffuse, sd.n));
        }
        if !m.transparent.is_black() {
            sd.add_closure(ShaderClosure::new(ClosureType::Transparent, m.transparent, sd.n));
        }
        if !m.emission.is_black() {
            sd.add_closure(ShaderClosure::new(ClosureType::Emission, m.emission, sd.n));
        }
        if !m.holdout.is_black() {
            sd.add_closure(ShaderClosure::new(ClosureType::Holdout, m.holdout, sd.n));
        }
        if !m.bssrdf.is_black() {
            sd.add_closure(ShaderClosure::new(ClosureType::Bssrdf, m.bssrdf, sd.n));
        }
    }

    fn transparent_shadow(&self, isect: &Intersection) -> bool {
        let disc = self.discs[isect.prim as usize];
        self.material(disc.shader).transparent_shadow()
    }

    fn eval_bsdf(&self, sd: &ShaderData, omega_in: &Vector3f) -> (BsdfEval, Float) {
        let sum = sd.bsdf_sample_weight_sum();
        let mut eval = BsdfEval::default();
        let mut pdf = 0.0;
        for sc in sd.closures.iter() {
            if !(sc.kind.is_bsdf_diffuse() || sc.kind.is_bsdf_bssrdf()) {
                continue;
            }
            let cos = sc.n.dot(omega_in);
            if cos > 0.0 {
                eval.accum(sc.kind, sc.weight * (cos * INV_PI));
                if sum > 0.0 {
                    pdf += sc.sample_weight / sum * cos * INV_PI;
                }
            }
        }
        (eval, pdf)
    }

    fn sample_closure(&self, sd: &ShaderData, closure: usize, u: Float, v: Float) -> Option<BsdfSample> {
        let sc = sd.closures.get(closure)?;
        if !(sc.kind.is_bsdf_diffuse() || sc.kind.is_bsdf_bssrdf()) {
            return None;
        }
        let (omega_in, pdf) = sample_cos_hemisphere(&sc.n, u, v);
        if sd.ng.dot(&omega_in) <= 0.0 {
            return None;
        }
        Some(BsdfSample {
            omega_in,
            eval: BsdfEval::for_closure(sc.kind, sc.weight * pdf),
            pdf,
            label: ScatterLabel::REFLECT | ScatterLabel::DIFFUSE,
        })
    }

    fn background(&self, _ray: &Ray, _state: &PathState) -> Spectrum {
        self.background
    }

    fn subsurface_probe(
        &self,
        sd: &ShaderData,
        closure: usize,
        _u: Float,
        _v: Float,
        _lcg_state: &mut u32,
    ) -> Vec<SubsurfaceHit> {
        match sd.closures.get(closure) {
            Some(sc) if sc.kind.is_bssrdf() => vec![SubsurfaceHit {
                p: sd.p + Vector3f::new(0.1, 0.0, 0.0),
                n: sd.n,
                ng: sd.ng,
                weight: sc.weight,
            }],
            _ => Vec::new(),
        }
    }

    fn object_light_linking(&self, object: ObjectId) -> u32 {
        self.disc_of(object).map_or(LINK_ALL, |d| d.light_linking)
    }

    fn object_shadow_linking(&self, object: ObjectId) -> u32 {
        self.disc_of(object).map_or(LINK_ALL, |d| d.shadow_linking)
    }
}

impl LightSystem for MockScene {
    fn num_lights(&self) -> usize {
        self.lights.len()
    }

    fn light_samples(&self, light: usize) -> u32 {
        self.lights[light].samples
    }

    fn light_linking(&self, light: usize) -> u32 {
        self.lights[light].linking
    }

    fn sample(&self, light: usize, _u: Float, _v: Float, p: &Point3f, _time: Float) -> Option<LightSample> {
        let l = self.lights.get(light)?;
        let (d, t) = (l.p - *p).normalize_len();
        if t == 0.0 {
            return None;
        }
        Some(LightSample {
            light,
            p: l.p,
            d,
            t,
            eval: l.intensity / (t * t),
            pdf: 1.0,
            is_delta: true,
        })
    }

    fn shadow_map(&self, light: usize) -> Option<&ShadowDepthMap> {
        self.lights.get(light).and_then(|l| l.shadow_map.as_ref())
    }
}

/// One written path result.
#[derive(Clone, Debug)]
pub struct PathResult {
    pub sample: u32,
    pub radiance: Option<PathRadiance>,
    pub transparency: Float,
    pub is_shadow_catcher: bool,
}

impl PathResult {
    pub fn sum(&self) -> Spectrum {
        self.radiance.as_ref().map_or(Spectrum::ZERO, |l| l.sum())
    }
}

/// Render buffer recording every result.
#[derive(Default)]
pub struct RecordingBuffer {
    pub results: Vec<PathResult>,
    pub data_passes: usize,
}

impl RenderBuffer for RecordingBuffer {
    fn write_result(&mut self, sample: u32, l: Option<&PathRadiance>, transparency: Float, is_shadow_catcher: bool) {
        self.results.push(PathResult {
            sample,
            radiance: l.cloned(),
            transparency,
            is_shadow_catcher,
        });
    }

    fn write_data_passes(&mut self, _sd: &ShaderData, _state: &PathState, _throughput: Spectrum) {
        self.data_passes += 1;
    }
}

/// Returns a render context over `scene`.
pub fn context<'a>(
    scene: &'a MockScene,
    sequence: &'a HashedSequence,
    settings: &'a IntegratorSettings,
) -> RenderContext<'a> {
    RenderContext::new(scene, scene, scene, &scene.volumes, sequence, settings)
}

/// Traces one camera sample and returns what was written.
pub fn trace(scene: &MockScene, settings: &IntegratorSettings, ray: &Ray, sample: u32) -> PathResult {
    init_logging();
    let sequence = HashedSequence;
    let mut integrator = BranchedPathIntegrator::new(context(scene, &sequence, settings));
    let mut buffer = RecordingBuffer::default();
    integrator.trace(ray, 0x1234_5678, sample, &mut buffer);
    assert_eq!(buffer.results.len(), 1);
    buffer.results.remove(0)
}

/// Camera ray from `o` toward `target`.
pub fn camera_ray(o: Point3f, target: Point3f) -> Ray {
    let (d, _) = (target - o).normalize_len();
    Ray::new(o, d, INFINITY, 0.0)
}

/// Radiance of a Lambertian point lit by a point light, in the absence of
/// anything else.
pub fn lambert_direct(albedo: Float, intensity: Float, p: Point3f, n: Vector3f, light: Point3f) -> Float {
    let (d, t) = (light - p).normalize_len();
    albedo * INV_PI * intensity * max(n.dot(&d), 0.0) / (t * t)
}
