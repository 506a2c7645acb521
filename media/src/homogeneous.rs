//! Homogeneous Medium

use super::*;
use kernel::common::*;
use kernel::geometry::*;
use kernel::path_state::PathState;
use kernel::radiance::PathRadiance;
use kernel::rng::*;
use kernel::sampling::power_heuristic;
use kernel::shading::*;
use kernel::spectrum::*;
use kernel::volume::*;
use std::collections::HashMap;

/// Implements a homogeneous medium representing a region of space with
/// constant σa, σs and emission throughout its extent.
#[derive(Copy, Clone, Debug, PartialEq)]
pub struct HomogeneousMedium {
    /// Absorption cross section `σa` is the probability density that light is
    /// absorbed per unit distance traveled in the medium.
    sigma_a: Spectrum,

    /// Scattering coefficient `σs` is the probability of an out-scattering
    /// event occurring per unit distance.
    sigma_s: Spectrum,

    /// The asymmetry parameter for the Henyey-Greenstein phase function.
    g: Float,

    /// Radiance emitted per unit distance.
    emission: Spectrum,

    /// Distance sampling method.
    sampling: VolumeSampling,
}

impl HomogeneousMedium {
    /// Create a new `HomogeneousMedium`.
    ///
    /// * `sigma_a` - Absorption cross section `σa`.
    /// * `sigma_s` - Scattering coefficient `σs`.
    /// * `g`       - The asymmetry parameter for Henyey-Greenstein phase
    ///               function.
    pub fn new(sigma_a: Spectrum, sigma_s: Spectrum, g: Float) -> Self {
        Self {
            sigma_a,
            sigma_s,
            g: clamp(g, -0.99, 0.99),
            emission: Spectrum::ZERO,
            sampling: VolumeSampling::Distance,
        }
    }

    /// Returns the medium with an emission term.
    ///
    /// * `emission` - Radiance emitted per unit distance.
    pub fn with_emission(self, emission: Spectrum) -> Self {
        Self { emission, ..self }
    }

    /// Returns the medium with a distance sampling method.
    ///
    /// * `sampling` - The method.
    pub fn with_sampling(self, sampling: VolumeSampling) -> Self {
        Self { sampling, ..self }
    }

    /// Total reduction in radiance due to absorption and out-scattering
    /// `σt = σs + σa`.
    pub fn sigma_t(&self) -> Spectrum {
        self.sigma_a + self.sigma_s
    }
}

/// Coefficients of all media overlapping along a segment.
#[derive(Copy, Clone, Debug, PartialEq)]
struct Coefficients {
    sigma_t: Spectrum,
    sigma_s: Spectrum,
    emission: Spectrum,
    flags: SegmentFlags,
}

/// Returns the beam transmittance over a distance. Channels without
/// extinction are fully transmissive, even over infinite distances.
///
/// * `sigma_t` - Extinction coefficient.
/// * `t`       - Distance.
pub fn volume_transmittance(sigma_t: Spectrum, t: Float) -> Spectrum {
    sigma_t.map(|s| if s > 0.0 { (-s * t).exp() } else { 1.0 })
}

/// Returns emission integrated over a segment, attenuated by extinction.
fn emission_integrate(c: &Coefficients, transmittance: Spectrum, t: Float) -> Spectrum {
    let mut emission = c.emission;
    for i in 0..RGB_SAMPLES {
        emission[i] *= if c.sigma_t[i] > 0.0 {
            (1.0 - transmittance[i]) / c.sigma_t[i]
        } else {
            t
        };
    }
    emission
}

/// Samples a distance in [0, `max_t`] proportional to the transmittance of
/// one channel. Returns the distance, the transmittance up to it and the
/// density of each channel.
///
/// * `max_t`   - Segment length.
/// * `sigma_t` - Extinction coefficient; positive in `channel`.
/// * `channel` - Channel to sample.
/// * `xi`      - Random value.
fn distance_sample(
    max_t: Float,
    sigma_t: Spectrum,
    channel: usize,
    xi: Float,
) -> (Float, Spectrum, Spectrum) {
    let sample_sigma_t = sigma_t[channel];
    let full_transmittance = volume_transmittance(sigma_t, max_t);
    let sample_transmittance = full_transmittance[channel];
    let sample_t = min(
        max_t,
        -(1.0 - xi * (1.0 - sample_transmittance)).ln() / sample_sigma_t,
    );
    let transmittance = volume_transmittance(sigma_t, sample_t);
    let pdf = (sigma_t * transmittance).safe_divide(&(Spectrum::ONE - full_transmittance));
    (sample_t, transmittance, pdf)
}

/// Returns the per channel density of distance sampling `sample_t`.
fn distance_pdf(max_t: Float, sigma_t: Spectrum, sample_t: Float) -> Spectrum {
    let full_transmittance = volume_transmittance(sigma_t, max_t);
    let transmittance = volume_transmittance(sigma_t, sample_t);
    (sigma_t * transmittance).safe_divide(&(Spectrum::ONE - full_transmittance))
}

/// Distance of the light from the ray line and the angles spanned by the
/// segment as seen from the light.
fn equiangular_frame(ray: &Ray, light_p: &Point3f) -> Option<(Float, Float, Float, Float)> {
    let to_light = *light_p - ray.o;
    let delta = to_light.dot(&ray.d);
    let d = max(to_light.length_squared() - delta * delta, 0.0).sqrt();
    if d == 0.0 {
        return None;
    }
    let theta_a = -delta.atan2(d);
    let theta_b = (ray.t_max - delta).atan2(d);
    if theta_a == theta_b {
        None
    } else {
        Some((delta, d, theta_a, theta_b))
    }
}

/// Samples a distance with density proportional to the inverse squared
/// distance to a light. Returns the distance and its density.
fn equiangular_sample(ray: &Ray, light_p: &Point3f, xi: Float) -> Option<(Float, Float)> {
    let (delta, d, theta_a, theta_b) = equiangular_frame(ray, light_p)?;
    let t = d * (xi * theta_b + (1.0 - xi) * theta_a).tan();
    let pdf = d / ((theta_b - theta_a) * (d * d + t * t));
    Some((min(ray.t_max, delta + t), pdf))
}

/// Returns the density of equiangular sampling `sample_t`.
fn equiangular_pdf(ray: &Ray, light_p: &Point3f, sample_t: Float) -> Float {
    match equiangular_frame(ray, light_p) {
        Some((delta, d, theta_a, theta_b)) => {
            let t = sample_t - delta;
            d / ((theta_b - theta_a) * (d * d + t * t))
        }
        None => 0.0,
    }
}

/// Picks a colour channel from a random value.
fn pick_channel(rphase: Float) -> usize {
    min((rphase * RGB_SAMPLES as Float) as usize, RGB_SAMPLES - 1)
}

/// Homogeneous media keyed by volume shader.
#[derive(Clone, Debug, Default)]
pub struct HomogeneousVolumes {
    media: HashMap<ShaderId, HomogeneousMedium>,
}

impl HomogeneousVolumes {
    /// Returns an empty set of media.
    pub fn new() -> Self {
        Self::default()
    }

    /// Assigns a medium to a volume shader.
    ///
    /// * `shader` - Volume shader.
    /// * `medium` - The medium.
    pub fn insert(&mut self, shader: ShaderId, medium: HomogeneousMedium) {
        self.media.insert(shader, medium);
    }

    /// Returns the medium of a volume shader.
    ///
    /// * `shader` - Volume shader.
    pub fn get(&self, shader: ShaderId) -> Option<&HomogeneousMedium> {
        self.media.get(&shader)
    }

    /// Media on the volume stack of a path.
    fn stack_media<'a>(
        &'a self,
        stack: &'a VolumeStack,
    ) -> impl Iterator<Item = &'a HomogeneousMedium> + 'a {
        stack.entries().iter().filter_map(move |e| {
            let medium = self.media.get(&e.shader);
            if medium.is_none() {
                debug!("No medium for volume shader {}", e.shader);
            }
            medium
        })
    }

    /// Sums the coefficients of all media on a volume stack.
    fn coefficients(&self, stack: &VolumeStack) -> Coefficients {
        let mut sigma_t = Spectrum::ZERO;
        let mut sigma_s = Spectrum::ZERO;
        let mut emission = Spectrum::ZERO;
        for m in self.stack_media(stack) {
            sigma_t += m.sigma_t();
            sigma_s += m.sigma_s;
            emission += m.emission;
        }

        let mut flags = SegmentFlags::empty();
        if !sigma_s.is_black() {
            flags |= SegmentFlags::SCATTER;
        }
        if !sigma_t.is_black() {
            flags |= SegmentFlags::ABSORPTION;
        }
        if !emission.is_black() {
            flags |= SegmentFlags::EMISSION;
        }

        Coefficients {
            sigma_t,
            sigma_s,
            emission,
            flags,
        }
    }
}

impl VolumeSystem for HomogeneousVolumes {
    fn is_heterogeneous(&self, _shader: ShaderId) -> bool {
        false
    }

    fn sampling_method(&self, shader: ShaderId) -> VolumeSampling {
        self.get(shader)
            .map_or(VolumeSampling::Distance, |m| m.sampling)
    }

    /// Phase closures carry each medium's share of the total scattering so
    /// that evaluating them sums to the normalized phase function.
    fn setup_from_volume(&self, state: &PathState, ray: &Ray) -> ShaderData {
        let mut sd = ShaderData::for_volume(ray);
        sd.shader_flag |= ShaderFlags::HAS_VOLUME;
        if let Some(e) = state.volume_stack.entries().first() {
            sd.shader = e.shader;
        }

        let c = self.coefficients(&state.volume_stack);
        for m in self.stack_media(&state.volume_stack) {
            if !m.sigma_s.is_black() {
                let mut sc = ShaderClosure::new(
                    ClosureType::VolumeScatter,
                    m.sigma_s.safe_divide(&c.sigma_s),
                    sd.n,
                );
                sc.anisotropy = m.g;
                sd.add_closure(sc);
            }
            if !m.sigma_a.is_black() {
                sd.add_closure(ShaderClosure::new(
                    ClosureType::VolumeAbsorption,
                    m.sigma_a,
                    sd.n,
                ));
            }
        }
        sd
    }

    fn shadow(&self, state: &PathState, ray: &Ray, throughput: &mut Spectrum) {
        let c = self.coefficients(&state.volume_stack);
        if c.flags.contains(SegmentFlags::ABSORPTION) {
            *throughput *= volume_transmittance(c.sigma_t, ray.t_max);
        }
    }

    /// Scatters with probability of one minus the transmittance of a
    /// randomly picked channel, then samples the distance inside the
    /// segment.
    fn integrate(
        &self,
        state: &mut PathState,
        sd: &mut ShaderData,
        ray: &Ray,
        l: &mut PathRadiance,
        throughput: &mut Spectrum,
        _heterogeneous: bool,
        seq: &dyn SampleSequence,
    ) -> VolumeIntegrateResult {
        let c = self.coefficients(&state.volume_stack);
        if c.flags.is_empty() {
            return VolumeIntegrateResult::Missed;
        }
        *sd = self.setup_from_volume(state, ray);

        let t = ray.t_max;
        let full_transmittance = volume_transmittance(c.sigma_t, t);
        let mut new_tp = *throughput;
        let mut scatter_t = t;

        if c.flags.contains(SegmentFlags::SCATTER) {
            let channel = pick_channel(state.rng_1d_for_decision(seq, SampleDimension::Phase));
            let mut xi = state.rng_1d_for_decision(seq, SampleDimension::ScatterDistance);
            let sample_transmittance = full_transmittance[channel];

            if c.sigma_t[channel] > 0.0 && 1.0 - xi >= sample_transmittance {
                // Rescale the random number so it can be reused.
                xi = 1.0 - (1.0 - xi - sample_transmittance) / (1.0 - sample_transmittance);

                let (sample_t, transmittance, pdf) = distance_sample(t, c.sigma_t, channel, xi);
                let pdf = pdf * (Spectrum::ONE - full_transmittance);
                new_tp = *throughput * c.sigma_s * transmittance / pdf.average();
                scatter_t = sample_t;
            } else {
                new_tp = *throughput * full_transmittance / full_transmittance.average();
            }
        } else if c.flags.contains(SegmentFlags::ABSORPTION) {
            new_tp = *throughput * full_transmittance;
        }

        if c.flags.contains(SegmentFlags::EMISSION) {
            let emission = emission_integrate(&c, full_transmittance, t);
            l.accum_emission(*throughput, emission, state.bounce);
        }

        *throughput = new_tp;
        if scatter_t < t {
            sd.p = ray.at(scatter_t);
            sd.ray_length = scatter_t;
            VolumeIntegrateResult::Scattered
        } else {
            sd.ray_length = t;
            VolumeIntegrateResult::Attenuated
        }
    }

    fn decoupled_record(
        &self,
        state: &PathState,
        ray: &Ray,
        sd: &mut ShaderData,
        _heterogeneous: bool,
    ) -> VolumeSegment {
        *sd = self.setup_from_volume(state, ray);
        sd.ray_length = ray.t_max;

        let c = self.coefficients(&state.volume_stack);
        let transmittance = volume_transmittance(c.sigma_t, ray.t_max);
        let accum_emission = if c.flags.contains(SegmentFlags::EMISSION) {
            emission_integrate(&c, transmittance, ray.t_max)
        } else {
            Spectrum::ZERO
        };

        VolumeSegment {
            steps: vec![VolumeStep {
                t: ray.t_max,
                sigma_t: c.sigma_t,
                sigma_s: c.sigma_s,
                accum_transmittance: transmittance,
            }],
            accum_transmittance: transmittance,
            accum_emission,
            closure_flag: c.flags,
            sampling_method: state.volume_stack.sampling_method(self),
        }
    }

    fn decoupled_scatter(
        &self,
        _state: &PathState,
        ray: &Ray,
        sd: &mut ShaderData,
        throughput: &mut Spectrum,
        rphase: Float,
        rscatter: Float,
        segment: &VolumeSegment,
        light_p: Option<&Point3f>,
        probabilistic: bool,
    ) -> VolumeIntegrateResult {
        if !segment.closure_flag.contains(SegmentFlags::SCATTER) {
            return VolumeIntegrateResult::Missed;
        }
        let step = match segment.steps.first() {
            Some(step) => step,
            None => return VolumeIntegrateResult::Missed,
        };

        let channel = pick_channel(rphase);
        let mut xi = rscatter;

        // Decide between scattering and passing through on the transmittance
        // of the picked channel.
        let scatter_probability = if probabilistic {
            let sample_transmittance = segment.accum_transmittance[channel];
            if 1.0 - xi >= sample_transmittance && sample_transmittance < 1.0 {
                // Rescale the random number so it can be reused.
                xi = 1.0 - (1.0 - xi - sample_transmittance) / (1.0 - sample_transmittance);
            } else {
                *throughput /= sample_transmittance;
                return VolumeIntegrateResult::Missed;
            }
            Spectrum::ONE - segment.accum_transmittance
        } else {
            Spectrum::ONE
        };

        // Pick distance or equiangular sampling, or both with MIS.
        let mut equiangular_light = None;
        let mut use_mis = false;
        if let Some(p) = light_p {
            match segment.sampling_method {
                VolumeSampling::MultipleImportance => {
                    use_mis = true;
                    if xi < 0.5 {
                        xi *= 2.0;
                    } else {
                        xi = (xi - 0.5) * 2.0;
                        equiangular_light = Some(p);
                    }
                }
                VolumeSampling::Equiangular => equiangular_light = Some(p),
                VolumeSampling::Distance => {}
            }
        }

        let (sample_t, transmittance, pdf, mis_weight) = match equiangular_light {
            None => {
                if step.sigma_t[channel] <= 0.0 {
                    return VolumeIntegrateResult::Missed;
                }
                let (sample_t, transmittance, pdf) =
                    distance_sample(step.t, step.sigma_t, channel, xi);
                let pdf = (pdf * scatter_probability).average();
                let mis_weight = match light_p {
                    Some(p) if use_mis => {
                        2.0 * power_heuristic(1, pdf, 1, equiangular_pdf(ray, p, sample_t))
                    }
                    _ => 1.0,
                };
                (sample_t, transmittance, pdf, mis_weight)
            }
            Some(p) => {
                let (sample_t, pdf) = match equiangular_sample(ray, p, xi) {
                    Some((t, pdf)) => (t, pdf * scatter_probability.average()),
                    None => return VolumeIntegrateResult::Missed,
                };
                let transmittance = volume_transmittance(step.sigma_t, sample_t);
                let mis_weight = if use_mis {
                    let distance =
                        (distance_pdf(step.t, step.sigma_t, sample_t) * scatter_probability).average();
                    2.0 * power_heuristic(1, pdf, 1, distance)
                } else {
                    1.0
                };
                (sample_t, transmittance, pdf, mis_weight)
            }
        };

        if pdf <= 0.0 || !pdf.is_finite() {
            return VolumeIntegrateResult::Missed;
        }

        *throughput *= step.sigma_s * transmittance * (mis_weight / pdf);
        sd.p = ray.at(sample_t);
        sd.ray_length = sample_t;
        VolumeIntegrateResult::Scattered
    }

    fn sample_phase(&self, sd: &ShaderData, u: Float, v: Float) -> Option<BsdfSample> {
        let mut sum = 0.0;
        for sc in sd.closures.iter() {
            if sc.kind == ClosureType::VolumeScatter {
                sum += sc.sample_weight;
            }
        }
        if sum <= 0.0 {
            return None;
        }

        // Pick a phase closure and rescale u for sampling it.
        let target = u * sum;
        let mut acc = 0.0;
        let mut picked = None;
        for sc in sd.closures.iter().filter(|sc| sc.kind == ClosureType::VolumeScatter) {
            picked = Some((sc, (target - acc) / sc.sample_weight));
            acc += sc.sample_weight;
            if target < acc {
                break;
            }
        }
        let (sc, u) = picked?;

        let (omega_in, _) = sample_hg(&sd.i, sc.anisotropy, clamp(u, 0.0, ONE_MINUS_EPSILON), v);
        let (eval, pdf) = self.eval_phase(sd, &omega_in);
        Some(BsdfSample {
            omega_in,
            eval,
            pdf,
            label: ScatterLabel::VOLUME_SCATTER,
        })
    }

    fn eval_phase(&self, sd: &ShaderData, omega_in: &Vector3f) -> (BsdfEval, Float) {
        let cos_theta = sd.i.dot(omega_in);
        let mut eval = BsdfEval::default();
        let mut sum_pdf = 0.0;
        let mut sum_weight = 0.0;
        for sc in sd.closures.iter().filter(|sc| sc.kind == ClosureType::VolumeScatter) {
            let phase = phase_hg(cos_theta, sc.anisotropy);
            eval.accum(ClosureType::VolumeScatter, sc.weight * phase);
            sum_pdf += phase * sc.sample_weight;
            sum_weight += sc.sample_weight;
        }
        let pdf = if sum_weight > 0.0 {
            sum_pdf / sum_weight
        } else {
            0.0
        };
        (eval, pdf)
    }
}

// ----------------------------------------------------------------------------
// Tests
// ----------------------------------------------------------------------------
