//! Neutron source models.
//!
//! A source emits neutrons in pulses. Each neutron has a birth time (µs, relative to
//! the start of the first pulse) and a wavelength (Å).

use rand::Rng;
use rand_chacha::ChaCha8Rng;
use tofkit_core::Facility;

/// Neutrons emitted by a source, one entry per neutron.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SourceSample {
    /// Birth time (µs), including the pulse offset.
    pub birth_time: Vec<f64>,
    /// Wavelength (Å).
    pub wavelength: Vec<f64>,
    /// Statistical weight.
    pub weight: Vec<f64>,
}

impl SourceSample {
    /// Number of neutrons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.birth_time.len()
    }

    /// Returns true if there are no neutrons.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.birth_time.is_empty()
    }
}

/// A pulsed neutron source.
pub trait NeutronSource: Send + Sync {
    /// Time between pulses (µs).
    fn pulse_period(&self) -> f64;

    /// Draws the birth time (µs, relative to the pulse start) and wavelength (Å)
    /// of one neutron.
    fn sample_neutron(&self, rng: &mut ChaCha8Rng) -> (f64, f64);

    /// Draws `neutrons` neutrons for each of `pulses` consecutive pulses.
    #[allow(clippy::cast_precision_loss)]
    fn sample(&self, rng: &mut ChaCha8Rng, neutrons: usize, pulses: usize) -> SourceSample {
        let total = neutrons * pulses;
        let mut sample = SourceSample {
            birth_time: Vec::with_capacity(total),
            wavelength: Vec::with_capacity(total),
            weight: vec![1.0; total],
        };
        for pulse in 0..pulses {
            let offset = pulse as f64 * self.pulse_period();
            for _ in 0..neutrons {
                let (birth, wavelength) = self.sample_neutron(rng);
                sample.birth_time.push(birth + offset);
                sample.wavelength.push(wavelength);
            }
        }
        sample
    }
}

const WAVELENGTH_MIN: f64 = 0.2;
const WAVELENGTH_MAX: f64 = 20.0;
const SPECTRUM_POINTS: usize = 4096;

/// Source model of the European Spallation Source long pulse.
///
/// The pulse has a flat top with linear rise and fall; the wavelength spectrum is
/// a thermalised `λ⁻⁵ exp(-(λ_T/λ)²)` distribution truncated to 0.2–20 Å.
#[derive(Debug, Clone)]
pub struct EssSource {
    pulse_period: f64,
    flat_top: f64,
    rise: f64,
    spectrum_cdf: Vec<f64>,
}

impl Default for EssSource {
    fn default() -> Self {
        Self::new(2.8)
    }
}

impl EssSource {
    /// Creates the source with the given characteristic wavelength (Å).
    #[must_use]
    pub fn new(characteristic_wavelength: f64) -> Self {
        let facility = Facility::Ess;
        Self {
            pulse_period: facility.pulse_period(),
            flat_top: facility.pulse_length(),
            rise: 140.0,
            spectrum_cdf: spectrum_cdf(characteristic_wavelength),
        }
    }

    /// Longest possible birth time within a pulse (µs).
    #[must_use]
    pub fn max_birth_time(&self) -> f64 {
        self.flat_top + self.rise
    }

    fn wavelength_at(&self, u: f64) -> f64 {
        let index = self.spectrum_cdf.partition_point(|&c| c < u).max(1);
        let (c0, c1) = (self.spectrum_cdf[index - 1], self.spectrum_cdf[index]);
        let frac = if c1 > c0 { (u - c0) / (c1 - c0) } else { 0.0 };
        let (l0, l1) = (grid_wavelength(index - 1), grid_wavelength(index));
        l0 + frac * (l1 - l0)
    }
}

impl NeutronSource for EssSource {
    fn pulse_period(&self) -> f64 {
        self.pulse_period
    }

    fn sample_neutron(&self, rng: &mut ChaCha8Rng) -> (f64, f64) {
        // Sum of two uniforms gives the trapezoid: rise, flat top, fall.
        let birth = self.flat_top * rng.gen::<f64>() + self.rise * rng.gen::<f64>();
        let wavelength = self.wavelength_at(rng.gen::<f64>());
        (birth, wavelength)
    }
}

/// Creates the source model of `facility`.
#[must_use]
pub fn facility_source(facility: Facility) -> Box<dyn NeutronSource> {
    match facility {
        Facility::Ess => Box::new(EssSource::default()),
    }
}

#[allow(clippy::cast_precision_loss)]
fn grid_wavelength(index: usize) -> f64 {
    WAVELENGTH_MIN + (WAVELENGTH_MAX - WAVELENGTH_MIN) * index as f64 / (SPECTRUM_POINTS - 1) as f64
}

fn spectrum_cdf(characteristic_wavelength: f64) -> Vec<f64> {
    let density = |l: f64| l.powi(-5) * (-(characteristic_wavelength / l).powi(2)).exp();
    let mut cdf = Vec::with_capacity(SPECTRUM_POINTS);
    let mut total = 0.0;
    cdf.push(0.0);
    for i in 1..SPECTRUM_POINTS {
        let (a, b) = (grid_wavelength(i - 1), grid_wavelength(i));
        total += 0.5 * (density(a) + density(b)) * (b - a);
        cdf.push(total);
    }
    for c in &mut cdf {
        *c /= total;
    }
    cdf
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn test_sample_bounds() {
        let source = EssSource::default();
        let mut rng = ChaCha8Rng::seed_from_u64(7);
        let sample = source.sample(&mut rng, 20_000, 2);
        assert_eq!(sample.len(), 40_000);
        let period = source.pulse_period();
        for (i, (&t, &l)) in sample.birth_time.iter().zip(&sample.wavelength).enumerate() {
            let offset = if i < 20_000 { 0.0 } else { period };
            assert!(t >= offset && t <= offset + source.max_birth_time());
            assert!((WAVELENGTH_MIN..=WAVELENGTH_MAX).contains(&l));
        }
        assert!(sample.weight.iter().all(|&w| w == 1.0));
    }

    #[test]
    fn test_spectrum_covers_cold_range() {
        let source = EssSource::default();
        let mut rng = ChaCha8Rng::seed_from_u64(1);
        let sample = source.sample(&mut rng, 50_000, 1);
        let cold = sample.wavelength.iter().filter(|&&l| l > 4.0).count();
        let thermal = sample.wavelength.iter().filter(|&&l| l < 4.0).count();
        assert!(cold > 1_000);
        assert!(thermal > cold);
    }

    #[test]
    fn test_same_seed_same_sample() {
        let source = EssSource::default();
        let a = source.sample(&mut ChaCha8Rng::seed_from_u64(3), 100, 1);
        let b = source.sample(&mut ChaCha8Rng::seed_from_u64(3), 100, 1);
        assert_eq!(a, b);
    }
}
