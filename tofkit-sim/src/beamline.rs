//! Propagation of source neutrons through a chopper cascade.

use crate::chopper::{DiskChopper, Position};
use crate::source::{facility_source, NeutronSource, SourceSample};
use log::{debug, info};
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};
use tofkit_core::constants::{flight_time, speed_from_wavelength};
use tofkit_core::{Facility, Result, SimulationResults};

/// Parameters of a beamline simulation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationConfig {
    /// Number of neutrons per pulse.
    pub neutrons: usize,
    /// Number of pulses.
    pub pulses: usize,
    /// Seed of the random number generator.
    pub seed: u64,
    /// Facility whose source model is used.
    pub facility: Facility,
}

impl Default for SimulationConfig {
    fn default() -> Self {
        Self {
            neutrons: 1_000_000,
            pulses: 1,
            seed: 1234,
            facility: Facility::Ess,
        }
    }
}

impl SimulationConfig {
    /// Sets the number of neutrons per pulse.
    #[must_use]
    pub fn with_neutrons(mut self, neutrons: usize) -> Self {
        self.neutrons = neutrons;
        self
    }

    /// Sets the number of pulses.
    #[must_use]
    pub fn with_pulses(mut self, pulses: usize) -> Self {
        self.pulses = pulses;
        self
    }

    /// Sets the random seed.
    #[must_use]
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }
}

/// A chopper placed at a known distance from the source.
#[derive(Debug, Clone)]
pub(crate) struct PlacedChopper<'a> {
    pub(crate) distance: f64,
    pub(crate) chopper: &'a DiskChopper,
}

/// Validates the choppers and orders them by distance from the source.
pub(crate) fn place_choppers<'a, I>(
    choppers: I,
    source_position: Position,
) -> Result<Vec<PlacedChopper<'a>>>
where
    I: IntoIterator<Item = &'a DiskChopper>,
{
    let mut placed = Vec::new();
    for chopper in choppers {
        chopper.validate()?;
        placed.push(PlacedChopper {
            distance: chopper.distance_from(source_position),
            chopper,
        });
    }
    placed.sort_by(|a, b| a.distance.total_cmp(&b.distance));
    Ok(placed)
}

/// Returns true if a neutron born at `birth` (µs) with `speed` (m/s) passes every chopper.
pub(crate) fn passes(cascade: &[PlacedChopper<'_>], birth: f64, speed: f64) -> bool {
    cascade
        .iter()
        .all(|c| c.chopper.is_open_at(birth + flight_time(c.distance, speed)))
}

/// Simulates neutrons from `facility`'s source through a chopper cascade.
///
/// Neutrons blocked by any chopper are discarded. The results are recorded at the
/// furthest chopper; without choppers the source sample itself is returned with a
/// recording distance of zero. A zero neutron count yields empty results.
///
/// # Errors
/// Returns an error if a chopper is invalid.
pub fn simulate_beamline<'a, I>(
    choppers: I,
    source_position: Position,
    config: &SimulationConfig,
) -> Result<SimulationResults>
where
    I: IntoIterator<Item = &'a DiskChopper>,
{
    let source = facility_source(config.facility);
    simulate_with_source(choppers, source_position, source.as_ref(), config)
}

/// Like [`simulate_beamline`] with a custom source model.
///
/// # Errors
/// Returns an error if a chopper is invalid.
pub fn simulate_with_source<'a, I>(
    choppers: I,
    source_position: Position,
    source: &dyn NeutronSource,
    config: &SimulationConfig,
) -> Result<SimulationResults>
where
    I: IntoIterator<Item = &'a DiskChopper>,
{
    let cascade = place_choppers(choppers, source_position)?;
    let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
    let SourceSample {
        birth_time,
        wavelength,
        weight,
    } = source.sample(&mut rng, config.neutrons, config.pulses);
    let speed: Vec<f64> = wavelength.par_iter().map(|&l| speed_from_wavelength(l)).collect();
    let emitted = birth_time.len();

    let Some(furthest) = cascade.last().map(|c| c.distance) else {
        info!("simulated {emitted} neutrons without choppers");
        return SimulationResults::new(birth_time, speed, wavelength, weight, 0.0);
    };

    let kept: Vec<usize> = (0..emitted)
        .into_par_iter()
        .filter(|&i| passes(&cascade, birth_time[i], speed[i]))
        .collect();
    debug!(
        "{} of {emitted} neutrons pass {} choppers",
        kept.len(),
        cascade.len()
    );

    let time_of_arrival = kept
        .iter()
        .map(|&i| birth_time[i] + flight_time(furthest, speed[i]))
        .collect();
    let results = SimulationResults::new(
        time_of_arrival,
        kept.iter().map(|&i| speed[i]).collect(),
        kept.iter().map(|&i| wavelength[i]).collect(),
        kept.iter().map(|&i| weight[i]).collect(),
        furthest,
    )?;
    info!(
        "simulated {emitted} neutrons, {} recorded at {furthest:.3} m",
        results.len()
    );
    Ok(results)
}
