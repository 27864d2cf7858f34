//! Flat per-neutron results of a beamline simulation.

use crate::constants::flight_time;
use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Results of a time-of-flight simulation used to create a lookup table.
///
/// All per-neutron columns share one length. `distance` is the position (from the
/// source) where the neutrons were recorded: the furthest chopper for a chopper
/// cascade, zero when the source sample is used directly.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct SimulationResults {
    time_of_arrival: Vec<f64>,
    speed: Vec<f64>,
    wavelength: Vec<f64>,
    weight: Vec<f64>,
    distance: f64,
}

impl SimulationResults {
    /// Creates simulation results from per-neutron columns.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if the columns differ in length.
    pub fn new(
        time_of_arrival: Vec<f64>,
        speed: Vec<f64>,
        wavelength: Vec<f64>,
        weight: Vec<f64>,
        distance: f64,
    ) -> Result<Self> {
        let n = time_of_arrival.len();
        for (field, len) in [
            ("speed", speed.len()),
            ("wavelength", wavelength.len()),
            ("weight", weight.len()),
        ] {
            if len != n {
                return Err(Error::LengthMismatch {
                    field,
                    expected: n,
                    actual: len,
                });
            }
        }
        if !distance.is_finite() {
            return Err(Error::config(format!(
                "simulation distance must be finite, got {distance}"
            )));
        }
        Ok(Self {
            time_of_arrival,
            speed,
            wavelength,
            weight,
            distance,
        })
    }

    /// Number of simulated neutrons.
    #[must_use]
    pub fn len(&self) -> usize {
        self.time_of_arrival.len()
    }

    /// Returns true if no neutron survived the simulation.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.time_of_arrival.is_empty()
    }

    /// Time of arrival at `distance` (µs).
    #[must_use]
    pub fn time_of_arrival(&self) -> &[f64] {
        &self.time_of_arrival
    }

    /// Neutron speeds (m/s).
    #[must_use]
    pub fn speed(&self) -> &[f64] {
        &self.speed
    }

    /// Neutron wavelengths (Å).
    #[must_use]
    pub fn wavelength(&self) -> &[f64] {
        &self.wavelength
    }

    /// Neutron weights.
    #[must_use]
    pub fn weight(&self) -> &[f64] {
        &self.weight
    }

    /// Distance from the source where the neutrons were recorded (m).
    #[must_use]
    pub fn distance(&self) -> f64 {
        self.distance
    }

    /// Returns the fastest neutron of the simulation.
    ///
    /// # Errors
    /// Returns [`Error::EmptySimulation`] if there are no neutrons.
    pub fn fastest_neutron(&self) -> Result<FastestNeutron> {
        let (index, speed) = self
            .speed
            .iter()
            .copied()
            .enumerate()
            .filter(|(_, v)| v.is_finite())
            .max_by(|a, b| a.1.total_cmp(&b.1))
            .ok_or(Error::EmptySimulation)?;
        Ok(FastestNeutron {
            time_of_arrival: self.time_of_arrival[index],
            speed,
            distance: self.distance,
        })
    }
}

/// Properties of the fastest neutron in a simulation.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct FastestNeutron {
    /// Arrival time at `distance` (µs).
    pub time_of_arrival: f64,
    /// Speed (m/s).
    pub speed: f64,
    /// Distance from the source where `time_of_arrival` was recorded (m).
    pub distance: f64,
}

impl FastestNeutron {
    /// Arrival time (µs) of this neutron at `ltotal` metres from the source.
    #[must_use]
    pub fn time_at(&self, ltotal: f64) -> f64 {
        self.time_of_arrival + flight_time(ltotal - self.distance, self.speed)
    }
}
