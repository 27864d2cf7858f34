//! Synthetic beamline producing recorded event data with known ground truth.
//!
//! Neutrons from many consecutive pulses are pushed through a chopper cascade to a
//! set of monitors. Arrivals are recorded the way a data acquisition system does:
//! against the most recent pulse time, which is what makes pulse skipping and
//! frame overlap visible in the recorded `event_time_offset`.

use crate::beamline::place_choppers;
use crate::chopper::{DiskChopper, Position};
use crate::source::facility_source;
use log::debug;
use rand::SeedableRng;
use rand_chacha::ChaCha8Rng;
use rayon::prelude::*;
use tofkit_core::constants::{flight_time, speed_from_wavelength, tof_from_wavelength, NANOS_PER_MICRO};
use tofkit_core::{Error, EventData, Facility, Result};

/// Parameters of a [`FakeBeamline`].
#[derive(Debug, Clone, PartialEq)]
pub struct FakeBeamlineConfig {
    /// Number of source pulses to simulate.
    pub pulses: usize,
    /// Neutrons emitted per pulse.
    pub events_per_pulse: usize,
    /// First pulse at which recording starts.
    pub first_recorded_pulse: usize,
    /// Random seed.
    pub seed: u64,
    /// Source facility.
    pub facility: Facility,
}

impl Default for FakeBeamlineConfig {
    fn default() -> Self {
        Self {
            pulses: 6,
            events_per_pulse: 100_000,
            first_recorded_pulse: 0,
            seed: 42,
            facility: Facility::Ess,
        }
    }
}

/// Events recorded at one monitor, with the true properties of every event.
#[derive(Debug, Clone, PartialEq)]
pub struct FakeMonitorData {
    /// Recorded events.
    pub events: EventData,
    /// True wavelength of every event (Å).
    pub wavelength: Vec<f64>,
    /// True time-of-flight of every event (µs).
    pub tof: Vec<f64>,
}

/// A simulated instrument with choppers and monitors.
#[derive(Debug, Clone)]
pub struct FakeBeamline {
    monitors: Vec<(String, f64)>,
    birth_time: Vec<f64>,
    wavelength: Vec<f64>,
    // Distance of the first chopper that blocked each neutron.
    blocked_at: Vec<f64>,
    pulse_period: f64,
    config: FakeBeamlineConfig,
}

impl FakeBeamline {
    /// Simulates the source pulses and the chopper cascade.
    ///
    /// # Errors
    /// Returns an error if a chopper is invalid or a monitor distance is not finite.
    pub fn new<I, S>(
        choppers: &[DiskChopper],
        source_position: Position,
        monitors: I,
        config: FakeBeamlineConfig,
    ) -> Result<Self>
    where
        I: IntoIterator<Item = (S, f64)>,
        S: Into<String>,
    {
        let monitors: Vec<(String, f64)> = monitors
            .into_iter()
            .map(|(name, distance)| (name.into(), distance))
            .collect();
        if let Some((name, distance)) = monitors.iter().find(|(_, d)| !d.is_finite() || *d < 0.0) {
            return Err(Error::config(format!(
                "monitor `{name}` has an invalid distance {distance}"
            )));
        }
        let cascade = place_choppers(choppers, source_position)?;
        let source = facility_source(config.facility);
        let mut rng = ChaCha8Rng::seed_from_u64(config.seed);
        let sample = source.sample(&mut rng, config.events_per_pulse, config.pulses);

        let blocked_at = sample
            .birth_time
            .par_iter()
            .zip(sample.wavelength.par_iter())
            .map(|(&birth, &wavelength)| {
                let speed = speed_from_wavelength(wavelength);
                cascade
                    .iter()
                    .find(|c| !c.chopper.is_open_at(birth + flight_time(c.distance, speed)))
                    .map_or(f64::INFINITY, |c| c.distance)
            })
            .collect();

        Ok(Self {
            monitors,
            birth_time: sample.birth_time,
            wavelength: sample.wavelength,
            blocked_at,
            pulse_period: source.pulse_period(),
            config,
        })
    }

    /// Time between source pulses (µs).
    #[must_use]
    pub fn pulse_period(&self) -> f64 {
        self.pulse_period
    }

    /// Names of the monitors.
    pub fn monitor_names(&self) -> impl Iterator<Item = &str> {
        self.monitors.iter().map(|(name, _)| name.as_str())
    }

    /// Events recorded at monitor `name`.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] if there is no monitor with that name.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    pub fn get_monitor(&self, name: &str) -> Result<FakeMonitorData> {
        let distance = self
            .monitors
            .iter()
            .find(|(n, _)| n == name)
            .map(|(_, d)| *d)
            .ok_or_else(|| Error::config(format!("unknown monitor `{name}`")))?;

        let first = self.config.first_recorded_pulse;
        let last = self.config.pulses;
        let mut pulses: Vec<Vec<(f64, f64, f64)>> = vec![Vec::new(); last.saturating_sub(first)];
        for ((&birth, &wavelength), &blocked_at) in
            self.birth_time.iter().zip(&self.wavelength).zip(&self.blocked_at)
        {
            if blocked_at <= distance {
                continue;
            }
            let tof = tof_from_wavelength(distance, wavelength);
            let arrival = birth + tof;
            let pulse = (arrival / self.pulse_period).floor();
            if pulse < first as f64 || pulse >= last as f64 {
                continue;
            }
            let pulse = pulse as usize;
            let offset = arrival - self.time_zero_ns(pulse) as f64 / NANOS_PER_MICRO;
            pulses[pulse - first].push((offset, wavelength, tof));
        }

        let mut wavelength = Vec::new();
        let mut tof = Vec::new();
        let events = EventData::from_pulses(pulses.into_iter().enumerate().map(|(i, events)| {
            let time_zero = self.time_zero_ns(first + i);
            let recorded = events
                .into_iter()
                .map(|(offset, l, t)| {
                    wavelength.push(l);
                    tof.push(t);
                    (offset, distance)
                })
                .collect();
            (time_zero, recorded)
        }));
        debug!(
            "monitor `{name}` at {distance} m recorded {} events in {} pulses",
            events.len(),
            events.n_pulses()
        );
        Ok(FakeMonitorData {
            events,
            wavelength,
            tof,
        })
    }

    #[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
    fn time_zero_ns(&self, pulse: usize) -> i64 {
        (pulse as f64 * self.pulse_period * NANOS_PER_MICRO).round() as i64
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn config() -> FakeBeamlineConfig {
        FakeBeamlineConfig {
            pulses: 3,
            events_per_pulse: 5_000,
            ..FakeBeamlineConfig::default()
        }
    }

    #[test]
    fn test_events_are_recorded_against_latest_pulse() {
        let beamline = FakeBeamline::new(&[], [0.0; 3], [("monitor", 10.0)], config()).unwrap();
        let data = beamline.get_monitor("monitor").unwrap();
        assert_eq!(data.events.n_pulses(), 3);
        assert_eq!(data.events.len(), data.tof.len());
        let period = beamline.pulse_period();
        assert!(data
            .events
            .event_time_offset()
            .iter()
            .all(|&eto| (-1e-3..period + 1e-3).contains(&eto)));
        for (&l, &t) in data.wavelength.iter().zip(&data.tof) {
            assert_relative_eq!(t, tof_from_wavelength(10.0, l), max_relative = 1e-12);
        }
    }

    #[test]
    fn test_recording_start_shifts_first_pulse() {
        let config = FakeBeamlineConfig {
            first_recorded_pulse: 1,
            ..config()
        };
        let beamline = FakeBeamline::new(&[], [0.0; 3], [("monitor", 10.0)], config).unwrap();
        let data = beamline.get_monitor("monitor").unwrap();
        assert_eq!(data.events.n_pulses(), 2);
        assert_eq!(
            data.events.event_time_zero()[0],
            (beamline.pulse_period() * 1000.0).round() as i64
        );
    }

    #[test]
    fn test_unknown_monitor() {
        let beamline = FakeBeamline::new(&[], [0.0; 3], [("monitor", 10.0)], config()).unwrap();
        assert!(beamline.get_monitor("detector").is_err());
    }
}
