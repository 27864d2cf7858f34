//! Disk choppers.

use serde::{Deserialize, Serialize};
use tofkit_core::constants::MICROS_PER_SECOND;
use tofkit_core::{Error, Result};

/// A three-dimensional position (m).
pub type Position = [f64; 3];

/// Rotation direction of a disk chopper, seen from the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    /// Positive frequency.
    AntiClockwise,
    /// Negative frequency.
    Clockwise,
}

/// A rotating disk with one or more slits.
///
/// Angles are in degrees and measured in the rotation direction from the top
/// dead centre. The sign of `frequency` gives the rotation direction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DiskChopper {
    /// Rotation frequency (Hz), negative for clockwise rotation.
    pub frequency: f64,
    /// Phase of the disk (degrees).
    pub phase: f64,
    /// Angle at which each slit opens (degrees).
    pub slit_begin: Vec<f64>,
    /// Angle at which each slit closes (degrees).
    pub slit_end: Vec<f64>,
    /// Position of the axle (m).
    pub axle_position: Position,
}

impl DiskChopper {
    /// Creates a chopper with a single slit.
    #[must_use]
    pub fn single_slit(
        frequency: f64,
        phase: f64,
        slit: (f64, f64),
        axle_position: Position,
    ) -> Self {
        Self {
            frequency,
            phase,
            slit_begin: vec![slit.0],
            slit_end: vec![slit.1],
            axle_position,
        }
    }

    /// Checks frequency and slit geometry.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] for a zero or non-finite frequency, slits with
    /// mismatched begin/end counts, or slits that close before they open.
    pub fn validate(&self) -> Result<()> {
        if !self.frequency.is_finite() || self.frequency == 0.0 {
            return Err(Error::config(format!(
                "chopper frequency must be finite and non-zero, got {}",
                self.frequency
            )));
        }
        if !self.phase.is_finite() {
            return Err(Error::config("chopper phase must be finite"));
        }
        if self.slit_begin.len() != self.slit_end.len() {
            return Err(Error::LengthMismatch {
                field: "slit_end",
                expected: self.slit_begin.len(),
                actual: self.slit_end.len(),
            });
        }
        for (begin, end) in self.slit_begin.iter().zip(&self.slit_end) {
            if !(begin.is_finite() && end.is_finite()) || end < begin || end - begin > 360.0 {
                return Err(Error::config(format!(
                    "invalid chopper slit [{begin}, {end}] degrees"
                )));
            }
        }
        Ok(())
    }

    /// Rotation direction.
    #[must_use]
    pub fn direction(&self) -> Direction {
        if self.frequency > 0.0 {
            Direction::AntiClockwise
        } else {
            Direction::Clockwise
        }
    }

    /// Distance of the axle from `source_position` (m).
    #[must_use]
    pub fn distance_from(&self, source_position: Position) -> f64 {
        self.axle_position
            .iter()
            .zip(source_position)
            .map(|(a, s)| (a - s).powi(2))
            .sum::<f64>()
            .sqrt()
    }

    /// Slits as seen in the rotation frame, mirrored for clockwise rotation.
    fn slits(&self) -> impl Iterator<Item = (f64, f64)> + '_ {
        let mirror = self.direction() == Direction::Clockwise;
        self.slit_begin
            .iter()
            .zip(&self.slit_end)
            .map(move |(&begin, &end)| {
                if mirror {
                    (360.0 - end, 360.0 - begin)
                } else {
                    (begin, end)
                }
            })
    }

    /// Returns true if a neutron reaching the chopper at `time` (µs) passes.
    #[must_use]
    pub fn is_open_at(&self, time: f64) -> bool {
        let turns = self.frequency.abs() * time / MICROS_PER_SECOND;
        let angle = (360.0 * turns - self.phase.abs()).rem_euclid(360.0);
        self.slits().any(|(begin, end)| {
            let start = begin.rem_euclid(360.0);
            let stop = start + (end - begin);
            (start..=stop).contains(&angle) || (start..=stop).contains(&(angle + 360.0))
        })
    }

    /// Opening and closing times (µs) of every slit during the first rotation.
    #[must_use]
    pub fn open_windows(&self) -> Vec<(f64, f64)> {
        let degrees_per_micro = 360.0 * self.frequency.abs() / MICROS_PER_SECOND;
        let phase = self.phase.abs();
        let mut windows: Vec<(f64, f64)> = self
            .slits()
            .map(|(begin, end)| {
                (
                    (begin + phase) / degrees_per_micro,
                    (end + phase) / degrees_per_micro,
                )
            })
            .collect();
        windows.sort_by(|a, b| a.0.total_cmp(&b.0));
        windows
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn chopper() -> DiskChopper {
        DiskChopper::single_slit(14.0, 25.2, (0.0, 1.512), [0.0, 0.0, 5.0])
    }

    #[test]
    fn test_open_window_timing() {
        let chopper = chopper();
        let windows = chopper.open_windows();
        assert_eq!(windows.len(), 1);
        assert_relative_eq!(windows[0].0, 5000.0, epsilon = 1e-6);
        assert_relative_eq!(windows[0].1, 5300.0, epsilon = 1e-6);
        assert!(chopper.is_open_at(5150.0));
        assert!(!chopper.is_open_at(4990.0));
        assert!(!chopper.is_open_at(5310.0));
        // one rotation later
        assert!(chopper.is_open_at(5150.0 + 1.0e6 / 14.0));
    }

    #[test]
    fn test_clockwise_mirrors_slits() {
        let mut chopper = DiskChopper::single_slit(-10.0, 0.0, (10.0, 20.0), [0.0, 0.0, 1.0]);
        assert_eq!(chopper.direction(), Direction::Clockwise);
        let windows = chopper.open_windows();
        let degrees_per_micro = 360.0 * 10.0 / 1.0e6;
        assert_relative_eq!(windows[0].0, 340.0 / degrees_per_micro, epsilon = 1e-6);
        assert!(chopper.is_open_at(345.0 / degrees_per_micro));
        assert!(!chopper.is_open_at(15.0 / degrees_per_micro));
        chopper.frequency = 10.0;
        assert!(chopper.is_open_at(15.0 / degrees_per_micro));
    }

    #[test]
    fn test_distance_and_validation() {
        let chopper = DiskChopper::single_slit(14.0, 0.0, (0.0, 10.0), [3.0, 4.0, 0.0]);
        assert_relative_eq!(chopper.distance_from([0.0, 0.0, 0.0]), 5.0);
        assert!(chopper.validate().is_ok());

        let mut bad = chopper.clone();
        bad.frequency = 0.0;
        assert!(bad.validate().is_err());
        let mut bad = chopper;
        bad.slit_end.push(20.0);
        assert!(matches!(bad.validate(), Err(Error::LengthMismatch { .. })));
    }

    #[test]
    fn test_json_layout() {
        let json = r#"{"frequency": 14.0, "phase": 25.2, "slit_begin": [0.0],
                       "slit_end": [1.512], "axle_position": [0.0, 0.0, 5.0]}"#;
        let parsed: DiskChopper = serde_json::from_str(json).unwrap();
        assert_eq!(parsed, chopper());
    }
}
