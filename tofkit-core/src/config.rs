//! Configuration for lookup table construction and time-of-arrival unwrapping.

use crate::constants::{Facility, MICROS_PER_SECOND};
use crate::error::{Error, Result};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Upper bound on the number of (neutron, distance) records processed per chunk.
pub const DEFAULT_MAX_RECORDS_PER_CHUNK: usize = 20_000_000;

/// Range of total flight paths a lookup table must cover (m).
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LtotalRange {
    /// Shortest flight path (m).
    pub min: f64,
    /// Longest flight path (m).
    pub max: f64,
}

impl LtotalRange {
    /// Creates a range from its bounds.
    #[must_use]
    pub fn new(min: f64, max: f64) -> Self {
        Self { min, max }
    }

    /// Smallest range containing every value of `ltotal`, ignoring non-finite entries.
    #[must_use]
    pub fn covering(ltotal: &[f64]) -> Option<Self> {
        ltotal
            .iter()
            .copied()
            .filter(|l| l.is_finite())
            .fold(None, |range: Option<Self>, l| {
                Some(match range {
                    None => Self::new(l, l),
                    Some(r) => Self::new(r.min.min(l), r.max.max(l)),
                })
            })
    }

    /// Returns true if `ltotal` lies inside the range.
    #[must_use]
    pub fn contains(&self, ltotal: f64) -> bool {
        self.min <= ltotal && ltotal <= self.max
    }
}

/// Controls how many records the table builder processes at once.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct ChunkConfig {
    /// Explicit record limit per chunk. If set, `memory_fraction` is ignored.
    pub max_records: Option<usize>,
    /// Fraction of available system memory a chunk may use (0.0 < fraction <= 1.0).
    pub memory_fraction: f64,
}

impl Default for ChunkConfig {
    fn default() -> Self {
        Self {
            max_records: None,
            memory_fraction: 0.25,
        }
    }
}

/// Configuration for building a time-of-flight lookup table.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct LookupTableConfig {
    /// Range of total flight paths to cover (m).
    pub ltotal_range: LtotalRange,
    /// Time between source pulses (µs).
    pub pulse_period: f64,
    /// Number of source pulses per frame (2 for pulse skipping).
    pub pulse_stride: usize,
    /// Spacing of the distance axis (m).
    pub distance_resolution: f64,
    /// Spacing of the `event_time_offset` axis (µs).
    pub time_resolution: f64,
    /// Cells with a relative standard deviation above this value are masked.
    pub error_threshold: f64,
    /// Chunking of the computation along the distance axis.
    pub chunk: ChunkConfig,
}

impl LookupTableConfig {
    /// Creates a configuration covering `ltotal_range` with default parameters.
    #[must_use]
    pub fn new(ltotal_range: LtotalRange) -> Self {
        Self {
            ltotal_range,
            pulse_period: Facility::Ess.pulse_period(),
            pulse_stride: 1,
            distance_resolution: 0.1,
            time_resolution: 250.0,
            error_threshold: 0.1,
            chunk: ChunkConfig::default(),
        }
    }

    /// Sets the pulse period (µs).
    #[must_use]
    pub fn with_pulse_period(mut self, pulse_period: f64) -> Self {
        self.pulse_period = pulse_period;
        self
    }

    /// Sets the pulse period from a source frequency (Hz).
    #[must_use]
    pub fn with_source_frequency(mut self, frequency: f64) -> Self {
        self.pulse_period = MICROS_PER_SECOND / frequency;
        self
    }

    /// Sets the pulse stride.
    ///
    /// Values less than 1 are clamped to 1. Use [`Self::try_with_pulse_stride`]
    /// to surface invalid values as an error instead.
    #[must_use]
    pub fn with_pulse_stride(mut self, stride: usize) -> Self {
        self.pulse_stride = stride.max(1);
        self
    }

    /// Fallible variant of [`Self::with_pulse_stride`].
    ///
    /// # Errors
    /// Returns an error if `stride` is 0.
    pub fn try_with_pulse_stride(mut self, stride: usize) -> Result<Self> {
        if stride == 0 {
            return Err(Error::config("pulse_stride must be at least 1"));
        }
        self.pulse_stride = stride;
        Ok(self)
    }

    /// Sets the distance resolution (m).
    #[must_use]
    pub fn with_distance_resolution(mut self, resolution: f64) -> Self {
        self.distance_resolution = resolution;
        self
    }

    /// Sets the time resolution (µs).
    #[must_use]
    pub fn with_time_resolution(mut self, resolution: f64) -> Self {
        self.time_resolution = resolution;
        self
    }

    /// Sets the masking threshold on the relative standard deviation.
    #[must_use]
    pub fn with_error_threshold(mut self, threshold: f64) -> Self {
        self.error_threshold = threshold;
        self
    }

    /// Sets an explicit record limit per chunk.
    #[must_use]
    pub fn with_max_records_per_chunk(mut self, records: usize) -> Self {
        self.chunk.max_records = Some(records.max(1));
        self
    }

    /// Sets the fraction of available memory a chunk may use.
    #[must_use]
    pub fn with_memory_fraction(mut self, fraction: f64) -> Self {
        self.chunk.memory_fraction = fraction;
        self
    }

    /// Frame period, `pulse_period * pulse_stride` (µs).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frame_period(&self) -> f64 {
        self.pulse_period * self.pulse_stride as f64
    }

    /// Checks that every parameter is usable.
    ///
    /// # Errors
    /// Returns [`Error::ConfigError`] naming the first offending parameter.
    pub fn validate(&self) -> Result<()> {
        let LtotalRange { min, max } = self.ltotal_range;
        if !(min.is_finite() && max.is_finite()) || min < 0.0 || min > max {
            return Err(Error::config(format!(
                "ltotal_range must satisfy 0 <= min <= max, got ({min}, {max})"
            )));
        }
        positive("pulse_period", self.pulse_period)?;
        positive("distance_resolution", self.distance_resolution)?;
        positive("time_resolution", self.time_resolution)?;
        if self.pulse_stride == 0 {
            return Err(Error::config("pulse_stride must be at least 1"));
        }
        if self.time_resolution >= self.frame_period() {
            return Err(Error::config(format!(
                "time_resolution ({} us) must be smaller than the frame period ({} us)",
                self.time_resolution,
                self.frame_period()
            )));
        }
        if self.error_threshold.is_nan() || self.error_threshold <= 0.0 {
            return Err(Error::config(format!(
                "error_threshold must be positive, got {}",
                self.error_threshold
            )));
        }
        if self.chunk.max_records.is_none()
            && !(0.0 < self.chunk.memory_fraction && self.chunk.memory_fraction <= 1.0)
        {
            return Err(Error::config("memory_fraction must be in (0.0, 1.0]"));
        }
        Ok(())
    }
}

fn positive(name: &str, value: f64) -> Result<()> {
    if value.is_finite() && value > 0.0 {
        Ok(())
    } else {
        Err(Error::config(format!(
            "{name} must be positive and finite, got {value}"
        )))
    }
}

/// Configuration for turning raw arrival times into time-of-flight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct UnwrapConfig {
    /// Index of the first pulse of a frame among the recorded pulses.
    /// `None` infers it from the data.
    pub pulse_stride_offset: Option<usize>,
}

impl UnwrapConfig {
    /// Uses a fixed pulse-stride offset.
    #[must_use]
    pub fn with_pulse_stride_offset(mut self, offset: usize) -> Self {
        self.pulse_stride_offset = Some(offset);
        self
    }
}
