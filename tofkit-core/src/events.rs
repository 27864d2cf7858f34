//! Raw detector/monitor data and time-of-flight results.
//!
//! Event data follows the `NXevent_data` layout: one `event_time_zero` per source
//! pulse, `event_index` pointing at the first event of each pulse, and per-event
//! `event_time_offset` values measured from the pulse time.

use crate::constants::{wavelength_from_tof, NANOS_PER_MICRO};
use crate::error::{Error, Result};
use std::ops::Range;

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Pulse-structured neutron events.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct EventData {
    event_time_zero: Vec<i64>,
    event_index: Vec<usize>,
    event_time_offset: Vec<f64>,
    ltotal: Vec<f64>,
}

impl EventData {
    /// Creates event data from its columns.
    ///
    /// * `event_time_zero` - pulse times (ns), one per pulse.
    /// * `event_index` - index of the first event of each pulse.
    /// * `event_time_offset` - arrival time relative to the pulse (µs), one per event.
    /// * `ltotal` - total flight path (m), one per event.
    ///
    /// # Errors
    /// Returns an error if the per-pulse or per-event columns differ in length,
    /// or if `event_index` does not start at 0, decreases, or points past the end.
    pub fn new(
        event_time_zero: Vec<i64>,
        event_index: Vec<usize>,
        event_time_offset: Vec<f64>,
        ltotal: Vec<f64>,
    ) -> Result<Self> {
        if event_index.len() != event_time_zero.len() {
            return Err(Error::LengthMismatch {
                field: "event_index",
                expected: event_time_zero.len(),
                actual: event_index.len(),
            });
        }
        if ltotal.len() != event_time_offset.len() {
            return Err(Error::LengthMismatch {
                field: "ltotal",
                expected: event_time_offset.len(),
                actual: ltotal.len(),
            });
        }
        if let Some(&first) = event_index.first() {
            if first != 0 {
                return Err(Error::ShapeError(format!(
                    "event_index must start at 0, got {first}"
                )));
            }
        } else if !event_time_offset.is_empty() {
            return Err(Error::ShapeError(
                "events present but no pulses recorded".to_string(),
            ));
        }
        if event_index.windows(2).any(|w| w[1] < w[0]) {
            return Err(Error::ShapeError(
                "event_index must be non-decreasing".to_string(),
            ));
        }
        if event_index.last().is_some_and(|&last| last > event_time_offset.len()) {
            return Err(Error::ShapeError(format!(
                "event_index points past the last of {} events",
                event_time_offset.len()
            )));
        }
        Ok(Self {
            event_time_zero,
            event_index,
            event_time_offset,
            ltotal,
        })
    }

    /// Builds event data from per-pulse groups of `(event_time_offset, ltotal)` pairs.
    #[must_use]
    pub fn from_pulses<I>(pulses: I) -> Self
    where
        I: IntoIterator<Item = (i64, Vec<(f64, f64)>)>,
    {
        let mut data = Self::default();
        for (time_zero, events) in pulses {
            data.event_time_zero.push(time_zero);
            data.event_index.push(data.event_time_offset.len());
            for (offset, ltotal) in events {
                data.event_time_offset.push(offset);
                data.ltotal.push(ltotal);
            }
        }
        data
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.event_time_offset.len()
    }

    /// Returns true if there are no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.event_time_offset.is_empty()
    }

    /// Number of pulses.
    #[must_use]
    pub fn n_pulses(&self) -> usize {
        self.event_time_zero.len()
    }

    /// Pulse times (ns).
    #[must_use]
    pub fn event_time_zero(&self) -> &[i64] {
        &self.event_time_zero
    }

    /// Index of the first event of each pulse.
    #[must_use]
    pub fn event_index(&self) -> &[usize] {
        &self.event_index
    }

    /// Arrival times relative to the pulse (µs).
    #[must_use]
    pub fn event_time_offset(&self) -> &[f64] {
        &self.event_time_offset
    }

    /// Total flight path of every event (m).
    #[must_use]
    pub fn ltotal(&self) -> &[f64] {
        &self.ltotal
    }

    /// Range of event indices belonging to pulse `pulse`.
    #[must_use]
    pub fn pulse_range(&self, pulse: usize) -> Range<usize> {
        let start = self.event_index[pulse];
        let end = self
            .event_index
            .get(pulse + 1)
            .copied()
            .unwrap_or(self.event_time_offset.len());
        start..end
    }

    /// Earliest pulse time (ns), if any pulse was recorded.
    #[must_use]
    pub fn min_event_time_zero(&self) -> Option<i64> {
        self.event_time_zero.iter().copied().min()
    }

    /// Pulse time (ns) of every event, expanded from the pulse structure.
    #[must_use]
    pub fn event_time_zero_per_event(&self) -> Vec<i64> {
        let mut out = Vec::with_capacity(self.len());
        for (pulse, &time_zero) in self.event_time_zero.iter().enumerate() {
            let range = self.pulse_range(pulse);
            out.extend(std::iter::repeat(time_zero).take(range.len()));
        }
        out
    }

    /// Time (µs) of every event relative to the earliest pulse time.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn time_since_first_pulse(&self) -> Vec<f64> {
        let Some(min_zero) = self.min_event_time_zero() else {
            return Vec::new();
        };
        let mut out = Vec::with_capacity(self.len());
        for (pulse, &time_zero) in self.event_time_zero.iter().enumerate() {
            let shift = (time_zero - min_zero) as f64 / NANOS_PER_MICRO;
            let range = self.pulse_range(pulse);
            out.extend(self.event_time_offset[range].iter().map(|eto| eto + shift));
        }
        out
    }

    /// Appends the pulses of `other` after the pulses of `self`.
    pub fn extend(&mut self, other: &EventData) {
        let offset = self.event_time_offset.len();
        self.event_time_zero.extend_from_slice(&other.event_time_zero);
        self.event_index
            .extend(other.event_index.iter().map(|i| i + offset));
        self.event_time_offset
            .extend_from_slice(&other.event_time_offset);
        self.ltotal.extend_from_slice(&other.ltotal);
    }
}

/// Meaning of the time axis of histogrammed data.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum TimeAxis {
    /// Time of arrival, already unwrapped.
    TimeOfFlight,
    /// Time of arrival labelled `tof` by the acquisition system.
    Tof,
    /// Time since the start of the frame.
    FrameTime,
}

impl TimeAxis {
    /// Name of the axis in `NXdata` files.
    #[must_use]
    pub fn name(self) -> &'static str {
        match self {
            Self::TimeOfFlight => "time_of_flight",
            Self::Tof => "tof",
            Self::FrameTime => "frame_time",
        }
    }
}

/// Counts histogrammed along a time-of-arrival axis at a single flight path.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct HistogramData {
    axis: TimeAxis,
    edges: Vec<f64>,
    counts: Vec<f64>,
    variances: Option<Vec<f64>>,
    ltotal: f64,
}

impl HistogramData {
    /// Creates histogrammed data.
    ///
    /// # Errors
    /// Returns an error if `edges` does not have one more entry than `counts`,
    /// if the edges are not sorted, or if `variances` has the wrong length.
    pub fn new(
        axis: TimeAxis,
        edges: Vec<f64>,
        counts: Vec<f64>,
        variances: Option<Vec<f64>>,
        ltotal: f64,
    ) -> Result<Self> {
        if edges.len() != counts.len() + 1 {
            return Err(Error::LengthMismatch {
                field: "edges",
                expected: counts.len() + 1,
                actual: edges.len(),
            });
        }
        if edges.windows(2).any(|w| !(w[0] <= w[1])) {
            return Err(Error::ShapeError(format!(
                "`{}` bin edges must be sorted",
                axis.name()
            )));
        }
        if let Some(variances) = &variances {
            if variances.len() != counts.len() {
                return Err(Error::LengthMismatch {
                    field: "variances",
                    expected: counts.len(),
                    actual: variances.len(),
                });
            }
        }
        Ok(Self {
            axis,
            edges,
            counts,
            variances,
            ltotal,
        })
    }

    /// Kind of time axis.
    #[must_use]
    pub fn axis(&self) -> TimeAxis {
        self.axis
    }

    /// Bin edges of the time axis (µs).
    #[must_use]
    pub fn edges(&self) -> &[f64] {
        &self.edges
    }

    /// Counts per bin.
    #[must_use]
    pub fn counts(&self) -> &[f64] {
        &self.counts
    }

    /// Variances per bin, if tracked.
    #[must_use]
    pub fn variances(&self) -> Option<&[f64]> {
        self.variances.as_deref()
    }

    /// Flight path (m).
    #[must_use]
    pub fn ltotal(&self) -> f64 {
        self.ltotal
    }

    /// Adds the counts of `other` bin by bin.
    ///
    /// # Errors
    /// Returns an error if the two histograms do not share the same bin edges.
    pub fn add(&mut self, other: &HistogramData) -> Result<()> {
        if self.edges != other.edges || self.axis != other.axis {
            return Err(Error::ShapeError(
                "cannot add histograms with different time axes".to_string(),
            ));
        }
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        self.variances = match (self.variances.take(), &other.variances) {
            (Some(mut a), Some(b)) => {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                Some(a)
            }
            _ => None,
        };
        Ok(())
    }
}

/// Raw data in either event or histogram mode.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub enum RawData {
    /// Event mode.
    Events(EventData),
    /// Histogram mode.
    Histogram(HistogramData),
}

/// Events with the computed time-of-flight attached.
#[derive(Debug, Clone, Default, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TofEventData {
    events: EventData,
    tof: Vec<f64>,
}

impl TofEventData {
    /// Attaches time-of-flight values (µs) to events.
    ///
    /// # Errors
    /// Returns [`Error::LengthMismatch`] if there is not one value per event.
    pub fn new(events: EventData, tof: Vec<f64>) -> Result<Self> {
        if tof.len() != events.len() {
            return Err(Error::LengthMismatch {
                field: "tof",
                expected: events.len(),
                actual: tof.len(),
            });
        }
        Ok(Self { events, tof })
    }

    /// The underlying events.
    #[must_use]
    pub fn events(&self) -> &EventData {
        &self.events
    }

    /// Time-of-flight of every event (µs), NaN where the table is masked.
    #[must_use]
    pub fn tof(&self) -> &[f64] {
        &self.tof
    }

    /// Number of events.
    #[must_use]
    pub fn len(&self) -> usize {
        self.tof.len()
    }

    /// Returns true if there are no events.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.tof.is_empty()
    }

    /// Wavelength of every event (Å), from its time-of-flight and flight path.
    #[must_use]
    pub fn wavelength(&self) -> Vec<f64> {
        self.tof
            .iter()
            .zip(self.events.ltotal())
            .map(|(&tof, &ltotal)| wavelength_from_tof(ltotal, tof))
            .collect()
    }

    /// Appends the events of `other`.
    pub fn extend(&mut self, other: &TofEventData) {
        self.events.extend(&other.events);
        self.tof.extend_from_slice(&other.tof);
    }
}

/// Histogrammed counts with time-of-flight bin edges.
///
/// The edges are the time-of-flight of the original time-of-arrival edges and
/// are not guaranteed to be sorted or finite.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TofHistogram {
    /// Time-of-flight bin edges (µs).
    pub tof_edges: Vec<f64>,
    /// Counts per bin.
    pub counts: Vec<f64>,
    /// Variances per bin, if tracked.
    pub variances: Option<Vec<f64>>,
    /// Flight path (m).
    pub ltotal: f64,
}

impl TofHistogram {
    /// Adds the counts of `other` bin by bin.
    ///
    /// # Errors
    /// Returns an error if the two histograms differ in bin count.
    pub fn add(&mut self, other: &TofHistogram) -> Result<()> {
        if self.counts.len() != other.counts.len() {
            return Err(Error::LengthMismatch {
                field: "counts",
                expected: self.counts.len(),
                actual: other.counts.len(),
            });
        }
        for (a, b) in self.counts.iter_mut().zip(&other.counts) {
            *a += b;
        }
        self.variances = match (self.variances.take(), &other.variances) {
            (Some(mut a), Some(b)) => {
                for (x, y) in a.iter_mut().zip(b) {
                    *x += y;
                }
                Some(a)
            }
            _ => None,
        };
        Ok(())
    }
}
