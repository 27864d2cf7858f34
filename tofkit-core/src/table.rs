//! Time-of-flight lookup table.
//!
//! The table gives the mean time-of-flight as a function of the total flight path
//! (`distance`) and the arrival time within a frame (`event_time_offset`). The time
//! axis spans exactly one frame period and is periodic: the last column is a copy of
//! the first.

use crate::error::{Error, Result};
use ndarray::{Array2, ArrayView1};

#[cfg(feature = "serde")]
use serde::{Deserialize, Serialize};

/// Parameters a lookup table was built with.
#[derive(Debug, Clone, Copy, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TableParameters {
    /// Time between consecutive source pulses (µs).
    pub pulse_period: f64,
    /// Number of source pulses per frame.
    pub pulse_stride: usize,
    /// Spacing of the distance axis (m).
    pub distance_resolution: f64,
    /// Spacing of the `event_time_offset` axis (µs).
    pub time_resolution: f64,
    /// Relative standard deviation above which cells are masked.
    pub error_threshold: f64,
}

impl TableParameters {
    /// Frame period, `pulse_period * pulse_stride` (µs).
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn frame_period(&self) -> f64 {
        self.pulse_period * self.pulse_stride as f64
    }
}

/// Lookup table giving time-of-flight as a function of distance and time of arrival.
///
/// Values are indexed `[distance, event_time_offset]`. Masked cells hold NaN, the
/// variance of every cell is kept regardless of masking.
#[derive(Debug, Clone, PartialEq)]
#[cfg_attr(feature = "serde", derive(Serialize, Deserialize))]
pub struct TofLookupTable {
    distance: Vec<f64>,
    event_time_offset: Vec<f64>,
    values: Array2<f64>,
    variances: Array2<f64>,
    parameters: TableParameters,
}

impl TofLookupTable {
    /// Assembles a table from its parts, validating the table invariants.
    ///
    /// # Errors
    /// Returns [`Error::InvalidTable`] if the axes are not strictly increasing, the
    /// array shapes do not match the axes, the time axis does not span
    /// `[0, frame_period]`, or the last time column differs from the first.
    pub fn from_parts(
        distance: Vec<f64>,
        event_time_offset: Vec<f64>,
        values: Array2<f64>,
        variances: Array2<f64>,
        parameters: TableParameters,
    ) -> Result<Self> {
        if distance.len() < 2 || event_time_offset.len() < 2 {
            return Err(Error::InvalidTable(format!(
                "axes need at least two points, got {} distances and {} times",
                distance.len(),
                event_time_offset.len()
            )));
        }
        check_increasing("distance", &distance)?;
        check_increasing("event_time_offset", &event_time_offset)?;
        let shape = (distance.len(), event_time_offset.len());
        if values.dim() != shape || variances.dim() != shape {
            return Err(Error::InvalidTable(format!(
                "expected arrays of shape {shape:?}, got values {:?} and variances {:?}",
                values.dim(),
                variances.dim()
            )));
        }
        if parameters.pulse_stride == 0 || parameters.pulse_period <= 0.0 {
            return Err(Error::InvalidTable(format!(
                "invalid pulse parameters: period {} us, stride {}",
                parameters.pulse_period, parameters.pulse_stride
            )));
        }
        let frame_period = parameters.frame_period();
        let first = event_time_offset[0];
        let last = event_time_offset[shape.1 - 1];
        let tolerance = 1e-9 * frame_period;
        if first.abs() > tolerance || (last - frame_period).abs() > tolerance {
            return Err(Error::InvalidTable(format!(
                "event_time_offset must span [0, {frame_period}], got [{first}, {last}]"
            )));
        }
        let table = Self {
            distance,
            event_time_offset,
            values,
            variances,
            parameters,
        };
        if !table.is_periodic() {
            return Err(Error::InvalidTable(
                "last event_time_offset column is not a copy of the first".to_string(),
            ));
        }
        Ok(table)
    }

    /// Distance bin centres (m).
    #[must_use]
    pub fn distance(&self) -> &[f64] {
        &self.distance
    }

    /// `event_time_offset` bin centres (µs), from 0 to the frame period inclusive.
    #[must_use]
    pub fn event_time_offset(&self) -> &[f64] {
        &self.event_time_offset
    }

    /// Mean time-of-flight per cell (µs), NaN where masked or empty.
    #[must_use]
    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    /// Variance of the time-of-flight per cell (µs²).
    #[must_use]
    pub fn variances(&self) -> &Array2<f64> {
        &self.variances
    }

    /// Parameters the table was built with.
    #[must_use]
    pub fn parameters(&self) -> &TableParameters {
        &self.parameters
    }

    /// Frame period of the table (µs).
    #[must_use]
    pub fn frame_period(&self) -> f64 {
        self.parameters.frame_period()
    }

    /// Shape of the table as `(n_distance, n_event_time_offset)`.
    #[must_use]
    pub fn shape(&self) -> (usize, usize) {
        self.values.dim()
    }

    /// Returns true if the cell holds no usable value.
    #[must_use]
    pub fn is_masked(&self, distance_index: usize, time_index: usize) -> bool {
        self.values[[distance_index, time_index]].is_nan()
    }

    /// Number of cells holding NaN.
    #[must_use]
    pub fn masked_count(&self) -> usize {
        self.values.iter().filter(|v| v.is_nan()).count()
    }

    /// Values along the time axis at one distance index.
    #[must_use]
    pub fn row(&self, distance_index: usize) -> ArrayView1<'_, f64> {
        self.values.row(distance_index)
    }

    /// Range of total flight paths covered without extrapolation (m).
    #[must_use]
    pub fn distance_range(&self) -> (f64, f64) {
        (self.distance[0], self.distance[self.distance.len() - 1])
    }

    /// Returns true if the last time column is bitwise identical to the first.
    #[must_use]
    pub fn is_periodic(&self) -> bool {
        let last = self.event_time_offset.len() - 1;
        let same = |a: ArrayView1<'_, f64>, b: ArrayView1<'_, f64>| {
            a.iter().zip(b.iter()).all(|(x, y)| x.to_bits() == y.to_bits())
        };
        same(self.values.column(0), self.values.column(last))
            && same(self.variances.column(0), self.variances.column(last))
    }

    /// Returns a copy with cells whose relative standard deviation exceeds
    /// `threshold` set to NaN.
    ///
    /// Variances are kept, so a later call with a larger threshold masks no cell
    /// this one left unmasked.
    #[must_use]
    pub fn mask_large_uncertainty(&self, threshold: f64) -> Self {
        let mut masked = self.clone();
        masked
            .values
            .zip_mut_with(&self.variances, |value, &variance| {
                if variance.sqrt() / *value > threshold {
                    *value = f64::NAN;
                }
            });
        masked.parameters.error_threshold = threshold;
        masked
    }

    /// Consumes the table and returns its parts.
    #[must_use]
    pub fn into_parts(self) -> (Vec<f64>, Vec<f64>, Array2<f64>, Array2<f64>, TableParameters) {
        (
            self.distance,
            self.event_time_offset,
            self.values,
            self.variances,
            self.parameters,
        )
    }
}

fn check_increasing(name: &str, axis: &[f64]) -> Result<()> {
    if axis.iter().any(|x| !x.is_finite()) || axis.windows(2).any(|w| w[1] <= w[0]) {
        return Err(Error::InvalidTable(format!(
            "`{name}` axis must be finite and strictly increasing"
        )));
    }
    Ok(())
}
