//! Bilinear interpolation of the lookup table.

use rayon::prelude::*;
use tofkit_core::TofLookupTable;

/// Bilinear interpolator over the `(distance, event_time_offset)` grid of a table.
///
/// Arrival times are reduced modulo the frame period before lookup, so any
/// frame-folded time of arrival can be passed in directly. Queries outside the
/// distance axis, or in a cell with a masked corner, yield NaN.
#[derive(Debug, Clone, Copy)]
pub struct TofInterpolator<'a> {
    table: &'a TofLookupTable,
    frame_period: f64,
}

impl<'a> TofInterpolator<'a> {
    /// Creates an interpolator over `table`.
    #[must_use]
    pub fn new(table: &'a TofLookupTable) -> Self {
        Self {
            table,
            frame_period: table.frame_period(),
        }
    }

    /// Time-of-flight (µs) of a neutron with total flight path `ltotal` (m) arriving
    /// at `time_of_arrival` (µs).
    #[must_use]
    pub fn evaluate(&self, ltotal: f64, time_of_arrival: f64) -> f64 {
        let Some((i, fx)) = locate(self.table.distance(), ltotal) else {
            return f64::NAN;
        };
        if !time_of_arrival.is_finite() {
            return f64::NAN;
        }
        let eto = time_of_arrival.rem_euclid(self.frame_period);
        let Some((j, fy)) = locate(self.table.event_time_offset(), eto) else {
            return f64::NAN;
        };
        let values = self.table.values();
        let v00 = values[[i, j]];
        let v01 = values[[i, j + 1]];
        let v10 = values[[i + 1, j]];
        let v11 = values[[i + 1, j + 1]];
        lerp(lerp(v00, v01, fy), lerp(v10, v11, fy), fx)
    }

    /// Evaluates many points in parallel. `ltotal` and `time_of_arrival` are paired
    /// element by element.
    #[must_use]
    pub fn evaluate_many(&self, ltotal: &[f64], time_of_arrival: &[f64]) -> Vec<f64> {
        ltotal
            .par_iter()
            .zip(time_of_arrival.par_iter())
            .map(|(&l, &t)| self.evaluate(l, t))
            .collect()
    }
}

// Corners with zero weight are skipped so that a masked neighbour does not leak
// into queries lying exactly on a grid line.
#[allow(clippy::float_cmp)]
fn lerp(a: f64, b: f64, frac: f64) -> f64 {
    if frac == 0.0 {
        a
    } else if frac == 1.0 {
        b
    } else {
        (1.0 - frac) * a + frac * b
    }
}

/// Index of the grid cell containing `x` and the fractional position inside it.
fn locate(axis: &[f64], x: f64) -> Option<(usize, f64)> {
    let last = axis.len().checked_sub(1)?;
    if last == 0 || !(axis[0] <= x && x <= axis[last]) {
        return None;
    }
    let i = axis.partition_point(|&a| a <= x).saturating_sub(1).min(last - 1);
    let frac = (x - axis[i]) / (axis[i + 1] - axis[i]);
    Some((i, frac))
}
