//! Conversion of raw arrival times to time-of-flight.
//!
//! Recorded arrival times are first unwrapped against the earliest pulse time,
//! then folded into frames that start at the pivot time: the arrival of the fastest
//! simulated neutron at the detector. The folded time selects the lookup-table
//! column, the flight path selects the row.

use crate::interpolate::TofInterpolator;
use log::{debug, warn};
use tofkit_core::{
    Error, EventData, Facility, FastestNeutron, RawData, Result, SimulationResults, TofEventData,
    TofHistogram, TofLookupTable, TofStatistics, UnwrapConfig,
};

/// Arrival time at the detector (µs), unwrapped over pulses.
#[derive(Debug, Clone, PartialEq)]
pub struct UnwrappedTimeOfArrival(pub Vec<f64>);

/// Start of the frame at the detector (µs), one value per flight path.
#[derive(Debug, Clone, PartialEq)]
pub struct PivotTimeAtDetector(pub Vec<f64>);

impl PivotTimeAtDetector {
    /// Pivot time for element `index`; a single value applies to every element.
    #[must_use]
    pub fn at(&self, index: usize) -> Option<f64> {
        if self.0.len() == 1 {
            self.0.first().copied()
        } else {
            self.0.get(index).copied()
        }
    }
}

/// Arrival time folded into `[pivot, pivot + frame_period)` (µs).
#[derive(Debug, Clone, PartialEq)]
pub struct FrameFoldedTimeOfArrival(pub Vec<f64>);

/// Raw data with time-of-flight attached.
#[derive(Debug, Clone, PartialEq)]
pub enum TofData {
    /// Events with a per-event time-of-flight.
    Events(TofEventData),
    /// Histogram with time-of-flight bin edges.
    Histogram(TofHistogram),
}

impl TofData {
    /// Statistics over the computed time-of-flight values.
    #[must_use]
    pub fn statistics(&self) -> TofStatistics {
        match self {
            Self::Events(events) => TofStatistics::from_values(events.tof()),
            Self::Histogram(hist) => TofStatistics::from_values(&hist.tof_edges),
        }
    }
}

/// Time between pulses of `facility` (µs).
#[must_use]
pub fn pulse_period_from_source(facility: Facility) -> f64 {
    facility.pulse_period()
}

/// Time between the starts of two frames (µs).
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn frame_period(pulse_period: f64, pulse_stride: usize) -> f64 {
    pulse_period * pulse_stride as f64
}

/// Total flight path of every element of `raw` (m).
#[must_use]
pub fn extract_ltotal(raw: &RawData) -> Vec<f64> {
    match raw {
        RawData::Events(events) => events.ltotal().to_vec(),
        RawData::Histogram(hist) => vec![hist.ltotal()],
    }
}

/// Unwraps event arrival times relative to the earliest pulse time.
///
/// `offset` is the index of the first pulse of a frame among the recorded pulses.
#[must_use]
#[allow(clippy::cast_precision_loss)]
pub fn unwrap_events(events: &EventData, offset: usize, pulse_period: f64) -> UnwrappedTimeOfArrival {
    let shift = offset as f64 * pulse_period;
    UnwrappedTimeOfArrival(
        events
            .time_since_first_pulse()
            .into_iter()
            .map(|t| t - shift)
            .collect(),
    )
}

/// Unwrapped time of arrival of raw data.
///
/// For events this is `event_time_offset + (event_time_zero - min(event_time_zero)) -
/// offset * pulse_period`. For histograms the time axis edges are used as they are.
#[must_use]
pub fn unwrapped_time_of_arrival(
    raw: &RawData,
    offset: usize,
    pulse_period: f64,
) -> UnwrappedTimeOfArrival {
    match raw {
        RawData::Events(events) => unwrap_events(events, offset, pulse_period),
        RawData::Histogram(hist) => UnwrappedTimeOfArrival(hist.edges().to_vec()),
    }
}

/// Arrival time of the fastest simulated neutron at each flight path.
///
/// This assumes the fastest neutron is the first to arrive. A slightly slower
/// neutron born earlier could arrive first, the difference is small.
#[must_use]
pub fn pivot_time_at_detector(fastest: &FastestNeutron, ltotal: &[f64]) -> PivotTimeAtDetector {
    PivotTimeAtDetector(ltotal.iter().map(|&l| fastest.time_at(l)).collect())
}

/// Folds unwrapped arrival times into frames starting at the pivot time:
/// `(toa - pivot) mod frame_period + pivot`.
///
/// `pivot` holds either one value for all arrival times or one per arrival time.
///
/// # Errors
/// Returns [`Error::LengthMismatch`] for any other pivot length.
pub fn frame_folded_time_of_arrival(
    toa: &UnwrappedTimeOfArrival,
    pivot: &PivotTimeAtDetector,
    frame_period: f64,
) -> Result<FrameFoldedTimeOfArrival> {
    if pivot.0.len() != 1 && pivot.0.len() != toa.0.len() {
        return Err(Error::LengthMismatch {
            field: "pivot",
            expected: toa.0.len(),
            actual: pivot.0.len(),
        });
    }
    let single = pivot.0.len() == 1;
    Ok(FrameFoldedTimeOfArrival(
        toa.0
            .iter()
            .enumerate()
            .map(|(i, &t)| {
                let p = pivot.0[if single { 0 } else { i }];
                (t - p).rem_euclid(frame_period) + p
            })
            .collect(),
    ))
}

/// Interpolates the time-of-flight of every folded arrival time.
fn interpolate(
    table: &TofLookupTable,
    ltotal: &[f64],
    folded: &FrameFoldedTimeOfArrival,
) -> Vec<f64> {
    let interpolator = TofInterpolator::new(table);
    if ltotal.len() == 1 {
        let l = ltotal[0];
        folded.0.iter().map(|&t| interpolator.evaluate(l, t)).collect()
    } else {
        interpolator.evaluate_many(ltotal, &folded.0)
    }
}

/// Pivot times, or zero when no simulation is at hand.
///
/// The table is periodic in the frame period, so the pivot only changes where the
/// fold happens, not the interpolated result.
fn pivot_or_zero(fastest: Option<&FastestNeutron>, ltotal: &[f64]) -> PivotTimeAtDetector {
    match fastest {
        Some(fastest) => pivot_time_at_detector(fastest, ltotal),
        None => PivotTimeAtDetector(vec![0.0]),
    }
}

/// Time-of-flight of events for a given pulse-stride offset.
fn event_tofs(
    events: &EventData,
    table: &TofLookupTable,
    fastest: Option<&FastestNeutron>,
    offset: usize,
) -> Result<Vec<f64>> {
    let parameters = table.parameters();
    let toa = unwrap_events(events, offset, parameters.pulse_period);
    let pivot = pivot_or_zero(fastest, events.ltotal());
    let folded = frame_folded_time_of_arrival(&toa, &pivot, table.frame_period())?;
    Ok(interpolate(table, events.ltotal(), &folded))
}

/// Infers which recorded pulse starts a frame.
///
/// Every offset in `[0, pulse_stride)` is tried and the one yielding the fewest NaN
/// time-of-flight values wins. A stride of 1 always gives 0.
///
/// # Errors
/// Returns [`Error::PulseStrideOffsetUndetermined`] if there are no events, if every
/// offset yields only NaN, or if the best two offsets tie.
pub fn guess_pulse_stride_offset(
    events: &EventData,
    table: &TofLookupTable,
    fastest: Option<&FastestNeutron>,
) -> Result<usize> {
    let stride = table.parameters().pulse_stride;
    if stride <= 1 {
        return Ok(0);
    }
    if events.is_empty() {
        return Err(Error::PulseStrideOffsetUndetermined(
            "no events to infer the offset from".to_string(),
        ));
    }
    let mut nans: Vec<(usize, usize)> = (0..stride)
        .map(|offset| {
            let stats = TofStatistics::from_values(&event_tofs(events, table, fastest, offset)?);
            debug!("pulse stride offset {offset}: {} NaN values", stats.nan_count);
            Ok((offset, stats.nan_count))
        })
        .collect::<Result<_>>()?;
    nans.sort_by_key(|&(_, count)| count);
    let (best, best_count) = nans[0];
    if best_count == events.len() {
        return Err(Error::PulseStrideOffsetUndetermined(format!(
            "all {stride} offsets give only NaN time-of-flight values"
        )));
    }
    if nans[1].1 == best_count {
        return Err(Error::PulseStrideOffsetUndetermined(format!(
            "offsets {best} and {} give the same number ({best_count}) of NaN values",
            nans[1].0
        )));
    }
    Ok(best)
}

/// Converts raw data to time-of-flight using a lookup table.
///
/// Without an explicit pulse-stride offset in `config`, the offset is inferred from
/// the data with [`guess_pulse_stride_offset`].
///
/// # Errors
/// Returns an error if the simulation is empty or the offset cannot be inferred.
pub fn time_of_flight_data(
    raw: &RawData,
    table: &TofLookupTable,
    simulation: &SimulationResults,
    config: &UnwrapConfig,
) -> Result<TofData> {
    let fastest = simulation.fastest_neutron()?;
    time_of_flight_data_with_pivot(raw, table, Some(&fastest), config)
}

/// Like [`time_of_flight_data`] with the fastest neutron already known.
///
/// Without a fastest neutron (for instance with a table loaded from file) arrival
/// times are folded around zero.
///
/// # Errors
/// Returns an error if the offset cannot be inferred or is not below the stride.
pub fn time_of_flight_data_with_pivot(
    raw: &RawData,
    table: &TofLookupTable,
    fastest: Option<&FastestNeutron>,
    config: &UnwrapConfig,
) -> Result<TofData> {
    let stride = table.parameters().pulse_stride;
    match raw {
        RawData::Events(events) => {
            let offset = match config.pulse_stride_offset {
                Some(offset) if offset >= stride => {
                    return Err(Error::config(format!(
                        "pulse_stride_offset {offset} must be smaller than the stride {stride}"
                    )));
                }
                Some(offset) => offset,
                None => {
                    let offset = guess_pulse_stride_offset(events, table, fastest)?;
                    if stride > 1 {
                        warn!("pulse_stride_offset not set, inferred {offset} from the data");
                    }
                    offset
                }
            };
            let tof = event_tofs(events, table, fastest, offset)?;
            Ok(TofData::Events(TofEventData::new(events.clone(), tof)?))
        }
        RawData::Histogram(hist) => {
            let ltotal = [hist.ltotal()];
            let toa = UnwrappedTimeOfArrival(hist.edges().to_vec());
            let pivot = pivot_or_zero(fastest, &ltotal);
            let folded = frame_folded_time_of_arrival(&toa, &pivot, table.frame_period())?;
            Ok(TofData::Histogram(TofHistogram {
                tof_edges: interpolate(table, &ltotal, &folded),
                counts: hist.counts().to_vec(),
                variances: hist.variances().map(<[f64]>::to_vec),
                ltotal: hist.ltotal(),
            }))
        }
    }
}
