//! tofkit-algorithms: Time-of-flight lookup tables and arrival-time unwrapping.
//!
//! This crate provides:
//! - **Lookup table builder** - Weighted mean time-of-flight per (distance, time) cell
//! - **Unwrapper** - Unwraps and frame-folds recorded arrival times, pulse skipping included
//! - **Interpolator** - Bilinear, periodic in time, NaN outside the table
//! - **Re-histogramming** - Sorted time-of-flight bins for histogram data (experimental)
//!
#![warn(missing_docs)]

mod frame;
mod interpolate;
mod lookup_table;
mod rehistogram;
mod unwrap;

pub use frame::{arrival_window, check_frame_bounds};
pub use interpolate::TofInterpolator;
pub use lookup_table::{
    build_lookup_table, compute_lookup_table, mask_large_uncertainty, resolve_max_records,
};
pub use rehistogram::rehistogram_tof;
pub use unwrap::{
    extract_ltotal, frame_folded_time_of_arrival, frame_period, guess_pulse_stride_offset,
    pivot_time_at_detector, pulse_period_from_source, time_of_flight_data,
    time_of_flight_data_with_pivot, unwrap_events, unwrapped_time_of_arrival,
    FrameFoldedTimeOfArrival, PivotTimeAtDetector, TofData, UnwrappedTimeOfArrival,
};
