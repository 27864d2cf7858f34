//! Validation of frame boundaries at the detector.

use log::debug;
use rayon::prelude::*;
use tofkit_core::constants::flight_time;
use tofkit_core::{Error, Result, SimulationResults};

/// Earliest and latest arrival (µs) of the simulated neutrons at `ltotal` (m).
///
/// Returns `None` if no neutron carries weight.
#[must_use]
pub fn arrival_window(simulation: &SimulationResults, ltotal: f64) -> Option<(f64, f64)> {
    let distance = ltotal - simulation.distance();
    simulation
        .time_of_arrival()
        .par_iter()
        .zip(simulation.speed().par_iter())
        .zip(simulation.weight().par_iter())
        .filter(|(_, w)| **w > 0.0)
        .map(|((&t, &v), _)| t + flight_time(distance, v))
        .filter(|t| t.is_finite())
        .fold(
            || None,
            |acc: Option<(f64, f64)>, t| Some(acc.map_or((t, t), |(lo, hi)| (lo.min(t), hi.max(t)))),
        )
        .reduce(
            || None,
            |a, b| match (a, b) {
                (Some((lo_a, hi_a)), Some((lo_b, hi_b))) => Some((lo_a.min(lo_b), hi_a.max(hi_b))),
                (a, None) => a,
                (None, b) => b,
            },
        )
}

/// Checks that the neutrons of one frame reach every flight path in `ltotal` within
/// one frame period.
///
/// The arrival spread grows monotonically with distance beyond the choppers, so only
/// the shortest and longest flight paths are checked.
///
/// # Errors
/// Returns [`Error::FrameOverlap`] when the spread exceeds `frame_period`.
pub fn check_frame_bounds(
    simulation: &SimulationResults,
    ltotal: &[f64],
    frame_period: f64,
) -> Result<()> {
    let Some((lo, hi)) = tofkit_core::nan_min_max(ltotal) else {
        return Ok(());
    };
    for l in [lo, hi] {
        if let Some((first, last)) = arrival_window(simulation, l) {
            let span = last - first;
            debug!("arrivals at {l} m span {span:.1} us (frame period {frame_period:.1} us)");
            if span > frame_period {
                return Err(Error::FrameOverlap {
                    ltotal: l,
                    span,
                    frame_period,
                });
            }
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tofkit_core::constants::speed_from_wavelength;

    fn simulation() -> SimulationResults {
        // 1 Å and 10 Å neutrons leaving the chopper at t = 0.
        let speed = vec![speed_from_wavelength(1.0), speed_from_wavelength(10.0)];
        SimulationResults::new(vec![0.0, 0.0], speed, vec![1.0, 10.0], vec![1.0, 1.0], 0.0).unwrap()
    }

    #[test]
    fn test_short_flight_path_fits() {
        assert!(check_frame_bounds(&simulation(), &[10.0, 20.0], 71_428.0).is_ok());
    }

    #[test]
    fn test_long_flight_path_overlaps() {
        // 9 Å spread over 40 m is about 91 ms.
        let result = check_frame_bounds(&simulation(), &[10.0, 40.0], 71_428.0);
        match result {
            Err(Error::FrameOverlap { ltotal, span, .. }) => {
                assert!((ltotal - 40.0).abs() < 1e-12);
                assert!(span > 71_428.0);
            }
            other => panic!("expected frame overlap, got {other:?}"),
        }
    }

    #[test]
    fn test_zero_weight_neutrons_are_ignored() {
        let speed = vec![speed_from_wavelength(1.0), speed_from_wavelength(10.0)];
        let sim =
            SimulationResults::new(vec![0.0, 0.0], speed, vec![1.0, 10.0], vec![1.0, 0.0], 0.0).unwrap();
        assert!(check_frame_bounds(&sim, &[40.0], 71_428.0).is_ok());
    }
}
