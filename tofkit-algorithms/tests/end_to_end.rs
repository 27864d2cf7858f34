//! Simulated instrument without choppers: table from a simulation, events from a
//! fake beamline recorded at 10 m.

use tofkit_algorithms::{build_lookup_table, time_of_flight_data, TofData};
use tofkit_core::{nan_median, nan_percentile, LookupTableConfig, LtotalRange, RawData, UnwrapConfig};
use tofkit_sim::fakes::{FakeBeamline, FakeBeamlineConfig};
use tofkit_sim::{simulate_beamline, DiskChopper, SimulationConfig};

fn relative_errors(computed: &[f64], truth: &[f64]) -> Vec<f64> {
    computed
        .iter()
        .zip(truth)
        .map(|(c, t)| (c - t).abs() / t)
        .collect()
}

#[test]
fn test_unwrap_without_choppers() {
    let choppers: Vec<DiskChopper> = Vec::new();
    let simulation = simulate_beamline(
        &choppers,
        [0.0; 3],
        &SimulationConfig::default().with_neutrons(200_000),
    )
    .unwrap();
    let config = LookupTableConfig::new(LtotalRange::new(10.0, 10.0)).with_error_threshold(1.0);
    let table = build_lookup_table(&simulation, &config).unwrap();
    assert!(table.is_periodic());

    let beamline = FakeBeamline::new(
        &choppers,
        [0.0; 3],
        [("monitor", 10.0)],
        FakeBeamlineConfig {
            pulses: 3,
            events_per_pulse: 20_000,
            ..FakeBeamlineConfig::default()
        },
    )
    .unwrap();
    let monitor = beamline.get_monitor("monitor").unwrap();
    assert!(monitor.events.len() > 50_000);

    let raw = RawData::Events(monitor.events.clone());
    let TofData::Events(result) =
        time_of_flight_data(&raw, &table, &simulation, &UnwrapConfig::default()).unwrap()
    else {
        panic!("event data must stay event data");
    };
    assert_eq!(result.len(), monitor.events.len());
    assert_eq!(result.events().event_index(), monitor.events.event_index());

    let errors = relative_errors(result.tof(), &monitor.tof);
    let p96 = nan_percentile(&errors, 96.0).unwrap();
    let median = nan_median(&errors).unwrap();
    assert!(p96 < 0.5, "96th percentile of relative error is {p96}");
    assert!(median < 0.2, "median relative error is {median}");
}

#[test]
fn test_single_distance_table_covers_distance() {
    let choppers: Vec<DiskChopper> = Vec::new();
    let simulation = simulate_beamline(
        &choppers,
        [0.0; 3],
        &SimulationConfig::default().with_neutrons(10_000),
    )
    .unwrap();
    let config = LookupTableConfig::new(LtotalRange::new(25.0, 25.0)).with_distance_resolution(0.5);
    let table = build_lookup_table(&simulation, &config).unwrap();
    let (lo, hi) = table.distance_range();
    assert!(lo <= 25.0 - 0.75 + 1e-9 && hi >= 25.0 + 0.75 - 1e-9);
}
