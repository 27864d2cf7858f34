//! Pulse skipping: a 7 Hz chopper selects every other pulse of the 14 Hz source and
//! the detector sits far enough for a frame to span two pulse periods.

use tofkit_algorithms::{
    build_lookup_table, check_frame_bounds, guess_pulse_stride_offset, time_of_flight_data,
    TofData,
};
use tofkit_core::{
    nan_percentile, Error, LookupTableConfig, LtotalRange, RawData, SimulationResults,
    TofLookupTable, TofStatistics, UnwrapConfig,
};
use tofkit_sim::fakes::{FakeBeamline, FakeBeamlineConfig, FakeMonitorData};
use tofkit_sim::{simulate_beamline, DiskChopper, SimulationConfig};

const DETECTOR: f64 = 150.0;

fn choppers() -> Vec<DiskChopper> {
    vec![
        // Opens 5000-5300 us after each 14 Hz pulse.
        DiskChopper::single_slit(14.0, 25.2, (0.0, 1.512), [0.0, 0.0, 5.0]),
        // Opens 4000-8000 us after every other pulse.
        DiskChopper::single_slit(7.0, 10.08, (0.0, 10.08), [0.0, 0.0, 6.0]),
    ]
}

fn setup() -> (SimulationResults, TofLookupTable) {
    let simulation = simulate_beamline(
        &choppers(),
        [0.0; 3],
        &SimulationConfig::default()
            .with_neutrons(150_000)
            .with_pulses(2),
    )
    .unwrap();
    let config = LookupTableConfig::new(LtotalRange::new(DETECTOR, DETECTOR))
        .with_pulse_stride(2)
        .with_error_threshold(0.1);
    let table = build_lookup_table(&simulation, &config).unwrap();
    (simulation, table)
}

fn record(first_recorded_pulse: usize) -> FakeMonitorData {
    let beamline = FakeBeamline::new(
        &choppers(),
        [0.0; 3],
        [("detector", DETECTOR)],
        FakeBeamlineConfig {
            pulses: 6,
            events_per_pulse: 50_000,
            first_recorded_pulse,
            ..FakeBeamlineConfig::default()
        },
    )
    .unwrap();
    beamline.get_monitor("detector").unwrap()
}

fn unwrap_with(
    data: &FakeMonitorData,
    simulation: &SimulationResults,
    table: &TofLookupTable,
    offset: usize,
) -> Vec<f64> {
    let raw = RawData::Events(data.events.clone());
    let config = UnwrapConfig::default().with_pulse_stride_offset(offset);
    match time_of_flight_data(&raw, table, simulation, &config).unwrap() {
        TofData::Events(events) => events.tof().to_vec(),
        TofData::Histogram(_) => panic!("event data must stay event data"),
    }
}

fn relative_errors(computed: &[f64], truth: &[f64]) -> Vec<f64> {
    computed
        .iter()
        .zip(truth)
        .map(|(c, t)| (c - t).abs() / t)
        .collect()
}

#[test]
fn test_correct_offset_recovers_tof() {
    let (simulation, table) = setup();
    assert!(simulation.len() > 1_000);
    let data = record(0);
    assert!(data.events.len() > 1_000);

    let tof = unwrap_with(&data, &simulation, &table, 0);
    let errors = relative_errors(&tof, &data.tof);
    let worst = nan_percentile(&errors, 100.0).unwrap();
    assert!(worst < 0.01, "largest relative error is {worst}");
    assert!(TofStatistics::from_values(&tof).nan_fraction() < 0.05);
}

#[test]
fn test_wrong_offset_is_measurably_worse() {
    let (simulation, table) = setup();
    let data = record(0);
    let right = TofStatistics::from_values(&unwrap_with(&data, &simulation, &table, 0));
    let wrong_tof = unwrap_with(&data, &simulation, &table, 1);
    let wrong = TofStatistics::from_values(&wrong_tof);
    assert!(wrong.nan_count > right.nan_count);
    let worst = nan_percentile(&relative_errors(&wrong_tof, &data.tof), 100.0);
    assert!(worst.map_or(true, |w| w > 0.05));
}

#[test]
fn test_offset_is_inferred() {
    let (simulation, table) = setup();
    let fastest = simulation.fastest_neutron().unwrap();
    assert_eq!(
        guess_pulse_stride_offset(&record(0).events, &table, Some(&fastest)).unwrap(),
        0
    );
    let late = record(1);
    assert_eq!(
        guess_pulse_stride_offset(&late.events, &table, Some(&fastest)).unwrap(),
        1
    );

    // Without an explicit offset the inferred one is used.
    let raw = RawData::Events(late.events.clone());
    let TofData::Events(events) =
        time_of_flight_data(&raw, &table, &simulation, &UnwrapConfig::default()).unwrap()
    else {
        panic!("event data must stay event data");
    };
    let worst = nan_percentile(&relative_errors(events.tof(), &late.tof), 100.0).unwrap();
    assert!(worst < 0.01);
}

#[test]
fn test_offset_outside_stride_is_rejected() {
    let (simulation, table) = setup();
    let raw = RawData::Events(record(0).events);
    let config = UnwrapConfig::default().with_pulse_stride_offset(2);
    assert!(matches!(
        time_of_flight_data(&raw, &table, &simulation, &config),
        Err(Error::ConfigError(_))
    ));
}

#[test]
fn test_frames_fit_with_stride_but_not_without() {
    let (simulation, _) = setup();
    let pulse_period = 1.0e6 / 14.0;
    assert!(check_frame_bounds(&simulation, &[DETECTOR], 2.0 * pulse_period).is_ok());
    assert!(matches!(
        check_frame_bounds(&simulation, &[DETECTOR], pulse_period),
        Err(Error::FrameOverlap { .. })
    ));
}
