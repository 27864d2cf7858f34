//! The time-of-flight workflow on a beamline without choppers, with the flight path
//! fixed at 10 m.

use std::collections::HashMap;
use std::sync::Arc;
use tofkit_algorithms::{build_lookup_table, TofData};
use tofkit_core::{nan_median, EventData, LookupTableConfig, LtotalRange, RawData};
use tofkit_io::write_table;
use tofkit_sim::fakes::{FakeBeamline, FakeBeamlineConfig, FakeMonitorData};
use tofkit_sim::{simulate_beamline, DiskChopper, SimulationConfig};
use tofkit_stream::tof_workflow::{
    CHOPPERS, DETECTOR_TOF_DATA, LOOKUP_TABLE_RELATIVE_ERROR_THRESHOLD, LTOTAL_RANGE,
    NUMBER_OF_SIMULATED_NEUTRONS, RAW_DETECTOR, SIMULATION_RESULTS,
    TIME_OF_FLIGHT_LOOKUP_TABLE_FILENAME,
};
use tofkit_stream::{
    GenericTofWorkflow, Pipeline, RunKind, StreamProcessor, TofLutProvider, TofValue,
};

const NEUTRONS: usize = 200_000;

fn recorded() -> FakeMonitorData {
    let choppers: Vec<DiskChopper> = Vec::new();
    FakeBeamline::new(
        &choppers,
        [0.0; 3],
        [("detector", 10.0)],
        FakeBeamlineConfig {
            pulses: 3,
            events_per_pulse: 20_000,
            ..FakeBeamlineConfig::default()
        },
    )
    .unwrap()
    .get_monitor("detector")
    .unwrap()
}

fn simulation_workflow() -> Pipeline<TofValue> {
    let mut pipeline = GenericTofWorkflow::new(&[RunKind::SampleRun], &[])
        .with_lut_provider(TofLutProvider::Simulation)
        .build()
        .unwrap();
    pipeline.set(CHOPPERS, TofValue::Choppers(Vec::new()));
    pipeline.set(LTOTAL_RANGE, TofValue::Range(LtotalRange::new(10.0, 10.0)));
    pipeline.set(LOOKUP_TABLE_RELATIVE_ERROR_THRESHOLD, TofValue::Float(1.0));
    pipeline.set(NUMBER_OF_SIMULATED_NEUTRONS, TofValue::Count(NEUTRONS));
    pipeline
}

fn per_pulse(events: &EventData) -> Vec<EventData> {
    (0..events.n_pulses())
        .map(|pulse| {
            let range = events.pulse_range(pulse);
            EventData::from_pulses([(
                events.event_time_zero()[pulse],
                range
                    .map(|i| (events.event_time_offset()[i], events.ltotal()[i]))
                    .collect(),
            )])
        })
        .collect()
}

fn tof_values(value: &TofValue) -> Vec<f64> {
    match value {
        TofValue::Tof(TofData::Events(events)) => events.tof().to_vec(),
        other => panic!("expected time-of-flight events, got {}", other.kind()),
    }
}

#[test]
fn test_streamed_pulses_match_true_time_of_flight() {
    let monitor = recorded();
    let raw = RAW_DETECTOR.for_run(RunKind::SampleRun);
    let target = DETECTOR_TOF_DATA.for_run(RunKind::SampleRun);
    let mut processor =
        StreamProcessor::with_eternal(&simulation_workflow(), &[raw], &[target], &[target])
            .unwrap();

    let mut result = None;
    for chunk in per_pulse(&monitor.events) {
        result = Some(
            processor
                .add_chunk(HashMap::from([(raw, TofValue::Raw(RawData::Events(chunk)))]))
                .unwrap(),
        );
    }
    let tof = tof_values(&result.unwrap()[&target]);
    assert_eq!(tof.len(), monitor.events.len());
    let errors: Vec<f64> = tof
        .iter()
        .zip(&monitor.tof)
        .map(|(c, t)| (c - t).abs() / t)
        .collect();
    let median = nan_median(&errors).unwrap();
    assert!(median < 0.2, "median relative error is {median}");
}

#[test]
fn test_table_from_file_matches_simulated_table() {
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("table.lut");
    let choppers: Vec<DiskChopper> = Vec::new();
    let simulation = simulate_beamline(
        &choppers,
        [0.0; 3],
        &SimulationConfig::default().with_neutrons(NEUTRONS),
    )
    .unwrap();
    let table = build_lookup_table(
        &simulation,
        &LookupTableConfig::new(LtotalRange::new(10.0, 10.0)).with_error_threshold(1.0),
    )
    .unwrap();
    write_table(&path, &table).unwrap();

    let monitor = recorded();
    let raw_key = RAW_DETECTOR.for_run(RunKind::SampleRun);
    let target = DETECTOR_TOF_DATA.for_run(RunKind::SampleRun);
    let raw = TofValue::Raw(RawData::Events(monitor.events.clone()));

    let mut from_file = GenericTofWorkflow::new(&[RunKind::SampleRun], &[])
        .build()
        .unwrap();
    from_file.set(TIME_OF_FLIGHT_LOOKUP_TABLE_FILENAME, TofValue::Path(path));
    from_file.set(raw_key, raw.clone());
    let file_tof = tof_values(&from_file.compute_one(&target).unwrap());

    let mut simulated = simulation_workflow();
    simulated.set(raw_key, raw);
    let sim_tof = tof_values(&simulated.compute_one(&target).unwrap());
    assert_eq!(
        simulated.compute_one(&SIMULATION_RESULTS).unwrap(),
        TofValue::Simulation(Arc::new(simulation))
    );

    assert_eq!(file_tof.len(), sim_tof.len());
    let mut nan_mismatch = 0;
    for (a, b) in file_tof.iter().zip(&sim_tof) {
        match (a.is_nan(), b.is_nan()) {
            (false, false) => approx::assert_relative_eq!(*a, *b, max_relative = 1e-6),
            (true, true) => {}
            _ => nan_mismatch += 1,
        }
    }
    assert!(nan_mismatch <= 2, "{nan_mismatch} events differ in masking");
}
