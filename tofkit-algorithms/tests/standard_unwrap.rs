//! One pulse per frame with a single chopper close to the source. The detector is far
//! enough that the arrivals of one pulse spill into the next pulse's
//! `event_time_offset` range.

use tofkit_algorithms::{build_lookup_table, rehistogram_tof, time_of_flight_data, TofData};
use tofkit_core::{
    nan_percentile, HistogramData, LookupTableConfig, LtotalRange, RawData, SimulationResults,
    TimeAxis, TofLookupTable, TofStatistics, UnwrapConfig,
};
use tofkit_sim::fakes::{FakeBeamline, FakeBeamlineConfig, FakeMonitorData};
use tofkit_sim::{simulate_beamline, DiskChopper, SimulationConfig};

const DETECTOR: f64 = 90.0;

fn choppers() -> Vec<DiskChopper> {
    // Opens 5000-5300 us after each 14 Hz pulse.
    vec![DiskChopper::single_slit(
        14.0,
        25.2,
        (0.0, 1.512),
        [0.0, 0.0, 5.0],
    )]
}

fn setup() -> (SimulationResults, TofLookupTable, FakeMonitorData, f64) {
    let simulation = simulate_beamline(
        &choppers(),
        [0.0; 3],
        &SimulationConfig::default().with_neutrons(300_000),
    )
    .unwrap();
    let config = LookupTableConfig::new(LtotalRange::new(DETECTOR, DETECTOR));
    let table = build_lookup_table(&simulation, &config).unwrap();

    let beamline = FakeBeamline::new(
        &choppers(),
        [0.0; 3],
        [("detector", DETECTOR)],
        FakeBeamlineConfig {
            pulses: 4,
            events_per_pulse: 100_000,
            ..FakeBeamlineConfig::default()
        },
    )
    .unwrap();
    let monitor = beamline.get_monitor("detector").unwrap();
    (simulation, table, monitor, beamline.pulse_period())
}

fn histogram(values: &[f64], edges: &[f64]) -> Vec<f64> {
    let mut counts = vec![0.0; edges.len() - 1];
    for &v in values {
        if !(edges[0]..edges[edges.len() - 1]).contains(&v) {
            continue;
        }
        let k = edges.partition_point(|&e| e <= v) - 1;
        let last = counts.len() - 1;
        counts[k.min(last)] += 1.0;
    }
    counts
}

#[test]
fn test_event_time_offset_wraps_past_pulse_period() {
    let (simulation, table, monitor, pulse_period) = setup();
    assert!(monitor.tof.iter().any(|&t| t < pulse_period));
    assert!(monitor.tof.iter().any(|&t| t > pulse_period));
    assert!(monitor.events.len() > 5_000);

    let raw = RawData::Events(monitor.events.clone());
    let TofData::Events(result) =
        time_of_flight_data(&raw, &table, &simulation, &UnwrapConfig::default()).unwrap()
    else {
        panic!("event data must stay event data");
    };

    let errors: Vec<f64> = result
        .tof()
        .iter()
        .zip(&monitor.tof)
        .map(|(c, t)| (c - t).abs() / t)
        .collect();
    let worst = nan_percentile(&errors, 100.0).unwrap();
    assert!(worst < 0.01, "largest relative error is {worst}");

    let stats = TofStatistics::from_values(result.tof());
    assert!(
        stats.nan_count * 100 < stats.total,
        "{} of {} events masked",
        stats.nan_count,
        stats.total
    );
}

#[test]
#[allow(clippy::cast_precision_loss)]
fn test_histogram_mode_matches_true_spectrum() {
    let (simulation, table, monitor, pulse_period) = setup();

    let nbins = 1000;
    let edges: Vec<f64> = (0..=nbins)
        .map(|k| pulse_period * k as f64 / nbins as f64)
        .collect();
    let counts = histogram(monitor.events.event_time_offset(), &edges);
    let recorded: f64 = counts.iter().sum();
    let raw = RawData::Histogram(
        HistogramData::new(TimeAxis::TimeOfFlight, edges, counts, None, DETECTOR).unwrap(),
    );

    let TofData::Histogram(tof_hist) =
        time_of_flight_data(&raw, &table, &simulation, &UnwrapConfig::default()).unwrap()
    else {
        panic!("histogram data must stay histogram data");
    };
    let resampled = rehistogram_tof(&tof_hist).unwrap();
    assert!(resampled.edges().windows(2).all(|w| w[0] < w[1]));

    let total: f64 = resampled.counts().iter().sum();
    assert!(
        (total - recorded).abs() < 0.01 * recorded,
        "{total} counts after resampling, {recorded} recorded"
    );

    let reference = histogram(&monitor.tof, resampled.edges());
    let peak = reference.iter().copied().fold(0.0, f64::max);
    let diff: Vec<f64> = resampled
        .counts()
        .iter()
        .zip(&reference)
        .map(|(c, r)| (c - r).abs() / peak)
        .collect();
    let p96 = nan_percentile(&diff, 96.0).unwrap();
    assert!(p96 < 0.3, "96th percentile of the normalised difference is {p96}");
}
