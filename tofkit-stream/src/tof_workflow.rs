//! Generic time-of-flight workflow.
//!
//! [`GenericTofWorkflow`] registers the time-of-flight providers once per run kind
//! (and per monitor kind) on a [`Pipeline<TofValue>`], together with default
//! parameters. Inputs the caller must set are the raw data
//! ([`RAW_DETECTOR`]/[`RAW_MONITOR`] for a run and monitor kind), and either the
//! lookup table file name ([`TIME_OF_FLIGHT_LOOKUP_TABLE_FILENAME`]) or the chopper
//! cascade ([`CHOPPERS`]) together with the flight path range ([`LTOTAL_RANGE`]).

use crate::error::{Result, StreamError};
use crate::key::{Key, MonitorKind, RunKind};
use crate::pipeline::Pipeline;
use crate::value::TofValue;
use log::info;
use std::sync::Arc;
use tofkit_algorithms::{
    build_lookup_table, extract_ltotal, rehistogram_tof, time_of_flight_data_with_pivot, TofData,
};
use tofkit_core::{Facility, LookupTableConfig, RawData, UnwrapConfig};
use tofkit_io::{read_table, with_file_lock};
use tofkit_sim::{simulate_beamline, SimulationConfig};

/// Time between source pulses (µs).
pub const PULSE_PERIOD: Key = Key::new("PulsePeriod");
/// Number of source pulses per frame.
pub const PULSE_STRIDE: Key = Key::new("PulseStride");
/// Index of the first pulse of a frame among the recorded pulses, `None` to infer it.
pub const PULSE_STRIDE_OFFSET: Key = Key::new("PulseStrideOffset");
/// Distance resolution of the lookup table (m).
pub const DISTANCE_RESOLUTION: Key = Key::new("DistanceResolution");
/// Time resolution of the lookup table (µs).
pub const TIME_RESOLUTION: Key = Key::new("TimeResolution");
/// Relative standard deviation above which table cells are masked.
pub const LOOKUP_TABLE_RELATIVE_ERROR_THRESHOLD: Key =
    Key::new("LookupTableRelativeErrorThreshold");
/// Range of flight paths the lookup table covers.
pub const LTOTAL_RANGE: Key = Key::new("LtotalRange");
/// File holding a lookup table.
pub const TIME_OF_FLIGHT_LOOKUP_TABLE_FILENAME: Key = Key::new("TimeOfFlightLookupTableFilename");
/// Chopper cascade of the beamline.
pub const CHOPPERS: Key = Key::new("Choppers");
/// Position of the source.
pub const SOURCE_POSITION: Key = Key::new("SourcePosition");
/// Neutrons per pulse in the beamline simulation.
pub const NUMBER_OF_SIMULATED_NEUTRONS: Key = Key::new("NumberOfSimulatedNeutrons");
/// Seed of the beamline simulation.
pub const SIMULATION_SEED: Key = Key::new("SimulationSeed");
/// Facility of the source.
pub const FACILITY: Key = Key::new("Facility");
/// Neutrons that made it through the chopper cascade.
pub const SIMULATION_RESULTS: Key = Key::new("SimulationResults");
/// Lookup table shared by all runs.
pub const COMMON_TIME_OF_FLIGHT_LOOKUP_TABLE: Key = Key::new("CommonTimeOfFlightLookupTable");

/// Lookup table of a run.
pub const TIME_OF_FLIGHT_LOOKUP_TABLE: Key = Key::new("TimeOfFlightLookupTable");
/// Raw detector data of a run.
pub const RAW_DETECTOR: Key = Key::new("RawDetector");
/// Flight paths of the detector data of a run.
pub const DETECTOR_LTOTAL: Key = Key::new("DetectorLtotal");
/// Detector data of a run with time-of-flight.
pub const DETECTOR_TOF_DATA: Key = Key::new("DetectorTofData");
/// Histogrammed detector time-of-flight data on sorted bins.
pub const REHISTOGRAMMED_DETECTOR_TOF_DATA: Key = Key::new("ReHistogrammedDetectorTofData");
/// Raw data of a monitor in a run.
pub const RAW_MONITOR: Key = Key::new("RawMonitor");
/// Flight paths of a monitor in a run.
pub const MONITOR_LTOTAL: Key = Key::new("MonitorLtotal");
/// Monitor data of a run with time-of-flight.
pub const MONITOR_TOF_DATA: Key = Key::new("MonitorTofData");

/// Source of the lookup table.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum TofLutProvider {
    /// Read from [`TIME_OF_FLIGHT_LOOKUP_TABLE_FILENAME`].
    #[default]
    File,
    /// Computed from a simulation of [`CHOPPERS`].
    Simulation,
}

/// Builder of the generic time-of-flight pipeline.
#[derive(Debug, Clone)]
pub struct GenericTofWorkflow {
    run_kinds: Vec<RunKind>,
    monitor_kinds: Vec<MonitorKind>,
    lut_provider: TofLutProvider,
}

impl GenericTofWorkflow {
    /// A workflow for the given run and monitor kinds.
    #[must_use]
    pub fn new(run_kinds: &[RunKind], monitor_kinds: &[MonitorKind]) -> Self {
        Self {
            run_kinds: run_kinds.to_vec(),
            monitor_kinds: monitor_kinds.to_vec(),
            lut_provider: TofLutProvider::default(),
        }
    }

    /// Sets where the lookup table comes from.
    #[must_use]
    pub fn with_lut_provider(mut self, provider: TofLutProvider) -> Self {
        self.lut_provider = provider;
        self
    }

    /// Builds the pipeline.
    ///
    /// # Errors
    /// Returns [`StreamError::MissingConstraint`](crate::StreamError::MissingConstraint)
    /// if no run kind was given.
    pub fn build(&self) -> Result<Pipeline<TofValue>> {
        let mut pipeline = Pipeline::new();
        for (key, value) in default_parameters() {
            pipeline.set(key, value);
        }
        match self.lut_provider {
            TofLutProvider::File => insert_table_from_file(&mut pipeline),
            TofLutProvider::Simulation => {
                insert_simulation(&mut pipeline);
                insert_table_from_simulation(&mut pipeline);
            }
        }
        let with_simulation = self.lut_provider == TofLutProvider::Simulation;
        for run in RunKind::ALL {
            insert_run_providers(&mut pipeline, run, with_simulation);
            for monitor in MonitorKind::ALL {
                insert_tof_providers(
                    &mut pipeline,
                    RAW_MONITOR.for_run(run).for_monitor(monitor),
                    MONITOR_LTOTAL.for_run(run).for_monitor(monitor),
                    MONITOR_TOF_DATA.for_run(run).for_monitor(monitor),
                    TIME_OF_FLIGHT_LOOKUP_TABLE.for_run(run),
                    with_simulation,
                );
            }
        }
        let pipeline = pipeline.restrict(&self.run_kinds, &self.monitor_kinds)?;
        info!(
            "time-of-flight workflow with {} nodes, lookup table from {:?}",
            pipeline.len(),
            self.lut_provider
        );
        Ok(pipeline)
    }
}

/// Default parameters of the workflow.
#[must_use]
pub fn default_parameters() -> Vec<(Key, TofValue)> {
    vec![
        (PULSE_PERIOD, TofValue::Float(Facility::Ess.pulse_period())),
        (PULSE_STRIDE, TofValue::Count(1)),
        (PULSE_STRIDE_OFFSET, TofValue::OptionalCount(None)),
        (DISTANCE_RESOLUTION, TofValue::Float(0.1)),
        (TIME_RESOLUTION, TofValue::Float(250.0)),
        (LOOKUP_TABLE_RELATIVE_ERROR_THRESHOLD, TofValue::Float(0.1)),
        (SOURCE_POSITION, TofValue::Position([0.0; 3])),
        (NUMBER_OF_SIMULATED_NEUTRONS, TofValue::Count(1_000_000)),
        (SIMULATION_SEED, TofValue::Seed(1234)),
        (FACILITY, TofValue::Facility(Facility::Ess)),
    ]
}

fn insert_table_from_file(pipeline: &mut Pipeline<TofValue>) {
    pipeline.insert(
        COMMON_TIME_OF_FLIGHT_LOOKUP_TABLE,
        vec![TIME_OF_FLIGHT_LOOKUP_TABLE_FILENAME],
        |v| {
            let path = v[0].path(TIME_OF_FLIGHT_LOOKUP_TABLE_FILENAME)?;
            let table = with_file_lock(path, |locked| read_table(locked))?;
            Ok(TofValue::Table(Arc::new(table)))
        },
    );
}

fn insert_simulation(pipeline: &mut Pipeline<TofValue>) {
    pipeline.insert(
        SIMULATION_RESULTS,
        vec![
            CHOPPERS,
            SOURCE_POSITION,
            NUMBER_OF_SIMULATED_NEUTRONS,
            SIMULATION_SEED,
            FACILITY,
            PULSE_STRIDE,
        ],
        |v| {
            let config = SimulationConfig {
                facility: v[4].facility(FACILITY)?,
                ..SimulationConfig::default()
            }
            .with_neutrons(v[2].count(NUMBER_OF_SIMULATED_NEUTRONS)?)
            .with_seed(v[3].seed(SIMULATION_SEED)?)
            .with_pulses(v[5].count(PULSE_STRIDE)?.max(1));
            let simulation = simulate_beamline(
                v[0].choppers(CHOPPERS)?,
                v[1].position(SOURCE_POSITION)?,
                &config,
            )?;
            Ok(TofValue::Simulation(Arc::new(simulation)))
        },
    );
}

fn insert_table_from_simulation(pipeline: &mut Pipeline<TofValue>) {
    pipeline.insert(
        COMMON_TIME_OF_FLIGHT_LOOKUP_TABLE,
        vec![
            SIMULATION_RESULTS,
            LTOTAL_RANGE,
            PULSE_PERIOD,
            PULSE_STRIDE,
            DISTANCE_RESOLUTION,
            TIME_RESOLUTION,
            LOOKUP_TABLE_RELATIVE_ERROR_THRESHOLD,
        ],
        |v| {
            let config = LookupTableConfig::new(v[1].range(LTOTAL_RANGE)?)
                .with_pulse_period(v[2].float(PULSE_PERIOD)?)
                .try_with_pulse_stride(v[3].count(PULSE_STRIDE)?)?
                .with_distance_resolution(v[4].float(DISTANCE_RESOLUTION)?)
                .with_time_resolution(v[5].float(TIME_RESOLUTION)?)
                .with_error_threshold(v[6].float(LOOKUP_TABLE_RELATIVE_ERROR_THRESHOLD)?);
            let table = build_lookup_table(v[0].simulation(SIMULATION_RESULTS)?, &config)?;
            Ok(TofValue::Table(Arc::new(table)))
        },
    );
}

fn insert_run_providers(pipeline: &mut Pipeline<TofValue>, run: RunKind, with_simulation: bool) {
    let table_key = TIME_OF_FLIGHT_LOOKUP_TABLE.for_run(run);
    pipeline.insert(table_key, vec![COMMON_TIME_OF_FLIGHT_LOOKUP_TABLE], |v| {
        Ok(v[0].clone())
    });
    let tof_key = DETECTOR_TOF_DATA.for_run(run);
    insert_tof_providers(
        pipeline,
        RAW_DETECTOR.for_run(run),
        DETECTOR_LTOTAL.for_run(run),
        tof_key,
        table_key,
        with_simulation,
    );
    pipeline.insert(
        REHISTOGRAMMED_DETECTOR_TOF_DATA.for_run(run),
        vec![tof_key],
        move |v| match v[0].tof(tof_key)? {
            TofData::Histogram(hist) => Ok(TofValue::Raw(RawData::Histogram(rehistogram_tof(
                hist,
            )?))),
            TofData::Events(_) => Err(StreamError::TypeMismatch {
                key: tof_key,
                expected: "histogrammed time-of-flight data",
                found: "time-of-flight events",
            }),
        },
    );
}

fn insert_tof_providers(
    pipeline: &mut Pipeline<TofValue>,
    raw_key: Key,
    ltotal_key: Key,
    tof_key: Key,
    table_key: Key,
    with_simulation: bool,
) {
    pipeline.insert(ltotal_key, vec![raw_key], move |v| {
        Ok(TofValue::Ltotal(extract_ltotal(v[0].raw(raw_key)?)))
    });
    let mut inputs = vec![raw_key, table_key, PULSE_STRIDE_OFFSET];
    if with_simulation {
        inputs.push(SIMULATION_RESULTS);
    }
    pipeline.insert(tof_key, inputs, move |v| {
        let config = UnwrapConfig {
            pulse_stride_offset: v[2].optional_count(PULSE_STRIDE_OFFSET)?,
        };
        let fastest = match v.get(3) {
            Some(simulation) => Some(simulation.simulation(SIMULATION_RESULTS)?.fastest_neutron()?),
            None => None,
        };
        let tof = time_of_flight_data_with_pivot(
            v[0].raw(raw_key)?,
            v[1].table(table_key)?,
            fastest.as_ref(),
            &config,
        )?;
        Ok(TofValue::Tof(tof))
    });
}
