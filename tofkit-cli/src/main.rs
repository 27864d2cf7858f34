//! `tofkit` command-line tool.
//!
//! Simulates chopper cascades, builds time-of-flight lookup tables and converts
//! recorded events to time-of-flight.
#![allow(
    clippy::uninlined_format_args,
    clippy::cast_precision_loss,
    clippy::too_many_lines
)]

use clap::{ArgAction, Parser, Subcommand};
use log::{info, warn};
use std::collections::BTreeMap;
use std::fs::File;
use std::io::BufReader;
use std::path::{Path, PathBuf};
use std::time::Instant;
use thiserror::Error;
use tofkit_algorithms::{
    build_lookup_table, check_frame_bounds, time_of_flight_data_with_pivot, TofData,
};
use tofkit_core::{
    Facility, LookupTableConfig, LtotalRange, RawData, SimulationResults,
    TofLookupTable, UnwrapConfig,
};
use tofkit_io::{
    read_events_csv, read_simulation, read_table, with_file_lock, write_simulation, write_table,
    write_tof_events_csv, MappedFileReader, SIMULATION_MAGIC, TABLE_MAGIC,
};
use tofkit_sim::{simulate_beamline, DiskChopper, SimulationConfig};

/// Result type for CLI operations.
type Result<T> = std::result::Result<T, CliError>;

/// CLI error types.
#[derive(Error, Debug)]
enum CliError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("I/O error: {0}")]
    TofkitIo(#[from] tofkit_io::Error),

    #[error("Core error: {0}")]
    Core(#[from] tofkit_core::Error),

    #[error("Invalid chopper file: {0}")]
    Choppers(#[from] serde_json::Error),

    #[error("{0}")]
    Usage(String),
}

/// Neutron time-of-flight lookup tables for pulsed sources.
#[derive(Parser)]
#[command(name = "tofkit")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Increase log verbosity (-v info, -vv debug); RUST_LOG takes precedence
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Simulate neutrons through a chopper cascade
    Simulate {
        /// JSON file mapping chopper names to chopper settings (no choppers if omitted)
        #[arg(short, long)]
        choppers: Option<PathBuf>,

        /// Output simulation file
        #[arg(short, long)]
        output: PathBuf,

        /// Neutrons per pulse
        #[arg(long, default_value = "1000000")]
        neutrons: usize,

        /// Number of pulses
        #[arg(long, default_value = "1")]
        pulses: usize,

        /// Random seed
        #[arg(long, default_value = "1234")]
        seed: u64,

        /// Source position x,y,z (m)
        #[arg(long, value_delimiter = ',', default_value = "0,0,0")]
        source_position: Vec<f64>,
    },

    /// Build a lookup table from simulation results
    BuildTable {
        /// Simulation file written by `simulate`
        #[arg(short, long)]
        simulation: PathBuf,

        /// Output table (`.json` for JSON, binary otherwise)
        #[arg(short, long)]
        output: PathBuf,

        /// Shortest flight path to cover (m)
        #[arg(long)]
        ltotal_min: f64,

        /// Longest flight path to cover (m)
        #[arg(long)]
        ltotal_max: f64,

        /// Source pulse period (µs), defaults to the ESS period
        #[arg(long, conflicts_with = "source_frequency")]
        pulse_period: Option<f64>,

        /// Source frequency (Hz), alternative to --pulse-period
        #[arg(long)]
        source_frequency: Option<f64>,

        /// Source pulses per frame
        #[arg(long, default_value = "1")]
        pulse_stride: usize,

        /// Distance resolution (m)
        #[arg(long, default_value = "0.1")]
        distance_resolution: f64,

        /// Time resolution (µs)
        #[arg(long, default_value = "250.0")]
        time_resolution: f64,

        /// Relative standard deviation above which cells are masked
        #[arg(long, default_value = "0.1")]
        error_threshold: f64,

        /// Records processed per chunk (derived from available memory if omitted)
        #[arg(long)]
        max_records_per_chunk: Option<usize>,

        /// Fraction of available memory a chunk may use
        #[arg(long, default_value = "0.25")]
        memory_fraction: f64,

        /// Fail if neutrons at the given flight paths spread over more than a frame
        #[arg(long)]
        check_frame_bounds: bool,
    },

    /// Show information about a table or simulation file
    Info {
        /// Input file
        input: PathBuf,
    },

    /// Convert recorded events to time-of-flight
    Convert {
        /// Events CSV (pulse,event_time_zero_ns,event_time_offset_us,ltotal_m)
        #[arg(short, long)]
        events: PathBuf,

        /// Lookup table file
        #[arg(short, long)]
        table: PathBuf,

        /// Simulation the table was built from; sets the frame pivot
        #[arg(short, long)]
        simulation: Option<PathBuf>,

        /// Output CSV with an extra tof_us column
        #[arg(short, long)]
        output: PathBuf,

        /// Recorded pulse that starts a frame (inferred if omitted)
        #[arg(long)]
        pulse_stride_offset: Option<usize>,
    },
}

fn log_level(verbose: u8) -> &'static str {
    match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    }
}

fn read_choppers(path: &Path) -> Result<Vec<DiskChopper>> {
    let named: BTreeMap<String, DiskChopper> =
        serde_json::from_reader(BufReader::new(File::open(path)?))?;
    for (name, chopper) in &named {
        chopper
            .validate()
            .map_err(|e| CliError::Usage(format!("chopper `{name}`: {e}")))?;
    }
    Ok(named.into_values().collect())
}

fn source_position(values: &[f64]) -> Result<[f64; 3]> {
    <[f64; 3]>::try_from(values).map_err(|_| {
        CliError::Usage(format!(
            "--source-position takes three values, got {}",
            values.len()
        ))
    })
}

fn load_table(path: &Path) -> Result<TofLookupTable> {
    Ok(with_file_lock(path, |locked| read_table(locked))?)
}

fn load_simulation(path: &Path) -> Result<SimulationResults> {
    Ok(with_file_lock(path, |locked| read_simulation(locked))?)
}

fn print_table(table: &TofLookupTable) {
    let (rows, cols) = table.shape();
    let p = table.parameters();
    let (lo, hi) = table.distance_range();
    println!("Lookup table: {} x {}", rows, cols);
    println!("Distance: {:.3} - {:.3} m (step {} m)", lo, hi, p.distance_resolution);
    println!(
        "Frame period: {:.1} us ({} x {:.1} us)",
        table.frame_period(),
        p.pulse_stride,
        p.pulse_period
    );
    println!("Time resolution: {} us", p.time_resolution);
    println!(
        "Masked cells: {} of {} (threshold {})",
        table.masked_count(),
        rows * cols,
        p.error_threshold
    );
}

fn print_simulation(simulation: &SimulationResults) -> Result<()> {
    println!("Simulated neutrons: {}", simulation.len());
    println!("Recorded at: {} m", simulation.distance());
    if let Some((lo, hi)) = tofkit_core::nan_min_max(simulation.wavelength()) {
        println!("Wavelength range: {:.3} - {:.3} A", lo, hi);
    }
    if !simulation.is_empty() {
        let fastest = simulation.fastest_neutron()?;
        println!(
            "Fastest neutron: {:.1} m/s, arrives at {:.1} us",
            fastest.speed, fastest.time_of_arrival
        );
    }
    Ok(())
}

fn main() -> Result<()> {
    let cli = Cli::parse();
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or(log_level(cli.verbose)))
        .init();

    match cli.command {
        Commands::Simulate {
            choppers,
            output,
            neutrons,
            pulses,
            seed,
            source_position: position,
        } => {
            let choppers = match choppers {
                Some(path) => read_choppers(&path)?,
                None => Vec::new(),
            };
            let config = SimulationConfig {
                facility: Facility::Ess,
                ..SimulationConfig::default()
            }
            .with_neutrons(neutrons)
            .with_pulses(pulses)
            .with_seed(seed);

            let start = Instant::now();
            let simulation = simulate_beamline(&choppers, source_position(&position)?, &config)?;
            with_file_lock(&output, |locked| write_simulation(locked, &simulation))?;

            println!(
                "Simulated {} neutrons through {} choppers in {:.2}s",
                neutrons * pulses,
                choppers.len(),
                start.elapsed().as_secs_f64()
            );
            println!("Kept: {}", simulation.len());
            println!("Written to: {}", output.display());
        }

        Commands::BuildTable {
            simulation,
            output,
            ltotal_min,
            ltotal_max,
            pulse_period,
            source_frequency,
            pulse_stride,
            distance_resolution,
            time_resolution,
            error_threshold,
            max_records_per_chunk,
            memory_fraction,
            check_frame_bounds: check_bounds,
        } => {
            let simulation = load_simulation(&simulation)?;
            let mut config = LookupTableConfig::new(LtotalRange::new(ltotal_min, ltotal_max))
                .try_with_pulse_stride(pulse_stride)?
                .with_distance_resolution(distance_resolution)
                .with_time_resolution(time_resolution)
                .with_error_threshold(error_threshold)
                .with_memory_fraction(memory_fraction);
            if let Some(period) = pulse_period {
                config = config.with_pulse_period(period);
            }
            if let Some(frequency) = source_frequency {
                config = config.with_source_frequency(frequency);
            }
            if let Some(records) = max_records_per_chunk {
                config = config.with_max_records_per_chunk(records);
            }
            config.validate()?;

            if check_bounds {
                check_frame_bounds(&simulation, &[ltotal_min, ltotal_max], config.frame_period())?;
            }

            let start = Instant::now();
            let table = build_lookup_table(&simulation, &config)?;
            with_file_lock(&output, |locked| write_table(locked, &table))?;
            info!("table built in {:.2}s", start.elapsed().as_secs_f64());

            print_table(&table);
            println!("Written to: {}", output.display());
        }

        Commands::Info { input } => {
            let reader = MappedFileReader::open(&input)?;
            println!("File: {}", input.display());
            println!(
                "Size: {} bytes ({:.2} MB)",
                reader.len(),
                reader.len() as f64 / 1_000_000.0
            );
            if reader.has_magic(SIMULATION_MAGIC) {
                drop(reader);
                print_simulation(&load_simulation(&input)?)?;
            } else if reader.has_magic(TABLE_MAGIC)
                || input.extension().is_some_and(|ext| ext == "json")
            {
                drop(reader);
                print_table(&load_table(&input)?);
            } else {
                return Err(CliError::Usage(format!(
                    "{} is neither a lookup table nor a simulation file",
                    input.display()
                )));
            }
        }

        Commands::Convert {
            events,
            table,
            simulation,
            output,
            pulse_stride_offset,
        } => {
            let events = read_events_csv(&events)?;
            let table = load_table(&table)?;
            let fastest = match simulation {
                Some(path) => Some(load_simulation(&path)?.fastest_neutron()?),
                None => None,
            };
            if pulse_stride_offset.is_none() && table.parameters().pulse_stride > 1 {
                warn!("no --pulse-stride-offset given, inferring it from the events");
            }
            let config = UnwrapConfig {
                pulse_stride_offset,
            };

            let start = Instant::now();
            let data = time_of_flight_data_with_pivot(
                &RawData::Events(events),
                &table,
                fastest.as_ref(),
                &config,
            )?;
            let TofData::Events(tof) = &data else {
                return Err(CliError::Usage("expected event data".to_string()));
            };
            let stats = data.statistics();
            with_file_lock(&output, |locked| write_tof_events_csv(locked, tof))?;

            println!(
                "Converted {} events in {:.2}s",
                stats.total,
                start.elapsed().as_secs_f64()
            );
            println!(
                "Masked (NaN): {} ({:.2}%)",
                stats.nan_count,
                stats.nan_fraction() * 100.0
            );
            if let (Some(min), Some(max)) = (stats.min, stats.max) {
                println!("TOF range: {:.1} - {:.1} us", min, max);
            }
            println!("Written to: {}", output.display());
        }
    }

    Ok(())
}
