//! Simulation results persistence.
//!
//! Binary little-endian layout: magic `TOFSIM01`, `count: u64`, `distance: f64`,
//! then the `time_of_arrival`, `speed`, `wavelength` and `weight` columns as `f64`.

use crate::reader::{ByteCursor, MappedFileReader};
use crate::Result;
use log::debug;
use std::fs::File;
use std::io::{BufWriter, Write};
use std::path::Path;
use tofkit_core::SimulationResults;

/// Magic bytes of the binary simulation format.
pub const SIMULATION_MAGIC: &[u8; 8] = b"TOFSIM01";

/// Writes simulation results.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_simulation<P: AsRef<Path>>(path: P, simulation: &SimulationResults) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    writer.write_all(SIMULATION_MAGIC)?;
    writer.write_all(&(simulation.len() as u64).to_le_bytes())?;
    writer.write_all(&simulation.distance().to_le_bytes())?;
    for column in [
        simulation.time_of_arrival(),
        simulation.speed(),
        simulation.wavelength(),
        simulation.weight(),
    ] {
        for value in column {
            writer.write_all(&value.to_le_bytes())?;
        }
    }
    writer.flush()?;
    debug!(
        "wrote {} simulated neutrons to {}",
        simulation.len(),
        path.as_ref().display()
    );
    Ok(())
}

/// Reads simulation results.
///
/// # Errors
/// Returns an error if the file cannot be read or is malformed.
pub fn read_simulation<P: AsRef<Path>>(path: P) -> Result<SimulationResults> {
    let reader = MappedFileReader::open(path)?;
    let mut cursor = ByteCursor::new(reader.as_bytes());
    cursor.expect_magic(SIMULATION_MAGIC)?;
    let count = cursor.read_len()?;
    let distance = cursor.read_f64()?;
    let time_of_arrival = cursor.read_f64s(count)?;
    let speed = cursor.read_f64s(count)?;
    let wavelength = cursor.read_f64s(count)?;
    let weight = cursor.read_f64s(count)?;
    cursor.finish()?;
    Ok(SimulationResults::new(
        time_of_arrival,
        speed,
        wavelength,
        weight,
        distance,
    )?)
}
