//! Lookup table persistence.
//!
//! Two formats are supported:
//!
//! - binary, little-endian, starting with the magic `TOFLUT01`:
//!   `n_distance: u64`, `n_time: u64`, `pulse_period: f64`, `pulse_stride: u64`,
//!   `distance_resolution: f64`, `time_resolution: f64`, `error_threshold: f64`,
//!   then the distance axis, the time axis, and the values and variances in row-major
//!   `[distance, time]` order, all `f64`;
//! - JSON, with masked (NaN) cells written as `null`.
//!
//! Both keep the periodic last column and the mask, so a table reads back identical.

use crate::reader::{ByteCursor, MappedFileReader};
use crate::{Error, Result};
use log::debug;
use ndarray::Array2;
use serde::{Deserialize, Serialize};
use std::fs::File;
use std::io::{BufReader, BufWriter, Write};
use std::path::Path;
use tofkit_core::{TableParameters, TofLookupTable};

/// Magic bytes of the binary lookup table format.
pub const TABLE_MAGIC: &[u8; 8] = b"TOFLUT01";

/// Lookup table file formats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TableFormat {
    /// Binary `TOFLUT01` format.
    Binary,
    /// JSON document.
    Json,
}

impl TableFormat {
    /// Format implied by a file extension: `.json` is JSON, anything else binary.
    #[must_use]
    pub fn from_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("json") => Self::Json,
            _ => Self::Binary,
        }
    }
}

fn write_f64s(writer: &mut impl Write, values: impl IntoIterator<Item = f64>) -> Result<()> {
    for value in values {
        writer.write_all(&value.to_le_bytes())?;
    }
    Ok(())
}

/// Writes a lookup table in the binary format.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_table_binary<P: AsRef<Path>>(path: P, table: &TofLookupTable) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path.as_ref())?);
    let (rows, cols) = table.shape();
    let p = table.parameters();
    writer.write_all(TABLE_MAGIC)?;
    writer.write_all(&(rows as u64).to_le_bytes())?;
    writer.write_all(&(cols as u64).to_le_bytes())?;
    writer.write_all(&p.pulse_period.to_le_bytes())?;
    writer.write_all(&(p.pulse_stride as u64).to_le_bytes())?;
    write_f64s(
        &mut writer,
        [p.distance_resolution, p.time_resolution, p.error_threshold],
    )?;
    write_f64s(&mut writer, table.distance().iter().copied())?;
    write_f64s(&mut writer, table.event_time_offset().iter().copied())?;
    write_f64s(&mut writer, table.values().iter().copied())?;
    write_f64s(&mut writer, table.variances().iter().copied())?;
    writer.flush()?;
    debug!("wrote {rows}x{cols} lookup table to {}", path.as_ref().display());
    Ok(())
}

/// Reads a lookup table in the binary format through a memory map.
///
/// # Errors
/// Returns an error if the file cannot be read, is truncated, or does not hold a
/// valid table.
pub fn read_table_binary<P: AsRef<Path>>(path: P) -> Result<TofLookupTable> {
    let reader = MappedFileReader::open(path)?;
    let mut cursor = ByteCursor::new(reader.as_bytes());
    cursor.expect_magic(TABLE_MAGIC)?;
    let rows = cursor.read_len()?;
    let cols = cursor.read_len()?;
    let pulse_period = cursor.read_f64()?;
    let pulse_stride = cursor.read_len()?;
    let parameters = TableParameters {
        pulse_period,
        pulse_stride,
        distance_resolution: cursor.read_f64()?,
        time_resolution: cursor.read_f64()?,
        error_threshold: cursor.read_f64()?,
    };
    let cells = rows
        .checked_mul(cols)
        .ok_or_else(|| Error::InvalidFormat(format!("table shape {rows}x{cols} is too large")))?;
    let distance = cursor.read_f64s(rows)?;
    let event_time_offset = cursor.read_f64s(cols)?;
    let values = cursor.read_f64s(cells)?;
    let variances = cursor.read_f64s(cells)?;
    cursor.finish()?;
    let shape_error = |e: ndarray::ShapeError| Error::InvalidFormat(e.to_string());
    let table = TofLookupTable::from_parts(
        distance,
        event_time_offset,
        Array2::from_shape_vec((rows, cols), values).map_err(shape_error)?,
        Array2::from_shape_vec((rows, cols), variances).map_err(shape_error)?,
        parameters,
    )?;
    debug!(
        "read {rows}x{cols} lookup table from {}",
        reader.path().display()
    );
    Ok(table)
}

#[derive(Serialize, Deserialize)]
struct TableParametersDocument {
    pulse_period: f64,
    pulse_stride: usize,
    distance_resolution: f64,
    time_resolution: f64,
    error_threshold: f64,
}

#[derive(Serialize, Deserialize)]
struct TableDocument {
    format: String,
    parameters: TableParametersDocument,
    distance: Vec<f64>,
    event_time_offset: Vec<f64>,
    values: Vec<Vec<Option<f64>>>,
    variances: Vec<Vec<Option<f64>>>,
}

const JSON_FORMAT: &str = "tofkit-lookup-table/1";

fn to_rows(array: &Array2<f64>) -> Vec<Vec<Option<f64>>> {
    array
        .rows()
        .into_iter()
        .map(|row| {
            row.iter()
                .map(|&v| if v.is_nan() { None } else { Some(v) })
                .collect()
        })
        .collect()
}

fn from_rows(name: &str, rows: Vec<Vec<Option<f64>>>, shape: (usize, usize)) -> Result<Array2<f64>> {
    if rows.len() != shape.0 || rows.iter().any(|row| row.len() != shape.1) {
        return Err(Error::InvalidFormat(format!(
            "`{name}` must have {} rows of {} values",
            shape.0, shape.1
        )));
    }
    let flat = rows
        .into_iter()
        .flatten()
        .map(|v| v.unwrap_or(f64::NAN))
        .collect();
    Array2::from_shape_vec(shape, flat).map_err(|e| Error::InvalidFormat(e.to_string()))
}

/// Writes a lookup table as JSON.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_table_json<P: AsRef<Path>>(path: P, table: &TofLookupTable) -> Result<()> {
    let p = table.parameters();
    let document = TableDocument {
        format: JSON_FORMAT.to_string(),
        parameters: TableParametersDocument {
            pulse_period: p.pulse_period,
            pulse_stride: p.pulse_stride,
            distance_resolution: p.distance_resolution,
            time_resolution: p.time_resolution,
            error_threshold: p.error_threshold,
        },
        distance: table.distance().to_vec(),
        event_time_offset: table.event_time_offset().to_vec(),
        values: to_rows(table.values()),
        variances: to_rows(table.variances()),
    };
    let mut writer = BufWriter::new(File::create(path)?);
    serde_json::to_writer(&mut writer, &document)?;
    writer.flush()?;
    Ok(())
}

/// Reads a lookup table from JSON.
///
/// # Errors
/// Returns an error if the file cannot be read or does not hold a valid table.
pub fn read_table_json<P: AsRef<Path>>(path: P) -> Result<TofLookupTable> {
    let document: TableDocument = serde_json::from_reader(BufReader::new(File::open(path)?))?;
    if document.format != JSON_FORMAT {
        return Err(Error::InvalidFormat(format!(
            "unsupported lookup table format `{}`",
            document.format
        )));
    }
    let shape = (document.distance.len(), document.event_time_offset.len());
    let p = document.parameters;
    Ok(TofLookupTable::from_parts(
        document.distance,
        document.event_time_offset,
        from_rows("values", document.values, shape)?,
        from_rows("variances", document.variances, shape)?,
        TableParameters {
            pulse_period: p.pulse_period,
            pulse_stride: p.pulse_stride,
            distance_resolution: p.distance_resolution,
            time_resolution: p.time_resolution,
            error_threshold: p.error_threshold,
        },
    )?)
}

/// Writes a lookup table in the format implied by the file extension.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_table<P: AsRef<Path>>(path: P, table: &TofLookupTable) -> Result<()> {
    match TableFormat::from_path(path.as_ref()) {
        TableFormat::Binary => write_table_binary(path, table),
        TableFormat::Json => write_table_json(path, table),
    }
}

/// Reads a lookup table, detecting the format from the file contents.
///
/// # Errors
/// Returns an error if the file cannot be read or does not hold a valid table.
pub fn read_table<P: AsRef<Path>>(path: P) -> Result<TofLookupTable> {
    let is_binary = MappedFileReader::open(path.as_ref())?.has_magic(TABLE_MAGIC);
    if is_binary {
        read_table_binary(path)
    } else {
        read_table_json(path)
    }
}
