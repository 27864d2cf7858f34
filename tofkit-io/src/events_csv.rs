//! CSV exchange of event data.
//!
//! Input rows are `pulse,event_time_zero_ns,event_time_offset_us,ltotal_m`, one per
//! event, grouped by pulse. Output adds a `tof_us` column. Extra input columns are
//! ignored, so a written file with time-of-flight can be read back as raw events.

use crate::{Error, Result};
use std::collections::HashMap;
use std::fs::File;
use std::io::{BufRead, BufReader, BufWriter, Write};
use std::path::Path;
use std::str::FromStr;
use tofkit_core::{EventData, TofEventData};

const COLUMNS: [&str; 4] = [
    "pulse",
    "event_time_zero_ns",
    "event_time_offset_us",
    "ltotal_m",
];

fn csv_error(line: usize, message: impl Into<String>) -> Error {
    Error::Csv {
        line,
        message: message.into(),
    }
}

fn parse_field<T: FromStr>(line: usize, name: &str, field: Option<&str>) -> Result<T>
where
    T::Err: std::fmt::Display,
{
    let raw = field.ok_or_else(|| csv_error(line, format!("missing `{name}`")))?;
    raw.trim()
        .parse()
        .map_err(|e| csv_error(line, format!("invalid `{name}` value {raw:?}: {e}")))
}

/// Reads raw events from CSV.
///
/// # Errors
/// Returns an error if the file cannot be read, a required column is missing, a
/// value does not parse, or the rows are not grouped by pulse.
pub fn read_events_csv<P: AsRef<Path>>(path: P) -> Result<EventData> {
    let reader = BufReader::new(File::open(path)?);
    let mut lines = reader.lines().enumerate();
    let header = loop {
        match lines.next() {
            Some((_, line)) => {
                let line = line?;
                if !line.trim().is_empty() {
                    break line;
                }
            }
            None => return Err(csv_error(1, "empty CSV")),
        }
    };
    let col_idx: HashMap<&str, usize> = header
        .split(',')
        .enumerate()
        .map(|(i, name)| (name.trim(), i))
        .collect();
    let mut idx = [0usize; 4];
    for (slot, name) in idx.iter_mut().zip(COLUMNS) {
        *slot = *col_idx
            .get(name)
            .ok_or_else(|| csv_error(1, format!("missing required column `{name}`")))?;
    }

    let mut event_time_zero: Vec<i64> = Vec::new();
    let mut event_index = Vec::new();
    let mut event_time_offset = Vec::new();
    let mut ltotal = Vec::new();
    let mut current_pulse: Option<u64> = None;
    for (i, line) in lines {
        let line_no = i + 1;
        let line = line?;
        if line.trim().is_empty() {
            continue;
        }
        let fields: Vec<&str> = line.split(',').collect();
        let get = |k: usize| fields.get(idx[k]).copied();
        let pulse: u64 = parse_field(line_no, COLUMNS[0], get(0))?;
        let time_zero: i64 = parse_field(line_no, COLUMNS[1], get(1))?;
        let offset: f64 = parse_field(line_no, COLUMNS[2], get(2))?;
        let l: f64 = parse_field(line_no, COLUMNS[3], get(3))?;
        match current_pulse {
            Some(p) if p == pulse => {
                if event_time_zero.last() != Some(&time_zero) {
                    return Err(csv_error(
                        line_no,
                        format!("pulse {pulse} has inconsistent event_time_zero"),
                    ));
                }
            }
            Some(p) if pulse < p => {
                return Err(csv_error(
                    line_no,
                    format!("pulse {pulse} follows pulse {p}; rows must be grouped by pulse"),
                ));
            }
            _ => {
                current_pulse = Some(pulse);
                event_time_zero.push(time_zero);
                event_index.push(event_time_offset.len());
            }
        }
        event_time_offset.push(offset);
        ltotal.push(l);
    }
    Ok(EventData::new(
        event_time_zero,
        event_index,
        event_time_offset,
        ltotal,
    )?)
}

fn write_rows<W: Write>(
    writer: &mut W,
    events: &EventData,
    tof: Option<&[f64]>,
) -> Result<()> {
    for pulse in 0..events.n_pulses() {
        let time_zero = events.event_time_zero()[pulse];
        for i in events.pulse_range(pulse) {
            write!(
                writer,
                "{pulse},{time_zero},{},{}",
                events.event_time_offset()[i],
                events.ltotal()[i]
            )?;
            match tof {
                Some(tof) => writeln!(writer, ",{}", tof[i])?,
                None => writeln!(writer)?,
            }
        }
    }
    Ok(())
}

/// Writes raw events as CSV.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_events_csv<P: AsRef<Path>>(path: P, events: &EventData) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{}", COLUMNS.join(","))?;
    write_rows(&mut writer, events, None)?;
    writer.flush()?;
    Ok(())
}

/// Writes events with their time-of-flight as CSV. Masked events are written as `NaN`.
///
/// # Errors
/// Returns an error if the file cannot be written.
pub fn write_tof_events_csv<P: AsRef<Path>>(path: P, data: &TofEventData) -> Result<()> {
    let mut writer = BufWriter::new(File::create(path)?);
    writeln!(writer, "{},tof_us", COLUMNS.join(","))?;
    write_rows(&mut writer, data.events(), Some(data.tof()))?;
    writer.flush()?;
    Ok(())
}
