//! Construction of the time-of-flight lookup table from simulated neutrons.
//!
//! Every simulated neutron is propagated to each distance of the table. Its arrival
//! time, wrapped to the frame period, selects a time bin, and the table stores the
//! weighted mean and variance of the time-of-flight of all neutrons in each cell.
//!
//! The time bins are staggered by half a bin so that their centres land on
//! `0, w, 2w, ..`. Arrivals in the last half bin before the frame period wrap into
//! the first bin, and the first column is finally copied to `event_time_offset =
//! frame_period`. This keeps the table exactly periodic.

use log::{debug, info};
use ndarray::{concatenate, s, Array2, Axis};
use rayon::prelude::*;
use std::mem::size_of;
use std::ops::Range;
use sysinfo::System;
use tofkit_core::config::DEFAULT_MAX_RECORDS_PER_CHUNK;
use tofkit_core::constants::{flight_time, MICROS_PER_METRE_ANGSTROM};
use tofkit_core::{
    ChunkConfig, Error, LookupTableConfig, Result, SimulationResults, TableParameters,
    TofLookupTable,
};

// toa, tof, weight and bin index per (neutron, distance) record.
const BYTES_PER_RECORD: usize = 3 * size_of::<f64>() + size_of::<usize>();

/// Distance bin centres (m, relative to the simulation distance) covering
/// `[min, max]` with at least one and a half resolution steps of margin.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
fn distance_centres(min: f64, max: f64, resolution: f64) -> Vec<f64> {
    let steps = ((max - min) / resolution - 1e-9).ceil().max(0.0) as usize;
    let start = min - 1.5 * resolution;
    (0..steps + 4)
        .map(|k| start + k as f64 * resolution)
        .collect()
}

/// Time bin layout along `event_time_offset`.
#[derive(Debug, Clone, Copy)]
struct TimeBins {
    nbins: usize,
    width: f64,
    frame_period: f64,
}

impl TimeBins {
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn new(frame_period: f64, resolution: f64) -> Self {
        let nbins = (frame_period / resolution).floor() as usize + 1;
        Self {
            nbins,
            width: frame_period / nbins as f64,
            frame_period,
        }
    }

    /// Bin index of an absolute arrival time, `None` for non-finite times.
    #[allow(
        clippy::cast_possible_truncation,
        clippy::cast_precision_loss,
        clippy::cast_sign_loss
    )]
    fn index(&self, toa: f64) -> Option<usize> {
        if !toa.is_finite() {
            return None;
        }
        let half = 0.5 * self.width;
        let eto = toa.rem_euclid(self.frame_period).rem_euclid(self.frame_period - half);
        Some((((eto + half) / self.width).floor() as usize).min(self.nbins - 1))
    }

    /// Bin centres including the periodic copy at the frame period.
    #[allow(clippy::cast_precision_loss)]
    fn centres(&self) -> Vec<f64> {
        let mut centres: Vec<f64> = (0..self.nbins).map(|j| j as f64 * self.width).collect();
        centres.push(self.frame_period);
        centres
    }
}

/// Resolves the number of records a single chunk may hold.
///
/// # Errors
/// Returns an error if the memory fraction is invalid or system memory cannot be queried.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_precision_loss,
    clippy::cast_sign_loss
)]
pub fn resolve_max_records(chunk: &ChunkConfig) -> Result<usize> {
    if let Some(records) = chunk.max_records {
        return Ok(records.max(1));
    }
    if !(0.0 < chunk.memory_fraction && chunk.memory_fraction <= 1.0) {
        return Err(Error::config("memory_fraction must be in (0.0, 1.0]"));
    }
    let mut system = System::new();
    system.refresh_memory();
    let available = system.available_memory();
    if available == 0 {
        return Err(Error::config("available system memory reported as 0"));
    }
    let budget = (available as f64 * chunk.memory_fraction).floor() as u64;
    let records = usize::try_from(budget).unwrap_or(usize::MAX) / BYTES_PER_RECORD;
    Ok(records.clamp(1, DEFAULT_MAX_RECORDS_PER_CHUNK))
}

/// Splits `n_rows` distance rows into consecutive ranges of at most `max_records`
/// records each, with `n_neutrons` records per row.
fn chunk_ranges(n_rows: usize, n_neutrons: usize, max_records: usize) -> Vec<Range<usize>> {
    let rows_per_chunk = (max_records / n_neutrons.max(1)).max(1);
    (0..n_rows)
        .step_by(rows_per_chunk)
        .map(|start| start..(start + rows_per_chunk).min(n_rows))
        .collect()
}

/// Weighted mean and variance of the time-of-flight for the rows `distances`.
fn compute_rows(
    simulation: &SimulationResults,
    distances: &[f64],
    bins: TimeBins,
) -> (Array2<f64>, Array2<f64>) {
    let mut mean = Array2::<f64>::from_elem((distances.len(), bins.nbins), f64::NAN);
    let mut variance = mean.clone();
    let toa = simulation.time_of_arrival();
    let speed = simulation.speed();
    let wavelength = simulation.wavelength();
    let weight = simulation.weight();
    let mut indices = vec![None; simulation.len()];
    let mut sum_w = vec![0.0; bins.nbins];
    let mut sum_wt = vec![0.0; bins.nbins];
    let mut sum_wdev = vec![0.0; bins.nbins];

    for (row, &d) in distances.iter().enumerate() {
        let ltotal = d + simulation.distance();
        sum_w.fill(0.0);
        sum_wt.fill(0.0);
        sum_wdev.fill(0.0);
        for i in 0..simulation.len() {
            indices[i] = bins.index(toa[i] + flight_time(d, speed[i]));
            if let Some(j) = indices[i] {
                let tof = ltotal * MICROS_PER_METRE_ANGSTROM * wavelength[i];
                sum_w[j] += weight[i];
                sum_wt[j] += weight[i] * tof;
            }
        }
        let row_mean: Vec<f64> = sum_wt.iter().zip(&sum_w).map(|(t, w)| t / w).collect();
        for i in 0..simulation.len() {
            if let Some(j) = indices[i] {
                let tof = ltotal * MICROS_PER_METRE_ANGSTROM * wavelength[i];
                sum_wdev[j] += weight[i] * (tof - row_mean[j]).powi(2);
            }
        }
        for j in 0..bins.nbins {
            if sum_w[j] > 0.0 {
                mean[[row, j]] = row_mean[j];
                variance[[row, j]] = sum_wdev[j] / sum_w[j];
            }
        }
    }
    (mean, variance)
}

/// Appends a copy of the first column.
fn append_periodic_column(array: &Array2<f64>) -> Result<Array2<f64>> {
    concatenate(Axis(1), &[array.view(), array.slice(s![.., 0..1])])
        .map_err(|e| Error::ShapeError(e.to_string()))
}

/// Computes the unmasked lookup table.
///
/// The table is computed in chunks along the distance axis. Chunks are processed in
/// parallel and concatenated in order.
///
/// # Errors
/// Returns an error if the configuration is invalid or the chunk budget cannot be
/// resolved.
pub fn compute_lookup_table(
    simulation: &SimulationResults,
    config: &LookupTableConfig,
) -> Result<TofLookupTable> {
    config.validate()?;
    let resolution = config.distance_resolution;
    let relative = distance_centres(
        config.ltotal_range.min - simulation.distance(),
        config.ltotal_range.max - simulation.distance(),
        resolution,
    );
    let bins = TimeBins::new(config.frame_period(), config.time_resolution);

    let max_records = resolve_max_records(&config.chunk)?;
    let chunks = chunk_ranges(relative.len(), simulation.len(), max_records);
    debug!(
        "lookup table: {} distances x {} time bins from {} neutrons in {} chunks",
        relative.len(),
        bins.nbins,
        simulation.len(),
        chunks.len()
    );

    let pieces: Vec<(Array2<f64>, Array2<f64>)> = chunks
        .into_par_iter()
        .map(|range| compute_rows(simulation, &relative[range], bins))
        .collect();
    let stack = |select: fn(&(Array2<f64>, Array2<f64>)) -> &Array2<f64>| {
        let views: Vec<_> = pieces.iter().map(|p| select(p).view()).collect();
        concatenate(Axis(0), &views).map_err(|e| Error::ShapeError(e.to_string()))
    };
    let mean = stack(|p| &p.0)?;
    let variance = stack(|p| &p.1)?;

    let parameters = TableParameters {
        pulse_period: config.pulse_period,
        pulse_stride: config.pulse_stride,
        distance_resolution: resolution,
        time_resolution: bins.width,
        error_threshold: config.error_threshold,
    };
    TofLookupTable::from_parts(
        relative.iter().map(|d| d + simulation.distance()).collect(),
        bins.centres(),
        append_periodic_column(&mean)?,
        append_periodic_column(&variance)?,
        parameters,
    )
}

/// Returns a copy of `table` with cells whose relative standard deviation exceeds
/// `threshold` set to NaN. The input table is left untouched.
#[must_use]
pub fn mask_large_uncertainty(table: &TofLookupTable, threshold: f64) -> TofLookupTable {
    let masked = table.mask_large_uncertainty(threshold);
    debug!(
        "masked {} cells above relative error {threshold}",
        masked.masked_count() - table.masked_count()
    );
    masked
}

/// Builds the masked lookup table from simulation results.
///
/// # Errors
/// Returns an error if the configuration is invalid.
pub fn build_lookup_table(
    simulation: &SimulationResults,
    config: &LookupTableConfig,
) -> Result<TofLookupTable> {
    let table = mask_large_uncertainty(
        &compute_lookup_table(simulation, config)?,
        config.error_threshold,
    );
    let (rows, cols) = table.shape();
    info!(
        "built lookup table {rows}x{cols}, {} of {} cells masked",
        table.masked_count(),
        rows * cols
    );
    Ok(table)
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;
    use tofkit_core::LtotalRange;

    fn simulation() -> SimulationResults {
        // Two neutron groups with distinct wavelengths, recorded at 10 m.
        let n = 200;
        let mut toa = Vec::new();
        let mut speed = Vec::new();
        let mut wavelength = Vec::new();
        for i in 0..n {
            let l = if i % 2 == 0 { 2.0 } else { 4.0 };
            let birth = f64::from(i) * 10.0;
            wavelength.push(l);
            speed.push(tofkit_core::constants::speed_from_wavelength(l));
            toa.push(birth + tofkit_core::constants::tof_from_wavelength(10.0, l));
        }
        SimulationResults::new(toa, speed, wavelength, vec![1.0; n as usize], 10.0).unwrap()
    }

    fn config() -> LookupTableConfig {
        LookupTableConfig::new(LtotalRange::new(20.0, 30.0))
            .with_pulse_period(100_000.0)
            .with_distance_resolution(1.0)
            .with_time_resolution(1000.0)
            .with_error_threshold(f64::INFINITY)
    }

    #[test]
    fn test_distance_padding() {
        let centres = distance_centres(5.0, 5.0, 0.5);
        assert_eq!(centres.len(), 4);
        assert_relative_eq!(centres[0], 4.25);
        assert_relative_eq!(centres[3], 5.75);

        let centres = distance_centres(1.0, 2.05, 0.1);
        assert!(centres[0] <= 1.0 - 0.15 + 1e-12);
        assert!(*centres.last().unwrap() >= 2.05 + 0.15 - 1e-12);
    }

    #[test]
    fn test_time_bins() {
        let bins = TimeBins::new(1000.0, 300.0);
        assert_eq!(bins.nbins, 4);
        assert_relative_eq!(bins.width, 250.0);
        assert_eq!(bins.index(0.0), Some(0));
        assert_eq!(bins.index(124.0), Some(0));
        assert_eq!(bins.index(126.0), Some(1));
        // The last half bin wraps to the first one.
        assert_eq!(bins.index(880.0), Some(0));
        assert_eq!(bins.index(1126.0), Some(1));
        assert_eq!(bins.index(f64::NAN), None);
        assert_eq!(bins.centres(), vec![0.0, 250.0, 500.0, 750.0, 1000.0]);
    }

    #[test]
    fn test_chunk_ranges_cover_all_rows() {
        let ranges = chunk_ranges(10, 100, 350);
        assert_eq!(ranges, vec![0..3, 3..6, 6..9, 9..10]);
        assert_eq!(chunk_ranges(3, 0, 10), vec![0..3]);
    }

    #[test]
    fn test_table_is_periodic_and_covers_range() {
        let table = compute_lookup_table(&simulation(), &config()).unwrap();
        assert!(table.is_periodic());
        let (lo, hi) = table.distance_range();
        assert!(lo <= 20.0 - 1.5 + 1e-9);
        assert!(hi >= 30.0 + 1.5 - 1e-9);
        let eto = table.event_time_offset();
        assert_relative_eq!(eto[0], 0.0);
        assert_relative_eq!(*eto.last().unwrap(), 100_000.0);
    }

    #[test]
    fn test_chunking_does_not_change_result() {
        let sim = simulation();
        let whole = compute_lookup_table(&sim, &config().with_max_records_per_chunk(1 << 30)).unwrap();
        let chunked = compute_lookup_table(&sim, &config().with_max_records_per_chunk(250)).unwrap();
        assert_eq!(whole.shape(), chunked.shape());
        for (a, b) in whole.values().iter().zip(chunked.values()) {
            assert!(a.to_bits() == b.to_bits());
        }
    }

    #[test]
    fn test_cell_mean_is_weighted_tof() {
        // Single neutron: its cell holds exactly its time-of-flight and zero variance.
        let l = 3.0;
        let speed = tofkit_core::constants::speed_from_wavelength(l);
        let sim = SimulationResults::new(vec![1000.0], vec![speed], vec![l], vec![2.0], 0.0).unwrap();
        let config = LookupTableConfig::new(LtotalRange::new(10.0, 10.0))
            .with_pulse_period(100_000.0)
            .with_distance_resolution(1.0)
            .with_time_resolution(500.0);
        let table = compute_lookup_table(&sim, &config).unwrap();
        let row = table
            .distance()
            .iter()
            .position(|&d| (d - 10.5).abs() < 1e-9)
            .unwrap();
        let expected = tofkit_core::constants::tof_from_wavelength(10.5, l);
        let filled: Vec<f64> = table.row(row).iter().copied().filter(|v| !v.is_nan()).collect();
        assert_eq!(filled.len(), 1);
        assert_relative_eq!(filled[0], expected, max_relative = 1e-12);
    }

    #[test]
    fn test_masking_is_monotonic() {
        let table = compute_lookup_table(&simulation(), &config()).unwrap();
        let loose = mask_large_uncertainty(&table, 0.5);
        let tight = mask_large_uncertainty(&table, 0.01);
        assert!(tight.masked_count() >= loose.masked_count());
        for (l, t) in loose.values().iter().zip(tight.values()) {
            if l.is_nan() {
                assert!(t.is_nan());
            }
        }
        assert!(tight.is_periodic());
        assert_relative_eq!(tight.parameters().error_threshold, 0.01);
    }

    #[test]
    fn test_empty_simulation_gives_masked_table() {
        let sim = SimulationResults::new(vec![], vec![], vec![], vec![], 0.0).unwrap();
        let table = build_lookup_table(&sim, &config()).unwrap();
        let (rows, cols) = table.shape();
        assert_eq!(table.masked_count(), rows * cols);
    }
}
