//! Values flowing through a time-of-flight pipeline.

use crate::accumulator::StreamValue;
use crate::error::{Result, StreamError};
use crate::key::Key;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tofkit_algorithms::TofData;
use tofkit_core::{Facility, LtotalRange, RawData, SimulationResults, TofLookupTable};
use tofkit_sim::{DiskChopper, Position};

/// A value of a [`Pipeline`](crate::Pipeline) wired by
/// [`GenericTofWorkflow`](crate::GenericTofWorkflow).
///
/// Large immutable results are shared through [`Arc`] so copying a pipeline or
/// reading a cached value does not duplicate them.
#[derive(Debug, Clone, PartialEq)]
pub enum TofValue {
    /// A scalar such as a period (µs) or a resolution.
    Float(f64),
    /// A count such as the pulse stride.
    Count(usize),
    /// A count that may be left to inference.
    OptionalCount(Option<usize>),
    /// A random seed.
    Seed(u64),
    /// A file path.
    Path(PathBuf),
    /// A facility.
    Facility(Facility),
    /// Chopper settings, ordered as given.
    Choppers(Vec<DiskChopper>),
    /// A position (m).
    Position(Position),
    /// A range of flight paths.
    Range(LtotalRange),
    /// Raw detector or monitor data.
    Raw(RawData),
    /// Flight paths (m).
    Ltotal(Vec<f64>),
    /// Simulated neutrons.
    Simulation(Arc<SimulationResults>),
    /// A lookup table.
    Table(Arc<TofLookupTable>),
    /// Data with time-of-flight.
    Tof(TofData),
}

impl TofValue {
    /// Name of the variant, for error messages.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::Float(_) => "a float",
            Self::Count(_) => "a count",
            Self::OptionalCount(_) => "an optional count",
            Self::Seed(_) => "a seed",
            Self::Path(_) => "a path",
            Self::Facility(_) => "a facility",
            Self::Choppers(_) => "choppers",
            Self::Position(_) => "a position",
            Self::Range(_) => "an Ltotal range",
            Self::Raw(_) => "raw data",
            Self::Ltotal(_) => "Ltotal values",
            Self::Simulation(_) => "simulation results",
            Self::Table(_) => "a lookup table",
            Self::Tof(_) => "time-of-flight data",
        }
    }

    fn mismatch(&self, key: Key, expected: &'static str) -> StreamError {
        StreamError::TypeMismatch {
            key,
            expected,
            found: self.kind(),
        }
    }

    /// The scalar held for `key`.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn float(&self, key: Key) -> Result<f64> {
        match self {
            Self::Float(v) => Ok(*v),
            _ => Err(self.mismatch(key, "a float")),
        }
    }

    /// The count held for `key`.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn count(&self, key: Key) -> Result<usize> {
        match self {
            Self::Count(v) => Ok(*v),
            _ => Err(self.mismatch(key, "a count")),
        }
    }

    /// The optional count held for `key`. A plain count is accepted too.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn optional_count(&self, key: Key) -> Result<Option<usize>> {
        match self {
            Self::OptionalCount(v) => Ok(*v),
            Self::Count(v) => Ok(Some(*v)),
            _ => Err(self.mismatch(key, "an optional count")),
        }
    }

    /// The seed held for `key`.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn seed(&self, key: Key) -> Result<u64> {
        match self {
            Self::Seed(v) => Ok(*v),
            _ => Err(self.mismatch(key, "a seed")),
        }
    }

    /// The path held for `key`.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn path(&self, key: Key) -> Result<&Path> {
        match self {
            Self::Path(v) => Ok(v),
            _ => Err(self.mismatch(key, "a path")),
        }
    }

    /// The facility held for `key`.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn facility(&self, key: Key) -> Result<Facility> {
        match self {
            Self::Facility(v) => Ok(*v),
            _ => Err(self.mismatch(key, "a facility")),
        }
    }

    /// The choppers held for `key`.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn choppers(&self, key: Key) -> Result<&[DiskChopper]> {
        match self {
            Self::Choppers(v) => Ok(v),
            _ => Err(self.mismatch(key, "choppers")),
        }
    }

    /// The position held for `key`.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn position(&self, key: Key) -> Result<Position> {
        match self {
            Self::Position(v) => Ok(*v),
            _ => Err(self.mismatch(key, "a position")),
        }
    }

    /// The Ltotal range held for `key`.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn range(&self, key: Key) -> Result<LtotalRange> {
        match self {
            Self::Range(v) => Ok(*v),
            _ => Err(self.mismatch(key, "an Ltotal range")),
        }
    }

    /// The raw data held for `key`.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn raw(&self, key: Key) -> Result<&RawData> {
        match self {
            Self::Raw(v) => Ok(v),
            _ => Err(self.mismatch(key, "raw data")),
        }
    }

    /// The simulation results held for `key`.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn simulation(&self, key: Key) -> Result<&Arc<SimulationResults>> {
        match self {
            Self::Simulation(v) => Ok(v),
            _ => Err(self.mismatch(key, "simulation results")),
        }
    }

    /// The lookup table held for `key`.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn table(&self, key: Key) -> Result<&Arc<TofLookupTable>> {
        match self {
            Self::Table(v) => Ok(v),
            _ => Err(self.mismatch(key, "a lookup table")),
        }
    }

    /// The time-of-flight data held for `key`.
    ///
    /// # Errors
    /// Returns [`StreamError::TypeMismatch`] for any other variant.
    pub fn tof(&self, key: Key) -> Result<&TofData> {
        match self {
            Self::Tof(v) => Ok(v),
            _ => Err(self.mismatch(key, "time-of-flight data")),
        }
    }
}

impl StreamValue for TofValue {
    /// Sums scalars and counts, concatenates events and adds histograms.
    fn accumulate(&mut self, other: &Self) -> Result<()> {
        match (self, other) {
            (Self::Float(a), Self::Float(b)) => *a += b,
            (Self::Count(a), Self::Count(b)) => *a += b,
            (Self::Raw(RawData::Events(a)), Self::Raw(RawData::Events(b))) => a.extend(b),
            (Self::Raw(RawData::Histogram(a)), Self::Raw(RawData::Histogram(b))) => a.add(b)?,
            (Self::Tof(TofData::Events(a)), Self::Tof(TofData::Events(b))) => a.extend(b),
            (Self::Tof(TofData::Histogram(a)), Self::Tof(TofData::Histogram(b))) => a.add(b)?,
            (a, _) => {
                return Err(StreamError::NotAccumulable(a.kind()));
            }
        }
        Ok(())
    }
}

impl From<f64> for TofValue {
    fn from(value: f64) -> Self {
        Self::Float(value)
    }
}

impl From<usize> for TofValue {
    fn from(value: usize) -> Self {
        Self::Count(value)
    }
}

impl From<RawData> for TofValue {
    fn from(value: RawData) -> Self {
        Self::Raw(value)
    }
}

impl From<TofLookupTable> for TofValue {
    fn from(value: TofLookupTable) -> Self {
        Self::Table(Arc::new(value))
    }
}

impl From<SimulationResults> for TofValue {
    fn from(value: SimulationResults) -> Self {
        Self::Simulation(Arc::new(value))
    }
}
