//! tofkit-core: Core types for neutron time-of-flight processing.
//!
//! This crate provides the shared data model: simulation results, the
//! time-of-flight lookup table, raw event and histogram data, configuration,
//! physical constants and NaN-aware statistics.
//!

pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod simulation;
pub mod stats;
pub mod table;

pub use config::{ChunkConfig, LookupTableConfig, LtotalRange, UnwrapConfig};
pub use constants::Facility;
pub use error::{Error, Result};
pub use events::{EventData, HistogramData, RawData, TimeAxis, TofEventData, TofHistogram};
pub use simulation::{FastestNeutron, SimulationResults};
pub use stats::{nan_median, nan_min_max, nan_percentile, TofStatistics};
pub use table::{TableParameters, TofLookupTable};
