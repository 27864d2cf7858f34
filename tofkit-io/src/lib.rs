//! tofkit-io: File I/O for tofkit.
//!
//! This crate provides:
//! - Lookup table persistence, binary (memory-mapped reads via memmap2) and JSON
//! - Simulation results persistence
//! - CSV exchange of raw events and events with time-of-flight
//! - Per-path locks for files shared between callers
//!

mod error;
pub mod events_csv;
pub mod lock;
mod reader;
pub mod simulation_file;
pub mod table_file;

pub use error::{Error, Result};
pub use events_csv::{read_events_csv, write_events_csv, write_tof_events_csv};
pub use lock::{with_file_lock, FileLock};
pub use reader::MappedFileReader;
pub use simulation_file::{read_simulation, write_simulation, SIMULATION_MAGIC};
pub use table_file::{
    read_table, read_table_binary, read_table_json, write_table, write_table_binary,
    write_table_json, TableFormat, TABLE_MAGIC,
};
