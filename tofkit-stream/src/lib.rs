//! tofkit-stream: Keyed computation graphs and streaming accumulation.
//!
//! This crate provides:
//! - **Pipeline** - A keyed graph of parameters and providers with a memoising evaluator
//! - **Accumulators** - Eternal and rolling sums over stream chunks
//! - **StreamProcessor** - Incremental evaluation of a pipeline over chunks of dynamic inputs
//! - **GenericTofWorkflow** - The time-of-flight providers wired per run and monitor kind
//!

mod accumulator;
mod error;
mod key;
mod pipeline;
mod processor;
pub mod tof_workflow;
mod value;

pub use accumulator::{
    Accumulator, AccumulatorSpec, EternalAccumulator, RollingAccumulator, StreamValue,
    DEFAULT_WINDOW,
};
pub use error::{Result, StreamError};
pub use key::{Key, MonitorKind, RunKind};
pub use pipeline::{Node, Pipeline, Provider};
pub use processor::StreamProcessor;
pub use tof_workflow::{GenericTofWorkflow, TofLutProvider};
pub use value::TofValue;
