//! tofkit-sim: Monte-Carlo simulation of neutrons through a chopper cascade.
//!
//! # Key Components
//!
//! - [`DiskChopper`] - Rotating disk with slits, open/closed at a given time
//! - [`EssSource`] - Pulse shape and wavelength spectrum of the ESS long pulse
//! - [`simulate_beamline`] - Propagates source neutrons through the choppers
//! - [`fakes::FakeBeamline`] - Recorded event data with known ground truth

mod beamline;
pub mod chopper;
pub mod fakes;
pub mod source;

pub use beamline::{simulate_beamline, simulate_with_source, SimulationConfig};
pub use chopper::{DiskChopper, Direction, Position};
pub use source::{facility_source, EssSource, NeutronSource, SourceSample};
