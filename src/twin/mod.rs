//! Digital twin simulation: per-asset fault model, signal generator and the
//! tick loop that drives it.

mod driver;
pub mod fault;
mod generator;

pub use driver::SimulationDriver;
pub use fault::{next_mode, FaultMode};
pub use generator::TwinGenerator;
