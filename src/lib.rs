//! Discrete-event simulator of a peer-to-peer backup network.
//!
//! Nodes come online and go offline on exponential timers, occasionally
//! fail outright and lose their local data, and while online spend their
//! bandwidth backing up each other's blocks and restoring their own. The
//! simulation advances a virtual clock driven entirely by a priority queue
//! of scheduled events; see [`engine`] for the queue and [`sim`] for the
//! state machine that drives it.

pub mod config;
pub mod engine;
pub mod error;
pub mod node;
pub mod sim;
pub mod stats;

pub use error::{Result, SimError};
pub use sim::Simulation;
pub use stats::Summary;
