//! Tor daemon interaction
//!
//! Supervises the tor process, talks to its ControlPort and rotates
//! circuits. Tor itself is treated as a black box.

pub mod circuit;
pub mod control;
pub mod process;

pub use circuit::{CircuitCoordinator, ROTATION_MARKERS};
pub use control::{ControlChannel, Signal};
pub use process::{DaemonOutput, DaemonSettings, ProcessSupervisor, BOOTSTRAP_MARKER};
