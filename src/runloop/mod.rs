//! Timer-driven scheduling of the particle system.
//!
//! - `controller`: the `RunLoop` state machine and the `Timer` trait
//! - `manual`: `ManualTimer`, a clock advanced by the host
//! - `interval`: `IntervalTimer`, backed by `window.setInterval`

mod controller;
mod interval;
mod manual;

pub use controller::{FpsWindow, RunLoop, RunLoopConfig, Timer};
pub use interval::{IntervalTimer, SharedRunLoop};
pub use manual::ManualTimer;
