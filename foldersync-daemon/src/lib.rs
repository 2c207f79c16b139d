//! Poll loop runtime: periodic sync passes, ctrl-c handling, log setup.

mod error;
pub mod log_rotation;
mod runtime;

pub use error::DaemonError;
pub use log_rotation::RotatingLog;
pub use runtime::{init_tracing, run, run_with_observer, start_blocking, LoopSummary};
