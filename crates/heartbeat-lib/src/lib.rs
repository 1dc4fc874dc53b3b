pub mod config;
pub mod detectors;
pub mod error;
pub mod metrics;
pub mod ops;
pub mod signal;

pub use detectors::*;
pub use error::{BeatError, ErrorKind, Result};
pub use metrics::*;
pub use ops::{CallArgs, OpRegistry, Operation};
pub use signal::*;
