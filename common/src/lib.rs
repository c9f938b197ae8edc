pub mod config;
pub mod error;
pub mod types;

pub use config::{BacktestConfig, ExecutionConfig, ExitPriority, Instrument, RunParameters};
pub use error::{BacktestError, Result};
pub use types::*;
