pub mod data;
pub mod engine;
pub mod execution;
pub mod portfolio;
pub mod signals;

pub use data::{bars_from_ohlc, generate_synthetic_bars};
pub use engine::BacktestEngine;
pub use execution::{fill_price, position_size, Fill};
pub use portfolio::Portfolio;
pub use signals::{RandomSignalGenerator, NULL_PROBABILITIES};

// Re-export common types
pub use common::{
    BacktestConfig, BacktestError, BacktestResult, Bar, Direction, ExecutionConfig, ExitPriority,
    ExitReason, Instrument, Position, Result, RunParameters, Signal, Trade,
};
