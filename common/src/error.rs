use thiserror::Error;

use crate::types::Direction;

#[derive(Error, Debug)]
pub enum BacktestError {
    #[error("Signals misaligned with bars: {bars} bars, {signals} signals")]
    MisalignedSignals { bars: usize, signals: usize },

    #[error("Position already open: {direction:?} since bar {entry_bar}")]
    PositionAlreadyOpen { direction: Direction, entry_bar: usize },

    #[error("Invalid parameter: {0}")]
    InvalidParameter(String),

    #[error("Config loading error: {0}")]
    ConfigLoad(String),

    #[error("JSON error: {0}")]
    JsonError(#[from] serde_json::Error),
}

pub type Result<T> = std::result::Result<T, BacktestError>;
