pub mod synthetic;

pub use synthetic::{bars_from_ohlc, generate_synthetic_bars};
