pub mod random;

pub use random::{RandomSignalGenerator, NULL_PROBABILITIES};
