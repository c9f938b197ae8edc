//! Random ternary signals
//!
//! A strategy with no edge: each bar independently draws short, flat or long.
//! Run through the engine with non-zero costs it must lose money on average,
//! which makes it the reference input for checking that friction is applied
//! and that no future information leaks into fills.

use common::{BacktestError, Result, Signal};
use rand::distributions::{Distribution, WeightedIndex};
use rand::rngs::StdRng;
use rand::SeedableRng;

/// `[short, flat, long]` probabilities of the null strategy
pub const NULL_PROBABILITIES: [f64; 3] = [0.1, 0.8, 0.1];

const OUTCOMES: [Signal; 3] = [Signal::Short, Signal::Flat, Signal::Long];

#[derive(Debug, Clone)]
pub struct RandomSignalGenerator {
    weights: WeightedIndex<f64>,
}

impl RandomSignalGenerator {
    /// Weights for `[short, flat, long]`. They need not sum to one.
    pub fn new(probabilities: [f64; 3]) -> Result<Self> {
        let weights = WeightedIndex::new(probabilities).map_err(|e| {
            BacktestError::InvalidParameter(format!(
                "signal probabilities {:?}: {}",
                probabilities, e
            ))
        })?;
        Ok(Self { weights })
    }

    pub fn generate(&self, count: usize, seed: u64) -> Vec<Signal> {
        let mut rng = StdRng::seed_from_u64(seed);
        (0..count)
            .map(|_| OUTCOMES[self.weights.sample(&mut rng)])
            .collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_frequencies_follow_probabilities() {
        let generator = RandomSignalGenerator::new(NULL_PROBABILITIES).unwrap();
        let signals = generator.generate(100_000, 42);

        let count = |s: Signal| signals.iter().filter(|&&x| x == s).count() as f64 / 100_000.0;
        assert!((count(Signal::Short) - 0.1).abs() < 0.01);
        assert!((count(Signal::Flat) - 0.8).abs() < 0.01);
        assert!((count(Signal::Long) - 0.1).abs() < 0.01);
    }

    #[test]
    fn test_same_seed_same_signals() {
        let generator = RandomSignalGenerator::new(NULL_PROBABILITIES).unwrap();
        assert_eq!(generator.generate(500, 1), generator.generate(500, 1));
        assert_ne!(generator.generate(500, 1), generator.generate(500, 2));
    }

    #[test]
    fn test_zero_weight_never_drawn() {
        let generator = RandomSignalGenerator::new([0.0, 1.0, 1.0]).unwrap();
        assert!(generator.generate(1_000, 3).iter().all(|&s| s != Signal::Short));
    }

    #[test]
    fn test_invalid_probabilities() {
        assert!(RandomSignalGenerator::new([0.0, 0.0, 0.0]).is_err());
        assert!(RandomSignalGenerator::new([-0.1, 0.8, 0.3]).is_err());
    }
}
