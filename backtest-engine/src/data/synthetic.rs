use chrono::{DateTime, Duration, Utc};
use common::Bar;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

/// Relative one-bar move, roughly 1.5 pips on EURUSD M1
const BAR_VOLATILITY: f64 = 0.00015;

/// 2024-01-02 00:00:00 UTC
const START_TIMESTAMP: i64 = 1_704_153_600;

fn start_time() -> DateTime<Utc> {
    DateTime::UNIX_EPOCH + Duration::seconds(START_TIMESTAMP)
}

/// Generate a driftless one-minute random walk for testing.
///
/// Each bar opens at the previous close, so the series has no gaps. The same
/// seed always produces the same bars.
pub fn generate_synthetic_bars(count: usize, initial_price: f64, seed: u64) -> Vec<Bar> {
    let mut rng = StdRng::seed_from_u64(seed);
    let mut bars = Vec::with_capacity(count);
    let start = start_time();

    let mut price = initial_price;

    for i in 0..count {
        let bar_return = BAR_VOLATILITY * rng.gen_range(-1.0..1.0);
        let open = price;
        let close = price * (1.0 + bar_return);

        // Wicks beyond the body
        let wick = price * BAR_VOLATILITY;
        let high = open.max(close) + rng.gen_range(0.0..wick);
        let low = open.min(close) - rng.gen_range(0.0..wick);

        bars.push(Bar {
            timestamp: start + Duration::minutes(i as i64),
            open,
            high,
            low,
            close,
        });

        price = close;
    }

    bars
}

/// Build one-minute bars from `[open, high, low, close]` rows
pub fn bars_from_ohlc(rows: &[[f64; 4]]) -> Vec<Bar> {
    let start = start_time();
    rows.iter()
        .enumerate()
        .map(|(i, &[open, high, low, close])| {
            Bar::new(start + Duration::minutes(i as i64), open, high, low, close)
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_generate_synthetic_bars() {
        let bars = generate_synthetic_bars(1_000, 1.1, 42);

        assert_eq!(bars.len(), 1_000);

        for bar in &bars {
            assert!(bar.high >= bar.low);
            assert!(bar.high >= bar.open);
            assert!(bar.high >= bar.close);
            assert!(bar.low <= bar.open);
            assert!(bar.low <= bar.close);
        }

        for pair in bars.windows(2) {
            assert!(pair[1].timestamp > pair[0].timestamp);
            assert_eq!(pair[1].open, pair[0].close);
        }
    }

    #[test]
    fn test_synthetic_bars_are_seeded() {
        assert_eq!(generate_synthetic_bars(100, 1.1, 5), generate_synthetic_bars(100, 1.1, 5));
        assert_ne!(generate_synthetic_bars(100, 1.1, 5), generate_synthetic_bars(100, 1.1, 6));
    }

    #[test]
    fn test_series_starts_on_a_fixed_date() {
        use chrono::TimeZone;

        let bars = generate_synthetic_bars(1, 1.1, 1);
        assert_eq!(bars[0].timestamp, Utc.with_ymd_and_hms(2024, 1, 2, 0, 0, 0).unwrap());
    }

    #[test]
    fn test_bars_from_ohlc() {
        let bars = bars_from_ohlc(&[[1.1, 1.2, 1.0, 1.15], [1.15, 1.16, 1.14, 1.155]]);

        assert_eq!(bars.len(), 2);
        assert_eq!(bars[1].open, 1.15);
        assert_eq!(bars[1].timestamp - bars[0].timestamp, Duration::minutes(1));
    }
}
