//! Fill and sizing model
//!
//! Models transaction friction without an order book:
//! - Half the round-trip spread paid on every fill
//! - Uniform random slippage, always against the trader
//! - Fixed fractional risk sizing off the stop distance
//!
//! Both functions are stateless. The random source is passed in so that a
//! seeded run replays the same fills.

use common::{Direction, ExecutionConfig, Instrument};
use rand::Rng;

/// Lot sizes are rounded to this many decimals
const LOT_DECIMALS: i32 = 2;

/// A single executed price and the friction baked into it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Fill {
    /// Executed price
    pub price: f64,
    /// Half spread paid per unit
    pub spread: f64,
    /// Slippage paid per unit, in `[0, slippage_pips * pip)`
    pub slippage: f64,
}

/// Executed price for a buy (`Long`) or sell (`Short`) at `raw_price`.
///
/// Draws exactly one value from `rng`, including when slippage is disabled, so
/// the draw sequence only depends on how many fills a run makes.
pub fn fill_price<R: Rng + ?Sized>(
    raw_price: f64,
    direction: Direction,
    config: &ExecutionConfig,
    rng: &mut R,
) -> Fill {
    let half_spread = config.spread_pips * config.pip / 2.0;
    let slippage = rng.gen::<f64>() * config.slippage_pips * config.pip;

    // Buys pay the ask plus slippage, sells receive the bid minus slippage
    let price = raw_price + direction.multiplier() * (half_spread + slippage);

    Fill {
        price,
        spread: half_spread,
        slippage,
    }
}

/// Lots that risk `risk_pct` of `equity` if price travels from `entry` to
/// `stop`, clamped to the configured lot limits.
pub fn position_size(
    equity: f64,
    entry: f64,
    stop: f64,
    config: &ExecutionConfig,
    instrument: &Instrument,
) -> f64 {
    let risk = equity * config.risk_pct;
    let stop_distance = (entry - stop).abs();

    // Degenerate stop
    if stop_distance < config.pip {
        return config.min_lots;
    }

    let stop_pips = stop_distance / config.pip;
    let lots = risk / (stop_pips * instrument.pip_value_per_lot);

    // Not f64::clamp, which panics on inverted or NaN limits
    round_lots(lots.min(config.max_lots).max(config.min_lots))
}

fn round_lots(lots: f64) -> f64 {
    let scale = 10f64.powi(LOT_DECIMALS);
    (lots * scale).round() / scale
}
