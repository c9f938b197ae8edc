use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::config::{ExecutionConfig, Instrument, RunParameters};

/// OHLC bar data
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bar {
    pub timestamp: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
}

impl Bar {
    pub fn new(timestamp: DateTime<Utc>, open: f64, high: f64, low: f64, close: f64) -> Self {
        Self {
            timestamp,
            open,
            high,
            low,
            close,
        }
    }
}

/// Direction of an open position or of a single fill.
///
/// There is no flat variant: a fill always buys or sells.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Direction {
    Long,
    Short,
}

impl Direction {
    /// +1.0 for long, -1.0 for short
    #[inline]
    pub fn multiplier(self) -> f64 {
        match self {
            Direction::Long => 1.0,
            Direction::Short => -1.0,
        }
    }

    #[inline]
    pub fn opposite(self) -> Self {
        match self {
            Direction::Long => Direction::Short,
            Direction::Short => Direction::Long,
        }
    }
}

/// Target exposure emitted by a strategy for one bar.
///
/// The signal observed at bar `i` is acted on at bar `i + 1`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Long,
    Short,
    #[default]
    Flat,
}

impl Signal {
    /// Map the usual `+1 / 0 / -1` encoding onto a signal. Any positive value
    /// is long and any negative value is short.
    pub fn from_int(value: i32) -> Self {
        match value.signum() {
            1 => Signal::Long,
            -1 => Signal::Short,
            _ => Signal::Flat,
        }
    }

    pub fn as_int(self) -> i32 {
        match self {
            Signal::Long => 1,
            Signal::Short => -1,
            Signal::Flat => 0,
        }
    }

    pub fn direction(self) -> Option<Direction> {
        match self {
            Signal::Long => Some(Direction::Long),
            Signal::Short => Some(Direction::Short),
            Signal::Flat => None,
        }
    }
}

impl From<Direction> for Signal {
    fn from(direction: Direction) -> Self {
        match direction {
            Direction::Long => Signal::Long,
            Direction::Short => Signal::Short,
        }
    }
}

/// Why a position was closed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitReason {
    /// Previous bar's signal went flat
    Signal,
    /// Previous bar's signal flipped to the opposite side
    Reversal,
    StopLoss,
    TakeProfit,
    /// Closed at the last bar's close
    EndOfData,
}

/// The single live position held by the engine
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Position {
    pub direction: Direction,
    /// Entry fill, after spread and slippage
    pub entry_price: f64,
    pub entry_time: DateTime<Utc>,
    pub entry_bar: usize,
    pub lots: f64,
    /// Half spread paid per unit on entry
    pub entry_spread: f64,
    /// Slippage paid per unit on entry
    pub entry_slippage: f64,
    /// Max adverse excursion in pips
    pub mae_pips: f64,
    /// Max favorable excursion in pips
    pub mfe_pips: f64,
}

impl Position {
    /// Favorable and adverse excursion of a bar's range relative to entry, in
    /// pips. Either value can be negative when the whole bar sits on one side
    /// of the entry.
    pub fn excursions(&self, high: f64, low: f64, pip: f64) -> (f64, f64) {
        match self.direction {
            Direction::Long => ((high - self.entry_price) / pip, (self.entry_price - low) / pip),
            Direction::Short => ((self.entry_price - low) / pip, (high - self.entry_price) / pip),
        }
    }

    /// Price `pips` away from entry against the position
    pub fn stop_price(&self, pips: f64, pip: f64) -> f64 {
        self.entry_price - self.direction.multiplier() * pips * pip
    }

    /// Price `pips` away from entry in favour of the position
    pub fn target_price(&self, pips: f64, pip: f64) -> f64 {
        self.entry_price + self.direction.multiplier() * pips * pip
    }
}

/// Closed trade record
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Trade {
    pub entry_time: DateTime<Utc>,
    pub exit_time: DateTime<Utc>,
    pub entry_bar: usize,
    pub exit_bar: usize,
    pub direction: Direction,
    pub entry_price: f64,
    pub exit_price: f64,
    pub lots: f64,
    pub pnl_gross: f64,
    pub pnl_net: f64,
    /// Round-trip spread paid on the full notional
    pub spread_cost: f64,
    /// Exit-leg slippage on the full notional
    pub slippage_cost: f64,
    /// Entry-leg slippage on the full notional
    pub entry_slippage_cost: f64,
    pub commission: f64,
    pub bars_held: usize,
    pub mae_pips: f64,
    pub mfe_pips: f64,
    pub exit_reason: ExitReason,
}

/// Backtest result
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BacktestResult {
    /// Realized equity at every bar
    pub equity_curve: Vec<(DateTime<Utc>, f64)>,
    pub trades: Vec<Trade>,
    /// Simple bar-to-bar returns of the equity curve, first value 0
    pub returns: Vec<f64>,
    pub config: ExecutionConfig,
    pub instrument: Instrument,
    pub params: RunParameters,
    pub initial_equity: f64,
    pub final_equity: f64,
    /// Position still live after the last bar, not part of the ledger
    #[serde(skip_serializing_if = "Option::is_none")]
    pub open_position: Option<Position>,
}

impl BacktestResult {
    /// Total return as a fraction of initial equity
    pub fn total_return(&self) -> f64 {
        self.final_equity / self.initial_equity - 1.0
    }

    /// Mean net P&L per closed trade
    pub fn expectancy(&self) -> f64 {
        if self.trades.is_empty() {
            return 0.0;
        }
        self.trades.iter().map(|t| t.pnl_net).sum::<f64>() / self.trades.len() as f64
    }

    pub fn equity_values(&self) -> impl Iterator<Item = f64> + '_ {
        self.equity_curve.iter().map(|(_, e)| *e)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn long_at(entry: f64) -> Position {
        Position {
            direction: Direction::Long,
            entry_price: entry,
            entry_time: Utc.with_ymd_and_hms(2024, 1, 1, 0, 0, 0).unwrap(),
            entry_bar: 1,
            lots: 0.5,
            entry_spread: 0.0,
            entry_slippage: 0.0,
            mae_pips: 0.0,
            mfe_pips: 0.0,
        }
    }

    #[test]
    fn test_signal_from_int() {
        assert_eq!(Signal::from_int(1), Signal::Long);
        assert_eq!(Signal::from_int(-1), Signal::Short);
        assert_eq!(Signal::from_int(0), Signal::Flat);
        assert_eq!(Signal::from_int(7), Signal::Long);
        assert_eq!(Signal::Short.as_int(), -1);
        assert_eq!(Signal::Flat.direction(), None);
    }

    #[test]
    fn test_direction_opposite() {
        assert_eq!(Direction::Long.opposite(), Direction::Short);
        assert_eq!(Direction::Short.multiplier(), -1.0);
        assert_eq!(Signal::from(Direction::Short), Signal::Short);
    }

    #[test]
    fn test_excursions_long() {
        let pos = long_at(1.1000);
        let (fav, adv) = pos.excursions(1.1010, 1.0975, 0.0001);
        assert!((fav - 10.0).abs() < 1e-6);
        assert!((adv - 25.0).abs() < 1e-6);
    }

    #[test]
    fn test_excursions_short() {
        let mut pos = long_at(1.1000);
        pos.direction = Direction::Short;
        let (fav, adv) = pos.excursions(1.1010, 1.0975, 0.0001);
        assert!((fav - 25.0).abs() < 1e-6);
        assert!((adv - 10.0).abs() < 1e-6);
        assert!((pos.stop_price(20.0, 0.0001) - 1.1020).abs() < 1e-12);
        assert!((pos.target_price(40.0, 0.0001) - 1.0960).abs() < 1e-12);
    }

    #[test]
    fn test_signal_serializes_lowercase() {
        let json = serde_json::to_string(&Signal::Long).unwrap();
        assert_eq!(json, "\"long\"");
        let reason = serde_json::to_string(&ExitReason::StopLoss).unwrap();
        assert_eq!(reason, "\"stop_loss\"");
    }
}
