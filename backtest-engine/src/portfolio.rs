use chrono::{DateTime, Utc};
use common::{BacktestError, Direction, ExitReason, Instrument, Position, Result, Trade};

use crate::execution::Fill;

/// Realized equity, the single position slot and the trade ledger of one run
#[derive(Debug)]
pub struct Portfolio {
    equity: f64,
    position: Option<Position>,
    trades: Vec<Trade>,
}

impl Portfolio {
    pub fn new(initial_equity: f64) -> Self {
        Self {
            equity: initial_equity,
            position: None,
            trades: Vec::new(),
        }
    }

    /// Realized equity. Open positions are not marked to market.
    pub fn equity(&self) -> f64 {
        self.equity
    }

    pub fn has_position(&self) -> bool {
        self.position.is_some()
    }

    pub fn current_position(&self) -> Option<&Position> {
        self.position.as_ref()
    }

    pub fn direction(&self) -> Option<Direction> {
        self.position.as_ref().map(|p| p.direction)
    }

    pub fn trades(&self) -> &[Trade] {
        &self.trades
    }

    /// Consume the portfolio, returning the ledger and any live position
    pub fn into_parts(self) -> (Vec<Trade>, Option<Position>) {
        (self.trades, self.position)
    }

    /// Open a position at an already computed entry fill
    pub fn open_position(
        &mut self,
        direction: Direction,
        entry: Fill,
        lots: f64,
        bar_index: usize,
        timestamp: DateTime<Utc>,
    ) -> Result<()> {
        if let Some(pos) = &self.position {
            return Err(BacktestError::PositionAlreadyOpen {
                direction: pos.direction,
                entry_bar: pos.entry_bar,
            });
        }

        self.position = Some(Position {
            direction,
            entry_price: entry.price,
            entry_time: timestamp,
            entry_bar: bar_index,
            lots,
            entry_spread: entry.spread,
            entry_slippage: entry.slippage,
            mae_pips: 0.0,
            mfe_pips: 0.0,
        });

        Ok(())
    }

    /// Fold a bar's range into the running MAE/MFE of the open position and
    /// return that bar's `(favorable, adverse)` excursion in pips.
    pub fn update_excursions(&mut self, high: f64, low: f64, pip: f64) -> Option<(f64, f64)> {
        let pos = self.position.as_mut()?;
        let (favorable, adverse) = pos.excursions(high, low, pip);

        pos.mfe_pips = pos.mfe_pips.max(favorable);
        pos.mae_pips = pos.mae_pips.max(adverse);

        Some((favorable, adverse))
    }

    /// Close the open position at an already computed exit fill, book the
    /// trade and realize its net P&L.
    pub fn close_position(
        &mut self,
        exit: Fill,
        bar_index: usize,
        timestamp: DateTime<Utc>,
        reason: ExitReason,
        instrument: &Instrument,
        commission_per_lot: f64,
    ) -> Option<&Trade> {
        let position = self.position.take()?;

        let notional = position.lots * instrument.units_per_lot;
        let pnl_gross = (exit.price - position.entry_price) * position.direction.multiplier() * notional;
        let commission = commission_per_lot * position.lots;
        let pnl_net = pnl_gross - commission;

        self.equity += pnl_net;

        self.trades.push(Trade {
            entry_time: position.entry_time,
            exit_time: timestamp,
            entry_bar: position.entry_bar,
            exit_bar: bar_index,
            direction: position.direction,
            entry_price: position.entry_price,
            exit_price: exit.price,
            lots: position.lots,
            pnl_gross,
            pnl_net,
            spread_cost: (position.entry_spread + exit.spread) * notional,
            slippage_cost: exit.slippage * notional,
            entry_slippage_cost: position.entry_slippage * notional,
            commission,
            bars_held: bar_index - position.entry_bar,
            mae_pips: position.mae_pips,
            mfe_pips: position.mfe_pips,
            exit_reason: reason,
        });

        self.trades.last()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_abs_diff_eq;
    use chrono::TimeZone;

    fn now() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2024, 1, 1, 12, 0, 0).unwrap()
    }

    fn fill(price: f64) -> Fill {
        Fill {
            price,
            spread: 0.0,
            slippage: 0.0,
        }
    }

    #[test]
    fn test_portfolio_new() {
        let portfolio = Portfolio::new(10_000.0);
        assert_eq!(portfolio.equity(), 10_000.0);
        assert!(!portfolio.has_position());
        assert!(portfolio.trades().is_empty());
    }

    #[test]
    fn test_open_and_close_long() {
        let mut portfolio = Portfolio::new(10_000.0);
        let inst = Instrument::eurusd();

        portfolio
            .open_position(Direction::Long, fill(1.1000), 0.5, 3, now())
            .unwrap();
        assert!(portfolio.has_position());
        assert_eq!(portfolio.equity(), 10_000.0);

        let trade = portfolio
            .close_position(fill(1.1020), 7, now(), ExitReason::Signal, &inst, 7.0)
            .unwrap()
            .clone();

        // 20 pips * 0.5 lots * $10/pip = $100 gross
        assert_abs_diff_eq!(trade.pnl_gross, 100.0, epsilon = 1e-6);
        assert_abs_diff_eq!(trade.commission, 3.5, epsilon = 1e-12);
        assert_abs_diff_eq!(trade.pnl_net, trade.pnl_gross - trade.commission, epsilon = 1e-12);
        assert_eq!(trade.bars_held, 4);
        assert!(!portfolio.has_position());
        assert_abs_diff_eq!(portfolio.equity(), 10_000.0 + trade.pnl_net, epsilon = 1e-9);
    }

    #[test]
    fn test_short_profits_when_price_falls() {
        let mut portfolio = Portfolio::new(10_000.0);
        let inst = Instrument::eurusd();

        portfolio
            .open_position(Direction::Short, fill(1.1000), 1.0, 0, now())
            .unwrap();
        let trade = portfolio
            .close_position(fill(1.0990), 1, now(), ExitReason::TakeProfit, &inst, 0.0)
            .unwrap();

        assert_abs_diff_eq!(trade.pnl_gross, 100.0, epsilon = 1e-6);
    }

    #[test]
    fn test_second_open_is_rejected() {
        let mut portfolio = Portfolio::new(10_000.0);

        portfolio
            .open_position(Direction::Long, fill(1.1), 0.1, 1, now())
            .unwrap();
        let result = portfolio.open_position(Direction::Short, fill(1.1), 0.1, 2, now());

        assert!(matches!(result, Err(BacktestError::PositionAlreadyOpen { entry_bar: 1, .. })));
        assert_eq!(portfolio.direction(), Some(Direction::Long));
    }

    #[test]
    fn test_close_without_position() {
        let mut portfolio = Portfolio::new(10_000.0);
        let inst = Instrument::eurusd();

        assert!(portfolio
            .close_position(fill(1.1), 1, now(), ExitReason::Signal, &inst, 0.0)
            .is_none());
        assert_eq!(portfolio.equity(), 10_000.0);
    }

    #[test]
    fn test_excursions_are_running_maxima() {
        let mut portfolio = Portfolio::new(10_000.0);
        portfolio
            .open_position(Direction::Long, fill(1.1000), 0.1, 0, now())
            .unwrap();

        portfolio.update_excursions(1.1010, 1.0995, 0.0001);
        portfolio.update_excursions(1.1005, 1.0990, 0.0001);
        // Bar entirely above entry: adverse is negative and must not lower MAE
        portfolio.update_excursions(1.1008, 1.1003, 0.0001);

        let pos = portfolio.current_position().unwrap();
        assert_abs_diff_eq!(pos.mfe_pips, 10.0, epsilon = 1e-6);
        assert_abs_diff_eq!(pos.mae_pips, 10.0, epsilon = 1e-6);
    }

    #[test]
    fn test_costs_scale_to_notional() {
        let mut portfolio = Portfolio::new(10_000.0);
        let inst = Instrument::eurusd();
        let entry = Fill {
            price: 1.10005,
            spread: 0.00005,
            slippage: 0.00002,
        };
        let exit = Fill {
            price: 1.09992,
            spread: 0.00005,
            slippage: 0.00003,
        };

        portfolio
            .open_position(Direction::Long, entry, 1.0, 0, now())
            .unwrap();
        let trade = portfolio
            .close_position(exit, 1, now(), ExitReason::Signal, &inst, 0.0)
            .unwrap();

        // Full one-pip round trip on 100k units
        assert_abs_diff_eq!(trade.spread_cost, 10.0, epsilon = 1e-6);
        // Slippage is booked per leg
        assert_abs_diff_eq!(trade.slippage_cost, 3.0, epsilon = 1e-6);
        assert_abs_diff_eq!(trade.entry_slippage_cost, 2.0, epsilon = 1e-6);
    }
}
