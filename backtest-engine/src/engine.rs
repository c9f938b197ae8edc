use std::time::Instant;

use chrono::{DateTime, Utc};
use common::{
    BacktestConfig, BacktestError, BacktestResult, Bar, Direction, ExecutionConfig, ExitPriority,
    ExitReason, Instrument, Position, Result, RunParameters, Signal,
};
use rand::rngs::StdRng;
use rand::SeedableRng;
use rayon::prelude::*;
use tracing::{debug, info};

use crate::execution::{fill_price, position_size};
use crate::portfolio::Portfolio;

/// Single-instrument, single-position bar-by-bar backtest engine.
///
/// The signal of bar `i - 1` is executed at the open of bar `i`. Stops and
/// targets are checked against each bar's high/low before the signal is
/// applied, and equity only moves when a trade closes.
#[derive(Debug, Clone)]
pub struct BacktestEngine {
    config: ExecutionConfig,
    instrument: Instrument,
    params: RunParameters,
}

impl BacktestEngine {
    pub fn new(config: BacktestConfig) -> Self {
        Self::from_parts(config.execution, config.instrument, config.run)
    }

    pub fn from_parts(config: ExecutionConfig, instrument: Instrument, params: RunParameters) -> Self {
        Self {
            config,
            instrument,
            params,
        }
    }

    pub fn config(&self) -> &ExecutionConfig {
        &self.config
    }

    pub fn instrument(&self) -> &Instrument {
        &self.instrument
    }

    pub fn params(&self) -> &RunParameters {
        &self.params
    }

    /// Same engine with a different slippage seed
    pub fn with_seed(&self, seed: u64) -> Self {
        Self {
            params: self.params.clone().with_seed(seed),
            ..self.clone()
        }
    }

    /// Replay `signals` over `bars`. Both must be the same length, the signal
    /// at index `i` belonging to the bar at index `i`.
    pub fn run(&self, bars: &[Bar], signals: &[Signal]) -> Result<BacktestResult> {
        if bars.len() != signals.len() {
            return Err(BacktestError::MisalignedSignals {
                bars: bars.len(),
                signals: signals.len(),
            });
        }

        let start_time = Instant::now();
        let mut rng = StdRng::seed_from_u64(self.params.seed);
        let mut portfolio = Portfolio::new(self.params.initial_equity);

        let mut equity_curve = Vec::with_capacity(bars.len());
        if let Some(first) = bars.first() {
            equity_curve.push((first.timestamp, portfolio.equity()));
        }

        for i in 1..bars.len() {
            let bar = &bars[i];

            self.check_exits(&mut portfolio, &mut rng, bar, i);
            self.process_signal(&mut portfolio, &mut rng, bar, i, signals[i - 1])?;

            equity_curve.push((bar.timestamp, portfolio.equity()));
        }

        if self.params.close_on_last_bar && portfolio.has_position() {
            if let Some(last) = bars.last() {
                let last_index = bars.len() - 1;
                self.close(&mut portfolio, &mut rng, last, last_index, last.close, ExitReason::EndOfData);
                if let Some(point) = equity_curve.last_mut() {
                    point.1 = portfolio.equity();
                }
            }
        }

        let returns = simple_returns(&equity_curve);
        let final_equity = portfolio.equity();
        let (trades, open_position) = portfolio.into_parts();

        info!(
            trades = trades.len(),
            initial_equity = self.params.initial_equity,
            final_equity,
            elapsed_ms = start_time.elapsed().as_millis() as u64,
            "Backtest complete"
        );

        Ok(BacktestResult {
            equity_curve,
            trades,
            returns,
            config: self.config.clone(),
            instrument: self.instrument.clone(),
            params: self.params.clone(),
            initial_equity: self.params.initial_equity,
            final_equity,
            open_position,
        })
    }

    /// Run the same inputs once per slippage seed, in parallel. Results come
    /// back in `seeds` order and match a sequential `run` with each seed.
    pub fn run_seeds(&self, bars: &[Bar], signals: &[Signal], seeds: &[u64]) -> Result<Vec<BacktestResult>> {
        seeds
            .par_iter()
            .map(|&seed| self.with_seed(seed).run(bars, signals))
            .collect()
    }

    /// Update MAE/MFE with this bar's range and fire the stop-loss or
    /// take-profit at its exact trigger price.
    fn check_exits(&self, portfolio: &mut Portfolio, rng: &mut StdRng, bar: &Bar, bar_index: usize) {
        let Some((favorable, adverse)) = portfolio.update_excursions(bar.high, bar.low, self.config.pip)
        else {
            return;
        };

        let order = match self.params.exit_priority {
            ExitPriority::StopLossFirst => [ExitReason::StopLoss, ExitReason::TakeProfit],
            ExitPriority::TakeProfitFirst => [ExitReason::TakeProfit, ExitReason::StopLoss],
        };

        for reason in order {
            let trigger = portfolio
                .current_position()
                .and_then(|pos| self.exit_trigger(pos, reason, favorable, adverse));

            if let Some(price) = trigger {
                self.close(portfolio, rng, bar, bar_index, price, reason);
            }
        }
    }

    /// Trigger price of an intrabar exit, if this bar reached it
    fn exit_trigger(&self, pos: &Position, reason: ExitReason, favorable: f64, adverse: f64) -> Option<f64> {
        let pip = self.config.pip;
        match reason {
            ExitReason::StopLoss => self
                .params
                .stop_loss_pips
                .filter(|&sl| adverse >= sl)
                .map(|sl| pos.stop_price(sl, pip)),
            ExitReason::TakeProfit => self
                .params
                .take_profit_pips
                .filter(|&tp| favorable >= tp)
                .map(|tp| pos.target_price(tp, pip)),
            _ => None,
        }
    }

    /// Apply the previous bar's signal at this bar's open
    fn process_signal(
        &self,
        portfolio: &mut Portfolio,
        rng: &mut StdRng,
        bar: &Bar,
        bar_index: usize,
        signal: Signal,
    ) -> Result<()> {
        match (portfolio.direction(), signal.direction()) {
            (None, Some(target)) => {
                self.open(portfolio, rng, bar, bar_index, target)?;
            }
            (Some(_), None) => {
                self.close(portfolio, rng, bar, bar_index, bar.open, ExitReason::Signal);
            }
            (Some(current), Some(target)) if current != target => {
                self.close(portfolio, rng, bar, bar_index, bar.open, ExitReason::Reversal);
                self.open(portfolio, rng, bar, bar_index, target)?;
            }
            _ => {}
        }
        Ok(())
    }

    fn open(
        &self,
        portfolio: &mut Portfolio,
        rng: &mut StdRng,
        bar: &Bar,
        bar_index: usize,
        direction: Direction,
    ) -> Result<()> {
        let raw = bar.open;

        // Sized off the nominal stop from the raw open, before friction
        let lots = match self.params.stop_loss_pips {
            Some(sl) => {
                let stop = raw - direction.multiplier() * sl * self.config.pip;
                position_size(portfolio.equity(), raw, stop, &self.config, &self.instrument)
            }
            None => self.config.min_lots,
        };

        let fill = fill_price(raw, direction, &self.config, rng);
        portfolio.open_position(direction, fill, lots, bar_index, bar.timestamp)?;

        debug!(bar = bar_index, ?direction, lots, price = fill.price, "Opened position");
        Ok(())
    }

    fn close(
        &self,
        portfolio: &mut Portfolio,
        rng: &mut StdRng,
        bar: &Bar,
        bar_index: usize,
        exit_raw: f64,
        reason: ExitReason,
    ) {
        let Some(direction) = portfolio.direction() else {
            return;
        };

        let fill = fill_price(exit_raw, direction.opposite(), &self.config, rng);
        let trade = portfolio.close_position(
            fill,
            bar_index,
            bar.timestamp,
            reason,
            &self.instrument,
            self.config.commission_per_lot,
        );

        if let Some(trade) = trade {
            debug!(
                bar = bar_index,
                ?reason,
                price = trade.exit_price,
                pnl_net = trade.pnl_net,
                "Closed position"
            );
        }
    }
}

/// `equity[i] / equity[i - 1] - 1`, with 0 for the first bar
fn simple_returns(equity_curve: &[(DateTime<Utc>, f64)]) -> Vec<f64> {
    if equity_curve.is_empty() {
        return vec![];
    }

    std::iter::once(0.0)
        .chain(equity_curve.windows(2).map(|w| w[1].1 / w[0].1 - 1.0))
        .collect()
}
