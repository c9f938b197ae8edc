use std::fs::File;
use std::io::BufReader;
use std::path::Path;

use serde::{Deserialize, Serialize};

use crate::error::{BacktestError, Result};

/// Fill cost and sizing settings
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ExecutionConfig {
    /// Round-trip spread; half of it is paid on every fill
    pub spread_pips: f64,
    /// Upper bound of the uniform adverse slippage drawn per fill
    pub slippage_pips: f64,
    /// Price units per pip
    pub pip: f64,
    /// Flat fee per lot, charged once per trade
    pub commission_per_lot: f64,
    /// Fraction of equity risked per trade when sizing off a stop
    pub risk_pct: f64,
    pub min_lots: f64,
    pub max_lots: f64,
}

impl Default for ExecutionConfig {
    fn default() -> Self {
        Self {
            // Typical ECN EURUSD
            spread_pips: 1.0,
            slippage_pips: 0.5,
            pip: 0.0001,
            commission_per_lot: 0.0,
            risk_pct: 0.01,
            min_lots: 0.01,
            max_lots: 1.0,
        }
    }
}

impl ExecutionConfig {
    /// No spread, no slippage, no commission
    pub fn frictionless() -> Self {
        Self {
            spread_pips: 0.0,
            slippage_pips: 0.0,
            ..Default::default()
        }
    }

    pub fn with_spread(mut self, spread_pips: f64) -> Self {
        self.spread_pips = spread_pips;
        self
    }

    pub fn with_slippage(mut self, slippage_pips: f64) -> Self {
        self.slippage_pips = slippage_pips;
        self
    }

    pub fn with_commission(mut self, commission_per_lot: f64) -> Self {
        self.commission_per_lot = commission_per_lot;
        self
    }

    pub fn with_risk(mut self, risk_pct: f64) -> Self {
        self.risk_pct = risk_pct;
        self
    }

    pub fn with_lot_limits(mut self, min_lots: f64, max_lots: f64) -> Self {
        self.min_lots = min_lots;
        self.max_lots = max_lots;
        self
    }

    pub fn with_pip(mut self, pip: f64) -> Self {
        self.pip = pip;
        self
    }
}

/// Contract constants of the traded instrument
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Instrument {
    pub symbol: String,
    /// Units of the base asset in one lot
    pub units_per_lot: f64,
    /// Account currency gained or lost per pip per lot
    pub pip_value_per_lot: f64,
}

impl Default for Instrument {
    fn default() -> Self {
        Self::eurusd()
    }
}

impl Instrument {
    pub fn new(symbol: impl Into<String>, units_per_lot: f64, pip_value_per_lot: f64) -> Self {
        Self {
            symbol: symbol.into(),
            units_per_lot,
            pip_value_per_lot,
        }
    }

    /// Standard FX lot on a USD-quoted pair, ~$10 per pip
    pub fn eurusd() -> Self {
        Self::new("EURUSD", 100_000.0, 10.0)
    }
}

/// Order in which the intrabar exits are checked when a bar breaches both
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExitPriority {
    #[default]
    StopLossFirst,
    TakeProfitFirst,
}

/// Per-run parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RunParameters {
    pub initial_equity: f64,
    pub stop_loss_pips: Option<f64>,
    pub take_profit_pips: Option<f64>,
    /// Seed of the slippage RNG
    pub seed: u64,
    pub exit_priority: ExitPriority,
    /// Close a position still open after the last bar at that bar's close
    pub close_on_last_bar: bool,
}

impl Default for RunParameters {
    fn default() -> Self {
        Self {
            initial_equity: 10_000.0,
            stop_loss_pips: None,
            take_profit_pips: None,
            seed: 42,
            exit_priority: ExitPriority::StopLossFirst,
            close_on_last_bar: false,
        }
    }
}

impl RunParameters {
    pub fn with_equity(mut self, initial_equity: f64) -> Self {
        self.initial_equity = initial_equity;
        self
    }

    pub fn with_stop_loss(mut self, pips: f64) -> Self {
        self.stop_loss_pips = Some(pips);
        self
    }

    pub fn with_take_profit(mut self, pips: f64) -> Self {
        self.take_profit_pips = Some(pips);
        self
    }

    pub fn with_seed(mut self, seed: u64) -> Self {
        self.seed = seed;
        self
    }

    pub fn with_exit_priority(mut self, priority: ExitPriority) -> Self {
        self.exit_priority = priority;
        self
    }

    pub fn closing_on_last_bar(mut self) -> Self {
        self.close_on_last_bar = true;
        self
    }
}

/// Everything a run needs besides the data
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    pub execution: ExecutionConfig,
    pub instrument: Instrument,
    pub run: RunParameters,
}

impl BacktestConfig {
    /// Load from a JSON file. Missing fields fall back to defaults.
    pub fn from_json_file(path: &Path) -> Result<Self> {
        let file = File::open(path).map_err(|e| {
            BacktestError::ConfigLoad(format!("{}: {}", path.display(), e))
        })?;
        let config = serde_json::from_reader(BufReader::new(file))?;
        Ok(config)
    }

    /// Caller-side sanity checks. The engine itself trusts its inputs.
    pub fn validate(&self) -> Result<()> {
        let exec = &self.execution;
        let run = &self.run;

        if !(run.initial_equity > 0.0) {
            return Err(invalid(format!(
                "initial_equity must be positive, got {}",
                run.initial_equity
            )));
        }
        if !(exec.pip > 0.0) {
            return Err(invalid(format!("pip must be positive, got {}", exec.pip)));
        }
        if exec.spread_pips < 0.0 || exec.slippage_pips < 0.0 || exec.commission_per_lot < 0.0 {
            return Err(invalid("spread, slippage and commission must be non-negative".to_string()));
        }
        if !(exec.risk_pct > 0.0 && exec.risk_pct < 1.0) {
            return Err(invalid(format!(
                "risk_pct must be in (0, 1), got {}",
                exec.risk_pct
            )));
        }
        if !(exec.min_lots > 0.0 && exec.min_lots <= exec.max_lots) {
            return Err(invalid(format!(
                "lot limits must satisfy 0 < min_lots <= max_lots, got [{}, {}]",
                exec.min_lots, exec.max_lots
            )));
        }
        if !(self.instrument.units_per_lot > 0.0 && self.instrument.pip_value_per_lot > 0.0) {
            return Err(invalid(format!(
                "instrument {} needs positive units_per_lot and pip_value_per_lot",
                self.instrument.symbol
            )));
        }
        for (name, pips) in [("stop_loss_pips", run.stop_loss_pips), ("take_profit_pips", run.take_profit_pips)] {
            if let Some(p) = pips {
                if !(p > 0.0) {
                    return Err(invalid(format!("{} must be positive, got {}", name, p)));
                }
            }
        }
        Ok(())
    }
}

fn invalid(message: String) -> BacktestError {
    BacktestError::InvalidParameter(message)
}
