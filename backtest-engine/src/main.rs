use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Parser;
use serde::Serialize;
use tracing::{info, warn, Level};

use backtest_engine::{
    generate_synthetic_bars, BacktestConfig, BacktestEngine, BacktestResult, ExitPriority,
    RandomSignalGenerator, NULL_PROBABILITIES,
};

/// Random strategies returning more than this after costs point at a leak
const SANITY_RETURN_LIMIT: f64 = 0.05;

#[derive(Parser, Debug)]
#[command(name = "backtest-engine")]
#[command(version = "0.1.0")]
#[command(
    about = "Bar-by-bar single-position backtester, run against random signals as a cost sanity check",
    long_about = None
)]
struct Args {
    /// Number of synthetic one-minute bars
    #[arg(short, long, default_value = "100000")]
    bars: usize,

    /// Initial price for synthetic data
    #[arg(long, default_value = "1.1")]
    initial_price: f64,

    /// Seed for the synthetic bars
    #[arg(long, default_value = "1")]
    data_seed: u64,

    /// Seed for the random signals
    #[arg(long, default_value = "42")]
    signal_seed: u64,

    /// Slippage seed (overrides config)
    #[arg(long)]
    seed: Option<u64>,

    /// Run this many consecutive slippage seeds in parallel
    #[arg(long)]
    seeds: Option<usize>,

    /// JSON config file; flags below override its values
    #[arg(short = 'f', long)]
    config: Option<PathBuf>,

    /// Initial equity
    #[arg(short, long)]
    capital: Option<f64>,

    /// Round-trip spread in pips
    #[arg(long)]
    spread: Option<f64>,

    /// Maximum slippage per fill in pips
    #[arg(long)]
    slippage: Option<f64>,

    /// Commission per lot
    #[arg(long)]
    commission: Option<f64>,

    /// Fraction of equity risked per trade (0.01 = 1%)
    #[arg(long)]
    risk: Option<f64>,

    /// Stop loss in pips
    #[arg(long)]
    stop_loss: Option<f64>,

    /// Take profit in pips
    #[arg(long)]
    take_profit: Option<f64>,

    /// Check take profit before stop loss when a bar breaches both
    #[arg(long)]
    take_profit_first: bool,

    /// Close any open position at the last bar's close
    #[arg(long)]
    close_at_end: bool,

    /// Output format (json, text)
    #[arg(short, long, default_value = "json")]
    output: String,

    /// Pretty print JSON output
    #[arg(long)]
    pretty: bool,

    /// Debug logging, one line per fill
    #[arg(short, long)]
    verbose: bool,
}

/// One line of a seed sweep
#[derive(Debug, Serialize)]
struct SeedSummary {
    seed: u64,
    trades: usize,
    final_equity: f64,
    total_return: f64,
    expectancy: f64,
}

impl From<&BacktestResult> for SeedSummary {
    fn from(result: &BacktestResult) -> Self {
        Self {
            seed: result.params.seed,
            trades: result.trades.len(),
            final_equity: result.final_equity,
            total_return: result.total_return(),
            expectancy: result.expectancy(),
        }
    }
}

fn main() -> Result<()> {
    let args = Args::parse();

    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_max_level(if args.verbose { Level::DEBUG } else { Level::INFO })
        .init();

    let config = build_config(&args)?;
    config.validate()?;

    info!(
        bars = args.bars,
        data_seed = args.data_seed,
        signal_seed = args.signal_seed,
        "Generating synthetic data and random signals"
    );
    let bars = generate_synthetic_bars(args.bars, args.initial_price, args.data_seed);
    let signals = RandomSignalGenerator::new(NULL_PROBABILITIES)?.generate(bars.len(), args.signal_seed);

    let engine = BacktestEngine::new(config);

    match args.seeds {
        Some(count) => {
            let first = engine.params().seed;
            let seeds = sweep_seeds(first, count);
            let results = engine.run_seeds(&bars, &signals, &seeds)?;
            let summaries: Vec<SeedSummary> = results.iter().map(SeedSummary::from).collect();

            for summary in &summaries {
                check_sanity(summary.seed, summary.total_return);
            }
            print_sweep(&summaries, &args)?;
        }
        None => {
            let result = engine.run(&bars, &signals)?;
            check_sanity(result.params.seed, result.total_return());
            print_result(&result, &args)?;
        }
    }

    Ok(())
}

fn build_config(args: &Args) -> Result<BacktestConfig> {
    let mut config = match &args.config {
        Some(path) => BacktestConfig::from_json_file(path)
            .with_context(|| format!("loading config from {}", path.display()))?,
        None => BacktestConfig::default(),
    };

    let exec = &mut config.execution;
    if let Some(spread) = args.spread {
        exec.spread_pips = spread;
    }
    if let Some(slippage) = args.slippage {
        exec.slippage_pips = slippage;
    }
    if let Some(commission) = args.commission {
        exec.commission_per_lot = commission;
    }
    if let Some(risk) = args.risk {
        exec.risk_pct = risk;
    }

    let run = &mut config.run;
    if let Some(capital) = args.capital {
        run.initial_equity = capital;
    }
    if let Some(seed) = args.seed {
        run.seed = seed;
    }
    if args.stop_loss.is_some() {
        run.stop_loss_pips = args.stop_loss;
    }
    if args.take_profit.is_some() {
        run.take_profit_pips = args.take_profit;
    }
    if args.take_profit_first {
        run.exit_priority = ExitPriority::TakeProfitFirst;
    }
    if args.close_at_end {
        run.close_on_last_bar = true;
    }

    Ok(config)
}

/// `count` consecutive seeds from `first`, wrapping at `u64::MAX`
fn sweep_seeds(first: u64, count: usize) -> Vec<u64> {
    (0..count as u64).map(|k| first.wrapping_add(k)).collect()
}

fn check_sanity(seed: u64, total_return: f64) {
    if total_return > SANITY_RETURN_LIMIT {
        warn!(
            seed,
            total_return,
            "Random signals profitable after costs; look for look-ahead or missing friction"
        );
    }
}

fn print_result(result: &BacktestResult, args: &Args) -> Result<()> {
    match args.output.as_str() {
        "json" => {
            let json = if args.pretty {
                serde_json::to_string_pretty(result)?
            } else {
                serde_json::to_string(result)?
            };
            println!("{}", json);
        }
        "text" => print_text_report(result),
        _ => {
            warn!(output = %args.output, "Unknown output format, using text");
            print_text_report(result);
        }
    }
    Ok(())
}

fn print_sweep(summaries: &[SeedSummary], args: &Args) -> Result<()> {
    if args.output == "json" {
        let json = if args.pretty {
            serde_json::to_string_pretty(summaries)?
        } else {
            serde_json::to_string(summaries)?
        };
        println!("{}", json);
        return Ok(());
    }

    println!();
    println!("  {:>8} {:>8} {:>14} {:>10} {:>12}", "SEED", "TRADES", "FINAL EQUITY", "RETURN", "EXPECTANCY");
    println!("----------------------------------------------------------------");
    for s in summaries {
        println!(
            "  {:>8} {:>8} {:>14.2} {:>9.2}% {:>12.2}",
            s.seed,
            s.trades,
            s.final_equity,
            s.total_return * 100.0,
            s.expectancy
        );
    }
    if !summaries.is_empty() {
        let mean = summaries.iter().map(|s| s.expectancy).sum::<f64>() / summaries.len() as f64;
        println!("----------------------------------------------------------------");
        println!("  Mean expectancy: ${:.2}/trade", mean);
    }
    println!();
    Ok(())
}

fn print_text_report(result: &BacktestResult) {
    let (spread, slippage, commission) = result.trades.iter().fold((0.0, 0.0, 0.0), |acc, t| {
        (acc.0 + t.spread_cost, acc.1 + t.slippage_cost + t.entry_slippage_cost, acc.2 + t.commission)
    });

    println!();
    println!("================================================================");
    println!("  BACKTEST REPORT - {} random signals", result.instrument.symbol);
    println!("================================================================");
    println!();
    println!("  Bars:             {:>12}", result.equity_curve.len());
    println!("  Slippage seed:    {:>12}", result.params.seed);
    println!();
    println!("----------------------------------------------------------------");
    println!("  CAPITAL");
    println!("----------------------------------------------------------------");
    println!("  Initial Equity:   ${:>12.2}", result.initial_equity);
    println!("  Final Equity:     ${:>12.2}", result.final_equity);
    println!("  Total Return:     {:>12.2}%", result.total_return() * 100.0);
    println!();
    println!("----------------------------------------------------------------");
    println!("  TRADES");
    println!("----------------------------------------------------------------");
    println!("  Closed Trades:    {:>12}", result.trades.len());
    println!("  Expectancy:       ${:>12.2}", result.expectancy());
    println!("  Spread Paid:      ${:>12.2}", spread);
    println!("  Slippage Paid:    ${:>12.2}", slippage);
    println!("  Commission Paid:  ${:>12.2}", commission);
    if let Some(pos) = &result.open_position {
        println!(
            "  Still Open:       {:?} {:.2} lots @ {:.5}",
            pos.direction, pos.lots, pos.entry_price
        );
    }
    println!();
    println!("================================================================");

    if !result.trades.is_empty() {
        println!();
        println!("  RECENT TRADES (last 5)");
        println!("----------------------------------------------------------------");
        for trade in result.trades.iter().rev().take(5) {
            println!(
                "  {} -> {} | {:?} {:.2} lots | {:?} | P&L: ${:+.2} | {} bars",
                trade.entry_time.format("%Y-%m-%d %H:%M"),
                trade.exit_time.format("%Y-%m-%d %H:%M"),
                trade.direction,
                trade.lots,
                trade.exit_reason,
                trade.pnl_net,
                trade.bars_held
            );
        }
        println!();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_sweep_seeds_are_consecutive() {
        assert_eq!(sweep_seeds(42, 3), vec![42, 43, 44]);
        assert!(sweep_seeds(7, 0).is_empty());
    }

    #[test]
    fn test_sweep_seeds_wrap_at_max() {
        assert_eq!(sweep_seeds(u64::MAX - 1, 3), vec![u64::MAX - 1, u64::MAX, 0]);
    }
}
