mod compare;
mod config;
mod data;
mod error;
mod indicators;
mod portfolio;
mod report;
mod returns;

use clap::Parser;
use indicators::{IndicatorFrame, IndicatorParams, Strategy};
use portfolio::{SamplerConfig, WeightSampler, ZeroRiskPolicy};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

#[derive(Parser, Debug)]
#[command(
    author,
    version,
    about = "Frontier-Lab: Monte Carlo portfolio frontier and Bollinger Band studies on Yahoo Finance data",
    after_help = "EXAMPLES:
    # Max-Sharpe and min-risk mix of SPY and TLT (the default pair)
    cargo run --release

    # Four assets, reproducible, with the trial cloud exported for plotting
    cargo run --release -- --portfolio AAPL,MSFT,PG,O --seed 7 --export frontier.json

    # AAPL bands with MFI trend-following markers
    cargo run --release -- --bollinger AAPL

    # MSFT bands with Intraday Intensity reversal markers
    cargo run --release -- --bollinger MSFT --strategy reversal

    # Cumulative daily change of two tickers
    cargo run --release -- --compare AAPL,MSFT

NOTE: the Sharpe score is computed as return - rf / risk, not (return - rf) / risk."
)]
struct Args {
    /// Run the portfolio sampler on comma-separated symbols (default: SPY,TLT)
    #[arg(long)]
    portfolio: Option<String>,

    /// Number of random portfolios to draw
    #[arg(long, default_value_t = config::DEFAULT_TRIALS)]
    trials: usize,

    /// Risk-free rate used in the Sharpe score
    #[arg(long, default_value_t = config::DEFAULT_RISK_FREE_RATE)]
    risk_free_rate: f64,

    /// Seed for reproducible sampling (random if omitted)
    #[arg(long)]
    seed: Option<u64>,

    /// Weight sampler: uniform draws normalized (default) or Dirichlet(1)
    #[arg(long, value_enum, default_value_t = WeightSampler::Uniform)]
    sampler: WeightSampler,

    /// Handling of zero-risk trials
    #[arg(long, value_enum, default_value_t = ZeroRiskPolicy::Abort)]
    zero_risk: ZeroRiskPolicy,

    /// History range to fetch (e.g. 1y, 5y, 10y, max)
    #[arg(long)]
    range: Option<String>,

    /// Bollinger Band report for one symbol
    #[arg(long)]
    bollinger: Option<String>,

    /// Oscillator confirming %B signals
    #[arg(long, value_enum, default_value_t = Strategy::Trend)]
    strategy: Strategy,

    /// Bollinger window in days
    #[arg(long, default_value_t = config::BOLLINGER_WINDOW)]
    window: usize,

    /// Bollinger band width in standard deviations
    #[arg(long, default_value_t = config::BOLLINGER_STD)]
    band_std: f64,

    /// Money Flow Index window in days
    #[arg(long, default_value_t = config::MFI_WINDOW)]
    mfi_window: usize,

    /// Intraday Intensity window in days
    #[arg(long, default_value_t = config::II_WINDOW)]
    ii_window: usize,

    /// Number of most recent indicator rows to print
    #[arg(long, default_value_t = 10)]
    tail: usize,

    /// Compare cumulative daily change of comma-separated symbols
    #[arg(long)]
    compare: Option<String>,

    /// Write the full result as JSON to this path
    #[arg(long)]
    export: Option<PathBuf>,

    /// Worker threads for sampling (default: all logical cores)
    #[arg(long)]
    threads: Option<usize>,
}

fn parse_symbols(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|s| s.trim().to_uppercase())
        .filter(|s| !s.is_empty())
        .collect()
}

async fn run_portfolio(args: &Args, symbols: Vec<String>) -> anyhow::Result<()> {
    if symbols.len() < 2 {
        return Err(anyhow::anyhow!(
            "Portfolio optimization requires at least 2 symbols. Example: --portfolio SPY,TLT"
        ));
    }
    let range = args.range.as_deref().unwrap_or(config::DATA_RANGE);
    info!("Fetching {:?} ({}) for portfolio sampling...", symbols, range);

    let assets = data::fetch_many(&symbols, range).await?;
    let returns = returns::ReturnSeries::from_closes(&assets)?;
    if let (Some(first), Some(last)) = (returns.dates.first(), returns.dates.last()) {
        info!("{} shared trading days after joining ({} to {})", returns.len(), first, last);
    }
    let moments = returns::MomentEstimates::from_returns(&returns, config::TRADING_DAYS)?;

    let sampler_config = SamplerConfig {
        trials: args.trials,
        risk_free_rate: args.risk_free_rate,
        seed: args.seed,
        sampler: args.sampler,
        zero_risk: args.zero_risk,
    };
    let run = portfolio::sample_portfolios(&moments, &sampler_config)?;

    report::print_portfolio(&moments, &sampler_config, &run);
    if let Some(path) = &args.export {
        report::write_json(path, &report::PortfolioExport::new(&moments, &sampler_config, &run))?;
    }
    Ok(())
}

async fn run_bollinger(args: &Args, symbol: &str) -> anyhow::Result<()> {
    let range = args.range.as_deref().unwrap_or(config::INDICATOR_RANGE);
    let data = data::fetch_range(&symbol.trim().to_uppercase(), range).await?;
    let params = IndicatorParams {
        window: args.window,
        band_std: args.band_std,
        mfi_window: args.mfi_window,
        ii_window: args.ii_window,
    };

    let frame = IndicatorFrame::build(&data, &params, args.strategy)?;
    report::print_indicators(&frame, args.tail);
    if let Some(path) = &args.export {
        report::write_json(path, &frame)?;
    }
    Ok(())
}

async fn run_compare(args: &Args, symbols: Vec<String>) -> anyhow::Result<()> {
    let range = args.range.as_deref().unwrap_or(config::INDICATOR_RANGE);
    let assets = data::fetch_many(&symbols, range).await?;
    let cmp = compare::Comparison::build(&assets)?;

    report::print_comparison(&cmp);
    if let Some(path) = &args.export {
        report::write_json(path, &cmp)?;
    }
    Ok(())
}

async fn run(args: Args) -> anyhow::Result<()> {
    if let Some(symbol) = &args.bollinger {
        return run_bollinger(&args, symbol).await;
    }
    if let Some(raw) = &args.compare {
        return run_compare(&args, parse_symbols(raw)).await;
    }

    let symbols = match &args.portfolio {
        Some(raw) => parse_symbols(raw),
        None => config::DEFAULT_PORTFOLIO_SYMBOLS
            .iter()
            .map(|s| s.to_string())
            .collect(),
    };
    run_portfolio(&args, symbols).await
}

#[tokio::main]
async fn main() -> ExitCode {
    // A missing .env file is fine; the environment and flags still apply.
    let _ = dotenvy::dotenv();

    let env_filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new("frontier_lab=info"));
    tracing_subscriber::fmt().with_env_filter(env_filter).init();

    let args = Args::parse();
    config::init_cpu_parallelism(args.threads);

    match run(args).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{:#}", e);
            ExitCode::FAILURE
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_symbols() {
        assert_eq!(parse_symbols(" spy, tlt ,,"), vec!["SPY", "TLT"]);
        assert!(parse_symbols("").is_empty());
    }

    #[test]
    fn test_cli_defaults() {
        let args = Args::try_parse_from(["frontier-lab"]).unwrap();
        assert_eq!(args.trials, 20_000);
        assert_eq!(args.risk_free_rate, 0.0147);
        assert_eq!(args.sampler, WeightSampler::Uniform);
        assert_eq!(args.zero_risk, ZeroRiskPolicy::Abort);
        assert!(args.portfolio.is_none());

        let args = Args::try_parse_from([
            "frontier-lab",
            "--portfolio",
            "AAPL,MSFT",
            "--sampler",
            "dirichlet",
            "--zero-risk",
            "exclude",
            "--seed",
            "5",
        ])
        .unwrap();
        assert_eq!(args.sampler, WeightSampler::Dirichlet);
        assert_eq!(args.zero_risk, ZeroRiskPolicy::Exclude);
        assert_eq!(args.seed, Some(5));
    }
}
