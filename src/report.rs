use crate::compare::Comparison;
use crate::indicators::{IndicatorFrame, Signal};
use crate::portfolio::{PortfolioTrial, SamplerConfig, SamplingRun, WeightSampler, ZeroRiskPolicy};
use crate::returns::MomentEstimates;
use anyhow::{Context, Result};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tracing::info;

// ──────────────────────────────────────────────────────────────────────────────
// JSON Export
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Serialize)]
struct TrialRecord<'a> {
    expected_return: f64,
    risk: f64,
    sharpe: f64,
    weights: BTreeMap<&'a str, f64>,
}

impl<'a> TrialRecord<'a> {
    fn new(trial: &PortfolioTrial, symbols: &'a [String]) -> Self {
        Self {
            expected_return: trial.expected_return,
            risk: trial.risk,
            sharpe: trial.sharpe,
            weights: symbols
                .iter()
                .map(String::as_str)
                .zip(trial.weights.iter().copied())
                .collect(),
        }
    }
}

/// Everything a plotting collaborator needs to draw the frontier.
#[derive(Serialize)]
pub struct PortfolioExport<'a> {
    seed: u64,
    trials_requested: usize,
    risk_free_rate: f64,
    sampler: WeightSampler,
    zero_risk: ZeroRiskPolicy,
    excluded: usize,
    moments: &'a MomentEstimates,
    max_sharpe: TrialRecord<'a>,
    min_risk: TrialRecord<'a>,
    trials: Vec<TrialRecord<'a>>,
}

impl<'a> PortfolioExport<'a> {
    pub fn new(moments: &'a MomentEstimates, config: &SamplerConfig, run: &SamplingRun) -> Self {
        let symbols = &moments.symbols;
        Self {
            seed: run.seed,
            trials_requested: config.trials,
            risk_free_rate: config.risk_free_rate,
            sampler: config.sampler,
            zero_risk: config.zero_risk,
            excluded: run.excluded,
            moments,
            max_sharpe: TrialRecord::new(run.max_sharpe(), symbols),
            min_risk: TrialRecord::new(run.min_risk(), symbols),
            trials: run.trials.iter().map(|t| TrialRecord::new(t, symbols)).collect(),
        }
    }
}

pub fn write_json<T: Serialize>(path: &Path, value: &T) -> Result<()> {
    let file = std::fs::File::create(path)
        .with_context(|| format!("creating export file {}", path.display()))?;
    let writer = std::io::BufWriter::new(file);
    serde_json::to_writer_pretty(writer, value)
        .with_context(|| format!("writing JSON to {}", path.display()))?;
    info!("Exported results to {}", path.display());
    Ok(())
}

// ──────────────────────────────────────────────────────────────────────────────
// Console Reports
// ──────────────────────────────────────────────────────────────────────────────

const BOX_WIDTH: usize = 60;

fn box_rule(left: char, right: char) -> String {
    format!("{}{}{}", left, "═".repeat(BOX_WIDTH), right)
}

/// One bordered line; `content` is padded to the box width.
fn box_line(content: &str) -> String {
    format!("║{:<width$}║", content, width = BOX_WIDTH)
}

fn trial_box_lines(title: &str, trial: &PortfolioTrial, symbols: &[String], out: &mut Vec<String>) {
    out.push(box_rule('╠', '╣'));
    out.push(box_line(&format!("  {}", title)));
    out.push(box_rule('╠', '╣'));
    out.push(box_line(&format!("  Expected Annual Return : {:>+8.2}%", trial.expected_return * 100.0)));
    out.push(box_line(&format!("  Annual Risk (σ)        : {:>8.2}%", trial.risk * 100.0)));
    out.push(box_line(&format!("  Sharpe Score           : {:>8.3}", trial.sharpe)));
    for (sym, w) in symbols.iter().zip(trial.weights.iter()) {
        out.push(box_line(&format!("    {:<8} {:>7.2}%", sym, w * 100.0)));
    }
}

fn portfolio_box(moments: &MomentEstimates, config: &SamplerConfig, run: &SamplingRun) -> Vec<String> {
    let mut out = vec![
        box_rule('╔', '╗'),
        box_line(&format!("{:^width$}", "Efficient Frontier (Monte Carlo)", width = BOX_WIDTH)),
        box_rule('╠', '╣'),
        box_line(&format!("  Trials: {:>7}   Excluded: {:>7}", run.trials.len(), run.excluded)),
        box_line(&format!("  Seed: {}", run.seed)),
        box_line(&format!(
            "  Risk-free rate: {:.4}   Sampler: {:?}",
            config.risk_free_rate, config.sampler
        )),
        box_rule('╠', '╣'),
        box_line("  Symbol    Ann.Return   Ann.Vol"),
    ];
    for (i, sym) in moments.symbols.iter().enumerate() {
        out.push(box_line(&format!(
            "  {:<8} {:>+9.2}%  {:>8.2}%",
            sym,
            moments.mean[i] * 100.0,
            moments.volatility(i) * 100.0
        )));
    }

    trial_box_lines("Maximum Sharpe Portfolio", run.max_sharpe(), &moments.symbols, &mut out);
    trial_box_lines("Minimum Risk Portfolio", run.min_risk(), &moments.symbols, &mut out);
    out.push(box_rule('╚', '╝'));
    out
}

/// Pretty-prints the moments and both selected portfolios to stdout.
pub fn print_portfolio(moments: &MomentEstimates, config: &SamplerConfig, run: &SamplingRun) {
    println!();
    for line in portfolio_box(moments, config, run) {
        println!("{}", line);
    }
    println!();
    println!("Note: Sharpe score is return - rf / risk, not (return - rf) / risk.");
}

pub fn print_indicators(frame: &IndicatorFrame, tail: usize) {
    println!(
        "\n{} Bollinger Band report ({:?} signals), {} rows",
        frame.symbol,
        frame.strategy,
        frame.rows.len()
    );
    println!(
        "{:<12} {:>10} {:>10} {:>10} {:>10} {:>7} {:>9} {:>8} {:>8}  Signal",
        "Date", "Close", "SMA", "Upper", "Lower", "%B", "BW", "MFI", "II%"
    );
    for row in frame.rows.iter().skip(frame.rows.len().saturating_sub(tail)) {
        let marker = match row.signal {
            Some(Signal::Buy) => "▲ buy",
            Some(Signal::Sell) => "▼ sell",
            None => "",
        };
        println!(
            "{:<12} {:>10.2} {:>10.2} {:>10.2} {:>10.2} {:>7.3} {:>9.2} {:>8.2} {:>8.2}  {}",
            row.date.to_string(),
            row.close,
            row.sma,
            row.upper,
            row.lower,
            row.percent_b,
            row.bandwidth,
            row.mfi,
            row.ii_percent,
            marker
        );
    }
    println!(
        "Signals: {} buy, {} sell",
        frame.count(Signal::Buy),
        frame.count(Signal::Sell)
    );
}

pub fn print_comparison(cmp: &Comparison) {
    println!("\nCumulative daily change (%) over {} shared days", cmp.rows.len());
    if let Some(last) = cmp.rows.last() {
        for (sym, pct) in cmp.symbols.iter().zip(last.cumulative_pct.iter()) {
            println!("  {:<8} {:>+10.2}%  (as of {})", sym, pct, last.date);
        }
    }
    for (a, b, rho) in &cmp.close_correlation {
        println!("  corr({}, {}) = {:.4}", a, b, rho);
    }
}
