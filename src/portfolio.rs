use crate::config::{DEFAULT_RISK_FREE_RATE, DEFAULT_TRIALS, SHARD_SIZE};
use crate::error::{FrontierError, Result};
use crate::returns::MomentEstimates;
use clap::ValueEnum;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rayon::prelude::*;
use serde::Serialize;
use tracing::{debug, info, warn};

// ──────────────────────────────────────────────────────────────────────────────
// Configuration
// ──────────────────────────────────────────────────────────────────────────────

/// How a random weight vector is drawn before scoring.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum WeightSampler {
    /// n uniform draws in [0, 1) divided by their sum. Not uniform over the
    /// simplex for n > 2.
    #[default]
    Uniform,
    /// n Exp(1) draws divided by their sum, i.e. Dirichlet(1, ..., 1).
    Dirichlet,
}

/// What to do with a trial whose volatility is exactly zero.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ZeroRiskPolicy {
    /// Stop the run with `SingularRisk`.
    #[default]
    Abort,
    /// Keep the trial with a NaN Sharpe score and leave it out of max-Sharpe selection.
    Exclude,
}

#[derive(Clone, Debug)]
pub struct SamplerConfig {
    pub trials: usize,
    pub risk_free_rate: f64,
    /// Fixed seed for reproducible runs; `None` draws one per run.
    pub seed: Option<u64>,
    pub sampler: WeightSampler,
    pub zero_risk: ZeroRiskPolicy,
}

impl Default for SamplerConfig {
    fn default() -> Self {
        Self {
            trials: DEFAULT_TRIALS,
            risk_free_rate: DEFAULT_RISK_FREE_RATE,
            seed: None,
            sampler: WeightSampler::Uniform,
            zero_risk: ZeroRiskPolicy::Abort,
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Data Structures
// ──────────────────────────────────────────────────────────────────────────────

/// One scored random portfolio.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct PortfolioTrial {
    pub weights: Vec<f64>,
    pub expected_return: f64,
    pub risk: f64,
    /// `expected_return - risk_free_rate / risk`. NaN for excluded zero-risk trials.
    pub sharpe: f64,
}

/// All trials of one run plus the indices of the selected portfolios.
#[derive(Clone, Debug)]
pub struct SamplingRun {
    pub seed: u64,
    pub trials: Vec<PortfolioTrial>,
    pub max_sharpe_index: usize,
    pub min_risk_index: usize,
    /// Zero-risk trials kept out of max-Sharpe selection.
    pub excluded: usize,
}

impl SamplingRun {
    pub fn max_sharpe(&self) -> &PortfolioTrial {
        &self.trials[self.max_sharpe_index]
    }

    pub fn min_risk(&self) -> &PortfolioTrial {
        &self.trials[self.min_risk_index]
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Portfolio Math
// ──────────────────────────────────────────────────────────────────────────────

pub fn portfolio_return(weights: &[f64], means: &[f64]) -> f64 {
    weights.iter().zip(means.iter()).map(|(w, r)| w * r).sum()
}

pub fn portfolio_variance(weights: &[f64], cov: &[Vec<f64>]) -> f64 {
    let n = weights.len();
    let mut var = 0.0;
    for i in 0..n {
        for j in 0..n {
            var += weights[i] * weights[j] * cov[i][j];
        }
    }
    var
}

/// Scores `weights` against the moments.
///
/// The Sharpe score keeps the study's formula, `return - rf / risk`, rather
/// than the textbook `(return - rf) / risk`.
pub fn score_weights(weights: Vec<f64>, moments: &MomentEstimates, risk_free_rate: f64) -> PortfolioTrial {
    let expected_return = portfolio_return(&weights, &moments.mean);
    // Round-off can push a PSD quadratic form a hair below zero.
    let risk = portfolio_variance(&weights, &moments.cov).max(0.0).sqrt();
    let sharpe = expected_return - risk_free_rate / risk;

    PortfolioTrial {
        weights,
        expected_return,
        risk,
        sharpe,
    }
}

/// Draws a point on the simplex: `n` non-negative weights summing to 1.
pub fn random_weights(n: usize, sampler: WeightSampler, rng: &mut impl Rng) -> Vec<f64> {
    use rand_distr::{Distribution, Exp1};

    loop {
        let raw: Vec<f64> = match sampler {
            WeightSampler::Uniform => (0..n).map(|_| rng.gen_range(0.0..1.0)).collect(),
            WeightSampler::Dirichlet => (0..n).map(|_| Exp1.sample(rng)).collect(),
        };
        let sum: f64 = raw.iter().sum();
        if sum > 0.0 {
            return raw.iter().map(|v| v / sum).collect();
        }
    }
}

// ──────────────────────────────────────────────────────────────────────────────
// Sampler
// ──────────────────────────────────────────────────────────────────────────────

fn validate(moments: &MomentEstimates, config: &SamplerConfig) -> Result<()> {
    moments.validate()?;
    if config.trials < 1 {
        return Err(FrontierError::degenerate_input("trial count must be at least 1"));
    }
    if !config.risk_free_rate.is_finite() {
        return Err(FrontierError::degenerate_input("risk-free rate must be finite"));
    }
    Ok(())
}

/// SplitMix64 finalizer; spreads consecutive shard indices over the seed space.
fn shard_seed(seed: u64, shard: usize) -> u64 {
    let mut z = seed.wrapping_add((shard as u64 + 1).wrapping_mul(0x9e3779b97f4a7c15));
    z = (z ^ (z >> 30)).wrapping_mul(0xbf58476d1ce4e5b9);
    z = (z ^ (z >> 27)).wrapping_mul(0x94d049bb133111eb);
    z ^ (z >> 31)
}

fn run_shard(
    moments: &MomentEstimates,
    config: &SamplerConfig,
    seed: u64,
    shard: usize,
) -> Result<Vec<PortfolioTrial>> {
    let start = shard * SHARD_SIZE;
    let end = (start + SHARD_SIZE).min(config.trials);
    let n = moments.n_assets();
    let mut rng = StdRng::seed_from_u64(shard_seed(seed, shard));
    let mut trials = Vec::with_capacity(end - start);

    for index in start..end {
        let weights = random_weights(n, config.sampler, &mut rng);
        let mut trial = score_weights(weights, moments, config.risk_free_rate);

        if trial.risk == 0.0 {
            match config.zero_risk {
                ZeroRiskPolicy::Abort => return Err(FrontierError::singular_risk(index)),
                ZeroRiskPolicy::Exclude => trial.sharpe = f64::NAN,
            }
        }
        trials.push(trial);
    }

    Ok(trials)
}

/// Index of the max-Sharpe and min-risk trials.
///
/// Ties resolve to the earliest trial. NaN Sharpe scores are never selected
/// for max-Sharpe; if every score is NaN the selection fails with `SingularRisk`.
pub fn select(trials: &[PortfolioTrial]) -> Result<(usize, usize)> {
    if trials.is_empty() {
        return Err(FrontierError::degenerate_input("no trials to select from"));
    }

    let mut max_sharpe: Option<usize> = None;
    let mut min_risk = 0;
    for (i, trial) in trials.iter().enumerate() {
        if !trial.sharpe.is_nan() {
            match max_sharpe {
                Some(best) if trial.sharpe <= trials[best].sharpe => {}
                _ => max_sharpe = Some(i),
            }
        }
        if trial.risk < trials[min_risk].risk {
            min_risk = i;
        }
    }

    let max_sharpe = max_sharpe.ok_or_else(|| {
        let first = trials.iter().position(|t| t.risk == 0.0).unwrap_or(0);
        FrontierError::singular_risk(first)
    })?;
    Ok((max_sharpe, min_risk))
}

/// Runs the Monte Carlo sweep over random simplex weights and selects the
/// max-Sharpe and min-risk portfolios.
///
/// Trials are generated in fixed-size shards on the Rayon pool; each shard
/// seeds its own RNG from the run seed, so a seeded run yields the same
/// trials in the same order regardless of thread count.
pub fn sample_portfolios(moments: &MomentEstimates, config: &SamplerConfig) -> Result<SamplingRun> {
    validate(moments, config)?;

    let seed = config.seed.unwrap_or_else(rand::random::<u64>);
    let n_shards = config.trials.div_ceil(SHARD_SIZE);
    info!(
        "Sampling {} portfolios over {} assets (seed={}, sampler={:?}, rf={}, shards={})",
        config.trials,
        moments.n_assets(),
        seed,
        config.sampler,
        config.risk_free_rate,
        n_shards
    );

    let shards: Vec<Result<Vec<PortfolioTrial>>> = (0..n_shards)
        .into_par_iter()
        .map(|shard| run_shard(moments, config, seed, shard))
        .collect();

    let mut trials = Vec::with_capacity(config.trials);
    for shard in shards {
        trials.extend(shard?);
    }

    finish_run(seed, trials)
}

/// Counts excluded trials and selects the reported portfolios.
fn finish_run(seed: u64, trials: Vec<PortfolioTrial>) -> Result<SamplingRun> {
    let excluded = trials.iter().filter(|t| t.sharpe.is_nan()).count();
    if excluded > 0 {
        warn!(
            "{} of {} trials had zero risk and were excluded from max-Sharpe selection",
            excluded,
            trials.len()
        );
    }

    let (max_sharpe_index, min_risk_index) = select(&trials)?;
    debug!(
        "Selected max-Sharpe trial #{} and min-risk trial #{}",
        max_sharpe_index, min_risk_index
    );

    Ok(SamplingRun {
        seed,
        trials,
        max_sharpe_index,
        min_risk_index,
        excluded,
    })
}

// ──────────────────────────────────────────────────────────────────────────────
// Tests
// ──────────────────────────────────────────────────────────────────────────────
