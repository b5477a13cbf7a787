use rayon::ThreadPoolBuilder;
use std::path::PathBuf;
use std::sync::OnceLock;
use tracing::{info, warn};

static RAYON_INIT: OnceLock<()> = OnceLock::new();

/// Builds the global Rayon pool once. `None` uses every logical core.
pub fn init_cpu_parallelism(threads: Option<usize>) {
    RAYON_INIT.get_or_init(|| {
        let num_threads = threads.unwrap_or_else(num_cpus::get).max(1);
        match ThreadPoolBuilder::new().num_threads(num_threads).build_global() {
            Ok(_) => info!("Initialized Rayon thread pool with {} threads", num_threads),
            Err(e) => warn!(
                "Rayon thread pool already initialized or unavailable ({}). Using existing configuration.",
                e
            ),
        }
    });
}

/// Directory holding cached Yahoo chart responses.
pub fn cache_dir() -> PathBuf {
    std::env::var("FRONTIER_CACHE_DIR")
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
        .map(PathBuf::from)
        .unwrap_or_else(|| PathBuf::from(".cache"))
}

pub fn cache_ttl_secs() -> u64 {
    std::env::var("FRONTIER_CACHE_TTL_SECS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .unwrap_or(86_400)
}

pub fn batch_fetch_delay_ms() -> u64 {
    std::env::var("FRONTIER_FETCH_DELAY_MS")
        .ok()
        .and_then(|v| v.trim().parse::<u64>().ok())
        .map(|v| v.clamp(0, 5_000))
        .unwrap_or(350)
}

// ── Portfolio Sampling ──────────────────────────────────────────────────────
/// Number of random portfolios drawn per run.
pub const DEFAULT_TRIALS: usize = 20_000;
/// 10-year U.S. government bond yield at the time of the original study.
pub const DEFAULT_RISK_FREE_RATE: f64 = 0.0147;
/// Trading days per year used to annualize daily moments.
pub const TRADING_DAYS: f64 = 252.0;
/// Trials per parallel shard. Fixed so seeded runs do not depend on thread count.
pub const SHARD_SIZE: usize = 1_024;

// ── Market Data ─────────────────────────────────────────────────────────────
/// Range of history fetched for portfolio optimization (e.g., "5y", "10y", "max").
pub const DATA_RANGE: &str = "10y";
/// Range fetched for indicator and comparison reports.
pub const INDICATOR_RANGE: &str = "2y";
pub const FETCH_MAX_ATTEMPTS: usize = 3;

// ── Indicators ──────────────────────────────────────────────────────────────
pub const BOLLINGER_WINDOW: usize = 20;
pub const BOLLINGER_STD: f64 = 2.0;
pub const MFI_WINDOW: usize = 10;
pub const II_WINDOW: usize = 21;

/// Default pair studied by the two-fund separation example.
pub const DEFAULT_PORTFOLIO_SYMBOLS: &[&str] = &["SPY", "TLT"];
