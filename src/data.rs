use crate::config::{batch_fetch_delay_ms, cache_dir, cache_ttl_secs, FETCH_MAX_ATTEMPTS};
use anyhow::{Context, Result};
use chrono::{DateTime, NaiveDate, TimeZone, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::path::Path;
use tracing::{info, warn};

/// Represents a single candlestick data point (OHLCV).
#[derive(Clone, Debug, PartialEq)]
pub struct Candle {
    pub date: DateTime<Utc>,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    /// Calendar day used to align series from different symbols.
    pub fn day(&self) -> NaiveDate {
        self.date.date_naive()
    }
}

/// Holds historical stock data for a specific symbol.
#[derive(Clone, Debug)]
pub struct StockData {
    pub symbol: String,
    pub history: Vec<Candle>,
}

#[derive(Deserialize, Serialize, Debug)]
pub(crate) struct YahooChartResponse {
    chart: YahooChart,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooChart {
    result: Option<Vec<YahooResult>>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooResult {
    #[serde(default)]
    timestamp: Vec<i64>,
    indicators: YahooIndicators,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooIndicators {
    quote: Vec<YahooQuote>,
}

#[derive(Deserialize, Serialize, Debug)]
struct YahooQuote {
    #[serde(default)]
    open: Vec<Option<f64>>,
    #[serde(default)]
    high: Vec<Option<f64>>,
    #[serde(default)]
    low: Vec<Option<f64>>,
    #[serde(default)]
    close: Vec<Option<f64>>,
    #[serde(default)]
    volume: Vec<Option<f64>>,
}

impl YahooChartResponse {
    /// Yahoo answers unknown tickers with `"result": null` plus an error object.
    fn has_result(&self) -> bool {
        self.chart.result.as_ref().is_some_and(|r| !r.is_empty())
    }
}

fn cache_file_name(symbol: &str, range: &str) -> String {
    format!("{}_{}.json", symbol.to_uppercase(), range)
}

/// Converts a chart response into candles, skipping bars with any missing field.
fn chart_to_stock_data(symbol: &str, response: &YahooChartResponse) -> Result<StockData> {
    let result = response
        .chart
        .result
        .as_ref()
        .and_then(|r| r.first())
        .ok_or_else(|| anyhow::anyhow!("No chart result for {}", symbol))?;
    let quotes = result
        .indicators
        .quote
        .first()
        .ok_or_else(|| anyhow::anyhow!("No quote result for {}", symbol))?;

    let field = |values: &[Option<f64>], i: usize| values.get(i).copied().flatten();

    let mut history = Vec::with_capacity(result.timestamp.len());
    for (i, &timestamp) in result.timestamp.iter().enumerate() {
        let Some(date) = Utc.timestamp_opt(timestamp, 0).single() else {
            continue;
        };
        if let (Some(open), Some(high), Some(low), Some(close), Some(volume)) = (
            field(&quotes.open, i),
            field(&quotes.high, i),
            field(&quotes.low, i),
            field(&quotes.close, i),
            field(&quotes.volume, i),
        ) {
            history.push(Candle {
                date,
                open,
                high,
                low,
                close,
                volume,
            });
        }
    }

    Ok(StockData {
        symbol: symbol.to_uppercase(),
        history,
    })
}

fn read_fresh_cache(cache_file: &Path, ttl_secs: u64) -> Result<Option<YahooChartResponse>> {
    if !cache_file.exists() {
        return Ok(None);
    }
    let modified = std::fs::metadata(cache_file)?.modified()?;
    let age = std::time::SystemTime::now()
        .duration_since(modified)
        .unwrap_or_default();
    if age.as_secs() >= ttl_secs {
        return Ok(None);
    }

    let file = std::fs::File::open(cache_file)?;
    let reader = std::io::BufReader::new(file);
    let cached: YahooChartResponse = serde_json::from_reader(reader)?;
    Ok(cached.has_result().then_some(cached))
}

/// Writes `response` to the cache unless it carries no chart result.
fn store_cache(cache_file: &Path, response: &YahooChartResponse) -> Result<bool> {
    if !response.has_result() {
        return Ok(false);
    }
    let file = std::fs::File::create(cache_file)?;
    let writer = std::io::BufWriter::new(file);
    serde_json::to_writer(writer, response)?;
    Ok(true)
}

/// Fetches daily history for `symbol`, reading and refreshing the cache in `dir`.
pub async fn fetch_range_in(dir: &Path, symbol: &str, range: &str) -> Result<StockData> {
    if !dir.exists() {
        std::fs::create_dir_all(dir)
            .with_context(|| format!("creating cache dir {}", dir.display()))?;
    }
    let cache_file = dir.join(cache_file_name(symbol, range));

    let response = match read_fresh_cache(&cache_file, cache_ttl_secs()) {
        Ok(Some(cached)) => {
            info!("Loading {} from cache...", symbol);
            cached
        }
        Ok(None) => {
            info!("Cache miss for {}, fetching...", symbol);
            fetch_from_api(symbol, range, &cache_file).await?
        }
        Err(e) => {
            warn!("Unreadable cache for {} ({}), fetching...", symbol, e);
            fetch_from_api(symbol, range, &cache_file).await?
        }
    };

    chart_to_stock_data(symbol, &response)
}

/// Fetches historical stock data from Yahoo Finance.
///
/// # Arguments
/// * `symbol` - The stock ticker symbol (e.g., "AAPL").
/// * `range` - The time range to fetch (e.g., "1y", "10y", "max").
pub async fn fetch_range(symbol: &str, range: &str) -> Result<StockData> {
    fetch_range_in(&cache_dir(), symbol, range).await
}

/// Fetches several symbols one after another, skipping duplicates and
/// preserving the order in which symbols were requested.
pub async fn fetch_many(symbols: &[String], range: &str) -> Result<Vec<StockData>> {
    let delay_ms = batch_fetch_delay_ms();
    let mut seen = HashSet::new();
    let mut out = Vec::with_capacity(symbols.len());

    for (idx, raw_symbol) in symbols.iter().enumerate() {
        let symbol = raw_symbol.trim().to_uppercase();
        if symbol.is_empty() {
            return Err(anyhow::anyhow!("empty symbol in request (range={})", range));
        }
        if !seen.insert(symbol.clone()) {
            continue;
        }

        let data = fetch_range(&symbol, range)
            .await
            .with_context(|| format!("historical fetch failed: symbol={}, range={}", symbol, range))?;
        if data.history.is_empty() {
            return Err(anyhow::anyhow!("no usable candles for {}", symbol));
        }
        out.push(data);

        if idx + 1 < symbols.len() && delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(delay_ms)).await;
        }
    }

    Ok(out)
}

async fn fetch_from_api(symbol: &str, range: &str, cache_path: &Path) -> Result<YahooChartResponse> {
    let url = format!(
        "https://query1.finance.yahoo.com/v8/finance/chart/{}?range={}&interval=1d",
        symbol, range
    );
    let client = reqwest::Client::new();

    let mut attempts = 0;
    loop {
        attempts += 1;
        let outcome = match client
            .get(&url)
            .header("User-Agent", "Mozilla/5.0")
            .send()
            .await
        {
            Ok(resp) => match resp.error_for_status() {
                Ok(resp) => resp.json::<YahooChartResponse>().await,
                Err(e) => Err(e),
            },
            Err(e) => Err(e),
        };

        match outcome {
            Ok(resp_json) => {
                if !store_cache(cache_path, &resp_json)? {
                    warn!("Yahoo returned no chart result for {}; not caching", symbol);
                }
                return Ok(resp_json);
            }
            Err(e) => {
                if attempts >= FETCH_MAX_ATTEMPTS {
                    return Err(e.into());
                }
                warn!(
                    "Failed to fetch data for {} (attempt {}/{}): {}",
                    symbol, attempts, FETCH_MAX_ATTEMPTS, e
                );
            }
        }

        tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    }
}

impl StockData {
    pub fn closes(&self) -> Vec<f64> {
        self.history.iter().map(|c| c.close).collect()
    }

    /// Synthetic random-walk series starting at 100, reproducible from `seed`.
    #[cfg(test)]
    pub fn new_mock(symbol: &str, days: usize, seed: u64) -> Self {
        use rand::{rngs::StdRng, Rng, SeedableRng};

        let mut rng = StdRng::seed_from_u64(seed);
        let mut history = Vec::with_capacity(days);
        let mut current_price: f64 = 100.0;
        let mut current_date = Utc
            .with_ymd_and_hms(2021, 1, 4, 14, 30, 0)
            .single()
            .unwrap_or_else(Utc::now);

        for _ in 0..days {
            let volatility = 0.02;
            let change_pct: f64 = rng.gen_range(-volatility..volatility);
            let open = current_price;
            let close = open * (1.0 + change_pct);
            let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.01));
            let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.01));
            let volume = rng.gen_range(1000.0..10000.0);

            history.push(Candle {
                date: current_date,
                open,
                high,
                low,
                close,
                volume,
            });

            current_price = close;
            current_date += chrono::Duration::days(1);
        }

        Self {
            symbol: symbol.to_string(),
            history,
        }
    }
}

#[cfg(test)]
pub(crate) fn candle(day: u32, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Candle {
    Candle {
        date: Utc
            .with_ymd_and_hms(2021, 3, day, 14, 30, 0)
            .single()
            .expect("valid test date"),
        open,
        high,
        low,
        close,
        volume,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const SAMPLE_CHART: &str = r#"{
        "chart": {
            "result": [{
                "timestamp": [1609770600, 1609857000, 1609943400],
                "indicators": {
                    "quote": [{
                        "open":   [133.5, 128.9, null],
                        "high":   [133.6, 131.7, 131.0],
                        "low":    [126.7, 128.4, 126.3],
                        "close":  [129.4, 131.0, 126.6],
                        "volume": [143301900, 97664900, 155088000]
                    }]
                }
            }]
        }
    }"#;

    #[test]
    fn test_chart_parsing_skips_incomplete_bars() {
        let response: YahooChartResponse = serde_json::from_str(SAMPLE_CHART).unwrap();
        let data = chart_to_stock_data("aapl", &response).unwrap();

        assert_eq!(data.symbol, "AAPL");
        assert_eq!(data.history.len(), 2);
        assert_eq!(data.history[0].close, 129.4);
        assert_eq!(
            data.history[1].day(),
            NaiveDate::from_ymd_opt(2021, 1, 5).unwrap()
        );
    }

    #[test]
    fn test_missing_result_is_an_error() {
        let response: YahooChartResponse =
            serde_json::from_str(r#"{"chart": {"result": null}}"#).unwrap();
        assert!(chart_to_stock_data("NOPE", &response).is_err());
    }

    #[tokio::test]
    async fn test_fresh_cache_is_used_without_network() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join(cache_file_name("aapl", "1y")), SAMPLE_CHART).unwrap();

        let data = fetch_range_in(dir.path(), "aapl", "1y").await.unwrap();
        assert_eq!(data.history.len(), 2);
        assert_eq!(data.closes(), vec![129.4, 131.0]);
    }

    #[test]
    fn test_error_body_is_never_cached() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join(cache_file_name("nope", "1y"));
        let error_body: YahooChartResponse = serde_json::from_str(
            r#"{"chart": {"result": null, "error": {"code": "Not Found"}}}"#,
        )
        .unwrap();

        assert!(!store_cache(&path, &error_body).unwrap());
        assert!(!path.exists());

        // An error body left behind by an older run counts as a miss.
        std::fs::write(&path, r#"{"chart": {"result": null}}"#).unwrap();
        assert!(read_fresh_cache(&path, 3600).unwrap().is_none());

        let good: YahooChartResponse = serde_json::from_str(SAMPLE_CHART).unwrap();
        assert!(store_cache(&path, &good).unwrap());
        assert!(read_fresh_cache(&path, 3600).unwrap().is_some());
    }

    #[test]
    fn test_mock_is_reproducible() {
        let a = StockData::new_mock("TEST", 50, 7);
        let b = StockData::new_mock("TEST", 50, 7);
        assert_eq!(a.history, b.history);
        assert!(a.history.iter().all(|c| c.low <= c.close && c.close <= c.high));
    }
}
