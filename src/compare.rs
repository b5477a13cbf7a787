//! Side-by-side comparison of several symbols: cumulative daily percent
//! change on the shared trading days, and correlation of their closes.

use crate::data::StockData;
use crate::error::{FrontierError, Result};
use crate::returns::correlation;
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

#[derive(Clone, Debug, Serialize)]
pub struct ComparisonRow {
    pub date: NaiveDate,
    /// Cumulative sum of daily percent change, one entry per symbol.
    pub cumulative_pct: Vec<f64>,
}

#[derive(Clone, Debug, Serialize)]
pub struct Comparison {
    pub symbols: Vec<String>,
    pub rows: Vec<ComparisonRow>,
    /// Pearson correlation of closes for every symbol pair `(i, j, rho)` with `i < j`.
    pub close_correlation: Vec<(String, String, f64)>,
}

/// Running sum of `(close[t] - close[t-1]) / close[t-1] * 100`; the first
/// day has no change and is omitted.
pub fn cumulative_pct_change(close: &[f64]) -> Vec<f64> {
    close
        .windows(2)
        .scan(0.0, |acc, w| {
            *acc += (w[1] - w[0]) / w[0] * 100.0;
            Some(*acc)
        })
        .collect()
}

impl Comparison {
    pub fn build(assets: &[StockData]) -> Result<Self> {
        if assets.len() < 2 {
            return Err(FrontierError::degenerate_input(format!(
                "comparison needs at least 2 symbols, got {}",
                assets.len()
            )));
        }

        let lookups: Vec<HashMap<NaiveDate, f64>> = assets
            .iter()
            .map(|a| a.history.iter().map(|c| (c.day(), c.close)).collect())
            .collect();
        let mut joined: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for day in lookups[0].keys() {
            let closes: Option<Vec<f64>> = lookups.iter().map(|m| m.get(day).copied()).collect();
            if let Some(closes) = closes {
                joined.insert(*day, closes);
            }
        }
        if joined.len() < 2 {
            return Err(FrontierError::insufficient_data(2, joined.len()));
        }

        let dates: Vec<NaiveDate> = joined.keys().copied().collect();
        let columns: Vec<Vec<f64>> = (0..assets.len())
            .map(|j| joined.values().map(|row| row[j]).collect())
            .collect();
        let cumulative: Vec<Vec<f64>> = columns.iter().map(|c| cumulative_pct_change(c)).collect();

        let rows = dates[1..]
            .iter()
            .enumerate()
            .map(|(t, date)| ComparisonRow {
                date: *date,
                cumulative_pct: cumulative.iter().map(|c| c[t]).collect(),
            })
            .collect();

        let mut close_correlation = Vec::new();
        for i in 0..assets.len() {
            for j in (i + 1)..assets.len() {
                close_correlation.push((
                    assets[i].symbol.clone(),
                    assets[j].symbol.clone(),
                    correlation(&columns[i], &columns[j])?,
                ));
            }
        }

        Ok(Self {
            symbols: assets.iter().map(|a| a.symbol.clone()).collect(),
            rows,
            close_correlation,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::candle;

    #[test]
    fn test_cumulative_pct_change() {
        let out = cumulative_pct_change(&[100.0, 110.0, 99.0, 198.0]);
        assert_eq!(out.len(), 3);
        assert!((out[0] - 10.0).abs() < 1e-12);
        assert!((out[1] - 0.0).abs() < 1e-12);
        assert!((out[2] - 100.0).abs() < 1e-12);
    }

    #[test]
    fn test_comparison_aligns_dates() {
        let a = StockData {
            symbol: "AAPL".into(),
            history: [(1, 10.0), (2, 11.0), (3, 12.0), (4, 13.0)]
                .iter()
                .map(|&(d, c)| candle(d, c, c, c, c, 1.0))
                .collect(),
        };
        let b = StockData {
            symbol: "MSFT".into(),
            history: [(2, 20.0), (3, 22.0), (4, 24.0)]
                .iter()
                .map(|&(d, c)| candle(d, c, c, c, c, 1.0))
                .collect(),
        };

        let cmp = Comparison::build(&[a, b]).unwrap();
        assert_eq!(cmp.rows.len(), 2);
        assert_eq!(cmp.rows[0].date, NaiveDate::from_ymd_opt(2021, 3, 3).unwrap());
        assert!((cmp.rows[0].cumulative_pct[0] - 100.0 / 11.0).abs() < 1e-12);
        assert!((cmp.rows[0].cumulative_pct[1] - 10.0).abs() < 1e-12);
        assert_eq!(cmp.close_correlation.len(), 1);
        assert!((cmp.close_correlation[0].2 - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_comparison_needs_two_symbols() {
        let a = StockData::new_mock("AAPL", 10, 1);
        assert!(Comparison::build(&[a]).is_err());
    }
}
