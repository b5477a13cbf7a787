//! Daily return series aligned across symbols, and the annualized moments
//! the portfolio sampler consumes.

use crate::data::StockData;
use crate::error::{FrontierError, Result};
use chrono::NaiveDate;
use serde::Serialize;
use std::collections::{BTreeMap, HashMap};

/// Fractional daily price changes on the trading days shared by every symbol.
#[derive(Clone, Debug)]
pub struct ReturnSeries {
    pub symbols: Vec<String>,
    pub dates: Vec<NaiveDate>,
    /// One row per date, one column per symbol.
    pub rows: Vec<Vec<f64>>,
}

impl ReturnSeries {
    /// Inner-joins closing prices on the calendar date and takes the
    /// percentage change between consecutive joined rows. The first joined
    /// row and any row with a non-finite change are dropped.
    pub fn from_closes(assets: &[StockData]) -> Result<Self> {
        if assets.len() < 2 {
            return Err(FrontierError::degenerate_input(format!(
                "need at least 2 assets, got {}",
                assets.len()
            )));
        }

        let per_asset: Vec<HashMap<NaiveDate, f64>> = assets
            .iter()
            .map(|a| a.history.iter().map(|c| (c.day(), c.close)).collect())
            .collect();

        let mut joined: BTreeMap<NaiveDate, Vec<f64>> = BTreeMap::new();
        for (day, &close) in &per_asset[0] {
            let row: Option<Vec<f64>> = std::iter::once(Some(close))
                .chain(per_asset[1..].iter().map(|m| m.get(day).copied()))
                .collect();
            if let Some(row) = row {
                joined.insert(*day, row);
            }
        }

        let joined: Vec<(NaiveDate, Vec<f64>)> = joined.into_iter().collect();
        let mut dates = Vec::with_capacity(joined.len().saturating_sub(1));
        let mut rows = Vec::with_capacity(joined.len().saturating_sub(1));
        for pair in joined.windows(2) {
            let (_, prev) = &pair[0];
            let (day, curr) = &pair[1];
            let row: Vec<f64> = curr
                .iter()
                .zip(prev.iter())
                .map(|(c, p)| (c - p) / p)
                .collect();
            if row.iter().all(|r| r.is_finite()) {
                dates.push(*day);
                rows.push(row);
            }
        }

        if rows.len() < 2 {
            return Err(FrontierError::insufficient_data(2, rows.len()));
        }

        Ok(Self {
            symbols: assets.iter().map(|a| a.symbol.clone()).collect(),
            dates,
            rows,
        })
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }
}

/// Annualized mean returns and covariance, fixed for a whole sampling run.
#[derive(Clone, Debug, Serialize)]
pub struct MomentEstimates {
    pub symbols: Vec<String>,
    pub mean: Vec<f64>,
    pub cov: Vec<Vec<f64>>,
}

impl MomentEstimates {
    /// Validated constructor for callers that already hold annualized moments.
    pub fn new(symbols: Vec<String>, mean: Vec<f64>, cov: Vec<Vec<f64>>) -> Result<Self> {
        let moments = Self { symbols, mean, cov };
        moments.validate()?;
        Ok(moments)
    }

    /// Checks shape (n >= 2, mean of length n, n x n covariance) and that
    /// every moment is finite.
    pub fn validate(&self) -> Result<()> {
        let n = self.symbols.len();
        if n < 2 {
            return Err(FrontierError::degenerate_input(format!(
                "need at least 2 assets, got {}",
                n
            )));
        }
        if self.mean.len() != n {
            return Err(FrontierError::degenerate_input(format!(
                "mean-return vector has length {}, expected {}",
                self.mean.len(),
                n
            )));
        }
        if self.cov.len() != n || self.cov.iter().any(|row| row.len() != n) {
            return Err(FrontierError::degenerate_input(format!(
                "covariance matrix must be {}x{}",
                n, n
            )));
        }
        if self.mean.iter().chain(self.cov.iter().flatten()).any(|v| !v.is_finite()) {
            return Err(FrontierError::degenerate_input(
                "moment estimates contain non-finite values",
            ));
        }
        Ok(())
    }

    /// Arithmetic mean and sample covariance (n-1 denominator) of daily
    /// returns, both scaled by `periods_per_year`.
    pub fn from_returns(returns: &ReturnSeries, periods_per_year: f64) -> Result<Self> {
        let n_assets = returns.symbols.len();
        let n_obs = returns.len();
        if n_obs < 2 {
            return Err(FrontierError::insufficient_data(2, n_obs));
        }

        let means: Vec<f64> = (0..n_assets)
            .map(|j| returns.rows.iter().map(|r| r[j]).sum::<f64>() / n_obs as f64)
            .collect();

        let mut cov = vec![vec![0.0; n_assets]; n_assets];
        for i in 0..n_assets {
            for j in i..n_assets {
                let sum: f64 = returns
                    .rows
                    .iter()
                    .map(|r| (r[i] - means[i]) * (r[j] - means[j]))
                    .sum();
                let covariance = sum / (n_obs as f64 - 1.0) * periods_per_year;
                cov[i][j] = covariance;
                cov[j][i] = covariance;
            }
        }

        let mean = means.iter().map(|m| m * periods_per_year).collect();
        Self::new(returns.symbols.clone(), mean, cov)
    }

    pub fn n_assets(&self) -> usize {
        self.symbols.len()
    }

    pub fn volatility(&self, asset: usize) -> f64 {
        self.cov[asset][asset].max(0.0).sqrt()
    }
}

/// Pearson correlation of two equally long samples. NaN when either side is constant.
pub fn correlation(a: &[f64], b: &[f64]) -> Result<f64> {
    if a.len() != b.len() {
        return Err(FrontierError::length_mismatch(a.len(), b.len()));
    }
    if a.len() < 2 {
        return Err(FrontierError::insufficient_data(2, a.len()));
    }

    let n = a.len() as f64;
    let mean_a = a.iter().sum::<f64>() / n;
    let mean_b = b.iter().sum::<f64>() / n;
    let (mut sab, mut saa, mut sbb) = (0.0, 0.0, 0.0);
    for (x, y) in a.iter().zip(b.iter()) {
        let dx = x - mean_a;
        let dy = y - mean_b;
        sab += dx * dy;
        saa += dx * dx;
        sbb += dy * dy;
    }

    let denom = (saa * sbb).sqrt();
    Ok(if denom > 0.0 { sab / denom } else { f64::NAN })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::{candle, Candle};

    fn series(symbol: &str, candles: Vec<Candle>) -> StockData {
        StockData {
            symbol: symbol.to_string(),
            history: candles,
        }
    }

    fn close_only(day: u32, close: f64) -> Candle {
        candle(day, close, close, close, close, 1.0)
    }

    #[test]
    fn test_inner_join_drops_unshared_days_and_first_row() {
        let a = series(
            "AAA",
            vec![
                close_only(1, 100.0),
                close_only(2, 110.0),
                close_only(3, 121.0),
                close_only(4, 99.0),
            ],
        );
        // Day 3 missing for BBB, so it is dropped for both.
        let b = series(
            "BBB",
            vec![close_only(1, 50.0), close_only(2, 40.0), close_only(4, 60.0)],
        );

        let r = ReturnSeries::from_closes(&[a, b]).unwrap();
        assert_eq!(r.len(), 2);
        assert_eq!(r.dates[0], NaiveDate::from_ymd_opt(2021, 3, 2).unwrap());
        assert!((r.rows[0][0] - 0.10).abs() < 1e-12);
        assert!((r.rows[0][1] + 0.20).abs() < 1e-12);
        // Day 4 change is measured against day 2, the previous joined row.
        assert!((r.rows[1][0] - (99.0 - 110.0) / 110.0).abs() < 1e-12);
        assert!((r.rows[1][1] - 0.5).abs() < 1e-12);
        assert!(r.rows.iter().all(|row| row.len() == 2));
    }

    #[test]
    fn test_single_asset_is_degenerate() {
        let a = StockData::new_mock("AAA", 30, 1);
        let err = ReturnSeries::from_closes(&[a]).unwrap_err();
        assert!(matches!(err, FrontierError::DegenerateInput { .. }));
    }

    #[test]
    fn test_disjoint_dates_are_insufficient() {
        let a = series("AAA", vec![close_only(1, 1.0), close_only(2, 2.0)]);
        let b = series("BBB", vec![close_only(3, 1.0), close_only(4, 2.0)]);
        let err = ReturnSeries::from_closes(&[a, b]).unwrap_err();
        assert_eq!(err, FrontierError::insufficient_data(2, 0));
    }

    #[test]
    fn test_annualized_moments_hand_computed() {
        let returns = ReturnSeries {
            symbols: vec!["AAA".into(), "BBB".into()],
            dates: (1..=3)
                .map(|d| NaiveDate::from_ymd_opt(2021, 3, d).unwrap())
                .collect(),
            rows: vec![vec![0.01, 0.02], vec![0.03, 0.00], vec![0.02, 0.01]],
        };

        let m = MomentEstimates::from_returns(&returns, 252.0).unwrap();
        assert!((m.mean[0] - 0.02 * 252.0).abs() < 1e-12);
        assert!((m.mean[1] - 0.01 * 252.0).abs() < 1e-12);
        // var(A) = (0.0001 + 0.0001 + 0) / 2, cov(A,B) = (-0.0001 - 0.0001 + 0) / 2
        assert!((m.cov[0][0] - 0.0001 * 252.0).abs() < 1e-12);
        assert!((m.cov[1][1] - 0.0001 * 252.0).abs() < 1e-12);
        assert!((m.cov[0][1] + 0.0001 * 252.0).abs() < 1e-12);
        assert_eq!(m.cov[0][1], m.cov[1][0]);
    }

    #[test]
    fn test_moment_shape_validation() {
        let symbols = vec!["A".to_string(), "B".to_string()];
        assert!(MomentEstimates::new(symbols.clone(), vec![0.1, 0.2], vec![vec![1.0, 0.0]]).is_err());
        assert!(MomentEstimates::new(symbols.clone(), vec![0.1], vec![vec![1.0, 0.0], vec![0.0, 1.0]]).is_err());
        assert!(MomentEstimates::new(vec!["A".into()], vec![0.1], vec![vec![1.0]]).is_err());
        assert!(MomentEstimates::new(symbols, vec![0.1, f64::NAN], vec![vec![1.0, 0.0], vec![0.0, 1.0]]).is_err());
    }

    #[test]
    fn test_correlation() {
        let a = [1.0, 2.0, 3.0, 4.0];
        let b = [2.0, 4.0, 6.0, 8.0];
        let c = [4.0, 3.0, 2.0, 1.0];
        assert!((correlation(&a, &b).unwrap() - 1.0).abs() < 1e-12);
        assert!((correlation(&a, &c).unwrap() + 1.0).abs() < 1e-12);
        assert!(correlation(&a, &[1.0; 4]).unwrap().is_nan());
        assert!(correlation(&a, &b[..3]).is_err());
    }
}
