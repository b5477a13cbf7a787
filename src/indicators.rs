//! Rolling-window indicators: Bollinger Bands, %B, bandwidth, Money Flow
//! Index and Intraday Intensity, plus the buy/sell marker rules built on them.
//!
//! Every series has the same length as its input; warm-up positions are NaN.

use crate::config::{BOLLINGER_STD, BOLLINGER_WINDOW, II_WINDOW, MFI_WINDOW};
use crate::data::StockData;
use crate::error::{FrontierError, Result};
use chrono::NaiveDate;
use clap::ValueEnum;
use serde::Serialize;

fn check_period(period: usize, name: &str) -> Result<()> {
    if period == 0 {
        return Err(FrontierError::invalid_parameter(format!(
            "{} period must be > 0",
            name
        )));
    }
    Ok(())
}

fn check_lengths(n: usize, others: &[&[f64]]) -> Result<()> {
    match others.iter().find(|s| s.len() != n) {
        Some(s) => Err(FrontierError::length_mismatch(n, s.len())),
        None => Ok(()),
    }
}

/// Trailing sum over `period` values.
pub fn rolling_sum(data: &[f64], period: usize) -> Result<Vec<f64>> {
    check_period(period, "Rolling sum")?;
    let mut result = vec![f64::NAN; data.len()];
    if period > data.len() {
        return Ok(result);
    }

    // Summing each window directly keeps NaNs local to the windows that contain them.
    for i in (period - 1)..data.len() {
        result[i] = data[i + 1 - period..=i].iter().sum();
    }
    Ok(result)
}

/// Simple Moving Average.
pub fn sma(data: &[f64], period: usize) -> Result<Vec<f64>> {
    check_period(period, "SMA")?;
    Ok(rolling_sum(data, period)?
        .into_iter()
        .map(|s| s / period as f64)
        .collect())
}

/// Rolling sample standard deviation (n-1 denominator).
pub fn rolling_std(data: &[f64], period: usize) -> Result<Vec<f64>> {
    if period < 2 {
        return Err(FrontierError::invalid_parameter(
            "Rolling std period must be >= 2",
        ));
    }
    let means = sma(data, period)?;
    let mut result = vec![f64::NAN; data.len()];
    for i in (period - 1)..data.len() {
        let mean = means[i];
        let ss: f64 = data[i + 1 - period..=i]
            .iter()
            .map(|x| (x - mean).powi(2))
            .sum();
        result[i] = (ss / (period as f64 - 1.0)).sqrt();
    }
    Ok(result)
}

/// Bollinger Bands result.
#[derive(Debug, Clone)]
pub struct BollingerBands {
    /// Middle band (SMA).
    pub middle: Vec<f64>,
    pub std: Vec<f64>,
    pub upper: Vec<f64>,
    pub lower: Vec<f64>,
    /// %B: (close - lower) / (upper - lower); NaN when the bands coincide.
    pub percent_b: Vec<f64>,
    /// (upper - lower) / middle * 100.
    pub bandwidth: Vec<f64>,
}

/// Bollinger Bands.
///
/// # Arguments
/// * `close` - Close prices
/// * `period` - Lookback period (default: 20)
/// * `multiplier` - Standard deviation multiplier (default: 2.0)
pub fn bollinger_bands(close: &[f64], period: usize, multiplier: f64) -> Result<BollingerBands> {
    if multiplier.is_nan() || multiplier <= 0.0 {
        return Err(FrontierError::invalid_parameter(
            "Bollinger Bands std multiplier must be > 0",
        ));
    }

    let middle = sma(close, period)?;
    let std = rolling_std(close, period)?;
    let n = close.len();
    let mut upper = vec![f64::NAN; n];
    let mut lower = vec![f64::NAN; n];
    let mut percent_b = vec![f64::NAN; n];
    let mut bandwidth = vec![f64::NAN; n];

    for i in 0..n {
        if middle[i].is_nan() || std[i].is_nan() {
            continue;
        }
        upper[i] = middle[i] + multiplier * std[i];
        lower[i] = middle[i] - multiplier * std[i];

        let width = upper[i] - lower[i];
        if width > 0.0 {
            percent_b[i] = (close[i] - lower[i]) / width;
        }
        if middle[i] != 0.0 {
            bandwidth[i] = width / middle[i] * 100.0;
        }
    }

    Ok(BollingerBands {
        middle,
        std,
        upper,
        lower,
        percent_b,
        bandwidth,
    })
}

/// Money Flow Index.
///
/// A day's money flow (typical price x volume) is positive when its typical
/// price is above the previous day's and negative otherwise, so unchanged
/// days count as negative. The first day carries no flow.
///
/// # Returns
/// Vector of MFI values (0-100 scale); 100 when the window has no negative
/// flow, NaN when it has no flow at all.
pub fn money_flow_index(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    volume: &[f64],
    period: usize,
) -> Result<Vec<f64>> {
    let n = close.len();
    check_lengths(n, &[high, low, volume])?;
    check_period(period, "MFI")?;

    let typical: Vec<f64> = (0..n).map(|i| (high[i] + low[i] + close[i]) / 3.0).collect();
    let mut positive = vec![0.0; n];
    let mut negative = vec![0.0; n];
    for i in 1..n {
        let flow = typical[i] * volume[i];
        if typical[i - 1] < typical[i] {
            positive[i] = flow;
        } else {
            negative[i] = flow;
        }
    }

    let pos_sum = rolling_sum(&positive, period)?;
    let neg_sum = rolling_sum(&negative, period)?;
    Ok(pos_sum
        .iter()
        .zip(neg_sum.iter())
        .map(|(&p, &q)| {
            if p.is_nan() || q.is_nan() || (p == 0.0 && q == 0.0) {
                f64::NAN
            } else if q == 0.0 {
                100.0
            } else {
                100.0 - 100.0 / (1.0 + p / q)
            }
        })
        .collect())
}

/// Intraday Intensity per bar: (2C - H - L) / (H - L) x V, 0 for a zero range.
pub fn intraday_intensity(high: &[f64], low: &[f64], close: &[f64], volume: &[f64]) -> Result<Vec<f64>> {
    let n = close.len();
    check_lengths(n, &[high, low, volume])?;

    Ok((0..n)
        .map(|i| {
            let range = high[i] - low[i];
            if range == 0.0 {
                0.0
            } else {
                (2.0 * close[i] - high[i] - low[i]) / range * volume[i]
            }
        })
        .collect())
}

/// Intraday Intensity % over `period` bars: sum(II) / sum(V) x 100.
pub fn intraday_intensity_percent(
    high: &[f64],
    low: &[f64],
    close: &[f64],
    volume: &[f64],
    period: usize,
) -> Result<Vec<f64>> {
    let ii = intraday_intensity(high, low, close, volume)?;
    let ii_sum = rolling_sum(&ii, period)?;
    let vol_sum = rolling_sum(volume, period)?;
    Ok(ii_sum
        .iter()
        .zip(vol_sum.iter())
        .map(|(&s, &v)| if v == 0.0 { f64::NAN } else { s / v * 100.0 })
        .collect())
}

// ──────────────────────────────────────────────────────────────────────────────
// Signals & Frames
// ──────────────────────────────────────────────────────────────────────────────

#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Signal {
    Buy,
    Sell,
}

/// Which oscillator confirms a %B reading.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Strategy {
    /// %B > 0.8 with MFI > 80 buys; %B < 0.2 with MFI < 20 sells.
    #[default]
    Trend,
    /// %B < 0.05 with II% > 0 buys; %B > 0.95 with II% < 0 sells.
    Reversal,
}

impl Strategy {
    pub fn signal(self, percent_b: f64, mfi: f64, ii_percent: f64) -> Option<Signal> {
        match self {
            Strategy::Trend => {
                if percent_b > 0.8 && mfi > 80.0 {
                    Some(Signal::Buy)
                } else if percent_b < 0.2 && mfi < 20.0 {
                    Some(Signal::Sell)
                } else {
                    None
                }
            }
            Strategy::Reversal => {
                if percent_b < 0.05 && ii_percent > 0.0 {
                    Some(Signal::Buy)
                } else if percent_b > 0.95 && ii_percent < 0.0 {
                    Some(Signal::Sell)
                } else {
                    None
                }
            }
        }
    }

    fn oscillator(self, row: &IndicatorRow) -> f64 {
        match self {
            Strategy::Trend => row.mfi,
            Strategy::Reversal => row.ii_percent,
        }
    }
}

#[derive(Clone, Copy, Debug)]
pub struct IndicatorParams {
    pub window: usize,
    pub band_std: f64,
    pub mfi_window: usize,
    pub ii_window: usize,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            window: BOLLINGER_WINDOW,
            band_std: BOLLINGER_STD,
            mfi_window: MFI_WINDOW,
            ii_window: II_WINDOW,
        }
    }
}

/// One dated row of indicator values. NaN values serialize as `null`.
#[derive(Clone, Debug, Serialize)]
pub struct IndicatorRow {
    pub date: NaiveDate,
    pub close: f64,
    pub sma: f64,
    pub std: f64,
    pub upper: f64,
    pub lower: f64,
    pub percent_b: f64,
    pub bandwidth: f64,
    pub mfi: f64,
    pub ii_percent: f64,
    pub signal: Option<Signal>,
}

#[derive(Clone, Debug, Serialize)]
pub struct IndicatorFrame {
    pub symbol: String,
    pub strategy: Strategy,
    pub rows: Vec<IndicatorRow>,
}

impl IndicatorFrame {
    /// Computes every indicator for `data` and drops the leading warm-up rows,
    /// i.e. rows before both the bands and the strategy's oscillator are defined.
    pub fn build(data: &StockData, params: &IndicatorParams, strategy: Strategy) -> Result<Self> {
        let high: Vec<f64> = data.history.iter().map(|c| c.high).collect();
        let low: Vec<f64> = data.history.iter().map(|c| c.low).collect();
        let close = data.closes();
        let volume: Vec<f64> = data.history.iter().map(|c| c.volume).collect();

        let bands = bollinger_bands(&close, params.window, params.band_std)?;
        let mfi = money_flow_index(&high, &low, &close, &volume, params.mfi_window)?;
        let ii_percent = intraday_intensity_percent(&high, &low, &close, &volume, params.ii_window)?;

        let rows: Vec<IndicatorRow> = data
            .history
            .iter()
            .enumerate()
            .map(|(i, c)| IndicatorRow {
                date: c.day(),
                close: c.close,
                sma: bands.middle[i],
                std: bands.std[i],
                upper: bands.upper[i],
                lower: bands.lower[i],
                percent_b: bands.percent_b[i],
                bandwidth: bands.bandwidth[i],
                mfi: mfi[i],
                ii_percent: ii_percent[i],
                signal: strategy.signal(bands.percent_b[i], mfi[i], ii_percent[i]),
            })
            .collect();

        let first_ready = rows
            .iter()
            .position(|r| !r.upper.is_nan() && !strategy.oscillator(r).is_nan())
            .unwrap_or(rows.len());

        Ok(Self {
            symbol: data.symbol.clone(),
            strategy,
            rows: rows.into_iter().skip(first_ready).collect(),
        })
    }

    pub fn count(&self, signal: Signal) -> usize {
        self.rows.iter().filter(|r| r.signal == Some(signal)).count()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::candle;

    #[test]
    fn test_sma_and_sample_std() {
        let data = [1.0, 2.0, 3.0, 4.0, 5.0];
        let mean = sma(&data, 3).unwrap();
        let std = rolling_std(&data, 3).unwrap();
        assert!(mean[0].is_nan() && mean[1].is_nan());
        assert_eq!(mean[2], 2.0);
        assert_eq!(mean[4], 4.0);
        // Sample std of three consecutive integers is 1.
        assert!((std[2] - 1.0).abs() < 1e-12);
        assert!((std[4] - 1.0).abs() < 1e-12);
    }

    #[test]
    fn test_bollinger_on_constant_series() {
        let data = vec![50.0; 30];
        let bands = bollinger_bands(&data, 20, 2.0).unwrap();
        assert!(bands.upper[18].is_nan());
        assert_eq!(bands.upper[19], 50.0);
        assert_eq!(bands.lower[19], 50.0);
        assert_eq!(bands.bandwidth[25], 0.0);
        assert!(bands.percent_b[25].is_nan());
    }

    #[test]
    fn test_percent_b_at_band_edges() {
        let mut data: Vec<f64> = (0..19).map(|i| 100.0 + (i % 2) as f64).collect();
        data.push(100.5);
        let bands = bollinger_bands(&data, 20, 2.0).unwrap();
        let i = 19;
        let pb = bands.percent_b[i];
        let expected = (data[i] - bands.lower[i]) / (bands.upper[i] - bands.lower[i]);
        assert!((pb - expected).abs() < 1e-12);
        assert!((bands.upper[i] - bands.middle[i] - 2.0 * bands.std[i]).abs() < 1e-12);
    }

    #[test]
    fn test_invalid_parameters() {
        assert!(bollinger_bands(&[1.0; 5], 0, 2.0).is_err());
        assert!(bollinger_bands(&[1.0; 5], 3, 0.0).is_err());
        let err = money_flow_index(&[1.0; 3], &[1.0; 2], &[1.0; 3], &[1.0; 3], 2).unwrap_err();
        assert_eq!(err, FrontierError::length_mismatch(3, 2));
    }

    #[test]
    fn test_mfi_rising_prices_is_100() {
        let close: Vec<f64> = (0..15).map(|i| 10.0 + i as f64).collect();
        let high: Vec<f64> = close.iter().map(|c| c + 0.5).collect();
        let low: Vec<f64> = close.iter().map(|c| c - 0.5).collect();
        let volume = vec![1000.0; 15];

        let mfi = money_flow_index(&high, &low, &close, &volume, 10).unwrap();
        assert!(mfi[8].is_nan());
        assert!(mfi[9..].iter().all(|&v| v == 100.0));
    }

    #[test]
    fn test_mfi_mixed_flows() {
        // Typical prices 10, 11, 10, 11 with unit volume.
        let close = [10.0, 11.0, 10.0, 11.0];
        let volume = [1.0; 4];
        let mfi = money_flow_index(&close, &close, &close, &volume, 3).unwrap();
        // Window ending at day 3: positive 11 + 11, negative 10.
        let ratio: f64 = 22.0 / 10.0;
        assert!((mfi[3] - (100.0 - 100.0 / (1.0 + ratio))).abs() < 1e-12);
        // Window ending at day 2 contains day 0, which carries no flow.
        assert!((mfi[2] - (100.0 - 100.0 / (1.0 + 11.0 / 10.0))).abs() < 1e-12);
    }

    #[test]
    fn test_intraday_intensity_sign() {
        let high = [10.0; 25];
        let low = [8.0; 25];
        let at_high = [10.0; 25];
        let volume = [500.0; 25];

        let ii = intraday_intensity(&high, &low, &at_high, &volume).unwrap();
        assert_eq!(ii[0], 500.0);
        let pct = intraday_intensity_percent(&high, &low, &at_high, &volume, 21).unwrap();
        assert!(pct[19].is_nan());
        assert!((pct[20] - 100.0).abs() < 1e-12);

        let flat = intraday_intensity(&[5.0], &[5.0], &[5.0], &[100.0]).unwrap();
        assert_eq!(flat[0], 0.0);
    }

    #[test]
    fn test_signal_rules() {
        assert_eq!(Strategy::Trend.signal(0.9, 85.0, f64::NAN), Some(Signal::Buy));
        assert_eq!(Strategy::Trend.signal(0.1, 15.0, f64::NAN), Some(Signal::Sell));
        assert_eq!(Strategy::Trend.signal(0.9, 50.0, f64::NAN), None);
        assert_eq!(Strategy::Reversal.signal(0.01, f64::NAN, 3.0), Some(Signal::Buy));
        assert_eq!(Strategy::Reversal.signal(0.99, f64::NAN, -3.0), Some(Signal::Sell));
        assert_eq!(Strategy::Reversal.signal(f64::NAN, f64::NAN, -3.0), None);
    }

    #[test]
    fn test_frame_trims_warmup() {
        let data = StockData::new_mock("MSFT", 60, 3);

        let trend = IndicatorFrame::build(&data, &IndicatorParams::default(), Strategy::Trend).unwrap();
        assert_eq!(trend.rows.len(), 60 - 19);
        assert_eq!(trend.rows[0].date, data.history[19].day());

        let reversal =
            IndicatorFrame::build(&data, &IndicatorParams::default(), Strategy::Reversal).unwrap();
        assert_eq!(reversal.rows.len(), 60 - 20);
        assert!(reversal.rows.iter().all(|r| !r.ii_percent.is_nan()));
    }

    #[test]
    fn test_frame_shorter_than_window_is_empty() {
        let data = StockData {
            symbol: "X".into(),
            history: (1..=5).map(|d| candle(d, 1.0, 2.0, 0.5, 1.5, 10.0)).collect(),
        };
        let frame = IndicatorFrame::build(&data, &IndicatorParams::default(), Strategy::Trend).unwrap();
        assert!(frame.rows.is_empty());
    }
}
