//! Technical indicators over a chronologically ordered price series (oldest first)
//!
//! Every function returns `None` when the series is shorter than the window it
//! needs. Callers must treat `None` as "indicator unavailable", never as zero.

use crate::config::{IndicatorConfig, TrendConfig};
use crate::models::analysis::{
    Bollinger, ExponentialAverages, IndicatorSet, Macd, MovingAverages, SupportResistance,
    Volatility,
};
use crate::services::trend::classify_trend;

const MACD_FAST: usize = 12;
const MACD_SLOW: usize = 26;
const MACD_SIGNAL: usize = 9;

/// Points on each side a local extremum must beat
const EXTREMUM_NEIGHBORS: usize = 2;
const MAX_LEVELS: usize = 3;

fn finite(value: f64) -> Option<f64> {
    value.is_finite().then_some(value)
}

fn mean(values: &[f64]) -> f64 {
    values.iter().sum::<f64>() / values.len() as f64
}

/// Population standard deviation
fn std_dev(values: &[f64]) -> f64 {
    let m = mean(values);
    let variance = values.iter().map(|v| (v - m).powi(2)).sum::<f64>() / values.len() as f64;
    variance.sqrt()
}

/// Arithmetic mean of the last `period` prices
pub fn sma(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period {
        return None;
    }
    finite(mean(&prices[prices.len() - period..]))
}

/// EMA values from index `period - 1` onwards, seeded with the SMA of the first `period` points
pub fn ema_series(prices: &[f64], period: usize) -> Vec<f64> {
    if period == 0 || prices.len() < period {
        return Vec::new();
    }

    let multiplier = 2.0 / (period as f64 + 1.0);
    let mut values = Vec::with_capacity(prices.len() - period + 1);
    let mut current = mean(&prices[..period]);
    values.push(current);

    for price in &prices[period..] {
        current = (price - current) * multiplier + current;
        values.push(current);
    }

    values
}

/// Latest exponential moving average
pub fn ema(prices: &[f64], period: usize) -> Option<f64> {
    ema_series(prices, period).last().copied().and_then(finite)
}

/// Relative Strength Index over the last `period` deltas; needs `period + 1` points
pub fn rsi(prices: &[f64], period: usize) -> Option<f64> {
    if period == 0 || prices.len() < period + 1 {
        return None;
    }

    let window = &prices[prices.len() - period - 1..];
    let (mut gains, mut losses) = (0.0, 0.0);
    for pair in window.windows(2) {
        let delta = pair[1] - pair[0];
        if delta > 0.0 {
            gains += delta;
        } else {
            losses -= delta;
        }
    }

    let avg_gain = gains / period as f64;
    let avg_loss = losses / period as f64;

    if avg_loss == 0.0 {
        return Some(100.0);
    }

    let rs = avg_gain / avg_loss;
    finite(100.0 - 100.0 / (1.0 + rs)).map(|v| v.clamp(0.0, 100.0))
}

/// MACD line, signal line and histogram; needs at least 26 points
///
/// With fewer than 9 MACD values the signal line falls back to the MACD value itself.
pub fn macd(prices: &[f64]) -> Option<Macd> {
    if prices.len() < MACD_SLOW {
        return None;
    }

    let fast = ema_series(prices, MACD_FAST);
    let slow = ema_series(prices, MACD_SLOW);

    // fast[i + offset] and slow[i] both correspond to prices[MACD_SLOW - 1 + i]
    let offset = MACD_SLOW - MACD_FAST;
    let macd_line: Vec<f64> = slow
        .iter()
        .enumerate()
        .map(|(i, s)| fast[i + offset] - s)
        .collect();

    let (macd_value, signal, histogram) = macd_point(&macd_line)?;

    let previous_histogram = if macd_line.len() > 1 {
        macd_point(&macd_line[..macd_line.len() - 1]).map(|(_, _, h)| h)
    } else {
        None
    };

    Some(Macd {
        macd: macd_value,
        signal,
        histogram,
        previous_histogram,
    })
}

fn macd_point(macd_line: &[f64]) -> Option<(f64, f64, f64)> {
    let macd_value = *macd_line.last()?;
    let signal = ema(macd_line, MACD_SIGNAL).unwrap_or(macd_value);
    let histogram = macd_value - signal;
    Some((finite(macd_value)?, finite(signal)?, finite(histogram)?))
}

/// Bollinger Bands around SMA(`period`) at `k` standard deviations
pub fn bollinger(prices: &[f64], period: usize, k: f64) -> Option<Bollinger> {
    if period == 0 || prices.len() < period {
        return None;
    }

    let window = &prices[prices.len() - period..];
    let middle = mean(window);
    let deviation = std_dev(window);
    let upper = middle + k * deviation;
    let lower = middle - k * deviation;
    let price = *prices.last()?;

    let width = upper - lower;
    let percent_b = if width > 0.0 {
        Some((price - lower) / width)
    } else {
        None
    };
    let bandwidth = if middle != 0.0 { width / middle * 100.0 } else { 0.0 };

    Some(Bollinger {
        upper: finite(upper)?,
        middle: finite(middle)?,
        lower: finite(lower)?,
        percent_b: percent_b.and_then(finite),
        bandwidth: finite(bandwidth)?,
    })
}

/// Support and resistance from 5-point local extrema within the last `lookback` prices
///
/// Support levels lie below the current price, resistance levels above it;
/// each list holds up to 3 levels, nearest first.
pub fn support_resistance(prices: &[f64], lookback: usize) -> Option<SupportResistance> {
    let window_len = 2 * EXTREMUM_NEIGHBORS + 1;
    if lookback < window_len || prices.len() < window_len {
        return None;
    }

    let start = prices.len().saturating_sub(lookback);
    let window = &prices[start..];
    let current = *prices.last()?;

    let mut minima = Vec::new();
    let mut maxima = Vec::new();

    for i in EXTREMUM_NEIGHBORS..window.len() - EXTREMUM_NEIGHBORS {
        let value = window[i];
        let neighbors = window[i - EXTREMUM_NEIGHBORS..i]
            .iter()
            .chain(&window[i + 1..=i + EXTREMUM_NEIGHBORS]);

        let (mut is_min, mut is_max) = (true, true);
        for n in neighbors {
            if value >= *n {
                is_min = false;
            }
            if value <= *n {
                is_max = false;
            }
        }

        if is_min {
            minima.push(value);
        }
        if is_max {
            maxima.push(value);
        }
    }

    let mut support: Vec<f64> = minima.into_iter().filter(|v| *v < current).collect();
    support.sort_by(|a, b| b.partial_cmp(a).unwrap_or(std::cmp::Ordering::Equal));
    support.dedup();
    support.truncate(MAX_LEVELS);

    let mut resistance: Vec<f64> = maxima.into_iter().filter(|v| *v > current).collect();
    resistance.sort_by(|a, b| a.partial_cmp(b).unwrap_or(std::cmp::Ordering::Equal));
    resistance.dedup();
    resistance.truncate(MAX_LEVELS);

    Some(SupportResistance { support, resistance })
}

/// Standard deviation and coefficient of variation over the last `period` prices
pub fn volatility(prices: &[f64], period: usize) -> Option<Volatility> {
    if period < 2 || prices.len() < period {
        return None;
    }

    let window = &prices[prices.len() - period..];
    let m = mean(window);
    let deviation = std_dev(window);
    if m == 0.0 {
        return None;
    }

    Some(Volatility {
        std_dev: finite(deviation)?,
        coefficient_of_variation: finite(deviation / m * 100.0)?,
    })
}

/// Percentage change between the last two prices
pub fn last_change_pct(prices: &[f64]) -> Option<f64> {
    if prices.len() < 2 {
        return None;
    }
    let prev = prices[prices.len() - 2];
    let last = prices[prices.len() - 1];
    if prev == 0.0 {
        return None;
    }
    finite((last - prev) / prev * 100.0)
}

/// Compute every indicator for one price series
pub fn compute_indicator_set(
    prices: &[f64],
    config: &IndicatorConfig,
    trend_config: &TrendConfig,
) -> IndicatorSet {
    IndicatorSet {
        points: prices.len(),
        rsi: rsi(prices, config.rsi_period),
        macd: macd(prices),
        bollinger: bollinger(prices, config.bollinger_period, config.bollinger_k),
        sma: MovingAverages {
            sma5: sma(prices, 5),
            sma10: sma(prices, 10),
            sma20: sma(prices, 20),
        },
        ema: ExponentialAverages {
            ema12: ema(prices, MACD_FAST),
            ema26: ema(prices, MACD_SLOW),
        },
        trend: classify_trend(prices, trend_config),
        volatility: volatility(prices, config.volatility_period),
        support_resistance: support_resistance(prices, config.sr_lookback),
        last_change_pct: last_change_pct(prices),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn ramp(n: usize, start: f64, step: f64) -> Vec<f64> {
        (0..n).map(|i| start + step * i as f64).collect()
    }

    fn zigzag(n: usize) -> Vec<f64> {
        (0..n)
            .map(|i| 100.0 + ((i * 7) % 11) as f64 - ((i * 3) % 5) as f64)
            .collect()
    }

    #[test]
    fn test_short_series_is_unavailable() {
        let prices = ramp(4, 100.0, 1.0);
        assert_eq!(sma(&prices, 5), None);
        assert_eq!(ema(&prices, 5), None);
        assert_eq!(rsi(&prices, 14), None);
        assert_eq!(macd(&ramp(25, 100.0, 1.0)), None);
        assert_eq!(bollinger(&prices, 20, 2.0), None);
        assert_eq!(support_resistance(&prices, 20), None);
        assert_eq!(volatility(&prices, 20), None);
        assert_eq!(last_change_pct(&[100.0]), None);
    }

    #[test]
    fn test_sma_uses_last_period_values() {
        let prices = [1.0, 2.0, 3.0, 4.0, 5.0];
        assert_eq!(sma(&prices, 3), Some(4.0));
        assert_eq!(sma(&prices, 5), Some(3.0));
    }

    #[test]
    fn test_ema_seeded_with_sma() {
        let prices = [2.0, 4.0, 6.0, 8.0];
        // seed = mean(2, 4, 6) = 4, multiplier = 0.5, next = (8 - 4) * 0.5 + 4 = 6
        assert_eq!(ema(&prices, 3), Some(6.0));
        assert_eq!(ema_series(&prices, 3), vec![4.0, 6.0]);
    }

    #[test]
    fn test_rsi_needs_period_plus_one() {
        let prices = ramp(14, 100.0, 1.0);
        assert_eq!(rsi(&prices, 14), None);
        let prices = ramp(15, 100.0, 1.0);
        assert_eq!(rsi(&prices, 14), Some(100.0));
    }

    #[test]
    fn test_rsi_bounds() {
        let falling = ramp(30, 200.0, -1.5);
        let value = rsi(&falling, 14).unwrap();
        assert!(value >= 0.0 && value <= 100.0);
        assert!(value < 1e-9);

        for n in 15..60 {
            let value = rsi(&zigzag(n), 14).unwrap();
            assert!((0.0..=100.0).contains(&value), "rsi {} out of range", value);
        }
    }

    #[test]
    fn test_rsi_mixed_series() {
        // 7 gains of 1 and 7 losses of 1 -> RS = 1 -> RSI = 50
        let mut prices = vec![100.0];
        for i in 0..14 {
            let last = *prices.last().unwrap();
            prices.push(if i % 2 == 0 { last + 1.0 } else { last - 1.0 });
        }
        let value = rsi(&prices, 14).unwrap();
        assert!((value - 50.0).abs() < 1e-9);
    }

    #[test]
    fn test_macd_on_uptrend_is_positive() {
        let prices = ramp(60, 100.0, 0.5);
        let result = macd(&prices).unwrap();
        assert!(result.macd > 0.0);
        assert!(result.previous_histogram.is_some());
        assert!((result.histogram - (result.macd - result.signal)).abs() < 1e-12);
    }

    #[test]
    fn test_macd_degrades_without_signal_history() {
        // 26 points -> a single MACD value, signal falls back to it
        let prices = ramp(26, 100.0, 1.0);
        let result = macd(&prices).unwrap();
        assert_eq!(result.signal, result.macd);
        assert_eq!(result.histogram, 0.0);
        assert_eq!(result.previous_histogram, None);
    }

    #[test]
    fn test_bollinger_band_ordering() {
        for n in 20..50 {
            let bands = bollinger(&zigzag(n), 20, 2.0).unwrap();
            assert!(bands.upper >= bands.middle);
            assert!(bands.middle >= bands.lower);
        }
    }

    #[test]
    fn test_bollinger_flat_series_has_no_percent_b() {
        let bands = bollinger(&[100.0; 20], 20, 2.0).unwrap();
        assert_eq!(bands.upper, bands.lower);
        assert_eq!(bands.percent_b, None);
    }

    #[test]
    fn test_bollinger_percent_b() {
        let mut prices = vec![100.0; 19];
        prices.push(110.0);
        let bands = bollinger(&prices, 20, 2.0).unwrap();
        let pb = bands.percent_b.unwrap();
        assert!((pb - (110.0 - bands.lower) / (bands.upper - bands.lower)).abs() < 1e-12);
        assert!(pb > 0.5);
    }

    #[test]
    fn test_support_resistance_local_extrema() {
        // minima at 95 and 97, maxima at 105 and 108; current 100
        let prices = [
            101.0, 99.0, 95.0, 98.0, 100.0, 103.0, 105.0, 102.0, 101.0, 97.0, 99.0, 104.0, 108.0,
            106.0, 103.0, 100.0,
        ];
        let levels = support_resistance(&prices, 20).unwrap();
        assert_eq!(levels.support, vec![97.0, 95.0]);
        assert_eq!(levels.resistance, vec![105.0, 108.0]);
    }

    #[test]
    fn test_support_resistance_respects_lookback() {
        let mut prices = vec![101.0, 99.0, 90.0, 98.0, 100.0];
        prices.extend(ramp(20, 100.0, 0.1));
        let levels = support_resistance(&prices, 20).unwrap();
        assert!(!levels.support.contains(&90.0));
    }

    #[test]
    fn test_volatility() {
        let v = volatility(&[100.0; 20], 20).unwrap();
        assert_eq!(v.std_dev, 0.0);
        assert_eq!(v.coefficient_of_variation, 0.0);

        let v = volatility(&zigzag(30), 20).unwrap();
        assert!(v.std_dev > 0.0);
        assert!(v.coefficient_of_variation > 0.0);
    }

    #[test]
    fn test_indicator_set_marks_missing_indicators() {
        let set = compute_indicator_set(
            &ramp(10, 100.0, 1.0),
            &IndicatorConfig::default(),
            &TrendConfig::default(),
        );
        assert_eq!(set.points, 10);
        assert!(set.sma.sma5.is_some());
        assert!(set.sma.sma20.is_none());
        assert!(set.rsi.is_none());
        assert!(set.macd.is_none());
        assert!(set.bollinger.is_none());
        assert!(set.trend.is_some());
    }
}
