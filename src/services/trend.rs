//! Streak/momentum trend classifier
//!
//! Heuristic, not statistical: every threshold comes from [`TrendConfig`].

use crate::config::TrendConfig;
use crate::models::analysis::{Trend, TrendAnalysis, TrendLevel};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Move {
    Up,
    Flat,
    Down,
}

/// Longest consecutive run of `target` moves and the summed change across it
fn longest_streak(moves: &[Move], changes: &[f64], target: Move) -> (usize, f64) {
    let (mut best, mut best_change) = (0, 0.0);
    let (mut run, mut run_change) = (0, 0.0);

    for (m, change) in moves.iter().zip(changes) {
        if *m == target {
            run += 1;
            run_change += change;
            // ties go to the more recent run
            if run >= best {
                best = run;
                best_change = run_change;
            }
        } else {
            run = 0;
            run_change = 0.0;
        }
    }

    (best, best_change)
}

fn level_for(change_pct: f64, thresholds: &[f64; 3]) -> TrendLevel {
    let magnitude = change_pct.abs();
    let tier = thresholds.iter().filter(|t| magnitude >= **t).count();
    match (tier, change_pct >= 0.0) {
        (0, _) => TrendLevel::Neutral,
        (1, true) => TrendLevel::Bullish,
        (2, true) => TrendLevel::StrongBullish,
        (_, true) => TrendLevel::ExtremeBullish,
        (1, false) => TrendLevel::Bearish,
        (2, false) => TrendLevel::StrongBearish,
        (_, false) => TrendLevel::ExtremeBearish,
    }
}

/// Classify the trend of a chronologically ordered series; needs at least two points
pub fn classify_trend(prices: &[f64], config: &TrendConfig) -> Option<TrendAnalysis> {
    if prices.len() < 2 {
        return None;
    }

    let changes: Vec<f64> = prices
        .windows(2)
        .map(|w| {
            if w[0] == 0.0 {
                0.0
            } else {
                (w[1] - w[0]) / w[0] * 100.0
            }
        })
        .collect();
    if changes.iter().any(|c| !c.is_finite()) {
        return None;
    }

    let moves: Vec<Move> = changes
        .iter()
        .map(|c| {
            if *c > config.change_threshold_pct {
                Move::Up
            } else if *c < -config.change_threshold_pct {
                Move::Down
            } else {
                Move::Flat
            }
        })
        .collect();

    let recent_start = moves.len().saturating_sub(config.lookback.max(1));
    let recent = &moves[recent_start..];
    let up_periods = recent.iter().filter(|m| **m == Move::Up).count();
    let down_periods = recent.iter().filter(|m| **m == Move::Down).count();

    let extended_start = moves.len().saturating_sub(config.extended_lookback.max(1));
    let (up_streak, up_change) =
        longest_streak(&moves[extended_start..], &changes[extended_start..], Move::Up);
    let (down_streak, down_change) =
        longest_streak(&moves[extended_start..], &changes[extended_start..], Move::Down);

    let trend = if up_streak >= config.confirm_streak
        && up_periods >= config.min_directional_periods
        && up_periods > down_periods
    {
        Trend::Up
    } else if down_streak >= config.confirm_streak
        && down_periods >= config.min_directional_periods
        && down_periods > up_periods
    {
        Trend::Down
    } else if up_periods > down_periods {
        Trend::WeakUp
    } else if down_periods > up_periods {
        Trend::WeakDown
    } else {
        Trend::Sideways
    };

    let (streak, streak_change_pct) = match trend {
        Trend::Up | Trend::WeakUp => (up_streak, up_change),
        Trend::Down | Trend::WeakDown => (down_streak, down_change),
        Trend::Sideways if up_streak >= down_streak => (up_streak, up_change),
        Trend::Sideways => (down_streak, down_change),
    };

    let level = level_for(streak_change_pct, &config.level_thresholds);

    let streak_part = if config.confirm_streak == 0 {
        1.0
    } else {
        streak as f64 / (config.confirm_streak as f64 * 2.0)
    };
    let top_threshold = config.level_thresholds[2];
    let change_part = if top_threshold > 0.0 {
        streak_change_pct.abs() / top_threshold
    } else {
        1.0
    };
    let confidence = (streak_part * 0.5 + change_part * 0.5).min(1.0);

    Some(TrendAnalysis {
        trend,
        level,
        strength: streak_change_pct.abs(),
        confidence,
        up_streak,
        down_streak,
        up_periods,
        down_periods,
        streak_change_pct,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn classify(prices: &[f64]) -> TrendAnalysis {
        classify_trend(prices, &TrendConfig::default()).unwrap()
    }

    #[test]
    fn test_rising_series_is_up() {
        let result = classify(&[100.0, 102.0, 104.0, 106.0, 108.0]);
        assert_eq!(result.trend, Trend::Up);
        assert_eq!(result.up_streak, 4);
        assert_eq!(result.down_streak, 0);
        assert!(result.level.is_bullish());
        assert!(result.confidence > 0.0 && result.confidence <= 1.0);
    }

    #[test]
    fn test_falling_series_is_down() {
        let result = classify(&[108.0, 106.0, 104.0, 102.0, 100.0]);
        assert_eq!(result.trend, Trend::Down);
        assert!(result.level.is_bearish());
        assert!(result.streak_change_pct < 0.0);
    }

    #[test]
    fn test_small_moves_are_sideways() {
        let result = classify(&[100.0, 100.1, 100.0, 100.1, 100.0, 100.1]);
        assert_eq!(result.trend, Trend::Sideways);
        assert_eq!(result.level, TrendLevel::Neutral);
        assert_eq!(result.confidence, 0.0);
    }

    #[test]
    fn test_short_streak_is_weak() {
        // two up moves then flat: not enough for confirmation
        let result = classify(&[100.0, 101.0, 102.0, 102.0, 102.0]);
        assert_eq!(result.trend, Trend::WeakUp);
    }

    #[test]
    fn test_level_tiers() {
        let thresholds = [0.5, 1.0, 2.0];
        assert_eq!(level_for(0.2, &thresholds), TrendLevel::Neutral);
        assert_eq!(level_for(0.7, &thresholds), TrendLevel::Bullish);
        assert_eq!(level_for(1.5, &thresholds), TrendLevel::StrongBullish);
        assert_eq!(level_for(-2.5, &thresholds), TrendLevel::ExtremeBearish);
    }

    #[test]
    fn test_confidence_capped_at_one() {
        let prices: Vec<f64> = (0..20).map(|i| 100.0 * 1.05f64.powi(i)).collect();
        let result = classify(&prices);
        assert_eq!(result.confidence, 1.0);
        assert_eq!(result.level, TrendLevel::ExtremeBullish);
    }

    #[test]
    fn test_needs_two_points() {
        assert!(classify_trend(&[100.0], &TrendConfig::default()).is_none());
    }
}
