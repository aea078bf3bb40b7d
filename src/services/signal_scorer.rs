//! Weighted buy/sell scoring over an [`IndicatorSet`]
//!
//! Unavailable indicators (`None`) never vote. Every vote is recorded with
//! its raw value and a rationale so alerts can show why a call was made.

use crate::config::SignalWeights;
use crate::models::analysis::{
    IndicatorSet, Recommendation, RiskLevel, Signal, SignalSide, SignalSource, Trend,
    TradingSignal,
};

/// Signal count at which the count component of confidence saturates
const CONFIDENCE_SATURATION: usize = 5;

struct Ballot {
    signals: Vec<Signal>,
}

impl Ballot {
    fn vote(
        &mut self,
        indicator: SignalSource,
        side: SignalSide,
        weight: f64,
        value: f64,
        reason: String,
    ) {
        self.signals.push(Signal {
            indicator,
            side,
            weight,
            value,
            reason,
        });
    }

    fn score(&self, side: SignalSide) -> f64 {
        self.signals
            .iter()
            .filter(|s| s.side == side)
            .map(|s| s.weight)
            .sum()
    }
}

fn score_rsi(ballot: &mut Ballot, indicators: &IndicatorSet, w: &SignalWeights) {
    let Some(rsi) = indicators.rsi else { return };

    if rsi < w.rsi_extreme_oversold {
        ballot.vote(
            SignalSource::Rsi,
            SignalSide::Buy,
            w.rsi_extreme_weight,
            rsi,
            format!("RSI {:.1} is extremely oversold (< {})", rsi, w.rsi_extreme_oversold),
        );
    } else if rsi < w.rsi_oversold {
        ballot.vote(
            SignalSource::Rsi,
            SignalSide::Buy,
            w.rsi_weight,
            rsi,
            format!("RSI {:.1} is oversold (< {})", rsi, w.rsi_oversold),
        );
    } else if rsi > w.rsi_extreme_overbought {
        ballot.vote(
            SignalSource::Rsi,
            SignalSide::Sell,
            w.rsi_extreme_weight,
            rsi,
            format!("RSI {:.1} is extremely overbought (> {})", rsi, w.rsi_extreme_overbought),
        );
    } else if rsi > w.rsi_overbought {
        ballot.vote(
            SignalSource::Rsi,
            SignalSide::Sell,
            w.rsi_weight,
            rsi,
            format!("RSI {:.1} is overbought (> {})", rsi, w.rsi_overbought),
        );
    }
}

fn score_macd(ballot: &mut Ballot, indicators: &IndicatorSet, w: &SignalWeights) {
    let Some(macd) = indicators.macd else { return };

    let widening = macd
        .previous_histogram
        .is_some_and(|prev| macd.histogram.abs() > prev.abs() && macd.histogram * prev >= 0.0);
    let weight = if widening {
        w.macd_weight + w.macd_momentum_boost
    } else {
        w.macd_weight
    };
    let momentum = if widening { ", momentum building" } else { "" };

    if macd.histogram > 0.0 && macd.macd > macd.signal {
        ballot.vote(
            SignalSource::Macd,
            SignalSide::Buy,
            weight,
            macd.histogram,
            format!(
                "MACD {:.3} above signal {:.3} (golden cross){}",
                macd.macd, macd.signal, momentum
            ),
        );
    } else if macd.histogram < 0.0 && macd.macd < macd.signal {
        ballot.vote(
            SignalSource::Macd,
            SignalSide::Sell,
            weight,
            macd.histogram,
            format!(
                "MACD {:.3} below signal {:.3} (death cross){}",
                macd.macd, macd.signal, momentum
            ),
        );
    }
}

fn score_bollinger(
    ballot: &mut Ballot,
    price: f64,
    indicators: &IndicatorSet,
    w: &SignalWeights,
) {
    let Some(bands) = indicators.bollinger else { return };
    // collapsed bands carry no location information
    if bands.upper <= bands.lower {
        return;
    }

    let proximity = w.bollinger_proximity_pct / 100.0;
    let percent_b = bands.percent_b.unwrap_or(0.5);

    if price <= bands.lower * (1.0 + proximity) || percent_b < 0.0 {
        ballot.vote(
            SignalSource::Bollinger,
            SignalSide::Buy,
            w.bollinger_weight,
            percent_b,
            format!(
                "Price {:.2} at lower band {:.2} (%B {:.2})",
                price, bands.lower, percent_b
            ),
        );
    } else if price >= bands.upper * (1.0 - proximity) || percent_b > 1.0 {
        ballot.vote(
            SignalSource::Bollinger,
            SignalSide::Sell,
            w.bollinger_weight,
            percent_b,
            format!(
                "Price {:.2} at upper band {:.2} (%B {:.2})",
                price, bands.upper, percent_b
            ),
        );
    }
}

fn score_support_resistance(
    ballot: &mut Ballot,
    price: f64,
    indicators: &IndicatorSet,
    w: &SignalWeights,
) {
    let Some(levels) = indicators.support_resistance.as_ref() else { return };

    let near_support = levels
        .support
        .iter()
        .find(|s| **s > 0.0 && price >= **s && (price - **s) / **s * 100.0 <= w.support_resistance_proximity_pct);
    if let Some(support) = near_support {
        ballot.vote(
            SignalSource::SupportResistance,
            SignalSide::Buy,
            w.support_resistance_weight,
            *support,
            format!(
                "Price {:.2} within {}% above support {:.2}",
                price, w.support_resistance_proximity_pct, support
            ),
        );
    }

    let near_resistance = levels
        .resistance
        .iter()
        .find(|r| **r > 0.0 && price <= **r && (**r - price) / **r * 100.0 <= w.support_resistance_proximity_pct);
    if let Some(resistance) = near_resistance {
        ballot.vote(
            SignalSource::SupportResistance,
            SignalSide::Sell,
            w.support_resistance_weight,
            *resistance,
            format!(
                "Price {:.2} within {}% below resistance {:.2}",
                price, w.support_resistance_proximity_pct, resistance
            ),
        );
    }
}

/// Contrarian: a confirmed downtrend votes buy, a confirmed uptrend votes sell
fn score_trend(ballot: &mut Ballot, indicators: &IndicatorSet, w: &SignalWeights) {
    let Some(trend) = indicators.trend else { return };
    let tier = trend.level.tier();
    if tier == 0 {
        return;
    }
    let weight = w.trend_weights[(tier as usize - 1).min(2)];

    match trend.trend {
        Trend::Down if trend.level.is_bearish() => ballot.vote(
            SignalSource::Trend,
            SignalSide::Buy,
            weight,
            trend.streak_change_pct,
            format!(
                "Confirmed downtrend ({} periods, {:.2}%), mean reversion expected",
                trend.down_streak, trend.streak_change_pct
            ),
        ),
        Trend::Up if trend.level.is_bullish() => ballot.vote(
            SignalSource::Trend,
            SignalSide::Sell,
            weight,
            trend.streak_change_pct,
            format!(
                "Confirmed uptrend ({} periods, +{:.2}%), pullback risk",
                trend.up_streak, trend.streak_change_pct
            ),
        ),
        _ => {}
    }
}

fn score_price_change(ballot: &mut Ballot, indicators: &IndicatorSet, w: &SignalWeights) {
    let Some(change) = indicators.last_change_pct else { return };

    if change <= -w.price_change_threshold_pct {
        ballot.vote(
            SignalSource::PriceChange,
            SignalSide::Buy,
            w.price_change_weight,
            change,
            format!("Sharp drop of {:.2}% in the last period", change),
        );
    } else if change >= w.price_change_threshold_pct {
        ballot.vote(
            SignalSource::PriceChange,
            SignalSide::Sell,
            w.price_change_weight,
            change,
            format!("Sharp rise of +{:.2}% in the last period", change),
        );
    }
}

fn recommend(buy: f64, sell: f64, w: &SignalWeights) -> Recommendation {
    if buy >= w.strong_buy_threshold && buy > w.strong_dominance_ratio * sell {
        Recommendation::StrongBuy
    } else if buy >= w.buy_threshold && buy > sell {
        Recommendation::Buy
    } else if sell >= w.strong_sell_threshold && sell > w.strong_dominance_ratio * buy {
        Recommendation::StrongSell
    } else if sell >= w.sell_threshold && sell > buy {
        Recommendation::Sell
    } else {
        Recommendation::Hold
    }
}

/// 0..=100 from how many signals fired, how much they agree and how heavy they are
fn confidence(signals: &[Signal], indicators: &IndicatorSet, w: &SignalWeights) -> f64 {
    if signals.is_empty() {
        return 0.0;
    }

    let count = signals.len().min(CONFIDENCE_SATURATION) as f64 / CONFIDENCE_SATURATION as f64;

    let buys = signals.iter().filter(|s| s.side == SignalSide::Buy).count();
    let agreement = buys.max(signals.len() - buys) as f64 / signals.len() as f64;

    let heaviest = w
        .rsi_extreme_weight
        .max(w.macd_weight + w.macd_momentum_boost)
        .max(w.trend_weights[2])
        .max(f64::EPSILON);
    let mean_weight = signals.iter().map(|s| s.weight).sum::<f64>() / signals.len() as f64;
    let strength = (mean_weight / heaviest).min(1.0);

    let mut confidence = count * 50.0 + agreement * 30.0 + strength * 20.0;

    if let Some(vol) = indicators.volatility {
        if vol.coefficient_of_variation > w.volatility_threshold_pct {
            confidence *= w.volatility_confidence_factor;
        }
    }

    confidence.clamp(0.0, 100.0)
}

fn risk_level(indicators: &IndicatorSet, w: &SignalWeights) -> RiskLevel {
    match indicators.volatility {
        Some(vol) if vol.coefficient_of_variation > w.volatility_threshold_pct => RiskLevel::High,
        Some(vol) if vol.coefficient_of_variation > w.volatility_threshold_pct / 2.0 => {
            RiskLevel::Medium
        }
        Some(_) => RiskLevel::Low,
        None => RiskLevel::Medium,
    }
}

/// Score one market's indicators at `price`
pub fn score(price: f64, indicators: &IndicatorSet, weights: &SignalWeights) -> TradingSignal {
    let mut ballot = Ballot { signals: Vec::new() };

    score_rsi(&mut ballot, indicators, weights);
    score_macd(&mut ballot, indicators, weights);
    score_bollinger(&mut ballot, price, indicators, weights);
    score_support_resistance(&mut ballot, price, indicators, weights);
    score_trend(&mut ballot, indicators, weights);
    score_price_change(&mut ballot, indicators, weights);

    let buy_score = ballot.score(SignalSide::Buy);
    let sell_score = ballot.score(SignalSide::Sell);
    let recommendation = recommend(buy_score, sell_score, weights);

    TradingSignal {
        confidence: confidence(&ballot.signals, indicators, weights),
        risk_level: risk_level(indicators, weights),
        signals: ballot.signals,
        buy_score,
        sell_score,
        net_score: buy_score - sell_score,
        recommendation,
        is_buy_signal: matches!(
            recommendation,
            Recommendation::Buy | Recommendation::StrongBuy
        ),
        is_strong_signal: matches!(
            recommendation,
            Recommendation::StrongBuy | Recommendation::StrongSell
        ),
    }
}
