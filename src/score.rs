//! Scoring policies: the step 1-3 internals of the signal composer.
//!
//! Two policies share the trend/structure/pattern machinery but diverge in
//! confirmation weighting and entry-trigger semantics:
//!
//! - [`ScoringPolicy::LiquidationWeighted`] folds the liquidation heatmap and
//!   a risk/reward filter into the score, treats a weak entry location as a
//!   soft penalty, and clamps confidence to [0, 100].
//! - [`ScoringPolicy::MomentumCrossover`] requires full indicator coverage and
//!   an explicit crossing event on the closed candle (it fires once per
//!   crossing, not continuously), and reports the raw positive sum.

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::IndicatorSeries;
use crate::liquidation::{LiquidationBias, LiquidationScore};
use crate::patterns::{PatternBias, PatternMatch};
use crate::structure::StructureZone;
use crate::{EngineConfig, Side};

/// Which composer policy is active.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ScoringPolicy {
    LiquidationWeighted,
    MomentumCrossover,
}

/// How take-profit levels are derived from entry and volatility.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum TargetScheme {
    /// `entry ± factor × ATR` per level.
    AtrMultiples(Vec<f64>),
    /// `entry ± factor × |entry - stop|` per level.
    RiskFractions(Vec<f64>),
}

// Score deltas. Reason wording next to each use site is display contract.
const TREND_ALIGNED_BONUS: i32 = 30;
const TREND_SPLIT_PENALTY: i32 = 20;
const STRUCTURE_BONUS: i32 = 15;
const LIQUIDATION_ALIGNED_BONUS: i32 = 20;
const LIQUIDATION_NEUTRAL_PENALTY: i32 = 5;
const TREND_STRENGTH_BONUS: i32 = 20;
const EMA_ORDER_BONUS: i32 = 20;
const RSI_BAND_BONUS: i32 = 20;
const VOLUME_BONUS: i32 = 10;
const WEAK_ENTRY_PENALTY: i32 = 10;
const OPPOSING_PATTERN_PENALTY: i32 = 10;
const RR_STRONG_MIN: f64 = 2.0;
const RR_STRONG_BONUS: i32 = 25;
const RR_MODERATE_MIN: f64 = 1.5;
const RR_MODERATE_BONUS: i32 = 10;
const RR_WEAK_PENALTY: i32 = 10;
/// Volatility fallback when ATR is unavailable: 1% of entry price.
const ATR_FALLBACK_PCT: f64 = 0.01;

/// A fully scored decision, ready to be wrapped into a `Signal`.
#[derive(Debug, Clone)]
pub(crate) struct Scored {
    pub side: Side,
    pub confidence: i32,
    pub reasons: Vec<String>,
    pub entry: f64,
    pub stop_loss: f64,
    pub targets: Vec<f64>,
    pub ts: i64,
}

// ============================================================
// LIQUIDATION-WEIGHTED POLICY
// ============================================================

pub(crate) fn liquidation_weighted(
    cfg: &EngineConfig,
    htf: &IndicatorSeries,
    ltf: &IndicatorSeries,
    zone: &StructureZone,
    heat: &LiquidationScore,
    pattern: Option<&PatternMatch>,
) -> Option<Scored> {
    let h = htf.row(htf.len() - 2)?;
    let l = ltf.row(ltf.len() - 2)?;
    // Length-gated series carry these columns unless the pipeline degraded;
    // a degraded pipeline means no signal, never arithmetic on absent values.
    let h_ema_200 = h.ema_200?;
    let l_ema_200 = l.ema_200?;
    let l_ema_20 = l.ema_20?;
    let volatility = h.atr_14?;

    let mut score = 0i32;
    let mut reasons = Vec::new();

    let htf_bull = h.close > h_ema_200;
    let ltf_bull = l.close > l_ema_200;
    let side = if htf_bull && ltf_bull {
        score += TREND_ALIGNED_BONUS;
        reasons.push("Trend Bullish HTF+LTF".to_string());
        Side::Long
    } else if !htf_bull && !ltf_bull {
        score += TREND_ALIGNED_BONUS;
        reasons.push("Trend Bearish HTF+LTF".to_string());
        Side::Short
    } else {
        // Split timeframes: follow the higher one, penalized.
        score -= TREND_SPLIT_PENALTY;
        reasons.push("Trend HTF/LTF Not Aligned".to_string());
        if htf_bull {
            Side::Long
        } else {
            Side::Short
        }
    };

    apply_structure(&mut score, &mut reasons, side, l.close, zone);

    match (side, heat.bias) {
        (Side::Long, LiquidationBias::Bullish) => {
            score += LIQUIDATION_ALIGNED_BONUS;
            reasons.push("Short Liquidation Sweep".to_string());
        }
        (Side::Short, LiquidationBias::Bearish) => {
            score += LIQUIDATION_ALIGNED_BONUS;
            reasons.push("Long Liquidation Sweep".to_string());
        }
        _ => {
            score -= LIQUIDATION_NEUTRAL_PENALTY;
            reasons.push("Liquidation Neutral".to_string());
        }
    }

    apply_trend_strength(&mut score, &mut reasons, cfg, ltf);
    apply_volume(&mut score, &mut reasons, l.volume, l.vol_ma_20);

    // Entry location is a soft filter here: it scores, it never rejects.
    match side {
        Side::Long if l.close > l_ema_20 => reasons.push("Above EMA20".to_string()),
        Side::Short if l.close < l_ema_20 => reasons.push("Below EMA20".to_string()),
        _ => {
            score -= WEAK_ENTRY_PENALTY;
            reasons.push("Weak Entry Area".to_string());
        }
    }

    apply_pattern(&mut score, &mut reasons, side, pattern);

    let entry = l.close;
    let (stop_loss, targets) = risk_levels(side, entry, volatility, cfg);
    let tp1 = targets.first().copied()?;
    let risk = (entry - stop_loss).abs();
    let rr = if risk > 0.0 {
        (tp1 - entry).abs() / risk
    } else {
        0.0
    };
    if rr >= RR_STRONG_MIN {
        score += RR_STRONG_BONUS;
        reasons.push(format!("RR Strong ({rr:.2})"));
    } else if rr >= RR_MODERATE_MIN {
        score += RR_MODERATE_BONUS;
        reasons.push(format!("RR Moderate ({rr:.2})"));
    } else {
        score -= RR_WEAK_PENALTY;
        reasons.push(format!("RR Weak ({rr:.2})"));
    }

    Some(Scored {
        side,
        confidence: score.clamp(0, 100),
        reasons,
        entry,
        stop_loss,
        targets,
        ts: l.ts,
    })
}

// ============================================================
// MOMENTUM-CROSSOVER POLICY
// ============================================================

pub(crate) fn momentum_crossover(
    cfg: &EngineConfig,
    htf: &IndicatorSeries,
    ltf: &IndicatorSeries,
    zone: &StructureZone,
    pattern: Option<&PatternMatch>,
) -> Option<Scored> {
    let h = htf.row(htf.len() - 2)?;
    let l = ltf.row(ltf.len() - 2)?;
    let prev = ltf.row(ltf.len() - 3)?;
    // Hard gate: trend- and trigger-defining values must be present.
    let h_ema_200 = h.ema_200?;
    let l_ema_200 = l.ema_200?;
    let ema_20 = l.ema_20?;
    let ema_50 = l.ema_50?;
    let rsi = l.rsi_14?;
    let prev_ema_20 = prev.ema_20?;
    let prev_ema_50 = prev.ema_50?;

    let htf_bull = h.close > h_ema_200;
    let ltf_bull = l.close > l_ema_200;
    if htf_bull != ltf_bull {
        debug!("timeframe trend disagreement, rejecting");
        return None;
    }

    let mut score = 0i32;
    let mut reasons = Vec::new();
    let side = if htf_bull {
        reasons.push("Trend Bullish HTF+LTF".to_string());
        Side::Long
    } else {
        reasons.push("Trend Bearish HTF+LTF".to_string());
        Side::Short
    };
    score += TREND_ALIGNED_BONUS;

    apply_structure(&mut score, &mut reasons, side, l.close, zone);

    match side {
        Side::Long if ema_20 > ema_50 => {
            score += EMA_ORDER_BONUS;
            reasons.push("EMA20 Above EMA50".to_string());
        }
        Side::Short if ema_20 < ema_50 => {
            score += EMA_ORDER_BONUS;
            reasons.push("EMA20 Below EMA50".to_string());
        }
        _ => {}
    }

    let (band, band_reason) = match side {
        Side::Long => (cfg.rsi_long_band, "RSI Bullish Zone"),
        Side::Short => (cfg.rsi_short_band, "RSI Bearish Zone"),
    };
    if band.0 <= rsi && rsi <= band.1 {
        score += RSI_BAND_BONUS;
        reasons.push(band_reason.to_string());
    }

    apply_trend_strength(&mut score, &mut reasons, cfg, ltf);
    apply_volume(&mut score, &mut reasons, l.volume, l.vol_ma_20);
    apply_pattern(&mut score, &mut reasons, side, pattern);

    // Fire once per crossing event, not continuously while a level holds.
    let trigger = crossing_trigger(
        side,
        prev_ema_20,
        prev_ema_50,
        ema_20,
        ema_50,
        prev.close,
        l.close,
    );
    let Some(trigger) = trigger else {
        debug!(side = ?side, "no crossing event on closed candle, rejecting");
        return None;
    };
    reasons.push(trigger.to_string());

    if score <= 0 {
        return None;
    }

    let entry = l.close;
    let volatility = l.atr_14.unwrap_or(entry * ATR_FALLBACK_PCT);
    let (stop_loss, targets) = risk_levels(side, entry, volatility, cfg);

    Some(Scored {
        side,
        confidence: score,
        reasons,
        entry,
        stop_loss,
        targets,
        ts: l.ts,
    })
}

/// EMA20/EMA50 crossover, or price crossing EMA20, in the bias direction
/// between the prior and current closed candle. EMA crossover wins when both
/// occur on the same candle.
fn crossing_trigger(
    side: Side,
    prev_ema_20: f64,
    prev_ema_50: f64,
    ema_20: f64,
    ema_50: f64,
    prev_close: f64,
    close: f64,
) -> Option<&'static str> {
    match side {
        Side::Long => {
            if prev_ema_20 <= prev_ema_50 && ema_20 > ema_50 {
                Some("EMA Cross Entry")
            } else if prev_close <= prev_ema_20 && close > ema_20 {
                Some("Price Cross Entry")
            } else {
                None
            }
        }
        Side::Short => {
            if prev_ema_20 >= prev_ema_50 && ema_20 < ema_50 {
                Some("EMA Cross Entry")
            } else if prev_close >= prev_ema_20 && close < ema_20 {
                Some("Price Cross Entry")
            } else {
                None
            }
        }
    }
}

// ============================================================
// SHARED CONFIRMATIONS
// ============================================================

fn apply_structure(
    score: &mut i32,
    reasons: &mut Vec<String>,
    side: Side,
    close: f64,
    zone: &StructureZone,
) {
    match side {
        Side::Long if close > zone.low => {
            *score += STRUCTURE_BONUS;
            reasons.push("Bullish Structure".to_string());
        }
        Side::Short if close < zone.high => {
            *score += STRUCTURE_BONUS;
            reasons.push("Bearish Structure".to_string());
        }
        _ => {}
    }
}

fn apply_trend_strength(
    score: &mut i32,
    reasons: &mut Vec<String>,
    cfg: &EngineConfig,
    ltf: &IndicatorSeries,
) {
    // Missing ADX reads as the neutral 0: the gate simply fails.
    if ltf.adx_or_zero(ltf.len() - 2) > cfg.adx_threshold {
        *score += TREND_STRENGTH_BONUS;
        reasons.push("ADX Strong Trend".to_string());
    }
}

fn apply_volume(score: &mut i32, reasons: &mut Vec<String>, volume: f64, vol_ma: Option<f64>) {
    if let Some(baseline) = vol_ma {
        if volume > baseline {
            *score += VOLUME_BONUS;
            reasons.push("Volume Above Average".to_string());
        }
    }
}

fn apply_pattern(
    score: &mut i32,
    reasons: &mut Vec<String>,
    side: Side,
    pattern: Option<&PatternMatch>,
) {
    let Some(p) = pattern else { return };
    let aligned = matches!(
        (side, p.bias),
        (Side::Long, PatternBias::Long) | (Side::Short, PatternBias::Short)
    );
    if aligned {
        *score += p.weight;
        reasons.push(format!("Candle Pattern: {}", p.name));
    } else if p.bias == PatternBias::Neutral {
        *score += p.weight;
        reasons.push(format!("Candle Pattern: {} (Indecision)", p.name));
    } else {
        *score -= OPPOSING_PATTERN_PENALTY;
        reasons.push(format!("Candle Pattern Against Bias: {}", p.name));
    }
}

/// Stop and targets around the entry; all arithmetic mirrors the bias
/// direction.
fn risk_levels(side: Side, entry: f64, volatility: f64, cfg: &EngineConfig) -> (f64, Vec<f64>) {
    let dir = match side {
        Side::Long => 1.0,
        Side::Short => -1.0,
    };
    let stop = entry - dir * volatility * cfg.stop_atr_mult;
    let targets = match &cfg.targets {
        TargetScheme::AtrMultiples(factors) => factors
            .iter()
            .map(|f| entry + dir * volatility * f)
            .collect(),
        TargetScheme::RiskFractions(factors) => {
            let risk = (entry - stop).abs();
            factors.iter().map(|f| entry + dir * risk * f).collect()
        }
    };
    (stop, targets)
}

// ============================================================
// TESTS
// ============================================================
