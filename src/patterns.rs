//! Candlestick pattern matcher over the last two fully closed candles.
//!
//! Unlike a full per-bar pattern scan, signal composition only cares about the
//! shape of the candle that just closed: the checks are ordered and mutually
//! exclusive, first match wins.

use serde::{Deserialize, Serialize};

use crate::{Ohlcv, OhlcvExt, Ratio, Result, SignalError};

/// Directional reading of a matched pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PatternBias {
    Long,
    Short,
    Neutral,
}

/// A matched candlestick pattern with its signed score weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct PatternMatch {
    pub name: &'static str,
    pub bias: PatternBias,
    pub weight: i32,
}

const ENGULFING_WEIGHT: i32 = 15;
const WICK_REVERSAL_WEIGHT: i32 = 10;
const DOJI_WEIGHT: i32 = -5;

/// Matcher over the last closed candle and the one before it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PatternMatcher {
    /// Wick must exceed this multiple of the body for Hammer / Shooting Star.
    pub wick_factor: f64,
    /// Body-to-range ratio below which a candle reads as a Doji.
    pub doji_body_ratio: Ratio,
}

impl Default for PatternMatcher {
    fn default() -> Self {
        Self {
            wick_factor: 2.0,
            doji_body_ratio: Ratio::new_const(0.1),
        }
    }
}

impl PatternMatcher {
    pub fn validate_config(&self) -> Result<()> {
        if !self.wick_factor.is_finite() || self.wick_factor <= 0.0 {
            return Err(SignalError::InvalidValue(
                "wick_factor must be finite and > 0",
            ));
        }
        Ok(())
    }

    /// Classify the last fully closed candle (`len - 2`) against the prior
    /// one (`len - 3`).
    ///
    /// Returns `None` with fewer than 3 candles or when the closed candle has
    /// zero high-low range (degenerate geometry, no divide-by-zero).
    pub fn detect<T: Ohlcv>(&self, bars: &[T]) -> Option<PatternMatch> {
        if bars.len() < 3 {
            return None;
        }
        let curr = &bars[bars.len() - 2];
        let prior = &bars[bars.len() - 3];

        let range = curr.range();
        if range <= 0.0 {
            return None;
        }
        let body = curr.body();
        let upper = curr.upper_wick();
        let lower = curr.lower_wick();

        if prior.is_bearish()
            && curr.is_bullish()
            && curr.close() > prior.open()
            && curr.open() < prior.close()
        {
            return Some(PatternMatch {
                name: "Bullish Engulfing",
                bias: PatternBias::Long,
                weight: ENGULFING_WEIGHT,
            });
        }

        if prior.is_bullish()
            && curr.is_bearish()
            && curr.open() > prior.close()
            && curr.close() < prior.open()
        {
            return Some(PatternMatch {
                name: "Bearish Engulfing",
                bias: PatternBias::Short,
                weight: ENGULFING_WEIGHT,
            });
        }

        if lower > body * self.wick_factor && upper < body {
            return Some(PatternMatch {
                name: "Hammer",
                bias: PatternBias::Long,
                weight: WICK_REVERSAL_WEIGHT,
            });
        }

        if upper > body * self.wick_factor && lower < body {
            return Some(PatternMatch {
                name: "Shooting Star",
                bias: PatternBias::Short,
                weight: WICK_REVERSAL_WEIGHT,
            });
        }

        if body / range < self.doji_body_ratio.get() {
            return Some(PatternMatch {
                name: "Doji",
                bias: PatternBias::Neutral,
                weight: DOJI_WEIGHT,
            });
        }

        None
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    fn candle(o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle::new(0, o, h, l, c, 1000.0)
    }

    /// Pads a [prior, current] pair into a 3-candle series whose last entry is
    /// the still-open candle the matcher must ignore.
    fn series(prior: Candle, current: Candle) -> Vec<Candle> {
        vec![prior, current, candle(1.0, 1.0, 1.0, 1.0)]
    }

    #[test]
    fn test_bullish_engulfing_literal() {
        let prior = candle(10.0, 10.1, 8.9, 9.0);
        let current = candle(8.5, 10.6, 8.4, 10.5);
        let m = PatternMatcher::default()
            .detect(&series(prior, current))
            .unwrap();
        assert_eq!(m.name, "Bullish Engulfing");
        assert_eq!(m.bias, PatternBias::Long);
        assert_eq!(m.weight, 15);
    }

    #[test]
    fn test_bearish_engulfing() {
        let prior = candle(9.0, 10.2, 8.9, 10.0);
        let current = candle(10.5, 10.6, 8.4, 8.5);
        let m = PatternMatcher::default()
            .detect(&series(prior, current))
            .unwrap();
        assert_eq!(m.name, "Bearish Engulfing");
        assert_eq!(m.bias, PatternBias::Short);
        assert_eq!(m.weight, 15);
    }

    #[test]
    fn test_hammer() {
        // Small body at the top, lower wick more than twice the body.
        let prior = candle(10.0, 10.3, 9.8, 10.1);
        let current = candle(10.0, 10.25, 9.0, 10.2);
        let m = PatternMatcher::default()
            .detect(&series(prior, current))
            .unwrap();
        assert_eq!(m.name, "Hammer");
        assert_eq!(m.bias, PatternBias::Long);
        assert_eq!(m.weight, 10);
    }

    #[test]
    fn test_shooting_star() {
        let prior = candle(10.0, 10.3, 9.8, 10.1);
        let current = candle(10.2, 11.2, 9.95, 10.0);
        let m = PatternMatcher::default()
            .detect(&series(prior, current))
            .unwrap();
        assert_eq!(m.name, "Shooting Star");
        assert_eq!(m.bias, PatternBias::Short);
        assert_eq!(m.weight, 10);
    }

    #[test]
    fn test_doji_and_exclusivity() {
        // Near-equal open/close with wide balanced wicks: only Doji may fire.
        let prior = candle(10.0, 10.3, 9.8, 10.1);
        let current = candle(10.0, 11.0, 9.0, 10.05);
        let m = PatternMatcher::default()
            .detect(&series(prior, current))
            .unwrap();
        assert_eq!(m.name, "Doji");
        assert_eq!(m.bias, PatternBias::Neutral);
        assert_eq!(m.weight, -5);
    }

    #[test]
    fn test_engulfing_wins_over_hammer() {
        // Current candle satisfies both engulfing and hammer geometry; the
        // ordered check reports the engulfing.
        let prior = candle(10.0, 10.05, 9.85, 9.9);
        let current = candle(9.8, 10.25, 8.0, 10.2);
        let m = PatternMatcher::default()
            .detect(&series(prior, current))
            .unwrap();
        assert_eq!(m.name, "Bullish Engulfing");
    }

    #[test]
    fn test_zero_range_is_no_pattern() {
        let prior = candle(10.0, 10.3, 9.8, 10.1);
        let current = candle(10.0, 10.0, 10.0, 10.0);
        assert!(PatternMatcher::default()
            .detect(&series(prior, current))
            .is_none());
    }

    #[test]
    fn test_too_few_candles_is_no_pattern() {
        let bars = vec![candle(10.0, 10.3, 9.8, 10.1), candle(10.0, 10.3, 9.8, 10.2)];
        assert!(PatternMatcher::default().detect(&bars).is_none());
    }

    #[test]
    fn test_plain_candle_is_no_pattern() {
        let prior = candle(10.0, 10.6, 9.9, 10.5);
        let current = candle(10.5, 11.1, 10.4, 11.0);
        assert!(PatternMatcher::default()
            .detect(&series(prior, current))
            .is_none());
    }

    #[test]
    fn test_matcher_config_validation() {
        let mut matcher = PatternMatcher::default();
        assert!(matcher.validate_config().is_ok());
        matcher.wick_factor = 0.0;
        assert!(matcher.validate_config().is_err());
        matcher.wick_factor = f64::NAN;
        assert!(matcher.validate_config().is_err());
    }
}
