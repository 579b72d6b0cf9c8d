//! # YATSE - Yet Another Trade Signal Engine
//!
//! Bounded-confidence directional trade signals from two-timeframe candle data.
//!
//! The engine annotates candle series with standard indicators, reads the
//! higher-timeframe structure zone, scores liquidation pressure, classifies the
//! last closed candlestick, and fuses everything into a weighted confidence
//! score with entry, stop-loss and take-profit levels.
//!
//! ## Quick Start
//!
//! ```rust
//! use yatse::prelude::*;
//!
//! let engine = EngineBuilder::new()
//!     .policy(ScoringPolicy::LiquidationWeighted)
//!     .build()
//!     .unwrap();
//!
//! let candles: Vec<Candle> = vec![];
//! let htf = engine.annotate(candles.clone());
//! let ltf = engine.annotate(candles);
//!
//! // Too short a series is "insufficient data", never an error.
//! assert!(engine.evaluate("BTCUSDT", &htf, &ltf, &[]).is_none());
//! ```
//!
//! The engine is a pure function of its inputs: it holds configuration but no
//! market state. Cross-evaluation memory (suppressing a second signal for the
//! same closed candle) belongs to the caller via [`SignalLedger`].

pub mod indicators;
pub mod liquidation;
pub mod patterns;
pub mod score;
pub mod structure;

pub mod prelude {
    pub use crate::{
        // Components
        indicators::{IndicatorRow, IndicatorSeries},
        liquidation::{LiquidationBias, LiquidationEvent, LiquidationScore, OrderSide},
        patterns::{PatternBias, PatternMatch, PatternMatcher},
        // Parallel
        scan_accepted,
        scan_parallel,
        score::{ScoringPolicy, TargetScheme},
        structure::StructureZone,
        // Types
        Candle,
        // Engine
        EngineBuilder,
        EngineConfig,
        Ohlcv,
        OhlcvExt,
        Period,
        Ratio,
        Result,
        ScanInput,
        Side,
        Signal,
        SignalEngine,
        // Errors
        SignalError,
        SignalLedger,
    };
}

use std::collections::HashMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::indicators::IndicatorSeries;
use crate::liquidation::{LiquidationEvent, LiquidationScore};
use crate::patterns::PatternMatcher;
use crate::score::{ScoringPolicy, TargetScheme};
use crate::structure::StructureZone;

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, SignalError>;

/// Errors that can occur while constructing or validating an engine.
///
/// Evaluation itself never fails: bad market data degrades to "no signal" or a
/// neutral sub-score so one instrument can never abort a whole scan.
#[derive(Debug, Clone, thiserror::Error)]
pub enum SignalError {
    #[error("Invalid value: {0}")]
    InvalidValue(&'static str),

    #[error("{field} = {value} out of range [{min}, {max}]")]
    OutOfRange {
        field: &'static str,
        value: f64,
        min: f64,
        max: f64,
    },

    #[error("Invalid config: {0}")]
    InvalidConfig(String),

    #[error("Invalid candle at index {index}: {reason}")]
    InvalidCandle { index: usize, reason: &'static str },
}

// ============================================================
// VALIDATED TYPES
// ============================================================

/// Normalized value in range 0.0..=1.0
#[derive(Debug, Clone, Copy, PartialEq, PartialOrd)]
pub struct Ratio(f64);

impl Ratio {
    /// Create a new Ratio, validating the value is in [0.0, 1.0]
    pub fn new(value: f64) -> Result<Self> {
        if value.is_nan() || value.is_infinite() {
            return Err(SignalError::InvalidValue("Ratio cannot be NaN or infinite"));
        }
        if !(0.0..=1.0).contains(&value) {
            return Err(SignalError::OutOfRange {
                field: "Ratio",
                value,
                min: 0.0,
                max: 1.0,
            });
        }
        Ok(Self(value))
    }

    /// Create a Ratio from a compile-time constant (library internal use)
    #[doc(hidden)]
    pub const fn new_const(value: f64) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> f64 {
        self.0
    }
}

impl Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Period (must be > 0)
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Period(usize);

impl Period {
    /// Create a new Period, validating value is > 0
    pub fn new(value: usize) -> Result<Self> {
        if value == 0 {
            return Err(SignalError::InvalidValue("Period must be > 0"));
        }
        Ok(Self(value))
    }

    #[doc(hidden)]
    pub const fn new_const(value: usize) -> Self {
        Self(value)
    }

    #[inline]
    pub fn get(self) -> usize {
        self.0
    }
}

impl Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV data trait
pub trait Ohlcv {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;
}

/// Extension trait with computed properties for OHLCV data
pub trait OhlcvExt: Ohlcv {
    #[inline]
    fn body(&self) -> f64 {
        (self.close() - self.open()).abs()
    }

    #[inline]
    fn range(&self) -> f64 {
        self.high() - self.low()
    }

    #[inline]
    fn upper_wick(&self) -> f64 {
        self.high() - self.open().max(self.close())
    }

    #[inline]
    fn lower_wick(&self) -> f64 {
        self.open().min(self.close()) - self.low()
    }

    #[inline]
    fn is_bullish(&self) -> bool {
        self.close() > self.open()
    }

    #[inline]
    fn is_bearish(&self) -> bool {
        self.close() < self.open()
    }

    /// Body as ratio of range. Returns None if range ≈ 0
    #[inline]
    fn body_ratio(&self) -> Option<f64> {
        let range = self.range();
        (range > f64::EPSILON).then(|| self.body() / range)
    }

    /// Validate OHLCV data consistency
    fn validate(&self) -> Result<()> {
        if self.high() < self.low() {
            return Err(SignalError::InvalidCandle {
                index: 0,
                reason: "high < low",
            });
        }
        if self.open().is_nan()
            || self.high().is_nan()
            || self.low().is_nan()
            || self.close().is_nan()
        {
            return Err(SignalError::InvalidCandle {
                index: 0,
                reason: "NaN in OHLCV",
            });
        }
        if self.open().is_infinite()
            || self.high().is_infinite()
            || self.low().is_infinite()
            || self.close().is_infinite()
        {
            return Err(SignalError::InvalidCandle {
                index: 0,
                reason: "Infinite value in OHLCV",
            });
        }
        Ok(())
    }
}

impl<T: Ohlcv> OhlcvExt for T {}

// ============================================================
// CANDLE
// ============================================================

/// One price candle. `ts` is the candle open time in epoch milliseconds.
///
/// Series are ordered strictly increasing by `ts` and never gap-repaired: the
/// engine works purely by index position. The most recent entry is assumed
/// still open and is excluded from every decision; `len-2` is the last fully
/// closed candle and `len-3` the one before it.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Candle {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(ts: i64, open: f64, high: f64, low: f64, close: f64, volume: f64) -> Self {
        Self {
            ts,
            open,
            high,
            low,
            close,
            volume,
        }
    }
}

impl Ohlcv for Candle {
    fn open(&self) -> f64 {
        self.open
    }

    fn high(&self) -> f64 {
        self.high
    }

    fn low(&self) -> f64 {
        self.low
    }

    fn close(&self) -> f64 {
        self.close
    }

    fn volume(&self) -> f64 {
        self.volume
    }
}

// ============================================================
// SIGNAL
// ============================================================

/// Directional hypothesis a signal is built around.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum Side {
    Long,
    Short,
}

/// The engine's sole output artifact.
///
/// Created once per evaluation, immutable, and handed to the caller. The
/// caller de-duplicates repeated evaluations of the same closed candle via
/// `ts` (see [`SignalLedger`]) and owns any persistence.
///
/// `reasons` preserves append order; the wording of each entry is part of the
/// contract consumed by downstream alerting layers.
#[derive(Debug, Clone, Serialize)]
pub struct Signal {
    pub symbol: String,
    pub side: Side,
    /// Composite heuristic score. Clamped to [0, 100] under the
    /// liquidation-weighted policy; the momentum policy reports the raw
    /// positive sum.
    pub confidence: i32,
    pub entry: f64,
    pub stop_loss: f64,
    /// One or more take-profit levels, ordered nearest first.
    pub targets: Vec<f64>,
    pub reasons: Vec<String>,
    /// Open time of the triggering (last fully closed) lower-timeframe candle.
    pub ts: i64,
    pub structure: StructureZone,
    pub liquidation: LiquidationScore,
    pub pattern: Option<&'static str>,
}

// ============================================================
// ENGINE CONFIG
// ============================================================

/// Engine configuration.
///
/// An explicit value owned by the engine; the surrounding service layer owns
/// its lifecycle and any update mechanism. Serializable so callers can load it
/// from a file or patch it over a command surface.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    pub policy: ScoringPolicy,
    /// Hard gate: both series need at least this many candles.
    pub min_candles: usize,
    pub structure_lookback: Period,
    pub adx_threshold: f64,
    /// Inclusive RSI band confirming a long bias (momentum policy).
    pub rsi_long_band: (f64, f64),
    /// Inclusive RSI band confirming a short bias (momentum policy).
    pub rsi_short_band: (f64, f64),
    /// Stop distance as a multiple of the volatility measure.
    pub stop_atr_mult: f64,
    pub targets: TargetScheme,
    /// Acceptance threshold applied by [`scan_accepted`], not by `evaluate`.
    pub min_confidence: i32,
}

impl EngineConfig {
    /// Defaults for the given scoring policy, including its coupled stop
    /// multiplier and target-generation scheme.
    pub fn for_policy(policy: ScoringPolicy) -> Self {
        let (stop_atr_mult, targets) = match policy {
            ScoringPolicy::LiquidationWeighted => {
                (1.2, TargetScheme::AtrMultiples(vec![2.0, 3.0]))
            }
            ScoringPolicy::MomentumCrossover => {
                (2.0, TargetScheme::RiskFractions(vec![0.618, 1.0, 1.618]))
            }
        };
        Self {
            policy,
            min_candles: 210,
            structure_lookback: Period::new_const(20),
            adx_threshold: 25.0,
            rsi_long_band: (40.0, 65.0),
            rsi_short_band: (35.0, 60.0),
            stop_atr_mult,
            targets,
            min_confidence: 50,
        }
    }

    fn validate(&self) -> Result<()> {
        if self.min_candles < indicators::MIN_WARMUP + 3 {
            return Err(SignalError::InvalidConfig(format!(
                "min_candles {} below indicator warm-up plus closed-candle margin",
                self.min_candles
            )));
        }
        if self.min_candles < self.structure_lookback.get() + 2 {
            return Err(SignalError::InvalidConfig(
                "min_candles below structure lookback window".to_string(),
            ));
        }
        if !self.adx_threshold.is_finite() || self.adx_threshold < 0.0 {
            return Err(SignalError::InvalidConfig(
                "adx_threshold must be finite and >= 0".to_string(),
            ));
        }
        for (name, band) in [
            ("rsi_long_band", self.rsi_long_band),
            ("rsi_short_band", self.rsi_short_band),
        ] {
            let (lo, hi) = band;
            if !(0.0..=100.0).contains(&lo) || !(0.0..=100.0).contains(&hi) || lo >= hi {
                return Err(SignalError::InvalidConfig(format!(
                    "{name} ({lo}, {hi}) is not an ascending band inside [0, 100]"
                )));
            }
        }
        if !self.stop_atr_mult.is_finite() || self.stop_atr_mult <= 0.0 {
            return Err(SignalError::InvalidConfig(
                "stop_atr_mult must be finite and > 0".to_string(),
            ));
        }
        let factors = match &self.targets {
            TargetScheme::AtrMultiples(f) | TargetScheme::RiskFractions(f) => f,
        };
        if factors.is_empty() {
            return Err(SignalError::InvalidConfig(
                "target scheme needs at least one level".to_string(),
            ));
        }
        if factors.windows(2).any(|w| w[1] <= w[0])
            || factors.iter().any(|f| !f.is_finite() || *f <= 0.0)
        {
            return Err(SignalError::InvalidConfig(
                "target factors must be positive, finite and strictly ascending".to_string(),
            ));
        }
        if !(0..=100).contains(&self.min_confidence) {
            return Err(SignalError::InvalidConfig(
                "min_confidence must be in [0, 100]".to_string(),
            ));
        }
        Ok(())
    }
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self::for_policy(ScoringPolicy::LiquidationWeighted)
    }
}

// ============================================================
// SIGNAL ENGINE
// ============================================================

/// The composer: fuses trend, structure, liquidation pressure, candlestick
/// pattern and risk/reward into one weighted decision.
///
/// Purely computational and single-threaded per call; safe to invoke from many
/// tasks concurrently as long as each call gets its own input slices.
pub struct SignalEngine {
    config: EngineConfig,
    matcher: PatternMatcher,
}

impl SignalEngine {
    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Run the indicator pipeline over a candle series.
    ///
    /// A series shorter than the warm-up window comes back unannotated; a
    /// failed indicator group leaves only its own column unavailable. Callers
    /// re-check presence, the pipeline never aborts.
    pub fn annotate(&self, candles: Vec<Candle>) -> IndicatorSeries {
        IndicatorSeries::compute(candles)
    }

    /// Evaluate one instrument against annotated higher/lower-timeframe series
    /// plus an optional liquidation batch.
    ///
    /// Returns `None` for every degraded input: short series, missing
    /// indicator values, trend disagreement (momentum policy), or no entry
    /// trigger. Never panics, never errors.
    pub fn evaluate(
        &self,
        symbol: &str,
        htf: &IndicatorSeries,
        ltf: &IndicatorSeries,
        liquidations: &[LiquidationEvent],
    ) -> Option<Signal> {
        let cfg = &self.config;
        if htf.len() < cfg.min_candles || ltf.len() < cfg.min_candles {
            debug!(
                symbol,
                htf = htf.len(),
                ltf = ltf.len(),
                min = cfg.min_candles,
                "insufficient candles, no signal"
            );
            return None;
        }

        let zone = StructureZone::detect(htf.candles(), cfg.structure_lookback.get())?;
        let heat = LiquidationScore::from_events(liquidations);
        let pattern = self.matcher.detect(ltf.candles());

        let scored = match cfg.policy {
            ScoringPolicy::LiquidationWeighted => {
                score::liquidation_weighted(cfg, htf, ltf, &zone, &heat, pattern.as_ref())
            }
            ScoringPolicy::MomentumCrossover => {
                score::momentum_crossover(cfg, htf, ltf, &zone, pattern.as_ref())
            }
        }?;

        debug!(
            symbol,
            side = ?scored.side,
            confidence = scored.confidence,
            "signal emitted"
        );

        Some(Signal {
            symbol: symbol.to_string(),
            side: scored.side,
            confidence: scored.confidence,
            entry: scored.entry,
            stop_loss: scored.stop_loss,
            targets: scored.targets,
            reasons: scored.reasons,
            ts: scored.ts,
            structure: zone,
            liquidation: heat,
            pattern: pattern.map(|p| p.name),
        })
    }

    /// Convenience: annotate both raw series, then evaluate.
    pub fn evaluate_candles(
        &self,
        symbol: &str,
        htf: &[Candle],
        ltf: &[Candle],
        liquidations: &[LiquidationEvent],
    ) -> Option<Signal> {
        let htf = self.annotate(htf.to_vec());
        let ltf = self.annotate(ltf.to_vec());
        self.evaluate(symbol, &htf, &ltf, liquidations)
    }
}

// ============================================================
// BUILDER
// ============================================================

/// Builder for creating [`SignalEngine`] instances
pub struct EngineBuilder {
    config: EngineConfig,
    matcher: PatternMatcher,
}

impl Default for EngineBuilder {
    fn default() -> Self {
        Self::new()
    }
}

impl EngineBuilder {
    pub fn new() -> Self {
        Self {
            config: EngineConfig::default(),
            matcher: PatternMatcher::default(),
        }
    }

    /// Select the scoring policy, resetting its coupled stop multiplier and
    /// target scheme to the policy defaults. Call before any override.
    pub fn policy(mut self, policy: ScoringPolicy) -> Self {
        let keep = (self.config.min_confidence, self.config.structure_lookback);
        self.config = EngineConfig::for_policy(policy);
        (self.config.min_confidence, self.config.structure_lookback) = keep;
        self
    }

    /// Replace the whole configuration.
    pub fn config(mut self, config: EngineConfig) -> Self {
        self.config = config;
        self
    }

    pub fn min_candles(mut self, min: usize) -> Self {
        self.config.min_candles = min;
        self
    }

    pub fn structure_lookback(mut self, lookback: Period) -> Self {
        self.config.structure_lookback = lookback;
        self
    }

    pub fn adx_threshold(mut self, threshold: f64) -> Self {
        self.config.adx_threshold = threshold;
        self
    }

    pub fn rsi_bands(mut self, long: (f64, f64), short: (f64, f64)) -> Self {
        self.config.rsi_long_band = long;
        self.config.rsi_short_band = short;
        self
    }

    pub fn stop_atr_mult(mut self, mult: f64) -> Self {
        self.config.stop_atr_mult = mult;
        self
    }

    pub fn targets(mut self, scheme: TargetScheme) -> Self {
        self.config.targets = scheme;
        self
    }

    pub fn min_confidence(mut self, threshold: i32) -> Self {
        self.config.min_confidence = threshold;
        self
    }

    pub fn matcher(mut self, matcher: PatternMatcher) -> Self {
        self.matcher = matcher;
        self
    }

    /// Build the engine, validating the configuration.
    pub fn build(self) -> Result<SignalEngine> {
        self.config.validate()?;
        self.matcher.validate_config()?;
        Ok(SignalEngine {
            config: self.config,
            matcher: self.matcher,
        })
    }
}

// ============================================================
// PARALLEL SCANNING
// ============================================================

use rayon::prelude::*;

/// One instrument's inputs for a scan cycle.
#[derive(Debug, Clone, Copy)]
pub struct ScanInput<'a> {
    pub symbol: &'a str,
    pub htf: &'a [Candle],
    pub ltf: &'a [Candle],
    pub liquidations: &'a [LiquidationEvent],
}

/// Evaluate many instruments in parallel.
///
/// Returns one entry per input, order-preserving; an instrument with degraded
/// data yields `None` in place, never aborting the rest of the scan.
pub fn scan_parallel(engine: &SignalEngine, instruments: &[ScanInput<'_>]) -> Vec<Option<Signal>> {
    instruments
        .par_iter()
        .map(|input| {
            engine.evaluate_candles(input.symbol, input.htf, input.ltf, input.liquidations)
        })
        .collect()
}

/// Scan, then keep only signals at or above the configured confidence
/// threshold that the ledger has not already seen for their closed candle.
pub fn scan_accepted(
    engine: &SignalEngine,
    instruments: &[ScanInput<'_>],
    ledger: &mut SignalLedger,
) -> Vec<Signal> {
    scan_parallel(engine, instruments)
        .into_iter()
        .flatten()
        .filter(|s| s.confidence >= engine.config.min_confidence)
        .filter(|s| ledger.accepts(&s.symbol, s.ts))
        .collect()
}

// ============================================================
// SIGNAL LEDGER
// ============================================================

/// Caller-owned map from instrument to last signaled candle timestamp.
///
/// The only state whose lifetime spans evaluations, and it lives outside the
/// engine: pass it wherever duplicate suppression is wanted. The engine never
/// reads or writes it.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct SignalLedger {
    seen: HashMap<String, i64>,
}

impl SignalLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record `ts` for `symbol` and return true unless the exact same candle
    /// timestamp was already recorded.
    pub fn accepts(&mut self, symbol: &str, ts: i64) -> bool {
        match self.seen.get(symbol) {
            Some(&prev) if prev == ts => false,
            _ => {
                self.seen.insert(symbol.to_string(), ts);
                true
            }
        }
    }

    pub fn last(&self, symbol: &str) -> Option<i64> {
        self.seen.get(symbol).copied()
    }

    pub fn len(&self) -> usize {
        self.seen.len()
    }

    pub fn is_empty(&self) -> bool {
        self.seen.is_empty()
    }
}

// ============================================================
// TESTS
// ============================================================
