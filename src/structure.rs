//! Market-structure zone: the rolling swing high/low band of the
//! higher-timeframe series, used as a proxy support/resistance boundary.

use serde::{Deserialize, Serialize};

use crate::Ohlcv;

/// Recent consolidation/swing boundary `{high, low}`.
///
/// Recomputed fresh on every evaluation, never persisted.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct StructureZone {
    pub high: f64,
    pub low: f64,
}

impl StructureZone {
    /// Rolling max of `high` / min of `low` over the `lookback` candles ending
    /// at the last fully closed candle (`len - 2`; the most recent entry is
    /// assumed still open).
    ///
    /// Returns `None` when fewer than `lookback + 2` candles are available.
    pub fn detect<T: Ohlcv>(bars: &[T], lookback: usize) -> Option<StructureZone> {
        if lookback == 0 || bars.len() < lookback + 2 {
            return None;
        }
        let end = bars.len() - 1;
        let window = &bars[end - lookback..end];
        let high = window
            .iter()
            .map(|b| b.high())
            .fold(f64::NEG_INFINITY, f64::max);
        let low = window.iter().map(|b| b.low()).fold(f64::INFINITY, f64::min);
        Some(StructureZone { high, low })
    }
}

// ============================================================
// TESTS
// ============================================================
