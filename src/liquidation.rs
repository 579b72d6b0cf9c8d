//! Liquidation-pressure heatmap: a 0-100 directional score from a batch of
//! forced-liquidation events.
//!
//! Liquidations of one side proxy forced unwind pressure in the opposite price
//! direction: heavy short liquidations imply short-covering pressure upward.
//! This is an explicit heuristic, not a statistically validated model.

use serde::{Deserialize, Serialize};

/// Taker side of a forced liquidation order.
///
/// A `Sell` liquidation order closes a long position, a `Buy` order closes a
/// short (USD-M futures force-order convention).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum OrderSide {
    Buy,
    Sell,
}

/// One forced-liquidation event. `amount` is the liquidated notional.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct LiquidationEvent {
    pub side: OrderSide,
    pub amount: f64,
}

impl LiquidationEvent {
    pub fn new(side: OrderSide, amount: f64) -> Self {
        Self { side, amount }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum LiquidationBias {
    Bullish,
    Bearish,
    Neutral,
}

/// Score at or above which the imbalance reads bullish.
pub const BULLISH_MIN_SCORE: u8 = 60;
/// Score at or below which the imbalance reads bearish.
pub const BEARISH_MAX_SCORE: u8 = 40;

/// Directional pressure score derived from one liquidation batch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct LiquidationScore {
    /// 0 (all longs liquidated) .. 100 (all shorts liquidated); 50 neutral.
    pub score: u8,
    pub bias: LiquidationBias,
}

impl LiquidationScore {
    /// The defined baseline for missing data.
    pub const fn neutral() -> Self {
        Self {
            score: 50,
            bias: LiquidationBias::Neutral,
        }
    }

    /// Score a batch. An empty batch, or one with no usable notional, returns
    /// the neutral baseline. Negative or non-finite amounts contribute
    /// nothing.
    pub fn from_events(events: &[LiquidationEvent]) -> Self {
        let mut long_liq = 0.0;
        let mut short_liq = 0.0;
        for event in events {
            if !event.amount.is_finite() || event.amount <= 0.0 {
                continue;
            }
            match event.side {
                OrderSide::Sell => long_liq += event.amount,
                OrderSide::Buy => short_liq += event.amount,
            }
        }

        let total = long_liq + short_liq;
        if total <= 0.0 {
            return Self::neutral();
        }

        let ratio = (short_liq - long_liq) / total;
        let score = ((ratio + 1.0) * 50.0).round() as u8;
        let bias = if score >= BULLISH_MIN_SCORE {
            LiquidationBias::Bullish
        } else if score <= BEARISH_MAX_SCORE {
            LiquidationBias::Bearish
        } else {
            LiquidationBias::Neutral
        };
        Self { score, bias }
    }
}

// ============================================================
// TESTS
// ============================================================
