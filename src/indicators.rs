//! Indicator pipeline: EMA, RSI, ATR, ADX and volume-baseline columns over a
//! candle series.
//!
//! Each column is `Option<f64>` per candle, `None` inside the indicator's
//! warm-up window. A series shorter than [`MIN_WARMUP`] candles comes back
//! with every column unavailable. A column whose computation degrades (e.g.
//! non-finite input poisoning a window) is dropped as a whole group so callers
//! can distinguish "computed" from "unavailable" instead of fishing for NaN.

use serde::Serialize;
use tracing::debug;

use crate::Candle;

/// Fast EMA window.
pub const EMA_FAST: usize = 20;
/// Mid EMA window.
pub const EMA_MID: usize = 50;
/// Slow (trend-defining) EMA window.
pub const EMA_SLOW: usize = 200;
/// RSI / ATR / ADX window.
pub const OSC_PERIOD: usize = 14;
/// Volume baseline SMA window.
pub const VOL_MA_PERIOD: usize = 20;
/// Minimum series length before any column is computed.
pub const MIN_WARMUP: usize = EMA_SLOW;

// ============================================================
// INDICATOR SERIES
// ============================================================

/// A candle series annotated with indicator columns.
#[derive(Debug, Clone, PartialEq)]
pub struct IndicatorSeries {
    candles: Vec<Candle>,
    ema_20: Vec<Option<f64>>,
    ema_50: Vec<Option<f64>>,
    ema_200: Vec<Option<f64>>,
    rsi_14: Vec<Option<f64>>,
    atr_14: Vec<Option<f64>>,
    adx_14: Vec<Option<f64>>,
    vol_ma_20: Vec<Option<f64>>,
}

/// One candle plus its indicator values, copied out of the series.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct IndicatorRow {
    pub ts: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
    pub ema_20: Option<f64>,
    pub ema_50: Option<f64>,
    pub ema_200: Option<f64>,
    pub rsi_14: Option<f64>,
    pub atr_14: Option<f64>,
    pub adx_14: Option<f64>,
    pub vol_ma_20: Option<f64>,
}

impl IndicatorSeries {
    /// Run the pipeline. Deterministic: recomputing over the same candles
    /// yields identical columns.
    pub fn compute(candles: Vec<Candle>) -> Self {
        let n = candles.len();
        if n < MIN_WARMUP {
            debug!(
                len = n,
                min = MIN_WARMUP,
                "series below indicator warm-up, returning unannotated"
            );
            return Self::unannotated(candles);
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close).collect();
        let volumes: Vec<f64> = candles.iter().map(|c| c.volume).collect();

        let ema_20 = sanitize("ema_20", ema(&closes, EMA_FAST));
        let ema_50 = sanitize("ema_50", ema(&closes, EMA_MID));
        let ema_200 = sanitize("ema_200", ema(&closes, EMA_SLOW));
        let rsi_14 = sanitize("rsi_14", rsi(&closes, OSC_PERIOD));
        let atr_14 = sanitize("atr_14", atr(&candles, OSC_PERIOD));
        let adx_14 = sanitize("adx_14", adx(&candles, OSC_PERIOD));
        let vol_ma_20 = sanitize("vol_ma_20", sma(&volumes, VOL_MA_PERIOD));

        Self {
            candles,
            ema_20,
            ema_50,
            ema_200,
            rsi_14,
            atr_14,
            adx_14,
            vol_ma_20,
        }
    }

    fn unannotated(candles: Vec<Candle>) -> Self {
        let n = candles.len();
        Self {
            candles,
            ema_20: vec![None; n],
            ema_50: vec![None; n],
            ema_200: vec![None; n],
            rsi_14: vec![None; n],
            atr_14: vec![None; n],
            adx_14: vec![None; n],
            vol_ma_20: vec![None; n],
        }
    }

    /// Assemble a series from precomputed columns. Columns are padded or cut
    /// to the candle count.
    #[doc(hidden)]
    #[allow(clippy::too_many_arguments)]
    pub fn from_raw_columns(
        candles: Vec<Candle>,
        ema_20: Vec<Option<f64>>,
        ema_50: Vec<Option<f64>>,
        ema_200: Vec<Option<f64>>,
        rsi_14: Vec<Option<f64>>,
        atr_14: Vec<Option<f64>>,
        adx_14: Vec<Option<f64>>,
        vol_ma_20: Vec<Option<f64>>,
    ) -> Self {
        let n = candles.len();
        let fit = |mut col: Vec<Option<f64>>| {
            col.resize(n, None);
            col
        };
        Self {
            candles,
            ema_20: fit(ema_20),
            ema_50: fit(ema_50),
            ema_200: fit(ema_200),
            rsi_14: fit(rsi_14),
            atr_14: fit(atr_14),
            adx_14: fit(adx_14),
            vol_ma_20: fit(vol_ma_20),
        }
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.candles.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.candles.is_empty()
    }

    #[inline]
    pub fn candles(&self) -> &[Candle] {
        &self.candles
    }

    /// Copy out candle `index` with its indicator values.
    pub fn row(&self, index: usize) -> Option<IndicatorRow> {
        let c = self.candles.get(index)?;
        Some(IndicatorRow {
            ts: c.ts,
            open: c.open,
            high: c.high,
            low: c.low,
            close: c.close,
            volume: c.volume,
            ema_20: self.ema_20[index],
            ema_50: self.ema_50[index],
            ema_200: self.ema_200[index],
            rsi_14: self.rsi_14[index],
            atr_14: self.atr_14[index],
            adx_14: self.adx_14[index],
            vol_ma_20: self.vol_ma_20[index],
        })
    }

    /// ADX at `index`, substituting the defined neutral 0.0 when the column is
    /// unavailable. Strength gates then simply fail instead of erroring.
    #[inline]
    pub fn adx_or_zero(&self, index: usize) -> f64 {
        self.adx_14.get(index).copied().flatten().unwrap_or(0.0)
    }
}

/// Drop a whole column when any computed value is non-finite, so downstream
/// consumers see "unavailable", never NaN.
fn sanitize(name: &'static str, column: Vec<Option<f64>>) -> Vec<Option<f64>> {
    if column.iter().flatten().all(|v| v.is_finite()) {
        column
    } else {
        debug!(
            indicator = name,
            "non-finite value in computed column, marking unavailable"
        );
        vec![None; column.len()]
    }
}

// ============================================================
// WINDOWED TRANSFORMS
// ============================================================

/// Exponential moving average seeded with the SMA of the first `period`
/// values; defined from index `period - 1`.
fn ema(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }
    let mut prev = values[..period].iter().sum::<f64>() / period as f64;
    out[period - 1] = Some(prev);
    let k = 2.0 / (period as f64 + 1.0);
    for i in period..n {
        prev += k * (values[i] - prev);
        out[i] = Some(prev);
    }
    out
}

/// Simple moving average, defined from index `period - 1`.
fn sma(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n < period {
        return out;
    }
    let mut sum = values[..period].iter().sum::<f64>();
    out[period - 1] = Some(sum / period as f64);
    for i in period..n {
        sum += values[i] - values[i - period];
        out[i] = Some(sum / period as f64);
    }
    out
}

/// Relative strength index with Wilder smoothing; defined from index `period`.
fn rsi(values: &[f64], period: usize) -> Vec<Option<f64>> {
    let n = values.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }

    let mut gain_sum = 0.0;
    let mut loss_sum = 0.0;
    for i in 1..=period {
        let delta = values[i] - values[i - 1];
        if delta > 0.0 {
            gain_sum += delta;
        } else {
            loss_sum -= delta;
        }
    }
    let p = period as f64;
    let mut avg_gain = gain_sum / p;
    let mut avg_loss = loss_sum / p;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    for i in period + 1..n {
        let delta = values[i] - values[i - 1];
        let (gain, loss) = if delta > 0.0 {
            (delta, 0.0)
        } else {
            (0.0, -delta)
        };
        avg_gain = (avg_gain * (p - 1.0) + gain) / p;
        avg_loss = (avg_loss * (p - 1.0) + loss) / p;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

/// No movement at all reads as the 50 midpoint; no losses as 100.
#[inline]
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    let total = avg_gain + avg_loss;
    if total <= 0.0 {
        50.0
    } else {
        100.0 * avg_gain / total
    }
}

/// True range per candle (prior close taken into account from index 1).
fn true_ranges(candles: &[Candle]) -> Vec<f64> {
    candles
        .iter()
        .enumerate()
        .map(|(i, c)| {
            if i == 0 {
                c.high - c.low
            } else {
                let prev_close = candles[i - 1].close;
                (c.high - c.low)
                    .max((c.high - prev_close).abs())
                    .max((c.low - prev_close).abs())
            }
        })
        .collect()
}

/// Average true range with Wilder smoothing; defined from index `period`.
fn atr(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if period == 0 || n <= period {
        return out;
    }
    let tr = true_ranges(candles);
    let p = period as f64;
    let mut prev = tr[1..=period].iter().sum::<f64>() / p;
    out[period] = Some(prev);
    for i in period + 1..n {
        prev = (prev * (p - 1.0) + tr[i]) / p;
        out[i] = Some(prev);
    }
    out
}

/// Average directional index: Wilder-smoothed +DM/-DM/TR into +DI/-DI, DX,
/// then Wilder-smoothed DX. Defined from index `2 * period - 1`.
fn adx(candles: &[Candle], period: usize) -> Vec<Option<f64>> {
    let n = candles.len();
    let mut out = vec![None; n];
    if period == 0 || n < 2 * period {
        return out;
    }

    let tr = true_ranges(candles);
    let mut plus_dm = vec![0.0; n];
    let mut minus_dm = vec![0.0; n];
    for i in 1..n {
        let up = candles[i].high - candles[i - 1].high;
        let down = candles[i - 1].low - candles[i].low;
        if up > down && up > 0.0 {
            plus_dm[i] = up;
        }
        if down > up && down > 0.0 {
            minus_dm[i] = down;
        }
    }

    let p = period as f64;
    let mut sm_tr = tr[1..=period].iter().sum::<f64>() / p;
    let mut sm_plus = plus_dm[1..=period].iter().sum::<f64>() / p;
    let mut sm_minus = minus_dm[1..=period].iter().sum::<f64>() / p;

    let mut dx = vec![0.0; n];
    dx[period] = dx_value(sm_plus, sm_minus, sm_tr);
    for i in period + 1..n {
        sm_tr = (sm_tr * (p - 1.0) + tr[i]) / p;
        sm_plus = (sm_plus * (p - 1.0) + plus_dm[i]) / p;
        sm_minus = (sm_minus * (p - 1.0) + minus_dm[i]) / p;
        dx[i] = dx_value(sm_plus, sm_minus, sm_tr);
    }

    let first = 2 * period - 1;
    let mut prev = dx[period..=first].iter().sum::<f64>() / p;
    out[first] = Some(prev);
    for i in first + 1..n {
        prev = (prev * (p - 1.0) + dx[i]) / p;
        out[i] = Some(prev);
    }
    out
}

/// DX from smoothed directional movement; flat markets read as 0.
#[inline]
fn dx_value(sm_plus: f64, sm_minus: f64, sm_tr: f64) -> f64 {
    if sm_tr <= 0.0 {
        return 0.0;
    }
    let plus_di = 100.0 * sm_plus / sm_tr;
    let minus_di = 100.0 * sm_minus / sm_tr;
    let total = plus_di + minus_di;
    if total <= 0.0 {
        0.0
    } else {
        100.0 * (plus_di - minus_di).abs() / total
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    fn climb(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let close = 100.0 + i as f64 * 0.5;
                let open = if i == 0 { 100.0 } else { close - 0.5 };
                Candle::new(
                    i as i64 * 60_000,
                    open,
                    open.max(close) + 0.2,
                    open.min(close) - 0.2,
                    close,
                    1000.0 + i as f64,
                )
            })
            .collect()
    }

    #[test]
    fn test_short_series_unannotated() {
        let series = IndicatorSeries::compute(climb(199));
        assert_eq!(series.len(), 199);
        for i in 0..series.len() {
            let row = series.row(i).unwrap();
            assert!(row.ema_20.is_none());
            assert!(row.ema_200.is_none());
            assert!(row.rsi_14.is_none());
            assert!(row.atr_14.is_none());
            assert!(row.adx_14.is_none());
            assert!(row.vol_ma_20.is_none());
        }
    }

    #[test]
    fn test_warm_up_boundaries() {
        let series = IndicatorSeries::compute(climb(250));
        let first = series.row(0).unwrap();
        assert!(first.ema_20.is_none());

        assert!(series.row(EMA_FAST - 2).unwrap().ema_20.is_none());
        assert!(series.row(EMA_FAST - 1).unwrap().ema_20.is_some());
        assert!(series.row(EMA_SLOW - 2).unwrap().ema_200.is_none());
        assert!(series.row(EMA_SLOW - 1).unwrap().ema_200.is_some());
        assert!(series.row(OSC_PERIOD - 1).unwrap().rsi_14.is_none());
        assert!(series.row(OSC_PERIOD).unwrap().rsi_14.is_some());
        assert!(series.row(OSC_PERIOD).unwrap().atr_14.is_some());
        assert!(series.row(2 * OSC_PERIOD - 2).unwrap().adx_14.is_none());
        assert!(series.row(2 * OSC_PERIOD - 1).unwrap().adx_14.is_some());
        assert!(series.row(VOL_MA_PERIOD - 1).unwrap().vol_ma_20.is_some());
    }

    #[test]
    fn test_recompute_is_idempotent() {
        let candles = climb(260);
        let a = IndicatorSeries::compute(candles.clone());
        let b = IndicatorSeries::compute(candles);
        assert_eq!(a, b);
    }

    #[test]
    fn test_steady_climb_values() {
        let series = IndicatorSeries::compute(climb(250));
        let row = series.row(248).unwrap();

        // A pure climb has no losses: RSI pegs at 100, ADX near its maximum.
        assert_eq!(row.rsi_14.unwrap(), 100.0);
        assert!(row.adx_14.unwrap() > 90.0);
        // EMA lags a rising price from below, slower windows lag more.
        assert!(row.ema_20.unwrap() < row.close);
        assert!(row.ema_50.unwrap() < row.ema_20.unwrap());
        assert!(row.ema_200.unwrap() < row.ema_50.unwrap());
        // ATR of constant-range candles settles at that range.
        assert!((row.atr_14.unwrap() - 0.9).abs() < 0.05);
        // Volumes rise, so the last volume sits above its trailing average.
        assert!(row.volume > row.vol_ma_20.unwrap());
    }

    #[test]
    fn test_constant_series_is_neutral() {
        let candles: Vec<Candle> = (0..250)
            .map(|i| Candle::new(i as i64, 100.0, 100.0, 100.0, 100.0, 500.0))
            .collect();
        let series = IndicatorSeries::compute(candles);
        let row = series.row(248).unwrap();
        assert_eq!(row.ema_20.unwrap(), 100.0);
        assert_eq!(row.ema_200.unwrap(), 100.0);
        assert_eq!(row.rsi_14.unwrap(), 50.0);
        assert_eq!(row.atr_14.unwrap(), 0.0);
        assert_eq!(row.adx_14.unwrap(), 0.0);
    }

    #[test]
    fn test_non_finite_input_drops_column() {
        let mut candles = climb(250);
        candles[100].close = f64::NAN;
        let series = IndicatorSeries::compute(candles);
        let row = series.row(248).unwrap();
        assert!(row.ema_20.is_none());
        assert!(row.ema_200.is_none());
        assert!(row.rsi_14.is_none());
        // Volume column is untouched by the poisoned close.
        assert!(row.vol_ma_20.is_some());
        assert_eq!(series.adx_or_zero(248), 0.0);
    }

    #[test]
    fn test_adx_or_zero_inside_warm_up() {
        let series = IndicatorSeries::compute(climb(250));
        assert_eq!(series.adx_or_zero(0), 0.0);
        assert!(series.adx_or_zero(248) > 0.0);
        assert_eq!(series.adx_or_zero(9999), 0.0);
    }
}
