//! Indicator engine: derived numeric series from a raw candle series.
//!
//! Pure computation, no I/O. Every column of the output frame is aligned
//! index-for-index with the input; positions before an indicator's window
//! has filled are `None`, never a silently wrong number. Consumers skip
//! `None` rather than coercing it; coercing to zero would corrupt every
//! RSI/KDJ comparison downstream.
//!
//! Documented numeric policies:
//! - EMA: `ema[0] = close[0]`, `ema[t] = close[t]*a + ema[t-1]*(1-a)` with
//!   `a = 2/(period+1)`; never re-seeded mid-series, defined from index 0.
//! - RSI: Wilder smoothing (`a = 1/period`) over gains/losses, seeded with
//!   the simple average of the first `period` deltas. `avg_loss == 0` maps
//!   to 100 unless `avg_gain` is also 0, which is neutral 50.
//! - Bollinger: SMA ± k·stddev with **population** standard deviation.
//! - KDJ: zero-range RSV is neutral 50; K and D use the classic
//!   `2/3·prev + 1/3·new` recursion (pandas `ewm(com=2)` seeding with the
//!   first RSV); J = 3K − 2D and may leave [0, 100].

use crate::{config::IndicatorParams, Ohlcv, Result, SignalError};

// ============================================================
// INDICATOR FRAME
// ============================================================

/// Parallel derived series, index-aligned with the input candle series.
#[derive(Debug, Clone)]
pub struct IndicatorFrame {
    len: usize,
    pub ema_fast: Vec<Option<f64>>,
    pub ema_slow: Vec<Option<f64>>,
    pub rsi: Vec<Option<f64>>,
    pub macd_line: Vec<Option<f64>>,
    pub macd_signal: Vec<Option<f64>>,
    pub macd_hist: Vec<Option<f64>>,
    pub bb_upper: Vec<Option<f64>>,
    pub bb_mid: Vec<Option<f64>>,
    pub bb_lower: Vec<Option<f64>>,
    pub k: Vec<Option<f64>>,
    pub d: Vec<Option<f64>>,
    pub j: Vec<Option<f64>>,
}

impl IndicatorFrame {
    #[inline]
    pub fn len(&self) -> usize {
        self.len
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    /// Value of a column at `index`, flattening out-of-bounds to `None`.
    #[inline]
    pub fn at(column: &[Option<f64>], index: usize) -> Option<f64> {
        column.get(index).copied().flatten()
    }
}

// ============================================================
// ENGINE
// ============================================================

/// Stateless indicator computation over a candle series snapshot.
#[derive(Debug, Clone)]
pub struct IndicatorEngine {
    params: IndicatorParams,
}

impl Default for IndicatorEngine {
    fn default() -> Self {
        Self {
            params: IndicatorParams::default(),
        }
    }
}

impl IndicatorEngine {
    pub fn new(params: IndicatorParams) -> Result<Self> {
        params.validate()?;
        Ok(Self { params })
    }

    pub fn with_defaults() -> Self {
        Self::default()
    }

    #[inline]
    pub fn params(&self) -> &IndicatorParams {
        &self.params
    }

    /// Minimum series length for a full frame.
    #[inline]
    pub fn min_bars(&self) -> usize {
        self.params.min_bars()
    }

    /// Compute the full indicator frame for a series snapshot.
    ///
    /// Fails with [`SignalError::InsufficientData`] when the series is
    /// shorter than the longest indicator lookback; there is no silent
    /// padding.
    pub fn compute<T: Ohlcv>(&self, candles: &[T]) -> Result<IndicatorFrame> {
        let need = self.min_bars();
        if candles.len() < need {
            return Err(SignalError::InsufficientData {
                need,
                got: candles.len(),
            });
        }

        let closes: Vec<f64> = candles.iter().map(|c| c.close()).collect();

        let ema_fast = ema_series(&closes, self.params.ema_fast.get());
        let ema_slow = ema_series(&closes, self.params.ema_slow.get());
        let rsi = rsi_series(&closes, self.params.rsi_period.get());
        let (macd_line, macd_signal, macd_hist) = macd_series(
            &closes,
            self.params.macd_fast.get(),
            self.params.macd_slow.get(),
            self.params.macd_signal.get(),
        );
        let (bb_upper, bb_mid, bb_lower) =
            bollinger_series(&closes, self.params.bb_period.get(), self.params.bb_stddev);
        let (k, d, j) = kdj_series(candles, self.params.kdj_period.get());

        Ok(IndicatorFrame {
            len: candles.len(),
            ema_fast: ema_fast.into_iter().map(Some).collect(),
            ema_slow: ema_slow.into_iter().map(Some).collect(),
            rsi,
            macd_line,
            macd_signal,
            macd_hist,
            bb_upper,
            bb_mid,
            bb_lower,
            k,
            d,
            j,
        })
    }
}

// ============================================================
// SERIES PRIMITIVES
// ============================================================

/// EMA over the full series, seeded at the first value. Defined everywhere;
/// early values simply carry less history.
fn ema_series(values: &[f64], period: usize) -> Vec<f64> {
    let alpha = 2.0 / (period as f64 + 1.0);
    let mut out = Vec::with_capacity(values.len());
    let mut prev = match values.first() {
        Some(&v) => v,
        None => return out,
    };
    out.push(prev);
    for &v in &values[1..] {
        prev = v * alpha + prev * (1.0 - alpha);
        out.push(prev);
    }
    out
}

/// Wilder RSI. `None` until `period` deltas have accumulated.
fn rsi_series(closes: &[f64], period: usize) -> Vec<Option<f64>> {
    let mut out = vec![None; closes.len()];
    if closes.len() <= period {
        return out;
    }

    let mut avg_gain = 0.0;
    let mut avg_loss = 0.0;
    for w in closes[..=period].windows(2) {
        let delta = w[1] - w[0];
        if delta > 0.0 {
            avg_gain += delta;
        } else {
            avg_loss -= delta;
        }
    }
    avg_gain /= period as f64;
    avg_loss /= period as f64;
    out[period] = Some(rsi_value(avg_gain, avg_loss));

    let n = period as f64;
    for i in period + 1..closes.len() {
        let delta = closes[i] - closes[i - 1];
        let (gain, loss) = if delta > 0.0 {
            (delta, 0.0)
        } else {
            (0.0, -delta)
        };
        avg_gain = (avg_gain * (n - 1.0) + gain) / n;
        avg_loss = (avg_loss * (n - 1.0) + loss) / n;
        out[i] = Some(rsi_value(avg_gain, avg_loss));
    }
    out
}

/// Edge-case policy: no losses is maximal strength (100) unless there were
/// no gains either, which is neutral (50).
#[inline]
fn rsi_value(avg_gain: f64, avg_loss: f64) -> f64 {
    if avg_loss <= f64::EPSILON {
        if avg_gain <= f64::EPSILON {
            50.0
        } else {
            100.0
        }
    } else {
        100.0 - 100.0 / (1.0 + avg_gain / avg_loss)
    }
}

type TripleColumn = (Vec<Option<f64>>, Vec<Option<f64>>, Vec<Option<f64>>);

/// MACD line, signal line, histogram. The line is masked until the slow EMA
/// window has filled; signal and histogram additionally wait for the signal
/// window over the line.
fn macd_series(closes: &[f64], fast: usize, slow: usize, signal: usize) -> TripleColumn {
    let len = closes.len();
    let mut line = vec![None; len];
    let mut sig = vec![None; len];
    let mut hist = vec![None; len];

    let fast_ema = ema_series(closes, fast);
    let slow_ema = ema_series(closes, slow);

    let line_start = slow - 1;
    let sig_start = slow + signal - 2;
    if len <= line_start {
        return (line, sig, hist);
    }

    let alpha = 2.0 / (signal as f64 + 1.0);
    let mut sig_prev = fast_ema[line_start] - slow_ema[line_start];
    for i in line_start..len {
        let value = fast_ema[i] - slow_ema[i];
        line[i] = Some(value);
        if i > line_start {
            sig_prev = value * alpha + sig_prev * (1.0 - alpha);
        }
        if i >= sig_start {
            sig[i] = Some(sig_prev);
            hist[i] = Some(value - sig_prev);
        }
    }
    (line, sig, hist)
}

/// Bollinger bands: SMA ± k·population stddev, `None` until the window fills.
fn bollinger_series(closes: &[f64], period: usize, stddev: f64) -> TripleColumn {
    let len = closes.len();
    let mut upper = vec![None; len];
    let mut mid = vec![None; len];
    let mut lower = vec![None; len];
    if len < period {
        return (upper, mid, lower);
    }

    for i in period - 1..len {
        let window = &closes[i + 1 - period..=i];
        let mean = window.iter().sum::<f64>() / period as f64;
        let variance =
            window.iter().map(|v| (v - mean) * (v - mean)).sum::<f64>() / period as f64;
        let sd = variance.sqrt();
        mid[i] = Some(mean);
        upper[i] = Some(mean + stddev * sd);
        lower[i] = Some(mean - stddev * sd);
    }
    (upper, mid, lower)
}

/// KDJ stochastic: RSV over the rolling high/low window, then the classic
/// 1/3-weight recursion for K and D. J is left unclamped.
fn kdj_series<T: Ohlcv>(candles: &[T], period: usize) -> TripleColumn {
    let len = candles.len();
    let mut k_col = vec![None; len];
    let mut d_col = vec![None; len];
    let mut j_col = vec![None; len];
    if len < period {
        return (k_col, d_col, j_col);
    }

    let mut k_prev = None;
    let mut d_prev = None;
    for i in period - 1..len {
        let window = &candles[i + 1 - period..=i];
        let hh = window.iter().map(|c| c.high()).fold(f64::MIN, f64::max);
        let ll = window.iter().map(|c| c.low()).fold(f64::MAX, f64::min);
        let range = hh - ll;
        // Zero-range window (flat price) is neutral, not a division crash
        let rsv = if range <= f64::EPSILON {
            50.0
        } else {
            (candles[i].close() - ll) / range * 100.0
        };

        let k = match k_prev {
            Some(prev) => prev * (2.0 / 3.0) + rsv * (1.0 / 3.0),
            None => rsv,
        };
        let d = match d_prev {
            Some(prev) => prev * (2.0 / 3.0) + k * (1.0 / 3.0),
            None => k,
        };
        k_prev = Some(k);
        d_prev = Some(d);
        k_col[i] = Some(k);
        d_col[i] = Some(d);
        j_col[i] = Some(3.0 * k - 2.0 * d);
    }
    (k_col, d_col, j_col)
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    fn flat_series(n: usize, price: f64) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                Candle::new(
                    i as i64 * 60_000,
                    (i as i64 + 1) * 60_000 - 1,
                    price,
                    price,
                    price,
                    price,
                    100.0,
                )
            })
            .collect()
    }

    fn rising_series(n: usize) -> Vec<Candle> {
        (0..n)
            .map(|i| {
                let base = 100.0 + i as f64;
                Candle::new(
                    i as i64 * 60_000,
                    (i as i64 + 1) * 60_000 - 1,
                    base,
                    base + 1.5,
                    base - 0.5,
                    base + 1.0,
                    100.0,
                )
            })
            .collect()
    }

    #[test]
    fn test_ema_recursion() {
        let ema = ema_series(&[1.0, 2.0, 3.0], 2);
        // alpha = 2/3: 1, 5/3, 23/9
        assert!((ema[0] - 1.0).abs() < 1e-12);
        assert!((ema[1] - 5.0 / 3.0).abs() < 1e-12);
        assert!((ema[2] - 23.0 / 9.0).abs() < 1e-12);
    }

    #[test]
    fn test_insufficient_data() {
        let engine = IndicatorEngine::with_defaults();
        let candles = flat_series(10, 100.0);
        let err = engine.compute(&candles).unwrap_err();
        assert!(matches!(
            err,
            SignalError::InsufficientData { need: 35, got: 10 }
        ));
    }

    #[test]
    fn test_constant_close_is_neutral() {
        let engine = IndicatorEngine::with_defaults();
        let candles = flat_series(60, 100.0);
        let frame = engine.compute(&candles).unwrap();
        let last = frame.len() - 1;

        // No gains, no losses: RSI sits at the documented neutral value
        assert_eq!(frame.rsi[last], Some(50.0));
        // Identical EMAs: MACD line and histogram collapse to zero
        assert!(frame.macd_line[last].unwrap().abs() < 1e-9);
        assert!(frame.macd_hist[last].unwrap().abs() < 1e-9);
        // Zero dispersion: the bands collapse onto the mid line
        assert!((frame.bb_upper[last].unwrap() - 100.0).abs() < 1e-9);
        assert!((frame.bb_lower[last].unwrap() - 100.0).abs() < 1e-9);
        // Zero-range KDJ windows are neutral too
        assert_eq!(frame.k[last], Some(50.0));
        assert_eq!(frame.j[last], Some(50.0));
    }

    #[test]
    fn test_warmup_positions_are_none() {
        let engine = IndicatorEngine::with_defaults();
        let candles = rising_series(60);
        let frame = engine.compute(&candles).unwrap();

        // RSI needs 14 deltas
        assert!(frame.rsi[13].is_none());
        assert!(frame.rsi[14].is_some());
        // MACD line from slow-1, signal from slow+signal-2
        assert!(frame.macd_line[24].is_none());
        assert!(frame.macd_line[25].is_some());
        assert!(frame.macd_signal[32].is_none());
        assert!(frame.macd_signal[33].is_some());
        // Bollinger from period-1
        assert!(frame.bb_mid[18].is_none());
        assert!(frame.bb_mid[19].is_some());
        // KDJ from period-1
        assert!(frame.k[7].is_none());
        assert!(frame.k[8].is_some());
        // EMA recursion is defined from the first bar
        assert!(frame.ema_fast[0].is_some());
        assert!(frame.ema_slow[0].is_some());
    }

    #[test]
    fn test_monotone_rise_pins_rsi_high() {
        let engine = IndicatorEngine::with_defaults();
        let candles = rising_series(60);
        let frame = engine.compute(&candles).unwrap();
        let rsi = frame.rsi.last().unwrap().unwrap();
        assert!(rsi > 99.0, "all-gain series should saturate RSI, got {rsi}");
    }

    #[test]
    fn test_bollinger_brackets_price() {
        let engine = IndicatorEngine::with_defaults();
        let candles = rising_series(80);
        let frame = engine.compute(&candles).unwrap();
        for i in 19..frame.len() {
            let upper = frame.bb_upper[i].unwrap();
            let mid = frame.bb_mid[i].unwrap();
            let lower = frame.bb_lower[i].unwrap();
            assert!(lower <= mid && mid <= upper);
        }
    }

    #[test]
    fn test_kdj_j_can_leave_percent_range() {
        // Strong one-way series pushes K above D, so J = 3K - 2D > K and
        // can exceed 100; that is expected, not an error.
        let engine = IndicatorEngine::with_defaults();
        let candles = rising_series(60);
        let frame = engine.compute(&candles).unwrap();
        let j = frame.j.last().unwrap().unwrap();
        let k = frame.k.last().unwrap().unwrap();
        assert!(j >= k);
    }

    #[test]
    fn test_frame_at_flattens_bounds() {
        let engine = IndicatorEngine::with_defaults();
        let candles = rising_series(40);
        let frame = engine.compute(&candles).unwrap();
        assert!(IndicatorFrame::at(&frame.rsi, 5).is_none());
        assert!(IndicatorFrame::at(&frame.rsi, 39).is_some());
        assert!(IndicatorFrame::at(&frame.rsi, 400).is_none());
    }
}
