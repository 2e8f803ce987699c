//! Coarse local trend classification from a smoothed moving average.
//!
//! Both the pattern recognizer and the scoring model gate on this state:
//! reversal patterns are only meaningful against an established trend, so
//! a Flat reading suppresses the whole pattern family.

use crate::{config::TrendParams, indicators::IndicatorFrame, Period};

/// Local trend state over a lookback window.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum TrendState {
    Up,
    Down,
    #[default]
    Flat,
}

impl TrendState {
    #[inline]
    pub fn is_up(self) -> bool {
        matches!(self, TrendState::Up)
    }

    #[inline]
    pub fn is_down(self) -> bool {
        matches!(self, TrendState::Down)
    }
}

/// Classify the trend at `index` from the fast EMA column.
///
/// Takes the EMA values over `[index - lookback + 1, index]` and compares
/// the proportional change of the endpoints against the threshold. Fewer
/// than two defined samples in the window (or a non-positive start value)
/// is conservatively Flat: thin history never blocks the pipeline, it
/// just refuses to claim a trend.
pub fn classify_trend(
    frame: &IndicatorFrame,
    index: usize,
    lookback: Period,
    threshold: f64,
) -> TrendState {
    if index >= frame.len() {
        return TrendState::Flat;
    }

    let start_idx = (index + 1).saturating_sub(lookback.get());
    let window = &frame.ema_fast[start_idx..=index];
    let mut defined = window.iter().flatten();
    let first = match defined.next() {
        Some(&v) => v,
        None => return TrendState::Flat,
    };
    let last = match defined.last() {
        Some(&v) => v,
        None => return TrendState::Flat, // fewer than 2 samples
    };
    if first <= f64::EPSILON {
        return TrendState::Flat;
    }

    let change = last / first - 1.0;
    if change > threshold {
        TrendState::Up
    } else if change < -threshold {
        TrendState::Down
    } else {
        TrendState::Flat
    }
}

/// Convenience wrapper over [`classify_trend`] using [`TrendParams`].
#[inline]
pub fn classify_trend_with(frame: &IndicatorFrame, index: usize, params: &TrendParams) -> TrendState {
    classify_trend(frame, index, params.lookback, params.threshold)
}

// ============================================================
// TESTS
// ============================================================
