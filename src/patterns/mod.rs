//! Trend-aware candlestick pattern recognition.
//!
//! The decision surface is a pair of priority-ordered candidate tables, one
//! per trend direction: a downtrend only admits bullish-reversal shapes, an
//! uptrend only bearish-reversal shapes, and a flat market admits nothing
//! (there is no established trend to revert from). The first candidate that
//! matches wins, so an evaluation yields at most one [`PatternMatch`].
//!
//! Each pattern is a named entry dispatching to a geometric predicate in
//! [`geometry`]; adding a pattern means adding a variant and a table entry,
//! not another branch in a conditional ladder.

pub mod geometry;

use crate::{
    config::{PatternParams, TrendParams},
    indicators::IndicatorFrame,
    trend::{classify_trend_with, TrendState},
    Ohlcv,
};

// ============================================================
// PATTERN KINDS
// ============================================================

/// Signal direction of a matched pattern.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum Polarity {
    Bullish,
    Bearish,
}

/// Supported candlestick reversal patterns.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, serde::Serialize, serde::Deserialize)]
pub enum PatternKind {
    // Bullish reversals (evaluated in a downtrend)
    Hammer,
    InverseHammer,
    BullishEngulfing,
    PiercingLine,
    MorningStar,
    ThreeWhiteSoldiers,
    // Bearish reversals (evaluated in an uptrend)
    HangingMan,
    ShootingStar,
    BearishEngulfing,
    EveningStar,
    ThreeBlackCrows,
    DarkCloudCover,
}

impl PatternKind {
    /// Bullish-reversal candidates in priority order.
    pub const BULLISH_PRIORITY: [PatternKind; 6] = [
        PatternKind::Hammer,
        PatternKind::InverseHammer,
        PatternKind::BullishEngulfing,
        PatternKind::PiercingLine,
        PatternKind::MorningStar,
        PatternKind::ThreeWhiteSoldiers,
    ];

    /// Bearish-reversal candidates in priority order.
    pub const BEARISH_PRIORITY: [PatternKind; 6] = [
        PatternKind::HangingMan,
        PatternKind::ShootingStar,
        PatternKind::BearishEngulfing,
        PatternKind::EveningStar,
        PatternKind::ThreeBlackCrows,
        PatternKind::DarkCloudCover,
    ];

    pub fn polarity(self) -> Polarity {
        match self {
            PatternKind::Hammer
            | PatternKind::InverseHammer
            | PatternKind::BullishEngulfing
            | PatternKind::PiercingLine
            | PatternKind::MorningStar
            | PatternKind::ThreeWhiteSoldiers => Polarity::Bullish,
            PatternKind::HangingMan
            | PatternKind::ShootingStar
            | PatternKind::BearishEngulfing
            | PatternKind::EveningStar
            | PatternKind::ThreeBlackCrows
            | PatternKind::DarkCloudCover => Polarity::Bearish,
        }
    }

    /// Candles the pattern spans.
    pub fn min_candles(self) -> usize {
        match self {
            PatternKind::Hammer
            | PatternKind::InverseHammer
            | PatternKind::HangingMan
            | PatternKind::ShootingStar => 1,
            PatternKind::BullishEngulfing
            | PatternKind::PiercingLine
            | PatternKind::BearishEngulfing
            | PatternKind::DarkCloudCover => 2,
            PatternKind::MorningStar
            | PatternKind::ThreeWhiteSoldiers
            | PatternKind::EveningStar
            | PatternKind::ThreeBlackCrows => 3,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PatternKind::Hammer => "Hammer",
            PatternKind::InverseHammer => "Inverse Hammer",
            PatternKind::BullishEngulfing => "Bullish Engulfing",
            PatternKind::PiercingLine => "Piercing Line",
            PatternKind::MorningStar => "Morning Star",
            PatternKind::ThreeWhiteSoldiers => "Three White Soldiers",
            PatternKind::HangingMan => "Hanging Man",
            PatternKind::ShootingStar => "Shooting Star",
            PatternKind::BearishEngulfing => "Bearish Engulfing",
            PatternKind::EveningStar => "Evening Star",
            PatternKind::ThreeBlackCrows => "Three Black Crows",
            PatternKind::DarkCloudCover => "Dark Cloud Cover",
        }
    }

    /// Geometric test at `index`. The caller has already checked that
    /// enough candles precede the index.
    fn matches<T: Ohlcv>(self, candles: &[T], index: usize, params: &PatternParams) -> bool {
        let curr = &candles[index];
        match self {
            PatternKind::Hammer | PatternKind::HangingMan => {
                geometry::hammer_shape(curr, params)
            }
            PatternKind::InverseHammer | PatternKind::ShootingStar => {
                geometry::inverse_hammer_shape(curr, params)
            }
            PatternKind::BullishEngulfing => {
                geometry::bullish_engulfing(&candles[index - 1], curr, params)
            }
            PatternKind::BearishEngulfing => {
                geometry::bearish_engulfing(&candles[index - 1], curr, params)
            }
            PatternKind::PiercingLine => {
                geometry::piercing_line(&candles[index - 1], curr, params)
            }
            PatternKind::DarkCloudCover => {
                geometry::dark_cloud_cover(&candles[index - 1], curr, params)
            }
            PatternKind::MorningStar => {
                geometry::morning_star(&candles[index - 2], &candles[index - 1], curr, params)
            }
            PatternKind::EveningStar => {
                geometry::evening_star(&candles[index - 2], &candles[index - 1], curr, params)
            }
            PatternKind::ThreeWhiteSoldiers => geometry::three_white_soldiers(
                &candles[index - 2],
                &candles[index - 1],
                curr,
                params,
            ),
            PatternKind::ThreeBlackCrows => geometry::three_black_crows(
                &candles[index - 2],
                &candles[index - 1],
                curr,
                params,
            ),
        }
    }
}

/// A recognized pattern at a specific index.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct PatternMatch {
    pub kind: PatternKind,
    pub polarity: Polarity,
    pub index: usize,
}

// ============================================================
// DETECTION
// ============================================================

/// Detect a reversal pattern at `index`, gating the candidate family on the
/// local trend derived from the indicator frame.
pub fn detect<T: Ohlcv>(
    candles: &[T],
    frame: &IndicatorFrame,
    index: usize,
    trend: &TrendParams,
    params: &PatternParams,
) -> Option<PatternMatch> {
    let state = classify_trend_with(frame, index, trend);
    detect_in_trend(candles, index, state, params)
}

/// Detect a reversal pattern against an already-classified trend state.
pub fn detect_in_trend<T: Ohlcv>(
    candles: &[T],
    index: usize,
    state: TrendState,
    params: &PatternParams,
) -> Option<PatternMatch> {
    if index >= candles.len() {
        return None;
    }

    let table: &[PatternKind] = match state {
        TrendState::Down => &PatternKind::BULLISH_PRIORITY,
        TrendState::Up => &PatternKind::BEARISH_PRIORITY,
        TrendState::Flat => return None,
    };

    table
        .iter()
        .copied()
        .find(|kind| index + 1 >= kind.min_candles() && kind.matches(candles, index, params))
        .map(|kind| PatternMatch {
            kind,
            polarity: kind.polarity(),
            index,
        })
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::Candle;

    fn candle(o: f64, h: f64, l: f64, c: f64) -> Candle {
        Candle::new(0, 1, o, h, l, c, 1000.0)
    }

    fn params() -> PatternParams {
        PatternParams::default()
    }

    #[test]
    fn test_flat_trend_suppresses_all_patterns() {
        // A textbook hammer that would match in a downtrend
        let candles = vec![candle(100.0, 101.2, 97.5, 101.0)];
        let m = detect_in_trend(&candles, 0, TrendState::Flat, &params());
        assert!(m.is_none());
    }

    #[test]
    fn test_downtrend_matches_bullish_family_only() {
        // Dark cloud cover shape, which is a bearish candidate; in a
        // downtrend only the bullish table is consulted.
        let candles = vec![
            candle(96.0, 100.5, 95.5, 100.0),
            candle(101.0, 101.2, 96.5, 97.0),
        ];
        assert!(detect_in_trend(&candles, 1, TrendState::Down, &params()).is_none());
        let m = detect_in_trend(&candles, 1, TrendState::Up, &params()).unwrap();
        assert_eq!(m.kind, PatternKind::DarkCloudCover);
        assert_eq!(m.polarity, Polarity::Bearish);
    }

    #[test]
    fn test_priority_order_first_match_wins() {
        // A hammer in a downtrend outranks everything after it in the table
        let candles = vec![
            candle(100.0, 100.5, 99.0, 99.5),
            candle(99.0, 100.2, 96.5, 100.0),
        ];
        let m = detect_in_trend(&candles, 1, TrendState::Down, &params()).unwrap();
        assert_eq!(m.kind, PatternKind::Hammer);
        assert_eq!(m.index, 1);
    }

    #[test]
    fn test_same_shape_named_by_trend() {
        let hammer = candle(100.0, 101.2, 97.5, 101.0);
        let candles = vec![hammer];
        let down = detect_in_trend(&candles, 0, TrendState::Down, &params()).unwrap();
        assert_eq!(down.kind, PatternKind::Hammer);
        let up = detect_in_trend(&candles, 0, TrendState::Up, &params()).unwrap();
        assert_eq!(up.kind, PatternKind::HangingMan);
    }

    #[test]
    fn test_multi_candle_patterns_need_history() {
        // Index 0 cannot host a two- or three-candle pattern
        let star = vec![candle(96.0, 100.5, 95.5, 100.0)];
        let m = detect_in_trend(&star, 0, TrendState::Up, &params());
        // The single-candle candidates simply do not match this shape
        assert!(m.is_none());
    }

    #[test]
    fn test_three_crows_detected_in_uptrend() {
        let candles = vec![
            candle(104.0, 104.2, 101.8, 102.0),
            candle(103.0, 103.2, 100.8, 101.0),
            candle(102.0, 102.2, 99.8, 100.0),
        ];
        let m = detect_in_trend(&candles, 2, TrendState::Up, &params()).unwrap();
        assert_eq!(m.kind, PatternKind::ThreeBlackCrows);
    }

    #[test]
    fn test_priority_tables_are_polarity_consistent() {
        for kind in PatternKind::BULLISH_PRIORITY {
            assert_eq!(kind.polarity(), Polarity::Bullish);
        }
        for kind in PatternKind::BEARISH_PRIORITY {
            assert_eq!(kind.polarity(), Polarity::Bearish);
        }
    }
}
