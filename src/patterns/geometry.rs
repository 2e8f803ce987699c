//! Per-pattern geometric predicates.
//!
//! All shapes are derived from body = |close - open|, upper wick =
//! high - max(open, close) and lower wick = min(open, close) - low. A
//! minimum-body filter (`body / range >= min_body_ratio`) rejects near-doji
//! noise before any shape test, except where a pattern explicitly wants a
//! small body (the star middles). Zero-range candles fail the filter and
//! therefore never match anything.

use crate::{config::PatternParams, Ohlcv, OhlcvExt};

/// Near-doji filter. A zero-range candle has no meaningful geometry and is
/// rejected outright.
#[inline]
pub(crate) fn has_meaningful_body<T: Ohlcv>(candle: &T, params: &PatternParams) -> bool {
    candle
        .body_ratio()
        .is_some_and(|r| r >= params.min_body_ratio.get())
}

// ============================================================
// SINGLE-CANDLE SHAPES
// ============================================================

/// Hammer / Hanging Man body: long lower wick, stubby upper wick. The two
/// patterns share this geometry; trend context decides which one it means.
pub(crate) fn hammer_shape<T: Ohlcv>(candle: &T, params: &PatternParams) -> bool {
    if !has_meaningful_body(candle, params) {
        return false;
    }
    let body = candle.body();
    candle.lower_wick() >= params.wick_dominance * body
        && candle.upper_wick() <= params.opposing_wick_max * body
}

/// Inverse Hammer / Shooting Star: mirror of [`hammer_shape`].
pub(crate) fn inverse_hammer_shape<T: Ohlcv>(candle: &T, params: &PatternParams) -> bool {
    if !has_meaningful_body(candle, params) {
        return false;
    }
    let body = candle.body();
    candle.upper_wick() >= params.wick_dominance * body
        && candle.lower_wick() <= params.opposing_wick_max * body
}

// ============================================================
// TWO-CANDLE SHAPES
// ============================================================

/// Bullish engulfing: a green body that fully contains and exceeds the
/// prior red body, opening at or below the prior close.
pub(crate) fn bullish_engulfing<T: Ohlcv>(prev: &T, curr: &T, params: &PatternParams) -> bool {
    prev.is_bearish()
        && curr.is_bullish()
        && has_meaningful_body(curr, params)
        && curr.body() > prev.body() * params.engulf_ratio
        && curr.open() <= prev.close()
        && curr.close() >= prev.open()
}

/// Bearish engulfing: mirror of [`bullish_engulfing`].
pub(crate) fn bearish_engulfing<T: Ohlcv>(prev: &T, curr: &T, params: &PatternParams) -> bool {
    prev.is_bullish()
        && curr.is_bearish()
        && has_meaningful_body(curr, params)
        && curr.body() > prev.body() * params.engulf_ratio
        && curr.open() >= prev.close()
        && curr.close() <= prev.open()
}

/// Piercing line: green candle opens below the prior red close (the 24/7
/// approximation of a gap down) and closes past the prior body midpoint
/// without fully engulfing it.
pub(crate) fn piercing_line<T: Ohlcv>(prev: &T, curr: &T, params: &PatternParams) -> bool {
    prev.is_bearish()
        && curr.is_bullish()
        && has_meaningful_body(curr, params)
        && curr.open() < prev.close()
        && curr.close() > prev.body_mid()
        && curr.close() < prev.open()
}

/// Dark cloud cover: mirror of [`piercing_line`]. A red candle opens above
/// the prior green close and sinks past its body midpoint.
pub(crate) fn dark_cloud_cover<T: Ohlcv>(prev: &T, curr: &T, params: &PatternParams) -> bool {
    prev.is_bullish()
        && curr.is_bearish()
        && has_meaningful_body(curr, params)
        && curr.open() > prev.close()
        && curr.close() < prev.body_mid()
        && curr.close() > prev.open()
}

// ============================================================
// THREE-CANDLE SHAPES
// ============================================================

/// Morning star: long red body, small-body star in the lower half of the
/// first body, then a long green body closing past the first midpoint.
/// The star middle is exempt from the minimum-body filter.
pub(crate) fn morning_star<T: Ohlcv>(first: &T, star: &T, third: &T, params: &PatternParams) -> bool {
    let star_body = star.body().max(f64::EPSILON);
    first.is_bearish()
        && third.is_bullish()
        && has_meaningful_body(first, params)
        && has_meaningful_body(third, params)
        && first.body() >= params.star_body_ratio * star_body
        && third.body() >= params.star_body_ratio * star_body
        && star.open().max(star.close()) < first.body_mid()
        && third.close() > first.body_mid()
}

/// Evening star: mirror of [`morning_star`].
pub(crate) fn evening_star<T: Ohlcv>(first: &T, star: &T, third: &T, params: &PatternParams) -> bool {
    let star_body = star.body().max(f64::EPSILON);
    first.is_bullish()
        && third.is_bearish()
        && has_meaningful_body(first, params)
        && has_meaningful_body(third, params)
        && first.body() >= params.star_body_ratio * star_body
        && third.body() >= params.star_body_ratio * star_body
        && star.open().min(star.close()) > first.body_mid()
        && third.close() < first.body_mid()
}

/// Three white soldiers: three advancing green candles, each opening inside
/// the prior body, with short upper wicks.
pub(crate) fn three_white_soldiers<T: Ohlcv>(
    first: &T,
    second: &T,
    third: &T,
    params: &PatternParams,
) -> bool {
    let soldiers = [first, second, third];
    if !soldiers
        .iter()
        .all(|c| c.is_bullish() && has_meaningful_body(*c, params))
    {
        return false;
    }
    if !soldiers
        .iter()
        .all(|c| c.upper_wick() <= params.opposing_wick_max * c.body())
    {
        return false;
    }
    second.close() > first.close()
        && third.close() > second.close()
        && second.open() >= first.open()
        && second.open() <= first.close()
        && third.open() >= second.open()
        && third.open() <= second.close()
}

/// Three black crows: mirror of [`three_white_soldiers`].
pub(crate) fn three_black_crows<T: Ohlcv>(
    first: &T,
    second: &T,
    third: &T,
    params: &PatternParams,
) -> bool {
    let crows = [first, second, third];
    if !crows
        .iter()
        .all(|c| c.is_bearish() && has_meaningful_body(*c, params))
    {
        return false;
    }
    if !crows
        .iter()
        .all(|c| c.lower_wick() <= params.opposing_wick_max * c.body())
    {
        return false;
    }
    second.close() < first.close()
        && third.close() < second.close()
        && second.open() <= first.open()
        && second.open() >= first.close()
        && third.open() <= second.open()
        && third.open() >= second.close()
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
    fn test_hammer_shape() {
        // body 1.0, lower wick 2.5, upper wick 0.2
        let c = candle(100.0, 101.2, 97.5, 101.0);
        assert!(hammer_shape(&c, &params()));
        // long upper wick disqualifies
        let c = candle(100.0, 103.0, 97.5, 101.0);
        assert!(!hammer_shape(&c, &params()));
    }

    #[test]
    fn test_inverse_hammer_shape() {
        // body 1.0, upper wick 2.5, lower wick 0.2
        let c = candle(100.0, 103.5, 99.8, 101.0);
        assert!(inverse_hammer_shape(&c, &params()));
        assert!(!hammer_shape(&c, &params()));
    }

    #[test]
    fn test_near_doji_rejected() {
        // body 0.05 against a 10.0 range fails the minimum-body filter
        let c = candle(100.0, 105.0, 95.0, 100.05);
        assert!(!hammer_shape(&c, &params()));
        assert!(!inverse_hammer_shape(&c, &params()));
    }

    #[test]
    fn test_zero_range_candle_matches_nothing() {
        let flat = candle(100.0, 100.0, 100.0, 100.0);
        assert!(!hammer_shape(&flat, &params()));
        assert!(!bullish_engulfing(&flat, &flat, &params()));
        assert!(!morning_star(&flat, &flat, &flat, &params()));
    }

    #[test]
    fn test_bullish_engulfing() {
        // prev: red, body 2; curr: green, body 3.5 > 2 * 1.1
        let prev = candle(94.0, 94.3, 91.8, 92.0);
        let curr = candle(91.5, 95.2, 91.3, 95.0);
        assert!(bullish_engulfing(&prev, &curr, &params()));
        assert!(!bearish_engulfing(&prev, &curr, &params()));
    }

    #[test]
    fn test_engulfing_requires_margin() {
        // Same body size is not enough; it must exceed by the ratio
        let prev = candle(94.0, 94.5, 91.5, 92.0);
        let curr = candle(92.0, 94.5, 91.5, 94.0);
        assert!(!bullish_engulfing(&prev, &curr, &params()));
    }

    #[test]
    fn test_piercing_line() {
        let prev = candle(100.0, 100.5, 95.5, 96.0);
        // opens below prior close, closes past the midpoint (98) but below
        // the prior open
        let curr = candle(95.0, 99.5, 94.8, 99.0);
        assert!(piercing_line(&prev, &curr, &params()));
        // full engulf is not a piercing line
        let engulf = candle(95.0, 101.0, 94.8, 100.5);
        assert!(!piercing_line(&prev, &engulf, &params()));
    }

    #[test]
    fn test_dark_cloud_cover() {
        let prev = candle(96.0, 100.5, 95.5, 100.0);
        let curr = candle(101.0, 101.2, 96.5, 97.0);
        assert!(dark_cloud_cover(&prev, &curr, &params()));
    }

    #[test]
    fn test_morning_star() {
        let first = candle(100.0, 100.5, 95.5, 96.0); // long red
        let star = candle(95.5, 96.0, 95.0, 95.3); // small body, below mid (98)
        let third = candle(95.8, 100.0, 95.5, 99.5); // long green past mid
        assert!(morning_star(&first, &star, &third, &params()));
        assert!(!evening_star(&first, &star, &third, &params()));
    }

    #[test]
    fn test_evening_star() {
        let first = candle(96.0, 100.5, 95.5, 100.0); // long green
        let star = candle(100.5, 101.0, 100.2, 100.7); // small body above mid (98)
        let third = candle(100.2, 100.4, 95.8, 96.2); // long red past mid
        assert!(evening_star(&first, &star, &third, &params()));
    }

    #[test]
    fn test_three_white_soldiers() {
        let a = candle(100.0, 102.2, 99.8, 102.0);
        let b = candle(101.0, 103.3, 100.8, 103.0);
        let c = candle(102.0, 104.4, 101.8, 104.0);
        assert!(three_white_soldiers(&a, &b, &c, &params()));
        // Opening outside the prior body breaks the nesting requirement
        let gap = candle(104.5, 106.6, 104.3, 106.0);
        assert!(!three_white_soldiers(&b, &c, &gap, &params()));
    }

    #[test]
    fn test_three_black_crows() {
        let a = candle(104.0, 104.2, 101.8, 102.0);
        let b = candle(103.0, 103.2, 100.8, 101.0);
        let c = candle(102.0, 102.2, 99.8, 100.0);
        assert!(three_black_crows(&a, &b, &c, &params()));
    }
}
