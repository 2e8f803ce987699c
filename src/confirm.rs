//! Confirmation layer: independent checks that corroborate or contradict a
//! recognized pattern.
//!
//! The three predicates (volume expansion, RSI exhaustion, MACD momentum
//! shift) are evaluated over the tail of the series and never short-circuit
//! each other. Insufficient history (< 3 rows, or an indicator still in its
//! warmup) makes a predicate `false`; the layer never errors.

use crate::{
    config::ConfirmationParams,
    indicators::IndicatorFrame,
    patterns::Polarity,
    Ohlcv,
};

/// Outcome of the three independent confirmation checks.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct ConfirmationResult {
    pub volume_confirmed: bool,
    pub oscillator_confirmed: bool,
    pub momentum_confirmed: bool,
}

impl ConfirmationResult {
    /// Number of checks that passed.
    pub fn count(&self) -> usize {
        usize::from(self.volume_confirmed)
            + usize::from(self.oscillator_confirmed)
            + usize::from(self.momentum_confirmed)
    }

    pub fn any(&self) -> bool {
        self.count() > 0
    }
}

/// Run all three confirmation checks for a pattern of the given polarity.
pub fn confirm<T: Ohlcv>(
    candles: &[T],
    frame: &IndicatorFrame,
    polarity: Polarity,
    params: &ConfirmationParams,
) -> ConfirmationResult {
    ConfirmationResult {
        volume_confirmed: volume_expansion(candles, params),
        oscillator_confirmed: oscillator_exhaustion(frame, polarity, params),
        momentum_confirmed: momentum_shift(frame, polarity),
    }
}

/// Last volume exceeds the average of the preceding `lookback` candles by
/// the configured multiplier.
pub fn volume_expansion<T: Ohlcv>(candles: &[T], params: &ConfirmationParams) -> bool {
    let lookback = params.volume_lookback.get();
    if candles.len() < 3 || candles.len() <= lookback {
        return false;
    }
    let last = candles.len() - 1;
    let baseline: f64 = candles[last - lookback..last]
        .iter()
        .map(|c| c.volume())
        .sum::<f64>()
        / lookback as f64;
    candles[last].volume() > baseline * params.volume_multiplier
}

/// RSI rolled over out of an extreme zone: the previous reading was beyond
/// the overbought (bearish) or oversold (bullish) threshold and the latest
/// reading moved back toward neutral.
pub fn oscillator_exhaustion(
    frame: &IndicatorFrame,
    polarity: Polarity,
    params: &ConfirmationParams,
) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let last = frame.len() - 1;
    let (Some(curr), Some(prev)) = (
        IndicatorFrame::at(&frame.rsi, last),
        IndicatorFrame::at(&frame.rsi, last - 1),
    ) else {
        return false;
    };
    match polarity {
        Polarity::Bearish => curr < prev && prev > params.rsi_overbought,
        Polarity::Bullish => curr > prev && prev < params.rsi_oversold,
    }
}

/// MACD cross in the pattern's direction, or the histogram weakening while
/// still on the opposing side of zero.
pub fn momentum_shift(frame: &IndicatorFrame, polarity: Polarity) -> bool {
    if frame.len() < 3 {
        return false;
    }
    let last = frame.len() - 1;
    let values = (
        IndicatorFrame::at(&frame.macd_line, last),
        IndicatorFrame::at(&frame.macd_signal, last),
        IndicatorFrame::at(&frame.macd_line, last - 1),
        IndicatorFrame::at(&frame.macd_signal, last - 1),
        IndicatorFrame::at(&frame.macd_hist, last),
        IndicatorFrame::at(&frame.macd_hist, last - 1),
    );
    let (Some(macd), Some(signal), Some(macd_prev), Some(signal_prev), Some(hist), Some(hist_prev)) =
        values
    else {
        return false;
    };

    match polarity {
        Polarity::Bullish => {
            let golden_cross = macd_prev <= signal_prev && macd > signal;
            // Downside momentum fading: histogram still negative but rising
            let fading = hist < 0.0 && hist_prev < 0.0 && hist > hist_prev;
            golden_cross || fading
        }
        Polarity::Bearish => {
            let dead_cross = macd_prev >= signal_prev && macd < signal;
            let fading = hist > 0.0 && hist_prev > 0.0 && hist < hist_prev;
            dead_cross || fading
        }
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;
    use crate::{indicators::IndicatorEngine, Candle};

    fn candle_with_volume(i: usize, base: f64, volume: f64) -> Candle {
        Candle::new(
            i as i64 * 60_000,
            (i as i64 + 1) * 60_000 - 1,
            base,
            base + 1.0,
            base - 1.0,
            base + 0.5,
            volume,
        )
    }

    #[test]
    fn test_volume_expansion() {
        let params = ConfirmationParams::default();
        let mut candles: Vec<Candle> =
            (0..30).map(|i| candle_with_volume(i, 100.0, 1000.0)).collect();
        assert!(!volume_expansion(&candles, &params));

        // 2x the trailing average clears the 1.5x multiplier
        candles.push(candle_with_volume(30, 100.0, 2000.0));
        assert!(volume_expansion(&candles, &params));

        // 1.2x does not
        candles.pop();
        candles.push(candle_with_volume(30, 100.0, 1200.0));
        assert!(!volume_expansion(&candles, &params));
    }

    #[test]
    fn test_volume_expansion_needs_history() {
        let params = ConfirmationParams::default();
        let candles: Vec<Candle> = (0..3).map(|i| candle_with_volume(i, 100.0, 1000.0)).collect();
        // Fewer rows than the lookback: false, never an error
        assert!(!volume_expansion(&candles, &params));
    }

    #[test]
    fn test_oscillator_exhaustion_bearish() {
        let params = ConfirmationParams::default();
        // Long rally pins RSI far above 70, then two red candles roll it over
        let mut candles: Vec<Candle> = (0..50)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                Candle::new(
                    i as i64 * 60_000,
                    (i as i64 + 1) * 60_000 - 1,
                    base,
                    base + 2.5,
                    base - 0.5,
                    base + 2.0,
                    1000.0,
                )
            })
            .collect();
        let top = 100.0 + 49.0 * 2.0;
        candles.push(Candle::new(
            50 * 60_000,
            51 * 60_000 - 1,
            top,
            top + 0.5,
            top - 6.0,
            top - 5.0,
            1000.0,
        ));
        let frame = IndicatorEngine::with_defaults().compute(&candles).unwrap();
        assert!(oscillator_exhaustion(&frame, Polarity::Bearish, &params));
        assert!(!oscillator_exhaustion(&frame, Polarity::Bullish, &params));
    }

    #[test]
    fn test_momentum_shift_fading_histogram() {
        // Rally then a stall bar: the histogram stays positive but shrinks
        // as the signal line catches up to the MACD line
        let mut candles: Vec<Candle> = (0..50)
            .map(|i| {
                let base = 100.0 + i as f64 * 2.0;
                candle_with_volume(i, base, 1000.0)
            })
            .collect();
        candles.push(candle_with_volume(50, 198.0, 1000.0));
        let frame = IndicatorEngine::with_defaults().compute(&candles).unwrap();
        assert!(momentum_shift(&frame, Polarity::Bearish));
        assert!(!momentum_shift(&frame, Polarity::Bullish));
    }

    #[test]
    fn test_predicates_are_independent() {
        let params = ConfirmationParams::default();
        // Flat series: nothing confirms, and nothing errors
        let candles: Vec<Candle> = (0..60).map(|i| candle_with_volume(i, 100.0, 1000.0)).collect();
        let frame = IndicatorEngine::with_defaults().compute(&candles).unwrap();
        let result = confirm(&candles, &frame, Polarity::Bullish, &params);
        assert!(!result.volume_confirmed);
        assert!(!result.oscillator_confirmed);
        assert_eq!(result.count(), 0);
        assert!(!result.any());
    }
}
