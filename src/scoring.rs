//! Multi-factor reversal scoring.
//!
//! The model reads the indicator frame, the candle geometry and a set of
//! optional derivatives metrics (open interest, funding, long/short ratio)
//! and produces a bounded conviction score for a reversal *against* the
//! prevailing market bias: a downtrend is scored for a long reversal, an
//! uptrend for a short reversal.
//!
//! Points accrue in five independently capped groups (technical, momentum,
//! open interest, positioning, volume/candle). A group whose inputs are
//! missing contributes zero and logs at debug level; it never fails the
//! evaluation. The grand total is clamped to 0..=100 on top of the caps.

use tracing::debug;

use crate::{
    config::SignalConfig,
    confirm::{confirm, ConfirmationResult},
    indicators::{IndicatorEngine, IndicatorFrame},
    patterns::{detect_in_trend, PatternMatch, Polarity},
    trend::classify_trend_with,
    validate_series, Ohlcv, OhlcvExt, Result, SignalError,
};

// ============================================================
// VERDICT TYPES
// ============================================================

/// Prevailing market regime relative to the long EMAs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum MarketBias {
    /// Price below both trend EMAs
    Downtrend,
    /// Price above both trend EMAs
    Uptrend,
    /// Price between the EMAs, no clean regime
    Ranging,
}

/// Direction of the reversal being scored.
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub enum SignalType {
    /// Bottom fishing: reversal up out of a downtrend
    LongReversal,
    /// Top calling: reversal down out of an uptrend
    ShortReversal,
}

impl SignalType {
    pub fn polarity(self) -> Polarity {
        match self {
            SignalType::LongReversal => Polarity::Bullish,
            SignalType::ShortReversal => Polarity::Bearish,
        }
    }
}

/// Optional derivatives metrics supplied alongside the candle series.
///
/// `open_interest` is right-aligned with the candles: its last reading
/// belongs to the last candle. All fields default to absent; absence
/// degrades the related score groups to zero rather than erroring.
#[derive(Debug, Clone, Default, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct AuxMetrics {
    pub open_interest: Vec<f64>,
    /// Current funding rate, e.g. 0.0001 = 0.01% per interval
    pub funding_rate: Option<f64>,
    /// Fraction of accounts positioned long, in [0, 1]
    pub long_ratio: Option<f64>,
}

/// Per-group score contributions, each already capped.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
pub struct FactorBreakdown {
    pub technical: u8,
    pub momentum: u8,
    pub open_interest: u8,
    pub positioning: u8,
    pub volume_candle: u8,
}

impl FactorBreakdown {
    /// Sum of the groups, clamped to 100.
    pub fn total(&self) -> u8 {
        let sum = u16::from(self.technical)
            + u16::from(self.momentum)
            + u16::from(self.open_interest)
            + u16::from(self.positioning)
            + u16::from(self.volume_candle);
        sum.min(100) as u8
    }
}

/// Scored evaluation of one candle index.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct ReversalVerdict {
    /// Open timestamp of the evaluated candle, when the source carries one
    pub open_time: Option<i64>,
    pub bias: MarketBias,
    pub signal: SignalType,
    pub total_score: u8,
    pub breakdown: FactorBreakdown,
    /// Close of the evaluated candle
    pub reference_price: f64,
    /// RSI at the evaluated candle, if past warmup
    pub reference_rsi: Option<f64>,
}

/// Full pipeline output for the latest candle: the scored verdict plus the
/// pattern and confirmation context around it.
#[derive(Debug, Clone, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Analysis {
    pub verdict: ReversalVerdict,
    pub pattern: Option<PatternMatch>,
    pub confirmations: ConfirmationResult,
}

// ============================================================
// MODEL
// ============================================================

/// The reversal scoring model: configuration plus an indicator engine.
#[derive(Debug, Clone)]
pub struct ReversalModel {
    config: SignalConfig,
    engine: IndicatorEngine,
}

impl ReversalModel {
    pub fn new(config: SignalConfig) -> Result<Self> {
        config.validate()?;
        let engine = IndicatorEngine::new(config.indicators)?;
        Ok(Self { config, engine })
    }

    pub fn with_defaults() -> Self {
        Self {
            config: SignalConfig::default(),
            engine: IndicatorEngine::with_defaults(),
        }
    }

    pub fn config(&self) -> &SignalConfig {
        &self.config
    }

    /// Score the latest candle.
    pub fn evaluate_latest<T: Ohlcv>(&self, candles: &[T], aux: &AuxMetrics) -> Result<ReversalVerdict> {
        if candles.is_empty() {
            return Err(SignalError::InsufficientData {
                need: self.engine.min_bars(),
                got: 0,
            });
        }
        self.evaluate(candles, aux, candles.len() - 1)
    }

    /// Score the candle at `index`.
    ///
    /// The index must have the full indicator warmup behind it; anything
    /// earlier is [`SignalError::InsufficientData`]. Missing auxiliary
    /// metrics zero their groups instead of erroring.
    pub fn evaluate<T: Ohlcv>(
        &self,
        candles: &[T],
        aux: &AuxMetrics,
        index: usize,
    ) -> Result<ReversalVerdict> {
        validate_series(candles)?;
        let need = self.engine.min_bars();
        if index >= candles.len() || index + 1 < need {
            return Err(SignalError::InsufficientData {
                need,
                got: candles.len().min(index + 1),
            });
        }

        let frame = self.engine.compute(candles)?;
        self.score_at(candles, &frame, aux, index)
    }

    /// Full pipeline over the latest candle: verdict, trend-gated pattern
    /// and confirmations in one pass over a single indicator frame.
    pub fn analyze<T: Ohlcv>(&self, candles: &[T], aux: &AuxMetrics) -> Result<Analysis> {
        if candles.is_empty() {
            return Err(SignalError::InsufficientData {
                need: self.engine.min_bars(),
                got: 0,
            });
        }
        validate_series(candles)?;
        let index = candles.len() - 1;
        if index + 1 < self.engine.min_bars() {
            return Err(SignalError::InsufficientData {
                need: self.engine.min_bars(),
                got: candles.len(),
            });
        }

        let frame = self.engine.compute(candles)?;
        let verdict = self.score_at(candles, &frame, aux, index)?;

        let state = classify_trend_with(&frame, index, &self.config.trend);
        let pattern = detect_in_trend(candles, index, state, &self.config.patterns);
        let polarity = pattern
            .map(|m| m.polarity)
            .unwrap_or_else(|| verdict.signal.polarity());
        let confirmations = confirm(candles, &frame, polarity, &self.config.confirmation);

        Ok(Analysis {
            verdict,
            pattern,
            confirmations,
        })
    }

    // ------------------------------------------------------------
    // Scoring internals
    // ------------------------------------------------------------

    fn score_at<T: Ohlcv>(
        &self,
        candles: &[T],
        frame: &IndicatorFrame,
        aux: &AuxMetrics,
        index: usize,
    ) -> Result<ReversalVerdict> {
        let close = candles[index].close();
        let bias = self.classify_bias(frame, index, close);
        let signal = match bias {
            MarketBias::Downtrend => SignalType::LongReversal,
            MarketBias::Uptrend => SignalType::ShortReversal,
            // No clean regime: score the contrarian side of the slow EMA
            MarketBias::Ranging => {
                let slow = IndicatorFrame::at(&frame.ema_slow, index).unwrap_or(close);
                if close <= slow {
                    SignalType::LongReversal
                } else {
                    SignalType::ShortReversal
                }
            }
        };

        let weights = &self.config.weights;
        let breakdown = FactorBreakdown {
            technical: self
                .technical_points(candles, frame, index, signal)
                .min(u16::from(weights.technical_cap)) as u8,
            momentum: self
                .momentum_points(frame, index, signal)
                .min(u16::from(weights.momentum_cap)) as u8,
            open_interest: self
                .open_interest_points(candles, aux, index, signal)
                .min(u16::from(weights.oi_cap)) as u8,
            positioning: self
                .positioning_points(aux, signal)
                .min(u16::from(weights.positioning_cap)) as u8,
            volume_candle: self
                .volume_candle_points(candles, index, signal)
                .min(u16::from(weights.volume_candle_cap)) as u8,
        };

        Ok(ReversalVerdict {
            open_time: candles[index].open_time(),
            bias,
            signal,
            total_score: breakdown.total(),
            breakdown,
            reference_price: close,
            reference_rsi: IndicatorFrame::at(&frame.rsi, index),
        })
    }

    fn classify_bias(&self, frame: &IndicatorFrame, index: usize, close: f64) -> MarketBias {
        let (Some(fast), Some(slow)) = (
            IndicatorFrame::at(&frame.ema_fast, index),
            IndicatorFrame::at(&frame.ema_slow, index),
        ) else {
            return MarketBias::Ranging;
        };
        if close < fast && close < slow {
            MarketBias::Downtrend
        } else if close > fast && close > slow {
            MarketBias::Uptrend
        } else {
            MarketBias::Ranging
        }
    }

    /// RSI extremes plus price/RSI divergence.
    fn technical_points<T: Ohlcv>(
        &self,
        candles: &[T],
        frame: &IndicatorFrame,
        index: usize,
        signal: SignalType,
    ) -> u16 {
        let t = &self.config.thresholds;
        let w = &self.config.weights;
        let Some(rsi) = IndicatorFrame::at(&frame.rsi, index) else {
            return 0;
        };

        let mut points = 0u16;
        match signal {
            SignalType::LongReversal => {
                if rsi < t.rsi_oversold {
                    points += u16::from(w.rsi_extreme);
                }
                if rsi < t.rsi_deep_oversold {
                    points += u16::from(w.rsi_deep_extreme);
                }
            }
            SignalType::ShortReversal => {
                if rsi > t.rsi_overbought {
                    points += u16::from(w.rsi_extreme);
                }
                if rsi > t.rsi_deep_overbought {
                    points += u16::from(w.rsi_deep_extreme);
                }
            }
        }
        if self.divergence(candles, frame, index, signal) {
            points += u16::from(w.divergence);
        }
        points
    }

    /// Price retests its window extreme while RSI refuses to follow.
    fn divergence<T: Ohlcv>(
        &self,
        candles: &[T],
        frame: &IndicatorFrame,
        index: usize,
        signal: SignalType,
    ) -> bool {
        let t = &self.config.thresholds;
        let lookback = t.divergence_lookback.get();
        if index < lookback {
            return false;
        }
        let Some(rsi) = IndicatorFrame::at(&frame.rsi, index) else {
            return false;
        };
        let start = index - lookback;
        let prior = start..index;

        match signal {
            SignalType::LongReversal => {
                let mut prior_low = f64::INFINITY;
                for i in prior.clone() {
                    prior_low = prior_low.min(candles[i].low());
                }
                let mut prior_rsi_low = f64::INFINITY;
                for i in prior {
                    if let Some(r) = IndicatorFrame::at(&frame.rsi, i) {
                        prior_rsi_low = prior_rsi_low.min(r);
                    }
                }
                if !prior_low.is_finite() || !prior_rsi_low.is_finite() {
                    return false;
                }
                candles[index].low() <= prior_low * (1.0 + t.divergence_price_tolerance)
                    && rsi >= prior_rsi_low + t.divergence_rsi_margin
            }
            SignalType::ShortReversal => {
                let mut prior_high = f64::NEG_INFINITY;
                for i in prior.clone() {
                    prior_high = prior_high.max(candles[i].high());
                }
                let mut prior_rsi_high = f64::NEG_INFINITY;
                for i in prior {
                    if let Some(r) = IndicatorFrame::at(&frame.rsi, i) {
                        prior_rsi_high = prior_rsi_high.max(r);
                    }
                }
                if !prior_high.is_finite() || !prior_rsi_high.is_finite() {
                    return false;
                }
                candles[index].high() >= prior_high * (1.0 - t.divergence_price_tolerance)
                    && rsi <= prior_rsi_high - t.divergence_rsi_margin
            }
        }
    }

    /// MACD histogram turning, a fresh cross, or a recent cross still
    /// within the margin on the reversal side of the signal line.
    fn momentum_points(&self, frame: &IndicatorFrame, index: usize, signal: SignalType) -> u16 {
        let t = &self.config.thresholds;
        let w = &self.config.weights;
        if index == 0 {
            return 0;
        }
        let values = (
            IndicatorFrame::at(&frame.macd_line, index),
            IndicatorFrame::at(&frame.macd_signal, index),
            IndicatorFrame::at(&frame.macd_line, index - 1),
            IndicatorFrame::at(&frame.macd_signal, index - 1),
            IndicatorFrame::at(&frame.macd_hist, index),
            IndicatorFrame::at(&frame.macd_hist, index - 1),
        );
        let (Some(macd), Some(sig), Some(macd_prev), Some(sig_prev), Some(hist), Some(hist_prev)) =
            values
        else {
            return 0;
        };

        let mut points = 0u16;
        match signal {
            SignalType::LongReversal => {
                if hist < 0.0 && hist_prev < 0.0 && hist > hist_prev {
                    points += u16::from(w.hist_momentum);
                }
                if macd_prev <= sig_prev && macd > sig {
                    points += u16::from(w.fresh_cross);
                } else if macd > sig && (macd - sig) < t.near_cross_margin {
                    // Crossed up a few bars back and still hugging the
                    // signal line: half the cross points
                    points += u16::from(w.near_cross);
                }
            }
            SignalType::ShortReversal => {
                if hist > 0.0 && hist_prev > 0.0 && hist < hist_prev {
                    points += u16::from(w.hist_momentum);
                }
                if macd_prev >= sig_prev && macd < sig {
                    points += u16::from(w.fresh_cross);
                } else if macd < sig && (sig - macd) < t.near_cross_margin {
                    points += u16::from(w.near_cross);
                }
            }
        }
        points
    }

    /// Open-interest and funding behavior: a flush (positions forced out),
    /// a funding-confirmed squeeze build-up (OI expanding while the crowded
    /// side pays extreme funding), or OI refusing to back the latest move.
    fn open_interest_points<T: Ohlcv>(
        &self,
        candles: &[T],
        aux: &AuxMetrics,
        index: usize,
        signal: SignalType,
    ) -> u16 {
        let t = &self.config.thresholds;
        let w = &self.config.weights;
        let window = t.oi_window.get();
        let oi = &aux.open_interest;

        // Right-aligned: the last reading belongs to the last candle.
        let offset = candles.len() - 1 - index;
        if oi.len() < offset + 1 + window {
            if oi.is_empty() {
                debug!("open interest absent; OI group scores 0");
            } else {
                debug!(
                    readings = oi.len(),
                    window, "open interest history too short; OI group scores 0"
                );
            }
            return 0;
        }
        let oi_idx = oi.len() - 1 - offset;
        let baseline: f64 =
            oi[oi_idx - window..oi_idx].iter().sum::<f64>() / window as f64;
        if baseline <= f64::EPSILON {
            return 0;
        }
        let oi_change = oi[oi_idx] / baseline - 1.0;

        let mut points = 0u16;
        if oi_change <= -t.oi_change_threshold {
            // Positions closed out en masse: the crowded side has left
            points += u16::from(w.oi_flush);
        } else if oi_change >= t.oi_change_threshold {
            // OI expansion alone is ambiguous; it is squeeze fuel only when
            // funding shows the crowded side paying to hold
            let crowded = match (signal, aux.funding_rate) {
                (SignalType::LongReversal, Some(f)) => f <= -t.funding_extreme,
                (SignalType::ShortReversal, Some(f)) => f >= t.funding_extreme,
                (_, None) => false,
            };
            if crowded {
                points += u16::from(w.oi_squeeze);
            }
        }

        // The latest push extends the move but OI contracts: nobody is
        // backing it with new positions
        if index >= 1 && oi_idx >= 1 {
            let price_extends = match signal {
                SignalType::LongReversal => {
                    candles[index].close() < candles[index - 1].close()
                }
                SignalType::ShortReversal => {
                    candles[index].close() > candles[index - 1].close()
                }
            };
            if price_extends && oi[oi_idx] < oi[oi_idx - 1] {
                points += u16::from(w.oi_price_disagreement);
            }
        }
        points
    }

    /// Crowded positioning from the long/short account ratio alone;
    /// funding belongs to the open-interest group.
    fn positioning_points(&self, aux: &AuxMetrics, signal: SignalType) -> u16 {
        let t = &self.config.thresholds;
        let w = &self.config.weights;
        let Some(ratio) = aux.long_ratio else {
            debug!("long/short ratio absent; positioning group scores 0");
            return 0;
        };

        let mut points = 0u16;
        let (skewed, extreme) = match signal {
            // Few longs left means the short side is crowded
            SignalType::LongReversal => {
                (ratio < t.long_ratio_low, ratio < t.long_ratio_very_low)
            }
            SignalType::ShortReversal => {
                (ratio > t.long_ratio_high, ratio > t.long_ratio_very_high)
            }
        };
        if skewed {
            points += u16::from(w.positioning_skew);
        }
        if extreme {
            points += u16::from(w.positioning_extreme);
        }
        points
    }

    /// Capitulation tells on the evaluated candle: a volume surge against
    /// the trailing baseline and an exhaustion wick into the move.
    fn volume_candle_points<T: Ohlcv>(
        &self,
        candles: &[T],
        index: usize,
        signal: SignalType,
    ) -> u16 {
        let t = &self.config.thresholds;
        let w = &self.config.weights;
        let mut points = 0u16;

        let window = t.volume_window.get();
        if index >= window {
            let baseline: f64 = candles[index - window..index]
                .iter()
                .map(|c| c.volume())
                .sum::<f64>()
                / window as f64;
            if baseline > f64::EPSILON
                && candles[index].volume() >= baseline * t.volume_surge_ratio
            {
                points += u16::from(w.volume_surge);
            }
        }

        let candle = &candles[index];
        let body = candle.body();
        if body > f64::EPSILON {
            let exhausted = match signal {
                // Long lower wick: sellers pushed down and were absorbed
                SignalType::LongReversal => candle.lower_wick() >= t.wick_dominance * body,
                SignalType::ShortReversal => candle.upper_wick() >= t.wick_dominance * body,
            };
            if exhausted {
                points += u16::from(w.exhaustion_wick);
            }
        }
        points
    }
}

// ============================================================
// TESTS
// ============================================================
