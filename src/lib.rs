//! # revsig - Reversal Signal Pipeline
//!
//! Trend-aware reversal scoring for OHLCV candle series.
//!
//! The crate is a pure, synchronous signal-processing pipeline: raw candles
//! flow through an indicator engine (EMA, RSI, MACD, Bollinger, KDJ), a
//! trend classifier, a trend-gated candlestick pattern recognizer and a
//! confirmation layer, and finally into a multi-factor scoring model that
//! produces a bounded 0-100 conviction score with a per-factor breakdown.
//!
//! ## Quick Start
//!
//! ```rust
//! use revsig::prelude::*;
//!
//! // Build a series (any type implementing `Ohlcv` works; `Candle` is
//! // the batteries-included record).
//! let candles: Vec<Candle> = (0..60)
//!     .map(|i| {
//!         let base = 100.0 - i as f64 * 0.5;
//!         Candle::new(i * 60_000, (i + 1) * 60_000 - 1, base, base + 1.0, base - 1.5, base - 0.5, 1000.0)
//!     })
//!     .collect();
//!
//! let model = ReversalModel::with_defaults();
//! let verdict = model.evaluate_latest(&candles, &AuxMetrics::default()).unwrap();
//! assert!(verdict.total_score <= 100);
//! ```
//!
//! No I/O, no shared state: every evaluation owns its inputs, so calls for
//! different instruments may run concurrently (see [`evaluate_parallel`]).

pub mod config;
pub mod confirm;
pub mod indicators;
pub mod patterns;
pub mod scoring;
pub mod trend;

pub mod prelude {
    pub use crate::{
        config::{
            ConfirmationParams, IndicatorParams, PatternParams, ScoreThresholds, ScoreWeights,
            SignalConfig, TrendParams,
        },
        confirm::{confirm, ConfirmationResult},
        evaluate_parallel,
        indicators::{IndicatorEngine, IndicatorFrame},
        patterns::{detect, PatternKind, PatternMatch, Polarity},
        scoring::{
            Analysis, AuxMetrics, FactorBreakdown, MarketBias, ReversalModel, ReversalVerdict,
            SignalType,
        },
        trend::{classify_trend, TrendState},
        validate_series, Candle, InstrumentError, InstrumentVerdict, Ohlcv, OhlcvExt, Period,
        Ratio, Result, SignalError,
    };
}

// ============================================================
// ERRORS
// ============================================================

pub type Result<T> = std::result::Result<T, SignalError>;

/// Errors that can occur while configuring or running the pipeline.
///
/// Only [`SignalError::InsufficientData`] and [`SignalError::InvalidCandle`]
/// can escape an evaluation; degenerate inputs (zero-range candles, zero
/// denominators) and missing auxiliary metrics are handled locally and
/// degrade the score instead of failing it.
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

    #[error("Insufficient data: need {need} candles, got {got}")]
    InsufficientData { need: usize, got: usize },

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

impl serde::Serialize for Ratio {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Ratio {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = f64::deserialize(d)?;
        Ratio::new(value).map_err(serde::de::Error::custom)
    }
}

/// Lookback period (must be > 0)
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

impl serde::Serialize for Period {
    fn serialize<S: serde::Serializer>(&self, s: S) -> std::result::Result<S::Ok, S::Error> {
        self.0.serialize(s)
    }
}

impl<'de> serde::Deserialize<'de> for Period {
    fn deserialize<D: serde::Deserializer<'de>>(d: D) -> std::result::Result<Self, D::Error> {
        let value = usize::deserialize(d)?;
        Period::new(value).map_err(serde::de::Error::custom)
    }
}

// ============================================================
// OHLCV TRAITS
// ============================================================

/// Core OHLCV candle access trait.
///
/// The pipeline is generic over this trait so callers can feed their own
/// bar representation without copying into [`Candle`].
pub trait Ohlcv {
    fn open(&self) -> f64;
    fn high(&self) -> f64;
    fn low(&self) -> f64;
    fn close(&self) -> f64;
    fn volume(&self) -> f64;

    /// Millisecond open timestamp, if the source carries one.
    fn open_time(&self) -> Option<i64> {
        None
    }
}

/// Extension trait with the derived candle geometry every pattern and
/// score factor is built from.
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

    /// Midpoint of the real body
    #[inline]
    fn body_mid(&self) -> f64 {
        (self.open() + self.close()) / 2.0
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
        let (o, h, l, c) = (self.open(), self.high(), self.low(), self.close());
        for v in [o, h, l, c, self.volume()] {
            if v.is_nan() {
                return Err(SignalError::InvalidCandle {
                    index: 0,
                    reason: "NaN in OHLCV",
                });
            }
            if v.is_infinite() {
                return Err(SignalError::InvalidCandle {
                    index: 0,
                    reason: "Infinite value in OHLCV",
                });
            }
            if v < 0.0 {
                return Err(SignalError::InvalidCandle {
                    index: 0,
                    reason: "Negative value in OHLCV",
                });
            }
        }
        if h < l {
            return Err(SignalError::InvalidCandle {
                index: 0,
                reason: "high < low",
            });
        }
        if o.min(c) < l || o.max(c) > h {
            return Err(SignalError::InvalidCandle {
                index: 0,
                reason: "body outside high/low range",
            });
        }
        Ok(())
    }
}

impl<T: Ohlcv> OhlcvExt for T {}

// ============================================================
// CANDLE RECORD
// ============================================================

/// Owned OHLCV candle record.
///
/// Timestamps are milliseconds since the epoch, matching the usual exchange
/// kline payloads. Candles are immutable once constructed; the pipeline
/// never mutates its input.
#[derive(Debug, Clone, Copy, PartialEq, serde::Serialize, serde::Deserialize)]
pub struct Candle {
    pub open_time: i64,
    pub close_time: i64,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: f64,
}

impl Candle {
    pub fn new(
        open_time: i64,
        close_time: i64,
        open: f64,
        high: f64,
        low: f64,
        close: f64,
        volume: f64,
    ) -> Self {
        Self {
            open_time,
            close_time,
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

    fn open_time(&self) -> Option<i64> {
        Some(self.open_time)
    }
}

/// Validate a whole series: per-candle consistency plus strictly increasing
/// open timestamps (no duplicates, no out-of-order bars).
pub fn validate_series<T: Ohlcv>(candles: &[T]) -> Result<()> {
    let mut prev_time: Option<i64> = None;
    for (i, candle) in candles.iter().enumerate() {
        candle.validate().map_err(|e| match e {
            SignalError::InvalidCandle { reason, .. } => {
                SignalError::InvalidCandle { index: i, reason }
            }
            other => other,
        })?;
        if let Some(t) = candle.open_time() {
            if let Some(prev) = prev_time {
                if t <= prev {
                    return Err(SignalError::InvalidCandle {
                        index: i,
                        reason: "open_time not strictly increasing",
                    });
                }
            }
            prev_time = Some(t);
        }
    }
    Ok(())
}

// ============================================================
// PARALLEL EVALUATION
// ============================================================

use rayon::prelude::*;

use crate::scoring::{AuxMetrics, ReversalModel, ReversalVerdict};

/// Verdict for a single watched instrument
#[derive(Debug)]
pub struct InstrumentVerdict {
    pub symbol: String,
    pub verdict: ReversalVerdict,
}

/// Evaluation failure for a single watched instrument
#[derive(Debug)]
pub struct InstrumentError {
    pub symbol: String,
    pub error: SignalError,
}

/// Evaluate many instruments in parallel.
///
/// Each instrument is an independent unit of work over its own series
/// snapshot; there is no cross-instrument ordering dependency, so the whole
/// watchlist fans out across the rayon pool.
pub fn evaluate_parallel<'a, T, I>(
    model: &ReversalModel,
    instruments: I,
) -> (Vec<InstrumentVerdict>, Vec<InstrumentError>)
where
    T: Ohlcv + Sync + 'a,
    I: IntoParallelIterator<Item = (&'a str, &'a [T], &'a AuxMetrics)>,
{
    let results: Vec<_> = instruments
        .into_par_iter()
        .map(|(symbol, candles, aux)| {
            model
                .evaluate_latest(candles, aux)
                .map(|verdict| InstrumentVerdict {
                    symbol: symbol.to_string(),
                    verdict,
                })
                .map_err(|error| InstrumentError {
                    symbol: symbol.to_string(),
                    error,
                })
        })
        .collect();

    let mut successes = Vec::new();
    let mut errors = Vec::new();

    for result in results {
        match result {
            Ok(v) => successes.push(v),
            Err(e) => errors.push(e),
        }
    }

    (successes, errors)
}

// ============================================================
// TESTS
// ============================================================
