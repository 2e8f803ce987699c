//! Tunable configuration for the whole pipeline.
//!
//! Every period, threshold and score weight lives here as process-wide
//! read-only configuration; nothing in the pipeline hardcodes them. The
//! point values in [`ScoreWeights`] are plain data: tuning knobs, not
//! invariants, and downstream deployments are expected to adjust them
//! per market.

use crate::{Period, Ratio, Result, SignalError};

// ============================================================
// INDICATORS
// ============================================================

/// Periods for the indicator engine.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct IndicatorParams {
    /// Fast trend EMA (also feeds the trend classifier)
    pub ema_fast: Period,
    /// Slow trend EMA
    pub ema_slow: Period,
    pub rsi_period: Period,
    pub macd_fast: Period,
    pub macd_slow: Period,
    pub macd_signal: Period,
    pub bb_period: Period,
    /// Bollinger band width in standard deviations
    pub bb_stddev: f64,
    pub kdj_period: Period,
}

impl Default for IndicatorParams {
    fn default() -> Self {
        Self {
            ema_fast: Period::new_const(50),
            ema_slow: Period::new_const(200),
            rsi_period: Period::new_const(14),
            macd_fast: Period::new_const(12),
            macd_slow: Period::new_const(26),
            macd_signal: Period::new_const(9),
            bb_period: Period::new_const(20),
            bb_stddev: 2.0,
            kdj_period: Period::new_const(9),
        }
    }
}

impl IndicatorParams {
    /// Minimum series length for a full evaluation: the longest window any
    /// indicator needs before its first defined value. The long EMAs are
    /// exempt; their recursion is defined from the first bar and merely
    /// converges with more history.
    pub fn min_bars(&self) -> usize {
        let macd = self.macd_slow.get() + self.macd_signal.get();
        macd.max(self.bb_period.get())
            .max(self.rsi_period.get() + 1)
            .max(self.kdj_period.get())
    }

    pub fn validate(&self) -> Result<()> {
        if self.macd_fast >= self.macd_slow {
            return Err(SignalError::InvalidConfig(format!(
                "macd_fast ({}) must be < macd_slow ({})",
                self.macd_fast.get(),
                self.macd_slow.get()
            )));
        }
        if self.ema_fast >= self.ema_slow {
            return Err(SignalError::InvalidConfig(format!(
                "ema_fast ({}) must be < ema_slow ({})",
                self.ema_fast.get(),
                self.ema_slow.get()
            )));
        }
        if !self.bb_stddev.is_finite() || self.bb_stddev <= 0.0 {
            return Err(SignalError::InvalidConfig(
                "bb_stddev must be finite and > 0".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// TREND CLASSIFIER
// ============================================================

/// Lookback and threshold for the coarse trend classifier. Both materially
/// change which pattern family is even considered, so they are configuration
/// rather than constants.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct TrendParams {
    pub lookback: Period,
    /// Proportional EMA change beyond which the trend is Up/Down
    pub threshold: f64,
}

impl Default for TrendParams {
    fn default() -> Self {
        Self {
            lookback: Period::new_const(20),
            threshold: 0.005,
        }
    }
}

impl TrendParams {
    pub fn validate(&self) -> Result<()> {
        if !self.threshold.is_finite() || self.threshold < 0.0 {
            return Err(SignalError::InvalidConfig(
                "trend threshold must be finite and >= 0".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// PATTERN GEOMETRY
// ============================================================

/// Shape thresholds shared by the pattern predicates.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct PatternParams {
    /// Near-doji filter: body / range must be at least this, except for
    /// star middles which explicitly want a small body.
    pub min_body_ratio: Ratio,
    /// Dominant wick must be at least this multiple of the body
    /// (hammer family, exhaustion wicks).
    pub wick_dominance: f64,
    /// Opposing wick must be at most this multiple of the body.
    pub opposing_wick_max: f64,
    /// Engulfing body must exceed the prior body by this factor.
    pub engulf_ratio: f64,
    /// Star outer bodies must be at least this multiple of the middle body.
    pub star_body_ratio: f64,
}

impl Default for PatternParams {
    fn default() -> Self {
        Self {
            min_body_ratio: Ratio::new_const(0.1),
            wick_dominance: 2.0,
            opposing_wick_max: 0.5,
            engulf_ratio: 1.1,
            star_body_ratio: 2.0,
        }
    }
}

impl PatternParams {
    pub fn validate(&self) -> Result<()> {
        for (name, v) in [
            ("wick_dominance", self.wick_dominance),
            ("opposing_wick_max", self.opposing_wick_max),
            ("engulf_ratio", self.engulf_ratio),
            ("star_body_ratio", self.star_body_ratio),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(SignalError::InvalidConfig(format!(
                    "{name} must be finite and > 0"
                )));
            }
        }
        if self.engulf_ratio < 1.0 {
            return Err(SignalError::InvalidConfig(
                "engulf_ratio must be >= 1.0 (current body must exceed prior)".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// CONFIRMATION LAYER
// ============================================================

#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ConfirmationParams {
    /// Candles averaged for the volume baseline (excluding the last one)
    pub volume_lookback: Period,
    /// Last volume must exceed the baseline by this factor
    pub volume_multiplier: f64,
    pub rsi_overbought: f64,
    pub rsi_oversold: f64,
}

impl Default for ConfirmationParams {
    fn default() -> Self {
        Self {
            volume_lookback: Period::new_const(20),
            volume_multiplier: 1.5,
            rsi_overbought: 70.0,
            rsi_oversold: 30.0,
        }
    }
}

impl ConfirmationParams {
    pub fn validate(&self) -> Result<()> {
        if !self.volume_multiplier.is_finite() || self.volume_multiplier <= 0.0 {
            return Err(SignalError::InvalidConfig(
                "volume_multiplier must be finite and > 0".into(),
            ));
        }
        if self.rsi_oversold >= self.rsi_overbought {
            return Err(SignalError::InvalidConfig(format!(
                "rsi_oversold ({}) must be < rsi_overbought ({})",
                self.rsi_oversold, self.rsi_overbought
            )));
        }
        Ok(())
    }
}

// ============================================================
// SCORING MODEL
// ============================================================

/// Trigger thresholds for the scoring model's sub-factors.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ScoreThresholds {
    pub rsi_oversold: f64,
    pub rsi_deep_oversold: f64,
    pub rsi_overbought: f64,
    pub rsi_deep_overbought: f64,
    /// Window for the price/RSI divergence check
    pub divergence_lookback: Period,
    /// Price counts as retesting the window extreme within this fraction
    pub divergence_price_tolerance: f64,
    /// RSI must miss its window extreme by at least this many points
    pub divergence_rsi_margin: f64,
    /// Open-interest baseline window (mean of the prior N readings)
    pub oi_window: Period,
    /// Fractional OI change that counts as a flush or a build-up
    pub oi_change_threshold: f64,
    /// Funding rate magnitude that marks a crowded trade
    pub funding_extreme: f64,
    pub long_ratio_low: f64,
    pub long_ratio_very_low: f64,
    pub long_ratio_high: f64,
    pub long_ratio_very_high: f64,
    /// Volume baseline window for the surge ratio
    pub volume_window: Period,
    pub volume_surge_ratio: f64,
    /// Exhaustion wick must be at least this multiple of the body
    pub wick_dominance: f64,
    /// MACD counted as "just crossed" while |macd - signal| is below this.
    /// Absolute price units, so retune per instrument scale.
    pub near_cross_margin: f64,
}

impl Default for ScoreThresholds {
    fn default() -> Self {
        Self {
            rsi_oversold: 30.0,
            rsi_deep_oversold: 20.0,
            rsi_overbought: 70.0,
            rsi_deep_overbought: 80.0,
            divergence_lookback: Period::new_const(15),
            divergence_price_tolerance: 0.001,
            divergence_rsi_margin: 1.0,
            oi_window: Period::new_const(5),
            oi_change_threshold: 0.03,
            funding_extreme: 0.0005,
            long_ratio_low: 0.35,
            long_ratio_very_low: 0.25,
            long_ratio_high: 0.65,
            long_ratio_very_high: 0.75,
            volume_window: Period::new_const(10),
            volume_surge_ratio: 2.0,
            wick_dominance: 2.0,
            near_cross_margin: 5.0,
        }
    }
}

impl ScoreThresholds {
    pub fn validate(&self) -> Result<()> {
        if self.rsi_deep_oversold >= self.rsi_oversold {
            return Err(SignalError::InvalidConfig(
                "rsi_deep_oversold must be < rsi_oversold".into(),
            ));
        }
        if self.rsi_deep_overbought <= self.rsi_overbought {
            return Err(SignalError::InvalidConfig(
                "rsi_deep_overbought must be > rsi_overbought".into(),
            ));
        }
        let ratios = [
            self.long_ratio_very_low,
            self.long_ratio_low,
            self.long_ratio_high,
            self.long_ratio_very_high,
        ];
        if ratios.iter().any(|r| !(0.0..=1.0).contains(r)) {
            return Err(SignalError::InvalidConfig(
                "long_ratio thresholds must be within [0, 1]".into(),
            ));
        }
        if !(self.long_ratio_very_low < self.long_ratio_low
            && self.long_ratio_low < self.long_ratio_high
            && self.long_ratio_high < self.long_ratio_very_high)
        {
            return Err(SignalError::InvalidConfig(
                "long_ratio thresholds must be strictly ordered".into(),
            ));
        }
        for (name, v) in [
            ("divergence_price_tolerance", self.divergence_price_tolerance),
            ("divergence_rsi_margin", self.divergence_rsi_margin),
            ("oi_change_threshold", self.oi_change_threshold),
            ("funding_extreme", self.funding_extreme),
            ("volume_surge_ratio", self.volume_surge_ratio),
            ("wick_dominance", self.wick_dominance),
            ("near_cross_margin", self.near_cross_margin),
        ] {
            if !v.is_finite() || v <= 0.0 {
                return Err(SignalError::InvalidConfig(format!(
                    "{name} must be finite and > 0"
                )));
            }
        }
        Ok(())
    }
}

/// Point values for the five capped sub-factor groups.
///
/// Defaults follow the rebalanced weight table: 30 technical, 20 momentum,
/// 25 open-interest/funding, 10 positioning, 15 volume/candle. The total is
/// clamped to 100 on top of the per-group caps.
#[derive(Debug, Clone, Copy, serde::Serialize, serde::Deserialize)]
pub struct ScoreWeights {
    pub rsi_extreme: u8,
    pub rsi_deep_extreme: u8,
    pub divergence: u8,
    pub technical_cap: u8,

    pub hist_momentum: u8,
    pub fresh_cross: u8,
    pub near_cross: u8,
    pub momentum_cap: u8,

    pub oi_flush: u8,
    pub oi_squeeze: u8,
    pub oi_price_disagreement: u8,
    pub oi_cap: u8,

    pub positioning_skew: u8,
    pub positioning_extreme: u8,
    pub positioning_cap: u8,

    pub volume_surge: u8,
    pub exhaustion_wick: u8,
    pub volume_candle_cap: u8,
}

impl Default for ScoreWeights {
    fn default() -> Self {
        Self {
            rsi_extreme: 15,
            rsi_deep_extreme: 5,
            divergence: 10,
            technical_cap: 30,

            hist_momentum: 10,
            fresh_cross: 10,
            near_cross: 5,
            momentum_cap: 20,

            oi_flush: 15,
            oi_squeeze: 15,
            oi_price_disagreement: 5,
            oi_cap: 25,

            positioning_skew: 5,
            positioning_extreme: 5,
            positioning_cap: 10,

            volume_surge: 5,
            exhaustion_wick: 10,
            volume_candle_cap: 15,
        }
    }
}

impl ScoreWeights {
    pub fn validate(&self) -> Result<()> {
        let caps = [
            self.technical_cap,
            self.momentum_cap,
            self.oi_cap,
            self.positioning_cap,
            self.volume_candle_cap,
        ];
        if caps.iter().all(|&c| c == 0) {
            return Err(SignalError::InvalidConfig(
                "all score group caps are zero; the model could never fire".into(),
            ));
        }
        if caps.iter().any(|&c| c > 100) {
            return Err(SignalError::InvalidConfig(
                "score group caps must each be <= 100".into(),
            ));
        }
        Ok(())
    }
}

// ============================================================
// TOP-LEVEL CONFIG
// ============================================================

/// Complete pipeline configuration.
#[derive(Debug, Clone, Default, serde::Serialize, serde::Deserialize)]
pub struct SignalConfig {
    pub indicators: IndicatorParams,
    pub trend: TrendParams,
    pub patterns: PatternParams,
    pub confirmation: ConfirmationParams,
    pub thresholds: ScoreThresholds,
    pub weights: ScoreWeights,
}

impl SignalConfig {
    pub fn validate(&self) -> Result<()> {
        self.indicators.validate()?;
        self.trend.validate()?;
        self.patterns.validate()?;
        self.confirmation.validate()?;
        self.thresholds.validate()?;
        self.weights.validate()?;
        Ok(())
    }
}

// ============================================================
// TESTS
// ============================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults_validate() {
        assert!(SignalConfig::default().validate().is_ok());
    }

    #[test]
    fn test_default_min_bars() {
        // MACD 26 + 9 dominates the default windows
        assert_eq!(IndicatorParams::default().min_bars(), 35);
    }

    #[test]
    fn test_macd_ordering_enforced() {
        let params = IndicatorParams {
            macd_fast: Period::new_const(26),
            macd_slow: Period::new_const(12),
            ..Default::default()
        };
        assert!(params.validate().is_err());
    }

    #[test]
    fn test_long_ratio_ordering_enforced() {
        let thresholds = ScoreThresholds {
            long_ratio_low: 0.7,
            long_ratio_high: 0.6,
            ..Default::default()
        };
        assert!(thresholds.validate().is_err());
    }

    #[test]
    fn test_zero_caps_rejected() {
        let weights = ScoreWeights {
            technical_cap: 0,
            momentum_cap: 0,
            oi_cap: 0,
            positioning_cap: 0,
            volume_candle_cap: 0,
            ..Default::default()
        };
        assert!(weights.validate().is_err());
    }

    #[test]
    fn test_config_roundtrips_through_serde() {
        let config = SignalConfig::default();
        let json = serde_json::to_string(&config).unwrap();
        let back: SignalConfig = serde_json::from_str(&json).unwrap();
        assert_eq!(back.indicators.min_bars(), config.indicators.min_bars());
        assert_eq!(back.weights.technical_cap, config.weights.technical_cap);
    }
}
