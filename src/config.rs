use std::path::Path;

use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::{EngineError, Result};

/// Every knob of a run. Missing keys in a config file fall back to the
/// defaults below.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub columns: ColumnMap,
    pub normalizer: NormalizerConfig,
    pub baseline: BaselineConfig,
    pub classifier: ClassifierConfig,
    pub regime: RegimeConfig,
    pub backtest: BacktestConfig,
    pub display: DisplayConfig,
    pub source: SourceConfig,
}

impl EngineConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let text = std::fs::read_to_string(path.as_ref())?;
        let config: EngineConfig = serde_json::from_str(&text)?;
        config.validate()?;
        info!(path = %path.as_ref().display(), "configuration loaded");
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.baseline.validate()?;

        let c = &self.classifier;
        if c.whale_ratio_ceiling <= c.whale_ratio_min {
            return Err(invalid(format!(
                "whale_ratio_ceiling ({}) must exceed whale_ratio_min ({})",
                c.whale_ratio_ceiling, c.whale_ratio_min
            )));
        }
        if c.split_ratio_max <= 0.0 {
            return Err(invalid("split_ratio_max must be positive"));
        }
        if c.split_ratio_max >= c.whale_ratio_min {
            return Err(invalid("split_ratio_max must be below whale_ratio_min"));
        }
        if c.split_intensity_ceiling <= c.split_intensity_min {
            return Err(invalid("split_intensity_ceiling must exceed split_intensity_min"));
        }
        if self.regime.vwma_window == 0 {
            return Err(invalid("regime.vwma_window must be at least 1"));
        }
        if self.backtest.horizons.is_empty() || self.backtest.horizons.contains(&0) {
            return Err(invalid("backtest.horizons must be non-empty and positive"));
        }
        if self.normalizer.lot_size <= 0.0 {
            return Err(invalid("normalizer.lot_size must be positive"));
        }
        if matches!(self.display.ratio_clip, Some(clip) if clip <= 0.0) {
            return Err(invalid("display.ratio_clip must be positive when set"));
        }
        Ok(())
    }
}

fn invalid(msg: impl Into<String>) -> EngineError {
    EngineError::InvalidConfig(msg.into())
}

/// Source column names. Defaults follow the exchange's daily summary export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ColumnMap {
    pub instrument_id: String,
    pub trading_date: String,
    pub close: String,
    pub open: String,
    pub high: String,
    pub low: String,
    pub volume: String,
    pub frequency: String,
    pub avg_order_size: String,
    pub transaction_value: String,
    pub change_pct: String,
    pub previous_close: String,
    pub sector: String,
    pub company_name: String,
    pub free_float: String,
    pub foreign_buy: String,
    pub foreign_sell: String,
}

impl Default for ColumnMap {
    fn default() -> Self {
        Self {
            instrument_id: "Stock Code".into(),
            trading_date: "Last Trading Date".into(),
            close: "Close".into(),
            open: "Open Price".into(),
            high: "High".into(),
            low: "Low".into(),
            volume: "Volume".into(),
            frequency: "Frequency".into(),
            avg_order_size: "Avg_Order_Volume".into(),
            transaction_value: "Value".into(),
            change_pct: "Change %".into(),
            previous_close: "Previous".into(),
            sector: "Sector".into(),
            company_name: "Company Name".into(),
            free_float: "Free Float".into(),
            foreign_buy: "Foreign Buy".into(),
            foreign_sell: "Foreign Sell".into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct NormalizerConfig {
    /// Shares per lot, used when transaction value has to be estimated.
    pub lot_size: f64,
}

impl Default for NormalizerConfig {
    fn default() -> Self {
        Self { lot_size: 100.0 }
    }
}

/// Which observations a baseline window covers for row `i`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum BaselineAnchor {
    /// `[i-N, i-1]`: the N rows before today.
    Preceding,
    /// `[i-N+1, i]`: today plus the N-1 rows before it.
    Inclusive,
}

/// Rolling window for the "normal" reference level.
///
/// `min_periods` is the warm-up floor: rows whose window holds fewer
/// observations get a baseline of 0 (undefined). `min_periods == window`
/// means strict windows; `min_periods == 1` means a noisy partial-window
/// average from the second row on.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct BaselineConfig {
    pub window: usize,
    pub min_periods: usize,
    pub anchor: BaselineAnchor,
}

impl BaselineConfig {
    pub fn partial(window: usize, min_periods: usize) -> Self {
        Self { window, min_periods, anchor: BaselineAnchor::Preceding }
    }

    pub fn strict(window: usize) -> Self {
        Self { window, min_periods: window, anchor: BaselineAnchor::Preceding }
    }

    pub fn with_anchor(mut self, anchor: BaselineAnchor) -> Self {
        self.anchor = anchor;
        self
    }

    pub fn validate(&self) -> Result<()> {
        if self.window == 0 {
            return Err(invalid("baseline.window must be at least 1"));
        }
        if self.min_periods == 0 || self.min_periods > self.window {
            return Err(invalid(format!(
                "baseline.min_periods ({}) must be within 1..={}",
                self.min_periods, self.window
            )));
        }
        Ok(())
    }
}

impl Default for BaselineConfig {
    fn default() -> Self {
        Self::partial(20, 1)
    }
}

/// Which ratio decides a Split.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SplitDriver {
    /// `0 < aov_ratio <= split_ratio_max`.
    AovRatio,
    /// Trade count spiking faster than share volume.
    SplitIntensity,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ClassifierConfig {
    pub whale_ratio_min: f64,
    /// aov_ratio at which whale conviction saturates.
    pub whale_ratio_ceiling: f64,
    pub split_ratio_max: f64,
    pub min_transaction_value: f64,
    pub min_frequency: u64,
    pub split_driver: SplitDriver,
    pub min_freq_spike: f64,
    pub split_intensity_min: f64,
    pub split_intensity_ceiling: f64,
}

impl Default for ClassifierConfig {
    fn default() -> Self {
        Self {
            whale_ratio_min: 1.5,
            whale_ratio_ceiling: 5.0,
            split_ratio_max: 0.6,
            min_transaction_value: 500_000_000.0,
            min_frequency: 0,
            split_driver: SplitDriver::AovRatio,
            min_freq_spike: 2.0,
            split_intensity_min: 1.5,
            split_intensity_ceiling: 5.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RegimeConfig {
    pub vwma_window: usize,
    /// `|change_pct|` at or under this is sideways.
    pub sideways_band: f64,
    pub early_uptrend_max: f64,
}

impl Default for RegimeConfig {
    fn default() -> Self {
        Self { vwma_window: 20, sideways_band: 2.0, early_uptrend_max: 4.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct BacktestConfig {
    /// Holding periods in trading days.
    pub horizons: Vec<usize>,
    pub liquidity_floor: f64,
}

impl Default for BacktestConfig {
    fn default() -> Self {
        Self { horizons: vec![5, 10, 20], liquidity_floor: 500_000_000.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DisplayConfig {
    /// Upper clip applied to ratios in screener/chart output.
    pub ratio_clip: Option<f64>,
}

impl Default for DisplayConfig {
    fn default() -> Self {
        Self { ratio_clip: Some(10.0) }
    }
}

impl DisplayConfig {
    pub fn clip(&self, ratio: f64) -> f64 {
        match self.ratio_clip {
            Some(max) => ratio.min(max),
            None => ratio,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SourceConfig {
    pub timeout_secs: u64,
    pub retries: u32,
    pub retry_delay_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self { timeout_secs: 30, retries: 1, retry_delay_ms: 500 }
    }
}
