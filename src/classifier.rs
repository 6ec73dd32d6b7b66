use serde::{Deserialize, Serialize};

use crate::config::{ClassifierConfig, RegimeConfig, SplitDriver};
use crate::types::{AnalyzedRow, Baselines, Observation, PriceRegime, Ratios, Signal, SignalCategory, SmartMoneyPattern};

const CONVICTION_CAP: f64 = 99.0;

/// Composite scores at or above this are in the strong band.
pub const STRONG_COMPOSITE_MIN: u8 = 5;

/// `numerator / denominator`, or 0 when the denominator is not a positive
/// finite number.
pub fn ratio(numerator: f64, denominator: f64) -> f64 {
    if denominator > 0.0 && denominator.is_finite() && numerator.is_finite() {
        numerator / denominator
    } else {
        0.0
    }
}

pub fn compute_ratios(obs: &Observation, baselines: &Baselines) -> Ratios {
    let freq_spike = ratio(obs.frequency as f64, baselines.frequency);
    let volume_spike = ratio(obs.volume as f64, baselines.volume);
    Ratios {
        freq_spike,
        volume_spike,
        aov: ratio(obs.avg_order_size, baselines.avg_order_size),
        split_intensity: ratio(freq_spike, volume_spike),
        value: ratio(obs.transaction_value, baselines.transaction_value),
    }
}

pub struct ClassifierInput<'a> {
    pub observation: &'a Observation,
    pub ratios: &'a Ratios,
}

impl SignalCategory {
    pub fn label(&self) -> &'static str {
        match self {
            SignalCategory::Whale => "Whale",
            SignalCategory::Split => "Split",
            SignalCategory::Normal => "Normal",
        }
    }

    /// The ratio this category is thresholded on.
    pub fn driving_ratio(&self, ratios: &Ratios, driver: SplitDriver) -> f64 {
        match (self, driver) {
            (SignalCategory::Split, SplitDriver::SplitIntensity) => ratios.split_intensity,
            _ => ratios.aov,
        }
    }

    /// Whether the ratios cross this category's threshold. Both bounds are
    /// inclusive.
    pub fn qualifies(&self, input: &ClassifierInput, config: &ClassifierConfig) -> bool {
        let r = input.ratios;
        match self {
            SignalCategory::Whale => r.aov >= config.whale_ratio_min,
            SignalCategory::Split => match config.split_driver {
                SplitDriver::AovRatio => r.aov > 0.0 && r.aov <= config.split_ratio_max,
                SplitDriver::SplitIntensity => {
                    r.freq_spike >= config.min_freq_spike && r.split_intensity >= config.split_intensity_min
                }
            },
            SignalCategory::Normal => true,
        }
    }

    /// Linear in the distance past the threshold: 20 at the threshold,
    /// saturating at 99.
    pub fn conviction(&self, input: &ClassifierInput, config: &ClassifierConfig) -> f64 {
        let r = input.ratios;
        match self {
            SignalCategory::Whale => scaled(
                r.aov - config.whale_ratio_min,
                config.whale_ratio_ceiling - config.whale_ratio_min,
            ),
            SignalCategory::Split => match config.split_driver {
                SplitDriver::AovRatio => scaled(config.split_ratio_max - r.aov, config.split_ratio_max),
                SplitDriver::SplitIntensity => scaled(
                    r.split_intensity - config.split_intensity_min,
                    config.split_intensity_ceiling - config.split_intensity_min,
                ),
            },
            SignalCategory::Normal => 0.0,
        }
    }
}

fn scaled(distance: f64, span: f64) -> f64 {
    if span <= 0.0 {
        return 0.0;
    }
    ((distance / span) * 80.0 + 20.0).clamp(0.0, CONVICTION_CAP)
}

pub struct Classifier {
    pub config: ClassifierConfig,
}

impl Classifier {
    pub fn new(config: ClassifierConfig) -> Self {
        Self { config }
    }

    /// Whale wins over Split when both qualify. Rows that are illiquid,
    /// traded no orders, or carry no price are always Normal.
    pub fn classify(&self, input: &ClassifierInput) -> Signal {
        if !self.eligible(input.observation) {
            return Signal::normal();
        }
        [SignalCategory::Whale, SignalCategory::Split]
            .into_iter()
            .find(|category| category.qualifies(input, &self.config))
            .map(|category| Signal {
                category,
                conviction: category.conviction(input, &self.config),
            })
            .unwrap_or_else(Signal::normal)
    }

    fn eligible(&self, obs: &Observation) -> bool {
        obs.close > 0.0
            && obs.frequency > 0
            && obs.frequency >= self.config.min_frequency
            && obs.transaction_value >= self.config.min_transaction_value
    }
}

// ── Price context ──

impl PriceRegime {
    /// First match wins: Sideways, Downtrend, EarlyUptrend, Other.
    pub fn of(obs: &Observation, vwma: Option<f64>, config: &RegimeConfig) -> Self {
        if PriceFilter::Sideways.matches(obs, vwma, config) {
            PriceRegime::Sideways
        } else if PriceFilter::Downtrend.matches(obs, vwma, config) {
            PriceRegime::Downtrend
        } else if PriceFilter::EarlyUptrend.matches(obs, vwma, config) {
            PriceRegime::EarlyUptrend
        } else {
            PriceRegime::Other
        }
    }
}

/// Price-context screen, ANDed with the signal category. Unlike
/// [`PriceRegime`], predicates overlap: a -1% day is both sideways and
/// downtrending.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum PriceFilter {
    #[default]
    Any,
    Sideways,
    Downtrend,
    EarlyUptrend,
}

impl PriceFilter {
    pub fn matches(&self, obs: &Observation, vwma: Option<f64>, config: &RegimeConfig) -> bool {
        let chg = obs.change_pct;
        match self {
            PriceFilter::Any => true,
            PriceFilter::Sideways => chg.abs() <= config.sideways_band,
            PriceFilter::Downtrend => vwma.is_some_and(|v| obs.close < v) || chg < 0.0,
            PriceFilter::EarlyUptrend => chg > 0.0 && chg <= config.early_uptrend_max,
        }
    }
}

// ── Smart money ──

/// Additive 0..=10 score: trade-count spike (up to 2), order size spike
/// (up to 5), falling or flat price (2 or 1), foreign buy imbalance (1).
/// Independent of the signal category, so Normal rows score too.
pub fn smart_money_score(row: &AnalyzedRow) -> u8 {
    let r = &row.ratios;
    let mut score = 0;
    if r.freq_spike > 1.5 {
        score += 1;
    }
    if r.freq_spike > 2.0 {
        score += 1;
    }
    if r.aov > 1.5 {
        score += 2;
    }
    if r.aov > 2.0 {
        score += 3;
    }
    score += match row.regime {
        PriceRegime::Downtrend => 2,
        PriceRegime::Sideways => 1,
        PriceRegime::EarlyUptrend | PriceRegime::Other => 0,
    };
    if row.observation.foreign_imbalance().is_some_and(|i| i > 0.2) {
        score += 1;
    }
    score
}

impl SmartMoneyPattern {
    /// Every pattern the row shows, in declaration order.
    pub fn detect(row: &AnalyzedRow, score: u8) -> Vec<SmartMoneyPattern> {
        let r = &row.ratios;
        let imbalance = row.observation.foreign_imbalance().unwrap_or(0.0);
        [
            (SmartMoneyPattern::HighAov, r.aov > 2.0),
            (SmartMoneyPattern::FrequencyAndAov, r.freq_spike > 1.5 && r.aov > 1.5),
            (SmartMoneyPattern::BottomAccumulation, row.regime == PriceRegime::Downtrend && r.aov > 1.8),
            (SmartMoneyPattern::ForeignPressure, imbalance > 0.3 && r.aov > 1.5),
            (SmartMoneyPattern::StrongComposite, score >= STRONG_COMPOSITE_MIN),
        ]
        .into_iter()
        .filter_map(|(pattern, hit)| hit.then_some(pattern))
        .collect()
    }
}
