use std::collections::{BTreeMap, BTreeSet, HashMap};

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

// ── Input Types (handed to the normalizer) ──

/// One cell of a raw input row. CSV cells arrive as `Text`; programmatic
/// callers may hand over numbers directly.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum RawValue {
    Number(f64),
    Text(String),
    Null,
}

impl RawValue {
    /// Lenient numeric coercion: trims, drops thousands separators and a
    /// trailing `%`. Non-finite results count as unparsable.
    pub fn as_f64(&self) -> Option<f64> {
        let value = match self {
            RawValue::Number(n) => *n,
            RawValue::Text(s) => {
                let cleaned: String = s
                    .trim()
                    .trim_end_matches('%')
                    .chars()
                    .filter(|c| *c != ',' && *c != '_' && !c.is_whitespace())
                    .collect();
                cleaned.parse::<f64>().ok()?
            }
            RawValue::Null => return None,
        };
        value.is_finite().then_some(value)
    }

    pub fn as_text(&self) -> Option<String> {
        match self {
            RawValue::Text(s) => {
                let trimmed = s.trim();
                (!trimmed.is_empty()).then(|| trimmed.to_string())
            }
            RawValue::Number(n) => Some(n.to_string()),
            RawValue::Null => None,
        }
    }
}

impl From<&str> for RawValue {
    fn from(s: &str) -> Self {
        RawValue::Text(s.to_string())
    }
}

impl From<f64> for RawValue {
    fn from(n: f64) -> Self {
        RawValue::Number(n)
    }
}

pub type RawRecord = HashMap<String, RawValue>;

/// Raw rows plus the schema they were read with.
#[derive(Debug, Clone, Default)]
pub struct RawTable {
    pub columns: Vec<String>,
    pub rows: Vec<RawRecord>,
}

impl RawTable {
    /// Schema is the union of every record's keys.
    pub fn from_records(rows: Vec<RawRecord>) -> Self {
        let columns: BTreeSet<String> = rows.iter().flat_map(|r| r.keys().cloned()).collect();
        Self {
            columns: columns.into_iter().collect(),
            rows,
        }
    }

    pub fn has_column(&self, name: &str) -> bool {
        self.columns.iter().any(|c| c == name)
    }

    pub fn len(&self) -> usize {
        self.rows.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rows.is_empty()
    }
}

// ── Normalized Types ──

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Observation {
    pub instrument_id: String,
    pub trading_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub frequency: u64,
    pub avg_order_size: f64,
    pub transaction_value: f64,
    pub change_pct: f64,
    pub sector: Option<String>,
    pub company_name: Option<String>,
    pub free_float_pct: Option<f64>,
    pub foreign_buy: Option<f64>,
    pub foreign_sell: Option<f64>,
}

impl Observation {
    pub fn typical_price(&self) -> f64 {
        (self.high + self.low + self.close) / 3.0
    }

    pub fn net_foreign(&self) -> f64 {
        match (self.foreign_buy, self.foreign_sell) {
            (Some(buy), Some(sell)) => buy - sell,
            _ => 0.0,
        }
    }

    /// "thin" below 10% free float, "liquid" above 40%; `None` when unknown.
    pub fn free_float_label(&self) -> Option<&'static str> {
        match self.free_float_pct? {
            f if f <= 0.0 => None,
            f if f < 10.0 => Some("thin"),
            f if f > 40.0 => Some("liquid"),
            _ => Some("normal"),
        }
    }

    /// `(buy - sell) / (buy + sell)` for foreign flow, in `[-1, 1]`.
    pub fn foreign_imbalance(&self) -> Option<f64> {
        match (self.foreign_buy, self.foreign_sell) {
            (Some(buy), Some(sell)) if buy + sell > 0.0 => Some((buy - sell) / (buy + sell)),
            _ => None,
        }
    }
}

/// Instrument id -> date-ascending series.
pub type Dataset = BTreeMap<String, Vec<Observation>>;

// ── Derived Types (produced by detection::analyze) ──

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SignalCategory {
    Whale,
    Split,
    Normal,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum PriceRegime {
    Sideways,
    Downtrend,
    EarlyUptrend,
    Other,
}

/// Frequency spike bucket.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActivityLevel {
    Normal,
    Medium,
    High,
    Extreme,
}

impl ActivityLevel {
    pub fn from_freq_spike(ratio: f64) -> Self {
        if ratio > 5.0 {
            ActivityLevel::Extreme
        } else if ratio > 2.5 {
            ActivityLevel::High
        } else if ratio > 1.5 {
            ActivityLevel::Medium
        } else {
            ActivityLevel::Normal
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            ActivityLevel::Normal => "normal",
            ActivityLevel::Medium => "medium",
            ActivityLevel::High => "high",
            ActivityLevel::Extreme => "extreme",
        }
    }
}

/// Accumulation patterns a row can show on top of its signal category.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SmartMoneyPattern {
    /// Order size above 2x its baseline.
    HighAov,
    /// Trade count and order size both elevated.
    FrequencyAndAov,
    /// Large orders while the price is falling.
    BottomAccumulation,
    /// Foreign buyers dominating a large-order day.
    ForeignPressure,
    /// Composite smart money score in the strong band.
    StrongComposite,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Baselines {
    pub frequency: f64,
    pub volume: f64,
    pub avg_order_size: f64,
    pub transaction_value: f64,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct Ratios {
    pub freq_spike: f64,
    pub volume_spike: f64,
    pub aov: f64,
    pub split_intensity: f64,
    pub value: f64,
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct Signal {
    pub category: SignalCategory,
    pub conviction: f64,
}

impl Signal {
    pub fn normal() -> Self {
        Self { category: SignalCategory::Normal, conviction: 0.0 }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct AnalyzedRow {
    pub observation: Observation,
    pub baselines: Baselines,
    pub ratios: Ratios,
    pub vwma: Option<f64>,
    pub signal: Signal,
    pub regime: PriceRegime,
    pub activity: ActivityLevel,
}

/// Instrument id -> analyzed series, aligned one-to-one with the dataset.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct Analysis {
    pub series: BTreeMap<String, Vec<AnalyzedRow>>,
}

impl Analysis {
    pub fn instrument(&self, id: &str) -> Option<&[AnalyzedRow]> {
        self.series.get(id).map(Vec::as_slice)
    }

    pub fn rows(&self) -> impl Iterator<Item = &AnalyzedRow> {
        self.series.values().flatten()
    }

    pub fn latest_date(&self) -> Option<NaiveDate> {
        self.series
            .values()
            .filter_map(|s| s.last())
            .map(|r| r.observation.trading_date)
            .max()
    }

    pub fn row_count(&self) -> usize {
        self.series.values().map(Vec::len).sum()
    }
}
