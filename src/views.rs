use std::collections::BTreeMap;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};

use crate::classifier::{self, PriceFilter};
use crate::config::{EngineConfig, SplitDriver};
use crate::types::{ActivityLevel, AnalyzedRow, Analysis, PriceRegime, SignalCategory, SmartMoneyPattern};

/// A successful query result. `NoMatches` means the computation ran and
/// nothing passed the filters; failures are `Err(EngineError)` instead.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", content = "data", rename_all = "snake_case")]
pub enum Outcome<T> {
    Found(T),
    NoMatches,
}

impl<T> Outcome<T> {
    pub fn is_no_matches(&self) -> bool {
        matches!(self, Outcome::NoMatches)
    }

    pub fn found(self) -> Option<T> {
        match self {
            Outcome::Found(v) => Some(v),
            Outcome::NoMatches => None,
        }
    }
}

impl<T> Outcome<Vec<T>> {
    pub fn from_vec(items: Vec<T>) -> Self {
        if items.is_empty() {
            Outcome::NoMatches
        } else {
            Outcome::Found(items)
        }
    }
}

// ── Screener ──

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DateSelection {
    /// The most recent trading date in the dataset.
    #[default]
    Latest,
    Day(NaiveDate),
    Range { from: NaiveDate, to: NaiveDate },
}

impl DateSelection {
    fn bounds(&self, analysis: &Analysis) -> Option<(NaiveDate, NaiveDate)> {
        match *self {
            DateSelection::Latest => analysis.latest_date().map(|d| (d, d)),
            DateSelection::Day(d) => Some((d, d)),
            DateSelection::Range { from, to } => Some((from, to)),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize, clap::ValueEnum)]
#[serde(rename_all = "snake_case")]
pub enum SortKey {
    Ratio,
    #[default]
    Conviction,
    Value,
    /// Pattern count, then composite score.
    SmartMoney,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScreenerQuery {
    pub dates: DateSelection,
    pub category: SignalCategory,
    pub price: PriceFilter,
    /// Exact match on the instrument's sector; rows without one never match.
    pub sector: Option<String>,
    /// Floor on the unclipped driving ratio. For Split under the AOV driver
    /// the ratio is small, so this acts as a ceiling instead.
    pub min_ratio: Option<f64>,
    pub min_conviction: Option<f64>,
    /// Overrides the classifier's liquidity floor upward for this screen.
    pub min_transaction_value: Option<f64>,
    pub sort: SortKey,
    pub limit: Option<usize>,
}

impl ScreenerQuery {
    pub fn new(category: SignalCategory) -> Self {
        Self {
            dates: DateSelection::Latest,
            category,
            price: PriceFilter::Any,
            sector: None,
            min_ratio: None,
            min_conviction: None,
            min_transaction_value: None,
            sort: SortKey::Conviction,
            limit: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ScreenerHit {
    pub instrument_id: String,
    pub trading_date: NaiveDate,
    pub sector: Option<String>,
    pub company_name: Option<String>,
    pub free_float_pct: Option<f64>,
    pub free_float_label: Option<&'static str>,
    pub ratio: f64,
    pub conviction_score: f64,
    pub transaction_value: f64,
    pub change_pct: f64,
    pub close: f64,
    pub net_foreign: f64,
    pub value_ratio: f64,
    pub regime: PriceRegime,
    pub activity: ActivityLevel,
    pub smart_money_score: u8,
    pub pattern_count: usize,
    pub patterns: Vec<SmartMoneyPattern>,
}

/// Rows of the requested category inside the date selection that also pass
/// the price filter, sorted descending by the query's key. Normal rows are
/// never screened.
pub fn screener(analysis: &Analysis, query: &ScreenerQuery, config: &EngineConfig) -> Outcome<Vec<ScreenerHit>> {
    if query.category == SignalCategory::Normal {
        return Outcome::NoMatches;
    }
    let Some((from, to)) = query.dates.bounds(analysis) else {
        return Outcome::NoMatches;
    };

    let driver = config.classifier.split_driver;
    let mut hits: Vec<ScreenerHit> = analysis
        .rows()
        .filter(|row| {
            let obs = &row.observation;
            row.signal.category == query.category
                && obs.trading_date >= from
                && obs.trading_date <= to
                && query.price.matches(obs, row.vwma, &config.regime)
                && query.sector.as_deref().map_or(true, |s| obs.sector.as_deref() == Some(s))
                && query.min_ratio.map_or(true, |r| passes_ratio(query.category, driver, row, r))
                && query.min_conviction.map_or(true, |c| row.signal.conviction >= c)
                && query.min_transaction_value.map_or(true, |v| obs.transaction_value >= v)
        })
        .map(|row| {
            let score = classifier::smart_money_score(row);
            let patterns = SmartMoneyPattern::detect(row, score);
            ScreenerHit {
                instrument_id: row.observation.instrument_id.clone(),
                trading_date: row.observation.trading_date,
                sector: row.observation.sector.clone(),
                company_name: row.observation.company_name.clone(),
                free_float_pct: row.observation.free_float_pct,
                free_float_label: row.observation.free_float_label(),
                ratio: config.display.clip(query.category.driving_ratio(&row.ratios, driver)),
                conviction_score: row.signal.conviction,
                transaction_value: row.observation.transaction_value,
                change_pct: row.observation.change_pct,
                close: row.observation.close,
                net_foreign: row.observation.net_foreign(),
                value_ratio: config.display.clip(row.ratios.value),
                regime: row.regime,
                activity: row.activity,
                smart_money_score: score,
                pattern_count: patterns.len(),
                patterns,
            }
        })
        .collect();

    hits.sort_by(|a, b| {
        let order = match query.sort {
            SortKey::Ratio => b.ratio.total_cmp(&a.ratio),
            SortKey::Conviction => b.conviction_score.total_cmp(&a.conviction_score),
            SortKey::Value => b.transaction_value.total_cmp(&a.transaction_value),
            SortKey::SmartMoney => {
                (b.pattern_count, b.smart_money_score).cmp(&(a.pattern_count, a.smart_money_score))
            }
        };
        order
            .then_with(|| a.instrument_id.cmp(&b.instrument_id))
            .then_with(|| a.trading_date.cmp(&b.trading_date))
    });
    if let Some(limit) = query.limit {
        hits.truncate(limit);
    }

    Outcome::from_vec(hits)
}

fn passes_ratio(category: SignalCategory, driver: SplitDriver, row: &AnalyzedRow, bound: f64) -> bool {
    let ratio = category.driving_ratio(&row.ratios, driver);
    match (category, driver) {
        (SignalCategory::Split, SplitDriver::AovRatio) => ratio <= bound,
        _ => ratio >= bound,
    }
}

// ── Chart annotations ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ChartPoint {
    pub trading_date: NaiveDate,
    pub open: f64,
    pub high: f64,
    pub low: f64,
    pub close: f64,
    pub volume: u64,
    pub aov_ratio: f64,
    pub freq_spike_ratio: f64,
    pub signal_category: SignalCategory,
    pub conviction_score: f64,
    pub regime: PriceRegime,
    pub activity: ActivityLevel,
    pub vwma: Option<f64>,
}

/// Time-ordered points for one instrument, `from`/`to` inclusive and
/// optional.
pub fn chart(
    analysis: &Analysis,
    instrument_id: &str,
    from: Option<NaiveDate>,
    to: Option<NaiveDate>,
    config: &EngineConfig,
) -> Outcome<Vec<ChartPoint>> {
    let Some(series) = analysis.instrument(instrument_id) else {
        return Outcome::NoMatches;
    };
    let points = series
        .iter()
        .filter(|row| in_range(row, from, to))
        .map(|row| ChartPoint {
            trading_date: row.observation.trading_date,
            open: row.observation.open,
            high: row.observation.high,
            low: row.observation.low,
            close: row.observation.close,
            volume: row.observation.volume,
            aov_ratio: config.display.clip(row.ratios.aov),
            freq_spike_ratio: config.display.clip(row.ratios.freq_spike),
            signal_category: row.signal.category,
            conviction_score: row.signal.conviction,
            regime: row.regime,
            activity: row.activity,
            vwma: row.vwma,
        })
        .collect();
    Outcome::from_vec(points)
}

fn in_range(row: &AnalyzedRow, from: Option<NaiveDate>, to: Option<NaiveDate>) -> bool {
    let d = row.observation.trading_date;
    from.map_or(true, |f| d >= f) && to.map_or(true, |t| d <= t)
}

// ── Period summary ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InstrumentSummary {
    pub instrument_id: String,
    pub appearances: usize,
    pub mean_ratio: f64,
    pub mean_change_pct: f64,
    pub mean_transaction_value: f64,
    pub total_net_foreign: f64,
    pub last_date: NaiveDate,
}

/// Collapses a range screen into one line per instrument: how often it
/// fired and how much foreign money moved meanwhile.
pub fn period_summary(hits: &[ScreenerHit]) -> Vec<InstrumentSummary> {
    let mut grouped: BTreeMap<&str, Vec<&ScreenerHit>> = BTreeMap::new();
    for hit in hits {
        grouped.entry(hit.instrument_id.as_str()).or_default().push(hit);
    }

    let mut summaries: Vec<InstrumentSummary> = grouped
        .into_iter()
        .filter_map(|(id, hits)| {
            let n = hits.len() as f64;
            Some(InstrumentSummary {
                instrument_id: id.to_string(),
                appearances: hits.len(),
                mean_ratio: hits.iter().map(|h| h.ratio).sum::<f64>() / n,
                mean_change_pct: hits.iter().map(|h| h.change_pct).sum::<f64>() / n,
                mean_transaction_value: hits.iter().map(|h| h.transaction_value).sum::<f64>() / n,
                total_net_foreign: hits.iter().map(|h| h.net_foreign).sum(),
                last_date: hits.iter().map(|h| h.trading_date).max()?,
            })
        })
        .collect();

    summaries.sort_by(|a, b| {
        b.appearances
            .cmp(&a.appearances)
            .then_with(|| b.total_net_foreign.total_cmp(&a.total_net_foreign))
            .then_with(|| a.instrument_id.cmp(&b.instrument_id))
    });
    summaries
}

// ── Sector summary ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SectorSummary {
    pub sector: String,
    pub instruments: usize,
    pub mean_aov_ratio: f64,
    pub whales: usize,
    pub splits: usize,
}

/// Mean display-clipped order-size ratio per sector over each instrument's
/// latest row on or before `date` (the whole history when `None`), highest
/// first. Instruments without a sector are left out.
pub fn sector_summary(analysis: &Analysis, date: Option<NaiveDate>, config: &EngineConfig) -> Outcome<Vec<SectorSummary>> {
    let mut grouped: BTreeMap<&str, Vec<&AnalyzedRow>> = BTreeMap::new();
    for series in analysis.series.values() {
        let latest = series
            .iter()
            .rev()
            .find(|r| date.map_or(true, |d| r.observation.trading_date <= d));
        if let Some(row) = latest {
            if let Some(sector) = row.observation.sector.as_deref() {
                grouped.entry(sector).or_default().push(row);
            }
        }
    }

    let mut sectors: Vec<SectorSummary> = grouped
        .into_iter()
        .map(|(sector, rows)| {
            let count = |c: SignalCategory| rows.iter().filter(|r| r.signal.category == c).count();
            SectorSummary {
                sector: sector.to_string(),
                instruments: rows.len(),
                mean_aov_ratio: rows.iter().map(|r| config.display.clip(r.ratios.aov)).sum::<f64>() / rows.len() as f64,
                whales: count(SignalCategory::Whale),
                splits: count(SignalCategory::Split),
            }
        })
        .collect();

    sectors.sort_by(|a, b| {
        b.mean_aov_ratio
            .total_cmp(&a.mean_aov_ratio)
            .then_with(|| a.sector.cmp(&b.sector))
    });
    Outcome::from_vec(sectors)
}

// ── Market overview ──

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MarketOverview {
    pub trading_date: NaiveDate,
    pub instruments: usize,
    pub whales: usize,
    pub splits: usize,
    pub total_transaction_value: f64,
}

pub fn market_overview(analysis: &Analysis, date: Option<NaiveDate>) -> Outcome<MarketOverview> {
    let Some(trading_date) = date.or_else(|| analysis.latest_date()) else {
        return Outcome::NoMatches;
    };
    let day: Vec<&AnalyzedRow> = analysis
        .rows()
        .filter(|r| r.observation.trading_date == trading_date)
        .collect();
    if day.is_empty() {
        return Outcome::NoMatches;
    }
    let count = |c: SignalCategory| day.iter().filter(|r| r.signal.category == c).count();
    Outcome::Found(MarketOverview {
        trading_date,
        instruments: day.len(),
        whales: count(SignalCategory::Whale),
        splits: count(SignalCategory::Split),
        total_transaction_value: day.iter().map(|r| r.observation.transaction_value).sum(),
    })
}
