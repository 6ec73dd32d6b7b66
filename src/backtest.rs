//! "What happened after this signal fired": forward returns per holding
//! horizon. Descriptive only, no sizing, slippage or compounding.

use chrono::NaiveDate;
use serde::Serialize;
use tracing::info;

use crate::config::BacktestConfig;
use crate::stats::{self, ReturnDistribution};
use crate::types::{AnalyzedRow, Analysis, SignalCategory};
use crate::views::Outcome;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SignalEvent {
    pub instrument_id: String,
    pub trading_date: NaiveDate,
    pub close: f64,
    pub aov_ratio: f64,
    pub conviction_score: f64,
    pub transaction_value: f64,
    /// Aligned with `BacktestReport::horizons`; `None` past the end of the
    /// series.
    pub forward_returns: Vec<Option<f64>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HorizonStats {
    pub horizon: usize,
    pub sample_count: usize,
    pub mean_return: Option<f64>,
    pub win_rate: Option<f64>,
    pub distribution: ReturnDistribution,
    pub returns: Vec<f64>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct BacktestReport {
    pub category: SignalCategory,
    pub horizons: Vec<usize>,
    pub liquidity_floor: f64,
    pub stats: Vec<HorizonStats>,
    pub events: Vec<SignalEvent>,
}

impl BacktestReport {
    pub fn horizon(&self, h: usize) -> Option<&HorizonStats> {
        self.stats.iter().find(|s| s.horizon == h)
    }

    /// Best performers on the first horizon, events without a return for it
    /// skipped.
    pub fn top_events(&self, n: usize) -> Vec<&SignalEvent> {
        let mut ranked: Vec<(&SignalEvent, f64)> = self
            .events
            .iter()
            .filter_map(|e| e.forward_returns.first().copied().flatten().map(|r| (e, r)))
            .collect();
        ranked.sort_by(|a, b| {
            b.1.total_cmp(&a.1)
                .then_with(|| a.0.instrument_id.cmp(&b.0.instrument_id))
                .then_with(|| a.0.trading_date.cmp(&b.0.trading_date))
        });
        ranked.into_iter().take(n).map(|(e, _)| e).collect()
    }
}

/// `close[t+h] / close[t] - 1` within one instrument's series. `None` when
/// `t+h` runs past the series or the entry close is not positive.
pub fn forward_return(series: &[AnalyzedRow], t: usize, h: usize) -> Option<f64> {
    let entry = series.get(t)?.observation.close;
    let exit = series.get(t.checked_add(h)?)?.observation.close;
    (entry > 0.0).then(|| exit / entry - 1.0)
}

pub fn run_with_config(analysis: &Analysis, category: SignalCategory, config: &BacktestConfig) -> Outcome<BacktestReport> {
    run(analysis, category, &config.horizons, config.liquidity_floor)
}

/// Events are rows labelled `category` whose transaction value meets
/// `liquidity_floor`. Returns `NoMatches` when no event fired at all.
pub fn run(
    analysis: &Analysis,
    category: SignalCategory,
    horizons: &[usize],
    liquidity_floor: f64,
) -> Outcome<BacktestReport> {
    let mut events = Vec::new();
    for series in analysis.series.values() {
        for (t, row) in series.iter().enumerate() {
            let obs = &row.observation;
            if row.signal.category != category || obs.transaction_value < liquidity_floor {
                continue;
            }
            events.push(SignalEvent {
                instrument_id: obs.instrument_id.clone(),
                trading_date: obs.trading_date,
                close: obs.close,
                aov_ratio: row.ratios.aov,
                conviction_score: row.signal.conviction,
                transaction_value: obs.transaction_value,
                forward_returns: horizons.iter().map(|&h| forward_return(series, t, h)).collect(),
            });
        }
    }

    if events.is_empty() {
        return Outcome::NoMatches;
    }

    let horizon_stats = horizons
        .iter()
        .enumerate()
        .map(|(i, &horizon)| {
            let returns: Vec<f64> = events.iter().filter_map(|e| e.forward_returns[i]).collect();
            HorizonStats {
                horizon,
                sample_count: returns.len(),
                mean_return: stats::mean(&returns),
                win_rate: stats::win_rate(&returns),
                distribution: stats::distribution(&returns),
                returns,
            }
        })
        .collect::<Vec<_>>();

    info!(
        category = category.label(),
        events = events.len(),
        horizons = ?horizons,
        "backtest complete"
    );

    Outcome::Found(BacktestReport {
        category,
        horizons: horizons.to_vec(),
        liquidity_floor,
        stats: horizon_stats,
        events,
    })
}
