use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use axum::{Json, Router};
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::backtest::{self, BacktestReport};
use crate::classifier::PriceFilter;
use crate::config::EngineConfig;
use crate::stats;
use crate::types::{Analysis, SignalCategory};
use crate::views::{self, DateSelection, Outcome, ScreenerQuery, SortKey};

const HISTOGRAM_BINS: usize = 20;

pub struct AppState {
    pub analysis: Analysis,
    pub config: EngineConfig,
}

#[derive(Debug, Default, Deserialize)]
pub struct DateParams {
    pub date: Option<NaiveDate>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
}

#[derive(Debug, Deserialize)]
pub struct ScreenerParams {
    pub date: Option<NaiveDate>,
    pub from: Option<NaiveDate>,
    pub to: Option<NaiveDate>,
    #[serde(default = "default_category")]
    pub category: SignalCategory,
    #[serde(default)]
    pub price: PriceFilter,
    pub sector: Option<String>,
    #[serde(default)]
    pub sort: SortKey,
    pub limit: Option<usize>,
    pub min_ratio: Option<f64>,
    pub min_conviction: Option<f64>,
    pub min_value: Option<f64>,
}

#[derive(Debug, Deserialize)]
pub struct BacktestParams {
    #[serde(default = "default_category")]
    pub category: SignalCategory,
    /// Comma separated trading-day horizons, e.g. `5,10,20`.
    pub horizons: Option<String>,
    pub min_value: Option<f64>,
}

#[derive(Serialize)]
struct BacktestResponse {
    #[serde(flatten)]
    report: BacktestReport,
    /// Per horizon: `(bin lower edge, count)` pairs.
    histograms: Vec<(usize, Vec<(f64, usize)>)>,
}

fn default_category() -> SignalCategory {
    SignalCategory::Whale
}

impl DateParams {
    fn selection(&self) -> DateSelection {
        match (self.from, self.to, self.date) {
            (None, None, None) => DateSelection::Latest,
            (None, None, Some(day)) => DateSelection::Day(day),
            (from, to, day) => DateSelection::Range {
                from: from.unwrap_or(NaiveDate::MIN),
                to: to.or(day).unwrap_or(NaiveDate::MAX),
            },
        }
    }
}

impl ScreenerParams {
    fn dates(&self) -> DateParams {
        DateParams { date: self.date, from: self.from, to: self.to }
    }

    fn query(&self) -> Result<ScreenerQuery, String> {
        if let Some(c) = self.min_conviction {
            if !(0.0..=100.0).contains(&c) {
                return Err(format!("min_conviction must be within 0..=100, got {c}"));
            }
        }
        if let (Some(from), Some(to)) = (self.from, self.to) {
            if from > to {
                return Err(format!("from ({from}) is after to ({to})"));
            }
        }
        Ok(ScreenerQuery {
            dates: self.dates().selection(),
            category: self.category,
            price: self.price,
            sector: self
                .sector
                .as_deref()
                .map(str::trim)
                .filter(|s| !s.is_empty())
                .map(str::to_string),
            min_ratio: self.min_ratio,
            min_conviction: self.min_conviction,
            min_transaction_value: self.min_value,
            sort: self.sort,
            limit: self.limit,
        })
    }
}

/// Parses `"5,10,20"`; every horizon must be a positive integer.
pub fn parse_horizons(raw: &str) -> Result<Vec<usize>, String> {
    let horizons = raw
        .split(',')
        .map(str::trim)
        .filter(|s| !s.is_empty())
        .map(|s| match s.parse::<usize>() {
            Ok(h) if h > 0 => Ok(h),
            _ => Err(format!("invalid horizon: {s:?}")),
        })
        .collect::<Result<Vec<_>, _>>()?;
    if horizons.is_empty() {
        return Err("horizons must not be empty".to_string());
    }
    Ok(horizons)
}

pub fn router(state: Arc<AppState>) -> Router {
    Router::new()
        .route("/api/overview", get(overview_handler))
        .route("/api/screener", get(screener_handler))
        .route("/api/summary", get(summary_handler))
        .route("/api/sectors", get(sectors_handler))
        .route("/api/chart/:instrument", get(chart_handler))
        .route("/api/backtest", get(backtest_handler))
        .with_state(state)
}

pub async fn run(port: u16, analysis: Analysis, config: EngineConfig) -> Result<(), Box<dyn std::error::Error>> {
    let state = Arc::new(AppState { analysis, config });
    let app = router(state);

    let addr = format!("0.0.0.0:{port}");
    info!(%addr, "serving API");
    println!("API at http://localhost:{port}/api/overview");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app).await?;
    Ok(())
}

fn bad_request(msg: String) -> Response {
    (StatusCode::BAD_REQUEST, msg).into_response()
}

async fn overview_handler(State(state): State<Arc<AppState>>, Query(params): Query<DateParams>) -> Response {
    Json(views::market_overview(&state.analysis, params.date)).into_response()
}

async fn screener_handler(State(state): State<Arc<AppState>>, Query(params): Query<ScreenerParams>) -> Response {
    match params.query() {
        Ok(query) => Json(views::screener(&state.analysis, &query, &state.config)).into_response(),
        Err(msg) => bad_request(msg),
    }
}

async fn summary_handler(State(state): State<Arc<AppState>>, Query(params): Query<ScreenerParams>) -> Response {
    let query = match params.query() {
        Ok(q) => ScreenerQuery { limit: None, ..q },
        Err(msg) => return bad_request(msg),
    };
    let summary = match views::screener(&state.analysis, &query, &state.config) {
        Outcome::Found(hits) => Outcome::from_vec(views::period_summary(&hits)),
        Outcome::NoMatches => Outcome::NoMatches,
    };
    Json(summary).into_response()
}

async fn sectors_handler(State(state): State<Arc<AppState>>, Query(params): Query<DateParams>) -> Response {
    Json(views::sector_summary(&state.analysis, params.date, &state.config)).into_response()
}

async fn chart_handler(
    State(state): State<Arc<AppState>>,
    Path(instrument): Path<String>,
    Query(params): Query<DateParams>,
) -> Response {
    Json(views::chart(&state.analysis, instrument.trim(), params.from, params.to, &state.config)).into_response()
}

async fn backtest_handler(State(state): State<Arc<AppState>>, Query(params): Query<BacktestParams>) -> Response {
    let horizons = match params.horizons.as_deref() {
        Some(raw) => match parse_horizons(raw) {
            Ok(h) => h,
            Err(msg) => return bad_request(msg),
        },
        None => state.config.backtest.horizons.clone(),
    };
    let floor = params.min_value.unwrap_or(state.config.backtest.liquidity_floor);

    let outcome = match backtest::run(&state.analysis, params.category, &horizons, floor) {
        Outcome::Found(report) => {
            let histograms = report
                .stats
                .iter()
                .map(|s| (s.horizon, stats::histogram(&s.returns, HISTOGRAM_BINS)))
                .collect();
            Outcome::Found(BacktestResponse { report, histograms })
        }
        Outcome::NoMatches => Outcome::NoMatches,
    };
    Json(outcome).into_response()
}
