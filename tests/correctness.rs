//! Correctness tests for the normalize -> baseline -> classify -> backtest
//! pipeline + edge cases.
//!
//! Builds small deterministic tables by hand and asserts exact ratios,
//! labels and returns.

use chrono::{Duration, NaiveDate};

use order_flow_radar::backtest;
use order_flow_radar::classifier::PriceFilter;
use order_flow_radar::config::{BaselineConfig, EngineConfig, RegimeConfig, SplitDriver};
use order_flow_radar::detection;
use order_flow_radar::error::EngineError;
use order_flow_radar::generator::{DatasetGenerator, Scenario};
use order_flow_radar::normalizer;
use order_flow_radar::source;
use order_flow_radar::types::*;
use order_flow_radar::views::{self, DateSelection, Outcome, ScreenerQuery, SortKey};

fn day(n: i64) -> NaiveDate {
    NaiveDate::from_ymd_opt(2024, 1, 1).unwrap() + Duration::days(n)
}

/// One raw row; transaction value is left to the normalizer's estimate.
fn record(id: &str, date: NaiveDate, close: f64, volume: f64, frequency: f64) -> RawRecord {
    let mut r = RawRecord::new();
    r.insert("Stock Code".into(), RawValue::from(id));
    r.insert("Last Trading Date".into(), RawValue::Text(date.to_string()));
    r.insert("Close".into(), close.into());
    r.insert("High".into(), close.into());
    r.insert("Low".into(), close.into());
    r.insert("Volume".into(), volume.into());
    r.insert("Frequency".into(), frequency.into());
    r
}

/// `days` identical rows: 100 trades of 100 lots each.
fn flat(id: &str, days: i64) -> Vec<RawRecord> {
    (0..days).map(|i| record(id, day(i), 100.0, 10_000.0, 100.0)).collect()
}

/// Default thresholds without the liquidity floor, so tiny test rows qualify.
fn test_config() -> EngineConfig {
    let mut config = EngineConfig::default();
    config.classifier.min_transaction_value = 0.0;
    config.backtest.liquidity_floor = 0.0;
    config
}

fn analyze(records: Vec<RawRecord>, config: &EngineConfig) -> Analysis {
    detection::run(&RawTable::from_records(records), config).unwrap()
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-9
}

// ── Test 1: Split-order day (freq x5, volume flat) ──
// 25 days of freq=100 / volume=10000, then freq=500 / volume=11000.
// Baseline excludes today, so freq_spike=5.0, volume_spike=1.1,
// split_intensity=5/1.1, aov=22/100.
#[test]
fn test_split_order_day() {
    let mut rows = flat("AAA", 25);
    rows.push(record("AAA", day(25), 100.0, 11_000.0, 500.0));
    let analysis = analyze(rows, &test_config());

    let series = analysis.instrument("AAA").unwrap();
    assert_eq!(series.len(), 26);
    let last = &series[25];

    assert!(approx(last.baselines.frequency, 100.0), "freq baseline {}", last.baselines.frequency);
    assert!(approx(last.ratios.freq_spike, 5.0), "freq_spike {}", last.ratios.freq_spike);
    assert!(approx(last.ratios.volume_spike, 1.1), "volume_spike {}", last.ratios.volume_spike);
    assert!((last.ratios.split_intensity - 4.545_454_545).abs() < 1e-6);
    assert!(approx(last.ratios.aov, 0.22), "aov {}", last.ratios.aov);
    assert_eq!(last.activity, ActivityLevel::High);

    assert_eq!(last.signal.category, SignalCategory::Split);
    // (0.6 - 0.22) / 0.6 * 80 + 20
    assert!((last.signal.conviction - 70.666_666_666).abs() < 1e-6, "conviction {}", last.signal.conviction);
}

// ── Test 2: Same day under the split-intensity driver ──
// freq_spike 5 >= 2 and intensity 4.545 >= 1.5, conviction scaled over
// [1.5, 5.0].
#[test]
fn test_split_intensity_driver() {
    let mut config = test_config();
    config.classifier.split_driver = SplitDriver::SplitIntensity;

    let mut rows = flat("AAA", 25);
    rows.push(record("AAA", day(25), 100.0, 11_000.0, 500.0));
    // Smaller orders but no trade-count spike: Split only under the AOV driver.
    rows.push(record("AAA", day(26), 100.0, 5_000.0, 100.0));

    let intensity = analyze(rows.clone(), &config);
    let series = intensity.instrument("AAA").unwrap();
    assert_eq!(series[25].signal.category, SignalCategory::Split);
    let expected = ((5.0 / 1.1) - 1.5) / 3.5 * 80.0 + 20.0;
    assert!((series[25].signal.conviction - expected).abs() < 1e-9);
    assert_eq!(series[26].signal.category, SignalCategory::Normal);

    let aov = analyze(rows, &test_config());
    assert_eq!(aov.instrument("AAA").unwrap()[26].signal.category, SignalCategory::Split);
}

// ── Test 3: Constant order size is never anomalous ──
// Every ratio is exactly 1.0 after the first row; nothing is labelled.
#[test]
fn test_constant_order_size_all_normal() {
    let analysis = analyze(flat("AAA", 60), &test_config());
    for row in analysis.rows() {
        assert_eq!(row.signal.category, SignalCategory::Normal);
        assert_eq!(row.signal.conviction, 0.0);
    }
    let series = analysis.instrument("AAA").unwrap();
    assert!(series[1..].iter().all(|r| approx(r.ratios.aov, 1.0)));
}

// ── Test 4: Threshold boundaries are inclusive ──
// 20 flat days put the order-size baseline at exactly 100.
#[test]
fn test_threshold_boundaries() {
    let cases = [
        (15_000.0, SignalCategory::Whale, 20.0),  // aov 1.50
        (14_900.0, SignalCategory::Normal, 0.0),  // aov 1.49
        (6_000.0, SignalCategory::Split, 20.0),   // aov 0.60
        (6_100.0, SignalCategory::Normal, 0.0),   // aov 0.61
        (60_000.0, SignalCategory::Whale, 99.0),  // aov 6.0, saturated
    ];
    for (volume, category, conviction) in cases {
        let mut rows = flat("AAA", 20);
        rows.push(record("AAA", day(20), 100.0, volume, 100.0));
        let analysis = analyze(rows, &test_config());
        let last = &analysis.instrument("AAA").unwrap()[20];
        assert_eq!(last.signal.category, category, "volume {volume}, aov {}", last.ratios.aov);
        assert!(approx(last.signal.conviction, conviction), "volume {volume}, conviction {}", last.signal.conviction);
    }
}

// ── Test 5: Zero guard ──
// The first row has no history: every ratio is 0 and the row is Normal.
// A day with no trades is Normal regardless of its ratios.
#[test]
fn test_zero_guard() {
    let mut rows = flat("AAA", 5);
    rows.push(record("AAA", day(5), 100.0, 0.0, 0.0));
    let analysis = analyze(rows, &test_config());
    let series = analysis.instrument("AAA").unwrap();

    let first = &series[0];
    assert_eq!(first.baselines, Baselines::default());
    assert_eq!(first.ratios, Ratios::default());
    assert_eq!(first.signal, Signal::normal());

    let idle = &series[5];
    assert_eq!(idle.observation.avg_order_size, 0.0);
    assert_eq!(idle.ratios.aov, 0.0);
    assert_eq!(idle.signal.category, SignalCategory::Normal);
    for r in series {
        assert!(r.ratios.aov.is_finite() && r.ratios.freq_spike.is_finite() && r.ratios.split_intensity.is_finite());
    }
}

// ── Test 6: Causality ──
// Changing a later row must not change any earlier row's output.
#[test]
fn test_baselines_never_read_the_future() {
    let rows: Vec<RawRecord> = (0..30)
        .map(|i| {
            let volume = 10_000.0 + ((i * 37) % 11) as f64 * 500.0;
            let frequency = 100.0 + (i % 7) as f64 * 5.0;
            record("AAA", day(i), 100.0 + i as f64, volume, frequency)
        })
        .collect();
    let before = analyze(rows.clone(), &test_config());

    let mut mutated = rows;
    mutated[25].insert("Volume".into(), RawValue::Number(500_000.0));
    mutated[29].insert("Frequency".into(), RawValue::Number(9.0));
    let after = analyze(mutated, &test_config());

    let a = before.instrument("AAA").unwrap();
    let b = after.instrument("AAA").unwrap();
    assert_eq!(a[..25], b[..25]);
    // Today's own baseline is untouched; only its ratios move.
    assert_eq!(a[25].baselines, b[25].baselines);
    assert_ne!(a[25].ratios, b[25].ratios);
}

// ── Test 7: Per-instrument isolation ──
// Interleaving a second instrument's rows day by day leaves the first
// one's output unchanged.
#[test]
fn test_instruments_are_isolated() {
    let mut a_rows = flat("AAA", 20);
    a_rows.push(record("AAA", day(20), 100.0, 30_000.0, 100.0));
    let alone = analyze(a_rows.clone(), &test_config());
    assert_eq!(alone.instrument("AAA").unwrap()[20].signal.category, SignalCategory::Whale);

    let b_rows = (0..21).map(|i| record("BBB", day(i), 50.0, 1_000.0 * (i + 1) as f64, 7.0));
    let both: Vec<RawRecord> = a_rows.into_iter().zip(b_rows).flat_map(|(a, b)| [b, a]).collect();
    assert_eq!(both[0]["Stock Code"], RawValue::from("BBB"));
    assert_eq!(both[1]["Stock Code"], RawValue::from("AAA"));
    let together = analyze(both, &test_config());

    assert_eq!(alone.instrument("AAA"), together.instrument("AAA"));
    assert_eq!(together.series.len(), 2);
    assert_eq!(together.instrument("BBB").unwrap().len(), 21);
}

// ── Test 8: Determinism ──
#[test]
fn test_analysis_is_deterministic() {
    let table = DatasetGenerator::new(7, 4, 0.1).generate(day(0), 60);
    let config = EngineConfig::default();
    let first = detection::run(&table, &config).unwrap();
    let second = detection::run(&table, &config).unwrap();
    assert_eq!(first, second);
}

// ── Test 9: Warm-up floor ──
// With strict windows nothing is labelled before 20 prior rows exist,
// while the partial default already reacts on day 5.
#[test]
fn test_strict_warm_up_suppresses_early_signals() {
    let mut rows = flat("AAA", 5);
    rows.push(record("AAA", day(5), 100.0, 30_000.0, 100.0));

    let partial = analyze(rows.clone(), &test_config());
    assert_eq!(partial.instrument("AAA").unwrap()[5].signal.category, SignalCategory::Whale);

    let mut strict = test_config();
    strict.baseline = BaselineConfig::strict(20);
    let analysis = analyze(rows, &strict);
    let row = &analysis.instrument("AAA").unwrap()[5];
    assert_eq!(row.baselines.avg_order_size, 0.0);
    assert_eq!(row.signal.category, SignalCategory::Normal);
}

// ── Test 10: Liquidity floor ──
// Default floor is 500M; a 100 x 30000 x 100 = 300M day stays Normal.
#[test]
fn test_liquidity_floor_keeps_thin_days_normal() {
    let mut rows = flat("AAA", 20);
    rows.push(record("AAA", day(20), 100.0, 30_000.0, 100.0));
    let analysis = analyze(rows, &EngineConfig::default());
    let last = &analysis.instrument("AAA").unwrap()[20];
    assert!(approx(last.observation.transaction_value, 300_000_000.0));
    assert!(approx(last.ratios.aov, 3.0));
    assert_eq!(last.signal.category, SignalCategory::Normal);
}

// ── Test 11: Normalizer schema and row handling ──
#[test]
fn test_missing_required_column_is_an_error() {
    let mut r = record("AAA", day(0), 100.0, 1.0, 1.0);
    r.remove("Stock Code");
    let err = detection::run(&RawTable::from_records(vec![r]), &EngineConfig::default()).unwrap_err();
    assert!(matches!(err, EngineError::MissingColumn(ref c) if c == "Stock Code"), "got {err:?}");
}

#[test]
fn test_bad_rows_dropped_and_duplicates_keep_last() {
    let mut bad_date = record("AAA", day(1), 100.0, 1_000.0, 10.0);
    bad_date.insert("Last Trading Date".into(), RawValue::from("someday"));
    let mut no_id = record("AAA", day(2), 100.0, 1_000.0, 10.0);
    no_id.insert("Stock Code".into(), RawValue::Null);
    let mut bad_number = record("AAA", day(3), 100.0, 1_000.0, 10.0);
    bad_number.insert("Volume".into(), RawValue::from("n/a"));

    let table = RawTable::from_records(vec![
        record("AAA", day(0), 100.0, 1_000.0, 10.0),
        bad_date,
        no_id,
        bad_number,
        record("AAA", day(0), 105.0, 2_000.0, 20.0),
    ]);
    let config = EngineConfig::default();
    let dataset = normalizer::normalize(&table, &config.columns, &config.normalizer).unwrap();
    let series = &dataset["AAA"];

    assert_eq!(series.len(), 2);
    assert_eq!(series[0].trading_date, day(0));
    assert_eq!(series[0].close, 105.0);
    assert_eq!(series[0].volume, 2_000);
    assert!(approx(series[0].avg_order_size, 100.0));
    // Unparsable volume becomes 0, the row itself survives.
    assert_eq!(series[1].trading_date, day(3));
    assert_eq!(series[1].volume, 0);
}

#[test]
fn test_series_sorted_by_date() {
    let table = RawTable::from_records(vec![
        record("AAA", day(2), 102.0, 1.0, 1.0),
        record("AAA", day(0), 100.0, 1.0, 1.0),
        record("AAA", day(1), 101.0, 1.0, 1.0),
    ]);
    let config = EngineConfig::default();
    let dataset = normalizer::normalize(&table, &config.columns, &config.normalizer).unwrap();
    let closes: Vec<f64> = dataset["AAA"].iter().map(|o| o.close).collect();
    assert_eq!(closes, vec![100.0, 101.0, 102.0]);
    assert!(approx(dataset["AAA"][2].change_pct, 1.0 / 101.0 * 100.0));
}

// ── Test 12: CSV end to end ──
// Thousands separators and percent signs in cells, BOM on the header.
#[test]
fn test_csv_end_to_end() {
    let mut csv = String::from("\u{feff}Stock Code,Last Trading Date,Close,Volume,Frequency,Value,Change %\n");
    for i in 0..20 {
        csv.push_str(&format!("AAA,{},\"1,000\",\"10,000\",100,\"1,000,000,000\",0.5%\n", day(i)));
    }
    csv.push_str(&format!("AAA,{},\"1,000\",\"40,000\",100,\"4,000,000,000\",3.0%\n", day(20)));

    let table = source::parse_csv(csv.as_bytes()).unwrap();
    let analysis = detection::run(&table, &EngineConfig::default()).unwrap();
    let last = &analysis.instrument("AAA").unwrap()[20];
    assert!(approx(last.ratios.aov, 4.0));
    assert!(approx(last.observation.change_pct, 3.0));
    assert_eq!(last.signal.category, SignalCategory::Whale);
    assert_eq!(last.regime, PriceRegime::EarlyUptrend);
}

// ── Test 13: Price context filters ──
fn observation(close: f64, change_pct: f64) -> Observation {
    Observation {
        instrument_id: "AAA".into(),
        trading_date: day(0),
        open: close,
        high: close,
        low: close,
        close,
        volume: 1_000,
        frequency: 10,
        avg_order_size: 100.0,
        transaction_value: 0.0,
        change_pct,
        sector: None,
        company_name: None,
        free_float_pct: None,
        foreign_buy: None,
        foreign_sell: None,
    }
}

#[test]
fn test_price_filters_overlap_and_regime_picks_first() {
    let cfg = RegimeConfig::default();

    let dip = observation(100.0, -1.0);
    assert!(PriceFilter::Sideways.matches(&dip, None, &cfg));
    assert!(PriceFilter::Downtrend.matches(&dip, None, &cfg));
    assert!(!PriceFilter::EarlyUptrend.matches(&dip, None, &cfg));
    assert_eq!(PriceRegime::of(&dip, None, &cfg), PriceRegime::Sideways);

    let climb = observation(100.0, 3.0);
    assert!(!PriceFilter::Sideways.matches(&climb, None, &cfg));
    assert!(PriceFilter::EarlyUptrend.matches(&climb, None, &cfg));
    assert_eq!(PriceRegime::of(&climb, None, &cfg), PriceRegime::EarlyUptrend);
    // Below its VWMA the same day also counts as downtrending, which wins.
    assert!(PriceFilter::Downtrend.matches(&climb, Some(110.0), &cfg));
    assert_eq!(PriceRegime::of(&climb, Some(110.0), &cfg), PriceRegime::Downtrend);

    assert!(PriceFilter::EarlyUptrend.matches(&observation(100.0, 4.0), None, &cfg));
    let rally = observation(100.0, 5.0);
    assert_eq!(PriceRegime::of(&rally, Some(90.0), &cfg), PriceRegime::Other);
    assert!(PriceFilter::Any.matches(&rally, None, &cfg));
}

// ── Test 14: Screener sort, limit, clip ──
// Four instruments fire on the same day with aov 2, 4, 3 and 30.
fn screener_fixture() -> Analysis {
    let mut rows = Vec::new();
    for (id, volume) in [("AAA", 20_000.0), ("BBB", 40_000.0), ("CCC", 30_000.0), ("DDD", 300_000.0)] {
        rows.extend(flat(id, 20));
        rows.push(record(id, day(20), 100.0, volume, 100.0));
    }
    analyze(rows, &test_config())
}

#[test]
fn test_screener_sorts_limits_and_clips() {
    let analysis = screener_fixture();
    let config = test_config();

    let query = ScreenerQuery { sort: SortKey::Ratio, ..ScreenerQuery::new(SignalCategory::Whale) };
    let hits = views::screener(&analysis, &query, &config).found().unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.instrument_id.as_str()).collect();
    assert_eq!(ids, vec!["DDD", "BBB", "CCC", "AAA"]);
    assert_eq!(hits[0].ratio, 10.0, "display clip");
    assert!(approx(analysis.instrument("DDD").unwrap()[20].ratios.aov, 30.0));
    assert!(hits.iter().all(|h| h.trading_date == day(20)));

    let limited = ScreenerQuery { limit: Some(2), ..query.clone() };
    assert_eq!(views::screener(&analysis, &limited, &config).found().unwrap().len(), 2);

    let strong = ScreenerQuery { min_conviction: Some(90.0), ..query };
    let ids: Vec<String> = views::screener(&analysis, &strong, &config)
        .found()
        .unwrap()
        .into_iter()
        .map(|h| h.instrument_id)
        .collect();
    // BBB: (4 - 1.5) / 3.5 * 80 + 20 = 77.1; DDD saturates at 99.
    assert_eq!(ids, vec!["DDD"]);
}

#[test]
fn test_screener_min_ratio() {
    let analysis = screener_fixture();
    let query = ScreenerQuery { min_ratio: Some(3.0), ..ScreenerQuery::new(SignalCategory::Whale) };
    let mut ids: Vec<String> = views::screener(&analysis, &query, &test_config())
        .found()
        .unwrap()
        .into_iter()
        .map(|h| h.instrument_id)
        .collect();
    ids.sort();
    assert_eq!(ids, vec!["BBB", "CCC", "DDD"]);
}

// ── Test 15: NoMatches is not an error ──
#[test]
fn test_no_matches_outcome() {
    let analysis = analyze(flat("AAA", 30), &test_config());
    let config = test_config();

    assert_eq!(
        views::screener(&analysis, &ScreenerQuery::new(SignalCategory::Whale), &config),
        Outcome::NoMatches
    );
    // Normal rows are never screened.
    assert!(views::screener(&analysis, &ScreenerQuery::new(SignalCategory::Normal), &config).is_no_matches());
    // A date with no data.
    let query = ScreenerQuery { dates: DateSelection::Day(day(400)), ..ScreenerQuery::new(SignalCategory::Split) };
    assert!(views::screener(&analysis, &query, &config).is_no_matches());

    assert!(backtest::run(&analysis, SignalCategory::Whale, &[5], 0.0).is_no_matches());
    assert!(views::chart(&analysis, "ZZZ", None, None, &config).is_no_matches());

    let json = serde_json::to_value(Outcome::<Vec<u8>>::NoMatches).unwrap();
    assert_eq!(json, serde_json::json!({ "status": "no_matches" }));
}

#[test]
fn test_empty_input() {
    let table = RawTable {
        columns: vec!["Stock Code".into(), "Last Trading Date".into()],
        rows: Vec::new(),
    };
    let analysis = detection::run(&table, &EngineConfig::default()).unwrap();
    assert_eq!(analysis.row_count(), 0);
    assert_eq!(analysis.latest_date(), None);
    assert!(views::market_overview(&analysis, None).is_no_matches());
    assert!(views::screener(&analysis, &ScreenerQuery::new(SignalCategory::Whale), &EngineConfig::default()).is_no_matches());
}

// ── Test 16: Period summary ──
// AAA fires twice in the range, BBB once.
#[test]
fn test_period_summary() {
    let mut rows = flat("AAA", 20);
    rows.push(record("AAA", day(20), 100.0, 20_000.0, 100.0));
    // Window for day 21 now averages (19*100 + 200)/20 = 105.
    rows.push(record("AAA", day(21), 100.0, 40_000.0, 100.0));
    rows.extend(flat("BBB", 20));
    rows.push(record("BBB", day(20), 100.0, 20_000.0, 100.0));
    rows.push(record("BBB", day(21), 100.0, 10_000.0, 100.0));
    let analysis = analyze(rows, &test_config());

    let query = ScreenerQuery {
        dates: DateSelection::Range { from: day(0), to: day(30) },
        ..ScreenerQuery::new(SignalCategory::Whale)
    };
    let hits = views::screener(&analysis, &query, &test_config()).found().unwrap();
    assert_eq!(hits.len(), 3);

    let summary = views::period_summary(&hits);
    assert_eq!(summary.len(), 2);
    assert_eq!(summary[0].instrument_id, "AAA");
    assert_eq!(summary[0].appearances, 2);
    assert_eq!(summary[0].last_date, day(21));
    assert!(approx(summary[0].mean_ratio, (2.0 + 400.0 / 105.0) / 2.0));
    assert_eq!(summary[1].instrument_id, "BBB");
    assert_eq!(summary[1].appearances, 1);
}

// ── Test 17: Market overview and chart ──
#[test]
fn test_overview_and_chart() {
    let analysis = screener_fixture();
    let config = test_config();

    let overview = views::market_overview(&analysis, None).found().unwrap();
    assert_eq!(overview.trading_date, day(20));
    assert_eq!(overview.instruments, 4);
    assert_eq!(overview.whales, 4);
    assert_eq!(overview.splits, 0);

    let points = views::chart(&analysis, "BBB", Some(day(15)), None, &config).found().unwrap();
    assert_eq!(points.len(), 6);
    assert_eq!(points.first().unwrap().trading_date, day(15));
    assert_eq!(points.last().unwrap().signal_category, SignalCategory::Whale);
    // A flat 100 close: VWMA appears once the 20-row window is full.
    assert_eq!(points[4].vwma, Some(100.0));
}

// ── Test 18: Backtest mean and win rate ──
// Three whale events on day 5, four quiet filler days, then the exit on
// day 10: 5-day returns +10%, 0%, -5%.
fn whale_then(id: &str, exit_close: f64) -> Vec<RawRecord> {
    let mut rows = flat(id, 5);
    rows.push(record(id, day(5), 100.0, 30_000.0, 100.0));
    rows.extend((6..10).map(|i| record(id, day(i), 100.0, 10_000.0, 100.0)));
    rows.push(record(id, day(10), exit_close, 10_000.0, 100.0));
    rows
}

#[test]
fn test_backtest_mean_and_win_rate() {
    let mut rows = whale_then("AAA", 110.0);
    rows.extend(whale_then("BBB", 100.0));
    rows.extend(whale_then("CCC", 95.0));
    let analysis = analyze(rows, &test_config());

    // Filler days sit between the whale and split thresholds.
    assert!(analysis.rows().filter(|r| r.signal.category != SignalCategory::Normal).all(|r| r.observation.trading_date == day(5)));

    let report = backtest::run(&analysis, SignalCategory::Whale, &[5], 0.0).found().unwrap();
    assert_eq!(report.events.len(), 3);

    let h5 = report.horizon(5).unwrap();
    assert_eq!(h5.sample_count, 3);
    assert!((h5.mean_return.unwrap() - 0.05 / 3.0).abs() < 1e-9, "mean {:?}", h5.mean_return);
    assert!((h5.win_rate.unwrap() - 1.0 / 3.0).abs() < 1e-12);
    assert!((h5.distribution.median - 0.0).abs() < 1e-12);
    assert!((h5.distribution.max - 0.10).abs() < 1e-9);
    assert!((h5.distribution.min + 0.05).abs() < 1e-9);

    let top = report.top_events(1);
    assert_eq!(top[0].instrument_id, "AAA");
}

// ── Test 19: Horizon past the end of the series ──
// A 10-day series cannot produce a 20-day return; the event is still
// reported, with an empty sample.
#[test]
fn test_horizon_past_series_end_is_excluded() {
    let mut rows = flat("AAA", 5);
    rows.push(record("AAA", day(5), 100.0, 30_000.0, 100.0));
    rows.extend((6..10).map(|i| record("AAA", day(i), 120.0, 10_000.0, 100.0)));
    let analysis = analyze(rows, &test_config());

    let report = backtest::run(&analysis, SignalCategory::Whale, &[2, 20], 0.0).found().unwrap();
    assert_eq!(report.events.len(), 1);
    assert_eq!(report.events[0].forward_returns[1], None);

    let h2 = report.horizon(2).unwrap();
    assert_eq!(h2.sample_count, 1);
    assert!((h2.mean_return.unwrap() - 0.2).abs() < 1e-9);

    let h20 = report.horizon(20).unwrap();
    assert_eq!(h20.sample_count, 0);
    assert_eq!(h20.mean_return, None);
    assert_eq!(h20.win_rate, None);
}

// ── Test 20: Backtest liquidity floor ──
#[test]
fn test_backtest_liquidity_floor() {
    let analysis = analyze(whale_then("AAA", 110.0), &test_config());
    // Whale day value: 100 * 30000 * 100 = 300M.
    assert!(backtest::run(&analysis, SignalCategory::Whale, &[5], 300_000_000.0).found().is_some());
    assert!(backtest::run(&analysis, SignalCategory::Whale, &[5], 300_000_001.0).is_no_matches());
}

// ── Test 21: Generator ──
// Same seed, same table. Injected whale days are mostly picked up.
#[test]
fn test_generator_deterministic_and_detectable() {
    let a = DatasetGenerator::new(42, 8, 0.05).generate(day(0), 120);
    let b = DatasetGenerator::new(42, 8, 0.05).generate(day(0), 120);
    assert_eq!(a.columns, b.columns);
    assert_eq!(a.rows, b.rows);

    let mut gen = DatasetGenerator::new(42, 8, 0.05);
    let table = gen.generate(day(0), 250);
    let analysis = detection::run(&table, &EngineConfig::default()).unwrap();

    let whales: Vec<_> = gen.injected().iter().filter(|i| i.scenario == Scenario::WhaleAccumulation).collect();
    assert!(!whales.is_empty());
    let caught = whales
        .iter()
        .filter(|i| {
            analysis
                .instrument(&i.instrument_id)
                .and_then(|s| s.iter().find(|r| r.observation.trading_date == i.trading_date))
                .is_some_and(|r| r.signal.category == SignalCategory::Whale)
        })
        .count();
    assert!(caught * 2 >= whales.len(), "caught {caught} of {} injected whale days", whales.len());

    // Weekdays only.
    use chrono::Datelike;
    assert!(analysis.rows().all(|r| r.observation.trading_date.weekday().number_from_monday() <= 5));

    assert!(analysis.rows().all(|r| r.observation.sector.is_some()));
    let sectors = views::sector_summary(&analysis, None, &EngineConfig::default()).found().unwrap();
    assert_eq!(sectors.iter().map(|s| s.instruments).sum::<usize>(), 8);
}

#[test]
fn test_generator_non_finite_rate_injects_nothing() {
    for rate in [f64::NAN, f64::INFINITY, f64::NEG_INFINITY] {
        let mut gen = DatasetGenerator::new(3, 2, rate);
        assert_eq!(gen.anomaly_rate, 0.0);
        let table = gen.generate(day(0), 10);
        assert_eq!(table.len(), 20);
        assert!(gen.injected().is_empty());
    }
}

// ── Test 22: Trade-count floor ──
// Day 20 trades 50 orders of 300 lots: aov 3.0, well past the whale
// threshold. The floor is inclusive.
#[test]
fn test_min_frequency_floor() {
    let mut rows = flat("AAA", 20);
    rows.push(record("AAA", day(20), 100.0, 15_000.0, 50.0));

    let mut config = test_config();
    config.classifier.min_frequency = 51;
    let below = analyze(rows.clone(), &config);
    let last = &below.instrument("AAA").unwrap()[20];
    assert!(approx(last.ratios.aov, 3.0));
    assert_eq!(last.signal, Signal::normal());

    config.classifier.min_frequency = 50;
    let at = analyze(rows, &config);
    let last = &at.instrument("AAA").unwrap()[20];
    assert_eq!(last.signal.category, SignalCategory::Whale);
    assert!(approx(last.signal.conviction, (3.0 - 1.5) / 3.5 * 80.0 + 20.0));
}

// ── Test 23: Sector screen and sector summary ──
// Energy: AAA aov 2, BBB aov 4. Financials: CCC aov 5. DDD has no sector.
// Only AAA carries a company name and a free float.
fn sector_fixture() -> Analysis {
    let mut rows = Vec::new();
    for (id, sector, volume) in [
        ("AAA", Some("Energy"), 20_000.0),
        ("BBB", Some("Energy"), 40_000.0),
        ("CCC", Some("Financials"), 50_000.0),
        ("DDD", None, 300_000.0),
    ] {
        let mut series = flat(id, 20);
        series.push(record(id, day(20), 100.0, volume, 100.0));
        if let Some(sector) = sector {
            for r in &mut series {
                r.insert("Sector".into(), RawValue::from(sector));
            }
        }
        if id == "AAA" {
            for r in &mut series {
                r.insert("Company Name".into(), RawValue::from("Alpha Energy"));
                r.insert("Free Float".into(), RawValue::from("8.5%"));
            }
        }
        rows.extend(series);
    }
    analyze(rows, &test_config())
}

#[test]
fn test_screener_sector_filter() {
    let analysis = sector_fixture();
    let config = test_config();

    let query = ScreenerQuery { sector: Some("Energy".into()), ..ScreenerQuery::new(SignalCategory::Whale) };
    let hits = views::screener(&analysis, &query, &config).found().unwrap();
    let ids: Vec<&str> = hits.iter().map(|h| h.instrument_id.as_str()).collect();
    assert_eq!(ids, vec!["BBB", "AAA"]);
    assert!(hits.iter().all(|h| h.sector.as_deref() == Some("Energy")));
    assert_eq!(hits[1].company_name.as_deref(), Some("Alpha Energy"));
    assert_eq!(hits[1].free_float_pct, Some(8.5));
    assert_eq!(hits[1].free_float_label, Some("thin"));
    assert_eq!(hits[0].company_name, None);
    assert_eq!(hits[0].free_float_label, None);

    let all = views::screener(&analysis, &ScreenerQuery::new(SignalCategory::Whale), &config).found().unwrap();
    assert_eq!(all.len(), 4);
    assert_eq!(all.iter().find(|h| h.instrument_id == "DDD").unwrap().sector, None);

    let none = ScreenerQuery { sector: Some("Utilities".into()), ..ScreenerQuery::new(SignalCategory::Whale) };
    assert!(views::screener(&analysis, &none, &config).is_no_matches());
}

#[test]
fn test_sector_summary() {
    let analysis = sector_fixture();
    let config = test_config();

    let latest = views::sector_summary(&analysis, None, &config).found().unwrap();
    assert_eq!(latest.len(), 2);
    assert_eq!(latest[0].sector, "Financials");
    assert!(approx(latest[0].mean_aov_ratio, 5.0));
    assert_eq!((latest[0].instruments, latest[0].whales), (1, 1));
    assert_eq!(latest[1].sector, "Energy");
    assert!(approx(latest[1].mean_aov_ratio, 3.0));
    assert_eq!((latest[1].instruments, latest[1].whales, latest[1].splits), (2, 2, 0));

    // The day before, every instrument is flat: equal means, sorted by name.
    let before = views::sector_summary(&analysis, Some(day(19)), &config).found().unwrap();
    let names: Vec<&str> = before.iter().map(|s| s.sector.as_str()).collect();
    assert_eq!(names, vec!["Energy", "Financials"]);
    assert!(before.iter().all(|s| approx(s.mean_aov_ratio, 1.0) && s.whales == 0));

    assert!(views::sector_summary(&screener_fixture(), None, &config).is_no_matches());
}

// ── Test 24: Activity level and smart money ranking ──
// AAA: aov 3.0, flat trade count, foreign buyers 9:1 -> score 7, three
// patterns. BBB: aov 2.5 on 3x the trades -> score 8, three patterns.
// Conviction prefers AAA, the smart money key prefers BBB.
#[test]
fn test_activity_and_smart_money_sort() {
    let mut rows = flat("AAA", 20);
    let mut whale = record("AAA", day(20), 100.0, 30_000.0, 100.0);
    whale.insert("Foreign Buy".into(), RawValue::Number(900.0));
    whale.insert("Foreign Sell".into(), RawValue::Number(100.0));
    rows.push(whale);
    rows.extend(flat("BBB", 20));
    rows.push(record("BBB", day(20), 100.0, 75_000.0, 300.0));
    let analysis = analyze(rows, &test_config());
    let config = test_config();

    let by_conviction = views::screener(&analysis, &ScreenerQuery::new(SignalCategory::Whale), &config).found().unwrap();
    assert_eq!(by_conviction[0].instrument_id, "AAA");

    let query = ScreenerQuery { sort: SortKey::SmartMoney, ..ScreenerQuery::new(SignalCategory::Whale) };
    let hits = views::screener(&analysis, &query, &config).found().unwrap();
    let (bbb, aaa) = (&hits[0], &hits[1]);
    assert_eq!(bbb.instrument_id, "BBB");
    assert_eq!(bbb.activity, ActivityLevel::High);
    assert_eq!(bbb.smart_money_score, 8);
    assert_eq!(
        bbb.patterns,
        vec![SmartMoneyPattern::HighAov, SmartMoneyPattern::FrequencyAndAov, SmartMoneyPattern::StrongComposite]
    );

    assert_eq!(aaa.instrument_id, "AAA");
    assert_eq!(aaa.activity, ActivityLevel::Normal);
    assert_eq!(aaa.smart_money_score, 7);
    assert_eq!(aaa.pattern_count, 3);
    assert!(aaa.patterns.contains(&SmartMoneyPattern::ForeignPressure));

    let points = views::chart(&analysis, "BBB", Some(day(19)), None, &config).found().unwrap();
    assert_eq!(points[0].activity, ActivityLevel::Normal);
    assert_eq!(points[1].activity, ActivityLevel::High);

    let json = serde_json::to_value(&hits[0]).unwrap();
    assert_eq!(json["activity"], "high");
    assert_eq!(json["patterns"][1], "frequency_and_aov");
}
