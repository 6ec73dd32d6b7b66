use chrono::NaiveDate;
use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};

use order_flow_radar::backtest;
use order_flow_radar::config::EngineConfig;
use order_flow_radar::detection;
use order_flow_radar::generator::DatasetGenerator;
use order_flow_radar::normalizer;
use order_flow_radar::types::{RawTable, SignalCategory};
use order_flow_radar::views::{self, DateSelection, ScreenerQuery};

const DAYS: usize = 250;

fn table(instruments: usize) -> RawTable {
    let start = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
    DatasetGenerator::new(42, instruments, 0.05).generate(start, DAYS)
}

fn normalize_throughput(c: &mut Criterion) {
    let config = EngineConfig::default();

    let mut group = c.benchmark_group("normalize");
    for instruments in [10, 100, 500] {
        let raw = table(instruments);
        group.throughput(Throughput::Elements(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(instruments), &raw, |b, raw| {
            b.iter(|| normalizer::normalize(raw, &config.columns, &config.normalizer).unwrap());
        });
    }
    group.finish();
}

fn analyze_throughput(c: &mut Criterion) {
    let config = EngineConfig::default();

    let mut group = c.benchmark_group("analyze");
    for instruments in [10, 100, 500] {
        let raw = table(instruments);
        let dataset = normalizer::normalize(&raw, &config.columns, &config.normalizer).unwrap();
        group.throughput(Throughput::Elements(raw.len() as u64));
        group.bench_with_input(BenchmarkId::from_parameter(instruments), &dataset, |b, dataset| {
            b.iter(|| detection::analyze(dataset, &config));
        });
    }
    group.finish();
}

fn query_throughput(c: &mut Criterion) {
    let config = EngineConfig::default();
    let analysis = detection::run(&table(100), &config).unwrap();
    let range = ScreenerQuery {
        dates: DateSelection::Range { from: NaiveDate::MIN, to: NaiveDate::MAX },
        ..ScreenerQuery::new(SignalCategory::Whale)
    };

    let mut group = c.benchmark_group("queries");
    group.throughput(Throughput::Elements(analysis.row_count() as u64));
    group.bench_function("screener_latest", |b| {
        b.iter(|| views::screener(&analysis, &ScreenerQuery::new(SignalCategory::Whale), &config));
    });
    group.bench_function("screener_full_range", |b| {
        b.iter(|| views::screener(&analysis, &range, &config));
    });
    group.bench_function("backtest_whale", |b| {
        b.iter(|| backtest::run_with_config(&analysis, SignalCategory::Whale, &config.backtest));
    });
    group.finish();
}

criterion_group!(benches, normalize_throughput, analyze_throughput, query_throughput);
criterion_main!(benches);
