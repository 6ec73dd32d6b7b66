use std::path::PathBuf;

use chrono::NaiveDate;
use clap::Parser;

use order_flow_radar::backtest;
use order_flow_radar::classifier::PriceFilter;
use order_flow_radar::config::{BaselineConfig, EngineConfig};
use order_flow_radar::detection;
use order_flow_radar::generator::DatasetGenerator;
use order_flow_radar::source;
use order_flow_radar::tui;
use order_flow_radar::types::{Analysis, RawTable, SignalCategory};
use order_flow_radar::views::{self, DateSelection, Outcome, ScreenerQuery, SortKey};
use order_flow_radar::web;

#[derive(Parser)]
#[command(name = "order-flow-radar", about = "Whale and split-order screener over daily trading statistics")]
struct Cli {
    /// Run mode: headless, tui, or web
    #[arg(long, default_value = "headless")]
    mode: String,

    /// CSV path or http(s) URL (synthetic data when omitted)
    #[arg(long)]
    source: Option<String>,

    /// JSON config file
    #[arg(long)]
    config: Option<PathBuf>,

    /// Web server port (web mode only)
    #[arg(long, default_value = "3000")]
    port: u16,

    /// Screening date, YYYY-MM-DD (latest trading date when omitted)
    #[arg(long)]
    date: Option<NaiveDate>,

    /// Start of a period scan ending at --date
    #[arg(long)]
    from: Option<NaiveDate>,

    #[arg(long, value_enum, default_value = "whale")]
    category: SignalCategory,

    #[arg(long, value_enum, default_value = "any")]
    price: PriceFilter,

    /// Screener: only instruments in this sector
    #[arg(long)]
    sector: Option<String>,

    #[arg(long, value_enum, default_value = "conviction")]
    sort: SortKey,

    #[arg(long, default_value = "20")]
    limit: usize,

    /// Screener: minimum driving ratio (maximum for AOV-driven splits)
    #[arg(long)]
    min_ratio: Option<f64>,

    /// Backtest holding periods in trading days, e.g. 5,10,20
    #[arg(long, value_delimiter = ',')]
    horizons: Option<Vec<usize>>,

    /// Baseline window (overrides config)
    #[arg(long)]
    window: Option<usize>,

    /// Baseline warm-up floor (overrides config)
    #[arg(long)]
    min_periods: Option<usize>,

    /// Liquidity floor for classification and backtest (overrides config)
    #[arg(long)]
    min_value: Option<f64>,

    /// Trade-count floor below which a day is always Normal (overrides config)
    #[arg(long)]
    min_frequency: Option<u64>,

    /// Synthetic data: number of instruments
    #[arg(long, default_value = "8")]
    instruments: usize,

    /// Synthetic data: trading days
    #[arg(long, default_value = "250")]
    days: usize,

    /// Synthetic data: RNG seed
    #[arg(long, default_value = "42")]
    seed: u64,

    /// Synthetic data: whale/split injection rate (0.0-1.0)
    #[arg(long, default_value = "0.05")]
    anomaly_rate: f64,
}

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // The TUI owns the terminal; log lines would tear the alternate screen.
    if cli.mode != "tui" {
        init_logging();
    }

    let config = build_config(&cli)?;
    let table = load_table(&cli, &config).await?;
    let analysis = detection::run(&table, &config)?;

    match cli.mode.as_str() {
        "headless" => run_headless(&cli, &analysis, &config),
        "tui" => tui::run(analysis, config, cli.category)?,
        "web" => web::run(cli.port, analysis, config).await?,
        other => eprintln!("Unknown mode: {other}. Use --mode headless|tui|web"),
    }

    Ok(())
}

fn init_logging() {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::filter::EnvFilter::builder()
                .with_default_directive(tracing_subscriber::filter::LevelFilter::INFO.into())
                .from_env_lossy(),
        )
        .with_writer(std::io::stderr)
        .compact()
        .init()
}

fn build_config(cli: &Cli) -> Result<EngineConfig, Box<dyn std::error::Error>> {
    let mut config = match &cli.config {
        Some(path) => EngineConfig::from_file(path)?,
        None => EngineConfig::default(),
    };

    if cli.window.is_some() || cli.min_periods.is_some() {
        let window = cli.window.unwrap_or(config.baseline.window);
        let min_periods = cli.min_periods.unwrap_or(config.baseline.min_periods.min(window));
        config.baseline = BaselineConfig::partial(window, min_periods).with_anchor(config.baseline.anchor);
    }
    if let Some(horizons) = &cli.horizons {
        config.backtest.horizons = horizons.clone();
    }
    if let Some(min_value) = cli.min_value {
        config.classifier.min_transaction_value = min_value;
        config.backtest.liquidity_floor = min_value;
    }
    if let Some(min_frequency) = cli.min_frequency {
        config.classifier.min_frequency = min_frequency;
    }

    config.validate()?;
    Ok(config)
}

async fn load_table(cli: &Cli, config: &EngineConfig) -> Result<RawTable, Box<dyn std::error::Error>> {
    match &cli.source {
        Some(location) => Ok(source::load(location, &config.source).await?),
        None => {
            let start = NaiveDate::from_ymd_opt(2024, 1, 1).ok_or("invalid synthetic start date")?;
            let mut gen = DatasetGenerator::new(cli.seed, cli.instruments, cli.anomaly_rate);
            let table = gen.generate(start, cli.days);
            tracing::info!(
                rows = table.len(),
                injected = gen.injected().len(),
                seed = cli.seed,
                "generated synthetic dataset"
            );
            Ok(table)
        }
    }
}

fn run_headless(cli: &Cli, analysis: &Analysis, config: &EngineConfig) {
    println!("=== order-flow-radar (headless) ===");
    println!(
        "Baseline: window={} min_periods={} anchor={:?} | whale>={:.2} split<={:.2} | min value={:.0} min freq={}",
        config.baseline.window,
        config.baseline.min_periods,
        config.baseline.anchor,
        config.classifier.whale_ratio_min,
        config.classifier.split_ratio_max,
        config.classifier.min_transaction_value,
        config.classifier.min_frequency,
    );
    println!();

    if let Outcome::Found(overview) = views::market_overview(analysis, cli.date) {
        println!(
            "Market {}: {} instruments, {} whale, {} split, value {:.0}",
            overview.trading_date, overview.instruments, overview.whales, overview.splits, overview.total_transaction_value
        );
        println!();
    }

    if let Outcome::Found(sectors) = views::sector_summary(analysis, cli.date, config) {
        println!("=== Sectors by mean order-size ratio ===");
        for s in &sectors {
            println!(
                "  {:<18} n={:<3} aov={:.2}x whale={} split={}",
                s.sector, s.instruments, s.mean_aov_ratio, s.whales, s.splits
            );
        }
        println!();
    }

    let dates = match (cli.from, cli.date) {
        (Some(from), to) => DateSelection::Range { from, to: to.unwrap_or(NaiveDate::MAX) },
        (None, Some(day)) => DateSelection::Day(day),
        (None, None) => DateSelection::Latest,
    };
    let query = ScreenerQuery {
        dates,
        price: cli.price,
        sector: cli.sector.clone(),
        sort: cli.sort,
        min_ratio: cli.min_ratio,
        limit: Some(cli.limit),
        ..ScreenerQuery::new(cli.category)
    };

    println!("=== Screener: {} / {:?} ===", cli.category.label(), cli.price);
    match views::screener(analysis, &query, config) {
        Outcome::Found(hits) => {
            println!(
                "  {:<8} {:<10} {:>8} {:>6} {:>10} {:>8} {:>18} {:<8} {:>5} {:>4}",
                "CODE", "DATE", "RATIO", "CONV", "CLOSE", "CHG%", "VALUE", "ACTIVITY", "SCORE", "PAT"
            );
            for h in &hits {
                println!(
                    "  {:<8} {:<10} {:>7.2}x {:>6.0} {:>10.0} {:>+7.2}% {:>18.0} {:<8} {:>5} {:>4}",
                    h.instrument_id,
                    h.trading_date,
                    h.ratio,
                    h.conviction_score,
                    h.close,
                    h.change_pct,
                    h.transaction_value,
                    h.activity.label(),
                    h.smart_money_score,
                    h.pattern_count,
                );
            }
            if matches!(query.dates, DateSelection::Range { .. }) {
                println!();
                println!("  Period summary:");
                for s in views::period_summary(&hits) {
                    println!(
                        "    {:<8} seen={:<3} mean_ratio={:.2}x net_foreign={:+.0} last={}",
                        s.instrument_id, s.appearances, s.mean_ratio, s.total_net_foreign, s.last_date
                    );
                }
            }
        }
        Outcome::NoMatches => println!("  No matches. Try loosening the filters."),
    }
    println!();

    println!("=== Backtest: {} (floor {:.0}) ===", cli.category.label(), config.backtest.liquidity_floor);
    match backtest::run_with_config(analysis, cli.category, &config.backtest) {
        Outcome::Found(report) => {
            println!("  Signals: {}", report.events.len());
            for s in &report.stats {
                match (s.mean_return, s.win_rate) {
                    (Some(mean), Some(win)) => println!(
                        "    {:>3}d  n={:<5} mean={:+.2}%  win={:.1}%  p25={:+.2}% median={:+.2}% p75={:+.2}%",
                        s.horizon,
                        s.sample_count,
                        mean * 100.0,
                        win * 100.0,
                        s.distribution.p25 * 100.0,
                        s.distribution.median * 100.0,
                        s.distribution.p75 * 100.0,
                    ),
                    _ => println!("    {:>3}d  n=0 (every signal too close to the end of its series)", s.horizon),
                }
            }
            let top = report.top_events(10);
            if !top.is_empty() {
                println!();
                println!("  Top events ({}d):", report.horizons[0]);
                for e in top {
                    let first = e.forward_returns.first().copied().flatten().unwrap_or(0.0);
                    println!(
                        "    {:<8} {} close={:.0} ratio={:.2}x return={:+.2}%",
                        e.instrument_id, e.trading_date, e.close, e.aov_ratio, first * 100.0
                    );
                }
            }
        }
        Outcome::NoMatches => println!("  No historical signals with these filters."),
    }
}
