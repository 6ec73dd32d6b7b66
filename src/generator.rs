use chrono::{Datelike, Duration, NaiveDate, Weekday};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use serde::Serialize;

use crate::config::ColumnMap;
use crate::types::{RawRecord, RawTable, RawValue};

/// (code, sector, starting close, typical trades per day)
pub const INSTRUMENTS: &[(&str, &str, f64, f64)] = &[
    ("BBCA", "Financials", 9_500.0, 20_000.0),
    ("BBRI", "Financials", 4_800.0, 35_000.0),
    ("TLKM", "Infrastructure", 3_200.0, 18_000.0),
    ("ASII", "Industrials", 5_100.0, 15_000.0),
    ("ANTM", "Basic Materials", 1_600.0, 25_000.0),
    ("MDKA", "Basic Materials", 2_400.0, 14_000.0),
    ("ADRO", "Energy", 2_700.0, 16_000.0),
    ("GOTO", "Technology", 70.0, 60_000.0),
];

const LOT_SIZE: f64 = 100.0;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum Scenario {
    /// Fewer, much larger orders.
    WhaleAccumulation,
    /// Many small orders, share volume roughly flat.
    SplitDistribution,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InjectedAnomaly {
    pub instrument_id: String,
    pub trading_date: NaiveDate,
    pub scenario: Scenario,
}

struct InstrumentState {
    code: String,
    sector: &'static str,
    close: f64,
    base_frequency: f64,
}

/// Deterministic synthetic daily statistics in the CSV export's column
/// layout, with whale and split days mixed in at `anomaly_rate`.
pub struct DatasetGenerator {
    rng: StdRng,
    pub anomaly_rate: f64,
    instruments: Vec<InstrumentState>,
    injected: Vec<InjectedAnomaly>,
}

impl DatasetGenerator {
    pub fn new(seed: u64, instruments: usize, anomaly_rate: f64) -> Self {
        let instruments = (0..instruments)
            .map(|i| {
                let (code, sector, close, freq) = INSTRUMENTS[i % INSTRUMENTS.len()];
                let round = i / INSTRUMENTS.len();
                InstrumentState {
                    code: if round == 0 { code.to_string() } else { format!("{code}{round}") },
                    sector,
                    close,
                    base_frequency: freq,
                }
            })
            .collect();
        Self {
            rng: StdRng::seed_from_u64(seed),
            anomaly_rate: if anomaly_rate.is_finite() { anomaly_rate.clamp(0.0, 1.0) } else { 0.0 },
            instruments,
            injected: Vec::new(),
        }
    }

    pub fn injected(&self) -> &[InjectedAnomaly] {
        &self.injected
    }

    /// `days` weekdays starting at `start` (weekend starts roll forward).
    pub fn generate(&mut self, start: NaiveDate, days: usize) -> RawTable {
        let columns = ColumnMap::default();
        let mut rows = Vec::with_capacity(days * self.instruments.len());

        let mut date = start;
        for _ in 0..days {
            while matches!(date.weekday(), Weekday::Sat | Weekday::Sun) {
                date += Duration::days(1);
            }
            for idx in 0..self.instruments.len() {
                let row = self.generate_day(idx, date, &columns);
                rows.push(row);
            }
            date += Duration::days(1);
        }

        RawTable {
            columns: vec![
                columns.instrument_id,
                columns.sector,
                columns.trading_date,
                columns.open,
                columns.high,
                columns.low,
                columns.close,
                columns.previous_close,
                columns.volume,
                columns.frequency,
                columns.transaction_value,
                columns.foreign_buy,
                columns.foreign_sell,
            ],
            rows,
        }
    }

    fn generate_day(&mut self, idx: usize, date: NaiveDate, columns: &ColumnMap) -> RawRecord {
        let scenario = if self.rng.gen_bool(self.anomaly_rate) {
            Some(if self.rng.gen_bool(0.5) { Scenario::WhaleAccumulation } else { Scenario::SplitDistribution })
        } else {
            None
        };

        let rng = &mut self.rng;
        let state = &mut self.instruments[idx];

        let previous = state.close;
        let mut frequency = state.base_frequency * rng.gen_range(0.8..1.2);
        let mut lots_per_trade = rng.gen_range(8.0..12.0);
        let mut drift = rng.gen_range(-0.02..0.02);

        match scenario {
            Some(Scenario::WhaleAccumulation) => {
                frequency *= rng.gen_range(0.6..0.9);
                lots_per_trade *= rng.gen_range(2.5..5.0);
                drift = rng.gen_range(-0.01..0.03);
            }
            Some(Scenario::SplitDistribution) => {
                frequency *= rng.gen_range(3.0..6.0);
                lots_per_trade *= rng.gen_range(0.2..0.45);
            }
            None => {}
        }

        let open = previous * (1.0 + rng.gen_range(-0.005..0.005));
        let close = (previous * (1.0 + drift)).max(1.0).round();
        let high = open.max(close) * (1.0 + rng.gen_range(0.0..0.015));
        let low = open.min(close) * (1.0 - rng.gen_range(0.0..0.015));
        state.close = close;

        let frequency = frequency.round();
        let volume = (frequency * lots_per_trade).round();
        let value = close * volume * LOT_SIZE;
        let foreign_buy = value * rng.gen_range(0.05..0.25);
        let foreign_sell = value * rng.gen_range(0.05..0.25);

        if let Some(scenario) = scenario {
            self.injected.push(InjectedAnomaly {
                instrument_id: state.code.clone(),
                trading_date: date,
                scenario,
            });
        }

        let mut row = RawRecord::new();
        row.insert(columns.instrument_id.clone(), RawValue::Text(state.code.clone()));
        row.insert(columns.sector.clone(), RawValue::from(state.sector));
        row.insert(columns.trading_date.clone(), RawValue::Text(date.format("%Y-%m-%d").to_string()));
        row.insert(columns.open.clone(), RawValue::Number(open.round()));
        row.insert(columns.high.clone(), RawValue::Number(high.round()));
        row.insert(columns.low.clone(), RawValue::Number(low.round()));
        row.insert(columns.close.clone(), RawValue::Number(close));
        row.insert(columns.previous_close.clone(), RawValue::Number(previous));
        row.insert(columns.volume.clone(), RawValue::Number(volume));
        row.insert(columns.frequency.clone(), RawValue::Number(frequency));
        row.insert(columns.transaction_value.clone(), RawValue::Number(value));
        row.insert(columns.foreign_buy.clone(), RawValue::Number(foreign_buy.round()));
        row.insert(columns.foreign_sell.clone(), RawValue::Number(foreign_sell.round()));
        row
    }
}
