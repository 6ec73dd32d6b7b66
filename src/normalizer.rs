use std::collections::BTreeMap;

use chrono::{NaiveDate, NaiveDateTime};
use tracing::{info, warn};

use crate::config::{ColumnMap, NormalizerConfig};
use crate::error::{EngineError, Result};
use crate::types::{Dataset, Observation, RawRecord, RawTable, RawValue};

const DATE_FORMATS: &[&str] = &["%Y-%m-%d", "%Y/%m/%d", "%d/%m/%Y", "%d-%m-%Y", "%d %b %Y", "%d-%b-%Y"];
const DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%dT%H:%M:%S", "%Y-%m-%d %H:%M:%S%.f"];

struct Staged {
    observation: Observation,
    previous_close: f64,
}

/// Turns raw rows into per-instrument, date-ascending series.
///
/// Only a schema without the instrument-id or date column is an error.
/// Unparsable numbers become 0 and rows with unparsable dates are dropped.
pub fn normalize(table: &RawTable, columns: &ColumnMap, config: &NormalizerConfig) -> Result<Dataset> {
    for required in [&columns.instrument_id, &columns.trading_date] {
        if !table.has_column(required) {
            return Err(EngineError::MissingColumn(required.clone()));
        }
    }

    // A value column that is present but all zeros is as good as absent.
    let value_supplied = table.has_column(&columns.transaction_value)
        && table.rows.iter().any(|r| number(r, &columns.transaction_value) > 0.0);
    let aos_supplied = table.has_column(&columns.avg_order_size);
    let change_supplied = table.has_column(&columns.change_pct);

    let mut staged: BTreeMap<String, BTreeMap<NaiveDate, Staged>> = BTreeMap::new();
    let mut dropped = 0usize;
    let mut duplicates = 0usize;

    for row in &table.rows {
        let Some(instrument_id) = row.get(&columns.instrument_id).and_then(RawValue::as_text) else {
            dropped += 1;
            continue;
        };
        let Some(trading_date) = row.get(&columns.trading_date).and_then(parse_date) else {
            dropped += 1;
            continue;
        };

        let close = number(row, &columns.close).max(0.0);
        let volume = count(row, &columns.volume);
        let frequency = count(row, &columns.frequency);

        let supplied_aos = if aos_supplied { number(row, &columns.avg_order_size).max(0.0) } else { 0.0 };
        let avg_order_size = if frequency == 0 {
            0.0
        } else if supplied_aos > 0.0 {
            supplied_aos
        } else {
            volume as f64 / frequency as f64
        };

        let transaction_value = if value_supplied {
            number(row, &columns.transaction_value).max(0.0)
        } else {
            close * volume as f64 * config.lot_size
        };

        let observation = Observation {
            instrument_id: instrument_id.clone(),
            trading_date,
            open: number(row, &columns.open).max(0.0),
            high: number(row, &columns.high).max(0.0),
            low: number(row, &columns.low).max(0.0),
            close,
            volume,
            frequency,
            avg_order_size,
            transaction_value,
            change_pct: if change_supplied { number(row, &columns.change_pct) } else { 0.0 },
            sector: row.get(&columns.sector).and_then(RawValue::as_text),
            company_name: row.get(&columns.company_name).and_then(RawValue::as_text),
            free_float_pct: optional(table, row, &columns.free_float),
            foreign_buy: optional(table, row, &columns.foreign_buy),
            foreign_sell: optional(table, row, &columns.foreign_sell),
        };

        let previous_close = number(row, &columns.previous_close);
        let series = staged.entry(instrument_id).or_default();
        if series.insert(trading_date, Staged { observation, previous_close }).is_some() {
            duplicates += 1;
        }
    }

    if dropped > 0 {
        warn!(dropped, "dropped rows with missing instrument id or unparsable date");
    }
    if duplicates > 0 {
        warn!(duplicates, "duplicate (instrument, date) rows, keeping the last occurrence");
    }

    let mut dataset = Dataset::new();
    for (instrument_id, by_date) in staged {
        let mut series: Vec<Observation> = Vec::with_capacity(by_date.len());
        for (_, entry) in by_date {
            let mut observation = entry.observation;
            if !change_supplied {
                let previous = if entry.previous_close > 0.0 {
                    entry.previous_close
                } else {
                    series.last().map(|o| o.close).unwrap_or(0.0)
                };
                observation.change_pct = if previous > 0.0 {
                    (observation.close - previous) / previous * 100.0
                } else {
                    0.0
                };
            }
            series.push(observation);
        }
        dataset.insert(instrument_id, series);
    }

    info!(
        instruments = dataset.len(),
        observations = dataset.values().map(Vec::len).sum::<usize>(),
        "normalized input"
    );
    Ok(dataset)
}

fn number(row: &RawRecord, column: &str) -> f64 {
    row.get(column).and_then(RawValue::as_f64).unwrap_or(0.0)
}

fn optional(table: &RawTable, row: &RawRecord, column: &str) -> Option<f64> {
    table.has_column(column).then(|| number(row, column))
}

fn count(row: &RawRecord, column: &str) -> u64 {
    number(row, column).max(0.0).round() as u64
}

pub fn parse_date(value: &RawValue) -> Option<NaiveDate> {
    let text = value.as_text()?;
    DATE_FORMATS
        .iter()
        .find_map(|fmt| NaiveDate::parse_from_str(&text, fmt).ok())
        .or_else(|| {
            DATETIME_FORMATS
                .iter()
                .find_map(|fmt| NaiveDateTime::parse_from_str(&text, fmt).ok())
                .map(|dt| dt.date())
        })
}
