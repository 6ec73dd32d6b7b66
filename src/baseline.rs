use std::collections::VecDeque;

use crate::config::{BaselineAnchor, BaselineConfig};
use crate::types::{Baselines, Observation};

/// Trailing rolling mean aligned one-to-one with `values`.
///
/// Entry `i` only reads `values[..=i]`. Entries whose window holds fewer
/// than `min_periods` observations are 0.
pub fn rolling_mean(values: &[f64], config: &BaselineConfig) -> Vec<f64> {
    let mut window: VecDeque<f64> = VecDeque::with_capacity(config.window + 1);
    let mut out = Vec::with_capacity(values.len());

    for &value in values {
        if config.anchor == BaselineAnchor::Inclusive {
            push_capped(&mut window, value, config.window);
        }

        let mean = if !window.is_empty() && window.len() >= config.min_periods {
            window.iter().sum::<f64>() / window.len() as f64
        } else {
            0.0
        };
        out.push(mean);

        if config.anchor == BaselineAnchor::Preceding {
            push_capped(&mut window, value, config.window);
        }
    }
    out
}

/// Volume-weighted moving average of typical price over the trailing
/// `window` rows (today included). `None` until the window is full or when
/// the window traded no volume.
pub fn vwma(series: &[Observation], window: usize) -> Vec<Option<f64>> {
    let mut weighted: VecDeque<(f64, f64)> = VecDeque::with_capacity(window + 1);
    series
        .iter()
        .map(|obs| {
            let volume = obs.volume as f64;
            if weighted.len() >= window {
                weighted.pop_front();
            }
            weighted.push_back((obs.typical_price() * volume, volume));

            if window == 0 || weighted.len() < window {
                return None;
            }
            let (pv, v) = weighted
                .iter()
                .fold((0.0, 0.0), |(pv, v), (x, y)| (pv + x, v + y));
            (v > 0.0).then(|| pv / v)
        })
        .collect()
}

/// Frequency, volume, order-size and value baselines for one instrument.
pub fn compute(series: &[Observation], config: &BaselineConfig) -> Vec<Baselines> {
    let column = |f: fn(&Observation) -> f64| -> Vec<f64> {
        let values: Vec<f64> = series.iter().map(f).collect();
        rolling_mean(&values, config)
    };

    let frequency = column(|o| o.frequency as f64);
    let volume = column(|o| o.volume as f64);
    let avg_order_size = column(|o| o.avg_order_size);
    let transaction_value = column(|o| o.transaction_value);

    (0..series.len())
        .map(|i| Baselines {
            frequency: frequency[i],
            volume: volume[i],
            avg_order_size: avg_order_size[i],
            transaction_value: transaction_value[i],
        })
        .collect()
}

fn push_capped(q: &mut VecDeque<f64>, val: f64, cap: usize) {
    if q.len() >= cap {
        q.pop_front();
    }
    q.push_back(val);
}
