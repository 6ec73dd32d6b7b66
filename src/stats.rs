use serde::Serialize;

/// Five-number summary of a return sample, for histogram axes and tables.
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct ReturnDistribution {
    pub min: f64,
    pub p25: f64,
    pub median: f64,
    pub p75: f64,
    pub max: f64,
    pub count: usize,
}

pub fn mean(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().sum::<f64>() / values.len() as f64)
}

/// Share of strictly positive values.
pub fn win_rate(values: &[f64]) -> Option<f64> {
    (!values.is_empty()).then(|| values.iter().filter(|r| **r > 0.0).count() as f64 / values.len() as f64)
}

pub fn distribution(values: &[f64]) -> ReturnDistribution {
    if values.is_empty() {
        return ReturnDistribution::default();
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);
    let n = sorted.len();
    ReturnDistribution {
        min: sorted[0],
        p25: sorted[n * 25 / 100],
        median: if n % 2 == 0 { (sorted[n / 2 - 1] + sorted[n / 2]) / 2.0 } else { sorted[n / 2] },
        p75: sorted[(n * 75 / 100).min(n - 1)],
        max: sorted[n - 1],
        count: n,
    }
}

/// Equal-width histogram bins over `[min, max]`: `(lower_edge, count)`.
pub fn histogram(values: &[f64], bins: usize) -> Vec<(f64, usize)> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }
    let lo = values.iter().copied().fold(f64::INFINITY, f64::min);
    let hi = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let width = (hi - lo) / bins as f64;
    let mut counts = vec![0usize; bins];
    for v in values {
        let idx = if width > 0.0 { (((v - lo) / width) as usize).min(bins - 1) } else { 0 };
        counts[idx] += 1;
    }
    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| (lo + width * i as f64, c))
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_sample() {
        assert_eq!(mean(&[]), None);
        assert_eq!(win_rate(&[]), None);
        assert_eq!(distribution(&[]).count, 0);
        assert!(histogram(&[], 10).is_empty());
    }

    #[test]
    fn test_distribution_order_statistics() {
        let d = distribution(&[0.3, -0.1, 0.0, 0.2]);
        assert_eq!(d.min, -0.1);
        assert_eq!(d.max, 0.3);
        assert!((d.median - 0.1).abs() < 1e-12);
        assert_eq!(d.count, 4);
    }

    #[test]
    fn test_median_even_and_odd_samples() {
        assert!((distribution(&[0.0, 0.1, 0.2, 0.3]).median - 0.15).abs() < 1e-12);
        assert_eq!(distribution(&[0.3, 0.1, 0.2]).median, 0.2);
        assert_eq!(distribution(&[-0.4]).median, -0.4);
    }

    #[test]
    fn test_win_rate_excludes_flat() {
        assert_eq!(win_rate(&[0.1, 0.0, -0.05]), Some(1.0 / 3.0));
    }

    #[test]
    fn test_histogram_counts_sum_to_len() {
        let values = [-0.2, -0.1, 0.0, 0.05, 0.1, 0.3];
        let h = histogram(&values, 4);
        assert_eq!(h.len(), 4);
        assert_eq!(h.iter().map(|(_, c)| c).sum::<usize>(), values.len());
        assert_eq!(h[0].0, -0.2);
    }
}
