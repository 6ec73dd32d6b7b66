use tracing::{debug, info};

use crate::baseline;
use crate::classifier::{compute_ratios, Classifier, ClassifierInput};
use crate::config::EngineConfig;
use crate::error::Result;
use crate::normalizer;
use crate::types::{ActivityLevel, AnalyzedRow, Analysis, Dataset, Observation, PriceRegime, RawTable, SignalCategory};

/// Normalize + analyze in one call.
pub fn run(table: &RawTable, config: &EngineConfig) -> Result<Analysis> {
    config.validate()?;
    let dataset = normalizer::normalize(table, &config.columns, &config.normalizer)?;
    Ok(analyze(&dataset, config))
}

/// Baselines, ratios, signal and price regime for every row. Each
/// instrument is processed on its own; no state crosses series.
pub fn analyze(dataset: &Dataset, config: &EngineConfig) -> Analysis {
    let classifier = Classifier::new(config.classifier.clone());
    let mut analysis = Analysis::default();

    for (instrument_id, series) in dataset {
        let rows = analyze_series(series, config, &classifier);
        debug!(
            instrument = %instrument_id,
            rows = rows.len(),
            whales = rows.iter().filter(|r| r.signal.category == SignalCategory::Whale).count(),
            splits = rows.iter().filter(|r| r.signal.category == SignalCategory::Split).count(),
            "analyzed series"
        );
        analysis.series.insert(instrument_id.clone(), rows);
    }

    let (whales, splits) = analysis.rows().fold((0usize, 0usize), |(w, s), r| match r.signal.category {
        SignalCategory::Whale => (w + 1, s),
        SignalCategory::Split => (w, s + 1),
        SignalCategory::Normal => (w, s),
    });
    info!(instruments = analysis.series.len(), rows = analysis.row_count(), whales, splits, "analysis complete");
    analysis
}

/// One instrument's date-ascending series.
pub fn analyze_series(series: &[Observation], config: &EngineConfig, classifier: &Classifier) -> Vec<AnalyzedRow> {
    let baselines = baseline::compute(series, &config.baseline);
    let vwma = baseline::vwma(series, config.regime.vwma_window);

    series
        .iter()
        .zip(baselines)
        .zip(vwma)
        .map(|((obs, baselines), vwma)| {
            let ratios = compute_ratios(obs, &baselines);
            let signal = classifier.classify(&ClassifierInput { observation: obs, ratios: &ratios });
            AnalyzedRow {
                observation: obs.clone(),
                baselines,
                ratios,
                vwma,
                signal,
                regime: PriceRegime::of(obs, vwma, &config.regime),
                activity: ActivityLevel::from_freq_spike(ratios.freq_spike),
            }
        })
        .collect()
}
