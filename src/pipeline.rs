//! One pass over an upload: features, scoring, results table and metrics

use crate::config::ScoringConfig;
use crate::data::CustomerBatch;
use crate::features::{prepare_features, PreparedBatch};
use crate::model::ModelPair;
use crate::report::{build_results_frame, SummaryMetrics};
use crate::scoring::{score_batch, ScoredBatch};
use polars::prelude::DataFrame;
use rand::Rng;

/// Everything produced for one uploaded batch
#[derive(Debug, Clone)]
pub struct UpliftRun {
    pub prepared: PreparedBatch,
    pub scored: ScoredBatch,
    /// Scored rows, highest uplift first
    pub results: DataFrame,
    pub metrics: SummaryMetrics,
}

/// Run feature preparation, scoring and result assembly for one batch
pub fn run_uplift<R: Rng>(
    batch: &CustomerBatch,
    models: &ModelPair,
    config: &ScoringConfig,
    rng: &mut R,
) -> crate::Result<UpliftRun> {
    let prepared = prepare_features(batch)?;
    let scored = score_batch(batch, &prepared, models, config, rng)?;
    let results = build_results_frame(batch, &prepared, &scored)?;
    let metrics = SummaryMetrics::from_scored(&scored);

    Ok(UpliftRun {
        prepared,
        scored,
        results,
        metrics,
    })
}
