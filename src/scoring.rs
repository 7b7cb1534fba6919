//! Dual-model uplift scoring and business rules

use crate::config::ScoringConfig;
use crate::data::CustomerBatch;
use crate::errors::UpliftError;
use crate::features::PreparedBatch;
use crate::model::{ModelPair, ProbabilityModel};
use ndarray::Array1;
use rand::Rng;
use tracing::{debug, info, warn};

/// Per-customer scores for one batch
#[derive(Debug, Clone)]
pub struct ScoredBatch {
    pub p_treated: Vec<f64>,
    pub p_control: Vec<f64>,
    /// `p_treated - p_control`
    pub uplift: Vec<f64>,
    pub deposit_amount: Vec<f64>,
    pub value: Vec<f64>,
    pub contact_cost: Vec<f64>,
    pub expected_profit: Vec<f64>,
    pub recommend_contact: Vec<bool>,
    /// Uplift quantile the recommendation cut is taken at
    pub threshold: f64,
}

impl ScoredBatch {
    pub fn len(&self) -> usize {
        self.uplift.len()
    }

    pub fn is_empty(&self) -> bool {
        self.uplift.is_empty()
    }

    /// Row indices by uplift, highest first; ties keep upload order
    pub fn ranking(&self) -> Vec<usize> {
        let mut order: Vec<usize> = (0..self.len()).collect();
        order.sort_by(|&a, &b| self.uplift[b].total_cmp(&self.uplift[a]));
        order
    }
}

/// Positive-class probabilities from `model`, after aligning features to its schema
pub fn score_with(model: &dyn ProbabilityModel, prepared: &PreparedBatch) -> crate::Result<Vec<f64>> {
    let (aligned, report) = prepared.features.align(model.feature_names());
    if !report.is_exact() {
        warn!(
            "Model '{}': {} expected columns filled with 0, {} upload columns dropped",
            model.name(),
            report.filled.len(),
            report.dropped.len()
        );
        debug!(
            "Model '{}' filled {:?}, dropped {:?}",
            model.name(),
            report.filled,
            report.dropped
        );
    }

    let proba: Array1<f64> = model.positive_proba(&aligned)?;
    if let Some((row, &value)) = proba
        .iter()
        .enumerate()
        .find(|(_, p)| !(0.0..=1.0).contains(*p))
    {
        return Err(UpliftError::InvalidPrediction {
            model: model.name().to_string(),
            row,
            value,
        }
        .into());
    }
    Ok(proba.to_vec())
}

/// Estimated deposit: `balance * fraction`, never below the floor
///
/// A missing balance yields the floor.
pub fn deposit_amount(balance: Option<f64>, fraction: f64, floor: f64) -> f64 {
    balance.map_or(floor, |b| floor.max(b * fraction))
}

/// Quantile with linear interpolation between closest ranks
///
/// Returns `None` for an empty slice.
pub fn quantile(values: &[f64], q: f64) -> Option<f64> {
    if values.is_empty() {
        return None;
    }
    let mut sorted = values.to_vec();
    sorted.sort_by(f64::total_cmp);

    let pos = q.clamp(0.0, 1.0) * (sorted.len() - 1) as f64;
    let lower = pos.floor() as usize;
    let upper = pos.ceil() as usize;
    let frac = pos - lower as f64;
    Some(sorted[lower] + (sorted[upper] - sorted[lower]) * frac)
}

/// Score a prepared batch with both models and apply the business rules
///
/// # Arguments
/// * `batch` - Validated upload (contact channel and balance)
/// * `prepared` - Encoded features for the same batch
/// * `models` - Treated and control models; each is aligned independently
/// * `config` - Business-rule constants
/// * `rng` - Source of the per-row deposit fraction
pub fn score_batch<R: Rng>(
    batch: &CustomerBatch,
    prepared: &PreparedBatch,
    models: &ModelPair,
    config: &ScoringConfig,
    rng: &mut R,
) -> crate::Result<ScoredBatch> {
    config.validate()?;
    if prepared.features.nrows() != batch.len() {
        anyhow::bail!(
            "Prepared features have {} rows for a batch of {}",
            prepared.features.nrows(),
            batch.len()
        );
    }

    let p_treated = score_with(models.treated.as_ref(), prepared)?;
    let p_control = score_with(models.control.as_ref(), prepared)?;
    let uplift: Vec<f64> = p_treated
        .iter()
        .zip(&p_control)
        .map(|(t, c)| t - c)
        .collect();

    let deposit_amount: Vec<f64> = batch
        .balance()
        .iter()
        .map(|&b| {
            let fraction = rng.gen_range(config.deposit_fraction_min..config.deposit_fraction_max);
            deposit_amount(b, fraction, config.deposit_floor)
        })
        .collect();
    let value: Vec<f64> = deposit_amount.iter().map(|d| d * config.value_rate).collect();

    let contact_cost: Vec<f64> = batch
        .contact()
        .iter()
        .map(|c| config.contact_cost(c.as_deref()))
        .collect();

    let expected_profit = uplift
        .iter()
        .zip(&value)
        .zip(&contact_cost)
        .map(|((u, v), c)| u * v - c)
        .collect();

    let threshold = quantile(&uplift, config.recommend_quantile).ok_or(UpliftError::EmptyInput)?;
    let recommend_contact: Vec<bool> = uplift.iter().map(|&u| u > threshold).collect();

    info!(
        "Scored {} customers; uplift threshold {:.4}, {} recommended",
        uplift.len(),
        threshold,
        recommend_contact.iter().filter(|&&r| r).count()
    );

    Ok(ScoredBatch {
        p_treated,
        p_control,
        uplift,
        deposit_amount,
        value,
        contact_cost,
        expected_profit,
        recommend_contact,
        threshold,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::data::read_customer_bytes;
    use crate::features::prepare_features;
    use crate::model::{Estimator, ModelArtifact};
    use rand::rngs::StdRng;
    use rand::SeedableRng;
    use std::sync::Arc;

    fn logistic(names: &[&str], intercept: f64, coefficients: Vec<f64>) -> ModelArtifact {
        ModelArtifact {
            name: format!("logit{}", intercept),
            feature_names: names.iter().map(|s| s.to_string()).collect(),
            estimator: Estimator::Logistic {
                intercept,
                coefficients,
            },
        }
    }

    fn batch(text: &str) -> (CustomerBatch, PreparedBatch) {
        let df = read_customer_bytes(text.as_bytes().to_vec()).unwrap();
        let batch = CustomerBatch::from_frame(&df).unwrap();
        let prepared = prepare_features(&batch).unwrap();
        (batch, prepared)
    }

    fn models() -> ModelPair {
        ModelPair::new(
            Arc::new(logistic(&["age", "contact_unknown"], 0.5, vec![0.01, -1.0])),
            Arc::new(logistic(&["age", "job_admin."], -0.5, vec![0.02, 1.0])),
        )
    }

    const CUSTOMERS: &str = "age;balance;contact;y\n\
                             25;0;cellular;no\n\
                             35;-500;telephone;yes\n\
                             45;100000;unknown;no\n\
                             55;2500;cellular;no\n\
                             65;;other;yes\n";

    #[test]
    fn test_quantile_interpolates() {
        assert_eq!(quantile(&[], 0.8), None);
        assert_eq!(quantile(&[3.0], 0.8), Some(3.0));
        let q80 = quantile(&[1.0, 2.0, 3.0, 4.0, 5.0], 0.8).unwrap();
        assert!((q80 - 4.2).abs() < 1e-12);
        assert_eq!(quantile(&[5.0, 1.0, 4.0, 2.0, 3.0], 0.5), Some(3.0));
        assert_eq!(quantile(&[1.0, 2.0], 1.0), Some(2.0));
    }

    #[test]
    fn test_deposit_amount_floor() {
        assert_eq!(deposit_amount(Some(0.0), 0.3, 1000.0), 1000.0);
        assert_eq!(deposit_amount(Some(-5000.0), 0.3, 1000.0), 1000.0);
        assert_eq!(deposit_amount(None, 0.3, 1000.0), 1000.0);
        assert_eq!(deposit_amount(Some(10000.0), 0.5, 1000.0), 5000.0);
    }

    #[test]
    fn test_score_batch_identities() {
        let (batch, prepared) = batch(CUSTOMERS);
        let config = ScoringConfig::default();
        let mut rng = StdRng::seed_from_u64(7);

        let scored = score_batch(&batch, &prepared, &models(), &config, &mut rng).unwrap();

        assert_eq!(scored.len(), 5);
        for i in 0..scored.len() {
            assert!((0.0..=1.0).contains(&scored.p_treated[i]));
            assert!((0.0..=1.0).contains(&scored.p_control[i]));
            assert_eq!(scored.uplift[i], scored.p_treated[i] - scored.p_control[i]);
            assert!(scored.deposit_amount[i] >= 1000.0);
            assert!((scored.value[i] - scored.deposit_amount[i] * 0.045).abs() < 1e-9);
            let profit = scored.uplift[i] * scored.value[i] - scored.contact_cost[i];
            assert!((scored.expected_profit[i] - profit).abs() < 1e-9);
            assert_eq!(scored.recommend_contact[i], scored.uplift[i] > scored.threshold);
        }
        assert_eq!(scored.contact_cost, vec![30.0, 50.0, 5.0, 30.0, 10.0]);
    }

    #[test]
    fn test_deposit_fraction_range() {
        let (batch, prepared) = batch(CUSTOMERS);
        let config = ScoringConfig::default();
        let mut rng = StdRng::seed_from_u64(11);

        let scored = score_batch(&batch, &prepared, &models(), &config, &mut rng).unwrap();

        // 100000 * [0.1, 0.5) lies in [10000, 50000)
        assert!(scored.deposit_amount[2] >= 10000.0 && scored.deposit_amount[2] < 50000.0);
        assert_eq!(scored.deposit_amount[0], 1000.0);
        assert_eq!(scored.deposit_amount[1], 1000.0);
        assert_eq!(scored.deposit_amount[4], 1000.0);
    }

    #[test]
    fn test_seeded_runs_are_reproducible() {
        let (batch, prepared) = batch(CUSTOMERS);
        let config = ScoringConfig::default();

        let first = score_batch(
            &batch,
            &prepared,
            &models(),
            &config,
            &mut StdRng::seed_from_u64(42),
        )
        .unwrap();
        let second = score_batch(
            &batch,
            &prepared,
            &models(),
            &config,
            &mut StdRng::seed_from_u64(42),
        )
        .unwrap();

        assert_eq!(first.deposit_amount, second.deposit_amount);
        assert_eq!(first.recommend_contact, second.recommend_contact);
    }

    #[test]
    fn test_recommends_top_fifth_of_distinct_uplifts() {
        let rows: String = (0..50)
            .map(|i| format!("{};1000;cellular\n", 20 + i))
            .collect();
        let (batch, prepared) = batch(&format!("age;balance;contact\n{}", rows));
        let models = ModelPair::new(
            Arc::new(logistic(&["age"], -3.0, vec![0.05])),
            Arc::new(logistic(&["age"], 0.0, vec![0.0])),
        );
        let mut rng = StdRng::seed_from_u64(1);

        let scored = score_batch(
            &batch,
            &prepared,
            &models,
            &ScoringConfig::default(),
            &mut rng,
        )
        .unwrap();

        let recommended = scored.recommend_contact.iter().filter(|&&r| r).count();
        assert_eq!(recommended, 10);
        // Oldest customers have the highest uplift
        assert!(scored.recommend_contact[40..].iter().all(|&r| r));
    }

    #[test]
    fn test_ties_at_threshold_excluded() {
        let (batch, prepared) = batch("age;balance;contact\n30;1;cellular\n30;1;cellular\n");
        let models = ModelPair::new(
            Arc::new(logistic(&["age"], 0.0, vec![0.01])),
            Arc::new(logistic(&["age"], 0.0, vec![0.0])),
        );
        let mut rng = StdRng::seed_from_u64(3);

        let scored = score_batch(
            &batch,
            &prepared,
            &models,
            &ScoringConfig::default(),
            &mut rng,
        )
        .unwrap();

        assert_eq!(scored.recommend_contact, vec![false, false]);
    }

    #[test]
    fn test_ranking_descending_stable() {
        let scored = ScoredBatch {
            p_treated: vec![0.0; 4],
            p_control: vec![0.0; 4],
            uplift: vec![0.1, 0.3, 0.1, -0.2],
            deposit_amount: vec![1000.0; 4],
            value: vec![45.0; 4],
            contact_cost: vec![10.0; 4],
            expected_profit: vec![0.0; 4],
            recommend_contact: vec![false, true, false, false],
            threshold: 0.2,
        };
        assert_eq!(scored.ranking(), vec![1, 0, 2, 3]);
    }
}
