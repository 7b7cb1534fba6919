//! Pretrained probability models loaded from JSON artifacts

use crate::errors::UpliftError;
use ndarray::{Array1, Array2, ArrayView1, Axis};
use serde::{Deserialize, Serialize};
use std::collections::HashSet;
use std::fmt::Debug;
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// A binary classifier with a fixed input schema
pub trait ProbabilityModel: Debug + Send + Sync {
    fn name(&self) -> &str;

    /// Ordered feature columns the model was trained on
    fn feature_names(&self) -> &[String];

    /// Probability of the positive class for each row
    fn positive_proba(&self, features: &Array2<f64>) -> crate::Result<Array1<f64>>;

    /// `(n, 2)` matrix of `[P(negative), P(positive)]` per row
    fn predict_proba(&self, features: &Array2<f64>) -> crate::Result<Array2<f64>> {
        let positive = self.positive_proba(features)?;
        let mut proba = Array2::zeros((positive.len(), 2));
        for (mut row, p) in proba.axis_iter_mut(Axis(0)).zip(positive.iter()) {
            row[0] = 1.0 - p;
            row[1] = *p;
        }
        Ok(proba)
    }
}

/// A tree node; leaves carry a `value`, internal nodes split on a feature
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Node {
    #[serde(default)]
    pub feature_index: usize,
    #[serde(default)]
    pub threshold: f64,
    #[serde(default)]
    pub left: usize,
    #[serde(default)]
    pub right: usize,
    #[serde(default)]
    pub value: Option<f64>,
}

/// A single regression tree, root at index 0
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Tree {
    pub nodes: Vec<Node>,
}

impl Tree {
    /// Walk from the root to a leaf; `x <= threshold` goes left
    ///
    /// Children always sit after their parent (checked at load time), so the
    /// walk terminates.
    fn eval(&self, features: ArrayView1<f64>) -> f64 {
        let mut idx = 0usize;
        loop {
            let node = &self.nodes[idx];
            if let Some(value) = node.value {
                return value;
            }
            idx = if features[node.feature_index] <= node.threshold {
                node.left
            } else {
                node.right
            };
        }
    }
}

/// Supported estimator families
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Estimator {
    /// `sigmoid(intercept + w . x)`
    Logistic {
        intercept: f64,
        coefficients: Vec<f64>,
    },
    /// `sigmoid(base_score + learning_rate * sum(tree leaves))`
    GradientBoosting {
        base_score: f64,
        learning_rate: f64,
        trees: Vec<Tree>,
    },
}

/// A serialized model: name, training schema and estimator parameters
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelArtifact {
    pub name: String,
    pub feature_names: Vec<String>,
    pub estimator: Estimator,
}

impl ModelArtifact {
    /// Read and validate an artifact from a JSON file
    pub fn load(path: impl AsRef<Path>) -> crate::Result<Self> {
        let path = path.as_ref();
        let contents = std::fs::read_to_string(path).map_err(|e| UpliftError::ModelArtifact {
            name: path.display().to_string(),
            reason: e.to_string(),
        })?;
        let artifact = Self::from_json_str(&contents).map_err(|e| UpliftError::ModelArtifact {
            name: path.display().to_string(),
            reason: e.to_string(),
        })?;

        info!(
            "Loaded model '{}' from {} ({} features)",
            artifact.name,
            path.display(),
            artifact.feature_names.len()
        );
        Ok(artifact)
    }

    pub fn from_json_str(json: &str) -> crate::Result<Self> {
        let artifact: Self = serde_json::from_str(json)?;
        artifact.validate()?;
        Ok(artifact)
    }

    /// Structural checks so inference can index without bounds failures
    pub fn validate(&self) -> Result<(), UpliftError> {
        let invalid = |reason: String| UpliftError::ModelArtifact {
            name: self.name.clone(),
            reason,
        };

        if self.feature_names.is_empty() {
            return Err(invalid("no feature names".to_string()));
        }
        let mut seen = HashSet::new();
        if let Some(dup) = self.feature_names.iter().find(|n| !seen.insert(n.as_str())) {
            return Err(invalid(format!("duplicate feature name '{}'", dup)));
        }

        let n_features = self.feature_names.len();
        match &self.estimator {
            Estimator::Logistic { coefficients, .. } => {
                if coefficients.len() != n_features {
                    return Err(invalid(format!(
                        "{} coefficients for {} features",
                        coefficients.len(),
                        n_features
                    )));
                }
            }
            Estimator::GradientBoosting { trees, .. } => {
                for (t, tree) in trees.iter().enumerate() {
                    validate_tree(tree, n_features)
                        .map_err(|reason| invalid(format!("tree {}: {}", t, reason)))?;
                }
            }
        }
        Ok(())
    }

    fn raw_score(&self, row: ArrayView1<f64>) -> f64 {
        match &self.estimator {
            Estimator::Logistic {
                intercept,
                coefficients,
            } => {
                intercept
                    + row
                        .iter()
                        .zip(coefficients.iter())
                        .map(|(x, w)| x * w)
                        .sum::<f64>()
            }
            Estimator::GradientBoosting {
                base_score,
                learning_rate,
                trees,
            } => base_score + learning_rate * trees.iter().map(|t| t.eval(row)).sum::<f64>(),
        }
    }
}

fn validate_tree(tree: &Tree, n_features: usize) -> Result<(), String> {
    if tree.nodes.is_empty() {
        return Err("no nodes".to_string());
    }
    for (i, node) in tree.nodes.iter().enumerate() {
        if node.value.is_some() {
            continue;
        }
        if node.feature_index >= n_features {
            return Err(format!(
                "node {} splits on feature {} of {}",
                i, node.feature_index, n_features
            ));
        }
        let children_ok = [node.left, node.right]
            .iter()
            .all(|&c| c > i && c < tree.nodes.len());
        if !children_ok {
            return Err(format!(
                "node {} has children ({}, {}) outside ({}, {})",
                i,
                node.left,
                node.right,
                i,
                tree.nodes.len()
            ));
        }
    }
    Ok(())
}

pub fn sigmoid(z: f64) -> f64 {
    1.0 / (1.0 + (-z).exp())
}

impl ProbabilityModel for ModelArtifact {
    fn name(&self) -> &str {
        &self.name
    }

    fn feature_names(&self) -> &[String] {
        &self.feature_names
    }

    fn positive_proba(&self, features: &Array2<f64>) -> crate::Result<Array1<f64>> {
        if features.ncols() != self.feature_names.len() {
            return Err(UpliftError::FeatureShape {
                model: self.name.clone(),
                expected: self.feature_names.len(),
                actual: features.ncols(),
            }
            .into());
        }

        Ok(features
            .outer_iter()
            .map(|row| sigmoid(self.raw_score(row)))
            .collect())
    }
}

/// Shared read-only handle to a loaded model
pub type SharedModel = Arc<dyn ProbabilityModel>;

/// The treated-scenario and control-scenario models, loaded once at startup
#[derive(Debug, Clone)]
pub struct ModelPair {
    pub treated: SharedModel,
    pub control: SharedModel,
}

impl ModelPair {
    pub fn new(treated: SharedModel, control: SharedModel) -> Self {
        Self { treated, control }
    }

    /// Load both artifacts from disk
    pub fn load(treated: impl AsRef<Path>, control: impl AsRef<Path>) -> crate::Result<Self> {
        let treated = ModelArtifact::load(treated)?;
        let control = ModelArtifact::load(control)?;
        if treated.feature_names != control.feature_names {
            info!(
                "Treated and control models use different feature schemas; aligning separately"
            );
        }
        Ok(Self::new(Arc::new(treated), Arc::new(control)))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use ndarray::array;
    use std::io::Write;
    use tempfile::NamedTempFile;

    fn logistic(names: &[&str], intercept: f64, coefficients: Vec<f64>) -> ModelArtifact {
        ModelArtifact {
            name: "logit".to_string(),
            feature_names: names.iter().map(|s| s.to_string()).collect(),
            estimator: Estimator::Logistic {
                intercept,
                coefficients,
            },
        }
    }

    fn stump() -> ModelArtifact {
        let json = r#"{
            "name": "stump",
            "feature_names": ["age"],
            "estimator": {
                "type": "gradient_boosting",
                "base_score": 0.0,
                "learning_rate": 1.0,
                "trees": [{"nodes": [
                    {"feature_index": 0, "threshold": 50.0, "left": 1, "right": 2},
                    {"value": -2.0},
                    {"value": 2.0}
                ]}]
            }
        }"#;
        ModelArtifact::from_json_str(json).unwrap()
    }

    #[test]
    fn test_logistic_probabilities() {
        let model = logistic(&["a", "b"], 0.0, vec![1.0, -1.0]);
        let proba = model.positive_proba(&array![[0.0, 0.0], [2.0, 0.0]]).unwrap();

        assert!((proba[0] - 0.5).abs() < 1e-12);
        assert!((proba[1] - sigmoid(2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_predict_proba_rows_sum_to_one() {
        let model = logistic(&["a"], 0.3, vec![0.7]);
        let proba = model.predict_proba(&array![[-1.0], [0.0], [4.0]]).unwrap();

        assert_eq!(proba.shape(), &[3, 2]);
        for row in proba.outer_iter() {
            assert!((row[0] + row[1] - 1.0).abs() < 1e-12);
            assert!((0.0..=1.0).contains(&row[1]));
        }
    }

    #[test]
    fn test_gradient_boosting_walks_tree() {
        let model = stump();
        let proba = model.positive_proba(&array![[30.0], [50.0], [70.0]]).unwrap();

        assert!((proba[0] - sigmoid(-2.0)).abs() < 1e-12);
        assert!((proba[1] - sigmoid(-2.0)).abs() < 1e-12);
        assert!((proba[2] - sigmoid(2.0)).abs() < 1e-12);
    }

    #[test]
    fn test_feature_shape_mismatch() {
        let model = logistic(&["a", "b"], 0.0, vec![1.0, 1.0]);
        let err = model.positive_proba(&array![[1.0]]).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UpliftError>(),
            Some(UpliftError::FeatureShape { expected: 2, actual: 1, .. })
        ));
    }

    #[test]
    fn test_validation_rejects_bad_artifacts() {
        assert!(logistic(&["a", "b"], 0.0, vec![1.0]).validate().is_err());
        assert!(logistic(&["a", "a"], 0.0, vec![1.0, 1.0]).validate().is_err());
        assert!(logistic(&[], 0.0, vec![]).validate().is_err());

        let cyclic = r#"{
            "name": "cyclic",
            "feature_names": ["age"],
            "estimator": {
                "type": "gradient_boosting",
                "base_score": 0.0,
                "learning_rate": 1.0,
                "trees": [{"nodes": [
                    {"feature_index": 0, "threshold": 1.0, "left": 0, "right": 1},
                    {"value": 1.0}
                ]}]
            }
        }"#;
        assert!(ModelArtifact::from_json_str(cyclic).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        let artifact = logistic(&["balance"], -1.0, vec![0.001]);
        write!(file, "{}", serde_json::to_string(&artifact).unwrap()).unwrap();

        let loaded = ModelArtifact::load(file.path()).unwrap();
        assert_eq!(loaded, artifact);
        assert_eq!(loaded.feature_names(), &["balance".to_string()]);
    }

    #[test]
    fn test_load_missing_file() {
        let err = ModelArtifact::load("/nonexistent/model_treated.json").unwrap_err();
        assert!(matches!(
            err.downcast_ref::<UpliftError>(),
            Some(UpliftError::ModelArtifact { .. })
        ));
    }
}
