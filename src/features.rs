//! Feature preparation: treatment/outcome flags, one-hot encoding and
//! alignment to a model's training-time feature names

use crate::data::CustomerBatch;
use ndarray::Array2;
use std::collections::{BTreeSet, HashMap, HashSet};
use tracing::debug;

/// Contact channel value meaning the customer was never reached
pub const UNKNOWN_CONTACT: &str = "unknown";

/// Response value counted as a positive outcome
pub const POSITIVE_RESPONSE: &str = "yes";

/// Named numeric feature columns, one row per customer
#[derive(Debug, Clone, PartialEq)]
pub struct FeatureMatrix {
    names: Vec<String>,
    values: Array2<f64>,
}

/// Columns synthesized or discarded while aligning to a model schema
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AlignmentReport {
    /// Expected by the model but absent from the upload; filled with 0
    pub filled: Vec<String>,
    /// Present in the upload but unknown to the model; dropped
    pub dropped: Vec<String>,
}

impl AlignmentReport {
    pub fn is_exact(&self) -> bool {
        self.filled.is_empty() && self.dropped.is_empty()
    }
}

impl FeatureMatrix {
    pub fn new(names: Vec<String>, values: Array2<f64>) -> crate::Result<Self> {
        if names.len() != values.ncols() {
            anyhow::bail!(
                "Feature matrix has {} columns but {} names",
                values.ncols(),
                names.len()
            );
        }
        Ok(Self { names, values })
    }

    pub fn names(&self) -> &[String] {
        &self.names
    }

    pub fn values(&self) -> &Array2<f64> {
        &self.values
    }

    pub fn nrows(&self) -> usize {
        self.values.nrows()
    }

    /// Reindex columns to `expected`, in that order
    ///
    /// Expected columns missing here are filled with 0; columns not in
    /// `expected` are dropped.
    pub fn align(&self, expected: &[String]) -> (Array2<f64>, AlignmentReport) {
        let index: HashMap<&str, usize> = self
            .names
            .iter()
            .enumerate()
            .map(|(i, name)| (name.as_str(), i))
            .collect();

        let mut aligned = Array2::zeros((self.nrows(), expected.len()));
        let mut report = AlignmentReport::default();

        for (j, name) in expected.iter().enumerate() {
            match index.get(name.as_str()) {
                Some(&src) => aligned.column_mut(j).assign(&self.values.column(src)),
                None => report.filled.push(name.clone()),
            }
        }

        let expected_set: HashSet<&str> = expected.iter().map(String::as_str).collect();
        report.dropped = self
            .names
            .iter()
            .filter(|name| !expected_set.contains(name.as_str()))
            .cloned()
            .collect();

        (aligned, report)
    }
}

/// Flags and features derived from one batch
#[derive(Debug, Clone)]
pub struct PreparedBatch {
    /// 1 when the customer was contacted through a known channel
    pub treatment: Vec<i32>,
    /// 1 when the customer responded "yes"; 0 when no response column exists
    pub outcome: Vec<i32>,
    pub features: FeatureMatrix,
}

pub fn treatment_flag(contact: Option<&str>) -> i32 {
    if contact == Some(UNKNOWN_CONTACT) {
        0
    } else {
        1
    }
}

pub fn outcome_flag(response: Option<&str>) -> i32 {
    i32::from(response == Some(POSITIVE_RESPONSE))
}

/// Derive treatment/outcome flags and the one-hot feature matrix
pub fn prepare_features(batch: &CustomerBatch) -> crate::Result<PreparedBatch> {
    let treatment = batch
        .contact()
        .iter()
        .map(|c| treatment_flag(c.as_deref()))
        .collect();

    let outcome = match batch.response() {
        Some(response) => response.iter().map(|r| outcome_flag(r.as_deref())).collect(),
        None => vec![0; batch.len()],
    };

    if batch.has_duration() {
        debug!("Dropping 'duration' column before encoding");
    }

    let features = encode_features(batch)?;
    debug!(
        "Encoded {} feature columns for {} customers",
        features.names().len(),
        features.nrows()
    );

    Ok(PreparedBatch {
        treatment,
        outcome,
        features,
    })
}

/// One-hot encode categorical columns, dropping the first category of each
///
/// Numeric columns come first in upload order, followed by the dummy
/// columns of each categorical column. Categories are ordered
/// lexicographically and named `{column}_{category}`; nulls encode as all
/// zeros.
fn encode_features(batch: &CustomerBatch) -> crate::Result<FeatureMatrix> {
    let n_rows = batch.len();
    let mut numeric: Vec<(String, Vec<f64>)> = Vec::new();
    let mut dummies: Vec<(String, Vec<f64>)> = Vec::new();

    for field in batch.feature_fields() {
        if let Some(values) = field.values.as_f64() {
            numeric.push((field.name.clone(), values));
            continue;
        }

        let crate::data::FieldValues::Text(values) = &field.values else {
            continue;
        };

        let categories: BTreeSet<&str> = values.iter().flatten().map(String::as_str).collect();
        for category in categories.into_iter().skip(1) {
            let column = values
                .iter()
                .map(|v| if v.as_deref() == Some(category) { 1.0 } else { 0.0 })
                .collect();
            dummies.push((format!("{}_{}", field.name, category), column));
        }
    }

    let columns: Vec<(String, Vec<f64>)> = numeric.into_iter().chain(dummies).collect();
    let values = Array2::from_shape_fn((n_rows, columns.len()), |(r, c)| columns[c].1[r]);
    let names = columns.into_iter().map(|(name, _)| name).collect();

    FeatureMatrix::new(names, values)
}
