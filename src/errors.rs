//! Error taxonomy for the uplift pipeline

use thiserror::Error;

/// Errors that halt processing of an input file
#[derive(Error, Debug)]
pub enum UpliftError {
    /// A column the pipeline cannot run without is absent
    #[error("Missing required column: {0}")]
    MissingColumn(&'static str),

    /// A column is present but holds values of the wrong kind
    #[error("Invalid column '{column}': {reason}")]
    InvalidColumn { column: String, reason: String },

    /// The input holds a header but no customer rows
    #[error("Input contains no customer rows")]
    EmptyInput,

    /// A model artifact could not be loaded or failed validation
    #[error("Invalid model artifact '{name}': {reason}")]
    ModelArtifact { name: String, reason: String },

    /// Feature matrix width does not match the model's schema
    #[error("Model '{model}' expects {expected} features, got {actual}")]
    FeatureShape {
        model: String,
        expected: usize,
        actual: usize,
    },

    /// A model produced something that is not a probability
    #[error("Model '{model}' produced invalid probability {value} at row {row}")]
    InvalidPrediction { model: String, row: usize, value: f64 },

    /// Business-rule configuration is inconsistent
    #[error("Invalid scoring configuration: {0}")]
    InvalidConfig(String),
}
