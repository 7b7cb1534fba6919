//! UpliftForge: customer uplift scoring with paired treated/control models
//!
//! This library scores a customer table with two pretrained classifiers,
//! estimates the business value of contacting each customer, and recommends
//! the customers whose uplift clears a per-batch quantile.

pub mod cli;
pub mod config;
pub mod data;
pub mod errors;
pub mod features;
pub mod model;
pub mod pipeline;
pub mod report;
pub mod scoring;
pub mod viz;

// Re-export public items for easier access
pub use cli::Args;
pub use config::ScoringConfig;
pub use data::{load_customers, CustomerBatch};
pub use errors::UpliftError;
pub use features::{prepare_features, FeatureMatrix, PreparedBatch};
pub use model::{ModelArtifact, ModelPair, ProbabilityModel};
pub use pipeline::{run_uplift, UpliftRun};
pub use report::{write_results_csv, SummaryMetrics};
pub use scoring::{score_batch, ScoredBatch};
pub use viz::create_uplift_histogram;

/// Common result type used throughout the application
pub type Result<T> = anyhow::Result<T>;
