//! Command-line interface definitions and argument parsing

use crate::report::{DEFAULT_EXPORT_NAME, DEFAULT_TOP_N};
use clap::Parser;
use std::path::PathBuf;

/// Customer uplift scoring: rank customers by treated-vs-control response
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
pub struct Args {
    /// Semicolon-delimited customer CSV, or "-" to read stdin
    #[arg(short, long)]
    pub input: String,

    /// Directory holding the model artifacts
    #[arg(long, default_value = ".")]
    pub model_dir: PathBuf,

    /// Treated-scenario model artifact (relative paths resolve against --model-dir)
    #[arg(long, default_value = "model_treated.json")]
    pub treated_model: PathBuf,

    /// Control-scenario model artifact (relative paths resolve against --model-dir)
    #[arg(long, default_value = "model_control.json")]
    pub control_model: PathBuf,

    /// Output path for the scored CSV export
    #[arg(short, long, default_value = DEFAULT_EXPORT_NAME)]
    pub output: PathBuf,

    /// Number of customers shown in the ranked table
    #[arg(long, default_value_t = DEFAULT_TOP_N)]
    pub top: usize,

    /// Seed for the deposit estimate; omit for a fresh draw every run
    #[arg(long)]
    pub seed: Option<u64>,

    /// TOML file overriding the business-rule constants
    #[arg(long)]
    pub config: Option<PathBuf>,

    /// Optional PNG path for the uplift distribution chart
    #[arg(long)]
    pub chart: Option<String>,

    /// Log level when RUST_LOG is unset
    #[arg(long, default_value = "info")]
    pub log_level: String,

    /// Enable verbose output
    #[arg(short, long)]
    pub verbose: bool,
}

impl Args {
    pub fn treated_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.treated_model)
    }

    pub fn control_model_path(&self) -> PathBuf {
        self.model_dir.join(&self.control_model)
    }

    /// Reject argument combinations clap cannot express
    pub fn validate(&self) -> crate::Result<()> {
        if self.top == 0 {
            anyhow::bail!("--top must be at least 1");
        }
        if self.input.trim().is_empty() {
            anyhow::bail!("--input must name a file or '-'");
        }
        Ok(())
    }

    /// Effective tracing filter directive
    pub fn log_filter(&self) -> &str {
        if self.verbose {
            "debug"
        } else {
            &self.log_level
        }
    }
}
