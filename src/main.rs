//! UpliftForge: customer uplift scoring CLI
//!
//! This is the main entrypoint that loads both models once, then runs
//! ingestion, scoring, reporting and export for the given upload.

use anyhow::Result;
use clap::Parser;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::time::Instant;
use tracing::{debug, info};
use tracing_subscriber::EnvFilter;
use upliftforge::{
    load_customers, report, run_uplift, viz, Args, ModelPair, ScoringConfig,
};

fn init_logging(filter: &str) {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(filter));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<()> {
    let args = Args::parse();
    init_logging(args.log_filter());
    args.validate()?;

    let config = match &args.config {
        Some(path) => ScoringConfig::from_toml_file(path)?,
        None => ScoringConfig::default(),
    };

    // Models are loaded once and shared read-only for the whole run
    let models = ModelPair::load(args.treated_model_path(), args.control_model_path())?;

    run_pipeline(&args, &models, &config)
}

/// Score one upload end to end
fn run_pipeline(args: &Args, models: &ModelPair, config: &ScoringConfig) -> Result<()> {
    let start_time = Instant::now();

    // Step 1: Ingest and validate the upload
    info!("Loading customers from: {}", args.input);
    let data_start = Instant::now();
    let batch = load_customers(&args.input)?;
    debug!(
        "Ingestion time: {:.2}s",
        data_start.elapsed().as_secs_f64()
    );

    report::print_upload_preview(&batch.preview(upliftforge::data::PREVIEW_ROWS)?);

    // Step 2: Features, dual-model scoring and business rules
    let mut rng = match args.seed {
        Some(seed) => {
            info!("Deposit estimate seeded with {}", seed);
            StdRng::seed_from_u64(seed)
        }
        None => StdRng::from_entropy(),
    };

    let score_start = Instant::now();
    let run = run_uplift(&batch, models, config, &mut rng)?;
    debug!(
        "Scoring time: {:.2}s ({} feature columns)",
        score_start.elapsed().as_secs_f64(),
        run.prepared.features.names().len()
    );

    // Step 3: Present and export
    report::print_top_customers(&run.results, args.top);
    report::print_summary(&run.metrics);

    report::write_results_csv(&run.results, &args.output)?;
    println!("\nResults exported to: {}", args.output.display());

    if let Some(chart_path) = &args.chart {
        viz::create_uplift_histogram(&run.scored, chart_path)?;
        println!("Uplift chart saved to: {}", chart_path);
    }

    info!(
        "Pipeline complete in {:.2}s",
        start_time.elapsed().as_secs_f64()
    );

    Ok(())
}
