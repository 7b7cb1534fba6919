//! Result tables, summary metrics and CSV export

use crate::data::{pick, CustomerBatch};
use crate::features::PreparedBatch;
use crate::scoring::ScoredBatch;
use polars::prelude::*;
use std::fs::File;
use std::path::Path;
use tracing::info;

/// Rows shown in the ranked table
pub const DEFAULT_TOP_N: usize = 20;

/// File name offered for the export
pub const DEFAULT_EXPORT_NAME: &str = "uplift_results.csv";

/// Build the scored table: raw columns plus derived ones, best uplift first
///
/// `duration` is omitted. Rows with equal uplift keep upload order.
pub fn build_results_frame(
    batch: &CustomerBatch,
    prepared: &PreparedBatch,
    scored: &ScoredBatch,
) -> crate::Result<DataFrame> {
    if scored.len() != batch.len() {
        anyhow::bail!(
            "Scored {} rows for a batch of {}",
            scored.len(),
            batch.len()
        );
    }

    let order = scored.ranking();
    let mut columns: Vec<Series> = batch
        .result_fields()
        .map(|f| f.values.reorder(&order).to_series(&f.name))
        .collect();

    columns.extend([
        Series::new("treatment", pick(&prepared.treatment, &order)),
        Series::new("outcome", pick(&prepared.outcome, &order)),
        Series::new("uplift", pick(&scored.uplift, &order)),
        Series::new("deposit_amount", pick(&scored.deposit_amount, &order)),
        Series::new("value", pick(&scored.value, &order)),
        Series::new("contact_cost", pick(&scored.contact_cost, &order)),
        Series::new("expected_profit", pick(&scored.expected_profit, &order)),
        Series::new("recommend_contact", pick(&scored.recommend_contact, &order)),
    ]);

    Ok(DataFrame::new(columns)?)
}

/// Headline figures for one scored batch
#[derive(Debug, Clone, PartialEq)]
pub struct SummaryMetrics {
    pub customers: usize,
    pub mean_uplift: f64,
    /// Share of customers recommended for contact
    pub recommend_rate: f64,
    /// Mean expected profit over recommended customers; `None` if nobody is
    pub mean_targeted_profit: Option<f64>,
    pub threshold: f64,
}

impl SummaryMetrics {
    pub fn from_scored(scored: &ScoredBatch) -> Self {
        let n = scored.len();
        let mean_uplift = mean(scored.uplift.iter().copied()).unwrap_or(0.0);
        let recommended = scored.recommend_contact.iter().filter(|&&r| r).count();
        let recommend_rate = if n == 0 {
            0.0
        } else {
            recommended as f64 / n as f64
        };
        let mean_targeted_profit = mean(
            scored
                .expected_profit
                .iter()
                .zip(&scored.recommend_contact)
                .filter(|&(_, &r)| r)
                .map(|(&p, _)| p),
        );

        Self {
            customers: n,
            mean_uplift,
            recommend_rate,
            mean_targeted_profit,
            threshold: scored.threshold,
        }
    }
}

fn mean(values: impl Iterator<Item = f64>) -> Option<f64> {
    let (sum, count) = values.fold((0.0, 0usize), |(s, c), v| (s + v, c + 1));
    (count > 0).then(|| sum / count as f64)
}

/// Lift Polars' default row and column caps so tables print in full
fn show_full_tables() {
    std::env::set_var("POLARS_FMT_MAX_ROWS", "-1");
    std::env::set_var("POLARS_FMT_MAX_COLS", "-1");
    std::env::set_var("POLARS_TABLE_WIDTH", "65535");
}

/// Render a frame with every row and column visible
pub fn format_table(df: &DataFrame) -> String {
    show_full_tables();
    format!("{}", df)
}

/// Render the `top` customers with the highest uplift
///
/// `results` must already be ranked, as built by [`build_results_frame`].
pub fn format_top_customers(results: &DataFrame, top: usize) -> String {
    format_table(&results.head(Some(top)))
}

/// Print the first rows of the upload as received
pub fn print_upload_preview(preview: &DataFrame) {
    println!("=== Uploaded Data Preview ===");
    println!("{}", format_table(preview));
}

/// Print the `top` customers with the highest uplift
pub fn print_top_customers(results: &DataFrame, top: usize) {
    println!("\n=== Top Customers to Focus On ===");
    println!("{}", format_top_customers(results, top));
}

pub fn print_summary(metrics: &SummaryMetrics) {
    println!("\n=== Summary Metrics ===");
    println!("Mean Uplift:            {:.4}", metrics.mean_uplift);
    println!("Recommend Rate:         {:.4}", metrics.recommend_rate);
    match metrics.mean_targeted_profit {
        Some(profit) => println!("Mean Profit (Targeted): {:.2}", profit),
        None => println!("Mean Profit (Targeted): n/a"),
    }
    println!(
        "Uplift threshold:       {:.4} ({} customers scored)",
        metrics.threshold, metrics.customers
    );
}

/// Serialize the results as comma-delimited UTF-8 with a header row
pub fn results_csv_bytes(results: &DataFrame) -> crate::Result<Vec<u8>> {
    let mut buffer = Vec::new();
    let mut df = results.clone();
    CsvWriter::new(&mut buffer)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut df)?;
    Ok(buffer)
}

/// Write the results export to `output_path`
pub fn write_results_csv(results: &DataFrame, output_path: impl AsRef<Path>) -> crate::Result<()> {
    let output_path = output_path.as_ref();
    let mut file = File::create(output_path)?;
    let mut df = results.clone();
    CsvWriter::new(&mut file)
        .include_header(true)
        .with_separator(b',')
        .finish(&mut df)?;

    info!(
        "Wrote {} scored customers to {}",
        df.height(),
        output_path.display()
    );
    Ok(())
}
