//! Uplift distribution chart using Plotters

use crate::scoring::ScoredBatch;
use plotters::prelude::*;
use tracing::info;

const HISTOGRAM_BINS: usize = 30;

/// Equal-width histogram bins over `values` as `(start, end, count)`
pub fn histogram_bins(values: &[f64], bins: usize) -> Vec<(f64, f64, usize)> {
    if values.is_empty() || bins == 0 {
        return Vec::new();
    }

    let min = values.iter().copied().fold(f64::INFINITY, f64::min);
    let max = values.iter().copied().fold(f64::NEG_INFINITY, f64::max);
    let (lo, hi) = if max > min {
        (min, max)
    } else {
        (min - 0.01, max + 0.01)
    };
    let width = (hi - lo) / bins as f64;

    let mut counts = vec![0usize; bins];
    for &v in values {
        let idx = (((v - lo) / width).floor() as usize).min(bins - 1);
        counts[idx] += 1;
    }

    counts
        .into_iter()
        .enumerate()
        .map(|(i, c)| (lo + i as f64 * width, lo + (i + 1) as f64 * width, c))
        .collect()
}

/// Draw the uplift distribution with the recommendation threshold marked
pub fn create_uplift_histogram(scored: &ScoredBatch, output_path: &str) -> crate::Result<()> {
    let bins = histogram_bins(&scored.uplift, HISTOGRAM_BINS);
    let (Some(first), Some(last)) = (bins.first(), bins.last()) else {
        anyhow::bail!("No uplift values to plot");
    };
    let x_range = first.0..last.1;
    let y_max = bins.iter().map(|b| b.2).max().unwrap_or(1) as f64 * 1.1;
    let threshold = scored.threshold;

    let root = BitMapBackend::new(output_path, (800, 600)).into_drawing_area();
    root.fill(&WHITE)?;

    let mut chart = ChartBuilder::on(&root)
        .caption("Uplift Distribution", ("sans-serif", 30))
        .margin(10)
        .x_label_area_size(50)
        .y_label_area_size(60)
        .build_cartesian_2d(x_range, 0f64..y_max)?;

    chart
        .configure_mesh()
        .x_desc("Uplift (p_treated - p_control)")
        .y_desc("Number of Customers")
        .axis_desc_style(("sans-serif", 15))
        .draw()?;

    chart.draw_series(bins.iter().map(|&(start, end, count)| {
        Rectangle::new([(start, 0.0), (end, count as f64)], BLUE.mix(0.6).filled())
    }))?;

    chart
        .draw_series(LineSeries::new(
            vec![(threshold, 0.0), (threshold, y_max)],
            RED.stroke_width(2),
        ))?
        .label(format!("Recommend threshold ({:.4})", threshold))
        .legend(|(x, y)| PathElement::new(vec![(x, y), (x + 20, y)], &RED));

    chart
        .configure_series_labels()
        .background_style(WHITE.mix(0.8))
        .border_style(BLACK)
        .draw()?;

    root.present()?;
    info!("Uplift chart saved to {}", output_path);

    Ok(())
}
