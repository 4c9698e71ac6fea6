use anyhow::{anyhow, Result};
use plotters::prelude::*;
use std::path::Path;
use tracing::info;

use crate::aggregate::BucketedSeries;
use crate::fit::{predict, FitOutcome};

/// Render observed cumulative counts as points and, when a fit is
/// available, the fitted curve as a line sampled at `samples` points,
/// extended `horizon` buckets past the observed range.
pub fn render_fit_chart(
    title: &str,
    series: &BucketedSeries,
    fit: Option<&FitOutcome>,
    path: &Path,
    horizon: usize,
    samples: usize,
) -> Result<()> {
    if series.is_empty() {
        anyhow::bail!("cannot chart an empty series");
    }

    let observed: Vec<(f64, f64)> = series
        .points
        .iter()
        .enumerate()
        .map(|(i, point)| (i as f64, point.cumulative as f64))
        .collect();

    let x_end = (series.len() - 1 + horizon) as f64;
    let curve: Vec<(f64, f64)> = match fit {
        Some(fit) => {
            let step = if samples > 1 {
                x_end / (samples - 1) as f64
            } else {
                0.0
            };
            let xs: Vec<f64> = (0..samples.max(2)).map(|i| i as f64 * step).collect();
            let ys = predict(&fit.params, &xs);
            xs.into_iter().zip(ys).collect()
        }
        None => Vec::new(),
    };

    let y_max = observed
        .iter()
        .map(|(_, y)| *y)
        .chain(curve.iter().map(|(_, y)| *y))
        .fold(1.0f64, f64::max)
        * 1.1;

    let root = SVGBackend::new(path, (1000, 600)).into_drawing_area();
    root.fill(&WHITE).map_err(|e| anyhow!("chart fill: {}", e))?;

    let mut chart = ChartBuilder::on(&root)
        .caption(title, ("sans-serif", 24))
        .margin(20)
        .x_label_area_size(45)
        .y_label_area_size(70)
        .build_cartesian_2d(-0.5f64..(x_end + 0.5), 0.0f64..y_max)
        .map_err(|e| anyhow!("chart layout: {}", e))?;

    let x_desc = match series.points.first() {
        Some(first) => format!("{}s since {}", series.unit, first.label),
        None => series.unit.to_string(),
    };
    chart
        .configure_mesh()
        .x_desc(x_desc)
        .y_desc("Cumulative applications")
        .draw()
        .map_err(|e| anyhow!("chart mesh: {}", e))?;

    chart
        .draw_series(
            observed
                .iter()
                .map(|&(x, y)| Circle::new((x, y), 4, BLUE.filled())),
        )
        .map_err(|e| anyhow!("chart points: {}", e))?
        .label("Observed")
        .legend(|(x, y)| Circle::new((x, y), 4, BLUE.filled()));

    if let Some(fit) = fit {
        chart
            .draw_series(LineSeries::new(curve, &RED))
            .map_err(|e| anyhow!("chart curve: {}", e))?
            .label(format!("Fitted {} ({})", fit.kind, fit.params))
            .legend(|(x, y)| PathElement::new(vec![(x - 8, y), (x + 8, y)], &RED));
    }

    chart
        .configure_series_labels()
        .border_style(&BLACK)
        .background_style(WHITE.mix(0.8))
        .draw()
        .map_err(|e| anyhow!("chart legend: {}", e))?;

    root.present().map_err(|e| anyhow!("chart write: {}", e))?;

    info!(
        action = "write",
        component = "chart",
        output = ?path,
        "Chart rendered"
    );
    Ok(())
}
