use anyhow::{Context, Result};
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::info;

use crate::aggregate::BucketedSeries;
use crate::chart;
use crate::fit::GrowthModelKind;
use crate::stats::AnalysisResult;
use crate::utils::{format_number, slugify};

#[derive(Debug, Clone)]
pub struct OutputOptions {
    pub out_dir: PathBuf,
    pub charts: bool,
    /// Buckets to extend fitted curves past the observed range.
    pub horizon: usize,
    /// Sample points along each fitted curve.
    pub samples: usize,
}

#[derive(Serialize)]
struct CountRow<'a> {
    bucket: &'a str,
    count: u32,
    cumulative: u32,
}

/// Write the derived tables (and charts, when enabled) for every series.
pub fn write_outputs(result: &AnalysisResult, opts: &OutputOptions) -> Result<()> {
    let start_time = Instant::now();
    fs::create_dir_all(&opts.out_dir)
        .with_context(|| format!("Failed to create output directory {:?}", opts.out_dir))?;

    let mut tables = 0u32;
    let mut charts = 0u32;
    for outcome in &result.outcomes {
        if outcome.series.is_empty() {
            continue;
        }
        let slug = slugify(outcome.name());
        let unit = outcome.series.unit;

        let csv_path = opts.out_dir.join(format!("{}_{}_counts.csv", slug, unit));
        write_series_csv(&outcome.series, &csv_path)?;
        tables += 1;

        if opts.charts {
            let chart_path = opts.out_dir.join(format!("{}_{}_fit.svg", slug, unit));
            chart::render_fit_chart(
                outcome.name(),
                &outcome.series,
                outcome.fit.as_ref(),
                &chart_path,
                opts.horizon,
                opts.samples,
            )?;
            charts += 1;
        }
    }

    info!(
        action = "complete",
        component = "report",
        table_count = tables,
        chart_count = charts,
        out_dir = ?opts.out_dir,
        duration_ms = start_time.elapsed().as_millis(),
        "Outputs written"
    );
    Ok(())
}

fn write_series_csv(series: &BucketedSeries, path: &Path) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;
    for point in &series.points {
        writer.serialize(CountRow {
            bucket: &point.label,
            count: point.count,
            cumulative: point.cumulative,
        })?;
    }
    writer.flush()?;
    Ok(())
}

pub fn print_summary(result: &AnalysisResult, model: GrowthModelKind) {
    println!("\n--- Patent Application Growth Analysis ---");
    println!(
        "Records loaded: {}",
        format_number(result.total_records as u32)
    );

    if let Some((first, last)) = result.date_range {
        println!("Date range: {} to {}", first, last);
    } else {
        println!("Date range: no valid dates");
    }

    println!(
        "Dropped: {} unparseable dates, {} missing category",
        format_number(result.drops.unparseable_dates),
        format_number(result.drops.missing_category)
    );

    println!("\nSeries ({} fit):", model);
    for outcome in &result.outcomes {
        let series = &outcome.series;
        let heading = format!(
            "- {}: {} {} buckets, {} applications",
            outcome.name(),
            series.len(),
            series.unit,
            format_number(series.total())
        );
        match &outcome.fit {
            Some(fit) => println!("{}, {} (r²={:.4})", heading, fit.params, fit.r_squared),
            None => println!("{}, fit did not converge", heading),
        }
    }

    if result.drops.unconverged_fits > 0 {
        println!(
            "\n{} series skipped: fit did not converge",
            format_number(result.drops.unconverged_fits)
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::aggregate::{bucket, TimeUnit};
    use crate::stats::{DropSummary, SeriesOutcome};
    use crate::table::{Record, Table, Value};

    fn small_result() -> AnalysisResult {
        let mut table = Table::new(vec!["application_date".into()]);
        for date in ["2001-01-10", "2001-02-11", "2002-05-12"] {
            let mut record = Record::new();
            record.set("application_date", Value::Text(date.into()));
            table.push(record);
        }
        let series = bucket(&table, "application_date", TimeUnit::Year, false);
        AnalysisResult {
            total_records: 3,
            date_range: series.first_date.zip(series.last_date),
            outcomes: vec![SeriesOutcome {
                category: Some("AI".into()),
                series,
                fit: None,
            }],
            drops: DropSummary::default(),
        }
    }

    #[test]
    fn writes_a_counts_table_per_series() {
        let dir = tempfile::tempdir().unwrap();
        let opts = OutputOptions {
            out_dir: dir.path().to_path_buf(),
            charts: false,
            horizon: 0,
            samples: 100,
        };
        write_outputs(&small_result(), &opts).unwrap();

        let written = fs::read_to_string(dir.path().join("ai_year_counts.csv")).unwrap();
        let lines: Vec<&str> = written.lines().collect();
        assert_eq!(lines[0], "bucket,count,cumulative");
        assert_eq!(lines[1], "2001,2,2");
        assert_eq!(lines[2], "2002,1,3");
    }
}
