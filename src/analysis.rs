use anyhow::Result;
use std::time::Instant;
use tracing::{info, warn};

use crate::aggregate::{bucket, partition_by_category, BucketedSeries};
use crate::config::AnalysisConfig;
use crate::fit::{fit, GrowthModelKind};
use crate::loader;
use crate::stats::{AnalysisResult, DropSummary, SeriesOutcome};
use crate::table::Table;

/// Run the full pipeline: load, partition, bucket, fit. Non-converging
/// fits are counted and skipped; only a missing source aborts the run.
pub fn run_analysis(config: &AnalysisConfig, model: GrowthModelKind) -> Result<AnalysisResult> {
    let total_start_time = Instant::now();
    info!(
        action = "start",
        component = "analysis",
        source = ?config.source_path,
        unit = %config.time_unit,
        model = %model,
        "Starting growth analysis"
    );

    let sheet_tables = loader::load_sheet_tables(&config.source_path, &config.sheet_names)?;
    let total_records: usize = sheet_tables.iter().map(|(_, table)| table.len()).sum();

    let mut drops = DropSummary::default();
    let mut outcomes = Vec::new();

    match (&config.category_field, sheet_tables.len()) {
        (Some(category_field), _) => {
            let combined =
                Table::concat(sheet_tables.into_iter().map(|(_, table)| table).collect());
            let partition = partition_by_category(&combined, category_field);
            drops.missing_category += partition.dropped;
            for (category, table) in partition.groups {
                outcomes.push(series_outcome(Some(category), &table, config, model, &mut drops));
            }
        }
        (None, 0 | 1) => {
            let table = sheet_tables
                .into_iter()
                .map(|(_, table)| table)
                .next()
                .unwrap_or_default();
            outcomes.push(series_outcome(None, &table, config, model, &mut drops));
        }
        (None, _) => {
            // One sheet per technology category: analyze each sheet on its
            // own, plus the integrated overall series.
            let combined = Table::concat(
                sheet_tables
                    .iter()
                    .map(|(_, table)| table.clone())
                    .collect(),
            );
            for (sheet, table) in sheet_tables {
                outcomes.push(series_outcome(Some(sheet), &table, config, model, &mut drops));
            }
            // The overall series re-buckets the same records, so its date
            // drops are already counted; only a failed overall fit is new.
            let mut overall_drops = DropSummary::default();
            let overall = series_outcome(None, &combined, config, model, &mut overall_drops);
            drops.unconverged_fits += overall_drops.unconverged_fits;
            outcomes.push(overall);
        }
    }

    let date_range = overall_date_range(&outcomes);

    info!(
        action = "complete",
        component = "analysis",
        series_count = outcomes.len(),
        dropped_total = drops.total(),
        duration_ms = total_start_time.elapsed().as_millis(),
        "Analysis completed"
    );

    Ok(AnalysisResult {
        total_records,
        date_range,
        outcomes,
        drops,
    })
}

fn series_outcome(
    category: Option<String>,
    table: &Table,
    config: &AnalysisConfig,
    model: GrowthModelKind,
    drops: &mut DropSummary,
) -> SeriesOutcome {
    let series = bucket(
        table,
        &config.date_field,
        config.time_unit,
        config.include_empty_buckets,
    );
    drops.unparseable_dates += series.dropped_dates;

    // An empty series is "no data", not a failed fit
    let fit_result = if series.is_empty() {
        None
    } else {
        attempt_fit(category.as_deref(), &series, model, drops)
    };
    SeriesOutcome {
        category,
        series,
        fit: fit_result,
    }
}

fn attempt_fit(
    category: Option<&str>,
    series: &BucketedSeries,
    model: GrowthModelKind,
    drops: &mut DropSummary,
) -> Option<crate::fit::FitOutcome> {
    match fit(series, model) {
        Ok(outcome) => Some(outcome),
        Err(e) => {
            warn!(
                component = "analysis",
                category = category.unwrap_or("all"),
                error = %e,
                "Skipping series: fit failed"
            );
            drops.unconverged_fits += 1;
            None
        }
    }
}

fn overall_date_range(
    outcomes: &[SeriesOutcome],
) -> Option<(chrono::NaiveDate, chrono::NaiveDate)> {
    let first = outcomes
        .iter()
        .filter_map(|o| o.series.first_date)
        .min()?;
    let last = outcomes
        .iter()
        .filter_map(|o| o.series.last_date)
        .max()?;
    Some((first, last))
}
