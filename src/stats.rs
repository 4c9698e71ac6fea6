use chrono::NaiveDate;

use crate::aggregate::BucketedSeries;
use crate::fit::FitOutcome;

/// Aggregated counts of recoverable per-record and per-series failures.
/// Surfaced once in the run summary instead of being raised individually.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct DropSummary {
    pub unparseable_dates: u32,
    pub missing_category: u32,
    pub unconverged_fits: u32,
}

impl DropSummary {
    pub fn total(&self) -> u32 {
        self.unparseable_dates + self.missing_category + self.unconverged_fits
    }
}

#[derive(Debug)]
pub struct SeriesOutcome {
    /// `None` for the un-partitioned (overall) series.
    pub category: Option<String>,
    pub series: BucketedSeries,
    /// `None` when the fit did not converge; the series is still reported.
    pub fit: Option<FitOutcome>,
}

impl SeriesOutcome {
    pub fn name(&self) -> &str {
        self.category.as_deref().unwrap_or("all")
    }
}

#[derive(Debug)]
pub struct AnalysisResult {
    pub total_records: usize,
    pub date_range: Option<(NaiveDate, NaiveDate)>,
    pub outcomes: Vec<SeriesOutcome>,
    pub drops: DropSummary,
}
