use std::path::PathBuf;

use crate::aggregate::TimeUnit;

/// Everything the pipeline needs to know about its input, passed in
/// explicitly; there are no ambient path or sheet-name constants.
#[derive(Debug, Clone)]
pub struct AnalysisConfig {
    pub source_path: PathBuf,
    /// Sheets to load; empty means every sheet in the workbook.
    pub sheet_names: Vec<String>,
    pub date_field: String,
    /// When set, the table is partitioned by this column. When unset and
    /// several sheets are loaded, each sheet is treated as its own category.
    pub category_field: Option<String>,
    pub time_unit: TimeUnit,
    pub include_empty_buckets: bool,
}
