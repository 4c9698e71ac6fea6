pub mod aggregate;
pub mod analysis;
pub mod args;
pub mod chart;
pub mod config;
pub mod extract;
pub mod fit;
pub mod loader;
pub mod report;
pub mod rules;
pub mod stats;
pub mod table;
pub mod utils;

pub use aggregate::{bucket, partition_by_category, BucketedSeries, TimeUnit};
pub use analysis::run_analysis;
pub use args::Cli;
pub use config::AnalysisConfig;
pub use fit::{fit, predict, FitError, FitOutcome, GrowthModelKind, GrowthParams};
pub use stats::{AnalysisResult, DropSummary};
pub use table::{Record, Table, Value};
