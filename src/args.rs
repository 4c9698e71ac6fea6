use anyhow::Result;
use clap::{Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::aggregate::TimeUnit;
use crate::config::AnalysisConfig;
use crate::fit::GrowthModelKind;

#[derive(Parser, Debug)]
#[command(
    name = "patentee",
    about = "Analyze patent application datasets: bucketed counts and S-curve growth fits",
    version,
    long_about = None
)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Bucket applications over time and fit growth curves
    Analyze(AnalyzeArgs),
    /// Extract fields and keywords from a directory of patent PDFs
    Extract(ExtractArgs),
}

#[derive(ClapArgs, Debug)]
pub struct AnalyzeArgs {
    /// Path to the source workbook (.xlsx)
    #[arg(short, long)]
    pub source: PathBuf,

    /// Sheet to load; repeat for several sheets, omit for all
    #[arg(short = 'S', long = "sheet")]
    pub sheets: Vec<String>,

    /// Column holding the application date
    #[arg(long, default_value = "application_date")]
    pub date_field: String,

    /// Column holding the category label (e.g. a CPC code); partitions the analysis
    #[arg(long)]
    pub category_field: Option<String>,

    /// Bucketing granularity
    #[arg(short, long, value_enum, default_value_t = TimeUnit::Year)]
    pub unit: TimeUnit,

    /// Growth model to fit
    #[arg(short, long, value_enum, default_value_t = GrowthModelKind::Logistic)]
    pub model: GrowthModelKind,

    /// Emit zero-count buckets between the first and last occupied period
    #[arg(long)]
    pub include_empty_buckets: bool,

    /// Directory for derived CSV tables and charts
    #[arg(short, long, default_value = "out")]
    pub output: PathBuf,

    /// Extend fitted curves this many buckets past the observed range
    #[arg(long, default_value_t = 0)]
    pub horizon: usize,

    /// Sample points along each fitted curve
    #[arg(long, default_value_t = 100)]
    pub samples: usize,

    /// Skip chart rendering
    #[arg(long)]
    pub no_charts: bool,
}

impl AnalyzeArgs {
    pub fn validate(&self) -> Result<()> {
        if self.samples == 0 {
            anyhow::bail!("--samples must be greater than 0");
        }
        if let Some(field) = &self.category_field {
            if field.trim().is_empty() {
                anyhow::bail!("--category-field must not be blank");
            }
        }
        Ok(())
    }

    pub fn config(&self) -> AnalysisConfig {
        AnalysisConfig {
            source_path: self.source.clone(),
            sheet_names: self.sheets.clone(),
            date_field: self.date_field.clone(),
            category_field: self.category_field.clone(),
            time_unit: self.unit,
            include_empty_buckets: self.include_empty_buckets,
        }
    }
}

#[derive(ClapArgs, Debug)]
pub struct ExtractArgs {
    /// Directory of patent PDF files
    #[arg(short, long)]
    pub input: PathBuf,

    /// Field extraction rules file (`name = regex` per line)
    #[arg(short, long)]
    pub rules: Option<PathBuf>,

    /// Output CSV path
    #[arg(short, long, default_value = "extracted_data.csv")]
    pub output: PathBuf,

    /// Smallest keyword phrase length, in words
    #[arg(long, default_value_t = 1)]
    pub min_ngram: usize,

    /// Largest keyword phrase length, in words
    #[arg(long, default_value_t = 3)]
    pub max_ngram: usize,
}

impl ExtractArgs {
    pub fn validate(&self) -> Result<()> {
        if self.min_ngram == 0 {
            anyhow::bail!("--min-ngram must be greater than 0");
        }
        if self.min_ngram > self.max_ngram {
            anyhow::bail!("--min-ngram must not exceed --max-ngram");
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn analyze_args_build_the_config_record() {
        let cli = Cli::parse_from([
            "patentee",
            "analyze",
            "--source",
            "data.xlsx",
            "--sheet",
            "AI",
            "--sheet",
            "Laser",
            "--unit",
            "month",
            "--category-field",
            "cpc",
        ]);
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze subcommand");
        };
        let config = args.config();
        assert_eq!(config.sheet_names, vec!["AI", "Laser"]);
        assert_eq!(config.time_unit, TimeUnit::Month);
        assert_eq!(config.category_field.as_deref(), Some("cpc"));
        assert_eq!(config.date_field, "application_date");
        assert!(!config.include_empty_buckets);
    }

    #[test]
    fn ngram_bounds_are_validated() {
        let cli = Cli::parse_from([
            "patentee",
            "extract",
            "--input",
            "pdfs",
            "--min-ngram",
            "4",
            "--max-ngram",
            "2",
        ]);
        let Commands::Extract(args) = cli.command else {
            panic!("expected extract subcommand");
        };
        assert!(args.validate().is_err());
    }

    #[test]
    fn samples_must_be_positive() {
        let cli = Cli::parse_from([
            "patentee",
            "analyze",
            "--source",
            "data.xlsx",
            "--samples",
            "0",
        ]);
        let Commands::Analyze(args) = cli.command else {
            panic!("expected analyze subcommand");
        };
        assert!(args.validate().is_err());
    }
}
