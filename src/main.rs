use anyhow::Result;
use clap::Parser;
use tracing::{error, warn};

use patentee::args::{AnalyzeArgs, Cli, Commands, ExtractArgs};
use patentee::extract::{PdfExtractor, PdfTextExtractor};
use patentee::report::OutputOptions;
use patentee::utils::format_number;
use patentee::{analysis, extract, report, rules, utils};

fn main() {
    let cli = Cli::parse();
    utils::setup_logging(cli.verbose);

    let outcome = match &cli.command {
        Commands::Analyze(args) => run_analyze(args),
        Commands::Extract(args) => run_extract(args),
    };

    if let Err(e) = outcome {
        error!(error = %e, "Run failed");
        eprintln!("Error: {:#}", e);
        std::process::exit(1);
    }
}

fn run_analyze(args: &AnalyzeArgs) -> Result<()> {
    args.validate()?;

    let config = args.config();
    let result = analysis::run_analysis(&config, args.model)?;

    let opts = OutputOptions {
        out_dir: args.output.clone(),
        charts: !args.no_charts,
        horizon: args.horizon,
        samples: args.samples,
    };
    report::write_outputs(&result, &opts)?;
    report::print_summary(&result, args.model);
    Ok(())
}

fn run_extract(args: &ExtractArgs) -> Result<()> {
    args.validate()?;

    let rules = match &args.rules {
        Some(path) => rules::load_field_rules(path)?,
        None => {
            warn!(
                component = "pdf_extraction",
                "No rules file given; only file name, text length and keyword columns will be filled"
            );
            Vec::new()
        }
    };

    let text_extractor = PdfTextExtractor;
    // Keyword extraction is an external capability with no bundled
    // implementation; rows carry empty keyword columns without one.
    let extractor = PdfExtractor::new(
        &rules,
        &text_extractor,
        None,
        (args.min_ngram, args.max_ngram),
    );

    let batch = extractor.extract_all(&args.input)?;
    extract::write_extraction_csv(&batch, &rules, &args.output)?;

    println!("\n--- Patent PDF Extraction ---");
    println!("Documents processed: {}", format_number(batch.rows.len() as u32));
    println!("Documents skipped: {}", format_number(batch.failed));
    println!("Output: {}", args.output.display());
    Ok(())
}
