use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};
use std::time::Instant;
use tracing::{info, warn};

use crate::rules::{apply_rules, FieldRule};

/// Text-extraction capability; the PDF parser behind it is a black box.
pub trait TextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String>;
}

/// Default extractor for digital-native PDFs. Scanned documents come back
/// empty; no OCR is attempted.
pub struct PdfTextExtractor;

impl TextExtractor for PdfTextExtractor {
    fn extract_text(&self, bytes: &[u8]) -> Result<String> {
        let text =
            pdf_extract::extract_text_from_mem(bytes).context("failed to extract text from PDF")?;
        Ok(text)
    }
}

/// Keyword-extraction capability. Returns phrases ordered by relevance,
/// best first. There is no default implementation; the original pipeline
/// delegates this to an external model.
pub trait KeywordExtractor {
    fn extract_keywords(&self, text: &str, ngram_range: (usize, usize)) -> Vec<(String, f64)>;
}

#[derive(Debug)]
pub struct ExtractedRow {
    pub file: String,
    /// One entry per rule, in rule order; `None` when the rule did not match.
    pub fields: Vec<Option<String>>,
    pub text_chars: usize,
    pub top_keyword: Option<(String, f64)>,
}

#[derive(Debug, Default)]
pub struct ExtractionBatch {
    pub rows: Vec<ExtractedRow>,
    /// Files that could not be read or parsed; logged and skipped.
    pub failed: u32,
}

pub struct PdfExtractor<'a> {
    rules: &'a [FieldRule],
    text_extractor: &'a dyn TextExtractor,
    keyword_extractor: Option<&'a dyn KeywordExtractor>,
    ngram_range: (usize, usize),
}

impl<'a> PdfExtractor<'a> {
    pub fn new(
        rules: &'a [FieldRule],
        text_extractor: &'a dyn TextExtractor,
        keyword_extractor: Option<&'a dyn KeywordExtractor>,
        ngram_range: (usize, usize),
    ) -> Self {
        PdfExtractor {
            rules,
            text_extractor,
            keyword_extractor,
            ngram_range,
        }
    }

    /// Process every PDF in a directory, best-effort: a file that fails to
    /// read or parse is logged, counted, and skipped. A missing input
    /// directory aborts the batch.
    pub fn extract_all(&self, input_dir: &Path) -> Result<ExtractionBatch> {
        let start_time = Instant::now();
        info!(action = "start", component = "pdf_extraction", input_dir = ?input_dir, "Starting PDF extraction");

        if !input_dir.is_dir() {
            anyhow::bail!("Input directory not found: {:?}", input_dir);
        }

        let mut paths: Vec<PathBuf> = fs::read_dir(input_dir)
            .with_context(|| format!("Failed to list input directory {:?}", input_dir))?
            .filter_map(|entry| entry.ok().map(|e| e.path()))
            .filter(|path| {
                path.extension()
                    .and_then(|ext| ext.to_str())
                    .is_some_and(|ext| ext.eq_ignore_ascii_case("pdf"))
            })
            .collect();
        paths.sort();

        let mut batch = ExtractionBatch::default();
        for path in &paths {
            match self.extract_file(path) {
                Ok(row) => batch.rows.push(row),
                Err(e) => {
                    warn!(component = "pdf_extraction", file = ?path, error = %e, "Skipping file");
                    batch.failed += 1;
                }
            }
        }

        info!(
            action = "complete",
            component = "pdf_extraction",
            processed = batch.rows.len(),
            failed = batch.failed,
            duration_ms = start_time.elapsed().as_millis(),
            "PDF extraction completed"
        );
        Ok(batch)
    }

    pub fn extract_file(&self, path: &Path) -> Result<ExtractedRow> {
        let bytes = fs::read(path).with_context(|| format!("Failed to read {:?}", path))?;
        let text = self.text_extractor.extract_text(&bytes)?;

        let fields = apply_rules(self.rules, &text)
            .into_iter()
            .map(|(_, value)| value)
            .collect();

        let top_keyword = self
            .keyword_extractor
            .and_then(|kw| kw.extract_keywords(&text, self.ngram_range).into_iter().next());

        Ok(ExtractedRow {
            file: path
                .file_name()
                .map(|name| name.to_string_lossy().into_owned())
                .unwrap_or_default(),
            fields,
            text_chars: text.chars().count(),
            top_keyword,
        })
    }
}

/// Write one CSV row per extracted document: file name, one column per
/// rule, text length, and the best-scoring keyword.
pub fn write_extraction_csv(
    batch: &ExtractionBatch,
    rules: &[FieldRule],
    path: &Path,
) -> Result<()> {
    let mut writer =
        csv::Writer::from_path(path).with_context(|| format!("Failed to create {:?}", path))?;

    let mut header = vec!["file".to_string()];
    header.extend(rules.iter().map(|rule| rule.name.clone()));
    header.push("text_chars".to_string());
    header.push("top_keyword".to_string());
    header.push("keyword_score".to_string());
    writer.write_record(&header)?;

    for row in &batch.rows {
        let mut record = vec![row.file.clone()];
        record.extend(
            row.fields
                .iter()
                .map(|field| field.clone().unwrap_or_default()),
        );
        record.push(row.text_chars.to_string());
        match &row.top_keyword {
            Some((phrase, score)) => {
                record.push(phrase.clone());
                record.push(format!("{:.4}", score));
            }
            None => {
                record.push(String::new());
                record.push(String::new());
            }
        }
        writer.write_record(&record)?;
    }

    writer.flush()?;
    info!(
        action = "write",
        component = "pdf_extraction",
        output = ?path,
        row_count = batch.rows.len(),
        "Extraction table written"
    );
    Ok(())
}
