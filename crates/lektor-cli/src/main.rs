// SPDX-License-Identifier: PMPL-1.0-or-later
// Copyright (c) 2026 Jonathan D.A. Jewell (hyperpolymath) <jonathan.jewell@open.ac.uk>
//
// Lektor: command-line front end.
//
// Initialises logging, loads configuration, picks the recognition backend
// compiled into this build, and runs the requested extractions on the
// worker pool.

use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::Arc;

use clap::{Args, Parser, Subcommand};
use lektor_core::config::ExtractionConfig;
use lektor_core::error::LektorError;
use lektor_document::RecognitionBackend;
use lektor_pipeline::{ExtractionPool, ExtractionRequest, Extractor, PoolResult};
use lektor_text::GazetteerRecognizer;
use tracing::{error, info, warn};

#[derive(Parser)]
#[command(
    name = "lektor",
    version,
    about = "Quality-adaptive text extraction from scans and PDFs"
)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Extract text from one or more images or PDFs
    Extract(ExtractArgs),
}

#[derive(Args)]
struct ExtractArgs {
    /// Documents to process
    #[arg(required = true)]
    files: Vec<PathBuf>,

    /// Source language (ISO 639-1) or "auto"
    #[arg(long)]
    lang: Option<String>,

    /// Skip rule-based and model correction
    #[arg(long)]
    no_enhance: bool,

    /// Print one JSON report per document instead of plain text
    #[arg(long)]
    json: bool,

    /// JSON configuration file; missing fields take their defaults
    #[arg(long)]
    config: Option<PathBuf>,

    /// Directory holding the OCR model files
    #[arg(long)]
    models_dir: Option<PathBuf>,

    /// JSON list of known names used to re-case entities
    #[arg(long)]
    gazetteer: Option<PathBuf>,

    /// Maximum documents processed at once
    #[arg(long)]
    workers: Option<usize>,

    /// Per-document timeout in seconds (0 disables it)
    #[arg(long)]
    timeout_secs: Option<u64>,
}

#[tokio::main]
async fn main() -> ExitCode {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with_writer(std::io::stderr)
        .init();

    let cli = Cli::parse();
    let outcome = match cli.command {
        Command::Extract(args) => run_extract(args).await,
    };

    match outcome {
        Ok(true) => ExitCode::SUCCESS,
        Ok(false) => ExitCode::from(1),
        Err(err) => {
            error!(error = %err, "lektor failed");
            ExitCode::from(2)
        }
    }
}

/// Returns whether every document was extracted.
async fn run_extract(args: ExtractArgs) -> Result<bool, LektorError> {
    let mut config = match &args.config {
        Some(path) => ExtractionConfig::from_json_file(path)?,
        None => ExtractionConfig::default(),
    };
    if let Some(workers) = args.workers {
        config.pool.max_concurrent = workers;
    }
    if let Some(secs) = args.timeout_secs {
        config.pool.timeout_secs = (secs > 0).then_some(secs);
    }
    config.validate()?;

    let backend = recognition_backend(&config, args.models_dir.as_deref());
    let mut extractor = Extractor::new(config.clone(), backend);
    if let Some(path) = &args.gazetteer {
        let recognizer = GazetteerRecognizer::from_json(&std::fs::read_to_string(path)?)?;
        info!(names = recognizer.len(), "Gazetteer loaded");
        extractor = extractor.with_entity_recognizer(Arc::new(recognizer));
    }

    let requests: Vec<ExtractionRequest> = args
        .files
        .iter()
        .map(|path| {
            let request = ExtractionRequest::for_path(path).with_enhance(!args.no_enhance);
            match &args.lang {
                Some(lang) => request.with_language(lang.as_str()),
                None => request,
            }
        })
        .collect();

    let pool = ExtractionPool::new(Arc::new(extractor), &config.pool);
    let mut rx = pool.extract_all(requests);
    let mut results: Vec<PoolResult> = Vec::with_capacity(args.files.len());
    while let Some(result) = rx.recv().await {
        results.push(result);
    }
    results.sort_by_key(|result| result.index);

    let mut all_ok = true;
    for result in results {
        all_ok &= print_result(&result, args.json)?;
    }

    let stats = pool.stats();
    info!(
        completed = stats.completed,
        failed = stats.failed,
        timed_out = stats.timed_out,
        "Batch finished"
    );
    Ok(all_ok)
}

fn print_result(result: &PoolResult, json: bool) -> Result<bool, LektorError> {
    match (&result.outcome, json) {
        (Ok(report), true) => {
            let line = serde_json::json!({ "file": result.label, "report": report });
            println!("{}", serde_json::to_string(&line)?);
            Ok(true)
        }
        (Ok(report), false) => {
            println!(
                "== {} (confidence {:.2}) ==",
                result.label, report.result.confidence
            );
            println!("{}", report.result.text);
            Ok(true)
        }
        (Err(err), true) => {
            let line = serde_json::json!({ "file": result.label, "error": err.to_string() });
            println!("{}", serde_json::to_string(&line)?);
            Ok(false)
        }
        (Err(err), false) => {
            error!(file = result.label.as_str(), error = %err, "Extraction failed");
            Ok(false)
        }
    }
}

/// The recognition engine compiled into this build.
#[cfg_attr(not(feature = "ocr"), allow(unused_variables))]
fn recognition_backend(
    config: &ExtractionConfig,
    models_dir: Option<&Path>,
) -> Arc<dyn RecognitionBackend> {
    #[cfg(feature = "ocr")]
    {
        use lektor_document::OcrConfig;

        let ocr_config = models_dir
            .map(OcrConfig::from_dir)
            .unwrap_or_default()
            .with_assumed_confidence(config.recognition.assumed_word_confidence);
        match lektor_document::OcrEngine::new(ocr_config) {
            Ok(engine) => return Arc::new(engine),
            Err(err) => warn!(error = %err, "ocrs backend unavailable"),
        }
    }

    fallback_backend()
}

#[cfg(feature = "tesseract")]
fn fallback_backend() -> Arc<dyn RecognitionBackend> {
    info!("Using Tesseract recognition backend");
    Arc::new(lektor_document::TesseractBackend::new(None))
}

#[cfg(not(feature = "tesseract"))]
fn fallback_backend() -> Arc<dyn RecognitionBackend> {
    warn!("No recognition engine available; scanned pages will fail");
    Arc::new(lektor_document::UnavailableBackend)
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn cli_definition_is_consistent() {
        Cli::command().debug_assert();
    }

    #[test]
    fn parses_extract_flags() {
        let cli = Cli::try_parse_from([
            "lektor",
            "extract",
            "a.png",
            "b.pdf",
            "--lang",
            "fr",
            "--no-enhance",
            "--json",
            "--workers",
            "2",
            "--timeout-secs",
            "0",
        ])
        .expect("parse");
        let Command::Extract(args) = cli.command;
        assert_eq!(args.files.len(), 2);
        assert_eq!(args.lang.as_deref(), Some("fr"));
        assert!(args.no_enhance);
        assert!(args.json);
        assert_eq!(args.workers, Some(2));
        assert_eq!(args.timeout_secs, Some(0));
    }

    #[test]
    fn extract_requires_a_file() {
        assert!(Cli::try_parse_from(["lektor", "extract"]).is_err());
    }
}
