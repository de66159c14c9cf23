// src/main.rs
use clap::Parser;
use mdna_extractor::batch::{self, Pipeline};
use mdna_extractor::extractors::boundary::MIN_SECTION_CHARS;
use mdna_extractor::extractors::{Extractor, ExtractorConfig};
use mdna_extractor::render::{WkhtmltopdfRenderer, DEFAULT_WKHTMLTOPDF};
use mdna_extractor::storage::StorageManager;
use mdna_extractor::utils::{self, AppError};
use std::path::PathBuf;
use std::sync::Arc;

/// Extracts the MD&A section (Item 7) from downloaded 10-K filings
#[derive(Parser, Debug)]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Root directory of downloaded filings (.htm, .html, .txt), searched recursively
    #[arg(short, long)]
    input_dir: PathBuf,

    /// Output directory for extracted content
    #[arg(short, long, env = "MDNA_OUTPUT_DIR", default_value = "./mdna_output")]
    output_dir: PathBuf,

    /// Number of filings processed concurrently
    #[arg(short, long, default_value_t = 4)]
    jobs: usize,

    /// Minimum section length in characters; shorter matches are treated as not found
    #[arg(long, env = "MDNA_MIN_SECTION_CHARS", default_value_t = MIN_SECTION_CHARS)]
    min_section_chars: usize,

    /// Path to the wkhtmltopdf binary
    #[arg(long, env = "MDNA_WKHTMLTOPDF", default_value = DEFAULT_WKHTMLTOPDF)]
    wkhtmltopdf: PathBuf,

    /// Skip PDF rendering and write the styled HTML document
    #[arg(long)]
    no_pdf: bool,

    /// Debug mode - save annotated canonical text with boundary markers highlighted
    #[arg(short, long)]
    debug: bool,
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    let args = Args::parse();
    utils::logging::setup_logging(if args.debug { "debug" } else { "info" });
    tracing::info!("Starting processing for args: {:?}", args);

    if args.min_section_chars == 0 {
        return Err(AppError::Config("--min-section-chars must be at least 1".to_string()));
    }

    let discovered = batch::discover(&args.input_dir)?;
    if discovered.markup.is_empty() && discovered.plain.is_empty() {
        return Err(AppError::Config(format!(
            "No .htm, .html or .txt filings found under {}",
            args.input_dir.display()
        )));
    }

    let storage = StorageManager::new(&args.output_dir)?;
    let extractor = Extractor::new(ExtractorConfig { min_section_chars: args.min_section_chars });
    let mut pipeline = Pipeline::new(extractor, storage).with_debug(args.debug);
    if !args.no_pdf {
        pipeline = pipeline.with_renderer(Box::new(WkhtmltopdfRenderer::new(&args.wkhtmltopdf)));
    }

    let report = batch::run(Arc::new(pipeline), discovered, args.jobs).await;

    if report.processed == 0 && report.failed > 0 {
        return Err(AppError::Processing(format!(
            "Failed to extract any MD&A sections ({} filings failed)",
            report.failed
        )));
    }

    Ok(())
}
