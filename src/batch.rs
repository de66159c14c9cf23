// src/batch.rs
//! Directory-wide extraction.
//!
//! Markup filings are processed before plain-text ones so that a text filing
//! whose HTML sibling already produced output is skipped.

use crate::edgar::FilingIdentity;
use crate::extractors::decode::decode_document;
use crate::extractors::{Extraction, ExtractionResult, Extractor, NotFound, SourceKind};
use crate::render::Renderer;
use crate::storage::StorageManager;
use crate::utils::error::AppError;
use crate::utils::html_debug;
use glob::MatchOptions;
use serde::Serialize;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::sync::Semaphore;

const MARKUP_PATTERNS: &[&str] = &["**/*.htm", "**/*.html"];
const PLAIN_PATTERNS: &[&str] = &["**/*.txt"];

/// What happened to one filing.
#[derive(Debug, Clone, PartialEq)]
pub enum Outcome {
    Written(PathBuf),
    Skipped(PathBuf),
    Empty,
    NotFound(NotFound),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct BatchReport {
    pub processed: usize,
    pub skipped: usize,
    pub not_found: usize,
    pub failed: usize,
}

impl BatchReport {
    fn record(&mut self, outcome: &Outcome) {
        match outcome {
            Outcome::Written(_) => self.processed += 1,
            Outcome::Skipped(_) | Outcome::Empty => self.skipped += 1,
            Outcome::NotFound(_) => self.not_found += 1,
        }
    }

    fn merge(&mut self, other: BatchReport) {
        self.processed += other.processed;
        self.skipped += other.skipped;
        self.not_found += other.not_found;
        self.failed += other.failed;
    }
}

/// Filings found under a root, split by source kind and sorted.
#[derive(Debug, Default)]
pub struct Discovered {
    pub markup: Vec<PathBuf>,
    pub plain: Vec<PathBuf>,
}

pub fn discover(root: &Path) -> Result<Discovered, AppError> {
    if !root.is_dir() {
        return Err(AppError::Config(format!("Input directory not found: {}", root.display())));
    }
    Ok(Discovered {
        markup: glob_files(root, MARKUP_PATTERNS)?,
        plain: glob_files(root, PLAIN_PATTERNS)?,
    })
}

fn glob_files(root: &Path, patterns: &[&str]) -> Result<Vec<PathBuf>, AppError> {
    let options = MatchOptions { case_sensitive: false, ..MatchOptions::new() };
    let mut files = Vec::new();
    for pattern in patterns {
        let full = root.join(pattern);
        let entries = glob::glob_with(&full.to_string_lossy(), options)
            .map_err(|e| AppError::Config(format!("Invalid glob pattern '{}': {}", full.display(), e)))?;
        for entry in entries {
            match entry {
                Ok(path) if path.is_file() => files.push(path),
                Ok(_) => {}
                Err(e) => tracing::warn!("Unreadable path during discovery: {}", e),
            }
        }
    }
    files.sort();
    files.dedup();
    Ok(files)
}

/// Everything needed to turn one filing on disk into output files.
pub struct Pipeline {
    extractor: Extractor,
    storage: StorageManager,
    renderer: Option<Box<dyn Renderer>>,
    debug: bool,
}

impl Pipeline {
    pub fn new(extractor: Extractor, storage: StorageManager) -> Self {
        Self { extractor, storage, renderer: None, debug: false }
    }

    pub fn with_renderer(mut self, renderer: Box<dyn Renderer>) -> Self {
        self.renderer = Some(renderer);
        self
    }

    pub fn with_debug(mut self, debug: bool) -> Self {
        self.debug = debug;
        self
    }

    pub fn process_file(&self, path: &Path) -> Result<Outcome, AppError> {
        let kind = SourceKind::from_path(path)
            .ok_or_else(|| AppError::Config(format!("Unsupported file type: {}", path.display())))?;
        tracing::info!("Processing {}", path.display());

        let raw = fs::read(path)?;
        if raw.iter().all(u8::is_ascii_whitespace) {
            tracing::warn!("Empty file: {}", path.display());
            return Ok(Outcome::Empty);
        }
        let text = decode_document(&raw)?;

        let identity = FilingIdentity::resolve(path, &text);
        let prefix = identity.output_prefix();
        if let Some(existing) = self.storage.existing_output(&prefix, kind) {
            tracing::info!("Output already exists, skipping {}: {}", path.display(), existing.display());
            return Ok(Outcome::Skipped(existing));
        }

        if self.debug {
            self.write_annotation(&text, kind, &prefix);
        }

        match self.extractor.extract_text(&text, kind) {
            Extraction::NotFound(reason) => {
                tracing::info!("No MD&A found in {}: {}", path.display(), reason);
                Ok(Outcome::NotFound(reason))
            }
            Extraction::Found(result) => {
                let written = self.persist(&prefix, &result)?;
                self.storage.save_tables(&identity, path, &result)?;
                tracing::info!("Extracted MD&A ({} tables) -> {}", result.tables.len(), written.display());
                Ok(Outcome::Written(written))
            }
        }
    }

    fn persist(&self, prefix: &str, result: &ExtractionResult) -> Result<PathBuf, AppError> {
        let Some(document) = &result.rendered_document else {
            return Ok(self.storage.save_text(prefix, &result.section_text)?);
        };

        if let Some(renderer) = &self.renderer {
            let pdf = self.storage.pdf_path(prefix);
            match renderer.render(document, &pdf) {
                Ok(()) => return Ok(pdf),
                Err(e) => tracing::error!("{} failed, saving HTML instead: {}", renderer.name(), e),
            }
        }
        Ok(self.storage.save_html(prefix, document)?)
    }

    fn write_annotation(&self, text: &str, kind: SourceKind, prefix: &str) {
        let debug_dir = self.storage.base_dir().join("debug");
        if let Err(e) = fs::create_dir_all(&debug_dir) {
            tracing::warn!("Failed to create debug directory: {}", e);
            return;
        }
        let canonical = self.extractor.canonical_text(text, kind);
        let path = debug_dir.join(format!("{}_annotated.html", prefix));
        if let Err(e) = html_debug::create_debug_html(&canonical, &path, self.extractor.matcher()) {
            tracing::warn!("Failed to create debug HTML: {}", e);
        }
    }
}

/// Processes markup filings, then plain-text filings, at most `jobs` at a time.
pub async fn run(pipeline: Arc<Pipeline>, discovered: Discovered, jobs: usize) -> BatchReport {
    tracing::info!(
        "Found {} markup and {} plain-text filings",
        discovered.markup.len(),
        discovered.plain.len()
    );
    let mut report = BatchReport::default();
    for wave in [discovered.markup, discovered.plain] {
        report.merge(run_wave(&pipeline, wave, jobs).await);
    }
    tracing::info!(
        "Processing complete. Processed: {}, Skipped: {}, Not found: {}, Errors: {}",
        report.processed,
        report.skipped,
        report.not_found,
        report.failed
    );
    report
}

async fn run_wave(pipeline: &Arc<Pipeline>, files: Vec<PathBuf>, jobs: usize) -> BatchReport {
    let semaphore = Arc::new(Semaphore::new(jobs.max(1)));
    let mut handles = Vec::with_capacity(files.len());

    for path in files {
        let permit = match Arc::clone(&semaphore).acquire_owned().await {
            Ok(permit) => permit,
            Err(e) => {
                tracing::error!("Worker pool closed: {}", e);
                break;
            }
        };
        let pipeline = Arc::clone(pipeline);
        handles.push(tokio::task::spawn_blocking(move || {
            let _permit = permit;
            let outcome = pipeline.process_file(&path);
            (path, outcome)
        }));
    }

    let mut report = BatchReport::default();
    for handle in handles {
        match handle.await {
            Ok((_, Ok(outcome))) => report.record(&outcome),
            Ok((path, Err(e))) => {
                tracing::error!("Error processing {}: {}", path.display(), e);
                report.failed += 1;
            }
            Err(e) => {
                tracing::error!("Worker task failed: {}", e);
                report.failed += 1;
            }
        }
    }
    report
}
