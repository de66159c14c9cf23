// src/extractors/section.rs
//! One document in, one MD&A extraction out.

use crate::extractors::assemble::{format_text_tables, render_document};
use crate::extractors::boundary::{BoundaryMatcher, NotFound, PatternSet, SectionSpan, MIN_SECTION_CHARS};
use crate::extractors::decode::decode_document;
use crate::extractors::flow::MarkupFlow;
use crate::extractors::normalize::{clean_markup, clean_plain};
use crate::extractors::tables::{Table, TableReconstructor};
use crate::utils::error::ExtractError;
use once_cell::sync::Lazy;
use scraper::Html;
use serde::Serialize;
use std::path::Path;

static DEFAULT_EXTRACTOR: Lazy<Extractor> = Lazy::new(Extractor::default);

// Passes that open containers straddling the section edge; each pass goes one level deeper.
const MAX_REOPEN_ROUNDS: usize = 4;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceKind {
    Markup,
    PlainText,
}

impl SourceKind {
    /// `.htm`/`.html` are markup, `.txt` is plain text (even when the text
    /// file happens to start with tags), anything else is unsupported.
    pub fn from_path(path: &Path) -> Option<Self> {
        let ext = path.extension()?.to_str()?.to_ascii_lowercase();
        match ext.as_str() {
            "htm" | "html" => Some(SourceKind::Markup),
            "txt" => Some(SourceKind::PlainText),
            _ => None,
        }
    }
}

#[derive(Debug, Clone)]
pub struct ExtractorConfig {
    pub min_section_chars: usize,
}

impl Default for ExtractorConfig {
    fn default() -> Self {
        Self { min_section_chars: MIN_SECTION_CHARS }
    }
}

/// The extracted section and the tables recovered from it.
#[derive(Debug, Clone, Serialize)]
pub struct ExtractionResult {
    pub source_kind: SourceKind,
    /// Canonical section text for markup sources, reformatted text for plain text.
    pub section_text: String,
    /// Styled HTML document; markup sources only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub rendered_document: Option<String>,
    pub tables: Vec<Table>,
}

#[derive(Debug, Clone)]
pub enum Extraction {
    Found(ExtractionResult),
    NotFound(NotFound),
}

impl Extraction {
    pub fn found(self) -> Option<ExtractionResult> {
        match self {
            Extraction::Found(result) => Some(result),
            Extraction::NotFound(_) => None,
        }
    }
}

/// Stateless apart from its compiled patterns; one instance serves every worker.
pub struct Extractor {
    matcher: BoundaryMatcher,
    reconstructor: TableReconstructor,
}

impl Extractor {
    pub fn new(config: ExtractorConfig) -> Self {
        Self::with_parts(
            BoundaryMatcher::new(PatternSet::item_7(), config.min_section_chars),
            TableReconstructor::default(),
        )
    }

    pub fn with_parts(matcher: BoundaryMatcher, reconstructor: TableReconstructor) -> Self {
        Self { matcher, reconstructor }
    }

    pub fn matcher(&self) -> &BoundaryMatcher {
        &self.matcher
    }

    /// Decodes raw bytes and extracts the section. Only decoding can fail;
    /// a missing section is reported as [`Extraction::NotFound`].
    pub fn extract(&self, raw: &[u8], kind: SourceKind) -> Result<Extraction, ExtractError> {
        let text = decode_document(raw)?;
        Ok(self.extract_text(&text, kind))
    }

    pub fn extract_text(&self, text: &str, kind: SourceKind) -> Extraction {
        match kind {
            SourceKind::Markup => self.extract_markup(text),
            SourceKind::PlainText => self.extract_plain(text),
        }
    }

    /// The text boundary matching runs over, as used for debug annotation.
    pub fn canonical_text(&self, text: &str, kind: SourceKind) -> String {
        match kind {
            SourceKind::Markup => {
                let document = Html::parse_document(&clean_markup(text));
                let (flow, _) = self.resolve_markup(&document);
                flow.text().to_string()
            }
            SourceKind::PlainText => clean_plain(text),
        }
    }

    fn locate(&self, text: &str) -> Result<SectionSpan, NotFound> {
        let span = self.matcher.locate(text);
        match &span {
            Ok(span) => tracing::debug!("Section span {}..{}", span.start, span.end),
            Err(reason) => tracing::debug!("Section not found: {}", reason),
        }
        span
    }

    /// Builds the flow and locates the section, opening any `<pre>`, table or
    /// monospace container the section boundary falls inside of.
    fn resolve_markup(&self, document: &Html) -> (MarkupFlow, Result<SectionSpan, NotFound>) {
        let mut flow = MarkupFlow::from_document(document);
        tracing::debug!("Markup flow: {} blocks, {} chars", flow.blocks().len(), flow.text().len());

        let mut span = match self.locate(flow.text()) {
            Ok(span) => span,
            Err(reason) => return (flow, Err(reason)),
        };
        for _ in 0..MAX_REOPEN_ROUNDS {
            let containers = flow.containers_around(&span);
            if containers.is_empty() {
                break;
            }
            tracing::debug!("Opening {} containers around the section boundary", containers.len());
            let reopened = flow.reopen(document, &containers);
            match self.locate(reopened.text()) {
                Ok(next) => {
                    flow = reopened;
                    span = next;
                }
                Err(_) => break,
            }
        }
        (flow, Ok(span))
    }

    fn extract_markup(&self, html: &str) -> Extraction {
        let document = Html::parse_document(&clean_markup(html));
        let (flow, span) = self.resolve_markup(&document);
        let span = match span {
            Ok(span) => span,
            Err(reason) => return Extraction::NotFound(reason),
        };

        let fragment = Html::parse_fragment(&flow.section_fragment(&span));
        let tables = self.reconstructor.reconstruct(&fragment);
        let rendered = render_document(&flow.section_prose(&span), &tables);

        Extraction::Found(ExtractionResult {
            source_kind: SourceKind::Markup,
            section_text: span.slice(flow.text()).to_string(),
            rendered_document: Some(rendered),
            tables,
        })
    }

    fn extract_plain(&self, text: &str) -> Extraction {
        let cleaned = clean_plain(text);
        let span = match self.locate(&cleaned) {
            Ok(span) => span,
            Err(reason) => return Extraction::NotFound(reason),
        };

        let (section_text, tables) = format_text_tables(span.slice(&cleaned));
        Extraction::Found(ExtractionResult {
            source_kind: SourceKind::PlainText,
            section_text,
            rendered_document: None,
            tables,
        })
    }
}

impl Default for Extractor {
    fn default() -> Self {
        Self::new(ExtractorConfig::default())
    }
}

/// Extracts with the built-in patterns and default thresholds.
pub fn extract_section(raw: &[u8], kind: SourceKind) -> Result<Extraction, ExtractError> {
    DEFAULT_EXTRACTOR.extract(raw, kind)
}
