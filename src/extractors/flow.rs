// src/extractors/flow.rs
//! Reading order of a parsed filing.
//!
//! The DOM is flattened into blocks: leaf block elements, atomic elements
//! (`<table>`, `<pre>`, monospace-styled blocks), and runs of loose inline content
//! between them. Each block contributes one line of canonical text; blocks are
//! separated by a blank line. Because the offsets of every block are recorded, a span
//! found in the canonical text maps straight back to the markup that produced it.
//!
//! Older filings wrap the whole document in one `<pre>` or a layout `<table>`.
//! Such containers are opened: descended into when they hold block children, split
//! at blank lines otherwise. Containers holding long paragraphs are opened up front;
//! the ones the section boundary cuts through are opened by [`MarkupFlow::reopen`].

use crate::extractors::boundary::SectionSpan;
use crate::extractors::detector;
use crate::extractors::normalize::{collapse_inline, normalize};
use crate::extractors::tables::{fixed_width_style, preformatted_rows};
use ego_tree::NodeId;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Node};
use std::collections::HashSet;

/// Upper bound on DOM nodes visited per document.
pub const MAX_ELEMENTS: usize = 250_000;
/// Nesting depth after which an element is taken whole instead of descended into.
pub const MAX_DEPTH: usize = 256;
/// A table cell or preformatted paragraph this long marks its element as page
/// layout rather than data.
pub const LAYOUT_TEXT_CHARS: usize = 400;

const SKIPPED_TAGS: &[&str] = &[
    "head", "script", "style", "title", "noscript", "meta", "link", "template",
];

const BLOCK_TAGS: &[&str] = &[
    "address", "article", "aside", "blockquote", "body", "center", "dd", "div", "dl", "dt",
    "fieldset", "figure", "footer", "form", "h1", "h2", "h3", "h4", "h5", "h6", "header", "hr",
    "html", "li", "main", "nav", "ol", "p", "pre", "section", "table", "tbody", "td", "tfoot",
    "th", "thead", "tr", "ul",
];

static PARAGRAPH_BREAK_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n[^\S\n]*\n").expect("Failed to compile PARAGRAPH_BREAK_RE")
});

fn is_block(name: &str) -> bool {
    BLOCK_TAGS.contains(&name)
}

// Kept whole even when they contain block-level children.
fn is_atomic(element: ElementRef) -> bool {
    match element.value().name() {
        "table" | "pre" => true,
        "html" | "body" => false,
        _ => fixed_width_style(element),
    }
}

fn has_block_descendant(element: ElementRef) -> bool {
    element
        .descendants()
        .skip(1)
        .filter_map(|node| node.value().as_element())
        .any(|el| is_block(el.name()))
}

/// Text of an element with line structure restored: `<br>` and block
/// boundaries become newlines, table cells are separated by tabs.
pub fn layout_text(element: ElementRef) -> String {
    let mut out = String::new();
    for node in element.descendants() {
        match node.value() {
            Node::Text(text) => {
                let in_script = node
                    .parent()
                    .and_then(|p| p.value().as_element().map(|e| matches!(e.name(), "script" | "style")))
                    .unwrap_or(false);
                if !in_script {
                    out.push_str(&text.text);
                }
            }
            Node::Element(el) => match el.name() {
                "br" | "p" | "div" | "tr" | "li" | "h1" | "h2" | "h3" | "h4" | "h5" | "h6" => {
                    out.push('\n')
                }
                "td" | "th" => out.push('\t'),
                _ => {}
            },
            _ => {}
        }
    }
    out
}

/// Flattens a block's text onto one canonical line.
fn block_line(raw: &str) -> String {
    collapse_inline(&normalize(raw))
}

/// Whether an atomic element is a page-layout container: a table with a
/// paragraph-sized cell, or preformatted text with a long non-tabular paragraph.
fn is_layout_container(element: ElementRef) -> bool {
    if element.value().name() == "table" {
        return element
            .descendants()
            .filter_map(ElementRef::wrap)
            .filter(|el| matches!(el.value().name(), "td" | "th"))
            .any(|cell| block_line(&layout_text(cell)).len() >= LAYOUT_TEXT_CHARS);
    }
    let text = layout_text(element);
    PARAGRAPH_BREAK_RE
        .split(&text)
        .any(|piece| block_line(piece).len() >= LAYOUT_TEXT_CHARS && !detector::is_tabular(piece))
}

/// Preformatted text only counts as a table when the preformatted table pass
/// will recover rows from it; otherwise it reads as prose.
fn preformatted_kind(raw: &str) -> BlockKind {
    if preformatted_rows(raw).is_empty() {
        BlockKind::Prose
    } else {
        BlockKind::Preformatted
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlockKind {
    Prose,
    Table,
    Preformatted,
}

#[derive(Debug, Clone)]
pub struct FlowBlock {
    pub start: usize,
    pub end: usize,
    pub kind: BlockKind,
    pub html: String,
    /// The atomic element this block was taken from, if it can be opened.
    pub node: Option<NodeId>,
}

/// Guards against pathological markup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FlowLimits {
    pub max_elements: usize,
    pub max_depth: usize,
}

impl Default for FlowLimits {
    fn default() -> Self {
        Self { max_elements: MAX_ELEMENTS, max_depth: MAX_DEPTH }
    }
}

/// Canonical text of a markup document plus the block each line came from.
#[derive(Debug, Clone, Default)]
pub struct MarkupFlow {
    text: String,
    blocks: Vec<FlowBlock>,
    limits: FlowLimits,
    opened: HashSet<NodeId>,
    truncated: bool,
}

impl MarkupFlow {
    pub fn from_document(document: &Html) -> Self {
        Self::with_limits(document, FlowLimits::default())
    }

    pub fn with_limits(document: &Html, limits: FlowLimits) -> Self {
        Self::build(document, limits, HashSet::new())
    }

    fn build(document: &Html, limits: FlowLimits, opened: HashSet<NodeId>) -> Self {
        let mut builder = FlowBuilder::new(limits, opened);
        builder.walk(document.root_element(), 0);
        builder.flush();
        if builder.truncated {
            tracing::warn!("Document exceeds {} nodes, remaining content ignored", limits.max_elements);
        }

        let mut flow = MarkupFlow {
            limits,
            truncated: builder.truncated,
            ..MarkupFlow::default()
        };
        for block in builder.blocks {
            if !flow.text.is_empty() {
                flow.text.push_str("\n\n");
            }
            let start = flow.text.len();
            flow.text.push_str(&block.line);
            flow.blocks.push(FlowBlock {
                start,
                end: flow.text.len(),
                kind: block.kind,
                html: block.html,
                node: block.node,
            });
        }
        flow.opened = builder.opened;
        flow
    }

    pub fn text(&self) -> &str {
        &self.text
    }

    pub fn blocks(&self) -> &[FlowBlock] {
        &self.blocks
    }

    /// True when the node limit cut the walk short.
    pub fn truncated(&self) -> bool {
        self.truncated
    }

    /// Atomic elements the section starts on or the span cuts through. Their
    /// markup reaches past the section, so they are opened before tables are rebuilt.
    pub fn containers_around(&self, span: &SectionSpan) -> Vec<NodeId> {
        self.blocks
            .iter()
            .filter(|b| span.overlaps(b.start, b.end) && (b.start <= span.start || b.end > span.end))
            .filter_map(|b| b.node)
            .collect()
    }

    /// Rebuilds the flow with `nodes` opened in addition to those opened before.
    pub fn reopen(&self, document: &Html, nodes: &[NodeId]) -> Self {
        let mut opened = self.opened.clone();
        opened.extend(nodes.iter().copied());
        Self::build(document, self.limits, opened)
    }

    fn is_clipped(&self, block: &FlowBlock, span: &SectionSpan) -> bool {
        block.start < span.start || block.end > span.end
    }

    fn clipped_text(&self, block: &FlowBlock, span: &SectionSpan) -> &str {
        self.text[block.start.max(span.start)..block.end.min(span.end)].trim()
    }

    /// Markup of every block inside the span, wrapped in one container. A block
    /// the span cuts through contributes only its text inside the span.
    pub fn section_fragment(&self, span: &SectionSpan) -> String {
        let mut html = String::from("<div class=\"mdna-section\">");
        for block in self.blocks.iter().filter(|b| span.overlaps(b.start, b.end)) {
            if self.is_clipped(block, span) {
                html.push_str("<p>");
                html.push_str(&html_escape::encode_text(self.clipped_text(block, span)));
                html.push_str("</p>");
            } else {
                html.push_str(&block.html);
            }
        }
        html.push_str("</div>");
        html
    }

    /// Section text without the lines contributed by tables and preformatted
    /// blocks; those are rendered from their reconstructed form instead.
    pub fn section_prose(&self, span: &SectionSpan) -> String {
        self.blocks
            .iter()
            .filter(|b| span.overlaps(b.start, b.end))
            .filter(|b| b.kind == BlockKind::Prose || self.is_clipped(b, span))
            .map(|b| self.clipped_text(b, span))
            .filter(|line| !line.is_empty())
            .collect::<Vec<_>>()
            .join("\n\n")
    }
}

struct PendingBlock {
    kind: BlockKind,
    html: String,
    line: String,
    node: Option<NodeId>,
}

struct FlowBuilder {
    limits: FlowLimits,
    opened: HashSet<NodeId>,
    blocks: Vec<PendingBlock>,
    pending_html: String,
    pending_text: String,
    visited: usize,
    truncated: bool,
}

impl FlowBuilder {
    fn new(limits: FlowLimits, opened: HashSet<NodeId>) -> Self {
        Self {
            limits,
            opened,
            blocks: Vec::new(),
            pending_html: String::new(),
            pending_text: String::new(),
            visited: 0,
            truncated: false,
        }
    }

    fn walk(&mut self, parent: ElementRef, depth: usize) {
        for child in parent.children() {
            if self.visited >= self.limits.max_elements {
                self.truncated = true;
                return;
            }
            self.visited += 1;

            match child.value() {
                Node::Text(text) => {
                    self.pending_html.push_str(&html_escape::encode_text(&*text.text));
                    self.pending_text.push_str(&text.text);
                }
                Node::Element(_) => {
                    let Some(element) = ElementRef::wrap(child) else { continue };
                    let name = element.value().name();
                    if SKIPPED_TAGS.contains(&name) {
                        continue;
                    }

                    let atomic = is_atomic(element);
                    let contains_block = has_block_descendant(element);
                    if atomic && (self.opened.contains(&element.id()) || is_layout_container(element)) {
                        self.flush();
                        if contains_block && depth < self.limits.max_depth {
                            self.walk(element, depth + 1);
                        } else {
                            self.push_paragraphs(element);
                        }
                        self.flush();
                    } else if !atomic && !contains_block && !is_block(name) {
                        // inline content joins the current run
                        self.pending_html.push_str(&element.html());
                        self.pending_text.push_str(&layout_text(element));
                    } else if atomic || !contains_block || depth >= self.limits.max_depth {
                        self.flush();
                        self.push_element(element);
                    } else {
                        self.flush();
                        self.walk(element, depth + 1);
                        self.flush();
                    }
                }
                _ => {}
            }
        }
    }

    fn push_element(&mut self, element: ElementRef) {
        let raw = layout_text(element);
        let line = block_line(&raw);
        if line.is_empty() {
            return;
        }
        let (kind, node) = if element.value().name() == "table" {
            (BlockKind::Table, Some(element.id()))
        } else if is_atomic(element) {
            (preformatted_kind(&raw), Some(element.id()))
        } else {
            (BlockKind::Prose, None)
        };
        self.blocks.push(PendingBlock { kind, html: element.html(), line, node });
    }

    /// One block per blank-line separated paragraph of an opened element.
    fn push_paragraphs(&mut self, element: ElementRef) {
        let raw = layout_text(element);
        for piece in PARAGRAPH_BREAK_RE.split(&raw) {
            let line = block_line(piece);
            if line.is_empty() {
                continue;
            }
            self.blocks.push(PendingBlock {
                kind: preformatted_kind(piece),
                html: format!("<pre>{}</pre>", html_escape::encode_text(piece)),
                line,
                node: None,
            });
        }
    }

    fn flush(&mut self) {
        let line = block_line(&self.pending_text);
        let html = std::mem::take(&mut self.pending_html);
        self.pending_text.clear();
        if !line.is_empty() {
            self.blocks.push(PendingBlock { kind: BlockKind::Prose, html, line, node: None });
        }
    }
}
