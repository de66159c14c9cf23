// src/extractors/tables.rs
//! Table reconstruction.
//!
//! Financial tables show up three ways in a filing: real `<table>` markup,
//! whitespace-aligned text inside ordinary paragraphs/divs, and `<pre>` blocks.
//! Each shape has its own [`TableStrategy`]; the [`TableReconstructor`] runs them
//! independently and concatenates what they find, so a failure inside one
//! element costs only that element.

use crate::extractors::detector::{self, CURRENCY_RE};
use crate::extractors::flow::{layout_text, MAX_ELEMENTS};
use crate::extractors::normalize::collapse_inline;
use crate::utils::error::ExtractError;
use once_cell::sync::Lazy;
use regex::Regex;
use scraper::{ElementRef, Html, Selector};
use serde::Serialize;
use std::collections::HashSet;

/// Lines longer than this are never treated as table rows.
pub const MAX_LINE_CHARS: usize = 4_000;
/// Consecutive row-like lines needed before a run counts as a table.
pub const MIN_RUN_LINES: usize = 3;

/// Vocabulary that marks a line as a row and a column as a label.
pub const ACCOUNTING_KEYWORDS: &[&str] = &["total", "assets", "liabilities", "december", "year ended"];

// --- CSS Selectors (Lazy Static) ---
static TABLE_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("table").expect("Failed to compile TABLE_SELECTOR"));

static ROW_SELECTOR: Lazy<Selector> =
    Lazy::new(|| Selector::parse("tr").expect("Failed to compile ROW_SELECTOR"));

static IN_FLOW_CANDIDATE_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("div, p, span, pre").expect("Failed to compile IN_FLOW_CANDIDATE_SELECTOR")
});

static FIXED_WIDTH_SELECTOR: Lazy<Selector> = Lazy::new(|| {
    Selector::parse("pre, code, [style]").expect("Failed to compile FIXED_WIDTH_SELECTOR")
});

// --- Regex Patterns ---
static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d+(?:,\d{3})*(?:\.\d+)?\b").expect("Failed to compile NUMBER_RE")
});

static GAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{3,}").expect("Failed to compile GAP_RE"));

// In-flow text: columns separated by two or more spaces, or tabs.
static IN_FLOW_COLUMN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{2,}|\t+").expect("Failed to compile IN_FLOW_COLUMN_RE"));

// Preformatted text: single and double spaces occur inside labels, so columns need 3+.
static FIXED_WIDTH_COLUMN_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{3,}").expect("Failed to compile FIXED_WIDTH_COLUMN_RE"));

static DIGIT_OR_DOLLAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"[\d$]").expect("Failed to compile DIGIT_OR_DOLLAR_RE"));

static NEGATIVE_CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\(\$?[\d,]+\.?\d*\)$").expect("Failed to compile NEGATIVE_CELL_RE"));

static CURRENCY_CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\$\s?[\d,]+\.?\d*$").expect("Failed to compile CURRENCY_CELL_RE"));

static PERCENT_CELL_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^\d+\.?\d*%$").expect("Failed to compile PERCENT_CELL_RE"));

static NUMERIC_CELL_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d{1,3}(?:,\d{3})*(?:\.\d+)?$").expect("Failed to compile NUMERIC_CELL_RE")
});

// --- Data Structures ---
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum TableOrigin {
    Native,
    Detected,
    Preformatted,
}

impl TableOrigin {
    /// Class used on the rendered `<table>` element.
    pub fn css_class(&self) -> &'static str {
        match self {
            TableOrigin::Native => "html_table",
            TableOrigin::Detected => "detected_table",
            TableOrigin::Preformatted => "preformatted_table",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum CellKind {
    Currency,
    Negative,
    Percentage,
    Numeric,
    Header,
    Text,
}

impl CellKind {
    pub fn css_class(&self) -> Option<&'static str> {
        match self {
            CellKind::Currency => Some("currency"),
            CellKind::Negative => Some("negative"),
            CellKind::Percentage => Some("percentage"),
            CellKind::Numeric => Some("numeric"),
            CellKind::Header => Some("header"),
            CellKind::Text => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Cell {
    pub text: String,
    pub colspan: u32,
    pub rowspan: u32,
    pub is_header: bool,
}

impl Cell {
    pub fn new(text: impl Into<String>) -> Self {
        Self { text: text.into(), colspan: 1, rowspan: 1, is_header: false }
    }

    pub fn header(mut self, is_header: bool) -> Self {
        self.is_header = is_header;
        self
    }

    pub fn kind(&self) -> CellKind {
        let text = self.text.trim();
        if NEGATIVE_CELL_RE.is_match(text) {
            CellKind::Negative
        } else if CURRENCY_CELL_RE.is_match(text) {
            CellKind::Currency
        } else if PERCENT_CELL_RE.is_match(text) {
            CellKind::Percentage
        } else if NUMERIC_CELL_RE.is_match(text) {
            CellKind::Numeric
        } else if self.is_header {
            CellKind::Header
        } else {
            CellKind::Text
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Row {
    pub cells: Vec<Cell>,
}

impl Row {
    pub fn is_header_row(&self) -> bool {
        self.cells.iter().any(|c| c.is_header)
    }

    /// Grid columns this row covers.
    pub fn width(&self) -> u32 {
        self.cells.iter().map(|c| c.colspan).sum()
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Table {
    pub id: String,
    pub origin: TableOrigin,
    pub rows: Vec<Row>,
}

/// What one strategy produced for a section: tables plus the elements it had to skip.
#[derive(Debug, Default)]
pub struct StrategyOutput {
    pub tables: Vec<Table>,
    pub skipped: Vec<ExtractError>,
}

pub trait TableStrategy: Send + Sync {
    fn name(&self) -> &'static str;
    fn extract(&self, fragment: &Html) -> StrategyOutput;
}

/// Runs the table strategies in order (native, in-flow, preformatted) and
/// concatenates their tables.
pub struct TableReconstructor {
    strategies: Vec<Box<dyn TableStrategy>>,
}

impl TableReconstructor {
    pub fn new(strategies: Vec<Box<dyn TableStrategy>>) -> Self {
        Self { strategies }
    }

    pub fn reconstruct(&self, fragment: &Html) -> Vec<Table> {
        let mut tables = Vec::new();
        for strategy in &self.strategies {
            let output = strategy.extract(fragment);
            for skipped in &output.skipped {
                tracing::warn!("{}: skipped element: {}", strategy.name(), skipped);
            }
            tracing::debug!("{}: {} tables", strategy.name(), output.tables.len());
            tables.extend(output.tables);
        }
        tables
    }
}

impl Default for TableReconstructor {
    fn default() -> Self {
        Self::new(vec![
            Box::new(NativeTables),
            Box::new(InFlowTables),
            Box::new(PreformattedTables),
        ])
    }
}

// --- Native <table> markup ---
pub struct NativeTables;

impl TableStrategy for NativeTables {
    fn name(&self) -> &'static str {
        "native tables"
    }

    fn extract(&self, fragment: &Html) -> StrategyOutput {
        let mut output = StrategyOutput::default();
        for (i, table) in fragment.select(&TABLE_SELECTOR).take(MAX_ELEMENTS).enumerate() {
            let id = format!("html_table_{}", i + 1);
            match native_table(table, id) {
                Ok(Some(table)) => output.tables.push(table),
                Ok(None) => {}
                Err(e) => output.skipped.push(e),
            }
        }
        output
    }
}

fn owned_by(row: ElementRef, table: ElementRef) -> bool {
    row.ancestors()
        .filter_map(ElementRef::wrap)
        .find(|a| a.value().name() == "table")
        .map_or(false, |owner| owner.id() == table.id())
}

fn native_table(table: ElementRef, id: String) -> Result<Option<Table>, ExtractError> {
    let mut rows = Vec::new();
    for tr in table.select(&ROW_SELECTOR).filter(|tr| owned_by(*tr, table)) {
        let cells = tr
            .children()
            .filter_map(ElementRef::wrap)
            .filter(|c| matches!(c.value().name(), "td" | "th"))
            .map(|c| native_cell(c, &id))
            .collect::<Result<Vec<_>, _>>()?;
        if !cells.is_empty() {
            rows.push(Row { cells });
        }
    }

    if rows.is_empty() {
        return Ok(None);
    }
    Ok(Some(Table { id, origin: TableOrigin::Native, rows }))
}

fn native_cell(cell: ElementRef, table_id: &str) -> Result<Cell, ExtractError> {
    Ok(Cell {
        text: collapse_inline(&cell.text().collect::<String>()),
        colspan: span_attr(cell, "colspan", table_id)?,
        rowspan: span_attr(cell, "rowspan", table_id)?,
        is_header: cell.value().name() == "th",
    })
}

/// Missing or empty span attributes mean 1; `0` is clamped to 1.
fn span_attr(cell: ElementRef, attr: &str, table_id: &str) -> Result<u32, ExtractError> {
    let raw = match cell.value().attr(attr) {
        Some(raw) if !raw.trim().is_empty() => raw,
        _ => return Ok(1),
    };
    raw.trim()
        .parse::<u32>()
        .map(|n| n.max(1))
        .map_err(|_| ExtractError::MalformedElement {
            element: table_id.to_string(),
            reason: format!("{}=\"{}\" is not a number", attr, raw),
        })
}

// --- Tabular text inside ordinary elements ---
pub struct InFlowTables;

impl TableStrategy for InFlowTables {
    fn name(&self) -> &'static str {
        "in-flow tables"
    }

    fn extract(&self, fragment: &Html) -> StrategyOutput {
        let mut output = StrategyOutput::default();
        let mut seen = HashSet::new();

        for element in fragment.select(&IN_FLOW_CANDIDATE_SELECTOR).take(MAX_ELEMENTS) {
            if !mentions_financials(element) || is_fixed_width(element) {
                continue;
            }
            let check = container_of(element);
            if !seen.insert(check.id()) || is_fixed_width(check) || within_table(check) {
                continue;
            }

            let text = layout_text(check);
            if !detector::is_tabular(&text) {
                continue;
            }
            let rows = rows_from_text(&text, &IN_FLOW_COLUMN_RE, in_flow_header);
            if !rows.is_empty() {
                let id = format!("detected_table_{}", output.tables.len() + 1);
                output.tables.push(Table { id, origin: TableOrigin::Detected, rows });
            }
        }
        output
    }
}

fn mentions_financials(element: ElementRef) -> bool {
    element
        .children()
        .filter_map(|n| n.value().as_text())
        .any(|t| t.contains('$') || t.contains("Assets") || t.contains("Liabilities"))
}

/// The element whose text is examined: the candidate's parent, unless that
/// parent is the section wrapper or the document itself.
fn container_of(element: ElementRef) -> ElementRef {
    match element.parent().and_then(ElementRef::wrap) {
        Some(parent)
            if !matches!(parent.value().name(), "html" | "body")
                && !parent.value().classes().any(|c| c == "mdna-section") =>
        {
            parent
        }
        _ => element,
    }
}

fn within_table(element: ElementRef) -> bool {
    element.value().name() == "table"
        || element
            .ancestors()
            .filter_map(ElementRef::wrap)
            .any(|a| a.value().name() == "table")
}

fn in_flow_header(index: usize, column: &str) -> bool {
    (index == 0 && !DIGIT_OR_DOLLAR_RE.is_match(column)) || has_accounting_keyword(column)
}

// --- Preformatted / monospaced blocks ---
pub struct PreformattedTables;

impl TableStrategy for PreformattedTables {
    fn name(&self) -> &'static str {
        "preformatted tables"
    }

    fn extract(&self, fragment: &Html) -> StrategyOutput {
        let mut output = StrategyOutput::default();
        for element in fragment.select(&FIXED_WIDTH_SELECTOR).take(MAX_ELEMENTS) {
            if !declares_fixed_width(element) || has_fixed_width_ancestor(element) {
                continue;
            }
            let rows = preformatted_rows(&layout_text(element));
            if !rows.is_empty() {
                let id = format!("pre_table_{}", output.tables.len() + 1);
                output.tables.push(Table { id, origin: TableOrigin::Preformatted, rows });
            }
        }
        output
    }
}

/// Inline style asking for a monospaced font or preserved whitespace.
pub fn fixed_width_style(element: ElementRef) -> bool {
    element.value().attr("style").map_or(false, |style| {
        let style = style.to_lowercase().replace(' ', "");
        style.contains("monospace") || style.contains("courier") || style.contains("white-space:pre")
    })
}

fn declares_fixed_width(element: ElementRef) -> bool {
    matches!(element.value().name(), "pre" | "code") || fixed_width_style(element)
}

/// Rows the preformatted strategy recovers from a block's layout text.
/// Empty unless the text is tabular and has a run of aligned lines.
pub fn preformatted_rows(text: &str) -> Vec<Row> {
    if !detector::is_tabular(text) {
        return Vec::new();
    }
    rows_from_text(text, &FIXED_WIDTH_COLUMN_RE, fixed_width_header)
}

fn has_fixed_width_ancestor(element: ElementRef) -> bool {
    element
        .ancestors()
        .filter_map(ElementRef::wrap)
        .any(declares_fixed_width)
}

fn is_fixed_width(element: ElementRef) -> bool {
    declares_fixed_width(element) || has_fixed_width_ancestor(element)
}

fn fixed_width_header(_index: usize, column: &str) -> bool {
    !DIGIT_OR_DOLLAR_RE.is_match(column)
}

// --- Line grouping shared by the text-based strategies ---
pub fn has_accounting_keyword(text: &str) -> bool {
    let lower = text.to_lowercase();
    ACCOUNTING_KEYWORDS.iter().any(|kw| lower.contains(kw))
}

/// A line that looks like a table row: an amount, two numbers, two wide gaps,
/// or accounting vocabulary.
pub fn is_row_like(line: &str) -> bool {
    if line.len() > MAX_LINE_CHARS {
        return false;
    }
    CURRENCY_RE.is_match(line)
        || NUMBER_RE.find_iter(line).count() >= 2
        || GAP_RE.find_iter(line).count() >= 2
        || has_accounting_keyword(line)
}

/// Lines belonging to runs of at least [`MIN_RUN_LINES`] consecutive row-like lines.
pub fn tabular_lines(text: &str) -> Vec<&str> {
    let lines: Vec<&str> = text.lines().map(str::trim).filter(|l| !l.is_empty()).collect();
    if lines.len() < MIN_RUN_LINES {
        return Vec::new();
    }

    let mut kept = Vec::new();
    let mut run = Vec::new();
    for line in lines {
        if is_row_like(line) {
            run.push(line);
        } else {
            if run.len() >= MIN_RUN_LINES {
                kept.append(&mut run);
            }
            run.clear();
        }
    }
    if run.len() >= MIN_RUN_LINES {
        kept.append(&mut run);
    }
    kept
}

fn rows_from_text(text: &str, columns: &Regex, is_header: fn(usize, &str) -> bool) -> Vec<Row> {
    tabular_lines(text)
        .into_iter()
        .filter_map(|line| {
            let parts: Vec<&str> = columns
                .split(line)
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .collect();
            if parts.len() < 2 {
                return None;
            }
            let cells = parts
                .iter()
                .enumerate()
                .map(|(j, part)| Cell::new(*part).header(is_header(j, part)))
                .collect();
            Some(Row { cells })
        })
        .collect()
}

/// Rows of a plain-text table block, split on runs of 2+ spaces.
pub fn rows_from_plain_lines(lines: &[&str]) -> Vec<Row> {
    lines
        .iter()
        .map(|line| {
            let cells = IN_FLOW_COLUMN_RE
                .split(line.trim())
                .map(str::trim)
                .filter(|p| !p.is_empty())
                .map(|part| Cell::new(part).header(!DIGIT_OR_DOLLAR_RE.is_match(part)))
                .collect();
            Row { cells }
        })
        .filter(|row: &Row| !row.cells.is_empty())
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn reconstruct(html: &str) -> Vec<Table> {
        TableReconstructor::default().reconstruct(&Html::parse_fragment(html))
    }

    #[test]
    fn test_native_table_shape_is_preserved() {
        let html = r#"<div class="mdna-section"><table>
            <tr><th>Segment</th><th>2023</th><th>2022</th></tr>
            <tr><td>Retail</td><td>$1,234</td><td>$1,100</td></tr>
            <tr><td>Wholesale</td><td>(45)</td><td>12.5%</td></tr>
            <tr><td>Total</td><td>1,189</td><td rowspan="2">n/a</td></tr>
        </table></div>"#;
        let tables = reconstruct(html);
        assert_eq!(tables.len(), 1);
        let table = &tables[0];
        assert_eq!(table.id, "html_table_1");
        assert_eq!(table.origin, TableOrigin::Native);
        assert_eq!(table.rows.len(), 4);
        assert!(table.rows.iter().all(|r| r.cells.len() == 3));
        assert!(table.rows[0].is_header_row());
        assert_eq!(table.rows[1].cells[1].kind(), CellKind::Currency);
        assert_eq!(table.rows[2].cells[1].kind(), CellKind::Negative);
        assert_eq!(table.rows[2].cells[2].kind(), CellKind::Percentage);
        assert_eq!(table.rows[3].cells[1].kind(), CellKind::Numeric);
        assert_eq!(table.rows[3].cells[2].rowspan, 2);
        assert_eq!(table.rows[0].cells[0].kind(), CellKind::Header);
    }

    #[test]
    fn test_colspan_is_kept_and_widths_agree() {
        let html = r#"<table>
            <tr><td colspan="2">Year ended December 31</td><td>Change</td></tr>
            <tr><td>2023</td><td>2022</td><td>%</td></tr>
        </table>"#;
        let tables = reconstruct(html);
        let rows = &tables[0].rows;
        assert_eq!(rows[0].cells.len(), 2);
        assert_eq!(rows[0].cells[0].colspan, 2);
        assert_eq!(rows[0].width(), rows[1].width());
    }

    #[test]
    fn test_malformed_span_skips_only_that_table() {
        let html = r#"<table><tr><td colspan="two">bad</td></tr></table>
            <table><tr><td>good</td><td colspan="0">zero</td><td colspan="">empty</td></tr></table>"#;
        let output = NativeTables.extract(&Html::parse_fragment(html));
        assert_eq!(output.tables.len(), 1);
        assert_eq!(output.tables[0].id, "html_table_2");
        assert!(output.tables[0].rows[0].cells.iter().all(|c| c.colspan == 1));
        assert_eq!(output.skipped.len(), 1);
        assert!(matches!(output.skipped[0], ExtractError::MalformedElement { .. }));
    }

    #[test]
    fn test_nested_table_rows_belong_to_inner_table() {
        let html = r#"<table><tr><td>outer</td><td><table><tr><td>inner</td></tr></table></td></tr></table>"#;
        let tables = NativeTables.extract(&Html::parse_fragment(html)).tables;
        assert_eq!(tables.len(), 2);
        assert_eq!(tables[0].rows.len(), 1);
        assert_eq!(tables[1].rows[0].cells[0].text, "inner");
    }

    #[test]
    fn test_in_flow_table_detected_in_div() {
        let html = "<div class=\"mdna-section\"><div>\
            <p>Year ended December 31    2023    2022</p>\
            <p>Total assets    $1,234    $1,100</p>\
            <p>Total liabilities    $500    $450</p>\
            <p>Net assets    $734    $650</p>\
            </div></div>";
        let output = InFlowTables.extract(&Html::parse_fragment(html));
        assert_eq!(output.tables.len(), 1, "parent div should be examined once");
        let table = &output.tables[0];
        assert_eq!(table.id, "detected_table_1");
        assert_eq!(table.origin, TableOrigin::Detected);
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[1].cells.len(), 3);
        assert!(table.rows[1].cells[0].is_header);
        assert!(!table.rows[1].cells[1].is_header);
        assert_eq!(table.rows[1].cells[1].kind(), CellKind::Currency);
    }

    #[test]
    fn test_prose_with_amounts_is_not_a_table() {
        let html = "<div><p>Revenue was $1,234 million, up from $1,100 million.</p></div>";
        assert!(InFlowTables.extract(&Html::parse_fragment(html)).tables.is_empty());
    }

    #[test]
    fn test_preformatted_block_splits_on_wide_gaps() {
        let html = "<pre>\n\
            Year ended December 31        2023        2022\n\
            Net sales                 $ 5,000     $ 4,200\n\
            Cost of sales               3,100       2,900\n\
            Gross margin                1,900       1,300\n\
            </pre>";
        let tables = reconstruct(html);
        assert_eq!(tables.len(), 1, "pre must not also be picked up in-flow");
        let table = &tables[0];
        assert_eq!(table.id, "pre_table_1");
        assert_eq!(table.origin, TableOrigin::Preformatted);
        assert_eq!(table.rows.len(), 4);
        assert_eq!(table.rows[1].cells[0].text, "Net sales");
        assert_eq!(table.rows[1].cells[1].text, "$ 5,000");
        assert!(table.rows[1].cells[0].is_header);
        assert!(!table.rows[2].cells[1].is_header);
    }

    #[test]
    fn test_monospace_style_counts_as_preformatted() {
        let html = "<div style=\"font-family: Courier New\">\
            Revenue          $1,000      $900<br>\
            Expenses           $400      $350<br>\
            Total              $600      $550</div>";
        let tables = PreformattedTables.extract(&Html::parse_fragment(html)).tables;
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].rows.len(), 3);
    }

    #[test]
    fn test_strategy_order_is_native_detected_preformatted() {
        let html = "<div class=\"mdna-section\">\
            <pre>A          $1,000      $2,000\nB          $3,000      $4,000\nTotal      $4,000      $6,000</pre>\
            <div><p>Assets      $10      $20</p><p>Liabilities      $5      $6</p><p>Total      $15      $26</p></div>\
            <table><tr><td>x</td></tr></table></div>";
        let origins: Vec<TableOrigin> = reconstruct(html).iter().map(|t| t.origin).collect();
        assert_eq!(origins, vec![TableOrigin::Native, TableOrigin::Detected, TableOrigin::Preformatted]);
    }

    #[test]
    fn test_tabular_lines_drops_short_runs() {
        let text = "Intro sentence here\nTotal 1 2\nAssets 3 4\nplain words\nTotal 5 6\nAssets 7 8\nLiabilities 9 10\n";
        assert_eq!(tabular_lines(text), vec!["Total 5 6", "Assets 7 8", "Liabilities 9 10"]);
    }

    #[test]
    fn test_overlong_line_is_not_row_like() {
        let line = format!("$1 {}", "x".repeat(MAX_LINE_CHARS));
        assert!(!is_row_like(&line));
        assert!(is_row_like("Revenue $1"));
    }

    #[test]
    fn test_plain_rows_mark_labels_as_headers() {
        let rows = rows_from_plain_lines(&["Revenue    $1,234    $2,345", "Expenses   $500     $600"]);
        assert_eq!(rows.len(), 2);
        assert_eq!(rows[0].cells.len(), 3);
        assert!(rows[0].cells[0].is_header);
        assert!(!rows[1].cells[2].is_header);
    }
}
