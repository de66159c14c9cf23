// src/extractors/assemble.rs
//! Final output of an extraction: a styled HTML document for markup sources,
//! or the section text with aligned ASCII table blocks for plain-text sources.

use crate::extractors::detector::CURRENCY_RE;
use crate::extractors::tables::{rows_from_plain_lines, CellKind, Table, TableOrigin};
use once_cell::sync::Lazy;
use regex::Regex;

/// Paragraphs at least this long are never headings.
pub const MAX_HEADING_CHARS: usize = 100;
/// Consecutive table-like lines needed before plain text is reformatted.
pub const MIN_TEXT_TABLE_LINES: usize = 2;
pub const FIRST_COLUMN_WIDTH: usize = 30;
pub const VALUE_COLUMN_WIDTH: usize = 15;
const RULE_WIDTH: usize = 80;

pub const DOCUMENT_TITLE: &str = "MD&A Section";
pub const DOCUMENT_HEADING: &str =
    "Management's Discussion and Analysis of Financial Condition and Results of Operations";

/// Phrases that announce a table in the next position of the document.
pub const TABLE_CUES: &[&str] = &[
    "following table",
    "as follows:",
    "summarized below",
    "breakdown",
    "summary",
];

const FISCAL_TERMS: &[&str] = &[
    "year ended",
    "three months",
    "quarter",
    "december",
    "march",
    "june",
    "september",
];

const STYLESHEET: &str = r#"
body { font-family: Arial, sans-serif; margin: 20px; line-height: 1.6; color: #333; }
h1, h2, h3 { color: #2c3e50; margin-top: 25px; margin-bottom: 15px; }
h1 { font-size: 24px; }
h3 { font-size: 16px; }
p { margin-bottom: 12px; text-align: justify; font-size: 11px; }
.header { border-bottom: 2px solid #2c3e50; padding-bottom: 10px; margin-bottom: 20px; }
.financial-table { border-collapse: collapse; width: 100%; margin: 15px 0; font-size: 9px; page-break-inside: avoid; }
.financial-table td, .financial-table th { border: 1px solid #ccc; padding: 6px; text-align: left; vertical-align: top; }
.financial-table th, .financial-table td.header { background-color: #f8f9fa; font-weight: bold; text-align: center; color: #2c3e50; }
.financial-table td.numeric, .financial-table td.currency, .financial-table td.percentage { text-align: right; font-family: 'Courier New', monospace; white-space: nowrap; }
.financial-table td.negative { text-align: right; font-family: 'Courier New', monospace; color: #d9534f; white-space: nowrap; }
.financial-table tr:nth-child(even) { background-color: #f9f9f9; }
.financial-table caption { caption-side: top; font-weight: bold; margin-bottom: 8px; color: #2c3e50; }
.financial-table.detected_table { border: 2px solid #3498db; }
.financial-table.preformatted_table { font-family: 'Courier New', monospace; font-size: 8px; }
@media print {
  .financial-table { font-size: 7px; }
  .financial-table td, .financial-table th { padding: 3px; }
}
"#;

// --- Regex Patterns ---
static HEADING_LINE_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^[A-Z][^.]*$").expect("Failed to compile HEADING_LINE_RE"));

static PARAGRAPH_BREAK_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\n[^\S\n]*\n").expect("Failed to compile PARAGRAPH_BREAK_RE"));

static NUMBER_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d+(?:,\d{3})*(?:\.\d+)?\b").expect("Failed to compile NUMBER_RE")
});

static GAP_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{3,}").expect("Failed to compile GAP_RE"));

static YEAR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{4}\b").expect("Failed to compile YEAR_RE"));

static COLUMN_SPLIT_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\s{2,}").expect("Failed to compile COLUMN_SPLIT_RE"));

// --- Styled document ---
fn is_all_caps(text: &str) -> bool {
    text.chars().any(char::is_alphabetic) && !text.chars().any(char::is_lowercase)
}

pub fn is_heading(paragraph: &str) -> bool {
    paragraph.chars().count() < MAX_HEADING_CHARS
        && (is_all_caps(paragraph)
            || paragraph.starts_with("Item ")
            || paragraph.starts_with("ITEM ")
            || HEADING_LINE_RE.is_match(paragraph))
}

pub fn announces_table(paragraph: &str) -> bool {
    let lower = paragraph.to_lowercase();
    TABLE_CUES.iter().any(|cue| lower.contains(cue))
}

/// Builds the self-contained HTML document for an extracted section.
///
/// Each table is placed after the next paragraph that announces one; tables
/// left over once the prose runs out are appended in order.
pub fn render_document(prose: &str, tables: &[Table]) -> String {
    let mut body = String::new();
    let mut queue = tables.iter();

    for paragraph in PARAGRAPH_BREAK_RE.split(prose).map(str::trim).filter(|p| !p.is_empty()) {
        let escaped = html_escape::encode_text(paragraph);
        if is_heading(paragraph) {
            body.push_str(&format!("<h3>{}</h3>\n", escaped));
        } else {
            body.push_str(&format!("<p>{}</p>\n", escaped));
        }

        if announces_table(paragraph) {
            if let Some(table) = queue.next() {
                body.push_str(&render_table(table));
            }
        }
    }
    for table in queue {
        body.push_str(&render_table(table));
    }

    format!(
        "<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<title>{}</title>\n<style>{}</style>\n</head>\n<body>\n<div class=\"header\"><h1>{}</h1></div>\n<div class=\"mdna-content\">\n{}</div>\n</body>\n</html>\n",
        html_escape::encode_text(DOCUMENT_TITLE),
        STYLESHEET,
        html_escape::encode_text(DOCUMENT_HEADING),
        body
    )
}

pub fn render_table(table: &Table) -> String {
    let mut html = format!(
        "<table class=\"financial-table {}\" id=\"{}\">\n",
        table.origin.css_class(),
        html_escape::encode_double_quoted_attribute(&table.id)
    );
    if table.origin != TableOrigin::Native {
        html.push_str("<caption>Financial Data Table</caption>\n");
    }

    for row in &table.rows {
        let header_row = row.is_header_row();
        let tag = if header_row { "th" } else { "td" };
        html.push_str("<tr>");
        for cell in &row.cells {
            let kind = match cell.kind() {
                CellKind::Text if header_row => CellKind::Header,
                kind => kind,
            };
            let mut attrs = String::new();
            if let Some(class) = kind.css_class() {
                attrs.push_str(&format!(" class=\"{}\"", class));
            }
            if cell.colspan > 1 {
                attrs.push_str(&format!(" colspan=\"{}\"", cell.colspan));
            }
            if cell.rowspan > 1 {
                attrs.push_str(&format!(" rowspan=\"{}\"", cell.rowspan));
            }
            html.push_str(&format!(
                "<{tag}{attrs}>{}</{tag}>",
                html_escape::encode_text(&cell.text)
            ));
        }
        html.push_str("</tr>\n");
    }
    html.push_str("</table>\n");
    html
}

// --- Plain-text reformatting ---
pub fn is_table_line(line: &str) -> bool {
    let line = line.trim();
    if line.is_empty() {
        return false;
    }
    let row = CURRENCY_RE.find_iter(line).count() >= 2
        || NUMBER_RE.find_iter(line).count() >= 3
        || GAP_RE.find_iter(line).count() >= 2;
    row || is_period_header(line)
}

fn is_period_header(line: &str) -> bool {
    let lower = line.to_lowercase();
    FISCAL_TERMS.iter().any(|term| lower.contains(term)) && YEAR_RE.find_iter(line).count() >= 2
}

/// Lays out a run of table lines as a fixed-width block between banner rules.
pub fn format_text_block(lines: &[&str]) -> Vec<String> {
    let mut block = vec![
        String::new(),
        "=".repeat(RULE_WIDTH),
        "TABLE:".to_string(),
        "-".repeat(RULE_WIDTH),
    ];
    for line in lines {
        let parts: Vec<&str> = COLUMN_SPLIT_RE.split(line.trim()).collect();
        match parts.split_first() {
            Some((label, values)) if !values.is_empty() => {
                let mut formatted = format!("{:<width$}", label, width = FIRST_COLUMN_WIDTH);
                for value in values {
                    formatted.push_str(&format!("{:>width$}", value, width = VALUE_COLUMN_WIDTH));
                }
                block.push(formatted);
            }
            _ => block.push(line.trim().to_string()),
        }
    }
    block.push("-".repeat(RULE_WIDTH));
    block.push(String::new());
    block
}

enum ScanState<'a> {
    Scanning,
    Accumulating(Vec<&'a str>),
}

struct TextFormatter<'a> {
    output: Vec<String>,
    tables: Vec<Table>,
    state: ScanState<'a>,
}

impl<'a> TextFormatter<'a> {
    fn feed(&mut self, line: &'a str) {
        if is_table_line(line) {
            if let ScanState::Accumulating(run) = &mut self.state {
                run.push(line);
            } else {
                self.state = ScanState::Accumulating(vec![line]);
            }
        } else {
            self.flush();
            self.output.push(line.to_string());
        }
    }

    fn flush(&mut self) {
        let ScanState::Accumulating(run) = std::mem::replace(&mut self.state, ScanState::Scanning) else {
            return;
        };
        if run.len() < MIN_TEXT_TABLE_LINES {
            self.output.extend(run.iter().map(|l| l.to_string()));
            return;
        }

        self.output.extend(format_text_block(&run));
        let rows = rows_from_plain_lines(&run);
        if !rows.is_empty() {
            let id = format!("text_table_{}", self.tables.len() + 1);
            self.tables.push(Table { id, origin: TableOrigin::Preformatted, rows });
        }
    }
}

/// Rewrites runs of table-like lines as aligned blocks. Other lines, and runs
/// too short to be a table, are passed through unchanged.
pub fn format_text_tables(text: &str) -> (String, Vec<Table>) {
    let mut formatter = TextFormatter {
        output: Vec::new(),
        tables: Vec::new(),
        state: ScanState::Scanning,
    };
    for line in text.lines() {
        formatter.feed(line);
    }
    formatter.flush();
    tracing::debug!("Reformatted {} plain-text tables", formatter.tables.len());
    (formatter.output.join("\n"), formatter.tables)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::tables::{Cell, Row};

    fn sample_table(id: &str, origin: TableOrigin) -> Table {
        Table {
            id: id.to_string(),
            origin,
            rows: vec![
                Row { cells: vec![Cell::new("Segment").header(true), Cell::new("2023").header(true)] },
                Row { cells: vec![Cell::new("Retail"), Cell::new("$1,234")] },
                Row { cells: vec![Cell::new("Loss"), Cell::new("(12)")] },
            ],
        }
    }

    #[test]
    fn test_headings_and_paragraphs() {
        assert!(is_heading("Item 7. Management's Discussion and Analysis"));
        assert!(is_heading("RESULTS OF OPERATIONS"));
        assert!(is_heading("Liquidity and Capital Resources"));
        assert!(!is_heading("Revenue increased 5% compared with the prior year."));
        assert!(!is_heading(&"A".repeat(MAX_HEADING_CHARS)));
    }

    #[test]
    fn test_tables_follow_cue_paragraphs_and_leftovers_append() {
        let prose = "Overview\n\nThe following table presents revenue by segment.\n\nCosts were flat year over year.";
        let tables = vec![
            sample_table("html_table_1", TableOrigin::Native),
            sample_table("detected_table_1", TableOrigin::Detected),
        ];
        let doc = render_document(prose, &tables);
        let cue = doc.find("The following table").unwrap();
        let first = doc.find("id=\"html_table_1\"").unwrap();
        let costs = doc.find("Costs were flat").unwrap();
        let second = doc.find("id=\"detected_table_1\"").unwrap();
        assert!(cue < first && first < costs && costs < second);
        assert!(doc.contains("<title>MD&amp;A Section</title>"));
        assert!(doc.contains("<h3>Overview</h3>"));
    }

    #[test]
    fn test_prose_is_escaped() {
        let doc = render_document("Sales of <widgets> & gadgets rose sharply this year.", &[]);
        assert!(doc.contains("<p>Sales of &lt;widgets&gt; &amp; gadgets rose sharply this year.</p>"));
    }

    #[test]
    fn test_render_table_classes_and_spans() {
        let mut table = sample_table("detected_table_1", TableOrigin::Detected);
        table.rows[0].cells[0].colspan = 2;
        let html = render_table(&table);
        assert!(html.starts_with("<table class=\"financial-table detected_table\""));
        assert!(html.contains("<caption>Financial Data Table</caption>"));
        assert!(html.contains("<th class=\"header\" colspan=\"2\">Segment</th>"));
        assert!(html.contains("<td class=\"currency\">$1,234</td>"));
        assert!(html.contains("<td class=\"negative\">(12)</td>"));
        assert!(html.contains("<td>Retail</td>"));

        let native = render_table(&sample_table("html_table_1", TableOrigin::Native));
        assert!(!native.contains("<caption>"));
    }

    #[test]
    fn test_three_line_block_is_aligned() {
        let text = "Revenue    $1,234    $2,345\nExpenses   $500     $600\nTotal      $734     $1,745";
        let (formatted, tables) = format_text_tables(text);
        let lines: Vec<&str> = formatted.lines().collect();
        assert_eq!(lines[1], "=".repeat(80));
        assert_eq!(lines[2], "TABLE:");
        assert_eq!(
            lines[4],
            format!("{:<30}{:>15}{:>15}", "Revenue", "$1,234", "$2,345")
        );
        assert_eq!(&lines[5][..30], format!("{:<30}", "Expenses"));
        assert_eq!(lines[6].len(), 60);
        assert_eq!(tables.len(), 1);
        assert_eq!(tables[0].id, "text_table_1");
        assert_eq!(tables[0].rows.len(), 3);
    }

    #[test]
    fn test_single_table_line_passes_through() {
        let text = "Intro paragraph.\n  Revenue    $1,234    $2,345\nClosing words.";
        let (formatted, tables) = format_text_tables(text);
        assert_eq!(formatted, text);
        assert!(tables.is_empty());
    }

    #[test]
    fn test_period_header_starts_a_run() {
        let text = "Year ended December 31, 2023 and 2022\nNet sales    $5,000    $4,200\nnarrative";
        let (formatted, tables) = format_text_tables(text);
        assert!(formatted.contains("TABLE:"));
        assert!(formatted.ends_with("\nnarrative"));
        assert_eq!(tables[0].rows.len(), 2);
    }

    #[test]
    fn test_run_at_end_of_input_is_flushed() {
        let text = "Heading\nA    $1    $2\nB    $3    $4";
        let (formatted, _) = format_text_tables(text);
        assert!(formatted.starts_with("Heading\n\n"));
        assert!(formatted.ends_with(&"-".repeat(80)) || formatted.ends_with(&format!("{}\n", "-".repeat(80))));
    }
}
