// src/extractors/boundary.rs
//! Locating the Item 7 span inside canonical text.

use crate::utils::error::ExtractError;
use regex::Regex;
use serde::Serialize;
use std::fmt;

/// A section shorter than this (after trimming) is a header with no body,
/// typically a bare cross-reference such as "see Item 7".
pub const MIN_SECTION_CHARS: usize = 100;

// --- Marker phrasings ---
// Start markers require a word boundary after the item number so that
// "Item 7A" never registers as the start of Item 7.
const ITEM_7_START_PATTERNS: &[&str] = &[
    r"(?i)Item\s*7\b\.?",
    r"(?i)Item\s*7\b\s*[-–—:]",
    r"(?i)Item\s*7\b\s*[:\-–—]+\s*Management",
    r"(?i)Item\s*7\b\s*[\.:\-–—]+\s*Management['’]?s?\s+Discussion",
    r"(?i)Item\s*7\b\s*[\.:\-–—]+\s*Management['’]?s?\s+Discussion\s+and\s+Analysis",
    r"(?i)Item\s*7\b\s*Management['’]?s?\s+Discussion",
    r"(?i)Item\s*7\b\s*[:\-–—]*\s*MD&A",
    r"(?i)Item\s*7\b\s*-\s*MDA",
    r"(?i)Item\s*7\b\s*[-–—]*\s*Management['’]?s\s+Discussion\s+and\s+Analysis\s+of\s+Financial\s+Condition",
    r"(?i)Item\s*7\b\s*Management['’]?s?\s+Discussion\s+and\s+Results\s+of\s+Operations",
    r"(?i)Item\s*7\b\s*[:\-–—]?\s*Discussion\s+and\s+Analysis",
    r"(?i)Item\s*7\b\s*[\.\-–—:]?\s*<[^>]+>\s*Management['’]?s?\s+Discussion",
    r"(?i)Item\s*7\b(?:\s*of\s+Form\s+10-K)?",
    r"(?i)Item\s*7\b\s*[:\-–—]*\s*Overview",
    r"(?i)Item\s*7\b\s*[:\-–—]*\s*(?:Operating\s+Results|Results\s+of\s+Operations)",
    r"(?i)Item\s*7\b\s*[:\-–—]*\s*Discussion\s+and\s+Financial",
    r"(?i)Item\s*7\b\s*[:\-–—]*\s*Business\s+Overview",
    r"(?i)Item\s*7\b\s*[-–—]*\s*(?:Review\s+of\s+Operations|Operating\s+and\s+Financial\s+Review)",
    r"(?i)Item\s*7\b\s*[-–—]*\s*Analysis\s+of\s+Financial\s+Condition",
    r"(?i)Item\s*7\b\s*[:\-–—]*\s*Liquidity\s+and\s+Capital\s+Resources",
    r"(?i)Item\s*7\b\s*[:\-–—]*\s*Critical\s+Accounting\s+Policies",
    r"(?i)Item\s*Seven\b\s*[-–—:]?",
    r"(?i)Item\s*Seven\b\s*Management['’]?s?\s+Discussion",
];

// End markers in priority order: the first phrasing that matches anywhere after
// the start wins, even if a later phrasing matches earlier in the text.
const ITEM_7_END_PATTERNS: &[&str] = &[
    r"(?i)Item\s*7A\b\.?",
    r"(?i)Item\s*7\s*A\b\.?",
    r"(?i)Item\s*7A\s*[:\-–—]+\s*Quantitative\s+and\s+Qualitative",
    r"(?i)Item\s*7A\s*Quantitative\s+and\s+Qualitative\s+Disclosures\s+About\s+Market\s+Risk",
    r"(?i)Item\s*7A\s*[-–—]*\s*Market\s+Risk",
    r"(?i)Item\s*7A\s*[\.\-–—:]?\s*(?:<[^>]+>\s*)*Quantitative\s+and\s+Qualitative",
    r"(?i)Item\s*Seven\s*A\b",
    r"(?i)Item\s*8\b\.?",
    r"(?i)Item\s*8\b\s*[-–—:]",
    r"(?i)Item\s*8\b\s*[:\-–—]+\s*Financial",
    r"(?i)Item\s*8\b\s*Financial\s+Statements\s+and\s+Supplementary\s+Data",
    r"(?i)Item\s*8\b\s*Consolidated\s+Financial\s+Statements",
    r"(?i)Item\s*8\b\s*[\.\-–—:]?\s*<[^>]+>\s*Financial\s+Statements",
    r"(?i)Item\s*8\b\s*[:\-–—]*\s*(?:Balance\s+Sheet|Income\s+Statement|Cash\s+Flow\s+Statement)",
    r"(?i)Item\s*8\b\s*[:\-–—]*\s*Supplementary\s+Data",
    r"(?i)Item\s*Eight\b\s*[-–—:]?",
];

/// Compiled start and end marker phrasings. Built once and shared read-only.
#[derive(Debug, Clone)]
pub struct PatternSet {
    start: Vec<Regex>,
    end: Vec<Regex>,
}

impl PatternSet {
    pub fn new(start: &[&str], end: &[&str]) -> Result<Self, ExtractError> {
        Ok(Self {
            start: compile_all(start)?,
            end: compile_all(end)?,
        })
    }

    /// Marker phrasings for Item 7 (MD&A), ended by Item 7A or Item 8.
    pub fn item_7() -> Self {
        Self::new(ITEM_7_START_PATTERNS, ITEM_7_END_PATTERNS)
            .expect("built-in Item 7 patterns must compile")
    }

    pub fn start_patterns(&self) -> &[Regex] {
        &self.start
    }

    pub fn end_patterns(&self) -> &[Regex] {
        &self.end
    }
}

fn compile_all(patterns: &[&str]) -> Result<Vec<Regex>, ExtractError> {
    patterns
        .iter()
        .map(|pat| {
            Regex::new(pat).map_err(|source| ExtractError::Pattern {
                pattern: pat.to_string(),
                source,
            })
        })
        .collect()
}

/// One marker hit in a canonical text buffer.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MarkerMatch {
    pub start: usize,
    pub end: usize,
    pub text: String,
}

/// Resolved `[start, end)` byte range of the section within canonical text.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct SectionSpan {
    pub start: usize,
    pub end: usize,
}

impl SectionSpan {
    pub fn slice<'a>(&self, text: &'a str) -> &'a str {
        &text[self.start..self.end]
    }

    pub fn overlaps(&self, start: usize, end: usize) -> bool {
        start < self.end && end > self.start
    }
}

/// Why no section was produced. An ordinary outcome, not an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum NotFound {
    NoStartMarker,
    TooShort { chars: usize },
}

impl fmt::Display for NotFound {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NotFound::NoStartMarker => write!(f, "no Item 7 start marker"),
            NotFound::TooShort { chars } => {
                write!(f, "section body too short ({} chars)", chars)
            }
        }
    }
}

#[derive(Debug, Clone)]
pub struct BoundaryMatcher {
    patterns: PatternSet,
    min_section_chars: usize,
}

impl BoundaryMatcher {
    pub fn new(patterns: PatternSet, min_section_chars: usize) -> Self {
        Self { patterns, min_section_chars }
    }

    pub fn patterns(&self) -> &PatternSet {
        &self.patterns
    }

    /// Every start-marker hit, sorted by position. Phrasings that match the same
    /// header at the same offset count once (the longest hit is kept).
    pub fn start_matches(&self, text: &str) -> Vec<MarkerMatch> {
        let mut matches: Vec<MarkerMatch> = self
            .patterns
            .start
            .iter()
            .flat_map(|re| re.find_iter(text))
            .map(|m| MarkerMatch {
                start: m.start(),
                end: m.end(),
                text: m.as_str().to_string(),
            })
            .collect();

        matches.sort_by(|a, b| a.start.cmp(&b.start).then(b.end.cmp(&a.end)));
        matches.dedup_by_key(|m| m.start);
        matches
    }

    /// First hit of the highest-priority end phrasing found at or after `from`.
    pub fn end_match(&self, text: &str, from: usize) -> Option<MarkerMatch> {
        let haystack = text.get(from..)?;
        self.patterns.end.iter().find_map(|re| {
            re.find(haystack).map(|m| MarkerMatch {
                start: from + m.start(),
                end: from + m.end(),
                text: m.as_str().to_string(),
            })
        })
    }

    /// Resolves the section span. With two or more start hits the first one is
    /// taken to be the table of contents entry and skipped.
    pub fn locate(&self, text: &str) -> Result<SectionSpan, NotFound> {
        let starts = self.start_matches(text);
        let start = match starts.as_slice() {
            [] => return Err(NotFound::NoStartMarker),
            [only] => only,
            [toc, second, ..] => {
                tracing::debug!(
                    "Skipping first start marker '{}' at {} as table of contents",
                    toc.text,
                    toc.start
                );
                second
            }
        };

        let end = match self.end_match(text, start.end) {
            Some(end) => {
                tracing::debug!("End marker '{}' at {}", end.text, end.start);
                end.start
            }
            None => {
                tracing::debug!("No end marker after offset {}, section runs to end of document", start.end);
                text.len()
            }
        };

        let span = SectionSpan { start: start.start, end };
        let chars = span.slice(text).trim().chars().count();
        if chars < self.min_section_chars {
            return Err(NotFound::TooShort { chars });
        }
        Ok(span)
    }
}

impl Default for BoundaryMatcher {
    fn default() -> Self {
        Self::new(PatternSet::item_7(), MIN_SECTION_CHARS)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn body(len: usize) -> String {
        "Revenue increased due to higher volume. ".repeat(len / 40 + 1)
    }

    #[test]
    fn test_builtin_patterns_compile() {
        let set = PatternSet::item_7();
        assert_eq!(set.start_patterns().len(), ITEM_7_START_PATTERNS.len());
        assert_eq!(set.end_patterns().len(), ITEM_7_END_PATTERNS.len());
    }

    #[test]
    fn test_invalid_pattern_reported() {
        let err = PatternSet::new(&["(unclosed"], &[]).unwrap_err();
        assert!(matches!(err, ExtractError::Pattern { .. }));
    }

    #[test]
    fn test_single_match_is_the_start() {
        let text = format!("Cover page\n\nItem 7. Management's Discussion\n\n{}", body(200));
        let matcher = BoundaryMatcher::default();
        let span = matcher.locate(&text).unwrap();
        assert_eq!(span.start, text.find("Item 7.").unwrap());
        assert_eq!(span.end, text.len());
    }

    #[test]
    fn test_second_match_wins_regardless_of_later_matches() {
        let text = format!(
            "Item 7 ... 24\n\nItem 7. MD&A\n\n{}\n\nAs noted in Item 7, more.\n\nItem 7 again",
            body(200)
        );
        let matcher = BoundaryMatcher::default();
        let starts = matcher.start_matches(&text);
        assert!(starts.len() >= 3);
        let span = matcher.locate(&text).unwrap();
        assert_eq!(span.start, starts[1].start);
    }

    #[test]
    fn test_same_offset_phrasings_count_once() {
        let text = "Item 7. Management's Discussion and Analysis";
        let matcher = BoundaryMatcher::default();
        let starts = matcher.start_matches(text);
        assert_eq!(starts.len(), 1);
        assert_eq!(starts[0].start, 0);
        assert_eq!(starts[0].text, "Item 7. Management's Discussion and Analysis");
    }

    #[test]
    fn test_item_7a_is_not_a_start_marker() {
        let matcher = BoundaryMatcher::default();
        assert!(matcher.start_matches("Item 7A. Quantitative Disclosures").is_empty());
        assert!(matcher.start_matches("Item 70 and Item 17").is_empty());
    }

    #[test]
    fn test_toc_scenario_section_between_second_item_7_and_item_7a() {
        let real_body = body(160);
        let text = format!(
            "Table of Contents\n\nItem 7 Management's Discussion 23\n\nItem 7A Quantitative 40\n\n\
             Item 7 Management's Discussion and Analysis\n\n{}\n\nItem 7A Quantitative and Qualitative Disclosures",
            real_body
        );
        let matcher = BoundaryMatcher::default();
        let span = matcher.locate(&text).unwrap();
        let section = span.slice(&text);
        assert!(section.starts_with("Item 7 Management's Discussion and Analysis"));
        assert!(section.trim_end().ends_with(real_body.trim_end()));
        assert!(!section.contains("Item 7A"));
        assert_eq!(span.end, text.rfind("Item 7A").unwrap());
    }

    #[test]
    fn test_end_priority_beats_earliest_position() {
        // Item 8 appears before Item 7A, but Item 7A phrasings have priority.
        let text = format!(
            "Item 7. MD&A\n\n{}\n\nItem 8. Financial Statements\n\n{}\n\nItem 7A. Market Risk",
            body(150),
            body(150)
        );
        let matcher = BoundaryMatcher::default();
        let span = matcher.locate(&text).unwrap();
        assert_eq!(span.end, text.find("Item 7A").unwrap());
    }

    #[test]
    fn test_no_item_7_is_not_found() {
        let text = format!("Item 1. Business\n\n{}\n\nItem 8. Financial Statements", body(300));
        let matcher = BoundaryMatcher::default();
        assert_eq!(matcher.locate(&text), Err(NotFound::NoStartMarker));
    }

    #[test]
    fn test_short_span_is_not_found() {
        let text = "Item 7 ... 23\n\nItem 7. See annual report.\n\nItem 8. Financial Statements";
        let matcher = BoundaryMatcher::default();
        assert!(matches!(matcher.locate(text), Err(NotFound::TooShort { .. })));
    }

    #[test]
    fn test_min_section_chars_boundary() {
        let header = "Item 7. ";
        let filler = "x".repeat(MIN_SECTION_CHARS - header.len());
        let exact = format!("{}{}", header, filler);
        let matcher = BoundaryMatcher::default();
        assert!(matcher.locate(&exact).is_ok());
        let short = &exact[..exact.len() - 1];
        assert_eq!(
            matcher.locate(short),
            Err(NotFound::TooShort { chars: MIN_SECTION_CHARS - 1 })
        );
    }

    #[test]
    fn test_substituted_pattern_set() {
        let set = PatternSet::new(&[r"(?i)\bBEGIN\b"], &[r"(?i)\bSTOP\b"]).unwrap();
        let matcher = BoundaryMatcher::new(set, 5);
        let text = "BEGIN here is the body STOP trailing";
        let span = matcher.locate(text).unwrap();
        assert_eq!(span.slice(text), "BEGIN here is the body ");
    }

    // When the table of contents entry does not match any start phrasing, the
    // real header becomes the "first" hit and is skipped; a later cross-reference
    // is taken as the start instead. This pins the current heuristic.
    #[test]
    fn test_unmatched_toc_entry_discards_real_header() {
        let text = format!(
            "Contents: Management's Discussion ... 23\n\nItem 7. Management's Discussion\n\n{}\n\n\
             Refer to Item 7 above for liquidity. {}\n\nItem 7A. Market Risk",
            body(150),
            body(150)
        );
        let matcher = BoundaryMatcher::default();
        let span = matcher.locate(&text).unwrap();
        assert_eq!(span.start, text.find("Item 7 above").unwrap());
    }
}
