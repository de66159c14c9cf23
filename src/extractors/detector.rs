// src/extractors/detector.rs
//! Deciding whether a block of text carries row/column financial data.
//!
//! Two independent factors must agree: enough numeric tokens, and at least one
//! layout cue. Prose that merely quotes a few dollar figures fails the first;
//! a list of years or page numbers fails the second.

use once_cell::sync::Lazy;
use regex::Regex;

/// Minimum numeric/financial tokens before a block can be tabular.
pub const MIN_NUMERIC_TOKENS: usize = 5;
/// Blank-line breaks needed for the "stacked rows" cue.
pub const MIN_BLANK_LINE_BREAKS: usize = 2;
/// Runs of 5+ whitespace needed for the "aligned columns" cue.
pub const MIN_WIDE_GAPS: usize = 3;
/// Numeric tokens that must accompany parentheses for the "negative amounts" cue.
pub const MIN_TOKENS_WITH_PARENS: usize = 3;

pub const PERIOD_TERMS: &[&str] = &["december", "year ended", "three months", "quarter"];

// Currency amounts: $1,234.56
pub static CURRENCY_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\$[\d,]+(?:\.\d+)?").expect("Failed to compile CURRENCY_RE")
});

// Parenthesized negatives: ($1,234) or (1,234)
static NEGATIVE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\(\$?[\d,]+(?:\.\d+)?\)").expect("Failed to compile NEGATIVE_RE")
});

// Grouped-thousands integers (and plain short numbers): 1,234,567.8
static GROUPED_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d{1,3}(?:,\d{3})*(?:\.\d+)?\b").expect("Failed to compile GROUPED_RE")
});

// Percentages: 12.5%
static PERCENT_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b\d+\.\d+%").expect("Failed to compile PERCENT_RE")
});

static BLANK_LINE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\n[^\S\n]*\n").expect("Failed to compile BLANK_LINE_RE")
});

static WIDE_GAP_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\s{5,}").expect("Failed to compile WIDE_GAP_RE")
});

/// Raw measurements behind a tabular classification, kept for logging.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct TabularSignals {
    pub numeric_tokens: usize,
    pub blank_line_breaks: bool,
    pub wide_gaps: bool,
    pub period_vocabulary: bool,
    pub parenthesized_amounts: bool,
}

impl TabularSignals {
    pub fn measure(text: &str) -> Self {
        let numeric_tokens = CURRENCY_RE.find_iter(text).count()
            + NEGATIVE_RE.find_iter(text).count()
            + GROUPED_RE.find_iter(text).count()
            + PERCENT_RE.find_iter(text).count();

        let lower = text.to_lowercase();
        let opens = text.matches('(').count();
        let closes = text.matches(')').count();

        Self {
            numeric_tokens,
            blank_line_breaks: BLANK_LINE_RE.find_iter(text).count() >= MIN_BLANK_LINE_BREAKS,
            wide_gaps: WIDE_GAP_RE.find_iter(text).count() >= MIN_WIDE_GAPS,
            period_vocabulary: PERIOD_TERMS.iter().any(|term| lower.contains(term)),
            parenthesized_amounts: opens > 0
                && opens == closes
                && numeric_tokens >= MIN_TOKENS_WITH_PARENS,
        }
    }

    pub fn has_layout_cue(&self) -> bool {
        self.blank_line_breaks || self.wide_gaps || self.period_vocabulary || self.parenthesized_amounts
    }

    pub fn is_tabular(&self) -> bool {
        self.numeric_tokens >= MIN_NUMERIC_TOKENS && self.has_layout_cue()
    }
}

pub fn is_tabular(text: &str) -> bool {
    let signals = TabularSignals::measure(text);
    tracing::trace!("Tabular signals {:?}", signals);
    signals.is_tabular()
}
