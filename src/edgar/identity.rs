// src/edgar/identity.rs
//! Who filed what, and when, as far as a downloaded file can tell us.
//!
//! Filings arrive in directory trees laid out by the download tooling, so the
//! CIK and filing date come from the path. The form type is read from the cover
//! page.

use chrono::{DateTime, Local};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Characters of the document examined for the form type.
pub const SNIPPET_CHARS: usize = 3000;
pub const DEFAULT_FORM_TYPE: &str = "10-K";
pub const UNKNOWN_CIK: &str = "unknown";

// --- Regex Patterns ---
static CIK_DIR_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"cik_([0-9]{10})").expect("Failed to compile CIK_DIR_RE"));

static TEN_DIGITS_RE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\b\d{10}\b").expect("Failed to compile TEN_DIGITS_RE"));

static FORM_TYPE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(?i)\bFORM\b\s*(10[-\s]*K(?:\s*/A)?)").expect("Failed to compile FORM_TYPE_RE")
});

static PATH_DATE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"(\d{4})[-_](\d{2})[-_](\d{2})").expect("Failed to compile PATH_DATE_RE")
});

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FilingIdentity {
    pub cik: String,
    pub form_type: String,
    /// `YYYY_MM_DD`
    pub filing_date: String,
}

impl FilingIdentity {
    /// Resolves identity from the file location and the start of its text.
    /// Falls back to the file's modification time when the path has no date.
    pub fn resolve(path: &Path, text: &str) -> Self {
        let snippet: String = text.chars().take(SNIPPET_CHARS).collect();
        Self {
            cik: cik_from_path(path),
            form_type: form_type_from_text(&snippet),
            filing_date: filing_date_from_path(path).unwrap_or_else(|| modified_date(path)),
        }
    }

    /// File stem shared by every output of this filing, e.g.
    /// `0000320193_10-K_2023_11_03_mdna`.
    pub fn output_prefix(&self) -> String {
        format!(
            "{}_{}_{}_mdna",
            self.cik,
            self.form_type.replace('/', "-"),
            self.filing_date
        )
    }
}

fn path_text(path: &Path) -> String {
    path.to_string_lossy().replace('\\', "/")
}

pub fn cik_from_path(path: &Path) -> String {
    let text = path_text(path);
    CIK_DIR_RE
        .captures(&text)
        .map(|caps| caps[1].to_string())
        .or_else(|| TEN_DIGITS_RE.find(&text).map(|m| m.as_str().to_string()))
        .unwrap_or_else(|| UNKNOWN_CIK.to_string())
}

pub fn form_type_from_text(text: &str) -> String {
    FORM_TYPE_RE
        .captures(text)
        .map(|caps| caps[1].split_whitespace().collect::<String>().to_uppercase())
        .unwrap_or_else(|| DEFAULT_FORM_TYPE.to_string())
}

pub fn filing_date_from_path(path: &Path) -> Option<String> {
    let text = path_text(path);
    PATH_DATE_RE
        .captures(&text)
        .map(|caps| format!("{}_{}_{}", &caps[1], &caps[2], &caps[3]))
}

fn modified_date(path: &Path) -> String {
    let modified: DateTime<Local> = match path.metadata().and_then(|m| m.modified()) {
        Ok(time) => time.into(),
        Err(e) => {
            tracing::warn!("No modification time for {}: {}", path.display(), e);
            Local::now()
        }
    };
    modified.format("%Y_%m_%d").to_string()
}
