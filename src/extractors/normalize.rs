// src/extractors/normalize.rs
//! Canonical text for boundary matching.
//!
//! Filings encode the same whitespace a dozen ways (`&nbsp;`, `&#160;`, raw U+00A0,
//! Unicode space separators) and hard-wrap paragraphs at arbitrary columns. Everything
//! downstream works on the canonical form produced here: one space between words, one
//! blank line between paragraphs.

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

static CONTROL_CHARS_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"[\x00-\x08\x0B\x0C\x0E-\x1F\x7F]").expect("Failed to compile CONTROL_CHARS_RE")
});

// Upper bound on entity-decoding rounds; `&amp;amp;...` chains are never this deep in practice.
const MAX_DECODE_ROUNDS: usize = 8;

// Decimal and hex character references; only those naming whitespace are rewritten.
static NUMERIC_REFERENCE_RE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"&#(?:[xX]([0-9a-fA-F]{1,6})|([0-9]{1,7}));").expect("Failed to compile NUMERIC_REFERENCE_RE")
});

const NBSP_ENTITY: &str = "&nbsp;";

const TEXT_ENTITIES: [(&str, &str); 5] = [
    ("&lt;", "<"),
    ("&gt;", ">"),
    ("&quot;", "\""),
    ("&#39;", "'"),
    ("&amp;", "&"),
];

fn strip_controls(text: &str) -> String {
    let unified = text.replace("\r\n", "\n").replace('\r', "\n");
    CONTROL_CHARS_RE.replace_all(&unified, "").into_owned()
}

fn whitespace_reference(caps: &Captures) -> String {
    let code = match (caps.get(1), caps.get(2)) {
        (Some(hex), _) => u32::from_str_radix(hex.as_str(), 16).ok(),
        (_, Some(dec)) => dec.as_str().parse::<u32>().ok(),
        _ => None,
    };
    match code.and_then(char::from_u32) {
        // line breaks stay encoded; they carry layout inside <pre>
        Some('\n') | Some('\r') => caps[0].to_string(),
        Some(c) if c.is_whitespace() => " ".to_string(),
        _ => caps[0].to_string(),
    }
}

/// Every encoding of a space-like character becomes a plain space: the raw
/// no-break space, `&nbsp;`, and numeric references such as `&#160;`, `&#x20;`
/// or `&#8201;`.
fn spaces_for_nbsp(text: &str) -> String {
    let out = text.replace('\u{a0}', " ").replace(NBSP_ENTITY, " ");
    if !out.contains("&#") {
        return out;
    }
    NUMERIC_REFERENCE_RE.replace_all(&out, whitespace_reference).into_owned()
}

/// Decodes the entities needed for matching until nothing changes, so that
/// decoding is idempotent even for double-escaped input.
fn decode_entities(text: &str) -> String {
    let mut current = text.to_string();
    for _ in 0..MAX_DECODE_ROUNDS {
        if !current.contains('&') {
            break;
        }
        let mut next = spaces_for_nbsp(&current);
        for (entity, replacement) in TEXT_ENTITIES {
            next = next.replace(entity, replacement);
        }
        if next == current {
            break;
        }
        current = next;
    }
    current
}

/// Collapses a run of text to single spaces between words. Every Unicode
/// whitespace character (no-break space, U+2000..U+200A, U+3000, ...) counts.
pub fn collapse_inline(text: &str) -> String {
    text.split_whitespace().collect::<Vec<_>>().join(" ")
}

/// Produces canonical text: stable whitespace, soft wraps joined, paragraph
/// breaks kept as exactly one blank line.
pub fn normalize(text: &str) -> String {
    let decoded = decode_entities(&strip_controls(text));

    let mut paragraphs: Vec<String> = Vec::new();
    let mut current: Vec<&str> = Vec::new();
    for line in decoded.split('\n') {
        if line.trim().is_empty() {
            if !current.is_empty() {
                paragraphs.push(collapse_inline(&current.join(" ")));
                current.clear();
            }
        } else {
            current.push(line);
        }
    }
    if !current.is_empty() {
        paragraphs.push(collapse_inline(&current.join(" ")));
    }

    paragraphs.retain(|p| !p.is_empty());
    paragraphs.join("\n\n")
}

/// Pre-parse pass for markup. Entity decoding is left to the HTML parser so an
/// escaped `&lt;` in prose can never turn into a tag.
pub fn clean_markup(html: &str) -> String {
    spaces_for_nbsp(&strip_controls(html))
}

/// Pre-match pass for plain-text filings. Horizontal runs of spaces are kept:
/// column alignment is the only table structure a text filing has.
pub fn clean_plain(text: &str) -> String {
    spaces_for_nbsp(&strip_controls(text))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_soft_wraps_join_and_paragraphs_survive() {
        let raw = "Item 7.\nManagement's   Discussion\n\n\n\nOur revenue\ngrew.\n";
        assert_eq!(normalize(raw), "Item 7. Management's Discussion\n\nOur revenue grew.");
    }

    #[test]
    fn test_whitespace_encodings_collapse() {
        let raw = "Item&nbsp;7&#160;-\u{a0}MD&amp;A\u{2003}\u{3000}Overview\t\tNow";
        assert_eq!(normalize(raw), "Item 7 - MD&A Overview Now");
    }

    #[test]
    fn test_numeric_whitespace_references_collapse() {
        let raw = "Item&#32;7.&#x20;Management&#8201;Discussion&#x2003;and&#X200A;Analysis&#65;";
        assert_eq!(normalize(raw), "Item 7. Management Discussion and Analysis&#65;");
        assert_eq!(normalize("a&#xA0;b&#160;c&#x3000;d"), "a b c d");
        assert_eq!(clean_plain("Revenue&#8194;&#8194;$1"), "Revenue  $1");
        assert_eq!(clean_markup("<pre>a&#10;b</pre>"), "<pre>a&#10;b</pre>");
    }

    #[test]
    fn test_control_chars_removed() {
        assert_eq!(normalize("Ite\x00m\x07 7\x1F"), "Item 7");
        assert_eq!(normalize("a\r\n\r\nb"), "a\n\nb");
    }

    #[test]
    fn test_empty_input() {
        assert_eq!(normalize(""), "");
        assert_eq!(normalize(" \n \n\t"), "");
    }

    #[test]
    fn test_normalize_is_idempotent() {
        let samples = [
            "Item 7.\n\n\n  MANAGEMENT'S DISCUSSION \n and analysis",
            "&amp;amp;lt; nested &amp;nbsp; escapes &amp;#39;",
            "a \n b\n\n c \n\n\n\n d",
            "tabs\t\tand\u{2009}thin\u{202f}spaces\r\nCRLF\r\rlines",
            "   ",
            "Revenue    $1,234    $2,345\nExpenses   $500     $600",
        ];
        for sample in samples {
            let once = normalize(sample);
            assert_eq!(normalize(&once), once, "not idempotent for {:?}", sample);
        }
    }

    #[test]
    fn test_clean_markup_keeps_escaped_tags_escaped() {
        let cleaned = clean_markup("<p>a &lt;b&gt;&nbsp;c</p>");
        assert_eq!(cleaned, "<p>a &lt;b&gt; c</p>");
    }

    #[test]
    fn test_clean_plain_keeps_alignment() {
        let cleaned = clean_plain("Revenue    $1,234\r\nTotal\u{a0}\u{a0}\u{a0}$9");
        assert_eq!(cleaned, "Revenue    $1,234\nTotal   $9");
    }
}
