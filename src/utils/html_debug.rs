// src/utils/html_debug.rs
use std::fs::File;
use std::io::Write;
use std::path::Path;
use crate::extractors::BoundaryMatcher;
use crate::utils::error::AppError;

/// Saves canonical text as HTML with the given `(start, end, kind)` ranges highlighted.
/// Overlapping ranges are dropped after the first.
pub fn save_debug_html(text: &str, filename: &Path, highlights: &[(usize, usize, &str)]) -> Result<(), AppError> {
    let mut file = File::create(filename)?;

    let mut debug_html = String::from("<!DOCTYPE html>\n<html>\n<head>\n<meta charset=\"UTF-8\">\n<style>\n");
    debug_html.push_str("body { white-space: pre-wrap; font-family: monospace; }\n");
    debug_html.push_str(".highlight-start { background-color: #FFFF00; }\n");
    debug_html.push_str(".highlight-toc { background-color: #D3D3D3; }\n");
    debug_html.push_str(".highlight-end { background-color: #FFA500; }\n");
    debug_html.push_str(".highlight-custom { background-color: #FFC0CB; }\n");
    debug_html.push_str("</style>\n</head>\n<body>\n");

    let mut last_pos = 0;
    let mut sorted_highlights = highlights.to_vec();
    sorted_highlights.sort_by_key(|h| h.0);

    for (start, end, highlight_type) in sorted_highlights {
        if start < last_pos || end > text.len() || start >= end {
            continue;
        }
        debug_html.push_str(&html_escape::encode_text(&text[last_pos..start]));

        let css_class = match highlight_type {
            "start" => "highlight-start",
            "toc" => "highlight-toc",
            "end" => "highlight-end",
            _ => "highlight-custom",
        };

        debug_html.push_str(&format!(
            "<span class=\"{}\" title=\"Position: {}-{}, Type: {}\">",
            css_class, start, end, highlight_type
        ));
        debug_html.push_str(&html_escape::encode_text(&text[start..end]));
        debug_html.push_str("</span>");

        last_pos = end;
    }

    debug_html.push_str(&html_escape::encode_text(&text[last_pos..]));
    debug_html.push_str("\n</body>\n</html>");

    file.write_all(debug_html.as_bytes())?;

    tracing::info!("Saved debug HTML to {}", filename.display());
    Ok(())
}

/// Marker hits the matcher sees in `text`: the skipped table-of-contents hit,
/// the remaining start hits, and every end-marker hit after the first start.
pub fn boundary_highlights(text: &str, matcher: &BoundaryMatcher) -> Vec<(usize, usize, &'static str)> {
    let starts = matcher.start_matches(text);
    let mut highlights: Vec<(usize, usize, &'static str)> = starts
        .iter()
        .enumerate()
        .map(|(i, m)| {
            let kind = if i == 0 && starts.len() > 1 { "toc" } else { "start" };
            (m.start, m.end, kind)
        })
        .collect();

    let from = starts.first().map_or(0, |m| m.end);
    if let Some(tail) = text.get(from..) {
        for re in matcher.patterns().end_patterns() {
            highlights.extend(re.find_iter(tail).map(|m| (from + m.start(), from + m.end(), "end")));
        }
    }
    highlights
}

/// Writes the canonical text of a filing with its boundary markers highlighted.
pub fn create_debug_html(text: &str, filename: &Path, matcher: &BoundaryMatcher) -> Result<(), AppError> {
    save_debug_html(text, filename, &boundary_highlights(text, matcher))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_annotation_marks_toc_start_and_end() {
        let text = "Contents: Item 7. MD&A ... Item 8.\n\nItem 7. MD&A <body>\n\nItem 7A. Market risk";
        let matcher = BoundaryMatcher::default();
        let highlights = boundary_highlights(text, &matcher);
        assert!(highlights.iter().any(|h| h.2 == "toc" && h.0 == 10));
        assert!(highlights.iter().any(|h| h.2 == "start" && h.0 == text.rfind("Item 7.").unwrap()));
        assert!(highlights.iter().any(|h| h.2 == "end" && h.0 == text.find("Item 7A").unwrap()));

        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("annotated.html");
        create_debug_html(text, &path, &matcher).unwrap();
        let html = std::fs::read_to_string(&path).unwrap();
        assert!(html.contains("class=\"highlight-toc\""));
        assert!(html.contains("&lt;body&gt;"));
        assert!(html.contains("Market risk"));
    }
}
