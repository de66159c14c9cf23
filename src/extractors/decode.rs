// src/extractors/decode.rs
//! Raw filing bytes to text.
//!
//! Filings are mostly ASCII or UTF-8, but older ones are Windows-1252 or Latin-1
//! and a few carry a BOM. Binary content (images, PDFs renamed to .htm) is rejected.

use crate::utils::error::ExtractError;
use chardetng::EncodingDetector;
use encoding_rs::{Encoding, WINDOWS_1252};

/// Share of NUL bytes (in tenths) above which content is treated as binary.
const MAX_NUL_TENTHS: usize = 1;

/// Decodes a document, trying in order: BOM, strict UTF-8, a `chardetng` guess,
/// and Windows-1252.
pub fn decode_document(raw: &[u8]) -> Result<String, ExtractError> {
    if let Some((encoding, bom_len)) = Encoding::for_bom(raw) {
        tracing::debug!("Decoding with BOM-declared {}", encoding.name());
        let (text, had_errors) = encoding.decode_without_bom_handling(&raw[bom_len..]);
        if had_errors {
            tracing::warn!("Replaced invalid {} sequences", encoding.name());
        }
        return Ok(text.into_owned());
    }

    let nuls = raw.iter().filter(|&&b| b == 0).count();
    if nuls * 10 > raw.len() * MAX_NUL_TENTHS {
        return Err(ExtractError::UnsupportedEncoding(format!(
            "{} of {} bytes are NUL, content looks binary",
            nuls,
            raw.len()
        )));
    }

    if let Ok(text) = std::str::from_utf8(raw) {
        return Ok(text.to_string());
    }

    let mut detector = EncodingDetector::new();
    detector.feed(raw, true);
    let (guess, confident) = detector.guess_assess(None, true);
    tracing::debug!("Detected {} (confident: {})", guess.name(), confident);

    for encoding in [guess, WINDOWS_1252] {
        if let Some(text) = encoding.decode_without_bom_handling_and_without_replacement(raw) {
            return Ok(text.into_owned());
        }
        tracing::debug!("{} could not decode the document", encoding.name());
    }

    Err(ExtractError::UnsupportedEncoding(format!(
        "no decoder accepted the content (guessed {})",
        guess.name()
    )))
}
