// src/lib.rs
pub mod batch;
pub mod edgar;
pub mod extractors;
pub mod render;
pub mod storage;
pub mod utils;

pub use extractors::{extract_section, Extraction, ExtractionResult, Extractor, SourceKind};
pub use utils::AppError;
