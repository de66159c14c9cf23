// src/extractors/mod.rs
pub mod assemble;
pub mod boundary;
pub mod decode;
pub mod detector;
pub mod flow;
pub mod normalize;
pub mod section;
pub mod tables;

// Re-export key extraction types for convenience
pub use boundary::{BoundaryMatcher, MarkerMatch, NotFound, PatternSet, SectionSpan};
pub use section::{
    extract_section, Extraction, ExtractionResult, Extractor, ExtractorConfig, SourceKind,
};
pub use tables::{Cell, CellKind, Row, Table, TableOrigin, TableReconstructor, TableStrategy};
