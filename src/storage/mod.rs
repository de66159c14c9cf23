// src/storage/mod.rs
use std::fs;
use std::path::{Path, PathBuf};
use crate::edgar::FilingIdentity;
use crate::extractors::{ExtractionResult, SourceKind};
use crate::utils::error::StorageError;
use std::io::Write;

/// Flat output directory; every file of a filing shares the identity prefix.
pub struct StorageManager {
    base_dir: PathBuf,
}

impl StorageManager {
    /// Creates a new StorageManager with the specified base directory
    pub fn new<P: AsRef<Path>>(base_dir: P) -> Result<Self, StorageError> {
        let base_path = base_dir.as_ref().to_path_buf();

        if !base_path.exists() {
            fs::create_dir_all(&base_path).map_err(StorageError::IoError)?;
        }

        Ok(Self { base_dir: base_path })
    }

    pub fn base_dir(&self) -> &Path {
        &self.base_dir
    }

    pub fn pdf_path(&self, prefix: &str) -> PathBuf {
        self.base_dir.join(format!("{}.pdf", prefix))
    }

    pub fn html_path(&self, prefix: &str) -> PathBuf {
        self.base_dir.join(format!("{}.html", prefix))
    }

    pub fn text_path(&self, prefix: &str) -> PathBuf {
        self.base_dir.join(format!("{}.txt", prefix))
    }

    pub fn tables_path(&self, prefix: &str) -> PathBuf {
        self.base_dir.join(format!("{}_tables.json", prefix))
    }

    /// An earlier output that makes processing this source unnecessary.
    /// Output derived from markup (PDF or its HTML fallback) wins over plain text,
    /// so a text filing is also skipped when its HTML sibling was processed.
    pub fn existing_output(&self, prefix: &str, kind: SourceKind) -> Option<PathBuf> {
        let mut candidates = vec![self.pdf_path(prefix), self.html_path(prefix)];
        if kind == SourceKind::PlainText {
            candidates.push(self.text_path(prefix));
        }
        candidates.into_iter().find(|p| p.exists())
    }

    pub fn save_html(&self, prefix: &str, document: &str) -> Result<PathBuf, StorageError> {
        self.write_file(self.html_path(prefix), document.as_bytes())
    }

    pub fn save_text(&self, prefix: &str, text: &str) -> Result<PathBuf, StorageError> {
        self.write_file(self.text_path(prefix), text.as_bytes())
    }

    /// Saves the reconstructed tables and extraction metadata in JSON format
    pub fn save_tables(
        &self,
        identity: &FilingIdentity,
        source: &Path,
        result: &ExtractionResult,
    ) -> Result<PathBuf, StorageError> {
        let metadata = serde_json::json!({
            "cik": identity.cik,
            "form_type": identity.form_type,
            "filing_date": identity.filing_date,
            "source_file": source.display().to_string(),
            "source_kind": result.source_kind,
            "section_chars": result.section_text.chars().count(),
            "table_count": result.tables.len(),
            "tables": result.tables,
            "extraction_timestamp": chrono::Utc::now().to_rfc3339(),
        });

        let metadata_str = serde_json::to_string_pretty(&metadata)
            .map_err(|e| StorageError::SerializationError(e.to_string()))?;

        self.write_file(self.tables_path(&identity.output_prefix()), metadata_str.as_bytes())
    }

    fn write_file(&self, path: PathBuf, content: &[u8]) -> Result<PathBuf, StorageError> {
        let mut file = fs::File::create(&path).map_err(StorageError::IoError)?;
        file.write_all(content).map_err(StorageError::IoError)?;

        tracing::info!("Saved {}", path.display());
        Ok(path)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::extractors::tables::{Cell, Row, Table, TableOrigin};

    fn identity() -> FilingIdentity {
        FilingIdentity {
            cik: "0000320193".to_string(),
            form_type: "10-K".to_string(),
            filing_date: "2023_11_03".to_string(),
        }
    }

    #[test]
    fn test_new_creates_nested_directory() {
        let dir = tempfile::tempdir().unwrap();
        let out = dir.path().join("a").join("b");
        let storage = StorageManager::new(&out).unwrap();
        assert!(out.is_dir());
        assert_eq!(storage.base_dir(), out.as_path());
    }

    #[test]
    fn test_existing_output_rules() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let prefix = identity().output_prefix();

        assert_eq!(storage.existing_output(&prefix, SourceKind::Markup), None);

        storage.save_text(&prefix, "text").unwrap();
        assert_eq!(storage.existing_output(&prefix, SourceKind::Markup), None);
        assert_eq!(
            storage.existing_output(&prefix, SourceKind::PlainText),
            Some(storage.text_path(&prefix))
        );

        storage.save_html(&prefix, "<html></html>").unwrap();
        assert_eq!(
            storage.existing_output(&prefix, SourceKind::Markup),
            Some(storage.html_path(&prefix))
        );
    }

    #[test]
    fn test_tables_metadata_is_json() {
        let dir = tempfile::tempdir().unwrap();
        let storage = StorageManager::new(dir.path()).unwrap();
        let result = ExtractionResult {
            source_kind: SourceKind::Markup,
            section_text: "Item 7. body".to_string(),
            rendered_document: None,
            tables: vec![Table {
                id: "html_table_1".to_string(),
                origin: TableOrigin::Native,
                rows: vec![Row { cells: vec![Cell::new("$1,234")] }],
            }],
        };

        let path = storage
            .save_tables(&identity(), Path::new("in/doc.htm"), &result)
            .unwrap();
        assert!(path.ends_with("0000320193_10-K_2023_11_03_mdna_tables.json"));

        let value: serde_json::Value =
            serde_json::from_str(&fs::read_to_string(&path).unwrap()).unwrap();
        assert_eq!(value["source_kind"], "markup");
        assert_eq!(value["table_count"], 1);
        assert_eq!(value["tables"][0]["origin"], "native");
        assert_eq!(value["tables"][0]["rows"][0]["cells"][0]["text"], "$1,234");
        assert!(value["extraction_timestamp"].is_string());
    }
}
