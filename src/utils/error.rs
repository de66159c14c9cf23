// src/utils/error.rs
use thiserror::Error;

// Errors raised while turning one document into an extraction result.
// A missing section is not an error; see `extractors::NotFound`.
#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("Unsupported encoding: {0}")]
    UnsupportedEncoding(String),

    #[error("Malformed element {element}: {reason}")]
    MalformedElement { element: String, reason: String },

    #[error("Invalid pattern '{pattern}': {source}")]
    Pattern {
        pattern: String,
        #[source]
        source: regex::Error,
    },
}

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

#[derive(Error, Debug)]
pub enum RenderError {
    #[error("Renderer could not be started: {0}")]
    Spawn(#[source] std::io::Error),

    #[error("Renderer exited with status {status}: {stderr}")]
    Failed { status: i32, stderr: String },

    #[error("I/O error while rendering: {0}")]
    Io(#[from] std::io::Error),
}

#[derive(Error, Debug)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error), // Automatically convert IO errors

    #[error("Extraction failed: {0}")]
    Extraction(#[from] ExtractError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Rendering failed: {0}")]
    Render(#[from] RenderError),

    #[error("Data processing failed: {0}")]
    Processing(String),
}
