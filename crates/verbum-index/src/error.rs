use std::path::PathBuf;

use crate::embedding::EmbedError;

#[derive(Debug, thiserror::Error)]
pub enum IndexError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("file too large: {size} bytes (limit {limit})")]
    FileTooLarge { size: u64, limit: u64 },

    #[error("failed to extract text from {path}: {message}")]
    Extraction { path: PathBuf, message: String },

    #[error("extraction of {path} timed out")]
    ExtractionTimeout { path: PathBuf },

    #[error("collection root {0} is not a directory")]
    NotADirectory(PathBuf),

    #[error("directory walk failed: {0}")]
    Walk(#[from] ignore::Error),

    #[error("profile is not valid JSON: {0}")]
    Profile(#[from] serde_json::Error),

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbedError),
}

pub type Result<T> = std::result::Result<T, IndexError>;
