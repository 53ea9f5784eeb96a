use serde::Serialize;
use serde::ser::SerializeStruct;

/// Stable, machine-readable failure kind of a query.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    InvalidQuery,
    UnknownDocument,
    NotQueryable,
    ExtractionError,
    EmptyDocument,
    ContextTooLarge,
    ModelTimeout,
    ModelUnavailable,
    ModelError,
    EmptyAnswer,
}

impl ErrorKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::InvalidQuery => "invalid_query",
            Self::UnknownDocument => "unknown_document",
            Self::NotQueryable => "not_queryable",
            Self::ExtractionError => "extraction_error",
            Self::EmptyDocument => "empty_document",
            Self::ContextTooLarge => "context_too_large",
            Self::ModelTimeout => "model_timeout",
            Self::ModelUnavailable => "model_unavailable",
            Self::ModelError => "model_error",
            Self::EmptyAnswer => "empty_answer",
        }
    }
}

impl std::fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum QueryError {
    #[error("query text is empty")]
    InvalidQuery,

    #[error("no document at {0:?}")]
    UnknownDocument(String),

    #[error("{0:?} cannot be queried")]
    NotQueryable(String),

    #[error("could not extract {document:?}: {reason}")]
    Extraction { document: String, reason: String },

    #[error("{0:?} has no extractable text")]
    EmptyDocument(String),

    #[error("prompt exceeds the model context even with {chunks} chunk(s)")]
    ContextTooLarge { chunks: usize },

    #[error("model did not answer within {seconds}s")]
    ModelTimeout { seconds: u64 },

    #[error("model unavailable after {attempts} attempt(s): {message}")]
    ModelUnavailable { attempts: u32, message: String },

    #[error("model rejected the request: {0}")]
    ModelError(String),

    #[error("model returned an empty answer")]
    EmptyAnswer,
}

impl QueryError {
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidQuery => ErrorKind::InvalidQuery,
            Self::UnknownDocument(_) => ErrorKind::UnknownDocument,
            Self::NotQueryable(_) => ErrorKind::NotQueryable,
            Self::Extraction { .. } => ErrorKind::ExtractionError,
            Self::EmptyDocument(_) => ErrorKind::EmptyDocument,
            Self::ContextTooLarge { .. } => ErrorKind::ContextTooLarge,
            Self::ModelTimeout { .. } => ErrorKind::ModelTimeout,
            Self::ModelUnavailable { .. } => ErrorKind::ModelUnavailable,
            Self::ModelError(_) => ErrorKind::ModelError,
            Self::EmptyAnswer => ErrorKind::EmptyAnswer,
        }
    }
}

/// Serializes as `{ "kind": ..., "message": ... }`.
impl Serialize for QueryError {
    fn serialize<S: serde::Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        let mut s = serializer.serialize_struct("QueryError", 2)?;
        s.serialize_field("kind", &self.kind())?;
        s.serialize_field("message", &self.to_string())?;
        s.end()
    }
}
