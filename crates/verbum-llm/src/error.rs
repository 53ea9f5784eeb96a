use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("HTTP request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("JSON parse failed: {0}")]
    Json(#[from] serde_json::Error),

    /// `retry_after` is the server's hint, when it sent one.
    #[error("rate limited")]
    RateLimited { retry_after: Option<Duration> },

    #[error("request to {provider} timed out")]
    Timeout { provider: String },

    #[error("prompt exceeds the context window of {provider}")]
    ContextTooLarge { provider: String },

    #[error("provider unavailable: {0}")]
    Unavailable(String),

    #[error("{provider} rejected the request (status {status}): {message}")]
    Rejected {
        provider: String,
        status: u16,
        message: String,
    },

    #[error("empty response from {provider}")]
    EmptyResponse { provider: String },

    #[error("embedding not supported by {provider}")]
    EmbedUnsupported { provider: String },

    #[error("{0}")]
    Other(String),
}

impl LlmError {
    /// Whether a retry of the same request may succeed.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            Self::Http(_) | Self::RateLimited { .. } | Self::Timeout { .. } | Self::Unavailable(_)
        )
    }

    /// Minimum wait the server asked for before the next attempt.
    #[must_use]
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after } => *retry_after,
            _ => None,
        }
    }

    #[must_use]
    pub fn is_context_overflow(&self) -> bool {
        matches!(self, Self::ContextTooLarge { .. })
    }
}

/// Heuristic match for provider error bodies that report an oversized prompt.
pub(crate) fn mentions_context_overflow(body: &str) -> bool {
    let lower = body.to_lowercase();
    lower.contains("context_length_exceeded")
        || lower.contains("maximum context length")
        || lower.contains("context window")
        || lower.contains("too many tokens")
        || (lower.contains("context") && lower.contains("exceed"))
}

pub type Result<T> = std::result::Result<T, LlmError>;
