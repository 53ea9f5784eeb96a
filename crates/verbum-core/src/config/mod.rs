mod env;
mod types;

#[cfg(test)]
mod tests;

pub use types::*;

use std::path::{Path, PathBuf};
use std::time::Duration;

use verbum_index::{ChunkerConfig, HierarchyConfig};

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("invalid configuration: {0}")]
    Invalid(String),
}

impl Config {
    /// Load configuration from a TOML file with env var overrides.
    ///
    /// Falls back to defaults when the file does not exist.
    ///
    /// # Errors
    ///
    /// Returns an error if the file exists but cannot be read or parsed, or if the
    /// resulting values are out of range.
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let mut config = if path.exists() {
            let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
                path: path.to_path_buf(),
                source,
            })?;
            toml::from_str::<Self>(&content)?
        } else {
            tracing::debug!(path = %path.display(), "config file not found, using defaults");
            Self::default()
        };

        config.apply_env_overrides();
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns `Invalid` naming the first out-of-range value.
    pub fn validate(&self) -> Result<(), ConfigError> {
        let checks = [
            (self.chunking.max_chars == 0, "chunking.max_chars must be positive"),
            (self.retrieval.max_chunks == 0, "retrieval.max_chunks must be positive"),
            (
                self.retrieval.context_budget_chars == 0,
                "retrieval.context_budget_chars must be positive",
            ),
            (
                self.chunking.max_chars.saturating_add(crate::prompt::EXCERPT_MARKUP_RESERVE)
                    > self.retrieval.context_budget_chars,
                "retrieval.context_budget_chars must hold one chunk of chunking.max_chars plus excerpt markup",
            ),
            (self.answer.max_tokens == 0, "answer.max_tokens must be positive"),
            (self.embedding.dims == 0, "embedding.dims must be positive"),
            (
                self.embedding.cache_capacity == 0,
                "embedding.cache_capacity must be positive",
            ),
            (
                self.embedding.max_input_chars == 0,
                "embedding.max_input_chars must be positive",
            ),
            (
                self.collection.index_parallelism == 0,
                "collection.index_parallelism must be positive",
            ),
            (
                self.hierarchy.folder_sample_limit == 0,
                "hierarchy.folder_sample_limit must be positive",
            ),
            (self.timeouts.llm_seconds == 0, "timeouts.llm_seconds must be positive"),
            (
                self.timeouts.embedding_seconds == 0,
                "timeouts.embedding_seconds must be positive",
            ),
            (
                self.timeouts.extraction_seconds == 0,
                "timeouts.extraction_seconds must be positive",
            ),
            (
                self.timeouts.query_seconds == 0,
                "timeouts.query_seconds must be positive",
            ),
        ];
        match checks.into_iter().find(|(failed, _)| *failed) {
            Some((_, message)) => Err(ConfigError::Invalid(message.to_owned())),
            None => Ok(()),
        }
    }

    #[must_use]
    pub fn chunker_config(&self) -> ChunkerConfig {
        ChunkerConfig {
            max_chars: self.chunking.max_chars,
            detect_chapters: self.chunking.detect_chapters,
        }
    }

    #[must_use]
    pub fn hierarchy_config(&self) -> HierarchyConfig {
        HierarchyConfig {
            folder_sample_limit: self.hierarchy.folder_sample_limit,
            preview_chars: self.hierarchy.preview_chars,
            profile_anchor: self.hierarchy.profile_anchor,
        }
    }

    /// Profile location, resolved against the collection root when relative.
    #[must_use]
    pub fn profile_path(&self) -> PathBuf {
        if self.hierarchy.profile_path.is_absolute() {
            self.hierarchy.profile_path.clone()
        } else {
            self.collection.root.join(&self.hierarchy.profile_path)
        }
    }
}

impl TimeoutConfig {
    #[must_use]
    pub fn llm(&self) -> Duration {
        Duration::from_secs(self.llm_seconds)
    }

    #[must_use]
    pub fn embedding(&self) -> Duration {
        Duration::from_secs(self.embedding_seconds)
    }

    #[must_use]
    pub fn extraction(&self) -> Duration {
        Duration::from_secs(self.extraction_seconds)
    }

    #[must_use]
    pub fn query(&self) -> Duration {
        Duration::from_secs(self.query_seconds)
    }
}
