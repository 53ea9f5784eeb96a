use std::path::PathBuf;

use serde::{Deserialize, Serialize};
use verbum_index::DistanceMetric;

use crate::citation::QuoteVerification;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub collection: CollectionConfig,
    #[serde(default)]
    pub llm: LlmConfig,
    #[serde(default)]
    pub embedding: EmbeddingConfig,
    #[serde(default)]
    pub chunking: ChunkingConfig,
    #[serde(default)]
    pub retrieval: RetrievalConfig,
    #[serde(default)]
    pub answer: AnswerConfig,
    #[serde(default)]
    pub timeouts: TimeoutConfig,
    #[serde(default)]
    pub hierarchy: HierarchySettings,
    #[serde(skip)]
    pub secrets: ResolvedSecrets,
}

/// Secrets read from the environment, never from the config file.
#[derive(Default)]
pub struct ResolvedSecrets {
    pub openai_api_key: Option<String>,
}

impl std::fmt::Debug for ResolvedSecrets {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ResolvedSecrets")
            .field(
                "openai_api_key",
                &self.openai_api_key.as_ref().map(|_| "[REDACTED]"),
            )
            .finish()
    }
}

fn default_root() -> PathBuf {
    PathBuf::from(".")
}

fn default_max_file_size() -> u64 {
    verbum_index::DEFAULT_MAX_FILE_SIZE
}

fn default_index_parallelism() -> usize {
    4
}

#[derive(Debug, Deserialize, Serialize)]
pub struct CollectionConfig {
    #[serde(default = "default_root")]
    pub root: PathBuf,
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
    /// Documents extracted concurrently by `index_all`.
    #[serde(default = "default_index_parallelism")]
    pub index_parallelism: usize,
}

impl Default for CollectionConfig {
    fn default() -> Self {
        Self {
            root: default_root(),
            max_file_size: default_max_file_size(),
            index_parallelism: default_index_parallelism(),
        }
    }
}

/// LLM provider backend selector.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ProviderKind {
    #[default]
    Ollama,
    OpenAi,
}

impl ProviderKind {
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Ollama => "ollama",
            Self::OpenAi => "openai",
        }
    }
}

impl std::fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

fn default_base_url() -> String {
    "http://localhost:11434".into()
}

fn default_model() -> String {
    "mistral:7b".into()
}

fn default_embedding_model() -> String {
    "nomic-embed-text".into()
}

fn default_temperature() -> f32 {
    0.7
}

#[derive(Debug, Deserialize, Serialize)]
pub struct LlmConfig {
    #[serde(default)]
    pub provider: ProviderKind,
    #[serde(default = "default_base_url")]
    pub base_url: String,
    #[serde(default = "default_model")]
    pub model: String,
    #[serde(default = "default_embedding_model")]
    pub embedding_model: String,
    #[serde(default = "default_temperature")]
    pub temperature: f32,
    /// Overrides the context window the provider reports.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub context_window: Option<usize>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub openai: Option<OpenAiConfig>,
}

impl Default for LlmConfig {
    fn default() -> Self {
        Self {
            provider: ProviderKind::default(),
            base_url: default_base_url(),
            model: default_model(),
            embedding_model: default_embedding_model(),
            temperature: default_temperature(),
            context_window: None,
            openai: None,
        }
    }
}

fn default_openai_base_url() -> String {
    "https://api.openai.com/v1".into()
}

fn default_openai_model() -> String {
    "gpt-4".into()
}

fn default_openai_embedding_model() -> Option<String> {
    Some("text-embedding-ada-002".into())
}

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct OpenAiConfig {
    #[serde(default = "default_openai_base_url")]
    pub base_url: String,
    #[serde(default = "default_openai_model")]
    pub model: String,
    #[serde(default = "default_openai_embedding_model")]
    pub embedding_model: Option<String>,
}

impl Default for OpenAiConfig {
    fn default() -> Self {
        Self {
            base_url: default_openai_base_url(),
            model: default_openai_model(),
            embedding_model: default_openai_embedding_model(),
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum EmbeddingBackend {
    /// The configured provider's embedding endpoint.
    #[default]
    Provider,
    /// Local feature hashing; no network.
    Hashing,
}

fn default_dims() -> usize {
    256
}

fn default_max_input_chars() -> usize {
    8191
}

fn default_cache_capacity() -> usize {
    verbum_index::embedding::DEFAULT_CACHE_CAPACITY
}

#[derive(Debug, Deserialize, Serialize)]
pub struct EmbeddingConfig {
    #[serde(default)]
    pub backend: EmbeddingBackend,
    #[serde(default)]
    pub metric: DistanceMetric,
    /// Dimensionality of the hashing backend.
    #[serde(default = "default_dims")]
    pub dims: usize,
    #[serde(default = "default_max_input_chars")]
    pub max_input_chars: usize,
    /// Representations kept in memory; the oldest are evicted first.
    #[serde(default = "default_cache_capacity")]
    pub cache_capacity: usize,
}

impl Default for EmbeddingConfig {
    fn default() -> Self {
        Self {
            backend: EmbeddingBackend::default(),
            metric: DistanceMetric::default(),
            dims: default_dims(),
            max_input_chars: default_max_input_chars(),
            cache_capacity: default_cache_capacity(),
        }
    }
}

fn default_max_chars() -> usize {
    2000
}

fn default_true() -> bool {
    true
}

#[derive(Debug, Deserialize, Serialize)]
pub struct ChunkingConfig {
    #[serde(default = "default_max_chars")]
    pub max_chars: usize,
    #[serde(default = "default_true")]
    pub detect_chapters: bool,
}

impl Default for ChunkingConfig {
    fn default() -> Self {
        Self {
            max_chars: default_max_chars(),
            detect_chapters: true,
        }
    }
}

fn default_max_chunks() -> usize {
    6
}

fn default_context_budget_chars() -> usize {
    8000
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RetrievalConfig {
    #[serde(default = "default_max_chunks")]
    pub max_chunks: usize,
    /// Upper bound on excerpt text handed to the model, headers included.
    #[serde(default = "default_context_budget_chars")]
    pub context_budget_chars: usize,
}

impl Default for RetrievalConfig {
    fn default() -> Self {
        Self {
            max_chunks: default_max_chunks(),
            context_budget_chars: default_context_budget_chars(),
        }
    }
}

fn default_max_tokens() -> u32 {
    500
}

fn default_max_retries() -> u32 {
    2
}

fn default_backoff_ms() -> u64 {
    500
}

#[derive(Debug, Deserialize, Serialize)]
pub struct AnswerConfig {
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,
    #[serde(default)]
    pub quote_verification: QuoteVerification,
}

impl Default for AnswerConfig {
    fn default() -> Self {
        Self {
            max_tokens: default_max_tokens(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            quote_verification: QuoteVerification::default(),
        }
    }
}

fn default_llm_seconds() -> u64 {
    60
}

fn default_embedding_seconds() -> u64 {
    30
}

fn default_extraction_seconds() -> u64 {
    60
}

fn default_query_seconds() -> u64 {
    180
}

#[derive(Debug, Clone, Copy, Deserialize, Serialize)]
pub struct TimeoutConfig {
    #[serde(default = "default_llm_seconds")]
    pub llm_seconds: u64,
    #[serde(default = "default_embedding_seconds")]
    pub embedding_seconds: u64,
    #[serde(default = "default_extraction_seconds")]
    pub extraction_seconds: u64,
    #[serde(default = "default_query_seconds")]
    pub query_seconds: u64,
}

impl Default for TimeoutConfig {
    fn default() -> Self {
        Self {
            llm_seconds: default_llm_seconds(),
            embedding_seconds: default_embedding_seconds(),
            extraction_seconds: default_extraction_seconds(),
            query_seconds: default_query_seconds(),
        }
    }
}

fn default_preview_chars() -> usize {
    1000
}

fn default_folder_sample_limit() -> usize {
    5
}

fn default_profile_path() -> PathBuf {
    PathBuf::from(".verbum/profile.json")
}

#[derive(Debug, Deserialize, Serialize)]
pub struct HierarchySettings {
    #[serde(default = "default_preview_chars")]
    pub preview_chars: usize,
    #[serde(default = "default_folder_sample_limit")]
    pub folder_sample_limit: usize,
    #[serde(default)]
    pub profile_anchor: bool,
    /// Relative paths resolve against the collection root.
    #[serde(default = "default_profile_path")]
    pub profile_path: PathBuf,
}

impl Default for HierarchySettings {
    fn default() -> Self {
        Self {
            preview_chars: default_preview_chars(),
            folder_sample_limit: default_folder_sample_limit(),
            profile_anchor: false,
            profile_path: default_profile_path(),
        }
    }
}
