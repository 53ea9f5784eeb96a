use std::path::PathBuf;

use super::Config;

impl Config {
    #[allow(clippy::too_many_lines)]
    pub(crate) fn apply_env_overrides(&mut self) {
        if let Ok(v) = std::env::var("VERBUM_COLLECTION_ROOT") {
            self.collection.root = PathBuf::from(v);
        }
        if let Ok(v) = std::env::var("VERBUM_COLLECTION_MAX_FILE_SIZE")
            && let Ok(size) = v.parse::<u64>()
        {
            self.collection.max_file_size = size;
        }
        if let Ok(v) = std::env::var("VERBUM_LLM_PROVIDER") {
            if let Ok(kind) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.llm.provider = kind;
            } else {
                tracing::warn!("ignoring invalid VERBUM_LLM_PROVIDER value: {v}");
            }
        }
        if let Ok(v) = std::env::var("VERBUM_LLM_BASE_URL") {
            self.llm.base_url = v;
        }
        if let Ok(v) = std::env::var("VERBUM_LLM_MODEL") {
            self.llm.model = v;
        }
        if let Ok(v) = std::env::var("VERBUM_LLM_EMBEDDING_MODEL") {
            self.llm.embedding_model = v;
        }
        if let Ok(v) = std::env::var("VERBUM_LLM_CONTEXT_WINDOW")
            && let Ok(window) = v.parse::<usize>()
        {
            self.llm.context_window = Some(window);
        }
        if let Ok(v) = std::env::var("VERBUM_EMBEDDING_BACKEND") {
            if let Ok(backend) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.embedding.backend = backend;
            } else {
                tracing::warn!("ignoring invalid VERBUM_EMBEDDING_BACKEND value: {v}");
            }
        }
        if let Ok(v) = std::env::var("VERBUM_EMBEDDING_METRIC") {
            if let Ok(metric) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.embedding.metric = metric;
            } else {
                tracing::warn!("ignoring invalid VERBUM_EMBEDDING_METRIC value: {v}");
            }
        }
        if let Ok(v) = std::env::var("VERBUM_CHUNKING_MAX_CHARS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.chunking.max_chars = n;
        }
        if let Ok(v) = std::env::var("VERBUM_RETRIEVAL_MAX_CHUNKS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.max_chunks = n;
        }
        if let Ok(v) = std::env::var("VERBUM_RETRIEVAL_CONTEXT_BUDGET_CHARS")
            && let Ok(n) = v.parse::<usize>()
        {
            self.retrieval.context_budget_chars = n;
        }
        if let Ok(v) = std::env::var("VERBUM_ANSWER_MAX_TOKENS")
            && let Ok(n) = v.parse::<u32>()
        {
            self.answer.max_tokens = n;
        }
        if let Ok(v) = std::env::var("VERBUM_ANSWER_QUOTE_VERIFICATION") {
            if let Ok(policy) = serde_json::from_value(serde_json::Value::String(v.clone())) {
                self.answer.quote_verification = policy;
            } else {
                tracing::warn!("ignoring invalid VERBUM_ANSWER_QUOTE_VERIFICATION value: {v}");
            }
        }
        if let Ok(v) = std::env::var("VERBUM_TIMEOUT_LLM")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.llm_seconds = secs;
        }
        if let Ok(v) = std::env::var("VERBUM_TIMEOUT_EMBEDDING")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.embedding_seconds = secs;
        }
        if let Ok(v) = std::env::var("VERBUM_TIMEOUT_QUERY")
            && let Ok(secs) = v.parse::<u64>()
        {
            self.timeouts.query_seconds = secs;
        }
        if let Ok(v) = std::env::var("VERBUM_HIERARCHY_PROFILE_ANCHOR")
            && let Ok(enabled) = v.parse::<bool>()
        {
            self.hierarchy.profile_anchor = enabled;
        }
        if let Ok(v) = std::env::var("VERBUM_OPENAI_API_KEY").or_else(|_| std::env::var("OPENAI_API_KEY"))
            && !v.trim().is_empty()
        {
            self.secrets.openai_api_key = Some(v);
        }
    }
}
