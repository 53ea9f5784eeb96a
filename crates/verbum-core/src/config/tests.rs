use std::io::Write;

use serial_test::serial;
use verbum_index::DistanceMetric;

use super::*;
use crate::citation::QuoteVerification;

const ENV_KEYS: [&str; 21] = [
    "VERBUM_COLLECTION_ROOT",
    "VERBUM_COLLECTION_MAX_FILE_SIZE",
    "VERBUM_LLM_PROVIDER",
    "VERBUM_LLM_BASE_URL",
    "VERBUM_LLM_MODEL",
    "VERBUM_LLM_EMBEDDING_MODEL",
    "VERBUM_LLM_CONTEXT_WINDOW",
    "VERBUM_EMBEDDING_BACKEND",
    "VERBUM_EMBEDDING_METRIC",
    "VERBUM_CHUNKING_MAX_CHARS",
    "VERBUM_RETRIEVAL_MAX_CHUNKS",
    "VERBUM_RETRIEVAL_CONTEXT_BUDGET_CHARS",
    "VERBUM_ANSWER_MAX_TOKENS",
    "VERBUM_ANSWER_QUOTE_VERIFICATION",
    "VERBUM_TIMEOUT_LLM",
    "VERBUM_TIMEOUT_EMBEDDING",
    "VERBUM_TIMEOUT_QUERY",
    "VERBUM_HIERARCHY_PROFILE_ANCHOR",
    "VERBUM_OPENAI_API_KEY",
    "OPENAI_API_KEY",
    "VERBUM_CONFIG",
];

fn clear_env() {
    for key in ENV_KEYS {
        unsafe { std::env::remove_var(key) };
    }
}

#[test]
fn defaults_match_documented_values() {
    let config = Config::default();
    assert_eq!(config.llm.provider, ProviderKind::Ollama);
    assert_eq!(config.llm.base_url, "http://localhost:11434");
    assert!(config.llm.openai.is_none());
    assert_eq!(config.embedding.backend, EmbeddingBackend::Provider);
    assert_eq!(config.embedding.metric, DistanceMetric::Euclidean);
    assert_eq!(config.embedding.max_input_chars, 8191);
    assert_eq!(config.embedding.cache_capacity, 10_000);
    assert_eq!(config.chunking.max_chars, 2000);
    assert!(config.chunking.detect_chapters);
    assert_eq!(config.retrieval.max_chunks, 6);
    assert_eq!(config.retrieval.context_budget_chars, 8000);
    assert_eq!(config.answer.max_tokens, 500);
    assert_eq!(config.answer.max_retries, 2);
    assert_eq!(
        config.answer.quote_verification,
        QuoteVerification::Normalized
    );
    assert_eq!(config.timeouts.query_seconds, 180);
    assert_eq!(config.hierarchy.preview_chars, 1000);
    assert_eq!(config.hierarchy.folder_sample_limit, 5);
    assert!(!config.hierarchy.profile_anchor);
    assert!(config.validate().is_ok());
}

#[test]
#[serial]
fn missing_file_falls_back_to_defaults() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let config = Config::load(&dir.path().join("absent.toml")).unwrap();
    assert_eq!(config.llm.model, "mistral:7b");
    assert!(config.secrets.openai_api_key.is_none());
}

#[test]
#[serial]
fn parse_valid_toml() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("test.toml");
    let mut f = std::fs::File::create(&path).unwrap();
    write!(
        f,
        r#"
[collection]
root = "/srv/library"

[llm]
provider = "openai"
model = "ignored-for-openai"

[llm.openai]
model = "gpt-4o"

[embedding]
backend = "hashing"
metric = "cosine"
dims = 64

[retrieval]
max_chunks = 3

[answer]
quote_verification = "verbatim"

[hierarchy]
profile_anchor = true
"#
    )
    .unwrap();

    let config = Config::load(&path).unwrap();
    assert_eq!(config.collection.root, PathBuf::from("/srv/library"));
    assert_eq!(config.llm.provider, ProviderKind::OpenAi);
    let openai = config.llm.openai.as_ref().unwrap();
    assert_eq!(openai.model, "gpt-4o");
    assert_eq!(openai.base_url, "https://api.openai.com/v1");
    assert_eq!(
        openai.embedding_model.as_deref(),
        Some("text-embedding-ada-002")
    );
    assert_eq!(config.embedding.backend, EmbeddingBackend::Hashing);
    assert_eq!(config.embedding.metric, DistanceMetric::Cosine);
    assert_eq!(config.embedding.dims, 64);
    assert_eq!(config.retrieval.max_chunks, 3);
    assert_eq!(config.retrieval.context_budget_chars, 8000);
    assert_eq!(
        config.answer.quote_verification,
        QuoteVerification::Verbatim
    );
    assert!(config.hierarchy.profile_anchor);
    assert_eq!(
        config.profile_path(),
        PathBuf::from("/srv/library/.verbum/profile.json")
    );
}

#[test]
#[serial]
fn malformed_toml_is_an_error() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("bad.toml");
    std::fs::write(&path, "[retrieval\nmax_chunks = ").unwrap();
    assert!(matches!(Config::load(&path), Err(ConfigError::Parse(_))));
}

#[test]
#[serial]
fn zero_values_fail_validation() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("zero.toml");
    std::fs::write(&path, "[retrieval]\nmax_chunks = 0\n").unwrap();
    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("retrieval.max_chunks"));
}

#[test]
#[serial]
fn chunk_larger_than_context_budget_fails_validation() {
    clear_env();
    let dir = tempfile::tempdir().unwrap();
    let path = dir.path().join("budget.toml");
    std::fs::write(
        &path,
        "[chunking]\nmax_chars = 3000\n\n[retrieval]\ncontext_budget_chars = 3000\n",
    )
    .unwrap();
    let err = Config::load(&path).unwrap_err();
    assert!(err.to_string().contains("retrieval.context_budget_chars"));

    std::fs::write(
        &path,
        "[chunking]\nmax_chars = 3000\n\n[retrieval]\ncontext_budget_chars = 4000\n",
    )
    .unwrap();
    assert!(Config::load(&path).is_ok());
}

#[test]
#[serial]
fn env_overrides() {
    clear_env();
    let mut config = Config::default();

    unsafe {
        std::env::set_var("VERBUM_LLM_MODEL", "phi3:mini");
        std::env::set_var("VERBUM_RETRIEVAL_MAX_CHUNKS", "9");
        std::env::set_var("VERBUM_EMBEDDING_METRIC", "cosine");
        std::env::set_var("VERBUM_TIMEOUT_QUERY", "30");
    };
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.llm.model, "phi3:mini");
    assert_eq!(config.retrieval.max_chunks, 9);
    assert_eq!(config.embedding.metric, DistanceMetric::Cosine);
    assert_eq!(config.timeouts.query_seconds, 30);
}

#[test]
#[serial]
fn invalid_env_values_are_ignored() {
    clear_env();
    let mut config = Config::default();

    unsafe {
        std::env::set_var("VERBUM_LLM_PROVIDER", "carrier-pigeon");
        std::env::set_var("VERBUM_CHUNKING_MAX_CHARS", "many");
        std::env::set_var("VERBUM_ANSWER_QUOTE_VERIFICATION", "strictest");
    };
    config.apply_env_overrides();
    clear_env();

    assert_eq!(config.llm.provider, ProviderKind::Ollama);
    assert_eq!(config.chunking.max_chars, 2000);
    assert_eq!(
        config.answer.quote_verification,
        QuoteVerification::Normalized
    );
}

#[test]
#[serial]
fn openai_key_from_either_variable() {
    clear_env();
    let mut config = Config::default();
    unsafe { std::env::set_var("OPENAI_API_KEY", "sk-plain") };
    config.apply_env_overrides();
    assert_eq!(config.secrets.openai_api_key.as_deref(), Some("sk-plain"));

    unsafe { std::env::set_var("VERBUM_OPENAI_API_KEY", "sk-verbum") };
    config.apply_env_overrides();
    clear_env();
    assert_eq!(config.secrets.openai_api_key.as_deref(), Some("sk-verbum"));
    assert!(!format!("{:?}", config.secrets).contains("sk-verbum"));
}

#[test]
fn durations_convert_seconds() {
    let timeouts = TimeoutConfig::default();
    assert_eq!(timeouts.query(), std::time::Duration::from_secs(180));
    assert_eq!(timeouts.llm(), std::time::Duration::from_secs(60));
}

#[test]
#[serial]
fn shipped_default_toml_loads() {
    clear_env();
    let path = std::path::Path::new(env!("CARGO_MANIFEST_DIR")).join("../../config/default.toml");
    let config = Config::load(&path).unwrap();
    assert_eq!(config.llm.provider, ProviderKind::Ollama);
    assert_eq!(
        config.llm.openai.as_ref().map(|o| o.model.as_str()),
        Some("gpt-4")
    );
    assert_eq!(config.chunking.max_chars, 2000);
    assert_eq!(config.hierarchy.profile_path, PathBuf::from(".verbum/profile.json"));
}
