use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use serde_json::json;
use verbum_core::config::{Config, ProviderKind};
use verbum_core::{Engine, QueryError};
use verbum_index::HierarchyError;
use verbum_llm::AnyProvider;
use verbum_llm::LlmProvider;
use verbum_llm::ollama::OllamaProvider;
use verbum_llm::openai::OpenAiProvider;

/// Semantic map and page-cited question answering over a local document collection.
#[derive(Parser)]
#[command(name = "verbum", version)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(
        long,
        global = true,
        env = "VERBUM_CONFIG",
        default_value = "config/default.toml"
    )]
    config: PathBuf,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Print one level of the semantic hierarchy: children and their pairwise distances.
    Hierarchy {
        /// Folder path relative to the collection root; empty for the root.
        #[arg(default_value = "")]
        path: String,
    },
    /// Ask a question about a single document.
    Query { document: String, question: String },
    /// Extract and chunk every queryable document.
    Index,
    /// Record a navigation step in the user profile.
    Visit { path: String },
}

#[tokio::main]
async fn main() -> anyhow::Result<ExitCode> {
    init_subscriber();

    let cli = Cli::parse();
    let config = Config::load(&cli.config)
        .with_context(|| format!("loading {}", cli.config.display()))?;
    let provider = create_provider(&config)?;
    let provider = detect_context_window(provider, &config).await;
    let engine = Engine::open(config, provider).context("opening collection")?;

    let (body, ok) = match cli.command {
        Command::Hierarchy { path } => match engine.get_hierarchy_level(&path).await {
            Ok(level) => (serde_json::to_value(&*level)?, true),
            Err(e) => (hierarchy_error_body(&e), false),
        },
        Command::Query { document, question } => {
            match engine.query_document(&document, &question).await {
                Ok(result) => (serde_json::to_value(&result)?, true),
                Err(e) => (query_error_body(&e), false),
            }
        }
        Command::Index => {
            let report = engine.index_all().await;
            (serde_json::to_value(&report)?, true)
        }
        Command::Visit { path } => match engine.record_visit(&path) {
            Ok(visit) => (serde_json::to_value(&visit)?, true),
            Err(e) => (hierarchy_error_body(&e), false),
        },
    };

    println!("{}", serde_json::to_string_pretty(&body)?);
    Ok(if ok { ExitCode::SUCCESS } else { ExitCode::FAILURE })
}

fn init_subscriber() {
    use tracing_subscriber::layer::SubscriberExt;
    use tracing_subscriber::util::SubscriberInitExt;

    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info"));
    // stdout carries the JSON result.
    let fmt_layer = tracing_subscriber::fmt::layer().with_writer(std::io::stderr);

    tracing_subscriber::registry()
        .with(filter)
        .with(fmt_layer)
        .init();
}

fn create_provider(config: &Config) -> anyhow::Result<AnyProvider> {
    match config.llm.provider {
        ProviderKind::Ollama => Ok(AnyProvider::Ollama(
            OllamaProvider::new(
                &config.llm.base_url,
                config.llm.model.clone(),
                config.llm.embedding_model.clone(),
            )
            .with_temperature(Some(config.llm.temperature)),
        )),
        ProviderKind::OpenAi => {
            let openai = config
                .llm
                .openai
                .as_ref()
                .context("llm.openai config section required for openai provider")?;
            let api_key = config
                .secrets
                .openai_api_key
                .clone()
                .context("VERBUM_OPENAI_API_KEY (or OPENAI_API_KEY) not found")?;
            let provider = OpenAiProvider::new(
                api_key,
                openai.base_url.clone(),
                openai.model.clone(),
                openai.embedding_model.clone(),
            )?
            .with_temperature(Some(config.llm.temperature))
            .with_context_window(config.llm.context_window);
            Ok(AnyProvider::OpenAi(provider))
        }
    }
}

/// Ask Ollama for the model's context window unless the config pins one.
///
/// The lookup shares the model-call timeout; on failure the window stays unknown.
async fn detect_context_window(mut provider: AnyProvider, config: &Config) -> AnyProvider {
    if let AnyProvider::Ollama(ref mut ollama) = provider {
        if let Some(window) = config.llm.context_window {
            ollama.set_context_window(window);
        } else {
            match tokio::time::timeout(config.timeouts.llm(), ollama.fetch_model_info()).await {
                Ok(Ok(info)) => {
                    if let Some(window) = info.context_length {
                        ollama.set_context_window(window);
                        tracing::info!(context_window = window, "detected Ollama model context window");
                    }
                }
                Ok(Err(e)) => tracing::warn!("context window lookup failed: {e}"),
                Err(_) => tracing::warn!(
                    timeout_secs = config.timeouts.llm_seconds,
                    "context window lookup timed out"
                ),
            }
        }
    }
    tracing::debug!(
        provider = provider.name(),
        context_window = ?provider.context_window(),
        "provider ready"
    );
    provider
}

fn query_error_body(error: &QueryError) -> serde_json::Value {
    json!({ "error": error })
}

fn hierarchy_error_body(error: &HierarchyError) -> serde_json::Value {
    json!({ "error": { "kind": error.kind(), "message": error.to_string() } })
}
