//! Per-query answer state machine.
//!
//! `Received -> ContextAssembled -> ModelCalled -> Parsed -> Succeeded | Degraded`, with
//! `Failed` reachable from every non-terminal phase. A context overflow halves the excerpt
//! set once; transient model failures are retried with exponential backoff.

use std::time::Duration;

use serde::Serialize;
use verbum_index::{Chunk, ChunkId, Embedder, IndexStatus, IndexedDocument};
use verbum_llm::{LlmError, LlmProvider, Message};

use crate::citation::{self, Citation, QuoteVerification};
use crate::error::QueryError;
use crate::prompt;
use crate::retriever::{RetrievalStrategy, Retriever};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryPhase {
    Received,
    ContextAssembled,
    ModelCalled,
    Parsed,
    Succeeded,
    Degraded,
    Failed,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QueryStatus {
    Succeeded,
    /// Answered, but no citation survived parsing and verification.
    Degraded,
}

#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct QueryResult {
    pub answer: String,
    pub source_document: String,
    pub cited_pages: Vec<Citation>,
    pub chunks_consulted: Vec<ChunkId>,
    pub status: QueryStatus,
    pub retrieval: RetrievalStrategy,
    /// Model calls made, retries included.
    pub attempts: u32,
}

#[derive(Debug, Clone)]
pub struct ComposerConfig {
    pub max_tokens: u32,
    pub max_retries: u32,
    /// First retry delay; doubled for each further attempt.
    pub backoff: Duration,
    pub llm_timeout: Duration,
    pub quote_verification: QuoteVerification,
}

impl Default for ComposerConfig {
    fn default() -> Self {
        Self {
            max_tokens: 500,
            max_retries: 2,
            backoff: Duration::from_millis(500),
            llm_timeout: Duration::from_secs(60),
            quote_verification: QuoteVerification::default(),
        }
    }
}

enum ModelOutcome {
    Answer(String),
    Overflow,
}

struct Run<'a> {
    document: &'a str,
    phase: QueryPhase,
}

impl Run<'_> {
    fn advance(&mut self, next: QueryPhase) {
        tracing::debug!(document = self.document, from = ?self.phase, to = ?next, "query phase");
        self.phase = next;
    }
}

pub struct AnswerComposer {
    config: ComposerConfig,
    retriever: Retriever,
}

impl AnswerComposer {
    #[must_use]
    pub fn new(config: ComposerConfig, retriever: Retriever) -> Self {
        Self { config, retriever }
    }

    /// Answer `query` from the chunks of `entry`.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] whose kind tells the caller which phase failed; no answer
    /// text is ever produced on failure.
    pub async fn answer<P: LlmProvider>(
        &self,
        provider: &P,
        embedder: &Embedder,
        entry: &IndexedDocument,
        query: &str,
    ) -> Result<QueryResult, QueryError> {
        let document = entry.id.as_str();
        let mut run = Run {
            document,
            phase: QueryPhase::Received,
        };
        match self.drive(&mut run, provider, embedder, entry, query).await {
            Ok(result) => {
                run.advance(match result.status {
                    QueryStatus::Succeeded => QueryPhase::Succeeded,
                    QueryStatus::Degraded => QueryPhase::Degraded,
                });
                tracing::info!(
                    document,
                    status = ?result.status,
                    citations = result.cited_pages.len(),
                    chunks = result.chunks_consulted.len(),
                    attempts = result.attempts,
                    "query answered"
                );
                Ok(result)
            }
            Err(e) => {
                let failed_in = run.phase;
                run.advance(QueryPhase::Failed);
                tracing::error!(document, kind = %e.kind(), phase = ?failed_in, "query failed: {e}");
                Err(e)
            }
        }
    }

    async fn drive<P: LlmProvider>(
        &self,
        run: &mut Run<'_>,
        provider: &P,
        embedder: &Embedder,
        entry: &IndexedDocument,
        query: &str,
    ) -> Result<QueryResult, QueryError> {
        let document = entry.id.to_string();
        if query.trim().is_empty() {
            return Err(QueryError::InvalidQuery);
        }
        match &entry.status {
            IndexStatus::Failed { reason } => {
                return Err(QueryError::Extraction {
                    document,
                    reason: reason.clone(),
                });
            }
            IndexStatus::Empty => return Err(QueryError::EmptyDocument(document)),
            IndexStatus::Ready { .. } if entry.chunks.is_empty() => {
                return Err(QueryError::EmptyDocument(document));
            }
            IndexStatus::Ready { .. } => {}
        }

        let retrieval = self.retriever.select(query, entry, embedder).await;
        let mut selected: Vec<&Chunk> = retrieval.chunks;
        if selected.is_empty() {
            return Err(QueryError::ContextTooLarge { chunks: 0 });
        }
        run.advance(QueryPhase::ContextAssembled);

        let name = entry
            .document
            .as_ref()
            .map_or(document.as_str(), |d| d.name.as_str());
        let mut attempts = 0;
        let mut halved = false;
        let output = loop {
            let messages = prompt::build(name, query, &selected);
            let outcome = if self.exceeds_window(provider, &messages) {
                ModelOutcome::Overflow
            } else {
                let outcome = self.call_model(provider, &messages, &mut attempts).await?;
                run.advance(QueryPhase::ModelCalled);
                outcome
            };
            match outcome {
                ModelOutcome::Answer(text) => break text,
                ModelOutcome::Overflow if halved => {
                    return Err(QueryError::ContextTooLarge {
                        chunks: selected.len(),
                    });
                }
                ModelOutcome::Overflow => {
                    let keep = selected.len() / 2;
                    if keep == 0 {
                        return Err(QueryError::ContextTooLarge {
                            chunks: selected.len(),
                        });
                    }
                    tracing::warn!(
                        document = %document,
                        from = selected.len(),
                        to = keep,
                        "context overflow, halving excerpts"
                    );
                    selected.truncate(keep);
                    halved = true;
                }
            }
        };

        let parsed = citation::parse(&output);
        if parsed.text.is_empty() {
            return Err(QueryError::EmptyAnswer);
        }
        run.advance(QueryPhase::Parsed);

        let cited_pages =
            citation::verify(&parsed.citations, &selected, self.config.quote_verification);
        let status = if cited_pages.is_empty() {
            tracing::warn!(document = %document, "answer carries no verifiable citation");
            QueryStatus::Degraded
        } else {
            QueryStatus::Succeeded
        };

        Ok(QueryResult {
            answer: parsed.text,
            source_document: document,
            cited_pages,
            chunks_consulted: selected.iter().map(|c| c.id.clone()).collect(),
            status,
            retrieval: retrieval.strategy,
            attempts,
        })
    }

    /// Whether the prompt plus the completion budget exceeds the provider's known window.
    fn exceeds_window<P: LlmProvider>(&self, provider: &P, messages: &[Message]) -> bool {
        let Some(window) = provider.context_window() else {
            return false;
        };
        let needed = prompt::estimate_tokens(messages) + self.config.max_tokens as usize;
        if needed > window {
            tracing::debug!(needed, window, "prompt exceeds context window");
            return true;
        }
        false
    }

    async fn call_model<P: LlmProvider>(
        &self,
        provider: &P,
        messages: &[Message],
        attempts: &mut u32,
    ) -> Result<ModelOutcome, QueryError> {
        let mut last_error = String::new();
        for attempt in 0..=self.config.max_retries {
            *attempts += 1;
            let mut hint = None;
            let call = provider.generate(messages, self.config.max_tokens);
            match tokio::time::timeout(self.config.llm_timeout, call).await {
                Ok(Ok(text)) => return Ok(ModelOutcome::Answer(text)),
                Ok(Err(e)) if e.is_context_overflow() => return Ok(ModelOutcome::Overflow),
                Ok(Err(LlmError::EmptyResponse { .. })) => return Err(QueryError::EmptyAnswer),
                Ok(Err(e)) if e.is_transient() => {
                    tracing::warn!(attempt, provider = provider.name(), "model call failed: {e}");
                    hint = e.retry_after();
                    last_error = e.to_string();
                }
                Ok(Err(e)) => return Err(QueryError::ModelError(e.to_string())),
                Err(_) => {
                    tracing::warn!(
                        attempt,
                        provider = provider.name(),
                        timeout_secs = self.config.llm_timeout.as_secs(),
                        "model call timed out"
                    );
                    last_error = format!(
                        "no response within {}s",
                        self.config.llm_timeout.as_secs()
                    );
                }
            }
            if attempt < self.config.max_retries {
                tokio::time::sleep(self.retry_delay(attempt, hint)).await;
            }
        }
        Err(QueryError::ModelUnavailable {
            attempts: self.config.max_retries + 1,
            message: last_error,
        })
    }

    fn backoff(&self, attempt: u32) -> Duration {
        self.config
            .backoff
            .saturating_mul(1u32 << attempt.min(16))
    }

    /// Backoff, stretched to a server's `Retry-After` but never past one model timeout.
    fn retry_delay(&self, attempt: u32, hint: Option<Duration>) -> Duration {
        let backoff = self.backoff(attempt);
        hint.map_or(backoff, |h| h.max(backoff).min(self.config.llm_timeout))
    }
}
