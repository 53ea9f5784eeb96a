//! Facade tying the collection, document store, hierarchy and answer composer together.

use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError, RwLock};
use std::time::Duration;

use futures::StreamExt;
use serde::Serialize;
use verbum_index::{
    Chunker, Collection, DocumentStore, Embedder, Extractors, HierarchyBuilder, HierarchyError,
    HierarchyLevel, IndexError, IndexStatus, UserProfile,
};
use verbum_llm::LlmProvider;

use crate::answer::{AnswerComposer, ComposerConfig, QueryResult};
use crate::config::{Config, EmbeddingBackend};
use crate::error::QueryError;
use crate::retriever::{Retriever, RetrieverConfig};

/// Outcome of indexing every queryable document.
#[derive(Debug, Clone, Default, Serialize)]
pub struct IndexReport {
    pub indexed: Vec<String>,
    pub empty: Vec<String>,
    pub failed: Vec<FailedDocument>,
    /// Chunks across all indexed documents.
    pub chunks: usize,
}

#[derive(Debug, Clone, Serialize)]
pub struct FailedDocument {
    pub document: String,
    pub reason: String,
}

/// A recorded navigation step and the profile's guess at the next one.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Visit {
    pub path: String,
    pub predicted_next: Option<String>,
}

pub struct Engine<P> {
    config: Config,
    provider: Arc<P>,
    embedder: Embedder,
    store: DocumentStore,
    hierarchy: HierarchyBuilder,
    composer: AnswerComposer,
    collection: RwLock<Arc<Collection>>,
    generation: AtomicU64,
    profile: Mutex<UserProfile>,
    profile_path: PathBuf,
}

impl<P: LlmProvider + 'static> Engine<P> {
    /// Scan the collection root and wire every component from `config`.
    ///
    /// # Errors
    ///
    /// Returns an error if the collection root cannot be walked.
    pub fn open(config: Config, provider: P) -> Result<Self, IndexError> {
        let provider = Arc::new(provider);
        let embedder = match config.embedding.backend {
            EmbeddingBackend::Provider => {
                if !provider.supports_embeddings() {
                    tracing::warn!(
                        provider = provider.name(),
                        "provider has no embedding model, retrieval and layout will degrade"
                    );
                }
                Embedder::from_fn(
                    verbum_llm::embed_fn(Arc::clone(&provider)),
                    config.embedding.metric,
                    config.embedding.max_input_chars,
                    config.timeouts.embedding(),
                )
            }
            EmbeddingBackend::Hashing => Embedder::hashing(
                config.embedding.dims,
                config.embedding.metric,
                config.embedding.max_input_chars,
            ),
        }
        .with_cache_capacity(config.embedding.cache_capacity);

        let store = DocumentStore::new(
            Chunker::new(config.chunker_config()),
            Extractors::new(
                config.collection.max_file_size,
                config.timeouts.extraction(),
            ),
        );
        let retriever = Retriever::new(RetrieverConfig {
            max_chunks: config.retrieval.max_chunks,
            context_budget_chars: config.retrieval.context_budget_chars,
        });
        let composer = AnswerComposer::new(
            ComposerConfig {
                max_tokens: config.answer.max_tokens,
                max_retries: config.answer.max_retries,
                backoff: Duration::from_millis(config.answer.backoff_ms),
                llm_timeout: config.timeouts.llm(),
                quote_verification: config.answer.quote_verification,
            },
            retriever,
        );

        let profile_path = config.profile_path();
        let profile = UserProfile::load(&profile_path).unwrap_or_else(|e| {
            tracing::warn!(path = %profile_path.display(), "ignoring unreadable profile: {e}");
            UserProfile::default()
        });

        let collection = Collection::scan(&config.collection.root, 1)?;
        tracing::info!(
            root = %collection.root_dir().display(),
            documents = collection.documents().len(),
            provider = provider.name(),
            "engine ready"
        );

        Ok(Self {
            hierarchy: HierarchyBuilder::new(config.hierarchy_config()),
            config,
            provider,
            embedder,
            store,
            composer,
            collection: RwLock::new(Arc::new(collection)),
            generation: AtomicU64::new(1),
            profile: Mutex::new(profile),
            profile_path,
        })
    }

    #[must_use]
    pub fn config(&self) -> &Config {
        &self.config
    }

    #[must_use]
    pub fn provider(&self) -> &P {
        &self.provider
    }

    /// Current collection snapshot.
    #[must_use]
    pub fn collection(&self) -> Arc<Collection> {
        Arc::clone(&self.collection.read().unwrap_or_else(PoisonError::into_inner))
    }

    /// Re-walk the collection root under a new generation, dropping documents that vanished.
    ///
    /// Cached hierarchy levels of older generations are recomputed on next request.
    ///
    /// # Errors
    ///
    /// Returns an error if the root cannot be walked; the previous snapshot stays in place.
    pub fn rescan(&self) -> Result<Arc<Collection>, IndexError> {
        let generation = self.generation.fetch_add(1, Ordering::SeqCst) + 1;
        let collection = Arc::new(Collection::scan(&self.config.collection.root, generation)?);
        *self
            .collection
            .write()
            .unwrap_or_else(PoisonError::into_inner) = Arc::clone(&collection);
        self.store.invalidate_missing(&collection);
        self.embedder.clear_cache();
        tracing::info!(generation, documents = collection.documents().len(), "collection rescanned");
        Ok(collection)
    }

    /// Extract and chunk every queryable document, `collection.index_parallelism` at a time.
    pub async fn index_all(&self) -> IndexReport {
        let collection = self.collection();
        let jobs: Vec<_> = collection
            .documents()
            .into_iter()
            .filter(|node| node.is_queryable())
            .filter_map(|node| {
                let id = node.doc_id()?;
                Some((collection.absolute(&id), id, node.fingerprint))
            })
            .collect();
        tracing::info!(documents = jobs.len(), "indexing collection");

        let entries: Vec<_> = futures::stream::iter(jobs)
            .map(|(path, id, fingerprint)| async move {
                self.store.get_or_index(&id, &path, fingerprint).await
            })
            .buffer_unordered(self.config.collection.index_parallelism)
            .collect()
            .await;

        let mut report = IndexReport::default();
        for entry in entries {
            let document = entry.id.to_string();
            match &entry.status {
                IndexStatus::Ready { chunks } => {
                    report.chunks += chunks;
                    report.indexed.push(document);
                }
                IndexStatus::Empty => report.empty.push(document),
                IndexStatus::Failed { reason } => report.failed.push(FailedDocument {
                    document,
                    reason: reason.clone(),
                }),
            }
        }
        report.indexed.sort();
        report.empty.sort();
        report.failed.sort_by(|a, b| a.document.cmp(&b.document));
        tracing::info!(
            indexed = report.indexed.len(),
            empty = report.empty.len(),
            failed = report.failed.len(),
            chunks = report.chunks,
            "indexing finished"
        );
        report
    }

    /// Immediate children of the folder at `path` and their pairwise distances.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPath` or `NotAFolder` when `path` does not name a folder.
    pub async fn get_hierarchy_level(&self, path: &str) -> Result<Arc<HierarchyLevel>, HierarchyError> {
        let collection = self.collection();
        let profile = self
            .config
            .hierarchy
            .profile_anchor
            .then(|| self.profile_snapshot());
        self.hierarchy
            .level(&collection, &self.store, &self.embedder, path, profile.as_ref())
            .await
    }

    /// Answer `query` against the document at `path`, within the whole-query deadline.
    ///
    /// # Errors
    ///
    /// Returns a [`QueryError`] describing why no answer was produced.
    pub async fn query_document(&self, path: &str, query: &str) -> Result<QueryResult, QueryError> {
        let deadline = self.config.timeouts.query();
        if let Ok(result) = tokio::time::timeout(deadline, self.run_query(path, query)).await {
            result
        } else {
            let seconds = self.config.timeouts.query_seconds;
            tracing::error!(document = path, seconds, "query deadline exceeded");
            Err(QueryError::ModelTimeout { seconds })
        }
    }

    async fn run_query(&self, path: &str, query: &str) -> Result<QueryResult, QueryError> {
        if query.trim().is_empty() {
            return Err(QueryError::InvalidQuery);
        }
        let collection = self.collection();
        let key = path.trim_matches('/');
        let node = collection
            .find(key)
            .filter(|_| !key.is_empty())
            .ok_or_else(|| QueryError::UnknownDocument(path.to_owned()))?;
        let Some(id) = node.doc_id().filter(|_| node.is_queryable()) else {
            return Err(QueryError::NotQueryable(path.to_owned()));
        };

        let entry = self
            .store
            .get_or_index(&id, &collection.absolute(&id), node.fingerprint)
            .await;
        self.composer
            .answer(self.provider.as_ref(), &self.embedder, &entry, query)
            .await
    }

    /// Record a navigation step in the user profile and persist it.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPath` when nothing exists at `path`.
    pub fn record_visit(&self, path: &str) -> Result<Visit, HierarchyError> {
        let key = path.trim_matches('/');
        if self.collection().find(key).is_none() {
            return Err(HierarchyError::UnknownPath(path.to_owned()));
        }

        let profile = {
            let mut profile = self.profile.lock().unwrap_or_else(PoisonError::into_inner);
            profile.record_visit(key);
            profile.clone()
        };
        if let Err(e) = profile.save(&self.profile_path) {
            tracing::warn!(path = %self.profile_path.display(), "failed to save profile: {e}");
        }
        if self.config.hierarchy.profile_anchor {
            // The root level embeds the profile summary.
            self.hierarchy.clear();
        }

        let predicted_next = profile.predict_next(key);
        tracing::debug!(path = key, predicted = ?predicted_next, "recorded visit");
        Ok(Visit {
            path: key.to_owned(),
            predicted_next,
        })
    }

    #[must_use]
    pub fn profile_snapshot(&self) -> UserProfile {
        self.profile
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}
