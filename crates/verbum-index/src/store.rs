use std::collections::{HashMap, HashSet};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError, RwLock};

use serde::Serialize;

use crate::chunker::Chunker;
use crate::collection::{Collection, Fingerprint, Node};
use crate::embedding::{EmbedError, Embedder, Representation};
use crate::error::IndexError;
use crate::loader::Extractors;
use crate::types::{Chunk, DocId, Document, FileKind};

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "state", rename_all = "snake_case")]
pub enum IndexStatus {
    Ready { chunks: usize },
    /// Extracted, but no page had any text.
    Empty,
    Failed { reason: String },
}

/// One immutable version of an indexed document.
#[derive(Debug)]
pub struct IndexedDocument {
    pub id: DocId,
    pub version: u64,
    pub fingerprint: Option<Fingerprint>,
    pub document: Option<Document>,
    pub chunks: Vec<Chunk>,
    pub status: IndexStatus,
    vectors: OnceLock<Vec<Representation>>,
}

impl IndexedDocument {
    #[must_use]
    pub fn is_ready(&self) -> bool {
        matches!(self.status, IndexStatus::Ready { .. })
    }

    /// Representations of every chunk, computed once per version.
    ///
    /// # Errors
    ///
    /// Returns the first embedding failure; nothing is stored in that case.
    pub async fn chunk_vectors(&self, embedder: &Embedder) -> Result<Vec<Representation>, EmbedError> {
        if let Some(vectors) = self.vectors.get() {
            return Ok(vectors.clone());
        }
        let mut vectors = Vec::with_capacity(self.chunks.len());
        for chunk in &self.chunks {
            vectors.push(embedder.represent(&chunk.text).await?);
        }
        Ok(self.vectors.get_or_init(|| vectors).clone())
    }
}

/// Keyed store of indexed documents.
///
/// Readers clone an `Arc` to a complete version and never observe a partial rebuild.
/// Rebuilding one document is serialized per id; different documents index in parallel.
pub struct DocumentStore {
    chunker: Chunker,
    extractors: Extractors,
    entries: RwLock<HashMap<DocId, Arc<IndexedDocument>>>,
    building: Mutex<HashMap<DocId, Arc<tokio::sync::Mutex<()>>>>,
    next_version: AtomicU64,
}

impl DocumentStore {
    #[must_use]
    pub fn new(chunker: Chunker, extractors: Extractors) -> Self {
        Self {
            chunker,
            extractors,
            entries: RwLock::new(HashMap::new()),
            building: Mutex::new(HashMap::new()),
            next_version: AtomicU64::new(1),
        }
    }

    #[must_use]
    pub fn get(&self, id: &DocId) -> Option<Arc<IndexedDocument>> {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(id)
            .cloned()
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.entries
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Return the current version of `id`, extracting and chunking it first if it is missing
    /// or its fingerprint changed.
    pub async fn get_or_index(
        &self,
        id: &DocId,
        path: &Path,
        fingerprint: Option<Fingerprint>,
    ) -> Arc<IndexedDocument> {
        if let Some(current) = self.fresh(id, fingerprint) {
            return current;
        }

        let gate = {
            let mut building = self.building.lock().unwrap_or_else(PoisonError::into_inner);
            Arc::clone(building.entry(id.clone()).or_default())
        };
        let _guard = gate.lock().await;

        // Another caller may have finished the rebuild while we waited.
        if let Some(current) = self.fresh(id, fingerprint) {
            return current;
        }

        let (entry, cacheable) = self.build(id, path, fingerprint).await;
        let entry = Arc::new(entry);
        if cacheable {
            self.entries
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(id.clone(), Arc::clone(&entry));
        }
        entry
    }

    fn fresh(&self, id: &DocId, fingerprint: Option<Fingerprint>) -> Option<Arc<IndexedDocument>> {
        self.get(id).filter(|e| e.fingerprint == fingerprint)
    }

    async fn build(
        &self,
        id: &DocId,
        path: &Path,
        fingerprint: Option<Fingerprint>,
    ) -> (IndexedDocument, bool) {
        let version = self.next_version.fetch_add(1, Ordering::SeqCst);
        let name = path
            .file_name()
            .map_or_else(|| id.to_string(), |n| n.to_string_lossy().into_owned());
        let kind = FileKind::from_path(path);

        match self.extractors.extract(path).await {
            Ok(pages) => {
                let document = Document {
                    id: id.clone(),
                    name,
                    kind,
                    pages,
                };
                let chunks = self.chunker.chunk(&document);
                let status = if chunks.is_empty() {
                    IndexStatus::Empty
                } else {
                    IndexStatus::Ready {
                        chunks: chunks.len(),
                    }
                };
                tracing::info!(
                    document = %id,
                    version,
                    pages = document.pages.len(),
                    chunks = chunks.len(),
                    "indexed document"
                );
                let entry = IndexedDocument {
                    id: id.clone(),
                    version,
                    fingerprint,
                    document: Some(document),
                    chunks,
                    status,
                    vectors: OnceLock::new(),
                };
                (entry, true)
            }
            Err(e) => {
                tracing::warn!(document = %id, version, "extraction failed: {e}");
                // A timeout may clear up on the next attempt, so it is not remembered.
                let cacheable = !matches!(e, IndexError::ExtractionTimeout { .. });
                let entry = IndexedDocument {
                    id: id.clone(),
                    version,
                    fingerprint,
                    document: None,
                    chunks: Vec::new(),
                    status: IndexStatus::Failed {
                        reason: e.to_string(),
                    },
                    vectors: OnceLock::new(),
                };
                (entry, cacheable)
            }
        }
    }

    /// Drop every entry whose id is rejected by `keep`. Returns how many were removed.
    pub fn retain(&self, keep: impl Fn(&DocId) -> bool) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(PoisonError::into_inner);
        let before = entries.len();
        entries.retain(|id, _| keep(id));
        self.building
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .retain(|id, _| keep(id));
        before - entries.len()
    }

    /// Drop documents that are no longer part of `collection`.
    pub fn invalidate_missing(&self, collection: &Collection) -> usize {
        let live: HashSet<DocId> = collection
            .documents()
            .into_iter()
            .filter_map(Node::doc_id)
            .collect();
        let removed = self.retain(|id| live.contains(id));
        if removed > 0 {
            tracing::info!(removed, "dropped documents missing from collection");
        }
        removed
    }
}
