//! Per-level semantic distances over the collection tree.
//!
//! Each level holds the immediate children of one folder and the pairwise distances
//! between them. Levels are computed on request and cached per path until the collection
//! generation changes.

use std::collections::HashMap;
use std::sync::{Arc, PoisonError, RwLock};

use serde::Serialize;

use crate::collection::{Collection, Node, NodeKind};
use crate::embedding::{EmbedError, Embedder, MIN_DISTINCT_DISTANCE, Representation};
use crate::profile::UserProfile;
use crate::store::{DocumentStore, IndexStatus};

pub const PROFILE_NODE_NAME: &str = "Me";
pub const PROFILE_NODE_PATH: &str = "@me";

#[derive(Debug, thiserror::Error)]
pub enum HierarchyError {
    #[error("no folder or document at path {0:?}")]
    UnknownPath(String),

    #[error("{0:?} is a document, not a folder")]
    NotAFolder(String),
}

impl HierarchyError {
    /// Stable machine-readable kind.
    #[must_use]
    pub fn kind(&self) -> &'static str {
        match self {
            Self::UnknownPath(_) => "unknown_path",
            Self::NotAFolder(_) => "not_a_folder",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Layout {
    /// Distances come from representations.
    Semantic,
    /// Representations were unavailable; distances follow the sorted child order.
    Positional,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ChildKind {
    Folder,
    Document,
    Profile,
}

#[derive(Debug, Clone, Serialize)]
pub struct LevelChild {
    pub name: String,
    pub path: String,
    pub kind: ChildKind,
    pub queryable: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<IndexStatus>,
}

/// Distance between two children, identified by path, with `a < b`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PairDistance {
    pub a: String,
    pub b: String,
    pub distance: f64,
}

#[derive(Debug, Clone, Serialize)]
pub struct HierarchyLevel {
    pub path: String,
    pub name: String,
    pub children: Vec<LevelChild>,
    pub distances: Vec<PairDistance>,
    pub layout: Layout,
    pub generation: u64,
}

impl HierarchyLevel {
    /// Distance between two children in either order; zero for a child and itself.
    #[must_use]
    pub fn distance(&self, a: &str, b: &str) -> Option<f64> {
        if a == b {
            return self.children.iter().any(|c| c.path == a).then_some(0.0);
        }
        let (lo, hi) = if a < b { (a, b) } else { (b, a) };
        self.distances
            .iter()
            .find(|d| d.a == lo && d.b == hi)
            .map(|d| d.distance)
    }
}

#[derive(Debug, Clone)]
pub struct HierarchyConfig {
    /// Documents averaged into a folder's representation.
    pub folder_sample_limit: usize,
    /// Characters of extracted text included in a document's representation.
    pub preview_chars: usize,
    pub profile_anchor: bool,
}

impl Default for HierarchyConfig {
    fn default() -> Self {
        Self {
            folder_sample_limit: 5,
            preview_chars: 1000,
            profile_anchor: false,
        }
    }
}

/// Builds and caches hierarchy levels.
#[derive(Debug, Default)]
pub struct HierarchyBuilder {
    config: HierarchyConfig,
    cache: RwLock<HashMap<String, Arc<HierarchyLevel>>>,
}

impl HierarchyBuilder {
    #[must_use]
    pub fn new(config: HierarchyConfig) -> Self {
        Self {
            config,
            cache: RwLock::new(HashMap::new()),
        }
    }

    /// The level rooted at `path`: immediate children plus their pairwise distances.
    ///
    /// # Errors
    ///
    /// Returns `UnknownPath` if nothing exists at `path` and `NotAFolder` for a document.
    pub async fn level(
        &self,
        collection: &Collection,
        store: &DocumentStore,
        embedder: &Embedder,
        path: &str,
        profile: Option<&UserProfile>,
    ) -> Result<Arc<HierarchyLevel>, HierarchyError> {
        let key = path.trim_matches('/').to_owned();
        let node = collection
            .find(&key)
            .ok_or_else(|| HierarchyError::UnknownPath(path.to_owned()))?;
        if !node.is_folder() {
            return Err(HierarchyError::NotAFolder(path.to_owned()));
        }

        if let Some(cached) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .get(&key)
            .filter(|l| l.generation == collection.generation())
        {
            tracing::debug!(path = %key, "hierarchy level cache hit");
            return Ok(Arc::clone(cached));
        }

        let anchor = profile.filter(|_| self.config.profile_anchor && key.is_empty());
        let mut children = Vec::with_capacity(node.children.len() + 1);
        if anchor.is_some() {
            children.push(LevelChild {
                name: PROFILE_NODE_NAME.to_owned(),
                path: PROFILE_NODE_PATH.to_owned(),
                kind: ChildKind::Profile,
                queryable: false,
                status: None,
            });
        }
        for child in &node.children {
            let status = document_status(collection, store, child).await;
            children.push(LevelChild {
                name: child.name.clone(),
                path: child.path.clone(),
                kind: match child.kind {
                    NodeKind::Folder => ChildKind::Folder,
                    NodeKind::Document => ChildKind::Document,
                },
                queryable: matches!(status, Some(IndexStatus::Ready { .. })),
                status,
            });
        }

        let (distances, layout) =
            match self.semantic_distances(collection, store, embedder, node, anchor, &children).await {
                Ok(distances) => (distances, Layout::Semantic),
                Err(e) => {
                    tracing::warn!(path = %key, "falling back to positional layout: {e}");
                    (positional_distances(&children), Layout::Positional)
                }
            };

        let level = Arc::new(HierarchyLevel {
            path: key.clone(),
            name: node.name.clone(),
            children,
            distances,
            layout,
            generation: collection.generation(),
        });
        if layout == Layout::Semantic {
            self.cache
                .write()
                .unwrap_or_else(PoisonError::into_inner)
                .insert(key, Arc::clone(&level));
        }
        Ok(level)
    }

    /// Drop every cached level.
    pub fn clear(&self) {
        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .clear();
    }

    async fn semantic_distances(
        &self,
        collection: &Collection,
        store: &DocumentStore,
        embedder: &Embedder,
        node: &Node,
        anchor: Option<&UserProfile>,
        children: &[LevelChild],
    ) -> Result<Vec<PairDistance>, EmbedError> {
        let mut vectors: Vec<Representation> = Vec::with_capacity(children.len());
        if let Some(profile) = anchor {
            vectors.push(embedder.represent(&profile.summary()).await?);
        }
        for child in &node.children {
            let vector = self.represent_node(collection, store, embedder, child).await?;
            let vector = match anchor {
                Some(profile) => scale(&vector, profile.domain_weight(&child.name)),
                None => vector,
            };
            vectors.push(vector);
        }

        let mut distances = Vec::new();
        for i in 0..children.len() {
            for j in (i + 1)..children.len() {
                let d = embedder.distance(&vectors[i], &vectors[j])?;
                let (a, b) = ordered(&children[i].path, &children[j].path);
                distances.push(PairDistance {
                    a,
                    b,
                    distance: d.max(MIN_DISTINCT_DISTANCE),
                });
            }
        }
        Ok(distances)
    }

    async fn represent_node(
        &self,
        collection: &Collection,
        store: &DocumentStore,
        embedder: &Embedder,
        node: &Node,
    ) -> Result<Representation, EmbedError> {
        if !node.is_folder() {
            let text = self.leaf_text(collection, store, node).await;
            return embedder.represent(&text).await;
        }

        let samples: Vec<&Node> = node
            .documents()
            .into_iter()
            .filter(|d| d.is_queryable())
            .take(self.config.folder_sample_limit)
            .collect();
        if samples.is_empty() {
            return embedder.represent(&node.summary_text()).await;
        }
        let mut vectors = Vec::with_capacity(samples.len());
        for doc in samples {
            let text = self.leaf_text(collection, store, doc).await;
            vectors.push(embedder.represent(&text).await?);
        }
        Ok(centroid(&vectors))
    }

    /// Text standing for a document: its cleaned name and the start of its content.
    async fn leaf_text(
        &self,
        collection: &Collection,
        store: &DocumentStore,
        node: &Node,
    ) -> String {
        let name = node.display_name();
        let Some(id) = node.doc_id().filter(|_| node.is_queryable()) else {
            return name;
        };
        let entry = store
            .get_or_index(&id, &collection.absolute(&id), node.fingerprint)
            .await;
        match &entry.document {
            Some(document) => {
                let preview = document.preview(self.config.preview_chars);
                if preview.trim().is_empty() {
                    name
                } else {
                    format!("{name}\n{preview}")
                }
            }
            None => name,
        }
    }
}

/// Index status of a document child; `None` for folders and unsupported file kinds.
async fn document_status(
    collection: &Collection,
    store: &DocumentStore,
    node: &Node,
) -> Option<IndexStatus> {
    let id = node.doc_id().filter(|_| node.is_queryable())?;
    let entry = store
        .get_or_index(&id, &collection.absolute(&id), node.fingerprint)
        .await;
    Some(entry.status.clone())
}

fn ordered(a: &str, b: &str) -> (String, String) {
    if a <= b {
        (a.to_owned(), b.to_owned())
    } else {
        (b.to_owned(), a.to_owned())
    }
}

#[allow(clippy::cast_precision_loss)]
fn positional_distances(children: &[LevelChild]) -> Vec<PairDistance> {
    let n = children.len().max(1) as f64;
    let mut distances = Vec::new();
    for i in 0..children.len() {
        for j in (i + 1)..children.len() {
            let (a, b) = ordered(&children[i].path, &children[j].path);
            distances.push(PairDistance {
                a,
                b,
                distance: (j - i) as f64 / n,
            });
        }
    }
    distances
}

#[allow(clippy::cast_precision_loss, clippy::cast_possible_truncation)]
fn centroid(vectors: &[Representation]) -> Representation {
    let dims = vectors.first().map_or(0, |v| v.len());
    let mut sum = vec![0.0f64; dims];
    for v in vectors {
        for (acc, x) in sum.iter_mut().zip(v.iter()) {
            *acc += f64::from(*x);
        }
    }
    let n = vectors.len().max(1) as f64;
    sum.into_iter().map(|s| (s / n) as f32).collect()
}

#[allow(clippy::cast_possible_truncation)]
fn scale(vector: &Representation, weight: f64) -> Representation {
    vector.iter().map(|x| (f64::from(*x) * weight) as f32).collect()
}
