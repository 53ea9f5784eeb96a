use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, OnceLock, PoisonError, RwLock};
use std::time::Duration;

use serde::{Deserialize, Serialize};
use verbum_llm::EmbedFuture;

/// Fixed-length numeric encoding of a text, shared without copying.
pub type Representation = Arc<[f32]>;

pub type EmbedFn = Arc<dyn Fn(&str) -> EmbedFuture + Send + Sync>;

/// Smallest distance reported between two representations that are not identical.
pub const MIN_DISTINCT_DISTANCE: f64 = 1e-9;

pub const DEFAULT_CACHE_CAPACITY: usize = 10_000;

#[derive(Debug, Clone, PartialEq, thiserror::Error)]
pub enum EmbedError {
    #[error("embedding capability unavailable: {0}")]
    Unavailable(String),

    #[error("embedding timed out after {0:?}")]
    Timeout(Duration),

    #[error("embedding has {actual} dimensions, expected {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("cannot embed empty text")]
    EmptyInput,

    #[error("embedding contains non-finite values")]
    NonFinite,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DistanceMetric {
    /// Euclidean distance; zero only for identical vectors.
    #[default]
    Euclidean,
    /// `1 - cosine similarity`, clamped to `[0, 2]`.
    Cosine,
}

impl DistanceMetric {
    /// Symmetric, non-negative distance between `a` and `b`.
    ///
    /// Computed in f64 with a fixed summation order, so swapping the arguments gives the
    /// same bits. Distinct vectors never come out as exactly zero.
    ///
    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the vectors differ in length.
    pub fn distance(self, a: &[f32], b: &[f32]) -> Result<f64, EmbedError> {
        if a.len() != b.len() {
            return Err(EmbedError::DimensionMismatch {
                expected: a.len(),
                actual: b.len(),
            });
        }
        if a == b {
            return Ok(0.0);
        }
        let d = match self {
            Self::Euclidean => a
                .iter()
                .zip(b)
                .map(|(x, y)| {
                    let diff = f64::from(*x) - f64::from(*y);
                    diff * diff
                })
                .sum::<f64>()
                .sqrt(),
            Self::Cosine => {
                let (mut dot, mut na, mut nb) = (0.0f64, 0.0f64, 0.0f64);
                for (x, y) in a.iter().zip(b) {
                    let (x, y) = (f64::from(*x), f64::from(*y));
                    dot += x * y;
                    na += x * x;
                    nb += y * y;
                }
                let norms = na.sqrt() * nb.sqrt();
                if norms == 0.0 {
                    1.0
                } else {
                    (1.0 - dot / norms).clamp(0.0, 2.0)
                }
            }
        };
        Ok(d.max(MIN_DISTINCT_DISTANCE))
    }
}

enum Backend {
    Provider(EmbedFn),
    Hashing { dims: usize },
}

/// Content-addressed representations, oldest evicted first once `capacity` is reached.
struct EmbedCache {
    entries: HashMap<blake3::Hash, Representation>,
    order: VecDeque<blake3::Hash>,
    capacity: usize,
}

impl EmbedCache {
    fn new(capacity: usize) -> Self {
        Self {
            entries: HashMap::new(),
            order: VecDeque::new(),
            capacity: capacity.max(1),
        }
    }

    fn insert(&mut self, key: blake3::Hash, value: Representation) {
        if self.entries.contains_key(&key) {
            return;
        }
        while self.entries.len() >= self.capacity {
            let Some(oldest) = self.order.pop_front() else {
                break;
            };
            self.entries.remove(&oldest);
        }
        self.order.push_back(key);
        self.entries.insert(key, value);
    }

    fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }
}

/// Deterministic text-to-representation mapping with a content-addressed cache.
pub struct Embedder {
    backend: Backend,
    metric: DistanceMetric,
    max_input_chars: usize,
    timeout: Duration,
    dims: OnceLock<usize>,
    cache: RwLock<EmbedCache>,
}

impl std::fmt::Debug for Embedder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let backend = match &self.backend {
            Backend::Provider(_) => "provider".to_owned(),
            Backend::Hashing { dims } => format!("hashing({dims})"),
        };
        f.debug_struct("Embedder")
            .field("backend", &backend)
            .field("metric", &self.metric)
            .field("max_input_chars", &self.max_input_chars)
            .field("timeout", &self.timeout)
            .field("dims", &self.dims.get())
            .field("cached", &self.cached())
            .finish_non_exhaustive()
    }
}

impl Embedder {
    /// Embed through an external capability such as [`verbum_llm::embed_fn`].
    pub fn from_fn<F>(
        embed: F,
        metric: DistanceMetric,
        max_input_chars: usize,
        timeout: Duration,
    ) -> Self
    where
        F: Fn(&str) -> EmbedFuture + Send + Sync + 'static,
    {
        Self::with_backend(
            Backend::Provider(Arc::new(embed)),
            metric,
            max_input_chars,
            timeout,
        )
    }

    /// Local feature-hashing embedder that needs no external service.
    #[must_use]
    pub fn hashing(dims: usize, metric: DistanceMetric, max_input_chars: usize) -> Self {
        Self::with_backend(
            Backend::Hashing { dims: dims.max(1) },
            metric,
            max_input_chars,
            Duration::MAX,
        )
    }

    fn with_backend(
        backend: Backend,
        metric: DistanceMetric,
        max_input_chars: usize,
        timeout: Duration,
    ) -> Self {
        Self {
            backend,
            metric,
            max_input_chars: max_input_chars.max(1),
            timeout,
            dims: OnceLock::new(),
            cache: RwLock::new(EmbedCache::new(DEFAULT_CACHE_CAPACITY)),
        }
    }

    /// Keep at most `capacity` representations, evicting the oldest first.
    #[must_use]
    pub fn with_cache_capacity(self, capacity: usize) -> Self {
        Self {
            cache: RwLock::new(EmbedCache::new(capacity)),
            ..self
        }
    }

    #[must_use]
    pub fn metric(&self) -> DistanceMetric {
        self.metric
    }

    /// Dimensionality observed so far, if any text has been embedded.
    #[must_use]
    pub fn dims(&self) -> Option<usize> {
        self.dims.get().copied()
    }

    #[must_use]
    pub fn cached(&self) -> usize {
        self.cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .len()
    }

    /// Forget every cached representation. The observed dimensionality is kept.
    pub fn clear_cache(&self) {
        let mut cache = self.cache.write().unwrap_or_else(PoisonError::into_inner);
        let dropped = cache.entries.len();
        cache.clear();
        tracing::debug!(dropped, "embedding cache cleared");
    }

    /// Represent `text`, truncated to the configured input limit.
    ///
    /// # Errors
    ///
    /// Returns `EmptyInput` for blank text, `Timeout` or `Unavailable` when the capability
    /// fails, and `DimensionMismatch` or `NonFinite` when it returns an unusable vector.
    pub async fn represent(&self, text: &str) -> Result<Representation, EmbedError> {
        if text.trim().is_empty() {
            return Err(EmbedError::EmptyInput);
        }
        let input: String = text.chars().take(self.max_input_chars).collect();
        let key = blake3::hash(input.as_bytes());

        if let Some(hit) = self
            .cache
            .read()
            .unwrap_or_else(PoisonError::into_inner)
            .entries
            .get(&key)
        {
            return Ok(Arc::clone(hit));
        }

        let vector = match &self.backend {
            Backend::Hashing { dims } => feature_hash(&input, *dims),
            Backend::Provider(embed) => tokio::time::timeout(self.timeout, embed(&input))
                .await
                .map_err(|_| EmbedError::Timeout(self.timeout))?
                .map_err(|e| EmbedError::Unavailable(e.to_string()))?,
        };
        let representation = self.validate(vector)?;

        self.cache
            .write()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(key, Arc::clone(&representation));
        Ok(representation)
    }

    fn validate(&self, vector: Vec<f32>) -> Result<Representation, EmbedError> {
        if vector.is_empty() {
            return Err(EmbedError::DimensionMismatch {
                expected: self.dims().unwrap_or(1),
                actual: 0,
            });
        }
        if vector.iter().any(|v| !v.is_finite()) {
            return Err(EmbedError::NonFinite);
        }
        let expected = *self.dims.get_or_init(|| vector.len());
        if vector.len() != expected {
            return Err(EmbedError::DimensionMismatch {
                expected,
                actual: vector.len(),
            });
        }
        Ok(vector.into())
    }

    /// # Errors
    ///
    /// Returns `DimensionMismatch` if the representations differ in length.
    pub fn distance(&self, a: &[f32], b: &[f32]) -> Result<f64, EmbedError> {
        self.metric.distance(a, b)
    }
}

/// Signed feature hashing of lowercase word tokens, L2-normalized.
#[allow(clippy::cast_possible_truncation, clippy::cast_precision_loss)]
fn feature_hash(text: &str, dims: usize) -> Vec<f32> {
    let mut vector = vec![0.0f32; dims];
    for token in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|t| !t.is_empty())
    {
        let digest = blake3::hash(token.to_lowercase().as_bytes());
        let mut bytes = [0u8; 8];
        bytes.copy_from_slice(&digest.as_bytes()[..8]);
        let h = u64::from_le_bytes(bytes);
        let bucket = (h % dims as u64) as usize;
        let sign = if h >> 63 == 0 { 1.0 } else { -1.0 };
        vector[bucket] += sign;
    }
    let norm = vector.iter().map(|v| v * v).sum::<f32>().sqrt();
    if norm > 0.0 {
        for v in &mut vector {
            *v /= norm;
        }
    }
    vector
}
