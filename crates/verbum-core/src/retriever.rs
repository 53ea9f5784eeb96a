//! Chunk ranking for a single document: semantic first, lexical when representations fail,
//! then packing into the context budget.

use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Serialize;
use verbum_index::{Chunk, EmbedError, Embedder, IndexedDocument};

use crate::prompt::excerpt_cost;

/// Strategy that produced a ranking.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RetrievalStrategy {
    /// Ascending representation distance to the query.
    Semantic,
    /// Descending count of shared query terms.
    Lexical,
}

#[derive(Debug, Clone)]
pub struct RetrieverConfig {
    /// Upper bound on chunks returned.
    pub max_chunks: usize,
    /// Upper bound on excerpt characters, headers included.
    pub context_budget_chars: usize,
}

impl Default for RetrieverConfig {
    fn default() -> Self {
        Self {
            max_chunks: 6,
            context_budget_chars: 8000,
        }
    }
}

/// Ranked chunks, most relevant first.
#[derive(Debug)]
pub struct Retrieval<'a> {
    pub chunks: Vec<&'a Chunk>,
    pub strategy: RetrievalStrategy,
    /// Excerpt characters the selection occupies.
    pub total_chars: usize,
}

pub struct Retriever {
    config: RetrieverConfig,
}

impl Retriever {
    #[must_use]
    pub fn new(config: RetrieverConfig) -> Self {
        Self { config }
    }

    /// Select up to `max_chunks` chunks of `entry` for `query` within the context budget.
    ///
    /// Ties are broken by lower start page, then lower chunk index, so the result is stable
    /// across calls.
    pub async fn select<'a>(
        &self,
        query: &str,
        entry: &'a IndexedDocument,
        embedder: &Embedder,
    ) -> Retrieval<'a> {
        let (ranked, strategy) = match semantic_rank(query, entry, embedder).await {
            Ok(ranked) => (ranked, RetrievalStrategy::Semantic),
            Err(e) => {
                tracing::warn!(document = %entry.id, "semantic ranking unavailable, using lexical: {e}");
                (lexical_rank(query, &entry.chunks), RetrievalStrategy::Lexical)
            }
        };

        let mut chunks = Vec::new();
        let mut total_chars = 0;
        for chunk in ranked.into_iter().take(self.config.max_chunks) {
            let cost = excerpt_cost(chunk);
            if total_chars + cost > self.config.context_budget_chars {
                break;
            }
            total_chars += cost;
            chunks.push(chunk);
        }

        tracing::debug!(
            document = %entry.id,
            strategy = ?strategy,
            chunks = chunks.len(),
            total_chars,
            "retrieved chunks"
        );
        Retrieval {
            chunks,
            strategy,
            total_chars,
        }
    }
}

fn by_position(a: &Chunk, b: &Chunk) -> Ordering {
    a.pages
        .start
        .cmp(&b.pages.start)
        .then(a.id.index.cmp(&b.id.index))
}

async fn semantic_rank<'a>(
    query: &str,
    entry: &'a IndexedDocument,
    embedder: &Embedder,
) -> Result<Vec<&'a Chunk>, EmbedError> {
    let query_vector = embedder.represent(query).await?;
    let vectors = entry.chunk_vectors(embedder).await?;

    let mut scored = Vec::with_capacity(entry.chunks.len());
    for (chunk, vector) in entry.chunks.iter().zip(&vectors) {
        scored.push((embedder.distance(&query_vector, vector)?, chunk));
    }
    scored.sort_by(|(da, a), (db, b)| da.total_cmp(db).then_with(|| by_position(a, b)));
    Ok(scored.into_iter().map(|(_, c)| c).collect())
}

/// Lower-cased alphanumeric terms of at least two characters.
fn terms(text: &str) -> BTreeSet<String> {
    text.split(|c: char| !c.is_alphanumeric())
        .filter(|t| t.chars().count() >= 2)
        .map(str::to_lowercase)
        .collect()
}

fn lexical_rank<'a>(query: &str, chunks: &'a [Chunk]) -> Vec<&'a Chunk> {
    let query_terms = terms(query);
    let mut scored: Vec<(usize, &Chunk)> = chunks
        .iter()
        .map(|chunk| {
            let chunk_terms = terms(&chunk.text);
            (query_terms.intersection(&chunk_terms).count(), chunk)
        })
        .collect();
    scored.sort_by(|(sa, a), (sb, b)| sb.cmp(sa).then_with(|| by_position(a, b)));
    scored.into_iter().map(|(_, c)| c).collect()
}

#[cfg(test)]
mod tests {
    use std::sync::Arc;
    use std::time::Duration;

    use proptest::prelude::*;
    use verbum_index::{
        Chunker, ChunkerConfig, DistanceMetric, DocId, DocumentStore, Extractors,
    };
    use verbum_llm::mock::MockProvider;

    use super::*;

    async fn indexed(pages: &[&str], max_chars: usize) -> (tempfile::TempDir, Arc<IndexedDocument>) {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("doc.txt");
        std::fs::write(&file, pages.join("\u{c}")).unwrap();
        let store = DocumentStore::new(
            Chunker::new(ChunkerConfig {
                max_chars,
                detect_chapters: false,
            }),
            Extractors::new(verbum_index::DEFAULT_MAX_FILE_SIZE, Duration::from_secs(5)),
        );
        let entry = store.get_or_index(&DocId::new("doc.txt"), &file, None).await;
        (dir, entry)
    }

    fn hashing() -> Embedder {
        Embedder::hashing(256, DistanceMetric::Euclidean, 8191)
    }

    fn failing() -> Embedder {
        Embedder::from_fn(
            verbum_llm::embed_fn(Arc::new(MockProvider::default().failing_embeddings())),
            DistanceMetric::Euclidean,
            8191,
            Duration::from_secs(1),
        )
    }

    const PAGES: [&str; 4] = [
        "Ferns reproduce with spores carried by wind.",
        "Roman legions marched along paved roads.",
        "Bread rises because yeast produces gas.",
        "Roads in Rome were paved with basalt stones.",
    ];

    #[tokio::test]
    async fn semantic_ranking_prefers_related_chunks() {
        let (_dir, entry) = indexed(&PAGES, 50).await;
        let retriever = Retriever::new(RetrieverConfig {
            max_chunks: 2,
            ..RetrieverConfig::default()
        });
        let result = retriever
            .select("paved roads of Rome", &entry, &hashing())
            .await;
        assert_eq!(result.strategy, RetrievalStrategy::Semantic);
        let pages: BTreeSet<u32> = result.chunks.iter().map(|c| c.pages.start).collect();
        assert_eq!(pages, BTreeSet::from([2, 4]));
    }

    #[tokio::test]
    async fn unavailable_embeddings_fall_back_to_lexical() {
        let (_dir, entry) = indexed(&PAGES, 50).await;
        let retriever = Retriever::new(RetrieverConfig {
            max_chunks: 3,
            ..RetrieverConfig::default()
        });
        let result = retriever.select("Roman roads", &entry, &failing()).await;
        assert_eq!(result.strategy, RetrievalStrategy::Lexical);
        // Page 2 shares both terms; page 4 shares "roads"; the rest tie on zero by page.
        let pages: Vec<u32> = result.chunks.iter().map(|c| c.pages.start).collect();
        assert_eq!(pages, vec![2, 4, 1]);
    }

    #[tokio::test]
    async fn lexical_ties_break_by_page() {
        let (_dir, entry) = indexed(&["alpha beta", "alpha gamma", "alpha delta"], 20).await;
        let ranked = lexical_rank("alpha", &entry.chunks);
        let pages: Vec<u32> = ranked.iter().map(|c| c.pages.start).collect();
        assert_eq!(pages, vec![1, 2, 3]);
    }

    #[tokio::test]
    async fn budget_drops_lowest_ranked() {
        let (_dir, entry) = indexed(&PAGES, 50).await;
        let one = excerpt_cost(&entry.chunks[1]);
        let retriever = Retriever::new(RetrieverConfig {
            max_chunks: 4,
            context_budget_chars: one + 10,
        });
        let result = retriever.select("Roman legions", &entry, &failing()).await;
        assert_eq!(result.chunks.len(), 1);
        assert_eq!(result.chunks[0].pages.start, 2);
        assert!(result.total_chars <= one + 10);
    }

    #[tokio::test]
    async fn selection_is_deterministic() {
        let (_dir, entry) = indexed(&PAGES, 50).await;
        let retriever = Retriever::new(RetrieverConfig::default());
        let embedder = hashing();
        let first: Vec<String> = retriever
            .select("stones and spores", &entry, &embedder)
            .await
            .chunks
            .iter()
            .map(|c| c.id.to_string())
            .collect();
        for _ in 0..3 {
            let again: Vec<String> = retriever
                .select("stones and spores", &entry, &embedder)
                .await
                .chunks
                .iter()
                .map(|c| c.id.to_string())
                .collect();
            assert_eq!(first, again);
        }
    }

    #[test]
    fn terms_drop_single_characters() {
        assert_eq!(
            terms("A cat, a DOG; x-ray"),
            BTreeSet::from(["cat".to_owned(), "dog".to_owned(), "ray".to_owned()])
        );
    }

    proptest! {
        #![proptest_config(ProptestConfig::with_cases(64))]

        #[test]
        fn lexical_rank_is_a_permutation(query in "[a-z ]{0,30}", texts in proptest::collection::vec("[a-z ]{1,40}", 1..8)) {
            let chunks: Vec<Chunk> = texts
                .iter()
                .enumerate()
                .map(|(i, t)| Chunk {
                    id: verbum_index::ChunkId { document: DocId::new("p.txt"), index: i },
                    text: t.clone(),
                    pages: verbum_index::PageRange::single(u32::try_from(i).unwrap() + 1),
                    label: None,
                    hash: String::new(),
                })
                .collect();
            let ranked = lexical_rank(&query, &chunks);
            prop_assert_eq!(ranked.len(), chunks.len());
            let mut indexes: Vec<usize> = ranked.iter().map(|c| c.id.index).collect();
            indexes.sort_unstable();
            prop_assert_eq!(indexes, (0..chunks.len()).collect::<Vec<_>>());
        }
    }
}
