//! Document indexing: page extraction, chunking, representations and the semantic hierarchy.

pub mod chunker;
pub mod collection;
pub mod embedding;
pub mod error;
pub mod hierarchy;
pub mod loader;
pub mod profile;
pub mod store;
pub mod types;

pub use chunker::{Chunker, ChunkerConfig};
pub use collection::{Collection, Node, NodeKind};
pub use embedding::{DistanceMetric, EmbedError, Embedder, Representation};
pub use error::IndexError;
pub use hierarchy::{
    ChildKind, HierarchyBuilder, HierarchyConfig, HierarchyError, HierarchyLevel, Layout, LevelChild,
    PairDistance,
};
pub use loader::{Extractors, PageExtractor, TextLoader};
pub use profile::UserProfile;
pub use store::{DocumentStore, IndexStatus, IndexedDocument};
pub use types::{Chunk, ChunkId, DocId, Document, FileKind, Page, PageRange};

#[cfg(feature = "pdf")]
pub use loader::PdfLoader;

/// Default maximum file size: 50 MiB.
pub const DEFAULT_MAX_FILE_SIZE: u64 = 50 * 1024 * 1024;
