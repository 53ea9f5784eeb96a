//! Query answering over a single document and the engine that ties indexing, hierarchy
//! and answering together.

pub mod answer;
pub mod citation;
pub mod config;
pub mod engine;
pub mod error;
pub mod prompt;
pub mod retriever;

pub use answer::{AnswerComposer, QueryPhase, QueryResult, QueryStatus};
pub use citation::{Citation, ParsedAnswer, QuoteVerification};
pub use config::Config;
pub use engine::{Engine, FailedDocument, IndexReport, Visit};
pub use error::{ErrorKind, QueryError};
pub use retriever::{Retrieval, RetrievalStrategy, Retriever};
