//! Language-model and embedding providers behind a single trait.

pub mod any;
pub mod error;
pub(crate) mod http;
#[cfg(feature = "mock")]
pub mod mock;
pub mod ollama;
pub mod openai;
pub mod provider;

pub use any::AnyProvider;
pub use error::LlmError;
pub use provider::{EmbedFuture, LlmProvider, Message, Role, embed_fn};
