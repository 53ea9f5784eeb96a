#[cfg(feature = "mock")]
use crate::mock::MockProvider;
use crate::ollama::OllamaProvider;
use crate::openai::OpenAiProvider;

use crate::error::LlmError;
use crate::provider::{EmbedFuture, LlmProvider, Message};

/// Generates a match over all `AnyProvider` variants, binding the inner provider
/// and evaluating the given expression for each arm.
macro_rules! delegate_provider {
    ($self:expr, |$p:ident| $expr:expr) => {
        match $self {
            AnyProvider::Ollama($p) => $expr,
            AnyProvider::OpenAi($p) => $expr,
            #[cfg(feature = "mock")]
            AnyProvider::Mock($p) => $expr,
        }
    };
}

#[derive(Debug, Clone)]
pub enum AnyProvider {
    Ollama(OllamaProvider),
    OpenAi(OpenAiProvider),
    #[cfg(feature = "mock")]
    Mock(MockProvider),
}

impl AnyProvider {
    /// Return a cloneable closure that calls `embed()` on this provider.
    pub fn embed_fn(&self) -> impl Fn(&str) -> EmbedFuture + Send + Sync + 'static {
        crate::provider::embed_fn(std::sync::Arc::new(self.clone()))
    }
}

impl LlmProvider for AnyProvider {
    fn context_window(&self) -> Option<usize> {
        delegate_provider!(self, |p| p.context_window())
    }

    async fn generate(&self, messages: &[Message], max_tokens: u32) -> Result<String, LlmError> {
        delegate_provider!(self, |p| p.generate(messages, max_tokens).await)
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        delegate_provider!(self, |p| p.embed(text).await)
    }

    fn supports_embeddings(&self) -> bool {
        delegate_provider!(self, |p| p.supports_embeddings())
    }

    fn name(&self) -> &str {
        delegate_provider!(self, |p| p.name())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn delegates_name_and_capabilities() {
        let p = AnyProvider::Ollama(OllamaProvider::new(
            "http://localhost:11434",
            "llama3".into(),
            "nomic-embed-text".into(),
        ));
        assert_eq!(p.name(), "ollama");
        assert!(p.supports_embeddings());
        assert!(p.context_window().is_none());

        let p = AnyProvider::OpenAi(
            OpenAiProvider::new("k".into(), "http://x".into(), "gpt-4".into(), None).unwrap(),
        );
        assert_eq!(p.name(), "openai");
        assert!(!p.supports_embeddings());
        assert_eq!(p.context_window(), Some(8_192));
    }

    #[cfg(feature = "mock")]
    #[tokio::test]
    async fn embed_fn_calls_inner_provider() {
        let mock = MockProvider::default();
        let any = AnyProvider::Mock(mock.clone());
        let embed = any.embed_fn();
        let vector = embed("hello world").await.unwrap();
        assert_eq!(vector.len(), mock.embedding_dims);
        assert_eq!(mock.embed_calls(), 1);
    }
}
