//! Scripted provider for tests.

use std::collections::VecDeque;
use std::hash::{DefaultHasher, Hash, Hasher};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, PoisonError};

use crate::error::LlmError;
use crate::provider::{LlmProvider, Message};

/// Failure a scripted reply injects into `generate`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MockFailure {
    Timeout,
    Unavailable,
    ContextTooLarge,
    Rejected,
    /// 429 with a 20 ms `Retry-After`.
    RateLimited,
}

impl MockFailure {
    fn into_error(self) -> LlmError {
        match self {
            Self::Timeout => LlmError::Timeout {
                provider: "mock".into(),
            },
            Self::Unavailable => LlmError::Unavailable("mock provider unavailable".into()),
            Self::ContextTooLarge => LlmError::ContextTooLarge {
                provider: "mock".into(),
            },
            Self::Rejected => LlmError::Rejected {
                provider: "mock".into(),
                status: 400,
                message: "mock rejection".into(),
            },
            Self::RateLimited => LlmError::RateLimited {
                retry_after: Some(std::time::Duration::from_millis(20)),
            },
        }
    }
}

#[derive(Debug, Clone)]
pub enum MockReply {
    Text(String),
    Fail(MockFailure),
}

#[derive(Debug, Clone)]
pub struct MockProvider {
    replies: Arc<Mutex<VecDeque<MockReply>>>,
    prompts: Arc<Mutex<Vec<Vec<Message>>>>,
    generate_calls: Arc<AtomicUsize>,
    embed_calls: Arc<AtomicUsize>,
    pub default_response: String,
    pub fail_embed: bool,
    pub embedding_dims: usize,
    pub context_window: Option<usize>,
    /// Milliseconds to sleep before answering `generate`.
    pub delay_ms: u64,
}

impl Default for MockProvider {
    fn default() -> Self {
        Self {
            replies: Arc::new(Mutex::new(VecDeque::new())),
            prompts: Arc::new(Mutex::new(Vec::new())),
            generate_calls: Arc::new(AtomicUsize::new(0)),
            embed_calls: Arc::new(AtomicUsize::new(0)),
            default_response: "mock response (p. 1)".into(),
            fail_embed: false,
            embedding_dims: 64,
            context_window: None,
            delay_ms: 0,
        }
    }
}

impl MockProvider {
    #[must_use]
    pub fn with_responses(responses: Vec<String>) -> Self {
        Self::with_replies(responses.into_iter().map(MockReply::Text).collect())
    }

    #[must_use]
    pub fn with_replies(replies: Vec<MockReply>) -> Self {
        Self {
            replies: Arc::new(Mutex::new(replies.into())),
            ..Self::default()
        }
    }

    #[must_use]
    pub fn failing_embeddings(mut self) -> Self {
        self.fail_embed = true;
        self
    }

    #[must_use]
    pub fn with_context_window(mut self, window: usize) -> Self {
        self.context_window = Some(window);
        self
    }

    #[must_use]
    pub fn with_delay(mut self, ms: u64) -> Self {
        self.delay_ms = ms;
        self
    }

    /// Number of `generate` calls made so far, across clones.
    #[must_use]
    pub fn generate_calls(&self) -> usize {
        self.generate_calls.load(Ordering::SeqCst)
    }

    #[must_use]
    pub fn embed_calls(&self) -> usize {
        self.embed_calls.load(Ordering::SeqCst)
    }

    /// Prompts received by `generate`, in call order.
    #[must_use]
    pub fn prompts(&self) -> Vec<Vec<Message>> {
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .clone()
    }
}

impl LlmProvider for MockProvider {
    fn context_window(&self) -> Option<usize> {
        self.context_window
    }

    async fn generate(&self, messages: &[Message], _max_tokens: u32) -> Result<String, LlmError> {
        self.generate_calls.fetch_add(1, Ordering::SeqCst);
        self.prompts
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .push(messages.to_vec());
        if self.delay_ms > 0 {
            tokio::time::sleep(std::time::Duration::from_millis(self.delay_ms)).await;
        }
        let next = self
            .replies
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .pop_front();
        match next {
            Some(MockReply::Text(text)) => Ok(text),
            Some(MockReply::Fail(failure)) => Err(failure.into_error()),
            None => Ok(self.default_response.clone()),
        }
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        self.embed_calls.fetch_add(1, Ordering::SeqCst);
        if self.fail_embed {
            return Err(LlmError::Unavailable("mock embeddings disabled".into()));
        }
        Ok(word_histogram(text, self.embedding_dims))
    }

    fn supports_embeddings(&self) -> bool {
        !self.fail_embed
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "mock"
    }
}

/// Deterministic bag-of-words vector so texts sharing words end up close together.
#[allow(clippy::cast_possible_truncation)]
fn word_histogram(text: &str, dims: usize) -> Vec<f32> {
    let dims = dims.max(1);
    let mut vector = vec![0.0f32; dims];
    for word in text
        .split(|c: char| !c.is_alphanumeric())
        .filter(|w| !w.is_empty())
    {
        let mut hasher = DefaultHasher::new();
        word.to_lowercase().hash(&mut hasher);
        vector[(hasher.finish() % dims as u64) as usize] += 1.0;
    }
    vector
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn scripted_replies_then_default() {
        let mock = MockProvider::with_replies(vec![
            MockReply::Fail(MockFailure::ContextTooLarge),
            MockReply::Text("second".into()),
        ]);
        let msgs = [Message::user("q")];
        assert!(mock.generate(&msgs, 10).await.unwrap_err().is_context_overflow());
        assert_eq!(mock.generate(&msgs, 10).await.unwrap(), "second");
        assert_eq!(mock.generate(&msgs, 10).await.unwrap(), "mock response (p. 1)");
        assert_eq!(mock.generate_calls(), 3);
        assert_eq!(mock.prompts().len(), 3);
    }

    #[tokio::test]
    async fn clones_share_counters() {
        let mock = MockProvider::default();
        let clone = mock.clone();
        clone.generate(&[Message::user("q")], 10).await.unwrap();
        assert_eq!(mock.generate_calls(), 1);
    }

    #[tokio::test]
    async fn embeddings_are_deterministic() {
        let mock = MockProvider::default();
        let a = mock.embed("Roman trade routes").await.unwrap();
        let b = mock.embed("roman TRADE routes").await.unwrap();
        assert_eq!(a, b);
        assert_eq!(a.len(), 64);
    }

    #[tokio::test]
    async fn failing_embeddings_report_unavailable() {
        let mock = MockProvider::default().failing_embeddings();
        assert!(!mock.supports_embeddings());
        let err = mock.embed("text").await.unwrap_err();
        assert!(err.is_transient());
        assert_eq!(mock.embed_calls(), 1);
    }
}
