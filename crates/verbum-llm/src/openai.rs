use std::fmt;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{LlmError, mentions_context_overflow};
use crate::provider::{LlmProvider, Message};

/// Raw outcome of one API call, before classification.
struct ApiReply {
    status: reqwest::StatusCode,
    retry_after: Option<Duration>,
    body: String,
}

/// Provider for the OpenAI chat-completions and embeddings API, or any server that speaks it.
pub struct OpenAiProvider {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
    embedding_model: Option<String>,
    temperature: Option<f32>,
    context_window_override: Option<usize>,
}

impl fmt::Debug for OpenAiProvider {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("OpenAiProvider")
            .field("client", &"<reqwest::Client>")
            .field("api_key", &"<redacted>")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("embedding_model", &self.embedding_model)
            .field("temperature", &self.temperature)
            .field("context_window_override", &self.context_window_override)
            .finish()
    }
}

impl Clone for OpenAiProvider {
    fn clone(&self) -> Self {
        Self {
            client: self.client.clone(),
            api_key: self.api_key.clone(),
            base_url: self.base_url.clone(),
            model: self.model.clone(),
            embedding_model: self.embedding_model.clone(),
            temperature: self.temperature,
            context_window_override: self.context_window_override,
        }
    }
}

impl OpenAiProvider {
    /// # Errors
    ///
    /// Returns an error if the HTTP client cannot be constructed.
    pub fn new(
        api_key: String,
        mut base_url: String,
        model: String,
        embedding_model: Option<String>,
    ) -> Result<Self, LlmError> {
        while base_url.ends_with('/') {
            base_url.pop();
        }
        Ok(Self {
            client: crate::http::default_client()?,
            api_key,
            base_url,
            model,
            embedding_model,
            temperature: None,
            context_window_override: None,
        })
    }

    #[must_use]
    pub fn with_client(mut self, client: reqwest::Client) -> Self {
        self.client = client;
        self
    }

    #[must_use]
    pub fn with_temperature(mut self, temperature: Option<f32>) -> Self {
        self.temperature = temperature;
        self
    }

    #[must_use]
    pub fn with_context_window(mut self, window: Option<usize>) -> Self {
        self.context_window_override = window;
        self
    }

    /// One POST, no retries: the caller owns the retry policy and sees `Retry-After` through
    /// [`LlmError::retry_after`].
    async fn post_json<B: Serialize + Sync>(&self, endpoint: &str, body: &B) -> Result<ApiReply, LlmError> {
        let url = format!("{}/{endpoint}", self.base_url);
        let response = self
            .client
            .post(&url)
            .header("Authorization", format!("Bearer {}", self.api_key))
            .header("Content-Type", "application/json")
            .json(body)
            .send()
            .await?;

        let status = response.status();
        let retry_after = parse_retry_after(response.headers());
        let body = response.text().await?;
        Ok(ApiReply {
            status,
            retry_after,
            body,
        })
    }

    fn classify_failure(&self, endpoint: &str, reply: ApiReply) -> LlmError {
        let ApiReply {
            status,
            retry_after,
            body,
        } = reply;
        if status == reqwest::StatusCode::TOO_MANY_REQUESTS {
            tracing::warn!(endpoint, ?retry_after, "OpenAI rate limited");
            return LlmError::RateLimited { retry_after };
        }
        tracing::error!(endpoint, %status, "OpenAI API error: {body}");
        // Self-hosted servers that speak this API often report an oversized prompt as a 500.
        if (status == reqwest::StatusCode::BAD_REQUEST || status.is_server_error())
            && mentions_context_overflow(&body)
        {
            return LlmError::ContextTooLarge {
                provider: self.name().to_owned(),
            };
        }
        if status.is_server_error() {
            return LlmError::Unavailable(format!("OpenAI {endpoint} returned {status}"));
        }
        LlmError::Rejected {
            provider: self.name().to_owned(),
            status: status.as_u16(),
            message: body,
        }
    }
}

/// `Retry-After` as delta-seconds; HTTP-date values are ignored.
fn parse_retry_after(headers: &reqwest::header::HeaderMap) -> Option<Duration> {
    headers
        .get(reqwest::header::RETRY_AFTER)?
        .to_str()
        .ok()?
        .trim()
        .parse::<u64>()
        .ok()
        .map(Duration::from_secs)
}

impl LlmProvider for OpenAiProvider {
    fn context_window(&self) -> Option<usize> {
        if self.context_window_override.is_some() {
            return self.context_window_override;
        }
        let model = self.model.as_str();
        if model.starts_with("gpt-4o") || model.starts_with("gpt-4.1") || model.starts_with("gpt-4-turbo")
        {
            Some(128_000)
        } else if model.starts_with("gpt-4-32k") {
            Some(32_768)
        } else if model.starts_with("gpt-4") {
            Some(8_192)
        } else if model.starts_with("gpt-3.5") {
            Some(16_385)
        } else {
            None
        }
    }

    async fn generate(&self, messages: &[Message], max_tokens: u32) -> Result<String, LlmError> {
        let api_messages: Vec<ApiMessage<'_>> = messages
            .iter()
            .map(|m| ApiMessage {
                role: m.role.as_str(),
                content: &m.content,
            })
            .collect();
        let body = ChatRequest {
            model: &self.model,
            messages: &api_messages,
            max_tokens,
            temperature: self.temperature,
        };

        let reply = self.post_json("chat/completions", &body).await?;
        if !reply.status.is_success() {
            return Err(self.classify_failure("chat/completions", reply));
        }

        let resp: ChatResponse = serde_json::from_str(&reply.body)?;
        resp.choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or(LlmError::EmptyResponse {
                provider: "openai".into(),
            })
    }

    async fn embed(&self, text: &str) -> Result<Vec<f32>, LlmError> {
        let model = self
            .embedding_model
            .as_deref()
            .ok_or(LlmError::EmbedUnsupported {
                provider: "openai".into(),
            })?;

        let body = EmbeddingRequest { input: text, model };
        let reply = self.post_json("embeddings", &body).await?;
        if !reply.status.is_success() {
            return Err(self.classify_failure("embeddings", reply));
        }

        let resp: EmbeddingResponse = serde_json::from_str(&reply.body)?;
        resp.data
            .into_iter()
            .next()
            .map(|d| d.embedding)
            .ok_or(LlmError::EmptyResponse {
                provider: "openai".into(),
            })
    }

    fn supports_embeddings(&self) -> bool {
        self.embedding_model.is_some()
    }

    #[allow(clippy::unnecessary_literal_bound)]
    fn name(&self) -> &str {
        "openai"
    }
}

#[derive(Serialize)]
struct ApiMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: &'a [ApiMessage<'a>],
    max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    temperature: Option<f32>,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Serialize)]
struct EmbeddingRequest<'a> {
    input: &'a str,
    model: &'a str,
}

#[derive(Deserialize)]
struct EmbeddingResponse {
    data: Vec<EmbeddingData>,
}

#[derive(Deserialize)]
struct EmbeddingData {
    embedding: Vec<f32>,
}
