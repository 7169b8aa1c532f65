// LLM client - OpenAI-compatible chat completions with streaming

use async_trait::async_trait;
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::Serialize;
use serde_json::{json, Value};

/// One message in the prompt sent to the generation backend
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessageInput {
    pub role: String,
    pub content: String,
}

/// Errors from the generation backend
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("LLM request failed: {0}")]
    Request(#[from] reqwest::Error),

    #[error("LLM API error ({status}): {message}")]
    Api { status: u16, message: String },

    #[error("LLM stream interrupted: {0}")]
    Interrupted(String),
}

/// Incremental fragments of a single completion
pub type CompletionStream = BoxStream<'static, Result<String, LlmError>>;

/// A text-generation backend that streams completions fragment by
/// fragment. The trait seam keeps the streaming engine independent of the
/// concrete provider.
#[async_trait]
pub trait CompletionBackend: Send + Sync {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessageInput>,
    ) -> Result<CompletionStream, LlmError>;
}

/// OpenAI-compatible streaming client. Constructed once at startup and
/// shared across requests; it holds no per-request state.
pub struct LlmClient {
    client: reqwest::Client,
    api_key: String,
    base_url: String,
    model: String,
}

impl LlmClient {
    pub fn new(api_key: String, base_url: String, model: String) -> Self {
        Self {
            client: reqwest::Client::new(),
            api_key,
            base_url,
            model,
        }
    }
}

#[async_trait]
impl CompletionBackend for LlmClient {
    async fn stream_chat(
        &self,
        messages: Vec<ChatMessageInput>,
    ) -> Result<CompletionStream, LlmError> {
        let body = json!({
            "model": self.model,
            "messages": messages,
            "stream": true,
        });

        let response = self
            .client
            .post(format!("{}/chat/completions", self.base_url))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await?;

        let status = response.status();
        if !status.is_success() {
            let message = response.text().await.unwrap_or_default();
            return Err(LlmError::Api {
                status: status.as_u16(),
                message,
            });
        }

        let mut bytes = response.bytes_stream();
        let stream = async_stream::stream! {
            let mut buffer = String::new();
            while let Some(chunk) = bytes.next().await {
                let chunk = match chunk {
                    Ok(chunk) => chunk,
                    Err(e) => {
                        yield Err(LlmError::Interrupted(e.to_string()));
                        return;
                    }
                };
                buffer.push_str(&String::from_utf8_lossy(&chunk));

                // SSE frames arrive as "data: {json}\n\n"; a chunk may
                // carry several lines or split one across chunks
                while let Some(pos) = buffer.find('\n') {
                    let line = buffer[..pos].trim().to_string();
                    buffer.drain(..=pos);

                    let Some(data) = line.strip_prefix("data:") else {
                        continue;
                    };
                    let data = data.trim();
                    if data == "[DONE]" {
                        return;
                    }
                    if let Some(content) = parse_delta_content(data) {
                        if !content.is_empty() {
                            yield Ok(content);
                        }
                    }
                }
            }
        };

        Ok(Box::pin(stream))
    }
}

/// Extract the delta content from one streamed completion chunk.
/// Chunks look like: {"choices":[{"delta":{"content":"hello"}}]}
fn parse_delta_content(data: &str) -> Option<String> {
    let value: Value = serde_json::from_str(data).ok()?;
    value
        .get("choices")?
        .get(0)?
        .get("delta")?
        .get("content")?
        .as_str()
        .map(|s| s.to_string())
}
