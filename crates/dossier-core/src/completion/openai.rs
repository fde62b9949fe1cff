//! OpenAI-compatible chat client.
//!
//! Speaks the `/v1/chat/completions` JSON shape directly over reqwest with
//! typed request/response structs. Works against OpenAI itself or any
//! compatible gateway via `base_url`.

use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::error::CompletionError;

use super::{ChatCompletion, CompletionOutput, CompletionRequest, TokenUsage};

/// Low-level chat-completions client, shared by the completion adapter and
/// the vision OCR engine.
pub struct OpenAiClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

#[derive(Serialize)]
pub(crate) struct ChatBody {
    pub model: String,
    pub temperature: f32,
    pub messages: Vec<ChatMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_format: Option<serde_json::Value>,
}

#[derive(Serialize)]
pub(crate) struct ChatMessage {
    pub role: &'static str,
    /// String for plain prompts, an array of content parts for vision input.
    pub content: serde_json::Value,
}

#[derive(Deserialize)]
struct ChatResponse {
    choices: Vec<ChatChoice>,
    usage: Option<WireUsage>,
}

#[derive(Deserialize)]
struct ChatChoice {
    message: WireMessage,
}

#[derive(Deserialize)]
struct WireMessage {
    content: Option<String>,
}

#[derive(Deserialize)]
struct WireUsage {
    prompt_tokens: u32,
    completion_tokens: u32,
    total_tokens: u32,
}

impl OpenAiClient {
    pub const DEFAULT_BASE_URL: &'static str = "https://api.openai.com/v1";

    pub fn new(api_key: impl Into<String>, timeout: Duration) -> Result<Self, CompletionError> {
        Self::with_base_url(api_key, Self::DEFAULT_BASE_URL, timeout)
    }

    pub fn with_base_url(
        api_key: impl Into<String>,
        base_url: impl Into<String>,
        timeout: Duration,
    ) -> Result<Self, CompletionError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| CompletionError::Provider(e.to_string()))?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Send a chat request, returning the message text and token usage.
    pub(crate) async fn chat(
        &self,
        body: &ChatBody,
    ) -> Result<(String, TokenUsage), CompletionError> {
        let url = format!("{}/chat/completions", self.base_url);
        let response = self
            .http
            .post(&url)
            .bearer_auth(&self.api_key)
            .json(body)
            .send()
            .await
            .map_err(|e| {
                if e.is_timeout() {
                    CompletionError::Provider("request timed out".to_string())
                } else {
                    CompletionError::Provider(e.to_string())
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let detail = response.text().await.unwrap_or_default();
            return Err(CompletionError::Provider(format!(
                "provider returned {status}: {detail}"
            )));
        }

        let parsed: ChatResponse = response
            .json()
            .await
            .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?;

        let content = parsed
            .choices
            .into_iter()
            .next()
            .and_then(|c| c.message.content)
            .ok_or_else(|| {
                CompletionError::MalformedResponse("response had no message content".to_string())
            })?;

        let usage = parsed
            .usage
            .map(|u| TokenUsage {
                prompt_tokens: u.prompt_tokens,
                completion_tokens: u.completion_tokens,
                total_tokens: u.total_tokens,
            })
            .unwrap_or_default();

        tracing::debug!(
            prompt_tokens = usage.prompt_tokens,
            completion_tokens = usage.completion_tokens,
            total_tokens = usage.total_tokens,
            "Completion finished"
        );

        Ok((content, usage))
    }
}

/// [`ChatCompletion`] adapter over [`OpenAiClient`].
pub struct OpenAiCompletion {
    client: OpenAiClient,
}

impl OpenAiCompletion {
    pub fn new(client: OpenAiClient) -> Self {
        Self { client }
    }
}

#[async_trait]
impl ChatCompletion for OpenAiCompletion {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionOutput, CompletionError> {
        let response_format = request.schema.as_ref().map(|s| {
            json!({
                "type": "json_schema",
                "json_schema": {
                    "name": s.name,
                    "schema": s.schema,
                    "strict": true,
                },
            })
        });

        let body = ChatBody {
            model: request.model.clone(),
            temperature: request.temperature,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: json!(request.system),
                },
                ChatMessage {
                    role: "user",
                    content: json!(request.user),
                },
            ],
            response_format,
        };

        let (content, usage) = self.client.chat(&body).await?;

        let value = if request.schema.is_some() {
            serde_json::from_str(&content)
                .map_err(|e| CompletionError::MalformedResponse(e.to_string()))?
        } else {
            json!({ "message": content })
        };

        Ok(CompletionOutput { value, usage })
    }

    fn provider_name(&self) -> &'static str {
        "openai"
    }
}
