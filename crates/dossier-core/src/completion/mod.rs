//! AI completion boundary.
//!
//! A stage hands the adapter a rendered prompt pair plus an optional response
//! schema and gets back a JSON value and the token usage the provider
//! reported. The pipeline only ever sees this narrow surface; the vendor wire
//! format stays inside [`openai`].

pub(crate) mod openai;
pub mod prompts;

pub use openai::{OpenAiClient, OpenAiCompletion};
pub use prompts::{PromptLibrary, PromptVars, RenderedPrompt};

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::CompletionError;

/// Token accounting for one provider call. Cross-stage aggregation happens
/// in the task's carried state, not here.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TokenUsage {
    pub prompt_tokens: u32,
    pub completion_tokens: u32,
    pub total_tokens: u32,
}

/// JSON schema constraining the model's response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ResponseSchema {
    pub name: String,
    pub schema: serde_json::Value,
}

/// One completion call, fully rendered.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub model: String,
    pub temperature: f32,
    pub system: String,
    pub user: String,
    pub schema: Option<ResponseSchema>,
}

/// Structured (or `{"message": ...}`-wrapped plain text) result plus usage.
#[derive(Debug, Clone)]
pub struct CompletionOutput {
    pub value: serde_json::Value,
    pub usage: TokenUsage,
}

/// Chat/completion provider boundary.
#[async_trait]
pub trait ChatCompletion: Send + Sync {
    async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionOutput, CompletionError>;

    fn provider_name(&self) -> &'static str;
}
