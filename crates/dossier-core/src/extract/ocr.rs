//! Image OCR through a vision-capable chat model.
//!
//! Image uploads have no local decoder; the engine sends the image as a
//! base64 data URL to the provider and asks for a verbatim transcription.

use async_trait::async_trait;
use base64::Engine as _;
use serde_json::json;

use crate::completion::openai::{ChatBody, ChatMessage};
use crate::completion::OpenAiClient;
use crate::error::ExtractError;

use super::ExtractedText;

/// Pluggable OCR boundary for image documents.
#[async_trait]
pub trait OcrEngine: Send + Sync {
    /// Return the text visible in the image, with the tokens spent on it.
    async fn recognize(&self, bytes: &[u8], mime_type: &str)
        -> Result<ExtractedText, ExtractError>;
}

/// OCR via the chat provider's vision input.
pub struct VisionOcr {
    client: OpenAiClient,
    model: String,
}

impl VisionOcr {
    pub fn new(client: OpenAiClient, model: impl Into<String>) -> Self {
        Self {
            client,
            model: model.into(),
        }
    }
}

#[async_trait]
impl OcrEngine for VisionOcr {
    async fn recognize(
        &self,
        bytes: &[u8],
        mime_type: &str,
    ) -> Result<ExtractedText, ExtractError> {
        let encoded = base64::engine::general_purpose::STANDARD.encode(bytes);
        let data_url = format!("data:{mime_type};base64,{encoded}");

        let body = ChatBody {
            model: self.model.clone(),
            temperature: 0.0,
            messages: vec![
                ChatMessage {
                    role: "system",
                    content: json!(
                        "You transcribe documents from images. Output only the text \
                         visible in the image, preserving reading order. If the image \
                         contains no text, output nothing."
                    ),
                },
                ChatMessage {
                    role: "user",
                    content: json!([
                        {
                            "type": "image_url",
                            "image_url": { "url": data_url }
                        },
                        {
                            "type": "text",
                            "text": "Transcribe all text in this document image."
                        }
                    ]),
                },
            ],
            response_format: None,
        };

        let (text, usage) = self
            .client
            .chat(&body)
            .await
            .map_err(|e| ExtractError::Ocr(e.to_string()))?;

        tracing::debug!(
            tokens = usage.total_tokens,
            chars = text.len(),
            "OCR transcription finished"
        );
        Ok(ExtractedText {
            text,
            tokens_spent: usage.total_tokens as u64,
        })
    }
}
