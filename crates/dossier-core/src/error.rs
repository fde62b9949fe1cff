//! Error taxonomy for the analysis pipeline.
//!
//! Every error reaching the scheduler is either *transient* (retried with
//! backoff until the stage's attempt ceiling) or *permanent* (dead-lettered
//! immediately). Adapters return their own typed errors; `PipelineError`
//! wraps them and carries the retry decision via [`PipelineError::is_permanent`].

use uuid::Uuid;

/// Errors from the text extraction adapter.
#[derive(Debug, thiserror::Error)]
pub enum ExtractError {
    /// No decoder for this extension/MIME type. Permanent: retrying an
    /// unsupported upload can never succeed.
    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    /// The bytes did not parse as the detected format.
    #[error("failed to decode {format}: {message}")]
    Decode { format: String, message: String },

    /// Reading the stored upload bytes failed.
    #[error("failed to read stored document: {0}")]
    Io(#[from] std::io::Error),

    /// Image routed to OCR but no engine is configured.
    #[error("no OCR engine configured for image documents")]
    OcrUnavailable,

    /// The OCR engine itself failed (network, provider error).
    #[error("OCR failed: {0}")]
    Ocr(String),
}

impl ExtractError {
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            ExtractError::UnsupportedFormat(_)
                | ExtractError::Decode { .. }
                | ExtractError::OcrUnavailable
        )
    }
}

/// Errors from the AI completion adapter.
#[derive(Debug, thiserror::Error)]
pub enum CompletionError {
    /// Transport or provider-side failure (timeouts, 5xx, 429).
    #[error("provider error: {0}")]
    Provider(String),

    /// The model returned something that does not parse against the
    /// requested response schema. Retried: the model may do better on the
    /// next attempt; the scheduler dead-letters once retries are exhausted.
    #[error("response failed schema validation: {0}")]
    MalformedResponse(String),

    /// A required placeholder had no value. Caller error, never retried.
    #[error("prompt template error: {0}")]
    Template(String),

    /// No template registered under this name.
    #[error("unknown prompt template '{0}'")]
    UnknownTemplate(String),
}

impl CompletionError {
    pub fn is_permanent(&self) -> bool {
        matches!(
            self,
            CompletionError::Template(_) | CompletionError::UnknownTemplate(_)
        )
    }
}

/// Errors from the artefact store boundary.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// No artefact with this id. Permanent: the record will not appear later.
    #[error("artefact not found: {0}")]
    NotFound(Uuid),

    /// Transport failure or non-2xx from the REST facade.
    #[error("store request failed: {0}")]
    Request(String),

    /// The facade returned a body we could not decode.
    #[error("store returned invalid payload: {0}")]
    InvalidPayload(String),
}

impl StoreError {
    pub fn is_permanent(&self) -> bool {
        matches!(self, StoreError::NotFound(_))
    }
}

/// Top-level pipeline error, mapped by the scheduler to retry or dead-letter.
#[derive(Debug, thiserror::Error)]
pub enum PipelineError {
    #[error(transparent)]
    Extract(#[from] ExtractError),

    #[error(transparent)]
    Completion(#[from] CompletionError),

    #[error(transparent)]
    Store(#[from] StoreError),

    /// A worker dequeued a stage name it does not recognize (version skew).
    #[error("unknown pipeline stage '{0}'")]
    UnknownStage(String),

    /// Webhook target unreachable or responded non-2xx.
    #[error("webhook delivery failed: {0}")]
    Webhook(String),

    /// Post-webhook housekeeping failed.
    #[error("cleanup failed: {0}")]
    Cleanup(String),

    /// The hard per-task time limit fired.
    #[error("task exceeded hard time limit")]
    TimedOut,
}

impl PipelineError {
    /// Permanent errors skip the retry budget and dead-letter immediately.
    pub fn is_permanent(&self) -> bool {
        match self {
            PipelineError::Extract(e) => e.is_permanent(),
            PipelineError::Completion(e) => e.is_permanent(),
            PipelineError::Store(e) => e.is_permanent(),
            PipelineError::UnknownStage(_) => true,
            PipelineError::Webhook(_) | PipelineError::Cleanup(_) | PipelineError::TimedOut => {
                false
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn unsupported_format_is_permanent() {
        let err = PipelineError::from(ExtractError::UnsupportedFormat("xyz".into()));
        assert!(err.is_permanent());
    }

    #[test]
    fn provider_errors_are_transient() {
        let err = PipelineError::from(CompletionError::Provider("503".into()));
        assert!(!err.is_permanent());
        let err = PipelineError::from(CompletionError::MalformedResponse("bad json".into()));
        assert!(!err.is_permanent());
    }

    #[test]
    fn template_errors_are_permanent() {
        let err = PipelineError::from(CompletionError::Template("{document_text}".into()));
        assert!(err.is_permanent());
    }

    #[test]
    fn timeouts_are_transient() {
        assert!(!PipelineError::TimedOut.is_permanent());
    }
}
