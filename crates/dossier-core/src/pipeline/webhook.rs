//! Terminal webhook delivery.

use std::time::Duration;

use crate::artefact::Artefact;
use crate::error::PipelineError;

/// POSTs the finished artefact record to its registered webhook URL.
///
/// Delivery failures are transient: the webhook task has its own (long)
/// retry budget and the artefact is already `processed` by the time this
/// runs, so a flaky receiver never affects analysis state.
pub struct WebhookNotifier {
    http: reqwest::Client,
}

impl WebhookNotifier {
    pub fn new(timeout: Duration) -> Result<Self, PipelineError> {
        let http = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| PipelineError::Webhook(e.to_string()))?;
        Ok(Self { http })
    }

    /// Deliver the final record. A document without a webhook URL is a no-op.
    pub async fn notify(&self, artefact: &Artefact) -> Result<(), PipelineError> {
        if artefact.webhook_url.is_empty() {
            tracing::debug!(document = %artefact.id, "No webhook URL, skipping delivery");
            return Ok(());
        }

        let response = self
            .http
            .post(&artefact.webhook_url)
            .json(artefact)
            .send()
            .await
            .map_err(|e| PipelineError::Webhook(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(PipelineError::Webhook(format!(
                "receiver returned {status}"
            )));
        }

        tracing::info!(document = %artefact.id, url = %artefact.webhook_url, "Webhook delivered");
        Ok(())
    }
}
