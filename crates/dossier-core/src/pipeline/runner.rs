//! Stage execution.
//!
//! One handler per stage, all with the same shape: re-read the artefact,
//! call the adapter, patch the store, hand off the next stage with merged
//! carried state. A handler never commits partial results on failure, and
//! every write is an overwrite of fields the stage owns, so redelivery of
//! the same task converges to the same record.

use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use serde::Deserialize;

use crate::artefact::{
    AnalysisMode, AnalysisStatus, Artefact, ArtefactPatch, FeatureInsight, Finding, LegacyMapping,
};
use crate::completion::{prompts, ChatCompletion, CompletionOutput, PromptLibrary, PromptVars};
use crate::error::{CompletionError, ExtractError, PipelineError};
use crate::extract::TextExtractor;
use crate::scheduler::StageHandler;
use crate::store::{ArtefactStore, BlobDir};

use super::{resolve_alert, CarriedState, CostAccumulator, PipelineTask, Stage, WebhookNotifier};

pub struct StageRunner {
    store: Arc<dyn ArtefactStore>,
    blobs: BlobDir,
    extractor: TextExtractor,
    completion: Arc<dyn ChatCompletion>,
    prompts: Arc<PromptLibrary>,
    cost: CostAccumulator,
    webhook: WebhookNotifier,
    default_model: String,
}

impl StageRunner {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        store: Arc<dyn ArtefactStore>,
        blobs: BlobDir,
        extractor: TextExtractor,
        completion: Arc<dyn ChatCompletion>,
        prompts: Arc<PromptLibrary>,
        webhook: WebhookNotifier,
        default_model: impl Into<String>,
    ) -> Self {
        Self {
            cost: CostAccumulator::new(Arc::clone(&store)),
            store,
            blobs,
            extractor,
            completion,
            prompts,
            webhook,
            default_model: default_model.into(),
        }
    }

    /// Hand-off list for the stage after `task`, empty at the chain's end.
    fn advance(task: &PipelineTask, carried: CarriedState) -> Vec<PipelineTask> {
        match task.stage.next() {
            Some(next) => vec![task.handoff(next, carried)],
            None => Vec::new(),
        }
    }

    /// Render the stage's template against the current record and call the
    /// provider. Token usage is folded into the carried state by the caller.
    async fn complete(
        &self,
        template: &str,
        artefact: &Artefact,
    ) -> Result<CompletionOutput, PipelineError> {
        let vars = PromptVars {
            document_text: artefact.raw_text.as_deref(),
            analysis_criteria: artefact.analysis_criteria.as_deref(),
            output_language: &artefact.output_language,
            today: Some(Utc::now().date_naive()),
            detailed: artefact.analysis_mode == AnalysisMode::Detailed,
        };
        let rendered = self.prompts.render(template, &vars).await?;
        let request = rendered.into_request(&self.default_model);
        let output = self.completion.complete(&request).await?;
        Ok(output)
    }

    async fn analyse(&self, task: &PipelineTask) -> Result<Vec<PipelineTask>, PipelineError> {
        let artefact = self.store.get(task.document_id).await?;

        let mut patch = ArtefactPatch::new();
        if artefact.analysis_status == AnalysisStatus::Pending {
            patch.analysis_status = Some(AnalysisStatus::Processing);
        }
        // Stamp only on the first delivery so retries keep the true start.
        if artefact.analysis_started_at.is_none() {
            patch.analysis_started_at = Some(Utc::now());
        }
        if !patch.is_empty() {
            self.store.patch(task.document_id, patch).await?;
        }

        tracing::info!(document = %task.document_id, "Analysis started");
        Ok(Self::advance(task, task.carried))
    }

    async fn extract_text(&self, task: &PipelineTask) -> Result<Vec<PipelineTask>, PipelineError> {
        let artefact = self.store.get(task.document_id).await?;
        let bytes = self
            .blobs
            .read(task.document_id)
            .await
            .map_err(ExtractError::Io)?;
        let extracted = self
            .extractor
            .extract_text(&bytes, &artefact.filename)
            .await?;

        self.store
            .patch(
                task.document_id,
                ArtefactPatch {
                    raw_text: Some(extracted.text),
                    ..Default::default()
                },
            )
            .await?;

        // OCR extraction is an AI call too; its tokens join the total.
        let carried = task.carried.add_tokens(extracted.tokens_spent);
        Ok(Self::advance(task, carried))
    }

    async fn smart_summary(&self, task: &PipelineTask) -> Result<Vec<PipelineTask>, PipelineError> {
        #[derive(Deserialize)]
        struct Payload {
            category: String,
            sub_category: String,
            summary_short: String,
            summary_long: String,
            /// YYYY-MM-DD or null; unparseable dates are dropped, not fatal.
            expires_at: Option<String>,
        }

        let artefact = self.store.get(task.document_id).await?;
        let output = self.complete(prompts::SMART_SUMMARY, &artefact).await?;
        let payload: Payload = parse_payload(&output.value)?;

        let expires_at = payload
            .expires_at
            .as_deref()
            .and_then(|s| NaiveDate::parse_from_str(s, "%Y-%m-%d").ok());

        let mut patch = ArtefactPatch {
            category: Some(payload.category),
            sub_category: Some(payload.sub_category),
            summary_short: Some(payload.summary_short),
            summary_long: Some(payload.summary_long),
            ..Default::default()
        };
        if let Some(date) = expires_at {
            patch.expires_at = Some(date);
            patch.is_expired = Some(date < Utc::now().date_naive());
        }
        self.store.patch(task.document_id, patch).await?;

        let carried = task.carried.add_tokens(output.usage.total_tokens as u64);
        Ok(Self::advance(task, carried))
    }

    async fn analysis_criteria(
        &self,
        task: &PipelineTask,
    ) -> Result<Vec<PipelineTask>, PipelineError> {
        let artefact = self.store.get(task.document_id).await?;
        let output = self.complete(prompts::ANALYSIS_CRITERIA, &artefact).await?;

        // Free-form stage: the provider wraps plain text as {"message": ...}.
        let criteria = output
            .value
            .get("message")
            .and_then(|v| v.as_str())
            .ok_or_else(|| {
                CompletionError::MalformedResponse("criteria response had no text".to_string())
            })?;

        self.store
            .patch(
                task.document_id,
                ArtefactPatch {
                    analysis_criteria: Some(criteria.to_string()),
                    ..Default::default()
                },
            )
            .await?;

        let carried = task.carried.add_tokens(output.usage.total_tokens as u64);
        Ok(Self::advance(task, carried))
    }

    async fn features_and_insights(
        &self,
        task: &PipelineTask,
    ) -> Result<Vec<PipelineTask>, PipelineError> {
        #[derive(Deserialize)]
        struct Payload {
            items: Vec<FeatureInsight>,
        }

        let artefact = self.store.get(task.document_id).await?;
        let output = self
            .complete(prompts::FEATURES_AND_INSIGHTS, &artefact)
            .await?;
        let payload: Payload = parse_payload(&output.value)?;

        self.store
            .patch(
                task.document_id,
                ArtefactPatch {
                    features_and_insights: Some(payload.items),
                    ..Default::default()
                },
            )
            .await?;

        let carried = task.carried.add_tokens(output.usage.total_tokens as u64);
        Ok(Self::advance(task, carried))
    }

    async fn alerts_and_actions(
        &self,
        task: &PipelineTask,
    ) -> Result<Vec<PipelineTask>, PipelineError> {
        #[derive(Deserialize)]
        struct Payload {
            items: Vec<Finding>,
        }

        let artefact = self.store.get(task.document_id).await?;
        let output = self.complete(prompts::ALERTS_AND_ACTIONS, &artefact).await?;
        let payload: Payload = parse_payload(&output.value)?;

        self.store
            .patch(
                task.document_id,
                ArtefactPatch {
                    alerts_and_actions: Some(payload.items),
                    ..Default::default()
                },
            )
            .await?;

        let carried = task.carried.add_tokens(output.usage.total_tokens as u64);
        Ok(Self::advance(task, carried))
    }

    async fn legacy_schema_mapping(
        &self,
        task: &PipelineTask,
    ) -> Result<Vec<PipelineTask>, PipelineError> {
        let artefact = self.store.get(task.document_id).await?;
        let output = self
            .complete(prompts::LEGACY_SCHEMA_MAPPING, &artefact)
            .await?;
        let mapping: LegacyMapping = parse_payload(&output.value)?;

        self.store
            .patch(
                task.document_id,
                ArtefactPatch {
                    legacy_schema_mapping: Some(mapping),
                    ..Default::default()
                },
            )
            .await?;

        let carried = task.carried.add_tokens(output.usage.total_tokens as u64);
        Ok(Self::advance(task, carried))
    }

    async fn finalize(&self, task: &PipelineTask) -> Result<Vec<PipelineTask>, PipelineError> {
        let artefact = self.store.get(task.document_id).await?;

        // Redelivery after a completed run: the cost is already committed
        // and the status flipped, so only the webhook hand-off is re-issued.
        if artefact.analysis_status == AnalysisStatus::Processed {
            tracing::debug!(document = %task.document_id, "Already processed, skipping finalize");
            return Ok(Self::advance(task, CarriedState::default()));
        }

        let findings = artefact.alerts_and_actions.as_deref().unwrap_or_default();
        let alert_status = resolve_alert(findings);

        // Cost, alert status and the flip to processed go out as a single
        // patch: either the record stays untouched and the retry recomputes
        // the same total, or it is fully processed and the guard above skips.
        let total = self
            .cost
            .commit_with(
                task.document_id,
                task.carried.tokens_spent,
                ArtefactPatch {
                    alert_status: Some(alert_status),
                    analysis_status: Some(AnalysisStatus::Processed),
                    analysis_completed_at: Some(Utc::now()),
                    ..Default::default()
                },
            )
            .await?;

        tracing::info!(
            document = %task.document_id,
            ?alert_status,
            tokens = total,
            "Analysis finalized"
        );
        // The committed cost stays behind; the delivery tasks carry nothing.
        Ok(Self::advance(task, CarriedState::default()))
    }

    async fn deliver_webhook(&self, task: &PipelineTask) -> Result<Vec<PipelineTask>, PipelineError> {
        let artefact = self.store.get(task.document_id).await?;
        self.webhook.notify(&artefact).await?;
        Ok(Self::advance(task, task.carried))
    }

    async fn cleanup(&self, task: &PipelineTask) -> Result<Vec<PipelineTask>, PipelineError> {
        self.blobs
            .remove(task.document_id)
            .await
            .map_err(|e| PipelineError::Cleanup(e.to_string()))?;
        tracing::info!(document = %task.document_id, "Pipeline finished");
        Ok(Vec::new())
    }
}

#[async_trait]
impl StageHandler for StageRunner {
    async fn run(&self, task: &PipelineTask) -> Result<Vec<PipelineTask>, PipelineError> {
        tracing::debug!(
            task = %task.id,
            stage = %task.stage,
            document = %task.document_id,
            attempt = task.attempt,
            "Running stage"
        );
        match task.stage {
            Stage::Analyse => self.analyse(task).await,
            Stage::ExtractText => self.extract_text(task).await,
            Stage::SmartSummary => self.smart_summary(task).await,
            Stage::AnalysisCriteria => self.analysis_criteria(task).await,
            Stage::FeaturesAndInsights => self.features_and_insights(task).await,
            Stage::AlertsAndActions => self.alerts_and_actions(task).await,
            Stage::LegacySchemaMapping => self.legacy_schema_mapping(task).await,
            Stage::Finalize => self.finalize(task).await,
            Stage::Webhook => self.deliver_webhook(task).await,
            Stage::Cleanup => self.cleanup(task).await,
        }
    }
}

fn parse_payload<T: serde::de::DeserializeOwned>(
    value: &serde_json::Value,
) -> Result<T, CompletionError> {
    serde_json::from_value(value.clone())
        .map_err(|e| CompletionError::MalformedResponse(e.to_string()))
}
