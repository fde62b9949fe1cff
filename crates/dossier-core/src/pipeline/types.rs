//! Pipeline stages and task payloads.

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::scheduler::Lane;

/// One discrete unit of pipeline work.
///
/// The standard chain is fixed and linear; each stage enqueues its successor
/// rather than calling it, so ordering is enforced purely by the hand-off
/// chain. `Analyse` is the entry task created when a document is submitted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Analyse,
    ExtractText,
    SmartSummary,
    AnalysisCriteria,
    FeaturesAndInsights,
    AlertsAndActions,
    LegacySchemaMapping,
    Finalize,
    Webhook,
    Cleanup,
}

impl Stage {
    /// Successor in the hand-off chain, `None` for the terminal stage.
    pub fn next(&self) -> Option<Stage> {
        match self {
            Stage::Analyse => Some(Stage::ExtractText),
            Stage::ExtractText => Some(Stage::SmartSummary),
            Stage::SmartSummary => Some(Stage::AnalysisCriteria),
            Stage::AnalysisCriteria => Some(Stage::FeaturesAndInsights),
            Stage::FeaturesAndInsights => Some(Stage::AlertsAndActions),
            Stage::AlertsAndActions => Some(Stage::LegacySchemaMapping),
            Stage::LegacySchemaMapping => Some(Stage::Finalize),
            Stage::Finalize => Some(Stage::Webhook),
            Stage::Webhook => Some(Stage::Cleanup),
            Stage::Cleanup => None,
        }
    }

    /// Queue lane. Analysis stages preempt the default lane.
    pub fn lane(&self) -> Lane {
        match self {
            Stage::Webhook | Stage::Cleanup => Lane::Default,
            _ => Lane::Analysis,
        }
    }

    pub fn parse(s: &str) -> Option<Stage> {
        match s {
            "analyse" => Some(Stage::Analyse),
            "extract_text" => Some(Stage::ExtractText),
            "smart_summary" => Some(Stage::SmartSummary),
            "analysis_criteria" => Some(Stage::AnalysisCriteria),
            "features_and_insights" => Some(Stage::FeaturesAndInsights),
            "alerts_and_actions" => Some(Stage::AlertsAndActions),
            "legacy_schema_mapping" => Some(Stage::LegacySchemaMapping),
            "finalize" => Some(Stage::Finalize),
            "webhook" => Some(Stage::Webhook),
            "cleanup" => Some(Stage::Cleanup),
            _ => None,
        }
    }
}

impl std::fmt::Display for Stage {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let name = match self {
            Stage::Analyse => "analyse",
            Stage::ExtractText => "extract_text",
            Stage::SmartSummary => "smart_summary",
            Stage::AnalysisCriteria => "analysis_criteria",
            Stage::FeaturesAndInsights => "features_and_insights",
            Stage::AlertsAndActions => "alerts_and_actions",
            Stage::LegacySchemaMapping => "legacy_schema_mapping",
            Stage::Finalize => "finalize",
            Stage::Webhook => "webhook",
            Stage::Cleanup => "cleanup",
        };
        write!(f, "{name}")
    }
}

/// State threaded through the hand-off chain but not yet durably committed.
///
/// Merge rule is *sum*: each AI stage folds its own usage in, and the
/// finalize stage commits the total in one step. A retry of a single stage
/// re-runs from the carried state it was delivered with, so one stage's
/// tokens are never counted twice.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CarriedState {
    pub tokens_spent: u64,
}

impl CarriedState {
    pub fn add_tokens(mut self, tokens: u64) -> Self {
        self.tokens_spent += tokens;
        self
    }
}

/// A queued unit of work: one stage for one document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PipelineTask {
    pub id: Uuid,
    pub stage: Stage,
    pub document_id: Uuid,
    pub carried: CarriedState,
    /// Delivery attempts made before this one (0 on first delivery).
    pub attempt: u32,
}

impl PipelineTask {
    pub fn new(stage: Stage, document_id: Uuid) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage,
            document_id,
            carried: CarriedState::default(),
            attempt: 0,
        }
    }

    /// Hand-off task for the given stage, carrying accumulated state.
    pub fn handoff(&self, stage: Stage, carried: CarriedState) -> Self {
        Self {
            id: Uuid::new_v4(),
            stage,
            document_id: self.document_id,
            carried,
            attempt: 0,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn chain_is_linear_and_terminates() {
        let mut stage = Stage::Analyse;
        let mut seen = vec![stage];
        while let Some(next) = stage.next() {
            stage = next;
            seen.push(stage);
        }
        assert_eq!(stage, Stage::Cleanup);
        assert_eq!(seen.len(), 10);
    }

    #[test]
    fn stage_names_round_trip() {
        let mut stage = Some(Stage::Analyse);
        while let Some(s) = stage {
            assert_eq!(Stage::parse(&s.to_string()), Some(s));
            stage = s.next();
        }
        assert_eq!(Stage::parse("embed"), None);
    }

    #[test]
    fn carried_state_merges_by_sum() {
        let carried = CarriedState::default().add_tokens(120).add_tokens(80);
        assert_eq!(carried.tokens_spent, 200);
    }

    #[test]
    fn webhook_and_cleanup_use_default_lane() {
        assert_eq!(Stage::Webhook.lane(), Lane::Default);
        assert_eq!(Stage::Cleanup.lane(), Lane::Default);
        assert_eq!(Stage::SmartSummary.lane(), Lane::Analysis);
    }
}
