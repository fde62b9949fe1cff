//! The artefact record: one row per uploaded document, carrying its
//! lifecycle state and every AI-derived field.
//!
//! Stages never mutate an artefact in place; they build an [`ArtefactPatch`]
//! and hand it to the store. The patch type only exposes the fields the
//! schema allows, so unknown-field writes are rejected by construction.

use chrono::{DateTime, NaiveDate, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Analysis lifecycle. Monotonic: never regresses once `Processed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisStatus {
    Pending,
    Processing,
    Processed,
}

/// Depth of AI analysis requested at upload time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AnalysisMode {
    Standard,
    Detailed,
}

/// Derived alert level, resolved from the findings list at finalization.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertStatus {
    None,
    InsightsAvailable,
    Reminder,
    ActionRequired,
    Alert,
}

/// Findings type tag emitted by the alerts-and-actions stage.
///
/// Unknown strings deserialize to `Unknown` instead of failing the stage;
/// they carry no alert weight.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FindingKind {
    Alert,
    ActionRequired,
    Reminder,
    InsightsAvailable,
    Unknown,
}

impl FindingKind {
    pub fn parse(s: &str) -> Self {
        match s {
            "alert" => FindingKind::Alert,
            "action_required" => FindingKind::ActionRequired,
            "reminder" => FindingKind::Reminder,
            "insights_available" => FindingKind::InsightsAvailable,
            _ => FindingKind::Unknown,
        }
    }
}

// Lenient by hand: serde's `#[serde(other)]` is not available on plain
// string enums, and a novel tag from the model must not fail the stage.
impl<'de> Deserialize<'de> for FindingKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        Ok(FindingKind::parse(&s))
    }
}

/// One alert/action item from the alerts-and-actions stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Finding {
    pub findings_type: FindingKind,
    pub title: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub due_date: Option<NaiveDate>,
}

/// One feature/insight pair from the features-and-insights stage.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FeatureInsight {
    pub feature: String,
    pub insight: String,
}

/// Mapping of the document into the legacy vault schema.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyMapping {
    /// Category path in the legacy taxonomy, root first.
    pub category_path: Vec<String>,
    /// Extracted field values keyed by legacy field name.
    pub fields: Vec<LegacyField>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LegacyField {
    pub name: String,
    pub value: String,
}

/// Persisted record of one uploaded document.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Artefact {
    pub id: Uuid,
    pub customer_id: String,
    pub filename: String,
    /// blake3 hex digest of the uploaded bytes.
    pub content_hash: String,
    pub size_bytes: u64,
    pub uploaded_at: DateTime<Utc>,

    pub analysis_status: AnalysisStatus,
    pub analysis_started_at: Option<DateTime<Utc>>,
    pub analysis_completed_at: Option<DateTime<Utc>>,
    /// Total tokens spent across all runs. Only the cost accumulator's
    /// commit step writes this field.
    pub analysis_cost: u64,

    pub output_language: String,
    pub analysis_mode: AnalysisMode,

    pub raw_text: Option<String>,
    pub category: Option<String>,
    pub sub_category: Option<String>,
    pub summary_short: Option<String>,
    pub summary_long: Option<String>,
    pub expires_at: Option<NaiveDate>,
    pub is_expired: Option<bool>,
    pub analysis_criteria: Option<String>,
    pub features_and_insights: Option<Vec<FeatureInsight>>,
    pub alerts_and_actions: Option<Vec<Finding>>,
    pub alert_status: AlertStatus,
    pub legacy_schema_mapping: Option<LegacyMapping>,

    pub webhook_url: String,
}

impl Artefact {
    /// New pending artefact with all AI-derived fields empty.
    pub fn new(
        customer_id: impl Into<String>,
        filename: impl Into<String>,
        bytes: &[u8],
        output_language: impl Into<String>,
        analysis_mode: AnalysisMode,
        webhook_url: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            customer_id: customer_id.into(),
            filename: filename.into(),
            content_hash: blake3::hash(bytes).to_hex().to_string(),
            size_bytes: bytes.len() as u64,
            uploaded_at: Utc::now(),
            analysis_status: AnalysisStatus::Pending,
            analysis_started_at: None,
            analysis_completed_at: None,
            analysis_cost: 0,
            output_language: output_language.into(),
            analysis_mode,
            raw_text: None,
            category: None,
            sub_category: None,
            summary_short: None,
            summary_long: None,
            expires_at: None,
            is_expired: None,
            analysis_criteria: None,
            features_and_insights: None,
            alerts_and_actions: None,
            alert_status: AlertStatus::None,
            legacy_schema_mapping: None,
            webhook_url: webhook_url.into(),
        }
    }
}

/// Partial update over the patchable subset of [`Artefact`] fields.
///
/// `None` means "leave as is". Optional artefact fields are wrapped twice so
/// a patch can distinguish "untouched" from "set to null" if ever needed;
/// in practice stages only ever overwrite with concrete values.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ArtefactPatch {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_status: Option<AnalysisStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_started_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_completed_at: Option<DateTime<Utc>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_cost: Option<u64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub raw_text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub_category: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_short: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub summary_long: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expires_at: Option<NaiveDate>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub is_expired: Option<bool>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub analysis_criteria: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub features_and_insights: Option<Vec<FeatureInsight>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alerts_and_actions: Option<Vec<Finding>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub alert_status: Option<AlertStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub legacy_schema_mapping: Option<LegacyMapping>,
}

impl ArtefactPatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        serde_json::to_value(self)
            .map(|v| v.as_object().is_some_and(|o| o.is_empty()))
            .unwrap_or(false)
    }

    /// Apply this patch to a record, returning the updated record.
    pub fn apply(self, mut artefact: Artefact) -> Artefact {
        if let Some(v) = self.analysis_status {
            artefact.analysis_status = v;
        }
        if let Some(v) = self.analysis_started_at {
            artefact.analysis_started_at = Some(v);
        }
        if let Some(v) = self.analysis_completed_at {
            artefact.analysis_completed_at = Some(v);
        }
        if let Some(v) = self.analysis_cost {
            artefact.analysis_cost = v;
        }
        if let Some(v) = self.raw_text {
            artefact.raw_text = Some(v);
        }
        if let Some(v) = self.category {
            artefact.category = Some(v);
        }
        if let Some(v) = self.sub_category {
            artefact.sub_category = Some(v);
        }
        if let Some(v) = self.summary_short {
            artefact.summary_short = Some(v);
        }
        if let Some(v) = self.summary_long {
            artefact.summary_long = Some(v);
        }
        if let Some(v) = self.expires_at {
            artefact.expires_at = Some(v);
        }
        if let Some(v) = self.is_expired {
            artefact.is_expired = Some(v);
        }
        if let Some(v) = self.analysis_criteria {
            artefact.analysis_criteria = Some(v);
        }
        if let Some(v) = self.features_and_insights {
            artefact.features_and_insights = Some(v);
        }
        if let Some(v) = self.alerts_and_actions {
            artefact.alerts_and_actions = Some(v);
        }
        if let Some(v) = self.alert_status {
            artefact.alert_status = v;
        }
        if let Some(v) = self.legacy_schema_mapping {
            artefact.legacy_schema_mapping = Some(v);
        }
        artefact
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample() -> Artefact {
        Artefact::new(
            "cust-1",
            "lease.pdf",
            b"%PDF-1.4 fake",
            "English",
            AnalysisMode::Standard,
            "https://example.test/hook",
        )
    }

    #[test]
    fn new_artefact_is_pending_with_zero_cost() {
        let a = sample();
        assert_eq!(a.analysis_status, AnalysisStatus::Pending);
        assert_eq!(a.analysis_cost, 0);
        assert!(a.analysis_started_at.is_none());
        assert_eq!(a.size_bytes, 13);
    }

    #[test]
    fn patch_only_touches_set_fields() {
        let a = sample();
        let started = Utc::now();
        let patch = ArtefactPatch {
            analysis_status: Some(AnalysisStatus::Processing),
            analysis_started_at: Some(started),
            ..Default::default()
        };
        let updated = patch.apply(a.clone());
        assert_eq!(updated.analysis_status, AnalysisStatus::Processing);
        assert_eq!(updated.analysis_started_at, Some(started));
        assert_eq!(updated.filename, a.filename);
        assert!(updated.summary_short.is_none());
    }

    #[test]
    fn unknown_findings_type_deserializes() {
        let finding: Finding = serde_json::from_value(serde_json::json!({
            "findings_type": "surprise",
            "title": "t",
            "description": "d"
        }))
        .unwrap();
        assert_eq!(finding.findings_type, FindingKind::Unknown);
    }

    #[test]
    fn empty_patch_is_empty() {
        assert!(ArtefactPatch::new().is_empty());
        let p = ArtefactPatch {
            raw_text: Some("x".into()),
            ..Default::default()
        };
        assert!(!p.is_empty());
    }
}
