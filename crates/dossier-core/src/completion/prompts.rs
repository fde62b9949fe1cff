//! Prompt template registry.
//!
//! Templates are loaded once at startup (builtin defaults, optionally
//! overridden from a JSON file) and are read-only during task execution.
//! `reload()` is the only mutation point and is never called from a stage.
//!
//! Placeholders: `{output_language}` in the system prompt,
//! `{document_text}` and `{analysis_criteria}` in the user prompt. A
//! placeholder left unfilled after substitution is a caller error.

use std::collections::HashMap;
use std::path::PathBuf;

use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use serde_json::json;
use tokio::sync::RwLock;

use crate::error::CompletionError;

use super::{CompletionRequest, ResponseSchema};

pub const SMART_SUMMARY: &str = "smart_summary";
pub const ANALYSIS_CRITERIA: &str = "analysis_criteria";
pub const FEATURES_AND_INSIGHTS: &str = "features_and_insights";
pub const ALERTS_AND_ACTIONS: &str = "alerts_and_actions";
pub const LEGACY_SCHEMA_MAPPING: &str = "legacy_schema_mapping";

const PLACEHOLDERS: &[&str] = &["{document_text}", "{analysis_criteria}", "{output_language}"];

/// One template as stored in the registry (and in the override file).
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PromptTemplate {
    /// Overrides the configured default model when set.
    #[serde(default)]
    pub model: Option<String>,
    pub temperature: f32,
    pub system: String,
    pub user: String,
    #[serde(default)]
    pub schema: Option<ResponseSchema>,
    /// Prefix the user prompt with the current date (expiry reasoning).
    #[serde(default)]
    pub inject_date: bool,
}

/// Values substituted into a template.
#[derive(Debug, Clone, Default)]
pub struct PromptVars<'a> {
    pub document_text: Option<&'a str>,
    pub analysis_criteria: Option<&'a str>,
    pub output_language: &'a str,
    /// Current date, injected when the template asks for it.
    pub today: Option<NaiveDate>,
    /// Detailed analysis mode appends an instruction to the user prompt.
    pub detailed: bool,
}

/// A rendered prompt pair, ready to become a [`CompletionRequest`].
#[derive(Debug, Clone)]
pub struct RenderedPrompt {
    pub system: String,
    pub user: String,
    pub temperature: f32,
    pub model: Option<String>,
    pub schema: Option<ResponseSchema>,
}

impl RenderedPrompt {
    pub fn into_request(self, default_model: &str) -> CompletionRequest {
        CompletionRequest {
            model: self.model.unwrap_or_else(|| default_model.to_string()),
            temperature: self.temperature,
            system: self.system,
            user: self.user,
            schema: self.schema,
        }
    }
}

/// Process-wide registry of prompt templates.
pub struct PromptLibrary {
    templates: RwLock<HashMap<String, PromptTemplate>>,
    /// Override file; `None` means builtin-only.
    path: Option<PathBuf>,
}

impl PromptLibrary {
    /// Registry with the builtin stage templates.
    pub fn builtin() -> Self {
        Self {
            templates: RwLock::new(builtin_templates()),
            path: None,
        }
    }

    /// Builtin templates with overrides merged from a JSON file
    /// (`{name: template}` map). Missing file falls back to builtins.
    pub async fn load(path: PathBuf) -> Self {
        let library = Self {
            templates: RwLock::new(builtin_templates()),
            path: Some(path),
        };
        if let Err(e) = library.reload().await {
            tracing::warn!(error = %e, "Failed to load prompt overrides, using builtins");
        }
        library
    }

    /// Re-read the override file. Explicit call only; never triggered from
    /// inside a running stage.
    pub async fn reload(&self) -> Result<(), CompletionError> {
        let Some(path) = &self.path else {
            return Ok(());
        };
        let raw = tokio::fs::read_to_string(path)
            .await
            .map_err(|e| CompletionError::Template(format!("read {}: {e}", path.display())))?;
        let overrides: HashMap<String, PromptTemplate> = serde_json::from_str(&raw)
            .map_err(|e| CompletionError::Template(format!("parse {}: {e}", path.display())))?;

        let mut templates = self.templates.write().await;
        let count = overrides.len();
        templates.extend(overrides);
        tracing::info!(count, path = %path.display(), "Loaded prompt overrides");
        Ok(())
    }

    /// Render the named template with the given values.
    pub async fn render(
        &self,
        name: &str,
        vars: &PromptVars<'_>,
    ) -> Result<RenderedPrompt, CompletionError> {
        let templates = self.templates.read().await;
        let template = templates
            .get(name)
            .ok_or_else(|| CompletionError::UnknownTemplate(name.to_string()))?;

        let system = template
            .system
            .replace("{output_language}", vars.output_language);

        let mut user = template.user.clone();
        if let Some(text) = vars.document_text {
            user = user.replace("{document_text}", text);
        }
        if let Some(criteria) = vars.analysis_criteria {
            user = user.replace("{analysis_criteria}", criteria);
        }
        user = user.replace("{output_language}", vars.output_language);

        // Any placeholder still present means the caller forgot a value.
        for placeholder in PLACEHOLDERS {
            if user.contains(placeholder) || system.contains(placeholder) {
                return Err(CompletionError::Template(format!(
                    "no value for {placeholder} in template '{name}'"
                )));
            }
        }

        if template.inject_date {
            let today = vars.today.ok_or_else(|| {
                CompletionError::Template(format!(
                    "template '{name}' injects the date but none was given"
                ))
            })?;
            user = format!("Today is {today}. {user}");
        }

        if vars.detailed {
            user.push_str("\n\nProvide a detailed, exhaustive analysis.");
        }

        Ok(RenderedPrompt {
            system,
            user,
            temperature: template.temperature,
            model: template.model.clone(),
            schema: template.schema.clone(),
        })
    }
}

fn builtin_templates() -> HashMap<String, PromptTemplate> {
    let mut templates = HashMap::new();

    templates.insert(
        SMART_SUMMARY.to_string(),
        PromptTemplate {
            model: None,
            temperature: 0.2,
            system: "You are a document analyst for a personal document vault. \
                     Classify the document and summarize it. Respond in {output_language}."
                .to_string(),
            user: "Classify and summarize the following document. Identify its category \
                   and sub-category (e.g. insurance, lease, will, employment), write a \
                   one-sentence summary and a one-paragraph summary, and determine the \
                   expiry date if the document has one.\n\nDocument:\n{document_text}"
                .to_string(),
            schema: Some(ResponseSchema {
                name: "smart_summary".to_string(),
                schema: json!({
                    "type": "object",
                    "properties": {
                        "category": { "type": "string" },
                        "sub_category": { "type": "string" },
                        "summary_short": { "type": "string" },
                        "summary_long": { "type": "string" },
                        "expires_at": {
                            "type": ["string", "null"],
                            "description": "Expiry date as YYYY-MM-DD, or null"
                        }
                    },
                    "required": ["category", "sub_category", "summary_short", "summary_long", "expires_at"],
                    "additionalProperties": false
                }),
            }),
            inject_date: true,
        },
    );

    templates.insert(
        ANALYSIS_CRITERIA.to_string(),
        PromptTemplate {
            model: None,
            temperature: 0.3,
            system: "You are a document analyst. Respond in {output_language}.".to_string(),
            user: "List the criteria by which this document should be analyzed: \
                   obligations, deadlines, penalties, rights, parties involved, and any \
                   risks specific to this document type. Write them as a short numbered \
                   list.\n\nDocument:\n{document_text}"
                .to_string(),
            schema: None,
            inject_date: false,
        },
    );

    templates.insert(
        FEATURES_AND_INSIGHTS.to_string(),
        PromptTemplate {
            model: None,
            temperature: 0.3,
            system: "You are a document analyst. Respond in {output_language}.".to_string(),
            user: "Using the analysis criteria below, extract the key features of the \
                   document and one insight per feature.\n\nCriteria:\n{analysis_criteria}\n\n\
                   Document:\n{document_text}"
                .to_string(),
            schema: Some(ResponseSchema {
                name: "features_and_insights".to_string(),
                schema: json!({
                    "type": "object",
                    "properties": {
                        "items": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "feature": { "type": "string" },
                                    "insight": { "type": "string" }
                                },
                                "required": ["feature", "insight"],
                                "additionalProperties": false
                            }
                        }
                    },
                    "required": ["items"],
                    "additionalProperties": false
                }),
            }),
            inject_date: false,
        },
    );

    templates.insert(
        ALERTS_AND_ACTIONS.to_string(),
        PromptTemplate {
            model: None,
            temperature: 0.2,
            system: "You are a document analyst flagging items that need the owner's \
                     attention. Respond in {output_language}."
                .to_string(),
            user: "Identify alerts and recommended actions for this document: expiring \
                   terms, missing signatures, risky clauses, upcoming deadlines. Tag each \
                   finding as one of: alert, action_required, reminder, \
                   insights_available.\n\nDocument:\n{document_text}"
                .to_string(),
            schema: Some(ResponseSchema {
                name: "alerts_and_actions".to_string(),
                schema: json!({
                    "type": "object",
                    "properties": {
                        "items": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "findings_type": {
                                        "type": "string",
                                        "enum": ["alert", "action_required", "reminder", "insights_available"]
                                    },
                                    "title": { "type": "string" },
                                    "description": { "type": "string" },
                                    "due_date": {
                                        "type": ["string", "null"],
                                        "description": "YYYY-MM-DD or null"
                                    }
                                },
                                "required": ["findings_type", "title", "description", "due_date"],
                                "additionalProperties": false
                            }
                        }
                    },
                    "required": ["items"],
                    "additionalProperties": false
                }),
            }),
            inject_date: true,
        },
    );

    templates.insert(
        LEGACY_SCHEMA_MAPPING.to_string(),
        PromptTemplate {
            model: None,
            temperature: 0.1,
            system: "You map documents into a fixed legacy vault schema. \
                     Respond in {output_language}."
                .to_string(),
            user: "Map this document into the legacy vault schema: choose a category \
                   path (root first) and extract the standard fields (parties, dates, \
                   amounts, identifiers) as name/value pairs.\n\nDocument:\n{document_text}"
                .to_string(),
            schema: Some(ResponseSchema {
                name: "legacy_schema_mapping".to_string(),
                schema: json!({
                    "type": "object",
                    "properties": {
                        "category_path": {
                            "type": "array",
                            "items": { "type": "string" }
                        },
                        "fields": {
                            "type": "array",
                            "items": {
                                "type": "object",
                                "properties": {
                                    "name": { "type": "string" },
                                    "value": { "type": "string" }
                                },
                                "required": ["name", "value"],
                                "additionalProperties": false
                            }
                        }
                    },
                    "required": ["category_path", "fields"],
                    "additionalProperties": false
                }),
            }),
            inject_date: false,
        },
    );

    templates
}
