//! The analysis pipeline: stage definitions, the stage runner, and the
//! finalization helpers (alert resolution, cost commit, webhook delivery).

mod alert;
mod cost;
mod runner;
mod types;
mod webhook;

pub use alert::resolve_alert;
pub use cost::CostAccumulator;
pub use runner::StageRunner;
pub use types::{CarriedState, PipelineTask, Stage};
pub use webhook::WebhookNotifier;
