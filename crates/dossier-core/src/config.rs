use std::path::PathBuf;
use std::time::Duration;

use crate::scheduler::WorkerOptions;

/// Application configuration
#[derive(Debug, Clone)]
pub struct Config {
    /// Root data directory (~/.local/share/dossier)
    pub data_dir: PathBuf,
    /// SQLite task queue file
    pub queue_file: PathBuf,
    /// Raw upload bytes, one file per artefact id
    pub blob_dir: PathBuf,
    /// Prompt template overrides; `None` means builtins only
    pub prompts_file: Option<PathBuf>,

    /// API key for the chat provider
    pub api_key: String,
    /// Alternative OpenAI-compatible endpoint
    pub api_base_url: Option<String>,
    /// Default chat model for analysis stages
    pub model: String,
    /// Vision-capable model for image OCR
    pub ocr_model: String,
    pub request_timeout: Duration,
    pub webhook_timeout: Duration,

    /// Base URL of the metadata REST facade; `None` runs on the in-memory
    /// store (local/testing mode)
    pub store_url: Option<String>,

    pub workers: WorkerOptions,
}

impl Config {
    /// Load configuration from the environment or use defaults
    pub fn load_or_default() -> Self {
        let data_dir = dirs::data_local_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join("dossier");

        let prompts_file = data_dir.join("prompts.json");

        Self {
            queue_file: data_dir.join("queue.db"),
            blob_dir: data_dir.join("blobs"),
            prompts_file: prompts_file.exists().then_some(prompts_file),
            api_key: std::env::var("OPENAI_API_KEY").unwrap_or_default(),
            api_base_url: std::env::var("OPENAI_BASE_URL").ok(),
            model: std::env::var("DOSSIER_MODEL").unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            ocr_model: std::env::var("DOSSIER_OCR_MODEL")
                .unwrap_or_else(|_| "gpt-4o-mini".to_string()),
            request_timeout: Duration::from_secs(120),
            webhook_timeout: Duration::from_secs(30),
            store_url: std::env::var("DOSSIER_STORE_URL").ok(),
            workers: WorkerOptions::default(),
            data_dir,
        }
    }

    /// Ensure all required directories exist
    pub fn ensure_dirs(&self) -> std::io::Result<()> {
        std::fs::create_dir_all(&self.data_dir)?;
        std::fs::create_dir_all(&self.blob_dir)?;
        Ok(())
    }
}
