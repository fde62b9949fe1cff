//! Dossier Core - AI analysis pipeline for uploaded documents
//!
//! This crate contains the full document analysis workflow:
//! - Artefact records and the metadata store boundary
//! - Text extraction (lopdf PDF, DOCX/ODT, RTF, plain text, vision OCR)
//! - AI completion adapter with a prompt template registry
//! - Durable two-lane task queue (SQLite) with retry/backoff/dead-letter
//! - Stage runner driving the analyse → ... → webhook → cleanup chain

pub mod artefact;
pub mod completion;
pub mod config;
pub mod error;
pub mod extract;
pub mod pipeline;
pub mod scheduler;
pub mod store;

use std::sync::Arc;
use std::time::Duration;

use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

pub use artefact::{AlertStatus, AnalysisMode, AnalysisStatus, Artefact};
pub use completion::{ChatCompletion, OpenAiClient, OpenAiCompletion, PromptLibrary};
pub use config::Config;
pub use error::PipelineError;
pub use extract::{TextExtractor, VisionOcr};
pub use pipeline::{PipelineTask, Stage, StageRunner, WebhookNotifier};
pub use scheduler::{spawn_workers, Lane, StageHandler, TaskQueue};
pub use store::{ArtefactStore, BlobDir, HttpStore, MemoryStore};

/// The assembled pipeline: queue, workers, and the adapters behind them.
///
/// Owns the worker pool; dropping it (or calling [`Pipeline::shutdown`])
/// cancels the workers. Tasks already enqueued stay in the durable queue and
/// are picked up on the next start.
pub struct Pipeline {
    queue: Arc<TaskQueue>,
    store: Arc<dyn ArtefactStore>,
    blobs: BlobDir,
    cancel: CancellationToken,
    workers: Vec<JoinHandle<()>>,
}

impl Pipeline {
    /// Build every component from the configuration and start the workers.
    pub async fn start(config: &Config) -> anyhow::Result<Self> {
        config.ensure_dirs()?;

        let store: Arc<dyn ArtefactStore> = match &config.store_url {
            Some(url) => Arc::new(HttpStore::new(url.clone(), config.request_timeout)?),
            None => Arc::new(MemoryStore::new()),
        };
        let blobs = BlobDir::new(&config.blob_dir);

        let client = match &config.api_base_url {
            Some(base) => {
                OpenAiClient::with_base_url(&config.api_key, base, config.request_timeout)?
            }
            None => OpenAiClient::new(&config.api_key, config.request_timeout)?,
        };
        let ocr_client = match &config.api_base_url {
            Some(base) => {
                OpenAiClient::with_base_url(&config.api_key, base, config.request_timeout)?
            }
            None => OpenAiClient::new(&config.api_key, config.request_timeout)?,
        };
        let completion = Arc::new(OpenAiCompletion::new(client));
        let extractor =
            TextExtractor::with_ocr(Arc::new(VisionOcr::new(ocr_client, &config.ocr_model)));

        let prompts = match &config.prompts_file {
            Some(path) => Arc::new(PromptLibrary::load(path.clone()).await),
            None => Arc::new(PromptLibrary::builtin()),
        };

        let runner = StageRunner::new(
            Arc::clone(&store),
            blobs.clone(),
            extractor,
            completion,
            prompts,
            WebhookNotifier::new(config.webhook_timeout)?,
            &config.model,
        );

        let queue = Arc::new(TaskQueue::open(&config.queue_file)?);
        let cancel = CancellationToken::new();
        let workers = spawn_workers(
            Arc::clone(&queue),
            Arc::new(runner),
            config.workers.clone(),
            cancel.clone(),
        );

        tracing::info!(
            workers = config.workers.workers,
            queue = %config.queue_file.display(),
            "Pipeline started"
        );
        Ok(Self {
            queue,
            store,
            blobs,
            cancel,
            workers,
        })
    }

    /// Register an uploaded document and enqueue its analysis.
    pub async fn submit_document(
        &self,
        customer_id: &str,
        filename: &str,
        bytes: &[u8],
        output_language: &str,
        mode: AnalysisMode,
        webhook_url: &str,
    ) -> anyhow::Result<Uuid> {
        let artefact = Artefact::new(
            customer_id,
            filename,
            bytes,
            output_language,
            mode,
            webhook_url,
        );
        let id = artefact.id;

        self.blobs.write(id, bytes).await?;
        self.store.insert(artefact).await?;

        let task = PipelineTask::new(Stage::Analyse, id);
        self.queue.enqueue(&task, Lane::Analysis, Duration::ZERO)?;

        tracing::info!(document = %id, filename, "Document submitted");
        Ok(id)
    }

    pub fn store(&self) -> &Arc<dyn ArtefactStore> {
        &self.store
    }

    pub fn queue(&self) -> &Arc<TaskQueue> {
        &self.queue
    }

    /// Stop the workers and wait for in-flight stages to settle.
    pub async fn shutdown(&mut self) {
        self.cancel.cancel();
        for handle in self.workers.drain(..) {
            if let Err(e) = handle.await {
                tracing::warn!(error = %e, "Worker exited abnormally");
            }
        }
        tracing::info!("Pipeline stopped");
    }
}

impl Drop for Pipeline {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
