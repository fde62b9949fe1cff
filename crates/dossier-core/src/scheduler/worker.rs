//! Worker pool driving the queue.

use std::sync::Arc;
use std::time::{Duration, Instant};

use async_trait::async_trait;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::error::PipelineError;
use crate::pipeline::PipelineTask;

use super::{RetryLimits, RetryPolicy, TaskQueue};

/// Stage execution boundary the workers drive.
///
/// A successful run returns the hand-off tasks to enqueue; those are written
/// to the queue *before* the finished task is acked, so a crash between the
/// two duplicates work instead of losing it.
#[async_trait]
pub trait StageHandler: Send + Sync {
    async fn run(&self, task: &PipelineTask) -> Result<Vec<PipelineTask>, PipelineError>;
}

#[derive(Debug, Clone)]
pub struct WorkerOptions {
    pub workers: usize,
    pub poll_interval: Duration,
    pub lease: Duration,
    /// Exceeding this only logs a warning.
    pub soft_time_limit: Duration,
    /// Exceeding this cancels the stage; the task takes the normal nack path.
    pub hard_time_limit: Duration,
    pub retry: RetryPolicy,
    pub limits: RetryLimits,
}

impl Default for WorkerOptions {
    fn default() -> Self {
        Self {
            workers: 4,
            poll_interval: Duration::from_millis(250),
            lease: Duration::from_secs(15 * 60),
            soft_time_limit: Duration::from_secs(5 * 60),
            hard_time_limit: Duration::from_secs(10 * 60),
            retry: RetryPolicy::default(),
            limits: RetryLimits::default(),
        }
    }
}

/// Spawn the worker pool. Workers run until `cancel` fires; a task already
/// in flight finishes (or hits its hard limit) before the worker exits.
pub fn spawn_workers(
    queue: Arc<TaskQueue>,
    handler: Arc<dyn StageHandler>,
    options: WorkerOptions,
    cancel: CancellationToken,
) -> Vec<JoinHandle<()>> {
    (0..options.workers)
        .map(|index| {
            let queue = Arc::clone(&queue);
            let handler = Arc::clone(&handler);
            let options = options.clone();
            let cancel = cancel.clone();
            tokio::spawn(async move {
                tracing::debug!(worker = index, "Worker started");
                worker_loop(index, queue, handler, options, cancel).await;
                tracing::debug!(worker = index, "Worker stopped");
            })
        })
        .collect()
}

async fn worker_loop(
    index: usize,
    queue: Arc<TaskQueue>,
    handler: Arc<dyn StageHandler>,
    options: WorkerOptions,
    cancel: CancellationToken,
) {
    loop {
        if cancel.is_cancelled() {
            break;
        }

        let task = match queue.dequeue(options.lease) {
            Ok(Some(task)) => task,
            Ok(None) => {
                tokio::select! {
                    _ = cancel.cancelled() => break,
                    _ = tokio::time::sleep(options.poll_interval) => {}
                }
                continue;
            }
            Err(e) => {
                tracing::error!(worker = index, error = %e, "Dequeue failed");
                tokio::time::sleep(options.poll_interval).await;
                continue;
            }
        };

        run_one(&queue, handler.as_ref(), &options, &task).await;
    }
}

/// Execute one leased task and settle it with the queue.
async fn run_one(
    queue: &TaskQueue,
    handler: &dyn StageHandler,
    options: &WorkerOptions,
    task: &PipelineTask,
) {
    let started = Instant::now();
    let outcome = tokio::time::timeout(options.hard_time_limit, handler.run(task)).await;
    let elapsed = started.elapsed();
    if elapsed > options.soft_time_limit {
        tracing::warn!(
            task = %task.id,
            stage = %task.stage,
            elapsed_ms = elapsed.as_millis() as u64,
            "Stage exceeded soft time limit"
        );
    }

    let result = match outcome {
        Ok(result) => result,
        Err(_) => Err(PipelineError::TimedOut),
    };

    match result {
        Ok(handoffs) => {
            // Enqueue-before-ack. Duplicates are absorbed by idempotent
            // stage handlers; lost hand-offs would stall the document.
            for next in &handoffs {
                if let Err(e) = queue.enqueue(next, next.stage.lane(), Duration::ZERO) {
                    tracing::error!(task = %task.id, error = %e, "Failed to enqueue hand-off");
                    return; // leave the lease to expire and redeliver
                }
            }
            if let Err(e) = queue.ack(task.id) {
                tracing::error!(task = %task.id, error = %e, "Failed to ack task");
            }
        }
        Err(e) if e.is_permanent() => {
            if let Err(qe) = queue.dead_letter(task.id, &e.to_string()) {
                tracing::error!(task = %task.id, error = %qe, "Failed to dead-letter task");
            }
        }
        Err(e) => {
            let max_retries = options.limits.max_retries(task.stage);
            if let Err(qe) = queue.nack(task, &e.to_string(), &options.retry, max_retries) {
                tracing::error!(task = %task.id, error = %qe, "Failed to nack task");
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use std::sync::atomic::{AtomicU32, Ordering};

    use uuid::Uuid;

    use crate::error::ExtractError;
    use crate::pipeline::Stage;
    use crate::scheduler::Lane;

    use super::*;

    struct CountingHandler {
        runs: AtomicU32,
        result: fn() -> Result<Vec<PipelineTask>, PipelineError>,
    }

    #[async_trait]
    impl StageHandler for CountingHandler {
        async fn run(&self, _task: &PipelineTask) -> Result<Vec<PipelineTask>, PipelineError> {
            self.runs.fetch_add(1, Ordering::SeqCst);
            (self.result)()
        }
    }

    fn fast_options(workers: usize) -> WorkerOptions {
        WorkerOptions {
            workers,
            poll_interval: Duration::from_millis(5),
            lease: Duration::from_secs(30),
            soft_time_limit: Duration::from_secs(5),
            hard_time_limit: Duration::from_secs(10),
            retry: RetryPolicy {
                base: Duration::from_millis(1),
                cap: Duration::from_millis(2),
            },
            limits: RetryLimits {
                entry: 2,
                ai: 2,
                delivery: 2,
            },
        }
    }

    async fn drain(queue: &TaskQueue) {
        for _ in 0..400 {
            if queue.live_count().unwrap() == 0 {
                return;
            }
            tokio::time::sleep(Duration::from_millis(5)).await;
        }
        panic!("queue did not drain");
    }

    #[tokio::test]
    async fn transient_failure_exhausts_retries_then_dead_letters() {
        let queue = Arc::new(TaskQueue::open_in_memory().unwrap());
        let handler = Arc::new(CountingHandler {
            runs: AtomicU32::new(0),
            result: || Err(PipelineError::Webhook("503".into())),
        });

        let task = PipelineTask::new(Stage::Webhook, Uuid::new_v4());
        queue.enqueue(&task, Lane::Default, Duration::ZERO).unwrap();

        let cancel = CancellationToken::new();
        let handles = spawn_workers(
            Arc::clone(&queue),
            handler.clone(),
            fast_options(1),
            cancel.clone(),
        );
        drain(&queue).await;
        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        // max_retries = 2: three deliveries, then dead.
        assert_eq!(handler.runs.load(Ordering::SeqCst), 3);
        assert_eq!(queue.dead_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn permanent_failure_dead_letters_without_retry() {
        let queue = Arc::new(TaskQueue::open_in_memory().unwrap());
        let handler = Arc::new(CountingHandler {
            runs: AtomicU32::new(0),
            result: || Err(ExtractError::UnsupportedFormat("xyz".into()).into()),
        });

        let task = PipelineTask::new(Stage::ExtractText, Uuid::new_v4());
        queue.enqueue(&task, Lane::Analysis, Duration::ZERO).unwrap();

        let cancel = CancellationToken::new();
        let handles = spawn_workers(
            Arc::clone(&queue),
            handler.clone(),
            fast_options(1),
            cancel.clone(),
        );
        drain(&queue).await;
        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(handler.runs.load(Ordering::SeqCst), 1);
        assert_eq!(queue.dead_count().unwrap(), 1);
    }

    #[tokio::test]
    async fn success_enqueues_handoffs_before_ack() {
        let queue = Arc::new(TaskQueue::open_in_memory().unwrap());
        let doc = Uuid::new_v4();
        let task = PipelineTask::new(Stage::Webhook, doc);
        queue.enqueue(&task, Lane::Default, Duration::ZERO).unwrap();

        struct HandoffOnce;
        #[async_trait]
        impl StageHandler for HandoffOnce {
            async fn run(&self, task: &PipelineTask) -> Result<Vec<PipelineTask>, PipelineError> {
                match task.stage.next() {
                    Some(next) => Ok(vec![task.handoff(next, task.carried)]),
                    None => Ok(vec![]),
                }
            }
        }

        let cancel = CancellationToken::new();
        let handles = spawn_workers(
            Arc::clone(&queue),
            Arc::new(HandoffOnce),
            fast_options(2),
            cancel.clone(),
        );
        drain(&queue).await;
        cancel.cancel();
        for handle in handles {
            handle.await.unwrap();
        }

        assert_eq!(queue.dead_count().unwrap(), 0);
    }
}
