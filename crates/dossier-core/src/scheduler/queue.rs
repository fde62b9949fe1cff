//! SQLite-backed durable task queue.

use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;

use rusqlite::{params, Connection, OptionalExtension};
use uuid::Uuid;

use crate::pipeline::{CarriedState, PipelineTask, Stage};

use super::{Lane, RetryPolicy};

const SCHEMA: &str = "
CREATE TABLE IF NOT EXISTS tasks (
    id            TEXT PRIMARY KEY,
    stage         TEXT NOT NULL,
    document_id   TEXT NOT NULL,
    carried_state TEXT NOT NULL,
    lane          INTEGER NOT NULL,
    attempt       INTEGER NOT NULL DEFAULT 0,
    not_before    INTEGER NOT NULL,
    leased_until  INTEGER,
    state         TEXT NOT NULL DEFAULT 'ready',
    last_error    TEXT,
    enqueued_at   INTEGER NOT NULL
);
CREATE INDEX IF NOT EXISTS idx_tasks_ready ON tasks (state, lane, not_before);
";

#[derive(Debug, thiserror::Error)]
pub enum QueueError {
    #[error("queue storage error: {0}")]
    Sqlite(#[from] rusqlite::Error),
    #[error("task payload codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// What `nack` decided to do with the task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum NackOutcome {
    Retried { delay: Duration },
    Dead,
}

/// Durable two-lane queue over a single SQLite connection.
///
/// All operations are short single-statement transactions, so one connection
/// behind a mutex is enough; workers contend for microseconds at a time.
pub struct TaskQueue {
    conn: Mutex<Connection>,
}

impl TaskQueue {
    pub fn open(path: &Path) -> Result<Self, QueueError> {
        let conn = Connection::open(path)?;
        conn.pragma_update(None, "journal_mode", "WAL")?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    /// Private in-memory queue, used by tests.
    pub fn open_in_memory() -> Result<Self, QueueError> {
        let conn = Connection::open_in_memory()?;
        conn.execute_batch(SCHEMA)?;
        Ok(Self {
            conn: Mutex::new(conn),
        })
    }

    fn conn(&self) -> MutexGuard<'_, Connection> {
        self.conn.lock().unwrap_or_else(|e| e.into_inner())
    }

    /// Insert a task, ready once `delay` has elapsed.
    pub fn enqueue(
        &self,
        task: &PipelineTask,
        lane: Lane,
        delay: Duration,
    ) -> Result<(), QueueError> {
        let now = now_millis();
        let carried = serde_json::to_string(&task.carried)?;
        self.conn().execute(
            "INSERT INTO tasks (id, stage, document_id, carried_state, lane, attempt,
                                not_before, state, enqueued_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, 'ready', ?8)",
            params![
                task.id.to_string(),
                task.stage.to_string(),
                task.document_id.to_string(),
                carried,
                lane.as_i64(),
                task.attempt,
                now + delay.as_millis() as i64,
                now,
            ],
        )?;
        tracing::debug!(task = %task.id, stage = %task.stage, document = %task.document_id, ?lane, "Task enqueued");
        Ok(())
    }

    /// Lease the oldest ready task, analysis lane first.
    ///
    /// Reaps expired leases back to ready first, so tasks held by a crashed
    /// worker become deliverable again. Rows whose stage name no longer
    /// parses (version skew, manual edits) are dead-lettered on sight.
    pub fn dequeue(&self, lease: Duration) -> Result<Option<PipelineTask>, QueueError> {
        let conn = self.conn();
        let now = now_millis();
        conn.execute(
            "UPDATE tasks SET state = 'ready', leased_until = NULL
             WHERE state = 'leased' AND leased_until <= ?1",
            params![now],
        )?;

        loop {
            let row = conn
                .query_row(
                    "UPDATE tasks SET state = 'leased', leased_until = ?1
                     WHERE id = (
                         SELECT id FROM tasks
                         WHERE state = 'ready' AND not_before <= ?2
                         ORDER BY lane ASC, not_before ASC, enqueued_at ASC
                         LIMIT 1
                     )
                     RETURNING id, stage, document_id, carried_state, attempt",
                    params![now + lease.as_millis() as i64, now],
                    |row| {
                        Ok((
                            row.get::<_, String>(0)?,
                            row.get::<_, String>(1)?,
                            row.get::<_, String>(2)?,
                            row.get::<_, String>(3)?,
                            row.get::<_, u32>(4)?,
                        ))
                    },
                )
                .optional()?;

            let Some((id, stage_name, document_id, carried, attempt)) = row else {
                return Ok(None);
            };

            let Some(stage) = Stage::parse(&stage_name) else {
                let error = crate::error::PipelineError::UnknownStage(stage_name);
                tracing::error!(task = %id, %error, "Dead-lettering task");
                conn.execute(
                    "UPDATE tasks SET state = 'dead', leased_until = NULL, last_error = ?2
                     WHERE id = ?1",
                    params![id, error.to_string()],
                )?;
                continue;
            };

            let id = Uuid::parse_str(&id).map_err(|_| {
                rusqlite::Error::InvalidColumnType(0, "id".into(), rusqlite::types::Type::Text)
            })?;
            let document_id = Uuid::parse_str(&document_id).map_err(|_| {
                rusqlite::Error::InvalidColumnType(
                    2,
                    "document_id".into(),
                    rusqlite::types::Type::Text,
                )
            })?;
            let carried: CarriedState = serde_json::from_str(&carried)?;

            return Ok(Some(PipelineTask {
                id,
                stage,
                document_id,
                carried,
                attempt,
            }));
        }
    }

    /// Delete an acknowledged task. Called only after hand-offs are enqueued.
    pub fn ack(&self, id: Uuid) -> Result<(), QueueError> {
        self.conn()
            .execute("DELETE FROM tasks WHERE id = ?1", params![id.to_string()])?;
        Ok(())
    }

    /// Return a failed task to the queue with backoff, or dead-letter it once
    /// its retry budget is spent.
    pub fn nack(
        &self,
        task: &PipelineTask,
        error: &str,
        policy: &RetryPolicy,
        max_retries: u32,
    ) -> Result<NackOutcome, QueueError> {
        let failed_attempts = task.attempt + 1;
        if failed_attempts > max_retries {
            self.dead_letter(task.id, error)?;
            return Ok(NackOutcome::Dead);
        }

        let delay = policy.delay(failed_attempts);
        self.conn().execute(
            "UPDATE tasks SET state = 'ready', leased_until = NULL, attempt = ?2,
                              not_before = ?3, last_error = ?4
             WHERE id = ?1",
            params![
                task.id.to_string(),
                failed_attempts,
                now_millis() + delay.as_millis() as i64,
                error,
            ],
        )?;
        tracing::warn!(
            task = %task.id,
            stage = %task.stage,
            attempt = failed_attempts,
            delay_ms = delay.as_millis() as u64,
            error,
            "Task failed, retrying"
        );
        Ok(NackOutcome::Retried { delay })
    }

    /// Park a task permanently. The row is kept for inspection.
    pub fn dead_letter(&self, id: Uuid, error: &str) -> Result<(), QueueError> {
        self.conn().execute(
            "UPDATE tasks SET state = 'dead', leased_until = NULL, last_error = ?2
             WHERE id = ?1",
            params![id.to_string(), error],
        )?;
        tracing::error!(task = %id, error, "Task dead-lettered");
        Ok(())
    }

    /// Tasks waiting or leased (everything that is not dead).
    pub fn live_count(&self) -> Result<u64, QueueError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM tasks WHERE state != 'dead'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    pub fn dead_count(&self) -> Result<u64, QueueError> {
        let count: i64 = self.conn().query_row(
            "SELECT COUNT(*) FROM tasks WHERE state = 'dead'",
            [],
            |row| row.get(0),
        )?;
        Ok(count as u64)
    }

    /// Dead-lettered rows as `(task_id, stage_name, last_error)`.
    pub fn dead_tasks(&self) -> Result<Vec<(Uuid, String, String)>, QueueError> {
        let conn = self.conn();
        let mut stmt = conn.prepare(
            "SELECT id, stage, COALESCE(last_error, '') FROM tasks WHERE state = 'dead'",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok((
                row.get::<_, String>(0)?,
                row.get::<_, String>(1)?,
                row.get::<_, String>(2)?,
            ))
        })?;
        let mut out = Vec::new();
        for row in rows {
            let (id, stage, error) = row?;
            let id = Uuid::parse_str(&id).map_err(|_| {
                rusqlite::Error::InvalidColumnType(0, "id".into(), rusqlite::types::Type::Text)
            })?;
            out.push((id, stage, error));
        }
        Ok(out)
    }
}

fn now_millis() -> i64 {
    chrono::Utc::now().timestamp_millis()
}

#[cfg(test)]
mod tests {
    use super::*;

    const LEASE: Duration = Duration::from_secs(30);

    fn fast_policy() -> RetryPolicy {
        RetryPolicy {
            base: Duration::from_millis(1),
            cap: Duration::from_millis(2),
        }
    }

    #[test]
    fn analysis_lane_dequeues_first() {
        let queue = TaskQueue::open_in_memory().unwrap();
        let doc = Uuid::new_v4();
        let cleanup = PipelineTask::new(Stage::Cleanup, doc);
        let summary = PipelineTask::new(Stage::SmartSummary, doc);
        queue.enqueue(&cleanup, Lane::Default, Duration::ZERO).unwrap();
        queue.enqueue(&summary, Lane::Analysis, Duration::ZERO).unwrap();

        let first = queue.dequeue(LEASE).unwrap().unwrap();
        assert_eq!(first.stage, Stage::SmartSummary);
        let second = queue.dequeue(LEASE).unwrap().unwrap();
        assert_eq!(second.stage, Stage::Cleanup);
        assert!(queue.dequeue(LEASE).unwrap().is_none());
    }

    #[test]
    fn delayed_task_is_invisible_until_due() {
        let queue = TaskQueue::open_in_memory().unwrap();
        let task = PipelineTask::new(Stage::ExtractText, Uuid::new_v4());
        queue
            .enqueue(&task, Lane::Analysis, Duration::from_secs(3600))
            .unwrap();
        assert!(queue.dequeue(LEASE).unwrap().is_none());
    }

    #[test]
    fn leased_task_survives_until_ack() {
        let queue = TaskQueue::open_in_memory().unwrap();
        let task = PipelineTask::new(Stage::ExtractText, Uuid::new_v4());
        queue.enqueue(&task, Lane::Analysis, Duration::ZERO).unwrap();

        let leased = queue.dequeue(LEASE).unwrap().unwrap();
        // Still in the table, but not deliverable while leased.
        assert_eq!(queue.live_count().unwrap(), 1);
        assert!(queue.dequeue(LEASE).unwrap().is_none());

        queue.ack(leased.id).unwrap();
        assert_eq!(queue.live_count().unwrap(), 0);
    }

    #[test]
    fn expired_lease_is_redelivered() {
        let queue = TaskQueue::open_in_memory().unwrap();
        let task = PipelineTask::new(Stage::ExtractText, Uuid::new_v4());
        queue.enqueue(&task, Lane::Analysis, Duration::ZERO).unwrap();

        let first = queue.dequeue(Duration::ZERO).unwrap().unwrap();
        // Lease of zero expires immediately, simulating a crashed worker.
        let second = queue.dequeue(LEASE).unwrap().unwrap();
        assert_eq!(first.id, second.id);
    }

    #[test]
    fn nack_retries_then_dead_letters() {
        let queue = TaskQueue::open_in_memory().unwrap();
        let task = PipelineTask::new(Stage::SmartSummary, Uuid::new_v4());
        queue.enqueue(&task, Lane::Analysis, Duration::ZERO).unwrap();
        let policy = fast_policy();

        let mut deliveries = 0;
        loop {
            let Some(leased) = queue.dequeue(LEASE).unwrap() else {
                std::thread::sleep(Duration::from_millis(3));
                continue;
            };
            deliveries += 1;
            match queue.nack(&leased, "provider down", &policy, 2).unwrap() {
                NackOutcome::Retried { .. } => {}
                NackOutcome::Dead => break,
            }
        }

        // max_retries = 2 allows three deliveries in total.
        assert_eq!(deliveries, 3);
        assert_eq!(queue.dead_count().unwrap(), 1);
        let dead = queue.dead_tasks().unwrap();
        assert_eq!(dead[0].0, task.id);
        assert_eq!(dead[0].2, "provider down");
    }

    #[test]
    fn unknown_stage_row_dead_letters_on_dequeue() {
        let queue = TaskQueue::open_in_memory().unwrap();
        let task = PipelineTask::new(Stage::ExtractText, Uuid::new_v4());
        queue.enqueue(&task, Lane::Analysis, Duration::ZERO).unwrap();
        queue
            .conn()
            .execute("UPDATE tasks SET stage = 'translate'", [])
            .unwrap();

        assert!(queue.dequeue(LEASE).unwrap().is_none());
        assert_eq!(queue.dead_count().unwrap(), 1);
        let dead = queue.dead_tasks().unwrap();
        assert_eq!(dead[0].2, "unknown pipeline stage 'translate'");
    }

    #[test]
    fn carried_state_round_trips() {
        let queue = TaskQueue::open_in_memory().unwrap();
        let mut task = PipelineTask::new(Stage::Finalize, Uuid::new_v4());
        task.carried = task.carried.add_tokens(250);
        queue.enqueue(&task, Lane::Analysis, Duration::ZERO).unwrap();

        let leased = queue.dequeue(LEASE).unwrap().unwrap();
        assert_eq!(leased.carried.tokens_spent, 250);
        assert_eq!(leased.document_id, task.document_id);
    }
}
