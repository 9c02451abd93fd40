//! SQLite-backed named job queue.
//!
//! Jobs of all queues live in one `jobs` table, partitioned by the `queue`
//! column. Times are unix milliseconds. A job moves through
//! `waiting|delayed → active → completed|failed`; a failed attempt with
//! retries left goes back to `delayed` with an exponential backoff.

use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use rusqlite::{params, Connection, OptionalExtension, Row};
use serde::Serialize;
use serde_json::Value;
use tokio::sync::{Mutex, Notify};
use tracing::debug;

use super::retry::RetryPolicy;
use super::types::{
    Job, JobOptions, JobRef, JobState, JobStatus, QueueError, QueueName, Retention,
};

/// Create the jobs table
pub fn migrate(conn: &Connection) -> Result<(), QueueError> {
    conn.execute_batch(
        "CREATE TABLE IF NOT EXISTS jobs (
            id TEXT PRIMARY KEY,
            queue TEXT NOT NULL,
            key TEXT NOT NULL,
            payload TEXT NOT NULL,
            state TEXT NOT NULL,
            attempts INTEGER NOT NULL DEFAULT 0,
            max_attempts INTEGER NOT NULL,
            backoff_ms INTEGER NOT NULL,
            backoff_max_ms INTEGER NOT NULL,
            backoff_multiplier REAL NOT NULL,
            run_at INTEGER NOT NULL,
            progress TEXT,
            result TEXT,
            failed_reason TEXT,
            created_at INTEGER NOT NULL,
            processed_on INTEGER,
            finished_on INTEGER
        );

        CREATE INDEX IF NOT EXISTS idx_jobs_due ON jobs(queue, state, run_at);",
    )?;
    Ok(())
}

fn now_ms() -> i64 {
    Utc::now().timestamp_millis()
}

const STATUS_COLUMNS: &str =
    "id, key, payload, progress, state, attempts, failed_reason, processed_on, finished_on";

fn status_from_row(row: &Row<'_>) -> rusqlite::Result<(JobStatus, String)> {
    let payload: String = row.get(2)?;
    let progress: Option<String> = row.get(3)?;
    let state: String = row.get(4)?;
    Ok((
        JobStatus {
            id: row.get(0)?,
            name: row.get(1)?,
            data: serde_json::from_str(&payload).unwrap_or(Value::String(payload)),
            progress: progress.and_then(|p| serde_json::from_str(&p).ok()),
            // Placeholder until the raw state is validated below
            state: JobState::Waiting,
            attempts_made: row.get(5)?,
            failed_reason: row.get(6)?,
            processed_on: row.get(7)?,
            finished_on: row.get(8)?,
        },
        state,
    ))
}

fn resolve_state((mut status, raw): (JobStatus, String)) -> Result<JobStatus, QueueError> {
    status.state = JobState::parse(&raw)?;
    Ok(status)
}

/// Handle to one named queue. Clones share the connection and the
/// pause/close flags.
#[derive(Clone)]
pub struct JobQueue {
    name: QueueName,
    conn: Arc<Mutex<Connection>>,
    defaults: JobOptions,
    retention: Retention,
    wake: Arc<Notify>,
    paused: Arc<AtomicBool>,
    closed: Arc<AtomicBool>,
}

impl JobQueue {
    /// Open a queue on a shared connection, creating the jobs table if needed
    pub async fn open(
        name: QueueName,
        conn: Arc<Mutex<Connection>>,
        defaults: JobOptions,
        retention: Retention,
    ) -> Result<Self, QueueError> {
        migrate(&*conn.lock().await)?;
        Ok(Self {
            name,
            conn,
            defaults,
            retention,
            wake: Arc::new(Notify::new()),
            paused: Arc::new(AtomicBool::new(false)),
            closed: Arc::new(AtomicBool::new(false)),
        })
    }

    pub fn name(&self) -> QueueName {
        self.name
    }

    pub fn defaults(&self) -> JobOptions {
        self.defaults
    }

    /// Add a job. Jobs with the same key are not collapsed.
    pub async fn enqueue<T: Serialize>(
        &self,
        key: &str,
        payload: &T,
        options: Option<JobOptions>,
    ) -> Result<JobRef, QueueError> {
        if self.is_closed() {
            return Err(QueueError::Closed(self.name));
        }

        let options = options.unwrap_or(self.defaults);
        let id = uuid::Uuid::new_v4().to_string();
        let now = now_ms();
        let state = if options.delay_ms > 0 {
            JobState::Delayed
        } else {
            JobState::Waiting
        };

        {
            let conn = self.conn.lock().await;
            conn.execute(
                "INSERT INTO jobs (id, queue, key, payload, state, max_attempts, backoff_ms,
                                   backoff_max_ms, backoff_multiplier, run_at, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11)",
                params![
                    id,
                    self.name.as_str(),
                    key,
                    serde_json::to_string(payload)?,
                    state.as_str(),
                    options.retry.max_attempts,
                    options.retry.initial_delay_ms as i64,
                    options.retry.max_delay_ms as i64,
                    options.retry.backoff_multiplier,
                    now + options.delay_ms as i64,
                    now
                ],
            )?;
        }

        debug!(queue = %self.name, job_id = %id, key, delay_ms = options.delay_ms, "Job enqueued");
        self.wake.notify_one();

        Ok(JobRef {
            id,
            queue: self.name,
            key: key.to_string(),
        })
    }

    /// Atomically claim the oldest due job, marking it active
    pub async fn claim_next(&self) -> Result<Option<Job>, QueueError> {
        if self.is_paused() {
            return Ok(None);
        }

        let now = now_ms();
        let mut conn = self.conn.lock().await;
        let tx = conn.transaction()?;

        let row = tx
            .query_row(
                "SELECT id, key, payload, attempts, max_attempts FROM jobs
                 WHERE queue = ?1 AND state IN ('waiting', 'delayed') AND run_at <= ?2
                 ORDER BY run_at, rowid LIMIT 1",
                params![self.name.as_str(), now],
                |row| {
                    Ok((
                        row.get::<_, String>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u32>(3)?,
                        row.get::<_, u32>(4)?,
                    ))
                },
            )
            .optional()?;

        let Some((id, key, payload, attempts, max_attempts)) = row else {
            return Ok(None);
        };

        tx.execute(
            "UPDATE jobs SET state = 'active', attempts = attempts + 1, processed_on = ?1
             WHERE id = ?2",
            params![now, id],
        )?;
        tx.commit()?;

        let payload = serde_json::from_str(&payload).unwrap_or(Value::String(payload));
        Ok(Some(Job {
            id,
            queue: self.name,
            key,
            payload,
            attempts: attempts + 1,
            max_attempts,
        }))
    }

    /// Mark a job completed and prune old completed jobs
    pub async fn complete(&self, id: &str, result: &Value) -> Result<(), QueueError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE jobs SET state = 'completed', result = ?1, finished_on = ?2, failed_reason = NULL
             WHERE id = ?3 AND queue = ?4",
            params![serde_json::to_string(result)?, now_ms(), id, self.name.as_str()],
        )?;
        if changed == 0 {
            return Err(QueueError::NotFound(id.to_string()));
        }
        prune(&conn, self.name, JobState::Completed, self.retention.keep_completed)?;
        Ok(())
    }

    /// Record a failed attempt.
    ///
    /// Returns the backoff delay when another attempt is scheduled, `None`
    /// when the job is now permanently failed.
    pub async fn fail(
        &self,
        id: &str,
        reason: &str,
        retryable: bool,
    ) -> Result<Option<Duration>, QueueError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                "SELECT attempts, max_attempts, backoff_ms, backoff_max_ms, backoff_multiplier
                 FROM jobs WHERE id = ?1 AND queue = ?2",
                params![id, self.name.as_str()],
                |row| {
                    Ok((
                        row.get::<_, u32>(0)?,
                        RetryPolicy {
                            max_attempts: row.get(1)?,
                            initial_delay_ms: row.get::<_, i64>(2)?.max(0) as u64,
                            max_delay_ms: row.get::<_, i64>(3)?.max(0) as u64,
                            backoff_multiplier: row.get(4)?,
                        },
                    ))
                },
            )
            .optional()?;
        let Some((attempts, policy)) = row else {
            return Err(QueueError::NotFound(id.to_string()));
        };

        let now = now_ms();
        if retryable && policy.should_retry(attempts) {
            let delay = policy.delay_for_attempt(attempts);
            conn.execute(
                "UPDATE jobs SET state = 'delayed', run_at = ?1, failed_reason = ?2 WHERE id = ?3",
                params![now + delay.as_millis() as i64, reason, id],
            )?;
            return Ok(Some(delay));
        }

        conn.execute(
            "UPDATE jobs SET state = 'failed', failed_reason = ?1, finished_on = ?2 WHERE id = ?3",
            params![reason, now, id],
        )?;
        prune(&conn, self.name, JobState::Failed, self.retention.keep_failed)?;
        Ok(None)
    }

    /// Store arbitrary progress for an active job
    pub async fn update_progress(&self, id: &str, progress: &Value) -> Result<(), QueueError> {
        let conn = self.conn.lock().await;
        let changed = conn.execute(
            "UPDATE jobs SET progress = ?1 WHERE id = ?2 AND queue = ?3",
            params![serde_json::to_string(progress)?, id, self.name.as_str()],
        )?;
        if changed == 0 {
            return Err(QueueError::NotFound(id.to_string()));
        }
        Ok(())
    }

    /// Status of a job in this queue
    pub async fn get_status(&self, id: &str) -> Result<Option<JobStatus>, QueueError> {
        let conn = self.conn.lock().await;
        let row = conn
            .query_row(
                &format!("SELECT {STATUS_COLUMNS} FROM jobs WHERE id = ?1 AND queue = ?2"),
                params![id, self.name.as_str()],
                status_from_row,
            )
            .optional()?;
        row.map(resolve_state).transpose()
    }

    /// Jobs in this queue, newest first, optionally filtered by state
    pub async fn list(
        &self,
        state: Option<JobState>,
        limit: usize,
    ) -> Result<Vec<JobStatus>, QueueError> {
        let conn = self.conn.lock().await;
        let mut stmt = conn.prepare(&format!(
            "SELECT {STATUS_COLUMNS} FROM jobs
             WHERE queue = ?1 AND (?2 IS NULL OR state = ?2)
             ORDER BY created_at DESC, rowid DESC LIMIT ?3"
        ))?;
        let rows = stmt
            .query_map(
                params![self.name.as_str(), state.map(|s| s.as_str()), limit as i64],
                status_from_row,
            )?
            .collect::<Result<Vec<_>, _>>()?;
        rows.into_iter().map(resolve_state).collect()
    }

    /// Remove jobs in `state` that finished (or were created) more than `grace` ago
    pub async fn clean(&self, grace: Duration, state: JobState) -> Result<usize, QueueError> {
        let cutoff = now_ms() - grace.as_millis() as i64;
        let conn = self.conn.lock().await;
        let removed = conn.execute(
            "DELETE FROM jobs
             WHERE queue = ?1 AND state = ?2 AND COALESCE(finished_on, created_at) <= ?3",
            params![self.name.as_str(), state.as_str(), cutoff],
        )?;
        Ok(removed)
    }

    /// Return jobs left active by a previous process to the waiting state
    pub async fn recover_stalled(&self) -> Result<usize, QueueError> {
        let conn = self.conn.lock().await;
        let recovered = conn.execute(
            "UPDATE jobs SET state = 'waiting', run_at = ?1 WHERE queue = ?2 AND state = 'active'",
            params![now_ms(), self.name.as_str()],
        )?;
        if recovered > 0 {
            self.wake.notify_one();
        }
        Ok(recovered)
    }

    /// Time until the next waiting or delayed job becomes due
    pub async fn next_due_in(&self) -> Result<Option<Duration>, QueueError> {
        let conn = self.conn.lock().await;
        let next: Option<i64> = conn.query_row(
            "SELECT MIN(run_at) FROM jobs WHERE queue = ?1 AND state IN ('waiting', 'delayed')",
            [self.name.as_str()],
            |row| row.get(0),
        )?;
        Ok(next.map(|run_at| Duration::from_millis((run_at - now_ms()).max(0) as u64)))
    }

    /// Resolves when a job is enqueued or the queue is closed
    pub async fn wait_for_work(&self) {
        self.wake.notified().await;
    }

    /// Stop handing out jobs; enqueue keeps working. Wakes idle workers.
    pub fn pause(&self) {
        self.paused.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    /// True once the queue hands out no more jobs (paused or closed)
    pub fn is_paused(&self) -> bool {
        self.paused.load(Ordering::SeqCst) || self.is_closed()
    }

    /// Stop accepting and handing out jobs; wakes idle workers
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
        self.wake.notify_waiters();
    }

    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }
}

/// Keep only the newest `keep` jobs in a finished state
fn prune(conn: &Connection, queue: QueueName, state: JobState, keep: usize) -> Result<usize, QueueError> {
    let removed = conn.execute(
        "DELETE FROM jobs WHERE queue = ?1 AND state = ?2 AND id NOT IN (
            SELECT id FROM jobs WHERE queue = ?1 AND state = ?2
            ORDER BY finished_on DESC, rowid DESC LIMIT ?3
        )",
        params![queue.as_str(), state.as_str(), keep as i64],
    )?;
    Ok(removed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn no_backoff() -> JobOptions {
        JobOptions {
            delay_ms: 0,
            retry: RetryPolicy {
                initial_delay_ms: 0,
                ..Default::default()
            },
        }
    }

    async fn queue(name: QueueName, retention: Retention) -> JobQueue {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        JobQueue::open(name, conn, no_backoff(), retention).await.unwrap()
    }

    #[tokio::test]
    async fn test_enqueue_claim_complete() {
        let q = queue(QueueName::Capture, Retention::default()).await;
        let job_ref = q.enqueue("capture-stop-r1", &json!({ "roomId": "r1" }), None).await.unwrap();

        let job = q.claim_next().await.unwrap().unwrap();
        assert_eq!(job.id, job_ref.id);
        assert_eq!(job.attempts, 1);
        assert_eq!(job.payload["roomId"], "r1");
        assert!(q.claim_next().await.unwrap().is_none());

        let active = q.get_status(&job.id).await.unwrap().unwrap();
        assert_eq!(active.state, JobState::Active);
        assert!(active.processed_on.is_some());

        q.complete(&job.id, &json!({ "stopped": 2 })).await.unwrap();
        let done = q.get_status(&job.id).await.unwrap().unwrap();
        assert_eq!(done.state, JobState::Completed);
        assert_eq!(done.name, "capture-stop-r1");
        assert!(done.finished_on.is_some());
    }

    #[tokio::test]
    async fn test_same_key_is_not_collapsed() {
        let q = queue(QueueName::Transcription, Retention::default()).await;
        let a = q.enqueue("transcription-c1", &json!({}), None).await.unwrap();
        let b = q.enqueue("transcription-c1", &json!({}), None).await.unwrap();
        assert_ne!(a.id, b.id);
        assert_eq!(q.list(Some(JobState::Waiting), 10).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_delayed_job_not_claimed_early() {
        let q = queue(QueueName::Transcription, Retention::default()).await;
        let job_ref = q
            .enqueue("transcription-c1", &json!({}), Some(no_backoff().with_delay(60_000)))
            .await
            .unwrap();

        assert_eq!(
            q.get_status(&job_ref.id).await.unwrap().unwrap().state,
            JobState::Delayed
        );
        assert!(q.claim_next().await.unwrap().is_none());
        assert!(q.next_due_in().await.unwrap().unwrap() > Duration::from_secs(50));
    }

    #[tokio::test]
    async fn test_retry_until_attempt_cap() {
        let q = queue(QueueName::Capture, Retention::default()).await;
        let job_ref = q.enqueue("capture-start-c1-p1", &json!({}), None).await.unwrap();

        for attempt in 1..=2 {
            let job = q.claim_next().await.unwrap().unwrap();
            assert_eq!(job.attempts, attempt);
            let retry = q.fail(&job.id, "media server unavailable", true).await.unwrap();
            assert!(retry.is_some());
            assert_eq!(
                q.get_status(&job.id).await.unwrap().unwrap().state,
                JobState::Delayed
            );
        }

        let job = q.claim_next().await.unwrap().unwrap();
        assert_eq!(job.attempts, 3);
        assert!(q.fail(&job.id, "media server unavailable", true).await.unwrap().is_none());

        let status = q.get_status(&job_ref.id).await.unwrap().unwrap();
        assert_eq!(status.state, JobState::Failed);
        assert_eq!(status.attempts_made, 3);
        assert_eq!(status.failed_reason.as_deref(), Some("media server unavailable"));
        assert!(q.claim_next().await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_non_retryable_fails_immediately() {
        let q = queue(QueueName::Notification, Retention::default()).await;
        q.enqueue("notification-x", &json!("garbage"), None).await.unwrap();
        let job = q.claim_next().await.unwrap().unwrap();

        assert!(q.fail(&job.id, "invalid payload", false).await.unwrap().is_none());
        assert_eq!(q.get_status(&job.id).await.unwrap().unwrap().state, JobState::Failed);
    }

    #[tokio::test]
    async fn test_retention_prunes_oldest_completed() {
        let q = queue(
            QueueName::Notification,
            Retention {
                keep_completed: 2,
                keep_failed: 2,
            },
        )
        .await;

        let mut ids = Vec::new();
        for i in 0..3 {
            let job_ref = q.enqueue(&format!("n-{i}"), &json!({}), None).await.unwrap();
            let job = q.claim_next().await.unwrap().unwrap();
            q.complete(&job.id, &Value::Null).await.unwrap();
            ids.push(job_ref.id);
        }

        assert!(q.get_status(&ids[0]).await.unwrap().is_none());
        assert!(q.get_status(&ids[1]).await.unwrap().is_some());
        assert!(q.get_status(&ids[2]).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_status_is_scoped_to_queue() {
        let conn = Arc::new(Mutex::new(Connection::open_in_memory().unwrap()));
        let capture = JobQueue::open(QueueName::Capture, conn.clone(), no_backoff(), Retention::default())
            .await
            .unwrap();
        let notification =
            JobQueue::open(QueueName::Notification, conn, no_backoff(), Retention::default())
                .await
                .unwrap();

        let job_ref = notification.enqueue("n", &json!({}), None).await.unwrap();
        assert!(capture.get_status(&job_ref.id).await.unwrap().is_none());
        assert!(capture.claim_next().await.unwrap().is_none());
        assert!(notification.get_status(&job_ref.id).await.unwrap().is_some());
    }

    #[tokio::test]
    async fn test_progress_clean_and_recover() {
        let q = queue(QueueName::Transcription, Retention::default()).await;
        let first = q.enqueue("t-1", &json!({}), None).await.unwrap();
        let job = q.claim_next().await.unwrap().unwrap();

        q.update_progress(&job.id, &json!({ "stage": "transcribing" })).await.unwrap();
        let status = q.get_status(&first.id).await.unwrap().unwrap();
        assert_eq!(status.progress, Some(json!({ "stage": "transcribing" })));

        // Simulated crash: the active job is handed out again
        assert_eq!(q.recover_stalled().await.unwrap(), 1);
        let again = q.claim_next().await.unwrap().unwrap();
        assert_eq!(again.id, job.id);
        assert_eq!(again.attempts, 2);

        q.complete(&again.id, &Value::Null).await.unwrap();
        assert_eq!(q.clean(Duration::ZERO, JobState::Completed).await.unwrap(), 1);
        assert!(q.get_status(&first.id).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_closed_queue_rejects_work() {
        let q = queue(QueueName::Capture, Retention::default()).await;
        q.enqueue("a", &json!({}), None).await.unwrap();
        q.close();

        assert!(q.is_closed());
        assert!(q.claim_next().await.unwrap().is_none());
        let err = q.enqueue("b", &json!({}), None).await.unwrap_err();
        assert!(matches!(err, QueueError::Closed(QueueName::Capture)));
    }

    #[tokio::test]
    async fn test_paused_queue_accepts_but_holds_work() {
        let q = queue(QueueName::Notification, Retention::default()).await;
        q.pause();

        assert!(q.is_paused());
        assert!(!q.is_closed());
        let job = q.enqueue("a", &json!({}), None).await.unwrap();
        assert!(q.claim_next().await.unwrap().is_none());
        assert_eq!(
            q.get_status(&job.id).await.unwrap().unwrap().state,
            JobState::Waiting
        );
    }
}
