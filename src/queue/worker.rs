//! Worker loop: one per queue, one job at a time.

use std::sync::Arc;
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde_json::Value;
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, error, info, instrument, warn};

use super::broker::JobQueue;
use super::types::{Job, QueueError};

/// Claimed job context passed to handlers
pub struct JobContext {
    pub job: Job,
    queue: JobQueue,
}

impl JobContext {
    pub fn new(job: Job, queue: JobQueue) -> Self {
        Self { job, queue }
    }

    /// Report progress visible through job status
    pub async fn progress(&self, value: Value) -> Result<(), QueueError> {
        self.queue.update_progress(&self.job.id, &value).await
    }
}

/// Processes jobs of one queue
#[async_trait]
pub trait JobHandler: Send + Sync + 'static {
    type Payload: DeserializeOwned + Send;

    /// Handle one job. An error schedules a retry (until the attempt cap).
    async fn handle(&self, ctx: &JobContext, payload: Self::Payload) -> Result<Value>;
}

/// Set of running workers sharing one shutdown signal
pub struct WorkerSet {
    shutdown: watch::Sender<bool>,
    queues: Vec<JobQueue>,
    handles: Vec<JoinHandle<()>>,
}

impl Default for WorkerSet {
    fn default() -> Self {
        Self::new()
    }
}

impl WorkerSet {
    pub fn new() -> Self {
        let (shutdown, _) = watch::channel(false);
        Self {
            shutdown,
            queues: Vec::new(),
            handles: Vec::new(),
        }
    }

    /// Spawn a worker loop for `queue`
    pub fn spawn<H: JobHandler>(&mut self, queue: JobQueue, handler: Arc<H>, poll_interval: Duration) {
        let shutdown = self.shutdown.subscribe();
        info!(queue = %queue.name(), "Starting worker");
        self.queues.push(queue.clone());
        self.handles.push(tokio::spawn(run_worker(
            queue,
            handler,
            poll_interval,
            shutdown,
        )));
    }

    /// Stop claiming, wait for in-flight jobs to finish, then close the queues.
    ///
    /// Queues keep accepting jobs while in-flight handlers drain, so follow-up
    /// work they enqueue is persisted for the next start.
    pub async fn shutdown(self) {
        for queue in &self.queues {
            queue.pause();
        }
        let _ = self.shutdown.send(true);

        for handle in self.handles {
            if let Err(e) = handle.await {
                error!(error = %e, "Worker task panicked");
            }
        }
        for queue in &self.queues {
            queue.close();
        }
        info!("All workers shut down");
    }
}

async fn run_worker<H: JobHandler>(
    queue: JobQueue,
    handler: Arc<H>,
    poll_interval: Duration,
    mut shutdown: watch::Receiver<bool>,
) {
    match queue.recover_stalled().await {
        Ok(0) => {}
        Ok(n) => warn!(queue = %queue.name(), recovered = n, "Recovered stalled jobs"),
        Err(e) => error!(queue = %queue.name(), error = %e, "Failed to recover stalled jobs"),
    }

    loop {
        if *shutdown.borrow() || queue.is_paused() {
            break;
        }

        match queue.claim_next().await {
            Ok(Some(job)) => {
                process_job(&queue, handler.as_ref(), job).await;
                continue;
            }
            Ok(None) => {}
            Err(e) => error!(queue = %queue.name(), error = %e, "Failed to claim job"),
        }

        let wait = match queue.next_due_in().await {
            Ok(Some(due)) => due.min(poll_interval),
            _ => poll_interval,
        };

        tokio::select! {
            _ = queue.wait_for_work() => {}
            _ = tokio::time::sleep(wait) => {}
            changed = shutdown.changed() => {
                if changed.is_err() {
                    break;
                }
            }
        }
    }

    debug!(queue = %queue.name(), "Worker stopped");
}

#[instrument(skip(queue, handler, job), fields(queue = %job.queue, job_id = %job.id, key = %job.key, attempt = job.attempts))]
async fn process_job<H: JobHandler>(queue: &JobQueue, handler: &H, job: Job) {
    let payload = match serde_json::from_value::<H::Payload>(job.payload.clone()) {
        Ok(payload) => payload,
        Err(e) => {
            // A payload that cannot be decoded will never succeed
            error!(error = %e, "Invalid job payload");
            if let Err(e) = queue.fail(&job.id, &format!("Invalid payload: {}", e), false).await {
                error!(error = %e, "Failed to record job failure");
            }
            return;
        }
    };

    let ctx = JobContext::new(job, queue.clone());
    match handler.handle(&ctx, payload).await {
        Ok(result) => {
            if let Err(e) = queue.complete(&ctx.job.id, &result).await {
                error!(error = %e, "Failed to mark job completed");
            } else {
                info!("Job completed");
            }
        }
        Err(e) => {
            let reason = format!("{:#}", e);
            match queue.fail(&ctx.job.id, &reason, true).await {
                Ok(Some(delay)) => warn!(
                    delay_ms = delay.as_millis() as u64,
                    error = %reason,
                    "Job failed, retrying"
                ),
                Ok(None) => error!(
                    max_attempts = ctx.job.max_attempts,
                    error = %reason,
                    "Job failed permanently"
                ),
                Err(qe) => error!(error = %qe, "Failed to record job failure"),
            }
        }
    }
}
