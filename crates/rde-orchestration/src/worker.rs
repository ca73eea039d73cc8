//! Worker (C11, §4.9): drains queued scheduler tasks, executes the Transfer
//! command (or an ad-hoc `source-check`/`source-inspect`), and retries
//! transient failures with a bounded delay.

use std::sync::Arc;
use std::time::Duration;

use tracing::{error, info, warn};

use crate::config::Settings;
use crate::scheduler::{QueuedTask, SchedulerClient, TaskStatus};
use crate::transfer::{TransferCommand, TransferOutcome};

/// Bounded retry ceiling for a single queued task (§4.9).
pub const TASK_MAX_RETRIES: u32 = 3;
/// Delay between retry attempts, in seconds (§4.9).
pub const TASK_RETRY_DELAY_SECS: u64 = 300;

/// Drains one scheduler's queue, executing each task with the retry policy
/// above. Holds no state of its own beyond the scheduler handle and the
/// settings used to construct each `TransferCommand`.
pub struct Worker {
    scheduler: Arc<dyn SchedulerClient>,
    settings: Settings,
}

impl Worker {
    pub fn new(scheduler: Arc<dyn SchedulerClient>, settings: Settings) -> Self {
        Self { scheduler, settings }
    }

    /// Runs until the scheduler's queue is empty. A long-lived worker process
    /// wraps this in a polling loop with its own idle backoff; this method
    /// itself does one drain pass, keeping a small, directly testable unit
    /// underneath any `loop { }` wrapper.
    pub async fn drain_once(&self) {
        while let Some(task) = self.scheduler.poll_next().await {
            self.execute_with_retries(task).await;
        }
    }

    /// Executes one attempt of a task. A retriable failure under the retry
    /// ceiling is requeued (via the scheduler's `requeue`, so it is
    /// `poll_next()`'d again by a later drain pass) rather than retried
    /// in-place — this method runs a task's current attempt exactly once,
    /// so a task is never executed twice for a single `poll_next()` result.
    /// Non-retriable failures and successes both end the task.
    async fn execute_with_retries(&self, task: QueuedTask) {
        let attempt = task.args.retry_count;
        let mut args = task.args.clone();
        args.retry_count = attempt;
        args.retry_limit = self.settings.task_max_retries;
        let command = TransferCommand::new(args, self.settings.clone());

        info!(task_id = %task.task_id, key = %task.key, attempt, "executing queued task");
        let outcome = command.execute().await;
        self.report(&task, &outcome).await;

        if outcome.status == rde_core::RunStatus::Success || !outcome.retriable {
            return;
        }
        if attempt + 1 >= self.settings.task_max_retries {
            warn!(task_id = %task.task_id, attempt, "exhausted retries, leaving task failed");
            return;
        }
        let delay_secs = self.settings.task_retry_delay_secs;
        warn!(task_id = %task.task_id, attempt, delay_secs, "retriable failure, scheduling retry");
        metrics::counter!("rde_task_retries_total", "key" => task.key.clone()).increment(1);
        tokio::time::sleep(Duration::from_secs(delay_secs)).await;
        args.retry_count = attempt + 1;
        self.scheduler.requeue(&task.task_id, args).await;
    }

    async fn report(&self, task: &QueuedTask, outcome: &TransferOutcome) {
        let status = match outcome.status {
            rde_core::RunStatus::Success => TaskStatus::Success,
            rde_core::RunStatus::Failure => TaskStatus::Failure,
            rde_core::RunStatus::Running => TaskStatus::Running,
        };
        let output = serde_json::to_value(outcome).ok();
        let error = outcome.output.cause.clone();
        self.scheduler.complete(&task.task_id, status, output, error).await;
        if status == TaskStatus::Failure {
            error!(task_id = %task.task_id, cause = ?outcome.output.cause, "task ended in failure");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::scheduler::InMemorySchedulerStore;
    use crate::transfer::{Command, TransferArgs};

    fn settings() -> Settings {
        Settings {
            api_endpoint: "http://localhost:1".into(),
            cache_dir: std::env::temp_dir().to_string_lossy().to_string(),
            source_chunk_size: 1024,
            // A ceiling of 1 means "exhausted after the first attempt" so the
            // test never waits out a real retry delay.
            task_max_retries: 1,
            task_retry_delay_secs: 0,
            metrics_port: 0,
        }
    }

    fn args() -> TransferArgs {
        TransferArgs {
            command: Command::SourceCheck,
            transfer_id: "t-1".into(),
            organization_id: None,
            destination_id: None,
            source_id: Some("missing-source".into()),
            replication_mode: None,
            model_ids: Vec::new(),
            api_endpoint: "http://localhost:1".into(),
            execution_id: None,
            retry_count: 0,
            retry_limit: TASK_MAX_RETRIES,
            drop_after_complete: false,
        }
    }

    #[tokio::test]
    async fn retriable_failure_exhausts_ceiling_without_requeue() {
        let scheduler = Arc::new(InMemorySchedulerStore::new());
        scheduler
            .apply("rde:t-1", "0 0 * * *", "rde-transfer", args())
            .await
            .unwrap();
        let handle = scheduler.run("rde:t-1", false).await.unwrap();

        let worker = Worker::new(scheduler.clone(), settings());
        worker.drain_once().await;

        // The control-plane fetch inside the command fails with an
        // unreachable endpoint, which is `Unknown` and therefore retriable;
        // with a retry ceiling of 1 the attempt is exhausted immediately, so
        // nothing gets requeued and the queue stays empty.
        assert!(scheduler.poll_next().await.is_none());
        assert_eq!(scheduler.status(&handle).await.unwrap(), TaskStatus::Failure);
    }
}
