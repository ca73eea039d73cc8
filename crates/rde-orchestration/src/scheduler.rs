//! Scheduler client (C10, §4.9): a cron-keyed registry of scheduled
//! transfers plus an at-least-once dispatch queue for ad-hoc `run()` calls.
//! `SchedulerClient` is a trait so the worker and tests can depend on the
//! operation set without committing to a concrete broker; `InMemorySchedulerStore`
//! is the one backend this crate ships, using the same trait-object-at-the-seam
//! style as `rde_core::{SourceConnector, DestinationConnector}`.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;
use tokio::sync::Mutex;
use tracing::info;
use uuid::Uuid;

use rde_core::{CoreError, CoreResult};

use crate::transfer::TransferArgs;

/// One scheduler entry, uniquely keyed by `<prefix><transfer_uuid>` (§4.9).
#[derive(Debug, Clone)]
pub struct ScheduleEntry {
    pub key: String,
    pub cron: String,
    pub task_name: String,
    pub args: TransferArgs,
    pub enabled: bool,
}

/// Terminal/non-terminal state of a dispatched task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskStatus {
    Queued,
    Running,
    Success,
    Failure,
}

impl TaskStatus {
    pub fn is_terminal(&self) -> bool {
        matches!(self, TaskStatus::Success | TaskStatus::Failure)
    }
}

/// A handle to one `run()` dispatch, opaque to callers beyond its id.
#[derive(Debug, Clone)]
pub struct TaskHandle {
    pub task_id: String,
}

/// A task as the worker's drain loop sees it: the frozen argv to execute.
#[derive(Debug, Clone)]
pub struct QueuedTask {
    pub task_id: String,
    pub key: String,
    pub args: TransferArgs,
}

#[derive(Debug, Clone)]
struct TaskRecord {
    key: String,
    status: TaskStatus,
    output: Option<Value>,
    error: Option<String>,
}

/// Operations a scheduled-job lifecycle exposes to the control plane and the
/// worker (§4.9). Every method is async to match a real broker's RPC shape
/// even though the in-memory backend never actually suspends.
#[async_trait]
pub trait SchedulerClient: Send + Sync {
    async fn exists(&self, key: &str) -> CoreResult<bool>;
    async fn is_enabled(&self, key: &str) -> CoreResult<bool>;
    async fn enable(&self, key: &str) -> CoreResult<()>;
    async fn disable(&self, key: &str) -> CoreResult<()>;
    /// Create if absent, update otherwise. The sync step (merging a prior
    /// entry's args into `args`) happens here, before the entry is stored.
    async fn apply(&self, key: &str, cron: &str, task_name: &str, args: TransferArgs) -> CoreResult<()>;
    async fn delete(&self, key: &str) -> CoreResult<()>;
    async fn run(&self, key: &str, expedited: bool) -> CoreResult<TaskHandle>;
    async fn wait(&self, handle: &TaskHandle, timeout: Duration) -> CoreResult<TaskStatus>;
    async fn status(&self, handle: &TaskHandle) -> CoreResult<TaskStatus>;
    async fn output(&self, handle: &TaskHandle) -> CoreResult<Option<Value>>;
    async fn error(&self, handle: &TaskHandle) -> CoreResult<Option<String>>;

    /// Pops the next queued task for the worker's drain loop, if any. Not
    /// part of the control-plane-facing operation set in §4.9, but every
    /// concrete backend needs an equivalent pull primitive for the worker to
    /// drive, so it lives on the same trait rather than a second one.
    async fn poll_next(&self) -> Option<QueuedTask>;

    /// Records a dispatched task's terminal outcome.
    async fn complete(&self, task_id: &str, status: TaskStatus, output: Option<Value>, error: Option<String>);

    /// Re-queues a task for another attempt at the back of the queue, with
    /// `args` carrying the bumped `retry_count` the caller computed — the
    /// store does not re-derive the attempt number itself, so a task's
    /// retry count advances once per `requeue` call rather than resetting
    /// to the schedule entry's original args.
    async fn requeue(&self, task_id: &str, args: TransferArgs);
}

/// Merges a prior entry's args into a fresh `apply()` call: fields the new
/// call left at their zero value fall back to the prior entry's value, so a
/// partial update (e.g. only flipping `drop_after_complete`) doesn't erase an
/// existing `--replication-mode` or `--model-ids` (§4.9 "sync step").
fn merge_args(prior: Option<&TransferArgs>, mut args: TransferArgs) -> TransferArgs {
    let Some(prior) = prior else { return args };
    if args.organization_id.is_none() {
        args.organization_id = prior.organization_id.clone();
    }
    if args.destination_id.is_none() {
        args.destination_id = prior.destination_id.clone();
    }
    if args.source_id.is_none() {
        args.source_id = prior.source_id.clone();
    }
    if args.replication_mode.is_none() {
        args.replication_mode = prior.replication_mode.clone();
    }
    if args.model_ids.is_empty() {
        args.model_ids = prior.model_ids.clone();
    }
    args
}

struct Store {
    entries: HashMap<String, ScheduleEntry>,
    tasks: HashMap<String, TaskRecord>,
    queue: VecDeque<QueuedTask>,
}

/// The in-memory `SchedulerClient` backend (§9 "Scheduler dispatch is
/// at-least-once": `run()` always enqueues a fresh task even if a previous
/// dispatch for the same key is still `Queued`/`Running` — it is the
/// worker's job, not the scheduler's, to avoid doing duplicate work).
pub struct InMemorySchedulerStore {
    store: Mutex<Store>,
}

impl Default for InMemorySchedulerStore {
    fn default() -> Self {
        Self::new()
    }
}

impl InMemorySchedulerStore {
    pub fn new() -> Self {
        Self {
            store: Mutex::new(Store {
                entries: HashMap::new(),
                tasks: HashMap::new(),
                queue: VecDeque::new(),
            }),
        }
    }

}

#[async_trait]
impl SchedulerClient for InMemorySchedulerStore {
    async fn exists(&self, key: &str) -> CoreResult<bool> {
        Ok(self.store.lock().await.entries.contains_key(key))
    }

    async fn is_enabled(&self, key: &str) -> CoreResult<bool> {
        let store = self.store.lock().await;
        store
            .entries
            .get(key)
            .map(|e| e.enabled)
            .ok_or_else(|| CoreError::Unknown(anyhow::anyhow!("no schedule entry for key {key}")))
    }

    async fn enable(&self, key: &str) -> CoreResult<()> {
        let mut store = self.store.lock().await;
        let entry = store
            .entries
            .get_mut(key)
            .ok_or_else(|| CoreError::Unknown(anyhow::anyhow!("no schedule entry for key {key}")))?;
        entry.enabled = true;
        Ok(())
    }

    async fn disable(&self, key: &str) -> CoreResult<()> {
        let mut store = self.store.lock().await;
        let entry = store
            .entries
            .get_mut(key)
            .ok_or_else(|| CoreError::Unknown(anyhow::anyhow!("no schedule entry for key {key}")))?;
        entry.enabled = false;
        Ok(())
    }

    async fn apply(&self, key: &str, cron: &str, task_name: &str, args: TransferArgs) -> CoreResult<()> {
        let mut store = self.store.lock().await;
        let prior = store.entries.get(key);
        let merged_args = merge_args(prior, args);
        let enabled = prior.map(|e| e.enabled).unwrap_or(true);
        info!(key, cron, task_name, "applying schedule entry");
        store.entries.insert(
            key.to_string(),
            ScheduleEntry {
                key: key.to_string(),
                cron: cron.to_string(),
                task_name: task_name.to_string(),
                args: merged_args,
                enabled,
            },
        );
        Ok(())
    }

    async fn delete(&self, key: &str) -> CoreResult<()> {
        self.store.lock().await.entries.remove(key);
        Ok(())
    }

    async fn run(&self, key: &str, expedited: bool) -> CoreResult<TaskHandle> {
        let mut store = self.store.lock().await;
        let entry = store
            .entries
            .get(key)
            .ok_or_else(|| CoreError::Unknown(anyhow::anyhow!("no schedule entry for key {key}")))?
            .clone();
        let task_id = Uuid::new_v4().to_string();
        info!(key, task_id, expedited, "enqueuing ad-hoc run");
        let task = QueuedTask {
            task_id: task_id.clone(),
            key: key.to_string(),
            args: entry.args,
        };
        if expedited {
            store.queue.push_front(task);
        } else {
            store.queue.push_back(task);
        }
        store.tasks.insert(
            task_id.clone(),
            TaskRecord {
                key: key.to_string(),
                status: TaskStatus::Queued,
                output: None,
                error: None,
            },
        );
        Ok(TaskHandle { task_id })
    }

    async fn wait(&self, handle: &TaskHandle, timeout: Duration) -> CoreResult<TaskStatus> {
        let deadline = tokio::time::Instant::now() + timeout;
        loop {
            let status = self.status(handle).await?;
            if status.is_terminal() {
                return Ok(status);
            }
            if tokio::time::Instant::now() >= deadline {
                return Ok(status);
            }
            tokio::time::sleep(Duration::from_secs(3).min(timeout)).await;
        }
    }

    async fn status(&self, handle: &TaskHandle) -> CoreResult<TaskStatus> {
        let store = self.store.lock().await;
        store
            .tasks
            .get(&handle.task_id)
            .map(|r| r.status)
            .ok_or_else(|| CoreError::Unknown(anyhow::anyhow!("no task with id {}", handle.task_id)))
    }

    async fn output(&self, handle: &TaskHandle) -> CoreResult<Option<Value>> {
        let store = self.store.lock().await;
        Ok(store.tasks.get(&handle.task_id).and_then(|r| r.output.clone()))
    }

    async fn error(&self, handle: &TaskHandle) -> CoreResult<Option<String>> {
        let store = self.store.lock().await;
        Ok(store.tasks.get(&handle.task_id).and_then(|r| r.error.clone()))
    }

    async fn poll_next(&self) -> Option<QueuedTask> {
        let mut store = self.store.lock().await;
        let task = store.queue.pop_front()?;
        if let Some(record) = store.tasks.get_mut(&task.task_id) {
            record.status = TaskStatus::Running;
        }
        Some(task)
    }

    async fn complete(&self, task_id: &str, status: TaskStatus, output: Option<Value>, error: Option<String>) {
        let mut store = self.store.lock().await;
        if let Some(record) = store.tasks.get_mut(task_id) {
            record.status = status;
            record.output = output;
            record.error = error;
        }
    }

    async fn requeue(&self, task_id: &str, args: TransferArgs) {
        let mut store = self.store.lock().await;
        let Some(record) = store.tasks.get(task_id) else { return };
        let key = record.key.clone();
        store.queue.push_back(QueuedTask {
            task_id: task_id.to_string(),
            key,
            args,
        });
        if let Some(record) = store.tasks.get_mut(task_id) {
            record.status = TaskStatus::Queued;
        }
    }
}

/// Shared handle type the worker and control-plane glue both hold.
pub type SharedScheduler = Arc<dyn SchedulerClient>;

#[cfg(test)]
mod tests {
    use super::*;

    fn args(transfer_id: &str) -> TransferArgs {
        TransferArgs {
            command: crate::transfer::Command::Transfer,
            transfer_id: transfer_id.to_string(),
            organization_id: Some("org-1".into()),
            destination_id: Some("dest-1".into()),
            source_id: None,
            replication_mode: None,
            model_ids: vec!["model-1".into()],
            api_endpoint: "http://localhost:8000".into(),
            execution_id: None,
            retry_count: 0,
            retry_limit: 3,
            drop_after_complete: false,
        }
    }

    #[tokio::test]
    async fn apply_then_exists_and_enabled_by_default() {
        let store = InMemorySchedulerStore::new();
        store.apply("rde:t-1", "0 0 * * *", "rde-transfer", args("t-1")).await.unwrap();
        assert!(store.exists("rde:t-1").await.unwrap());
        assert!(store.is_enabled("rde:t-1").await.unwrap());
    }

    #[tokio::test]
    async fn disable_then_enable_round_trips() {
        let store = InMemorySchedulerStore::new();
        store.apply("rde:t-1", "0 0 * * *", "rde-transfer", args("t-1")).await.unwrap();
        store.disable("rde:t-1").await.unwrap();
        assert!(!store.is_enabled("rde:t-1").await.unwrap());
        store.enable("rde:t-1").await.unwrap();
        assert!(store.is_enabled("rde:t-1").await.unwrap());
    }

    #[tokio::test]
    async fn apply_sync_step_preserves_prior_model_ids() {
        let store = InMemorySchedulerStore::new();
        store.apply("rde:t-1", "0 0 * * *", "rde-transfer", args("t-1")).await.unwrap();

        let mut partial = args("t-1");
        partial.model_ids = Vec::new();
        partial.drop_after_complete = true;
        store.apply("rde:t-1", "0 0 * * *", "rde-transfer", partial).await.unwrap();

        let entry = store.store.lock().await.entries.get("rde:t-1").cloned().unwrap();
        assert_eq!(entry.args.model_ids, vec!["model-1".to_string()]);
        assert!(entry.args.drop_after_complete);
    }

    #[tokio::test]
    async fn run_enqueues_and_worker_can_drain() {
        let store = InMemorySchedulerStore::new();
        store.apply("rde:t-1", "0 0 * * *", "rde-transfer", args("t-1")).await.unwrap();
        let handle = store.run("rde:t-1", false).await.unwrap();
        assert_eq!(store.status(&handle).await.unwrap(), TaskStatus::Queued);

        let task = store.poll_next().await.unwrap();
        assert_eq!(task.task_id, handle.task_id);
        assert_eq!(store.status(&handle).await.unwrap(), TaskStatus::Running);

        store.complete(&task.task_id, TaskStatus::Success, None, None).await;
        assert_eq!(store.status(&handle).await.unwrap(), TaskStatus::Success);
    }

    #[tokio::test]
    async fn expedited_run_jumps_the_queue() {
        let store = InMemorySchedulerStore::new();
        store.apply("rde:t-1", "0 0 * * *", "rde-transfer", args("t-1")).await.unwrap();
        let _first = store.run("rde:t-1", false).await.unwrap();
        let second = store.run("rde:t-1", true).await.unwrap();

        let task = store.poll_next().await.unwrap();
        assert_eq!(task.task_id, second.task_id);
    }
}
