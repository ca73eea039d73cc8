//! # RDE Orchestration - transfer command, control-plane client, scheduler/worker
//!
//! This crate holds the parts of the transfer runtime that sit above the
//! connectors in `rde-io`: the replication-mode resolver's caller (the
//! Transfer command itself), the thin HTTP client that talks to the REST
//! control plane, the cron-backed scheduler client, and the worker that
//! drains queued jobs with bounded retry.

pub mod config;
pub mod control_plane;
pub mod metrics;
pub mod scheduler;
pub mod transfer;
pub mod worker;

pub use config::Settings;
pub use control_plane::{ControlPlaneClient, CreatedRun, DestinationDto, ModelDto, RecipientDto, SourceDto};
pub use metrics::{install as install_metrics, MetricsServer};
pub use scheduler::{InMemorySchedulerStore, ScheduleEntry, SchedulerClient, TaskHandle, TaskStatus};
pub use transfer::{Command, TransferArgs, TransferCommand, TransferOutcome};
pub use worker::{Worker, TASK_MAX_RETRIES, TASK_RETRY_DELAY_SECS};
