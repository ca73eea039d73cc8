//! # RDE CLI - Transfer Worker Entry Point
//!
//! The binary the scheduler's task name points at: one invocation runs
//! exactly one of `transfer`, `source-check`, or `source-inspect` to
//! completion, writes the command's JSON result to stdout, and exits with a
//! status code the scheduler's retry policy can read. It does not loop —
//! re-execution on a retriable failure is the scheduler's job, not this
//! process's.
//!
//! ## Usage
//!
//! ```bash
//! rde-cli --command transfer --transfer-id t-1 --organization-id org-1 \
//!     --destination-id dest-1 --model-ids '["model-1","model-2"]' \
//!     --api-endpoint https://control-plane.internal
//!
//! rde-cli --command source-check --source-id src-1 --api-endpoint https://control-plane.internal
//! ```

use std::str::FromStr;

use anyhow::{Context, Result};
use clap::Parser;
use rde_core::{Mode, RunStatus};
use rde_orchestration::{Command, Settings, TransferArgs, TransferCommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Command-line arguments for one worker task execution (§6.4).
#[derive(Parser, Debug)]
#[command(name = "rde-cli")]
#[command(about = "RDE transfer worker: runs one transfer/source-check/source-inspect task")]
struct Args {
    /// Which command to run.
    #[arg(long, default_value = "transfer")]
    command: String,

    #[arg(long)]
    transfer_id: String,

    #[arg(long)]
    organization_id: Option<String>,

    #[arg(long)]
    destination_id: Option<String>,

    #[arg(long)]
    source_id: Option<String>,

    /// JSON-encoded `Mode` override, e.g. `{"mode_type":"full_refresh", ...}`.
    #[arg(long)]
    replication_mode: Option<String>,

    /// JSON-encoded list of model ids, e.g. `["model-1","model-2"]`.
    #[arg(long, default_value = "[]")]
    model_ids: String,

    #[arg(long)]
    api_endpoint: String,

    #[arg(long)]
    execution_id: Option<String>,

    #[arg(long, default_value_t = 0)]
    retry_count: u32,

    #[arg(long, default_value_t = 3)]
    retry_limit: u32,

    #[arg(long, default_value_t = false)]
    drop_after_complete: bool,

    /// Optional path to a YAML settings file layered under the defaults and
    /// environment overrides (§1.1 expansion).
    #[arg(long)]
    config: Option<std::path::PathBuf>,
}

impl Args {
    fn into_transfer_args(self) -> Result<TransferArgs> {
        let command = Command::from_str(&self.command).map_err(anyhow::Error::msg)?;
        let replication_mode = self
            .replication_mode
            .as_deref()
            .map(serde_json::from_str::<Mode>)
            .transpose()
            .context("--replication-mode is not valid JSON for a Mode")?;
        let model_ids: Vec<String> =
            serde_json::from_str(&self.model_ids).context("--model-ids is not a valid JSON string list")?;
        Ok(TransferArgs {
            command,
            transfer_id: self.transfer_id,
            organization_id: self.organization_id,
            destination_id: self.destination_id,
            source_id: self.source_id,
            replication_mode,
            model_ids,
            api_endpoint: self.api_endpoint,
            execution_id: self.execution_id,
            retry_count: self.retry_count,
            retry_limit: self.retry_limit,
            drop_after_complete: self.drop_after_complete,
        })
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::from_default_env())
        .with(tracing_subscriber::fmt::layer())
        .init();

    let args = Args::parse();
    let config_path = args.config.clone();
    let transfer_args = args.into_transfer_args()?;

    let settings = Settings::load(config_path.as_deref())?;
    let _metrics = rde_orchestration::install_metrics(settings.metrics_port);
    let command = TransferCommand::new(transfer_args, settings);

    let outcome = tokio::select! {
        outcome = command.execute() => outcome,
        _ = tokio::signal::ctrl_c() => {
            tracing::warn!("received interrupt signal, exiting without a terminal run update");
            std::process::exit(130);
        }
    };

    let json = serde_json::to_string_pretty(&outcome).context("failed to serialise command outcome")?;
    println!("{json}");

    if outcome.status == RunStatus::Success {
        Ok(())
    } else {
        std::process::exit(1);
    }
}
