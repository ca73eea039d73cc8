//! Control-plane HTTP client (§6.2 expansion): a thin `reqwest` wrapper over
//! the narrow `/internal` interface the core consumes metadata through and
//! reports run status/progress back to. One struct holding the base
//! endpoint and a shared `reqwest::Client`, one method per table row,
//! `serde` for (de)serialisation.

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::warn;

use rde_core::{ConnectionInfo, CoreError, CoreResult, Mode, RunMeta, RunOutput, RunStatus, VendorType};

/// A Recipient (tenant) record as exposed by the control plane.
#[derive(Debug, Clone, Deserialize)]
pub struct RecipientDto {
    pub id: String,
    pub tenant_id: String,
}

/// A Source record, unmasked (§6.2 "Read source (unmasked)").
#[derive(Debug, Clone, Deserialize)]
pub struct SourceDto {
    pub id: String,
    pub vendor_type: VendorType,
    pub connection_info: ConnectionInfo,
    #[serde(default)]
    pub namespace: Option<String>,
}

/// A Model record: one logical table configured for replication, scoped to
/// a Source and carrying the column names the Transfer command turns into
/// Stream attributes (§4.7 step 5).
#[derive(Debug, Clone, Deserialize)]
pub struct ModelDto {
    pub id: String,
    pub source_id: String,
    pub schema_name: String,
    pub table_name: String,
    #[serde(default)]
    pub primary_key_column: Option<String>,
    #[serde(default)]
    pub last_modified_at_column: Option<String>,
    #[serde(default)]
    pub tenant_id_column: Option<String>,
}

/// A Destination record, unmasked. Carries the owning Transfer's `Schedule`
/// so the command can resolve a Mode without a separate `/schedules`
/// endpoint — the control-plane table in §6.2 has no schedule route of its
/// own.
#[derive(Debug, Clone, Deserialize)]
pub struct DestinationDto {
    pub id: String,
    pub vendor_type: VendorType,
    pub connection_info: ConnectionInfo,
    #[serde(default)]
    pub schedule: Option<rde_core::Schedule>,
    #[serde(default)]
    pub drop_after_complete: bool,
}

/// Body of `POST /runs` (§6.2).
#[derive(Debug, Serialize)]
struct CreateRunRequest<'a> {
    transfer_id: &'a str,
    status: RunStatus,
    meta: &'a RunMeta,
}

/// Response of `POST /runs`: the control plane assigns a `run_id` distinct
/// from the `transfer_id` (a transfer has many runs over its lifetime).
#[derive(Debug, Clone, Deserialize)]
pub struct CreatedRun {
    pub run_id: String,
}

/// Body of `PUT /runs/{run_id}` (§6.2) — every field optional so a partial
/// progress update doesn't need to resend the whole record.
#[derive(Debug, Default, Serialize)]
pub struct RunUpdate {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<RunStatus>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub meta: Option<RunMeta>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub output: Option<RunOutput>,
}

/// The latest TransferRun recorded for a transfer, used for run-gap
/// detection (§4.7): only `created_at` and `status` are needed by the
/// command, but the full row is returned for completeness.
#[derive(Debug, Clone, Deserialize)]
pub struct LatestRun {
    pub run_id: String,
    pub status: RunStatus,
    pub created_at: DateTime<Utc>,
}

/// How many times a control-plane call is retried before its failure is
/// surfaced to the caller. Shared with the worker's own task-retry ceiling
/// so a control-plane hiccup and a source/destination hiccup are absorbed
/// by one policy (§6.2).
const CONTROL_PLANE_MAX_ATTEMPTS: u32 = 3;
const CONTROL_PLANE_RETRY_DELAY: Duration = Duration::from_millis(500);

/// Thin HTTP wrapper over the control plane's `/internal` prefix.
pub struct ControlPlaneClient {
    base_url: String,
    http: reqwest::Client,
}

impl ControlPlaneClient {
    pub fn new(base_url: impl Into<String>) -> Self {
        Self {
            base_url: base_url.into(),
            http: reqwest::Client::builder()
                .timeout(Duration::from_secs(30))
                .build()
                .expect("reqwest client builds with a fixed timeout"),
        }
    }

    fn url(&self, path: &str) -> String {
        format!("{}/internal{}", self.base_url.trim_end_matches('/'), path)
    }

    /// Retries a fallible request up to `CONTROL_PLANE_MAX_ATTEMPTS` times,
    /// matching the worker's own retry cadence (§6.2 "Non-2xx is retried up
    /// to the task's retry ceiling").
    async fn with_retries<T, F, Fut>(&self, label: &str, mut f: F) -> CoreResult<T>
    where
        F: FnMut() -> Fut,
        Fut: std::future::Future<Output = Result<T, reqwest::Error>>,
    {
        let mut attempt = 0;
        loop {
            attempt += 1;
            match f().await {
                Ok(value) => return Ok(value),
                Err(err) if attempt < CONTROL_PLANE_MAX_ATTEMPTS => {
                    warn!(%label, attempt, error = %err, "control-plane call failed, retrying");
                    tokio::time::sleep(CONTROL_PLANE_RETRY_DELAY).await;
                }
                Err(err) => {
                    return Err(CoreError::Unknown(anyhow::anyhow!(
                        "control-plane call {label} failed after {attempt} attempts: {err}"
                    )))
                }
            }
        }
    }

    pub async fn get_recipient(&self, id: &str) -> CoreResult<RecipientDto> {
        let url = self.url(&format!("/recipients/{id}"));
        self.with_retries("get_recipient", || async {
            self.http.get(&url).send().await?.error_for_status()?.json().await
        })
        .await
    }

    pub async fn get_source(&self, id: &str) -> CoreResult<SourceDto> {
        let url = self.url(&format!("/sources/{id}"));
        self.with_retries("get_source", || async {
            self.http.get(&url).send().await?.error_for_status()?.json().await
        })
        .await
    }

    pub async fn get_model(&self, id: &str) -> CoreResult<ModelDto> {
        let url = self.url(&format!("/models/{id}"));
        self.with_retries("get_model", || async {
            self.http.get(&url).send().await?.error_for_status()?.json().await
        })
        .await
    }

    pub async fn get_destination(&self, id: &str) -> CoreResult<DestinationDto> {
        let url = self.url(&format!("/destinations/{id}"));
        self.with_retries("get_destination", || async {
            self.http.get(&url).send().await?.error_for_status()?.json().await
        })
        .await
    }

    /// The latest TransferRun for `transfer_id`, or `None` if this transfer
    /// has never run — used as the "no prior run" case in run-gap detection
    /// (§4.7, §8: "nothing to compare against, not a gap").
    pub async fn get_latest_run(&self, transfer_id: &str) -> CoreResult<Option<LatestRun>> {
        let url = self.url(&format!("/runs/{transfer_id}"));
        self.with_retries("get_latest_run", || async {
            let resp = self.http.get(&url).send().await?;
            if resp.status() == reqwest::StatusCode::NOT_FOUND {
                return Ok(None);
            }
            resp.error_for_status()?.json::<LatestRun>().await.map(Some)
        })
        .await
    }

    pub async fn create_run(&self, transfer_id: &str, meta: &RunMeta) -> CoreResult<CreatedRun> {
        let url = self.url("/runs");
        let body = CreateRunRequest {
            transfer_id,
            status: RunStatus::Running,
            meta,
        };
        self.with_retries("create_run", || async {
            self.http.post(&url).json(&body).send().await?.error_for_status()?.json().await
        })
        .await
    }

    /// Updates a TransferRun. A failing terminal update is logged but does
    /// not change the in-process outcome (§6.2 "a terminal PUT that fails is
    /// logged but does not change the in-process outcome") — callers
    /// finishing a run should not propagate this error upward.
    pub async fn update_run(&self, run_id: &str, update: &RunUpdate) -> CoreResult<()> {
        let url = self.url(&format!("/runs/{run_id}"));
        self.with_retries("update_run", || async {
            self.http.put(&url).json(update).send().await?.error_for_status().map(|_| ())
        })
        .await
    }
}

/// Resolves the replication Mode for a run: an explicit `--replication-mode`
/// argument is always an override (ad hoc dispatch disconnected from the
/// transfer's own schedule, §4.6); otherwise the Mode is derived from the
/// destination's stored Schedule via `rde_core::resolve_mode`.
pub fn resolve_mode_for_run(
    explicit: Option<&Mode>,
    destination: &DestinationDto,
    now: DateTime<Utc>,
) -> CoreResult<(Mode, bool, Vec<rde_core::ModeWarning>)> {
    if let Some(mode) = explicit {
        return Ok((mode.clone(), true, Vec::new()));
    }
    let schedule = destination.schedule.as_ref().ok_or_else(|| {
        CoreError::Unknown(anyhow::anyhow!(
            "destination {} has no schedule and no --replication-mode override was given",
            destination.id
        ))
    })?;
    let (mode, warnings) = rde_core::resolve_mode(schedule, now);
    Ok((mode, false, warnings))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rde_core::{Frequency, ModeType};

    fn dest_with_schedule() -> DestinationDto {
        DestinationDto {
            id: "dest-1".into(),
            vendor_type: VendorType::Console,
            connection_info: ConnectionInfo::Console { limit: None },
            schedule: Some(rde_core::Schedule {
                frequency: Frequency::Daily,
                mode_type: ModeType::Incremental,
                day: None,
                hour: Some(0),
                minute: Some(0),
            }),
            drop_after_complete: false,
        }
    }

    #[test]
    fn explicit_mode_is_always_an_override() {
        let mode = Mode::full_refresh();
        let (resolved, is_override, warnings) =
            resolve_mode_for_run(Some(&mode), &dest_with_schedule(), Utc::now()).unwrap();
        assert!(is_override);
        assert!(warnings.is_empty());
        assert!(resolved.is_full_refresh());
    }

    #[test]
    fn missing_schedule_and_no_override_is_an_error() {
        let mut dest = dest_with_schedule();
        dest.schedule = None;
        assert!(resolve_mode_for_run(None, &dest, Utc::now()).is_err());
    }

    #[test]
    fn no_override_derives_from_destination_schedule() {
        let (resolved, is_override, _) =
            resolve_mode_for_run(None, &dest_with_schedule(), Utc::now()).unwrap();
        assert!(!is_override);
        assert_eq!(resolved.mode_type, ModeType::Incremental);
    }
}
