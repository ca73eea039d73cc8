//! Metrics (§1.1 expansion): a Prometheus recorder plus a `/metrics` route
//! served for the lifetime of one worker invocation, using the `metrics` +
//! `metrics-exporter-prometheus` + `axum` combination this workspace already
//! declares as dependencies.
//!
//! Call sites record directly through the `metrics` crate's macros
//! (`counter!`, `histogram!`) rather than through wrapper functions here —
//! this module only owns installing the recorder and exposing it.

use std::net::SocketAddr;

use metrics_exporter_prometheus::{PrometheusBuilder, PrometheusHandle};
use tracing::{info, warn};

/// Installs the global Prometheus recorder and spawns an axum server serving
/// `/metrics` on `port`, returning a handle the caller can drop to stop
/// serving (the task is aborted when the handle's `JoinHandle` is dropped
/// along with it, since it holds the only reference to the bound listener).
///
/// `port == 0` disables metrics entirely — the CLI's `--config` settings
/// default to a real port, but a short ad-hoc `source-check` invocation may
/// reasonably skip exporting.
pub fn install(port: u16) -> Option<MetricsServer> {
    if port == 0 {
        return None;
    }
    let recorder = match PrometheusBuilder::new().install_recorder() {
        Ok(handle) => handle,
        Err(e) => {
            warn!(error = %e, "failed to install prometheus recorder, metrics disabled");
            return None;
        }
    };
    let addr: SocketAddr = ([0, 0, 0, 0], port).into();
    let router = build_router(recorder);
    let join = tokio::spawn(async move {
        match tokio::net::TcpListener::bind(addr).await {
            Ok(listener) => {
                info!(%addr, "metrics server listening");
                if let Err(e) = axum::serve(listener, router).await {
                    warn!(error = %e, "metrics server stopped unexpectedly");
                }
            }
            Err(e) => warn!(%addr, error = %e, "failed to bind metrics server"),
        }
    });
    Some(MetricsServer { join })
}

fn build_router(recorder: PrometheusHandle) -> axum::Router<()> {
    use axum::routing::get;
    axum::Router::new()
        .route("/metrics", get(render_metrics))
        .with_state(recorder)
}

async fn render_metrics(
    axum::extract::State(recorder): axum::extract::State<PrometheusHandle>,
) -> (axum::http::StatusCode, String) {
    (axum::http::StatusCode::OK, recorder.render())
}

/// Handle to the background metrics server task; dropping it aborts serving.
pub struct MetricsServer {
    join: tokio::task::JoinHandle<()>,
}

impl Drop for MetricsServer {
    fn drop(&mut self) {
        self.join.abort();
    }
}
