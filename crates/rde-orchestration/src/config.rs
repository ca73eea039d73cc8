//! Configuration layer (§1.1 expansion): worker/cache tunables loadable from
//! YAML and layerable with environment overrides via the `config` crate,
//! the same defaults-then-YAML-then-env layering used elsewhere in this
//! workspace, generalised here to support env-var overlays for deployed
//! workers.

use serde::{Deserialize, Serialize};

/// Tunables for the worker's retry policy, cache chunking, and control-plane
/// endpoint. Defaults match the values named in §4.9/§6.4.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Base endpoint for the control-plane HTTP interface (§6.2).
    #[serde(default = "default_api_endpoint")]
    pub api_endpoint: String,
    /// Directory the Arrow IPC cache spills to (§4.2).
    #[serde(default = "default_cache_dir")]
    pub cache_dir: String,
    /// Rows read per chunk from a SQL source's streaming result set (§4.4).
    #[serde(default = "default_chunk_size")]
    pub source_chunk_size: usize,
    #[serde(default = "default_task_max_retries")]
    pub task_max_retries: u32,
    #[serde(default = "default_task_retry_delay_secs")]
    pub task_retry_delay_secs: u64,
    /// Port the Prometheus metrics exporter binds to; `0` disables it.
    #[serde(default = "default_metrics_port")]
    pub metrics_port: u16,
}

fn default_api_endpoint() -> String {
    "http://localhost:8000".to_string()
}

fn default_cache_dir() -> String {
    "/tmp/rde-cache".to_string()
}

fn default_chunk_size() -> usize {
    1024
}

fn default_task_max_retries() -> u32 {
    crate::worker::TASK_MAX_RETRIES
}

fn default_task_retry_delay_secs() -> u64 {
    crate::worker::TASK_RETRY_DELAY_SECS
}

fn default_metrics_port() -> u16 {
    9090
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            api_endpoint: default_api_endpoint(),
            cache_dir: default_cache_dir(),
            source_chunk_size: default_chunk_size(),
            task_max_retries: default_task_max_retries(),
            task_retry_delay_secs: default_task_retry_delay_secs(),
            metrics_port: default_metrics_port(),
        }
    }
}

impl Settings {
    /// Loads defaults, then an optional YAML file, then environment
    /// variables prefixed `RDE_` (e.g. `RDE_API_ENDPOINT`), each layer
    /// overriding the last — the same layering idiom the `config` crate's
    /// own docs describe and the one `rde-cli`'s `PipelineSpec` loader
    /// approximates with a single YAML read.
    pub fn load(yaml_path: Option<&std::path::Path>) -> anyhow::Result<Self> {
        let mut builder = config::Config::builder()
            .add_source(config::Config::try_from(&Settings::default())?);
        if let Some(path) = yaml_path {
            builder = builder.add_source(config::File::from(path));
        }
        builder = builder.add_source(config::Environment::with_prefix("RDE").separator("_"));
        let settings = builder.build()?;
        Ok(settings.try_deserialize()?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_match_spec_constants() {
        let settings = Settings::default();
        assert_eq!(settings.task_max_retries, 3);
        assert_eq!(settings.task_retry_delay_secs, 300);
        assert_eq!(settings.source_chunk_size, 1024);
    }
}
