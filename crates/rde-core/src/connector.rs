//! Source/Destination/IntegrityChecker traits (C5, C6): the interface every
//! vendor connector implements, and the only thing the transfer command
//! holds references to — never a concrete connector type (§9).

use std::sync::Arc;

use async_trait::async_trait;

use crate::cache::Cache;
use crate::error::CoreResult;
use crate::mode::Mode;
use crate::progress::Progress;
use crate::stream::{Dataset, Stream};
use crate::types::CanonicalType;

/// One column as discovered by `inspect_streams()`.
#[derive(Debug, Clone, PartialEq)]
pub struct InspectedField {
    pub name: String,
    pub ty: CanonicalType,
}

/// A table/view visible to the source's principal (§4.4).
#[derive(Debug, Clone, PartialEq)]
pub struct InspectedStream {
    pub schema_name: String,
    pub stream_name: String,
    pub fields: Vec<InspectedField>,
}

/// System schemas excluded from `inspect_streams()` results (§4.4).
pub const SYSTEM_SCHEMAS: &[&str] = &["information_schema", "pg_catalog", "sys", "sqlite_master"];

/// Open, inspect, and stream rows from a configured source (C5).
#[async_trait]
pub trait SourceConnector: Send + Sync {
    /// Open, ping, close. Fails with `SourceConnectionFailed`.
    async fn test_connect(&self) -> CoreResult<()>;

    /// Lists tables/views visible to the principal, excluding system schemas.
    async fn inspect_streams(&self) -> CoreResult<Vec<InspectedStream>>;

    /// Reads every configured stream into `cache`, returning the resulting
    /// Dataset. `progress`, if given, receives per-stream updates as rows are
    /// written (§4.4 steps 1-6).
    async fn read(
        &self,
        streams: Vec<Stream>,
        mode: &Mode,
        cache: Arc<dyn Cache>,
        progress: Option<Arc<Progress>>,
    ) -> CoreResult<Dataset>;

    async fn close(&self) -> CoreResult<()>;
}

/// Create/validate the target table, stage, and upsert a Dataset (C6).
#[async_trait]
pub trait DestinationConnector: Send + Sync {
    /// Drives the staging/merge protocol (§4.4) for every stream in
    /// `dataset`, emitting progress as it goes.
    async fn write(
        &self,
        dataset: &Dataset,
        mode: &Mode,
        progress: Option<Arc<Progress>>,
    ) -> CoreResult<()>;

    /// Post-write verification handle. Borrowed rather than owned so a
    /// multi-destination composer can delegate to its last child without
    /// cloning connector state.
    fn integrity(&self) -> Arc<dyn IntegrityChecker>;

    async fn close(&self) -> CoreResult<()>;
}

/// Post-write row-count verification (§4.4, §8).
#[async_trait]
pub trait IntegrityChecker: Send + Sync {
    /// Verifies written row counts equal `dataset.size(stream)` for every
    /// stream in the batch. Raises `IntegrityCheckFailed` on mismatch.
    async fn check_batch_volume(&self, dataset: &Dataset) -> CoreResult<()>;
}

/// An `IntegrityChecker` that always passes — used by destinations with no
/// queryable row count of their own (console/stdout, §4.4 expansion).
pub struct NoopIntegrityChecker;

#[async_trait]
impl IntegrityChecker for NoopIntegrityChecker {
    async fn check_batch_volume(&self, _dataset: &Dataset) -> CoreResult<()> {
        Ok(())
    }
}
