//! S3 / GCS Parquet destinations (§4.5, §6.3): write each stream's records
//! to a stable, idempotent path under an `object_store` backend, either as
//! staging for a warehouse load or as a standalone hive-partitioned dataset.

use std::sync::atomic::{AtomicI64, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use datafusion::arrow::record_batch::RecordBatch;
use datafusion::parquet::arrow::arrow_writer::ArrowWriter;
use datafusion::parquet::basic::Compression;
use datafusion::parquet::file::properties::WriterProperties;
use object_store::aws::AmazonS3Builder;
use object_store::gcp::GoogleCloudStorageBuilder;
use object_store::path::Path as ObjectPath;
use object_store::{ObjectStore, PutOptions};

use rde_core::{
    CoreError, CoreResult, Dataset, DestinationConnector, IntegrityChecker, Mode, ObjectLayout,
    ParquetCompression, Progress,
};

use crate::cache_arrow::records_to_batch;

/// Stable, reproducible object path for one Parquet file (§6.3). `index` is
/// the chunk number within the stream's write, starting at 0.
pub fn object_path(
    layout: ObjectLayout,
    bucket_path: &str,
    namespace: &str,
    schema_name: &str,
    table: &str,
    dt: DateTime<Utc>,
    batch_id: &str,
    index: usize,
) -> String {
    let date = dt.format("%Y-%m-%d").to_string();
    match layout {
        ObjectLayout::Staging => format!(
            "{bucket_path}/{namespace}/{schema_name}__{table}/{date}/{batch_id}/{schema_name}__{table}_{}_{batch_id}_{index}.parquet",
            dt.format("%Y_%m_%d"),
        ),
        ObjectLayout::Hive => format!(
            "{bucket_path}/{table}/dt={date}/{}_{batch_id}_{index}.parquet",
            dt.format("%Y%m%d%H%M%S"),
        ),
    }
}

fn parquet_compression(c: ParquetCompression) -> Compression {
    match c {
        ParquetCompression::None => Compression::UNCOMPRESSED,
        ParquetCompression::Snappy => Compression::SNAPPY,
        ParquetCompression::Gzip => Compression::GZIP(Default::default()),
        ParquetCompression::Zstd => Compression::ZSTD(Default::default()),
    }
}

fn encode_parquet(batch: &RecordBatch, compression: ParquetCompression) -> CoreResult<Vec<u8>> {
    let props = WriterProperties::builder()
        .set_compression(parquet_compression(compression))
        .build();
    let mut buf = Vec::new();
    let mut writer = ArrowWriter::try_new(&mut buf, batch.schema(), Some(props))
        .map_err(|e| CoreError::Unknown(anyhow::anyhow!(e)))?;
    writer
        .write(batch)
        .map_err(|e| CoreError::Unknown(anyhow::anyhow!(e)))?;
    writer
        .close()
        .map_err(|e| CoreError::Unknown(anyhow::anyhow!(e)))?;
    Ok(buf)
}

const DEFAULT_CHUNK_SIZE: usize = 1024;

/// An integrity checker for object-store destinations, derived from
/// bytes/rows recorded while writing rather than a round-trip query, since
/// there is no table to query (§4.5 expansion).
pub struct ObjectStoreIntegrityChecker {
    written: Arc<AtomicI64>,
}

#[async_trait]
impl IntegrityChecker for ObjectStoreIntegrityChecker {
    async fn check_batch_volume(&self, dataset: &Dataset) -> CoreResult<()> {
        let mut expected = 0i64;
        for stream in &dataset.streams {
            expected += dataset.size(stream)?;
        }
        let written = self.written.load(Ordering::SeqCst);
        if written != expected {
            return Err(CoreError::IntegrityCheckFailed {
                entity: dataset.namespace.clone(),
                written,
                expected,
            });
        }
        Ok(())
    }
}

enum Backend {
    S3(Box<dyn ObjectStore>),
    Gcs(Box<dyn ObjectStore>),
}

/// Shared object-store destination driving S3 or GCS Parquet writes (§4.5,
/// §6.3). Distinguished only by which `object_store` backend it was built
/// with and its entity-URI vendor tag.
pub struct ObjectStoreDestination {
    vendor_uri: &'static str,
    store: Backend,
    bucket_path: String,
    layout: ObjectLayout,
    compression: ParquetCompression,
    written: Arc<AtomicI64>,
}

impl ObjectStoreDestination {
    pub fn s3(
        bucket: &str,
        region: &str,
        prefix: &str,
        access_key_id: &str,
        secret_access_key: &str,
        layout: ObjectLayout,
        compression: ParquetCompression,
    ) -> CoreResult<Self> {
        let store = AmazonS3Builder::new()
            .with_bucket_name(bucket)
            .with_region(region)
            .with_access_key_id(access_key_id)
            .with_secret_access_key(secret_access_key)
            .build()
            .map_err(|e| CoreError::DestinationConnectionFailed(e.to_string()))?;
        Ok(Self {
            vendor_uri: "s3",
            store: Backend::S3(Box::new(store)),
            bucket_path: prefix.to_string(),
            layout,
            compression,
            written: Arc::new(AtomicI64::new(0)),
        })
    }

    pub fn gcs(
        bucket_name: &str,
        bucket_path: &str,
        service_account_json: &str,
        layout: ObjectLayout,
        compression: ParquetCompression,
    ) -> CoreResult<Self> {
        let store = GoogleCloudStorageBuilder::new()
            .with_bucket_name(bucket_name)
            .with_service_account_key(service_account_json)
            .build()
            .map_err(|e| CoreError::DestinationConnectionFailed(e.to_string()))?;
        Ok(Self {
            vendor_uri: "gcs",
            store: Backend::Gcs(Box::new(store)),
            bucket_path: bucket_path.to_string(),
            layout,
            compression,
            written: Arc::new(AtomicI64::new(0)),
        })
    }

    fn object_store(&self) -> &dyn ObjectStore {
        match &self.store {
            Backend::S3(s) => s.as_ref(),
            Backend::Gcs(s) => s.as_ref(),
        }
    }

    /// The staging URI a warehouse destination loads from, for the same
    /// `(namespace, stream, dt, batch_id)` this destination just staged.
    pub fn staging_base_uri(&self, scheme: &str, bucket: &str) -> String {
        format!("{scheme}://{bucket}/{}", self.bucket_path)
    }
}

#[async_trait]
impl DestinationConnector for ObjectStoreDestination {
    async fn write(
        &self,
        dataset: &Dataset,
        _mode: &Mode,
        progress: Option<Arc<Progress>>,
    ) -> CoreResult<()> {
        for stream in &dataset.streams {
            let entity = format!(
                "destination+{}://{}/{}/{}",
                self.vendor_uri, dataset.namespace, stream.schema_name, stream.name
            );
            let total = dataset.size(stream)?;
            let p = progress.clone().unwrap_or_else(|| Progress::new(total));
            p.set_total(total);
            if total == 0 {
                p.message(format!("{entity}: empty stream, skipping write"));
                continue;
            }

            let records: Vec<_> = dataset.read(stream)?.collect();
            let arrow_schema: datafusion::arrow::datatypes::SchemaRef =
                Arc::new(stream.schema().to_arrow());
            let mut index = 0usize;
            for chunk in records.chunks(DEFAULT_CHUNK_SIZE) {
                let batch = records_to_batch(&arrow_schema, stream.schema(), chunk)
                    .map_err(|e| CoreError::Unknown(anyhow::anyhow!(e)))?;
                let bytes = encode_parquet(&batch, self.compression)?;
                let path = object_path(
                    self.layout,
                    &self.bucket_path,
                    &dataset.namespace,
                    &stream.schema_name,
                    &stream.name,
                    dataset.dt,
                    &dataset.batch_id,
                    index,
                );
                self.object_store()
                    .put_opts(&ObjectPath::from(path.as_str()), bytes.into(), PutOptions::default())
                    .await
                    .map_err(|e| CoreError::DestinationConnectionFailed(e.to_string()))?;
                self.written.fetch_add(chunk.len() as i64, Ordering::SeqCst);
                p.advance(chunk.len() as i64);
                index += 1;
            }
        }
        Ok(())
    }

    fn integrity(&self) -> Arc<dyn IntegrityChecker> {
        Arc::new(ObjectStoreIntegrityChecker {
            written: self.written.clone(),
        })
    }

    async fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    #[test]
    fn staging_path_matches_spec_layout() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap();
        let path = object_path(
            ObjectLayout::Staging,
            "bkt/prefix",
            "acme",
            "pontoon",
            "events",
            dt,
            "batch-1",
            0,
        );
        assert_eq!(
            path,
            "bkt/prefix/acme/pontoon__events/2025-01-02/batch-1/pontoon__events_2025_01_02_batch-1_0.parquet"
        );
    }

    #[test]
    fn hive_path_matches_spec_layout() {
        let dt = Utc.with_ymd_and_hms(2025, 1, 2, 3, 4, 5).unwrap();
        let path = object_path(ObjectLayout::Hive, "bkt/prefix", "acme", "pontoon", "events", dt, "batch-1", 2);
        assert_eq!(path, "bkt/prefix/events/dt=2025-01-02/20250102030405_batch-1_2.parquet");
    }
}
