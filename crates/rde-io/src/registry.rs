//! Vendor registry (§3): maps a `ConnectionInfo`'s `vendor_type` to the
//! concrete source or destination connector it builds. This is the only
//! place a concrete connector type name is ever written down outside of its
//! own module — the Transfer command holds only the trait object.

use std::sync::Arc;

use rde_core::{ConnectionInfo, CoreError, CoreResult, DestinationConnector, ObjectLayout, SourceConnector};

use crate::composer::ComposedDestination;
use crate::destination_console::StdoutDestination;
use crate::destination_object_store::ObjectStoreDestination;
use crate::destination_sql::{BigqueryDestination, SnowflakeDestination, SnowflakeStageDestination, WarehouseDestination};
use crate::source_memory::MemorySource;
use crate::source_sql::{BigquerySource, PostgresConnectConfig, SnowflakeSource, SqlSource};

fn pg_config(host: &str, port: u16, user: &str, password: &str, database: &str) -> PostgresConnectConfig {
    PostgresConnectConfig {
        host: host.to_string(),
        port,
        user: user.to_string(),
        password: password.to_string(),
        database: database.to_string(),
    }
}

/// Builds the vendor-specific source connector for a source's
/// `connection_info` (§3, §4.8 step 5). `chunk_size` is the configured
/// `Settings.source_chunk_size` (§4.4 step 4), threaded through to whichever
/// connector does the actual chunked streaming read.
pub async fn build_source(info: &ConnectionInfo, chunk_size: usize) -> CoreResult<Arc<dyn SourceConnector>> {
    match info {
        ConnectionInfo::Memory { namespace } => Ok(Arc::new(MemorySource::new(
            namespace.clone().unwrap_or_else(|| "default".to_string()),
        ))),
        ConnectionInfo::Postgresql { host, port, user, password, database, .. } => {
            let config = pg_config(host, *port, user, password, database);
            Ok(Arc::new(SqlSource::connect(&config, chunk_size).await?))
        }
        ConnectionInfo::Redshift { host, port, user, password, database, .. } => {
            let config = pg_config(host, *port, user, password, database);
            Ok(Arc::new(SqlSource::connect(&config, chunk_size).await?))
        }
        ConnectionInfo::Snowflake { user, access_token, account, warehouse, database, target_schema, .. } => {
            Ok(Arc::new(SnowflakeSource::new(
                account,
                warehouse,
                database,
                target_schema.as_deref(),
                user,
                access_token,
                chunk_size,
            )?))
        }
        ConnectionInfo::Bigquery { project_id, service_account, .. } => {
            Ok(Arc::new(BigquerySource::new(project_id, service_account, chunk_size).await?))
        }
        other => Err(CoreError::Unknown(anyhow::anyhow!(
            "vendor_type {} has no registered source connector",
            other.vendor_type().as_str()
        ))),
    }
}

/// Builds the vendor-specific destination connector for a destination's
/// `connection_info` (§3, §4.8 step 6). Redshift/Snowflake/BigQuery compose
/// a staging destination with the warehouse destination that loads from it.
pub async fn build_destination(
    info: &ConnectionInfo,
    drop_after_complete: bool,
) -> CoreResult<Arc<dyn DestinationConnector>> {
    match info {
        ConnectionInfo::Console { limit } => Ok(Arc::new(StdoutDestination::new(*limit))),
        ConnectionInfo::Postgresql { host, port, user, password, database, target_schema } => {
            let config = pg_config(host, *port, user, password, database);
            Ok(Arc::new(
                WarehouseDestination::postgres(
                    &config,
                    target_schema.clone().unwrap_or_default(),
                    drop_after_complete,
                )
                .await?,
            ))
        }
        ConnectionInfo::Redshift {
            host,
            port,
            user,
            password,
            database,
            target_schema,
            s3_bucket,
            s3_region,
            s3_prefix,
            iam_role,
            aws_access_key_id,
            aws_secret_access_key,
        } => {
            let bucket = s3_bucket.as_deref().ok_or_else(|| {
                CoreError::Unknown(anyhow::anyhow!("redshift destination requires s3_bucket"))
            })?;
            let region = s3_region.as_deref().unwrap_or("us-east-1");
            let prefix = s3_prefix.as_deref().unwrap_or("");
            let access_key = aws_access_key_id.as_deref().unwrap_or_default();
            let secret_key = aws_secret_access_key.as_deref().unwrap_or_default();
            let role = iam_role.as_deref().unwrap_or_default();

            let staging = ObjectStoreDestination::s3(
                bucket,
                region,
                prefix,
                access_key,
                secret_key,
                ObjectLayout::Staging,
                Default::default(),
            )?;
            let s3_uri_prefix = format!("s3://{bucket}/{prefix}");
            let config = pg_config(host, *port, user, password, database);
            let warehouse = WarehouseDestination::redshift(
                &config,
                target_schema.clone().unwrap_or_default(),
                s3_uri_prefix,
                role,
                drop_after_complete,
            )
            .await?;

            Ok(Arc::new(ComposedDestination::new(
                vec![Arc::new(staging), Arc::new(warehouse)],
                target_schema.clone(),
            )))
        }
        ConnectionInfo::Snowflake {
            user,
            access_token,
            account,
            warehouse,
            database,
            target_schema,
            stage_name,
            create_stage,
            ..
        } => {
            let schema = target_schema.clone().unwrap_or_default();
            let stage = stage_name.clone().unwrap_or_else(|| format!("{schema}_stage"));
            let stage_dest = SnowflakeStageDestination::new(
                account,
                warehouse,
                database,
                &schema,
                &stage,
                *create_stage,
                user,
                access_token,
            )?;
            let warehouse_dest = SnowflakeDestination::new(
                account,
                warehouse,
                database,
                &schema,
                &stage,
                user,
                access_token,
                drop_after_complete,
            )?;
            Ok(Arc::new(ComposedDestination::new(
                vec![Arc::new(stage_dest), Arc::new(warehouse_dest)],
                None,
            )))
        }
        ConnectionInfo::Bigquery {
            project_id,
            service_account,
            target_schema,
            gcs_bucket_name,
            gcs_bucket_path,
        } => {
            let bucket = gcs_bucket_name.as_deref().ok_or_else(|| {
                CoreError::Unknown(anyhow::anyhow!("bigquery destination requires gcs_bucket_name"))
            })?;
            let bucket_path = gcs_bucket_path.as_deref().unwrap_or("");
            let staging = ObjectStoreDestination::gcs(
                bucket,
                bucket_path,
                service_account,
                ObjectLayout::Staging,
                Default::default(),
            )?;
            let gcs_uri_prefix = format!("gs://{bucket}/{bucket_path}");
            let schema = target_schema.clone().unwrap_or_default();
            let warehouse = BigqueryDestination::new(
                project_id,
                service_account,
                &schema,
                &gcs_uri_prefix,
                drop_after_complete,
            )
            .await?;
            Ok(Arc::new(ComposedDestination::new(
                vec![Arc::new(staging), Arc::new(warehouse)],
                None,
            )))
        }
        ConnectionInfo::S3 { s3_bucket, s3_region, s3_prefix, aws_access_key_id, aws_secret_access_key, format, compression } => {
            Ok(Arc::new(ObjectStoreDestination::s3(
                s3_bucket,
                s3_region,
                s3_prefix,
                aws_access_key_id,
                aws_secret_access_key,
                *format,
                *compression,
            )?))
        }
        ConnectionInfo::Gcs { gcs_bucket_name, gcs_bucket_path, service_account, format, compression } => {
            Ok(Arc::new(ObjectStoreDestination::gcs(
                gcs_bucket_name,
                gcs_bucket_path,
                service_account,
                format.unwrap_or(ObjectLayout::Hive),
                *compression,
            )?))
        }
        ConnectionInfo::Memory { .. } => Err(CoreError::Unknown(anyhow::anyhow!(
            "vendor_type memory has no registered destination connector"
        ))),
    }
}
