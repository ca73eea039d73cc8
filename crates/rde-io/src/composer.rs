//! Multi-destination composer (C7, §4.6): chains an ordered list of
//! destinations behind one `DestinationConnector`, reusing the same dataset
//! handle across children — the first stages, the last loads. This is how
//! `redshift-s3`, `bigquery-gcs`, and `snowflake-sms` compound destinations
//! are realised from their two constituent connectors.

use std::sync::Arc;

use async_trait::async_trait;

use rde_core::{CoreResult, Dataset, DestinationConnector, IntegrityChecker, Mode, Progress};

/// Drives `write()` on every child in order over the same dataset, remapping
/// each stream's `schema_name` to `target_schema` first when one is
/// configured (§4.6 step 1). `integrity()` delegates to the last child.
pub struct ComposedDestination {
    children: Vec<Arc<dyn DestinationConnector>>,
    target_schema: Option<String>,
}

impl ComposedDestination {
    pub fn new(children: Vec<Arc<dyn DestinationConnector>>, target_schema: Option<String>) -> Self {
        assert!(!children.is_empty(), "composed destination needs at least one child");
        Self { children, target_schema }
    }

    fn remapped(&self, dataset: Dataset) -> Dataset {
        let Some(target_schema) = &self.target_schema else {
            return dataset;
        };
        let mut dataset = dataset;
        let renames: Vec<(String, String)> = dataset
            .streams
            .iter()
            .map(|s| (s.name.clone(), s.schema_name.clone()))
            .collect();
        for (name, schema_name) in renames {
            dataset.rename_stream(&name, &schema_name, &name, target_schema);
        }
        dataset
    }
}

#[async_trait]
impl DestinationConnector for ComposedDestination {
    async fn write(&self, dataset: &Dataset, mode: &Mode, progress: Option<Arc<Progress>>) -> CoreResult<()> {
        // Rebuild a dataset sharing the same cache/batch_id/dt but with
        // streams renamed to the composed target_schema, so every child
        // writes to (and the later child loads from) the same location.
        let remapped = self.remapped(Dataset::new(
            dataset.namespace.clone(),
            dataset.streams.clone(),
            dataset.cache().clone(),
            dataset.batch_id.clone(),
            dataset.dt,
        ));
        for child in &self.children {
            child.write(&remapped, mode, progress.clone()).await?;
        }
        Ok(())
    }

    fn integrity(&self) -> Arc<dyn IntegrityChecker> {
        self.children
            .last()
            .expect("composed destination always has at least one child")
            .integrity()
    }

    async fn close(&self) -> CoreResult<()> {
        for child in &self.children {
            child.close().await?;
        }
        Ok(())
    }
}
