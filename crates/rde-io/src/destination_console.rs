//! Stdout destination (§4.5 expansion): prints a bounded preview of each
//! stream's records, used for `source-inspect`-style smoke tests and local
//! debugging. No staging/merge phase and no queryable row count, so its
//! integrity checker is the no-op.

use std::sync::Arc;

use async_trait::async_trait;

use rde_core::{CoreResult, Dataset, DestinationConnector, IntegrityChecker, Mode, NoopIntegrityChecker, Progress};

pub struct StdoutDestination {
    /// `None` means unbounded (print every record).
    limit: Option<usize>,
}

impl StdoutDestination {
    pub fn new(limit: Option<usize>) -> Self {
        Self { limit }
    }
}

#[async_trait]
impl DestinationConnector for StdoutDestination {
    async fn write(&self, dataset: &Dataset, _mode: &Mode, progress: Option<Arc<Progress>>) -> CoreResult<()> {
        for stream in &dataset.streams {
            let total = dataset.size(stream)?;
            let p = progress.clone().unwrap_or_else(|| Progress::new(total));
            p.set_total(total);
            if total == 0 {
                p.message(format!("{}: empty stream, skipping write", stream.qualified_name()));
                continue;
            }

            println!("-- {} ({} records) --", stream.qualified_name(), total);
            let names = stream.schema().names();
            let mut printed = 0usize;
            for record in dataset.read(stream)? {
                if self.limit.is_some_and(|limit| printed >= limit) {
                    break;
                }
                let row = names
                    .iter()
                    .zip(record.data.iter())
                    .map(|(name, value)| format!("{name}={value:?}"))
                    .collect::<Vec<_>>()
                    .join(", ");
                println!("{row}");
                printed += 1;
                p.advance(1);
            }
            if printed < total as usize {
                p.advance(total - printed as i64);
            }
        }
        Ok(())
    }

    fn integrity(&self) -> Arc<dyn IntegrityChecker> {
        Arc::new(NoopIntegrityChecker)
    }

    async fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_memory::MemoryCache;
    use rde_core::{CanonicalType, Mode, Record, Schema, Stream, Value};

    #[tokio::test]
    async fn write_advances_progress_to_full_count_even_under_a_limit() {
        let cache = Arc::new(MemoryCache::new());
        let stream = Stream::new("events", "public", Schema::new(vec![("id".into(), CanonicalType::Int64)]));
        cache
            .write(
                &stream,
                &[Record::new(vec![Value::Int64(1)]), Record::new(vec![Value::Int64(2)])],
            )
            .unwrap();
        let dataset = Dataset::new("ns", vec![stream], cache, "batch-1", chrono::Utc::now());

        let destination = StdoutDestination::new(Some(1));
        let progress = Progress::new(0);
        destination
            .write(&dataset, &Mode::full_refresh(), Some(progress.clone()))
            .await
            .unwrap();
        assert_eq!(progress.snapshot().processed, 2);
    }
}
