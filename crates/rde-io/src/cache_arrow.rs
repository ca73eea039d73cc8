//! Durable Arrow IPC cache backend (C3, §4.2): one Arrow IPC stream file per
//! `(schema_name, name)` under `<cache_dir>/<namespace>/`. In-process record
//! counts are tracked alongside the file so `size()` stays O(1) even though
//! the file itself would need a scan. This is the cache real transfer runs
//! spill through between the read and write phases.

use std::collections::HashMap;
use std::collections::hash_map::Entry;
use std::fs::{self, File};
use std::io::{BufReader, BufWriter};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};

use chrono::{DateTime, NaiveDate, NaiveTime, Timelike, Utc};
use datafusion::arrow::array::{
    Array, ArrayRef, BinaryBuilder, BooleanArray, BooleanBuilder, Date32Array, Date32Builder,
    Float64Array, Float64Builder, Int64Array, Int64Builder, StringArray, StringBuilder,
    Time64MicrosecondArray, Time64MicrosecondBuilder, TimestampMicrosecondArray,
    TimestampMicrosecondBuilder,
};
use datafusion::arrow::datatypes::SchemaRef;
use datafusion::arrow::ipc::reader::StreamReader;
use datafusion::arrow::ipc::writer::StreamWriter;
use datafusion::arrow::record_batch::RecordBatch;

use rde_core::{CanonicalType, Cache, CoreError, CoreResult, Record, Schema, Stream, Value};

type Key = (String, String);

fn io_err(context: &str, e: std::io::Error) -> CoreError {
    CoreError::Unknown(anyhow::anyhow!("{context}: {e}"))
}

fn arrow_err(context: &str, e: datafusion::arrow::error::ArrowError) -> CoreError {
    CoreError::Unknown(anyhow::anyhow!("{context}: {e}"))
}

struct OpenWriter {
    writer: StreamWriter<BufWriter<File>>,
}

/// The durable, production cache implementation.
pub struct ArrowIpcCache {
    dir: PathBuf,
    writers: Mutex<HashMap<Key, OpenWriter>>,
    counts: Mutex<HashMap<Key, i64>>,
}

impl ArrowIpcCache {
    pub fn open(namespace: &str, base_dir: &std::path::Path) -> CoreResult<Arc<Self>> {
        let dir = base_dir.join(namespace);
        fs::create_dir_all(&dir).map_err(|e| io_err("creating cache directory", e))?;
        Ok(Arc::new(Self {
            dir,
            writers: Mutex::new(HashMap::new()),
            counts: Mutex::new(HashMap::new()),
        }))
    }

    fn key(stream: &Stream) -> Key {
        (stream.schema_name.clone(), stream.name.clone())
    }

    fn path(&self, key: &Key) -> PathBuf {
        self.dir.join(format!("{}__{}.arrows", key.0, key.1))
    }

    /// Finishes and drops the writer for `key`, if one is open, flushing the
    /// IPC end-of-stream marker so the file becomes readable.
    fn finish_writer(&self, key: &Key) -> CoreResult<()> {
        let mut writers = self.writers.lock().unwrap();
        if let Some(mut open) = writers.remove(key) {
            open.writer
                .finish()
                .map_err(|e| arrow_err("finishing cache stream", e))?;
        }
        Ok(())
    }
}

impl Cache for ArrowIpcCache {
    fn write(&self, stream: &Stream, records: &[Record]) -> CoreResult<usize> {
        if records.is_empty() {
            return Ok(0);
        }
        let key = Self::key(stream);
        let arrow_schema: SchemaRef = Arc::new(stream.schema().to_arrow());
        let batch = records_to_batch(&arrow_schema, stream.schema(), records)
            .map_err(|e| CoreError::Unknown(anyhow::anyhow!(e)))?;

        let mut writers = self.writers.lock().unwrap();
        let open = match writers.entry(key.clone()) {
            Entry::Occupied(o) => o.into_mut(),
            Entry::Vacant(v) => {
                let file = File::create(self.path(&key)).map_err(|e| io_err("creating cache file", e))?;
                let writer = StreamWriter::try_new(BufWriter::new(file), &arrow_schema)
                    .map_err(|e| arrow_err("opening cache stream writer", e))?;
                v.insert(OpenWriter { writer })
            }
        };
        open.writer
            .write(&batch)
            .map_err(|e| arrow_err("writing cache batch", e))?;

        let mut counts = self.counts.lock().unwrap();
        *counts.entry(key).or_insert(0) += records.len() as i64;
        Ok(records.len())
    }

    fn read_owned<'a>(
        &'a self,
        stream: Stream,
    ) -> CoreResult<Box<dyn Iterator<Item = Record> + 'a>> {
        let key = Self::key(&stream);
        self.finish_writer(&key)?;

        let path = self.path(&key);
        if !path.exists() {
            return Ok(Box::new(std::iter::empty()));
        }
        let file = File::open(&path).map_err(|e| io_err("opening cache file for read", e))?;
        let reader = StreamReader::try_new(BufReader::new(file), None)
            .map_err(|e| arrow_err("opening cache stream reader", e))?;
        Ok(Box::new(BatchRecordIter {
            reader,
            schema: stream.schema().clone(),
            current: None,
            row: 0,
        }))
    }

    fn size(&self, stream: &Stream) -> CoreResult<i64> {
        let counts = self.counts.lock().unwrap();
        Ok(*counts.get(&Self::key(stream)).unwrap_or(&0))
    }

    fn close(&self) -> CoreResult<()> {
        let keys: Vec<Key> = self.writers.lock().unwrap().keys().cloned().collect();
        for key in keys {
            self.finish_writer(&key)?;
        }
        if self.dir.exists() {
            fs::remove_dir_all(&self.dir).map_err(|e| io_err("removing cache directory", e))?;
        }
        Ok(())
    }
}

struct BatchRecordIter {
    reader: StreamReader<BufReader<File>>,
    schema: Schema,
    current: Option<(RecordBatch, usize)>,
    row: usize,
}

impl Iterator for BatchRecordIter {
    type Item = Record;

    fn next(&mut self) -> Option<Record> {
        loop {
            if let Some((batch, len)) = &self.current {
                if self.row < *len {
                    let record = batch_row_to_record(&self.schema, batch, self.row);
                    self.row += 1;
                    return Some(record);
                }
                self.current = None;
                self.row = 0;
            }
            match self.reader.next() {
                Some(Ok(batch)) => {
                    let len = batch.num_rows();
                    self.current = Some((batch, len));
                }
                Some(Err(_)) | None => return None,
            }
        }
    }
}

pub(crate) fn batch_row_to_record(schema: &Schema, batch: &RecordBatch, row: usize) -> Record {
    let data = schema
        .fields()
        .iter()
        .enumerate()
        .map(|(i, (_, ty))| value_from_array(*ty, batch.column(i).as_ref(), row))
        .collect();
    Record::new(data)
}

/// Reads one cell out of an Arrow array, re-typing it according to the
/// stream's declared canonical type rather than trusting the physical Arrow
/// type verbatim (§9: booleans/dates must never silently widen on read).
fn value_from_array(ty: CanonicalType, array: &dyn Array, row: usize) -> Value {
    if array.is_null(row) {
        return Value::Null;
    }
    match ty {
        CanonicalType::Int64 => {
            Value::Int64(array.as_any().downcast_ref::<Int64Array>().unwrap().value(row))
        }
        CanonicalType::Float64 => Value::Float64(
            array
                .as_any()
                .downcast_ref::<Float64Array>()
                .unwrap()
                .value(row),
        ),
        CanonicalType::String => Value::String(
            array
                .as_any()
                .downcast_ref::<StringArray>()
                .unwrap()
                .value(row)
                .to_string(),
        ),
        CanonicalType::Binary => Value::Binary(
            array
                .as_any()
                .downcast_ref::<datafusion::arrow::array::BinaryArray>()
                .unwrap()
                .value(row)
                .to_vec(),
        ),
        CanonicalType::Bool => Value::Bool(
            array
                .as_any()
                .downcast_ref::<BooleanArray>()
                .unwrap()
                .value(row),
        ),
        CanonicalType::Date => {
            let days = array
                .as_any()
                .downcast_ref::<Date32Array>()
                .unwrap()
                .value(row);
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
            Value::Date(epoch + chrono::Duration::days(days as i64))
        }
        CanonicalType::Time => {
            let micros = array
                .as_any()
                .downcast_ref::<Time64MicrosecondArray>()
                .unwrap()
                .value(row);
            let secs = (micros / 1_000_000) as u32;
            let nanos = ((micros % 1_000_000) * 1000) as u32;
            Value::Time(NaiveTime::from_num_seconds_from_midnight_opt(secs, nanos).unwrap())
        }
        CanonicalType::TimestampUtc => {
            let micros = array
                .as_any()
                .downcast_ref::<TimestampMicrosecondArray>()
                .unwrap()
                .value(row);
            let naive = DateTime::from_timestamp_micros(micros).unwrap();
            Value::TimestampUtc(DateTime::<Utc>::from_naive_utc_and_offset(
                naive.naive_utc(),
                Utc,
            ))
        }
    }
}

pub(crate) fn records_to_batch(
    arrow_schema: &SchemaRef,
    schema: &Schema,
    records: &[Record],
) -> Result<RecordBatch, String> {
    let mut columns: Vec<ArrayRef> = Vec::with_capacity(schema.len());
    for (col, (_, ty)) in schema.fields().iter().enumerate() {
        let values: Vec<&Value> = records.iter().map(|r| &r.data[col]).collect();
        columns.push(build_array(*ty, &values));
    }
    RecordBatch::try_new(arrow_schema.clone(), columns).map_err(|e| e.to_string())
}

fn build_array(ty: CanonicalType, values: &[&Value]) -> ArrayRef {
    match ty {
        CanonicalType::Int64 => {
            let mut b = Int64Builder::new();
            for v in values {
                match v {
                    Value::Int64(x) => b.append_value(*x),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        CanonicalType::Float64 => {
            let mut b = Float64Builder::new();
            for v in values {
                match v {
                    Value::Float64(x) => b.append_value(*x),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        CanonicalType::String => {
            let mut b = StringBuilder::new();
            for v in values {
                match v {
                    Value::String(s) => b.append_value(s),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        CanonicalType::Binary => {
            let mut b = BinaryBuilder::new();
            for v in values {
                match v {
                    Value::Binary(bytes) => b.append_value(bytes),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        CanonicalType::Bool => {
            let mut b = BooleanBuilder::new();
            for v in values {
                match v {
                    Value::Bool(x) => b.append_value(*x),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        CanonicalType::Date => {
            let epoch = NaiveDate::from_ymd_opt(1970, 1, 1).unwrap();
            let mut b = Date32Builder::new();
            for v in values {
                match v {
                    Value::Date(d) => b.append_value((*d - epoch).num_days() as i32),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        CanonicalType::Time => {
            let mut b = Time64MicrosecondBuilder::new();
            for v in values {
                match v {
                    Value::Time(t) => {
                        let micros = t.num_seconds_from_midnight() as i64 * 1_000_000
                            + (t.nanosecond() as i64) / 1000;
                        b.append_value(micros);
                    }
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
        CanonicalType::TimestampUtc => {
            let mut b = TimestampMicrosecondBuilder::new().with_timezone("UTC");
            for v in values {
                match v {
                    Value::TimestampUtc(ts) => b.append_value(ts.timestamp_micros()),
                    _ => b.append_null(),
                }
            }
            Arc::new(b.finish())
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rde_core::Schema as CoreSchema;
    use tempfile::tempdir;

    fn schema() -> CoreSchema {
        CoreSchema::new(vec![
            ("id".into(), CanonicalType::Int64),
            ("active".into(), CanonicalType::Bool),
            ("signed_up".into(), CanonicalType::Date),
            ("created_at".into(), CanonicalType::TimestampUtc),
        ])
    }

    #[test]
    fn bool_date_timestamp_round_trip_verbatim() {
        let dir = tempdir().unwrap();
        let cache = ArrowIpcCache::open("ns", dir.path()).unwrap();
        let stream = Stream::new("events", "public", schema());

        let date = NaiveDate::from_ymd_opt(2025, 1, 15).unwrap();
        let ts = Utc::now();
        let records = vec![Record::new(vec![
            Value::Int64(1),
            Value::Bool(true),
            Value::Date(date),
            Value::TimestampUtc(ts),
        ])];
        cache.write(&stream, &records).unwrap();
        assert_eq!(cache.size(&stream).unwrap(), 1);

        let read: Vec<_> = cache.read_owned(stream).unwrap().collect();
        assert_eq!(read.len(), 1);
        assert_eq!(read[0].data[1], Value::Bool(true));
        assert_eq!(read[0].data[2], Value::Date(date));
        match &read[0].data[3] {
            Value::TimestampUtc(got) => {
                assert_eq!(got.timestamp_micros(), ts.timestamp_micros());
            }
            other => panic!("expected timestamp, got {other:?}"),
        }
    }

    #[test]
    fn multiple_writes_preserve_insertion_order() {
        let dir = tempdir().unwrap();
        let cache = ArrowIpcCache::open("ns", dir.path()).unwrap();
        let stream = Stream::new(
            "events",
            "public",
            CoreSchema::new(vec![("id".into(), CanonicalType::Int64)]),
        );
        cache
            .write(&stream, &[Record::new(vec![Value::Int64(1)])])
            .unwrap();
        cache
            .write(&stream, &[Record::new(vec![Value::Int64(2)])])
            .unwrap();
        let read: Vec<_> = cache.read_owned(stream).unwrap().collect();
        assert_eq!(
            read,
            vec![
                Record::new(vec![Value::Int64(1)]),
                Record::new(vec![Value::Int64(2)])
            ]
        );
    }
}
