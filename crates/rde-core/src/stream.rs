//! Stream / Record / Dataset (§3, §9 "bookkeeping columns added late").

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::Arc;

use chrono::{DateTime, NaiveDate, NaiveTime, Utc};

use crate::cache::Cache;
use crate::error::{CoreError, CoreResult};
use crate::types::{CanonicalType, Schema};

/// A single cell value, carrying its canonical type by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Value {
    Int64(i64),
    Float64(f64),
    String(String),
    Binary(Vec<u8>),
    Bool(bool),
    Date(NaiveDate),
    Time(NaiveTime),
    TimestampUtc(DateTime<Utc>),
    Null,
}

impl Value {
    pub fn canonical_type(&self) -> Option<CanonicalType> {
        match self {
            Value::Int64(_) => Some(CanonicalType::Int64),
            Value::Float64(_) => Some(CanonicalType::Float64),
            Value::String(_) => Some(CanonicalType::String),
            Value::Binary(_) => Some(CanonicalType::Binary),
            Value::Bool(_) => Some(CanonicalType::Bool),
            Value::Date(_) => Some(CanonicalType::Date),
            Value::Time(_) => Some(CanonicalType::Time),
            Value::TimestampUtc(_) => Some(CanonicalType::TimestampUtc),
            Value::Null => None,
        }
    }
}

/// An ordered list of values aligned 1:1 with a stream's current schema.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct Record {
    pub data: Vec<Value>,
}

impl Record {
    pub fn new(data: Vec<Value>) -> Self {
        Self { data }
    }
}

/// A late-bound bookkeeping column: its value is only known at
/// row-materialisation time, not when the mutator is called (§9).
#[derive(Debug, Clone)]
pub enum Bookkeeping {
    Checksum,
    BatchId(String),
    LastSyncedAt(DateTime<Utc>),
    Version(i64),
}

impl Bookkeeping {
    fn canonical_type(&self) -> CanonicalType {
        match self {
            Bookkeeping::Checksum => CanonicalType::String,
            Bookkeeping::BatchId(_) => CanonicalType::String,
            Bookkeeping::LastSyncedAt(_) => CanonicalType::TimestampUtc,
            Bookkeeping::Version(_) => CanonicalType::Int64,
        }
    }

    fn materialize(&self, base: &Record) -> Value {
        match self {
            Bookkeeping::Checksum => {
                let mut hasher = DefaultHasher::new();
                for value in &base.data {
                    format!("{:?}", value).hash(&mut hasher);
                }
                Value::String(format!("{:016x}", hasher.finish()))
            }
            Bookkeeping::BatchId(id) => Value::String(id.clone()),
            Bookkeeping::LastSyncedAt(ts) => Value::TimestampUtc(*ts),
            Bookkeeping::Version(v) => Value::Int64(*v),
        }
    }
}

/// A typed sequence of records from one logical source table.
#[derive(Debug, Clone)]
pub struct Stream {
    pub name: String,
    pub schema_name: String,
    schema: Schema,
    pub primary_field: Option<String>,
    pub cursor_field: Option<String>,
    filters: Vec<(String, Value)>,
    bookkeeping: Vec<(String, Bookkeeping)>,
}

impl Stream {
    pub fn new(
        name: impl Into<String>,
        schema_name: impl Into<String>,
        schema: Schema,
    ) -> Self {
        Self {
            name: name.into(),
            schema_name: schema_name.into(),
            schema,
            primary_field: None,
            cursor_field: None,
            filters: Vec::new(),
            bookkeeping: Vec::new(),
        }
    }

    pub fn schema(&self) -> &Schema {
        &self.schema
    }

    pub fn filters(&self) -> &[(String, Value)] {
        &self.filters
    }

    pub fn bookkeeping(&self) -> &[(String, Bookkeeping)] {
        &self.bookkeeping
    }

    /// Full qualified name, `schema.table`, used in cache keys and SQL.
    pub fn qualified_name(&self) -> String {
        format!("{}.{}", self.schema_name, self.name)
    }

    fn require_field(&self, field: &str) -> CoreResult<()> {
        if self.schema.contains(field) {
            Ok(())
        } else {
            Err(CoreError::StreamMissingField {
                stream: self.qualified_name(),
                field: field.to_string(),
            })
        }
    }

    /// Re-validates that `primary_field`, `cursor_field`, and every filter key
    /// still resolve to a schema field. Called after every mutator.
    fn validate_invariants(&self) -> CoreResult<()> {
        if let Some(pf) = &self.primary_field {
            self.require_field(pf)?;
        }
        if let Some(cf) = &self.cursor_field {
            self.require_field(cf)?;
        }
        for (col, _) in &self.filters {
            self.require_field(col)?;
        }
        Ok(())
    }

    pub fn with_primary_field(mut self, field: impl Into<String>) -> CoreResult<Self> {
        self.primary_field = Some(field.into());
        self.validate_invariants()?;
        Ok(self)
    }

    pub fn with_cursor_field(mut self, field: impl Into<String>) -> CoreResult<Self> {
        self.cursor_field = Some(field.into());
        self.validate_invariants()?;
        Ok(self)
    }

    pub fn with_filter(mut self, field: impl Into<String>, value: Value) -> CoreResult<Self> {
        self.filters.push((field.into(), value));
        self.validate_invariants()?;
        Ok(self)
    }

    /// Adds a bookkeeping column to the schema and queues its materialisation.
    pub fn with_field(mut self, name: impl Into<String>, kind: Bookkeeping) -> CoreResult<Self> {
        let name = name.into();
        self.schema.push(name.clone(), kind.canonical_type());
        self.bookkeeping.push((name, kind));
        self.validate_invariants()?;
        Ok(self)
    }

    pub fn with_checksum(self) -> CoreResult<Self> {
        self.with_field("checksum", Bookkeeping::Checksum)
    }

    pub fn with_batch_id(self, id: impl Into<String>) -> CoreResult<Self> {
        self.with_field("batch_id", Bookkeeping::BatchId(id.into()))
    }

    pub fn with_last_synced_at(self, ts: DateTime<Utc>) -> CoreResult<Self> {
        self.with_field("last_synced_at", Bookkeeping::LastSyncedAt(ts))
    }

    pub fn with_version(self, version: i64) -> CoreResult<Self> {
        self.with_field("version", Bookkeeping::Version(version))
    }

    /// Drops a field from the schema. Rejects with `StreamMissingField` if
    /// the field is still referenced by `primary_field`, `cursor_field`, or a
    /// filter key (§3) — callers must clear those references first.
    pub fn drop_field(mut self, name: &str) -> CoreResult<Self> {
        if self.primary_field.as_deref() == Some(name)
            || self.cursor_field.as_deref() == Some(name)
            || self.filters.iter().any(|(col, _)| col == name)
        {
            return Err(CoreError::StreamMissingField {
                stream: self.qualified_name(),
                field: name.to_string(),
            });
        }
        self.schema.drop_field(name);
        self.bookkeeping.retain(|(n, _)| n != name);
        self.validate_invariants()?;
        Ok(self)
    }

    /// Appends every queued bookkeeping value to a source-materialised record,
    /// in the order the bookkeeping mutators were applied.
    pub fn materialize_bookkeeping(&self, mut record: Record) -> Record {
        for (_, kind) in &self.bookkeeping {
            record.data.push(kind.materialize(&record.clone()));
        }
        record
    }
}

/// `(new_name, new_schema) -> (old_name, old_schema)`, resolved at read time
/// so a multi-destination composer can re-target schemas without rewriting
/// the cache (§9 "Stream rename map").
type RenameMap = HashMap<(String, String), (String, String)>;

/// A namespace + ordered set of streams + backing cache + run metadata.
pub struct Dataset {
    pub namespace: String,
    pub streams: Vec<Stream>,
    pub batch_id: String,
    pub dt: DateTime<Utc>,
    cache: Arc<dyn Cache>,
    renames: RenameMap,
}

impl Dataset {
    pub fn new(
        namespace: impl Into<String>,
        streams: Vec<Stream>,
        cache: Arc<dyn Cache>,
        batch_id: impl Into<String>,
        dt: DateTime<Utc>,
    ) -> Self {
        Self {
            namespace: namespace.into(),
            streams,
            batch_id: batch_id.into(),
            dt,
            cache,
            renames: HashMap::new(),
        }
    }

    pub fn cache(&self) -> &Arc<dyn Cache> {
        &self.cache
    }

    /// Resolves the cache-storage identity of a stream, following the rename
    /// chain back to whatever name/schema the data was actually written under.
    fn storage_identity(&self, stream: &Stream) -> (String, String) {
        let mut key = (stream.name.clone(), stream.schema_name.clone());
        while let Some(prior) = self.renames.get(&key) {
            if *prior == key {
                break;
            }
            key = prior.clone();
        }
        key
    }

    pub fn rename_stream(
        &mut self,
        old_name: &str,
        old_schema: &str,
        new_name: &str,
        new_schema: &str,
    ) {
        for stream in self.streams.iter_mut() {
            if stream.name == old_name && stream.schema_name == old_schema {
                stream.name = new_name.to_string();
                stream.schema_name = new_schema.to_string();
            }
        }
        self.renames.insert(
            (new_name.to_string(), new_schema.to_string()),
            (old_name.to_string(), old_schema.to_string()),
        );
    }

    pub fn write(&self, stream: &Stream, records: &[Record]) -> CoreResult<usize> {
        let (name, schema_name) = self.storage_identity(stream);
        let storage_stream = Stream {
            name,
            schema_name,
            ..stream.clone()
        };
        self.cache.write(&storage_stream, records)
    }

    pub fn read<'a>(&'a self, stream: &Stream) -> CoreResult<Box<dyn Iterator<Item = Record> + 'a>> {
        let (name, schema_name) = self.storage_identity(stream);
        let storage_stream = Stream {
            name,
            schema_name,
            ..stream.clone()
        };
        self.cache.read_owned(storage_stream)
    }

    pub fn size(&self, stream: &Stream) -> CoreResult<i64> {
        let (name, schema_name) = self.storage_identity(stream);
        let storage_stream = Stream {
            name,
            schema_name,
            ..stream.clone()
        };
        self.cache.size(&storage_stream)
    }

    pub fn close(&self) -> CoreResult<()> {
        self.cache.close()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::CanonicalType;

    fn base_schema() -> Schema {
        Schema::new(vec![
            ("id".into(), CanonicalType::Int64),
            ("name".into(), CanonicalType::String),
        ])
    }

    #[test]
    fn primary_field_must_exist() {
        let stream = Stream::new("events", "public", base_schema());
        assert!(stream.clone().with_primary_field("id").is_ok());
        assert!(stream.with_primary_field("missing").is_err());
    }

    #[test]
    fn bookkeeping_extends_schema_and_materializes() {
        let stream = Stream::new("events", "public", base_schema())
            .with_batch_id("batch-1")
            .unwrap();
        assert!(stream.schema().contains("batch_id"));

        let record = Record::new(vec![Value::Int64(1), Value::String("a".into())]);
        let materialized = stream.materialize_bookkeeping(record);
        assert_eq!(materialized.data.len(), 3);
        assert_eq!(materialized.data[2], Value::String("batch-1".into()));
    }

    #[test]
    fn drop_field_rejects_when_primary_field_references_it() {
        let stream = Stream::new("events", "public", base_schema())
            .with_primary_field("id")
            .unwrap();
        assert!(stream.drop_field("id").is_err());
    }

    #[test]
    fn drop_field_rejects_when_filter_references_it() {
        let stream = Stream::new("events", "public", base_schema())
            .with_filter("name", Value::String("acme".into()))
            .unwrap();
        assert!(stream.drop_field("name").is_err());
    }

    #[test]
    fn drop_field_succeeds_for_an_unreferenced_column() {
        let stream = Stream::new("events", "public", base_schema())
            .with_primary_field("id")
            .unwrap();
        let stream = stream.drop_field("name").unwrap();
        assert!(!stream.schema().contains("name"));
        assert_eq!(stream.primary_field.as_deref(), Some("id"));
    }
}
