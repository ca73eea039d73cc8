//! The canonical analytical type system (§4.1) that every source and
//! destination dialect is translated through.

use std::collections::HashMap;

use datafusion::arrow::datatypes::{DataType, TimeUnit};
use serde::{Deserialize, Serialize};

/// A canonical column type. Every source dialect maps into this set on read;
/// every destination dialect maps out of it on write.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CanonicalType {
    Int64,
    Float64,
    String,
    Binary,
    Bool,
    Date,
    Time,
    TimestampUtc,
}

impl CanonicalType {
    /// The Arrow type used to represent this column inside the cache.
    pub fn arrow_type(&self) -> DataType {
        match self {
            CanonicalType::Int64 => DataType::Int64,
            CanonicalType::Float64 => DataType::Float64,
            CanonicalType::String => DataType::Utf8,
            CanonicalType::Binary => DataType::Binary,
            CanonicalType::Bool => DataType::Boolean,
            CanonicalType::Date => DataType::Date32,
            CanonicalType::Time => DataType::Time64(TimeUnit::Microsecond),
            CanonicalType::TimestampUtc => {
                DataType::Timestamp(TimeUnit::Microsecond, Some("UTC".into()))
            }
        }
    }

    /// Best-effort reverse mapping, used when comparing an existing
    /// destination table's introspected Arrow schema back to canonical types.
    pub fn from_arrow_type(dt: &DataType) -> Option<CanonicalType> {
        match dt {
            DataType::Int8
            | DataType::Int16
            | DataType::Int32
            | DataType::Int64
            | DataType::UInt8
            | DataType::UInt16
            | DataType::UInt32
            | DataType::UInt64 => Some(CanonicalType::Int64),
            DataType::Float16 | DataType::Float32 | DataType::Float64 => {
                Some(CanonicalType::Float64)
            }
            DataType::Utf8 | DataType::LargeUtf8 => Some(CanonicalType::String),
            DataType::Binary | DataType::LargeBinary => Some(CanonicalType::Binary),
            DataType::Boolean => Some(CanonicalType::Bool),
            DataType::Date32 | DataType::Date64 => Some(CanonicalType::Date),
            DataType::Time32(_) | DataType::Time64(_) => Some(CanonicalType::Time),
            DataType::Timestamp(_, _) => Some(CanonicalType::TimestampUtc),
            _ => None,
        }
    }

    /// Generic destination DDL fragment for `CREATE TABLE`. Vendor destinations
    /// may override individual entries (e.g. Redshift spells `BIGINT` the same
    /// way but Snowflake prefers `NUMBER`); this is the fallback every generic
    /// `CREATE TABLE IF NOT EXISTS` path uses.
    pub fn generic_ddl(&self) -> &'static str {
        match self {
            CanonicalType::Int64 => "BIGINT",
            CanonicalType::Float64 => "FLOAT",
            CanonicalType::String => "TEXT",
            CanonicalType::Binary => "TEXT",
            CanonicalType::Bool => "BOOLEAN",
            CanonicalType::Date => "DATE",
            CanonicalType::Time => "TIME",
            CanonicalType::TimestampUtc => "TIMESTAMP WITH TIME ZONE",
        }
    }

    /// Maps a source dialect's type name (upper-cased, parameters stripped)
    /// plus an optional NUMERIC scale to a canonical type. Unknown names fall
    /// back to `String`, matching the original's "serialise to JSON string"
    /// catch-all for anything not explicitly covered.
    pub fn from_sql_type_name(name: &str, numeric_scale: Option<i32>) -> CanonicalType {
        match name.to_ascii_uppercase().as_str() {
            "INT" | "INTEGER" | "BIGINT" | "SMALLINT" => CanonicalType::Int64,
            "NUMERIC" | "DECIMAL" => match numeric_scale {
                Some(0) => CanonicalType::Int64,
                _ => CanonicalType::Float64,
            },
            "FLOAT" | "DOUBLE" | "DOUBLE PRECISION" | "REAL" => CanonicalType::Float64,
            "VARCHAR" | "TEXT" | "CHAR" | "JSON" | "JSONB" | "UUID" => CanonicalType::String,
            "BYTEA" | "BINARY" | "VARBINARY" => CanonicalType::Binary,
            "BOOLEAN" | "BOOL" => CanonicalType::Bool,
            "DATE" => CanonicalType::Date,
            "TIME" => CanonicalType::Time,
            "TIMESTAMP" | "TIMESTAMPTZ" | "TIMESTAMP_LTZ" | "TIMESTAMP_NTZ" | "TIMESTAMP_TZ" => {
                CanonicalType::TimestampUtc
            }
            _ => CanonicalType::String,
        }
    }
}

/// An ordered schema: field name paired with its canonical type.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Schema {
    fields: Vec<(String, CanonicalType)>,
}

impl Schema {
    pub fn new(fields: Vec<(String, CanonicalType)>) -> Self {
        Self { fields }
    }

    pub fn names(&self) -> Vec<String> {
        self.fields.iter().map(|(n, _)| n.clone()).collect()
    }

    pub fn types(&self) -> Vec<CanonicalType> {
        self.fields.iter().map(|(_, t)| *t).collect()
    }

    pub fn fields(&self) -> &[(String, CanonicalType)] {
        &self.fields
    }

    pub fn len(&self) -> usize {
        self.fields.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fields.is_empty()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.fields.iter().any(|(n, _)| n == name)
    }

    pub fn type_of(&self, name: &str) -> Option<CanonicalType> {
        self.fields.iter().find(|(n, _)| n == name).map(|(_, t)| *t)
    }

    pub fn index_of(&self, name: &str) -> Option<usize> {
        self.fields.iter().position(|(n, _)| n == name)
    }

    pub fn push(&mut self, name: impl Into<String>, ty: CanonicalType) {
        self.fields.push((name.into(), ty));
    }

    pub fn drop_field(&mut self, name: &str) {
        self.fields.retain(|(n, _)| n != name);
    }

    /// Translate this schema to a DataFusion/Arrow schema for cache storage.
    pub fn to_arrow(&self) -> datafusion::arrow::datatypes::Schema {
        let arrow_fields: Vec<datafusion::arrow::datatypes::Field> = self
            .fields
            .iter()
            .map(|(name, ty)| datafusion::arrow::datatypes::Field::new(name, ty.arrow_type(), true))
            .collect();
        datafusion::arrow::datatypes::Schema::new(arrow_fields)
    }
}

/// Order-insensitive schema compatibility (§4.1, §8 testable property).
///
/// Two schemas are compatible iff they carry the same set of field names with
/// the same canonical type, regardless of declaration order.
pub fn schemas_compatible(a: &Schema, b: &Schema) -> bool {
    let a_map: HashMap<&str, CanonicalType> =
        a.fields().iter().map(|(n, t)| (n.as_str(), *t)).collect();
    let b_map: HashMap<&str, CanonicalType> =
        b.fields().iter().map(|(n, t)| (n.as_str(), *t)).collect();

    if a_map.len() != b_map.len() {
        return false;
    }

    a_map
        .iter()
        .all(|(name, ty)| b_map.get(name) == Some(ty))
}

#[cfg(test)]
mod tests {
    use super::*;

    fn schema(fields: &[(&str, CanonicalType)]) -> Schema {
        Schema::new(fields.iter().map(|(n, t)| (n.to_string(), *t)).collect())
    }

    #[test]
    fn compatible_ignores_order() {
        let a = schema(&[("id", CanonicalType::Int64), ("name", CanonicalType::String)]);
        let b = schema(&[("name", CanonicalType::String), ("id", CanonicalType::Int64)]);
        assert!(schemas_compatible(&a, &b));
    }

    #[test]
    fn incompatible_on_missing_field() {
        let a = schema(&[("id", CanonicalType::Int64), ("name", CanonicalType::String)]);
        let b = schema(&[("id", CanonicalType::Int64)]);
        assert!(!schemas_compatible(&a, &b));
    }

    #[test]
    fn incompatible_on_retype() {
        let a = schema(&[("id", CanonicalType::Int64)]);
        let b = schema(&[("id", CanonicalType::String)]);
        assert!(!schemas_compatible(&a, &b));
    }

    #[test]
    fn numeric_scale_zero_is_int64() {
        assert_eq!(
            CanonicalType::from_sql_type_name("NUMERIC", Some(0)),
            CanonicalType::Int64
        );
        assert_eq!(
            CanonicalType::from_sql_type_name("NUMERIC", Some(2)),
            CanonicalType::Float64
        );
    }
}
