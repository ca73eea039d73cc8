//! In-process fixture source (C5 expansion, §4.4): a deterministic 100-row
//! dataset used by `source-check`/`source-inspect` and by the seed-scenario
//! tests in §8. The row data below reproduces the reference fixture exactly
//! so FULL_REFRESH + `customer_id=Customer1` yields 29 records and the
//! `[2025-01-01T00:00Z, 2025-01-02T00:00Z)` incremental window yields 7.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{NaiveDate, TimeZone, Utc};

use rde_core::{
    Cache, CanonicalType, CoreResult, Dataset, InspectedField, InspectedStream, Mode, ModeType,
    Progress, Record, Schema, SourceConnector, Stream, Value,
};

const SCHEMA_NAME: &str = "pontoon";
const STREAM_NAME: &str = "pontoon_transfer_test";

/// One fixture row, stored compactly; `name`/`email`/`notes` are derived from
/// `id` rather than duplicated per row.
struct FixtureRow {
    id: u32,
    updated_day: u32,
    customer: &'static str,
    score: i64,
    total: f64,
    open_date: (i32, u32, u32),
    theme: &'static str,
    notifications: bool,
}

#[rustfmt::skip]
const FIXTURE: &[FixtureRow] = &[
    FixtureRow { id: 1,   updated_day: 3, customer: "Customer3", score: 9,  total: 64.66, open_date: (2024, 3, 31),  theme: "dark",  notifications: false },
    FixtureRow { id: 2,   updated_day: 3, customer: "Customer2", score: 8,  total: 79.63, open_date: (2024, 12, 29), theme: "light", notifications: false },
    FixtureRow { id: 3,   updated_day: 2, customer: "Customer3", score: 10, total: 20.63, open_date: (2024, 2, 18),  theme: "dark",  notifications: false },
    FixtureRow { id: 4,   updated_day: 4, customer: "Customer2", score: 7,  total: 18.1,  open_date: (2024, 9, 2),   theme: "light", notifications: false },
    FixtureRow { id: 5,   updated_day: 1, customer: "Customer1", score: 4,  total: 17.56, open_date: (2024, 8, 18),  theme: "light", notifications: false },
    FixtureRow { id: 6,   updated_day: 4, customer: "Customer3", score: 10, total: 63.73, open_date: (2024, 9, 28),  theme: "dark",  notifications: false },
    FixtureRow { id: 7,   updated_day: 2, customer: "Customer2", score: 2,  total: 44.05, open_date: (2024, 4, 20),  theme: "dark",  notifications: true },
    FixtureRow { id: 8,   updated_day: 3, customer: "Customer2", score: 8,  total: 41.91, open_date: (2024, 5, 22),  theme: "dark",  notifications: false },
    FixtureRow { id: 9,   updated_day: 3, customer: "Customer3", score: 9,  total: 34.32, open_date: (2024, 2, 29),  theme: "light", notifications: false },
    FixtureRow { id: 10,  updated_day: 2, customer: "Customer2", score: 10, total: 97.53, open_date: (2024, 9, 12),  theme: "dark",  notifications: true },
    FixtureRow { id: 11,  updated_day: 3, customer: "Customer1", score: 2,  total: 61.3,  open_date: (2024, 8, 23),  theme: "light", notifications: false },
    FixtureRow { id: 12,  updated_day: 1, customer: "Customer2", score: 5,  total: 66.97, open_date: (2024, 6, 12),  theme: "light", notifications: false },
    FixtureRow { id: 13,  updated_day: 2, customer: "Customer3", score: 1,  total: 59.07, open_date: (2024, 10, 21), theme: "dark",  notifications: true },
    FixtureRow { id: 14,  updated_day: 5, customer: "Customer3", score: 1,  total: 80.21, open_date: (2024, 10, 11), theme: "dark",  notifications: false },
    FixtureRow { id: 15,  updated_day: 3, customer: "Customer1", score: 10, total: 64.16, open_date: (2024, 3, 10),  theme: "light", notifications: false },
    FixtureRow { id: 16,  updated_day: 5, customer: "Customer1", score: 2,  total: 53.55, open_date: (2024, 10, 30), theme: "dark",  notifications: false },
    FixtureRow { id: 17,  updated_day: 2, customer: "Customer1", score: 9,  total: 10.62, open_date: (2024, 12, 26), theme: "dark",  notifications: false },
    FixtureRow { id: 18,  updated_day: 1, customer: "Customer3", score: 5,  total: 24.21, open_date: (2024, 12, 2),  theme: "light", notifications: false },
    FixtureRow { id: 19,  updated_day: 3, customer: "Customer1", score: 3,  total: 84.07, open_date: (2024, 1, 17),  theme: "light", notifications: false },
    FixtureRow { id: 20,  updated_day: 1, customer: "Customer2", score: 3,  total: 92.48, open_date: (2024, 5, 30),  theme: "dark",  notifications: false },
    FixtureRow { id: 21,  updated_day: 2, customer: "Customer2", score: 10, total: 71.66, open_date: (2024, 6, 1),   theme: "dark",  notifications: true },
    FixtureRow { id: 22,  updated_day: 2, customer: "Customer2", score: 10, total: 96.14, open_date: (2024, 8, 19),  theme: "dark",  notifications: true },
    FixtureRow { id: 23,  updated_day: 3, customer: "Customer2", score: 5,  total: 98.75, open_date: (2024, 1, 19),  theme: "light", notifications: false },
    FixtureRow { id: 24,  updated_day: 2, customer: "Customer1", score: 6,  total: 53.37, open_date: (2024, 7, 6),   theme: "dark",  notifications: true },
    FixtureRow { id: 25,  updated_day: 1, customer: "Customer3", score: 1,  total: 43.81, open_date: (2024, 6, 26),  theme: "light", notifications: false },
    FixtureRow { id: 26,  updated_day: 5, customer: "Customer3", score: 8,  total: 96.87, open_date: (2024, 1, 28),  theme: "dark",  notifications: true },
    FixtureRow { id: 27,  updated_day: 5, customer: "Customer3", score: 5,  total: 31.58, open_date: (2024, 6, 29),  theme: "dark",  notifications: false },
    FixtureRow { id: 28,  updated_day: 4, customer: "Customer1", score: 7,  total: 16.14, open_date: (2024, 1, 13),  theme: "dark",  notifications: true },
    FixtureRow { id: 29,  updated_day: 1, customer: "Customer3", score: 3,  total: 58.45, open_date: (2024, 6, 10),  theme: "dark",  notifications: false },
    FixtureRow { id: 30,  updated_day: 2, customer: "Customer3", score: 4,  total: 18.52, open_date: (2024, 7, 24),  theme: "dark",  notifications: true },
    FixtureRow { id: 31,  updated_day: 4, customer: "Customer1", score: 5,  total: 54.72, open_date: (2024, 8, 2),   theme: "dark",  notifications: false },
    FixtureRow { id: 32,  updated_day: 1, customer: "Customer1", score: 1,  total: 89.11, open_date: (2024, 8, 14),  theme: "dark",  notifications: true },
    FixtureRow { id: 33,  updated_day: 1, customer: "Customer1", score: 7,  total: 91.84, open_date: (2024, 8, 20),  theme: "light", notifications: false },
    FixtureRow { id: 34,  updated_day: 2, customer: "Customer2", score: 9,  total: 84.8,  open_date: (2024, 9, 30),  theme: "light", notifications: false },
    FixtureRow { id: 35,  updated_day: 4, customer: "Customer3", score: 10, total: 80.43, open_date: (2024, 1, 17),  theme: "light", notifications: false },
    FixtureRow { id: 36,  updated_day: 5, customer: "Customer3", score: 6,  total: 90.63, open_date: (2024, 7, 10),  theme: "light", notifications: true },
    FixtureRow { id: 37,  updated_day: 2, customer: "Customer1", score: 7,  total: 77.41, open_date: (2024, 3, 30),  theme: "light", notifications: true },
    FixtureRow { id: 38,  updated_day: 1, customer: "Customer2", score: 3,  total: 46.25, open_date: (2024, 12, 12), theme: "light", notifications: true },
    FixtureRow { id: 39,  updated_day: 2, customer: "Customer2", score: 6,  total: 63.13, open_date: (2024, 7, 7),   theme: "dark",  notifications: false },
    FixtureRow { id: 40,  updated_day: 5, customer: "Customer3", score: 10, total: 27.86, open_date: (2024, 12, 19), theme: "dark",  notifications: false },
    FixtureRow { id: 41,  updated_day: 1, customer: "Customer2", score: 2,  total: 61.47, open_date: (2024, 12, 2),  theme: "light", notifications: false },
    FixtureRow { id: 42,  updated_day: 1, customer: "Customer3", score: 10, total: 47.69, open_date: (2024, 10, 5),  theme: "light", notifications: false },
    FixtureRow { id: 43,  updated_day: 3, customer: "Customer2", score: 7,  total: 83.64, open_date: (2024, 7, 28),  theme: "dark",  notifications: true },
    FixtureRow { id: 44,  updated_day: 1, customer: "Customer2", score: 5,  total: 74.0,  open_date: (2024, 12, 28), theme: "light", notifications: false },
    FixtureRow { id: 45,  updated_day: 2, customer: "Customer3", score: 3,  total: 34.66, open_date: (2024, 2, 4),   theme: "light", notifications: false },
    FixtureRow { id: 46,  updated_day: 4, customer: "Customer3", score: 6,  total: 13.51, open_date: (2024, 7, 13),  theme: "light", notifications: false },
    FixtureRow { id: 47,  updated_day: 3, customer: "Customer1", score: 8,  total: 39.92, open_date: (2024, 1, 24),  theme: "dark",  notifications: false },
    FixtureRow { id: 48,  updated_day: 4, customer: "Customer1", score: 2,  total: 73.54, open_date: (2024, 4, 8),   theme: "dark",  notifications: false },
    FixtureRow { id: 49,  updated_day: 3, customer: "Customer1", score: 5,  total: 11.1,  open_date: (2024, 11, 26), theme: "light", notifications: false },
    FixtureRow { id: 50,  updated_day: 2, customer: "Customer3", score: 10, total: 44.79, open_date: (2024, 7, 29),  theme: "dark",  notifications: true },
    FixtureRow { id: 51,  updated_day: 2, customer: "Customer1", score: 1,  total: 57.32, open_date: (2024, 10, 25), theme: "dark",  notifications: true },
    FixtureRow { id: 52,  updated_day: 5, customer: "Customer3", score: 10, total: 80.22, open_date: (2024, 6, 14),  theme: "light", notifications: true },
    FixtureRow { id: 53,  updated_day: 3, customer: "Customer3", score: 4,  total: 42.95, open_date: (2024, 2, 25),  theme: "dark",  notifications: false },
    FixtureRow { id: 54,  updated_day: 1, customer: "Customer3", score: 1,  total: 96.79, open_date: (2024, 7, 15),  theme: "light", notifications: true },
    FixtureRow { id: 55,  updated_day: 3, customer: "Customer2", score: 4,  total: 89.56, open_date: (2024, 12, 5),  theme: "dark",  notifications: false },
    FixtureRow { id: 56,  updated_day: 1, customer: "Customer3", score: 6,  total: 52.15, open_date: (2024, 5, 10),  theme: "light", notifications: false },
    FixtureRow { id: 57,  updated_day: 4, customer: "Customer3", score: 10, total: 40.7,  open_date: (2024, 5, 8),   theme: "dark",  notifications: true },
    FixtureRow { id: 58,  updated_day: 2, customer: "Customer1", score: 6,  total: 96.51, open_date: (2024, 6, 23),  theme: "light", notifications: true },
    FixtureRow { id: 59,  updated_day: 3, customer: "Customer1", score: 3,  total: 22.93, open_date: (2024, 1, 26),  theme: "dark",  notifications: true },
    FixtureRow { id: 60,  updated_day: 2, customer: "Customer2", score: 5,  total: 66.02, open_date: (2024, 7, 18),  theme: "dark",  notifications: false },
    FixtureRow { id: 61,  updated_day: 1, customer: "Customer1", score: 4,  total: 33.98, open_date: (2024, 9, 26),  theme: "dark",  notifications: false },
    FixtureRow { id: 62,  updated_day: 1, customer: "Customer2", score: 6,  total: 26.83, open_date: (2024, 9, 21),  theme: "dark",  notifications: false },
    FixtureRow { id: 63,  updated_day: 1, customer: "Customer3", score: 7,  total: 58.92, open_date: (2024, 4, 12),  theme: "light", notifications: false },
    FixtureRow { id: 64,  updated_day: 3, customer: "Customer2", score: 10, total: 36.37, open_date: (2024, 12, 20), theme: "dark",  notifications: true },
    FixtureRow { id: 65,  updated_day: 1, customer: "Customer3", score: 9,  total: 59.98, open_date: (2024, 12, 7),  theme: "dark",  notifications: true },
    FixtureRow { id: 66,  updated_day: 5, customer: "Customer3", score: 3,  total: 43.79, open_date: (2024, 10, 19), theme: "light", notifications: true },
    FixtureRow { id: 67,  updated_day: 4, customer: "Customer1", score: 8,  total: 29.1,  open_date: (2024, 2, 24),  theme: "dark",  notifications: true },
    FixtureRow { id: 68,  updated_day: 1, customer: "Customer3", score: 3,  total: 91.13, open_date: (2024, 10, 12), theme: "light", notifications: true },
    FixtureRow { id: 69,  updated_day: 2, customer: "Customer1", score: 2,  total: 87.22, open_date: (2024, 3, 4),   theme: "dark",  notifications: true },
    FixtureRow { id: 70,  updated_day: 1, customer: "Customer2", score: 3,  total: 69.95, open_date: (2024, 6, 7),   theme: "dark",  notifications: true },
    FixtureRow { id: 71,  updated_day: 4, customer: "Customer2", score: 2,  total: 41.44, open_date: (2024, 5, 12),  theme: "dark",  notifications: true },
    FixtureRow { id: 72,  updated_day: 5, customer: "Customer3", score: 1,  total: 91.61, open_date: (2024, 6, 4),   theme: "light", notifications: true },
    FixtureRow { id: 73,  updated_day: 2, customer: "Customer3", score: 2,  total: 15.23, open_date: (2024, 2, 14),  theme: "light", notifications: false },
    FixtureRow { id: 74,  updated_day: 5, customer: "Customer2", score: 8,  total: 96.08, open_date: (2024, 4, 9),   theme: "light", notifications: true },
    FixtureRow { id: 75,  updated_day: 2, customer: "Customer2", score: 4,  total: 76.82, open_date: (2024, 9, 17),  theme: "dark",  notifications: true },
    FixtureRow { id: 76,  updated_day: 5, customer: "Customer3", score: 2,  total: 85.73, open_date: (2024, 12, 28), theme: "light", notifications: true },
    FixtureRow { id: 77,  updated_day: 5, customer: "Customer3", score: 4,  total: 42.4,  open_date: (2024, 3, 10),  theme: "dark",  notifications: true },
    FixtureRow { id: 78,  updated_day: 2, customer: "Customer3", score: 8,  total: 65.35, open_date: (2024, 4, 23),  theme: "dark",  notifications: true },
    FixtureRow { id: 79,  updated_day: 4, customer: "Customer1", score: 5,  total: 81.81, open_date: (2024, 11, 8),  theme: "dark",  notifications: false },
    FixtureRow { id: 80,  updated_day: 1, customer: "Customer2", score: 4,  total: 92.34, open_date: (2024, 9, 3),   theme: "dark",  notifications: true },
    FixtureRow { id: 81,  updated_day: 3, customer: "Customer2", score: 3,  total: 52.4,  open_date: (2024, 1, 28),  theme: "dark",  notifications: false },
    FixtureRow { id: 82,  updated_day: 4, customer: "Customer2", score: 1,  total: 16.41, open_date: (2024, 4, 15),  theme: "light", notifications: true },
    FixtureRow { id: 83,  updated_day: 3, customer: "Customer1", score: 6,  total: 70.29, open_date: (2024, 8, 2),   theme: "light", notifications: false },
    FixtureRow { id: 84,  updated_day: 2, customer: "Customer1", score: 6,  total: 39.54, open_date: (2024, 12, 12), theme: "light", notifications: true },
    FixtureRow { id: 85,  updated_day: 1, customer: "Customer1", score: 1,  total: 55.65, open_date: (2024, 10, 18), theme: "light", notifications: false },
    FixtureRow { id: 86,  updated_day: 1, customer: "Customer3", score: 4,  total: 77.6,  open_date: (2024, 9, 24),  theme: "light", notifications: false },
    FixtureRow { id: 87,  updated_day: 3, customer: "Customer3", score: 1,  total: 81.69, open_date: (2024, 5, 12),  theme: "dark",  notifications: true },
    FixtureRow { id: 88,  updated_day: 1, customer: "Customer2", score: 1,  total: 34.37, open_date: (2024, 4, 6),   theme: "light", notifications: true },
    FixtureRow { id: 89,  updated_day: 3, customer: "Customer3", score: 3,  total: 31.57, open_date: (2024, 12, 27), theme: "dark",  notifications: true },
    FixtureRow { id: 90,  updated_day: 3, customer: "Customer2", score: 5,  total: 73.71, open_date: (2024, 6, 1),   theme: "light", notifications: false },
    FixtureRow { id: 91,  updated_day: 1, customer: "Customer1", score: 9,  total: 12.74, open_date: (2024, 12, 17), theme: "light", notifications: false },
    FixtureRow { id: 92,  updated_day: 1, customer: "Customer2", score: 6,  total: 90.76, open_date: (2024, 1, 2),   theme: "light", notifications: false },
    FixtureRow { id: 93,  updated_day: 1, customer: "Customer1", score: 8,  total: 49.29, open_date: (2024, 9, 13),  theme: "light", notifications: false },
    FixtureRow { id: 94,  updated_day: 3, customer: "Customer3", score: 8,  total: 22.58, open_date: (2024, 6, 20),  theme: "dark",  notifications: false },
    FixtureRow { id: 95,  updated_day: 4, customer: "Customer2", score: 3,  total: 81.34, open_date: (2024, 4, 12),  theme: "light", notifications: false },
    FixtureRow { id: 96,  updated_day: 3, customer: "Customer3", score: 10, total: 47.45, open_date: (2024, 1, 1),   theme: "dark",  notifications: false },
    FixtureRow { id: 97,  updated_day: 5, customer: "Customer1", score: 8,  total: 85.96, open_date: (2024, 10, 31), theme: "light", notifications: true },
    FixtureRow { id: 98,  updated_day: 1, customer: "Customer3", score: 6,  total: 68.55, open_date: (2024, 8, 16),  theme: "light", notifications: true },
    FixtureRow { id: 99,  updated_day: 5, customer: "Customer2", score: 9,  total: 39.18, open_date: (2024, 1, 29),  theme: "light", notifications: false },
    FixtureRow { id: 100, updated_day: 4, customer: "Customer1", score: 9,  total: 35.7,  open_date: (2024, 8, 1),   theme: "light", notifications: false },
];

fn fixture_schema() -> Schema {
    Schema::new(vec![
        ("id".into(), CanonicalType::String),
        ("created_at".into(), CanonicalType::TimestampUtc),
        ("updated_at".into(), CanonicalType::TimestampUtc),
        ("customer_id".into(), CanonicalType::String),
        ("name".into(), CanonicalType::String),
        ("email".into(), CanonicalType::String),
        ("score".into(), CanonicalType::Int64),
        ("total".into(), CanonicalType::Float64),
        ("open_date".into(), CanonicalType::Date),
        ("prefs".into(), CanonicalType::String),
        ("notes".into(), CanonicalType::String),
    ])
}

/// Builds the canonical `pontoon_transfer_test` stream with no bookkeeping
/// columns attached; callers add filters/bookkeeping via the `Stream`
/// mutators before passing it to `read`.
pub fn fixture_stream() -> Stream {
    Stream::new(STREAM_NAME, SCHEMA_NAME, fixture_schema())
}

fn fixture_row_values(row: &FixtureRow) -> HashMap<&'static str, Value> {
    let created_at = Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap();
    let updated_at = Utc
        .with_ymd_and_hms(2025, 1, row.updated_day, 0, 0, 0)
        .unwrap();
    let (y, m, d) = row.open_date;
    let open_date = NaiveDate::from_ymd_opt(y, m, d).unwrap();
    let prefs = format!(
        "{{\"theme\":\"{}\",\"notifications\":{}}}",
        row.theme, row.notifications
    );

    let mut values = HashMap::new();
    values.insert("id", Value::String(row.id.to_string()));
    values.insert("created_at", Value::TimestampUtc(created_at));
    values.insert("updated_at", Value::TimestampUtc(updated_at));
    values.insert("customer_id", Value::String(row.customer.to_string()));
    values.insert("name", Value::String(format!("User{}", row.id)));
    values.insert(
        "email",
        Value::String(format!("user{}@example.com", row.id)),
    );
    values.insert("score", Value::Int64(row.score));
    values.insert("total", Value::Float64(row.total));
    values.insert("open_date", Value::Date(open_date));
    values.insert("prefs", Value::String(prefs));
    values.insert("notes", Value::String(format!("Notes for User{}", row.id)));
    values
}

/// Applies a stream's declared filters, then (for INCREMENTAL mode) a window
/// filter on `updated_at` specifically — even if the stream's `cursor_field`
/// names a different column, matching the reference fixture's behaviour.
fn row_matches(values: &HashMap<&'static str, Value>, stream: &Stream, mode: &Mode) -> bool {
    for (field, expected) in stream.filters() {
        if values.get(field.as_str()) != Some(expected) {
            return false;
        }
    }
    if mode.mode_type == ModeType::Incremental {
        let (Some(start), Some(end)) = (mode.start, mode.end) else {
            return true;
        };
        if let Some(Value::TimestampUtc(updated_at)) = values.get("updated_at") {
            return *updated_at >= start && *updated_at < end;
        }
    }
    true
}

/// Projects the full fixture row onto a stream's (possibly trimmed) schema,
/// then appends that stream's bookkeeping columns in declaration order.
fn project(values: &HashMap<&'static str, Value>, stream: &Stream) -> Record {
    let bookkeeping_names: Vec<&str> =
        stream.bookkeeping().iter().map(|(n, _)| n.as_str()).collect();
    let mut data = Vec::with_capacity(stream.schema().len());
    for name in stream.schema().names() {
        if bookkeeping_names.contains(&name.as_str()) {
            continue;
        }
        data.push(values.get(name.as_str()).cloned().unwrap_or(Value::Null));
    }
    stream.materialize_bookkeeping(Record::new(data))
}

/// A `SourceConnector` backed entirely by the in-process fixture above; no
/// network or filesystem access (§4.4 "Memory source").
pub struct MemorySource {
    namespace: String,
    batch_id: String,
}

impl MemorySource {
    pub fn new(namespace: impl Into<String>) -> Self {
        let dt = Utc::now();
        Self {
            namespace: namespace.into(),
            batch_id: dt.timestamp_millis().to_string(),
        }
    }
}

#[async_trait]
impl SourceConnector for MemorySource {
    async fn test_connect(&self) -> CoreResult<()> {
        Ok(())
    }

    async fn inspect_streams(&self) -> CoreResult<Vec<InspectedStream>> {
        let schema = fixture_schema();
        Ok(vec![InspectedStream {
            schema_name: SCHEMA_NAME.to_string(),
            stream_name: STREAM_NAME.to_string(),
            fields: schema
                .fields()
                .iter()
                .map(|(name, ty)| InspectedField {
                    name: name.clone(),
                    ty: *ty,
                })
                .collect(),
        }])
    }

    async fn read(
        &self,
        streams: Vec<Stream>,
        mode: &Mode,
        cache: Arc<dyn Cache>,
        progress: Option<Arc<Progress>>,
    ) -> CoreResult<Dataset> {
        for stream in &streams {
            if stream.name != STREAM_NAME || stream.schema_name != SCHEMA_NAME {
                continue;
            }
            let matched: Vec<Record> = FIXTURE
                .iter()
                .map(fixture_row_values)
                .filter(|values| row_matches(values, stream, mode))
                .map(|values| project(&values, stream))
                .collect();

            if let Some(p) = &progress {
                p.set_total(matched.len() as i64);
            }
            cache.write(stream, &matched)?;
            if let Some(p) = &progress {
                p.advance(matched.len() as i64);
            }
        }

        Ok(Dataset::new(
            self.namespace.clone(),
            streams,
            cache,
            self.batch_id.clone(),
            Utc::now(),
        ))
    }

    async fn close(&self) -> CoreResult<()> {
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::cache_memory::MemoryCache;

    fn customer1_stream() -> Stream {
        fixture_stream()
            .with_filter("customer_id", Value::String("Customer1".into()))
            .unwrap()
    }

    #[tokio::test]
    async fn full_refresh_customer1_yields_29_records() {
        let source = MemorySource::new("memory");
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let mode = Mode::full_refresh();
        let stream = customer1_stream();

        let dataset = source
            .read(vec![stream.clone()], &mode, cache, None)
            .await
            .unwrap();

        assert_eq!(dataset.size(&stream).unwrap(), 29);
    }

    #[tokio::test]
    async fn incremental_window_customer1_yields_7_records() {
        let source = MemorySource::new("memory");
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let mode = Mode {
            mode_type: ModeType::Incremental,
            period: None,
            start: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            end: Some(Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()),
        };
        let stream = customer1_stream();

        let dataset = source
            .read(vec![stream.clone()], &mode, cache, None)
            .await
            .unwrap();

        assert_eq!(dataset.size(&stream).unwrap(), 7);
    }

    #[tokio::test]
    async fn incremental_filters_on_updated_at_even_with_different_cursor_field() {
        let source = MemorySource::new("memory");
        let cache: Arc<dyn Cache> = Arc::new(MemoryCache::new());
        let mode = Mode {
            mode_type: ModeType::Incremental,
            period: None,
            start: Some(Utc.with_ymd_and_hms(2025, 1, 1, 0, 0, 0).unwrap()),
            end: Some(Utc.with_ymd_and_hms(2025, 1, 2, 0, 0, 0).unwrap()),
        };
        let stream = customer1_stream().with_cursor_field("created_at").unwrap();

        let dataset = source
            .read(vec![stream.clone()], &mode, cache, None)
            .await
            .unwrap();

        // every row's created_at is 2025-01-01, so a (wrong) cursor_field-based
        // filter would keep all 29; the correct updated_at filter keeps 7.
        assert_eq!(dataset.size(&stream).unwrap(), 7);
    }

    #[tokio::test]
    async fn inspect_streams_reports_single_fixture_stream() {
        let source = MemorySource::new("memory");
        let streams = source.inspect_streams().await.unwrap();
        assert_eq!(streams.len(), 1);
        assert_eq!(streams[0].stream_name, STREAM_NAME);
        assert_eq!(streams[0].fields.len(), 11);
    }
}
