//! Volatile cache backend (§4.2 expansion): a `HashMap` with no filesystem
//! footprint, used by unit/seed-scenario tests and by `source-inspect`/
//! `source-check` which never need spill.

use std::collections::HashMap;
use std::sync::Mutex;

use rde_core::{Cache, CoreResult, Record, Stream};

#[derive(Default)]
pub struct MemoryCache {
    data: Mutex<HashMap<(String, String), Vec<Record>>>,
}

impl MemoryCache {
    pub fn new() -> Self {
        Self::default()
    }

    fn key(stream: &Stream) -> (String, String) {
        (stream.schema_name.clone(), stream.name.clone())
    }
}

impl Cache for MemoryCache {
    fn write(&self, stream: &Stream, records: &[Record]) -> CoreResult<usize> {
        let mut data = self.data.lock().unwrap();
        let entry = data.entry(Self::key(stream)).or_default();
        entry.extend_from_slice(records);
        Ok(records.len())
    }

    fn read_owned<'a>(
        &'a self,
        stream: Stream,
    ) -> CoreResult<Box<dyn Iterator<Item = Record> + 'a>> {
        let data = self.data.lock().unwrap();
        let records = data.get(&Self::key(&stream)).cloned().unwrap_or_default();
        Ok(Box::new(records.into_iter()))
    }

    fn size(&self, stream: &Stream) -> CoreResult<i64> {
        let data = self.data.lock().unwrap();
        Ok(data.get(&Self::key(stream)).map(|v| v.len()).unwrap_or(0) as i64)
    }

    fn close(&self) -> CoreResult<()> {
        self.data.lock().unwrap().clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rde_core::{CanonicalType, Schema, Value};

    fn stream() -> Stream {
        Stream::new(
            "events",
            "public",
            Schema::new(vec![("id".into(), CanonicalType::Int64)]),
        )
    }

    #[test]
    fn write_then_read_round_trips_in_order() {
        let cache = MemoryCache::new();
        let s = stream();
        let records = vec![
            Record::new(vec![Value::Int64(1)]),
            Record::new(vec![Value::Int64(2)]),
        ];
        let written = cache.write(&s, &records).unwrap();
        assert_eq!(written, 2);
        assert_eq!(cache.size(&s).unwrap(), 2);
        let read: Vec<_> = cache.read_owned(s).unwrap().collect();
        assert_eq!(read, records);
    }
}
