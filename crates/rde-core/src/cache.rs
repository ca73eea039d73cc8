//! Cache contract (C3, §4.2). Concrete backends live in `rde-io`.

use crate::error::CoreResult;
use crate::stream::{Record, Stream};

/// A per-run, namespace-scoped durable store mapping `(schema_name, name)` to
/// an ordered sequence of records.
///
/// Implementations must be safe to share behind an `Arc` (single-writer per
/// stream, multiple concurrent readers over distinct streams) and must
/// preserve canonical types verbatim through a write→read cycle — in
/// particular bool/date/timestamp must never silently widen to int/string on
/// the way back out.
pub trait Cache: Send + Sync {
    /// Appends records in order; returns the number of records written.
    fn write(&self, stream: &Stream, records: &[Record]) -> CoreResult<usize>;

    /// Returns a lazy, insertion-ordered sequence of every record ever
    /// written for `stream`. Takes the stream by value because backends hand
    /// back an iterator borrowing `self`, not `stream`.
    fn read_owned<'a>(&'a self, stream: Stream) -> CoreResult<Box<dyn Iterator<Item = Record> + 'a>>;

    /// O(1) exact record count for `stream`.
    fn size(&self, stream: &Stream) -> CoreResult<i64>;

    /// Releases file handles and removes temporary state.
    fn close(&self) -> CoreResult<()>;
}
