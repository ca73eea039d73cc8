//! # RDE Core - multi-tenant data-transfer engine, core abstractions
//!
//! This crate provides the foundational types, traits, and error taxonomy
//! shared by every connector and by the orchestration layer of the transfer
//! runtime: the canonical type bridge, the Stream/Record/Dataset data model,
//! the Cache contract, the progress tracker, the Source/Destination/
//! IntegrityChecker traits, connection info, and the replication-mode
//! resolver. It contains no I/O — concrete connectors and cache backends
//! live in `rde-io`; orchestration (transfer command, scheduler client,
//! worker) lives in `rde-orchestration`.

pub mod cache;
pub mod connection;
pub mod connector;
pub mod error;
pub mod mode;
pub mod progress;
pub mod stream;
pub mod transfer_run;
pub mod types;

pub use cache::Cache;
pub use connection::{ConnectionInfo, ObjectLayout, ParquetCompression, VendorType};
pub use connector::{
    DestinationConnector, InspectedField, InspectedStream, IntegrityChecker,
    NoopIntegrityChecker, SourceConnector, SYSTEM_SCHEMAS,
};
pub use error::{CoreError, CoreResult, ErrorCode};
pub use mode::{detect_run_gap, resolve_mode, Frequency, Mode, ModeType, ModeWarning, Schedule};
pub use progress::{Progress, ProgressCallback, ProgressReport, ProgressSnapshot};
pub use stream::{Bookkeeping, Dataset, Record, Stream, Value};
pub use transfer_run::{RunMeta, RunOutput, RunStatus, TransferRun};
pub use types::{schemas_compatible, CanonicalType, Schema};
