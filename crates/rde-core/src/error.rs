//! Error taxonomy shared by every connector and by the orchestration layer.
//!
//! Each variant maps 1:1 onto a disposition (retriable or not) so the worker's
//! retry decision is a single match on the error value, never re-derived at
//! the call site.

use thiserror::Error;

/// Machine-readable error code carried in a terminal `TransferRun.output.error`.
///
/// Stable strings: the control plane and any dashboards built on top of it
/// key off these, so renaming a variant's `Display` output is a breaking change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    SourceConnectionFailed,
    SourceStreamDoesNotExist,
    SourceStreamInvalidSchema,
    StreamMissingField,
    DestinationConnectionFailed,
    DestinationStreamInvalidSchema,
    IntegrityCheckFailed,
    RunGapDetected,
    Unknown,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::SourceConnectionFailed => "SourceConnectionFailed",
            ErrorCode::SourceStreamDoesNotExist => "SourceStreamDoesNotExist",
            ErrorCode::SourceStreamInvalidSchema => "SourceStreamInvalidSchema",
            ErrorCode::StreamMissingField => "StreamMissingField",
            ErrorCode::DestinationConnectionFailed => "DestinationConnectionFailed",
            ErrorCode::DestinationStreamInvalidSchema => "DestinationStreamInvalidSchema",
            ErrorCode::IntegrityCheckFailed => "IntegrityCheckFailed",
            ErrorCode::RunGapDetected => "RunGapDetected",
            ErrorCode::Unknown => "Unknown",
        }
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// The error taxonomy for the transfer runtime (§7 of the design).
#[derive(Debug, Error)]
pub enum CoreError {
    #[error("failed to connect to source: {0}")]
    SourceConnectionFailed(String),

    #[error("source stream does not exist: {schema}.{name}")]
    SourceStreamDoesNotExist { schema: String, name: String },

    #[error("source stream {schema}.{name} has an invalid schema: {reason}")]
    SourceStreamInvalidSchema {
        schema: String,
        name: String,
        reason: String,
    },

    #[error("stream {stream} references unknown field {field}")]
    StreamMissingField { stream: String, field: String },

    #[error("failed to connect to destination: {0}")]
    DestinationConnectionFailed(String),

    #[error("destination stream {schema}.{name} schema is incompatible: {reason}")]
    DestinationStreamInvalidSchema {
        schema: String,
        name: String,
        reason: String,
    },

    #[error("integrity check failed for {entity}: wrote {written}, expected {expected}")]
    IntegrityCheckFailed {
        entity: String,
        written: i64,
        expected: i64,
    },

    #[error("run gap detected: last successful run at {last_run_at} precedes window start {window_start}")]
    RunGapDetected {
        last_run_at: chrono::DateTime<chrono::Utc>,
        window_start: chrono::DateTime<chrono::Utc>,
    },

    #[error(transparent)]
    Unknown(#[from] anyhow::Error),
}

impl CoreError {
    /// Whether the worker's retry policy should re-attempt this failure.
    ///
    /// Mirrors §7: only connection failures and genuinely unclassified
    /// errors are retriable; every other taxonomy member is a data or
    /// configuration problem that a retry cannot fix.
    pub fn retriable(&self) -> bool {
        matches!(
            self,
            CoreError::SourceConnectionFailed(_)
                | CoreError::DestinationConnectionFailed(_)
                | CoreError::Unknown(_)
        )
    }

    pub fn code(&self) -> ErrorCode {
        match self {
            CoreError::SourceConnectionFailed(_) => ErrorCode::SourceConnectionFailed,
            CoreError::SourceStreamDoesNotExist { .. } => ErrorCode::SourceStreamDoesNotExist,
            CoreError::SourceStreamInvalidSchema { .. } => ErrorCode::SourceStreamInvalidSchema,
            CoreError::StreamMissingField { .. } => ErrorCode::StreamMissingField,
            CoreError::DestinationConnectionFailed(_) => ErrorCode::DestinationConnectionFailed,
            CoreError::DestinationStreamInvalidSchema { .. } => {
                ErrorCode::DestinationStreamInvalidSchema
            }
            CoreError::IntegrityCheckFailed { .. } => ErrorCode::IntegrityCheckFailed,
            CoreError::RunGapDetected { .. } => ErrorCode::RunGapDetected,
            CoreError::Unknown(_) => ErrorCode::Unknown,
        }
    }
}

pub type CoreResult<T> = std::result::Result<T, CoreError>;
