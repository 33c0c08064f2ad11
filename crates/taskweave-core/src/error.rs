use std::fmt;

use crate::event::types::{AggregateType, UnknownEventType};
use crate::graph::cycles::CycleError;

/// Machine-readable error codes for callers that branch on failure kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    NotInitialized,
    ConfigParseError,
    InvalidInput,
    AggregateNotFound,
    CycleDetected,
    UnknownEventType,
    CorruptPayload,
    StorageFailure,
    LockContention,
    InternalUnexpected,
}

impl ErrorCode {
    /// Stable code identifier (`E####`) for machine parsing.
    #[must_use]
    pub const fn code(self) -> &'static str {
        match self {
            Self::NotInitialized => "E1001",
            Self::ConfigParseError => "E1002",
            Self::InvalidInput => "E2001",
            Self::AggregateNotFound => "E2002",
            Self::CycleDetected => "E2003",
            Self::UnknownEventType => "E3001",
            Self::CorruptPayload => "E3002",
            Self::StorageFailure => "E5001",
            Self::LockContention => "E5002",
            Self::InternalUnexpected => "E9001",
        }
    }

    /// Short human-facing summary for logs and terminal output.
    #[must_use]
    pub const fn message(self) -> &'static str {
        match self {
            Self::NotInitialized => "Tracker not initialized",
            Self::ConfigParseError => "Config file parse error",
            Self::InvalidInput => "Invalid input",
            Self::AggregateNotFound => "Referenced aggregate not found",
            Self::CycleDetected => "Dependency cycle would be created",
            Self::UnknownEventType => "Unknown event type in event log",
            Self::CorruptPayload => "Event payload could not be decoded",
            Self::StorageFailure => "Storage transaction failed",
            Self::LockContention => "Lock contention",
            Self::InternalUnexpected => "Internal unexpected error",
        }
    }

    /// Optional remediation hint that can be surfaced to operators.
    #[must_use]
    pub const fn hint(self) -> Option<&'static str> {
        match self {
            Self::NotInitialized => Some("Run `tw init` to initialize this directory."),
            Self::ConfigParseError => Some("Fix syntax in .taskweave/config.toml and retry."),
            Self::InvalidInput | Self::AggregateNotFound => None,
            Self::CycleDetected => Some("Remove/adjust dependencies to keep the graph acyclic."),
            Self::UnknownEventType | Self::CorruptPayload => {
                Some("The event log was written by a newer or corrupted build; do not rebuild from it.")
            }
            Self::StorageFailure => Some("Check disk space and write permissions."),
            Self::LockContention => Some("Retry after the other writer releases the database."),
            Self::InternalUnexpected => Some("Retry once. If persistent, report a bug with logs."),
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.code())
    }
}

/// Errors produced by the engine.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// Missing or malformed input. Raised before any transaction begins.
    #[error("invalid {field}: {reason}")]
    Validation { field: &'static str, reason: String },

    /// A referenced parent aggregate does not exist.
    #[error("{kind} '{id}' not found")]
    NotFound { kind: AggregateType, id: String },

    /// A dependency addition would close a cycle.
    #[error(transparent)]
    Cycle(#[from] CycleError),

    /// Transaction or constraint failure.
    #[error("storage error: {0}")]
    Storage(#[from] rusqlite::Error),

    /// Event payload or JSON column could not be encoded/decoded.
    #[error("payload encode/decode error: {0}")]
    Payload(#[from] serde_json::Error),

    /// An event row carries a type this build does not know.
    #[error(transparent)]
    UnknownEventType(#[from] UnknownEventType),

    /// The store mutex was poisoned by a panicking writer.
    #[error("store lock poisoned")]
    LockPoisoned,
}

impl Error {
    pub(crate) fn validation(field: &'static str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field,
            reason: reason.into(),
        }
    }

    /// Machine-readable code associated with this error.
    #[must_use]
    pub fn code(&self) -> ErrorCode {
        match self {
            Self::Validation { .. } => ErrorCode::InvalidInput,
            Self::NotFound { .. } => ErrorCode::AggregateNotFound,
            Self::Cycle(_) => ErrorCode::CycleDetected,
            Self::Storage(rusqlite::Error::SqliteFailure(err, _))
                if matches!(
                    err.code,
                    rusqlite::ErrorCode::DatabaseBusy | rusqlite::ErrorCode::DatabaseLocked
                ) =>
            {
                ErrorCode::LockContention
            }
            Self::Storage(_) => ErrorCode::StorageFailure,
            Self::Payload(_) => ErrorCode::CorruptPayload,
            Self::UnknownEventType(_) => ErrorCode::UnknownEventType,
            Self::LockPoisoned => ErrorCode::InternalUnexpected,
        }
    }

    /// Returns `true` for the dependency-cycle rejection.
    #[must_use]
    pub const fn is_cycle(&self) -> bool {
        matches!(self, Self::Cycle(_))
    }
}

/// Engine result alias.
pub type Result<T, E = Error> = std::result::Result<T, E>;
