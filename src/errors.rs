// Copyright (c) 2025 - Cowboy AI, Inc.
//! Error types for command execution
//!
//! Every business failure carries a stable [`ErrorKind`] plus an error id and a
//! localizable message key, so callers can branch on the kind without parsing
//! message text.

use thiserror::Error;

use crate::events::AggregateType;

/// Machine-readable failure class
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorKind {
    InvalidArgument,
    NotFound,
    AlreadyExists,
    PreconditionFailed,
    PermissionDenied,
    Unimplemented,
    Conflict,
    DeadlineExceeded,
    Internal,
}

/// Message key used by explicit change commands when nothing differs
pub const NOT_CHANGED_KEY: &str = "Errors.NoChangesFound";

/// Errors returned by commands
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CommandError {
    /// Malformed input, detected before any I/O
    #[error("invalid argument [{id}]: {key}")]
    InvalidArgument { id: &'static str, key: &'static str },

    /// Referenced object does not exist or is in a terminal state
    #[error("not found [{id}]: {key}")]
    NotFound { id: &'static str, key: &'static str },

    /// Duplicate add or uniqueness claim conflict
    #[error("already exists [{id}]: {key}")]
    AlreadyExists { id: &'static str, key: &'static str },

    /// State exists but an invariant blocks the operation
    #[error("precondition failed [{id}]: {key}")]
    PreconditionFailed { id: &'static str, key: &'static str },

    /// Caller lacks rights
    #[error("permission denied [{id}]: {key}")]
    PermissionDenied { id: &'static str, key: &'static str },

    /// Deliberately stubbed capability
    #[error("unimplemented [{id}]: {key}")]
    Unimplemented { id: &'static str, key: &'static str },

    /// Optimistic concurrency conflict; retried internally
    #[error("concurrent modification of {aggregate_type} {aggregate_id}")]
    Conflict {
        aggregate_type: AggregateType,
        aggregate_id: String,
    },

    /// Caller supplied deadline elapsed
    #[error("deadline exceeded")]
    DeadlineExceeded,

    /// Event log or crypto failure that is not a business decision
    #[error("internal error: {0}")]
    Internal(String),
}

impl CommandError {
    pub fn invalid_argument(id: &'static str, key: &'static str) -> Self {
        Self::InvalidArgument { id, key }
    }

    pub fn not_found(id: &'static str, key: &'static str) -> Self {
        Self::NotFound { id, key }
    }

    pub fn already_exists(id: &'static str, key: &'static str) -> Self {
        Self::AlreadyExists { id, key }
    }

    pub fn precondition_failed(id: &'static str, key: &'static str) -> Self {
        Self::PreconditionFailed { id, key }
    }

    pub fn permission_denied(id: &'static str, key: &'static str) -> Self {
        Self::PermissionDenied { id, key }
    }

    pub fn unimplemented(id: &'static str, key: &'static str) -> Self {
        Self::Unimplemented { id, key }
    }

    /// The dedicated "nothing changed" failure of explicit change commands
    pub fn not_changed(id: &'static str) -> Self {
        Self::PreconditionFailed {
            id,
            key: NOT_CHANGED_KEY,
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::InvalidArgument { .. } => ErrorKind::InvalidArgument,
            Self::NotFound { .. } => ErrorKind::NotFound,
            Self::AlreadyExists { .. } => ErrorKind::AlreadyExists,
            Self::PreconditionFailed { .. } => ErrorKind::PreconditionFailed,
            Self::PermissionDenied { .. } => ErrorKind::PermissionDenied,
            Self::Unimplemented { .. } => ErrorKind::Unimplemented,
            Self::Conflict { .. } => ErrorKind::Conflict,
            Self::DeadlineExceeded => ErrorKind::DeadlineExceeded,
            Self::Internal(_) => ErrorKind::Internal,
        }
    }

    /// Localizable message key, if the failure is a business decision
    pub fn message_key(&self) -> Option<&'static str> {
        match self {
            Self::InvalidArgument { key, .. }
            | Self::NotFound { key, .. }
            | Self::AlreadyExists { key, .. }
            | Self::PreconditionFailed { key, .. }
            | Self::PermissionDenied { key, .. }
            | Self::Unimplemented { key, .. } => Some(key),
            Self::Conflict { .. } | Self::DeadlineExceeded | Self::Internal(_) => None,
        }
    }

    pub fn is_not_changed(&self) -> bool {
        matches!(self, Self::PreconditionFailed { key, .. } if *key == NOT_CHANGED_KEY)
    }

    /// Only optimistic concurrency conflicts may be retried
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Conflict { .. })
    }
}

/// Result type for commands
pub type CommandResult<T> = Result<T, CommandError>;

/// Errors reported by an [`EventLog`](crate::event_store::EventLog)
#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EventLogError {
    /// An aggregate advanced past the sequence the command observed
    #[error("sequence conflict on {aggregate_type} {aggregate_id}: expected {expected}, actual {actual}")]
    SequenceConflict {
        aggregate_type: AggregateType,
        aggregate_id: String,
        expected: u64,
        actual: u64,
    },

    /// A uniqueness claim is already live for the key
    #[error("unique constraint {unique_type} already claimed for {key}")]
    UniqueConstraintViolation {
        unique_type: String,
        key: String,
        error_id: &'static str,
        error_key: &'static str,
    },

    /// Deadline elapsed before the call returned
    #[error("event log call exceeded deadline")]
    DeadlineExceeded,

    /// Any other storage failure
    #[error("event log storage error: {0}")]
    Storage(String),
}

impl From<EventLogError> for CommandError {
    fn from(err: EventLogError) -> Self {
        match err {
            EventLogError::SequenceConflict {
                aggregate_type,
                aggregate_id,
                ..
            } => CommandError::Conflict {
                aggregate_type,
                aggregate_id,
            },
            EventLogError::UniqueConstraintViolation {
                error_id,
                error_key,
                ..
            } => CommandError::AlreadyExists {
                id: error_id,
                key: error_key,
            },
            EventLogError::DeadlineExceeded => CommandError::DeadlineExceeded,
            EventLogError::Storage(msg) => CommandError::Internal(msg),
        }
    }
}

impl From<serde_json::Error> for EventLogError {
    fn from(err: serde_json::Error) -> Self {
        EventLogError::Storage(err.to_string())
    }
}

/// Configuration loading errors
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held an unparseable value
    #[error("invalid value for {name}: {value}")]
    Invalid { name: &'static str, value: String },
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_and_key() {
        let err = CommandError::precondition_failed("OIDCS-s3hjk", "Errors.OIDCSession.RefreshTokenInvalid");
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
        assert_eq!(
            err.message_key(),
            Some("Errors.OIDCSession.RefreshTokenInvalid")
        );
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_not_changed_is_precondition() {
        let err = CommandError::not_changed("ORG-Lp0fS");
        assert!(err.is_not_changed());
        assert_eq!(err.kind(), ErrorKind::PreconditionFailed);
    }

    #[test]
    fn test_sequence_conflict_maps_to_retryable_conflict() {
        let err: CommandError = EventLogError::SequenceConflict {
            aggregate_type: AggregateType::Quota,
            aggregate_id: "quota1".into(),
            expected: 5,
            actual: 6,
        }
        .into();
        assert!(err.is_retryable());
        assert_eq!(err.kind(), ErrorKind::Conflict);
    }

    #[test]
    fn test_unique_violation_maps_to_already_exists() {
        let err: CommandError = EventLogError::UniqueConstraintViolation {
            unique_type: "username".into(),
            key: "gigi".into(),
            error_id: "USER-kh7nS",
            error_key: "Errors.User.AlreadyExists",
        }
        .into();
        assert_eq!(err.kind(), ErrorKind::AlreadyExists);
        assert_eq!(err.message_key(), Some("Errors.User.AlreadyExists"));
    }
}
