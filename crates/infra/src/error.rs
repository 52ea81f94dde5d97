//! Engine-level error taxonomy.
//!
//! Every failure an engine call can produce collapses into four kinds:
//! validation, not found, conflict and transient. Only transient failures
//! are worth retrying unchanged.

use thiserror::Error;

use posledger_core::{Conflict, DomainError};

use crate::command_dispatcher::DispatchError;
use crate::event_store::EventStoreError;
use crate::ledger::LedgerError;
use crate::projections::ProjectionFailure;

pub type EngineResult<T> = Result<T, EngineError>;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum EngineError {
    #[error("validation failed: {0}")]
    Validation(String),

    #[error("not found: {0}")]
    NotFound(String),

    #[error(transparent)]
    Conflict(Conflict),

    /// Storage or infrastructure hiccup.
    #[error("temporarily unavailable: {0}")]
    Transient(String),
}

impl EngineError {
    pub fn is_retryable(&self) -> bool {
        matches!(self, EngineError::Transient(_))
    }

    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            EngineError::Validation(_) => "validation_error",
            EngineError::NotFound(_) => "not_found",
            EngineError::Conflict(c) => c.code(),
            EngineError::Transient(_) => "transient",
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        EngineError::NotFound(what.into())
    }
}

impl From<DomainError> for EngineError {
    fn from(value: DomainError) -> Self {
        match value {
            DomainError::Validation(msg) | DomainError::InvalidId(msg) => {
                EngineError::Validation(msg)
            }
            DomainError::NotFound(what) => EngineError::NotFound(what),
            DomainError::Conflict(c) => EngineError::Conflict(c),
        }
    }
}

impl From<Conflict> for EngineError {
    fn from(value: Conflict) -> Self {
        EngineError::Conflict(value)
    }
}

impl From<LedgerError> for EngineError {
    fn from(value: LedgerError) -> Self {
        match value {
            LedgerError::Domain(e) => e.into(),
            LedgerError::Unavailable(msg) => EngineError::Transient(msg),
        }
    }
}

impl From<EventStoreError> for EngineError {
    fn from(value: EventStoreError) -> Self {
        EngineError::Transient(value.to_string())
    }
}

impl From<DispatchError> for EngineError {
    fn from(value: DispatchError) -> Self {
        match value {
            DispatchError::Domain(e) => e.into(),
            // Retry budget exhausted on a hot stream.
            DispatchError::Concurrency(msg) => {
                EngineError::Conflict(Conflict::ConcurrentModification(msg))
            }
            other => EngineError::Transient(other.to_string()),
        }
    }
}

impl From<ProjectionFailure> for EngineError {
    fn from(value: ProjectionFailure) -> Self {
        match value {
            ProjectionFailure::Ledger(e) => e.into(),
            ProjectionFailure::Store(e) => e.into(),
            other => EngineError::Transient(other.to_string()),
        }
    }
}
