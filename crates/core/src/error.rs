//! Domain error model.

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Result type used across the domain layer.
pub type DomainResult<T> = Result<T, DomainError>;

/// Business-rule conflicts. These are surfaced to the user verbatim.
#[derive(Debug, Error, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", content = "detail", rename_all = "snake_case")]
pub enum Conflict {
    /// A shift is already running on the till.
    #[error("till is in use by a running shift")]
    TillInUse,

    /// The till has been deactivated.
    #[error("till is inactive")]
    TillInactive,

    /// The shift is not running (never started or already completed).
    #[error("shift is not running")]
    ShiftNotRunning,

    /// The outlet has been deactivated.
    #[error("outlet is inactive")]
    OutletInactive,

    /// The entity already exists.
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// A reference id is already attributed to a supplier.
    #[error("reference already attributed: {0}")]
    AlreadyAttributed(String),

    /// An idempotency key was reused with a different payload.
    #[error("idempotency key reused with different content: {0}")]
    IdempotencyKeyReused(String),

    /// A concurrent writer changed the stream (stale version).
    #[error("concurrent modification: {0}")]
    ConcurrentModification(String),
}

impl Conflict {
    /// Stable machine-readable code.
    pub fn code(&self) -> &'static str {
        match self {
            Conflict::TillInUse => "till_in_use",
            Conflict::TillInactive => "till_inactive",
            Conflict::ShiftNotRunning => "shift_not_running",
            Conflict::OutletInactive => "outlet_inactive",
            Conflict::AlreadyExists(_) => "already_exists",
            Conflict::AlreadyAttributed(_) => "already_attributed",
            Conflict::IdempotencyKeyReused(_) => "idempotency_key_reused",
            Conflict::ConcurrentModification(_) => "concurrent_modification",
        }
    }
}

/// Domain-level error.
///
/// Keep this focused on deterministic, business/domain failures (validation,
/// conflicts, unknown references). Infrastructure concerns belong elsewhere.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum DomainError {
    /// A value failed validation (e.g. malformed input).
    #[error("validation failed: {0}")]
    Validation(String),

    /// An identifier was invalid (e.g. parse failure).
    #[error("invalid identifier: {0}")]
    InvalidId(String),

    /// A referenced entity does not exist.
    #[error("not found: {0}")]
    NotFound(String),

    /// A business rule rejected the operation.
    #[error("conflict: {0}")]
    Conflict(Conflict),
}

impl DomainError {
    pub fn validation(msg: impl Into<String>) -> Self {
        Self::Validation(msg.into())
    }

    pub fn invalid_id(msg: impl Into<String>) -> Self {
        Self::InvalidId(msg.into())
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        Self::NotFound(what.into())
    }

    pub fn conflict(conflict: Conflict) -> Self {
        Self::Conflict(conflict)
    }
}

impl From<Conflict> for DomainError {
    fn from(value: Conflict) -> Self {
        Self::Conflict(value)
    }
}
