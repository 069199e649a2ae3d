//! Domain-level error type used across the room state machine, services
//! and store adapters.
//!
//! This error type is HTTP- and DB-agnostic. Handlers return
//! `Result<T, crate::error::AppError>` and convert from `DomainError`
//! through `From<DomainError> for AppError`.

use std::error::Error;
use std::fmt::{Display, Formatter, Result as FmtResult};

/// Validation failures on caller input
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ValidationKind {
    InvalidRole,
    InvalidEstimate,
    InvalidTitle,
    InvalidPlanningUnit,
    InvalidExternalKey,
    UnknownRole,
    UnexpectedRole,
    MissingRoleEstimate,
    Other(String),
}

/// Infra error kinds to distinguish operational failures
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum InfraErrorKind {
    Timeout,
    DbUnavailable,
    DataCorruption,
    RoomUnavailable,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum NotFoundKind {
    Session,
    Story,
    Room,
    Other(String),
}

/// Workflow conflicts: the request is well formed but illegal in the
/// current state of the room.
#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ConflictKind {
    StoryAlreadyRevealed,
    StoryCompleted,
    StoryNotVoting,
    StoryNotPending,
    StoryNotRevealed,
    NoVotes,
    StoryInProgress,
    FinishCurrentStory,
    NoPendingStories,
    SessionCompleted,
    SessionNotActive,
    SessionAlreadyStarted,
    RoomClosed,
    RoomCodeConflict,
    UniqueViolation,
    Other(String),
}

#[derive(Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum ForbiddenKind {
    NotFacilitator,
    Other(String),
}

/// Central domain error type
#[derive(Debug, Clone, PartialEq)]
pub enum DomainError {
    /// Input/user validation or business rule violation
    Validation(ValidationKind, String),
    /// Semantic conflict with the current state
    Conflict(ConflictKind, String),
    /// Missing resource in domain terms
    NotFound(NotFoundKind, String),
    /// Caller lacks the privilege for the operation
    Forbidden(ForbiddenKind, String),
    /// Infrastructure/operational failures
    Infra(InfraErrorKind, String),
}

impl Display for DomainError {
    fn fmt(&self, f: &mut Formatter<'_>) -> FmtResult {
        match self {
            DomainError::Validation(kind, d) => write!(f, "validation {kind:?}: {d}"),
            DomainError::Conflict(kind, d) => write!(f, "conflict {kind:?}: {d}"),
            DomainError::NotFound(kind, d) => write!(f, "not found {kind:?}: {d}"),
            DomainError::Forbidden(kind, d) => write!(f, "forbidden {kind:?}: {d}"),
            DomainError::Infra(kind, d) => write!(f, "infra {kind:?}: {d}"),
        }
    }
}

impl Error for DomainError {}

impl DomainError {
    pub fn validation(kind: ValidationKind, detail: impl Into<String>) -> Self {
        Self::Validation(kind, detail.into())
    }
    pub fn conflict(kind: ConflictKind, detail: impl Into<String>) -> Self {
        Self::Conflict(kind, detail.into())
    }
    pub fn not_found(kind: NotFoundKind, detail: impl Into<String>) -> Self {
        Self::NotFound(kind, detail.into())
    }
    pub fn forbidden(kind: ForbiddenKind, detail: impl Into<String>) -> Self {
        Self::Forbidden(kind, detail.into())
    }
    pub fn infra(kind: InfraErrorKind, detail: impl Into<String>) -> Self {
        Self::Infra(kind, detail.into())
    }

    /// Human-readable message without the kind prefix.
    pub fn detail(&self) -> &str {
        match self {
            DomainError::Validation(_, d)
            | DomainError::Conflict(_, d)
            | DomainError::NotFound(_, d)
            | DomainError::Forbidden(_, d)
            | DomainError::Infra(_, d) => d,
        }
    }
}

impl From<sea_orm::DbErr> for DomainError {
    fn from(e: sea_orm::DbErr) -> Self {
        use sea_orm::{DbErr, RuntimeErr, SqlErr};

        if let Some(SqlErr::UniqueConstraintViolation(msg)) = e.sql_err() {
            return DomainError::conflict(ConflictKind::UniqueViolation, msg);
        }
        match e {
            DbErr::RecordNotFound(msg) => {
                DomainError::not_found(NotFoundKind::Other("record".into()), msg)
            }
            DbErr::ConnectionAcquire(err) => {
                DomainError::infra(InfraErrorKind::DbUnavailable, err.to_string())
            }
            DbErr::Conn(RuntimeErr::SqlxError(err)) => {
                DomainError::infra(InfraErrorKind::DbUnavailable, err.to_string())
            }
            DbErr::Json(msg) | DbErr::Type(msg) => {
                DomainError::infra(InfraErrorKind::DataCorruption, msg)
            }
            other => DomainError::infra(InfraErrorKind::Other("db".into()), other.to_string()),
        }
    }
}
