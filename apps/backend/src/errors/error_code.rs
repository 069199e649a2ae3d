//! Error codes for the estimation backend API.
//!
//! Every code that can appear in an HTTP problem body or a websocket
//! `error` frame is declared here. Add new codes here; never pass ad-hoc
//! strings as error codes.
//!
//! All error codes are SCREAMING_SNAKE_CASE and map 1:1 to the strings
//! that appear on the wire.

use core::fmt;

use serde::{Serialize, Serializer};

/// Centralized error codes for the estimation backend API.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    // Authentication & Authorization
    /// Authentication required
    Unauthorized,
    /// Missing or malformed Bearer token
    UnauthorizedMissingBearer,
    /// Invalid JWT token
    UnauthorizedInvalidJwt,
    /// JWT token has expired
    UnauthorizedExpiredJwt,
    /// Access denied
    Forbidden,
    /// Operation reserved for the session facilitator
    NotFacilitator,

    // Request Validation
    /// General validation error
    ValidationError,
    /// General bad request error
    BadRequest,
    /// Role identifier is malformed
    InvalidRole,
    /// Estimate outside the accepted hour range
    InvalidEstimate,
    /// Story title empty or too long
    InvalidTitle,
    /// Planning unit key empty or too long
    InvalidPlanningUnit,
    /// Tracker item key malformed
    InvalidExternalKey,
    /// Path id could not be parsed
    InvalidId,
    /// Role is not required by the story
    UnknownRole,
    /// Final estimate names a role the story does not require
    UnexpectedRole,
    /// Final estimate misses a required role
    MissingRoleEstimate,
    /// Websocket protocol version mismatch
    BadProtocol,

    // Resource Not Found
    /// Session not found
    SessionNotFound,
    /// Story not found
    StoryNotFound,
    /// Room code does not resolve to a session
    RoomNotFound,
    /// General not found error
    NotFound,

    // Workflow Conflicts
    /// Votes were already revealed for this story
    StoryAlreadyRevealed,
    /// Story already has its final estimate
    StoryCompleted,
    /// Story is not accepting votes
    StoryNotVoting,
    /// Story is not pending
    StoryNotPending,
    /// Story has not been revealed yet
    StoryNotRevealed,
    /// Reveal requested with no ballots cast
    NoVotes,
    /// Another story is currently being estimated
    StoryInProgress,
    /// Advance requested while a story is still open
    FinishCurrentStory,
    /// Advance requested with nothing left to estimate
    NoPendingStories,
    /// Session is completed and read-only
    SessionCompleted,
    /// Session is not active
    SessionNotActive,
    /// Session was already started
    SessionAlreadyStarted,
    /// Room is closed for new participants
    RoomClosed,
    /// Could not allocate a unique room code
    RoomCodeConflict,
    /// Generic conflict (fallback for unmatched conflicts)
    Conflict,

    // Integrations
    /// Issue tracker call failed
    TrackerSyncFailed,
    /// Issue tracker bridge is not configured
    TrackerNotConfigured,

    // System Errors
    /// Database error
    DbError,
    /// Database unavailable
    DbUnavailable,
    /// Database timeout (gateway timeout)
    DbTimeout,
    /// Unique constraint violation
    UniqueViolation,
    /// Record not found (generic 404 for DB-driven not-found)
    RecordNotFound,
    /// Room coordinator is gone
    RoomUnavailable,
    /// Internal server error
    Internal,
    /// Internal server error (explicit problem code)
    InternalError,
    /// Configuration error
    ConfigError,
    /// Data corruption detected
    DataCorruption,
}

impl ErrorCode {
    /// Returns the canonical SCREAMING_SNAKE_CASE string for this error code.
    pub const fn as_str(&self) -> &'static str {
        match self {
            // Authentication & Authorization
            Self::Unauthorized => "UNAUTHORIZED",
            Self::UnauthorizedMissingBearer => "UNAUTHORIZED_MISSING_BEARER",
            Self::UnauthorizedInvalidJwt => "UNAUTHORIZED_INVALID_JWT",
            Self::UnauthorizedExpiredJwt => "UNAUTHORIZED_EXPIRED_JWT",
            Self::Forbidden => "FORBIDDEN",
            Self::NotFacilitator => "NOT_FACILITATOR",

            // Request Validation
            Self::ValidationError => "VALIDATION_ERROR",
            Self::BadRequest => "BAD_REQUEST",
            Self::InvalidRole => "INVALID_ROLE",
            Self::InvalidEstimate => "INVALID_ESTIMATE",
            Self::InvalidTitle => "INVALID_TITLE",
            Self::InvalidPlanningUnit => "INVALID_PLANNING_UNIT",
            Self::InvalidExternalKey => "INVALID_EXTERNAL_KEY",
            Self::InvalidId => "INVALID_ID",
            Self::UnknownRole => "UNKNOWN_ROLE",
            Self::UnexpectedRole => "UNEXPECTED_ROLE",
            Self::MissingRoleEstimate => "MISSING_ROLE_ESTIMATE",
            Self::BadProtocol => "BAD_PROTOCOL",

            // Resource Not Found
            Self::SessionNotFound => "SESSION_NOT_FOUND",
            Self::StoryNotFound => "STORY_NOT_FOUND",
            Self::RoomNotFound => "ROOM_NOT_FOUND",
            Self::NotFound => "NOT_FOUND",

            // Workflow Conflicts
            Self::StoryAlreadyRevealed => "STORY_ALREADY_REVEALED",
            Self::StoryCompleted => "STORY_COMPLETED",
            Self::StoryNotVoting => "STORY_NOT_VOTING",
            Self::StoryNotPending => "STORY_NOT_PENDING",
            Self::StoryNotRevealed => "STORY_NOT_REVEALED",
            Self::NoVotes => "NO_VOTES",
            Self::StoryInProgress => "STORY_IN_PROGRESS",
            Self::FinishCurrentStory => "FINISH_CURRENT_STORY",
            Self::NoPendingStories => "NO_PENDING_STORIES",
            Self::SessionCompleted => "SESSION_COMPLETED",
            Self::SessionNotActive => "SESSION_NOT_ACTIVE",
            Self::SessionAlreadyStarted => "SESSION_ALREADY_STARTED",
            Self::RoomClosed => "ROOM_CLOSED",
            Self::RoomCodeConflict => "ROOM_CODE_CONFLICT",
            Self::Conflict => "CONFLICT",

            // Integrations
            Self::TrackerSyncFailed => "TRACKER_SYNC_FAILED",
            Self::TrackerNotConfigured => "TRACKER_NOT_CONFIGURED",

            // System Errors
            Self::DbError => "DB_ERROR",
            Self::DbUnavailable => "DB_UNAVAILABLE",
            Self::DbTimeout => "DB_TIMEOUT",
            Self::UniqueViolation => "UNIQUE_VIOLATION",
            Self::RecordNotFound => "RECORD_NOT_FOUND",
            Self::RoomUnavailable => "ROOM_UNAVAILABLE",
            Self::Internal => "INTERNAL",
            Self::InternalError => "INTERNAL_ERROR",
            Self::ConfigError => "CONFIG_ERROR",
            Self::DataCorruption => "DATA_CORRUPTION",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl Serialize for ErrorCode {
    fn serialize<S: Serializer>(&self, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_str(self.as_str())
    }
}
