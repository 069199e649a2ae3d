use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::errors::domain::{DomainError, InfraErrorKind, ValidationKind};

/// Lifecycle of an estimation session. Only moves forward.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum SessionStatus {
    Preparing,
    Active,
    Completed,
}

impl SessionStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            SessionStatus::Preparing => "PREPARING",
            SessionStatus::Active => "ACTIVE",
            SessionStatus::Completed => "COMPLETED",
        }
    }
}

impl fmt::Display for SessionStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for SessionStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PREPARING" => Ok(SessionStatus::Preparing),
            "ACTIVE" => Ok(SessionStatus::Active),
            "COMPLETED" => Ok(SessionStatus::Completed),
            other => Err(DomainError::infra(
                InfraErrorKind::DataCorruption,
                format!("unknown session status '{other}'"),
            )),
        }
    }
}

/// An estimation session as persisted.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Session {
    pub id: i64,
    pub team_id: i64,
    pub planning_unit_key: String,
    pub facilitator_id: String,
    pub status: SessionStatus,
    pub room_code: String,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub started_at: Option<OffsetDateTime>,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

impl Session {
    pub fn is_facilitator(&self, identity: &str) -> bool {
        self.facilitator_id == identity
    }
}

/// Input for a session that has not been stored yet.
#[derive(Debug, Clone, PartialEq)]
pub struct NewSession {
    pub team_id: i64,
    pub planning_unit_key: String,
    pub facilitator_id: String,
    pub room_code: String,
    pub created_at: OffsetDateTime,
}

impl NewSession {
    pub fn new(
        team_id: i64,
        planning_unit_key: &str,
        facilitator_id: &str,
        room_code: String,
        created_at: OffsetDateTime,
    ) -> Result<Self, DomainError> {
        let key = planning_unit_key.trim();
        if key.is_empty() || key.chars().count() > 64 {
            return Err(DomainError::validation(
                ValidationKind::InvalidPlanningUnit,
                "planning unit key must be 1..=64 characters",
            ));
        }
        Ok(Self {
            team_id,
            planning_unit_key: key.to_string(),
            facilitator_id: facilitator_id.to_string(),
            room_code,
            created_at,
        })
    }

    /// Materialize with the id assigned by the store.
    pub fn into_session(self, id: i64) -> Session {
        Session {
            id,
            team_id: self.team_id,
            planning_unit_key: self.planning_unit_key,
            facilitator_id: self.facilitator_id,
            status: SessionStatus::Preparing,
            room_code: self.room_code,
            created_at: self.created_at,
            started_at: None,
            completed_at: None,
        }
    }
}
