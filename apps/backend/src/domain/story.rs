use std::collections::{BTreeMap, BTreeSet};
use std::fmt;
use std::str::FromStr;

use lazy_regex::regex_is_match;
use serde::{Deserialize, Serialize};
use time::OffsetDateTime;

use crate::domain::role::{parse_hours, Role};
use crate::errors::domain::{DomainError, InfraErrorKind, ValidationKind};

pub const MAX_TITLE_CHARS: usize = 200;

/// Per-role final estimate in hours.
pub type RoleEstimates = BTreeMap<Role, u32>;

/// Story workflow: PENDING -> VOTING -> VOTED -> COMPLETED, with VOTED -> VOTING on re-open.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum StoryStatus {
    Pending,
    Voting,
    Voted,
    Completed,
}

impl StoryStatus {
    pub const fn as_str(&self) -> &'static str {
        match self {
            StoryStatus::Pending => "PENDING",
            StoryStatus::Voting => "VOTING",
            StoryStatus::Voted => "VOTED",
            StoryStatus::Completed => "COMPLETED",
        }
    }

    /// VOTING or VOTED: opened but not finished.
    pub fn in_progress(&self) -> bool {
        matches!(self, StoryStatus::Voting | StoryStatus::Voted)
    }
}

impl fmt::Display for StoryStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for StoryStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "PENDING" => Ok(StoryStatus::Pending),
            "VOTING" => Ok(StoryStatus::Voting),
            "VOTED" => Ok(StoryStatus::Voted),
            "COMPLETED" => Ok(StoryStatus::Completed),
            other => Err(DomainError::infra(
                InfraErrorKind::DataCorruption,
                format!("unknown story status '{other}'"),
            )),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Story {
    pub id: i64,
    pub session_id: i64,
    pub external_key: Option<String>,
    pub title: String,
    pub required_roles: BTreeSet<Role>,
    pub status: StoryStatus,
    pub position: i32,
    pub final_estimate: Option<RoleEstimates>,
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,
    #[serde(with = "time::serde::rfc3339::option")]
    pub completed_at: Option<OffsetDateTime>,
}

/// A story validated but not yet stored.
#[derive(Debug, Clone, PartialEq)]
pub struct NewStory {
    pub session_id: i64,
    pub external_key: Option<String>,
    pub title: String,
    pub required_roles: BTreeSet<Role>,
    pub position: i32,
    pub created_at: OffsetDateTime,
}

impl NewStory {
    pub fn into_story(self, id: i64) -> Story {
        Story {
            id,
            session_id: self.session_id,
            external_key: self.external_key,
            title: self.title,
            required_roles: self.required_roles,
            status: StoryStatus::Pending,
            position: self.position,
            final_estimate: None,
            created_at: self.created_at,
            completed_at: None,
        }
    }
}

/// Trim and check a tracker item key; blank means unlinked.
///
/// Keys end up as a single path segment of tracker URLs, so separators,
/// query and fragment characters are refused.
pub fn normalize_external_key(raw: Option<&str>) -> Result<Option<String>, DomainError> {
    let Some(key) = raw.map(str::trim).filter(|k| !k.is_empty()) else {
        return Ok(None);
    };
    if !regex_is_match!(r"^[A-Za-z0-9][A-Za-z0-9._-]{0,63}$", key) {
        return Err(DomainError::validation(
            ValidationKind::InvalidExternalKey,
            format!("invalid external key '{key}'"),
        ));
    }
    Ok(Some(key.to_string()))
}

/// Trim and bound a story title.
pub fn normalize_title(raw: &str) -> Result<String, DomainError> {
    let title = raw.trim();
    if title.is_empty() {
        return Err(DomainError::validation(
            ValidationKind::InvalidTitle,
            "story title must not be empty",
        ));
    }
    if title.chars().count() > MAX_TITLE_CHARS {
        return Err(DomainError::validation(
            ValidationKind::InvalidTitle,
            format!("story title exceeds {MAX_TITLE_CHARS} characters"),
        ));
    }
    Ok(title.to_string())
}

/// Check a facilitator-chosen final map against the required roles.
///
/// Every required role must be present; extra roles and out-of-range
/// values are rejected.
pub fn validate_final_estimate(
    required: &BTreeSet<Role>,
    raw: &BTreeMap<String, i64>,
) -> Result<RoleEstimates, DomainError> {
    let mut estimates = RoleEstimates::new();
    for (name, hours) in raw {
        let role = Role::parse(name)?;
        if !required.contains(&role) {
            return Err(DomainError::validation(
                ValidationKind::UnexpectedRole,
                format!("role {role} is not required by this story"),
            ));
        }
        estimates.insert(role, parse_hours(*hours)?);
    }
    if let Some(missing) = required.iter().find(|r| !estimates.contains_key(*r)) {
        return Err(DomainError::validation(
            ValidationKind::MissingRoleEstimate,
            format!("missing estimate for role {missing}"),
        ));
    }
    Ok(estimates)
}
