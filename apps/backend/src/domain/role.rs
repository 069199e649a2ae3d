//! Role identifiers and estimate values.

use std::collections::BTreeSet;
use std::fmt;

use lazy_regex::regex_is_match;
use serde::{Deserialize, Deserializer, Serialize};

use crate::errors::domain::{DomainError, ValidationKind};

/// Upper bound (inclusive) for any estimate, in hours.
pub const MAX_ESTIMATE_HOURS: u32 = 1000;

/// A lowercase role identifier such as `analysis`, `build` or `verify`.
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize)]
#[serde(transparent)]
pub struct Role(String);

impl Role {
    /// Trim, lowercase and validate a raw role name.
    pub fn parse(raw: &str) -> Result<Self, DomainError> {
        let normalized = raw.trim().to_lowercase();
        if !regex_is_match!(r"^[a-z0-9][a-z0-9_-]{0,31}$", &normalized) {
            return Err(DomainError::validation(
                ValidationKind::InvalidRole,
                format!("invalid role '{}'", raw.trim()),
            ));
        }
        Ok(Role(normalized))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for Role {
    fn deserialize<D: Deserializer<'de>>(deserializer: D) -> Result<Self, D::Error> {
        let raw = String::deserialize(deserializer)?;
        Role::parse(&raw).map_err(|e| serde::de::Error::custom(e.detail()))
    }
}

/// Parse a non-empty set of roles; duplicates collapse.
pub fn parse_role_set<S: AsRef<str>>(raw: &[S]) -> Result<BTreeSet<Role>, DomainError> {
    let roles = raw
        .iter()
        .map(|r| Role::parse(r.as_ref()))
        .collect::<Result<BTreeSet<_>, _>>()?;
    if roles.is_empty() {
        return Err(DomainError::validation(
            ValidationKind::InvalidRole,
            "at least one required role is needed",
        ));
    }
    Ok(roles)
}

/// Validate an hour value coming from the wire.
pub fn parse_hours(value: i64) -> Result<u32, DomainError> {
    if !(0..=i64::from(MAX_ESTIMATE_HOURS)).contains(&value) {
        return Err(DomainError::validation(
            ValidationKind::InvalidEstimate,
            format!("estimate must be between 0 and {MAX_ESTIMATE_HOURS} hours, got {value}"),
        ));
    }
    Ok(value as u32)
}
