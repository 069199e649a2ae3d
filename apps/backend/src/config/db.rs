use std::fmt;
use std::str::FromStr;

use super::{must_var, opt_var};
use crate::error::AppError;

/// Storage backend selected by `DB_KIND`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DbKind {
    Postgres,
    Sqlite,
    /// No database; the in-memory store. Data is lost on restart.
    Memory,
}

impl FromStr for DbKind {
    type Err = AppError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "postgres" | "postgresql" => Ok(DbKind::Postgres),
            "sqlite" => Ok(DbKind::Sqlite),
            "memory" => Ok(DbKind::Memory),
            other => Err(AppError::config(format!(
                "DB_KIND must be postgres, sqlite or memory, got '{other}'"
            ))),
        }
    }
}

impl fmt::Display for DbKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            DbKind::Postgres => "postgres",
            DbKind::Sqlite => "sqlite",
            DbKind::Memory => "memory",
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DbSettings {
    pub kind: DbKind,
    /// Connection URL; `None` only for [`DbKind::Memory`].
    pub url: Option<String>,
}

impl DbSettings {
    pub fn memory() -> Self {
        Self {
            kind: DbKind::Memory,
            url: None,
        }
    }

    pub fn sqlite_memory() -> Self {
        Self {
            kind: DbKind::Sqlite,
            url: Some("sqlite::memory:".to_string()),
        }
    }

    pub fn from_env() -> Result<Self, AppError> {
        let kind = match opt_var("DB_KIND") {
            Some(raw) => raw.parse()?,
            None => DbKind::Postgres,
        };
        let url = match kind {
            DbKind::Postgres => Some(must_var("DATABASE_URL")?),
            DbKind::Sqlite => {
                Some(opt_var("DATABASE_URL").unwrap_or_else(|| "sqlite::memory:".to_string()))
            }
            DbKind::Memory => None,
        };
        if let (DbKind::Postgres, Some(url)) = (kind, &url) {
            if !(url.starts_with("postgres://") || url.starts_with("postgresql://")) {
                return Err(AppError::config("DATABASE_URL must be a postgres URL"));
            }
        }
        Ok(Self { kind, url })
    }
}

/// URL with the password replaced, for logs.
pub fn redact_url(url: &str) -> String {
    let Some((scheme, rest)) = url.split_once("://") else {
        return url.to_string();
    };
    let Some((creds, host)) = rest.split_once('@') else {
        return url.to_string();
    };
    match creds.split_once(':') {
        Some((user, _)) => format!("{scheme}://{user}:***@{host}"),
        None => url.to_string(),
    }
}
