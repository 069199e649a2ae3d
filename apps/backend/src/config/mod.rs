//! Startup configuration, read from the environment once.

pub mod app;
pub mod db;

use std::env;
use std::str::FromStr;

use crate::error::AppError;

/// Required variable, or a `CONFIG_ERROR`.
pub(crate) fn must_var(name: &str) -> Result<String, AppError> {
    env::var(name)
        .ok()
        .filter(|v| !v.trim().is_empty())
        .ok_or_else(|| {
            AppError::config(format!("Required environment variable '{name}' is not set"))
        })
}

/// Optional variable parsed into `T`, falling back to `default` when unset.
pub(crate) fn var_or<T: FromStr>(name: &str, default: T) -> Result<T, AppError> {
    match env::var(name) {
        Ok(raw) if !raw.trim().is_empty() => raw
            .trim()
            .parse()
            .map_err(|_| AppError::config(format!("Environment variable '{name}' is invalid: '{raw}'"))),
        _ => Ok(default),
    }
}

pub(crate) fn opt_var(name: &str) -> Option<String> {
    env::var(name).ok().filter(|v| !v.trim().is_empty())
}
