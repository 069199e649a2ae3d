use std::time::Duration;

use super::db::DbSettings;
use super::{must_var, opt_var, var_or};
use crate::error::AppError;
use crate::utils::room_code::DEFAULT_ROOM_CODE_LEN;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackerSettings {
    pub base_url: String,
    pub token: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub host: String,
    pub port: u16,
    pub jwt_secret: String,
    pub db: DbSettings,
    /// `None` disables the tracker bridge.
    pub tracker: Option<TrackerSettings>,
    pub room_code_len: usize,
    pub room_idle: Duration,
    pub presence_buffer: usize,
}

impl AppConfig {
    pub fn from_env() -> Result<Self, AppError> {
        let room_code_len = var_or("ROOM_CODE_LENGTH", DEFAULT_ROOM_CODE_LEN)?;
        if !(4..=16).contains(&room_code_len) {
            return Err(AppError::config("ROOM_CODE_LENGTH must be within 4..=16"));
        }
        let presence_buffer = var_or("PRESENCE_BUFFER", 64usize)?;
        if presence_buffer == 0 {
            return Err(AppError::config("PRESENCE_BUFFER must be positive"));
        }
        let room_idle_secs = var_or("ROOM_IDLE_SECS", 300u64)?;
        if room_idle_secs == 0 {
            return Err(AppError::config("ROOM_IDLE_SECS must be positive"));
        }
        Ok(Self {
            host: var_or("BACKEND_HOST", "0.0.0.0".to_string())?,
            port: var_or("BACKEND_PORT", 3001u16)?,
            jwt_secret: must_var("BACKEND_JWT_SECRET")?,
            db: DbSettings::from_env()?,
            tracker: opt_var("TRACKER_BASE_URL").map(|base_url| TrackerSettings {
                base_url,
                token: opt_var("TRACKER_TOKEN"),
            }),
            room_code_len,
            room_idle: Duration::from_secs(room_idle_secs),
            presence_buffer,
        })
    }
}
