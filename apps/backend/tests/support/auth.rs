//! Bearer tokens for tests.

use std::time::{Duration, SystemTime};

use poker_backend::auth::jwt::mint_access_token;
use poker_backend::state::security_config::SecurityConfig;

pub fn mint_test_token(sub: &str, sec: &SecurityConfig) -> String {
    mint_access_token(sub, &sub.to_uppercase(), SystemTime::now(), sec)
        .expect("should mint token successfully")
}

/// Full `Authorization` header value.
pub fn bearer_header(sub: &str, sec: &SecurityConfig) -> String {
    format!("Bearer {}", mint_test_token(sub, sec))
}

pub fn mint_expired_token(sub: &str, sec: &SecurityConfig) -> String {
    let past = SystemTime::now()
        .checked_sub(Duration::from_secs(7200))
        .unwrap();
    mint_access_token(sub, sub, past, sec).expect("should mint expired token successfully")
}
