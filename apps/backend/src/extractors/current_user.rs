use std::future::{ready, Ready};

use actix_web::dev::Payload;
use actix_web::http::header;
use actix_web::{web, FromRequest, HttpRequest};
use serde::{Deserialize, Serialize};

use crate::auth::jwt::verify_access_token;
use crate::error::AppError;
use crate::state::app_state::AppState;

/// Verified caller identity.
///
/// The bearer token comes from the `Authorization` header, or from a
/// `token` query parameter for websocket upgrades where browsers cannot set
/// headers.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq, Eq)]
pub struct CurrentUser {
    pub sub: String,
    pub name: String,
}

fn bearer_from_header(req: &HttpRequest) -> Result<Option<String>, AppError> {
    let Some(value) = req.headers().get(header::AUTHORIZATION) else {
        return Ok(None);
    };
    let value = value
        .to_str()
        .map_err(|_| AppError::unauthorized_missing_bearer())?;
    match value.split_once(' ') {
        Some(("Bearer", token)) if !token.trim().is_empty() => Ok(Some(token.trim().to_string())),
        _ => Err(AppError::unauthorized_missing_bearer()),
    }
}

fn token_from_query(req: &HttpRequest) -> Option<String> {
    web::Query::<Vec<(String, String)>>::from_query(req.query_string())
        .ok()?
        .into_inner()
        .into_iter()
        .find(|(k, v)| k == "token" && !v.is_empty())
        .map(|(_, v)| v)
}

fn extract(req: &HttpRequest) -> Result<CurrentUser, AppError> {
    let token = match bearer_from_header(req)? {
        Some(token) => token,
        None => token_from_query(req).ok_or_else(AppError::unauthorized_missing_bearer)?,
    };
    let state = req
        .app_data::<web::Data<AppState>>()
        .ok_or_else(|| AppError::internal("AppState not configured"))?;
    let claims = verify_access_token(&token, &state.security)?;
    let name = if claims.name.trim().is_empty() {
        claims.sub.clone()
    } else {
        claims.name
    };
    Ok(CurrentUser {
        sub: claims.sub,
        name,
    })
}

impl FromRequest for CurrentUser {
    type Error = AppError;
    type Future = Ready<Result<Self, Self::Error>>;

    fn from_request(req: &HttpRequest, _payload: &mut Payload) -> Self::Future {
        ready(extract(req))
    }
}
