//! Lookups by shareable room code.

use actix_web::{web, HttpResponse};

use crate::error::AppError;
use crate::extractors::CurrentUser;
use crate::state::app_state::AppState;

/// GET /api/rooms/{code}
///
/// Resolves a room code to the caller's view of the session. Completed
/// sessions still resolve.
async fn resolve(
    path: web::Path<String>,
    current_user: CurrentUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let view = app_state
        .sessions
        .resolve(&path.into_inner(), &current_user.sub)
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// GET /api/rooms/{code}/presence
async fn presence(
    path: web::Path<String>,
    _current_user: CurrentUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let participants = app_state.sessions.presence(&path.into_inner()).await?;
    Ok(HttpResponse::Ok().json(participants))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("/{code}").route(web::get().to(resolve)));
    cfg.service(web::resource("/{code}/presence").route(web::get().to(presence)));
}
