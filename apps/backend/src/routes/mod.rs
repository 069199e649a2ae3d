use actix_web::web;

use crate::error::AppError;
use crate::errors::ErrorCode;

pub mod health;
pub mod realtime;
pub mod rooms;
pub mod sessions;

/// Register every route. Shared by `main.rs` and the integration tests so
/// both serve the same surface.
pub fn configure(cfg: &mut web::ServiceConfig) {
    // Unparseable path ids become problem+json instead of actix's plain 404.
    cfg.app_data(web::PathConfig::default().error_handler(|err, _req| {
        AppError::bad_request(ErrorCode::InvalidId, format!("Invalid path parameter: {err}"))
            .into()
    }));

    // Health check: /health
    cfg.service(web::scope("/health").configure(health::configure_routes));

    // Sessions, stories and votes: /api/sessions/**
    cfg.service(web::scope("/api/sessions").configure(sessions::configure_routes));

    // Room lookups by code: /api/rooms/**
    cfg.service(web::scope("/api/rooms").configure(rooms::configure_routes));

    // Websocket upgrades: /ws/rooms/{code}
    cfg.service(web::scope("/ws").configure(realtime::configure_routes));
}
