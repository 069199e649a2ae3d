//! Session, story and vote endpoints.
//!
//! Handlers identify the caller from the bearer token and hand off to
//! [`SessionService`]; every mutation is applied by the room's coordinator.

use std::collections::BTreeMap;

use actix_web::{web, HttpResponse};
use serde::Deserialize;

use crate::error::AppError;
use crate::extractors::{CurrentUser, ValidatedJson};
use crate::services::sessions::{AddStoryInput, SessionService};
use crate::state::app_state::AppState;

#[derive(Debug, Deserialize)]
struct CreateSessionRequest {
    team_id: i64,
    planning_unit_key: String,
}

#[derive(Debug, Deserialize)]
struct AddStoryRequest {
    title: String,
    #[serde(default)]
    roles: Vec<String>,
    #[serde(default)]
    external_key: Option<String>,
    #[serde(default)]
    create_in_tracker: bool,
}

#[derive(Debug, Deserialize)]
struct CastVoteRequest {
    role: String,
    value: i64,
}

#[derive(Debug, Deserialize)]
struct FinalEstimateRequest {
    estimates: BTreeMap<String, i64>,
}

fn sessions(app_state: &AppState) -> &SessionService {
    &app_state.sessions
}

/// POST /api/sessions
///
/// The caller becomes the facilitator.
async fn create_session(
    current_user: CurrentUser,
    body: ValidatedJson<CreateSessionRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let session = sessions(&app_state)
        .create_session(body.team_id, &body.planning_unit_key, &current_user.sub)
        .await?;
    Ok(HttpResponse::Created().json(session))
}

/// GET /api/sessions/{id}
async fn get_session(
    path: web::Path<i64>,
    current_user: CurrentUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let view = sessions(&app_state)
        .session_view(path.into_inner(), &current_user.sub)
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

async fn start_session(
    path: web::Path<i64>,
    current_user: CurrentUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let view = sessions(&app_state)
        .start(path.into_inner(), &current_user.sub)
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// POST /api/sessions/{id}/advance
///
/// Moves the next pending story into voting.
async fn advance(
    path: web::Path<i64>,
    current_user: CurrentUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let view = sessions(&app_state)
        .advance(path.into_inner(), &current_user.sub)
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

async fn complete_session(
    path: web::Path<i64>,
    current_user: CurrentUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let view = sessions(&app_state)
        .complete(path.into_inner(), &current_user.sub)
        .await?;
    Ok(HttpResponse::Ok().json(view))
}

/// POST /api/sessions/{id}/stories
///
/// With `create_in_tracker` and no `external_key`, the tracker is asked to
/// create an item first. A tracker failure still adds the story and is
/// reported in `tracker_sync`.
async fn add_story(
    path: web::Path<i64>,
    current_user: CurrentUser,
    body: ValidatedJson<AddStoryRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let body = body.into_inner();
    let added = sessions(&app_state)
        .add_story(
            path.into_inner(),
            &current_user.sub,
            AddStoryInput {
                title: body.title,
                roles: body.roles,
                external_key: body.external_key,
                create_in_tracker: body.create_in_tracker,
            },
        )
        .await?;
    Ok(HttpResponse::Created().json(added))
}

async fn delete_story(
    path: web::Path<(i64, i64)>,
    current_user: CurrentUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (session_id, story_id) = path.into_inner();
    sessions(&app_state)
        .delete_story(session_id, story_id, &current_user.sub)
        .await?;
    Ok(HttpResponse::NoContent().finish())
}

async fn begin_story(
    path: web::Path<(i64, i64)>,
    current_user: CurrentUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (session_id, story_id) = path.into_inner();
    let story = sessions(&app_state)
        .begin_story(session_id, story_id, &current_user.sub)
        .await?;
    Ok(HttpResponse::Ok().json(story))
}

/// POST /api/sessions/{id}/stories/{story_id}/votes
///
/// Casting again for the same role replaces the earlier value.
async fn cast_vote(
    path: web::Path<(i64, i64)>,
    current_user: CurrentUser,
    body: ValidatedJson<CastVoteRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (session_id, story_id) = path.into_inner();
    let body = body.into_inner();
    let story = sessions(&app_state)
        .cast_vote(session_id, story_id, &current_user.sub, &body.role, body.value)
        .await?;
    Ok(HttpResponse::Ok().json(story))
}

async fn reveal(
    path: web::Path<(i64, i64)>,
    current_user: CurrentUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (session_id, story_id) = path.into_inner();
    let story = sessions(&app_state)
        .reveal(session_id, story_id, &current_user.sub)
        .await?;
    Ok(HttpResponse::Ok().json(story))
}

async fn reopen(
    path: web::Path<(i64, i64)>,
    current_user: CurrentUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (session_id, story_id) = path.into_inner();
    let story = sessions(&app_state)
        .reopen(session_id, story_id, &current_user.sub)
        .await?;
    Ok(HttpResponse::Ok().json(story))
}

/// PUT /api/sessions/{id}/stories/{story_id}/final
async fn set_final_estimate(
    path: web::Path<(i64, i64)>,
    current_user: CurrentUser,
    body: ValidatedJson<FinalEstimateRequest>,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (session_id, story_id) = path.into_inner();
    let finalized = sessions(&app_state)
        .set_final_estimate(
            session_id,
            story_id,
            &current_user.sub,
            body.into_inner().estimates,
        )
        .await?;
    Ok(HttpResponse::Ok().json(finalized))
}

async fn tally(
    path: web::Path<(i64, i64)>,
    _current_user: CurrentUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, AppError> {
    let (session_id, story_id) = path.into_inner();
    let tally = sessions(&app_state).tally(session_id, story_id).await?;
    Ok(HttpResponse::Ok().json(tally))
}

pub fn configure_routes(cfg: &mut web::ServiceConfig) {
    cfg.service(web::resource("").route(web::post().to(create_session)));
    cfg.service(web::resource("/{id}").route(web::get().to(get_session)));
    cfg.service(web::resource("/{id}/start").route(web::post().to(start_session)));
    cfg.service(web::resource("/{id}/advance").route(web::post().to(advance)));
    cfg.service(web::resource("/{id}/complete").route(web::post().to(complete_session)));
    cfg.service(web::resource("/{id}/stories").route(web::post().to(add_story)));
    cfg.service(
        web::resource("/{id}/stories/{story_id}").route(web::delete().to(delete_story)),
    );
    cfg.service(
        web::resource("/{id}/stories/{story_id}/begin").route(web::post().to(begin_story)),
    );
    cfg.service(
        web::resource("/{id}/stories/{story_id}/votes").route(web::post().to(cast_vote)),
    );
    cfg.service(web::resource("/{id}/stories/{story_id}/reveal").route(web::post().to(reveal)));
    cfg.service(web::resource("/{id}/stories/{story_id}/reopen").route(web::post().to(reopen)));
    cfg.service(
        web::resource("/{id}/stories/{story_id}/final").route(web::put().to(set_final_estimate)),
    );
    cfg.service(web::resource("/{id}/stories/{story_id}/tally").route(web::get().to(tally)));
}
