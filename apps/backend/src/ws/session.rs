use std::time::{Duration, Instant};

use actix::prelude::*;
use actix_web::{web, Error, HttpRequest, HttpResponse};
use actix_web_actors::ws;
use tokio::sync::mpsc;
use tokio_stream::wrappers::ReceiverStream;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::error::AppError;
use crate::errors::domain::DomainError;
use crate::errors::ErrorCode;
use crate::extractors::current_user::CurrentUser;
use crate::services::broadcaster::Outbound;
use crate::services::sessions::FinalizedStory;
use crate::state::app_state::AppState;
use crate::utils::room_code::normalize_room_code;
use crate::ws::protocol::{ClientMsg, ServerMsg, PROTOCOL_VERSION};

const HEARTBEAT_INTERVAL: Duration = Duration::from_secs(20);
const CLIENT_TIMEOUT: Duration = Duration::from_secs(40);

/// GET /ws/rooms/{code}
///
/// The room must exist before the upgrade is accepted; joining happens on
/// the client's `hello`.
pub async fn upgrade(
    req: HttpRequest,
    stream: web::Payload,
    path: web::Path<String>,
    current_user: CurrentUser,
    app_state: web::Data<AppState>,
) -> Result<HttpResponse, Error> {
    let raw = path.into_inner();
    let room_code = normalize_room_code(&raw).ok_or_else(|| {
        AppError::not_found(ErrorCode::RoomNotFound, format!("room {raw} not found"))
    })?;
    app_state
        .sessions
        .resolve(&room_code, &current_user.sub)
        .await
        .map_err(AppError::from)?;

    let session = WsSession::new(room_code, current_user, app_state);
    ws::start(session, &req, stream)
}

pub struct WsSession {
    conn_id: Uuid,
    room_code: String,
    current_user: CurrentUser,
    app_state: web::Data<AppState>,

    last_heartbeat: Instant,
    hello_done: bool,
    presence_id: Option<Uuid>,
}

impl WsSession {
    fn new(room_code: String, current_user: CurrentUser, app_state: web::Data<AppState>) -> Self {
        Self {
            conn_id: Uuid::new_v4(),
            room_code,
            current_user,
            app_state,
            last_heartbeat: Instant::now(),
            hello_done: false,
            presence_id: None,
        }
    }

    fn send_json(ctx: &mut ws::WebsocketContext<Self>, msg: &ServerMsg<'_>) {
        match serde_json::to_string(msg) {
            Ok(payload) => ctx.text(payload),
            Err(err) => warn!(error = %err, "failed to serialize outbound message"),
        }
    }

    fn send_error(ctx: &mut ws::WebsocketContext<Self>, err: DomainError) {
        let err = AppError::from(err);
        Self::send_json(
            ctx,
            &ServerMsg::Error {
                code: err.code(),
                message: err.detail(),
            },
        );
    }

    fn send_error_and_close(
        &self,
        ctx: &mut ws::WebsocketContext<Self>,
        code: ErrorCode,
        message: impl Into<String>,
    ) {
        Self::send_json(
            ctx,
            &ServerMsg::Error {
                code,
                message: message.into(),
            },
        );
        ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Error)));
        ctx.stop();
    }

    fn start_heartbeat(&self, ctx: &mut ws::WebsocketContext<Self>) {
        ctx.run_interval(HEARTBEAT_INTERVAL, |actor, ctx| {
            if Instant::now().duration_since(actor.last_heartbeat) > CLIENT_TIMEOUT {
                warn!(
                    conn_id = %actor.conn_id,
                    room_code = %actor.room_code,
                    "heartbeat timed out"
                );
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Normal)));
                ctx.stop();
                return;
            }
            ctx.ping(b"keepalive");
        });
    }

    fn handle_hello(&mut self, protocol: i32, role: Option<String>, ctx: &mut ws::WebsocketContext<Self>) {
        if protocol != PROTOCOL_VERSION {
            self.send_error_and_close(ctx, ErrorCode::BadProtocol, "Unsupported protocol version");
            return;
        }
        if self.hello_done {
            Self::send_json(
                ctx,
                &ServerMsg::Error {
                    code: ErrorCode::BadRequest,
                    message: "hello already received".to_string(),
                },
            );
            return;
        }
        self.hello_done = true;

        let (sink, outbound) = mpsc::channel(self.app_state.presence_buffer());
        let sessions = self.app_state.sessions.clone();
        let room_code = self.room_code.clone();
        let user = self.current_user.clone();

        ctx.spawn(
            async move {
                sessions
                    .join(&room_code, &user.sub, &user.name, role, sink)
                    .await
            }
            .into_actor(self)
            .map(move |res, actor, ctx| match res {
                Ok(presence_id) => {
                    actor.presence_id = Some(presence_id);
                    info!(
                        conn_id = %actor.conn_id,
                        room_code = %actor.room_code,
                        %presence_id,
                        "joined room"
                    );
                    Self::send_json(
                        ctx,
                        &ServerMsg::HelloAck {
                            protocol: PROTOCOL_VERSION,
                            presence_id,
                            room_code: &actor.room_code,
                        },
                    );
                    // Snapshot is already queued ahead of any event.
                    ctx.add_stream(ReceiverStream::new(outbound));
                }
                Err(err) => {
                    let err = AppError::from(err);
                    warn!(
                        conn_id = %actor.conn_id,
                        room_code = %actor.room_code,
                        code = %err.code(),
                        "join rejected"
                    );
                    actor.send_error_and_close(ctx, err.code(), err.detail());
                }
            }),
        );
    }

    fn handle_set_role(&mut self, role: Option<String>, ctx: &mut ws::WebsocketContext<Self>) {
        let Some(presence_id) = self.presence_id else {
            Self::send_json(
                ctx,
                &ServerMsg::Error {
                    code: ErrorCode::BadRequest,
                    message: "not joined yet".to_string(),
                },
            );
            return;
        };
        let sessions = self.app_state.sessions.clone();
        let room_code = self.room_code.clone();
        ctx.spawn(
            async move { sessions.set_role(&room_code, presence_id, role).await }
                .into_actor(self)
                .map(|res, _actor, ctx| match res {
                    Ok(_) => Self::send_json(
                        ctx,
                        &ServerMsg::Ack {
                            command: "set_role",
                            tracker_sync: None,
                        },
                    ),
                    Err(err) => Self::send_error(ctx, err),
                }),
        );
    }

    fn handle_command(&mut self, msg: ClientMsg, ctx: &mut ws::WebsocketContext<Self>) {
        let sessions = self.app_state.sessions.clone();
        let room_code = self.room_code.clone();
        let actor_id = self.current_user.sub.clone();

        if let ClientMsg::SetFinalEstimate {
            story_id,
            estimates,
        } = msg
        {
            ctx.spawn(
                async move {
                    sessions
                        .finalize_in_room(&room_code, story_id, &actor_id, estimates)
                        .await
                }
                .into_actor(self)
                .map(|res: Result<FinalizedStory, DomainError>, _actor, ctx| match res {
                    Ok(done) => Self::send_json(
                        ctx,
                        &ServerMsg::Ack {
                            command: "set_final_estimate",
                            tracker_sync: Some(done.tracker_sync),
                        },
                    ),
                    Err(err) => Self::send_error(ctx, err),
                }),
            );
            return;
        }

        let Some(mutation) = msg.into_mutation() else {
            return;
        };
        let command = mutation.name();
        ctx.spawn(
            async move { sessions.mutate_room(&room_code, &actor_id, mutation).await }
                .into_actor(self)
                .map(move |res, actor, ctx| match res {
                    Ok(_) => Self::send_json(
                        ctx,
                        &ServerMsg::Ack {
                            command,
                            tracker_sync: None,
                        },
                    ),
                    Err(err) => {
                        debug!(conn_id = %actor.conn_id, command, error = %err, "command rejected");
                        Self::send_error(ctx, err);
                    }
                }),
        );
    }
}

impl Actor for WsSession {
    type Context = ws::WebsocketContext<Self>;

    fn started(&mut self, ctx: &mut Self::Context) {
        info!(
            conn_id = %self.conn_id,
            room_code = %self.room_code,
            identity = %self.current_user.sub,
            "ws session started"
        );
        self.start_heartbeat(ctx);
    }

    fn stopped(&mut self, _ctx: &mut Self::Context) {
        if let Some(presence_id) = self.presence_id.take() {
            let sessions = self.app_state.sessions.clone();
            let room_code = self.room_code.clone();
            actix::spawn(async move {
                sessions.leave(&room_code, presence_id).await;
            });
        }
        info!(
            conn_id = %self.conn_id,
            room_code = %self.room_code,
            "ws session stopped"
        );
    }
}

impl StreamHandler<Result<ws::Message, ws::ProtocolError>> for WsSession {
    fn handle(&mut self, msg: Result<ws::Message, ws::ProtocolError>, ctx: &mut Self::Context) {
        match msg {
            Ok(ws::Message::Ping(payload)) => {
                self.last_heartbeat = Instant::now();
                ctx.pong(&payload);
            }
            Ok(ws::Message::Pong(_)) => {
                self.last_heartbeat = Instant::now();
            }
            Ok(ws::Message::Text(text)) => {
                self.last_heartbeat = Instant::now();

                let Ok(cmd) = serde_json::from_str::<ClientMsg>(&text) else {
                    self.send_error_and_close(ctx, ErrorCode::BadRequest, "Malformed JSON");
                    return;
                };

                match cmd {
                    ClientMsg::Hello { protocol, role } => self.handle_hello(protocol, role, ctx),
                    _ if !self.hello_done => {
                        self.send_error_and_close(ctx, ErrorCode::BadRequest, "Must send hello first");
                    }
                    ClientMsg::SetRole { role } => self.handle_set_role(role, ctx),
                    other => self.handle_command(other, ctx),
                }
            }
            Ok(ws::Message::Binary(_)) => {
                self.last_heartbeat = Instant::now();
                self.send_error_and_close(ctx, ErrorCode::BadRequest, "Binary not supported");
            }
            Ok(ws::Message::Close(reason)) => {
                ctx.close(reason);
                ctx.stop();
            }
            Ok(ws::Message::Continuation(_)) | Ok(ws::Message::Nop) => {
                self.last_heartbeat = Instant::now();
            }
            Err(err) => {
                warn!(
                    conn_id = %self.conn_id,
                    room_code = %self.room_code,
                    error = %err,
                    "protocol error"
                );
                ctx.close(Some(ws::CloseReason::from(ws::CloseCode::Error)));
                ctx.stop();
            }
        }
    }
}

/// Frames queued by the room coordinator for this presence.
impl StreamHandler<Outbound> for WsSession {
    fn handle(&mut self, item: Outbound, ctx: &mut Self::Context) {
        match item {
            Outbound::Snapshot(snapshot) => Self::send_json(ctx, &ServerMsg::Snapshot(&snapshot)),
            Outbound::Event(envelope) => Self::send_json(ctx, &ServerMsg::Event(&envelope)),
        }
    }

    /// The room dropped this presence (stalled queue or room shut down).
    fn finished(&mut self, ctx: &mut Self::Context) {
        info!(
            conn_id = %self.conn_id,
            room_code = %self.room_code,
            "room stream ended, closing"
        );
        self.presence_id = None;
        ctx.close(Some(ws::CloseReason {
            code: ws::CloseCode::Away,
            description: Some("dropped by room".to_string()),
        }));
        ctx.stop();
    }
}
