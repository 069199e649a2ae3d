//! Per-room coordinator task.
//!
//! Every live room has exactly one task owning its [`RoomState`] and its
//! [`Broadcaster`]. Commands arrive over an mpsc queue and are handled one at
//! a time, so all mutations of a room are totally ordered. A command is
//! applied to a copy of the state, its writes are persisted, and only then is
//! the copy swapped in and the resulting events fanned out.

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;
use std::time::Duration;

use time::OffsetDateTime;
use tokio::sync::{mpsc, oneshot, watch};
use tracing::{debug, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::domain::{
    Applied, Participant, Role, RoomEvent, RoomSnapshot, RoomState, SessionStatus, SessionView,
    Story, Tally,
};
use crate::errors::domain::{ConflictKind, DomainError, InfraErrorKind};
use crate::repos::{persist, EstimationStore};
use crate::services::broadcaster::{Broadcaster, Envelope, Outbound, PresenceSink};

pub type Reply<T> = oneshot::Sender<Result<T, DomainError>>;

/// State changes that go through the room state machine unchanged.
#[derive(Debug, Clone, PartialEq)]
pub enum Mutation {
    Start,
    Advance,
    Complete,
    Begin {
        story_id: i64,
    },
    Cast {
        story_id: i64,
        role: String,
        value: i64,
    },
    Reveal {
        story_id: i64,
    },
    Reopen {
        story_id: i64,
    },
    SetFinal {
        story_id: i64,
        estimates: BTreeMap<String, i64>,
    },
    DeleteStory {
        story_id: i64,
    },
}

impl Mutation {
    pub fn name(&self) -> &'static str {
        match self {
            Mutation::Start => "start_session",
            Mutation::Advance => "advance",
            Mutation::Complete => "complete_session",
            Mutation::Begin { .. } => "begin_story",
            Mutation::Cast { .. } => "cast_vote",
            Mutation::Reveal { .. } => "reveal",
            Mutation::Reopen { .. } => "reopen",
            Mutation::SetFinal { .. } => "set_final_estimate",
            Mutation::DeleteStory { .. } => "delete_story",
        }
    }

    fn apply(
        &self,
        room: &mut RoomState,
        actor: &str,
        now: OffsetDateTime,
    ) -> Result<Applied, DomainError> {
        match self {
            Mutation::Start => room.start(actor, now),
            Mutation::Advance => room.advance(actor),
            Mutation::Complete => room.complete(actor, now),
            Mutation::Begin { story_id } => room.begin_story(actor, *story_id),
            Mutation::Cast {
                story_id,
                role,
                value,
            } => room.cast_vote(actor, *story_id, role, *value, now),
            Mutation::Reveal { story_id } => room.reveal(actor, *story_id),
            Mutation::Reopen { story_id } => room.reopen(actor, *story_id),
            Mutation::SetFinal {
                story_id,
                estimates,
            } => room.set_final_estimate(actor, *story_id, estimates, now),
            Mutation::DeleteStory { story_id } => room.delete_story(actor, *story_id),
        }
    }
}

pub enum RoomCommand {
    Join {
        identity: String,
        display_name: String,
        role: Option<String>,
        sink: PresenceSink,
        reply: Reply<Uuid>,
    },
    Leave {
        presence_id: Uuid,
    },
    SetRole {
        presence_id: Uuid,
        role: Option<String>,
        reply: Reply<Participant>,
    },
    /// Validate an add-story request without applying it. Replies with the
    /// session's planning-unit key for the tracker call.
    CheckAddStory {
        actor: String,
        title: String,
        roles: Vec<String>,
        reply: Reply<String>,
    },
    AddStory {
        actor: String,
        title: String,
        roles: Vec<String>,
        external_key: Option<String>,
        reply: Reply<Story>,
    },
    Mutate {
        actor: String,
        mutation: Mutation,
        reply: Reply<SessionView>,
    },
    View {
        viewer: String,
        reply: oneshot::Sender<SessionView>,
    },
    Tally {
        story_id: i64,
        reply: Reply<Tally>,
    },
    Presence {
        reply: oneshot::Sender<Vec<Participant>>,
    },
}

#[derive(Debug, Clone, Copy)]
pub struct RoomConfig {
    /// A room with no presences exits after this long without a command.
    pub idle_timeout: Duration,
    pub command_buffer: usize,
    pub presence_buffer: usize,
}

impl Default for RoomConfig {
    fn default() -> Self {
        Self {
            idle_timeout: Duration::from_secs(300),
            command_buffer: 64,
            presence_buffer: 64,
        }
    }
}

/// Sending side of a room task.
#[derive(Debug, Clone)]
pub struct RoomHandle {
    room_code: Arc<str>,
    tx: mpsc::Sender<RoomCommand>,
    done: watch::Receiver<()>,
}

impl RoomHandle {
    pub fn room_code(&self) -> &str {
        &self.room_code
    }

    pub fn is_closed(&self) -> bool {
        self.tx.is_closed()
    }

    /// Hand back the command if the task has already stopped.
    pub async fn send(&self, cmd: RoomCommand) -> Result<(), RoomCommand> {
        self.tx.send(cmd).await.map_err(|e| e.0)
    }

    /// Resolve once the task has handled its last command.
    pub async fn finished(&self) {
        let mut done = self.done.clone();
        while done.changed().await.is_ok() {}
    }
}

pub fn spawn_room(
    state: RoomState,
    store: Arc<dyn EstimationStore>,
    config: RoomConfig,
) -> RoomHandle {
    let room_code: Arc<str> = Arc::from(state.session().room_code.as_str());
    let (tx, rx) = mpsc::channel(config.command_buffer.max(1));
    let (done_tx, done) = watch::channel(());
    let span = info_span!("room", room_code = %room_code, session_id = state.session().id);
    let coordinator = Coordinator {
        state,
        broadcaster: Broadcaster::new(),
        seq: 0,
        store,
        config,
    };
    tokio::spawn(
        async move {
            coordinator.run(rx).await;
            drop(done_tx);
        }
        .instrument(span),
    );
    RoomHandle {
        room_code,
        tx,
        done,
    }
}

struct Coordinator {
    state: RoomState,
    broadcaster: Broadcaster,
    seq: u64,
    store: Arc<dyn EstimationStore>,
    config: RoomConfig,
}

impl Coordinator {
    async fn run(mut self, mut rx: mpsc::Receiver<RoomCommand>) {
        info!(status = %self.state.session().status, "room opened");
        loop {
            match tokio::time::timeout(self.config.idle_timeout, rx.recv()).await {
                Ok(Some(cmd)) => self.handle(cmd).await,
                Ok(None) => break,
                Err(_) if self.broadcaster.is_empty() => {
                    self.drain(&mut rx).await;
                    break;
                }
                Err(_) => {}
            }
        }
        info!(seq = self.seq, presences = self.broadcaster.len(), "room closed");
    }

    /// Stop taking commands, then finish the ones already queued. Queued
    /// joins are refused; the caller reopens the room.
    async fn drain(&mut self, rx: &mut mpsc::Receiver<RoomCommand>) {
        rx.close();
        while let Some(cmd) = rx.recv().await {
            match cmd {
                RoomCommand::Join { identity, reply, .. } => {
                    debug!(identity = %identity, "join refused while closing");
                    let _ = reply.send(Err(DomainError::infra(
                        InfraErrorKind::RoomUnavailable,
                        "room is closing",
                    )));
                }
                cmd => self.handle(cmd).await,
            }
        }
    }

    async fn handle(&mut self, cmd: RoomCommand) {
        match cmd {
            RoomCommand::Join {
                identity,
                display_name,
                role,
                sink,
                reply,
            } => {
                let _ = reply.send(self.join(identity, display_name, role, sink));
            }
            RoomCommand::Leave { presence_id } => self.leave(presence_id),
            RoomCommand::SetRole {
                presence_id,
                role,
                reply,
            } => {
                let _ = reply.send(self.set_role(presence_id, role));
            }
            RoomCommand::CheckAddStory {
                actor,
                title,
                roles,
                reply,
            } => {
                let checked = self
                    .state
                    .prepare_story(&actor, &title, &roles, None, OffsetDateTime::now_utc())
                    .map(|_| self.state.session().planning_unit_key.clone());
                let _ = reply.send(checked);
            }
            RoomCommand::AddStory {
                actor,
                title,
                roles,
                external_key,
                reply,
            } => {
                let added = self.add_story(&actor, &title, &roles, external_key).await;
                let _ = reply.send(added);
            }
            RoomCommand::Mutate {
                actor,
                mutation,
                reply,
            } => {
                let result = self.mutate(&actor, &mutation).await;
                if let Err(err) = &result {
                    debug!(command = mutation.name(), actor = %actor, error = %err, "command rejected");
                }
                let _ = reply.send(result);
            }
            RoomCommand::View { viewer, reply } => {
                let _ = reply.send(self.state.view(&viewer));
            }
            RoomCommand::Tally { story_id, reply } => {
                let _ = reply.send(self.state.tally(story_id));
            }
            RoomCommand::Presence { reply } => {
                let _ = reply.send(self.broadcaster.participants());
            }
        }
    }

    fn join(
        &mut self,
        identity: String,
        display_name: String,
        role: Option<String>,
        sink: PresenceSink,
    ) -> Result<Uuid, DomainError> {
        if self.state.session().status == SessionStatus::Completed {
            return Err(DomainError::conflict(
                ConflictKind::RoomClosed,
                "session is completed",
            ));
        }
        let role = role.as_deref().map(Role::parse).transpose()?;
        let participant = Participant {
            presence_id: Uuid::new_v4(),
            facilitator: self.state.session().is_facilitator(&identity),
            identity,
            display_name,
            role,
            connected: true,
        };

        let mut participants = self.broadcaster.participants();
        participants.push(participant.clone());
        let snapshot = RoomSnapshot {
            view: self.state.view(&participant.identity),
            participants,
            seq: self.seq,
        };
        // The snapshot goes first so the joiner never sees an event it
        // cannot place.
        sink.try_send(Outbound::Snapshot(Box::new(snapshot)))
            .map_err(|_| {
                DomainError::infra(InfraErrorKind::RoomUnavailable, "presence queue unavailable")
            })?;

        let presence_id = participant.presence_id;
        info!(%presence_id, identity = %participant.identity, "participant joined");
        self.broadcaster.add(participant.clone(), sink);
        self.publish(vec![RoomEvent::ParticipantJoined { participant }]);
        Ok(presence_id)
    }

    fn leave(&mut self, presence_id: Uuid) {
        if let Some(participant) = self.broadcaster.remove(presence_id) {
            info!(%presence_id, identity = %participant.identity, "participant left");
            self.publish(vec![RoomEvent::ParticipantLeft {
                presence_id,
                identity: participant.identity,
            }]);
        }
    }

    /// A role change is re-announced as `participant_joined` for the same
    /// presence id; clients upsert by presence.
    fn set_role(
        &mut self,
        presence_id: Uuid,
        role: Option<String>,
    ) -> Result<Participant, DomainError> {
        let role = role.as_deref().map(Role::parse).transpose()?;
        let participant = self.broadcaster.set_role(presence_id, role).ok_or_else(|| {
            DomainError::not_found(
                crate::errors::domain::NotFoundKind::Other("presence".into()),
                format!("presence {presence_id} not found"),
            )
        })?;
        self.publish(vec![RoomEvent::ParticipantJoined {
            participant: participant.clone(),
        }]);
        Ok(participant)
    }

    async fn add_story(
        &mut self,
        actor: &str,
        title: &str,
        roles: &[String],
        external_key: Option<String>,
    ) -> Result<Story, DomainError> {
        let new = self
            .state
            .prepare_story(actor, title, roles, external_key, OffsetDateTime::now_utc())?;
        let story = self.store.insert_story(new).await?;
        let applied = self.state.attach_story(story.clone());
        info!(story_id = story.id, position = story.position, "story added");
        self.publish(applied.events);
        Ok(story)
    }

    async fn mutate(&mut self, actor: &str, mutation: &Mutation) -> Result<SessionView, DomainError> {
        let mut next = self.state.clone();
        let applied = mutation.apply(&mut next, actor, OffsetDateTime::now_utc())?;
        if let Err(err) = persist(self.store.as_ref(), &applied.writes).await {
            warn!(command = mutation.name(), error = %err, "persist failed, state unchanged");
            return Err(err);
        }
        self.state = next;
        if !applied.events.is_empty() {
            info!(command = mutation.name(), actor = %actor, "command applied");
        }
        self.publish(applied.events);
        Ok(self.state.view(actor))
    }

    /// Sequence and fan out events. Presences dropped along the way are
    /// announced as having left, after the event that dropped them.
    fn publish(&mut self, events: Vec<RoomEvent>) {
        let mut queue: VecDeque<RoomEvent> = events.into();
        while let Some(event) = queue.pop_front() {
            self.seq += 1;
            let envelope = Arc::new(Envelope {
                seq: self.seq,
                event,
            });
            debug!(seq = envelope.seq, event = envelope.event.name(), "broadcast");
            for (participant, reason) in self.broadcaster.fan_out(envelope) {
                debug!(presence_id = %participant.presence_id, ?reason, "presence dropped");
                queue.push_back(RoomEvent::ParticipantLeft {
                    presence_id: participant.presence_id,
                    identity: participant.identity,
                });
            }
        }
    }
}
