//! Session operations for the HTTP and websocket surfaces.
//!
//! Everything that touches a live room goes through its coordinator via the
//! registry. Issue tracker calls happen here, outside the room task.

use std::collections::BTreeMap;
use std::sync::Arc;

use dashmap::DashMap;
use serde::Serialize;
use time::OffsetDateTime;
use tracing::{info, warn};
use uuid::Uuid;

use crate::domain::story::normalize_external_key;
use crate::domain::{NewSession, Participant, Role, Session, SessionView, Story, StoryView, Tally};
use crate::errors::domain::{ConflictKind, DomainError, InfraErrorKind, NotFoundKind};
use crate::repos::EstimationStore;
use crate::services::broadcaster::PresenceSink;
use crate::services::coordinator::{Mutation, RoomCommand};
use crate::services::registry::RoomRegistry;
use crate::services::tracker::{IssueTracker, TrackerSync};
use crate::utils::room_code::{generate_room_code, normalize_room_code, DEFAULT_ROOM_CODE_LEN};

/// Attempts at drawing an unused room code before giving up.
pub const ROOM_CODE_ATTEMPTS: usize = 8;

#[derive(Debug, Clone)]
pub struct AddStoryInput {
    pub title: String,
    pub roles: Vec<String>,
    pub external_key: Option<String>,
    /// Ask the tracker to create an item for this story.
    pub create_in_tracker: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct AddedStory {
    pub story: Story,
    pub tracker_sync: TrackerSync,
}

#[derive(Debug, Clone, Serialize)]
pub struct FinalizedStory {
    pub story: StoryView,
    pub tracker_sync: TrackerSync,
}

pub struct SessionService {
    store: Arc<dyn EstimationStore>,
    registry: Arc<RoomRegistry>,
    tracker: Arc<dyn IssueTracker>,
    room_code_len: usize,
    /// Room codes never change, so id → code lookups are cached.
    codes: DashMap<i64, String>,
}

impl SessionService {
    pub fn new(
        store: Arc<dyn EstimationStore>,
        registry: Arc<RoomRegistry>,
        tracker: Arc<dyn IssueTracker>,
    ) -> Self {
        Self {
            store,
            registry,
            tracker,
            room_code_len: DEFAULT_ROOM_CODE_LEN,
            codes: DashMap::new(),
        }
    }

    pub fn with_room_code_len(mut self, len: usize) -> Self {
        self.room_code_len = len.max(1);
        self
    }

    pub fn registry(&self) -> &Arc<RoomRegistry> {
        &self.registry
    }

    pub async fn create_session(
        &self,
        team_id: i64,
        planning_unit_key: &str,
        facilitator: &str,
    ) -> Result<Session, DomainError> {
        let now = OffsetDateTime::now_utc();
        // Validate once up front so bad input is not masked by retries.
        let template = NewSession::new(team_id, planning_unit_key, facilitator, String::new(), now)?;

        for attempt in 1..=ROOM_CODE_ATTEMPTS {
            let code = generate_room_code(self.room_code_len);
            if self.registry.contains(&code) || self.store.room_code_exists(&code).await? {
                warn!(attempt, "room code collision");
                continue;
            }
            let new = NewSession {
                room_code: code,
                ..template.clone()
            };
            match self.store.insert_session(new).await {
                Ok(session) => {
                    info!(
                        session_id = session.id,
                        room_code = %session.room_code,
                        team_id,
                        "session created"
                    );
                    self.codes.insert(session.id, session.room_code.clone());
                    return Ok(session);
                }
                Err(DomainError::Conflict(ConflictKind::UniqueViolation, _)) => {
                    warn!(attempt, "room code taken concurrently");
                }
                Err(err) => return Err(err),
            }
        }
        Err(DomainError::conflict(
            ConflictKind::RoomCodeConflict,
            "could not allocate a unique room code",
        ))
    }

    async fn room_code(&self, session_id: i64) -> Result<String, DomainError> {
        if let Some(code) = self.codes.get(&session_id) {
            return Ok(code.clone());
        }
        let session = self.store.find_session(session_id).await?.ok_or_else(|| {
            DomainError::not_found(
                NotFoundKind::Session,
                format!("session {session_id} not found"),
            )
        })?;
        self.codes.insert(session_id, session.room_code.clone());
        Ok(session.room_code)
    }

    pub async fn session_view(
        &self,
        session_id: i64,
        viewer: &str,
    ) -> Result<SessionView, DomainError> {
        let code = self.room_code(session_id).await?;
        self.resolve(&code, viewer).await
    }

    /// Look a room up by its shareable code. Works for completed sessions.
    pub async fn resolve(&self, room_code: &str, viewer: &str) -> Result<SessionView, DomainError> {
        let code = parse_code(room_code)?;
        self.registry
            .request(&code, |reply| RoomCommand::View {
                viewer: viewer.to_string(),
                reply,
            })
            .await
    }

    pub async fn presence(&self, room_code: &str) -> Result<Vec<Participant>, DomainError> {
        let code = parse_code(room_code)?;
        self.registry
            .request(&code, |reply| RoomCommand::Presence { reply })
            .await
    }

    pub async fn tally(&self, session_id: i64, story_id: i64) -> Result<Tally, DomainError> {
        let code = self.room_code(session_id).await?;
        self.registry
            .request(&code, |reply| RoomCommand::Tally { story_id, reply })
            .await?
    }

    pub async fn add_story(
        &self,
        session_id: i64,
        actor: &str,
        input: AddStoryInput,
    ) -> Result<AddedStory, DomainError> {
        let code = self.room_code(session_id).await?;

        let mut external_key = normalize_external_key(input.external_key.as_deref())?;
        let mut tracker_sync = TrackerSync::skipped();
        let mut created_key = None;
        if input.create_in_tracker && external_key.is_none() {
            let planning_unit = self
                .registry
                .request(&code, |reply| RoomCommand::CheckAddStory {
                    actor: actor.to_string(),
                    title: input.title.clone(),
                    roles: input.roles.clone(),
                    reply,
                })
                .await??;
            let roles = input
                .roles
                .iter()
                .map(|r| Role::parse(r))
                .collect::<Result<Vec<_>, _>>()?;
            match self
                .tracker
                .create_item(&planning_unit, input.title.trim(), &roles)
                .await
            {
                Ok(key) => {
                    info!(session_id, key = %key, "tracker item created");
                    created_key = Some(key.clone());
                    external_key = Some(key);
                    tracker_sync = TrackerSync::ok();
                }
                Err(err) => {
                    warn!(session_id, error = %err, "tracker item creation failed");
                    tracker_sync = TrackerSync::failed(&err);
                }
            }
        }

        let added = self
            .registry
            .request(&code, |reply| RoomCommand::AddStory {
                actor: actor.to_string(),
                title: input.title,
                roles: input.roles,
                external_key,
                reply,
            })
            .await
            .and_then(|added| added);
        let story = match (added, created_key) {
            (Ok(story), _) => story,
            (Err(err), Some(key)) => {
                warn!(
                    session_id,
                    key = %key,
                    error = %err,
                    "story rejected after its tracker item was created"
                );
                return Err(err);
            }
            (Err(err), None) => return Err(err),
        };
        Ok(AddedStory {
            story,
            tracker_sync,
        })
    }

    /// Apply a mutation to the room behind `room_code`.
    pub async fn mutate_room(
        &self,
        room_code: &str,
        actor: &str,
        mutation: Mutation,
    ) -> Result<SessionView, DomainError> {
        self.registry
            .request(room_code, |reply| RoomCommand::Mutate {
                actor: actor.to_string(),
                mutation,
                reply,
            })
            .await?
    }

    pub async fn mutate(
        &self,
        session_id: i64,
        actor: &str,
        mutation: Mutation,
    ) -> Result<SessionView, DomainError> {
        let code = self.room_code(session_id).await?;
        self.mutate_room(&code, actor, mutation).await
    }

    pub async fn start(&self, session_id: i64, actor: &str) -> Result<SessionView, DomainError> {
        self.mutate(session_id, actor, Mutation::Start).await
    }

    pub async fn advance(&self, session_id: i64, actor: &str) -> Result<SessionView, DomainError> {
        self.mutate(session_id, actor, Mutation::Advance).await
    }

    pub async fn complete(&self, session_id: i64, actor: &str) -> Result<SessionView, DomainError> {
        self.mutate(session_id, actor, Mutation::Complete).await
    }

    pub async fn delete_story(
        &self,
        session_id: i64,
        story_id: i64,
        actor: &str,
    ) -> Result<(), DomainError> {
        self.mutate(session_id, actor, Mutation::DeleteStory { story_id })
            .await
            .map(|_| ())
    }

    pub async fn story_mutation(
        &self,
        session_id: i64,
        story_id: i64,
        actor: &str,
        mutation: Mutation,
    ) -> Result<StoryView, DomainError> {
        let view = self.mutate(session_id, actor, mutation).await?;
        story_of(view, story_id)
    }

    pub async fn begin_story(
        &self,
        session_id: i64,
        story_id: i64,
        actor: &str,
    ) -> Result<StoryView, DomainError> {
        self.story_mutation(session_id, story_id, actor, Mutation::Begin { story_id })
            .await
    }

    pub async fn cast_vote(
        &self,
        session_id: i64,
        story_id: i64,
        voter: &str,
        role: &str,
        value: i64,
    ) -> Result<StoryView, DomainError> {
        let mutation = Mutation::Cast {
            story_id,
            role: role.to_string(),
            value,
        };
        self.story_mutation(session_id, story_id, voter, mutation).await
    }

    pub async fn reveal(
        &self,
        session_id: i64,
        story_id: i64,
        actor: &str,
    ) -> Result<StoryView, DomainError> {
        self.story_mutation(session_id, story_id, actor, Mutation::Reveal { story_id })
            .await
    }

    pub async fn reopen(
        &self,
        session_id: i64,
        story_id: i64,
        actor: &str,
    ) -> Result<StoryView, DomainError> {
        self.story_mutation(session_id, story_id, actor, Mutation::Reopen { story_id })
            .await
    }

    /// Record the final estimate, then push it to the tracker when the story
    /// is linked to an item.
    pub async fn set_final_estimate(
        &self,
        session_id: i64,
        story_id: i64,
        actor: &str,
        estimates: BTreeMap<String, i64>,
    ) -> Result<FinalizedStory, DomainError> {
        let code = self.room_code(session_id).await?;
        self.finalize_in_room(&code, story_id, actor, estimates)
            .await
    }

    /// Room-code form of [`SessionService::set_final_estimate`] for the
    /// websocket surface.
    pub async fn finalize_in_room(
        &self,
        room_code: &str,
        story_id: i64,
        actor: &str,
        estimates: BTreeMap<String, i64>,
    ) -> Result<FinalizedStory, DomainError> {
        let view = self
            .mutate_room(
                room_code,
                actor,
                Mutation::SetFinal {
                    story_id,
                    estimates,
                },
            )
            .await?;
        let story = story_of(view, story_id)?;

        let tracker_sync = match (&story.story.external_key, &story.story.final_estimate) {
            (Some(key), Some(hours)) => match self.tracker.push_estimate(key, hours).await {
                Ok(()) => TrackerSync::ok(),
                Err(err) => {
                    warn!(room_code, story_id, key = %key, error = %err, "estimate push failed");
                    TrackerSync::failed(&err)
                }
            },
            _ => TrackerSync::skipped(),
        };
        Ok(FinalizedStory {
            story,
            tracker_sync,
        })
    }

    pub async fn join(
        &self,
        room_code: &str,
        identity: &str,
        display_name: &str,
        role: Option<String>,
        sink: PresenceSink,
    ) -> Result<Uuid, DomainError> {
        let code = parse_code(room_code)?;
        let mut reopened = false;
        loop {
            let joined = self
                .registry
                .request(&code, |reply| RoomCommand::Join {
                    identity: identity.to_string(),
                    display_name: display_name.to_string(),
                    role: role.clone(),
                    sink: sink.clone(),
                    reply,
                })
                .await?;
            match joined {
                // The room was closing when the join was queued.
                Err(DomainError::Infra(InfraErrorKind::RoomUnavailable, _)) if !reopened => {
                    reopened = true;
                }
                joined => return joined,
            }
        }
    }

    pub async fn leave(&self, room_code: &str, presence_id: Uuid) {
        // A room that is gone has no presence to drop.
        if let Err(err) = self
            .registry
            .dispatch(room_code, RoomCommand::Leave { presence_id })
            .await
        {
            tracing::debug!(room_code, %presence_id, error = %err, "leave skipped");
        }
    }

    pub async fn set_role(
        &self,
        room_code: &str,
        presence_id: Uuid,
        role: Option<String>,
    ) -> Result<Participant, DomainError> {
        self.registry
            .request(room_code, |reply| RoomCommand::SetRole {
                presence_id,
                role,
                reply,
            })
            .await?
    }
}

fn parse_code(raw: &str) -> Result<String, DomainError> {
    normalize_room_code(raw)
        .ok_or_else(|| DomainError::not_found(NotFoundKind::Room, format!("room {raw} not found")))
}

fn story_of(view: SessionView, story_id: i64) -> Result<StoryView, DomainError> {
    view.stories
        .into_iter()
        .find(|s| s.story.id == story_id)
        .ok_or_else(|| {
            DomainError::not_found(NotFoundKind::Story, format!("story {story_id} not found"))
        })
}
