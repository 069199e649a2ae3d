//! Closed set of room events fanned out to every presence.

use serde::Serialize;
use time::OffsetDateTime;
use uuid::Uuid;

use crate::domain::role::Role;
use crate::domain::snapshot::Participant;
use crate::domain::story::{RoleEstimates, Story};
use crate::domain::votes::{Ballot, Tally, Vote};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum StoryChange {
    Added,
    VotingStarted,
    Reopened,
    Removed,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoomEvent {
    SessionStarted {
        session_id: i64,
        #[serde(with = "time::serde::rfc3339")]
        started_at: OffsetDateTime,
    },
    StoryChanged {
        change: StoryChange,
        story: Story,
    },
    /// Value is never part of this event.
    VoteCast {
        story_id: i64,
        voter_id: String,
        role: Role,
        ballots: Vec<Ballot>,
        tally: Tally,
    },
    VotesRevealed {
        story_id: i64,
        votes: Vec<Vote>,
        tally: Tally,
    },
    StoryCompleted {
        story_id: i64,
        final_estimate: RoleEstimates,
    },
    ParticipantJoined {
        participant: Participant,
    },
    ParticipantLeft {
        presence_id: Uuid,
        identity: String,
    },
    SessionCompleted {
        session_id: i64,
        #[serde(with = "time::serde::rfc3339")]
        completed_at: OffsetDateTime,
    },
}

impl RoomEvent {
    pub fn name(&self) -> &'static str {
        match self {
            RoomEvent::SessionStarted { .. } => "session_started",
            RoomEvent::StoryChanged { .. } => "story_changed",
            RoomEvent::VoteCast { .. } => "vote_cast",
            RoomEvent::VotesRevealed { .. } => "votes_revealed",
            RoomEvent::StoryCompleted { .. } => "story_completed",
            RoomEvent::ParticipantJoined { .. } => "participant_joined",
            RoomEvent::ParticipantLeft { .. } => "participant_left",
            RoomEvent::SessionCompleted { .. } => "session_completed",
        }
    }
}
