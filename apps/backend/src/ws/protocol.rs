use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::domain::RoomSnapshot;
use crate::errors::ErrorCode;
use crate::services::broadcaster::Envelope;
use crate::services::coordinator::Mutation;
use crate::services::tracker::TrackerSync;

pub const PROTOCOL_VERSION: i32 = 1;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientMsg {
    Hello {
        protocol: i32,
        /// Role to take on join; may be changed later with `set_role`.
        #[serde(default)]
        role: Option<String>,
    },
    CastVote {
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
    SetFinalEstimate {
        story_id: i64,
        estimates: BTreeMap<String, i64>,
    },
    BeginStory {
        story_id: i64,
    },
    Advance,
    StartSession,
    CompleteSession,
    SetRole {
        #[serde(default)]
        role: Option<String>,
    },
}

impl ClientMsg {
    /// The room mutation this message requests, if it is one.
    pub fn into_mutation(self) -> Option<Mutation> {
        Some(match self {
            ClientMsg::CastVote {
                story_id,
                role,
                value,
            } => Mutation::Cast {
                story_id,
                role,
                value,
            },
            ClientMsg::Reveal { story_id } => Mutation::Reveal { story_id },
            ClientMsg::Reopen { story_id } => Mutation::Reopen { story_id },
            ClientMsg::SetFinalEstimate {
                story_id,
                estimates,
            } => Mutation::SetFinal {
                story_id,
                estimates,
            },
            ClientMsg::BeginStory { story_id } => Mutation::Begin { story_id },
            ClientMsg::Advance => Mutation::Advance,
            ClientMsg::StartSession => Mutation::Start,
            ClientMsg::CompleteSession => Mutation::Complete,
            ClientMsg::Hello { .. } | ClientMsg::SetRole { .. } => return None,
        })
    }
}

/// Outbound frames. Snapshot and event payloads are borrowed from the room's
/// shared copies.
#[derive(Debug, Serialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMsg<'a> {
    HelloAck {
        protocol: i32,
        presence_id: Uuid,
        room_code: &'a str,
    },
    Snapshot(&'a RoomSnapshot),
    Event(&'a Envelope),
    Ack {
        command: &'static str,
        /// Outcome of the tracker push after `set_final_estimate`.
        #[serde(skip_serializing_if = "Option::is_none")]
        tracker_sync: Option<TrackerSync>,
    },
    Error {
        code: ErrorCode,
        message: String,
    },
}
