//! Hand-built rooms for domain tests.

use time::macros::datetime;
use time::OffsetDateTime;

use crate::domain::role::parse_role_set;
use crate::domain::room::RoomState;
use crate::domain::session::{Session, SessionStatus};
use crate::domain::story::{NewStory, Story};

pub const FACILITATOR: &str = "fac-1";

pub fn t0() -> OffsetDateTime {
    datetime!(2025-10-16 09:00 UTC)
}

pub fn session(status: SessionStatus) -> Session {
    Session {
        id: 1,
        team_id: 7,
        planning_unit_key: "EPIC-9".to_string(),
        facilitator_id: FACILITATOR.to_string(),
        status,
        room_code: "ABC123".to_string(),
        created_at: t0(),
        started_at: (status != SessionStatus::Preparing).then(t0),
        completed_at: None,
    }
}

pub fn pending_story(id: i64, position: i32, roles: &[&str]) -> Story {
    NewStory {
        session_id: 1,
        external_key: None,
        title: format!("Story {id}"),
        required_roles: parse_role_set(roles).unwrap(),
        position,
        created_at: t0(),
    }
    .into_story(id)
}

/// Active room with `n` pending stories requiring {analysis, build}.
pub fn active_room(n: i64) -> RoomState {
    let stories = (1..=n)
        .map(|id| (pending_story(id, id as i32, &["analysis", "build"]), Vec::new()))
        .collect();
    RoomState::new(session(SessionStatus::Active), stories)
}

/// Active room whose first story is already open for voting.
pub fn voting_room() -> RoomState {
    let mut room = active_room(2);
    room.advance(FACILITATOR).unwrap();
    room
}
