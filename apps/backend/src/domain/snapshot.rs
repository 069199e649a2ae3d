//! Viewer-specific read models of a room.

use serde::Serialize;
use uuid::Uuid;

use crate::domain::role::Role;
use crate::domain::session::Session;
use crate::domain::story::{Story, StoryStatus};
use crate::domain::votes::{Ballot, Tally, Vote, VoteLedger};

/// A connected participant. Lives only as long as its connection.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Participant {
    pub presence_id: Uuid,
    pub identity: String,
    pub display_name: String,
    pub role: Option<Role>,
    pub facilitator: bool,
    pub connected: bool,
}

/// One story as seen by a particular viewer.
///
/// Other participants' values stay hidden until the story is revealed; the
/// viewer always sees their own ballots.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StoryView {
    #[serde(flatten)]
    pub story: Story,
    pub ballots: Vec<Ballot>,
    pub my_votes: Vec<Vote>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub votes: Option<Vec<Vote>>,
    pub tally: Tally,
}

impl StoryView {
    pub fn build(story: &Story, ledger: &VoteLedger, viewer: &str) -> Self {
        let revealed = matches!(story.status, StoryStatus::Voted | StoryStatus::Completed);
        Self {
            story: story.clone(),
            ballots: ledger.ballots(),
            my_votes: ledger.own_votes(viewer),
            votes: revealed.then(|| ledger.votes().to_vec()),
            tally: ledger.tally(&story.required_roles),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct SessionView {
    pub session: Session,
    pub stories: Vec<StoryView>,
    pub viewer_is_facilitator: bool,
}

/// Full state pushed to a presence on join.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct RoomSnapshot {
    #[serde(flatten)]
    pub view: SessionView,
    pub participants: Vec<Participant>,
    /// Sequence of the last event emitted before this snapshot.
    pub seq: u64,
}
