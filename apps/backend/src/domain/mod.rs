//! Domain layer: pure estimation workflow types and the room state machine.

pub mod events;
pub mod role;
pub mod room;
pub mod session;
pub mod snapshot;
pub mod story;
pub mod votes;

pub use events::{RoomEvent, StoryChange};
pub use role::{Role, MAX_ESTIMATE_HOURS};
pub use room::{Applied, RoomState, StoryEntry, Write};
pub use session::{NewSession, Session, SessionStatus};
pub use snapshot::{Participant, RoomSnapshot, SessionView, StoryView};
pub use story::{NewStory, RoleEstimates, Story, StoryStatus};
pub use votes::{Ballot, RoleTally, Tally, Vote, VoteLedger};

#[cfg(test)]
pub(crate) mod fixtures;
#[cfg(test)]
mod tests_props_room;
