pub mod sessions;
pub mod stories;
pub mod votes;

pub use sessions::Model as SessionRow;
pub use stories::Model as StoryRow;
pub use votes::Model as VoteRow;
