//! Persistence boundary for estimation sessions.

use async_trait::async_trait;

use crate::domain::{NewSession, NewStory, Session, Story, Vote, Write};
use crate::errors::domain::DomainError;

pub mod memory;
pub mod sea;

pub use memory::MemoryStore;
pub use sea::SeaStore;

/// A stored session with its stories and their ballots, stories in position
/// order and ballots in cast order.
pub type LoadedRoom = (Session, Vec<(Story, Vec<Vote>)>);

#[async_trait]
pub trait EstimationStore: Send + Sync {
    async fn insert_session(&self, new: NewSession) -> Result<Session, DomainError>;
    async fn find_session(&self, session_id: i64) -> Result<Option<Session>, DomainError>;
    async fn find_session_by_code(&self, room_code: &str)
        -> Result<Option<Session>, DomainError>;
    async fn room_code_exists(&self, room_code: &str) -> Result<bool, DomainError>;
    async fn update_session(&self, session: &Session) -> Result<(), DomainError>;

    async fn insert_story(&self, new: NewStory) -> Result<Story, DomainError>;
    async fn update_story(&self, story: &Story) -> Result<(), DomainError>;
    async fn delete_story(&self, story_id: i64) -> Result<(), DomainError>;
    async fn list_stories(&self, session_id: i64) -> Result<Vec<Story>, DomainError>;
    /// Save the story and drop its votes atomically.
    async fn reopen_story(&self, story: &Story) -> Result<(), DomainError>;

    async fn upsert_vote(&self, vote: &Vote) -> Result<(), DomainError>;
    async fn list_votes(&self, story_id: i64) -> Result<Vec<Vote>, DomainError>;

    /// Cheap liveness probe for health checks.
    async fn ping(&self) -> Result<(), DomainError>;

    async fn load_room(&self, room_code: &str) -> Result<Option<LoadedRoom>, DomainError> {
        let Some(session) = self.find_session_by_code(room_code).await? else {
            return Ok(None);
        };
        let mut stories = Vec::new();
        for story in self.list_stories(session.id).await? {
            let votes = self.list_votes(story.id).await?;
            stories.push((story, votes));
        }
        Ok(Some((session, stories)))
    }
}

/// Apply the writes of one accepted command, in order.
pub async fn persist(store: &dyn EstimationStore, writes: &[Write]) -> Result<(), DomainError> {
    for write in writes {
        match write {
            Write::Session(session) => store.update_session(session).await?,
            Write::Story(story) => store.update_story(story).await?,
            Write::ReopenStory(story) => store.reopen_story(story).await?,
            Write::Vote(vote) => store.upsert_vote(vote).await?,
            Write::DeleteStory(story_id) => store.delete_story(*story_id).await?,
        }
    }
    Ok(())
}
