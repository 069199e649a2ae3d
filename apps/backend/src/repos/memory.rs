//! In-memory store used by tests and `DB_KIND=memory`.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

use async_trait::async_trait;
use parking_lot::Mutex;

use crate::domain::{NewSession, NewStory, Session, Story, Vote};
use crate::errors::domain::{ConflictKind, DomainError, InfraErrorKind, NotFoundKind};
use crate::repos::EstimationStore;

#[derive(Debug, Default)]
struct Inner {
    next_session_id: i64,
    next_story_id: i64,
    sessions: BTreeMap<i64, Session>,
    stories: BTreeMap<i64, Story>,
    /// Per story, in cast order.
    votes: BTreeMap<i64, Vec<Vote>>,
}

#[derive(Debug, Default)]
pub struct MemoryStore {
    inner: Mutex<Inner>,
    fail_next_write: AtomicBool,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make the next write fail with an infra error.
    pub fn fail_next_write(&self) {
        self.fail_next_write.store(true, Ordering::SeqCst);
    }

    fn check_write(&self) -> Result<(), DomainError> {
        if self.fail_next_write.swap(false, Ordering::SeqCst) {
            return Err(DomainError::infra(
                InfraErrorKind::DbUnavailable,
                "injected write failure",
            ));
        }
        Ok(())
    }
}

fn missing_story(story_id: i64) -> DomainError {
    DomainError::not_found(NotFoundKind::Story, format!("story {story_id} not found"))
}

#[async_trait]
impl EstimationStore for MemoryStore {
    async fn insert_session(&self, new: NewSession) -> Result<Session, DomainError> {
        self.check_write()?;
        let mut inner = self.inner.lock();
        if inner.sessions.values().any(|s| s.room_code == new.room_code) {
            return Err(DomainError::conflict(
                ConflictKind::UniqueViolation,
                format!("room code {} already in use", new.room_code),
            ));
        }
        inner.next_session_id += 1;
        let session = new.into_session(inner.next_session_id);
        inner.sessions.insert(session.id, session.clone());
        Ok(session)
    }

    async fn find_session(&self, session_id: i64) -> Result<Option<Session>, DomainError> {
        Ok(self.inner.lock().sessions.get(&session_id).cloned())
    }

    async fn find_session_by_code(
        &self,
        room_code: &str,
    ) -> Result<Option<Session>, DomainError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .values()
            .find(|s| s.room_code == room_code)
            .cloned())
    }

    async fn room_code_exists(&self, room_code: &str) -> Result<bool, DomainError> {
        Ok(self
            .inner
            .lock()
            .sessions
            .values()
            .any(|s| s.room_code == room_code))
    }

    async fn update_session(&self, session: &Session) -> Result<(), DomainError> {
        self.check_write()?;
        let mut inner = self.inner.lock();
        let stored = inner.sessions.get_mut(&session.id).ok_or_else(|| {
            DomainError::not_found(
                NotFoundKind::Session,
                format!("session {} not found", session.id),
            )
        })?;
        stored.status = session.status;
        stored.started_at = session.started_at;
        stored.completed_at = session.completed_at;
        Ok(())
    }

    async fn insert_story(&self, new: NewStory) -> Result<Story, DomainError> {
        self.check_write()?;
        let mut inner = self.inner.lock();
        inner.next_story_id += 1;
        let story = new.into_story(inner.next_story_id);
        inner.stories.insert(story.id, story.clone());
        Ok(story)
    }

    async fn update_story(&self, story: &Story) -> Result<(), DomainError> {
        self.check_write()?;
        let mut inner = self.inner.lock();
        let stored = inner
            .stories
            .get_mut(&story.id)
            .ok_or_else(|| missing_story(story.id))?;
        stored.status = story.status;
        stored.final_estimate = story.final_estimate.clone();
        stored.completed_at = story.completed_at;
        Ok(())
    }

    async fn delete_story(&self, story_id: i64) -> Result<(), DomainError> {
        self.check_write()?;
        let mut inner = self.inner.lock();
        inner
            .stories
            .remove(&story_id)
            .ok_or_else(|| missing_story(story_id))?;
        inner.votes.remove(&story_id);
        Ok(())
    }

    async fn list_stories(&self, session_id: i64) -> Result<Vec<Story>, DomainError> {
        let inner = self.inner.lock();
        let mut stories: Vec<Story> = inner
            .stories
            .values()
            .filter(|s| s.session_id == session_id)
            .cloned()
            .collect();
        stories.sort_by_key(|s| s.position);
        Ok(stories)
    }

    async fn reopen_story(&self, story: &Story) -> Result<(), DomainError> {
        self.check_write()?;
        let mut inner = self.inner.lock();
        let stored = inner
            .stories
            .get_mut(&story.id)
            .ok_or_else(|| missing_story(story.id))?;
        stored.status = story.status;
        stored.final_estimate = story.final_estimate.clone();
        stored.completed_at = story.completed_at;
        inner.votes.remove(&story.id);
        Ok(())
    }

    async fn upsert_vote(&self, vote: &Vote) -> Result<(), DomainError> {
        self.check_write()?;
        let mut inner = self.inner.lock();
        if !inner.stories.contains_key(&vote.story_id) {
            return Err(missing_story(vote.story_id));
        }
        let ballots = inner.votes.entry(vote.story_id).or_default();
        ballots.retain(|v| !(v.voter_id == vote.voter_id && v.role == vote.role));
        ballots.push(vote.clone());
        Ok(())
    }

    async fn list_votes(&self, story_id: i64) -> Result<Vec<Vote>, DomainError> {
        Ok(self
            .inner
            .lock()
            .votes
            .get(&story_id)
            .cloned()
            .unwrap_or_default())
    }

    async fn ping(&self) -> Result<(), DomainError> {
        Ok(())
    }
}
