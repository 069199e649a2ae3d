//! Room state machine: a session, its ordered stories and their ledgers.
//!
//! Every mutation validates first and only then changes `self`, returning the
//! events to broadcast and the writes the store must apply. Callers that need
//! all-or-nothing semantics across persistence apply commands to a clone and
//! swap it in once the writes succeed.

use std::collections::BTreeMap;

use time::OffsetDateTime;

use crate::domain::events::{RoomEvent, StoryChange};
use crate::domain::role::{parse_hours, parse_role_set, Role};
use crate::domain::session::{Session, SessionStatus};
use crate::domain::snapshot::{SessionView, StoryView};
use crate::domain::story::{
    normalize_external_key, normalize_title, validate_final_estimate, NewStory, Story, StoryStatus,
};
use crate::domain::votes::{Tally, Vote, VoteLedger};
use crate::errors::domain::{
    ConflictKind, DomainError, ForbiddenKind, NotFoundKind, ValidationKind,
};

/// A persistence step produced by an accepted command.
#[derive(Debug, Clone, PartialEq)]
pub enum Write {
    Session(Session),
    Story(Story),
    /// Save the story and drop all of its votes in one transaction.
    ReopenStory(Story),
    Vote(Vote),
    DeleteStory(i64),
}

/// Outcome of an accepted command.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Applied {
    pub events: Vec<RoomEvent>,
    pub writes: Vec<Write>,
}

impl Applied {
    fn one(event: RoomEvent, write: Write) -> Self {
        Self {
            events: vec![event],
            writes: vec![write],
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct StoryEntry {
    pub story: Story,
    pub ledger: VoteLedger,
}

#[derive(Debug, Clone, PartialEq)]
pub struct RoomState {
    session: Session,
    /// Sorted by position.
    stories: Vec<StoryEntry>,
}

impl RoomState {
    pub fn new(session: Session, stories: Vec<(Story, Vec<Vote>)>) -> Self {
        let mut stories: Vec<StoryEntry> = stories
            .into_iter()
            .map(|(story, votes)| StoryEntry {
                story,
                ledger: VoteLedger::from_votes(votes),
            })
            .collect();
        stories.sort_by_key(|e| e.story.position);
        Self { session, stories }
    }

    pub fn session(&self) -> &Session {
        &self.session
    }

    pub fn stories(&self) -> &[StoryEntry] {
        &self.stories
    }

    pub fn story(&self, story_id: i64) -> Result<&StoryEntry, DomainError> {
        self.stories
            .iter()
            .find(|e| e.story.id == story_id)
            .ok_or_else(|| story_not_found(story_id))
    }

    fn story_index(&self, story_id: i64) -> Result<usize, DomainError> {
        self.stories
            .iter()
            .position(|e| e.story.id == story_id)
            .ok_or_else(|| story_not_found(story_id))
    }

    pub fn voting_story(&self) -> Option<&StoryEntry> {
        self.stories
            .iter()
            .find(|e| e.story.status == StoryStatus::Voting)
    }

    pub fn tally(&self, story_id: i64) -> Result<Tally, DomainError> {
        let entry = self.story(story_id)?;
        Ok(entry.ledger.tally(&entry.story.required_roles))
    }

    pub fn view(&self, viewer: &str) -> SessionView {
        SessionView {
            session: self.session.clone(),
            stories: self
                .stories
                .iter()
                .map(|e| StoryView::build(&e.story, &e.ledger, viewer))
                .collect(),
            viewer_is_facilitator: self.session.is_facilitator(viewer),
        }
    }

    pub fn story_view(&self, story_id: i64, viewer: &str) -> Result<StoryView, DomainError> {
        let entry = self.story(story_id)?;
        Ok(StoryView::build(&entry.story, &entry.ledger, viewer))
    }

    fn next_position(&self) -> i32 {
        self.stories
            .iter()
            .map(|e| e.story.position)
            .max()
            .map_or(1, |p| p + 1)
    }

    fn ensure_facilitator(&self, actor: &str) -> Result<(), DomainError> {
        if self.session.is_facilitator(actor) {
            Ok(())
        } else {
            Err(DomainError::forbidden(
                ForbiddenKind::NotFacilitator,
                "only the facilitator can do that",
            ))
        }
    }

    fn ensure_open(&self) -> Result<(), DomainError> {
        if self.session.status == SessionStatus::Completed {
            return Err(DomainError::conflict(
                ConflictKind::SessionCompleted,
                "session is completed",
            ));
        }
        Ok(())
    }

    fn ensure_active(&self) -> Result<(), DomainError> {
        self.ensure_open()?;
        if self.session.status != SessionStatus::Active {
            return Err(DomainError::conflict(
                ConflictKind::SessionNotActive,
                "session has not been started",
            ));
        }
        Ok(())
    }

    fn ensure_no_other_voting(&self, story_id: i64) -> Result<(), DomainError> {
        if self
            .stories
            .iter()
            .any(|e| e.story.id != story_id && e.story.status == StoryStatus::Voting)
        {
            return Err(DomainError::conflict(
                ConflictKind::StoryInProgress,
                "another story is currently being estimated",
            ));
        }
        Ok(())
    }

    /// Validate an add-story request and assign the next position.
    ///
    /// The returned story still needs an id from the store; hand the stored
    /// story back through [`RoomState::attach_story`].
    pub fn prepare_story<S: AsRef<str>>(
        &self,
        actor: &str,
        title: &str,
        roles: &[S],
        external_key: Option<String>,
        now: OffsetDateTime,
    ) -> Result<NewStory, DomainError> {
        self.ensure_facilitator(actor)?;
        self.ensure_open()?;
        Ok(NewStory {
            session_id: self.session.id,
            external_key: normalize_external_key(external_key.as_deref())?,
            title: normalize_title(title)?,
            required_roles: parse_role_set(roles)?,
            position: self.next_position(),
            created_at: now,
        })
    }

    pub fn attach_story(&mut self, story: Story) -> Applied {
        self.stories.push(StoryEntry {
            story: story.clone(),
            ledger: VoteLedger::new(),
        });
        self.stories.sort_by_key(|e| e.story.position);
        Applied {
            events: vec![RoomEvent::StoryChanged {
                change: StoryChange::Added,
                story,
            }],
            writes: Vec::new(),
        }
    }

    pub fn start(&mut self, actor: &str, now: OffsetDateTime) -> Result<Applied, DomainError> {
        self.ensure_facilitator(actor)?;
        self.ensure_open()?;
        if self.session.status != SessionStatus::Preparing {
            return Err(DomainError::conflict(
                ConflictKind::SessionAlreadyStarted,
                "session already started",
            ));
        }
        self.session.status = SessionStatus::Active;
        self.session.started_at = Some(now);
        Ok(Applied::one(
            RoomEvent::SessionStarted {
                session_id: self.session.id,
                started_at: now,
            },
            Write::Session(self.session.clone()),
        ))
    }

    /// Open the lowest-positioned pending story for voting.
    pub fn advance(&mut self, actor: &str) -> Result<Applied, DomainError> {
        self.ensure_facilitator(actor)?;
        self.ensure_active()?;
        if self.stories.iter().any(|e| e.story.status.in_progress()) {
            return Err(DomainError::conflict(
                ConflictKind::FinishCurrentStory,
                "finish current story first",
            ));
        }
        let idx = self
            .stories
            .iter()
            .position(|e| e.story.status == StoryStatus::Pending)
            .ok_or_else(|| {
                DomainError::conflict(ConflictKind::NoPendingStories, "no pending stories left")
            })?;
        Ok(self.open_voting(idx, StoryChange::VotingStarted))
    }

    pub fn begin_story(&mut self, actor: &str, story_id: i64) -> Result<Applied, DomainError> {
        self.ensure_facilitator(actor)?;
        self.ensure_active()?;
        let idx = self.story_index(story_id)?;
        if self.stories[idx].story.status != StoryStatus::Pending {
            return Err(DomainError::conflict(
                ConflictKind::StoryNotPending,
                format!("story {story_id} is not pending"),
            ));
        }
        self.ensure_no_other_voting(story_id)?;
        Ok(self.open_voting(idx, StoryChange::VotingStarted))
    }

    fn open_voting(&mut self, idx: usize, change: StoryChange) -> Applied {
        let entry = &mut self.stories[idx];
        entry.story.status = StoryStatus::Voting;
        let story = entry.story.clone();
        Applied::one(
            RoomEvent::StoryChanged {
                change,
                story: story.clone(),
            },
            Write::Story(story),
        )
    }

    pub fn cast_vote(
        &mut self,
        voter: &str,
        story_id: i64,
        role: &str,
        value: i64,
        now: OffsetDateTime,
    ) -> Result<Applied, DomainError> {
        self.ensure_open()?;
        let idx = self.story_index(story_id)?;
        let entry = &mut self.stories[idx];
        match entry.story.status {
            StoryStatus::Voting => {}
            StoryStatus::Voted => {
                return Err(DomainError::conflict(
                    ConflictKind::StoryAlreadyRevealed,
                    "story already revealed",
                ))
            }
            StoryStatus::Completed => {
                return Err(DomainError::conflict(
                    ConflictKind::StoryCompleted,
                    "story is completed",
                ))
            }
            StoryStatus::Pending => {
                return Err(DomainError::conflict(
                    ConflictKind::StoryNotVoting,
                    "story is not open for voting",
                ))
            }
        }
        let role = Role::parse(role)?;
        if !entry.story.required_roles.contains(&role) {
            return Err(DomainError::validation(
                ValidationKind::UnknownRole,
                format!("role {role} is not required by this story"),
            ));
        }
        let value = parse_hours(value)?;

        let vote = Vote {
            story_id,
            voter_id: voter.to_string(),
            role: role.clone(),
            value,
            cast_at: now,
        };
        entry.ledger.upsert(vote.clone());
        Ok(Applied::one(
            RoomEvent::VoteCast {
                story_id,
                voter_id: voter.to_string(),
                role,
                ballots: entry.ledger.ballots(),
                tally: entry.ledger.tally(&entry.story.required_roles),
            },
            Write::Vote(vote),
        ))
    }

    /// Reveal votes. Revealing an already revealed story is a no-op.
    pub fn reveal(&mut self, actor: &str, story_id: i64) -> Result<Applied, DomainError> {
        self.ensure_facilitator(actor)?;
        self.ensure_open()?;
        let idx = self.story_index(story_id)?;
        let entry = &mut self.stories[idx];
        match entry.story.status {
            StoryStatus::Voted => return Ok(Applied::default()),
            StoryStatus::Voting if entry.ledger.is_empty() => {
                return Err(DomainError::conflict(
                    ConflictKind::NoVotes,
                    "nothing to reveal",
                ))
            }
            StoryStatus::Voting => {}
            StoryStatus::Pending => {
                return Err(DomainError::conflict(
                    ConflictKind::StoryNotVoting,
                    "story is not open for voting",
                ))
            }
            StoryStatus::Completed => {
                return Err(DomainError::conflict(
                    ConflictKind::StoryCompleted,
                    "story is completed",
                ))
            }
        }
        entry.story.status = StoryStatus::Voted;
        Ok(Applied::one(
            RoomEvent::VotesRevealed {
                story_id,
                votes: entry.ledger.votes().to_vec(),
                tally: entry.ledger.tally(&entry.story.required_roles),
            },
            Write::Story(entry.story.clone()),
        ))
    }

    /// Send a revealed story back to voting with an empty ledger.
    pub fn reopen(&mut self, actor: &str, story_id: i64) -> Result<Applied, DomainError> {
        self.ensure_facilitator(actor)?;
        self.ensure_open()?;
        let idx = self.story_index(story_id)?;
        match self.stories[idx].story.status {
            StoryStatus::Voted => {}
            StoryStatus::Completed => {
                return Err(DomainError::conflict(
                    ConflictKind::StoryCompleted,
                    "story is completed",
                ))
            }
            StoryStatus::Pending | StoryStatus::Voting => {
                return Err(DomainError::conflict(
                    ConflictKind::StoryNotRevealed,
                    "only revealed stories can be re-opened",
                ))
            }
        }
        self.ensure_no_other_voting(story_id)?;

        let entry = &mut self.stories[idx];
        entry.ledger.clear();
        entry.story.status = StoryStatus::Voting;
        let story = entry.story.clone();
        Ok(Applied::one(
            RoomEvent::StoryChanged {
                change: StoryChange::Reopened,
                story: story.clone(),
            },
            Write::ReopenStory(story),
        ))
    }

    /// Record the facilitator's per-role decision and complete the story.
    pub fn set_final_estimate(
        &mut self,
        actor: &str,
        story_id: i64,
        estimates: &BTreeMap<String, i64>,
        now: OffsetDateTime,
    ) -> Result<Applied, DomainError> {
        self.ensure_facilitator(actor)?;
        self.ensure_open()?;
        let idx = self.story_index(story_id)?;
        let entry = &mut self.stories[idx];
        match entry.story.status {
            StoryStatus::Voted => {}
            StoryStatus::Completed => {
                return Err(DomainError::conflict(
                    ConflictKind::StoryCompleted,
                    "story already has a final estimate",
                ))
            }
            StoryStatus::Pending | StoryStatus::Voting => {
                return Err(DomainError::conflict(
                    ConflictKind::StoryNotRevealed,
                    "reveal votes before setting the final estimate",
                ))
            }
        }
        let final_estimate = validate_final_estimate(&entry.story.required_roles, estimates)?;

        entry.story.status = StoryStatus::Completed;
        entry.story.final_estimate = Some(final_estimate.clone());
        entry.story.completed_at = Some(now);
        Ok(Applied::one(
            RoomEvent::StoryCompleted {
                story_id,
                final_estimate,
            },
            Write::Story(entry.story.clone()),
        ))
    }

    /// Close the session. Pending stories stay pending.
    pub fn complete(&mut self, actor: &str, now: OffsetDateTime) -> Result<Applied, DomainError> {
        self.ensure_facilitator(actor)?;
        self.ensure_active()?;
        self.session.status = SessionStatus::Completed;
        self.session.completed_at = Some(now);
        Ok(Applied::one(
            RoomEvent::SessionCompleted {
                session_id: self.session.id,
                completed_at: now,
            },
            Write::Session(self.session.clone()),
        ))
    }

    pub fn delete_story(&mut self, actor: &str, story_id: i64) -> Result<Applied, DomainError> {
        self.ensure_facilitator(actor)?;
        self.ensure_open()?;
        let idx = self.story_index(story_id)?;
        if self.stories[idx].story.status != StoryStatus::Pending {
            return Err(DomainError::conflict(
                ConflictKind::StoryNotPending,
                "only pending stories can be deleted",
            ));
        }
        let removed = self.stories.remove(idx);
        Ok(Applied::one(
            RoomEvent::StoryChanged {
                change: StoryChange::Removed,
                story: removed.story,
            },
            Write::DeleteStory(story_id),
        ))
    }
}

fn story_not_found(story_id: i64) -> DomainError {
    DomainError::not_found(NotFoundKind::Story, format!("story {story_id} not found"))
}
