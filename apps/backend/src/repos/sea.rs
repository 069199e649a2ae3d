//! SeaORM-backed store (Postgres in production, SQLite in tests).

use std::collections::BTreeSet;

use async_trait::async_trait;
use sea_orm::{ConnectionTrait, DatabaseConnection, Statement, TransactionTrait};

use crate::adapters::sessions_sea::{self, SessionCreate, SessionProgress};
use crate::adapters::stories_sea::{self, StoryCreate, StoryProgress};
use crate::adapters::votes_sea::{self, VoteUpsert};
use crate::domain::{
    NewSession, NewStory, Role, RoleEstimates, Session, SessionStatus, Story, StoryStatus, Vote,
};
use crate::entities::sessions::SessionStatus as DbSessionStatus;
use crate::entities::stories::StoryStatus as DbStoryStatus;
use crate::entities::{SessionRow, StoryRow, VoteRow};
use crate::errors::domain::{DomainError, InfraErrorKind};
use crate::repos::EstimationStore;

#[derive(Debug, Clone)]
pub struct SeaStore {
    db: DatabaseConnection,
}

impl SeaStore {
    pub fn new(db: DatabaseConnection) -> Self {
        Self { db }
    }
}

fn corrupt(detail: impl Into<String>) -> DomainError {
    DomainError::infra(InfraErrorKind::DataCorruption, detail)
}

fn session_status_to_db(status: SessionStatus) -> DbSessionStatus {
    match status {
        SessionStatus::Preparing => DbSessionStatus::Preparing,
        SessionStatus::Active => DbSessionStatus::Active,
        SessionStatus::Completed => DbSessionStatus::Completed,
    }
}

fn story_status_to_db(status: StoryStatus) -> DbStoryStatus {
    match status {
        StoryStatus::Pending => DbStoryStatus::Pending,
        StoryStatus::Voting => DbStoryStatus::Voting,
        StoryStatus::Voted => DbStoryStatus::Voted,
        StoryStatus::Completed => DbStoryStatus::Completed,
    }
}

fn session_from_row(row: SessionRow) -> Session {
    Session {
        id: row.id,
        team_id: row.team_id,
        planning_unit_key: row.planning_unit_key,
        facilitator_id: row.facilitator_id,
        status: match row.status {
            DbSessionStatus::Preparing => SessionStatus::Preparing,
            DbSessionStatus::Active => SessionStatus::Active,
            DbSessionStatus::Completed => SessionStatus::Completed,
        },
        room_code: row.room_code,
        created_at: row.created_at,
        started_at: row.started_at,
        completed_at: row.completed_at,
    }
}

fn story_from_row(row: StoryRow) -> Result<Story, DomainError> {
    let required_roles: BTreeSet<Role> = serde_json::from_str(&row.required_roles)
        .map_err(|e| corrupt(format!("story {} required_roles: {e}", row.id)))?;
    let final_estimate: Option<RoleEstimates> = row
        .final_estimate
        .as_deref()
        .map(serde_json::from_str)
        .transpose()
        .map_err(|e| corrupt(format!("story {} final_estimate: {e}", row.id)))?;
    Ok(Story {
        id: row.id,
        session_id: row.session_id,
        external_key: row.external_key,
        title: row.title,
        required_roles,
        status: match row.status {
            DbStoryStatus::Pending => StoryStatus::Pending,
            DbStoryStatus::Voting => StoryStatus::Voting,
            DbStoryStatus::Voted => StoryStatus::Voted,
            DbStoryStatus::Completed => StoryStatus::Completed,
        },
        position: row.position,
        final_estimate,
        created_at: row.created_at,
        completed_at: row.completed_at,
    })
}

fn vote_from_row(row: VoteRow) -> Result<Vote, DomainError> {
    Ok(Vote {
        story_id: row.story_id,
        role: Role::parse(&row.role).map_err(|_| corrupt(format!("vote {} role", row.id)))?,
        voter_id: row.voter_id,
        value: u32::try_from(row.value).map_err(|_| corrupt(format!("vote {} value", row.id)))?,
        cast_at: row.cast_at,
    })
}

fn story_progress(story: &Story) -> Result<StoryProgress, DomainError> {
    let final_estimate = story
        .final_estimate
        .as_ref()
        .map(serde_json::to_string)
        .transpose()
        .map_err(|e| DomainError::infra(InfraErrorKind::Other("json".into()), e.to_string()))?;
    Ok(StoryProgress {
        id: story.id,
        status: story_status_to_db(story.status),
        final_estimate,
        completed_at: story.completed_at,
    })
}

#[async_trait]
impl EstimationStore for SeaStore {
    async fn insert_session(&self, new: NewSession) -> Result<Session, DomainError> {
        let row = sessions_sea::insert(
            &self.db,
            SessionCreate {
                team_id: new.team_id,
                planning_unit_key: new.planning_unit_key,
                facilitator_id: new.facilitator_id,
                room_code: new.room_code,
                created_at: new.created_at,
            },
        )
        .await?;
        Ok(session_from_row(row))
    }

    async fn find_session(&self, session_id: i64) -> Result<Option<Session>, DomainError> {
        Ok(sessions_sea::find_by_id(&self.db, session_id)
            .await?
            .map(session_from_row))
    }

    async fn find_session_by_code(
        &self,
        room_code: &str,
    ) -> Result<Option<Session>, DomainError> {
        Ok(sessions_sea::find_by_room_code(&self.db, room_code)
            .await?
            .map(session_from_row))
    }

    async fn room_code_exists(&self, room_code: &str) -> Result<bool, DomainError> {
        Ok(sessions_sea::room_code_exists(&self.db, room_code).await?)
    }

    async fn update_session(&self, session: &Session) -> Result<(), DomainError> {
        sessions_sea::update_progress(
            &self.db,
            SessionProgress {
                id: session.id,
                status: session_status_to_db(session.status),
                started_at: session.started_at,
                completed_at: session.completed_at,
            },
        )
        .await?;
        Ok(())
    }

    async fn insert_story(&self, new: NewStory) -> Result<Story, DomainError> {
        let roles: Vec<&str> = new.required_roles.iter().map(Role::as_str).collect();
        let required_roles = serde_json::to_string(&roles)
            .map_err(|e| DomainError::infra(InfraErrorKind::Other("json".into()), e.to_string()))?;
        let row = stories_sea::insert(
            &self.db,
            StoryCreate {
                session_id: new.session_id,
                external_key: new.external_key,
                title: new.title,
                required_roles,
                position: new.position,
                created_at: new.created_at,
            },
        )
        .await?;
        story_from_row(row)
    }

    async fn update_story(&self, story: &Story) -> Result<(), DomainError> {
        stories_sea::update_progress(&self.db, story_progress(story)?).await?;
        Ok(())
    }

    async fn delete_story(&self, story_id: i64) -> Result<(), DomainError> {
        stories_sea::delete(&self.db, story_id).await?;
        Ok(())
    }

    async fn list_stories(&self, session_id: i64) -> Result<Vec<Story>, DomainError> {
        stories_sea::list_by_session(&self.db, session_id)
            .await?
            .into_iter()
            .map(story_from_row)
            .collect()
    }

    async fn reopen_story(&self, story: &Story) -> Result<(), DomainError> {
        let progress = story_progress(story)?;
        let txn = self.db.begin().await?;
        stories_sea::update_progress(&txn, progress).await?;
        let cleared = votes_sea::delete_by_story(&txn, story.id).await?;
        txn.commit().await?;
        tracing::debug!(story_id = story.id, cleared, "story re-opened");
        Ok(())
    }

    async fn upsert_vote(&self, vote: &Vote) -> Result<(), DomainError> {
        votes_sea::upsert(
            &self.db,
            VoteUpsert {
                story_id: vote.story_id,
                voter_id: vote.voter_id.clone(),
                role: vote.role.as_str().to_string(),
                value: i32::try_from(vote.value)
                    .map_err(|_| corrupt(format!("vote value {} out of range", vote.value)))?,
                cast_at: vote.cast_at,
            },
        )
        .await?;
        Ok(())
    }

    async fn list_votes(&self, story_id: i64) -> Result<Vec<Vote>, DomainError> {
        votes_sea::list_by_story(&self.db, story_id)
            .await?
            .into_iter()
            .map(vote_from_row)
            .collect()
    }

    async fn ping(&self) -> Result<(), DomainError> {
        self.db
            .query_one(Statement::from_string(
                self.db.get_database_backend(),
                "SELECT 1 AS health_check".to_string(),
            ))
            .await?;
        Ok(())
    }
}
