//! SeaORM adapter for stories - generic over ConnectionTrait.

use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, NotSet, QueryFilter, QueryOrder,
    Set,
};
use time::OffsetDateTime;

use crate::entities::stories::{self, StoryStatus};

#[derive(Debug, Clone)]
pub struct StoryCreate {
    pub session_id: i64,
    pub external_key: Option<String>,
    pub title: String,
    pub required_roles: String,
    pub position: i32,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct StoryProgress {
    pub id: i64,
    pub status: StoryStatus,
    pub final_estimate: Option<String>,
    pub completed_at: Option<OffsetDateTime>,
}

pub async fn insert<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    dto: StoryCreate,
) -> Result<stories::Model, sea_orm::DbErr> {
    let active = stories::ActiveModel {
        id: NotSet,
        session_id: Set(dto.session_id),
        external_key: Set(dto.external_key),
        title: Set(dto.title),
        required_roles: Set(dto.required_roles),
        status: Set(StoryStatus::Pending),
        position: Set(dto.position),
        final_estimate: Set(None),
        created_at: Set(dto.created_at),
        completed_at: Set(None),
    };
    active.insert(conn).await
}

pub async fn list_by_session<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    session_id: i64,
) -> Result<Vec<stories::Model>, sea_orm::DbErr> {
    stories::Entity::find()
        .filter(stories::Column::SessionId.eq(session_id))
        .order_by_asc(stories::Column::Position)
        .all(conn)
        .await
}

/// Persist workflow status and the final estimate.
pub async fn update_progress<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    dto: StoryProgress,
) -> Result<(), sea_orm::DbErr> {
    let result = stories::Entity::update_many()
        .col_expr(stories::Column::Status, Expr::value(dto.status))
        .col_expr(stories::Column::FinalEstimate, Expr::value(dto.final_estimate))
        .col_expr(stories::Column::CompletedAt, Expr::value(dto.completed_at))
        .filter(stories::Column::Id.eq(dto.id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(sea_orm::DbErr::RecordNotFound(format!(
            "story {} not found",
            dto.id
        )));
    }
    Ok(())
}

pub async fn delete<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    story_id: i64,
) -> Result<(), sea_orm::DbErr> {
    let result = stories::Entity::delete_by_id(story_id).exec(conn).await?;
    if result.rows_affected == 0 {
        return Err(sea_orm::DbErr::RecordNotFound(format!(
            "story {story_id} not found"
        )));
    }
    Ok(())
}
