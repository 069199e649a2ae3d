//! SeaORM adapter for sessions - generic over ConnectionTrait.

use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, EntityTrait, NotSet, PaginatorTrait,
    QueryFilter, Set,
};
use time::OffsetDateTime;

use crate::entities::sessions::{self, SessionStatus};

// Adapter functions return DbErr; the store maps to DomainError via From<DbErr>.

#[derive(Debug, Clone)]
pub struct SessionCreate {
    pub team_id: i64,
    pub planning_unit_key: String,
    pub facilitator_id: String,
    pub room_code: String,
    pub created_at: OffsetDateTime,
}

#[derive(Debug, Clone)]
pub struct SessionProgress {
    pub id: i64,
    pub status: SessionStatus,
    pub started_at: Option<OffsetDateTime>,
    pub completed_at: Option<OffsetDateTime>,
}

pub async fn insert<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    dto: SessionCreate,
) -> Result<sessions::Model, sea_orm::DbErr> {
    let active = sessions::ActiveModel {
        id: NotSet,
        team_id: Set(dto.team_id),
        planning_unit_key: Set(dto.planning_unit_key),
        facilitator_id: Set(dto.facilitator_id),
        status: Set(SessionStatus::Preparing),
        room_code: Set(dto.room_code),
        created_at: Set(dto.created_at),
        started_at: Set(None),
        completed_at: Set(None),
    };
    active.insert(conn).await
}

pub async fn find_by_id<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    session_id: i64,
) -> Result<Option<sessions::Model>, sea_orm::DbErr> {
    sessions::Entity::find_by_id(session_id).one(conn).await
}

pub async fn find_by_room_code<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    room_code: &str,
) -> Result<Option<sessions::Model>, sea_orm::DbErr> {
    sessions::Entity::find()
        .filter(sessions::Column::RoomCode.eq(room_code))
        .one(conn)
        .await
}

pub async fn room_code_exists<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    room_code: &str,
) -> Result<bool, sea_orm::DbErr> {
    let count = sessions::Entity::find()
        .filter(sessions::Column::RoomCode.eq(room_code))
        .count(conn)
        .await?;
    Ok(count > 0)
}

/// Persist status and lifecycle timestamps. Other columns are immutable.
pub async fn update_progress<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    dto: SessionProgress,
) -> Result<(), sea_orm::DbErr> {
    let result = sessions::Entity::update_many()
        .col_expr(
            sessions::Column::Status,
            sea_orm::sea_query::Expr::value(dto.status),
        )
        .col_expr(
            sessions::Column::StartedAt,
            sea_orm::sea_query::Expr::value(dto.started_at),
        )
        .col_expr(
            sessions::Column::CompletedAt,
            sea_orm::sea_query::Expr::value(dto.completed_at),
        )
        .filter(sessions::Column::Id.eq(dto.id))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(sea_orm::DbErr::RecordNotFound(format!(
            "session {} not found",
            dto.id
        )));
    }
    Ok(())
}
