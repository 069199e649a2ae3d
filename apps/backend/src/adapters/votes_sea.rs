//! SeaORM adapter for votes - generic over ConnectionTrait.

use sea_orm::sea_query::OnConflict;
use sea_orm::{
    ColumnTrait, ConnectionTrait, EntityTrait, NotSet, QueryFilter, QueryOrder, Set,
};
use time::OffsetDateTime;

use crate::entities::votes;

#[derive(Debug, Clone)]
pub struct VoteUpsert {
    pub story_id: i64,
    pub voter_id: String,
    pub role: String,
    pub value: i32,
    pub cast_at: OffsetDateTime,
}

/// Insert or overwrite the ballot for (story, voter, role).
pub async fn upsert<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    dto: VoteUpsert,
) -> Result<(), sea_orm::DbErr> {
    let active = votes::ActiveModel {
        id: NotSet,
        story_id: Set(dto.story_id),
        voter_id: Set(dto.voter_id),
        role: Set(dto.role),
        value: Set(dto.value),
        cast_at: Set(dto.cast_at),
    };

    votes::Entity::insert(active)
        .on_conflict(
            OnConflict::columns([
                votes::Column::StoryId,
                votes::Column::VoterId,
                votes::Column::Role,
            ])
            .update_columns([votes::Column::Value, votes::Column::CastAt])
            .to_owned(),
        )
        .exec_without_returning(conn)
        .await?;
    Ok(())
}

/// Ballots of a story in cast order.
pub async fn list_by_story<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    story_id: i64,
) -> Result<Vec<votes::Model>, sea_orm::DbErr> {
    votes::Entity::find()
        .filter(votes::Column::StoryId.eq(story_id))
        .order_by_asc(votes::Column::CastAt)
        .order_by_asc(votes::Column::Id)
        .all(conn)
        .await
}

pub async fn delete_by_story<C: ConnectionTrait + Send + Sync>(
    conn: &C,
    story_id: i64,
) -> Result<u64, sea_orm::DbErr> {
    let result = votes::Entity::delete_many()
        .filter(votes::Column::StoryId.eq(story_id))
        .exec(conn)
        .await?;
    Ok(result.rows_affected)
}
