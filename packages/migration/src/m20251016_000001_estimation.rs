use sea_orm_migration::prelude::*;
use sea_orm_migration::sea_query::{ColumnDef, ForeignKeyAction, Index, Table};

#[derive(DeriveMigrationName)]
pub struct Migration;

// ----- Iden enums for tables & columns -----
#[derive(Iden)]
enum Sessions {
    Table,
    Id,
    TeamId,
    PlanningUnitKey,
    FacilitatorId,
    Status,
    RoomCode,
    CreatedAt,
    StartedAt,
    CompletedAt,
}

#[derive(Iden)]
enum Stories {
    Table,
    Id,
    SessionId,
    ExternalKey,
    Title,
    RequiredRoles,
    Status,
    Position,
    FinalEstimate,
    CreatedAt,
    CompletedAt,
}

#[derive(Iden)]
enum Votes {
    Table,
    Id,
    StoryId,
    VoterId,
    Role,
    Value,
    CastAt,
}

#[async_trait::async_trait]
impl MigrationTrait for Migration {
    async fn up(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // sessions
        manager
            .create_table(
                Table::create()
                    .table(Sessions::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Sessions::Id)
                            .big_integer()
                            .not_null()
                            .primary_key()
                            .auto_increment(),
                    )
                    .col(ColumnDef::new(Sessions::TeamId).big_integer().not_null())
                    .col(
                        ColumnDef::new(Sessions::PlanningUnitKey)
                            .string()
                            .not_null(),
                    )
                    .col(ColumnDef::new(Sessions::FacilitatorId).string().not_null())
                    .col(
                        ColumnDef::new(Sessions::Status)
                            .string_len(16)
                            .not_null()
                            .default("PREPARING"),
                    )
                    .col(ColumnDef::new(Sessions::RoomCode).string_len(16).not_null())
                    .col(
                        ColumnDef::new(Sessions::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Sessions::StartedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .col(
                        ColumnDef::new(Sessions::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .to_owned(),
            )
            .await?;

        // room codes are the public handle of a session
        manager
            .create_index(
                Index::create()
                    .name("ux_sessions_room_code")
                    .table(Sessions::Table)
                    .col(Sessions::RoomCode)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // stories
        manager
            .create_table(
                Table::create()
                    .table(Stories::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Stories::Id)
                            .big_integer()
                            .not_null()
                            .primary_key()
                            .auto_increment(),
                    )
                    .col(ColumnDef::new(Stories::SessionId).big_integer().not_null())
                    .col(ColumnDef::new(Stories::ExternalKey).string().null())
                    .col(ColumnDef::new(Stories::Title).string().not_null())
                    .col(ColumnDef::new(Stories::RequiredRoles).text().not_null())
                    .col(
                        ColumnDef::new(Stories::Status)
                            .string_len(16)
                            .not_null()
                            .default("PENDING"),
                    )
                    .col(ColumnDef::new(Stories::Position).integer().not_null())
                    .col(ColumnDef::new(Stories::FinalEstimate).text().null())
                    .col(
                        ColumnDef::new(Stories::CreatedAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .col(
                        ColumnDef::new(Stories::CompletedAt)
                            .timestamp_with_time_zone()
                            .null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_stories_session_id")
                            .from(Stories::Table, Stories::SessionId)
                            .to(Sessions::Table, Sessions::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        manager
            .create_index(
                Index::create()
                    .name("ux_stories_session_position")
                    .table(Stories::Table)
                    .col(Stories::SessionId)
                    .col(Stories::Position)
                    .unique()
                    .to_owned(),
            )
            .await?;

        // votes
        manager
            .create_table(
                Table::create()
                    .table(Votes::Table)
                    .if_not_exists()
                    .col(
                        ColumnDef::new(Votes::Id)
                            .big_integer()
                            .not_null()
                            .primary_key()
                            .auto_increment(),
                    )
                    .col(ColumnDef::new(Votes::StoryId).big_integer().not_null())
                    .col(ColumnDef::new(Votes::VoterId).string().not_null())
                    .col(ColumnDef::new(Votes::Role).string_len(32).not_null())
                    .col(ColumnDef::new(Votes::Value).integer().not_null())
                    .col(
                        ColumnDef::new(Votes::CastAt)
                            .timestamp_with_time_zone()
                            .not_null(),
                    )
                    .foreign_key(
                        ForeignKey::create()
                            .name("fk_votes_story_id")
                            .from(Votes::Table, Votes::StoryId)
                            .to(Stories::Table, Stories::Id)
                            .on_delete(ForeignKeyAction::Cascade),
                    )
                    .to_owned(),
            )
            .await?;

        // one ballot per (story, voter, role); re-votes overwrite
        manager
            .create_index(
                Index::create()
                    .name("ux_votes_story_voter_role")
                    .table(Votes::Table)
                    .col(Votes::StoryId)
                    .col(Votes::VoterId)
                    .col(Votes::Role)
                    .unique()
                    .to_owned(),
            )
            .await?;

        Ok(())
    }

    async fn down(&self, manager: &SchemaManager) -> Result<(), DbErr> {
        // drop in reverse order + drop index before table
        manager
            .drop_index(
                Index::drop()
                    .name("ux_votes_story_voter_role")
                    .table(Votes::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Votes::Table).if_exists().to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("ux_stories_session_position")
                    .table(Stories::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Stories::Table).if_exists().to_owned())
            .await?;

        manager
            .drop_index(
                Index::drop()
                    .name("ux_sessions_room_code")
                    .table(Sessions::Table)
                    .to_owned(),
            )
            .await?;
        manager
            .drop_table(Table::drop().table(Sessions::Table).if_exists().to_owned())
            .await?;

        Ok(())
    }
}
