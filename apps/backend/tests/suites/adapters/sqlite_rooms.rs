//! The session service over a real database, including a room reload.

use std::error::Error;

use poker_backend::domain::{SessionStatus, StoryStatus};
use poker_backend::infra::state::StateBuilder;
use poker_backend::services::sessions::AddStoryInput;
use poker_backend::DbSettings;

use crate::support::state::{build_sqlite_state, short_idle_room, test_security};

#[tokio::test]
async fn workflow_survives_a_room_reload() -> Result<(), Box<dyn Error>> {
    let state = StateBuilder::new(test_security())
        .with_db(DbSettings::sqlite_memory())
        .with_room_config(short_idle_room())
        .build()
        .await?;
    let svc = &state.sessions;

    let session = svc.create_session(2, "EPIC-2", "fac").await?;
    let story = svc
        .add_story(
            session.id,
            "fac",
            AddStoryInput {
                title: "Persisted".into(),
                roles: vec!["build".into()],
                external_key: Some("EPIC-2-1".into()),
                create_in_tracker: false,
            },
        )
        .await?
        .story;
    svc.start(session.id, "fac").await?;
    svc.advance(session.id, "fac").await?;
    svc.cast_vote(session.id, story.id, "alice", "build", 5)
        .await?;

    // Let the coordinator go idle so the next call loads from the database
    svc.registry()
        .handle(&session.room_code)
        .await?
        .finished()
        .await;

    let view = svc.session_view(session.id, "alice").await?;
    assert_eq!(view.session.status, SessionStatus::Active);
    assert_eq!(view.stories[0].story.status, StoryStatus::Voting);
    assert_eq!(view.stories[0].my_votes[0].value, 5);
    assert_eq!(view.stories[0].story.external_key.as_deref(), Some("EPIC-2-1"));
    Ok(())
}

#[tokio::test]
async fn sqlite_state_reports_ok_store() -> Result<(), Box<dyn Error>> {
    let state = build_sqlite_state().await;
    state.store.ping().await?;
    Ok(())
}
