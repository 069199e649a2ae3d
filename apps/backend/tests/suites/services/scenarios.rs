//! End-to-end workflows through `SessionService`.

use std::collections::BTreeMap;
use std::error::Error;

use poker_backend::domain::{SessionStatus, StoryStatus};
use poker_backend::errors::domain::{ConflictKind, DomainError};
use poker_backend::repos::EstimationStore;
use poker_backend::services::sessions::{AddStoryInput, SessionService};
use poker_backend::services::tracker::SyncStatus;

use crate::support::state::build_test_state;

const FAC: &str = "facilitator";

fn story_input(title: &str, roles: &[&str]) -> AddStoryInput {
    AddStoryInput {
        title: title.to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        external_key: None,
        create_in_tracker: false,
    }
}

fn estimates(pairs: &[(&str, i64)]) -> BTreeMap<String, i64> {
    pairs.iter().map(|(r, v)| (r.to_string(), *v)).collect()
}

async fn active_session_with_story(
    svc: &SessionService,
    roles: &[&str],
) -> Result<(i64, i64), Box<dyn Error>> {
    let session = svc.create_session(7, "EPIC-9", FAC).await?;
    let added = svc
        .add_story(session.id, FAC, story_input("Design API", roles))
        .await?;
    svc.start(session.id, FAC).await?;
    svc.advance(session.id, FAC).await?;
    Ok((session.id, added.story.id))
}

#[tokio::test]
async fn scenario_a_full_estimation_round() -> Result<(), Box<dyn Error>> {
    let state = build_test_state().await;
    let svc = &state.sessions;

    let session = svc.create_session(7, "EPIC-9", FAC).await?;
    assert_eq!(session.status, SessionStatus::Preparing);
    assert_eq!(session.team_id, 7);
    assert_eq!(session.planning_unit_key, "EPIC-9");

    let added = svc
        .add_story(session.id, FAC, story_input("Design API", &["analysis", "build"]))
        .await?;
    let story_id = added.story.id;
    assert_eq!(added.story.status, StoryStatus::Pending);
    assert_eq!(added.tracker_sync.status, SyncStatus::Skipped);

    let view = svc.start(session.id, FAC).await?;
    assert_eq!(view.session.status, SessionStatus::Active);

    let view = svc.advance(session.id, FAC).await?;
    assert_eq!(view.stories[0].story.status, StoryStatus::Voting);

    svc.cast_vote(session.id, story_id, "alice", "analysis", 5)
        .await?;
    svc.cast_vote(session.id, story_id, "bob", "build", 8).await?;

    let revealed = svc.reveal(session.id, story_id, FAC).await?;
    assert_eq!(revealed.story.status, StoryStatus::Voted);
    let mut visible: Vec<(String, u32)> = revealed
        .votes
        .expect("votes are visible after reveal")
        .into_iter()
        .map(|v| (v.voter_id, v.value))
        .collect();
    visible.sort();
    assert_eq!(
        visible,
        vec![("alice".to_string(), 5), ("bob".to_string(), 8)]
    );

    let finalized = svc
        .set_final_estimate(
            session.id,
            story_id,
            FAC,
            estimates(&[("analysis", 5), ("build", 8)]),
        )
        .await?;
    assert_eq!(finalized.story.story.status, StoryStatus::Completed);
    let final_estimate = finalized.story.story.final_estimate.expect("final estimate");
    let hours: Vec<(String, u32)> = final_estimate
        .iter()
        .map(|(role, h)| (role.as_str().to_string(), *h))
        .collect();
    assert_eq!(
        hours,
        vec![("analysis".to_string(), 5), ("build".to_string(), 8)]
    );
    // No external key, nothing to push
    assert_eq!(finalized.tracker_sync.status, SyncStatus::Skipped);

    // Persisted
    let stored = state.store.list_stories(session.id).await?;
    assert_eq!(stored[0].status, StoryStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn scenario_b_same_role_last_vote_wins() -> Result<(), Box<dyn Error>> {
    let state = build_test_state().await;
    let svc = &state.sessions;
    let (session_id, story_id) = active_session_with_story(svc, &["build"]).await?;

    svc.cast_vote(session_id, story_id, "alice", "build", 5)
        .await?;
    svc.cast_vote(session_id, story_id, "bob", "build", 8).await?;

    let tally = svc.tally(session_id, story_id).await?;
    assert_eq!(tally.roles.len(), 1);
    assert_eq!(tally.roles[0].votes, 1);
    assert_eq!(tally.roles[0].ballots, 2);
    assert_eq!(tally.roles[0].latest_voter.as_deref(), Some("bob"));
    assert!(tally.quorum_reached);
    Ok(())
}

#[tokio::test]
async fn revote_keeps_one_stored_vote_with_latest_value() -> Result<(), Box<dyn Error>> {
    let state = build_test_state().await;
    let svc = &state.sessions;
    let (session_id, story_id) = active_session_with_story(svc, &["build"]).await?;

    svc.cast_vote(session_id, story_id, "alice", "build", 5)
        .await?;
    svc.cast_vote(session_id, story_id, "alice", "build", 3)
        .await?;

    let votes = state.store.list_votes(story_id).await?;
    assert_eq!(votes.len(), 1);
    assert_eq!(votes[0].value, 3);
    Ok(())
}

#[tokio::test]
async fn scenario_c_advance_while_voting_is_rejected() -> Result<(), Box<dyn Error>> {
    let state = build_test_state().await;
    let svc = &state.sessions;
    let (session_id, _) = active_session_with_story(svc, &["build"]).await?;
    svc.add_story(session_id, FAC, story_input("Second", &["build"]))
        .await?;

    let before = svc.session_view(session_id, FAC).await?;
    let err = svc.advance(session_id, FAC).await.unwrap_err();
    match &err {
        DomainError::Conflict(ConflictKind::FinishCurrentStory, detail) => {
            assert_eq!(detail, "finish current story first");
        }
        other => panic!("unexpected error: {other:?}"),
    }
    let after = svc.session_view(session_id, FAC).await?;
    assert_eq!(before.stories, after.stories);
    Ok(())
}

#[tokio::test]
async fn scenario_d_vote_after_reveal_is_rejected() -> Result<(), Box<dyn Error>> {
    let state = build_test_state().await;
    let svc = &state.sessions;
    let (session_id, story_id) = active_session_with_story(svc, &["analysis", "build"]).await?;

    svc.cast_vote(session_id, story_id, "alice", "analysis", 5)
        .await?;
    let revealed = svc.reveal(session_id, story_id, FAC).await?;

    let err = svc
        .cast_vote(session_id, story_id, "bob", "build", 8)
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::Conflict(ConflictKind::StoryAlreadyRevealed, _)
    ));

    // Revealing again is a no-op and the revealed set is unchanged
    let again = svc.reveal(session_id, story_id, FAC).await?;
    assert_eq!(again.votes, revealed.votes);
    assert_eq!(state.store.list_votes(story_id).await?.len(), 1);
    Ok(())
}

#[tokio::test]
async fn scenario_e_complete_with_pending_stories() -> Result<(), Box<dyn Error>> {
    let state = build_test_state().await;
    let svc = &state.sessions;

    let session = svc.create_session(3, "EPIC-1", FAC).await?;
    svc.add_story(session.id, FAC, story_input("One", &["build"]))
        .await?;
    svc.add_story(session.id, FAC, story_input("Two", &["build"]))
        .await?;
    svc.start(session.id, FAC).await?;

    let view = svc.complete(session.id, FAC).await?;
    assert_eq!(view.session.status, SessionStatus::Completed);
    assert!(view.session.completed_at.is_some());
    assert!(view
        .stories
        .iter()
        .all(|s| s.story.status == StoryStatus::Pending));

    let err = svc
        .add_story(session.id, FAC, story_input("Three", &["build"]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::Conflict(ConflictKind::SessionCompleted, _)
    ));

    // Still resolvable by code after completion
    let resolved = svc.resolve(&session.room_code, "anyone").await?;
    assert_eq!(resolved.session.status, SessionStatus::Completed);
    Ok(())
}

#[tokio::test]
async fn reopen_clears_votes_and_allows_revoting() -> Result<(), Box<dyn Error>> {
    let state = build_test_state().await;
    let svc = &state.sessions;
    let (session_id, story_id) = active_session_with_story(svc, &["build"]).await?;

    svc.cast_vote(session_id, story_id, "alice", "build", 13)
        .await?;
    svc.reveal(session_id, story_id, FAC).await?;

    let reopened = svc.reopen(session_id, story_id, FAC).await?;
    assert_eq!(reopened.story.status, StoryStatus::Voting);
    assert!(reopened.ballots.is_empty());
    assert!(state.store.list_votes(story_id).await?.is_empty());

    svc.cast_vote(session_id, story_id, "alice", "build", 8)
        .await?;
    let revealed = svc.reveal(session_id, story_id, FAC).await?;
    assert_eq!(revealed.votes.map(|v| v[0].value), Some(8));
    Ok(())
}

#[tokio::test]
async fn second_final_estimate_is_rejected() -> Result<(), Box<dyn Error>> {
    let state = build_test_state().await;
    let svc = &state.sessions;
    let (session_id, story_id) = active_session_with_story(svc, &["build"]).await?;

    svc.cast_vote(session_id, story_id, "alice", "build", 5)
        .await?;
    svc.reveal(session_id, story_id, FAC).await?;
    svc.set_final_estimate(session_id, story_id, FAC, estimates(&[("build", 6)]))
        .await?;

    let err = svc
        .set_final_estimate(session_id, story_id, FAC, estimates(&[("build", 7)]))
        .await
        .unwrap_err();
    assert!(matches!(
        err,
        DomainError::Conflict(ConflictKind::StoryCompleted, _)
    ));
    let stored = state.store.list_stories(session_id).await?;
    assert_eq!(
        stored[0]
            .final_estimate
            .as_ref()
            .and_then(|f| f.values().next().copied()),
        Some(6)
    );
    Ok(())
}

#[tokio::test]
async fn non_facilitator_cannot_drive_the_session() -> Result<(), Box<dyn Error>> {
    let state = build_test_state().await;
    let svc = &state.sessions;
    let session = svc.create_session(1, "EPIC-2", FAC).await?;

    let err = svc.start(session.id, "mallory").await.unwrap_err();
    assert!(matches!(err, DomainError::Forbidden(_, _)));

    let view = svc.session_view(session.id, "mallory").await?;
    assert_eq!(view.session.status, SessionStatus::Preparing);
    assert!(!view.viewer_is_facilitator);
    Ok(())
}

#[tokio::test]
async fn unknown_session_and_room_are_not_found() {
    let state = build_test_state().await;
    let svc = &state.sessions;

    assert!(matches!(
        svc.start(404, FAC).await.unwrap_err(),
        DomainError::NotFound(_, _)
    ));
    assert!(matches!(
        svc.resolve("ZZZZZZ", FAC).await.unwrap_err(),
        DomainError::NotFound(_, _)
    ));
    assert!(matches!(
        svc.resolve("not a code!", FAC).await.unwrap_err(),
        DomainError::NotFound(_, _)
    ));
}

#[tokio::test]
async fn room_codes_are_unique_and_normalized_on_lookup() -> Result<(), Box<dyn Error>> {
    let state = build_test_state().await;
    let svc = &state.sessions;

    let mut codes = std::collections::HashSet::new();
    for team in 0..20 {
        let session = svc.create_session(team, "EPIC-3", FAC).await?;
        assert!(codes.insert(session.room_code.clone()));
    }

    let session = svc.create_session(99, "EPIC-3", FAC).await?;
    let lower = session.room_code.to_lowercase();
    let resolved = svc.resolve(&lower, FAC).await?;
    assert_eq!(resolved.session.id, session.id);
    Ok(())
}
