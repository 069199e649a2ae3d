//! Issue tracker bridge: creation on add, push on final estimate, failures
//! reported without rolling back local state.

use std::collections::BTreeMap;
use std::error::Error;
use std::sync::Arc;

use async_trait::async_trait;
use parking_lot::Mutex;
use poker_backend::domain::{Role, RoleEstimates, StoryStatus};
use poker_backend::errors::domain::{ConflictKind, DomainError};
use poker_backend::errors::ErrorCode;
use poker_backend::repos::MemoryStore;
use poker_backend::services::coordinator::RoomConfig;
use poker_backend::services::sessions::{AddStoryInput, SessionService};
use poker_backend::services::tracker::{DisabledTracker, IssueTracker, SyncStatus, TrackerError};
use poker_backend::state::app_state::AppState;
use tokio::sync::Notify;

use crate::support::state::{build_state_with, RecordingTracker, TrackerCall};

const FAC: &str = "facilitator";

async fn state_with(tracker: Arc<RecordingTracker>) -> AppState {
    build_state_with(Arc::new(MemoryStore::new()), tracker, RoomConfig::default()).await
}

fn input(title: &str, roles: &[&str], create_in_tracker: bool) -> AddStoryInput {
    AddStoryInput {
        title: title.to_string(),
        roles: roles.iter().map(|r| r.to_string()).collect(),
        external_key: None,
        create_in_tracker,
    }
}

async fn vote_and_reveal(
    svc: &SessionService,
    session_id: i64,
    story_id: i64,
) -> Result<(), Box<dyn Error>> {
    svc.cast_vote(session_id, story_id, "alice", "build", 4)
        .await?;
    svc.reveal(session_id, story_id, FAC).await?;
    Ok(())
}

#[tokio::test]
async fn story_created_in_tracker_gets_its_key() -> Result<(), Box<dyn Error>> {
    let tracker = Arc::new(RecordingTracker::default());
    let state = state_with(tracker.clone()).await;
    let session = state.sessions.create_session(3, "EPIC-9", FAC).await?;

    let added = state
        .sessions
        .add_story(session.id, FAC, input("  Login form ", &["build", "test"], true))
        .await?;

    assert_eq!(added.tracker_sync.status, SyncStatus::Ok);
    assert_eq!(added.story.external_key.as_deref(), Some("EPIC-9-1"));
    assert_eq!(
        tracker.calls(),
        vec![TrackerCall::Create {
            planning_unit: "EPIC-9".into(),
            title: "Login form".into(),
            roles: vec!["build".into(), "test".into()],
        }]
    );
    Ok(())
}

#[tokio::test]
async fn explicit_key_skips_creation() -> Result<(), Box<dyn Error>> {
    let tracker = Arc::new(RecordingTracker::default());
    let state = state_with(tracker.clone()).await;
    let session = state.sessions.create_session(3, "EPIC-9", FAC).await?;

    let mut linked = input("Linked", &["build"], true);
    linked.external_key = Some("EPIC-9-77".into());
    let added = state.sessions.add_story(session.id, FAC, linked).await?;

    assert_eq!(added.tracker_sync.status, SyncStatus::Skipped);
    assert_eq!(added.story.external_key.as_deref(), Some("EPIC-9-77"));
    assert!(tracker.calls().is_empty());
    Ok(())
}

#[tokio::test]
async fn final_estimate_is_pushed_for_linked_stories() -> Result<(), Box<dyn Error>> {
    let tracker = Arc::new(RecordingTracker::default());
    let state = state_with(tracker.clone()).await;
    let svc = &state.sessions;
    let session = svc.create_session(3, "EPIC-9", FAC).await?;
    let linked = svc
        .add_story(session.id, FAC, input("Linked", &["build"], true))
        .await?
        .story;
    let local = svc
        .add_story(session.id, FAC, input("Local", &["build"], false))
        .await?
        .story;
    svc.start(session.id, FAC).await?;

    let mut hours = BTreeMap::new();
    hours.insert("build".to_string(), 5);

    svc.advance(session.id, FAC).await?;
    vote_and_reveal(svc, session.id, linked.id).await?;
    let finalized = svc
        .set_final_estimate(session.id, linked.id, FAC, hours.clone())
        .await?;
    assert_eq!(finalized.tracker_sync.status, SyncStatus::Ok);
    assert_eq!(finalized.story.story.status, StoryStatus::Completed);

    svc.advance(session.id, FAC).await?;
    vote_and_reveal(svc, session.id, local.id).await?;
    let finalized = svc
        .set_final_estimate(session.id, local.id, FAC, hours)
        .await?;
    assert_eq!(finalized.tracker_sync.status, SyncStatus::Skipped);

    let pushes: Vec<_> = tracker
        .calls()
        .into_iter()
        .filter(|c| matches!(c, TrackerCall::Push { .. }))
        .collect();
    assert_eq!(
        pushes,
        vec![TrackerCall::Push {
            key: "EPIC-9-1".into(),
            hours: vec![("build".into(), 5)],
        }]
    );
    Ok(())
}

#[tokio::test]
async fn tracker_failure_keeps_local_changes() -> Result<(), Box<dyn Error>> {
    let tracker = Arc::new(RecordingTracker::failing());
    let state = state_with(tracker.clone()).await;
    let svc = &state.sessions;
    let session = svc.create_session(3, "EPIC-9", FAC).await?;

    let added = svc
        .add_story(session.id, FAC, input("Offline", &["build"], true))
        .await?;
    assert_eq!(added.tracker_sync.status, SyncStatus::Failed);
    assert_eq!(added.tracker_sync.code, Some(ErrorCode::TrackerSyncFailed));
    assert!(added.story.external_key.is_none());

    let mut linked = input("Linked", &["build"], false);
    linked.external_key = Some("EPIC-9-5".into());
    let linked = svc.add_story(session.id, FAC, linked).await?.story;

    svc.start(session.id, FAC).await?;
    svc.advance(session.id, FAC).await?;
    let mut hours = BTreeMap::new();
    hours.insert("build".to_string(), 3);
    vote_and_reveal(svc, session.id, added.story.id).await?;
    svc.set_final_estimate(session.id, added.story.id, FAC, hours.clone())
        .await?;

    svc.advance(session.id, FAC).await?;
    vote_and_reveal(svc, session.id, linked.id).await?;
    let finalized = svc
        .set_final_estimate(session.id, linked.id, FAC, hours)
        .await?;
    assert_eq!(finalized.tracker_sync.status, SyncStatus::Failed);
    assert_eq!(finalized.story.story.status, StoryStatus::Completed);

    let view = svc.session_view(session.id, FAC).await?;
    assert_eq!(view.stories.len(), 2);
    assert!(view
        .stories
        .iter()
        .all(|s| s.story.status == StoryStatus::Completed));
    Ok(())
}

#[tokio::test]
async fn creation_without_a_tracker_is_reported() -> Result<(), Box<dyn Error>> {
    let state = build_state_with(
        Arc::new(MemoryStore::new()),
        Arc::new(DisabledTracker),
        RoomConfig::default(),
    )
    .await;
    let session = state.sessions.create_session(3, "EPIC-9", FAC).await?;

    let added = state
        .sessions
        .add_story(session.id, FAC, input("No tracker", &["build"], true))
        .await?;
    assert_eq!(added.tracker_sync.status, SyncStatus::Failed);
    assert_eq!(added.tracker_sync.code, Some(ErrorCode::TrackerNotConfigured));
    assert_eq!(added.story.title, "No tracker");
    Ok(())
}

#[tokio::test]
async fn rejected_story_never_reaches_the_tracker() -> Result<(), Box<dyn Error>> {
    let tracker = Arc::new(RecordingTracker::default());
    let state = state_with(tracker.clone()).await;
    let session = state.sessions.create_session(3, "EPIC-9", FAC).await?;

    assert!(state
        .sessions
        .add_story(session.id, "someone-else", input("Nope", &["build"], true))
        .await
        .is_err());
    assert!(state
        .sessions
        .add_story(session.id, FAC, input("Bad role", &["Not A Role!"], true))
        .await
        .is_err());
    let mut bad_key = input("Bad key", &["build"], true);
    bad_key.external_key = Some("EPIC-9/../admin".into());
    assert!(state.sessions.add_story(session.id, FAC, bad_key).await.is_err());
    assert!(tracker.calls().is_empty());

    // A blank key counts as no key.
    let mut blank = input("Blank key", &["build"], true);
    blank.external_key = Some("   ".into());
    let added = state.sessions.add_story(session.id, FAC, blank).await?;
    assert_eq!(added.story.external_key.as_deref(), Some("EPIC-9-1"));
    Ok(())
}

/// Parks inside `create_item` until released.
#[derive(Default)]
struct GatedTracker {
    entered: Notify,
    release: Notify,
    created: Mutex<Vec<String>>,
}

#[async_trait]
impl IssueTracker for GatedTracker {
    async fn create_item(
        &self,
        planning_unit: &str,
        _title: &str,
        _roles: &[Role],
    ) -> Result<String, TrackerError> {
        self.entered.notify_one();
        self.release.notified().await;
        let key = format!("{planning_unit}-42");
        self.created.lock().push(key.clone());
        Ok(key)
    }

    async fn push_estimate(&self, _: &str, _: &RoleEstimates) -> Result<(), TrackerError> {
        Ok(())
    }
}

#[tokio::test]
async fn session_completed_during_creation_rejects_the_story() -> Result<(), Box<dyn Error>> {
    let tracker = Arc::new(GatedTracker::default());
    let state = build_state_with(
        Arc::new(MemoryStore::new()),
        tracker.clone(),
        RoomConfig::default(),
    )
    .await;
    let svc = state.sessions.clone();
    let session = svc.create_session(3, "EPIC-9", FAC).await?;
    svc.add_story(session.id, FAC, input("First", &["build"], false))
        .await?;
    svc.start(session.id, FAC).await?;

    let adding = tokio::spawn({
        let svc = svc.clone();
        async move {
            svc.add_story(session.id, FAC, input("Late", &["build"], true))
                .await
        }
    });
    tracker.entered.notified().await;
    svc.complete(session.id, FAC).await?;
    tracker.release.notify_one();

    let err = adding.await?.unwrap_err();
    assert!(matches!(
        err,
        DomainError::Conflict(ConflictKind::SessionCompleted, _)
    ));
    assert_eq!(*tracker.created.lock(), vec!["EPIC-9-42".to_string()]);
    let view = svc.session_view(session.id, FAC).await?;
    assert_eq!(view.stories.len(), 1);
    Ok(())
}
