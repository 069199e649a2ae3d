// Commands over the socket and their fan-out to other clients

use std::time::Duration;

use poker_backend::services::sessions::AddStoryInput;
use serde_json::json;

use crate::support::auth::mint_test_token;
use crate::support::state::build_test_state;
use crate::support::websocket::start_test_server;
use crate::support::websocket_client::WebSocketClient;

#[tokio::test]
async fn vote_round_is_broadcast_in_order() -> Result<(), Box<dyn std::error::Error>> {
    let state = build_test_state().await;
    let security = state.security.clone();
    let session = state.sessions.create_session(1, "EPIC-1", "fac").await?;
    let story = state
        .sessions
        .add_story(
            session.id,
            "fac",
            AddStoryInput {
                title: "Checkout".into(),
                roles: vec!["build".into()],
                external_key: None,
                create_in_tracker: false,
            },
        )
        .await?
        .story;
    let server = start_test_server(state).await?;

    let mut fac = WebSocketClient::connect_retry(
        &server.ws_url(&session.room_code, &mint_test_token("fac", &security)),
        Duration::from_secs(1),
    )
    .await?;
    fac.hello(None).await?;
    let mut alice = WebSocketClient::connect_retry(
        &server.ws_url(&session.room_code, &mint_test_token("alice", &security)),
        Duration::from_secs(1),
    )
    .await?;
    alice.hello(Some("build")).await?;

    fac.send_json(&json!({"type": "start_session"})).await?;
    let ack = fac.expect_type("ack").await?;
    assert_eq!(ack["command"], "start_session");
    assert!(ack.get("tracker_sync").is_none());

    fac.send_json(&json!({"type": "advance"})).await?;
    assert_eq!(fac.expect_type("ack").await?["command"], "advance");

    let started = alice.expect_event("session_started").await?;
    let changed = alice.expect_event("story_changed").await?;
    assert_eq!(changed["event"]["change"], "voting_started");
    assert_eq!(changed["event"]["story"]["id"], story.id);
    assert!(changed["seq"].as_u64() > started["seq"].as_u64());

    alice
        .send_json(&json!({
            "type": "cast_vote", "story_id": story.id, "role": "build", "value": 13
        }))
        .await?;
    assert_eq!(alice.expect_type("ack").await?["command"], "cast_vote");

    let cast = fac.expect_event("vote_cast").await?;
    assert_eq!(cast["event"]["voter_id"], "alice");
    assert_eq!(cast["event"]["role"], "build");
    assert!(cast["event"].get("value").is_none());
    assert_eq!(cast["event"]["tally"]["quorum_reached"], true);

    fac.send_json(&json!({"type": "reveal", "story_id": story.id}))
        .await?;
    let revealed = alice.expect_event("votes_revealed").await?;
    assert_eq!(revealed["event"]["votes"][0]["value"], 13);

    fac.send_json(&json!({
        "type": "set_final_estimate", "story_id": story.id, "estimates": {"build": 13}
    }))
    .await?;
    let ack = fac.expect_type("ack").await?;
    assert_eq!(ack["command"], "set_final_estimate");
    assert_eq!(ack["tracker_sync"]["status"], "skipped");

    let completed = alice.expect_event("story_completed").await?;
    assert_eq!(completed["event"]["final_estimate"], json!({"build": 13}));

    fac.send_json(&json!({"type": "complete_session"})).await?;
    alice.expect_event("session_completed").await?;

    fac.close().await?;
    alice.close().await?;
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn set_role_is_announced_to_the_room() -> Result<(), Box<dyn std::error::Error>> {
    let state = build_test_state().await;
    let security = state.security.clone();
    let session = state.sessions.create_session(1, "EPIC-1", "fac").await?;
    let server = start_test_server(state).await?;

    let mut fac = WebSocketClient::connect_retry(
        &server.ws_url(&session.room_code, &mint_test_token("fac", &security)),
        Duration::from_secs(1),
    )
    .await?;
    fac.hello(None).await?;
    let mut bob = WebSocketClient::connect_retry(
        &server.ws_url(&session.room_code, &mint_test_token("bob", &security)),
        Duration::from_secs(1),
    )
    .await?;
    let (bob_ack, _) = bob.hello(None).await?;

    bob.send_json(&json!({"type": "set_role", "role": "Test"}))
        .await?;
    assert_eq!(bob.expect_type("ack").await?["command"], "set_role");

    loop {
        let event = fac.expect_event("participant_joined").await?;
        let participant = &event["event"]["participant"];
        if participant["presence_id"] == bob_ack["presence_id"] && participant["role"] == "test" {
            break;
        }
    }

    fac.close().await?;
    bob.close().await?;
    server.stop().await;
    Ok(())
}
