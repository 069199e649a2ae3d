// WebSocket handshake and initial snapshot

use std::time::Duration;

use crate::support::auth::mint_test_token;
use crate::support::state::build_test_state;
use crate::support::websocket::{start_test_server, wait_until};
use crate::support::websocket_client::WebSocketClient;

#[tokio::test]
async fn hello_ack_then_snapshot_then_own_join() -> Result<(), Box<dyn std::error::Error>> {
    let state = build_test_state().await;
    let security = state.security.clone();
    let session = state.sessions.create_session(1, "EPIC-1", "fac").await?;
    let server = start_test_server(state).await?;

    let token = mint_test_token("fac", &security);
    let url = server.ws_url(&session.room_code.to_lowercase(), &token);
    let mut client = WebSocketClient::connect_retry(&url, Duration::from_secs(1)).await?;

    let (ack, snapshot) = client.hello(Some("build")).await?;
    assert_eq!(ack["type"], "hello_ack");
    assert_eq!(ack["protocol"], 1);
    assert_eq!(ack["room_code"], session.room_code.as_str());
    let presence_id = ack["presence_id"].clone();
    assert!(presence_id.is_string());

    assert_eq!(snapshot["type"], "snapshot");
    assert_eq!(snapshot["seq"], 0);
    assert_eq!(snapshot["session"]["status"], "PREPARING");
    assert_eq!(snapshot["viewer_is_facilitator"], true);
    assert_eq!(snapshot["participants"][0]["presence_id"], presence_id);
    assert_eq!(snapshot["participants"][0]["role"], "build");

    let joined = client.expect_json().await?;
    assert_eq!(joined["type"], "event");
    assert_eq!(joined["seq"], 1);
    assert_eq!(joined["event"]["kind"], "participant_joined");
    assert_eq!(joined["event"]["participant"]["presence_id"], presence_id);

    client.close().await?;
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn closing_the_socket_leaves_the_room() -> Result<(), Box<dyn std::error::Error>> {
    let state = build_test_state().await;
    let security = state.security.clone();
    let sessions = state.sessions.clone();
    let session = sessions.create_session(1, "EPIC-1", "fac").await?;
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
    let (alice_ack, alice_snapshot) = alice.hello(Some("test")).await?;
    assert_eq!(alice_snapshot["participants"].as_array().map(Vec::len), Some(2));
    assert_eq!(alice_snapshot["viewer_is_facilitator"], false);

    let joined = fac.expect_event("participant_joined").await?;
    if joined["event"]["participant"]["identity"] == "fac" {
        fac.expect_event("participant_joined").await?;
    }

    alice.close().await?;
    let left = fac.expect_event("participant_left").await?;
    assert_eq!(left["event"]["presence_id"], alice_ack["presence_id"]);
    assert_eq!(left["event"]["identity"], "alice");

    let code = session.room_code.clone();
    wait_until(Duration::from_secs(2), || {
        let sessions = sessions.clone();
        let code = code.clone();
        async move {
            sessions
                .presence(&code)
                .await
                .map(|p| p.len() == 1)
                .unwrap_or(false)
        }
    })
    .await?;

    fac.close().await?;
    server.stop().await;
    Ok(())
}

#[tokio::test]
async fn upgrade_is_refused_for_unknown_rooms_and_bad_tokens() -> Result<(), Box<dyn std::error::Error>>
{
    let state = build_test_state().await;
    let security = state.security.clone();
    let session = state.sessions.create_session(1, "EPIC-1", "fac").await?;
    let server = start_test_server(state).await?;

    let token = mint_test_token("fac", &security);
    let unknown = WebSocketClient::connect_retry(
        &server.ws_url("ZZZZZZZZ", &token),
        Duration::from_millis(200),
    )
    .await;
    assert!(unknown.is_err());

    let forged = WebSocketClient::connect_retry(
        &server.ws_url(&session.room_code, "not-a-jwt"),
        Duration::from_millis(200),
    )
    .await;
    assert!(forged.is_err());

    server.stop().await;
    Ok(())
}
