use actix_web::http::{header, StatusCode};
use actix_web::test;
use backend_test_support::problem_details::assert_problem_details_from_service_response;
use tokio::sync::mpsc;

use crate::common::json_body;
use crate::support::app_builder::build_test_app;
use crate::support::auth::bearer_header;
use crate::support::state::{build_test_state, test_security};

#[actix_web::test]
async fn room_code_resolves_case_insensitively() {
    let state = build_test_state().await;
    let session = state
        .sessions
        .create_session(1, "EPIC-1", "fac")
        .await
        .expect("create session");
    let app = build_test_app(state).await;
    let auth = bearer_header("fac", &test_security());

    for code in [session.room_code.clone(), session.room_code.to_lowercase()] {
        let req = test::TestRequest::get()
            .uri(&format!("/api/rooms/{code}"))
            .insert_header((header::AUTHORIZATION, auth.as_str()))
            .to_request();
        let body = json_body(test::call_service(&app, req).await, 200).await;
        assert_eq!(body["session"]["id"], session.id);
        assert_eq!(body["viewer_is_facilitator"], true);
    }
}

#[actix_web::test]
async fn unknown_or_malformed_codes_are_not_found() {
    let app = build_test_app(build_test_state().await).await;
    let auth = bearer_header("fac", &test_security());

    for code in ["ZZZZZZ", "not-a-code!"] {
        let req = test::TestRequest::get()
            .uri(&format!("/api/rooms/{code}"))
            .insert_header((header::AUTHORIZATION, auth.as_str()))
            .to_request();
        assert_problem_details_from_service_response(
            test::call_service(&app, req).await,
            "ROOM_NOT_FOUND",
            StatusCode::NOT_FOUND,
            None,
        )
        .await;
    }
}

#[actix_web::test]
async fn presence_lists_connected_participants() {
    let state = build_test_state().await;
    let session = state
        .sessions
        .create_session(1, "EPIC-1", "fac")
        .await
        .expect("create session");
    let (tx, _rx) = mpsc::channel(16);
    state
        .sessions
        .join(&session.room_code, "alice", "Alice", Some("build".into()), tx)
        .await
        .expect("join");
    let app = build_test_app(state).await;

    let req = test::TestRequest::get()
        .uri(&format!("/api/rooms/{}/presence", session.room_code))
        .insert_header((header::AUTHORIZATION, bearer_header("bob", &test_security())))
        .to_request();
    let body = json_body(test::call_service(&app, req).await, 200).await;
    let participants = body.as_array().expect("array");
    assert_eq!(participants.len(), 1);
    assert_eq!(participants[0]["identity"], "alice");
    assert_eq!(participants[0]["role"], "build");
    assert_eq!(participants[0]["facilitator"], false);
}
