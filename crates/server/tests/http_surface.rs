//! Integration tests for the HTTP surface (spec §6), exercised end to end
//! through the real router with the `mock` provider so no network access
//! is required.

use std::sync::Arc;

use axum::body::Body;
use axum::http::{Request, StatusCode};
use http_body_util::BodyExt;
use ovp_config::Settings;
use ovp_keys::{CredentialStore, FileKeyRepository, KeyRepository};
use ovp_server::{create_router, AppState};
use ovp_voice::StaticVoiceMap;
use tower::ServiceExt;

async fn test_state() -> AppState {
    let dir = tempfile::tempdir().unwrap();
    let repo = FileKeyRepository::load(dir.path().join("keys.json")).await.unwrap();
    let credentials = CredentialStore::load(dir.path().join("credentials.json")).await.unwrap();
    AppState::new(
        Settings::default(),
        Arc::new(repo) as Arc<dyn KeyRepository>,
        Arc::new(credentials),
        StaticVoiceMap::new(),
    )
}

async fn create_key(state: &AppState, is_admin: bool) -> String {
    let (plaintext, _record) = state
        .key_repository
        .create(
            "test key".to_string(),
            is_admin,
            true,
            Default::default(),
            None,
            None,
        )
        .await
        .unwrap();
    plaintext
}

async fn body_json(response: axum::response::Response) -> serde_json::Value {
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    serde_json::from_slice(&bytes).unwrap()
}

#[tokio::test]
async fn health_check_requires_no_auth() {
    let app = create_router(test_state().await);
    let response = app
        .oneshot(Request::builder().uri("/health").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
}

#[tokio::test]
async fn synthesize_without_api_key_is_unauthorized() {
    let app = create_router(test_state().await);
    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/text-to-speech/mock-silence")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"text":"hello"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn synthesize_with_valid_key_returns_audio() {
    let state = test_state().await;
    let key = create_key(&state, false).await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/text-to-speech/mock-silence")
                .header("content-type", "application/json")
                .header("X-API-Key", key)
                .body(Body::from(r#"{"text":"hello world"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let bytes = response.into_body().collect().await.unwrap().to_bytes();
    assert_eq!(&bytes[0..4], b"RIFF");
}

#[tokio::test]
async fn synthesize_unknown_voice_is_not_found() {
    let state = test_state().await;
    let key = create_key(&state, false).await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/v1/text-to-speech/no-such-engine-xyz")
                .header("content-type", "application/json")
                .header("X-API-Key", key)
                .body(Body::from(r#"{"text":"hello"}"#))
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn admin_endpoints_reject_non_admin_keys() {
    let state = test_state().await;
    let key = create_key(&state, false).await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/api/keys")
                .header("X-API-Key", key)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::FORBIDDEN);
}

#[tokio::test]
async fn admin_can_create_and_list_keys() {
    let state = test_state().await;
    let admin_key = create_key(&state, true).await;
    let app = create_router(state);

    let response = app
        .clone()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/admin/api/keys")
                .header("content-type", "application/json")
                .header("X-API-Key", &admin_key)
                .body(Body::from(r#"{"name":"customer-1"}"#))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::CREATED);
    let created = body_json(response).await;
    assert!(created["apiKey"].as_str().unwrap().starts_with("tts_"));

    let response = app
        .oneshot(
            Request::builder()
                .uri("/admin/api/keys")
                .header("X-API-Key", &admin_key)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    let list = body_json(response).await;
    // the admin's own persisted key plus the one just created
    assert!(list["keys"].as_array().unwrap().len() >= 2);
}

#[tokio::test]
async fn voices_list_only_includes_enabled_providers() {
    let state = test_state().await;
    let key = create_key(&state, false).await;
    let app = create_router(state);

    let response = app
        .oneshot(
            Request::builder()
                .uri("/v1/voices")
                .header("X-API-Key", key)
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();

    assert_eq!(response.status(), StatusCode::OK);
    let body = body_json(response).await;
    let voices = body["voices"].as_array().unwrap();
    assert!(voices.iter().any(|v| v["voice_id"].as_str() == Some("mock-silence")));
}
