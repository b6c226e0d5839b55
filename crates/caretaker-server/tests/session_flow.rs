//! HTTP-level tests of the session, ingest, and dispatch surface.
//!
//! Drives the real router with in-process services: the memory revocation
//! store and an in-memory central store. No Docker daemon or Redis server is
//! required — paths that would touch the container runtime are not exercised
//! here.

#![allow(clippy::unwrap_used, clippy::expect_used)]

use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;

use axum::body::Body;
use axum::extract::ConnectInfo;
use axum::http::{header, Request, StatusCode};
use axum::response::Response;
use axum::Router;
use tower::ServiceExt;

use caretaker_core::central::CentralStore;
use caretaker_core::revocation::MemoryStore;
use caretaker_runtime::ContainerRuntime;
use caretaker_server::config::ServerConfig;
use caretaker_server::routes;
use caretaker_server::state::AppState;

fn test_config() -> ServerConfig {
    ServerConfig {
        bind_addr: SocketAddr::from(([127, 0, 0, 1], 0)),
        public_url: "https://app.example.com".to_owned(),
        log_level: "info".to_owned(),
        cookie_name: "session".to_owned(),
        cookie_secret: "integration-test-secret".to_owned(),
        cookie_domain: None,
        session_ttl: Duration::from_secs(1800),
        renew_window: Duration::from_secs(600),
        redis_url: "redis://127.0.0.1:6379".to_owned(),
        central_db_path: ":memory:".to_owned(),
        idle_threshold: Duration::from_secs(1800),
        reaper_interval: Duration::from_secs(60),
        health_wait: Duration::from_secs(45),
        namespace_key: "test-namespace".to_owned(),
        tenant_image: "tenant-app:latest".to_owned(),
        tenant_port: 8080,
        tenant_cpus: 1,
        tenant_ram_gb: 2,
        tenant_pids: 256,
        tenant_env: vec![],
    }
}

async fn test_app() -> (Router, Arc<AppState>) {
    let central = CentralStore::open_in_memory().await.unwrap();
    let runtime = Arc::new(ContainerRuntime::connect().unwrap());
    let state = AppState::new(
        test_config(),
        Arc::new(MemoryStore::new()),
        central,
        runtime,
    )
    .unwrap();
    (routes::router(Arc::clone(&state)), state)
}

fn json_request(method: &str, uri: &str, body: serde_json::Value) -> Request<Body> {
    Request::builder()
        .method(method)
        .uri(uri)
        .header(header::CONTENT_TYPE, "application/json")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
        .body(Body::from(body.to_string()))
        .unwrap()
}

fn get_request(uri: &str, cookie: Option<&str>) -> Request<Body> {
    let mut builder = Request::builder()
        .method("GET")
        .uri(uri)
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))));
    if let Some(cookie) = cookie {
        builder = builder.header(header::COOKIE, cookie);
    }
    builder.body(Body::empty()).unwrap()
}

async fn body_json(response: Response) -> serde_json::Value {
    let bytes = axum::body::to_bytes(response.into_body(), 1 << 20)
        .await
        .unwrap();
    serde_json::from_slice(&bytes).unwrap()
}

/// `name=value` pair from a `Set-Cookie` header.
fn cookie_pair(response: &Response) -> String {
    let raw = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap();
    raw.split(';').next().unwrap().to_owned()
}

async fn login(app: &Router, user_id: &str) -> (String, Response) {
    let response = app
        .clone()
        .oneshot(json_request(
            "POST",
            "/auth/login",
            serde_json::json!({
                "user_id": user_id,
                "email": "a@b",
                "plan": "free",
                "onboarding_completed": false,
            }),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    (cookie_pair(&response), response)
}

#[tokio::test]
async fn login_sets_a_hardened_cookie_and_returns_the_projection() {
    let (app, _state) = test_app().await;
    let (_, response) = login(&app, "u-1").await;

    let raw_cookie = response
        .headers()
        .get(header::SET_COOKIE)
        .unwrap()
        .to_str()
        .unwrap()
        .to_owned();
    assert!(raw_cookie.starts_with("session="));
    assert!(raw_cookie.contains("HttpOnly"));
    assert!(raw_cookie.contains("Secure"));
    assert!(raw_cookie.contains("SameSite=Strict"));
    assert!(raw_cookie.contains("Path=/"));

    let body = body_json(response).await;
    assert_eq!(body["userId"], "u-1");
    assert_eq!(body["email"], "a@b");
    assert_eq!(body["plan"], "free");
    assert_eq!(body["onboarding_completed"], false);
}

#[tokio::test]
async fn login_without_user_id_is_rejected() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(json_request(
            "POST",
            "/auth/login",
            serde_json::json!({"email": "a@b"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn login_with_malformed_json_is_rejected() {
    let (app, _state) = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/auth/login")
        .header(header::CONTENT_TYPE, "application/json")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
        .body(Body::from("{not json"))
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn session_status_round_trips_a_valid_cookie() {
    let (app, _state) = test_app().await;
    let (cookie, _) = login(&app, "u-1").await;

    let response = app
        .oneshot(get_request("/session/status", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["valid"], true);
    assert_eq!(body["userId"], "u-1");
    assert_eq!(body["email"], "a@b");
}

#[tokio::test]
async fn session_status_without_cookie_is_invalid_not_an_error() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(get_request("/session/status", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::OK);
    assert_eq!(body_json(response).await["valid"], false);
}

#[tokio::test]
async fn logout_revokes_the_session() {
    let (app, _state) = test_app().await;
    let (cookie, _) = login(&app, "u-1").await;

    let logout = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .header(header::COOKIE, &cookie)
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
        .body(Body::empty())
        .unwrap();
    let response = app.clone().oneshot(logout).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    // The response clears the cookie client-side.
    assert!(response.headers().get(header::SET_COOKIE).is_some());

    // The very same cookie no longer verifies.
    let response = app
        .oneshot(get_request("/session/status", Some(&cookie)))
        .await
        .unwrap();
    assert_eq!(body_json(response).await["valid"], false);
}

#[tokio::test]
async fn logout_without_cookie_is_a_successful_no_op() {
    let (app, _state) = test_app().await;
    let request = Request::builder()
        .method("POST")
        .uri("/auth/logout")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
        .body(Body::empty())
        .unwrap();
    let response = app.oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
}

#[tokio::test]
async fn proxied_path_without_session_is_unauthorized() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(get_request("/arbitrary/path", None))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::UNAUTHORIZED);
    // Plain 401, not the wake sentinel.
    assert!(response.headers().get("x-wake-required").is_none());
    assert_eq!(body_json(response).await["error"], "unauthorized");
}

#[tokio::test]
async fn warmup_without_user_id_is_rejected() {
    let (app, _state) = test_app().await;
    let response = app
        .oneshot(json_request("POST", "/warmup", serde_json::json!({})))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn status_without_user_id_is_rejected() {
    let (app, _state) = test_app().await;
    let response = app.oneshot(get_request("/status", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn health_reports_dependency_state() {
    let (app, _state) = test_app().await;
    let response = app.oneshot(get_request("/health", None)).await.unwrap();
    assert_eq!(response.status(), StatusCode::OK);

    let body = body_json(response).await;
    assert_eq!(body["status"], "ok");
    // Memory revocation store and in-memory SQLite are both reachable.
    assert_eq!(body["redis_ok"], true);
    assert_eq!(body["central_db_ok"], true);
}

#[tokio::test]
async fn ingest_is_an_upsert_on_the_conversation_key() {
    let (app, state) = test_app().await;

    for tokens_in in [10, 20] {
        let response = app
            .clone()
            .oneshot(json_request(
                "POST",
                "/admin/ingest-summary",
                serde_json::json!({
                    "user_id": "u-3",
                    "conversation_id": "c-9",
                    "tokens_in": tokens_in,
                    "tokens_out": 4,
                    "model": "m1",
                    "provider": "p1",
                }),
            ))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::NO_CONTENT);
    }

    assert_eq!(state.central.count_for_user("u-3").await.unwrap(), 1);
    let row = state
        .central
        .fetch_summary("u-3", "c-9")
        .await
        .unwrap()
        .unwrap();
    assert_eq!(row.tokens_in, 20);
}

#[tokio::test]
async fn ingest_accepts_the_internal_alias() {
    let (app, state) = test_app().await;
    let response = app
        .oneshot(json_request(
            "POST",
            "/internal/summary",
            serde_json::json!({"user_id": "u-4", "conversation_id": "c-1"}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::NO_CONTENT);
    assert_eq!(state.central.count_for_user("u-4").await.unwrap(), 1);
}

#[tokio::test]
async fn ingest_rejects_malformed_and_keyless_bodies() {
    let (app, _state) = test_app().await;

    let request = Request::builder()
        .method("POST")
        .uri("/admin/ingest-summary")
        .header(header::CONTENT_TYPE, "application/json")
        .extension(ConnectInfo(SocketAddr::from(([127, 0, 0, 1], 40000))))
        .body(Body::from("{broken"))
        .unwrap();
    let response = app.clone().oneshot(request).await.unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);

    let response = app
        .oneshot(json_request(
            "POST",
            "/admin/ingest-summary",
            serde_json::json!({"user_id": "", "conversation_id": ""}),
        ))
        .await
        .unwrap();
    assert_eq!(response.status(), StatusCode::BAD_REQUEST);
}

#[tokio::test]
async fn activity_recording_is_not_older_than_the_request() {
    let (_app, state) = test_app().await;
    let accepted = chrono::Utc::now();

    state.touch("app__abc").await;
    let seen = state.last_seen_of("app__abc").await.unwrap();
    assert!(seen >= accepted);

    state.clear_activity("app__abc").await;
    assert!(state.last_seen_of("app__abc").await.is_none());
}

#[tokio::test]
async fn supervisor_routes_carry_security_headers() {
    let (app, _state) = test_app().await;
    let response = app.oneshot(get_request("/health", None)).await.unwrap();
    assert_eq!(
        response.headers().get("x-content-type-options").unwrap(),
        "nosniff"
    );
    assert_eq!(response.headers().get("cache-control").unwrap(), "no-store");
}
