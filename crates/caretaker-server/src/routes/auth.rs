//! Session endpoints: login, logout, session status.
//!
//! Login is handed an already-authenticated identity by the upstream login
//! flow and issues the supervisor's own session token. Logout is best-effort
//! against the revocation store — the cookie is cleared regardless — and a
//! logout with no cookie is still a successful no-op.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use axum::{Json, Router};
use axum_extra::extract::cookie::CookieJar;
use serde::{Deserialize, Serialize};
use tracing::warn;

use caretaker_core::session::SessionIdentity;

use crate::cookies;
use crate::error::AppError;
use crate::state::AppState;

/// Build the auth router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/auth/login", post(login))
        .route("/auth/logout", post(logout))
        .route("/session/status", get(session_status))
}

// ── Request / Response types ─────────────────────────────────────────

#[derive(Debug, Deserialize)]
struct LoginRequest {
    user_id: Option<String>,
    email: Option<String>,
    plan: Option<String>,
    onboarding_completed: Option<bool>,
}

/// Public projection of a session.
#[derive(Debug, Serialize)]
struct SessionResponse {
    #[serde(rename = "userId")]
    user_id: String,
    email: String,
    plan: String,
    onboarding_completed: bool,
    expires_at: String,
}

// ── Handlers ─────────────────────────────────────────────────────────

/// Issue a session for an authenticated identity and set the cookie.
async fn login(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
    body: Bytes,
) -> Result<(CookieJar, Json<SessionResponse>), AppError> {
    let request: LoginRequest = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid login body: {e}")))?;

    let user_id = request
        .user_id
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest("user_id is required".to_owned()))?;
    let email = request
        .email
        .filter(|v| !v.is_empty())
        .ok_or_else(|| AppError::BadRequest("email is required".to_owned()))?;

    let identity = SessionIdentity {
        user_id,
        email,
        plan: request.plan.unwrap_or_else(|| "free".to_owned()),
        onboarding_completed: request.onboarding_completed.unwrap_or(false),
    };

    let issued = state.sessions.issue(&identity)?;
    let jar = jar.add(cookies::session_cookie(&state.config, &issued));

    Ok((
        jar,
        Json(SessionResponse {
            user_id: identity.user_id,
            email: identity.email,
            plan: identity.plan,
            onboarding_completed: identity.onboarding_completed,
            expires_at: issued.expires_at.to_rfc3339(),
        }),
    ))
}

/// Revoke the current session (best-effort) and clear the cookie.
async fn logout(State(state): State<Arc<AppState>>, jar: CookieJar) -> (CookieJar, StatusCode) {
    if let Some(cookie) = jar.get(&state.config.cookie_name) {
        if let Ok(claims) = state.sessions.verify(cookie.value()).await {
            // Write failure must not fail logout: the cookie is cleared
            // client-side either way.
            if let Err(e) = state.sessions.revoke(&claims).await {
                warn!(error = %e, "revocation write failed during logout");
            }
        }
    }

    let jar = jar.remove(cookies::removal_cookie(&state.config));
    (jar, StatusCode::NO_CONTENT)
}

/// Report session validity; performs sliding renewal as a side effect.
async fn session_status(
    State(state): State<Arc<AppState>>,
    jar: CookieJar,
) -> (CookieJar, Json<serde_json::Value>) {
    let Some(cookie) = jar.get(&state.config.cookie_name) else {
        return (jar, Json(serde_json::json!({"valid": false})));
    };

    let Ok(claims) = state.sessions.verify(cookie.value()).await else {
        return (jar, Json(serde_json::json!({"valid": false})));
    };

    let jar = match state.sessions.maybe_renew(&claims) {
        Ok(Some(issued)) => jar.add(cookies::session_cookie(&state.config, &issued)),
        Ok(None) => jar,
        Err(e) => {
            warn!(error = %e, "session renewal failed");
            jar
        }
    };

    (
        jar,
        Json(serde_json::json!({
            "valid": true,
            "userId": claims.sub,
            "email": claims.email,
            "plan": claims.plan,
            "onboarding_completed": claims.onboarding_completed,
        })),
    )
}
