//! Conversation-summary ingest.
//!
//! Tenants post per-conversation analytics summaries; each post is an upsert
//! keyed by `(user_id, conversation_id)` that overwrites every non-key
//! field. Served on both the admin and internal paths.

use std::sync::Arc;

use axum::body::Bytes;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::post;
use axum::Router;

use caretaker_core::central::ConversationSummary;

use crate::error::AppError;
use crate::state::AppState;

/// Build the ingest router.
pub fn router() -> Router<Arc<AppState>> {
    Router::new()
        .route("/admin/ingest-summary", post(ingest_summary))
        .route("/internal/summary", post(ingest_summary))
}

/// Upsert one conversation summary into the central store.
async fn ingest_summary(
    State(state): State<Arc<AppState>>,
    body: Bytes,
) -> Result<StatusCode, AppError> {
    let summary: ConversationSummary = serde_json::from_slice(&body)
        .map_err(|e| AppError::BadRequest(format!("invalid summary body: {e}")))?;

    if summary.user_id.is_empty() || summary.conversation_id.is_empty() {
        return Err(AppError::BadRequest(
            "user_id and conversation_id are required".to_owned(),
        ));
    }

    state.central.upsert_summary(&summary).await?;
    Ok(StatusCode::NO_CONTENT)
}
