//! Duel elimination events.
//!
//! The duel mechanic runs adjacent to chapter progression; the engine only
//! stores and lists its events.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::post};
use chrono::{DateTime, Utc};
use questline_core::error::EngineError;
use questline_core::execution::Execution;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /{short_id}/executions.
#[derive(Debug, Deserialize)]
pub struct RecordExecutionRequest {
    /// The eliminated participant.
    pub user_id: String,
    /// Which side of the duel the participant was on.
    pub side: String,
    /// The roast delivered at elimination.
    pub roast_text: String,
    /// Optional tombstone artifact link.
    #[serde(default)]
    pub tombstone_url: Option<String>,
}

/// Read-only view of an execution.
#[derive(Debug, Serialize)]
pub struct ExecutionView {
    /// Execution id.
    pub id: Uuid,
    /// The eliminated participant.
    pub user_id: String,
    /// Duel side.
    pub side: String,
    /// Roast text.
    pub roast_text: String,
    /// Tombstone link, if set.
    pub tombstone_url: Option<String>,
    /// When the elimination happened.
    pub created_at: DateTime<Utc>,
}

impl ExecutionView {
    fn from_execution(execution: &Execution) -> Self {
        Self {
            id: execution.id,
            user_id: execution.user_id.clone(),
            side: execution.side.clone(),
            roast_text: execution.roast_text.clone(),
            tombstone_url: execution.tombstone_url.clone(),
            created_at: execution.created_at,
        }
    }
}

/// POST /{short_id}/executions
#[instrument(skip(state, request), fields(user_id = %request.user_id))]
async fn record_execution(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
    Json(request): Json<RecordExecutionRequest>,
) -> Result<Json<ExecutionView>, ApiError> {
    if request.user_id.trim().is_empty() {
        return Err(EngineError::Validation("user_id must not be empty".into()).into());
    }

    let quest = state.repo.load_quest_by_short_id(&short_id).await?;
    let execution = Execution {
        id: Uuid::new_v4(),
        quest_id: quest.id,
        user_id: request.user_id,
        side: request.side,
        roast_text: request.roast_text,
        tombstone_url: request.tombstone_url,
        created_at: state.clock.now(),
    };
    state.repo.record_execution(&execution).await?;

    info!(%short_id, execution_id = %execution.id, "execution recorded");
    Ok(Json(ExecutionView::from_execution(&execution)))
}

/// GET /{short_id}/executions
#[instrument(skip(state))]
async fn list_executions(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
) -> Result<Json<Vec<ExecutionView>>, ApiError> {
    let quest = state.repo.load_quest_by_short_id(&short_id).await?;
    let executions = state.repo.list_executions(quest.id).await?;
    Ok(Json(
        executions.iter().map(ExecutionView::from_execution).collect(),
    ))
}

/// Returns the executions router.
pub fn router() -> Router<AppState> {
    Router::new().route(
        "/{short_id}/executions",
        post(record_execution).get(list_executions),
    )
}
