//! Quest-level continuation signals.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::post};
use questline_core::error::EngineError;
use questline_core::vote::QuestVote;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /{short_id}/quest-votes.
#[derive(Debug, Deserialize)]
pub struct SubmitQuestVoteRequest {
    /// The participant signalling.
    pub user_id: String,
    /// Free-form signal, e.g. "continue" or "stop".
    pub vote: String,
}

/// Response body for continuation signals.
#[derive(Debug, Serialize)]
pub struct QuestVoteResponse {
    /// Whether the signal was recorded. Signals for terminal quests are
    /// ignored as no-ops.
    pub recorded: bool,
}

/// POST /{short_id}/quest-votes — one signal per user, latest wins.
#[instrument(skip(state, request), fields(user_id = %request.user_id))]
async fn submit_quest_vote(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
    Json(request): Json<SubmitQuestVoteRequest>,
) -> Result<Json<QuestVoteResponse>, ApiError> {
    if request.user_id.trim().is_empty() || request.vote.trim().is_empty() {
        return Err(
            EngineError::Validation("user_id and vote must not be empty".into()).into(),
        );
    }

    let quest = state.repo.load_quest_by_short_id(&short_id).await?;
    if quest.status.is_terminal() {
        debug!(%short_id, "continuation signal for terminal quest ignored");
        return Ok(Json(QuestVoteResponse { recorded: false }));
    }

    state
        .repo
        .record_quest_vote(&QuestVote {
            quest_id: quest.id,
            user_id: request.user_id,
            vote: request.vote,
            voted_at: state.clock.now(),
        })
        .await?;

    info!(%short_id, "continuation signal recorded");
    Ok(Json(QuestVoteResponse { recorded: true }))
}

/// Returns the continuation-signal router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{short_id}/quest-votes", post(submit_quest_vote))
}

#[cfg(test)]
mod tests {
    use super::*;

    use std::sync::Arc;

    use questline_core::repository::QuestRepository;

    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use chrono::{TimeZone, Utc};
    use questline_core::quest::{Quest, QuestStatus};
    use questline_core::vote::STOP_SIGNAL;
    use questline_test_support::{
        FixedClock, FixedInterpreter, FlakyPoster, InMemoryQuestRepository, ScriptedGenerator,
    };
    use tower::ServiceExt;
    use uuid::Uuid;

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    fn test_state(repo: Arc<InMemoryQuestRepository>) -> AppState {
        AppState::new(
            repo,
            Arc::new(ScriptedGenerator::new(vec![])),
            Arc::new(FlakyPoster::new()),
            Arc::new(FixedInterpreter::selecting(0)),
            Arc::new(FixedClock(fixed_now())),
            questline_core::config::EngineConfig::default(),
        )
    }

    fn signal_request(user_id: &str, vote: &str) -> Request<Body> {
        let body = serde_json::json!({ "user_id": user_id, "vote": vote });
        Request::builder()
            .method("POST")
            .uri("/q-1/quest-votes")
            .header("content-type", "application/json")
            .body(Body::from(serde_json::to_vec(&body).unwrap()))
            .unwrap()
    }

    #[tokio::test]
    async fn test_signal_is_recorded_and_upserts_per_user() {
        let repo = Arc::new(InMemoryQuestRepository::new());
        let quest = Quest::new(Uuid::new_v4(), "q-1", fixed_now());
        repo.insert_quest(quest.clone());

        let app = router().with_state(test_state(repo.clone()));
        let response = app
            .oneshot(signal_request("a", "continue"))
            .await
            .unwrap();
        assert_eq!(response.status(), StatusCode::OK);

        // The same user flips to "stop"; the old signal is superseded.
        let app = router().with_state(test_state(repo.clone()));
        app.oneshot(signal_request("a", STOP_SIGNAL)).await.unwrap();

        assert_eq!(
            repo.count_quest_votes(quest.id, STOP_SIGNAL).await.unwrap(),
            1
        );
        assert_eq!(
            repo.count_quest_votes(quest.id, "continue").await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_signal_for_terminal_quest_is_ignored() {
        let repo = Arc::new(InMemoryQuestRepository::new());
        let mut quest = Quest::new(Uuid::new_v4(), "q-1", fixed_now());
        quest.status = QuestStatus::Archived;
        repo.insert_quest(quest.clone());

        let app = router().with_state(test_state(repo.clone()));
        let response = app
            .oneshot(signal_request("a", STOP_SIGNAL))
            .await
            .unwrap();

        assert_eq!(response.status(), StatusCode::OK);
        assert_eq!(
            repo.count_quest_votes(quest.id, STOP_SIGNAL).await.unwrap(),
            0
        );
    }

    #[tokio::test]
    async fn test_empty_signal_is_rejected() {
        let repo = Arc::new(InMemoryQuestRepository::new());
        repo.insert_quest(Quest::new(Uuid::new_v4(), "q-1", fixed_now()));
        let app = router().with_state(test_state(repo));

        let response = app.oneshot(signal_request("a", "  ")).await.unwrap();

        assert_eq!(response.status(), StatusCode::BAD_REQUEST);
    }
}
