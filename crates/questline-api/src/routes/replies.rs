//! Reply ingestion: raw replies become interpreted chapter votes.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::post};
use questline_core::error::EngineError;
use questline_core::vote::ChapterVote;
use questline_engine::machine;
use serde::{Deserialize, Serialize};
use tracing::{debug, info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /{short_id}/replies.
#[derive(Debug, Deserialize)]
pub struct SubmitReplyRequest {
    /// The participant who replied.
    pub user_id: String,
    /// The raw reply text.
    pub reply_text: String,
}

/// Response body for reply submission. A reply that cannot be counted is a
/// no-op, not an error.
#[derive(Debug, Serialize)]
pub struct ReplyResponse {
    /// Whether the reply was recorded as a vote.
    pub counted: bool,
    /// The interpreted option index, when counted.
    pub selected_option: Option<usize>,
    /// Why the reply was not counted, when applicable.
    pub reason: Option<&'static str>,
}

/// POST /{short_id}/replies
#[instrument(skip(state, request), fields(user_id = %request.user_id))]
async fn submit_reply(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
    Json(request): Json<SubmitReplyRequest>,
) -> Result<Json<ReplyResponse>, ApiError> {
    if request.user_id.trim().is_empty() {
        return Err(EngineError::Validation("user_id must not be empty".into()).into());
    }

    let quest = state.repo.load_quest_by_short_id(&short_id).await?;
    let now = state.clock.now();
    if !machine::window_open(&quest, now) {
        debug!(%short_id, "reply arrived with no open vote window");
        return Ok(Json(ReplyResponse {
            counted: false,
            selected_option: None,
            reason: Some("no_open_window"),
        }));
    }

    let chapter = state
        .repo
        .load_chapter(quest.id, quest.current_chapter)
        .await?
        .ok_or(EngineError::ChapterNotFound {
            quest_id: quest.id,
            chapter_number: quest.current_chapter,
        })?;

    let choice = state
        .interpreter
        .interpret(&request.reply_text, &chapter.options)
        .await?;

    // The interpreter's index is re-checked against the option range; a bad
    // index is dropped here rather than poisoning the tally.
    let selected = choice
        .selected_option
        .filter(|&index| index < chapter.options.len());
    let Some(index) = selected else {
        debug!(%short_id, "reply could not be read as a vote");
        return Ok(Json(ReplyResponse {
            counted: false,
            selected_option: None,
            reason: Some("uninterpretable"),
        }));
    };
    let Ok(selected_option) = i32::try_from(index) else {
        return Ok(Json(ReplyResponse {
            counted: false,
            selected_option: None,
            reason: Some("uninterpretable"),
        }));
    };

    let vote = ChapterVote {
        id: Uuid::new_v4(),
        chapter_id: chapter.id,
        quest_id: quest.id,
        user_id: request.user_id,
        selected_option,
        reply_text: request.reply_text,
        interpretation: choice.interpretation,
        voted_at: now,
    };
    state.repo.record_vote(&vote).await?;

    info!(%short_id, chapter_number = chapter.chapter_number, index, "vote recorded");
    Ok(Json(ReplyResponse {
        counted: true,
        selected_option: Some(index),
        reason: None,
    }))
}

/// Returns the reply ingestion router.
pub fn router() -> Router<AppState> {
    Router::new().route("/{short_id}/replies", post(submit_reply))
}
