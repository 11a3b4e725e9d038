//! Quest lifecycle routes: creation, inspection, operator resume.

use axum::extract::{Path, State};
use axum::{Json, Router, routing::get, routing::post};
use chrono::{DateTime, Utc};
use questline_core::collaborators::GeneratedChapter;
use questline_core::error::EngineError;
use questline_core::quest::{Quest, QuestStatus};
use questline_engine::machine;
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;

use crate::error::ApiError;
use crate::state::AppState;

/// Request body for POST /.
#[derive(Debug, Deserialize)]
pub struct CreateQuestRequest {
    /// Public slug for the new quest.
    pub short_id: String,
    /// Seed chapter prose.
    pub content: String,
    /// Seed chapter options.
    pub options: Vec<String>,
    /// Optional source attributions for the seed chapter.
    #[serde(default)]
    pub sources: Vec<String>,
}

/// Read-only view of a quest.
#[derive(Debug, Serialize)]
pub struct QuestView {
    /// Public slug.
    pub short_id: String,
    /// Lifecycle status.
    pub status: QuestStatus,
    /// Most recently published chapter number.
    pub current_chapter: i32,
    /// When the open vote window closes, if one is open.
    pub chapter_deadline: Option<DateTime<Utc>>,
    /// Remote id of the last published post.
    pub last_posted_tweet_id: Option<String>,
    /// Denormalized progression history.
    pub timeline: serde_json::Value,
}

impl QuestView {
    fn from_quest(quest: &Quest) -> Self {
        Self {
            short_id: quest.short_id.clone(),
            status: quest.status,
            current_chapter: quest.current_chapter,
            chapter_deadline: quest.chapter_deadline,
            last_posted_tweet_id: quest.last_posted_tweet_id.clone(),
            timeline: quest.timeline_data.clone(),
        }
    }
}

/// POST / — create a quest and publish its seed chapter.
#[instrument(skip(state, request), fields(short_id = %request.short_id))]
async fn create_quest(
    State(state): State<AppState>,
    Json(request): Json<CreateQuestRequest>,
) -> Result<Json<QuestView>, ApiError> {
    if request.short_id.trim().is_empty() {
        return Err(EngineError::Validation("short_id must not be empty".into()).into());
    }
    if request.options.len() < 2 {
        return Err(
            EngineError::Validation("a chapter needs at least two options".into()).into(),
        );
    }

    let mut quest = Quest::new(Uuid::new_v4(), request.short_id, state.clock.now());
    state.repo.create_quest(&quest).await?;

    let seed = GeneratedChapter {
        content: request.content,
        options: request.options,
        sources: request.sources,
        is_final: false,
    };
    state.publisher().publish_seed(&mut quest, seed).await?;

    info!(quest_id = %quest.id, "quest created and seed chapter posted");
    Ok(Json(QuestView::from_quest(&quest)))
}

/// GET /{short_id}
#[instrument(skip(state))]
async fn get_quest(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
) -> Result<Json<QuestView>, ApiError> {
    let quest = state.repo.load_quest_by_short_id(&short_id).await?;
    Ok(Json(QuestView::from_quest(&quest)))
}

/// POST /{short_id}/resume — re-open a vote window on a held quest.
#[instrument(skip(state))]
async fn resume_quest(
    State(state): State<AppState>,
    Path(short_id): Path<String>,
) -> Result<Json<QuestView>, ApiError> {
    let mut quest = state.repo.load_quest_by_short_id(&short_id).await?;
    machine::resume(&mut quest, state.clock.now(), state.config.voting_window)?;
    state.repo.update_quest(&quest).await?;
    info!(quest_id = %quest.id, "held quest resumed");
    Ok(Json(QuestView::from_quest(&quest)))
}

/// Returns the quest lifecycle router.
pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_quest))
        .route("/{short_id}", get(get_quest))
        .route("/{short_id}/resume", post(resume_quest))
}
