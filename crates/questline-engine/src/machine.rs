//! Quest state machine.
//!
//! The functions here are the only writers of a quest's mutable engine
//! fields (`status`, `current_chapter`, `chapter_deadline`,
//! `last_posted_tweet_id`, `current_state`, `timeline_data`). Callers must
//! hold the quest's progression lease before mutating.
//!
//! `Active` with a `Some` deadline means a vote window is open and awaiting
//! its tally. `Completed` and `Archived` are terminal: no further deadlines,
//! chapters, or vote acceptance.

use chrono::{DateTime, Duration, Utc};
use questline_core::chapter::Chapter;
use questline_core::error::EngineError;
use questline_core::quest::{Quest, QuestStatus};
use serde::Serialize;

/// `current_state` key for the consecutive zero-participation counter.
const IDLE_ROUNDS_KEY: &str = "idle_rounds";
/// `current_state` key for the hold marker on a stalled quest.
const HELD_KEY: &str = "held";
/// `current_state` key recording why a quest was archived.
const ARCHIVED_REASON_KEY: &str = "archived_reason";

/// Why a quest was archived.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "kind")]
pub enum ArchiveReason {
    /// The community's stop signals crossed the abandonment threshold.
    Abandoned {
        /// Stop-signal count at archival time.
        stop_votes: i64,
    },
    /// Too many consecutive deadlines fired with zero valid votes.
    Idle {
        /// Consecutive zero-participation rounds at archival time.
        rounds: u32,
    },
}

/// One denormalized history entry appended to `timeline_data` per publish.
#[derive(Debug, Clone, Serialize)]
pub struct TimelineEntry {
    /// The chapter that was published.
    pub chapter_number: i32,
    /// Remote id of the published post.
    pub posted_tweet_id: String,
    /// The option that led here; `None` for the seed chapter.
    pub winning_option: Option<usize>,
    /// Per-option vote counts at the tally.
    pub vote_counts: Vec<u32>,
    /// Valid ballots counted.
    pub participation: usize,
    /// When the publish committed.
    pub occurred_at: DateTime<Utc>,
}

/// True when the quest is accepting votes: active with an unexpired window.
#[must_use]
pub fn window_open(quest: &Quest, now: DateTime<Utc>) -> bool {
    quest.status == QuestStatus::Active
        && quest.chapter_deadline.is_some_and(|deadline| now < deadline)
}

/// True when the quest's vote window has elapsed and a tally is owed.
#[must_use]
pub fn deadline_elapsed(quest: &Quest, now: DateTime<Utc>) -> bool {
    quest.status == QuestStatus::Active
        && quest.chapter_deadline.is_some_and(|deadline| now >= deadline)
}

/// True when the quest is active but stalled awaiting operator intervention.
#[must_use]
pub fn is_held(quest: &Quest) -> bool {
    quest.status == QuestStatus::Active
        && quest.chapter_deadline.is_none()
        && quest.current_state.get(HELD_KEY).is_some()
}

/// Consecutive zero-participation rounds recorded on the quest.
#[must_use]
pub fn idle_rounds(quest: &Quest) -> u32 {
    quest
        .current_state
        .get(IDLE_ROUNDS_KEY)
        .and_then(serde_json::Value::as_u64)
        .and_then(|rounds| u32::try_from(rounds).ok())
        .unwrap_or(0)
}

/// Records another zero-participation deadline; returns the new count.
pub fn record_idle_round(quest: &mut Quest) -> u32 {
    let rounds = idle_rounds(quest) + 1;
    set_state_key(quest, IDLE_ROUNDS_KEY, serde_json::json!(rounds));
    rounds
}

/// Clears the zero-participation counter after a round with votes.
pub fn clear_idle_rounds(quest: &mut Quest) {
    remove_state_key(quest, IDLE_ROUNDS_KEY);
}

/// Opens the next vote window after a non-final chapter was published.
pub fn begin_voting_window(
    quest: &mut Quest,
    chapter: &Chapter,
    now: DateTime<Utc>,
    voting_window: Duration,
) {
    quest.current_chapter = chapter.chapter_number;
    quest.last_posted_tweet_id = chapter.posted_tweet_id.clone();
    quest.chapter_deadline = Some(now + voting_window);
    quest.updated_at = now;
}

/// Finishes the quest on a terminal chapter (or the chapter cap).
pub fn complete(quest: &mut Quest, chapter: &Chapter, now: DateTime<Utc>) {
    quest.current_chapter = chapter.chapter_number;
    quest.last_posted_tweet_id = chapter.posted_tweet_id.clone();
    quest.status = QuestStatus::Completed;
    quest.chapter_deadline = None;
    quest.updated_at = now;
}

/// Archives the quest; terminal, no further progression.
pub fn archive(quest: &mut Quest, reason: &ArchiveReason, now: DateTime<Utc>) {
    quest.status = QuestStatus::Archived;
    quest.chapter_deadline = None;
    quest.updated_at = now;
    // Serialization of a derived Serialize enum is infallible.
    if let Ok(value) = serde_json::to_value(reason) {
        set_state_key(quest, ARCHIVED_REASON_KEY, value);
    }
}

/// Stalls the quest at its current chapter: deadline cleared, hold reason
/// recorded for operator review. The scheduler will not pick it up again
/// until an operator resumes it.
pub fn hold(quest: &mut Quest, reason: &str, now: DateTime<Utc>) {
    quest.chapter_deadline = None;
    quest.updated_at = now;
    set_state_key(
        quest,
        HELD_KEY,
        serde_json::json!({ "reason": reason, "at": now }),
    );
}

/// Re-opens a vote window on a held quest.
///
/// # Errors
///
/// Returns `Validation` if the quest is terminal or already has an open
/// window.
pub fn resume(
    quest: &mut Quest,
    now: DateTime<Utc>,
    voting_window: Duration,
) -> Result<(), EngineError> {
    if quest.status.is_terminal() {
        return Err(EngineError::Validation(format!(
            "quest {} is {} and cannot be resumed",
            quest.short_id,
            quest.status.as_str()
        )));
    }
    if quest.chapter_deadline.is_some() {
        return Err(EngineError::Validation(format!(
            "quest {} already has an open vote window",
            quest.short_id
        )));
    }
    remove_state_key(quest, HELD_KEY);
    quest.chapter_deadline = Some(now + voting_window);
    quest.updated_at = now;
    Ok(())
}

/// Appends a progression entry to the quest's denormalized timeline.
pub fn append_timeline_entry(quest: &mut Quest, entry: &TimelineEntry) {
    // Serialization of a derived Serialize struct is infallible.
    let Ok(value) = serde_json::to_value(entry) else {
        return;
    };
    if let Some(timeline) = quest.timeline_data.as_array_mut() {
        timeline.push(value);
        return;
    }
    quest.timeline_data = serde_json::Value::Array(vec![value]);
}

fn set_state_key(quest: &mut Quest, key: &str, value: serde_json::Value) {
    if let Some(state) = quest.current_state.as_object_mut() {
        state.insert(key.to_owned(), value);
        return;
    }
    let mut state = serde_json::Map::new();
    state.insert(key.to_owned(), value);
    quest.current_state = serde_json::Value::Object(state);
}

fn remove_state_key(quest: &mut Quest, key: &str) {
    if let Some(state) = quest.current_state.as_object_mut() {
        state.remove(key);
    }
}
