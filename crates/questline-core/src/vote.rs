//! Vote entities: per-chapter ballots and quest-level continuation signals.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// The continuation signal value that counts toward abandonment.
pub const STOP_SIGNAL: &str = "stop";

/// What the external interpreter made of a raw reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct VoteInterpretation {
    /// The option label (or free-form reading) the interpreter settled on.
    pub label: String,
    /// Interpreter confidence in `[0.0, 1.0]`.
    pub confidence: f64,
}

/// One participant's interpreted choice for a chapter. Append-only; repeat
/// votes from one user are allowed and counted per the configured
/// `VotePolicy`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChapterVote {
    /// Opaque identity.
    pub id: Uuid,
    /// The chapter this ballot targets.
    pub chapter_id: Uuid,
    /// The owning quest (denormalized for scoped queries).
    pub quest_id: Uuid,
    /// The participant who voted.
    pub user_id: String,
    /// Index into the chapter's options list.
    pub selected_option: i32,
    /// The raw reply text the interpretation was derived from.
    pub reply_text: String,
    /// Interpreter output.
    pub interpretation: VoteInterpretation,
    /// When the vote was cast.
    pub voted_at: DateTime<Utc>,
}

/// One participant's continue/stop signal for the quest as a whole.
/// Unique per `(quest_id, user_id)`; recording again overwrites.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct QuestVote {
    /// The quest the signal applies to.
    pub quest_id: Uuid,
    /// The participant.
    pub user_id: String,
    /// Free-form signal; [`STOP_SIGNAL`] counts toward abandonment.
    pub vote: String,
    /// When the signal was recorded.
    pub voted_at: DateTime<Utc>,
}
