//! The quest entity and its lifecycle status.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle status of a quest. `Completed` and `Archived` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum QuestStatus {
    /// The quest is running; a `Some` chapter deadline means a vote window
    /// is open and awaiting its tally.
    Active,
    /// The story reached a terminal chapter or the chapter cap.
    Completed,
    /// Abandoned by community signal or prolonged zero participation.
    Archived,
}

impl QuestStatus {
    /// Database/text representation.
    #[must_use]
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Active => "ACTIVE",
            Self::Completed => "COMPLETED",
            Self::Archived => "ARCHIVED",
        }
    }

    /// Parses the database/text representation.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "ACTIVE" => Some(Self::Active),
            "COMPLETED" => Some(Self::Completed),
            "ARCHIVED" => Some(Self::Archived),
            _ => None,
        }
    }

    /// True for states with no outgoing transitions.
    #[must_use]
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Archived)
    }
}

/// One run of the interactive-fiction game.
///
/// The mutable engine fields (`status`, `current_chapter`, `chapter_deadline`,
/// `last_posted_tweet_id`, `current_state`, `timeline_data`) are written only
/// through the state-machine helpers while the quest's lease is held.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Quest {
    /// Opaque identity.
    pub id: Uuid,
    /// Public slug.
    pub short_id: String,
    /// Lifecycle status.
    pub status: QuestStatus,
    /// Chapter number of the most recently published chapter.
    pub current_chapter: i32,
    /// When the open vote window closes; `None` exactly when no chapter is
    /// awaiting a tally (terminal, held, or between chapters).
    pub chapter_deadline: Option<DateTime<Utc>>,
    /// Remote id of the last published post; publish dedup guard.
    pub last_posted_tweet_id: Option<String>,
    /// Auxiliary engine bookkeeping (idle-round counter, hold reason).
    pub current_state: serde_json::Value,
    /// Denormalized progression history, write-only from the engine.
    pub timeline_data: serde_json::Value,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

impl Quest {
    /// Creates a new quest in the `Active` state at chapter 0 with no open
    /// vote window yet.
    #[must_use]
    pub fn new(id: Uuid, short_id: impl Into<String>, now: DateTime<Utc>) -> Self {
        Self {
            id,
            short_id: short_id.into(),
            status: QuestStatus::Active,
            current_chapter: 0,
            chapter_deadline: None,
            last_posted_tweet_id: None,
            current_state: serde_json::json!({}),
            timeline_data: serde_json::json!([]),
            created_at: now,
            updated_at: now,
        }
    }
}
