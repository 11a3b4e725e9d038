//! The chapter entity: one installment of quest content.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::collaborators::GeneratedChapter;

/// One published (or drafted) installment of a quest. Chapter rows are
/// append-only: once created they are never mutated except for the single
/// `posted_tweet_id` write when the post succeeds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Chapter {
    /// Opaque identity.
    pub id: Uuid,
    /// Owning quest.
    pub quest_id: Uuid,
    /// Position within the quest; unique per quest.
    pub chapter_number: i32,
    /// Chapter prose.
    pub content: String,
    /// Ordered choice labels participants vote between.
    pub options: Vec<String>,
    /// Source attributions from the content generator.
    pub sources: Vec<String>,
    /// Whether the generator flagged this chapter as the story's end.
    /// Persisted with the draft so crash recovery never re-asks the generator.
    pub is_final: bool,
    /// Remote id once published; absent until the post succeeds.
    pub posted_tweet_id: Option<String>,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
}

impl Chapter {
    /// Builds an unposted draft row from generator output.
    #[must_use]
    pub fn draft(
        quest_id: Uuid,
        chapter_number: i32,
        generated: GeneratedChapter,
        now: DateTime<Utc>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            quest_id,
            chapter_number,
            content: generated.content,
            options: generated.options,
            sources: generated.sources,
            is_final: generated.is_final,
            posted_tweet_id: None,
            created_at: now,
        }
    }
}
