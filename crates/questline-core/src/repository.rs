//! Storage abstraction for quests, chapters, votes, and leases.
//!
//! The engine mutates quest state only through this trait while holding the
//! quest's lease. Vote rows are append-only and written without locking.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::chapter::Chapter;
use crate::error::EngineError;
use crate::execution::Execution;
use crate::quest::Quest;
use crate::vote::{ChapterVote, QuestVote};

/// Repository for the quest progression engine's persisted state.
#[async_trait]
pub trait QuestRepository: Send + Sync {
    /// Persists a new quest row.
    async fn create_quest(&self, quest: &Quest) -> Result<(), EngineError>;

    /// Loads a quest by id.
    async fn load_quest(&self, quest_id: Uuid) -> Result<Quest, EngineError>;

    /// Loads a quest by its public slug.
    async fn load_quest_by_short_id(&self, short_id: &str) -> Result<Quest, EngineError>;

    /// Writes back a mutated quest row.
    async fn update_quest(&self, quest: &Quest) -> Result<(), EngineError>;

    /// Ids of ACTIVE quests whose chapter deadline has elapsed as of `as_of`.
    async fn list_due_quests(&self, as_of: DateTime<Utc>) -> Result<Vec<Uuid>, EngineError>;

    /// Persists a new chapter draft.
    async fn create_chapter(&self, chapter: &Chapter) -> Result<(), EngineError>;

    /// Loads one chapter of a quest, if it exists.
    async fn load_chapter(
        &self,
        quest_id: Uuid,
        chapter_number: i32,
    ) -> Result<Option<Chapter>, EngineError>;

    /// All chapters of a quest ordered by chapter number.
    async fn list_chapters(&self, quest_id: Uuid) -> Result<Vec<Chapter>, EngineError>;

    /// Atomically records a successful publish: the chapter's one-time
    /// `posted_tweet_id` write and the quest pointer bump commit together.
    async fn commit_advancement(
        &self,
        quest: &Quest,
        chapter: &Chapter,
    ) -> Result<(), EngineError>;

    /// Appends a chapter vote.
    async fn record_vote(&self, vote: &ChapterVote) -> Result<(), EngineError>;

    /// All votes cast for a chapter, ordered by `voted_at`.
    async fn list_votes(&self, chapter_id: Uuid) -> Result<Vec<ChapterVote>, EngineError>;

    /// Upserts a quest-level continuation signal on `(quest_id, user_id)`.
    async fn record_quest_vote(&self, vote: &QuestVote) -> Result<(), EngineError>;

    /// Counts continuation signals matching `signal` for a quest.
    async fn count_quest_votes(&self, quest_id: Uuid, signal: &str) -> Result<i64, EngineError>;

    /// Appends an execution event from the duel mechanic.
    async fn record_execution(&self, execution: &Execution) -> Result<(), EngineError>;

    /// All executions recorded for a quest, oldest first.
    async fn list_executions(&self, quest_id: Uuid) -> Result<Vec<Execution>, EngineError>;

    /// Tries to take the quest's progression lease until `expires_at`.
    ///
    /// Succeeds when the lease is free, expired as of `now`, or already held
    /// by `owner` (re-entry after a crash). Returns `false` when another
    /// worker holds a live lease.
    async fn acquire_lease(
        &self,
        quest_id: Uuid,
        owner: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError>;

    /// Releases the lease if `owner` still holds it; otherwise a no-op.
    async fn release_lease(&self, quest_id: Uuid, owner: &str) -> Result<(), EngineError>;
}
