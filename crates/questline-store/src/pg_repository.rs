//! PostgreSQL implementation of `QuestRepository`.
//!
//! The lease is a row-level `owner + expiry` pair on the quest row: a single
//! conditional UPDATE either takes the slot or leaves it untouched, which is
//! all the mutual exclusion the orchestrator needs.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use sqlx::postgres::PgRow;
use sqlx::types::Json;
use sqlx::{PgPool, Row};
use uuid::Uuid;

use questline_core::chapter::Chapter;
use questline_core::error::EngineError;
use questline_core::execution::Execution;
use questline_core::quest::{Quest, QuestStatus};
use questline_core::repository::QuestRepository;
use questline_core::vote::{ChapterVote, QuestVote, VoteInterpretation};

/// PostgreSQL-backed quest repository.
#[derive(Debug, Clone)]
pub struct PgQuestRepository {
    pool: PgPool,
}

impl PgQuestRepository {
    /// Creates a new repository over the given pool.
    #[must_use]
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn storage(err: sqlx::Error) -> EngineError {
    EngineError::Storage(err.to_string())
}

fn encode_json<T: serde::Serialize>(value: &T) -> Result<serde_json::Value, EngineError> {
    serde_json::to_value(value).map_err(|err| EngineError::Storage(err.to_string()))
}

fn quest_from_row(row: &PgRow) -> Result<Quest, EngineError> {
    let status_text: String = row.try_get("status").map_err(storage)?;
    let status = QuestStatus::parse(&status_text)
        .ok_or_else(|| EngineError::Storage(format!("unknown quest status: {status_text}")))?;
    Ok(Quest {
        id: row.try_get("id").map_err(storage)?,
        short_id: row.try_get("short_id").map_err(storage)?,
        status,
        current_chapter: row.try_get("current_chapter").map_err(storage)?,
        chapter_deadline: row.try_get("chapter_deadline").map_err(storage)?,
        last_posted_tweet_id: row.try_get("last_posted_tweet_id").map_err(storage)?,
        current_state: row.try_get("current_state").map_err(storage)?,
        timeline_data: row.try_get("timeline_data").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
        updated_at: row.try_get("updated_at").map_err(storage)?,
    })
}

fn chapter_from_row(row: &PgRow) -> Result<Chapter, EngineError> {
    let Json(options): Json<Vec<String>> = row.try_get("options").map_err(storage)?;
    let Json(sources): Json<Vec<String>> = row.try_get("sources").map_err(storage)?;
    Ok(Chapter {
        id: row.try_get("id").map_err(storage)?,
        quest_id: row.try_get("quest_id").map_err(storage)?,
        chapter_number: row.try_get("chapter_number").map_err(storage)?,
        content: row.try_get("content").map_err(storage)?,
        options,
        sources,
        is_final: row.try_get("is_final").map_err(storage)?,
        posted_tweet_id: row.try_get("posted_tweet_id").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
    })
}

fn vote_from_row(row: &PgRow) -> Result<ChapterVote, EngineError> {
    let Json(interpretation): Json<VoteInterpretation> =
        row.try_get("interpretation").map_err(storage)?;
    Ok(ChapterVote {
        id: row.try_get("id").map_err(storage)?,
        chapter_id: row.try_get("chapter_id").map_err(storage)?,
        quest_id: row.try_get("quest_id").map_err(storage)?,
        user_id: row.try_get("user_id").map_err(storage)?,
        selected_option: row.try_get("selected_option").map_err(storage)?,
        reply_text: row.try_get("reply_text").map_err(storage)?,
        interpretation,
        voted_at: row.try_get("voted_at").map_err(storage)?,
    })
}

fn execution_from_row(row: &PgRow) -> Result<Execution, EngineError> {
    Ok(Execution {
        id: row.try_get("id").map_err(storage)?,
        quest_id: row.try_get("quest_id").map_err(storage)?,
        user_id: row.try_get("user_id").map_err(storage)?,
        side: row.try_get("side").map_err(storage)?,
        roast_text: row.try_get("roast_text").map_err(storage)?,
        tombstone_url: row.try_get("tombstone_url").map_err(storage)?,
        created_at: row.try_get("created_at").map_err(storage)?,
    })
}

#[async_trait]
impl QuestRepository for PgQuestRepository {
    async fn create_quest(&self, quest: &Quest) -> Result<(), EngineError> {
        sqlx::query(
            r"
            INSERT INTO quests (id, short_id, status, current_chapter, chapter_deadline,
                                last_posted_tweet_id, current_state, timeline_data,
                                created_at, updated_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10)
            ",
        )
        .bind(quest.id)
        .bind(&quest.short_id)
        .bind(quest.status.as_str())
        .bind(quest.current_chapter)
        .bind(quest.chapter_deadline)
        .bind(&quest.last_posted_tweet_id)
        .bind(&quest.current_state)
        .bind(&quest.timeline_data)
        .bind(quest.created_at)
        .bind(quest.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn load_quest(&self, quest_id: Uuid) -> Result<Quest, EngineError> {
        let row = sqlx::query("SELECT * FROM quests WHERE id = $1")
            .bind(quest_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .ok_or_else(|| EngineError::QuestNotFound(quest_id.to_string()))?;
        quest_from_row(&row)
    }

    async fn load_quest_by_short_id(&self, short_id: &str) -> Result<Quest, EngineError> {
        let row = sqlx::query("SELECT * FROM quests WHERE short_id = $1")
            .bind(short_id)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?
            .ok_or_else(|| EngineError::QuestNotFound(short_id.to_owned()))?;
        quest_from_row(&row)
    }

    async fn update_quest(&self, quest: &Quest) -> Result<(), EngineError> {
        let result = sqlx::query(
            r"
            UPDATE quests
            SET status = $2, current_chapter = $3, chapter_deadline = $4,
                last_posted_tweet_id = $5, current_state = $6, timeline_data = $7,
                updated_at = $8
            WHERE id = $1
            ",
        )
        .bind(quest.id)
        .bind(quest.status.as_str())
        .bind(quest.current_chapter)
        .bind(quest.chapter_deadline)
        .bind(&quest.last_posted_tweet_id)
        .bind(&quest.current_state)
        .bind(&quest.timeline_data)
        .bind(quest.updated_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        if result.rows_affected() == 0 {
            return Err(EngineError::QuestNotFound(quest.id.to_string()));
        }
        Ok(())
    }

    async fn list_due_quests(&self, as_of: DateTime<Utc>) -> Result<Vec<Uuid>, EngineError> {
        let rows = sqlx::query(
            r"
            SELECT id FROM quests
            WHERE status = 'ACTIVE'
              AND chapter_deadline IS NOT NULL
              AND chapter_deadline <= $1
            ORDER BY chapter_deadline
            ",
        )
        .bind(as_of)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.iter()
            .map(|row| row.try_get("id").map_err(storage))
            .collect()
    }

    async fn create_chapter(&self, chapter: &Chapter) -> Result<(), EngineError> {
        sqlx::query(
            r"
            INSERT INTO chapters (id, quest_id, chapter_number, content, options,
                                  sources, is_final, posted_tweet_id, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            ",
        )
        .bind(chapter.id)
        .bind(chapter.quest_id)
        .bind(chapter.chapter_number)
        .bind(&chapter.content)
        .bind(encode_json(&chapter.options)?)
        .bind(encode_json(&chapter.sources)?)
        .bind(chapter.is_final)
        .bind(&chapter.posted_tweet_id)
        .bind(chapter.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn load_chapter(
        &self,
        quest_id: Uuid,
        chapter_number: i32,
    ) -> Result<Option<Chapter>, EngineError> {
        let row = sqlx::query("SELECT * FROM chapters WHERE quest_id = $1 AND chapter_number = $2")
            .bind(quest_id)
            .bind(chapter_number)
            .fetch_optional(&self.pool)
            .await
            .map_err(storage)?;
        row.as_ref().map(chapter_from_row).transpose()
    }

    async fn list_chapters(&self, quest_id: Uuid) -> Result<Vec<Chapter>, EngineError> {
        let rows = sqlx::query(
            "SELECT * FROM chapters WHERE quest_id = $1 ORDER BY chapter_number",
        )
        .bind(quest_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.iter().map(chapter_from_row).collect()
    }

    async fn commit_advancement(
        &self,
        quest: &Quest,
        chapter: &Chapter,
    ) -> Result<(), EngineError> {
        let mut tx = self.pool.begin().await.map_err(storage)?;
        sqlx::query("UPDATE chapters SET posted_tweet_id = $2 WHERE id = $1")
            .bind(chapter.id)
            .bind(&chapter.posted_tweet_id)
            .execute(&mut *tx)
            .await
            .map_err(storage)?;
        sqlx::query(
            r"
            UPDATE quests
            SET status = $2, current_chapter = $3, chapter_deadline = $4,
                last_posted_tweet_id = $5, current_state = $6, timeline_data = $7,
                updated_at = $8
            WHERE id = $1
            ",
        )
        .bind(quest.id)
        .bind(quest.status.as_str())
        .bind(quest.current_chapter)
        .bind(quest.chapter_deadline)
        .bind(&quest.last_posted_tweet_id)
        .bind(&quest.current_state)
        .bind(&quest.timeline_data)
        .bind(quest.updated_at)
        .execute(&mut *tx)
        .await
        .map_err(storage)?;
        tx.commit().await.map_err(storage)
    }

    async fn record_vote(&self, vote: &ChapterVote) -> Result<(), EngineError> {
        sqlx::query(
            r"
            INSERT INTO chapter_votes (id, chapter_id, quest_id, user_id, selected_option,
                                       reply_text, interpretation, voted_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8)
            ",
        )
        .bind(vote.id)
        .bind(vote.chapter_id)
        .bind(vote.quest_id)
        .bind(&vote.user_id)
        .bind(vote.selected_option)
        .bind(&vote.reply_text)
        .bind(encode_json(&vote.interpretation)?)
        .bind(vote.voted_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn list_votes(&self, chapter_id: Uuid) -> Result<Vec<ChapterVote>, EngineError> {
        let rows = sqlx::query(
            "SELECT * FROM chapter_votes WHERE chapter_id = $1 ORDER BY voted_at, id",
        )
        .bind(chapter_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.iter().map(vote_from_row).collect()
    }

    async fn record_quest_vote(&self, vote: &QuestVote) -> Result<(), EngineError> {
        sqlx::query(
            r"
            INSERT INTO quest_votes (quest_id, user_id, vote, voted_at)
            VALUES ($1, $2, $3, $4)
            ON CONFLICT (quest_id, user_id)
            DO UPDATE SET vote = EXCLUDED.vote, voted_at = EXCLUDED.voted_at
            ",
        )
        .bind(vote.quest_id)
        .bind(&vote.user_id)
        .bind(&vote.vote)
        .bind(vote.voted_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn count_quest_votes(&self, quest_id: Uuid, signal: &str) -> Result<i64, EngineError> {
        let row = sqlx::query(
            "SELECT COUNT(*) AS stop_count FROM quest_votes WHERE quest_id = $1 AND vote = $2",
        )
        .bind(quest_id)
        .bind(signal)
        .fetch_one(&self.pool)
        .await
        .map_err(storage)?;
        row.try_get("stop_count").map_err(storage)
    }

    async fn record_execution(&self, execution: &Execution) -> Result<(), EngineError> {
        sqlx::query(
            r"
            INSERT INTO executions (id, quest_id, user_id, side, roast_text,
                                    tombstone_url, created_at)
            VALUES ($1, $2, $3, $4, $5, $6, $7)
            ",
        )
        .bind(execution.id)
        .bind(execution.quest_id)
        .bind(&execution.user_id)
        .bind(&execution.side)
        .bind(&execution.roast_text)
        .bind(&execution.tombstone_url)
        .bind(execution.created_at)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }

    async fn list_executions(&self, quest_id: Uuid) -> Result<Vec<Execution>, EngineError> {
        let rows = sqlx::query(
            "SELECT * FROM executions WHERE quest_id = $1 ORDER BY created_at, id",
        )
        .bind(quest_id)
        .fetch_all(&self.pool)
        .await
        .map_err(storage)?;
        rows.iter().map(execution_from_row).collect()
    }

    async fn acquire_lease(
        &self,
        quest_id: Uuid,
        owner: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let result = sqlx::query(
            r"
            UPDATE quests
            SET lease_owner = $2, lease_expires_at = $3
            WHERE id = $1
              AND (lease_owner IS NULL
                   OR lease_owner = $2
                   OR lease_expires_at IS NULL
                   OR lease_expires_at <= $4)
            ",
        )
        .bind(quest_id)
        .bind(owner)
        .bind(expires_at)
        .bind(now)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(result.rows_affected() == 1)
    }

    async fn release_lease(&self, quest_id: Uuid, owner: &str) -> Result<(), EngineError> {
        sqlx::query(
            r"
            UPDATE quests
            SET lease_owner = NULL, lease_expires_at = NULL
            WHERE id = $1 AND lease_owner = $2
            ",
        )
        .bind(quest_id)
        .bind(owner)
        .execute(&self.pool)
        .await
        .map_err(storage)?;
        Ok(())
    }
}
