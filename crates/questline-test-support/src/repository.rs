//! In-memory `QuestRepository` implementations for tests.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use questline_core::chapter::Chapter;
use questline_core::error::EngineError;
use questline_core::execution::Execution;
use questline_core::quest::Quest;
use questline_core::repository::QuestRepository;
use questline_core::vote::{ChapterVote, QuestVote};
use uuid::Uuid;

#[derive(Debug, Default)]
struct Store {
    quests: HashMap<Uuid, Quest>,
    chapters: Vec<Chapter>,
    votes: Vec<ChapterVote>,
    quest_votes: HashMap<(Uuid, String), QuestVote>,
    executions: Vec<Execution>,
    leases: HashMap<Uuid, (String, DateTime<Utc>)>,
}

/// A full in-memory repository with working lease semantics.
#[derive(Debug, Default)]
pub struct InMemoryQuestRepository {
    inner: Mutex<Store>,
}

impl InMemoryQuestRepository {
    /// Creates an empty repository.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Seeds the repository with a quest row.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert_quest(&self, quest: Quest) {
        self.inner.lock().unwrap().quests.insert(quest.id, quest);
    }

    /// Seeds the repository with a chapter row.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert_chapter(&self, chapter: Chapter) {
        self.inner.lock().unwrap().chapters.push(chapter);
    }

    /// Seeds the repository with a vote row.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn insert_vote(&self, vote: ChapterVote) {
        self.inner.lock().unwrap().votes.push(vote);
    }

    /// Current lease holder for a quest, if any.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn lease_owner(&self, quest_id: Uuid) -> Option<String> {
        self.inner
            .lock()
            .unwrap()
            .leases
            .get(&quest_id)
            .map(|(owner, _)| owner.clone())
    }
}

#[async_trait]
impl QuestRepository for InMemoryQuestRepository {
    async fn create_quest(&self, quest: &Quest) -> Result<(), EngineError> {
        let mut store = self.inner.lock().unwrap();
        if store.quests.contains_key(&quest.id) {
            return Err(EngineError::Storage(format!(
                "duplicate quest id {}",
                quest.id
            )));
        }
        store.quests.insert(quest.id, quest.clone());
        Ok(())
    }

    async fn load_quest(&self, quest_id: Uuid) -> Result<Quest, EngineError> {
        self.inner
            .lock()
            .unwrap()
            .quests
            .get(&quest_id)
            .cloned()
            .ok_or_else(|| EngineError::QuestNotFound(quest_id.to_string()))
    }

    async fn load_quest_by_short_id(&self, short_id: &str) -> Result<Quest, EngineError> {
        self.inner
            .lock()
            .unwrap()
            .quests
            .values()
            .find(|quest| quest.short_id == short_id)
            .cloned()
            .ok_or_else(|| EngineError::QuestNotFound(short_id.to_owned()))
    }

    async fn update_quest(&self, quest: &Quest) -> Result<(), EngineError> {
        let mut store = self.inner.lock().unwrap();
        if !store.quests.contains_key(&quest.id) {
            return Err(EngineError::QuestNotFound(quest.id.to_string()));
        }
        store.quests.insert(quest.id, quest.clone());
        Ok(())
    }

    async fn list_due_quests(&self, as_of: DateTime<Utc>) -> Result<Vec<Uuid>, EngineError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .quests
            .values()
            .filter(|quest| !quest.status.is_terminal())
            .filter(|quest| quest.chapter_deadline.is_some_and(|deadline| deadline <= as_of))
            .map(|quest| quest.id)
            .collect())
    }

    async fn create_chapter(&self, chapter: &Chapter) -> Result<(), EngineError> {
        let mut store = self.inner.lock().unwrap();
        let duplicate = store.chapters.iter().any(|existing| {
            existing.quest_id == chapter.quest_id
                && existing.chapter_number == chapter.chapter_number
        });
        if duplicate {
            return Err(EngineError::Storage(format!(
                "duplicate chapter {} for quest {}",
                chapter.chapter_number, chapter.quest_id
            )));
        }
        store.chapters.push(chapter.clone());
        Ok(())
    }

    async fn load_chapter(
        &self,
        quest_id: Uuid,
        chapter_number: i32,
    ) -> Result<Option<Chapter>, EngineError> {
        Ok(self
            .inner
            .lock()
            .unwrap()
            .chapters
            .iter()
            .find(|chapter| {
                chapter.quest_id == quest_id && chapter.chapter_number == chapter_number
            })
            .cloned())
    }

    async fn list_chapters(&self, quest_id: Uuid) -> Result<Vec<Chapter>, EngineError> {
        let mut chapters: Vec<Chapter> = self
            .inner
            .lock()
            .unwrap()
            .chapters
            .iter()
            .filter(|chapter| chapter.quest_id == quest_id)
            .cloned()
            .collect();
        chapters.sort_by_key(|chapter| chapter.chapter_number);
        Ok(chapters)
    }

    async fn commit_advancement(
        &self,
        quest: &Quest,
        chapter: &Chapter,
    ) -> Result<(), EngineError> {
        let mut guard = self.inner.lock().unwrap();
        let store = &mut *guard;
        let Some(stored) = store
            .chapters
            .iter_mut()
            .find(|existing| existing.id == chapter.id)
        else {
            return Err(EngineError::Storage(format!(
                "chapter {} not found during advancement",
                chapter.id
            )));
        };
        stored.posted_tweet_id = chapter.posted_tweet_id.clone();
        store.quests.insert(quest.id, quest.clone());
        Ok(())
    }

    async fn record_vote(&self, vote: &ChapterVote) -> Result<(), EngineError> {
        self.inner.lock().unwrap().votes.push(vote.clone());
        Ok(())
    }

    async fn list_votes(&self, chapter_id: Uuid) -> Result<Vec<ChapterVote>, EngineError> {
        let mut votes: Vec<ChapterVote> = self
            .inner
            .lock()
            .unwrap()
            .votes
            .iter()
            .filter(|vote| vote.chapter_id == chapter_id)
            .cloned()
            .collect();
        votes.sort_by_key(|vote| vote.voted_at);
        Ok(votes)
    }

    async fn record_quest_vote(&self, vote: &QuestVote) -> Result<(), EngineError> {
        self.inner
            .lock()
            .unwrap()
            .quest_votes
            .insert((vote.quest_id, vote.user_id.clone()), vote.clone());
        Ok(())
    }

    async fn count_quest_votes(&self, quest_id: Uuid, signal: &str) -> Result<i64, EngineError> {
        let count = self
            .inner
            .lock()
            .unwrap()
            .quest_votes
            .values()
            .filter(|vote| vote.quest_id == quest_id && vote.vote == signal)
            .count();
        Ok(i64::try_from(count).unwrap_or(i64::MAX))
    }

    async fn record_execution(&self, execution: &Execution) -> Result<(), EngineError> {
        self.inner.lock().unwrap().executions.push(execution.clone());
        Ok(())
    }

    async fn list_executions(&self, quest_id: Uuid) -> Result<Vec<Execution>, EngineError> {
        let mut executions: Vec<Execution> = self
            .inner
            .lock()
            .unwrap()
            .executions
            .iter()
            .filter(|execution| execution.quest_id == quest_id)
            .cloned()
            .collect();
        executions.sort_by_key(|execution| execution.created_at);
        Ok(executions)
    }

    async fn acquire_lease(
        &self,
        quest_id: Uuid,
        owner: &str,
        expires_at: DateTime<Utc>,
        now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        let mut store = self.inner.lock().unwrap();
        let blocked = store
            .leases
            .get(&quest_id)
            .is_some_and(|(holder, expiry)| holder != owner && *expiry > now);
        if blocked {
            return Ok(false);
        }
        store
            .leases
            .insert(quest_id, (owner.to_owned(), expires_at));
        Ok(true)
    }

    async fn release_lease(&self, quest_id: Uuid, owner: &str) -> Result<(), EngineError> {
        let mut store = self.inner.lock().unwrap();
        if store
            .leases
            .get(&quest_id)
            .is_some_and(|(holder, _)| holder == owner)
        {
            store.leases.remove(&quest_id);
        }
        Ok(())
    }
}

/// A repository that fails every call with a storage error. Useful for
/// exercising error-handling paths.
#[derive(Debug, Default)]
pub struct FailingQuestRepository;

#[async_trait]
impl QuestRepository for FailingQuestRepository {
    async fn create_quest(&self, _quest: &Quest) -> Result<(), EngineError> {
        Err(storage_error())
    }

    async fn load_quest(&self, _quest_id: Uuid) -> Result<Quest, EngineError> {
        Err(storage_error())
    }

    async fn load_quest_by_short_id(&self, _short_id: &str) -> Result<Quest, EngineError> {
        Err(storage_error())
    }

    async fn update_quest(&self, _quest: &Quest) -> Result<(), EngineError> {
        Err(storage_error())
    }

    async fn list_due_quests(&self, _as_of: DateTime<Utc>) -> Result<Vec<Uuid>, EngineError> {
        Err(storage_error())
    }

    async fn create_chapter(&self, _chapter: &Chapter) -> Result<(), EngineError> {
        Err(storage_error())
    }

    async fn load_chapter(
        &self,
        _quest_id: Uuid,
        _chapter_number: i32,
    ) -> Result<Option<Chapter>, EngineError> {
        Err(storage_error())
    }

    async fn list_chapters(&self, _quest_id: Uuid) -> Result<Vec<Chapter>, EngineError> {
        Err(storage_error())
    }

    async fn commit_advancement(
        &self,
        _quest: &Quest,
        _chapter: &Chapter,
    ) -> Result<(), EngineError> {
        Err(storage_error())
    }

    async fn record_vote(&self, _vote: &ChapterVote) -> Result<(), EngineError> {
        Err(storage_error())
    }

    async fn list_votes(&self, _chapter_id: Uuid) -> Result<Vec<ChapterVote>, EngineError> {
        Err(storage_error())
    }

    async fn record_quest_vote(&self, _vote: &QuestVote) -> Result<(), EngineError> {
        Err(storage_error())
    }

    async fn count_quest_votes(&self, _quest_id: Uuid, _signal: &str) -> Result<i64, EngineError> {
        Err(storage_error())
    }

    async fn record_execution(&self, _execution: &Execution) -> Result<(), EngineError> {
        Err(storage_error())
    }

    async fn list_executions(&self, _quest_id: Uuid) -> Result<Vec<Execution>, EngineError> {
        Err(storage_error())
    }

    async fn acquire_lease(
        &self,
        _quest_id: Uuid,
        _owner: &str,
        _expires_at: DateTime<Utc>,
        _now: DateTime<Utc>,
    ) -> Result<bool, EngineError> {
        Err(storage_error())
    }

    async fn release_lease(&self, _quest_id: Uuid, _owner: &str) -> Result<(), EngineError> {
        Err(storage_error())
    }
}

fn storage_error() -> EngineError {
    EngineError::Storage("connection refused".into())
}
