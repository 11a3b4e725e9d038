//! Idempotent chapter publishing.
//!
//! Turning a tally result into a new chapter involves two external effects
//! (content generation and the social post) that must happen at most once
//! per chapter. The draft row is persisted before any post attempt and the
//! post is gated on the persisted `posted_tweet_id`, so a crashed or retried
//! publish never regenerates content or double-posts.

use std::sync::Arc;

use questline_core::chapter::Chapter;
use questline_core::clock::Clock;
use questline_core::collaborators::{ChapterGenerator, GeneratedChapter, SocialPoster};
use questline_core::config::EngineConfig;
use questline_core::error::EngineError;
use questline_core::quest::Quest;
use questline_core::repository::QuestRepository;
use tracing::{info, instrument};

use crate::machine::{self, TimelineEntry};
use crate::retry::retry_with_backoff;
use crate::tally::TallyResult;

/// Publishes chapters: generates content, posts it, and commits the quest
/// pointer bump, all recoverable mid-way.
pub struct ChapterPublisher {
    repo: Arc<dyn QuestRepository>,
    generator: Arc<dyn ChapterGenerator>,
    poster: Arc<dyn SocialPoster>,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
}

impl ChapterPublisher {
    /// Creates a publisher over the given storage and collaborators.
    #[must_use]
    pub fn new(
        repo: Arc<dyn QuestRepository>,
        generator: Arc<dyn ChapterGenerator>,
        poster: Arc<dyn SocialPoster>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            generator,
            poster,
            clock,
            config,
        }
    }

    /// Publishes the chapter that follows the tallied winning option.
    ///
    /// Reuses an existing draft for the target chapter number if one is
    /// already persisted (recovery after a partial failure); content is
    /// never regenerated.
    ///
    /// # Errors
    ///
    /// Propagates storage errors and exhausted/permanent collaborator
    /// failures. The caller decides whether to hold the quest.
    #[instrument(skip(self, quest, tally), fields(quest_id = %quest.id, target = quest.current_chapter + 1))]
    pub async fn publish(
        &self,
        quest: &mut Quest,
        tally: &TallyResult,
    ) -> Result<Chapter, EngineError> {
        let target = quest.current_chapter + 1;
        let mut chapter = match self.repo.load_chapter(quest.id, target).await? {
            Some(existing) => {
                info!(chapter_number = target, "reusing persisted draft");
                existing
            }
            None => {
                let history = self.repo.list_chapters(quest.id).await?;
                let snapshot: &Quest = quest;
                let generated = retry_with_backoff(&self.config.retry, "generate", || {
                    self.generator
                        .generate(snapshot, &history, tally.winning_option)
                })
                .await?;
                let draft = Chapter::draft(quest.id, target, generated, self.clock.now());
                self.repo.create_chapter(&draft).await?;
                draft
            }
        };

        self.ensure_posted(&mut chapter).await?;
        self.finish(
            quest,
            &chapter,
            Some(tally.winning_option),
            tally.vote_counts.clone(),
            tally.participation,
        )
        .await?;
        Ok(chapter)
    }

    /// Publishes a quest's seed chapter (chapter 0) from pre-authored
    /// content, with the same idempotence guarantees as `publish`.
    ///
    /// # Errors
    ///
    /// Propagates storage errors and exhausted/permanent posting failures.
    #[instrument(skip(self, quest, generated), fields(quest_id = %quest.id))]
    pub async fn publish_seed(
        &self,
        quest: &mut Quest,
        generated: GeneratedChapter,
    ) -> Result<Chapter, EngineError> {
        let mut chapter = match self.repo.load_chapter(quest.id, 0).await? {
            Some(existing) => existing,
            None => {
                let draft = Chapter::draft(quest.id, 0, generated, self.clock.now());
                self.repo.create_chapter(&draft).await?;
                draft
            }
        };

        self.ensure_posted(&mut chapter).await?;
        self.finish(quest, &chapter, None, vec![], 0).await?;
        Ok(chapter)
    }

    /// Posts the chapter if its persisted `posted_tweet_id` is still unset.
    async fn ensure_posted(&self, chapter: &mut Chapter) -> Result<(), EngineError> {
        if chapter.posted_tweet_id.is_some() {
            info!(chapter_number = chapter.chapter_number, "already posted, skipping");
            return Ok(());
        }
        let remote_id = retry_with_backoff(&self.config.retry, "post", || {
            self.poster.post(&chapter.content)
        })
        .await?;
        info!(chapter_number = chapter.chapter_number, %remote_id, "posted chapter");
        chapter.posted_tweet_id = Some(remote_id);
        Ok(())
    }

    /// Applies the state-machine transition for the published chapter and
    /// commits it together with the chapter's posted id.
    async fn finish(
        &self,
        quest: &mut Quest,
        chapter: &Chapter,
        winning_option: Option<usize>,
        vote_counts: Vec<u32>,
        participation: usize,
    ) -> Result<(), EngineError> {
        let now = self.clock.now();
        machine::append_timeline_entry(
            quest,
            &TimelineEntry {
                chapter_number: chapter.chapter_number,
                posted_tweet_id: chapter.posted_tweet_id.clone().unwrap_or_default(),
                winning_option,
                vote_counts,
                participation,
                occurred_at: now,
            },
        );
        if chapter.is_final || chapter.chapter_number >= self.config.max_chapters {
            machine::complete(quest, chapter, now);
        } else {
            machine::begin_voting_window(quest, chapter, now, self.config.voting_window);
        }
        self.repo.commit_advancement(quest, chapter).await
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{TimeZone, Utc};
    use questline_core::config::RetryConfig;
    use questline_core::quest::QuestStatus;
    use questline_test_support::{
        FixedClock, FlakyPoster, InMemoryQuestRepository, ScriptedGenerator, generated_chapter,
    };
    use std::time::Duration as StdDuration;
    use uuid::Uuid;

    fn test_config() -> EngineConfig {
        EngineConfig {
            retry: RetryConfig {
                max_retries: 3,
                initial_delay: StdDuration::ZERO,
                max_delay: StdDuration::ZERO,
                backoff_multiplier: 2.0,
            },
            ..EngineConfig::default()
        }
    }

    fn fixed_now() -> chrono::DateTime<Utc> {
        Utc.with_ymd_and_hms(2026, 3, 1, 12, 0, 0).unwrap()
    }

    struct Fixture {
        repo: Arc<InMemoryQuestRepository>,
        generator: Arc<ScriptedGenerator>,
        poster: Arc<FlakyPoster>,
        publisher: ChapterPublisher,
    }

    fn fixture(
        generator: ScriptedGenerator,
        poster: FlakyPoster,
        config: EngineConfig,
    ) -> Fixture {
        let repo = Arc::new(InMemoryQuestRepository::new());
        let generator = Arc::new(generator);
        let poster = Arc::new(poster);
        let publisher = ChapterPublisher::new(
            repo.clone(),
            generator.clone(),
            poster.clone(),
            Arc::new(FixedClock(fixed_now())),
            config,
        );
        Fixture {
            repo,
            generator,
            poster,
            publisher,
        }
    }

    /// Quest at chapter 0 with its seed chapter already posted.
    fn seeded_quest(fx: &Fixture) -> Quest {
        let quest = Quest::new(Uuid::new_v4(), "q-1", fixed_now());
        fx.repo.insert_quest(quest.clone());
        let mut seed = Chapter::draft(quest.id, 0, generated_chapter("it begins"), fixed_now());
        seed.posted_tweet_id = Some("tweet-0".to_owned());
        fx.repo.insert_chapter(seed);
        quest
    }

    fn winning(option: usize) -> TallyResult {
        TallyResult {
            winning_option: option,
            vote_counts: vec![2, 1],
            participation: 3,
        }
    }

    #[tokio::test]
    async fn test_publish_creates_posts_and_advances() {
        let fx = fixture(
            ScriptedGenerator::new(vec![Ok(generated_chapter("chapter one"))]),
            FlakyPoster::new(),
            test_config(),
        );
        let mut quest = seeded_quest(&fx);

        let chapter = fx.publisher.publish(&mut quest, &winning(0)).await.unwrap();

        assert_eq!(chapter.chapter_number, 1);
        assert_eq!(quest.current_chapter, 1);
        assert_eq!(quest.status, QuestStatus::Active);
        assert!(quest.chapter_deadline.is_some());
        assert_eq!(
            quest.last_posted_tweet_id,
            chapter.posted_tweet_id
        );
        assert_eq!(fx.poster.posts(), vec!["chapter one".to_owned()]);

        // The committed rows match the in-memory view.
        let stored = fx.repo.load_chapter(quest.id, 1).await.unwrap().unwrap();
        assert_eq!(stored.posted_tweet_id, chapter.posted_tweet_id);
        let stored_quest = fx.repo.load_quest(quest.id).await.unwrap();
        assert_eq!(stored_quest.current_chapter, 1);
    }

    #[tokio::test]
    async fn test_publish_appends_timeline_entry() {
        let fx = fixture(
            ScriptedGenerator::new(vec![Ok(generated_chapter("chapter one"))]),
            FlakyPoster::new(),
            test_config(),
        );
        let mut quest = seeded_quest(&fx);

        fx.publisher.publish(&mut quest, &winning(1)).await.unwrap();

        let timeline = quest.timeline_data.as_array().unwrap();
        assert_eq!(timeline.len(), 1);
        assert_eq!(timeline[0]["chapter_number"], 1);
        assert_eq!(timeline[0]["winning_option"], 1);
        assert_eq!(timeline[0]["participation"], 3);
    }

    #[tokio::test]
    async fn test_publish_reuses_persisted_draft_without_regenerating() {
        let fx = fixture(
            ScriptedGenerator::new(vec![]),
            FlakyPoster::new(),
            test_config(),
        );
        let mut quest = seeded_quest(&fx);
        // A draft for chapter 1 survived a crash before its post went out.
        fx.repo.insert_chapter(Chapter::draft(
            quest.id,
            1,
            generated_chapter("recovered draft"),
            fixed_now(),
        ));

        let chapter = fx.publisher.publish(&mut quest, &winning(0)).await.unwrap();

        assert_eq!(fx.generator.calls(), 0);
        assert_eq!(chapter.content, "recovered draft");
        assert_eq!(fx.poster.calls(), 1);
        assert_eq!(quest.current_chapter, 1);
    }

    #[tokio::test]
    async fn test_publish_skips_posting_when_already_posted() {
        let fx = fixture(
            ScriptedGenerator::new(vec![]),
            FlakyPoster::new(),
            test_config(),
        );
        let mut quest = seeded_quest(&fx);
        let mut recovered = Chapter::draft(
            quest.id,
            1,
            generated_chapter("posted before crash"),
            fixed_now(),
        );
        recovered.posted_tweet_id = Some("tweet-already".to_owned());
        fx.repo.insert_chapter(recovered);

        let chapter = fx.publisher.publish(&mut quest, &winning(0)).await.unwrap();

        assert_eq!(fx.generator.calls(), 0);
        assert_eq!(fx.poster.calls(), 0);
        assert_eq!(chapter.posted_tweet_id.as_deref(), Some("tweet-already"));
        assert_eq!(quest.last_posted_tweet_id.as_deref(), Some("tweet-already"));
    }

    #[tokio::test]
    async fn test_flaky_post_retries_without_regenerating() {
        let fx = fixture(
            ScriptedGenerator::new(vec![Ok(generated_chapter("one-shot content"))]),
            FlakyPoster::failing_times(2),
            test_config(),
        );
        let mut quest = seeded_quest(&fx);

        fx.publisher.publish(&mut quest, &winning(0)).await.unwrap();

        // Exactly one generation, exactly one successful post after two
        // transient failures, exactly one chapter row.
        assert_eq!(fx.generator.calls(), 1);
        assert_eq!(fx.poster.calls(), 3);
        assert_eq!(fx.poster.posts().len(), 1);
        assert_eq!(fx.repo.list_chapters(quest.id).await.unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_republish_after_simulated_crash_is_idempotent() {
        let fx = fixture(
            ScriptedGenerator::new(vec![Ok(generated_chapter("chapter one"))]),
            FlakyPoster::new(),
            test_config(),
        );
        let mut quest = seeded_quest(&fx);
        let pre_crash = quest.clone();

        let first = fx.publisher.publish(&mut quest, &winning(0)).await.unwrap();

        // The quest-row update was lost in a crash; a new worker re-runs the
        // step from the stale snapshot.
        let mut replay = pre_crash;
        let second = fx.publisher.publish(&mut replay, &winning(0)).await.unwrap();

        assert_eq!(first.id, second.id);
        assert_eq!(first.posted_tweet_id, second.posted_tweet_id);
        assert_eq!(fx.generator.calls(), 1);
        assert_eq!(fx.poster.calls(), 1);
        assert_eq!(replay.current_chapter, 1);
    }

    #[tokio::test]
    async fn test_exhausted_generation_leaves_no_chapter_and_no_post() {
        let fx = fixture(
            ScriptedGenerator::new(vec![
                Err(EngineError::ExternalTransient("timeout".into())),
                Err(EngineError::ExternalTransient("timeout".into())),
                Err(EngineError::ExternalTransient("timeout".into())),
                Err(EngineError::ExternalTransient("timeout".into())),
            ]),
            FlakyPoster::new(),
            test_config(),
        );
        let mut quest = seeded_quest(&fx);

        let result = fx.publisher.publish(&mut quest, &winning(0)).await;

        assert!(matches!(result, Err(EngineError::ExternalTransient(_))));
        assert!(fx.repo.load_chapter(quest.id, 1).await.unwrap().is_none());
        assert_eq!(fx.poster.calls(), 0);
    }

    #[tokio::test]
    async fn test_terminal_chapter_completes_quest() {
        let mut terminal = generated_chapter("the end");
        terminal.is_final = true;
        let fx = fixture(
            ScriptedGenerator::new(vec![Ok(terminal)]),
            FlakyPoster::new(),
            test_config(),
        );
        let mut quest = seeded_quest(&fx);

        fx.publisher.publish(&mut quest, &winning(0)).await.unwrap();

        assert_eq!(quest.status, QuestStatus::Completed);
        assert!(quest.chapter_deadline.is_none());
    }

    #[tokio::test]
    async fn test_chapter_cap_completes_quest() {
        let config = EngineConfig {
            max_chapters: 1,
            ..test_config()
        };
        let fx = fixture(
            ScriptedGenerator::new(vec![Ok(generated_chapter("capped"))]),
            FlakyPoster::new(),
            config,
        );
        let mut quest = seeded_quest(&fx);

        fx.publisher.publish(&mut quest, &winning(0)).await.unwrap();

        assert_eq!(quest.status, QuestStatus::Completed);
        assert!(quest.chapter_deadline.is_none());
    }

    #[tokio::test]
    async fn test_publish_seed_posts_chapter_zero_and_opens_window() {
        let fx = fixture(
            ScriptedGenerator::new(vec![]),
            FlakyPoster::new(),
            test_config(),
        );
        let mut quest = Quest::new(Uuid::new_v4(), "q-new", fixed_now());
        fx.repo.insert_quest(quest.clone());

        let chapter = fx
            .publisher
            .publish_seed(&mut quest, generated_chapter("it begins"))
            .await
            .unwrap();

        assert_eq!(chapter.chapter_number, 0);
        assert_eq!(quest.current_chapter, 0);
        assert!(quest.chapter_deadline.is_some());
        assert_eq!(fx.poster.posts(), vec!["it begins".to_owned()]);
        let timeline = quest.timeline_data.as_array().unwrap();
        assert!(timeline[0]["winning_option"].is_null());
    }
}
