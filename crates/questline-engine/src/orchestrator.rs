//! Progression orchestration for one deadline firing.
//!
//! `advance` is the engine's only public mutator. It serializes per-quest
//! work behind the lease, re-reads a fresh snapshot under it, and applies
//! exactly one transition: publish the next chapter, complete, archive, or
//! hold. Everything it does is idempotent given persisted state, so a
//! crashed worker's step can be safely re-run by another worker.

use std::sync::Arc;

use questline_core::clock::Clock;
use questline_core::collaborators::{ChapterGenerator, SocialPoster};
use questline_core::config::EngineConfig;
use questline_core::error::EngineError;
use questline_core::quest::{Quest, QuestStatus};
use questline_core::repository::QuestRepository;
use questline_core::vote::STOP_SIGNAL;
use tracing::{debug, error, info, instrument, warn};
use uuid::Uuid;

use crate::machine::{self, ArchiveReason};
use crate::publisher::ChapterPublisher;
use crate::tally;

/// Why an `advance` call chose to do nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Another worker holds the quest's lease.
    LeaseHeld,
    /// The quest is already terminal.
    Terminal,
    /// No vote window is open (held or between chapters).
    NoOpenWindow,
    /// The deadline has not elapsed, typically because a concurrent run
    /// already advanced the quest.
    NotDue,
}

/// Result of one progression attempt.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AdvanceOutcome {
    /// A new chapter was published and a fresh vote window opened.
    Advanced {
        /// The newly published chapter number.
        chapter_number: i32,
    },
    /// The quest reached its ending.
    Completed {
        /// The final chapter number.
        chapter_number: i32,
    },
    /// The quest was archived.
    Archived {
        /// What triggered the archival.
        reason: ArchiveReason,
    },
    /// An external collaborator failed permanently; the quest is stalled
    /// awaiting operator intervention.
    Held {
        /// The failure that caused the hold.
        reason: String,
    },
    /// Nothing to do this cycle.
    Skipped(SkipReason),
}

/// Drives one quest through one deadline firing.
pub struct ProgressionOrchestrator {
    repo: Arc<dyn QuestRepository>,
    publisher: ChapterPublisher,
    clock: Arc<dyn Clock>,
    config: EngineConfig,
    worker_id: String,
}

impl ProgressionOrchestrator {
    /// Creates an orchestrator with a unique worker identity for leasing.
    #[must_use]
    pub fn new(
        repo: Arc<dyn QuestRepository>,
        generator: Arc<dyn ChapterGenerator>,
        poster: Arc<dyn SocialPoster>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        let publisher = ChapterPublisher::new(
            repo.clone(),
            generator,
            poster,
            clock.clone(),
            config.clone(),
        );
        Self {
            repo,
            publisher,
            clock,
            config,
            worker_id: format!("worker-{}", Uuid::new_v4()),
        }
    }

    /// Overrides the worker identity (used in tests).
    #[must_use]
    pub fn with_worker_id(mut self, worker_id: impl Into<String>) -> Self {
        self.worker_id = worker_id.into();
        self
    }

    /// Attempts to progress a quest past its elapsed deadline.
    ///
    /// Safe to call concurrently for the same quest: exactly one caller
    /// performs the tally/publish, the rest observe a skip. Terminal quests
    /// and unexpired deadlines are no-ops, not errors.
    ///
    /// # Errors
    ///
    /// Returns storage errors; collaborator failures are absorbed into the
    /// `Held` outcome.
    #[instrument(skip(self), fields(worker_id = %self.worker_id))]
    pub async fn advance(&self, quest_id: Uuid) -> Result<AdvanceOutcome, EngineError> {
        let now = self.clock.now();
        let expires_at = now + self.config.lease_ttl;
        if !self
            .repo
            .acquire_lease(quest_id, &self.worker_id, expires_at, now)
            .await?
        {
            debug!(%quest_id, "lease held elsewhere, skipping cycle");
            return Ok(AdvanceOutcome::Skipped(SkipReason::LeaseHeld));
        }

        let outcome = self.advance_under_lease(quest_id).await;

        if let Err(release_err) = self.repo.release_lease(quest_id, &self.worker_id).await {
            error!(%quest_id, error = %release_err, "lease release failed; will expire");
        }
        outcome
    }

    async fn advance_under_lease(&self, quest_id: Uuid) -> Result<AdvanceOutcome, EngineError> {
        // Fresh read under the lease; never trust a pre-lease snapshot.
        let mut quest = self.repo.load_quest(quest_id).await?;
        if quest.status.is_terminal() {
            return Ok(AdvanceOutcome::Skipped(SkipReason::Terminal));
        }
        let now = self.clock.now();
        let Some(deadline) = quest.chapter_deadline else {
            return Ok(AdvanceOutcome::Skipped(SkipReason::NoOpenWindow));
        };
        if now < deadline {
            return Ok(AdvanceOutcome::Skipped(SkipReason::NotDue));
        }

        // Community abandonment check precedes the tally: stop signals end
        // the quest regardless of this chapter's ballots.
        let stop_votes = self.repo.count_quest_votes(quest.id, STOP_SIGNAL).await?;
        if stop_votes >= self.config.abandonment_threshold {
            let reason = ArchiveReason::Abandoned { stop_votes };
            machine::archive(&mut quest, &reason, now);
            self.repo.update_quest(&quest).await?;
            info!(short_id = %quest.short_id, stop_votes, "quest archived by community signal");
            return Ok(AdvanceOutcome::Archived { reason });
        }

        let chapter = self
            .repo
            .load_chapter(quest.id, quest.current_chapter)
            .await?
            .ok_or(EngineError::ChapterNotFound {
                quest_id: quest.id,
                chapter_number: quest.current_chapter,
            })?;

        let votes = self.repo.list_votes(chapter.id).await?;
        let ballots = tally::apply_vote_policy(self.config.vote_policy, votes);
        let result = tally::tally(&chapter.options, &ballots, self.config.default_option)?;

        if result.participation == 0 {
            let rounds = machine::record_idle_round(&mut quest);
            if rounds >= self.config.max_idle_rounds {
                let reason = ArchiveReason::Idle { rounds };
                machine::archive(&mut quest, &reason, now);
                self.repo.update_quest(&quest).await?;
                info!(short_id = %quest.short_id, rounds, "quest archived after idle rounds");
                return Ok(AdvanceOutcome::Archived { reason });
            }
            info!(short_id = %quest.short_id, rounds, "zero participation, advancing by default option");
        } else {
            machine::clear_idle_rounds(&mut quest);
        }

        match self.publisher.publish(&mut quest, &result).await {
            Ok(published) => Ok(Self::published_outcome(&quest, published.chapter_number)),
            Err(err @ (EngineError::ExternalTransient(_) | EngineError::ExternalPermanent(_))) => {
                let reason = err.to_string();
                machine::hold(&mut quest, &reason, now);
                self.repo.update_quest(&quest).await?;
                warn!(short_id = %quest.short_id, error = %err, "quest held pending operator review");
                Ok(AdvanceOutcome::Held { reason })
            }
            Err(err) => Err(err),
        }
    }

    fn published_outcome(quest: &Quest, chapter_number: i32) -> AdvanceOutcome {
        if quest.status == QuestStatus::Completed {
            AdvanceOutcome::Completed { chapter_number }
        } else {
            AdvanceOutcome::Advanced { chapter_number }
        }
    }
}
