//! Deadline-driven scheduling.
//!
//! No in-memory timer is trusted across restarts: every tick re-derives the
//! set of pending deadlines from persisted `chapter_deadline` values, so a
//! freshly started worker picks up exactly where the previous one stopped.
//! Exactly-one-tally per deadline is the lease's job, not the loop's: two
//! workers may both see a due quest and race harmlessly.

use std::sync::Arc;
use std::time::Duration;

use questline_core::clock::Clock;
use questline_core::error::EngineError;
use questline_core::repository::QuestRepository;
use tokio::sync::watch;
use tracing::{debug, error, info, instrument};

use crate::orchestrator::{AdvanceOutcome, ProgressionOrchestrator};

/// Polls for due quests and drives them through the orchestrator.
pub struct Scheduler {
    repo: Arc<dyn QuestRepository>,
    orchestrator: Arc<ProgressionOrchestrator>,
    clock: Arc<dyn Clock>,
    tick_interval: Duration,
}

impl Scheduler {
    /// Creates a scheduler that scans every `tick_interval`.
    #[must_use]
    pub fn new(
        repo: Arc<dyn QuestRepository>,
        orchestrator: Arc<ProgressionOrchestrator>,
        clock: Arc<dyn Clock>,
        tick_interval: Duration,
    ) -> Self {
        Self {
            repo,
            orchestrator,
            clock,
            tick_interval,
        }
    }

    /// Runs the scan loop until `shutdown` flips to `true` or its sender is
    /// dropped.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        let mut ticker = tokio::time::interval(self.tick_interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    if let Err(err) = self.tick().await {
                        error!(error = %err, "deadline scan failed; retrying next tick");
                    }
                }
                changed = shutdown.changed() => {
                    if changed.is_err() || *shutdown.borrow() {
                        info!("scheduler shutting down");
                        return;
                    }
                }
            }
        }
    }

    /// Scans once for due quests and attempts to progress each of them.
    /// Failures are per-quest: one quest's error never blocks the others.
    ///
    /// Returns the number of quests that made a transition this tick.
    ///
    /// # Errors
    ///
    /// Returns a storage error only when the due-quest scan itself fails.
    #[instrument(skip(self))]
    pub async fn tick(&self) -> Result<usize, EngineError> {
        let due = self.repo.list_due_quests(self.clock.now()).await?;
        let mut progressed = 0;
        for quest_id in due {
            match self.orchestrator.advance(quest_id).await {
                Ok(AdvanceOutcome::Skipped(reason)) => {
                    debug!(%quest_id, ?reason, "skipped");
                }
                Ok(outcome) => {
                    progressed += 1;
                    info!(%quest_id, ?outcome, "quest progressed");
                }
                Err(err) => {
                    error!(%quest_id, error = %err, "progression failed; will retry next tick");
                }
            }
        }
        Ok(progressed)
    }
}
