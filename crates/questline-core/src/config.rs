//! Engine configuration.
//!
//! Voting-window duration, abandonment thresholds, and retry budgets are
//! deployment concerns, so they are carried here rather than hard-coded in
//! the state machine.

use std::time::Duration as StdDuration;

use chrono::Duration;

/// How repeat votes from the same user are counted.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VotePolicy {
    /// Every valid vote is an independent ballot.
    #[default]
    AllBallots,
    /// A user's latest vote supersedes their earlier ones.
    LastPerUser,
}

impl VotePolicy {
    /// Parses a policy name as used in configuration.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "all-ballots" => Some(Self::AllBallots),
            "last-per-user" => Some(Self::LastPerUser),
            _ => None,
        }
    }
}

/// Exponential backoff budget for external collaborator calls.
#[derive(Debug, Clone, Copy)]
pub struct RetryConfig {
    /// Maximum number of retries (not counting the initial attempt).
    pub max_retries: u32,
    /// Delay before the first retry.
    pub initial_delay: StdDuration,
    /// Cap for exponential growth.
    pub max_delay: StdDuration,
    /// Multiplier applied per attempt, typically 2.0.
    pub backoff_multiplier: f64,
}

impl RetryConfig {
    /// Computes the delay for the given retry attempt (0-indexed), growing
    /// exponentially and capped at `max_delay`.
    #[must_use]
    pub fn delay_for_attempt(&self, attempt: u32) -> StdDuration {
        let exponent = i32::try_from(attempt).unwrap_or(i32::MAX);
        let delay_secs = self.initial_delay.as_secs_f64() * self.backoff_multiplier.powi(exponent);
        StdDuration::from_secs_f64(delay_secs.min(self.max_delay.as_secs_f64()))
    }
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 3,
            initial_delay: StdDuration::from_secs(2),
            max_delay: StdDuration::from_secs(30),
            backoff_multiplier: 2.0,
        }
    }
}

/// Tunable knobs for the quest progression engine.
#[derive(Debug, Clone)]
pub struct EngineConfig {
    /// How long each chapter collects votes before the tally fires.
    pub voting_window: Duration,
    /// Fallback option index when a deadline fires with zero valid votes.
    pub default_option: usize,
    /// How repeat votes per user are counted.
    pub vote_policy: VotePolicy,
    /// Hard cap on chapter count; reaching it completes the quest.
    pub max_chapters: i32,
    /// Stop-signal count at which a quest is archived.
    pub abandonment_threshold: i64,
    /// Consecutive zero-participation deadlines before archival.
    pub max_idle_rounds: u32,
    /// Lease time-to-live; an expired lease may be reclaimed.
    pub lease_ttl: Duration,
    /// How often the scheduler scans for due quests.
    pub tick_interval: StdDuration,
    /// Backoff budget for generator and poster calls.
    pub retry: RetryConfig,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            voting_window: Duration::hours(24),
            default_option: 0,
            vote_policy: VotePolicy::default(),
            max_chapters: 10,
            abandonment_threshold: 10,
            max_idle_rounds: 2,
            lease_ttl: Duration::seconds(60),
            tick_interval: StdDuration::from_secs(30),
            retry: RetryConfig::default(),
        }
    }
}
