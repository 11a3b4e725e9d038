//! Engine error taxonomy.
//!
//! The variants follow the failure classes the orchestrator distinguishes:
//! transient external failures are retried, permanent ones hold the quest,
//! lease conflicts are expected and skip the cycle, and bad vote rows are
//! absorbed at the tally boundary as `Validation` errors.

use thiserror::Error;
use uuid::Uuid;

/// Top-level error type for the quest progression engine.
#[derive(Debug, Error)]
pub enum EngineError {
    /// No quest exists for the given id or slug.
    #[error("quest not found: {0}")]
    QuestNotFound(String),

    /// No chapter row exists where one was required.
    #[error("chapter {chapter_number} not found for quest {quest_id}")]
    ChapterNotFound {
        /// The quest the chapter belongs to.
        quest_id: Uuid,
        /// The missing chapter number.
        chapter_number: i32,
    },

    /// A validation error in domain logic or inbound data.
    #[error("validation error: {0}")]
    Validation(String),

    /// A transient failure from an external collaborator; retryable.
    #[error("transient external failure: {0}")]
    ExternalTransient(String),

    /// A permanent rejection from an external collaborator; the quest is
    /// held for operator review rather than retried.
    #[error("permanent external failure: {0}")]
    ExternalPermanent(String),

    /// Another worker holds the quest's progression lease.
    #[error("lease for quest {0} is held by another worker")]
    LeaseHeld(Uuid),

    /// An infrastructure/persistence error.
    #[error("storage error: {0}")]
    Storage(String),
}

impl EngineError {
    /// True when the error is worth retrying with backoff.
    #[must_use]
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::ExternalTransient(_))
    }
}
