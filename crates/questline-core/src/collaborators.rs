//! Traits for the external collaborators the engine consumes.
//!
//! Content generation, social posting, and reply interpretation are opaque
//! capabilities: the engine never looks inside them, it only relies on the
//! contracts here. Implementations live outside this crate (HTTP adapters in
//! the API binary, scripted fakes in test support).

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::chapter::Chapter;
use crate::error::EngineError;
use crate::quest::Quest;
use crate::vote::VoteInterpretation;

/// Generator output for one chapter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GeneratedChapter {
    /// Chapter prose.
    pub content: String,
    /// Ordered choice labels for the next vote window.
    pub options: Vec<String>,
    /// Source attributions.
    pub sources: Vec<String>,
    /// True when this chapter ends the story.
    pub is_final: bool,
}

/// Produces the next chapter from quest history and the winning option.
///
/// Must be a pure function of its inputs: retrying a failed downstream step
/// must never be answered with different content, which is why the engine
/// persists the draft before any post attempt.
#[async_trait]
pub trait ChapterGenerator: Send + Sync {
    /// Generates the chapter that follows `winning_option` being chosen.
    ///
    /// # Errors
    ///
    /// `ExternalTransient` for timeouts and retryable upstream failures,
    /// `ExternalPermanent` when the generator rejects the request.
    async fn generate(
        &self,
        quest: &Quest,
        history: &[Chapter],
        winning_option: usize,
    ) -> Result<GeneratedChapter, EngineError>;
}

/// Posts content externally and returns the remote id.
///
/// The engine enforces at-most-once by gating every call on the chapter's
/// persisted `posted_tweet_id`.
#[async_trait]
pub trait SocialPoster: Send + Sync {
    /// Posts `content` and returns the remote post id.
    ///
    /// # Errors
    ///
    /// `ExternalTransient` for retryable failures, `ExternalPermanent` when
    /// the content is rejected outright.
    async fn post(&self, content: &str) -> Result<String, EngineError>;
}

/// What the interpreter made of one raw reply.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct InterpretedChoice {
    /// Index into the chapter's options, or `None` when the reply could not
    /// be read as a vote.
    pub selected_option: Option<usize>,
    /// Label and confidence, stored verbatim on the vote row.
    pub interpretation: VoteInterpretation,
}

/// Turns a natural-language reply into a structured choice.
#[async_trait]
pub trait ReplyInterpreter: Send + Sync {
    /// Interprets `reply_text` against the chapter's option labels.
    ///
    /// The returned index is treated as already validated, but the engine
    /// still range-checks it before recording a vote.
    ///
    /// # Errors
    ///
    /// `ExternalTransient` / `ExternalPermanent` per the upstream failure.
    async fn interpret(
        &self,
        reply_text: &str,
        options: &[String],
    ) -> Result<InterpretedChoice, EngineError>;
}
