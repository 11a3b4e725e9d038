//! Scripted fakes for the engine's external collaborators.

use std::collections::VecDeque;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};

use async_trait::async_trait;
use questline_core::chapter::Chapter;
use questline_core::collaborators::{
    ChapterGenerator, GeneratedChapter, InterpretedChoice, ReplyInterpreter, SocialPoster,
};
use questline_core::error::EngineError;
use questline_core::quest::Quest;
use questline_core::vote::VoteInterpretation;

/// Builds a non-final generated chapter with two options.
#[must_use]
pub fn generated_chapter(content: &str) -> GeneratedChapter {
    GeneratedChapter {
        content: content.to_owned(),
        options: vec!["left".to_owned(), "right".to_owned()],
        sources: vec![],
        is_final: false,
    }
}

/// A generator that replays a scripted sequence of results and counts calls.
#[derive(Debug, Default)]
pub struct ScriptedGenerator {
    script: Mutex<VecDeque<Result<GeneratedChapter, EngineError>>>,
    calls: AtomicU32,
}

impl ScriptedGenerator {
    /// Creates a generator that returns `results` in order.
    #[must_use]
    pub fn new(results: Vec<Result<GeneratedChapter, EngineError>>) -> Self {
        Self {
            script: Mutex::new(results.into()),
            calls: AtomicU32::new(0),
        }
    }

    /// Number of `generate` calls made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl ChapterGenerator for ScriptedGenerator {
    async fn generate(
        &self,
        _quest: &Quest,
        _history: &[Chapter],
        _winning_option: usize,
    ) -> Result<GeneratedChapter, EngineError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        self.script
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| Err(EngineError::ExternalPermanent("script exhausted".into())))
    }
}

/// A poster that fails a configured number of times before succeeding, and
/// records every successful post.
#[derive(Debug, Default)]
pub struct FlakyPoster {
    failures_remaining: AtomicU32,
    calls: AtomicU32,
    posts: Mutex<Vec<String>>,
}

impl FlakyPoster {
    /// Creates a poster that always succeeds.
    #[must_use]
    pub fn new() -> Self {
        Self::failing_times(0)
    }

    /// Creates a poster whose first `failures` calls fail transiently.
    #[must_use]
    pub fn failing_times(failures: u32) -> Self {
        Self {
            failures_remaining: AtomicU32::new(failures),
            calls: AtomicU32::new(0),
            posts: Mutex::new(Vec::new()),
        }
    }

    /// Number of `post` calls made so far.
    pub fn calls(&self) -> u32 {
        self.calls.load(Ordering::SeqCst)
    }

    /// Contents of every successful post, in order.
    ///
    /// # Panics
    ///
    /// Panics if the internal mutex is poisoned.
    pub fn posts(&self) -> Vec<String> {
        self.posts.lock().unwrap().clone()
    }
}

#[async_trait]
impl SocialPoster for FlakyPoster {
    async fn post(&self, content: &str) -> Result<String, EngineError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        let remaining = self.failures_remaining.load(Ordering::SeqCst);
        if remaining > 0 {
            self.failures_remaining.store(remaining - 1, Ordering::SeqCst);
            return Err(EngineError::ExternalTransient("post timed out".into()));
        }
        self.posts.lock().unwrap().push(content.to_owned());
        Ok(format!("tweet-{call}"))
    }
}

/// An interpreter that returns the same choice for every reply.
#[derive(Debug)]
pub struct FixedInterpreter {
    selected_option: Option<usize>,
}

impl FixedInterpreter {
    /// Always interprets replies as a vote for `option`.
    #[must_use]
    pub fn selecting(option: usize) -> Self {
        Self {
            selected_option: Some(option),
        }
    }

    /// Never manages to read a vote out of a reply.
    #[must_use]
    pub fn uninterpretable() -> Self {
        Self {
            selected_option: None,
        }
    }
}

#[async_trait]
impl ReplyInterpreter for FixedInterpreter {
    async fn interpret(
        &self,
        reply_text: &str,
        options: &[String],
    ) -> Result<InterpretedChoice, EngineError> {
        let label = self
            .selected_option
            .and_then(|idx| options.get(idx))
            .cloned()
            .unwrap_or_else(|| reply_text.to_owned());
        Ok(InterpretedChoice {
            selected_option: self.selected_option,
            interpretation: VoteInterpretation {
                label,
                confidence: if self.selected_option.is_some() { 0.95 } else { 0.1 },
            },
        })
    }
}
