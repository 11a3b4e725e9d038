//! Shared application state.

use std::sync::Arc;

use questline_core::clock::Clock;
use questline_core::collaborators::{ChapterGenerator, ReplyInterpreter, SocialPoster};
use questline_core::config::EngineConfig;
use questline_core::repository::QuestRepository;
use questline_engine::publisher::ChapterPublisher;

/// Application state shared across all request handlers.
#[derive(Clone)]
pub struct AppState {
    /// Quest/chapter/vote storage.
    pub repo: Arc<dyn QuestRepository>,
    /// Content generator collaborator.
    pub generator: Arc<dyn ChapterGenerator>,
    /// Social posting collaborator.
    pub poster: Arc<dyn SocialPoster>,
    /// Reply interpretation collaborator.
    pub interpreter: Arc<dyn ReplyInterpreter>,
    /// Clock shared with the engine.
    pub clock: Arc<dyn Clock>,
    /// Engine configuration.
    pub config: EngineConfig,
}

impl AppState {
    /// Create new application state.
    #[must_use]
    pub fn new(
        repo: Arc<dyn QuestRepository>,
        generator: Arc<dyn ChapterGenerator>,
        poster: Arc<dyn SocialPoster>,
        interpreter: Arc<dyn ReplyInterpreter>,
        clock: Arc<dyn Clock>,
        config: EngineConfig,
    ) -> Self {
        Self {
            repo,
            generator,
            poster,
            interpreter,
            clock,
            config,
        }
    }

    /// Builds a publisher over this state's storage and collaborators.
    #[must_use]
    pub fn publisher(&self) -> ChapterPublisher {
        ChapterPublisher::new(
            self.repo.clone(),
            self.generator.clone(),
            self.poster.clone(),
            self.clock.clone(),
            self.config.clone(),
        )
    }
}
