//! Shared test fakes and utilities for the Questline engine.

mod clock;
mod collaborators;
mod repository;

pub use clock::{FixedClock, ManualClock};
pub use collaborators::{FixedInterpreter, FlakyPoster, ScriptedGenerator, generated_chapter};
pub use repository::{FailingQuestRepository, InMemoryQuestRepository};
