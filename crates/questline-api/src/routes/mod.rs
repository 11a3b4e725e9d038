//! Route modules for the Questline API.

pub mod executions;
pub mod health;
pub mod quest_votes;
pub mod quests;
pub mod replies;

use axum::Router;

use crate::state::AppState;

/// Builds the full API router. Used by `main` and by integration tests so
/// both serve the same route structure.
pub fn api_router() -> Router<AppState> {
    Router::new().merge(health::router()).nest(
        "/api/v1/quests",
        quests::router()
            .merge(replies::router())
            .merge(quest_votes::router())
            .merge(executions::router()),
    )
}
