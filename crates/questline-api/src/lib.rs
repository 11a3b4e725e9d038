//! Questline HTTP API.
//!
//! Exposes quest creation, reply/vote ingestion, and the duel mechanic over
//! axum, and hosts the progression scheduler as a background task.

pub mod collaborators;
pub mod error;
pub mod routes;
pub mod state;
