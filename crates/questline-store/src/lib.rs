//! PostgreSQL-backed storage for the Questline engine.

pub mod pg_repository;

pub use pg_repository::PgQuestRepository;
