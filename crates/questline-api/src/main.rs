//! Questline API server entry point.
//!
//! Serves the HTTP surface and hosts the progression scheduler as a
//! background task sharing the same pool, clock, and configuration.

use std::net::SocketAddr;
use std::str::FromStr;
use std::sync::Arc;
use std::time::Duration as StdDuration;

use chrono::Duration;
use questline_api::collaborators::{HttpChapterGenerator, HttpReplyInterpreter, HttpSocialPoster};
use questline_api::error::AppError;
use questline_api::routes;
use questline_api::state::AppState;
use questline_core::clock::SystemClock;
use questline_core::config::{EngineConfig, VotePolicy};
use questline_engine::orchestrator::ProgressionOrchestrator;
use questline_engine::scheduler::Scheduler;
use questline_store::PgQuestRepository;
use sqlx::postgres::PgPoolOptions;
use tokio::sync::watch;
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing_subscriber::EnvFilter;

/// Timeout for generator/poster/interpreter sidecar calls.
const UPSTREAM_TIMEOUT: StdDuration = StdDuration::from_secs(30);

fn require_env(key: &str) -> Result<String, AppError> {
    std::env::var(key)
        .map_err(|_| AppError::Config(format!("{key} environment variable must be set")))
}

fn env_or<T: FromStr>(key: &str, default: T) -> Result<T, AppError>
where
    T::Err: std::fmt::Display,
{
    match std::env::var(key) {
        Ok(raw) => raw
            .parse()
            .map_err(|err| AppError::Config(format!("{key} is invalid: {err}"))),
        Err(_) => Ok(default),
    }
}

fn engine_config_from_env() -> Result<EngineConfig, AppError> {
    let defaults = EngineConfig::default();
    let vote_policy = match std::env::var("QUESTLINE_VOTE_POLICY") {
        Ok(raw) => VotePolicy::parse(&raw)
            .ok_or_else(|| AppError::Config(format!("QUESTLINE_VOTE_POLICY is invalid: {raw}")))?,
        Err(_) => defaults.vote_policy,
    };
    Ok(EngineConfig {
        voting_window: Duration::seconds(env_or(
            "QUESTLINE_VOTING_WINDOW_SECS",
            defaults.voting_window.num_seconds(),
        )?),
        default_option: env_or("QUESTLINE_DEFAULT_OPTION", defaults.default_option)?,
        vote_policy,
        max_chapters: env_or("QUESTLINE_MAX_CHAPTERS", defaults.max_chapters)?,
        abandonment_threshold: env_or(
            "QUESTLINE_ABANDONMENT_THRESHOLD",
            defaults.abandonment_threshold,
        )?,
        max_idle_rounds: env_or("QUESTLINE_MAX_IDLE_ROUNDS", defaults.max_idle_rounds)?,
        lease_ttl: Duration::seconds(env_or(
            "QUESTLINE_LEASE_TTL_SECS",
            defaults.lease_ttl.num_seconds(),
        )?),
        tick_interval: StdDuration::from_secs(env_or(
            "QUESTLINE_TICK_INTERVAL_SECS",
            defaults.tick_interval.as_secs(),
        )?),
        retry: defaults.retry,
    })
}

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // Initialize tracing subscriber.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .json()
        .init();

    tracing::info!("Starting Questline API server");

    // Read configuration from environment.
    let database_url = require_env("DATABASE_URL")?;
    let generator_url = require_env("GENERATOR_URL")?;
    let poster_url = require_env("POSTER_URL")?;
    let interpreter_url = require_env("INTERPRETER_URL")?;
    let host = std::env::var("HOST").unwrap_or_else(|_| "0.0.0.0".to_string());
    let port: u16 = env_or("PORT", 3000)?;
    let config = engine_config_from_env()?;

    // Create database connection pool and apply migrations.
    let pool = PgPoolOptions::new()
        .max_connections(10)
        .connect(&database_url)
        .await?;
    sqlx::migrate!("../../migrations").run(&pool).await?;

    // Wire storage and collaborator adapters.
    let http = reqwest::Client::builder()
        .timeout(UPSTREAM_TIMEOUT)
        .build()
        .map_err(|err| AppError::Config(format!("failed to build HTTP client: {err}")))?;
    let repo = Arc::new(PgQuestRepository::new(pool));
    let generator = Arc::new(HttpChapterGenerator::new(http.clone(), generator_url));
    let poster = Arc::new(HttpSocialPoster::new(http.clone(), poster_url));
    let interpreter = Arc::new(HttpReplyInterpreter::new(http, interpreter_url));
    let clock = Arc::new(SystemClock);

    // Start the progression scheduler.
    let orchestrator = Arc::new(ProgressionOrchestrator::new(
        repo.clone(),
        generator.clone(),
        poster.clone(),
        clock.clone(),
        config.clone(),
    ));
    let scheduler = Scheduler::new(
        repo.clone(),
        orchestrator,
        clock.clone(),
        config.tick_interval,
    );
    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let scheduler_handle = tokio::spawn(async move { scheduler.run(shutdown_rx).await });

    // Build application state and router.
    // TODO: Replace CorsLayer::permissive() with restricted origins for production.
    let app_state = AppState::new(repo, generator, poster, interpreter, clock, config);
    let app = routes::api_router()
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
        .with_state(app_state);

    // Start server.
    let addr: SocketAddr = format!("{host}:{port}")
        .parse()
        .map_err(|err| AppError::Config(format!("invalid HOST:PORT combination: {err}")))?;
    tracing::info!("Listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(async {
            let _ = tokio::signal::ctrl_c().await;
        })
        .await?;

    // Stop the scheduler before exiting.
    let _ = shutdown_tx.send(true);
    if let Err(err) = scheduler_handle.await {
        tracing::error!(error = %err, "scheduler task failed");
    }

    Ok(())
}
