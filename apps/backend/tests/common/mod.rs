//! Common test utilities and fixtures for integration tests.
//!
//! This module provides shared test infrastructure including:
//! - TestContext wiring the router to an in-memory store
//! - A Postgres-backed context for the ignored database tests
//! - Authentication helpers

pub mod fixtures;

use std::sync::Arc;

use axum::Router;

use quizdeck_backend::config::Config;
use quizdeck_backend::db::{MemoryStateStore, PgStateStore, StateStore};
use quizdeck_backend::{build_router, AppState};

pub const TEST_TOKEN: &str = "test-sync-token";

/// Test context containing the store and the router built over it.
pub struct TestContext {
    pub store: Arc<dyn StateStore>,
    app: Router,
}

impl TestContext {
    /// In-memory store, token configured, no origin allow-list.
    pub fn new() -> Self {
        Self::with_config(Config {
            sync_token: Some(TEST_TOKEN.to_string()),
            ..Config::default()
        })
    }

    /// In-memory store with a custom configuration.
    pub fn with_config(config: Config) -> Self {
        let store: Arc<dyn StateStore> = Arc::new(MemoryStateStore::new());
        let app = build_router(AppState::new(store.clone(), config));
        Self { store, app }
    }

    /// Postgres-backed context.
    ///
    /// # Panics
    /// Panics if DATABASE_URL is not set or database connection fails.
    pub async fn postgres() -> Self {
        dotenvy::dotenv().ok();

        let database_url =
            std::env::var("DATABASE_URL").expect("DATABASE_URL must be set for integration tests");

        let store = PgStateStore::connect(&database_url)
            .await
            .expect("Failed to connect to test database");

        store.run_migrations().await.expect("Failed to run migrations");

        sqlx::query("DELETE FROM user_state")
            .execute(store.pool())
            .await
            .expect("Failed to clear user_state");

        let store: Arc<dyn StateStore> = Arc::new(store);
        let config = Config {
            sync_token: Some(TEST_TOKEN.to_string()),
            ..Config::default()
        };
        let app = build_router(AppState::new(store.clone(), config));
        Self { store, app }
    }

    /// Get the router for use with axum-test.
    pub fn router(&self) -> Router {
        self.app.clone()
    }

    /// Format authorization header value.
    pub fn auth_header_value(token: &str) -> String {
        format!("Bearer {}", token)
    }
}
