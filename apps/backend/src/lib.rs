pub mod config;
pub mod cors;
pub mod db;
pub mod error;
pub mod models;
pub mod routes;
pub mod services;

use std::sync::Arc;

use axum::{middleware, routing::get, Router};
use tower::ServiceBuilder;
use tower_http::trace::TraceLayer;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use crate::config::Config;
use crate::cors::OriginPolicy;
use crate::db::{MemoryStateStore, PgStateStore, StateStore};

/// Shared application state
#[derive(Clone)]
pub struct AppState {
    pub store: Arc<dyn StateStore>,
    pub config: Arc<Config>,
    pub origins: Arc<OriginPolicy>,
}

impl AppState {
    pub fn new(store: Arc<dyn StateStore>, config: Config) -> Self {
        let origins = OriginPolicy::new(config.allowed_origins.clone());
        Self {
            store,
            config: Arc::new(config),
            origins: Arc::new(origins),
        }
    }
}

/// Build the full router: public health check plus token-protected state routes.
pub fn build_router(state: AppState) -> Router {
    let protected_routes = Router::new()
        .route(
            "/api/state",
            get(routes::state::get_state).put(routes::state::put_state),
        )
        .route_layer(middleware::from_fn_with_state(
            state.clone(),
            routes::auth::auth_middleware,
        ));

    let cors = state.origins.layer();

    Router::new()
        .route("/health", get(routes::health::health_check))
        .merge(protected_routes)
        .layer(
            ServiceBuilder::new()
                .layer(TraceLayer::new_for_http())
                .layer(cors)
                .layer(middleware::from_fn_with_state(
                    state.clone(),
                    cors::reject_foreign_origin,
                )),
        )
        .with_state(state)
}

/// Pick the state store from configuration.
pub async fn connect_store(config: &Config) -> anyhow::Result<Arc<dyn StateStore>> {
    match &config.database_url {
        Some(url) => {
            tracing::info!("Connecting to database...");
            let store = PgStateStore::connect(url).await?;

            tracing::info!("Running migrations...");
            store.run_migrations().await?;
            Ok(Arc::new(store))
        }
        None => {
            tracing::warn!("DATABASE_URL not set, state is kept in memory only");
            Ok(Arc::new(MemoryStateStore::new()))
        }
    }
}

pub async fn run() -> anyhow::Result<()> {
    dotenvy::dotenv().ok();
    let config = Config::from_env();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_new(&config.log_level)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    if config.sync_token.is_none() {
        tracing::warn!("SYNC_TOKEN not set, state requests will be refused");
    }

    let store = connect_store(&config).await?;
    let addr = config.bind_addr();
    let app = build_router(AppState::new(store, config));

    tracing::info!("Starting server on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    tracing::info!("Server stopped");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            tracing::error!(error = %e, "failed to install Ctrl+C handler");
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(e) => {
                tracing::error!(error = %e, "failed to install SIGTERM handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
