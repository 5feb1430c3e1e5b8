//! WMPR Feed Service Library
//!
//! HTTP service exposing the recent-requests feed consumed by the portal
//! widget and the per-project settings page that chooses its query.

pub mod auth;
pub mod config;
pub mod feed_service;
pub mod handlers;
pub mod jira;
pub mod metrics;
pub mod render;
pub mod settings_admin;

// Re-export commonly used types
pub use config::FeedConfig;
pub use feed_service::{FeedFailure, FeedService};
pub use settings_admin::{FormModel, SettingsAdmin};

use anyhow::Context;
use std::sync::Arc;
use tracing::info;
use wmpr_core::{
    mock_engine::MockQueryEngine,
    settings::{FileSettingsStore, MemorySettingsStore},
    ProjectDirectory, QueryEngine, QueryResolver, SettingsStore, StaticProjectDirectory,
    WmprResult,
};

use crate::config::SearchBackend;
use crate::jira::{JiraAuth, JiraSearchEngine};
use crate::metrics::FeedMetricsCollector;
use crate::render::SettingsPageRenderer;

/// Application state shared across handlers
#[derive(Clone)]
pub struct AppState {
    pub feed_service: Arc<FeedService>,
    pub settings_admin: Arc<SettingsAdmin>,
    pub metrics: Arc<FeedMetricsCollector>,
    pub config: Arc<FeedConfig>,
}

impl AppState {
    /// Wire the services around the given collaborators
    pub fn new(
        config: FeedConfig,
        store: Arc<dyn SettingsStore>,
        engine: Arc<dyn QueryEngine>,
        directory: Arc<dyn ProjectDirectory>,
    ) -> WmprResult<Self> {
        let defaults = Arc::new(config.query_defaults());
        let metrics = Arc::new(FeedMetricsCollector::new());

        let feed_service = FeedService::new(
            QueryResolver::new(store.clone(), defaults.clone()),
            engine,
            config.query_timeout(),
            metrics.clone(),
        );

        let renderer =
            SettingsPageRenderer::from_template_dir(config.templates.template_dir.as_deref())?;
        let settings_admin = SettingsAdmin::new(store, directory, defaults, renderer, metrics.clone());

        Ok(Self {
            feed_service: Arc::new(feed_service),
            settings_admin: Arc::new(settings_admin),
            metrics,
            config: Arc::new(config),
        })
    }
}

/// Build the application state from configuration
pub async fn build_state(config: FeedConfig) -> anyhow::Result<AppState> {
    let store: Arc<dyn SettingsStore> = match config.settings.store_path {
        Some(ref path) => {
            info!("Using settings file {}", path);
            Arc::new(
                FileSettingsStore::open(path)
                    .await
                    .with_context(|| format!("Failed to open settings file: {}", path))?,
            )
        }
        None => {
            info!("Using in-memory settings");
            Arc::new(MemorySettingsStore::new())
        }
    };

    let static_directory = Arc::new(StaticProjectDirectory::new(config.projects.clone()));

    let (engine, directory): (Arc<dyn QueryEngine>, Arc<dyn ProjectDirectory>) =
        match config.search.backend {
            SearchBackend::Jira => {
                let auth = match (&config.search.username, &config.search.api_token) {
                    (Some(username), Some(token)) => {
                        Some(JiraAuth::new(username.clone(), token.clone()))
                    }
                    _ => None,
                };
                let jira = Arc::new(
                    JiraSearchEngine::new(&config.search.base_url, auth, config.connect_timeout())
                        .context("Failed to create search client")?,
                );
                info!("Searching via {}", jira.base_url());

                let directory: Arc<dyn ProjectDirectory> = if config.projects.is_empty() {
                    jira.clone()
                } else {
                    static_directory
                };
                let engine: Arc<dyn QueryEngine> = jira;
                (engine, directory)
            }
            SearchBackend::Mock => {
                info!("Using the mock search engine");
                let engine: Arc<dyn QueryEngine> = Arc::new(MockQueryEngine::with_sample_data());
                let directory: Arc<dyn ProjectDirectory> = static_directory;
                (engine, directory)
            }
        };

    AppState::new(config, store, engine, directory).context("Failed to build application state")
}

/// Create the main application router
pub fn create_router(state: AppState) -> axum::Router {
    use crate::handlers::*;
    use axum::routing::get;
    use tower::ServiceBuilder;
    use tower_http::{catch_panic::CatchPanicLayer, trace::TraceLayer};

    axum::Router::new()
        // Health and monitoring endpoints
        .route("/health", get(health_handler))
        .route("/metrics", get(metrics_handler))
        // Portal widget feed
        .route("/recent", get(feed_handler).options(cors_preflight_recent))
        // Project settings page
        .route(
            "/settings",
            get(settings_view_handler).post(settings_save_handler),
        )
        .layer(
            ServiceBuilder::new()
                .layer(CatchPanicLayer::new())
                .layer(TraceLayer::new_for_http())
                .layer(axum::middleware::from_fn(timing_middleware)),
        )
        .with_state(state)
}
