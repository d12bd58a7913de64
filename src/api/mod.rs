//! HTTP/JSON API
//!
//! All training routes are mounted under `/model-training`; `/health` sits at
//! the root.
//!
//! | Method | Path | Handler |
//! |---|---|---|
//! | GET | `/runs` | paginated run list |
//! | POST | `/runs/trigger` | queue a run (`201`) |
//! | GET | `/runs/{run_id}` | one run, by ID or run ID |
//! | GET | `/runs/{run_id}/logs` | run logs |
//! | GET, PUT | `/schedule` | read or update the schedule |
//! | PATCH | `/schedule/pause`, `/schedule/resume` | toggle the pause flag |
//! | GET | `/statistics` | dashboard statistics |
//! | GET | `/metrics?version_id=` | raw metric records |
//! | GET | `/metrics/summary?version_id=` | aggregated metrics |
//! | GET | `/model-versions` | all versions |
//! | GET, POST | `/model-versions/active` | read or set the active version |

mod error;
mod models;
mod runs;
mod schedule;

pub use models::{ActiveVersionResponse, MetricItem, MetricsResponse, SummaryResponse};

use std::sync::Arc;
use std::time::Duration;

use axum::http::header::CONTENT_TYPE;
use axum::http::Method;
use axum::routing::{get, patch, post};
use axum::{Json, Router};
use serde_json::{json, Value};
use tokio::net::TcpListener;
use tower::ServiceBuilder;
use tower_http::cors::{Any, CorsLayer};
use tower_http::trace::TraceLayer;
use tracing::{error, info};

use crate::config::{Config, ServerConfig};
use crate::registry::{RunRegistry, VersionCatalog};
use crate::runner::RunnerHandle;
use crate::schedule::ScheduleController;
use crate::store::TrainingStore;
use crate::Result;

/// Shared handler state.
#[derive(Debug)]
pub struct AppState<S> {
    /// Run lifecycle
    pub registry: RunRegistry<S>,
    /// Singleton schedule
    pub schedule: ScheduleController<S>,
    /// Model versions and metrics
    pub catalog: VersionCatalog<S>,
    /// In-process worker, when a training command is configured
    pub runner: Option<RunnerHandle>,
}

impl<S> Clone for AppState<S> {
    fn clone(&self) -> Self {
        Self {
            registry: self.registry.clone(),
            schedule: self.schedule.clone(),
            catalog: self.catalog.clone(),
            runner: self.runner.clone(),
        }
    }
}

impl<S: TrainingStore> AppState<S> {
    /// Build the services over `store` with settings from `config`.
    #[must_use]
    pub fn new(store: Arc<S>, config: &Config) -> Self {
        let registry = RunRegistry::new(Arc::clone(&store))
            .with_defaults(config.training.defaults)
            .with_concurrent_runs(config.training.allow_concurrent_runs)
            .with_page_limits(
                config.pagination.default_limit,
                config.pagination.max_limit,
            );
        Self {
            registry,
            schedule: ScheduleController::new(Arc::clone(&store)),
            catalog: VersionCatalog::new(store),
            runner: None,
        }
    }

    /// Hand triggered runs to `runner`.
    #[must_use]
    pub fn with_runner(mut self, runner: RunnerHandle) -> Self {
        self.runner = Some(runner);
        self
    }
}

/// Build the router.
pub fn router<S: TrainingStore + 'static>(state: AppState<S>) -> Router {
    let training = Router::new()
        .route("/runs", get(runs::list::<S>))
        .route("/runs/trigger", post(runs::trigger::<S>))
        .route("/runs/{run_id}", get(runs::get::<S>))
        .route("/runs/{run_id}/logs", get(runs::logs::<S>))
        .route(
            "/schedule",
            get(schedule::get::<S>).put(schedule::update::<S>),
        )
        .route("/schedule/pause", patch(schedule::pause::<S>))
        .route("/schedule/resume", patch(schedule::resume::<S>))
        .route("/statistics", get(runs::statistics::<S>))
        .route("/metrics", get(models::metrics::<S>))
        .route("/metrics/summary", get(models::summary::<S>))
        .route("/model-versions", get(models::versions::<S>))
        .route(
            "/model-versions/active",
            get(models::active::<S>).post(models::set_active::<S>),
        );

    Router::new()
        .route("/health", get(health))
        .nest("/model-training", training)
        .with_state(state)
}

async fn health() -> Json<Value> {
    Json(json!({
        "status": "ok",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}

/// Bind `config.bind_address()` and serve until Ctrl+C or SIGTERM.
///
/// # Errors
///
/// Returns [`crate::Error::Io`] if the address cannot be bound or the server
/// fails.
pub async fn serve<S: TrainingStore + 'static>(
    state: AppState<S>,
    config: &ServerConfig,
) -> Result<()> {
    let cors = CorsLayer::new()
        .allow_origin(Any)
        .allow_methods([
            Method::GET,
            Method::POST,
            Method::PUT,
            Method::PATCH,
            Method::OPTIONS,
        ])
        .allow_headers([CONTENT_TYPE])
        .max_age(Duration::from_secs(config.cors_max_age_secs));

    let app = router(state).layer(
        ServiceBuilder::new()
            .layer(TraceLayer::new_for_http())
            .layer(cors),
    );

    let address = config.bind_address();
    let listener = TcpListener::bind(&address).await?;
    info!("Server running on {address}");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    info!("Server shut down");
    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        match tokio::signal::ctrl_c().await {
            Ok(()) => info!("Received Ctrl+C, shutting down"),
            Err(e) => {
                error!(error = %e, "Failed to install Ctrl+C handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(unix)]
    let terminate = async {
        use tokio::signal::unix::{signal, SignalKind};
        match signal(SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
                info!("Received terminate signal, shutting down");
            }
            Err(e) => {
                error!(error = %e, "Failed to install signal handler");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        () = ctrl_c => {},
        () = terminate => {},
    }
}
