use std::sync::Arc;
use std::time::Duration;

use axum::routing::{get, post};
use axum::Router;
use tower_http::cors::CorsLayer;
use tower_http::timeout::TimeoutLayer;
use tower_http::trace::TraceLayer;

use parley_engine::JobTracker;

use crate::handlers::{self, AppState, HandlerState};

/// Server configuration.
#[derive(Clone, Debug)]
pub struct ServerConfig {
    pub port: u16,
    pub request_timeout_secs: u64,
    /// How often expired results are purged.
    pub sweep_interval_secs: u64,
    /// How long shutdown waits for cancelled jobs to record their final status.
    pub shutdown_grace_secs: u64,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            port: 8964,
            request_timeout_secs: 30,
            sweep_interval_secs: 60,
            shutdown_grace_secs: 10,
        }
    }
}

/// Build the Axum router with all routes.
pub fn build_router(state: AppState, request_timeout: Duration) -> Router {
    Router::new()
        .route("/transcribe", post(handlers::transcribe))
        .route("/status/{job_id}", get(handlers::status))
        .route("/output/{job_id}", get(handlers::output))
        .route("/ledger/{job_id}", get(handlers::ledger))
        .route("/jobs/{job_id}/cancel", post(handlers::cancel))
        .route("/jobs/{job_id}/logs", get(handlers::job_logs))
        .route("/health", get(handlers::health))
        .with_state(state)
        .layer(TimeoutLayer::new(request_timeout))
        .layer(TraceLayer::new_for_http())
        .layer(CorsLayer::permissive())
}

/// Bind, serve, and start the result sweeper. Returns a handle that keeps both alive.
pub async fn start(config: ServerConfig, state: HandlerState) -> Result<ServerHandle, std::io::Error> {
    let state = Arc::new(state);
    let sweeper = start_sweeper(
        state.jobs.clone(),
        Duration::from_secs(config.sweep_interval_secs.max(1)),
    );

    let router = build_router(Arc::clone(&state), Duration::from_secs(config.request_timeout_secs));
    let addr = format!("0.0.0.0:{}", config.port);
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    let local_addr = listener.local_addr()?;

    tracing::info!(port = local_addr.port(), "parley server started");

    let server = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, router).await {
            tracing::error!(error = %e, "server stopped");
        }
    });

    Ok(ServerHandle {
        port: local_addr.port(),
        state,
        server,
        sweeper,
        grace: Duration::from_secs(config.shutdown_grace_secs),
    })
}

/// Periodically delete results past their retention window.
pub fn start_sweeper(jobs: JobTracker, interval: Duration) -> tokio::task::JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(interval);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Delay);
        loop {
            ticker.tick().await;
            match jobs.purge_expired() {
                Ok(0) => {}
                Ok(purged) => tracing::debug!(purged, "expired results purged"),
                Err(e) => tracing::warn!(error = %e, "result sweep failed"),
            }
        }
    })
}

/// Handle returned by [`start`]. Dropping it leaves the tasks running; call
/// [`ServerHandle::shutdown`] to stop them.
pub struct ServerHandle {
    pub port: u16,
    state: AppState,
    server: tokio::task::JoinHandle<()>,
    sweeper: tokio::task::JoinHandle<()>,
    grace: Duration,
}

impl ServerHandle {
    /// Stop serving, then cancel running jobs and wait for them to be marked failed.
    /// Returns false when the grace period ran out first.
    pub async fn shutdown(self) -> bool {
        self.server.abort();
        self.sweeper.abort();
        self.state.orchestrator.shutdown(self.grace).await
    }
}
