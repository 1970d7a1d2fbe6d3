use std::sync::Arc;

use axum::http::HeaderValue;
use coordinator::{
    api,
    auth::SqliteAuthorizer,
    compute::{ComputeProvider, GceCompute, InMemoryCompute},
    config::{self, ComputeBackend},
    db,
    engine::{Coordinator, LifecycleTrigger},
    store::SqliteStudyStore,
    AppState,
};
use tower_http::cors::{AllowOrigin, CorsLayer};
use tracing::{info, warn};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    tracing_subscriber::registry()
        .with(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "coordinator=debug,tower_http=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    let config = config::Config::from_env()?;
    info!(port = config.port, backend = ?config.compute_backend, "coordinator starting");

    // Database
    let db = db::connect(&config.database_url).await?;
    let store = Arc::new(SqliteStudyStore::new(db.clone()));
    let authorizer = Arc::new(SqliteAuthorizer::new(db));

    // Compute provider
    let compute: Arc<dyn ComputeProvider> = match config.compute_backend {
        ComputeBackend::Gce => Arc::new(GceCompute::new(
            reqwest::Client::builder()
                .timeout(std::time::Duration::from_secs(60))
                .build()?,
            config.gcp_zone.clone(),
            config.gcp_access_token.clone(),
        )),
        ComputeBackend::DryRun => {
            warn!("dry-run compute backend: instances will not be stopped or deleted");
            Arc::new(InMemoryCompute::new())
        }
    };

    let lifecycle = LifecycleTrigger::new(compute, config.lifecycle_max_concurrency);
    let coordinator = Arc::new(Coordinator::new(
        store.clone(),
        lifecycle,
        config.coordinator_settings(),
    ));

    let state = Arc::new(AppState {
        store,
        coordinator: Arc::clone(&coordinator),
        authorizer,
    });

    let app = api::router(state).layer(cors_layer(&config.cors_origins));

    let addr = format!("0.0.0.0:{}", config.port);
    info!("listening on {addr}");
    let listener = tokio::net::TcpListener::bind(&addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await?;

    // Teardowns are never cancelled; let the scheduled ones finish.
    let pending = coordinator.lifecycle().in_flight();
    if pending > 0 {
        info!(pending, "waiting for instance teardowns");
    }
    coordinator.lifecycle().wait_idle().await;
    info!("coordinator stopped");
    Ok(())
}

fn cors_layer(origins: &[String]) -> CorsLayer {
    if origins.is_empty() {
        return CorsLayer::permissive();
    }
    let origins: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|o| HeaderValue::from_str(o).ok())
        .collect();
    CorsLayer::new().allow_origin(AllowOrigin::list(origins))
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            warn!("failed to listen for ctrl-c: {e}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sig) => {
                sig.recv().await;
            }
            Err(e) => {
                warn!("failed to listen for SIGTERM: {e}");
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
    info!("shutdown signal received");
}
