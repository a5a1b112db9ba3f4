// Model Lifecycle Manager API server.

use std::sync::Arc;

use anyhow::{Context, Result};
use mlm_api::{build_app, AppState};
use mlm_core::{Catalog, HttpHealthProber, LifecycleEngine, MemoryGuard};
use mlm_driver::DockerContainerDriver;
use mlm_orchestrator::{ModelClient, SandboxServiceClient, SearchServiceClient, ToolOrchestrator};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

/// Resolves the catalog path: `--catalog <path>` wins over `MLM_CATALOG_PATH`,
/// which wins over the `./models.toml` default. A single flag doesn't
/// warrant pulling in an external arg-parsing crate.
fn resolve_catalog_path() -> String {
    let args: Vec<String> = std::env::args().collect();
    let mut i = 1;
    while i < args.len() {
        if args[i] == "--catalog" {
            if let Some(path) = args.get(i + 1) {
                return path.clone();
            }
        }
        i += 1;
    }
    std::env::var("MLM_CATALOG_PATH").unwrap_or_else(|_| "./models.toml".to_string())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        tokio::signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate())
            .expect("failed to install SIGTERM handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    let _ = dotenvy::dotenv();

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "mlm_api=info,mlm_core=info,mlm_orchestrator=info".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();

    tracing::info!("mlm-api starting...");

    let catalog_path = resolve_catalog_path();
    let catalog = Catalog::load(&catalog_path)
        .with_context(|| format!("failed to load catalog from {catalog_path}"))?;
    tracing::info!(path = %catalog_path, models = catalog.len(), "catalog loaded");

    let engine = Arc::new(LifecycleEngine::new(
        &catalog,
        Arc::new(DockerContainerDriver::new()),
        Arc::new(HttpHealthProber::new()),
        MemoryGuard::new(),
    ));

    let orchestrator = Arc::new(ToolOrchestrator::new(
        engine.clone(),
        Arc::new(ModelClient::new()),
        Arc::new(SearchServiceClient::from_env()),
        Arc::new(SandboxServiceClient::from_env()),
    ));

    let state = AppState { engine, orchestrator };
    let app = build_app(state);

    let bind_addr = std::env::var("MLM_BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8090".to_string());
    let listener = tokio::net::TcpListener::bind(&bind_addr)
        .await
        .with_context(|| format!("failed to bind {bind_addr}"))?;
    tracing::info!(addr = %bind_addr, "listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("server error")?;

    tracing::info!("mlm-api shut down cleanly");
    Ok(())
}
