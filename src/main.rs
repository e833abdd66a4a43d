// plan-pdf-service/src/main.rs

use std::net::SocketAddr;
use std::sync::Arc;

use anyhow::Context;
use plan_pdf_service::config::Config;
use plan_pdf_service::gcs::DocumentStorage;
use plan_pdf_service::pipeline::DocumentPipeline;
use plan_pdf_service::renderers::ChromeRenderer;
use plan_pdf_service::routes;
use plan_pdf_service::state::AppState;
use plan_pdf_service::templates::TemplateStore;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Print to stderr BEFORE logging initialization to catch early failures
    eprintln!("Starting plan-pdf-service...");

    let config = match Config::load() {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("FATAL: Failed to load configuration: {}", e);
            std::process::exit(1);
        }
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| config.service.log_level.clone().into()),
        )
        .with(tracing_subscriber::fmt::layer().json())
        .init();

    info!(
        service = %config.service.name,
        version = env!("CARGO_PKG_VERSION"),
        port = config.service.port,
        templates = %config.templates.path.display(),
        "Starting PDF rendering service"
    );

    let storage = DocumentStorage::new(&config.storage).await;
    let renderer = ChromeRenderer::new(&config.renderer);
    let pipeline = DocumentPipeline::new(
        TemplateStore::new(&config.templates.path),
        Arc::new(renderer),
        Arc::new(storage),
    );

    let state = AppState::new(config.service.name.clone(), pipeline);
    let pipeline = state.pipeline.clone();
    let app = routes::router(state);

    let addr = SocketAddr::from(([0, 0, 0, 0], config.service.port));
    let listener = TcpListener::bind(addr)
        .await
        .with_context(|| format!("Failed to bind {addr}"))?;
    info!(%addr, "Listening");

    let cancel = CancellationToken::new();
    tokio::spawn(watch_signals(cancel.clone()));

    axum::serve(listener, app)
        .with_graceful_shutdown(cancel.cancelled_owned())
        .await
        .context("HTTP server failed")?;

    // The shared browser is closed exactly once, after in-flight requests drain
    pipeline.shutdown().await;
    info!("Shutdown complete");

    Ok(())
}

async fn watch_signals(cancel: CancellationToken) {
    use tokio::signal;

    let ctrl_c = async {
        if let Err(err) = signal::ctrl_c().await {
            error!("Unable to listen for shutdown signal: {}", err);
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                sigterm.recv().await;
            }
            Err(err) => {
                error!("Unable to listen for SIGTERM: {}", err);
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

    info!("Received shutdown signal, draining requests");
    cancel.cancel();
}
