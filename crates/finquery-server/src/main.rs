//! FinQuery Server
//!
//! Categorizes financial queries into intents with either a fine-tuned BERT
//! model or a TF-IDF + LinearSVC pipeline.

use anyhow::Result;
use clap::Parser;
use metrics_exporter_prometheus::PrometheusHandle;
use std::net::SocketAddr;
use tokio::signal;
use tracing::{error, info, warn};

use finquery_server::{create_router, AppState, Cli, ServerConfig};

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.log_json);

    info!("Starting FinQuery server");

    let config = ServerConfig::load(&cli)?;
    info!("Configuration loaded successfully");
    info!("LinearSVC artifact: {}", config.classifiers.linear.artifact.display());
    info!(
        "BERT checkpoint: {} (labels: {}, device: {})",
        config.classifiers.neural.checkpoint.display(),
        config.classifiers.neural.labels.display(),
        config.classifiers.neural.device
    );

    let metrics_handle = init_metrics()?;

    let addr: SocketAddr = format!("{}:{}", config.listen, config.port).parse()?;
    let preload = config.preload;
    let state = AppState::new(config).with_metrics(metrics_handle);

    if preload {
        info!("Preloading models...");
        state.preload().await?;
    } else {
        info!("Models will load on first request");
    }

    let app = create_router(state);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    info!("Listening on http://{}", addr);

    let shutdown = async {
        let received = shutdown_signal().await;
        warn!(signal = received, "Stopping server, draining open connections");
    };

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown)
        .await?;

    info!("Server shutdown complete");
    Ok(())
}

/// Resolve with the name of the first termination signal to arrive.
///
/// A signal source that cannot be installed is logged and never fires.
async fn shutdown_signal() -> &'static str {
    let interrupt = async {
        if let Err(e) = signal::ctrl_c().await {
            error!(error = %e, "Cannot listen for Ctrl+C");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match signal::unix::signal(signal::unix::SignalKind::terminate()) {
            Ok(mut stream) => {
                stream.recv().await;
            }
            Err(e) => {
                error!(error = %e, "Cannot listen for SIGTERM");
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = interrupt => "SIGINT",
        _ = terminate => "SIGTERM",
    }
}

/// Initialize tracing/logging
fn init_tracing(verbose: bool, json: bool) {
    use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

    let filter = if verbose {
        EnvFilter::new("finquery=debug,tower_http=debug")
    } else {
        EnvFilter::try_from_default_env()
            .unwrap_or_else(|_| EnvFilter::new("finquery=info,tower_http=warn"))
    };

    let registry = tracing_subscriber::registry().with(filter);
    if json {
        registry.with(tracing_subscriber::fmt::layer().json()).init();
    } else {
        registry.with(tracing_subscriber::fmt::layer()).init();
    }
}

/// Initialize metrics exporter and return handle for rendering
fn init_metrics() -> Result<PrometheusHandle> {
    use metrics_exporter_prometheus::PrometheusBuilder;

    let handle = PrometheusBuilder::new()
        .install_recorder()
        .map_err(|e| anyhow::anyhow!("Failed to install metrics: {}", e))?;

    metrics::describe_counter!(
        "finquery_requests_total",
        "Categorize requests by backend and response status"
    );
    metrics::describe_histogram!(
        "finquery_classification_latency_us",
        metrics::Unit::Microseconds,
        "Classification latency in microseconds by backend"
    );
    metrics::describe_counter!(
        "finquery_model_loads_total",
        "Successful model loads by model"
    );

    info!("Metrics exporter initialized");
    Ok(handle)
}
