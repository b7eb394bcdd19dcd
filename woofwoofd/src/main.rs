mod api;
mod bus;
mod config;
mod probe;
mod watch;

use tokio_util::sync::CancellationToken;
use anyhow::{Context, Result};
use crate::bus::mqtt::MqttTransport;
use crate::config::Config;
use crate::watch::registry::{Registry, RegistryHandle};

#[tokio::main]
async fn main() -> Result<()> {
    // Initialize tracing
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("woofwoofd=info"))
        )
        .init();

    tracing::info!("Starting woofwoofd v{}", env!("CARGO_PKG_VERSION"));

    // Load config
    let config_path = std::env::args()
        .nth(1)
        .unwrap_or_else(|| "/etc/woofwoof/woofwoof.toml".to_string());

    let config = Config::load(&config_path)
        .with_context(|| format!("Failed to load config from {}", config_path))?;

    tracing::info!("Loaded config from {}", config_path);

    // Create cancellation token for graceful shutdown
    let cancel = CancellationToken::new();

    // Connect to the action bus
    let (transport, actions, dispatch) = MqttTransport::connect(&config, cancel.clone())
        .await
        .context("Failed to start bus transport")?;

    // Spawn registry task owning every service watcher
    let registry = Registry::new(&config.services);
    let (registry_handle, registry_task) = RegistryHandle::spawn(registry, actions);

    // Spawn probes
    let mut probe_tasks = vec![probe::spawn_heartbeat(
        dispatch.clone(),
        config.probe.heartbeat_interval(),
        cancel.clone(),
    )];
    for service in &config.services {
        probe_tasks.push(probe::spawn_identity(
            service.handle.clone(),
            dispatch.clone(),
            config.probe.identity_interval(),
            cancel.clone(),
        ));
    }

    // Build API router
    let app = api::routes::router(api::routes::AppState {
        registry: registry_handle.clone(),
    });

    // Bind HTTP server
    let listener = tokio::net::TcpListener::bind(&config.http.listen)
        .await
        .with_context(|| format!("Failed to bind to {}", config.http.listen))?;

    tracing::info!("Serving reports via HTTP on {}", config.http.listen);

    // Run server with graceful shutdown
    let server_cancel = cancel.clone();
    let server_handle = tokio::spawn(async move {
        if let Err(e) = axum::serve(listener, app)
            .with_graceful_shutdown(async move { server_cancel.cancelled().await })
            .await
        {
            tracing::error!("Server error: {}", e);
        }
    });

    // Wait for shutdown signal
    tokio::signal::ctrl_c()
        .await
        .context("Failed to listen for ctrl-c")?;

    tracing::info!("Shutdown signal received");

    // Trigger cancellation
    cancel.cancel();

    // Let in-flight report requests drain before stopping the registry
    let _ = server_handle.await;
    if let Err(e) = registry_handle.shutdown().await {
        tracing::error!("Failed to shutdown registry: {}", e);
    }

    // Wait for all tasks to complete
    let _ = registry_task.await;
    for task in probe_tasks {
        let _ = task.await;
    }
    transport.join().await;

    tracing::info!("Shutdown complete");
    Ok(())
}
