use std::sync::Arc;
use tracing::{error, info, warn};

mod api;
mod bus;
mod chat;
mod client;
mod config;
mod contacts;
mod entity;
mod error;
mod manager;
mod mcp;
mod pipeline;
mod query;
mod store;

use client::{sidecar::SidecarClient, DetachedClient, MessagingClient};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env file; missing is fine
    let dotenv = dotenvy::dotenv();

    let config = config::Config::from_env();
    init_logging(&config);

    if let Err(e) = dotenv {
        info!("No .env file found or failed to load: {}", e);
    }

    info!("chatbridge starting...");
    config.warn_insecure();

    let (bus, events) = bus::EventBus::new();

    // Attach the protocol helper if one is configured
    let client: Arc<dyn MessagingClient> = match &config.client_cmd {
        Some(cmd) => {
            let sidecar = SidecarClient::spawn(cmd, bus.clone(), config.sync_timeout)?;
            if let Err(e) = sidecar.initialize(&config.device_name).await {
                error!("Messaging helper did not initialize: {:#}", e);
            }
            Arc::new(sidecar)
        }
        None => {
            warn!("No BRIDGE_CLIENT_CMD configured, running detached (sends will be refused).");
            Arc::new(DetachedClient)
        }
    };
    let manager = Arc::new(manager::Manager::new(
        client,
        config.sync_timeout,
        config.sync_delay,
    ));
    let ingestion_handle = manager.start_ingestion(events);

    let app = api::server::ApiServer::new(manager.clone(), config.admin_token.clone()).router();

    let listener = config.bind().await?;
    info!("Serving HTTP API on {}", listener.local_addr()?);

    tokio::select! {
        res = axum::serve(listener, app).with_graceful_shutdown(shutdown_signal()) => {
            if let Err(e) = res {
                error!("Server stopped with error: {}", e);
            }
        }
        _ = ingestion_handle => {
            warn!("Ingestion pipeline finished, shutting down");
        }
    }

    info!("chatbridge stopped");
    Ok(())
}

fn init_logging(config: &config::Config) {
    // RUST_LOG wins over LOG_LEVEL
    let filter = tracing_subscriber::EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| config.log_level.as_str().into());

    let builder = tracing_subscriber::fmt().with_env_filter(filter);
    if config.log_json {
        builder.json().init();
    } else {
        builder.init();
    }
}

async fn shutdown_signal() {
    let ctrl_c = async {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!("Failed to listen for Ctrl+C: {}", e);
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
                error!("Failed to install SIGTERM handler: {}", e);
                std::future::pending::<()>().await;
            }
        }
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => info!("Received Ctrl+C, shutting down..."),
        _ = terminate => info!("Received SIGTERM, shutting down..."),
    }
}
