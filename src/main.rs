//! pynk - host reachability and latency monitor.

use pynk::config::ServerConfig;
use pynk::db::Store;
use pynk::probe::{ProbeConfig, Prober};
use pynk::scheduler::{LogNotifier, Scheduler, SchedulerConfig};
use pynk::web::Server;

use std::sync::Arc;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Initialize logging
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(tracing_subscriber::EnvFilter::from_default_env()
            .add_directive("pynk=info".parse()?))
        .init();

    // Load configuration
    let cfg = ServerConfig::load();
    tracing::info!("Starting pynk on port {}...", cfg.http_port);
    tracing::info!("Using database at {}", cfg.db_path);

    // Initialize database
    let store = Arc::new(Store::new(&cfg.db_path)?);
    tracing::info!("Database initialized successfully");

    // Create scheduler and resume saved hosts
    let prober = Prober::system(ProbeConfig::from(&cfg));
    let scheduler = Scheduler::new(
        prober,
        store,
        Arc::new(LogNotifier),
        SchedulerConfig {
            history_capacity: cfg.history_capacity,
            probe_jitter: cfg.probe_jitter,
        },
    );
    let restored = scheduler.restore()?;
    tracing::info!("Loaded {} hosts", restored);

    // Start web server
    let server = Server::new(cfg, scheduler.clone());
    server
        .start(async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                tracing::error!("Failed to listen for shutdown signal: {}", e);
            }
        })
        .await?;

    tracing::info!("Shutting down");
    scheduler.shutdown();

    Ok(())
}
