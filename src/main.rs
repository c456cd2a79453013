use cropstat::config::ServiceConfig;
use cropstat::repo::SqliteReportRepository;
use cropstat::retention::retention_task;
use cropstat::service::ReportService;
use cropstat::stats::RegionalStats;
use dotenv::dotenv;
use log::{error, info};
use std::sync::Arc;
use tokio::sync::watch;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error>> {
    dotenv().ok();

    let config = ServiceConfig::from_env()?;

    env_logger::Builder::from_env(
        env_logger::Env::default().default_filter_or(&config.rust_log),
    )
    .init();

    info!("starting cropstat reporting core");
    info!("   database: {}", config.db_path);

    let repo = Arc::new(SqliteReportRepository::new(&config.db_path)?);
    let stats = Arc::new(RegionalStats::new());

    // Handlers (HTTP layer, out of scope here) receive this service handle.
    let _service = ReportService::new(repo.clone(), stats.clone());

    let (shutdown_tx, shutdown_rx) = watch::channel(false);
    let retention = tokio::spawn(retention_task(repo, stats, shutdown_rx));
    info!("retention task spawned (3-day window, daily at midnight)");

    match tokio::signal::ctrl_c().await {
        Ok(()) => info!("received CTRL+C, shutting down"),
        Err(err) => error!("failed to listen for CTRL+C: {}", err),
    }

    if shutdown_tx.send(true).is_ok() {
        if let Err(e) = retention.await {
            error!("retention task join failed: {}", e);
        }
    }

    info!("cropstat stopped");
    Ok(())
}
