use lazy_backup::config::{AppConfig, StorageBackend};
use lazy_backup::logging;
use lazy_backup::services::{ServiceContainer, SyncConfig};
use tracing::{error, info, warn};

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let config = AppConfig::from_env()?;

    // Keep the guard alive until exit so buffered file logs are flushed.
    let (logging_config, _log_guard) = logging::init_logging(&config.log_dir)?;

    info!(
        database = %config.database_url,
        temp_dir = %config.backup_temp_dir.display(),
        timezone = %config.scheduler_timezone,
        "Starting lazy-backup v{}",
        env!("CARGO_PKG_VERSION")
    );

    let container = ServiceContainer::new(&config).await?;

    if let Some(path) = &config.sync_file {
        let sync = SyncConfig::load(path).await?;
        let report = container.manager.sync_from_config(&sync).await?;
        info!(file = %path.display(), ?report, "Applied sync file");
    }

    if matches!(config.storage, StorageBackend::Drive { .. }) {
        if let Some(code) = &config.auth_code {
            let token = container.manager.exchange_auth_code(code).await?;
            info!(expires_at = ?token.expires_at, "Drive authorization stored");
        }
        match container.manager.token_info().await {
            Ok(token) if !token.has_token => match container.manager.auth_url("lazy-backup") {
                Ok(url) => warn!(
                    %url,
                    "No Drive token stored; open the URL and restart with GOOGLE_AUTH_CODE set"
                ),
                Err(e) => warn!(error = %e, "No Drive token stored"),
            },
            Ok(_) => {}
            Err(e) => warn!(error = %e, "Failed to read Drive token state"),
        }
    }

    logging_config.start_retention_cleanup(container.cancellation_token());
    container.start();

    if let Err(e) = tokio::signal::ctrl_c().await {
        error!(error = %e, "Failed to listen for shutdown signal");
    }
    info!("Shutdown signal received");

    container.shutdown().await;
    Ok(())
}
