//! Service container for dependency injection.
//!
//! The ServiceContainer builds every service from an [`AppConfig`] and
//! manages their lifecycle.

use std::sync::Arc;
use std::time::Duration;

use tokio_util::sync::CancellationToken;
use tracing::{info, warn};

use super::manager::BackupManager;
use crate::auth::{OAuthConfig, OAuthService};
use crate::backup::{BackupFactory, BackupSettings, DefaultBackupFactory};
use crate::config::{AppConfig, StorageBackend};
use crate::database::{self, ConfigStore, DbPool, SqlxConfigStore};
use crate::notification::{ChannelRegistry, NotificationDispatcher};
use crate::scheduler::{JobExecutor, Scheduler, SchedulerConfig};
use crate::storage::{DriveStorage, LocalStorage, Storage};
use crate::utils::http_client::{build_client, install_rustls_provider};
use crate::Result;

/// Service container holding all application services.
pub struct ServiceContainer {
    /// Database connection pool, if the store is SQL-backed.
    pool: Option<DbPool>,
    pub store: Arc<dyn ConfigStore>,
    pub dispatcher: Arc<NotificationDispatcher>,
    pub scheduler: Arc<Scheduler>,
    pub manager: Arc<BackupManager>,
    shutdown_timeout: Duration,
    /// Cancellation token for background tasks.
    cancellation_token: CancellationToken,
}

impl ServiceContainer {
    /// Open the database, run migrations and wire every service.
    pub async fn new(config: &AppConfig) -> Result<Self> {
        info!("Initializing service container");
        install_rustls_provider();

        let pool = database::init_pool(&config.database_url).await?;
        database::run_migrations(&pool).await?;
        let store: Arc<dyn ConfigStore> = Arc::new(SqlxConfigStore::new(pool.clone()));

        let backups: Arc<dyn BackupFactory> =
            Arc::new(DefaultBackupFactory::new(BackupSettings {
                temp_dir: config.backup_temp_dir.clone(),
                ..Default::default()
            }));
        let (storage, oauth) = build_storage(config, store.clone())?;

        let mut container = Self::with_parts(config, store, backups, storage, oauth)?;
        container.pool = Some(pool);
        Ok(container)
    }

    /// Wire services around caller-supplied collaborators.
    pub fn with_parts(
        config: &AppConfig,
        store: Arc<dyn ConfigStore>,
        backups: Arc<dyn BackupFactory>,
        storage: Arc<dyn Storage>,
        oauth: Option<Arc<OAuthService>>,
    ) -> Result<Self> {
        let notify_client = build_client(config.notification_timeout)?;
        let registry = Arc::new(ChannelRegistry::with_defaults(notify_client));
        let dispatcher = Arc::new(NotificationDispatcher::new(
            store.clone(),
            registry,
            config.notification_timeout,
        ));

        let executor = Arc::new(JobExecutor::new(
            store.clone(),
            backups,
            storage.clone(),
            dispatcher.clone(),
        ));
        let scheduler = Arc::new(Scheduler::new(
            store.clone(),
            executor,
            SchedulerConfig {
                tick_interval_ms: config.scheduler_tick_ms,
                timezone: config.scheduler_timezone,
            },
        ));
        let manager = Arc::new(
            BackupManager::new(store.clone(), scheduler.clone(), dispatcher.clone(), storage)
                .with_oauth(oauth),
        );

        Ok(Self {
            pool: None,
            store,
            dispatcher,
            scheduler,
            manager,
            shutdown_timeout: config.shutdown_timeout,
            cancellation_token: CancellationToken::new(),
        })
    }

    /// Start background services.
    pub fn start(&self) {
        self.scheduler.start();
    }

    /// Stop firing, wait for in-flight runs within the shutdown budget, close the pool.
    pub async fn shutdown(&self) {
        info!(timeout = ?self.shutdown_timeout, "Shutting down services");
        self.cancellation_token.cancel();

        self.scheduler.stop().await;
        if !self.scheduler.drain(self.shutdown_timeout).await {
            warn!("Shutdown timeout reached with backup runs still in flight");
        }

        if let Some(pool) = &self.pool {
            pool.close().await;
        }

        let stats = self.dispatcher.stats();
        info!(
            dispatches = stats.dispatches,
            delivered = stats.delivered,
            failed = stats.failed,
            "Services shut down"
        );
    }

    /// Token cancelled when shutdown begins.
    pub fn cancellation_token(&self) -> CancellationToken {
        self.cancellation_token.clone()
    }

    pub fn is_shutting_down(&self) -> bool {
        self.cancellation_token.is_cancelled()
    }
}

type StorageParts = (Arc<dyn Storage>, Option<Arc<OAuthService>>);

fn build_storage(config: &AppConfig, store: Arc<dyn ConfigStore>) -> Result<StorageParts> {
    match &config.storage {
        StorageBackend::Local { root } => {
            info!(root = %root.display(), "Using local artifact storage");
            Ok((Arc::new(LocalStorage::new(root.clone())), None))
        }
        StorageBackend::Drive {
            client_id,
            client_secret,
            refresh_token,
            redirect_url,
        } => {
            info!(upload_timeout = ?config.upload_timeout, "Using Google Drive artifact storage");
            let client = build_client(config.http_timeout)?;
            let oauth = Arc::new(OAuthService::new(
                OAuthConfig::google(client_id, client_secret)
                    .with_refresh_token(refresh_token.clone())
                    .with_redirect_url(redirect_url.clone()),
                client.clone(),
                store,
            ));
            let storage =
                DriveStorage::new(oauth.clone(), client).with_upload_timeout(config.upload_timeout);
            Ok((Arc::new(storage), Some(oauth)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::database::InMemoryConfigStore;
    use crate::domain::{BackupMode, JobConfig};

    fn config() -> AppConfig {
        AppConfig::from_lookup(|key| match key {
            "SCHEDULER_TICK_MS" => Some("20".to_string()),
            "SHUTDOWN_TIMEOUT_SECS" => Some("1".to_string()),
            _ => None,
        })
        .unwrap()
    }

    #[tokio::test]
    async fn test_start_loads_jobs_and_shutdown() {
        install_rustls_provider();
        let store = Arc::new(InMemoryConfigStore::new());
        store
            .create_job(&JobConfig::new(
                "nightly",
                "0 0 2 * * *",
                BackupMode::Full,
                "mysql://u:p@db/app",
            ))
            .await
            .unwrap();

        let root = tempfile::tempdir().unwrap();
        let container = ServiceContainer::with_parts(
            &config(),
            store,
            Arc::new(DefaultBackupFactory::default()),
            Arc::new(LocalStorage::new(root.path())),
            None,
        )
        .unwrap();

        container.start();
        for _ in 0..50 {
            if !container.scheduler.list_scheduled().is_empty() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert_eq!(container.scheduler.list_scheduled().len(), 1);

        container.shutdown().await;
        assert!(container.is_shutting_down());
        assert!(!container.scheduler.is_running());
    }

    #[tokio::test]
    async fn test_drive_backend_exposes_consent_flow() {
        install_rustls_provider();
        let config = AppConfig::from_lookup(|key| match key {
            "STORAGE_BACKEND" => Some("drive".to_string()),
            "GOOGLE_CLIENT_ID" => Some("client".to_string()),
            "GOOGLE_CLIENT_SECRET" => Some("secret".to_string()),
            "GOOGLE_REDIRECT_URL" => Some("http://localhost:8080/callback".to_string()),
            "SCHEDULER_TIMEZONE" => Some("Asia/Tokyo".to_string()),
            _ => None,
        })
        .unwrap();
        let store: Arc<dyn ConfigStore> = Arc::new(InMemoryConfigStore::new());
        let (storage, oauth) = build_storage(&config, store.clone()).unwrap();

        let container = ServiceContainer::with_parts(
            &config,
            store,
            Arc::new(DefaultBackupFactory::default()),
            storage,
            oauth,
        )
        .unwrap();

        assert_eq!(container.scheduler.timezone(), chrono_tz::Asia::Tokyo);
        assert!(container.manager.auth_url("s").unwrap().contains("access_type=offline"));
        assert!(!container.manager.token_info().await.unwrap().has_token);
    }
}
