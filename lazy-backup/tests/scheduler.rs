//! Scheduler registry and firing behaviour.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{Duration as ChronoDuration, Timelike, Utc};

use lazy_backup::backup::{Backup, BackupArtifact, BackupFactory};
use lazy_backup::database::{ConfigStore, InMemoryConfigStore};
use lazy_backup::domain::{BackupMode, BackupRun, JobConfig, RunStatus};
use lazy_backup::notification::{ChannelRegistry, NotificationDispatcher};
use lazy_backup::scheduler::{JobExecutor, Scheduler, SchedulerConfig};
use lazy_backup::storage::{ArtifactRef, FolderRef, Storage};
use lazy_backup::{Error, Result};

struct TempFileBackup {
    dir: PathBuf,
    counter: Arc<AtomicUsize>,
}

#[async_trait]
impl Backup for TempFileBackup {
    fn database_kind(&self) -> &str {
        "mysql"
    }

    async fn test_connection(&self) -> Result<()> {
        Ok(())
    }

    async fn run(&self, _mode: BackupMode) -> Result<BackupArtifact> {
        let n = self.counter.fetch_add(1, Ordering::SeqCst);
        let path = self.dir.join(format!("artifact_{n}.sql"));
        tokio::fs::write(&path, b"-- dump").await?;
        Ok(BackupArtifact::new(path))
    }
}

struct TempFileBackupFactory {
    dir: PathBuf,
    counter: Arc<AtomicUsize>,
}

impl BackupFactory for TempFileBackupFactory {
    fn create(&self, _connection_ref: &str) -> Result<Box<dyn Backup>> {
        Ok(Box::new(TempFileBackup {
            dir: self.dir.clone(),
            counter: self.counter.clone(),
        }))
    }
}

struct NullStorage;

#[async_trait]
impl Storage for NullStorage {
    async fn find_or_create_folder(&self, name: &str) -> Result<FolderRef> {
        Ok(FolderRef {
            id: name.to_string(),
            name: name.to_string(),
        })
    }

    async fn upload(&self, path: &Path, _folder: &FolderRef) -> Result<ArtifactRef> {
        let name = path.file_name().unwrap().to_string_lossy().to_string();
        Ok(ArtifactRef {
            id: name.clone(),
            name,
            size: 7,
            link: None,
        })
    }
}

fn scheduler(store: Arc<InMemoryConfigStore>, dir: &Path, tick_ms: u64) -> Scheduler {
    let dispatcher = Arc::new(NotificationDispatcher::new(
        store.clone(),
        Arc::new(ChannelRegistry::new()),
        Duration::from_secs(1),
    ));
    let executor = Arc::new(JobExecutor::new(
        store.clone(),
        Arc::new(TempFileBackupFactory {
            dir: dir.to_path_buf(),
            counter: Arc::new(AtomicUsize::new(0)),
        }),
        Arc::new(NullStorage),
        dispatcher,
    ));
    Scheduler::new(
        store,
        executor,
        SchedulerConfig {
            tick_interval_ms: tick_ms,
            ..Default::default()
        },
    )
}

fn job(name: &str, cron: &str) -> JobConfig {
    JobConfig::new(name, cron, BackupMode::Full, "mysql://u:p@db:3306/app")
}

async fn wait_for_history(
    store: &InMemoryConfigStore,
    job_name: &str,
    min: usize,
) -> Vec<BackupRun> {
    for _ in 0..200 {
        let runs = store.list_history_for_job(job_name).await.unwrap();
        if runs.len() >= min && runs.iter().all(|r| r.status != RunStatus::Running) {
            return runs;
        }
        tokio::time::sleep(Duration::from_millis(25)).await;
    }
    store.list_history_for_job(job_name).await.unwrap()
}

#[tokio::test]
async fn re_adding_a_job_keeps_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = scheduler(Arc::new(InMemoryConfigStore::new()), dir.path(), 1_000);

    for cron in ["0 0 2 * * *", "0 30 3 * * *", "@hourly", "*/5 * * * * *"] {
        scheduler.add_or_replace_job(&job("nightly", cron)).unwrap();
        let listed = scheduler.list_scheduled();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].name, "nightly");
        assert_eq!(listed[0].cron_expression, cron);
        assert!(listed[0].next_fire_time.is_some());
    }
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_re_adds_keep_one_entry() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = Arc::new(scheduler(
        Arc::new(InMemoryConfigStore::new()),
        dir.path(),
        1_000,
    ));

    let tasks: Vec<_> = (0..32)
        .map(|i| {
            let scheduler = scheduler.clone();
            tokio::spawn(async move {
                let cron = format!("{} * * * * *", i % 60);
                scheduler.add_or_replace_job(&job("shared", &cron)).unwrap();
            })
        })
        .collect();
    for task in tasks {
        task.await.unwrap();
    }

    assert_eq!(scheduler.list_scheduled().len(), 1);
}

#[tokio::test]
async fn invalid_or_disabled_jobs_leave_registry_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = scheduler(Arc::new(InMemoryConfigStore::new()), dir.path(), 1_000);
    scheduler.add_or_replace_job(&job("nightly", "@daily")).unwrap();

    let err = scheduler
        .add_or_replace_job(&job("nightly", "0 2 * * *"))
        .unwrap_err();
    assert!(matches!(err, Error::Validation(_)));

    let mut disabled = job("other", "@daily");
    disabled.enabled = false;
    assert!(matches!(
        scheduler.add_or_replace_job(&disabled),
        Err(Error::Validation(_))
    ));

    let listed = scheduler.list_scheduled();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].cron_expression, "@daily");
}

#[tokio::test]
async fn removing_an_absent_job_is_a_no_op() {
    let dir = tempfile::tempdir().unwrap();
    let scheduler = scheduler(Arc::new(InMemoryConfigStore::new()), dir.path(), 1_000);
    scheduler.add_or_replace_job(&job("nightly", "@daily")).unwrap();

    scheduler.remove_job("missing");
    assert_eq!(scheduler.list_scheduled().len(), 1);

    scheduler.remove_job("nightly");
    scheduler.remove_job("nightly");
    assert!(scheduler.list_scheduled().is_empty());
}

#[tokio::test]
async fn start_loads_enabled_jobs_and_fires_them() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryConfigStore::new());
    store.create_job(&job("every-second", "* * * * * *")).await.unwrap();
    let mut disabled = job("disabled", "* * * * * *");
    disabled.enabled = false;
    store.create_job(&disabled).await.unwrap();

    let scheduler = scheduler(store.clone(), dir.path(), 50);
    scheduler.start();
    scheduler.start();
    assert!(scheduler.is_running());

    let runs = wait_for_history(&store, "every-second", 1).await;
    assert!(!runs.is_empty());
    assert!(runs.iter().all(|r| r.status == RunStatus::Success));
    assert!(store.list_history_for_job("disabled").await.unwrap().is_empty());

    let listed = scheduler.list_scheduled();
    assert_eq!(listed.len(), 1);
    assert!(listed[0].previous_fire_time.is_some());

    scheduler.stop().await;
    assert!(!scheduler.is_running());
    assert!(scheduler.drain(Duration::from_secs(5)).await);

    let settled = store.list_history_for_job("every-second").await.unwrap().len();
    tokio::time::sleep(Duration::from_millis(1_200)).await;
    assert_eq!(
        store.list_history_for_job("every-second").await.unwrap().len(),
        settled,
        "no firing after stop"
    );

    let leftovers = std::fs::read_dir(dir.path()).unwrap().count();
    assert_eq!(leftovers, 0, "temporary artifacts must be removed");
}

#[tokio::test]
async fn trigger_now_runs_in_background() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryConfigStore::new());
    let mut manual = job("manual", "@yearly");
    manual.enabled = false;
    store.create_job(&manual).await.unwrap();

    let scheduler = scheduler(store.clone(), dir.path(), 1_000);
    scheduler.trigger_now("manual").await.unwrap();

    let runs = wait_for_history(&store, "manual", 1).await;
    assert_eq!(runs.len(), 1);
    assert_eq!(runs[0].status, RunStatus::Success);
    assert_eq!(runs[0].artifact_size, Some(7));

    assert!(matches!(
        scheduler.trigger_now("missing").await,
        Err(Error::NotFound { .. })
    ));
}

#[tokio::test]
async fn fire_times_missed_while_stopped_do_not_run_on_start() {
    let dir = tempfile::tempdir().unwrap();
    let store = Arc::new(InMemoryConfigStore::new());
    let scheduler = scheduler(store.clone(), dir.path(), 50);

    // Fires once a minute, two seconds from now.
    let second = (Utc::now() + ChronoDuration::seconds(2)).second();
    scheduler
        .add_or_replace_job(&job("minutely", &format!("{second} * * * * *")))
        .unwrap();

    tokio::time::sleep(Duration::from_millis(3_500)).await;
    scheduler.start();
    tokio::time::sleep(Duration::from_millis(500)).await;

    assert!(store.list_history_for_job("minutely").await.unwrap().is_empty());
    let listed = scheduler.list_scheduled();
    assert_eq!(listed.len(), 1);
    assert_eq!(listed[0].previous_fire_time, None);
    assert!(listed[0].next_fire_time.unwrap() > Utc::now());

    scheduler.stop().await;
}
