//! Scheduler service.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use chrono_tz::Tz;
use parking_lot::Mutex;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::{debug, info, warn};

use super::cron::{CronSchedule, next_run_times_in};
use super::executor::JobExecutor;
use super::registry::{JobRegistry, ScheduledJob};
use crate::database::ConfigStore;
use crate::domain::JobConfig;
use crate::{Error, Result};

/// Default clock resolution (1 second).
const DEFAULT_TICK_INTERVAL_MS: u64 = 1_000;

/// Scheduler configuration.
#[derive(Debug, Clone)]
pub struct SchedulerConfig {
    /// Clock resolution in milliseconds.
    pub tick_interval_ms: u64,
    /// Zone cron expressions are evaluated in.
    pub timezone: Tz,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: DEFAULT_TICK_INTERVAL_MS,
            timezone: chrono_tz::UTC,
        }
    }
}

impl SchedulerConfig {
    fn tick(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }
}

/// The running clock task and its stop signal.
struct Clock {
    token: CancellationToken,
    handle: JoinHandle<()>,
}

/// Fires backup runs on cron schedules.
///
/// One clock task wakes every tick, collects the due jobs from the
/// [`JobRegistry`] and spawns an independent [`JobExecutor`] run for each.
/// Runs are tracked so shutdown can wait for them with [`Scheduler::drain`].
/// A job firing again while its previous run is still going starts a second run.
pub struct Scheduler {
    store: Arc<dyn ConfigStore>,
    executor: Arc<JobExecutor>,
    registry: Arc<JobRegistry>,
    config: SchedulerConfig,
    tracker: TaskTracker,
    clock: Mutex<Option<Clock>>,
}

impl Scheduler {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        executor: Arc<JobExecutor>,
        config: SchedulerConfig,
    ) -> Self {
        Self {
            store,
            executor,
            registry: Arc::new(JobRegistry::new()),
            config,
            tracker: TaskTracker::new(),
            clock: Mutex::new(None),
        }
    }

    pub fn is_running(&self) -> bool {
        self.clock.lock().is_some()
    }

    /// Number of runs still in flight.
    pub fn in_flight(&self) -> usize {
        self.tracker.len()
    }

    /// Start the clock and load enabled jobs in the background.
    ///
    /// Next fire times of jobs already registered are recomputed from now, so
    /// times that passed while the clock was stopped never fire.
    /// Calling `start` on a running scheduler does nothing.
    pub fn start(&self) {
        let mut clock = self.clock.lock();
        if clock.is_some() {
            debug!("Scheduler already running");
            return;
        }

        self.registry.rebase(Utc::now());
        let token = CancellationToken::new();
        let handle = tokio::spawn(run_clock(
            self.registry.clone(),
            self.executor.clone(),
            self.tracker.clone(),
            self.config.tick(),
            token.clone(),
        ));
        *clock = Some(Clock { token, handle });
        drop(clock);

        let store = self.store.clone();
        let registry = self.registry.clone();
        let timezone = self.config.timezone;
        self.tracker.spawn(async move {
            load_enabled_jobs(store.as_ref(), &registry, timezone).await;
        });

        info!(tick_ms = self.config.tick_interval_ms, timezone = %timezone, "Scheduler started");
    }

    /// Stop the clock. Runs already spawned keep going.
    pub async fn stop(&self) {
        let clock = self.clock.lock().take();
        let Some(clock) = clock else {
            return;
        };
        clock.token.cancel();
        if let Err(e) = clock.handle.await {
            warn!(error = %e, "Scheduler clock task ended abnormally");
        }
        info!("Scheduler stopped");
    }

    /// Wait up to `timeout` for in-flight runs. Returns `true` if all finished.
    pub async fn drain(&self, timeout: Duration) -> bool {
        self.tracker.close();
        let drained = tokio::time::timeout(timeout, self.tracker.wait())
            .await
            .is_ok();
        self.tracker.reopen();
        if !drained {
            warn!(
                remaining = self.tracker.len(),
                "Timed out waiting for in-flight backup runs"
            );
        }
        drained
    }

    /// Register `job`, replacing any entry with the same name.
    pub fn add_or_replace_job(&self, job: &JobConfig) -> Result<()> {
        register_job(&self.registry, job, self.config.timezone)
    }

    /// Unregister a job. Absent names are ignored.
    pub fn remove_job(&self, name: &str) {
        if self.registry.remove(name) {
            info!(job = %name, "Job unscheduled");
        }
    }

    /// Start one run of a stored job now without waiting for it.
    pub async fn trigger_now(&self, name: &str) -> Result<()> {
        let job = self.store.get_job(name).await?;
        info!(job = %name, "Manual backup triggered");
        spawn_run(&self.tracker, &self.executor, job);
        Ok(())
    }

    /// Snapshot of scheduled jobs, sorted by name.
    pub fn list_scheduled(&self) -> Vec<ScheduledJob> {
        self.registry.snapshot()
    }

    pub fn timezone(&self) -> Tz {
        self.config.timezone
    }

    /// Preview the next `count` fire times of `expression` in this scheduler's zone.
    pub fn next_run_times(&self, expression: &str, count: usize) -> Result<Vec<DateTime<Utc>>> {
        next_run_times_in(expression, self.config.timezone, count)
    }
}

fn register_job(registry: &JobRegistry, job: &JobConfig, timezone: Tz) -> Result<()> {
    if !job.enabled {
        return Err(Error::validation(format!(
            "job {} is disabled and cannot be scheduled",
            job.name
        )));
    }
    let schedule = CronSchedule::parse_in(&job.cron_expression, timezone)?;
    let replaced = registry.add_or_replace(job.clone(), schedule, Utc::now())?;
    info!(
        job = %job.name,
        cron = %job.cron_expression,
        replaced,
        "Job scheduled"
    );
    Ok(())
}

async fn load_enabled_jobs(store: &dyn ConfigStore, registry: &JobRegistry, timezone: Tz) {
    let jobs = match store.list_enabled_jobs().await {
        Ok(jobs) => jobs,
        Err(e) => {
            warn!(error = %e, "Failed to load enabled jobs");
            return;
        }
    };

    let mut loaded = 0usize;
    for job in &jobs {
        match register_job(registry, job, timezone) {
            Ok(()) => loaded += 1,
            Err(e) => warn!(job = %job.name, error = %e, "Skipping job"),
        }
    }
    info!(loaded, total = jobs.len(), "Loaded scheduled jobs");
}

fn spawn_run(tracker: &TaskTracker, executor: &Arc<JobExecutor>, job: JobConfig) {
    let executor = executor.clone();
    tracker.spawn(async move {
        executor.execute(&job).await;
    });
}

async fn run_clock(
    registry: Arc<JobRegistry>,
    executor: Arc<JobExecutor>,
    tracker: TaskTracker,
    tick: Duration,
    token: CancellationToken,
) {
    let mut interval = tokio::time::interval(tick);
    interval.set_missed_tick_behavior(MissedTickBehavior::Skip);

    loop {
        tokio::select! {
            _ = token.cancelled() => break,
            _ = interval.tick() => {
                for job in registry.take_due(Utc::now()) {
                    debug!(job = %job.name, "Job fired");
                    spawn_run(&tracker, &executor, job);
                }
            }
        }
    }
}
