//! Job registry mapping job names to live triggers.
//!
//! All access goes through whole-operation methods; the lock is never exposed
//! and never held across an await point.

use std::collections::HashMap;

use chrono::{DateTime, Utc};
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

use super::cron::CronSchedule;
use crate::domain::JobConfig;
use crate::{Error, Result};

/// Runtime binding of a job to its schedule.
#[derive(Debug, Clone)]
struct ScheduledEntry {
    job: JobConfig,
    schedule: CronSchedule,
    next_fire: Option<DateTime<Utc>>,
    previous_fire: Option<DateTime<Utc>>,
}

/// Immutable view of one entry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ScheduledJob {
    pub name: String,
    pub cron_expression: String,
    pub next_fire_time: Option<DateTime<Utc>>,
    pub previous_fire_time: Option<DateTime<Utc>>,
}

/// At most one entry per job name.
#[derive(Debug, Default)]
pub struct JobRegistry {
    entries: RwLock<HashMap<String, ScheduledEntry>>,
}

impl JobRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Replace any entry for the job's name with a fresh one.
    ///
    /// Returns `true` if an existing entry was replaced.
    pub fn add_or_replace(
        &self,
        job: JobConfig,
        schedule: CronSchedule,
        now: DateTime<Utc>,
    ) -> Result<bool> {
        let name = job.name.clone();
        let entry = ScheduledEntry {
            next_fire: schedule.next_after(&now),
            previous_fire: None,
            job,
            schedule,
        };

        let mut entries = self.entries.write();
        let replaced = entries.remove(&name).is_some();
        if entries.insert(name.clone(), entry).is_some() {
            return Err(Error::RegistryInvariant(format!(
                "second live entry observed for job {name}"
            )));
        }
        Ok(replaced)
    }

    /// Remove the entry for `name`. Returns `true` if one existed.
    pub fn remove(&self, name: &str) -> bool {
        self.entries.write().remove(name).is_some()
    }

    pub fn contains(&self, name: &str) -> bool {
        self.entries.read().contains_key(name)
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    /// Collect every job due at `now` and advance its fire times.
    ///
    /// Missed fire times collapse into a single firing.
    pub fn take_due(&self, now: DateTime<Utc>) -> Vec<JobConfig> {
        let mut entries = self.entries.write();
        let mut due = Vec::new();
        for entry in entries.values_mut() {
            if let Some(next) = entry.next_fire
                && next <= now
            {
                entry.previous_fire = Some(next);
                entry.next_fire = entry.schedule.next_after(&now);
                due.push(entry.job.clone());
            }
        }
        due
    }

    /// Recompute every entry's next fire time from `now`.
    ///
    /// Fire times that passed while the clock was not running are dropped.
    pub fn rebase(&self, now: DateTime<Utc>) {
        for entry in self.entries.write().values_mut() {
            entry.next_fire = entry.schedule.next_after(&now);
        }
    }

    /// Snapshot of all entries, sorted by name.
    pub fn snapshot(&self) -> Vec<ScheduledJob> {
        let mut jobs: Vec<ScheduledJob> = self
            .entries
            .read()
            .values()
            .map(|e| ScheduledJob {
                name: e.job.name.clone(),
                cron_expression: e.schedule.expression().to_string(),
                next_fire_time: e.next_fire,
                previous_fire_time: e.previous_fire,
            })
            .collect();
        jobs.sort_by(|a, b| a.name.cmp(&b.name));
        jobs
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::BackupMode;
    use chrono::TimeZone;
    use std::sync::Arc;

    fn job(name: &str, cron: &str) -> (JobConfig, CronSchedule) {
        (
            JobConfig::new(name, cron, BackupMode::Full, "mysql://h/db"),
            CronSchedule::parse(cron).unwrap(),
        )
    }

    #[test]
    fn test_replace_keeps_single_entry() {
        let registry = JobRegistry::new();
        let now = Utc::now();
        let (j, s) = job("nightly", "0 0 2 * * *");
        assert!(!registry.add_or_replace(j, s, now).unwrap());
        let (j, s) = job("nightly", "0 30 3 * * *");
        assert!(registry.add_or_replace(j, s, now).unwrap());

        let snapshot = registry.snapshot();
        assert_eq!(snapshot.len(), 1);
        assert_eq!(snapshot[0].cron_expression, "0 30 3 * * *");
    }

    #[test]
    fn test_take_due_advances_fire_times() {
        let registry = JobRegistry::new();
        let start = Utc.with_ymd_and_hms(2024, 1, 1, 1, 59, 0).unwrap();
        let (j, s) = job("nightly", "0 0 2 * * *");
        registry.add_or_replace(j, s, start).unwrap();

        assert!(registry.take_due(start).is_empty());

        let fire = Utc.with_ymd_and_hms(2024, 1, 1, 2, 0, 0).unwrap();
        let due = registry.take_due(fire);
        assert_eq!(due.len(), 1);
        assert_eq!(due[0].name, "nightly");

        let snapshot = registry.snapshot();
        assert_eq!(snapshot[0].previous_fire_time, Some(fire));
        assert_eq!(
            snapshot[0].next_fire_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap())
        );
        assert!(registry.take_due(fire).is_empty());
    }

    #[test]
    fn test_rebase_skips_fire_times_missed_while_stopped() {
        let registry = JobRegistry::new();
        let added = Utc.with_ymd_and_hms(2024, 1, 1, 1, 0, 0).unwrap();
        let (j, s) = job("nightly", "0 0 2 * * *");
        registry.add_or_replace(j, s, added).unwrap();

        let restarted = Utc.with_ymd_and_hms(2024, 1, 1, 5, 0, 0).unwrap();
        registry.rebase(restarted);

        assert!(registry.take_due(restarted).is_empty());
        let snapshot = registry.snapshot();
        assert_eq!(
            snapshot[0].next_fire_time,
            Some(Utc.with_ymd_and_hms(2024, 1, 2, 2, 0, 0).unwrap())
        );
        assert_eq!(snapshot[0].previous_fire_time, None);
    }

    #[test]
    fn test_remove_absent_is_noop() {
        let registry = JobRegistry::new();
        assert!(!registry.remove("missing"));
        assert!(registry.is_empty());
    }

    #[test]
    fn test_snapshot_sorted_by_name() {
        let registry = JobRegistry::new();
        let now = Utc::now();
        for name in ["zeta", "alpha", "mid"] {
            let (j, s) = job(name, "@daily");
            registry.add_or_replace(j, s, now).unwrap();
        }
        let names: Vec<_> = registry.snapshot().into_iter().map(|j| j.name).collect();
        assert_eq!(names, ["alpha", "mid", "zeta"]);
    }

    #[test]
    fn test_concurrent_replace_single_entry() {
        let registry = Arc::new(JobRegistry::new());
        let handles: Vec<_> = (0..16)
            .map(|i| {
                let registry = registry.clone();
                std::thread::spawn(move || {
                    let cron = format!("{} * * * * *", i % 60);
                    let (j, s) = job("shared", &cron);
                    registry.add_or_replace(j, s, Utc::now()).unwrap();
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }
        assert_eq!(registry.len(), 1);
    }
}
