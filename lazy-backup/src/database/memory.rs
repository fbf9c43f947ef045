//! In-memory [`ConfigStore`] for tests and embedding.

use std::collections::BTreeMap;

use async_trait::async_trait;
use parking_lot::RwLock;

use super::store::ConfigStore;
use crate::domain::{BackupRun, ChannelConfig, JobConfig, OAuthToken, RunStatus};
use crate::{Error, Result};

#[derive(Default)]
struct Inner {
    jobs: BTreeMap<String, JobConfig>,
    channels: BTreeMap<String, ChannelConfig>,
    tokens: BTreeMap<String, OAuthToken>,
    /// Latest snapshot per run id, in insertion order.
    history: Vec<BackupRun>,
    /// Every history write as (run id, status written).
    writes: Vec<(String, RunStatus)>,
}

/// Store backed by maps behind a single lock.
#[derive(Default)]
pub struct InMemoryConfigStore {
    inner: RwLock<Inner>,
}

impl InMemoryConfigStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Statuses written for a run, in write order.
    pub fn history_writes(&self, run_id: &str) -> Vec<RunStatus> {
        self.inner
            .read()
            .writes
            .iter()
            .filter(|(id, _)| id == run_id)
            .map(|(_, status)| *status)
            .collect()
    }
}

#[async_trait]
impl ConfigStore for InMemoryConfigStore {
    async fn list_jobs(&self) -> Result<Vec<JobConfig>> {
        Ok(self.inner.read().jobs.values().cloned().collect())
    }

    async fn list_enabled_jobs(&self) -> Result<Vec<JobConfig>> {
        Ok(self
            .inner
            .read()
            .jobs
            .values()
            .filter(|j| j.enabled)
            .cloned()
            .collect())
    }

    async fn get_job(&self, name: &str) -> Result<JobConfig> {
        self.inner
            .read()
            .jobs
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("BackupConfig", name))
    }

    async fn create_job(&self, job: &JobConfig) -> Result<()> {
        let mut inner = self.inner.write();
        if inner.jobs.contains_key(&job.name) {
            return Err(Error::validation(format!(
                "a job named '{}' already exists",
                job.name
            )));
        }
        inner.jobs.insert(job.name.clone(), job.clone());
        Ok(())
    }

    async fn update_job(&self, job: &JobConfig) -> Result<()> {
        let mut inner = self.inner.write();
        match inner.jobs.get_mut(&job.name) {
            Some(existing) => {
                *existing = job.clone();
                Ok(())
            }
            None => Err(Error::not_found("BackupConfig", &job.name)),
        }
    }

    async fn delete_job(&self, name: &str) -> Result<()> {
        self.inner.write().jobs.remove(name);
        Ok(())
    }

    async fn save_or_update_history(&self, run: &BackupRun) -> Result<()> {
        let mut inner = self.inner.write();
        inner.writes.push((run.id.clone(), run.status));
        match inner.history.iter_mut().find(|r| r.id == run.id) {
            Some(existing) => *existing = run.clone(),
            None => inner.history.push(run.clone()),
        }
        Ok(())
    }

    async fn get_history(&self, id: &str) -> Result<BackupRun> {
        self.inner
            .read()
            .history
            .iter()
            .find(|r| r.id == id)
            .cloned()
            .ok_or_else(|| Error::not_found("BackupHistory", id))
    }

    async fn list_history(&self, limit: u32, offset: u32) -> Result<Vec<BackupRun>> {
        let mut runs = self.inner.read().history.clone();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs
            .into_iter()
            .skip(offset as usize)
            .take(limit as usize)
            .collect())
    }

    async fn list_history_for_job(&self, job_name: &str) -> Result<Vec<BackupRun>> {
        let mut runs: Vec<_> = self
            .inner
            .read()
            .history
            .iter()
            .filter(|r| r.job_name == job_name)
            .cloned()
            .collect();
        runs.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(runs)
    }

    async fn list_channels(&self) -> Result<Vec<ChannelConfig>> {
        Ok(self.inner.read().channels.values().cloned().collect())
    }

    async fn list_enabled_channels(&self) -> Result<Vec<ChannelConfig>> {
        Ok(self
            .inner
            .read()
            .channels
            .values()
            .filter(|c| c.enabled)
            .cloned()
            .collect())
    }

    async fn get_channel(&self, name: &str) -> Result<ChannelConfig> {
        self.inner
            .read()
            .channels
            .get(name)
            .cloned()
            .ok_or_else(|| Error::not_found("NotificationConfig", name))
    }

    async fn save_channel(&self, channel: &ChannelConfig) -> Result<()> {
        self.inner
            .write()
            .channels
            .insert(channel.name.clone(), channel.clone());
        Ok(())
    }

    async fn delete_channel(&self, name: &str) -> Result<()> {
        self.inner.write().channels.remove(name);
        Ok(())
    }

    async fn get_token(&self, client_id: &str) -> Result<Option<OAuthToken>> {
        Ok(self.inner.read().tokens.get(client_id).cloned())
    }

    async fn save_token(&self, token: &OAuthToken) -> Result<()> {
        self.inner
            .write()
            .tokens
            .insert(token.client_id.clone(), token.clone());
        Ok(())
    }
}
