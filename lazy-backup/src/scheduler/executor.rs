//! Runs one backup end-to-end.

use std::sync::Arc;

use tracing::{debug, error, info, warn};

use crate::backup::BackupFactory;
use crate::database::ConfigStore;
use crate::domain::{ArtifactInfo, BackupRun, JobConfig};
use crate::notification::{NotificationDispatcher, NotificationEvent};
use crate::storage::{ArtifactRef, Storage};
use crate::{Error, Result};

/// Destination folder for a job's artifacts.
pub fn folder_name(job_name: &str) -> String {
    format!("DB Backups - {job_name}")
}

/// Prefix a collaborator error with the stage that raised it.
fn at_stage(stage: &str, err: Error) -> Error {
    match err {
        Error::Collaborator { service, message } => Error::Collaborator {
            service,
            message: format!("{stage}: {message}"),
        },
        other => other,
    }
}

/// An uploaded artifact plus the size measured locally.
struct Uploaded {
    artifact: ArtifactRef,
    local_size: u64,
}

/// Executes backup runs.
///
/// Every run ends with exactly one terminal history record and a notification
/// fan-out. Collaborator errors are captured on the run and never returned.
pub struct JobExecutor {
    store: Arc<dyn ConfigStore>,
    backups: Arc<dyn BackupFactory>,
    storage: Arc<dyn Storage>,
    dispatcher: Arc<NotificationDispatcher>,
}

impl JobExecutor {
    pub fn new(
        store: Arc<dyn ConfigStore>,
        backups: Arc<dyn BackupFactory>,
        storage: Arc<dyn Storage>,
        dispatcher: Arc<NotificationDispatcher>,
    ) -> Self {
        Self {
            store,
            backups,
            storage,
            dispatcher,
        }
    }

    /// Run one backup for `job` and return the terminal run record.
    pub async fn execute(&self, job: &JobConfig) -> BackupRun {
        let mut run = BackupRun::start(&job.name, job.database_kind());
        info!(job = %job.name, run_id = %run.id, mode = %job.backup_mode, "Backup run started");

        let outcome = match self.store.save_or_update_history(&run).await {
            Ok(()) => self.perform(job).await,
            Err(e) => {
                error!(job = %job.name, run_id = %run.id, error = %e, "Failed to record run start");
                Err(e)
            }
        };

        match outcome {
            Ok(uploaded) => self.finish_success(&mut run, uploaded).await,
            Err(e) => self.finish_failure(&mut run, e).await,
        }
        run
    }

    async fn perform(&self, job: &JobConfig) -> Result<Uploaded> {
        let backup = self.backups.create(&job.database_connection_ref)?;
        backup
            .test_connection()
            .await
            .map_err(|e| at_stage("connection check", e))?;

        // Dropping `artifact` on any exit below removes the local file.
        let artifact = backup
            .run(job.backup_mode)
            .await
            .map_err(|e| at_stage("dump", e))?;
        let local_size = tokio::fs::metadata(artifact.path())
            .await
            .map_err(|e| {
                Error::backup(format!(
                    "failed to stat artifact {}: {e}",
                    artifact.path().display()
                ))
            })?
            .len();
        debug!(
            job = %job.name,
            path = %artifact.path().display(),
            size = local_size,
            "Artifact ready"
        );

        let folder = self
            .storage
            .find_or_create_folder(&folder_name(&job.name))
            .await
            .map_err(|e| at_stage("folder", e))?;
        let uploaded = self
            .storage
            .upload(artifact.path(), &folder)
            .await
            .map_err(|e| at_stage("upload", e))?;

        Ok(Uploaded {
            artifact: uploaded,
            local_size,
        })
    }

    async fn finish_success(&self, run: &mut BackupRun, uploaded: Uploaded) {
        let Uploaded {
            artifact,
            local_size,
        } = uploaded;
        let info = ArtifactInfo {
            name: artifact.name.clone(),
            id: artifact.id.clone(),
            size: local_size,
        };
        if let Err(e) = run.complete_success(info) {
            error!(run_id = %run.id, error = %e, "Run could not be completed");
            return;
        }
        self.persist(run).await;
        info!(
            job = %run.job_name,
            run_id = %run.id,
            artifact = %artifact.name,
            size = local_size,
            "Backup run succeeded"
        );

        let event = NotificationEvent::from_run(run, artifact.link);
        self.dispatcher.dispatch_success(&event).await;
    }

    async fn finish_failure(&self, run: &mut BackupRun, cause: Error) {
        if let Err(e) = run.fail(cause.to_string()) {
            error!(run_id = %run.id, error = %e, "Run could not be failed");
            return;
        }
        self.persist(run).await;
        warn!(job = %run.job_name, run_id = %run.id, error = %cause, "Backup run failed");

        let event = NotificationEvent::from_run(run, None);
        self.dispatcher.dispatch_failure(&event).await;
    }

    async fn persist(&self, run: &BackupRun) {
        if let Err(e) = self.store.save_or_update_history(run).await {
            error!(
                run_id = %run.id,
                status = %run.status,
                error = %e,
                "Failed to persist run outcome"
            );
        }
    }
}
