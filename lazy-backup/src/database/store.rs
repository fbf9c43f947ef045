//! Configuration and history store.

use async_trait::async_trait;
use chrono::Utc;
use sqlx::SqlitePool;

use super::models::{
    BackupConfigDbModel, BackupHistoryDbModel, NotificationConfigDbModel, OAuthTokenDbModel,
};
use crate::domain::{BackupRun, ChannelConfig, JobConfig, OAuthToken};
use crate::{Error, Result};

/// Persistence for jobs, run history and notification channels.
#[async_trait]
pub trait ConfigStore: Send + Sync {
    // Jobs
    async fn list_jobs(&self) -> Result<Vec<JobConfig>>;
    async fn list_enabled_jobs(&self) -> Result<Vec<JobConfig>>;
    async fn get_job(&self, name: &str) -> Result<JobConfig>;
    async fn create_job(&self, job: &JobConfig) -> Result<()>;
    async fn update_job(&self, job: &JobConfig) -> Result<()>;
    async fn delete_job(&self, name: &str) -> Result<()>;

    // History
    /// Insert the run, or overwrite the row with the same id.
    async fn save_or_update_history(&self, run: &BackupRun) -> Result<()>;
    async fn get_history(&self, id: &str) -> Result<BackupRun>;
    /// Newest first.
    async fn list_history(&self, limit: u32, offset: u32) -> Result<Vec<BackupRun>>;
    /// Newest first.
    async fn list_history_for_job(&self, job_name: &str) -> Result<Vec<BackupRun>>;

    // Channels
    async fn list_channels(&self) -> Result<Vec<ChannelConfig>>;
    async fn list_enabled_channels(&self) -> Result<Vec<ChannelConfig>>;
    async fn get_channel(&self, name: &str) -> Result<ChannelConfig>;
    /// Insert or replace by name.
    async fn save_channel(&self, channel: &ChannelConfig) -> Result<()>;
    async fn delete_channel(&self, name: &str) -> Result<()>;

    // OAuth tokens
    async fn get_token(&self, client_id: &str) -> Result<Option<OAuthToken>>;
    /// Insert or replace by client id.
    async fn save_token(&self, token: &OAuthToken) -> Result<()>;
}

/// SQLx implementation of ConfigStore.
pub struct SqlxConfigStore {
    pool: SqlitePool,
}

impl SqlxConfigStore {
    pub fn new(pool: SqlitePool) -> Self {
        Self { pool }
    }
}

fn jobs_from_rows(rows: Vec<BackupConfigDbModel>) -> Result<Vec<JobConfig>> {
    rows.into_iter().map(BackupConfigDbModel::into_domain).collect()
}

fn runs_from_rows(rows: Vec<BackupHistoryDbModel>) -> Result<Vec<BackupRun>> {
    rows.into_iter().map(BackupHistoryDbModel::into_domain).collect()
}

fn channels_from_rows(rows: Vec<NotificationConfigDbModel>) -> Result<Vec<ChannelConfig>> {
    rows.into_iter()
        .map(NotificationConfigDbModel::into_domain)
        .collect()
}

#[async_trait]
impl ConfigStore for SqlxConfigStore {
    async fn list_jobs(&self) -> Result<Vec<JobConfig>> {
        let rows = sqlx::query_as::<_, BackupConfigDbModel>(
            "SELECT * FROM backup_config ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        jobs_from_rows(rows)
    }

    async fn list_enabled_jobs(&self) -> Result<Vec<JobConfig>> {
        let rows = sqlx::query_as::<_, BackupConfigDbModel>(
            "SELECT * FROM backup_config WHERE enabled = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        jobs_from_rows(rows)
    }

    async fn get_job(&self, name: &str) -> Result<JobConfig> {
        sqlx::query_as::<_, BackupConfigDbModel>("SELECT * FROM backup_config WHERE name = ?")
            .bind(name)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("BackupConfig", name))?
            .into_domain()
    }

    async fn create_job(&self, job: &JobConfig) -> Result<()> {
        let row = BackupConfigDbModel::from_domain(job);
        let result = sqlx::query(
            r#"
            INSERT INTO backup_config
                (name, cron_expression, backup_mode, database_connection_ref, enabled, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO NOTHING
            "#,
        )
        .bind(&row.name)
        .bind(&row.cron_expression)
        .bind(&row.backup_mode)
        .bind(&row.database_connection_ref)
        .bind(row.enabled)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::validation(format!(
                "a job named '{}' already exists",
                job.name
            )));
        }
        Ok(())
    }

    async fn update_job(&self, job: &JobConfig) -> Result<()> {
        let result = sqlx::query(
            r#"
            UPDATE backup_config SET
                cron_expression = ?,
                backup_mode = ?,
                database_connection_ref = ?,
                enabled = ?,
                updated_at = ?
            WHERE name = ?
            "#,
        )
        .bind(&job.cron_expression)
        .bind(job.backup_mode.as_str())
        .bind(&job.database_connection_ref)
        .bind(job.enabled)
        .bind(Utc::now().to_rfc3339())
        .bind(&job.name)
        .execute(&self.pool)
        .await?;

        if result.rows_affected() == 0 {
            return Err(Error::not_found("BackupConfig", &job.name));
        }
        Ok(())
    }

    async fn delete_job(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM backup_config WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn save_or_update_history(&self, run: &BackupRun) -> Result<()> {
        let row = BackupHistoryDbModel::from_domain(run);
        sqlx::query(
            r#"
            INSERT INTO backup_history
                (id, job_name, database_kind, status, started_at, completed_at,
                 artifact_name, artifact_id, artifact_size, error_message)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(id) DO UPDATE SET
                status = excluded.status,
                completed_at = excluded.completed_at,
                artifact_name = excluded.artifact_name,
                artifact_id = excluded.artifact_id,
                artifact_size = excluded.artifact_size,
                error_message = excluded.error_message
            "#,
        )
        .bind(&row.id)
        .bind(&row.job_name)
        .bind(&row.database_kind)
        .bind(&row.status)
        .bind(&row.started_at)
        .bind(&row.completed_at)
        .bind(&row.artifact_name)
        .bind(&row.artifact_id)
        .bind(row.artifact_size)
        .bind(&row.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_history(&self, id: &str) -> Result<BackupRun> {
        sqlx::query_as::<_, BackupHistoryDbModel>("SELECT * FROM backup_history WHERE id = ?")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?
            .ok_or_else(|| Error::not_found("BackupHistory", id))?
            .into_domain()
    }

    async fn list_history(&self, limit: u32, offset: u32) -> Result<Vec<BackupRun>> {
        let rows = sqlx::query_as::<_, BackupHistoryDbModel>(
            "SELECT * FROM backup_history ORDER BY started_at DESC LIMIT ? OFFSET ?",
        )
        .bind(limit as i64)
        .bind(offset as i64)
        .fetch_all(&self.pool)
        .await?;
        runs_from_rows(rows)
    }

    async fn list_history_for_job(&self, job_name: &str) -> Result<Vec<BackupRun>> {
        let rows = sqlx::query_as::<_, BackupHistoryDbModel>(
            "SELECT * FROM backup_history WHERE job_name = ? ORDER BY started_at DESC",
        )
        .bind(job_name)
        .fetch_all(&self.pool)
        .await?;
        runs_from_rows(rows)
    }

    async fn list_channels(&self) -> Result<Vec<ChannelConfig>> {
        let rows = sqlx::query_as::<_, NotificationConfigDbModel>(
            "SELECT * FROM notification_config ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        channels_from_rows(rows)
    }

    async fn list_enabled_channels(&self) -> Result<Vec<ChannelConfig>> {
        let rows = sqlx::query_as::<_, NotificationConfigDbModel>(
            "SELECT * FROM notification_config WHERE enabled = 1 ORDER BY name",
        )
        .fetch_all(&self.pool)
        .await?;
        channels_from_rows(rows)
    }

    async fn get_channel(&self, name: &str) -> Result<ChannelConfig> {
        sqlx::query_as::<_, NotificationConfigDbModel>(
            "SELECT * FROM notification_config WHERE name = ?",
        )
        .bind(name)
        .fetch_optional(&self.pool)
        .await?
        .ok_or_else(|| Error::not_found("NotificationConfig", name))?
        .into_domain()
    }

    async fn save_channel(&self, channel: &ChannelConfig) -> Result<()> {
        let row = NotificationConfigDbModel::from_domain(channel)?;
        sqlx::query(
            r#"
            INSERT INTO notification_config
                (name, channel_kind, settings, enabled, notify_on_success, notify_on_error, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(name) DO UPDATE SET
                channel_kind = excluded.channel_kind,
                settings = excluded.settings,
                enabled = excluded.enabled,
                notify_on_success = excluded.notify_on_success,
                notify_on_error = excluded.notify_on_error,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.name)
        .bind(&row.channel_kind)
        .bind(&row.settings)
        .bind(row.enabled)
        .bind(row.notify_on_success)
        .bind(row.notify_on_error)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn delete_channel(&self, name: &str) -> Result<()> {
        sqlx::query("DELETE FROM notification_config WHERE name = ?")
            .bind(name)
            .execute(&self.pool)
            .await?;
        Ok(())
    }

    async fn get_token(&self, client_id: &str) -> Result<Option<OAuthToken>> {
        sqlx::query_as::<_, OAuthTokenDbModel>("SELECT * FROM oauth_token WHERE client_id = ?")
            .bind(client_id)
            .fetch_optional(&self.pool)
            .await?
            .map(OAuthTokenDbModel::into_domain)
            .transpose()
    }

    async fn save_token(&self, token: &OAuthToken) -> Result<()> {
        let row = OAuthTokenDbModel::from_domain(token);
        sqlx::query(
            r#"
            INSERT INTO oauth_token
                (client_id, access_token, refresh_token, token_type, expires_at, created_at, updated_at)
            VALUES (?, ?, ?, ?, ?, ?, ?)
            ON CONFLICT(client_id) DO UPDATE SET
                access_token = excluded.access_token,
                refresh_token = excluded.refresh_token,
                token_type = excluded.token_type,
                expires_at = excluded.expires_at,
                updated_at = excluded.updated_at
            "#,
        )
        .bind(&row.client_id)
        .bind(&row.access_token)
        .bind(&row.refresh_token)
        .bind(&row.token_type)
        .bind(&row.expires_at)
        .bind(&row.created_at)
        .bind(&row.updated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }
}
