//! Database backup producers.
//!
//! A [`Backup`] turns one database into a local artifact file. The
//! [`BackupFactory`] picks the implementation from the connection URL scheme.

pub mod mysql;

pub use mysql::{MysqlBackup, MysqlTarget};

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tempfile::TempDir;
use tracing::{debug, warn};

use crate::domain::{BackupMode, database_kind_of};
use crate::{Error, Result};

/// Produces a backup artifact for one database.
#[async_trait]
pub trait Backup: Send + Sync {
    /// Database kind, e.g. `mysql`.
    fn database_kind(&self) -> &str;

    /// Check that the database is reachable with the configured credentials.
    async fn test_connection(&self) -> Result<()>;

    /// Write an artifact for `mode`.
    async fn run(&self, mode: BackupMode) -> Result<BackupArtifact>;
}

/// A local artifact awaiting upload.
///
/// Dropping it removes the file, and the per-run scratch directory holding it
/// if there is one.
#[derive(Debug)]
pub struct BackupArtifact {
    path: PathBuf,
    _scratch: Option<TempDir>,
}

impl BackupArtifact {
    /// An artifact at a caller-chosen path.
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self {
            path: path.into(),
            _scratch: None,
        }
    }

    /// An artifact named `file_name` inside its own scratch directory.
    pub fn in_scratch_dir(scratch: TempDir, file_name: &str) -> Self {
        Self {
            path: scratch.path().join(file_name),
            _scratch: Some(scratch),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for BackupArtifact {
    fn drop(&mut self) {
        match std::fs::remove_file(&self.path) {
            Ok(()) => debug!(path = %self.path.display(), "Removed temporary artifact"),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
            Err(e) => warn!(
                path = %self.path.display(),
                error = %e,
                "Failed to remove temporary artifact"
            ),
        }
        // The scratch directory goes when `_scratch` drops.
    }
}

/// Creates a [`Backup`] for a connection reference.
pub trait BackupFactory: Send + Sync {
    fn create(&self, connection_ref: &str) -> Result<Box<dyn Backup>>;
}

/// Settings shared by the built-in backup implementations.
#[derive(Debug, Clone)]
pub struct BackupSettings {
    /// Directory for artifacts awaiting upload.
    pub temp_dir: PathBuf,
    /// Upper bound for one dump.
    pub dump_timeout: Duration,
    /// Upper bound for the connectivity check.
    pub connect_timeout: Duration,
}

impl Default for BackupSettings {
    fn default() -> Self {
        Self {
            temp_dir: std::env::temp_dir().join("db-backups"),
            dump_timeout: Duration::from_secs(60 * 60),
            connect_timeout: Duration::from_secs(10),
        }
    }
}

/// Factory dispatching on the URL scheme.
#[derive(Debug, Clone, Default)]
pub struct DefaultBackupFactory {
    settings: BackupSettings,
}

impl DefaultBackupFactory {
    pub fn new(settings: BackupSettings) -> Self {
        Self { settings }
    }
}

impl BackupFactory for DefaultBackupFactory {
    fn create(&self, connection_ref: &str) -> Result<Box<dyn Backup>> {
        match database_kind_of(connection_ref)?.as_str() {
            "mysql" => Ok(Box::new(MysqlBackup::new(
                connection_ref,
                self.settings.clone(),
            )?)),
            other => Err(Error::validation(format!(
                "unsupported database type: {other}"
            ))),
        }
    }
}
