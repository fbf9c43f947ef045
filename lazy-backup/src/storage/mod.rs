//! Artifact destinations.

pub mod drive;
pub mod local;

pub use drive::{DriveEndpoints, DriveStorage};
pub use local::LocalStorage;

use std::path::Path;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::{Error, Result};

/// Artifacts are recognised by this extension when listing.
pub const ARTIFACT_EXTENSION: &str = ".sql";

/// A destination folder.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderRef {
    pub id: String,
    pub name: String,
}

/// An uploaded artifact.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ArtifactRef {
    pub id: String,
    pub name: String,
    pub size: u64,
    /// Browser link, if the backend has one.
    pub link: Option<String>,
}

/// An artifact already in storage.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredFile {
    pub id: String,
    pub name: String,
    pub size: Option<u64>,
    pub created_at: Option<DateTime<Utc>>,
    pub link: Option<String>,
}

/// Remote (or local) storage for backup artifacts.
#[async_trait]
pub trait Storage: Send + Sync {
    /// Find a folder by name, creating it if missing.
    ///
    /// Lookup and creation are separate calls, so two concurrent first runs may
    /// create duplicate folders on backends that allow them.
    async fn find_or_create_folder(&self, name: &str) -> Result<FolderRef>;

    /// Upload a local file into `folder`.
    async fn upload(&self, path: &Path, folder: &FolderRef) -> Result<ArtifactRef>;

    /// Artifacts in the folder with id `folder_id` (all folders for `None`),
    /// newest first, at most `limit`.
    async fn list_files(&self, _folder_id: Option<&str>, _limit: u32) -> Result<Vec<StoredFile>> {
        Err(Error::storage("listing is not supported by this backend"))
    }

    async fn delete_file(&self, _id: &str) -> Result<()> {
        Err(Error::storage("deletion is not supported by this backend"))
    }
}
