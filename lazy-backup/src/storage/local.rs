//! Filesystem storage: folders are directories under a root.

use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use tracing::debug;
use url::Url;

use super::{ARTIFACT_EXTENSION, ArtifactRef, FolderRef, Storage, StoredFile};
use crate::{Error, Result};

pub struct LocalStorage {
    root: PathBuf,
}

impl LocalStorage {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn folder_path(&self, name: &str) -> Result<PathBuf> {
        if name.is_empty()
            || name == "."
            || name == ".."
            || name.contains(['/', '\\'])
        {
            return Err(Error::storage(format!("invalid folder name '{name}'")));
        }
        Ok(self.root.join(name))
    }

    /// Artifacts directly inside one folder directory.
    async fn files_in(&self, folder: &str) -> Result<Vec<StoredFile>> {
        let dir = self.folder_path(folder)?;
        let mut entries = match tokio::fs::read_dir(&dir).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => {
                return Err(Error::storage(format!("failed to list {}: {e}", dir.display())));
            }
        };

        let mut files = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            let name = entry.file_name().to_string_lossy().to_string();
            let metadata = entry.metadata().await?;
            if !metadata.is_file() || !name.contains(ARTIFACT_EXTENSION) {
                continue;
            }
            files.push(StoredFile {
                id: format!("{folder}/{name}"),
                link: Url::from_file_path(entry.path()).ok().map(|u| u.to_string()),
                size: Some(metadata.len()),
                created_at: metadata.modified().ok().map(DateTime::<Utc>::from),
                name,
            });
        }
        Ok(files)
    }

    async fn folder_names(&self) -> Result<Vec<String>> {
        let mut entries = match tokio::fs::read_dir(&self.root).await {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(Vec::new()),
            Err(e) => return Err(e.into()),
        };
        let mut names = Vec::new();
        while let Some(entry) = entries.next_entry().await? {
            if entry.file_type().await?.is_dir() {
                names.push(entry.file_name().to_string_lossy().to_string());
            }
        }
        Ok(names)
    }
}

#[async_trait]
impl Storage for LocalStorage {
    async fn find_or_create_folder(&self, name: &str) -> Result<FolderRef> {
        let path = self.folder_path(name)?;
        tokio::fs::create_dir_all(&path)
            .await
            .map_err(|e| Error::storage(format!("failed to create {}: {e}", path.display())))?;
        Ok(FolderRef {
            id: name.to_string(),
            name: name.to_string(),
        })
    }

    async fn upload(&self, path: &Path, folder: &FolderRef) -> Result<ArtifactRef> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::storage(format!("invalid artifact path {}", path.display())))?
            .to_string();

        let dest_dir = self.folder_path(&folder.id)?;
        let dest = dest_dir.join(&file_name);
        let size = tokio::fs::copy(path, &dest)
            .await
            .map_err(|e| Error::storage(format!("failed to copy to {}: {e}", dest.display())))?;

        let link = tokio::fs::canonicalize(&dest)
            .await
            .ok()
            .and_then(|abs| Url::from_file_path(abs).ok())
            .map(|u| u.to_string());

        debug!(dest = %dest.display(), size, "Artifact stored locally");
        Ok(ArtifactRef {
            id: format!("{}/{}", folder.id, file_name),
            name: file_name,
            size,
            link,
        })
    }

    async fn list_files(&self, folder_id: Option<&str>, limit: u32) -> Result<Vec<StoredFile>> {
        let folders = match folder_id {
            Some(folder) => vec![folder.to_string()],
            None => self.folder_names().await?,
        };
        let mut files = Vec::new();
        for folder in &folders {
            files.extend(self.files_in(folder).await?);
        }
        files.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        files.truncate(limit as usize);
        Ok(files)
    }

    /// `id` is `<folder>/<file>` as produced by `upload` and `list_files`.
    async fn delete_file(&self, id: &str) -> Result<()> {
        let (folder, name) = id
            .split_once('/')
            .ok_or_else(|| Error::storage(format!("invalid local file id '{id}'")))?;
        let path = self.folder_path(folder)?;
        // The file name gets the same checks as a folder name.
        self.folder_path(name)?;

        match tokio::fs::remove_file(path.join(name)).await {
            Ok(()) => {
                debug!(id, "Local artifact deleted");
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                Err(Error::not_found("LocalFile", id))
            }
            Err(e) => Err(Error::storage(format!("failed to delete {id}: {e}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_folder_and_upload() {
        let root = tempfile::tempdir().unwrap();
        let src_dir = tempfile::tempdir().unwrap();
        let src = src_dir.path().join("app_backup.sql");
        std::fs::write(&src, b"CREATE TABLE t (id INT);").unwrap();

        let storage = LocalStorage::new(root.path());
        let folder = storage.find_or_create_folder("DB Backups - app").await.unwrap();
        let again = storage.find_or_create_folder("DB Backups - app").await.unwrap();
        assert_eq!(folder, again);

        let artifact = storage.upload(&src, &folder).await.unwrap();
        assert_eq!(artifact.name, "app_backup.sql");
        assert_eq!(artifact.size, 24);
        assert!(artifact.link.unwrap().starts_with("file://"));
        assert!(root.path().join("DB Backups - app/app_backup.sql").exists());
        // Source is left for the caller to clean up.
        assert!(src.exists());
    }

    #[tokio::test]
    async fn test_rejects_path_like_folder_names() {
        let root = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(root.path());
        assert!(storage.find_or_create_folder("../escape").await.is_err());
        assert!(storage.find_or_create_folder("").await.is_err());
    }

    #[tokio::test]
    async fn test_list_and_delete_files() {
        let root = tempfile::tempdir().unwrap();
        let storage = LocalStorage::new(root.path());
        for (folder, file) in [
            ("DB Backups - app", "app_full_20240101_020000.sql"),
            ("DB Backups - app", "notes.txt"),
            ("DB Backups - crm", "crm_full_20240101_030000.sql"),
        ] {
            std::fs::create_dir_all(root.path().join(folder)).unwrap();
            std::fs::write(root.path().join(folder).join(file), b"--").unwrap();
        }

        let all = storage.list_files(None, 10).await.unwrap();
        assert_eq!(all.len(), 2);
        assert!(all.iter().all(|f| f.name.ends_with(".sql")));

        let app = storage.list_files(Some("DB Backups - app"), 10).await.unwrap();
        assert_eq!(app.len(), 1);
        assert_eq!(app[0].id, "DB Backups - app/app_full_20240101_020000.sql");
        assert_eq!(app[0].size, Some(2));
        assert_eq!(storage.list_files(None, 1).await.unwrap().len(), 1);
        assert!(storage.list_files(Some("missing"), 10).await.unwrap().is_empty());

        storage.delete_file(&app[0].id).await.unwrap();
        assert!(storage.list_files(Some("DB Backups - app"), 10).await.unwrap().is_empty());
        assert!(matches!(
            storage.delete_file(&app[0].id).await,
            Err(Error::NotFound { .. })
        ));
        assert!(storage.delete_file("DB Backups - app/../../etc").await.is_err());
    }
}
