//! Google Drive storage.
//!
//! Folders are looked up by name with the files query API and created when
//! missing. Artifacts use the resumable upload protocol: a metadata POST opens
//! a session, then the file body is streamed to the returned `Location` with PUT.
//! The PUT runs under its own timeout so large dumps are not cut off by the
//! client-wide one.

use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use reqwest::{Client, StatusCode, header};
use serde::Deserialize;
use serde_json::json;
use tokio_util::io::ReaderStream;
use tracing::{debug, info};

use super::{ARTIFACT_EXTENSION, ArtifactRef, FolderRef, Storage, StoredFile};
use crate::auth::Auth;
use crate::{Error, Result};

const FOLDER_MIME_TYPE: &str = "application/vnd.google-apps.folder";
const ARTIFACT_MIME_TYPE: &str = "application/sql";

/// API roots, overridable for tests.
#[derive(Debug, Clone)]
pub struct DriveEndpoints {
    pub files_url: String,
    pub upload_url: String,
}

impl Default for DriveEndpoints {
    fn default() -> Self {
        Self {
            files_url: "https://www.googleapis.com/drive/v3/files".to_string(),
            upload_url: "https://www.googleapis.com/upload/drive/v3/files".to_string(),
        }
    }
}

#[derive(Debug, Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<DriveFile>,
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct DriveFile {
    id: String,
    name: String,
    /// Drive reports sizes as decimal strings.
    #[serde(default)]
    size: Option<String>,
    #[serde(default)]
    web_view_link: Option<String>,
    #[serde(default)]
    created_time: Option<DateTime<Utc>>,
}

impl DriveFile {
    fn size_bytes(&self) -> Option<u64> {
        self.size.as_deref().and_then(|s| s.parse().ok())
    }
}

/// Drive-backed [`Storage`].
pub struct DriveStorage {
    auth: Arc<dyn Auth>,
    client: Client,
    endpoints: DriveEndpoints,
    /// Applied to the upload PUT; `None` leaves the client's timeout.
    upload_timeout: Option<Duration>,
}

/// Quote a value for a Drive query string literal.
fn quote_query_value(value: &str) -> String {
    value.replace('\\', "\\\\").replace('\'', "\\'")
}

impl DriveStorage {
    pub fn new(auth: Arc<dyn Auth>, client: Client) -> Self {
        Self::with_endpoints(auth, client, DriveEndpoints::default())
    }

    pub fn with_endpoints(auth: Arc<dyn Auth>, client: Client, endpoints: DriveEndpoints) -> Self {
        Self {
            auth,
            client,
            endpoints,
            upload_timeout: None,
        }
    }

    /// Time allowed for streaming one artifact. Zero keeps the client's timeout.
    pub fn with_upload_timeout(mut self, timeout: Duration) -> Self {
        self.upload_timeout = (timeout > Duration::ZERO).then_some(timeout);
        self
    }

    async fn authorization(&self) -> Result<String> {
        Ok(self.auth.valid_credential().await?.authorization_header())
    }

    async fn check(response: reqwest::Response, action: &str) -> Result<reqwest::Response> {
        let status = response.status();
        if status.is_success() {
            return Ok(response);
        }
        let body = response.text().await.unwrap_or_default();
        Err(Error::storage(format!("{action} returned {status}: {body}")))
    }

    async fn find_folder(&self, name: &str) -> Result<Option<FolderRef>> {
        let query = format!(
            "name='{}' and mimeType='{}' and trashed=false",
            quote_query_value(name),
            FOLDER_MIME_TYPE
        );
        let response = self
            .client
            .get(&self.endpoints.files_url)
            .header(header::AUTHORIZATION, self.authorization().await?)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id, name)"),
                ("spaces", "drive"),
            ])
            .send()
            .await
            .map_err(|e| Error::storage(format!("folder lookup failed: {e}")))?;

        let list: FileList = Self::check(response, "folder lookup")
            .await?
            .json()
            .await
            .map_err(|e| Error::storage(format!("invalid folder lookup response: {e}")))?;

        Ok(list.files.into_iter().next().map(|f| FolderRef {
            id: f.id,
            name: f.name,
        }))
    }

    async fn create_folder(&self, name: &str) -> Result<FolderRef> {
        let response = self
            .client
            .post(&self.endpoints.files_url)
            .header(header::AUTHORIZATION, self.authorization().await?)
            .query(&[("fields", "id, name")])
            .json(&json!({ "name": name, "mimeType": FOLDER_MIME_TYPE }))
            .send()
            .await
            .map_err(|e| Error::storage(format!("folder creation failed: {e}")))?;

        let file: DriveFile = Self::check(response, "folder creation")
            .await?
            .json()
            .await
            .map_err(|e| Error::storage(format!("invalid folder creation response: {e}")))?;

        info!(folder = %file.name, id = %file.id, "Created Drive folder");
        Ok(FolderRef {
            id: file.id,
            name: file.name,
        })
    }
}

#[async_trait]
impl Storage for DriveStorage {
    async fn find_or_create_folder(&self, name: &str) -> Result<FolderRef> {
        if let Some(folder) = self.find_folder(name).await? {
            debug!(folder = %folder.name, id = %folder.id, "Found Drive folder");
            return Ok(folder);
        }
        self.create_folder(name).await
    }

    async fn upload(&self, path: &Path, folder: &FolderRef) -> Result<ArtifactRef> {
        let file_name = path
            .file_name()
            .and_then(|n| n.to_str())
            .ok_or_else(|| Error::storage(format!("invalid artifact path {}", path.display())))?
            .to_string();
        let file = tokio::fs::File::open(path)
            .await
            .map_err(|e| Error::storage(format!("failed to open {}: {e}", path.display())))?;
        let length = file
            .metadata()
            .await
            .map_err(|e| Error::storage(format!("failed to stat {}: {e}", path.display())))?
            .len();

        let authorization = self.authorization().await?;

        let session = self
            .client
            .post(&self.endpoints.upload_url)
            .header(header::AUTHORIZATION, &authorization)
            .header("X-Upload-Content-Type", ARTIFACT_MIME_TYPE)
            .header("X-Upload-Content-Length", length)
            .query(&[
                ("uploadType", "resumable"),
                ("fields", "id, name, size, webViewLink"),
            ])
            .json(&json!({ "name": file_name, "parents": [folder.id] }))
            .send()
            .await
            .map_err(|e| Error::storage(format!("upload session request failed: {e}")))?;
        let session = Self::check(session, "upload session").await?;

        let location = session
            .headers()
            .get(header::LOCATION)
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| Error::storage("upload session response has no Location header"))?
            .to_string();

        let mut request = self
            .client
            .put(&location)
            .header(header::AUTHORIZATION, &authorization)
            .header(header::CONTENT_TYPE, ARTIFACT_MIME_TYPE)
            .header(header::CONTENT_LENGTH, length)
            .body(reqwest::Body::wrap_stream(ReaderStream::new(file)));
        if let Some(timeout) = self.upload_timeout {
            request = request.timeout(timeout);
        }
        let response = request
            .send()
            .await
            .map_err(|e| Error::storage(format!("upload failed: {e}")))?;

        let uploaded: DriveFile = Self::check(response, "upload")
            .await?
            .json()
            .await
            .map_err(|e| Error::storage(format!("invalid upload response: {e}")))?;

        let size = uploaded.size_bytes().unwrap_or(length);

        info!(file = %uploaded.name, id = %uploaded.id, size, "Uploaded artifact to Drive");
        Ok(ArtifactRef {
            id: uploaded.id,
            name: uploaded.name,
            size,
            link: uploaded.web_view_link,
        })
    }

    async fn list_files(&self, folder_id: Option<&str>, limit: u32) -> Result<Vec<StoredFile>> {
        let mut query = format!("name contains '{ARTIFACT_EXTENSION}' and trashed=false");
        if let Some(folder_id) = folder_id {
            query.push_str(&format!(" and '{}' in parents", quote_query_value(folder_id)));
        }
        let page_size = limit.clamp(1, 1000).to_string();

        let response = self
            .client
            .get(&self.endpoints.files_url)
            .header(header::AUTHORIZATION, self.authorization().await?)
            .query(&[
                ("q", query.as_str()),
                ("fields", "files(id, name, size, createdTime, webViewLink)"),
                ("orderBy", "createdTime desc"),
                ("pageSize", page_size.as_str()),
            ])
            .send()
            .await
            .map_err(|e| Error::storage(format!("file listing failed: {e}")))?;

        let list: FileList = Self::check(response, "file listing")
            .await?
            .json()
            .await
            .map_err(|e| Error::storage(format!("invalid file listing response: {e}")))?;

        Ok(list
            .files
            .into_iter()
            .map(|file| StoredFile {
                size: file.size_bytes(),
                id: file.id,
                name: file.name,
                created_at: file.created_time,
                link: file.web_view_link,
            })
            .collect())
    }

    async fn delete_file(&self, id: &str) -> Result<()> {
        let url = format!("{}/{}", self.endpoints.files_url, urlencoding::encode(id));
        let response = self
            .client
            .delete(&url)
            .header(header::AUTHORIZATION, self.authorization().await?)
            .send()
            .await
            .map_err(|e| Error::storage(format!("file deletion failed: {e}")))?;

        if response.status() == StatusCode::NOT_FOUND {
            return Err(Error::not_found("DriveFile", id));
        }
        Self::check(response, "file deletion").await?;
        info!(id, "Deleted Drive file");
        Ok(())
    }
}
