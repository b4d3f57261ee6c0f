//! ============================================================================
//! Drive Client - Google Drive v3 file operations
//! ============================================================================
//! Lists, downloads, creates and updates the JSON save file using a bearer
//! access token. Uploads use multipart requests (metadata + content).
//! ============================================================================

use async_trait::async_trait;
use reqwest::multipart::{Form, Part};
use serde::Deserialize;
use std::time::Duration;
use tracing::{debug, error, info};

use super::{FileMetadata, FileQuery, RemoteFile, RemoteFileStore};
use crate::types::{CollectionError, CollectionResult};

/// Drive metadata API base URL
const DRIVE_API: &str = "https://www.googleapis.com/drive/v3";
/// Drive upload API base URL
const DRIVE_UPLOAD_API: &str = "https://www.googleapis.com/upload/drive/v3";

#[derive(Deserialize)]
struct FileList {
    #[serde(default)]
    files: Vec<RemoteFile>,
}

/// Drive-backed remote store bound to one access token
pub struct DriveClient {
    client: reqwest::Client,
    token: String,
    api_base: String,
    upload_base: String,
}

impl DriveClient {
    pub fn new(token: String, timeout: Duration) -> Self {
        Self::with_base_urls(token, timeout, DRIVE_API, DRIVE_UPLOAD_API)
    }

    pub fn with_base_urls(token: String, timeout: Duration, api_base: &str, upload_base: &str) -> Self {
        let client = reqwest::Client::builder()
            .user_agent("gotochi-tracker/1.0")
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| reqwest::Client::new());

        Self {
            client,
            token,
            api_base: api_base.trim_end_matches('/').to_string(),
            upload_base: upload_base.trim_end_matches('/').to_string(),
        }
    }

    /// Drive multipart uploads need the metadata part first, then the media
    fn upload_form(metadata: &FileMetadata, content: &str) -> CollectionResult<Form> {
        let meta_json = serde_json::to_string(metadata)?;
        let file = Part::text(content.to_string()).mime_str("application/json")?;
        Ok(Form::new()
            .part("metadata", Part::text(meta_json).mime_str("application/json")?)
            .part("file", file))
    }

    async fn check(response: reqwest::Response, what: &str) -> CollectionResult<reqwest::Response> {
        if response.status().is_success() {
            return Ok(response);
        }
        let status = response.status();
        let body = response.text().await.unwrap_or_default();
        error!("Drive {} failed: {} - {}", what, status, body);
        Err(CollectionError::Remote {
            status: status.as_u16(),
            message: format!("{} failed: {}", what, body),
        })
    }
}

#[async_trait]
impl RemoteFileStore for DriveClient {
    async fn list(&self, query: &FileQuery) -> CollectionResult<Vec<RemoteFile>> {
        let q = query.to_drive_query();
        debug!("Drive list: {}", q);

        let response = self
            .client
            .get(format!("{}/files", self.api_base))
            .bearer_auth(&self.token)
            .query(&[
                ("q", q.as_str()),
                ("fields", "files(id,name,modifiedTime)"),
                ("orderBy", "modifiedTime desc"),
            ])
            .send()
            .await?;

        let list: FileList = Self::check(response, "list").await?.json().await?;
        Ok(list.files)
    }

    async fn get_content(&self, file_id: &str) -> CollectionResult<String> {
        debug!("Drive download: {}", file_id);

        let response = self
            .client
            .get(format!("{}/files/{}", self.api_base, file_id))
            .bearer_auth(&self.token)
            .query(&[("alt", "media")])
            .send()
            .await?;

        Ok(Self::check(response, "download").await?.text().await?)
    }

    async fn create(&self, metadata: &FileMetadata, content: &str) -> CollectionResult<RemoteFile> {
        info!("Creating {} in Drive", metadata.name);

        let response = self
            .client
            .post(format!("{}/files", self.upload_base))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "multipart")])
            .multipart(Self::upload_form(metadata, content)?)
            .send()
            .await?;

        let file: RemoteFile = Self::check(response, "create").await?.json().await?;
        info!("Created Drive file {}", file.id);
        Ok(file)
    }

    async fn update(&self, file_id: &str, metadata: &FileMetadata, content: &str) -> CollectionResult<()> {
        debug!("Updating Drive file {}", file_id);

        let response = self
            .client
            .patch(format!("{}/files/{}", self.upload_base, file_id))
            .bearer_auth(&self.token)
            .query(&[("uploadType", "multipart")])
            .multipart(Self::upload_form(metadata, content)?)
            .send()
            .await?;

        Self::check(response, "update").await?;
        Ok(())
    }
}
