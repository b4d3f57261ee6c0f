//! ============================================================================
//! Remote Module - Per-user save file in a Drive folder
//! ============================================================================
//! `RemoteFileStore` is the capability the persistence layer needs from a
//! remote store: list by query, read content, create, update.
//! `DriveClient` implements it against Google Drive v3.
//! ============================================================================

mod drive;
#[cfg(test)]
pub(crate) mod fake;

pub use drive::DriveClient;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::types::CollectionResult;

/// Reserved name of the save file inside the selected folder
pub const USER_SAVE_FILENAME: &str = "chiikawa_user_save.json";

/// Existence check: parent folder AND exact name AND not trashed
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileQuery {
    pub parent: String,
    pub name: String,
    pub trashed: bool,
}

impl FileQuery {
    pub fn save_file_in(folder_id: &str) -> Self {
        Self {
            parent: folder_id.to_string(),
            name: USER_SAVE_FILENAME.to_string(),
            trashed: false,
        }
    }

    /// Render as a Drive `q` expression
    pub fn to_drive_query(&self) -> String {
        format!(
            "'{}' in parents and name = '{}' and trashed = {}",
            escape_literal(&self.parent),
            escape_literal(&self.name),
            self.trashed
        )
    }
}

fn escape_literal(s: &str) -> String {
    s.replace('\\', "\\\\").replace('\'', "\\'")
}

/// File handle returned by list/create
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct RemoteFile {
    pub id: String,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub modified_time: Option<String>,
}

/// Metadata part of a multipart upload
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FileMetadata {
    pub name: String,
    pub mime_type: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub parents: Vec<String>,
}

impl FileMetadata {
    pub fn json_file(name: &str, parent: &str) -> Self {
        Self {
            name: name.to_string(),
            mime_type: "application/json".to_string(),
            parents: vec![parent.to_string()],
        }
    }

    /// Metadata for rewriting an existing file; Drive rejects `parents` on update
    pub fn json_update(name: &str) -> Self {
        Self {
            name: name.to_string(),
            mime_type: "application/json".to_string(),
            parents: Vec::new(),
        }
    }
}

/// Remote store operations, all requiring a valid bearer credential
#[async_trait]
pub trait RemoteFileStore: Send + Sync {
    /// Matching files, newest first
    async fn list(&self, query: &FileQuery) -> CollectionResult<Vec<RemoteFile>>;

    async fn get_content(&self, file_id: &str) -> CollectionResult<String>;

    async fn create(&self, metadata: &FileMetadata, content: &str) -> CollectionResult<RemoteFile>;

    async fn update(&self, file_id: &str, metadata: &FileMetadata, content: &str) -> CollectionResult<()>;
}
