use async_trait::async_trait;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Mutex;

use super::{FileMetadata, FileQuery, RemoteFile, RemoteFileStore};
use crate::types::{CollectionError, CollectionResult};

#[derive(Debug, Clone)]
pub(crate) struct StoredFile {
    pub id: String,
    pub name: String,
    pub parent: String,
    pub content: String,
}

/// In-memory remote store; newest file is listed first
#[derive(Default)]
pub(crate) struct FakeFileStore {
    pub files: Mutex<Vec<StoredFile>>,
    pub fail_reads: AtomicBool,
    pub fail_writes: AtomicBool,
    pub creates: AtomicUsize,
    pub updates: AtomicUsize,
}

impl FakeFileStore {
    pub fn with_file(parent: &str, name: &str, content: &str) -> Self {
        let store = Self::default();
        store.insert(parent, name, content);
        store
    }

    pub fn insert(&self, parent: &str, name: &str, content: &str) -> String {
        let mut files = self.files.lock().unwrap();
        let id = format!("file-{}", files.len() + 1);
        files.push(StoredFile {
            id: id.clone(),
            name: name.to_string(),
            parent: parent.to_string(),
            content: content.to_string(),
        });
        id
    }

    pub fn content_of(&self, id: &str) -> Option<String> {
        self.files
            .lock()
            .unwrap()
            .iter()
            .find(|f| f.id == id)
            .map(|f| f.content.clone())
    }
}

#[async_trait]
impl RemoteFileStore for FakeFileStore {
    async fn list(&self, query: &FileQuery) -> CollectionResult<Vec<RemoteFile>> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CollectionError::Network("offline".into()));
        }
        let files = self.files.lock().unwrap();
        Ok(files
            .iter()
            .rev()
            .filter(|f| f.parent == query.parent && f.name == query.name)
            .map(|f| RemoteFile {
                id: f.id.clone(),
                name: Some(f.name.clone()),
                modified_time: None,
            })
            .collect())
    }

    async fn get_content(&self, file_id: &str) -> CollectionResult<String> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(CollectionError::Network("offline".into()));
        }
        self.content_of(file_id).ok_or(CollectionError::Remote {
            status: 404,
            message: "not found".into(),
        })
    }

    async fn create(&self, metadata: &FileMetadata, content: &str) -> CollectionResult<RemoteFile> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CollectionError::Remote {
                status: 500,
                message: "create failed".into(),
            });
        }
        self.creates.fetch_add(1, Ordering::SeqCst);
        let parent = metadata.parents.first().cloned().unwrap_or_default();
        let id = self.insert(&parent, &metadata.name, content);
        Ok(RemoteFile {
            id,
            name: Some(metadata.name.clone()),
            modified_time: None,
        })
    }

    async fn update(&self, file_id: &str, metadata: &FileMetadata, content: &str) -> CollectionResult<()> {
        if self.fail_writes.load(Ordering::SeqCst) {
            return Err(CollectionError::Remote {
                status: 500,
                message: "update failed".into(),
            });
        }
        if !metadata.parents.is_empty() {
            return Err(CollectionError::Remote {
                status: 403,
                message: "parents is not directly writable".into(),
            });
        }
        self.updates.fetch_add(1, Ordering::SeqCst);
        let mut files = self.files.lock().unwrap();
        let file = files
            .iter_mut()
            .find(|f| f.id == file_id)
            .ok_or(CollectionError::Remote {
                status: 404,
                message: "not found".into(),
            })?;
        file.name = metadata.name.clone();
        file.content = content.to_string();
        Ok(())
    }
}
