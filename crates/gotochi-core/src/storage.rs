//! ============================================================================
//! Persistence Arbiter - Local vs remote storage of the ownership overlay
//! ============================================================================
//! Remote storage is used only when the user is signed in (a remote store is
//! attached) AND a folder is selected; everything else goes to the local slot.
//!
//! `load_overlay_checked` reports a failed remote read so callers can keep the
//! overlay they already hold. `load_overlay` degrades any failure to an empty
//! overlay, so its empty result may be stale rather than "owns nothing".
//! Writes report their error to the caller, which logs it; the in-memory
//! overlay is left as is.
//! ============================================================================

use std::sync::Arc;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use crate::db::{FolderSelection, LocalDb};
use crate::remote::{FileMetadata, FileQuery, RemoteFileStore, USER_SAVE_FILENAME};
use crate::types::{CollectionError, CollectionResult, OwnershipOverlay};

/// Where a save landed
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SaveTarget {
    Local,
    Remote { file_id: String, created: bool },
}

enum Backend {
    Local,
    Remote {
        store: Arc<dyn RemoteFileStore>,
        folder: FolderSelection,
    },
}

/// Chooses the overlay backend and performs reads/writes against it
pub struct PersistenceArbiter {
    local: Arc<LocalDb>,
    remote: RwLock<Option<Arc<dyn RemoteFileStore>>>,
    folder: RwLock<Option<FolderSelection>>,
}

impl PersistenceArbiter {
    /// Create an arbiter, restoring any previously selected folder
    pub fn new(local: Arc<LocalDb>) -> Self {
        let folder = match local.get_folder() {
            Ok(folder) => folder,
            Err(e) => {
                warn!("Failed to restore folder selection: {}", e);
                None
            }
        };

        Self {
            local,
            remote: RwLock::new(None),
            folder: RwLock::new(folder),
        }
    }

    // ========================================================================
    // Flags
    // ========================================================================

    /// Attach an authenticated remote store (sign-in / silent resume)
    pub async fn attach_remote(&self, store: Arc<dyn RemoteFileStore>) {
        *self.remote.write().await = Some(store);
    }

    /// Forget the remote store (logout)
    pub async fn detach_remote(&self) {
        *self.remote.write().await = None;
    }

    pub async fn is_authenticated(&self) -> bool {
        self.remote.read().await.is_some()
    }

    pub async fn folder(&self) -> Option<FolderSelection> {
        self.folder.read().await.clone()
    }

    /// Persist and activate a folder as the sync target
    pub async fn select_folder(&self, folder: FolderSelection) -> CollectionResult<()> {
        self.local
            .store_folder(&folder)
            .map_err(|e| CollectionError::Storage(e.to_string()))?;
        *self.folder.write().await = Some(folder);
        Ok(())
    }

    pub async fn clear_folder(&self) -> CollectionResult<()> {
        self.local
            .clear_folder()
            .map_err(|e| CollectionError::Storage(e.to_string()))?;
        *self.folder.write().await = None;
        Ok(())
    }

    /// True when reads/writes currently go to the remote store
    pub async fn uses_remote(&self) -> bool {
        matches!(self.backend().await, Backend::Remote { .. })
    }

    async fn backend(&self) -> Backend {
        let remote = self.remote.read().await.clone();
        let folder = self.folder.read().await.clone();
        match (remote, folder) {
            (Some(store), Some(folder)) => Backend::Remote { store, folder },
            _ => Backend::Local,
        }
    }

    // ========================================================================
    // Overlay I/O
    // ========================================================================

    /// Load the overlay from the active backend; remote failures are returned
    pub async fn load_overlay_checked(&self) -> CollectionResult<OwnershipOverlay> {
        match self.backend().await {
            Backend::Local => Ok(self.load_local()),
            Backend::Remote { store, folder } => load_remote(store.as_ref(), &folder)
                .await
                .map_err(|e| {
                    warn!("Remote load from folder {} failed: {}", folder.name, e);
                    e
                }),
        }
    }

    /// Load the overlay from the active backend; failures read as empty
    pub async fn load_overlay(&self) -> OwnershipOverlay {
        self.load_overlay_checked().await.unwrap_or_default()
    }

    /// Load from the local slot regardless of sign-in state
    pub fn load_local(&self) -> OwnershipOverlay {
        match self.local.load_overlay() {
            Ok(overlay) => {
                debug!("Loaded {} local ownership entries", overlay.len());
                overlay
            }
            Err(e) => {
                warn!("Local overlay read failed: {}", e);
                OwnershipOverlay::default()
            }
        }
    }

    /// Write the overlay to the active backend
    pub async fn save_overlay(&self, overlay: &OwnershipOverlay) -> CollectionResult<SaveTarget> {
        match self.backend().await {
            Backend::Local => {
                self.local
                    .store_overlay(overlay)
                    .map_err(|e| CollectionError::Storage(e.to_string()))?;
                debug!("Saved {} ownership entries locally", overlay.len());
                Ok(SaveTarget::Local)
            }
            Backend::Remote { store, folder } => save_remote(store.as_ref(), &folder, overlay).await,
        }
    }
}

/// First match of the save-file query. Duplicates are reported, not merged.
async fn find_save_file(
    store: &dyn RemoteFileStore,
    folder: &FolderSelection,
) -> CollectionResult<Option<String>> {
    let files = store.list(&FileQuery::save_file_in(&folder.id)).await?;
    if files.len() > 1 {
        warn!(
            "{} copies of {} in folder {}; using the most recent ({})",
            files.len(),
            USER_SAVE_FILENAME,
            folder.name,
            files[0].id
        );
    }
    Ok(files.into_iter().next().map(|f| f.id))
}

async fn load_remote(
    store: &dyn RemoteFileStore,
    folder: &FolderSelection,
) -> CollectionResult<OwnershipOverlay> {
    let Some(file_id) = find_save_file(store, folder).await? else {
        info!("No save file in folder {} yet", folder.name);
        return Ok(OwnershipOverlay::default());
    };

    let content = store.get_content(&file_id).await?;
    let overlay = OwnershipOverlay::from_json_lossy(&content);
    info!("Loaded {} ownership entries from Drive", overlay.len());
    Ok(overlay)
}

async fn save_remote(
    store: &dyn RemoteFileStore,
    folder: &FolderSelection,
    overlay: &OwnershipOverlay,
) -> CollectionResult<SaveTarget> {
    let content = serde_json::to_string_pretty(overlay)?;

    let target = match find_save_file(store, folder).await? {
        Some(file_id) => {
            let meta = FileMetadata::json_update(USER_SAVE_FILENAME);
            store.update(&file_id, &meta, &content).await?;
            SaveTarget::Remote {
                file_id,
                created: false,
            }
        }
        None => {
            let meta = FileMetadata::json_file(USER_SAVE_FILENAME, &folder.id);
            let file = store.create(&meta, &content).await?;
            SaveTarget::Remote {
                file_id: file.id,
                created: true,
            }
        }
    };

    info!("Saved {} ownership entries to Drive", overlay.len());
    Ok(target)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::remote::fake::FakeFileStore;
    use std::sync::atomic::Ordering;
    use tempfile::tempdir;

    fn folder() -> FolderSelection {
        FolderSelection {
            id: "folder-1".into(),
            name: "Gotochi".into(),
        }
    }

    fn sample_overlay() -> OwnershipOverlay {
        [("x.png".to_string(), true), ("y.png".to_string(), false)]
            .into_iter()
            .collect()
    }

    fn setup() -> (tempfile::TempDir, Arc<LocalDb>, PersistenceArbiter) {
        let dir = tempdir().unwrap();
        let db = Arc::new(LocalDb::open(Some(&dir.path().join("p.redb"))).unwrap());
        let arbiter = PersistenceArbiter::new(db.clone());
        (dir, db, arbiter)
    }

    #[tokio::test]
    async fn test_local_round_trip() {
        let (_dir, _db, arbiter) = setup();
        let overlay = sample_overlay();
        assert_eq!(arbiter.save_overlay(&overlay).await.unwrap(), SaveTarget::Local);
        assert_eq!(arbiter.load_overlay().await, overlay);
    }

    #[tokio::test]
    async fn test_remote_round_trip_creates_then_updates() {
        let (_dir, db, arbiter) = setup();
        let store = Arc::new(FakeFileStore::default());
        arbiter.attach_remote(store.clone()).await;
        arbiter.select_folder(folder()).await.unwrap();
        assert!(arbiter.uses_remote().await);

        let overlay = sample_overlay();
        let first = arbiter.save_overlay(&overlay).await.unwrap();
        assert!(matches!(first, SaveTarget::Remote { created: true, .. }));
        assert_eq!(arbiter.load_overlay().await, overlay);

        let mut changed = overlay.clone();
        changed.set_owned("z.png", true);
        let second = arbiter.save_overlay(&changed).await.unwrap();
        assert!(matches!(second, SaveTarget::Remote { created: false, .. }));
        assert_eq!(arbiter.load_overlay().await, changed);

        assert_eq!(store.creates.load(Ordering::SeqCst), 1);
        assert_eq!(store.updates.load(Ordering::SeqCst), 1);
        // Remote saves leave the local slot alone
        assert!(db.load_overlay().unwrap().is_empty());
    }

    #[tokio::test]
    async fn test_signed_in_without_folder_uses_local() {
        let (_dir, _db, arbiter) = setup();
        arbiter.attach_remote(Arc::new(FakeFileStore::default())).await;
        assert!(!arbiter.uses_remote().await);
        let target = arbiter.save_overlay(&sample_overlay()).await.unwrap();
        assert_eq!(target, SaveTarget::Local);
    }

    #[tokio::test]
    async fn test_folder_without_sign_in_uses_local() {
        let (_dir, _db, arbiter) = setup();
        arbiter.select_folder(folder()).await.unwrap();
        assert!(!arbiter.uses_remote().await);
    }

    #[tokio::test]
    async fn test_folder_restored_on_new() {
        let (_dir, db, arbiter) = setup();
        arbiter.select_folder(folder()).await.unwrap();
        let restored = PersistenceArbiter::new(db);
        assert_eq!(restored.folder().await, Some(folder()));
    }

    #[tokio::test]
    async fn test_remote_read_failure_reads_empty() {
        let (_dir, _db, arbiter) = setup();
        let store = Arc::new(FakeFileStore::with_file(
            "folder-1",
            USER_SAVE_FILENAME,
            r#"{"x.png":{"owned":true}}"#,
        ));
        store.fail_reads.store(true, Ordering::SeqCst);
        arbiter.attach_remote(store).await;
        arbiter.select_folder(folder()).await.unwrap();
        assert!(arbiter.load_overlay().await.is_empty());
        let err = arbiter.load_overlay_checked().await.unwrap_err();
        assert!(matches!(err, CollectionError::Network(_)));
    }

    #[tokio::test]
    async fn test_checked_load_of_local_slot() {
        let (_dir, db, arbiter) = setup();
        db.store_overlay(&sample_overlay()).unwrap();
        assert_eq!(arbiter.load_overlay_checked().await.unwrap(), sample_overlay());
    }

    #[tokio::test]
    async fn test_remote_save_keeps_unreadable_entries() {
        let (_dir, _db, arbiter) = setup();
        let store = Arc::new(FakeFileStore::default());
        let file_id = store.insert(
            "folder-1",
            USER_SAVE_FILENAME,
            r#"{"a.png":{"owned":true},"b.png":{"owned":false,"note":"gift"},"c.png":null}"#,
        );
        arbiter.attach_remote(store.clone()).await;
        arbiter.select_folder(folder()).await.unwrap();

        let mut overlay = arbiter.load_overlay_checked().await.unwrap();
        assert_eq!(overlay.len(), 3);
        overlay.set_owned("d.png", true);
        arbiter.save_overlay(&overlay).await.unwrap();

        let saved: serde_json::Value =
            serde_json::from_str(&store.content_of(&file_id).unwrap()).unwrap();
        assert_eq!(
            saved,
            serde_json::json!({
                "a.png": {"owned": true},
                "b.png": {"owned": false, "note": "gift"},
                "c.png": null,
                "d.png": {"owned": true}
            })
        );
    }

    #[tokio::test]
    async fn test_remote_malformed_content_reads_empty() {
        let (_dir, _db, arbiter) = setup();
        let store = Arc::new(FakeFileStore::with_file("folder-1", USER_SAVE_FILENAME, "<html>"));
        arbiter.attach_remote(store).await;
        arbiter.select_folder(folder()).await.unwrap();
        assert!(arbiter.load_overlay().await.is_empty());
    }

    #[tokio::test]
    async fn test_remote_write_failure_is_reported() {
        let (_dir, _db, arbiter) = setup();
        let store = Arc::new(FakeFileStore::default());
        store.fail_writes.store(true, Ordering::SeqCst);
        arbiter.attach_remote(store).await;
        arbiter.select_folder(folder()).await.unwrap();
        let err = arbiter.save_overlay(&sample_overlay()).await.unwrap_err();
        assert!(matches!(err, CollectionError::Remote { status: 500, .. }));
    }

    #[tokio::test]
    async fn test_duplicate_files_use_most_recent() {
        let (_dir, _db, arbiter) = setup();
        let store = Arc::new(FakeFileStore::default());
        store.insert("folder-1", USER_SAVE_FILENAME, r#"{"old.png":{"owned":true}}"#);
        let newest = store.insert("folder-1", USER_SAVE_FILENAME, r#"{"new.png":{"owned":true}}"#);
        arbiter.attach_remote(store.clone()).await;
        arbiter.select_folder(folder()).await.unwrap();

        let overlay = arbiter.load_overlay().await;
        assert!(overlay.is_owned("new.png"));
        assert!(!overlay.is_owned("old.png"));

        let target = arbiter.save_overlay(&overlay).await.unwrap();
        assert_eq!(
            target,
            SaveTarget::Remote {
                file_id: newest,
                created: false
            }
        );
    }

    #[tokio::test]
    async fn test_other_folder_files_are_ignored() {
        let (_dir, _db, arbiter) = setup();
        let store = Arc::new(FakeFileStore::with_file(
            "elsewhere",
            USER_SAVE_FILENAME,
            r#"{"x.png":{"owned":true}}"#,
        ));
        arbiter.attach_remote(store).await;
        arbiter.select_folder(folder()).await.unwrap();
        assert!(arbiter.load_overlay().await.is_empty());
    }
}
