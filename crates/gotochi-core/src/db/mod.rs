// ============================================================================
// LocalDb - Embedded Key-Value Store (redb)
// ============================================================================
// Device-scoped slots for the session credential, the selected Drive folder
// and the local copy of the ownership overlay. Values are JSON text.
// Default path: ~/.gotochi/state.redb (override via GOTOCHI_DB_PATH env var)
// ============================================================================

pub mod types;

pub use types::{DbStats, FolderSelection};

use anyhow::{anyhow, Result};
use redb::{Database, TableDefinition};
use std::path::{Path, PathBuf};
use tracing::{debug, info};

use crate::types::OwnershipOverlay;

const KV: TableDefinition<&str, &str> = TableDefinition::new("kv");

/// Slot holding the cached bearer credential and its expiry
pub const SESSION_KEY: &str = "google_access_token";
/// Slot holding the selected Drive folder id
pub const FOLDER_ID_KEY: &str = "drive_folder_id";
/// Slot holding the selected Drive folder display name
pub const FOLDER_NAME_KEY: &str = "drive_folder_name";
/// Slot holding the overlay when remote sync is not in use
pub const OVERLAY_KEY: &str = "chiikawa_user_save";

/// Embedded key-value database for tracker state
pub struct LocalDb {
    db: Database,
    path: PathBuf,
}

impl LocalDb {
    /// Open (or create) the database at the given path.
    /// If `path` is None, uses GOTOCHI_DB_PATH env var or ~/.gotochi/state.redb
    pub fn open(path: Option<&Path>) -> Result<Self> {
        let db_path = if let Some(p) = path {
            p.to_path_buf()
        } else if let Ok(env_path) = std::env::var("GOTOCHI_DB_PATH") {
            PathBuf::from(env_path)
        } else {
            default_db_path()?
        };

        if let Some(parent) = db_path.parent().filter(|p| !p.as_os_str().is_empty()) {
            std::fs::create_dir_all(parent)
                .map_err(|e| anyhow!("Failed to create {}: {}", parent.display(), e))?;
        }

        info!("Opening local database at: {}", db_path.display());

        let db = Database::create(&db_path)
            .map_err(|e| anyhow!("Failed to open database: {}", e))?;

        // Ensure the table exists so read transactions never miss it
        let write_txn = db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let _ = write_txn
                .open_table(KV)
                .map_err(|e| anyhow!("Failed to create kv table: {}", e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit init: {}", e))?;

        Ok(Self { db, path: db_path })
    }

    /// Get the database file path
    pub fn path(&self) -> &Path {
        &self.path
    }

    // ========================================================================
    // Raw slot operations
    // ========================================================================

    pub fn get(&self, key: &str) -> Result<Option<String>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(KV)
            .map_err(|e| anyhow!("Failed to open kv table: {}", e))?;

        let value = table
            .get(key)
            .map_err(|e| anyhow!("Failed to get {}: {}", key, e))?
            .map(|v| v.value().to_string());
        Ok(value)
    }

    pub fn set(&self, key: &str, value: &str) -> Result<()> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        {
            let mut table = write_txn
                .open_table(KV)
                .map_err(|e| anyhow!("Failed to open kv table: {}", e))?;
            table
                .insert(key, value)
                .map_err(|e| anyhow!("Failed to insert {}: {}", key, e))?;
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit: {}", e))?;

        debug!("Stored slot: {}", key);
        Ok(())
    }

    /// Remove a slot. Returns whether anything was there.
    pub fn remove(&self, key: &str) -> Result<bool> {
        let write_txn = self
            .db
            .begin_write()
            .map_err(|e| anyhow!("Failed to begin write: {}", e))?;
        let removed;
        {
            let mut table = write_txn
                .open_table(KV)
                .map_err(|e| anyhow!("Failed to open kv table: {}", e))?;
            removed = table
                .remove(key)
                .map_err(|e| anyhow!("Failed to remove {}: {}", key, e))?
                .is_some();
        }
        write_txn.commit().map_err(|e| anyhow!("Failed to commit delete: {}", e))?;

        if removed {
            debug!("Removed slot: {}", key);
        }
        Ok(removed)
    }

    pub fn keys(&self) -> Result<Vec<String>> {
        let read_txn = self
            .db
            .begin_read()
            .map_err(|e| anyhow!("Failed to begin read: {}", e))?;
        let table = read_txn
            .open_table(KV)
            .map_err(|e| anyhow!("Failed to open kv table: {}", e))?;

        let mut keys = Vec::new();
        let iter = table
            .range::<&str>(..)
            .map_err(|e| anyhow!("Failed to iterate kv: {}", e))?;
        for entry in iter {
            let (key, _value) = entry.map_err(|e| anyhow!("Failed to read entry: {}", e))?;
            keys.push(key.value().to_string());
        }
        Ok(keys)
    }

    // ========================================================================
    // Folder selection
    // ========================================================================

    pub fn store_folder(&self, folder: &FolderSelection) -> Result<()> {
        self.set(FOLDER_ID_KEY, &folder.id)?;
        self.set(FOLDER_NAME_KEY, &folder.name)?;
        info!("Selected Drive folder: {} ({})", folder.name, folder.id);
        Ok(())
    }

    pub fn get_folder(&self) -> Result<Option<FolderSelection>> {
        let Some(id) = self.get(FOLDER_ID_KEY)?.filter(|id| !id.is_empty()) else {
            return Ok(None);
        };
        let name = self.get(FOLDER_NAME_KEY)?.unwrap_or_default();
        Ok(Some(FolderSelection { id, name }))
    }

    pub fn clear_folder(&self) -> Result<()> {
        self.remove(FOLDER_ID_KEY)?;
        self.remove(FOLDER_NAME_KEY)?;
        Ok(())
    }

    // ========================================================================
    // Local overlay
    // ========================================================================

    /// Locally saved overlay; missing or malformed data reads as empty
    pub fn load_overlay(&self) -> Result<OwnershipOverlay> {
        Ok(self
            .get(OVERLAY_KEY)?
            .map(|raw| OwnershipOverlay::from_json_lossy(&raw))
            .unwrap_or_default())
    }

    pub fn store_overlay(&self, overlay: &OwnershipOverlay) -> Result<()> {
        let raw = serde_json::to_string(overlay)
            .map_err(|e| anyhow!("Failed to serialize overlay: {}", e))?;
        self.set(OVERLAY_KEY, &raw)
    }

    // ========================================================================
    // Statistics
    // ========================================================================

    pub fn stats(&self) -> Result<DbStats> {
        Ok(DbStats {
            total_slots: self.keys()?.len(),
            has_session: self.get(SESSION_KEY)?.is_some(),
            folder: self.get_folder()?,
            local_overlay_entries: self.load_overlay()?.len(),
        })
    }
}

fn default_db_path() -> Result<PathBuf> {
    let home = dirs::home_dir().ok_or_else(|| anyhow!("Cannot determine home directory"))?;
    Ok(home.join(".gotochi").join("state.redb"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn open_temp() -> (tempfile::TempDir, LocalDb) {
        let dir = tempdir().unwrap();
        let db = LocalDb::open(Some(&dir.path().join("state.redb"))).unwrap();
        (dir, db)
    }

    #[test]
    fn test_slot_set_get_remove() {
        let (_dir, db) = open_temp();
        assert_eq!(db.get("k").unwrap(), None);
        db.set("k", "v1").unwrap();
        db.set("k", "v2").unwrap();
        assert_eq!(db.get("k").unwrap().as_deref(), Some("v2"));
        assert!(db.remove("k").unwrap());
        assert!(!db.remove("k").unwrap());
    }

    #[test]
    fn test_folder_selection() {
        let (_dir, db) = open_temp();
        assert_eq!(db.get_folder().unwrap(), None);
        let folder = FolderSelection {
            id: "f1".into(),
            name: "Collection".into(),
        };
        db.store_folder(&folder).unwrap();
        assert_eq!(db.get_folder().unwrap(), Some(folder));
        db.clear_folder().unwrap();
        assert_eq!(db.get_folder().unwrap(), None);
    }

    #[test]
    fn test_malformed_overlay_reads_empty() {
        let (_dir, db) = open_temp();
        db.set(OVERLAY_KEY, "{broken").unwrap();
        assert!(db.load_overlay().unwrap().is_empty());
    }

    #[test]
    fn test_stats() {
        let (_dir, db) = open_temp();
        let mut overlay = OwnershipOverlay::new();
        overlay.set_owned("a.png", true);
        db.store_overlay(&overlay).unwrap();
        let stats = db.stats().unwrap();
        assert_eq!(stats.total_slots, 1);
        assert!(!stats.has_session);
        assert_eq!(stats.local_overlay_entries, 1);
    }
}
