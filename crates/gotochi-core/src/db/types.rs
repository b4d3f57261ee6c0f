//! ============================================================================
//! Database Types - Records kept in the local key-value slots
//! ============================================================================

use serde::{Deserialize, Serialize};

/// Remote folder chosen as the sync target
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FolderSelection {
    pub id: String,
    pub name: String,
}

/// Summary of what the local database currently holds
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DbStats {
    pub total_slots: usize,
    pub has_session: bool,
    pub folder: Option<FolderSelection>,
    /// Entries in the locally persisted overlay (0 when absent or malformed)
    pub local_overlay_entries: usize,
}
