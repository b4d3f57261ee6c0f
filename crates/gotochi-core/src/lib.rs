//! ============================================================================
//! GOTOCHI-CORE: Collection tracker engine
//! ============================================================================
//! This crate handles all backend logic for the Gotochi tracker:
//! - Shared catalog joined with a per-user ownership overlay
//! - Filtering and map-marker clustering of the visible items
//! - Overlay persistence: local redb slot or a Drive folder file
//! - Cached sign-in with expiry, debounced saves of ownership changes
//! ============================================================================

pub mod auth;
pub mod catalog;
pub mod clock;
pub mod cluster;
pub mod config;
pub mod db;
pub mod debounce;
pub mod filter;
pub mod reconcile;
pub mod remote;
pub mod state;
pub mod storage;
pub mod tracker;
pub mod types;

// Re-export main types for convenience
pub use types::*;
pub use auth::{AuthProvider, GoogleAccount, SessionCache, TokenResponse, UserProfile};
pub use catalog::{CatalogClient, CatalogService};
pub use cluster::{build_markers, MarkerContent, MarkerGroup, OwnershipState};
pub use config::AppConfig;
pub use db::LocalDb;
pub use filter::{filter, CategoryFilter, FilterCriteria, StatusFilter};
pub use reconcile::merge;
pub use remote::{DriveClient, RemoteFileStore};
pub use state::{CollectionState, DetailView, ViewMode};
pub use storage::{PersistenceArbiter, SaveTarget};
pub use tracker::{LoginOutcome, StartupReport, Tracker};
