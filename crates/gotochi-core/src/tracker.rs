//! ============================================================================
//! Tracker - Session lifecycle and user-facing operations
//! ============================================================================
//! Ties the pieces together:
//! - Startup: local overlay, catalog fetch, silent session resume
//! - Login / folder pick / logout, switching the overlay between devices
//!   and the remote folder
//! - Ownership toggles with debounced persistence
//! - Admin catalog maintenance (refresh, region fix, import, clear)
//! - Overlay import/reset and backup files
//! ============================================================================

use std::path::Path;
use std::sync::Arc;
use tracing::{error, info, warn};

use crate::auth::{is_admin, AuthProvider, GoogleAccount, Session, SessionCache, TokenResponse, UserProfile};
use crate::catalog::{self, CatalogClient, CatalogService};
use crate::clock::{Clock, SystemClock};
use crate::config::AppConfig;
use crate::db::{FolderSelection, LocalDb};
use crate::debounce::{SaveOutcome, SaveScheduler};
use crate::remote::{DriveClient, RemoteFileStore};
use crate::state::CollectionState;
use crate::storage::{PersistenceArbiter, SaveTarget};
use crate::types::{CatalogItem, CollectionError, CollectionResult, OwnershipOverlay};

/// Literal the user must type to clear the catalog
pub const CLEAR_CATALOG_CODE: &str = "DELETE";

/// Builds a remote store for an access token
pub type RemoteFactory = Box<dyn Fn(&str) -> Arc<dyn RemoteFileStore> + Send + Sync>;

/// Collaborators a tracker is assembled from
pub struct TrackerParts {
    pub db: Arc<LocalDb>,
    pub clock: Arc<dyn Clock>,
    pub catalog: Arc<dyn CatalogService>,
    pub account: Arc<dyn AuthProvider>,
    pub remote: RemoteFactory,
}

/// What startup found
#[derive(Debug, Clone, PartialEq)]
pub struct StartupReport {
    pub catalog_items: usize,
    pub overlay_entries: usize,
    /// A cached session was still valid
    pub resumed: bool,
    /// Ownership was read from the remote folder
    pub remote_sync: bool,
}

/// Result of a sign-in
#[derive(Debug, Clone, PartialEq)]
pub enum LoginOutcome {
    /// Signed in, but no folder is selected yet; ownership stays local
    FolderRequired,
    /// Ownership loaded from the selected folder
    Synced { folder: FolderSelection, entries: usize },
    /// The folder could not be read; the overlay already in memory is kept
    RemoteUnavailable { folder: FolderSelection },
}

pub struct Tracker {
    config: AppConfig,
    db: Arc<LocalDb>,
    sessions: SessionCache,
    arbiter: Arc<PersistenceArbiter>,
    saver: SaveScheduler,
    catalog: Arc<dyn CatalogService>,
    account: Arc<dyn AuthProvider>,
    remote: RemoteFactory,
    session: Option<Session>,
    profile: Option<UserProfile>,
    admin: bool,
    state: CollectionState,
}

impl Tracker {
    /// Production wiring: redb on disk, the catalog service, Google and Drive.
    /// Must be called inside a tokio runtime.
    pub fn new(config: AppConfig) -> anyhow::Result<Self> {
        let db = Arc::new(LocalDb::open(config.db_path.as_deref())?);
        let timeout = config.http_timeout;
        let parts = TrackerParts {
            db,
            clock: Arc::new(SystemClock),
            catalog: Arc::new(CatalogClient::new(&config.catalog_url, timeout)),
            account: Arc::new(GoogleAccount::new(timeout)),
            remote: Box::new(move |token: &str| {
                Arc::new(DriveClient::new(token.to_string(), timeout)) as Arc<dyn RemoteFileStore>
            }),
        };
        Ok(Self::from_parts(config, parts))
    }

    pub fn from_parts(config: AppConfig, parts: TrackerParts) -> Self {
        let arbiter = Arc::new(PersistenceArbiter::new(parts.db.clone()));
        let saver = SaveScheduler::spawn(arbiter.clone(), config.save_debounce);

        Self {
            sessions: SessionCache::new(parts.db.clone(), parts.clock),
            db: parts.db,
            arbiter,
            saver,
            catalog: parts.catalog,
            account: parts.account,
            remote: parts.remote,
            session: None,
            profile: None,
            admin: false,
            state: CollectionState::new(),
            config,
        }
    }

    // ========================================================================
    // Accessors
    // ========================================================================

    pub fn state(&self) -> &CollectionState {
        &self.state
    }

    /// Filter, view and detail-cursor changes go straight to the state;
    /// ownership changes must use the tracker so they get persisted.
    pub fn state_mut(&mut self) -> &mut CollectionState {
        &mut self.state
    }

    pub fn db(&self) -> &LocalDb {
        &self.db
    }

    pub fn config(&self) -> &AppConfig {
        &self.config
    }

    pub fn profile(&self) -> Option<&UserProfile> {
        self.profile.as_ref()
    }

    pub fn is_admin(&self) -> bool {
        self.admin
    }

    pub fn session(&self) -> Option<&Session> {
        self.session.as_ref()
    }

    pub fn is_signed_in(&self) -> bool {
        self.session.is_some()
    }

    pub async fn folder(&self) -> Option<FolderSelection> {
        self.arbiter.folder().await
    }

    pub async fn uses_remote(&self) -> bool {
        self.arbiter.uses_remote().await
    }

    // ========================================================================
    // Session lifecycle
    // ========================================================================

    pub async fn startup(&mut self) -> StartupReport {
        self.state.replace_overlay(self.arbiter.load_local());

        let catalog = match self.catalog.fetch().await {
            Ok(items) => items,
            Err(e) => {
                error!("Catalog fetch failed, starting with an empty catalog: {}", e);
                Vec::new()
            }
        };
        self.state.replace_catalog(catalog);

        let mut resumed = false;
        let mut remote_sync = false;
        if let Some(session) = self.sessions.load() {
            info!("Resuming cached session");
            resumed = true;
            self.attach(session).await;
            if self.arbiter.uses_remote().await {
                match self.pull_remote_overlay().await {
                    Ok(_) => remote_sync = true,
                    Err(e) => warn!("Keeping local ownership, Drive read failed: {}", e),
                }
            }
        }

        let report = StartupReport {
            catalog_items: self.state.catalog().len(),
            overlay_entries: self.state.overlay().len(),
            resumed,
            remote_sync,
        };
        info!("Startup complete: {:?}", report);
        report
    }

    /// Sign in with a freshly issued token
    pub async fn login(&mut self, token: &TokenResponse) -> CollectionResult<LoginOutcome> {
        // Anything still pending belongs to the pre-login backend
        self.flush_logged().await;

        let session = self.sessions.save(token)?;
        self.attach(session).await;

        match self.arbiter.folder().await {
            Some(folder) => match self.pull_remote_overlay().await {
                Ok(entries) => Ok(LoginOutcome::Synced { folder, entries }),
                Err(e) => {
                    warn!("Keeping current ownership, Drive read failed: {}", e);
                    Ok(LoginOutcome::RemoteUnavailable { folder })
                }
            },
            None => {
                info!("Signed in; pick a folder to sync ownership");
                Ok(LoginOutcome::FolderRequired)
            }
        }
    }

    /// Choose the remote folder and load ownership from it
    pub async fn select_folder(&mut self, id: &str, name: &str) -> CollectionResult<usize> {
        if self.session.is_none() {
            return Err(CollectionError::NotAuthenticated);
        }
        self.flush_logged().await;

        let folder = FolderSelection {
            id: id.to_string(),
            name: name.to_string(),
        };
        self.arbiter.select_folder(folder).await?;
        info!("Sync folder set to {} ({})", name, id);

        self.pull_remote_overlay().await
    }

    /// Replace the in-memory overlay with the active backend's copy.
    /// On a failed read the current overlay is left untouched.
    async fn pull_remote_overlay(&mut self) -> CollectionResult<usize> {
        let overlay = self.arbiter.load_overlay_checked().await?;
        let entries = overlay.len();
        self.state.replace_overlay(overlay);
        Ok(entries)
    }

    pub async fn logout(&mut self) -> CollectionResult<()> {
        self.flush_logged().await;

        if let Some(session) = self.session.take() {
            if let Err(e) = self.account.revoke(session.access_token()).await {
                warn!("Token revocation failed: {}", e);
            }
        }
        self.sessions.clear()?;
        self.arbiter.detach_remote().await;
        self.arbiter.clear_folder().await?;
        self.profile = None;
        self.admin = false;

        // Remote ownership is dropped; fall back to this device's copy
        self.state.replace_overlay(self.arbiter.load_local());
        info!("Signed out");
        Ok(())
    }

    async fn attach(&mut self, session: Session) {
        let store = (self.remote)(session.access_token());
        self.arbiter.attach_remote(store).await;

        match self.account.fetch_profile(session.access_token()).await {
            Ok(profile) => {
                self.admin = is_admin(&profile, self.config.admin_email.as_deref());
                if self.admin {
                    info!("Administrator signed in");
                }
                self.profile = Some(profile);
            }
            Err(e) => warn!("Profile lookup failed: {}", e),
        }
        self.session = Some(session);
    }

    // ========================================================================
    // Ownership
    // ========================================================================

    /// Flip the visible item at `position` and schedule a save
    pub fn toggle(&mut self, position: usize) -> Option<bool> {
        let owned = self.state.toggle(position)?;
        self.saver.schedule(self.state.overlay().clone());
        Some(owned)
    }

    pub fn toggle_marker_member(&mut self, group: usize, member: usize) -> Option<bool> {
        let owned = self.state.toggle_marker_member(group, member)?;
        self.saver.schedule(self.state.overlay().clone());
        Some(owned)
    }

    pub fn toggle_detail(&mut self) -> Option<bool> {
        let owned = self.state.toggle_detail()?;
        self.saver.schedule(self.state.overlay().clone());
        Some(owned)
    }

    /// Replace ownership wholesale and save immediately.
    /// Returns None when not confirmed.
    pub async fn import_overlay(
        &mut self,
        overlay: OwnershipOverlay,
        confirmed: bool,
    ) -> CollectionResult<Option<SaveTarget>> {
        if !confirmed {
            return Ok(None);
        }
        info!("Importing {} ownership entries", overlay.len());
        self.state.replace_overlay(overlay);
        self.save_now().await
    }

    /// Clear every ownership flag and save immediately
    pub async fn reset_selections(&mut self, confirmed: bool) -> CollectionResult<Option<SaveTarget>> {
        if !confirmed {
            return Ok(None);
        }
        info!("Resetting all ownership");
        self.state.replace_overlay(OwnershipOverlay::new());
        self.save_now().await
    }

    async fn save_now(&self) -> CollectionResult<Option<SaveTarget>> {
        self.saver
            .save_now(self.state.overlay().clone())
            .await
            .map_err(CollectionError::Storage)
    }

    // ========================================================================
    // Catalog maintenance
    // ========================================================================

    /// Ask the service to rebuild the catalog; returns the new total
    pub async fn refresh_catalog(&mut self) -> CollectionResult<usize> {
        let result = self.catalog.refresh(self.state.catalog()).await?;
        self.state.replace_catalog(result.items);
        Ok(result.total)
    }

    /// Re-derive regions; returns the number of items updated
    pub async fn fix_regions(&mut self, confirmed: bool) -> CollectionResult<Option<usize>> {
        if !confirmed {
            return Ok(None);
        }
        let result = self.catalog.fix_regions(self.state.catalog()).await?;
        self.state.replace_catalog(result.items);
        Ok(Some(result.updated))
    }

    /// Wipe the catalog. Only the exact code clears anything.
    pub async fn clear_catalog(&mut self, code: &str) -> CollectionResult<bool> {
        if code != CLEAR_CATALOG_CODE {
            info!("Catalog clear not confirmed");
            return Ok(false);
        }
        self.catalog.import(&[]).await?;
        self.state.replace_catalog(Vec::new());
        warn!("Catalog cleared");
        Ok(true)
    }

    /// Replace the catalog and re-read it from the service
    pub async fn import_catalog(
        &mut self,
        items: &[CatalogItem],
        confirmed: bool,
    ) -> CollectionResult<Option<usize>> {
        if !confirmed {
            return Ok(None);
        }
        self.catalog.import(items).await?;
        let fresh = self.catalog.fetch().await?;
        let total = fresh.len();
        self.state.replace_catalog(fresh);
        Ok(Some(total))
    }

    // ========================================================================
    // Backup files
    // ========================================================================

    pub fn export_overlay(&self, path: &Path) -> CollectionResult<()> {
        catalog::export_overlay(path, self.state.overlay())
    }

    pub fn export_catalog(&self, path: &Path) -> CollectionResult<()> {
        catalog::export_catalog(path, self.state.catalog())
    }

    // ========================================================================
    // Saving
    // ========================================================================

    /// Write any pending toggle now
    pub async fn flush(&self) -> SaveOutcome {
        self.saver.flush().await
    }

    async fn flush_logged(&self) {
        if let Err(e) = self.saver.flush().await {
            warn!("Pending save failed: {}", e);
        }
    }

    /// Flush and stop the save worker
    pub async fn shutdown(self) -> SaveOutcome {
        self.saver.shutdown().await
    }
}
