//! ============================================================================
//! Auth Module - Credential caching and account lookups
//! ============================================================================
//! - Session cache: persisted bearer token with expiry
//! - Google account: profile resolution and revocation
//! ============================================================================

mod google;
mod session;

pub use google::{is_admin, AuthProvider, GoogleAccount, UserProfile, SCOPES};
pub use session::{Session, SessionCache, TokenResponse, EXPIRY_MARGIN_MS};
