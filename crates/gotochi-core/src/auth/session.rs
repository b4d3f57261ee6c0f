//! ============================================================================
//! Session Cache - Bearer credential persistence with expiry
//! ============================================================================
//! Keeps the most recently issued access token in a single local slot so a
//! later launch can resume silently. Expired or unreadable records are
//! treated as absent.
//! ============================================================================

use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::clock::Clock;
use crate::db::{LocalDb, SESSION_KEY};
use crate::types::{CollectionError, CollectionResult};

/// Tokens are considered expired this long before the issuer says so
pub const EXPIRY_MARGIN_MS: i64 = 60_000;

/// Token payload as returned by the auth provider
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenResponse {
    pub access_token: String,
    /// Lifetime in seconds
    pub expires_in: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub token_type: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,
}

/// Stored credential with its absolute expiry (epoch millis)
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Session {
    pub token: TokenResponse,
    pub expiry: i64,
}

impl Session {
    pub fn access_token(&self) -> &str {
        &self.token.access_token
    }

    pub fn is_expired_at(&self, now_ms: i64) -> bool {
        now_ms >= self.expiry
    }
}

/// Single-slot credential cache
pub struct SessionCache {
    db: Arc<LocalDb>,
    clock: Arc<dyn Clock>,
}

impl SessionCache {
    pub fn new(db: Arc<LocalDb>, clock: Arc<dyn Clock>) -> Self {
        Self { db, clock }
    }

    /// Store a freshly issued token, replacing any previous one
    pub fn save(&self, token: &TokenResponse) -> CollectionResult<Session> {
        let expiry = self
            .clock
            .now_ms()
            .saturating_add(token.expires_in.saturating_mul(1000))
            .saturating_sub(EXPIRY_MARGIN_MS);
        let session = Session {
            token: token.clone(),
            expiry,
        };

        let raw = serde_json::to_string(&session)?;
        self.db
            .set(SESSION_KEY, &raw)
            .map_err(|e| CollectionError::Storage(e.to_string()))?;

        info!(
            "Session cached, valid for {}s",
            expiry.saturating_sub(self.clock.now_ms()) / 1000
        );
        Ok(session)
    }

    /// Stored session if still valid. Expired sessions are evicted.
    pub fn load(&self) -> Option<Session> {
        let raw = match self.db.get(SESSION_KEY) {
            Ok(Some(raw)) => raw,
            Ok(None) => return None,
            Err(e) => {
                warn!("Failed to read cached session: {}", e);
                return None;
            }
        };

        let session: Session = match serde_json::from_str(&raw) {
            Ok(session) => session,
            Err(e) => {
                warn!("Ignoring malformed cached session: {}", e);
                return None;
            }
        };

        if session.is_expired_at(self.clock.now_ms()) {
            debug!("Cached session expired, evicting");
            if let Err(e) = self.db.remove(SESSION_KEY) {
                warn!("Failed to evict expired session: {}", e);
            }
            return None;
        }

        Some(session)
    }

    /// Drop the stored session unconditionally
    pub fn clear(&self) -> CollectionResult<()> {
        self.db
            .remove(SESSION_KEY)
            .map_err(|e| CollectionError::Storage(e.to_string()))?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::clock::MockClock;
    use tempfile::tempdir;

    fn token(expires_in: i64) -> TokenResponse {
        TokenResponse {
            access_token: "ya29.test".to_string(),
            expires_in,
            token_type: Some("Bearer".to_string()),
            scope: None,
        }
    }

    fn setup(now: i64) -> (tempfile::TempDir, Arc<LocalDb>, Arc<MockClock>, SessionCache) {
        let dir = tempdir().unwrap();
        let db = Arc::new(LocalDb::open(Some(&dir.path().join("s.redb"))).unwrap());
        let clock = Arc::new(MockClock::new(now));
        let cache = SessionCache::new(db.clone(), clock.clone());
        (dir, db, clock, cache)
    }

    #[test]
    fn test_save_applies_safety_margin() {
        let (_dir, _db, _clock, cache) = setup(1_000_000);
        let session = cache.save(&token(3600)).unwrap();
        assert_eq!(session.expiry, 1_000_000 + 3_600_000 - 60_000);
    }

    #[test]
    fn test_load_before_expiry_returns_token() {
        let (_dir, _db, clock, cache) = setup(0);
        let saved = cache.save(&token(3600)).unwrap();
        clock.set(saved.expiry - 1);
        let loaded = cache.load().unwrap();
        assert_eq!(loaded.access_token(), "ya29.test");
    }

    #[test]
    fn test_load_after_expiry_evicts() {
        let (_dir, db, clock, cache) = setup(0);
        let saved = cache.save(&token(3600)).unwrap();
        clock.set(saved.expiry);
        assert!(cache.load().is_none());
        assert_eq!(db.get(SESSION_KEY).unwrap(), None);
    }

    #[test]
    fn test_malformed_session_is_absent() {
        let (_dir, db, _clock, cache) = setup(0);
        db.set(SESSION_KEY, "{\"token\":").unwrap();
        assert!(cache.load().is_none());
    }

    #[test]
    fn test_save_overwrites_and_clear_removes() {
        let (_dir, _db, _clock, cache) = setup(0);
        cache.save(&token(100)).unwrap();
        let second = cache.save(&token(7200)).unwrap();
        assert_eq!(cache.load().unwrap().expiry, second.expiry);
        cache.clear().unwrap();
        assert!(cache.load().is_none());
        cache.clear().unwrap();
    }

    #[test]
    fn test_short_lived_token_is_immediately_expired() {
        let (_dir, _db, _clock, cache) = setup(0);
        cache.save(&token(30)).unwrap();
        assert!(cache.load().is_none());
    }

    #[test]
    fn test_huge_lifetime_saturates() {
        let (_dir, _db, _clock, cache) = setup(1_000_000);
        let session = cache.save(&token(i64::MAX)).unwrap();
        assert_eq!(session.expiry, i64::MAX - EXPIRY_MARGIN_MS);
        assert!(cache.load().is_some());

        cache.save(&token(i64::MIN)).unwrap();
        assert!(cache.load().is_none());
    }
}
