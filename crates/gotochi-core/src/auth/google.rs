//! ============================================================================
//! Google Account - Profile lookup and token revocation
//! ============================================================================
//! Token issuance happens outside this crate (consent screen / token client).
//! Given an access token this client resolves who the user is and can
//! revoke the token on logout.
//! ============================================================================

use async_trait::async_trait;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use std::time::Duration;
use tracing::{debug, error, info};

use crate::types::{CollectionError, CollectionResult};

const USERINFO_URL: &str = "https://www.googleapis.com/oauth2/v3/userinfo";
const REVOKE_URL: &str = "https://oauth2.googleapis.com/revoke";

/// Scopes the token must carry for Drive sync and profile lookup
pub const SCOPES: &str = "https://www.googleapis.com/auth/drive.file https://www.googleapis.com/auth/userinfo.profile https://www.googleapis.com/auth/userinfo.email";

/// Signed-in user identity
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub name: Option<String>,
    /// Avatar URL
    #[serde(default)]
    pub picture: Option<String>,
}

/// Whether the profile belongs to the configured catalog administrator
pub fn is_admin(profile: &UserProfile, admin_email: Option<&str>) -> bool {
    match (profile.email.as_deref(), admin_email) {
        (Some(email), Some(admin)) if !admin.trim().is_empty() => {
            email.trim().eq_ignore_ascii_case(admin.trim())
        }
        _ => false,
    }
}

/// Identity operations the tracker needs from the account provider
#[async_trait]
pub trait AuthProvider: Send + Sync {
    /// Resolve the user behind an access token
    async fn fetch_profile(&self, access_token: &str) -> CollectionResult<UserProfile>;

    /// Revoke an access token at the provider
    async fn revoke(&self, access_token: &str) -> CollectionResult<()>;
}

/// Google identity client
pub struct GoogleAccount {
    client: Client,
    userinfo_url: String,
    revoke_url: String,
}

impl GoogleAccount {
    pub fn new(timeout: Duration) -> Self {
        Self::with_endpoints(timeout, USERINFO_URL, REVOKE_URL)
    }

    pub fn with_endpoints(timeout: Duration, userinfo_url: &str, revoke_url: &str) -> Self {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .unwrap_or_else(|_| Client::new());

        Self {
            client,
            userinfo_url: userinfo_url.to_string(),
            revoke_url: revoke_url.to_string(),
        }
    }
}

#[async_trait]
impl AuthProvider for GoogleAccount {
    async fn fetch_profile(&self, access_token: &str) -> CollectionResult<UserProfile> {
        debug!("Fetching user profile");

        let response = self
            .client
            .get(&self.userinfo_url)
            .bearer_auth(access_token)
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            error!("Userinfo request failed: {} - {}", status, body);
            return Err(CollectionError::Remote {
                status: status.as_u16(),
                message: body,
            });
        }

        let profile: UserProfile = response.json().await?;
        info!(
            "Signed in as {}",
            profile.name.as_deref().or(profile.email.as_deref()).unwrap_or("(unknown)")
        );
        Ok(profile)
    }

    async fn revoke(&self, access_token: &str) -> CollectionResult<()> {
        let response = self
            .client
            .post(&self.revoke_url)
            .form(&[("token", access_token)])
            .send()
            .await?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            return Err(CollectionError::Remote {
                status: status.as_u16(),
                message: body,
            });
        }

        info!("Access token revoked");
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn profile(email: Option<&str>) -> UserProfile {
        UserProfile {
            email: email.map(str::to_string),
            name: Some("User".to_string()),
            picture: None,
        }
    }

    #[test]
    fn test_admin_match_is_case_insensitive() {
        assert!(is_admin(&profile(Some("Admin@Example.com")), Some("admin@example.com")));
        assert!(!is_admin(&profile(Some("other@example.com")), Some("admin@example.com")));
    }

    #[test]
    fn test_admin_requires_both_sides() {
        assert!(!is_admin(&profile(None), Some("admin@example.com")));
        assert!(!is_admin(&profile(Some("admin@example.com")), None));
        assert!(!is_admin(&profile(Some("admin@example.com")), Some("  ")));
    }

    #[test]
    fn test_profile_parses_partial_payload() {
        let p: UserProfile =
            serde_json::from_str(r#"{"sub":"1","email":"a@b.c","picture":"https://x/p.png"}"#)
                .unwrap();
        assert_eq!(p.email.as_deref(), Some("a@b.c"));
        assert_eq!(p.name, None);
    }
}
