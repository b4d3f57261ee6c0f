//! ============================================================================
//! Configuration - Environment-driven runtime settings
//! ============================================================================
//! Catalog URL, database path, admin email, save debounce and HTTP timeout,
//! read from GOTOCHI_* variables with defaults for anything unset.
//! ============================================================================

use std::path::PathBuf;
use std::time::Duration;

pub const DEFAULT_CATALOG_URL: &str = "http://127.0.0.1:5000";
pub const DEFAULT_SAVE_DEBOUNCE_MS: u64 = 1000;
pub const DEFAULT_HTTP_TIMEOUT_SECS: u64 = 10;

/// Runtime configuration, normally read from the environment
#[derive(Debug, Clone, PartialEq)]
pub struct AppConfig {
    pub catalog_url: String,
    /// None means GOTOCHI_DB_PATH / ~/.gotochi/state.redb
    pub db_path: Option<PathBuf>,
    pub admin_email: Option<String>,
    pub save_debounce: Duration,
    pub http_timeout: Duration,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            catalog_url: DEFAULT_CATALOG_URL.to_string(),
            db_path: None,
            admin_email: None,
            save_debounce: Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS),
            http_timeout: Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS),
        }
    }
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Build from an arbitrary variable source
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Self {
        let non_empty = |key: &str| {
            lookup(key)
                .map(|v| v.trim().to_string())
                .filter(|v| !v.is_empty())
        };
        let positive = |key: &str| {
            non_empty(key)
                .and_then(|v| v.parse::<u64>().ok())
                .filter(|v| *v > 0)
        };

        Self {
            catalog_url: non_empty("GOTOCHI_CATALOG_URL")
                .unwrap_or_else(|| DEFAULT_CATALOG_URL.to_string()),
            db_path: non_empty("GOTOCHI_DB_PATH").map(PathBuf::from),
            admin_email: non_empty("GOTOCHI_ADMIN_EMAIL"),
            save_debounce: Duration::from_millis(
                positive("GOTOCHI_SAVE_DEBOUNCE_MS").unwrap_or(DEFAULT_SAVE_DEBOUNCE_MS),
            ),
            http_timeout: Duration::from_secs(
                positive("GOTOCHI_HTTP_TIMEOUT_SECS").unwrap_or(DEFAULT_HTTP_TIMEOUT_SECS),
            ),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    fn from_map(pairs: &[(&str, &str)]) -> AppConfig {
        let map: HashMap<String, String> = pairs
            .iter()
            .map(|(k, v)| (k.to_string(), v.to_string()))
            .collect();
        AppConfig::from_lookup(|key| map.get(key).cloned())
    }

    #[test]
    fn test_defaults_when_unset() {
        assert_eq!(from_map(&[]), AppConfig::default());
    }

    #[test]
    fn test_values_read() {
        let config = from_map(&[
            ("GOTOCHI_CATALOG_URL", "https://catalog.example"),
            ("GOTOCHI_DB_PATH", "/tmp/g.redb"),
            ("GOTOCHI_ADMIN_EMAIL", "admin@example.com"),
            ("GOTOCHI_SAVE_DEBOUNCE_MS", "250"),
        ]);
        assert_eq!(config.catalog_url, "https://catalog.example");
        assert_eq!(config.db_path, Some(PathBuf::from("/tmp/g.redb")));
        assert_eq!(config.admin_email.as_deref(), Some("admin@example.com"));
        assert_eq!(config.save_debounce, Duration::from_millis(250));
    }

    #[test]
    fn test_invalid_numbers_fall_back() {
        let config = from_map(&[
            ("GOTOCHI_SAVE_DEBOUNCE_MS", "0"),
            ("GOTOCHI_HTTP_TIMEOUT_SECS", "soon"),
            ("GOTOCHI_ADMIN_EMAIL", "  "),
        ]);
        assert_eq!(config.save_debounce, Duration::from_millis(DEFAULT_SAVE_DEBOUNCE_MS));
        assert_eq!(config.http_timeout, Duration::from_secs(DEFAULT_HTTP_TIMEOUT_SECS));
        assert_eq!(config.admin_email, None);
    }
}
