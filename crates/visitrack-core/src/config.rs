//! Tracking configuration
//!
//! Defaults, TOML loading and `VISITRACK_*` environment overrides.

use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Environment variable overriding [`TrackingConfig::api_base_url`]
pub const ENV_API_BASE_URL: &str = "VISITRACK_API_BASE_URL";
/// Environment variable overriding [`TrackingConfig::home_path`]
pub const ENV_HOME_PATH: &str = "VISITRACK_HOME_PATH";
/// Environment variable overriding [`TrackingConfig::request_timeout_ms`]
pub const ENV_REQUEST_TIMEOUT_MS: &str = "VISITRACK_REQUEST_TIMEOUT_MS";
/// Environment variable overriding [`TrackingConfig::storage_path`]
pub const ENV_STORAGE_PATH: &str = "VISITRACK_STORAGE_PATH";

/// Tracking client configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackingConfig {
    /// Base URL of the remote tracking service
    pub api_base_url: String,
    /// Path counted as a home visit (exact match)
    pub home_path: String,
    /// Bound on every remote call in milliseconds
    pub request_timeout_ms: u64,
    /// File backing local storage; in-memory when unset
    pub storage_path: Option<PathBuf>,
    /// Platform / user-agent string override
    pub platform: Option<String>,
    /// IANA timezone override
    pub timezone: Option<String>,
}

impl TrackingConfig {
    /// Create default configuration
    #[inline]
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// With remote base URL
    #[inline]
    #[must_use]
    pub fn with_api_base_url(mut self, url: impl Into<String>) -> Self {
        self.api_base_url = url.into();
        self
    }

    /// With home path
    #[inline]
    #[must_use]
    pub fn with_home_path(mut self, path: impl Into<String>) -> Self {
        self.home_path = path.into();
        self
    }

    /// With request timeout
    #[inline]
    #[must_use]
    pub fn with_request_timeout(mut self, timeout: Duration) -> Self {
        self.request_timeout_ms = u64::try_from(timeout.as_millis()).unwrap_or(u64::MAX);
        self
    }

    /// With file-backed storage
    #[inline]
    #[must_use]
    pub fn with_storage_path(mut self, path: impl Into<PathBuf>) -> Self {
        self.storage_path = Some(path.into());
        self
    }

    /// With platform string used for OS detection
    #[inline]
    #[must_use]
    pub fn with_platform(mut self, platform: impl Into<String>) -> Self {
        self.platform = Some(platform.into());
        self
    }

    /// With timezone
    #[inline]
    #[must_use]
    pub fn with_timezone(mut self, timezone: impl Into<String>) -> Self {
        self.timezone = Some(timezone.into());
        self
    }

    /// Request timeout as a duration
    #[inline]
    #[must_use]
    pub fn request_timeout(&self) -> Duration {
        Duration::from_millis(self.request_timeout_ms)
    }

    /// Parse from TOML text; missing keys keep their defaults
    ///
    /// # Errors
    /// - `ConfigError::Parse` for invalid TOML
    /// - `ConfigError::Invalid` if validation fails
    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        let config: Self = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    /// Load a TOML file, then apply environment overrides
    ///
    /// # Errors
    /// - `ConfigError::Read` if the file cannot be read
    /// - `ConfigError::Parse` / `ConfigError::Invalid` as for [`Self::from_toml_str`]
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        let config: Self = toml::from_str(&text)?;
        let config = config.with_env_overrides(|key| std::env::var(key).ok())?;
        tracing::debug!(path = %path.display(), "loaded tracking config");
        Ok(config)
    }

    /// Defaults plus process environment overrides
    ///
    /// # Errors
    /// - `ConfigError::Invalid` if an override is malformed
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::default().with_env_overrides(|key| std::env::var(key).ok())
    }

    /// Apply overrides from a variable lookup and re-validate
    ///
    /// # Errors
    /// - `ConfigError::Invalid` if an override is malformed
    pub fn with_env_overrides<F>(mut self, lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup(ENV_API_BASE_URL) {
            self.api_base_url = url;
        }
        if let Some(path) = lookup(ENV_HOME_PATH) {
            self.home_path = path;
        }
        if let Some(raw) = lookup(ENV_REQUEST_TIMEOUT_MS) {
            self.request_timeout_ms = raw.trim().parse().map_err(|e| {
                ConfigError::invalid("request_timeout_ms", format!("{raw:?}: {e}"))
            })?;
        }
        if let Some(path) = lookup(ENV_STORAGE_PATH) {
            self.storage_path = Some(PathBuf::from(path));
        }
        self.validate()?;
        Ok(self)
    }

    /// Check invariants
    ///
    /// # Errors
    /// - `ConfigError::Invalid` naming the first bad field
    pub fn validate(&self) -> Result<(), ConfigError> {
        let url = reqwest::Url::parse(&self.api_base_url)
            .map_err(|e| ConfigError::invalid("api_base_url", e.to_string()))?;
        if url.cannot_be_a_base() {
            return Err(ConfigError::invalid("api_base_url", "url cannot carry paths"));
        }
        if !self.home_path.starts_with('/') {
            return Err(ConfigError::invalid(
                "home_path",
                format!("{:?} must start with '/'", self.home_path),
            ));
        }
        if self.request_timeout_ms == 0 {
            return Err(ConfigError::invalid("request_timeout_ms", "must be positive"));
        }
        Ok(())
    }
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            api_base_url: "http://localhost:8000/api/".to_string(),
            home_path: "/".to_string(),
            request_timeout_ms: 5_000,
            storage_path: None,
            platform: None,
            timezone: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;

    #[test]
    fn defaults_validate() {
        let config = TrackingConfig::default();
        assert!(config.validate().is_ok());
        assert_eq!(config.request_timeout(), Duration::from_secs(5));
    }

    #[test]
    fn toml_keeps_defaults_for_missing_keys() {
        let config = TrackingConfig::from_toml_str(
            r#"
            api_base_url = "https://tracking.example.com/api/"
            request_timeout_ms = 250
            "#,
        )
        .unwrap();
        assert_eq!(config.api_base_url, "https://tracking.example.com/api/");
        assert_eq!(config.request_timeout_ms, 250);
        assert_eq!(config.home_path, "/");
        assert!(config.storage_path.is_none());
    }

    #[test]
    fn env_overrides_apply() {
        let vars: HashMap<&str, &str> = [
            (ENV_HOME_PATH, "/home"),
            (ENV_REQUEST_TIMEOUT_MS, "1200"),
            (ENV_STORAGE_PATH, "/tmp/visitrack.json"),
        ]
        .into_iter()
        .collect();

        let config = TrackingConfig::default()
            .with_env_overrides(|k| vars.get(k).map(|v| (*v).to_string()))
            .unwrap();
        assert_eq!(config.home_path, "/home");
        assert_eq!(config.request_timeout_ms, 1200);
        assert_eq!(
            config.storage_path.as_deref(),
            Some(Path::new("/tmp/visitrack.json"))
        );
    }

    #[test]
    fn malformed_timeout_override_rejected() {
        let result = TrackingConfig::default().with_env_overrides(|k| {
            (k == ENV_REQUEST_TIMEOUT_MS).then(|| "soon".to_string())
        });
        assert!(matches!(
            result,
            Err(ConfigError::Invalid {
                field: "request_timeout_ms",
                ..
            })
        ));
    }

    #[test]
    fn validation_rejects_bad_values() {
        assert!(TrackingConfig::default()
            .with_home_path("home")
            .validate()
            .is_err());
        assert!(TrackingConfig::default()
            .with_api_base_url("not a url")
            .validate()
            .is_err());
        assert!(TrackingConfig::default()
            .with_request_timeout(Duration::ZERO)
            .validate()
            .is_err());
    }
}
