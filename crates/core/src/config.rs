//! Config file parsing for `~/.config/bookscan/config.toml`.
//!
//! Environment variables `BOOKSCAN_APPLICATION_ID` and `BOOKSCAN_CATALOG_ENDPOINT`
//! override the file; see [`load_config`].

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{ConfigError, LookupError};

pub const DEFAULT_CATALOG_ENDPOINT: &str =
    "https://app.rakuten.co.jp/services/api/BooksBook/Search/20170404";
pub const DEFAULT_TIMEOUT_SECS: u64 = 12;

pub const ENV_APPLICATION_ID: &str = "BOOKSCAN_APPLICATION_ID";
pub const ENV_CATALOG_ENDPOINT: &str = "BOOKSCAN_CATALOG_ENDPOINT";

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub catalog: CatalogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CatalogConfig {
    /// Service application ID sent as `applicationId`. Required.
    #[serde(default)]
    pub application_id: String,
    #[serde(default = "default_endpoint")]
    pub endpoint: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_endpoint() -> String {
    DEFAULT_CATALOG_ENDPOINT.to_string()
}
fn default_timeout_secs() -> u64 {
    DEFAULT_TIMEOUT_SECS
}

impl Default for CatalogConfig {
    fn default() -> Self {
        Self {
            application_id: String::new(),
            endpoint: default_endpoint(),
            timeout_secs: DEFAULT_TIMEOUT_SECS,
        }
    }
}

impl CatalogConfig {
    pub fn new(application_id: impl Into<String>) -> Self {
        Self {
            application_id: application_id.into(),
            ..Self::default()
        }
    }

    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    pub fn with_timeout_secs(mut self, secs: u64) -> Self {
        self.timeout_secs = secs;
        self
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs)
    }

    /// Startup precondition: an empty credential is a deployment error.
    pub fn ensure_credential(&self) -> Result<(), LookupError> {
        if self.application_id.trim().is_empty() {
            return Err(LookupError::MisconfiguredCredential);
        }
        Ok(())
    }
}

/// Load config from the default path, then apply environment overrides.
/// A missing or unreadable file falls back to defaults.
pub fn load_config() -> AppConfig {
    let cfg = config_path()
        .and_then(|p| load_config_from(&p).ok())
        .unwrap_or_default();
    apply_env(cfg, |key| std::env::var(key).ok())
}

/// Strict load of a specific file (no environment overrides).
pub fn load_config_from(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = std::fs::read_to_string(path)?;
    Ok(toml::from_str::<AppConfig>(&content)?)
}

/// Write `cfg` to `path`, creating parent directories.
pub fn save_config_to(cfg: &AppConfig, path: &Path) -> Result<(), ConfigError> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    std::fs::write(path, toml::to_string_pretty(cfg)?)?;
    Ok(())
}

/// Return the default config file path (for init and show).
pub fn config_path() -> Option<PathBuf> {
    dirs::config_dir().map(|mut p| {
        p.push("bookscan");
        p.push("config.toml");
        p
    })
}

/// Overlay environment values; `lookup` is injectable so tests stay hermetic.
pub fn apply_env<F>(mut cfg: AppConfig, lookup: F) -> AppConfig
where
    F: Fn(&str) -> Option<String>,
{
    if let Some(id) = lookup(ENV_APPLICATION_ID) {
        cfg.catalog.application_id = id;
    }
    if let Some(endpoint) = lookup(ENV_CATALOG_ENDPOINT) {
        cfg.catalog.endpoint = endpoint;
    }
    cfg
}

/// Set a dotted key such as `catalog.application_id`.
pub fn set_config_key(cfg: &mut AppConfig, key: &str, value: &str) -> Result<(), ConfigError> {
    match key.split_once('.') {
        Some(("catalog", "application_id")) => cfg.catalog.application_id = value.to_string(),
        Some(("catalog", "endpoint")) => cfg.catalog.endpoint = value.to_string(),
        Some(("catalog", "timeout_secs")) => {
            cfg.catalog.timeout_secs = value.parse().map_err(|_| ConfigError::InvalidValue {
                key: key.to_string(),
                value: value.to_string(),
            })?
        }
        _ => return Err(ConfigError::UnknownKey(key.to_string())),
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn defaults_match_reference_service() {
        let cfg = AppConfig::default();
        assert_eq!(cfg.catalog.endpoint, DEFAULT_CATALOG_ENDPOINT);
        assert_eq!(cfg.catalog.timeout(), Duration::from_secs(12));
        assert!(cfg.catalog.application_id.is_empty());
    }

    #[test]
    fn empty_credential_is_rejected() {
        assert_eq!(
            CatalogConfig::default().ensure_credential(),
            Err(LookupError::MisconfiguredCredential)
        );
        assert_eq!(
            CatalogConfig::new("   ").ensure_credential(),
            Err(LookupError::MisconfiguredCredential)
        );
        assert!(CatalogConfig::new("app-123").ensure_credential().is_ok());
    }

    #[test]
    fn partial_file_fills_defaults() {
        let cfg: AppConfig = toml::from_str("[catalog]\napplication_id = \"abc\"\n").unwrap();
        assert_eq!(cfg.catalog.application_id, "abc");
        assert_eq!(cfg.catalog.endpoint, DEFAULT_CATALOG_ENDPOINT);
        assert_eq!(cfg.catalog.timeout_secs, DEFAULT_TIMEOUT_SECS);
    }

    #[test]
    fn save_and_load_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("nested").join("config.toml");
        let mut cfg = AppConfig::default();
        set_config_key(&mut cfg, "catalog.application_id", "app-1").unwrap();
        set_config_key(&mut cfg, "catalog.timeout_secs", "5").unwrap();
        save_config_to(&cfg, &path).unwrap();

        let loaded = load_config_from(&path).unwrap();
        assert_eq!(loaded.catalog.application_id, "app-1");
        assert_eq!(loaded.catalog.timeout_secs, 5);
    }

    #[test]
    fn malformed_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "[catalog\n").unwrap();
        assert!(matches!(load_config_from(&path), Err(ConfigError::Parse(_))));
    }

    #[test]
    fn env_overrides_file_values() {
        let cfg = apply_env(AppConfig::default(), |key| match key {
            ENV_APPLICATION_ID => Some("from-env".to_string()),
            _ => None,
        });
        assert_eq!(cfg.catalog.application_id, "from-env");
        assert_eq!(cfg.catalog.endpoint, DEFAULT_CATALOG_ENDPOINT);
    }

    #[test]
    fn unknown_and_invalid_keys() {
        let mut cfg = AppConfig::default();
        assert!(matches!(
            set_config_key(&mut cfg, "catalog.nope", "x"),
            Err(ConfigError::UnknownKey(_))
        ));
        assert!(matches!(
            set_config_key(&mut cfg, "catalog.timeout_secs", "soon"),
            Err(ConfigError::InvalidValue { .. })
        ));
    }
}
