//! Configuration file loading

use std::fs;
use std::path::Path;

use anyhow::{Context, Result};
use serde::Deserialize;
use stockfile_engine::StoreConfig;

/// Contents of the optional TOML configuration file
///
/// ```toml
/// log_level = "debug"
/// data_file = "products.db"
/// audit_log = "operations.log"
/// low_stock_threshold = 10
/// ```
#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct Settings {
    /// Log level (trace, debug, info, warn, error)
    pub log_level: String,
    #[serde(flatten)]
    pub store: StoreConfig,
}

impl Default for Settings {
    fn default() -> Self {
        Settings {
            log_level: "info".to_string(),
            store: StoreConfig::default(),
        }
    }
}

impl Settings {
    /// Load settings from `path`, or defaults when no path is given
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let Some(path) = path else {
            return Ok(Settings::default());
        };
        let text = fs::read_to_string(path)
            .with_context(|| format!("reading config {}", path.display()))?;
        Self::parse(&text).with_context(|| format!("parsing config {}", path.display()))
    }

    pub fn parse(text: &str) -> Result<Self> {
        let mut settings: Settings = toml::from_str(text)?;
        // An empty path in the file means "no audit trail"
        if settings
            .store
            .audit_log
            .as_ref()
            .is_some_and(|p| p.as_os_str().is_empty())
        {
            settings.store.audit_log = None;
        }
        Ok(settings)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    #[test]
    fn test_parse_full() {
        let settings = Settings::parse(
            r#"
            log_level = "debug"
            data_file = "products.db"
            audit_log = "usage.log"
            event_capacity = 8
            low_stock_threshold = 10
            "#,
        )
        .unwrap();
        assert_eq!(settings.log_level, "debug");
        assert_eq!(settings.store.data_file, PathBuf::from("products.db"));
        assert_eq!(settings.store.audit_log, Some(PathBuf::from("usage.log")));
        assert_eq!(settings.store.event_capacity, 8);
        assert_eq!(settings.store.low_stock_threshold, 10);
    }

    #[test]
    fn test_parse_partial_uses_defaults() {
        let settings = Settings::parse("data_file = \"x.db\"").unwrap();
        assert_eq!(settings.log_level, "info");
        assert_eq!(settings.store.audit_log, Some(PathBuf::from("operations.log")));
    }

    #[test]
    fn test_empty_audit_log_disables() {
        let settings = Settings::parse("audit_log = \"\"").unwrap();
        assert!(settings.store.audit_log.is_none());
    }

    #[test]
    fn test_load_from_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("stockfile.toml");
        fs::write(&path, "low_stock_threshold = 2\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.store.low_stock_threshold, 2);

        assert!(Settings::load(Some(&dir.path().join("missing.toml"))).is_err());
        assert_eq!(Settings::load(None).unwrap().log_level, "info");
    }
}
