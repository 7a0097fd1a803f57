//! Configuration file parser for ~/.config/bugdesk/config.toml.
//!
//! The config file is optional; a missing file yields `Config::default()`.
//! Unknown keys are accepted but logged as warnings so typos get noticed.
use serde::Deserialize;
use std::path::{Path, PathBuf};
use thiserror::Error;

use crate::pages::{clamp_page_max, AuthLevel, DEFAULT_PAGE_MAX};

// ============================================================================
// Error Types
// ============================================================================

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Failed to read config file: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid TOML in config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Config file too large: {0}")]
    TooLarge(String),
}

// ============================================================================
// Configuration Structs
// ============================================================================

/// Top-level application configuration.
///
/// Every key is optional; missing keys fall back to `Default::default()`.
/// Command-line flags take precedence over these values.
#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Database file. Relative paths are resolved against the config
    /// directory; `None` means `bugdesk.db` there.
    pub database_path: Option<PathBuf>,

    /// Login name used for submissions. Empty means anonymous.
    pub user: String,

    /// Privilege claimed by `user`.
    pub level: AuthLevel,

    /// Rows per listing page, clamped to 10..=1000.
    pub page_max: i64,

    /// Shown in listing headers.
    pub project_name: String,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            database_path: None,
            user: String::new(),
            level: AuthLevel::Anonymous,
            page_max: DEFAULT_PAGE_MAX,
            project_name: "bugdesk".to_string(),
        }
    }
}

impl Config {
    /// Maximum config file size (1 MB).
    const MAX_FILE_SIZE: u64 = 1_048_576;

    const KNOWN_KEYS: [&'static str; 5] =
        ["database_path", "user", "level", "page_max", "project_name"];

    /// Load configuration from a TOML file.
    ///
    /// - Missing file → `Ok(Config::default())`
    /// - Empty file → `Ok(Config::default())`
    /// - Invalid TOML → `Err(ConfigError::Parse)` with line number info
    /// - Unknown keys → accepted, logged as warning
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        match std::fs::metadata(path) {
            Ok(meta) if meta.len() > Self::MAX_FILE_SIZE => {
                return Err(ConfigError::TooLarge(format!(
                    "Config file is {} bytes (max {} bytes)",
                    meta.len(),
                    Self::MAX_FILE_SIZE
                )));
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "No config file found, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
            Ok(_) => {}
        }

        let content = match std::fs::read_to_string(path) {
            Ok(c) => c,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                tracing::debug!(path = %path.display(), "Config file disappeared, using defaults");
                return Ok(Self::default());
            }
            Err(e) => return Err(ConfigError::Io(e)),
        };

        let config = Self::parse(&content)?;
        tracing::info!(
            path = %path.display(),
            user = %config.user,
            level = ?config.level,
            "Loaded configuration"
        );
        Ok(config)
    }

    /// Parse TOML text, applying the same defaults and clamping as [`Config::load`].
    pub fn parse(content: &str) -> Result<Self, ConfigError> {
        if content.trim().is_empty() {
            return Ok(Self::default());
        }

        if let Ok(raw) = content.parse::<toml::Table>() {
            for key in raw.keys() {
                if !Self::KNOWN_KEYS.contains(&key.as_str()) {
                    tracing::warn!(key = %key, "Unknown key in config file, ignoring");
                }
            }
        }

        let mut config: Config = toml::from_str(content)?;
        let clamped = clamp_page_max(config.page_max);
        if clamped != config.page_max {
            tracing::warn!(
                page_max = config.page_max,
                clamped,
                "page_max out of range, clamping"
            );
            config.page_max = clamped;
        }
        Ok(config)
    }

    /// Database location, resolving relative paths against `config_dir`.
    pub fn resolve_database_path(&self, config_dir: &Path) -> PathBuf {
        match &self.database_path {
            Some(path) if path.is_absolute() => path.clone(),
            Some(path) => config_dir.join(path),
            None => config_dir.join("bugdesk.db"),
        }
    }
}

// ============================================================================
// Tests
// ============================================================================

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    fn scratch_dir(name: &str) -> PathBuf {
        let dir = std::env::temp_dir().join(format!("bugdesk_config_test_{}", name));
        std::fs::create_dir_all(&dir).unwrap();
        dir
    }

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert_eq!(config.database_path, None);
        assert_eq!(config.user, "");
        assert_eq!(config.level, AuthLevel::Anonymous);
        assert_eq!(config.page_max, 10);
        assert_eq!(config.project_name, "bugdesk");
    }

    #[test]
    fn test_missing_file_returns_default() {
        let path = Path::new("/tmp/bugdesk_test_nonexistent_config.toml");
        let config = Config::load(path).unwrap();
        assert_eq!(config, Config::default());
    }

    #[test]
    fn test_empty_file_returns_default() {
        let dir = scratch_dir("empty");
        let path = dir.join("config.toml");
        std::fs::write(&path, "   \n  \n").unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(config, Config::default());

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_partial_config_uses_defaults_for_missing() {
        let config = Config::parse("user = \"jane\"\n").unwrap();
        assert_eq!(config.user, "jane");
        assert_eq!(config.level, AuthLevel::Anonymous);
        assert_eq!(config.page_max, 10);
    }

    #[test]
    fn test_full_config() {
        let dir = scratch_dir("full");
        let path = dir.join("config.toml");
        let content = r#"
database_path = "/srv/bugdesk/reports.db"
user = "mike"
level = "devel"
page_max = 50
project_name = "Printing System"
"#;
        std::fs::write(&path, content).unwrap();

        let config = Config::load(&path).unwrap();
        assert_eq!(
            config.database_path.as_deref(),
            Some(Path::new("/srv/bugdesk/reports.db"))
        );
        assert_eq!(config.user, "mike");
        assert_eq!(config.level, AuthLevel::Devel);
        assert_eq!(config.page_max, 50);
        assert_eq!(config.project_name, "Printing System");

        std::fs::remove_dir_all(&dir).ok();
    }

    #[test]
    fn test_invalid_toml_returns_error() {
        let err = Config::parse("this is not [valid toml").unwrap_err();
        assert!(matches!(err, ConfigError::Parse(_)));
        assert!(err.to_string().contains("Invalid TOML"));
    }

    #[test]
    fn test_unknown_level_is_error() {
        assert!(matches!(
            Config::parse("level = \"root\"\n"),
            Err(ConfigError::Parse(_))
        ));
    }

    #[test]
    fn test_unknown_keys_accepted() {
        let config = Config::parse("user = \"jane\"\ntheme = \"dark\"\n").unwrap();
        assert_eq!(config.user, "jane");
    }

    #[test]
    fn test_wrong_type_returns_error() {
        assert!(Config::parse("page_max = \"lots\"\n").is_err());
    }

    #[test]
    fn test_page_max_is_clamped() {
        assert_eq!(Config::parse("page_max = 2\n").unwrap().page_max, 10);
        assert_eq!(Config::parse("page_max = 99999\n").unwrap().page_max, 1000);
    }

    #[test]
    fn test_database_path_resolution() {
        let dir = Path::new("/home/jane/.config/bugdesk");
        assert_eq!(
            Config::default().resolve_database_path(dir),
            dir.join("bugdesk.db")
        );

        let relative = Config {
            database_path: Some(PathBuf::from("other.db")),
            ..Config::default()
        };
        assert_eq!(relative.resolve_database_path(dir), dir.join("other.db"));

        let absolute = Config {
            database_path: Some(PathBuf::from("/var/lib/bugdesk.db")),
            ..Config::default()
        };
        assert_eq!(
            absolute.resolve_database_path(dir),
            PathBuf::from("/var/lib/bugdesk.db")
        );
    }

    #[test]
    fn test_too_large_file_rejected() {
        let dir = scratch_dir("too_large");
        let path = dir.join("config.toml");
        std::fs::write(&path, "a".repeat(1_048_577)).unwrap();

        let err = Config::load(&path).unwrap_err();
        assert!(matches!(err, ConfigError::TooLarge(_)));
        assert!(err.to_string().contains("too large"));

        std::fs::remove_dir_all(&dir).ok();
    }
}
