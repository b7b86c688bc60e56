//! # Configuration File Loading
//!
//! Loads configuration from TOML or YAML files, detecting the format from
//! the file extension.

use crate::config::CoreConfig;
use errors::ConfigError;
use std::path::Path;

/// Load configuration from a TOML file.
pub fn load_from_toml(path: &Path) -> Result<CoreConfig, ConfigError> {
    let contents = read(path)?;
    toml::from_str(&contents).map_err(|e| ConfigError::Parse {
        format: "TOML".to_string(),
        reason: e.to_string(),
    })
}

/// Load configuration from a YAML file.
pub fn load_from_yaml(path: &Path) -> Result<CoreConfig, ConfigError> {
    let contents = read(path)?;
    serde_yaml::from_str(&contents).map_err(|e| ConfigError::Parse {
        format: "YAML".to_string(),
        reason: e.to_string(),
    })
}

/// Load configuration from file with auto-detection.
///
/// ## Supported Formats
/// - `.toml`: TOML format
/// - `.yaml` / `.yml`: YAML format
pub fn load_from_file(path: &Path) -> Result<CoreConfig, ConfigError> {
    let extension = path
        .extension()
        .and_then(|s| s.to_str())
        .ok_or_else(|| ConfigError::UnsupportedFormat {
            extension: String::new(),
        })?;

    match extension.to_lowercase().as_str() {
        "toml" => load_from_toml(path),
        "yaml" | "yml" => load_from_yaml(path),
        other => Err(ConfigError::UnsupportedFormat {
            extension: other.to_string(),
        }),
    }
}

fn read(path: &Path) -> Result<String, ConfigError> {
    std::fs::read_to_string(path).map_err(|e| ConfigError::File {
        path: path.display().to_string(),
        reason: e.to_string(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::fs;
    use tempfile::TempDir;

    #[test]
    fn test_load_from_toml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("core.toml");
        fs::write(
            &path,
            r#"
[redis]
host = "redishost"
port = 6380

[conversation]
window_size = 10
lock_timeout_ms = 1500

[cache]
tier1_capacity = 50

[observability]
logging_level = "debug"
"#,
        )
        .unwrap();

        let config = load_from_file(&path).unwrap();
        assert_eq!(config.redis.host, "redishost");
        assert_eq!(config.redis.port, 6380);
        assert_eq!(config.conversation.window_size, 10);
        assert_eq!(config.conversation.lock_timeout_ms, 1500);
        assert_eq!(config.cache.tier1_capacity, 50);
        assert_eq!(config.cache.tier2_capacity, 1000);
        assert_eq!(config.observability.logging_level, "debug");
    }

    #[test]
    fn test_load_from_yaml() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("core.yml");
        fs::write(
            &path,
            r#"
redis:
  enabled: false
resilience:
  max_attempts: 4
  base_delay_ms: 250
hot_path:
  max_words: 3
"#,
        )
        .unwrap();

        let config = load_from_file(&path).unwrap();
        assert!(!config.redis.enabled);
        assert_eq!(config.resilience.max_attempts, 4);
        assert_eq!(config.resilience.base_delay_ms, 250);
        assert_eq!(config.hot_path.max_words, 3);
    }

    #[test]
    fn test_load_from_file_unsupported() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("core.ini");
        fs::write(&path, "window_size=3").unwrap();

        assert!(matches!(
            load_from_file(&path),
            Err(ConfigError::UnsupportedFormat { ref extension }) if extension == "ini"
        ));
    }

    #[test]
    fn test_load_from_file_missing() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("absent.toml");
        assert!(matches!(load_from_file(&path), Err(ConfigError::File { .. })));
    }

    #[test]
    fn test_load_from_toml_parse_error() {
        let dir = TempDir::new().unwrap();
        let path = dir.path().join("broken.toml");
        fs::write(&path, "[conversation\nwindow_size = ").unwrap();
        assert!(matches!(load_from_file(&path), Err(ConfigError::Parse { .. })));
    }
}
