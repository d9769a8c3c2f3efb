//! Configuration file discovery and loading.

use super::types::VerifyConfig;
use super::validation::Validatable;
use std::path::{Path, PathBuf};

/// File names searched in each candidate directory, in order.
const CONFIG_FILE_NAMES: &[&str] = &[".tmdiff.yaml", ".tmdiff.yml", "tmdiff.yaml", "tmdiff.yml"];

/// Locate a config file.
///
/// Search order:
/// 1. Explicit path if provided
/// 2. Current directory
/// 3. Git repository root
/// 4. User config directory (`~/.config/tmdiff/`)
/// 5. Home directory
#[must_use]
pub fn discover_config_file(explicit_path: Option<&Path>) -> Option<PathBuf> {
    if let Some(path) = explicit_path {
        if path.exists() {
            return Some(path.to_path_buf());
        }
    }

    let mut candidates: Vec<PathBuf> = Vec::new();
    if let Ok(cwd) = std::env::current_dir() {
        candidates.push(cwd);
    }
    if let Some(git_root) = find_git_root() {
        candidates.push(git_root);
    }
    if let Some(config_dir) = dirs::config_dir() {
        candidates.push(config_dir.join("tmdiff"));
    }
    if let Some(home) = dirs::home_dir() {
        candidates.push(home);
    }

    candidates.iter().find_map(|dir| find_config_in_dir(dir))
}

fn find_config_in_dir(dir: &Path) -> Option<PathBuf> {
    CONFIG_FILE_NAMES
        .iter()
        .map(|name| dir.join(name))
        .find(|path| path.exists())
}

/// Walk up from the current directory to the first one holding `.git`.
fn find_git_root() -> Option<PathBuf> {
    let cwd = std::env::current_dir().ok()?;
    cwd.ancestors()
        .find(|dir| dir.join(".git").exists())
        .map(Path::to_path_buf)
}

/// Failure to load a config file.
#[derive(Debug)]
pub enum ConfigFileError {
    NotFound(PathBuf),
    Io(std::io::Error),
    Parse(serde_yaml::Error),
    /// The file parsed but holds invalid values
    Invalid(Vec<super::ConfigError>),
}

impl std::fmt::Display for ConfigFileError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::NotFound(path) => write!(f, "Config file not found: {}", path.display()),
            Self::Io(e) => write!(f, "Failed to read config file: {e}"),
            Self::Parse(e) => write!(f, "Failed to parse config file: {e}"),
            Self::Invalid(errors) => {
                let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
                write!(f, "Invalid config values: {}", joined.join("; "))
            }
        }
    }
}

impl std::error::Error for ConfigFileError {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Parse(e) => Some(e),
            Self::NotFound(_) | Self::Invalid(_) => None,
        }
    }
}

impl From<std::io::Error> for ConfigFileError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err)
    }
}

impl From<serde_yaml::Error> for ConfigFileError {
    fn from(err: serde_yaml::Error) -> Self {
        Self::Parse(err)
    }
}

impl From<ConfigFileError> for crate::ThreatDiffError {
    fn from(err: ConfigFileError) -> Self {
        Self::config(err.to_string())
    }
}

/// Load and validate a config file.
pub fn load_config_file(path: &Path) -> Result<VerifyConfig, ConfigFileError> {
    if !path.exists() {
        return Err(ConfigFileError::NotFound(path.to_path_buf()));
    }

    let content = std::fs::read_to_string(path)?;
    let config: VerifyConfig = if content.trim().is_empty() {
        VerifyConfig::default()
    } else {
        serde_yaml::from_str(&content)?
    };
    let errors = config.validate();
    if !errors.is_empty() {
        return Err(ConfigFileError::Invalid(errors));
    }
    Ok(config)
}

/// Load the discovered config, falling back to defaults.
///
/// Returns the path the config was loaded from, if any.
#[must_use]
pub fn load_or_default(explicit_path: Option<&Path>) -> (VerifyConfig, Option<PathBuf>) {
    discover_config_file(explicit_path).map_or_else(
        || (VerifyConfig::default(), None),
        |path| match load_config_file(&path) {
            Ok(config) => {
                tracing::debug!(path = %path.display(), "Loaded config");
                (config, Some(path))
            }
            Err(e) => {
                tracing::warn!("Failed to load config from {}: {}", path.display(), e);
                (VerifyConfig::default(), None)
            }
        },
    )
}

/// Example config file content with every default spelled out.
#[must_use]
pub fn generate_example_config() -> String {
    format!(
        "# tmdiff configuration\n\
         # Place this file at .tmdiff.yaml in your project root or ~/.config/tmdiff/tmdiff.yaml\n\
         # The API token is read from the environment, never from this file.\n\n{}",
        serde_yaml::to_string(&VerifyConfig::default()).unwrap_or_default()
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;
    use tempfile::TempDir;

    #[test]
    fn test_find_config_in_dir() {
        let tmp = TempDir::new().unwrap();
        let config_path = tmp.path().join(".tmdiff.yaml");
        std::fs::write(&config_path, "polling:\n  interval: 5s\n").unwrap();
        assert_eq!(find_config_in_dir(tmp.path()), Some(config_path));
    }

    #[test]
    fn test_find_config_prefers_dotfile() {
        let tmp = TempDir::new().unwrap();
        std::fs::write(tmp.path().join("tmdiff.yml"), "").unwrap();
        std::fs::write(tmp.path().join(".tmdiff.yml"), "").unwrap();
        assert_eq!(
            find_config_in_dir(tmp.path()),
            Some(tmp.path().join(".tmdiff.yml"))
        );
    }

    #[test]
    fn test_explicit_path_wins() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("custom.yaml");
        std::fs::write(&path, "").unwrap();
        assert_eq!(discover_config_file(Some(&path)), Some(path));
    }

    #[test]
    fn test_load_config_file() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        let yaml = r#"
polling:
  interval: 500ms
  timeout: 5m
remote:
  base_url: https://example.iriusrisk.com
  read_retries: 5
versions:
  transient_prefix: ci-target
"#;
        std::fs::write(&path, yaml).unwrap();

        let config = load_config_file(&path).unwrap();
        assert_eq!(config.polling.interval, Duration::from_millis(500));
        assert_eq!(config.polling.timeout, Duration::from_secs(300));
        assert_eq!(config.polling.max_polls, 300);
        assert_eq!(config.remote.read_retries, 5);
        assert_eq!(config.versions.transient_prefix, "ci-target");
        assert_eq!(config.versions.backup_prefix, "tmdiff-backup");
    }

    #[test]
    fn test_load_rejects_invalid_values() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "polling:\n  max_polls: 0\n").unwrap();
        assert!(matches!(
            load_config_file(&path),
            Err(ConfigFileError::Invalid(_))
        ));
    }

    #[test]
    fn test_load_rejects_bad_duration() {
        let tmp = TempDir::new().unwrap();
        let path = tmp.path().join("config.yaml");
        std::fs::write(&path, "polling:\n  interval: soon\n").unwrap();
        assert!(matches!(
            load_config_file(&path),
            Err(ConfigFileError::Parse(_))
        ));
    }

    #[test]
    fn test_load_config_file_not_found() {
        let result = load_config_file(Path::new("/nonexistent/tmdiff.yaml"));
        assert!(matches!(result, Err(ConfigFileError::NotFound(_))));
    }

    #[test]
    fn test_example_config_round_trips() {
        let example = generate_example_config();
        assert!(example.contains("polling:"));
        let parsed: VerifyConfig = serde_yaml::from_str(&example).unwrap();
        assert_eq!(parsed, VerifyConfig::default());
    }
}
