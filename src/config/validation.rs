//! Configuration validation.

use super::types::*;
use std::time::Duration;

/// A configuration value that failed validation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConfigError {
    /// Dotted path of the offending field
    pub field: String,
    pub message: String,
}

impl ConfigError {
    fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

impl std::fmt::Display for ConfigError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}: {}", self.field, self.message)
    }
}

impl std::error::Error for ConfigError {}

/// Types that can check their own values.
pub trait Validatable {
    /// Validate the configuration, returning every problem found.
    fn validate(&self) -> Vec<ConfigError>;

    fn is_valid(&self) -> bool {
        self.validate().is_empty()
    }
}

impl Validatable for VerifyConfig {
    fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        errors.extend(self.polling.validate());
        errors.extend(self.remote.validate());
        errors.extend(self.workspace.validate());
        errors.extend(self.versions.validate());
        errors
    }
}

impl Validatable for PollingConfig {
    fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.timeout.is_zero() {
            errors.push(ConfigError::new("polling.timeout", "must be greater than zero"));
        }
        if self.max_polls == 0 {
            errors.push(ConfigError::new("polling.max_polls", "must be at least 1"));
        }
        if self.interval > self.timeout {
            errors.push(ConfigError::new(
                "polling.interval",
                format!(
                    "{} exceeds the polling timeout of {}",
                    crate::utils::format_duration(self.interval),
                    crate::utils::format_duration(self.timeout)
                ),
            ));
        }
        errors
    }
}

impl Validatable for RemoteConfig {
    fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.read_retries == 0 {
            errors.push(ConfigError::new(
                "remote.read_retries",
                "must be at least 1 (the first attempt counts)",
            ));
        }
        if self.read_retries > 10 {
            errors.push(ConfigError::new("remote.read_retries", "must be at most 10"));
        }
        if self.retry_backoff > Duration::from_secs(60) {
            errors.push(ConfigError::new("remote.retry_backoff", "must be at most 60s"));
        }
        if self.request_timeout.is_zero() {
            errors.push(ConfigError::new(
                "remote.request_timeout",
                "must be greater than zero",
            ));
        }
        if self.page_size == 0 {
            errors.push(ConfigError::new("remote.page_size", "must be at least 1"));
        }
        if let Some(url) = &self.base_url {
            if !(url.starts_with("https://") || url.starts_with("http://")) {
                errors.push(ConfigError::new(
                    "remote.base_url",
                    format!("'{url}' is not an http(s) URL"),
                ));
            }
        }
        errors
    }
}

impl Validatable for WorkspaceConfig {
    fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.prefix.contains(&['/', '\\'][..]) {
            errors.push(ConfigError::new(
                "workspace.prefix",
                "must not contain path separators",
            ));
        }
        errors
    }
}

impl Validatable for VersionConfig {
    fn validate(&self) -> Vec<ConfigError> {
        let mut errors = Vec::new();
        if self.transient_prefix.trim().is_empty() {
            errors.push(ConfigError::new("versions.transient_prefix", "must not be empty"));
        }
        if self.backup_prefix.trim().is_empty() {
            errors.push(ConfigError::new("versions.backup_prefix", "must not be empty"));
        }
        if self.transient_prefix == self.backup_prefix {
            errors.push(ConfigError::new(
                "versions.backup_prefix",
                "must differ from versions.transient_prefix",
            ));
        }
        errors
    }
}
