//! Configuration types for verification runs.

use super::defaults::*;
use crate::utils::serde_duration;
use crate::verify::{PollPolicy, RetryPolicy};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Top-level configuration, loadable from a YAML file.
///
/// Every section has defaults, so a config file only needs the values it
/// overrides.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct VerifyConfig {
    /// Waiting for remote threat computation
    pub polling: PollingConfig,
    /// Remote platform access
    pub remote: RemoteConfig,
    /// Local scratch directory
    pub workspace: WorkspaceConfig,
    /// Names of versions created during mutating runs
    pub versions: VersionConfig,
}

impl VerifyConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }
}

/// Completion polling bounds.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct PollingConfig {
    /// Pause between status checks (e.g. "2s")
    #[serde(with = "serde_duration")]
    #[schemars(with = "String")]
    pub interval: Duration,
    /// Give up after this long (e.g. "10m")
    #[serde(with = "serde_duration")]
    #[schemars(with = "String")]
    pub timeout: Duration,
    /// Give up after this many status checks
    pub max_polls: u32,
}

impl Default for PollingConfig {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            timeout: DEFAULT_POLL_TIMEOUT,
            max_polls: DEFAULT_MAX_POLLS,
        }
    }
}

impl PollingConfig {
    #[must_use]
    pub const fn policy(&self) -> PollPolicy {
        PollPolicy {
            interval: self.interval,
            timeout: self.timeout,
            max_polls: self.max_polls,
        }
    }
}

/// Remote access settings. The API token is never read from a file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct RemoteConfig {
    /// Platform base URL, e.g. `https://example.iriusrisk.com`
    #[serde(skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Total attempts for idempotent reads
    pub read_retries: u32,
    /// Delay before the first read retry, doubled afterwards
    #[serde(with = "serde_duration")]
    #[schemars(with = "String")]
    pub retry_backoff: Duration,
    /// Per-request timeout
    #[serde(with = "serde_duration")]
    #[schemars(with = "String")]
    pub request_timeout: Duration,
    /// Page size for paginated collections
    pub page_size: u32,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            base_url: None,
            read_retries: DEFAULT_READ_RETRIES,
            retry_backoff: DEFAULT_RETRY_BACKOFF,
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            page_size: DEFAULT_PAGE_SIZE,
        }
    }
}

impl RemoteConfig {
    #[must_use]
    pub const fn retry_policy(&self) -> RetryPolicy {
        RetryPolicy {
            attempts: self.read_retries,
            backoff: self.retry_backoff,
        }
    }
}

/// Where per-run scratch directories are created.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct WorkspaceConfig {
    /// Parent directory; the system temp directory when unset
    #[serde(skip_serializing_if = "Option::is_none")]
    pub root: Option<PathBuf>,
    /// Directory name prefix
    pub prefix: String,
}

impl Default for WorkspaceConfig {
    fn default() -> Self {
        Self {
            root: None,
            prefix: DEFAULT_WORKSPACE_PREFIX.to_string(),
        }
    }
}

/// Version naming for mutating runs. Names are `<prefix>-<session id>`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize, JsonSchema)]
#[serde(default)]
pub struct VersionConfig {
    /// Prefix of the version created from the imported architecture
    pub transient_prefix: String,
    /// Prefix of the version tagging live state before import
    pub backup_prefix: String,
}

impl Default for VersionConfig {
    fn default() -> Self {
        Self {
            transient_prefix: DEFAULT_TRANSIENT_PREFIX.to_string(),
            backup_prefix: DEFAULT_BACKUP_PREFIX.to_string(),
        }
    }
}

impl VersionConfig {
    #[must_use]
    pub fn transient_name(&self, session: &str) -> String {
        format!("{}-{session}", self.transient_prefix)
    }

    #[must_use]
    pub fn backup_name(&self, session: &str) -> String {
        format!("{}-{session}", self.backup_prefix)
    }
}
