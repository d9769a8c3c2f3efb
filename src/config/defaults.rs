//! Default values and named presets.

use super::types::{PollingConfig, VerifyConfig};
use std::time::Duration;

pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(2);
pub const DEFAULT_POLL_TIMEOUT: Duration = Duration::from_secs(600);
pub const DEFAULT_MAX_POLLS: u32 = 300;
pub const DEFAULT_READ_RETRIES: u32 = 3;
pub const DEFAULT_RETRY_BACKOFF: Duration = Duration::from_secs(1);
pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(30);
pub const DEFAULT_PAGE_SIZE: u32 = 200;
pub const DEFAULT_WORKSPACE_PREFIX: &str = "tmdiff-";
pub const DEFAULT_TRANSIENT_PREFIX: &str = "tmdiff-transient";
pub const DEFAULT_BACKUP_PREFIX: &str = "tmdiff-backup";

/// Named configurations for common project sizes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ConfigPreset {
    /// Suitable for most projects
    Default,
    /// Small projects whose computation finishes in seconds
    Quick,
    /// Large projects with long-running threat computation
    Patient,
}

impl ConfigPreset {
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::Default => "default",
            Self::Quick => "quick",
            Self::Patient => "patient",
        }
    }

    #[must_use]
    pub fn from_name(name: &str) -> Option<Self> {
        match name.to_lowercase().as_str() {
            "default" => Some(Self::Default),
            "quick" | "fast" => Some(Self::Quick),
            "patient" | "large" => Some(Self::Patient),
            _ => None,
        }
    }

    #[must_use]
    pub const fn all() -> &'static [Self] {
        &[Self::Default, Self::Quick, Self::Patient]
    }
}

impl std::fmt::Display for ConfigPreset {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.name())
    }
}

impl VerifyConfig {
    #[must_use]
    pub fn from_preset(preset: ConfigPreset) -> Self {
        match preset {
            ConfigPreset::Default => Self::default(),
            ConfigPreset::Quick => Self {
                polling: PollingConfig {
                    interval: Duration::from_millis(500),
                    timeout: Duration::from_secs(120),
                    max_polls: 240,
                },
                ..Self::default()
            },
            ConfigPreset::Patient => Self {
                polling: PollingConfig {
                    interval: Duration::from_secs(10),
                    timeout: Duration::from_secs(3600),
                    max_polls: 360,
                },
                ..Self::default()
            },
        }
    }
}
