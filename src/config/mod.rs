//! Configuration for verification runs.
//!
//! - Typed sections for polling, remote access, workspace and version naming
//! - Validation through [`Validatable`]
//! - YAML file discovery and loading
//! - JSON schemas for the config file and the diff output
//!
//! # Configuration File
//!
//! Place a `.tmdiff.yaml` file in your project root or `~/.config/tmdiff/`:
//!
//! ```yaml
//! polling:
//!   interval: 2s
//!   timeout: 10m
//! remote:
//!   base_url: https://example.iriusrisk.com
//!   read_retries: 3
//! ```
//!
//! ```rust,no_run
//! use tmdiff::config::load_or_default;
//!
//! let (config, loaded_from) = load_or_default(None);
//! println!("{:?} from {:?}", config.polling, loaded_from);
//! ```

mod defaults;
pub mod file;
mod types;
mod validation;

pub use defaults::{
    ConfigPreset, DEFAULT_MAX_POLLS, DEFAULT_POLL_INTERVAL, DEFAULT_POLL_TIMEOUT,
    DEFAULT_READ_RETRIES,
};
pub use file::{
    discover_config_file, generate_example_config, load_config_file, load_or_default,
    ConfigFileError,
};
pub use types::{PollingConfig, RemoteConfig, VerifyConfig, VersionConfig, WorkspaceConfig};
pub use validation::{ConfigError, Validatable};

/// JSON Schema of the config file format, for editor validation.
#[must_use]
pub fn generate_json_schema() -> String {
    let schema = schemars::schema_for!(VerifyConfig);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}

/// JSON Schema of the serialized [`StructuredDiff`](crate::diff::StructuredDiff).
#[must_use]
pub fn diff_json_schema() -> String {
    let schema = schemars::schema_for!(crate::diff::StructuredDiff);
    serde_json::to_string_pretty(&schema).unwrap_or_default()
}
