//! Comparison modes and verification requests.

use crate::error::{Result, ThreatDiffError};
use crate::parsers::ArchitectureSource;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Which pair of remote states a run compares.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "kebab-case")]
pub enum ComparisonMode {
    /// Live state against a newly imported architecture
    CurrentVsNew,
    /// Tagged version against a newly imported architecture
    VersionVsNew,
    /// Tagged version against live state
    VersionVsCurrent,
    /// Tagged version against another tagged version
    VersionVsVersion,
}

impl ComparisonMode {
    /// Whether the run imports into, and must later restore, the remote project.
    #[must_use]
    pub const fn mutates_remote(self) -> bool {
        matches!(self, Self::CurrentVsNew | Self::VersionVsNew)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::CurrentVsNew => "current-vs-new",
            Self::VersionVsNew => "version-vs-new",
            Self::VersionVsCurrent => "version-vs-current",
            Self::VersionVsVersion => "version-vs-version",
        }
    }
}

impl fmt::Display for ComparisonMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What the "after" side of a comparison is.
#[derive(Debug, Clone)]
pub enum TargetInput {
    /// The project's current live state
    Live,
    /// A tagged version of the project
    Version(String),
    /// An architecture description to import
    Architecture(ArchitectureSource),
}

/// One verification run's inputs.
#[derive(Debug, Clone)]
pub struct VerificationRequest {
    pub project_id: String,
    /// Tagged baseline; `None` means the live state
    pub baseline_version: Option<String>,
    pub target: TargetInput,
    /// Expected mode; checked against the inputs when set
    pub mode: Option<ComparisonMode>,
}

impl VerificationRequest {
    /// Live state against an architecture description.
    pub fn current_vs_new(project_id: impl Into<String>, architecture: ArchitectureSource) -> Self {
        Self {
            project_id: project_id.into(),
            baseline_version: None,
            target: TargetInput::Architecture(architecture),
            mode: None,
        }
    }

    /// Tagged version against an architecture description.
    pub fn version_vs_new(
        project_id: impl Into<String>,
        baseline_version: impl Into<String>,
        architecture: ArchitectureSource,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            baseline_version: Some(baseline_version.into()),
            target: TargetInput::Architecture(architecture),
            mode: None,
        }
    }

    /// Tagged version against live state.
    pub fn version_vs_current(
        project_id: impl Into<String>,
        baseline_version: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            baseline_version: Some(baseline_version.into()),
            target: TargetInput::Live,
            mode: None,
        }
    }

    /// Two tagged versions.
    pub fn version_vs_version(
        project_id: impl Into<String>,
        baseline_version: impl Into<String>,
        target_version: impl Into<String>,
    ) -> Self {
        Self {
            project_id: project_id.into(),
            baseline_version: Some(baseline_version.into()),
            target: TargetInput::Version(target_version.into()),
            mode: None,
        }
    }

    /// Pin the expected mode.
    #[must_use]
    pub const fn with_mode(mut self, mode: ComparisonMode) -> Self {
        self.mode = Some(mode);
        self
    }

    /// Derive the mode from the supplied inputs.
    pub fn resolve_mode(&self) -> Result<ComparisonMode> {
        if self.project_id.trim().is_empty() {
            return Err(ThreatDiffError::InvalidRequest(
                "project id must not be empty".to_string(),
            ));
        }
        let derived = match (&self.baseline_version, &self.target) {
            (None, TargetInput::Architecture(_)) => ComparisonMode::CurrentVsNew,
            (Some(_), TargetInput::Architecture(_)) => ComparisonMode::VersionVsNew,
            (Some(_), TargetInput::Live) => ComparisonMode::VersionVsCurrent,
            (Some(_), TargetInput::Version(_)) => ComparisonMode::VersionVsVersion,
            (None, TargetInput::Live | TargetInput::Version(_)) => {
                return Err(ThreatDiffError::InvalidRequest(
                    "a live baseline can only be compared with an architecture description"
                        .to_string(),
                ));
            }
        };
        let blank_version = |v: &Option<String>| v.as_deref().is_some_and(|v| v.trim().is_empty());
        let target_version = match &self.target {
            TargetInput::Version(v) => Some(v.clone()),
            _ => None,
        };
        if blank_version(&self.baseline_version) || blank_version(&target_version) {
            return Err(ThreatDiffError::InvalidRequest(
                "version ids must not be blank".to_string(),
            ));
        }
        match self.mode {
            Some(expected) if expected != derived => Err(ThreatDiffError::InvalidRequest(format!(
                "requested mode {expected} does not match the supplied inputs ({derived})"
            ))),
            _ => Ok(derived),
        }
    }
}
