//! Unified error types for tmdiff.
//!
//! Errors are grouped by how a verification run reacts to them: input errors
//! abort before any remote mutation, remote errors may be retried for reads,
//! and restoration failures are always surfaced above everything else.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use thiserror::Error;

/// Main error type for tmdiff operations.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ThreatDiffError {
    /// The diagram document could not be parsed
    #[error("Malformed diagram at node '{node}': {message}")]
    MalformedDiagram { node: String, message: String },

    /// A threats or countermeasures collection could not be parsed
    #[error("Malformed {artifact} artifact: {message} (near {fragment})")]
    MalformedArtifact {
        artifact: ArtifactKind,
        fragment: String,
        message: String,
    },

    /// The architecture description failed validation before import
    #[error("Malformed architecture description at '{element}': {message}")]
    MalformedArchitecture { element: String, message: String },

    /// A call to the remote platform failed
    #[error("Remote service error during {operation}: {source}")]
    Remote {
        operation: String,
        #[source]
        source: RemoteErrorKind,
    },

    /// Remote threat computation did not finish within the polling budget
    #[error("Threat computation for job '{job}' did not finish within {timeout:?} ({polls} polls)")]
    ComputationTimeout {
        job: String,
        timeout: Duration,
        polls: u32,
    },

    /// Remote threat computation finished with a failure status
    #[error("Threat computation for job '{job}' failed: {message}")]
    ComputationFailed { job: String, message: String },

    /// The remote project could not be reverted after a mutating run
    #[error(
        "RESTORATION FAILED: project '{project}' could not be reverted to version '{version}' \
         and is left in a modified state ({cause})"
    )]
    RestorationFailure {
        project: String,
        version: String,
        #[source]
        cause: Box<ThreatDiffError>,
        /// The failure that interrupted the run before restoration, if any
        interrupted_by: Option<Box<ThreatDiffError>>,
    },

    /// Deleting a transient version or local scratch files failed
    #[error("Cleanup of {resource} failed: {message}")]
    Cleanup { resource: String, message: String },

    /// The caller aborted the run
    #[error("Verification run cancelled during {state}")]
    Cancelled { state: String },

    /// The combination of inputs does not describe a comparison
    #[error("Invalid verification request: {0}")]
    InvalidRequest(String),

    /// IO errors with context
    #[error("IO error at {path:?}: {message}")]
    Io {
        path: Option<PathBuf>,
        message: String,
        #[source]
        source: std::io::Error,
    },

    /// Configuration errors
    #[error("Invalid configuration: {0}")]
    Config(String),

    /// Validation errors
    #[error("Validation failed: {0}")]
    Validation(String),
}

/// Which security artifact collection an error refers to.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArtifactKind {
    Threats,
    Countermeasures,
}

impl std::fmt::Display for ArtifactKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Threats => write!(f, "threats"),
            Self::Countermeasures => write!(f, "countermeasures"),
        }
    }
}

/// Specific remote failure kinds
#[derive(Error, Debug, Clone, PartialEq, Eq)]
#[non_exhaustive]
pub enum RemoteErrorKind {
    #[error("Network error: {0}")]
    Network(String),

    #[error("Authentication rejected: {0}")]
    Auth(String),

    #[error("Resource not found: {0}")]
    NotFound(String),

    #[error("Server returned status {code}: {body}")]
    Status { code: u16, body: String },

    #[error("Invalid response format: {0}")]
    InvalidResponse(String),
}

impl RemoteErrorKind {
    /// Whether an idempotent read failing this way is worth another attempt.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Network(_) => true,
            Self::Status { code, .. } => *code >= 500 || *code == 429,
            Self::Auth(_) | Self::NotFound(_) | Self::InvalidResponse(_) => false,
        }
    }
}

/// A reference that did not resolve to any parsed entity.
///
/// Never fatal: collected during parsing and comparison and attached to the
/// diff as a warning.
#[derive(Error, Debug, Clone, PartialEq, Eq, Serialize, Deserialize, schemars::JsonSchema)]
#[error("{source_kind} '{source_id}' references unknown {target_kind} '{target_id}' ({context})")]
#[serde(rename_all = "camelCase")]
pub struct DanglingReference {
    /// Kind of the entity holding the reference (`dataflow`, `threat`, ...)
    pub source_kind: String,
    /// Identity of the entity holding the reference
    pub source_id: String,
    /// Kind of entity the reference should point at
    pub target_kind: String,
    /// The unresolved identifier
    pub target_id: String,
    /// Where the reference was found (`diagram`, `baseline`, `target`)
    pub context: String,
}

impl DanglingReference {
    pub fn new(
        source_kind: impl Into<String>,
        source_id: impl Into<String>,
        target_kind: impl Into<String>,
        target_id: impl Into<String>,
        context: impl Into<String>,
    ) -> Self {
        Self {
            source_kind: source_kind.into(),
            source_id: source_id.into(),
            target_kind: target_kind.into(),
            target_id: target_id.into(),
            context: context.into(),
        }
    }
}

/// How loudly an error must be reported.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub enum ErrorSeverity {
    /// Logged, never fails a run
    Recoverable,
    /// Fails the run, remote state untouched or restored
    Fatal,
    /// Shared remote state is left corrupted
    Corrupting,
}

// ============================================================================
// Result type alias
// ============================================================================

/// Convenient Result type for tmdiff operations
pub type Result<T> = std::result::Result<T, ThreatDiffError>;

// ============================================================================
// Error construction helpers
// ============================================================================

impl ThreatDiffError {
    /// Create a diagram error naming the offending node
    pub fn malformed_diagram(node: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedDiagram {
            node: node.into(),
            message: message.into(),
        }
    }

    /// Create an artifact error with the offending fragment
    pub fn malformed_artifact(
        artifact: ArtifactKind,
        fragment: impl Into<String>,
        message: impl Into<String>,
    ) -> Self {
        Self::MalformedArtifact {
            artifact,
            fragment: truncate_fragment(&fragment.into()),
            message: message.into(),
        }
    }

    /// Create an architecture validation error
    pub fn malformed_architecture(element: impl Into<String>, message: impl Into<String>) -> Self {
        Self::MalformedArchitecture {
            element: element.into(),
            message: message.into(),
        }
    }

    /// Create a remote error for the named operation
    pub fn remote(operation: impl Into<String>, source: RemoteErrorKind) -> Self {
        Self::Remote {
            operation: operation.into(),
            source,
        }
    }

    /// Create an IO error with path context
    pub fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        let path = path.into();
        let message = format!("{source}");
        Self::Io {
            path: Some(path),
            message,
            source,
        }
    }

    /// Create a validation error
    pub fn validation(message: impl Into<String>) -> Self {
        Self::Validation(message.into())
    }

    /// Create a config error
    pub fn config(message: impl Into<String>) -> Self {
        Self::Config(message.into())
    }

    /// Classify how loudly this error must be reported.
    #[must_use]
    pub const fn severity_class(&self) -> ErrorSeverity {
        match self {
            Self::RestorationFailure { .. } => ErrorSeverity::Corrupting,
            Self::Cleanup { .. } => ErrorSeverity::Recoverable,
            _ => ErrorSeverity::Fatal,
        }
    }

    /// Whether this error is retryable when raised by an idempotent read.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        match self {
            Self::Remote { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

/// Keep reported fragments short enough for a log line.
fn truncate_fragment(fragment: &str) -> String {
    const MAX_FRAGMENT: usize = 120;
    if fragment.chars().count() <= MAX_FRAGMENT {
        fragment.to_string()
    } else {
        let cut: String = fragment.chars().take(MAX_FRAGMENT).collect();
        format!("{cut}...")
    }
}

// ============================================================================
// Conversions from existing error types
// ============================================================================

impl From<std::io::Error> for ThreatDiffError {
    fn from(err: std::io::Error) -> Self {
        Self::Io {
            path: None,
            message: format!("{err}"),
            source: err,
        }
    }
}

// ============================================================================
// Error context extension trait
// ============================================================================

/// Extension trait for adding context to errors.
///
/// Context strings are prepended to the error's existing context, so a
/// failure deep in a workspace read reads as
/// `"loading target: reading target-threats.json: ..."`.
pub trait ErrorContext<T> {
    /// Add context to an error.
    fn context(self, context: impl Into<String>) -> Result<T>;

    /// Add context from a closure, evaluated only on error.
    fn with_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T, E: Into<ThreatDiffError>> ErrorContext<T> for std::result::Result<T, E> {
    fn context(self, context: impl Into<String>) -> Result<T> {
        let ctx: String = context.into();
        self.map_err(|e| add_context_to_error(e.into(), &ctx))
    }

    fn with_context<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.map_err(|e| {
            let ctx: String = f().into();
            add_context_to_error(e.into(), &ctx)
        })
    }
}

/// Add context to an error, chaining with any existing context.
///
/// Variants whose fields are identifiers (nodes, jobs, versions) keep them
/// untouched; the context goes into their message instead.
fn add_context_to_error(err: ThreatDiffError, new_ctx: &str) -> ThreatDiffError {
    match err {
        ThreatDiffError::MalformedDiagram { node, message } => ThreatDiffError::MalformedDiagram {
            node,
            message: chain_context(new_ctx, &message),
        },
        ThreatDiffError::MalformedArtifact {
            artifact,
            fragment,
            message,
        } => ThreatDiffError::MalformedArtifact {
            artifact,
            fragment,
            message: chain_context(new_ctx, &message),
        },
        ThreatDiffError::MalformedArchitecture { element, message } => {
            ThreatDiffError::MalformedArchitecture {
                element,
                message: chain_context(new_ctx, &message),
            }
        }
        ThreatDiffError::Remote { operation, source } => ThreatDiffError::Remote {
            operation: chain_context(new_ctx, &operation),
            source,
        },
        ThreatDiffError::Io {
            path,
            message,
            source,
        } => ThreatDiffError::Io {
            path,
            message: chain_context(new_ctx, &message),
            source,
        },
        ThreatDiffError::Cleanup { resource, message } => ThreatDiffError::Cleanup {
            resource,
            message: chain_context(new_ctx, &message),
        },
        ThreatDiffError::InvalidRequest(msg) => {
            ThreatDiffError::InvalidRequest(chain_context(new_ctx, &msg))
        }
        ThreatDiffError::Config(msg) => ThreatDiffError::Config(chain_context(new_ctx, &msg)),
        ThreatDiffError::Validation(msg) => {
            ThreatDiffError::Validation(chain_context(new_ctx, &msg))
        }
        other => other,
    }
}

/// Chain two context strings together.
///
/// If the existing context is empty, returns just the new context.
/// Otherwise, returns "`new_context`: `existing_context`".
fn chain_context(new: &str, existing: &str) -> String {
    if existing.is_empty() {
        new.to_string()
    } else {
        format!("{new}: {existing}")
    }
}

/// Extension trait for Option types to convert to errors with context.
pub trait OptionContext<T> {
    /// Convert None to an error with the given context.
    fn context_none(self, context: impl Into<String>) -> Result<T>;

    /// Convert None to an error with context from a closure.
    fn with_context_none<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>;
}

impl<T> OptionContext<T> for Option<T> {
    fn context_none(self, context: impl Into<String>) -> Result<T> {
        self.ok_or_else(|| ThreatDiffError::Validation(context.into()))
    }

    fn with_context_none<F, C>(self, f: F) -> Result<T>
    where
        F: FnOnce() -> C,
        C: Into<String>,
    {
        self.ok_or_else(|| ThreatDiffError::Validation(f().into()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = ThreatDiffError::malformed_diagram("node-7", "missing id");
        let display = err.to_string();
        assert!(display.contains("node-7"), "should name the node: {display}");

        let err = ThreatDiffError::malformed_artifact(ArtifactKind::Threats, "{\"x\":1}", "no id");
        let display = err.to_string();
        assert!(display.contains("threats"), "should name the artifact: {display}");
    }

    #[test]
    fn test_error_chain() {
        let io_err = std::io::Error::new(std::io::ErrorKind::NotFound, "file not found");
        let err = ThreatDiffError::io("/path/to/threats.json", io_err);

        assert!(err.to_string().contains("/path/to/threats.json"));
    }

    #[test]
    fn test_context_chaining() {
        let initial_err: Result<()> = Err(ThreatDiffError::validation("initial context"));
        let err_with_context = initial_err.context("outer context");

        match err_with_context {
            Err(ThreatDiffError::Validation(msg)) => {
                assert_eq!(msg, "outer context: initial context");
            }
            _ => panic!("Expected Validation error"),
        }
    }

    #[test]
    fn test_context_keeps_diagram_node() {
        let err: Result<()> = Err(ThreatDiffError::malformed_diagram("cell-3", "bad geometry"));
        match err.context("parsing baseline diagram") {
            Err(ThreatDiffError::MalformedDiagram { node, message }) => {
                assert_eq!(node, "cell-3");
                assert_eq!(message, "parsing baseline diagram: bad geometry");
            }
            _ => panic!("Expected MalformedDiagram error"),
        }
    }

    #[test]
    fn test_with_context_lazy_evaluation() {
        let mut called = false;

        let ok_result: Result<i32> = Ok(42);
        let _ = ok_result.with_context(|| {
            called = true;
            "should not be called"
        });
        assert!(!called, "Closure should not be called for Ok result");

        let err_result: Result<i32> = Err(ThreatDiffError::validation("error"));
        let _ = err_result.with_context(|| {
            called = true;
            "should be called"
        });
        assert!(called, "Closure should be called for Err result");
    }

    #[test]
    fn test_option_context() {
        let none_value: Option<i32> = None;
        match none_value.context_none("missing value") {
            Err(ThreatDiffError::Validation(msg)) => assert_eq!(msg, "missing value"),
            _ => panic!("Expected Validation error"),
        }
        assert_eq!(Some(3).context_none("unused").ok(), Some(3));
    }

    #[test]
    fn test_severity_classes() {
        let restore = ThreatDiffError::RestorationFailure {
            project: "p".into(),
            version: "v".into(),
            cause: Box::new(ThreatDiffError::remote(
                "restore",
                RemoteErrorKind::Network("reset".into()),
            )),
            interrupted_by: None,
        };
        let timeout = ThreatDiffError::ComputationTimeout {
            job: "j".into(),
            timeout: Duration::from_secs(1),
            polls: 3,
        };
        let cleanup = ThreatDiffError::Cleanup {
            resource: "version v".into(),
            message: "gone".into(),
        };
        assert_eq!(restore.severity_class(), ErrorSeverity::Corrupting);
        assert_eq!(timeout.severity_class(), ErrorSeverity::Fatal);
        assert_eq!(cleanup.severity_class(), ErrorSeverity::Recoverable);
        assert!(restore.severity_class() > timeout.severity_class());
    }

    #[test]
    fn test_remote_retryable() {
        assert!(RemoteErrorKind::Network("x".into()).is_retryable());
        assert!(RemoteErrorKind::Status { code: 503, body: String::new() }.is_retryable());
        assert!(RemoteErrorKind::Status { code: 429, body: String::new() }.is_retryable());
        assert!(!RemoteErrorKind::Status { code: 400, body: String::new() }.is_retryable());
        assert!(!RemoteErrorKind::Auth("denied".into()).is_retryable());
    }

    #[test]
    fn test_chain_context_helper() {
        assert_eq!(chain_context("new", ""), "new");
        assert_eq!(chain_context("new", "existing"), "new: existing");
    }

    #[test]
    fn test_fragment_truncated() {
        let long = "x".repeat(500);
        let err = ThreatDiffError::malformed_artifact(ArtifactKind::Countermeasures, long, "bad");
        match err {
            ThreatDiffError::MalformedArtifact { fragment, .. } => {
                assert!(fragment.len() < 200);
                assert!(fragment.ends_with("..."));
            }
            _ => panic!("Expected MalformedArtifact"),
        }
    }
}
