//! Verification runs against a remote threat-modeling platform.
//!
//! A run downloads a baseline, prepares a target (a download for read-only
//! modes, an import plus transient version for mutating ones), compares the
//! two and then restores and cleans up whatever it changed.
//!
//! ```rust,no_run
//! # #[cfg(feature = "remote")]
//! # fn main() -> tmdiff::Result<()> {
//! use tmdiff::config::load_or_default;
//! use tmdiff::parsers::ArchitectureSource;
//! use tmdiff::verify::{
//!     HttpPlatform, HttpPlatformConfig, VerificationOrchestrator, VerificationRequest,
//! };
//!
//! let (config, _) = load_or_default(None);
//! let platform = HttpPlatform::new(HttpPlatformConfig::from_env(&config.remote)?)?;
//! let orchestrator = VerificationOrchestrator::new(platform, config)?;
//!
//! let architecture = ArchitectureSource::from_path("architecture.otm.yaml".as_ref())?;
//! let diff = orchestrator.run(&VerificationRequest::current_vs_new("my-project", architecture))?;
//! println!("{}", diff.to_json()?);
//! # Ok(())
//! # }
//! # #[cfg(not(feature = "remote"))]
//! # fn main() {}
//! ```

#[cfg(feature = "remote")]
mod http;
mod mode;
mod orchestrator;
mod platform;
mod session;
mod workspace;

#[cfg(feature = "remote")]
pub use http::{HttpPlatform, HttpPlatformConfig, API_TOKEN_ENV};
pub use mode::{ComparisonMode, TargetInput, VerificationRequest};
pub use orchestrator::VerificationOrchestrator;
pub use platform::{
    retry_read, CancellationFlag, JobHandle, JobStatus, PollPolicy, RetryPolicy,
    ThreatModelPlatform,
};
pub use session::{
    allowed_transitions, validate_transition, CleanupLedger, LedgerEntry, RunReport, RunState,
    VerificationSession, VersionPurpose,
};
pub use workspace::{RawArtifacts, Side, Workspace};
