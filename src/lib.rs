//! **Threat-model comparison and verification.**
//!
//! `tmdiff` turns two threat-model snapshots (a draw.io architecture
//! diagram plus JSON threat and countermeasure collections) into a
//! structured, machine-readable diff, and can produce those snapshots from a
//! remote threat-modeling platform while leaving the remote project exactly
//! as it found it.
//!
//! ## Core Concepts & Modules
//!
//! - **[`model`]**: components, dataflows, trust zones, threats and
//!   countermeasures, bundled into an immutable [`Snapshot`].
//! - **[`parsers`]**: the [`DiagramParser`] for mxGraph XML, the
//!   [`SecurityArtifactParser`] for threat/countermeasure JSON, and
//!   architecture description (Open Threat Model) validation.
//! - **[`diff`]**: the [`ComparisonEngine`], producing a [`StructuredDiff`]
//!   with per-entity changes and risk indicators (severity increases,
//!   critical countermeasure removals).
//! - **[`verify`]**: the [`VerificationOrchestrator`], which runs one of four
//!   comparison modes against a [`ThreatModelPlatform`], restoring and
//!   cleaning up after mutating runs even when they fail.
//! - **[`config`]**: [`VerifyConfig`] loaded from `.tmdiff.yaml`.
//!
//! ## Comparing Local Files
//!
//! ```no_run
//! use std::path::Path;
//! use tmdiff::{ComparisonEngine, Provenance, Snapshot};
//!
//! fn main() -> tmdiff::Result<()> {
//!     let baseline = Snapshot::load(
//!         Provenance::Local { label: "approved".into() },
//!         Path::new("approved/diagram.drawio"),
//!         Path::new("approved/threats.json"),
//!         Path::new("approved/countermeasures.json"),
//!     )?;
//!     let target = Snapshot::load(
//!         Provenance::Local { label: "proposed".into() },
//!         Path::new("proposed/diagram.drawio"),
//!         Path::new("proposed/threats.json"),
//!         Path::new("proposed/countermeasures.json"),
//!     )?;
//!
//!     let diff = ComparisonEngine::new().compare(&baseline, &target);
//!     if diff.summary().has_critical_removals {
//!         eprintln!("a removed countermeasure still had an active threat");
//!     }
//!     println!("{}", diff.to_json()?);
//!     Ok(())
//! }
//! ```
//!
//! ## Feature Flags
//!
//! - `remote` (default): the REST client [`verify::HttpPlatform`], adding
//!   `reqwest`.
//!
//! Logging goes through `tracing`; installing a subscriber is up to the
//! caller.

#![warn(clippy::unwrap_used)]
#![allow(
    clippy::missing_errors_doc,
    clippy::missing_panics_doc,
    clippy::module_name_repetitions,
    // `old`/`new`, `baseline`/`target` read clearly side by side
    clippy::similar_names
)]

pub mod config;
pub mod diff;
pub mod error;
pub mod model;
pub mod parsers;
pub mod utils;
pub mod verify;

pub use config::{ConfigError, Validatable, VerifyConfig};
pub use diff::{
    compare, ComparisonEngine, DiffSummary, DualKeyMatcher, EntityMatcher, StructuredDiff,
};
pub use error::{
    DanglingReference, ErrorContext, ErrorSeverity, OptionContext, RemoteErrorKind, Result,
    ThreatDiffError,
};
pub use model::{
    Component, Countermeasure, Dataflow, Provenance, Severity, Snapshot, Threat, TrustZone,
};
pub use parsers::{
    parse_snapshot, ArchitectureParser, ArchitectureSource, DiagramParser,
    SecurityArtifactParser,
};
pub use verify::{
    CancellationFlag, ComparisonMode, ThreatModelPlatform, VerificationOrchestrator,
    VerificationRequest,
};
