//! Run state machine, cleanup ledger and session bookkeeping.

use super::mode::ComparisonMode;
use super::platform::ThreatModelPlatform;
use crate::diff::RestorationStatus;
use crate::error::{Result, ThreatDiffError};
use chrono::{DateTime, SecondsFormat, Utc};
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;

/// States of a verification run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, JsonSchema)]
#[serde(rename_all = "camelCase")]
pub enum RunState {
    Idle,
    ResolvingBaseline,
    PreparingTarget,
    Comparing,
    Restoring,
    Cleaning,
    Done,
    Failed,
}

impl RunState {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Idle => "idle",
            Self::ResolvingBaseline => "resolving-baseline",
            Self::PreparingTarget => "preparing-target",
            Self::Comparing => "comparing",
            Self::Restoring => "restoring",
            Self::Cleaning => "cleaning",
            Self::Done => "done",
            Self::Failed => "failed",
        }
    }

    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Done | Self::Failed)
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// States reachable from `from` in one step.
///
/// Every non-terminal state before `Restoring` may jump there directly;
/// the terminal states are only reachable from `Cleaning`.
#[must_use]
pub fn allowed_transitions(from: RunState) -> &'static [RunState] {
    use RunState::*;
    match from {
        Idle => &[ResolvingBaseline, Restoring],
        ResolvingBaseline => &[PreparingTarget, Restoring],
        PreparingTarget => &[Comparing, Restoring],
        Comparing => &[Restoring],
        Restoring => &[Cleaning],
        Cleaning => &[Done, Failed],
        Done | Failed => &[],
    }
}

/// Check a state transition.
pub fn validate_transition(from: RunState, to: RunState) -> Result<()> {
    if allowed_transitions(from).contains(&to) {
        Ok(())
    } else {
        Err(ThreatDiffError::validation(format!(
            "illegal run state transition {from} -> {to}"
        )))
    }
}

/// Why a version was created.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VersionPurpose {
    /// Snapshot of the freshly imported state, used for download
    Transient,
    /// Snapshot of the live state taken before import
    Backup,
}

impl fmt::Display for VersionPurpose {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Transient => write!(f, "transient"),
            Self::Backup => write!(f, "backup"),
        }
    }
}

/// A compensating action owed to the remote platform.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LedgerEntry {
    Restore {
        project: String,
        version: String,
    },
    DeleteVersion {
        project: String,
        version: String,
        purpose: VersionPurpose,
    },
}

impl LedgerEntry {
    pub(crate) fn execute<P: ThreatModelPlatform + ?Sized>(&self, platform: &P) -> Result<()> {
        match self {
            Self::Restore { project, version } => platform.restore_to_version(project, version),
            Self::DeleteVersion {
                project, version, ..
            } => platform.delete_version(project, version),
        }
    }
}

impl fmt::Display for LedgerEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Restore { project, version } => write!(f, "restore {project} to {version}"),
            Self::DeleteVersion {
                project,
                version,
                purpose,
            } => write!(f, "delete {purpose} version {version} of {project}"),
        }
    }
}

/// Outstanding compensating actions, registered before the mutation they
/// undo takes effect.
#[derive(Debug, Default)]
pub struct CleanupLedger {
    entries: Vec<LedgerEntry>,
}

impl CleanupLedger {
    pub fn register(&mut self, entry: LedgerEntry) {
        tracing::debug!(entry = %entry, "Registered cleanup");
        self.entries.push(entry);
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    #[must_use]
    pub fn entries(&self) -> &[LedgerEntry] {
        &self.entries
    }

    /// Remove and return the restore entry, if one is owed.
    pub fn take_restore(&mut self) -> Option<LedgerEntry> {
        let index = self
            .entries
            .iter()
            .position(|e| matches!(e, LedgerEntry::Restore { .. }))?;
        Some(self.entries.remove(index))
    }

    /// Remove and return every version deletion, oldest first.
    pub fn take_deletions(&mut self) -> Vec<LedgerEntry> {
        let (deletions, rest): (Vec<_>, Vec<_>) = std::mem::take(&mut self.entries)
            .into_iter()
            .partition(|e| matches!(e, LedgerEntry::DeleteVersion { .. }));
        self.entries = rest;
        deletions
    }
}

/// Bookkeeping of one verification run.
#[derive(Debug)]
pub struct VerificationSession {
    id: String,
    mode: ComparisonMode,
    project: String,
    state: RunState,
    history: Vec<RunState>,
    started_at: DateTime<Utc>,
    pub(crate) ledger: CleanupLedger,
    pub(crate) restoration: RestorationStatus,
    pub(crate) cleanup_failures: Vec<String>,
}

impl VerificationSession {
    pub fn new(mode: ComparisonMode, project: impl Into<String>) -> Self {
        let project = project.into();
        let started_at = Utc::now();
        let id = crate::utils::short_token(&[
            &project,
            mode.as_str(),
            &started_at.to_rfc3339_opts(SecondsFormat::Nanos, true),
        ]);
        Self {
            id,
            mode,
            project,
            state: RunState::Idle,
            history: vec![RunState::Idle],
            started_at,
            ledger: CleanupLedger::default(),
            restoration: RestorationStatus::NotRequired,
            cleanup_failures: Vec::new(),
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub const fn mode(&self) -> ComparisonMode {
        self.mode
    }

    pub fn project(&self) -> &str {
        &self.project
    }

    pub const fn state(&self) -> RunState {
        self.state
    }

    pub fn history(&self) -> &[RunState] {
        &self.history
    }

    pub const fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    /// Move to `to`, rejecting transitions the state machine does not allow.
    pub fn transition(&mut self, to: RunState) -> Result<()> {
        validate_transition(self.state, to)?;
        tracing::info!(
            session = %self.id,
            project = %self.project,
            from = %self.state,
            state = %to,
            "Run state changed"
        );
        self.state = to;
        self.history.push(to);
        Ok(())
    }

    /// Snapshot of the run's outcome details.
    #[must_use]
    pub fn report(&self) -> RunReport {
        RunReport {
            session_id: Some(self.id.clone()),
            mode: Some(self.mode),
            states: self.history.clone(),
            restoration: self.restoration,
            cleanup_failures: self.cleanup_failures.clone(),
        }
    }
}

/// What happened during a run, available whether or not it succeeded.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RunReport {
    /// `None` when the request was rejected before a session started
    pub session_id: Option<String>,
    pub mode: Option<ComparisonMode>,
    pub states: Vec<RunState>,
    pub restoration: RestorationStatus,
    pub cleanup_failures: Vec<String>,
}

/// Owns a session and discharges its ledger if the run unwinds before
/// restoration and cleanup took their entries.
pub(crate) struct SessionGuard<'a, P: ThreatModelPlatform + ?Sized> {
    platform: &'a P,
    pub(crate) session: VerificationSession,
}

impl<'a, P: ThreatModelPlatform + ?Sized> SessionGuard<'a, P> {
    pub(crate) const fn new(platform: &'a P, session: VerificationSession) -> Self {
        Self { platform, session }
    }
}

impl<P: ThreatModelPlatform + ?Sized> Drop for SessionGuard<'_, P> {
    fn drop(&mut self) {
        if self.session.ledger.is_empty() {
            return;
        }
        tracing::error!(
            session = %self.session.id,
            pending = self.session.ledger.entries().len(),
            "Run ended with outstanding cleanup; discharging"
        );
        let mut restored = true;
        if let Some(entry) = self.session.ledger.take_restore() {
            if let Err(e) = entry.execute(self.platform) {
                tracing::error!(entry = %entry, error = %e, "RESTORATION FAILED during unwind");
                restored = false;
            }
        }
        for entry in self.session.ledger.take_deletions() {
            let keep = !restored
                && matches!(
                    entry,
                    LedgerEntry::DeleteVersion {
                        purpose: VersionPurpose::Backup,
                        ..
                    }
                );
            if keep {
                tracing::warn!(entry = %entry, "Keeping backup version for manual recovery");
                continue;
            }
            if let Err(e) = entry.execute(self.platform) {
                tracing::warn!(entry = %entry, error = %e, "Cleanup failed during unwind");
            }
        }
    }
}
