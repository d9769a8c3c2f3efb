//! Verification run driver.

use super::mode::{ComparisonMode, TargetInput, VerificationRequest};
use super::platform::{retry_read, CancellationFlag, ThreatModelPlatform};
use super::session::{
    LedgerEntry, RunReport, RunState, SessionGuard, VerificationSession, VersionPurpose,
};
use super::workspace::{RawArtifacts, Side, Workspace};
use crate::config::{Validatable, VerifyConfig};
use crate::diff::{ComparisonEngine, RestorationStatus, StructuredDiff};
use crate::error::{ErrorContext, Result, ThreatDiffError};
use crate::model::{Provenance, Snapshot};
use crate::parsers::{ArchitectureParser, ValidatedArchitecture};
use chrono::{SecondsFormat, Utc};

/// Where one side's artifacts are downloaded from.
#[derive(Debug, Clone, Copy)]
enum RemoteSource<'a> {
    Live,
    Version(&'a str),
}

/// Runs verification requests against a remote platform.
///
/// Each run follows `Idle -> ResolvingBaseline -> PreparingTarget ->
/// Comparing -> Restoring -> Cleaning -> Done`. Any failure jumps to
/// `Restoring`, so mutating runs always revert the remote project and
/// remove the versions they created before ending in `Failed`.
///
/// Mutating runs against the same project must not overlap; nothing here
/// locks the remote project.
pub struct VerificationOrchestrator<P> {
    platform: P,
    config: VerifyConfig,
    engine: ComparisonEngine,
    cancel: CancellationFlag,
}

impl<P: ThreatModelPlatform> VerificationOrchestrator<P> {
    /// Create an orchestrator, rejecting invalid configuration.
    pub fn new(platform: P, config: VerifyConfig) -> Result<Self> {
        let errors = config.validate();
        if !errors.is_empty() {
            let joined: Vec<String> = errors.iter().map(ToString::to_string).collect();
            return Err(ThreatDiffError::config(joined.join("; ")));
        }
        Ok(Self {
            platform,
            config,
            engine: ComparisonEngine::new(),
            cancel: CancellationFlag::new(),
        })
    }

    /// Use a custom comparison engine.
    #[must_use]
    pub fn with_engine(mut self, engine: ComparisonEngine) -> Self {
        self.engine = engine;
        self
    }

    /// Flag that aborts the current run when set. Restoration and cleanup
    /// still execute.
    #[must_use]
    pub fn cancellation_flag(&self) -> CancellationFlag {
        self.cancel.clone()
    }

    pub const fn platform(&self) -> &P {
        &self.platform
    }

    pub const fn config(&self) -> &VerifyConfig {
        &self.config
    }

    /// Run one verification and return its diff.
    pub fn run(&self, request: &VerificationRequest) -> Result<StructuredDiff> {
        self.run_with_report(request).0
    }

    /// Run one verification, also returning what happened along the way.
    pub fn run_with_report(
        &self,
        request: &VerificationRequest,
    ) -> (Result<StructuredDiff>, RunReport) {
        // Input problems abort before any remote call.
        let (mode, architecture) = match prepare_request(request) {
            Ok(prepared) => prepared,
            Err(e) => {
                tracing::warn!(project = %request.project_id, error = %e, "Rejected verification request");
                return (Err(e), RunReport::default());
            }
        };

        let session = VerificationSession::new(mode, request.project_id.clone());
        tracing::info!(
            session = %session.id(),
            project = %request.project_id,
            mode = %mode,
            "Starting verification run"
        );
        let mut guard = SessionGuard::new(&self.platform, session);
        let mut workspace = None;

        let outcome = self.execute(
            &mut guard.session,
            request,
            architecture.as_ref(),
            &mut workspace,
        );
        if let Err(e) = &outcome {
            tracing::warn!(session = %guard.session.id(), state = %guard.session.state(), error = %e, "Verification step failed");
        }

        advance(&mut guard.session, RunState::Restoring);
        let restore_failure = self.restore(&mut guard.session);

        advance(&mut guard.session, RunState::Cleaning);
        self.clean(&mut guard.session, workspace);

        let result = match (restore_failure, outcome) {
            (Some((version, cause)), outcome) => {
                let err = ThreatDiffError::RestorationFailure {
                    project: request.project_id.clone(),
                    version,
                    cause: Box::new(cause),
                    interrupted_by: outcome.err().map(Box::new),
                };
                tracing::error!(
                    session = %guard.session.id(),
                    project = %request.project_id,
                    "{err}"
                );
                Err(err)
            }
            (None, outcome) => outcome,
        };

        let result = match result {
            Ok(mut diff) => {
                advance(&mut guard.session, RunState::Done);
                let session = &guard.session;
                let metadata = diff.metadata_mut();
                metadata.mode = Some(session.mode());
                metadata.session_id = Some(session.id().to_string());
                metadata.started_at =
                    Some(session.started_at().to_rfc3339_opts(SecondsFormat::Secs, true));
                metadata.finished_at = Some(Utc::now().to_rfc3339_opts(SecondsFormat::Secs, true));
                metadata.restoration = session.restoration;
                metadata.states = session.history().to_vec();
                metadata.cleanup_failures = session.cleanup_failures.clone();
                tracing::info!(
                    session = %session.id(),
                    changes = diff.summary().total_changes,
                    "Verification run finished"
                );
                Ok(diff)
            }
            Err(e) => {
                advance(&mut guard.session, RunState::Failed);
                Err(e)
            }
        };
        // A cancellation only aborts the run it interrupted.
        self.cancel.reset();
        (result, guard.session.report())
    }

    /// The fallible region: baseline, target and comparison.
    fn execute(
        &self,
        session: &mut VerificationSession,
        request: &VerificationRequest,
        architecture: Option<&ValidatedArchitecture>,
        workspace: &mut Option<Workspace>,
    ) -> Result<StructuredDiff> {
        let project = request.project_id.as_str();

        session.transition(RunState::ResolvingBaseline)?;
        self.cancel.check(RunState::ResolvingBaseline.as_str())?;
        let scratch: &Workspace = workspace.insert(Workspace::create(
            self.config.workspace.root.as_deref(),
            &self.config.workspace.prefix,
        )?);
        let (baseline_source, baseline_provenance) = match &request.baseline_version {
            Some(version) => (
                RemoteSource::Version(version),
                Provenance::TaggedVersion {
                    project_id: project.to_string(),
                    version_id: version.clone(),
                },
            ),
            None => (
                RemoteSource::Live,
                Provenance::LiveState {
                    project_id: project.to_string(),
                },
            ),
        };
        let baseline = self
            .download(project, baseline_source, Side::Baseline, scratch, baseline_provenance)
            .context("resolving baseline")?;

        session.transition(RunState::PreparingTarget)?;
        self.cancel.check(RunState::PreparingTarget.as_str())?;
        let target = match (&request.target, architecture) {
            (TargetInput::Live, _) => self.download(
                project,
                RemoteSource::Live,
                Side::Target,
                scratch,
                Provenance::LiveState {
                    project_id: project.to_string(),
                },
            ),
            (TargetInput::Version(version), _) => self.download(
                project,
                RemoteSource::Version(version),
                Side::Target,
                scratch,
                Provenance::TaggedVersion {
                    project_id: project.to_string(),
                    version_id: version.clone(),
                },
            ),
            (TargetInput::Architecture(_), Some(architecture)) => {
                self.import_target(session, project, architecture, scratch)
            }
            (TargetInput::Architecture(source), None) => Err(ThreatDiffError::InvalidRequest(
                format!("architecture '{}' was not validated", source.name),
            )),
        }
        .context("preparing target")?;

        session.transition(RunState::Comparing)?;
        self.cancel.check(RunState::Comparing.as_str())?;
        Ok(self.engine.compare(&baseline, &target))
    }

    /// Back up live state, import, wait for computation and download the
    /// result through a transient version.
    fn import_target(
        &self,
        session: &mut VerificationSession,
        project: &str,
        architecture: &ValidatedArchitecture,
        workspace: &Workspace,
    ) -> Result<Snapshot> {
        let versions = &self.config.versions;

        let backup_name = versions.backup_name(session.id());
        let backup = self.platform.create_version(
            project,
            &backup_name,
            "Live state before verification import",
        )?;
        tracing::info!(project, version = %backup, "Created backup version");
        session.ledger.register(LedgerEntry::DeleteVersion {
            project: project.to_string(),
            version: backup.clone(),
            purpose: VersionPurpose::Backup,
        });
        // Owed before the import starts; a failed import may still have
        // changed the project.
        session.ledger.register(LedgerEntry::Restore {
            project: project.to_string(),
            version: backup,
        });

        self.cancel.check(RunState::PreparingTarget.as_str())?;
        let job = self.platform.import_architecture(project, architecture)?;
        tracing::info!(project, job = %job, source = architecture.name(), "Imported architecture");
        self.platform
            .await_completion(&job, &self.config.polling.policy(), &self.cancel)?;

        let transient_name = versions.transient_name(session.id());
        let transient = self.platform.create_version(
            project,
            &transient_name,
            "Imported architecture under verification",
        )?;
        tracing::info!(project, version = %transient, "Created transient version");
        session.ledger.register(LedgerEntry::DeleteVersion {
            project: project.to_string(),
            version: transient.clone(),
            purpose: VersionPurpose::Transient,
        });

        self.download(
            project,
            RemoteSource::Version(&transient),
            Side::Target,
            workspace,
            Provenance::ImportedArchitecture {
                project_id: project.to_string(),
                source_name: architecture.name().to_string(),
                transient_version_id: transient.clone(),
            },
        )
    }

    /// Fetch one side's artifacts into the workspace and parse them.
    fn download(
        &self,
        project: &str,
        source: RemoteSource<'_>,
        side: Side,
        workspace: &Workspace,
        provenance: Provenance,
    ) -> Result<Snapshot> {
        let retry = self.config.remote.retry_policy();
        let platform = &self.platform;
        let cancel = &self.cancel;
        let artifacts = match source {
            RemoteSource::Live => RawArtifacts {
                diagram: retry_read("get live diagram", &retry, cancel, || {
                    platform.live_diagram(project)
                })?,
                threats: retry_read("get live threats", &retry, cancel, || {
                    platform.live_threats(project)
                })?,
                countermeasures: retry_read("get live countermeasures", &retry, cancel, || {
                    platform.live_countermeasures(project)
                })?,
            },
            RemoteSource::Version(version) => RawArtifacts {
                diagram: retry_read("get version diagram", &retry, cancel, || {
                    platform.version_diagram(project, version)
                })?,
                threats: retry_read("get version threats", &retry, cancel, || {
                    platform.version_threats(project, version)
                })?,
                countermeasures: retry_read("get version countermeasures", &retry, cancel, || {
                    platform.version_countermeasures(project, version)
                })?,
            },
        };
        tracing::debug!(project, side = %side, source = %provenance, "Downloaded artifacts");
        workspace.write_artifacts(side, &artifacts)?;
        workspace
            .load_snapshot(side, provenance)
            .with_context(|| format!("parsing {side} artifacts"))
    }

    /// Revert the project if the ledger owes a restore. Called exactly once
    /// per run; a failing restore is not retried.
    fn restore(&self, session: &mut VerificationSession) -> Option<(String, ThreatDiffError)> {
        let entry = session.ledger.take_restore()?;
        let LedgerEntry::Restore { project, version } = &entry else {
            return None;
        };
        tracing::info!(session = %session.id(), project = %project, version = %version, "Restoring project");
        match entry.execute(&self.platform) {
            Ok(()) => {
                session.restoration = RestorationStatus::Succeeded;
                tracing::info!(project = %project, version = %version, "Restored project");
                None
            }
            Err(e) => {
                session.restoration = RestorationStatus::Failed;
                Some((version.clone(), e))
            }
        }
    }

    /// Delete created versions and the workspace. Failures are logged and
    /// recorded, never returned. The backup is kept when restoration failed.
    fn clean(&self, session: &mut VerificationSession, workspace: Option<Workspace>) {
        let restoration_failed = session.restoration == RestorationStatus::Failed;
        for entry in session.ledger.take_deletions() {
            if let LedgerEntry::DeleteVersion {
                purpose: VersionPurpose::Backup,
                version,
                ..
            } = &entry
            {
                if restoration_failed {
                    tracing::warn!(version = %version, "Keeping backup version for manual recovery");
                    continue;
                }
            }
            match entry.execute(&self.platform) {
                Ok(()) => tracing::debug!(entry = %entry, "Cleaned up"),
                Err(e) => {
                    tracing::warn!(entry = %entry, error = %e, "Cleanup failed");
                    session.cleanup_failures.push(format!("{entry}: {e}"));
                }
            }
        }
        if let Some(workspace) = workspace {
            if let Err(e) = workspace.close() {
                tracing::warn!(error = %e, "Cleanup failed");
                session.cleanup_failures.push(e.to_string());
            }
        }
    }
}

/// Resolve the mode and validate any architecture description.
fn prepare_request(
    request: &VerificationRequest,
) -> Result<(ComparisonMode, Option<ValidatedArchitecture>)> {
    let mode = request.resolve_mode()?;
    let architecture = match &request.target {
        TargetInput::Architecture(source) => {
            let validated = ArchitectureParser::new().parse(source)?;
            if let Some(declared) = validated.project_id() {
                if declared != request.project_id {
                    tracing::warn!(
                        project = %request.project_id,
                        declared,
                        "Architecture declares a different project id"
                    );
                }
            }
            Some(validated)
        }
        TargetInput::Live | TargetInput::Version(_) => None,
    };
    Ok((mode, architecture))
}

/// Transition along the recovery path, where every step is always allowed.
fn advance(session: &mut VerificationSession, to: RunState) {
    if let Err(e) = session.transition(to) {
        tracing::error!(session = %session.id(), error = %e, "Unexpected run state");
    }
}
