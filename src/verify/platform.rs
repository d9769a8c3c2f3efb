//! Remote threat-modeling platform abstraction.
//!
//! [`ThreatModelPlatform`] is the only seam between the orchestrator and a
//! transport. Reads are idempotent and may be retried through
//! [`retry_read`]; mutations are called exactly once.

use crate::error::{Result, ThreatDiffError};
use crate::parsers::ValidatedArchitecture;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

/// Granularity of interruptible sleeps.
const SLEEP_SLICE: Duration = Duration::from_millis(50);

/// Handle of a remote asynchronous computation.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct JobHandle(pub String);

impl fmt::Display for JobHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// Progress of a remote computation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum JobStatus {
    Pending,
    Running,
    Succeeded,
    Failed(String),
}

/// Bounds of the completion polling loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PollPolicy {
    /// Pause between two status checks
    pub interval: Duration,
    /// Wall-clock budget for the whole wait
    pub timeout: Duration,
    /// Maximum number of status checks
    pub max_polls: u32,
}

/// Bounded retries for idempotent reads.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RetryPolicy {
    /// Total attempts, including the first
    pub attempts: u32,
    /// Delay before the first retry; doubled for each further one
    pub backoff: Duration,
}

impl RetryPolicy {
    /// A single attempt.
    pub const NONE: Self = Self {
        attempts: 1,
        backoff: Duration::ZERO,
    };

    #[must_use]
    pub fn delay_before(&self, retry: u32) -> Duration {
        self.backoff
            .saturating_mul(1u32 << retry.saturating_sub(1).min(16))
    }
}

/// Shared abort switch for a verification run.
///
/// Clones share the same flag; setting it from any thread makes the run stop
/// at its next check, after which restoration and cleanup still execute.
#[derive(Debug, Clone, Default)]
pub struct CancellationFlag(Arc<AtomicBool>);

impl CancellationFlag {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn cancel(&self) {
        self.0.store(true, Ordering::Relaxed);
    }

    /// Clear the flag so the next run can start.
    pub fn reset(&self) {
        self.0.store(false, Ordering::Relaxed);
    }

    #[must_use]
    pub fn is_cancelled(&self) -> bool {
        self.0.load(Ordering::Relaxed)
    }

    /// Fail with `Cancelled` if the flag is set.
    pub fn check(&self, state: &str) -> Result<()> {
        if self.is_cancelled() {
            return Err(ThreatDiffError::Cancelled {
                state: state.to_string(),
            });
        }
        Ok(())
    }

    /// Sleep for `duration`, waking early to fail if the flag is set.
    pub fn sleep(&self, duration: Duration, state: &str) -> Result<()> {
        let deadline = Instant::now() + duration;
        loop {
            self.check(state)?;
            let now = Instant::now();
            if now >= deadline {
                return Ok(());
            }
            std::thread::sleep(SLEEP_SLICE.min(deadline - now));
        }
    }
}

/// Operations consumed from a remote threat-modeling platform.
pub trait ThreatModelPlatform: Send + Sync {
    /// Diagram of the project's live state.
    fn live_diagram(&self, project: &str) -> Result<Vec<u8>>;

    /// Threats of the project's live state, as a JSON document.
    fn live_threats(&self, project: &str) -> Result<String>;

    /// Countermeasures of the project's live state, as a JSON document.
    fn live_countermeasures(&self, project: &str) -> Result<String>;

    fn version_diagram(&self, project: &str, version: &str) -> Result<Vec<u8>>;

    fn version_threats(&self, project: &str, version: &str) -> Result<String>;

    fn version_countermeasures(&self, project: &str, version: &str) -> Result<String>;

    /// Replace the project's architecture, starting threat computation.
    fn import_architecture(
        &self,
        project: &str,
        architecture: &ValidatedArchitecture,
    ) -> Result<JobHandle>;

    /// Current status of a computation started by an import.
    fn job_status(&self, job: &JobHandle) -> Result<JobStatus>;

    /// Tag the current live state; returns the new version id.
    fn create_version(&self, project: &str, name: &str, description: &str) -> Result<String>;

    fn delete_version(&self, project: &str, version: &str) -> Result<()>;

    /// Revert the live state to a tagged version.
    fn restore_to_version(&self, project: &str, version: &str) -> Result<()>;

    /// Poll `job` until it finishes, fails, or exhausts `policy`.
    ///
    /// Retryable status-check failures count as a poll and are logged;
    /// any other error ends the wait.
    fn await_completion(
        &self,
        job: &JobHandle,
        policy: &PollPolicy,
        cancel: &CancellationFlag,
    ) -> Result<()> {
        const STATE: &str = "awaiting computation";
        let started = Instant::now();
        let mut polls = 0u32;
        loop {
            cancel.check(STATE)?;
            polls += 1;
            match self.job_status(job) {
                Ok(JobStatus::Succeeded) => {
                    tracing::debug!(job = %job, polls, "Computation finished");
                    return Ok(());
                }
                Ok(JobStatus::Failed(message)) => {
                    return Err(ThreatDiffError::ComputationFailed {
                        job: job.0.clone(),
                        message,
                    });
                }
                Ok(status) => {
                    tracing::debug!(job = %job, poll = polls, ?status, "Computation in progress");
                }
                Err(e) if e.is_retryable() => {
                    tracing::debug!(job = %job, poll = polls, error = %e, "Status check failed, polling again");
                }
                Err(e) => return Err(e),
            }

            let elapsed = started.elapsed();
            if polls >= policy.max_polls || elapsed >= policy.timeout {
                return Err(ThreatDiffError::ComputationTimeout {
                    job: job.0.clone(),
                    timeout: policy.timeout,
                    polls,
                });
            }
            cancel.sleep(policy.interval.min(policy.timeout - elapsed), STATE)?;
        }
    }
}

/// Run an idempotent read, retrying retryable failures with exponential
/// backoff. Backoff sleeps stop early when `cancel` is set.
pub fn retry_read<T>(
    operation: &str,
    policy: &RetryPolicy,
    cancel: &CancellationFlag,
    mut read: impl FnMut() -> Result<T>,
) -> Result<T> {
    let attempts = policy.attempts.max(1);
    let mut attempt = 1;
    loop {
        match read() {
            Ok(value) => return Ok(value),
            Err(e) if e.is_retryable() && attempt < attempts => {
                let delay = policy.delay_before(attempt);
                tracing::debug!(operation, attempt, ?delay, error = %e, "Retrying remote read");
                cancel.sleep(delay, operation)?;
                attempt += 1;
            }
            Err(e) => return Err(e),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::RemoteErrorKind;
    use std::cell::Cell;
    use std::sync::Mutex;

    fn network() -> ThreatDiffError {
        ThreatDiffError::remote("read", RemoteErrorKind::Network("reset".into()))
    }

    #[test]
    fn test_retry_read_recovers() {
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            attempts: 3,
            backoff: Duration::ZERO,
        };
        let value = retry_read("read", &policy, &CancellationFlag::new(), || {
            calls.set(calls.get() + 1);
            if calls.get() < 3 {
                Err(network())
            } else {
                Ok(42)
            }
        })
        .unwrap();
        assert_eq!(value, 42);
        assert_eq!(calls.get(), 3);
    }

    #[test]
    fn test_retry_read_gives_up() {
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            attempts: 2,
            backoff: Duration::ZERO,
        };
        let result: Result<()> = retry_read("read", &policy, &CancellationFlag::new(), || {
            calls.set(calls.get() + 1);
            Err(network())
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 2);
    }

    #[test]
    fn test_retry_read_skips_permanent_errors() {
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            attempts: 5,
            backoff: Duration::ZERO,
        };
        let result: Result<()> = retry_read("read", &policy, &CancellationFlag::new(), || {
            calls.set(calls.get() + 1);
            Err(ThreatDiffError::remote(
                "read",
                RemoteErrorKind::NotFound("project".into()),
            ))
        });
        assert!(result.is_err());
        assert_eq!(calls.get(), 1);
    }

    #[test]
    fn test_backoff_doubles() {
        let policy = RetryPolicy {
            attempts: 4,
            backoff: Duration::from_millis(100),
        };
        assert_eq!(policy.delay_before(1), Duration::from_millis(100));
        assert_eq!(policy.delay_before(2), Duration::from_millis(200));
        assert_eq!(policy.delay_before(3), Duration::from_millis(400));
    }

    #[test]
    fn test_cancellation_flag() {
        let flag = CancellationFlag::new();
        let shared = flag.clone();
        assert!(flag.check("idle").is_ok());
        shared.cancel();
        assert!(matches!(
            flag.check("idle"),
            Err(ThreatDiffError::Cancelled { .. })
        ));
        assert!(flag.sleep(Duration::from_secs(60), "idle").is_err());

        flag.reset();
        assert!(!shared.is_cancelled());
        assert!(shared.check("idle").is_ok());
    }

    #[test]
    fn test_retry_read_stops_when_cancelled() {
        let calls = Cell::new(0);
        let policy = RetryPolicy {
            attempts: 5,
            backoff: Duration::from_secs(60),
        };
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let result: Result<()> = retry_read("get live threats", &policy, &cancel, || {
            calls.set(calls.get() + 1);
            Err(network())
        });
        match result {
            Err(ThreatDiffError::Cancelled { state }) => assert_eq!(state, "get live threats"),
            other => panic!("expected Cancelled, got {other:?}"),
        }
        assert_eq!(calls.get(), 1);
    }

    /// Answers status checks from a script, repeating the last entry.
    struct ScriptedJobs(Mutex<Vec<Result<JobStatus>>>);

    impl ThreatModelPlatform for ScriptedJobs {
        fn live_diagram(&self, _: &str) -> Result<Vec<u8>> {
            unimplemented!()
        }
        fn live_threats(&self, _: &str) -> Result<String> {
            unimplemented!()
        }
        fn live_countermeasures(&self, _: &str) -> Result<String> {
            unimplemented!()
        }
        fn version_diagram(&self, _: &str, _: &str) -> Result<Vec<u8>> {
            unimplemented!()
        }
        fn version_threats(&self, _: &str, _: &str) -> Result<String> {
            unimplemented!()
        }
        fn version_countermeasures(&self, _: &str, _: &str) -> Result<String> {
            unimplemented!()
        }
        fn import_architecture(&self, _: &str, _: &ValidatedArchitecture) -> Result<JobHandle> {
            unimplemented!()
        }
        fn job_status(&self, _: &JobHandle) -> Result<JobStatus> {
            let mut script = self.0.lock().unwrap();
            if script.len() > 1 {
                script.remove(0)
            } else {
                match &script[0] {
                    Ok(status) => Ok(status.clone()),
                    Err(_) => Err(network()),
                }
            }
        }
        fn create_version(&self, _: &str, _: &str, _: &str) -> Result<String> {
            unimplemented!()
        }
        fn delete_version(&self, _: &str, _: &str) -> Result<()> {
            unimplemented!()
        }
        fn restore_to_version(&self, _: &str, _: &str) -> Result<()> {
            unimplemented!()
        }
    }

    fn policy(max_polls: u32) -> PollPolicy {
        PollPolicy {
            interval: Duration::ZERO,
            timeout: Duration::from_secs(30),
            max_polls,
        }
    }

    #[test]
    fn test_await_completion_success_after_transient_error() {
        let jobs = ScriptedJobs(Mutex::new(vec![
            Ok(JobStatus::Pending),
            Err(network()),
            Ok(JobStatus::Running),
            Ok(JobStatus::Succeeded),
        ]));
        let job = JobHandle("op-1".into());
        assert!(jobs
            .await_completion(&job, &policy(10), &CancellationFlag::new())
            .is_ok());
    }

    #[test]
    fn test_await_completion_times_out_on_max_polls() {
        let jobs = ScriptedJobs(Mutex::new(vec![Ok(JobStatus::Running)]));
        let job = JobHandle("op-1".into());
        let err = jobs
            .await_completion(&job, &policy(3), &CancellationFlag::new())
            .unwrap_err();
        assert!(matches!(
            err,
            ThreatDiffError::ComputationTimeout { polls: 3, .. }
        ));
    }

    #[test]
    fn test_await_completion_reports_failure() {
        let jobs = ScriptedJobs(Mutex::new(vec![Ok(JobStatus::Failed(
            "invalid OTM".into(),
        ))]));
        let job = JobHandle("op-1".into());
        let err = jobs
            .await_completion(&job, &policy(3), &CancellationFlag::new())
            .unwrap_err();
        assert!(matches!(err, ThreatDiffError::ComputationFailed { .. }));
    }

    #[test]
    fn test_await_completion_observes_cancellation() {
        let jobs = ScriptedJobs(Mutex::new(vec![Ok(JobStatus::Running)]));
        let cancel = CancellationFlag::new();
        cancel.cancel();
        let err = jobs
            .await_completion(&JobHandle("op-1".into()), &policy(3), &cancel)
            .unwrap_err();
        assert!(matches!(err, ThreatDiffError::Cancelled { .. }));
    }
}
