//! Adapter for plugins whose backing system scans asynchronously.
//!
//! A job is submitted, then polled at a fixed interval until it reaches a
//! terminal status. Before submitting, the backend's own success/failure
//! listings are consulted so an interrupted batch resumes without rescanning.
//!
//! With no `max_wait` the loop is unbounded: a job stuck in `Pending` blocks
//! the caller until the process is terminated or the run's [`CancelToken`] is
//! cancelled.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::error::PluginError;
use crate::plugin::CancelToken;
use crate::types::{Artifact, PluginOutcome};

/// Interval between polls used by the reference tooling.
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_secs(5);

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum JobStatus {
    Pending,
    Finished,
    Error,
}

impl JobStatus {
    pub fn is_terminal(&self) -> bool {
        !matches!(self, JobStatus::Pending)
    }
}

/// Handle to a scan running on the backend.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PollJob {
    pub id: String,
    pub status: JobStatus,
}

impl PollJob {
    pub fn pending(id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            status: JobStatus::Pending,
        }
    }
}

/// Terminal outcome the backend already holds for an artifact.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ExistingScan {
    pub already_succeeded: bool,
    pub already_failed: bool,
}

pub trait ScanBackend: Send + Sync {
    fn find_existing(&self, artifact: &Artifact) -> Result<ExistingScan, PluginError>;

    fn submit(&self, artifact: &Artifact) -> Result<PollJob, PluginError>;

    fn poll(&self, job: &PollJob) -> Result<JobStatus, PluginError>;
}

/// Suspension point between polls. Injected so tests run without real delays.
pub trait Sleeper: Send + Sync {
    fn sleep(&self, duration: Duration);
}

#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadSleeper;

impl Sleeper for ThreadSleeper {
    fn sleep(&self, duration: Duration) {
        std::thread::sleep(duration);
    }
}

#[derive(Debug, Clone)]
pub struct PollSettings {
    pub interval: Duration,
    /// Total time spent sleeping before giving up. `None` waits forever.
    pub max_wait: Option<Duration>,
    /// Poll errors tolerated before the error is returned.
    pub poll_retries: u32,
}

impl Default for PollSettings {
    fn default() -> Self {
        Self {
            interval: DEFAULT_POLL_INTERVAL,
            max_wait: None,
            poll_retries: 0,
        }
    }
}

pub struct PollingScanClient<B> {
    backend: B,
    settings: PollSettings,
    sleeper: Arc<dyn Sleeper>,
}

impl<B: ScanBackend> PollingScanClient<B> {
    pub fn new(backend: B, settings: PollSettings) -> Self {
        Self::with_sleeper(backend, settings, Arc::new(ThreadSleeper))
    }

    pub fn with_sleeper(backend: B, settings: PollSettings, sleeper: Arc<dyn Sleeper>) -> Self {
        Self {
            backend,
            settings,
            sleeper,
        }
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    /// Drive one artifact through the backend to a terminal outcome.
    pub fn scan(
        &self,
        artifact: &Artifact,
        cancel: &CancelToken,
    ) -> Result<PluginOutcome, PluginError> {
        let existing = self.backend.find_existing(artifact)?;
        if existing.already_succeeded {
            info!(%artifact, "backend already holds a finished scan");
            return Ok(PluginOutcome::Success);
        }
        if existing.already_failed {
            info!(%artifact, "backend already holds a failed scan");
            return Ok(PluginOutcome::failure("previous scan ended in error"));
        }

        let mut job = self.backend.submit(artifact)?;
        debug!(job = %job.id, %artifact, "scan job submitted");

        let started = Instant::now();
        let mut waited = Duration::ZERO;
        let mut retries_left = self.settings.poll_retries;

        loop {
            match self.backend.poll(&job) {
                Ok(status) => job.status = status,
                Err(e) if retries_left > 0 => {
                    retries_left -= 1;
                    warn!(job = %job.id, error = %e, retries_left, "poll failed, retrying");
                    if let Some(stop) = self.wait(started, &mut waited, cancel, &job) {
                        return Ok(stop);
                    }
                    continue;
                }
                Err(e) => return Err(e),
            }

            match job.status {
                JobStatus::Finished => return Ok(PluginOutcome::Success),
                JobStatus::Error => {
                    return Ok(PluginOutcome::failure(format!(
                        "scan job {} ended in error",
                        job.id
                    )))
                }
                JobStatus::Pending => {
                    debug!(job = %job.id, waited_secs = waited.as_secs(), "scan still pending");
                    if let Some(stop) = self.wait(started, &mut waited, cancel, &job) {
                        return Ok(stop);
                    }
                }
            }
        }
    }

    /// Sleep one interval, or return the outcome that ends the loop early.
    ///
    /// The deadline holds against both the summed intervals and the wall
    /// clock, so a zero interval cannot keep the loop alive.
    fn wait(
        &self,
        started: Instant,
        waited: &mut Duration,
        cancel: &CancelToken,
        job: &PollJob,
    ) -> Option<PluginOutcome> {
        if cancel.is_cancelled() {
            return Some(PluginOutcome::failure(format!(
                "cancelled while waiting for scan job {}",
                job.id
            )));
        }
        if let Some(max) = self.settings.max_wait {
            let elapsed = started.elapsed();
            if *waited + self.settings.interval > max || elapsed >= max {
                return Some(PluginOutcome::failure(format!(
                    "scan job {} still pending after {:.1}s",
                    job.id,
                    (*waited).max(elapsed).as_secs_f64()
                )));
            }
        }
        self.sleeper.sleep(self.settings.interval);
        *waited += self.settings.interval;
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::VecDeque;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Mutex;

    #[derive(Default)]
    struct StubBackend {
        existing: ExistingScan,
        statuses: Mutex<VecDeque<Result<JobStatus, PluginError>>>,
        submits: AtomicUsize,
        polls: AtomicUsize,
    }

    impl StubBackend {
        fn with_statuses(statuses: Vec<Result<JobStatus, PluginError>>) -> Self {
            Self {
                statuses: Mutex::new(statuses.into()),
                ..Default::default()
            }
        }
    }

    impl ScanBackend for StubBackend {
        fn find_existing(&self, _: &Artifact) -> Result<ExistingScan, PluginError> {
            Ok(self.existing)
        }

        fn submit(&self, _: &Artifact) -> Result<PollJob, PluginError> {
            self.submits.fetch_add(1, Ordering::SeqCst);
            Ok(PollJob::pending("17"))
        }

        fn poll(&self, _: &PollJob) -> Result<JobStatus, PluginError> {
            self.polls.fetch_add(1, Ordering::SeqCst);
            self.statuses
                .lock()
                .unwrap()
                .pop_front()
                .unwrap_or(Ok(JobStatus::Pending))
        }
    }

    #[derive(Default)]
    struct RecordingSleeper {
        sleeps: Mutex<Vec<Duration>>,
    }

    impl Sleeper for RecordingSleeper {
        fn sleep(&self, duration: Duration) {
            self.sleeps.lock().unwrap().push(duration);
        }
    }

    fn client(
        backend: StubBackend,
        settings: PollSettings,
    ) -> (PollingScanClient<StubBackend>, Arc<RecordingSleeper>) {
        let sleeper = Arc::new(RecordingSleeper::default());
        let client = PollingScanClient::with_sleeper(backend, settings, sleeper.clone());
        (client, sleeper)
    }

    #[test]
    fn test_pending_twice_then_finished() {
        let backend = StubBackend::with_statuses(vec![
            Ok(JobStatus::Pending),
            Ok(JobStatus::Pending),
            Ok(JobStatus::Finished),
        ]);
        let (client, sleeper) = client(backend, PollSettings::default());

        let outcome = client
            .scan(&Artifact::from("/tmp/a.apk"), &CancelToken::new())
            .unwrap();

        assert_eq!(outcome, PluginOutcome::Success);
        assert_eq!(client.backend().polls.load(Ordering::SeqCst), 3);
        assert_eq!(
            *sleeper.sleeps.lock().unwrap(),
            vec![DEFAULT_POLL_INTERVAL, DEFAULT_POLL_INTERVAL]
        );
    }

    #[test]
    fn test_error_status_records_failure() {
        let backend = StubBackend::with_statuses(vec![Ok(JobStatus::Pending), Ok(JobStatus::Error)]);
        let (client, sleeper) = client(backend, PollSettings::default());

        let outcome = client
            .scan(&Artifact::from("/tmp/a.apk"), &CancelToken::new())
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_resume_already_succeeded_skips_submit() {
        let backend = StubBackend {
            existing: ExistingScan {
                already_succeeded: true,
                already_failed: false,
            },
            ..Default::default()
        };
        let (client, sleeper) = client(backend, PollSettings::default());

        let outcome = client
            .scan(&Artifact::from("/tmp/a.apk"), &CancelToken::new())
            .unwrap();

        assert_eq!(outcome, PluginOutcome::Success);
        assert_eq!(client.backend().submits.load(Ordering::SeqCst), 0);
        assert_eq!(client.backend().polls.load(Ordering::SeqCst), 0);
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn test_resume_already_failed_skips_submit() {
        let backend = StubBackend {
            existing: ExistingScan {
                already_succeeded: false,
                already_failed: true,
            },
            ..Default::default()
        };
        let (client, _) = client(backend, PollSettings::default());

        let outcome = client
            .scan(&Artifact::from("/tmp/a.apk"), &CancelToken::new())
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(client.backend().submits.load(Ordering::SeqCst), 0);
    }

    #[test]
    fn test_cancelled_token_stops_pending_loop() {
        let backend = StubBackend::with_statuses(vec![]);
        let (client, sleeper) = client(backend, PollSettings::default());
        let cancel = CancelToken::new();
        cancel.cancel();

        let outcome = client.scan(&Artifact::from("/tmp/a.apk"), &cancel).unwrap();

        match outcome {
            PluginOutcome::Failure(reason) => assert!(reason.contains("cancelled")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(sleeper.sleeps.lock().unwrap().is_empty());
    }

    #[test]
    fn test_max_wait_bounds_pending_loop() {
        let backend = StubBackend::with_statuses(vec![]);
        let settings = PollSettings {
            interval: Duration::from_secs(5),
            max_wait: Some(Duration::from_secs(10)),
            poll_retries: 0,
        };
        let (client, sleeper) = client(backend, settings);

        let outcome = client
            .scan(&Artifact::from("/tmp/a.apk"), &CancelToken::new())
            .unwrap();

        assert!(!outcome.is_success());
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 2);
        assert_eq!(client.backend().polls.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_max_wait_holds_with_zero_interval() {
        let backend = StubBackend::with_statuses(vec![]);
        let settings = PollSettings {
            interval: Duration::ZERO,
            max_wait: Some(Duration::from_millis(20)),
            poll_retries: 0,
        };
        let (client, _) = client(backend, settings);

        let outcome = client
            .scan(&Artifact::from("/tmp/a.apk"), &CancelToken::new())
            .unwrap();

        match outcome {
            PluginOutcome::Failure(reason) => assert!(reason.contains("still pending")),
            other => panic!("expected failure, got {other:?}"),
        }
        assert!(client.backend().polls.load(Ordering::SeqCst) >= 1);
    }

    #[test]
    fn test_poll_error_without_retries_is_fatal() {
        let backend = StubBackend::with_statuses(vec![Err(PluginError::Backend(
            "503".to_string(),
        ))]);
        let (client, _) = client(backend, PollSettings::default());

        let result = client.scan(&Artifact::from("/tmp/a.apk"), &CancelToken::new());
        assert!(matches!(result, Err(PluginError::Backend(_))));
    }

    #[test]
    fn test_poll_retries_recover_from_transient_error() {
        let backend = StubBackend::with_statuses(vec![
            Err(PluginError::Backend("503".to_string())),
            Ok(JobStatus::Finished),
        ]);
        let settings = PollSettings {
            poll_retries: 2,
            ..PollSettings::default()
        };
        let (client, sleeper) = client(backend, settings);

        let outcome = client
            .scan(&Artifact::from("/tmp/a.apk"), &CancelToken::new())
            .unwrap();

        assert_eq!(outcome, PluginOutcome::Success);
        assert_eq!(sleeper.sleeps.lock().unwrap().len(), 1);
    }

    #[test]
    fn test_job_status_terminal() {
        assert!(!JobStatus::Pending.is_terminal());
        assert!(JobStatus::Finished.is_terminal());
        assert!(JobStatus::Error.is_terminal());
    }
}
