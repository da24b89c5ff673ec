//! Per-SUT automation controller
//!
//! One controller per target machine, owning a worker task, the lifecycle
//! state machine, and the progress snapshot. Starting while a worker is
//! active is rejected rather than queued.

use crate::campaign;
use crate::client::AgentApi;
use crate::executor::RunExecutor;
use gamerig_common::{AutomationJob, JobState, RunProgress};
use parking_lot::{Mutex, RwLock};
use std::sync::Arc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn, Instrument};

/// Policy knobs applied to every run of a job
#[derive(Debug, Clone)]
pub struct RunPolicy {
    /// Treat a warning launch outcome (process found, foreground
    /// unconfirmed) as acceptable and hand the run to the executor anyway.
    /// Off by default: automation against an unfocused window usually
    /// clicks into the void.
    pub proceed_on_unconfirmed_foreground: bool,
}

impl Default for RunPolicy {
    fn default() -> Self {
        Self {
            proceed_on_unconfirmed_foreground: false,
        }
    }
}

pub(crate) struct ControllerInner {
    pub(crate) name: String,
    pub(crate) client: Arc<dyn AgentApi>,
    pub(crate) executor: Arc<dyn RunExecutor>,
    pub(crate) policy: RunPolicy,
    pub(crate) state: RwLock<JobState>,
    pub(crate) progress: RwLock<RunProgress>,
    stop: Mutex<CancellationToken>,
    worker: Mutex<Option<JoinHandle<()>>>,
}

impl ControllerInner {
    pub(crate) fn set_state(&self, state: JobState) {
        *self.state.write() = state;
    }

    pub(crate) fn update_progress(&self, update: impl FnOnce(&mut RunProgress)) {
        update(&mut self.progress.write());
    }
}

/// Controls automation for a single SUT machine
pub struct SutController {
    inner: Arc<ControllerInner>,
}

impl SutController {
    pub fn new(
        name: impl Into<String>,
        client: Arc<dyn AgentApi>,
        executor: Arc<dyn RunExecutor>,
        policy: RunPolicy,
    ) -> Self {
        Self {
            inner: Arc::new(ControllerInner {
                name: name.into(),
                client,
                executor,
                policy,
                state: RwLock::new(JobState::Idle),
                progress: RwLock::new(RunProgress::default()),
                stop: Mutex::new(CancellationToken::new()),
                worker: Mutex::new(None),
            }),
        }
    }

    pub fn name(&self) -> &str {
        &self.inner.name
    }

    pub fn state(&self) -> JobState {
        *self.inner.state.read()
    }

    /// Report-only snapshot; momentarily stale values are expected
    pub fn progress(&self) -> RunProgress {
        self.inner.progress.read().clone()
    }

    /// Start a job. Returns false without touching the active job when a
    /// worker is still running, and false with state `Error` when the job
    /// is structurally empty.
    pub fn start(&self, job: AutomationJob) -> bool {
        let mut worker = self.inner.worker.lock();
        if worker.as_ref().map_or(false, |h| !h.is_finished()) {
            warn!("automation already running for {}", self.inner.name);
            return false;
        }
        if job.is_empty() {
            warn!("{}: job has no games or launch target", self.inner.name);
            self.inner.set_state(JobState::Error);
            return false;
        }

        let token = CancellationToken::new();
        *self.inner.stop.lock() = token.clone();
        self.inner.set_state(JobState::Running);
        *self.inner.progress.write() = RunProgress {
            total_runs: job.total_runs(),
            total_games: job.total_games(),
            ..Default::default()
        };

        let inner = self.inner.clone();
        let span = tracing::info_span!("sut_worker", sut = %self.inner.name);
        *worker = Some(tokio::spawn(
            campaign::run_job(inner, job, token).instrument(span),
        ));
        true
    }

    /// Request a stop: cancel the local stop token (observed between runs
    /// and inside delay waits) and best-effort notify the agent so an
    /// in-flight launch wait is released promptly. Idempotent.
    pub fn stop(&self) {
        let active = self
            .inner
            .worker
            .lock()
            .as_ref()
            .map_or(false, |h| !h.is_finished());

        self.inner.stop.lock().cancel();

        if active {
            info!("stopping automation for {}", self.inner.name);
            self.inner.set_state(JobState::Stopped);

            let client = self.inner.client.clone();
            let name = self.inner.name.clone();
            tokio::spawn(async move {
                if let Err(e) = client.cancel_launch().await {
                    debug!("could not send cancel_launch to {}: {}", name, e);
                }
            });
        }
    }

    /// Wait for the current worker to finish and return the final state
    pub async fn wait(&self) -> JobState {
        let handle = self.inner.worker.lock().take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.state()
    }
}
