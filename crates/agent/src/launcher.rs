//! The launch engine
//!
//! Multi-phase launch state machine: resolve the target, reap the
//! previously tracked process, spawn, detect the real game process behind
//! any launcher wrapper, wait for window readiness, force foreground, and
//! retry under a bounded policy. Every wait observes the cancellation
//! token, so a cancel request lands within the poll interval rather than
//! the phase timeout.

use crate::config::AgentConfig;
use crate::process::{ProcessInfo, ProcessInspector};
use crate::store::{extract_store_id, StoreResolver};
use crate::window::{FocusResult, WindowDriver};
use gamerig_common::wait::{poll_until, sleep_unless_cancelled, CancelSignal, WaitOutcome};
use gamerig_common::{
    Error, LaunchMethod, LaunchOutcome, LaunchRequest, LaunchResponse, Result,
    TrackedProcessState,
};
use parking_lot::Mutex;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use std::time::{Duration, Instant};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

/// The single tracked game process per engine. A new launch reaps the
/// previous one before spawning.
struct TrackedProcess {
    name: String,
    child: Option<Child>,
}

/// Resolved launch target after phase 1
enum ResolvedTarget {
    Store { app_id: String, exe: PathBuf },
    Direct { exe: PathBuf },
}

enum Detection {
    Found(ProcessInfo),
    TimedOut,
    Cancelled,
}

enum WindowWait {
    Done { ready: bool },
    Cancelled,
}

enum Focus {
    Done {
        process: ProcessInfo,
        confirmed: bool,
        window_ready: bool,
    },
    Cancelled,
}

/// Launch engine owning the per-agent launch state
pub struct LaunchEngine {
    config: AgentConfig,
    store: StoreResolver,
    procs: Box<dyn ProcessInspector>,
    windows: Box<dyn WindowDriver>,
    cancel: CancelSignal,
    /// Serializes launches; at most one in flight per agent
    flight: tokio::sync::Mutex<()>,
    tracked: Mutex<Option<TrackedProcess>>,
}

impl LaunchEngine {
    pub fn new(
        config: AgentConfig,
        procs: Box<dyn ProcessInspector>,
        windows: Box<dyn WindowDriver>,
    ) -> Self {
        let store_root = config
            .store_root
            .clone()
            .unwrap_or_else(StoreResolver::default_root);
        Self {
            store: StoreResolver::new(store_root),
            config,
            procs,
            windows,
            cancel: CancelSignal::new(),
            flight: tokio::sync::Mutex::new(()),
            tracked: Mutex::new(None),
        }
    }

    /// Arm the cancellation signal; any in-flight launch wait wakes
    /// within its poll interval.
    pub fn cancel_launch(&self) {
        info!("launch cancellation requested");
        self.cancel.arm();
    }

    /// Name of the currently tracked game process, if any
    pub fn tracked_process_name(&self) -> Option<String> {
        self.tracked.lock().as_ref().map(|t| t.name.clone())
    }

    /// Whether the tracked process is still alive
    pub fn tracked_state(&self) -> TrackedProcessState {
        match self.tracked_process_name() {
            None => TrackedProcessState::None,
            Some(name) => {
                if self.procs.find_exact(&name).is_some() {
                    TrackedProcessState::Running
                } else {
                    TrackedProcessState::NotFound
                }
            }
        }
    }

    pub fn check_process(&self, name: &str) -> Option<ProcessInfo> {
        self.procs.find_exact(name)
    }

    /// Kill a process by name, clearing tracking when it was the tracked one
    pub fn kill_process(&self, name: &str) -> bool {
        let killed = self.procs.terminate_by_name(name);
        let mut tracked = self.tracked.lock();
        if tracked
            .as_ref()
            .map_or(false, |t| t.name.eq_ignore_ascii_case(name))
        {
            *tracked = None;
        }
        killed
    }

    /// Run the full launch sequence for one request.
    ///
    /// Returns `Err` only for terminal failures (unresolvable target,
    /// spawn failure); warning and cancelled outcomes are `Ok` responses.
    pub async fn launch(&self, req: &LaunchRequest) -> Result<LaunchResponse> {
        let _flight = self.flight.lock().await;
        // Fresh token so a stale cancellation never affects this launch
        let cancel = self.cancel.reset();

        // Phase 1: resolve the target
        let target = self.resolve_target(req)?;
        let (method, resolved_path) = match &target {
            ResolvedTarget::Store { exe, .. } => (
                LaunchMethod::StoreProtocol,
                Some(exe.to_string_lossy().to_string()),
            ),
            ResolvedTarget::Direct { .. } => (LaunchMethod::DirectExe, None),
        };
        let process_name = expected_process_name(req, &target);
        info!(
            "launch: target={} method={} process='{}'",
            req.path, method, process_name
        );

        // Phase 2: reap the previously tracked process
        self.reap_previous();

        // Phase 3: spawn
        let child = self.spawn(&target)?;
        let subprocess_pid = child.as_ref().map(|c| c.id());
        *self.tracked.lock() = Some(TrackedProcess {
            name: process_name.clone(),
            child,
        });

        let settle = self.config.detection.spawn_settle_secs;
        if settle > 0 && sleep_unless_cancelled(Duration::from_secs(settle), &cancel).await {
            info!("launch cancelled during spawn settle");
            return Ok(LaunchResponse::cancelled(method));
        }

        // Phase 4: detect the real game process. Many titles spawn through
        // a short-lived launcher, so the subprocess handle is not enough.
        let wait_cap = if req.startup_wait > 0 {
            req.startup_wait
        } else {
            self.config.detection.startup_wait_secs
        };
        info!(
            "waiting up to {}s for process '{}' to appear",
            wait_cap, process_name
        );
        let detected = match self.detect_process(&process_name, wait_cap, &cancel).await {
            Detection::Found(found) => found,
            Detection::Cancelled => {
                info!("launch cancelled during process detection");
                return Ok(LaunchResponse::cancelled(method));
            }
            Detection::TimedOut => {
                warn!(
                    "process '{}' not detected within {}s",
                    process_name, wait_cap
                );
                return Ok(LaunchResponse {
                    status: LaunchOutcome::Warning,
                    launch_method: method,
                    resolved_path,
                    subprocess_pid,
                    game_process_pid: None,
                    game_process_name: None,
                    foreground_confirmed: None,
                    window_ready: None,
                    warning: Some(format!(
                        "process '{process_name}' not detected, but launch command executed"
                    )),
                    error: None,
                });
            }
        };
        info!("process found: {} (pid {})", detected.name, detected.pid);

        // Phases 5-6: window readiness, then foreground with retries
        match self.confirm_foreground(detected, &process_name, &cancel).await {
            Focus::Cancelled => {
                info!("launch cancelled during foreground confirmation");
                Ok(LaunchResponse::cancelled(method))
            }
            Focus::Done {
                process,
                confirmed,
                window_ready,
            } => {
                if confirmed {
                    info!(
                        "launch complete: {} (pid {}) in foreground",
                        process.name, process.pid
                    );
                } else {
                    warn!(
                        "process {} (pid {}) running but foreground unconfirmed",
                        process.name, process.pid
                    );
                }
                Ok(LaunchResponse {
                    status: if confirmed {
                        LaunchOutcome::Success
                    } else {
                        LaunchOutcome::Warning
                    },
                    launch_method: method,
                    resolved_path,
                    subprocess_pid,
                    game_process_pid: Some(process.pid),
                    game_process_name: Some(process.name),
                    foreground_confirmed: Some(confirmed),
                    window_ready: Some(window_ready),
                    warning: (!confirmed).then(|| {
                        "process launched but window not confirmed in foreground".to_string()
                    }),
                    error: None,
                })
            }
        }
    }

    fn resolve_target(&self, req: &LaunchRequest) -> Result<ResolvedTarget> {
        if let Some(app_id) = extract_store_id(&req.path) {
            let exe = self.store.resolve(&app_id, &req.process_id)?;
            info!("resolved store id {} to {}", app_id, exe.display());
            return Ok(ResolvedTarget::Store { app_id, exe });
        }

        let exe = PathBuf::from(&req.path);
        if !exe.is_file() {
            return Err(Error::TargetResolution(format!(
                "executable not found: {}",
                req.path
            )));
        }
        Ok(ResolvedTarget::Direct { exe })
    }

    fn reap_previous(&self) {
        let previous = self.tracked.lock().take();
        if let Some(mut previous) = previous {
            info!("terminating previously tracked game: {}", previous.name);
            self.procs.terminate_by_name(&previous.name);
            if let Some(child) = previous.child.as_mut() {
                if matches!(child.try_wait(), Ok(None)) {
                    let _ = child.kill();
                    let _ = child.wait();
                }
            }
        }
    }

    fn spawn(&self, target: &ResolvedTarget) -> Result<Option<Child>> {
        match target {
            ResolvedTarget::Store { app_id, .. } => {
                // The protocol handler also starts the store client when
                // it is not yet running.
                let uri = format!("steam://rungameid/{app_id}");
                info!("launching via store protocol: {}", uri);
                open_uri(&uri)?;
                Ok(None)
            }
            ResolvedTarget::Direct { exe } => {
                info!("launching directly: {}", exe.display());
                let mut command = Command::new(exe);
                command
                    .stdin(Stdio::null())
                    .stdout(Stdio::null())
                    .stderr(Stdio::null());
                if let Some(dir) = exe.parent().filter(|d| !d.as_os_str().is_empty()) {
                    command.current_dir(dir);
                }
                match command.spawn() {
                    Ok(child) => Ok(Some(child)),
                    Err(e) => {
                        warn!(
                            "spawn with working directory failed, retrying without: {}",
                            e
                        );
                        Command::new(exe)
                            .stdin(Stdio::null())
                            .stdout(Stdio::null())
                            .stderr(Stdio::null())
                            .spawn()
                            .map(Some)
                            .map_err(|e| {
                                Error::SpawnFailed(format!("{}: {e}", exe.display()))
                            })
                    }
                }
            }
        }
    }

    async fn detect_process(
        &self,
        name: &str,
        cap_secs: u64,
        cancel: &CancellationToken,
    ) -> Detection {
        let deadline = Instant::now() + Duration::from_secs(cap_secs);
        let interval = Duration::from_secs(self.config.detection.poll_interval_secs.max(1));
        loop {
            if let Some(found) = self.procs.find_exact(name) {
                return Detection::Found(found);
            }
            if Instant::now() >= deadline {
                return Detection::TimedOut;
            }
            if sleep_unless_cancelled(interval, cancel).await {
                return Detection::Cancelled;
            }
        }
    }

    /// Wait for the window to be visible, then for its input queue to go
    /// idle. Readiness failure is non-fatal; the engine proceeds with
    /// whatever visibility was achieved.
    async fn wait_window(
        &self,
        pid: u32,
        visible_timeout: Duration,
        ready_timeout: Duration,
        cancel: &CancellationToken,
    ) -> WindowWait {
        let interval = Duration::from_secs(self.config.window.probe_interval_secs.max(1));
        let windows: &dyn WindowDriver = &*self.windows;

        let visible = poll_until(visible_timeout, interval, cancel, || {
            let w = windows;
            async move { w.is_visible(pid) }
        })
        .await;
        match visible {
            WaitOutcome::Cancelled => return WindowWait::Cancelled,
            WaitOutcome::TimedOut => {
                warn!(
                    "window for pid {} not visible within {}s",
                    pid,
                    visible_timeout.as_secs()
                );
                return WindowWait::Done { ready: false };
            }
            WaitOutcome::Ready => debug!("window visible for pid {}", pid),
        }

        let ready = poll_until(ready_timeout, interval, cancel, || {
            let w = windows;
            async move { w.is_ready(pid) }
        })
        .await;
        match ready {
            WaitOutcome::Cancelled => WindowWait::Cancelled,
            WaitOutcome::TimedOut => {
                warn!(
                    "window for pid {} visible but not ready within {}s, continuing",
                    pid,
                    ready_timeout.as_secs()
                );
                WindowWait::Done { ready: false }
            }
            WaitOutcome::Ready => {
                debug!("window ready for pid {}", pid);
                WindowWait::Done { ready: true }
            }
        }
    }

    async fn confirm_foreground(
        &self,
        first: ProcessInfo,
        name: &str,
        cancel: &CancellationToken,
    ) -> Focus {
        let w = &self.config.window;
        let mut process = first;

        let mut window_ready = match self
            .wait_window(
                process.pid,
                Duration::from_secs(w.visible_timeout_secs),
                Duration::from_secs(w.ready_timeout_secs),
                cancel,
            )
            .await
        {
            WindowWait::Cancelled => return Focus::Cancelled,
            WindowWait::Done { ready, .. } => ready,
        };

        let mut confirmed = matches!(self.windows.set_focus(process.pid), FocusResult::Confirmed);

        if !confirmed {
            for attempt in 1..=w.focus_retries {
                warn!(
                    "foreground unconfirmed, retry {}/{} in {}s",
                    attempt, w.focus_retries, w.retry_interval_secs
                );
                if sleep_unless_cancelled(Duration::from_secs(w.retry_interval_secs), cancel).await
                {
                    return Focus::Cancelled;
                }

                // The process identity may change across a launcher hand-off
                match self.procs.find_exact(name) {
                    Some(found) => {
                        if found.pid != process.pid {
                            info!("process '{}' re-detected with new pid {}", name, found.pid);
                        }
                        process = found;
                        match self
                            .wait_window(
                                process.pid,
                                Duration::from_secs(w.retry_visible_timeout_secs),
                                Duration::from_secs(w.retry_ready_timeout_secs),
                                cancel,
                            )
                            .await
                        {
                            WindowWait::Cancelled => return Focus::Cancelled,
                            WindowWait::Done { ready, .. } => window_ready = window_ready || ready,
                        }
                        if matches!(
                            self.windows.set_focus(process.pid),
                            FocusResult::Confirmed
                        ) {
                            info!("retry {}: window brought to foreground", attempt);
                            confirmed = true;
                            break;
                        }
                    }
                    None => warn!("retry {}: process '{}' no longer found", attempt, name),
                }
            }
        }

        Focus::Done {
            process,
            confirmed,
            window_ready,
        }
    }
}

fn expected_process_name(req: &LaunchRequest, target: &ResolvedTarget) -> String {
    if !req.process_id.is_empty() {
        return req.process_id.clone();
    }
    let exe = match target {
        ResolvedTarget::Store { exe, .. } => exe,
        ResolvedTarget::Direct { exe } => exe,
    };
    exe.file_stem()
        .map(|s| s.to_string_lossy().to_string())
        .unwrap_or_else(|| exe.to_string_lossy().to_string())
}

fn open_uri(uri: &str) -> Result<()> {
    #[cfg(windows)]
    let mut command = {
        let mut c = Command::new("cmd");
        c.args(["/C", "start", "", uri]);
        c
    };
    #[cfg(target_os = "macos")]
    let mut command = {
        let mut c = Command::new("open");
        c.arg(uri);
        c
    };
    #[cfg(all(unix, not(target_os = "macos")))]
    let mut command = {
        let mut c = Command::new("xdg-open");
        c.arg(uri);
        c
    };

    command
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()
        .map(|_| ())
        .map_err(|e| Error::SpawnFailed(format!("store protocol handler: {e}")))
}
