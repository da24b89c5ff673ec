//! Job sequencing
//!
//! The worker loops for single-game batches and multi-game campaigns:
//! stop checks before every game and run, launch-then-delegate per run,
//! failure bookkeeping under the continue-on-failure policy, and delays
//! interruptible at one-second granularity.

use crate::controller::ControllerInner;
use crate::executor::{ExecutionOutcome, RunContext};
use gamerig_common::wait::sleep_unless_cancelled;
use gamerig_common::{
    AutomationJob, CampaignSpec, GameEntry, JobState, LaunchOutcome, LaunchRequest,
};
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

enum RunResult {
    Completed,
    Stopped,
    Failed(String),
}

/// Worker entry point. Runs the whole job and writes the terminal state.
pub(crate) async fn run_job(
    inner: Arc<ControllerInner>,
    job: AutomationJob,
    stop: CancellationToken,
) {
    info!("starting automation for {}", inner.name);

    let final_state = match job {
        AutomationJob::SingleGame { entry } => run_single(&inner, &entry, &stop).await,
        AutomationJob::Campaign { spec } => run_campaign(&inner, &spec, &stop).await,
    };

    match final_state {
        JobState::Completed => {
            let failed = inner.progress.read().failed_games.clone();
            if failed.is_empty() {
                info!("automation completed");
            } else {
                // Partial success: the failed list is the audit trail
                warn!(
                    "campaign completed with {} failed run(s): {}",
                    failed.len(),
                    failed.join(", ")
                );
            }
        }
        JobState::Stopped => info!("automation stopped"),
        JobState::Failed => error!("automation failed"),
        _ => {}
    }

    inner.set_state(final_state);
}

async fn run_single(
    inner: &Arc<ControllerInner>,
    entry: &GameEntry,
    stop: &CancellationToken,
) -> JobState {
    info!(
        "mode: single game, {} run(s) of {}",
        entry.run_count, entry.game_name
    );

    for run in 1..=entry.run_count {
        if stop.is_cancelled() {
            info!("stopped before run {}", run);
            return JobState::Stopped;
        }
        inner.update_progress(|p| {
            p.current_run = run;
            p.current_game = 1;
            p.current_game_name = entry.game_name.clone();
        });
        info!("starting run {}/{}", run, entry.run_count);

        match execute_run(inner, entry, run, stop).await {
            RunResult::Completed => info!("run {}/{} completed", run, entry.run_count),
            RunResult::Stopped => {
                kill_tracked(inner, entry).await;
                return JobState::Stopped;
            }
            RunResult::Failed(reason) => {
                error!("run {}/{} failed: {}", run, entry.run_count, reason);
                kill_tracked(inner, entry).await;
                return JobState::Failed;
            }
        }

        // Skipped after the last run
        if run < entry.run_count && entry.run_delay_secs > 0 {
            info!("waiting {}s before next run", entry.run_delay_secs);
            if delay(entry.run_delay_secs, stop).await {
                info!("stopped during run delay");
                return JobState::Stopped;
            }
        }
    }

    JobState::Completed
}

async fn run_campaign(
    inner: &Arc<ControllerInner>,
    spec: &CampaignSpec,
    stop: &CancellationToken,
) -> JobState {
    info!(
        "mode: campaign '{}', {} game(s), continue_on_failure={}",
        spec.name,
        spec.games.len(),
        spec.continue_on_failure
    );
    inner.update_progress(|p| p.failed_games.clear());

    let total_games = spec.games.len();
    for (index, entry) in spec.games.iter().enumerate() {
        if stop.is_cancelled() {
            info!("campaign stopped before game {}", index + 1);
            return JobState::Stopped;
        }
        inner.update_progress(|p| {
            p.current_game = (index + 1) as u32;
            p.current_game_name = entry.game_name.clone();
        });
        info!(
            "game {}/{}: {} ({} run(s), delay {}s)",
            index + 1,
            total_games,
            entry.game_name,
            entry.run_count,
            entry.run_delay_secs
        );

        'runs: for run in 1..=entry.run_count {
            if stop.is_cancelled() {
                info!("campaign stopped during {}", entry.game_name);
                return JobState::Stopped;
            }
            inner.update_progress(|p| p.current_run += 1);
            info!("run {}/{} of {}", run, entry.run_count, entry.game_name);

            match execute_run(inner, entry, run, stop).await {
                RunResult::Completed => {}
                RunResult::Stopped => {
                    kill_tracked(inner, entry).await;
                    return JobState::Stopped;
                }
                RunResult::Failed(reason) => {
                    error!("run {} of {} failed: {}", run, entry.game_name, reason);
                    inner.update_progress(|p| {
                        p.failed_games
                            .push(format!("{} (Run {})", entry.game_name, run))
                    });
                    kill_tracked(inner, entry).await;

                    if spec.continue_on_failure {
                        warn!(
                            "skipping remaining runs of {} and continuing with campaign",
                            entry.game_name
                        );
                        break 'runs;
                    }
                    return JobState::Failed;
                }
            }

            if run < entry.run_count && entry.run_delay_secs > 0 {
                info!("waiting {}s before next run", entry.run_delay_secs);
                if delay(entry.run_delay_secs, stop).await {
                    info!("campaign stopped during run delay");
                    return JobState::Stopped;
                }
            }
        }

        // Skipped after the last game
        if index + 1 < total_games && spec.game_delay_secs > 0 {
            info!("waiting {}s before next game", spec.game_delay_secs);
            if delay(spec.game_delay_secs, stop).await {
                info!("campaign stopped during game delay");
                return JobState::Stopped;
            }
        }
    }

    // Completion with partial failures still reports Completed; the
    // failed-games list distinguishes it
    JobState::Completed
}

/// One run: launch via the agent, then hand off to the step executor
async fn execute_run(
    inner: &Arc<ControllerInner>,
    entry: &GameEntry,
    run_number: u32,
    stop: &CancellationToken,
) -> RunResult {
    if entry.game_path.is_empty() {
        info!(
            "no launch target for {}, assuming the game is already running",
            entry.game_name
        );
    } else {
        info!("launching {} from {}", entry.game_name, entry.game_path);
        let req = LaunchRequest {
            path: entry.game_path.clone(),
            process_id: entry.process_id.clone(),
            startup_wait: entry.startup_wait_secs,
        };
        match inner.client.launch(&req).await {
            // Transport failures are not retried here; retries live in the
            // agent's own launch phases
            Err(e) => {
                error!("launch request failed: {}", e);
                return RunResult::Failed(e.to_string());
            }
            Ok(resp) => match resp.status {
                LaunchOutcome::Success => {
                    info!(
                        "game launched: {} (pid {}), method {}, foreground confirmed",
                        resp.game_process_name.as_deref().unwrap_or("unknown"),
                        resp.game_process_pid
                            .map(|p| p.to_string())
                            .unwrap_or_else(|| "?".to_string()),
                        resp.launch_method
                    );
                }
                LaunchOutcome::Cancelled => {
                    info!("launch cancelled");
                    return RunResult::Stopped;
                }
                LaunchOutcome::Warning => {
                    let message = resp
                        .warning
                        .unwrap_or_else(|| "unknown launch warning".to_string());
                    if inner.policy.proceed_on_unconfirmed_foreground {
                        warn!("proceeding despite launch warning: {}", message);
                    } else {
                        error!("game launch failed: {}", message);
                        return RunResult::Failed(message);
                    }
                }
                LaunchOutcome::Error => {
                    let message = resp
                        .error
                        .unwrap_or_else(|| "unknown launch error".to_string());
                    error!("game launch failed: {}", message);
                    return RunResult::Failed(message);
                }
            },
        }
    }

    if stop.is_cancelled() {
        return RunResult::Stopped;
    }

    match inner
        .executor
        .execute(RunContext {
            sut_name: inner.name.clone(),
            game: entry.clone(),
            run_number,
            stop: stop.clone(),
        })
        .await
    {
        Ok(ExecutionOutcome::Completed) => RunResult::Completed,
        Ok(ExecutionOutcome::Stopped) => RunResult::Stopped,
        Ok(ExecutionOutcome::Failed { reason }) => RunResult::Failed(reason),
        Err(e) => RunResult::Failed(e.to_string()),
    }
}

/// Kill the tracked remote process after a failed or stopped run.
/// Completed runs deliberately leave the game running for inspection.
async fn kill_tracked(inner: &Arc<ControllerInner>, entry: &GameEntry) {
    let Some(name) = tracked_process_name(entry) else {
        debug!("no process name to kill for {}", entry.game_name);
        return;
    };
    info!("cleaning up: killing game process '{}'", name);
    match inner.client.kill_process(&name).await {
        Ok(true) => info!("killed game process '{}'", name),
        Ok(false) => debug!("process '{}' not found (already exited)", name),
        Err(e) => warn!("error killing process '{}': {}", name, e),
    }
}

/// The process name cleanup should target: the configured expected name,
/// else the executable file stem. Bare store ids carry no usable name.
fn tracked_process_name(entry: &GameEntry) -> Option<String> {
    if !entry.process_id.is_empty() {
        return Some(entry.process_id.clone());
    }
    let path = Path::new(&entry.game_path);
    if path.extension().is_some() {
        path.file_stem().map(|s| s.to_string_lossy().to_string())
    } else {
        None
    }
}

/// Interruptible delay at one-second granularity, so a stop request lands
/// within a second even mid-delay
async fn delay(secs: u64, stop: &CancellationToken) -> bool {
    for _ in 0..secs {
        if stop.is_cancelled() {
            return true;
        }
        if sleep_unless_cancelled(Duration::from_secs(1), stop).await {
            return true;
        }
    }
    stop.is_cancelled()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn entry(game_path: &str, process_id: &str) -> GameEntry {
        GameEntry {
            game_name: "Test".to_string(),
            config_path: String::new(),
            game_path: game_path.to_string(),
            process_id: process_id.to_string(),
            startup_wait_secs: 0,
            run_count: 1,
            run_delay_secs: 0,
        }
    }

    #[test]
    fn tracked_name_prefers_configured_process_id() {
        let e = entry("C:/games/RDR2/PlayRDR2.exe", "RDR2.exe");
        assert_eq!(tracked_process_name(&e).as_deref(), Some("RDR2.exe"));
    }

    #[test]
    fn tracked_name_falls_back_to_exe_stem() {
        let e = entry("C:/games/GTAV/GTAV.exe", "");
        assert_eq!(tracked_process_name(&e).as_deref(), Some("GTAV"));
    }

    #[test]
    fn bare_store_ids_have_no_tracked_name() {
        let e = entry("1174180", "");
        assert_eq!(tracked_process_name(&e), None);
    }

    #[tokio::test]
    async fn delay_observes_stop_within_a_second() {
        let stop = CancellationToken::new();
        stop.cancel();
        let started = std::time::Instant::now();
        assert!(delay(300, &stop).await);
        assert!(started.elapsed() < Duration::from_secs(1));
    }
}
