//! Controller scenarios driven through a scripted executor and stub agent

use async_trait::async_trait;
use gamerig_common::{
    ApiStatus, AutomationJob, CampaignSpec, CheckProcessResponse, Error, GameEntry, JobState,
    LaunchMethod, LaunchOutcome, LaunchRequest, LaunchResponse, Result,
};
use gamerig_controller::{
    AgentApi, ExecutionOutcome, RunContext, RunExecutor, RunPolicy, SutController,
};
use parking_lot::Mutex;
use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

// ============================================================================
// Test doubles
// ============================================================================

struct StubAgent {
    outcome: Mutex<LaunchOutcome>,
    fail_transport: Mutex<bool>,
    launches: Mutex<Vec<LaunchRequest>>,
    kills: Mutex<Vec<String>>,
    cancels: Mutex<u32>,
}

impl StubAgent {
    fn new() -> Arc<Self> {
        Arc::new(Self {
            outcome: Mutex::new(LaunchOutcome::Success),
            fail_transport: Mutex::new(false),
            launches: Mutex::new(Vec::new()),
            kills: Mutex::new(Vec::new()),
            cancels: Mutex::new(0),
        })
    }
}

#[async_trait]
impl AgentApi for StubAgent {
    async fn launch(&self, req: &LaunchRequest) -> Result<LaunchResponse> {
        if *self.fail_transport.lock() {
            return Err(Error::Transport("connection refused".to_string()));
        }
        self.launches.lock().push(req.clone());
        let outcome = *self.outcome.lock();
        Ok(match outcome {
            LaunchOutcome::Success => LaunchResponse {
                status: LaunchOutcome::Success,
                launch_method: LaunchMethod::DirectExe,
                resolved_path: None,
                subprocess_pid: Some(41),
                game_process_pid: Some(42),
                game_process_name: Some(req.process_id.clone()),
                foreground_confirmed: Some(true),
                window_ready: Some(true),
                warning: None,
                error: None,
            },
            LaunchOutcome::Warning => LaunchResponse {
                status: LaunchOutcome::Warning,
                launch_method: LaunchMethod::DirectExe,
                resolved_path: None,
                subprocess_pid: Some(41),
                game_process_pid: Some(42),
                game_process_name: Some(req.process_id.clone()),
                foreground_confirmed: Some(false),
                window_ready: Some(false),
                warning: Some("window not confirmed in foreground".to_string()),
                error: None,
            },
            LaunchOutcome::Cancelled => LaunchResponse::cancelled(LaunchMethod::DirectExe),
            LaunchOutcome::Error => {
                LaunchResponse::error(LaunchMethod::DirectExe, "executable not found")
            }
        })
    }

    async fn cancel_launch(&self) -> Result<()> {
        *self.cancels.lock() += 1;
        Ok(())
    }

    async fn kill_process(&self, process_name: &str) -> Result<bool> {
        self.kills.lock().push(process_name.to_string());
        Ok(true)
    }

    async fn check_process(&self, _process_name: &str) -> Result<CheckProcessResponse> {
        Ok(CheckProcessResponse {
            status: ApiStatus::Success,
            running: false,
            pid: None,
            name: None,
        })
    }
}

struct ScriptedExecutor {
    /// "<game>:<run>" keys that should fail, with the failure reason
    failures: HashMap<String, String>,
    /// Simulated run duration; observed through the stop token
    block: Option<Duration>,
    invocations: Mutex<Vec<String>>,
}

impl ScriptedExecutor {
    fn passing() -> Arc<Self> {
        Arc::new(Self {
            failures: HashMap::new(),
            block: None,
            invocations: Mutex::new(Vec::new()),
        })
    }

    fn failing_on(keys: &[(&str, u32)]) -> Arc<Self> {
        Arc::new(Self {
            failures: keys
                .iter()
                .map(|(game, run)| (format!("{game}:{run}"), "automation step failed".to_string()))
                .collect(),
            block: None,
            invocations: Mutex::new(Vec::new()),
        })
    }

    fn blocking(duration: Duration) -> Arc<Self> {
        Arc::new(Self {
            failures: HashMap::new(),
            block: Some(duration),
            invocations: Mutex::new(Vec::new()),
        })
    }

    fn invocations(&self) -> Vec<String> {
        self.invocations.lock().clone()
    }
}

#[async_trait]
impl RunExecutor for ScriptedExecutor {
    async fn execute(&self, ctx: RunContext) -> Result<ExecutionOutcome> {
        let key = format!("{}:{}", ctx.game.game_name, ctx.run_number);
        self.invocations.lock().push(key.clone());

        if let Some(duration) = self.block {
            if gamerig_common::wait::sleep_unless_cancelled(duration, &ctx.stop).await {
                return Ok(ExecutionOutcome::Stopped);
            }
        }

        if let Some(reason) = self.failures.get(&key) {
            return Ok(ExecutionOutcome::Failed {
                reason: reason.clone(),
            });
        }
        Ok(ExecutionOutcome::Completed)
    }
}

// ============================================================================
// Helpers
// ============================================================================

fn game(name: &str, runs: u32) -> GameEntry {
    GameEntry {
        game_name: name.to_string(),
        config_path: String::new(),
        game_path: format!("C:/games/{name}/{name}.exe"),
        process_id: format!("{name}.exe"),
        startup_wait_secs: 0,
        run_count: runs,
        run_delay_secs: 0,
    }
}

fn single(entry: GameEntry) -> AutomationJob {
    AutomationJob::SingleGame { entry }
}

fn campaign(games: Vec<GameEntry>, continue_on_failure: bool) -> AutomationJob {
    AutomationJob::Campaign {
        spec: CampaignSpec {
            name: "Test".to_string(),
            games,
            game_delay_secs: 0,
            continue_on_failure,
        },
    }
}

fn controller(
    agent: Arc<StubAgent>,
    executor: Arc<ScriptedExecutor>,
    policy: RunPolicy,
) -> SutController {
    SutController::new("sut-1", agent, executor, policy)
}

// ============================================================================
// Scenarios
// ============================================================================

#[tokio::test]
async fn single_game_two_runs_completes_sequentially() {
    let agent = StubAgent::new();
    let executor = ScriptedExecutor::passing();
    let sut = controller(agent.clone(), executor.clone(), RunPolicy::default());

    assert!(sut.start(single(game("Game1", 2))));
    assert_eq!(sut.wait().await, JobState::Completed);

    assert_eq!(executor.invocations(), vec!["Game1:1", "Game1:2"]);
    assert_eq!(agent.launches.lock().len(), 2);

    let progress = sut.progress();
    assert_eq!(progress.current_run, 2);
    assert_eq!(progress.total_runs, 2);

    // A completed run never triggers process termination
    assert!(agent.kills.lock().is_empty());
}

#[tokio::test]
async fn start_while_running_is_rejected_and_leaves_job_untouched() {
    let agent = StubAgent::new();
    let executor = ScriptedExecutor::blocking(Duration::from_secs(30));
    let sut = controller(agent.clone(), executor.clone(), RunPolicy::default());

    assert!(sut.start(single(game("Game1", 1))));
    tokio::time::sleep(Duration::from_millis(100)).await;

    assert!(!sut.start(single(game("Game2", 5))));
    assert_eq!(sut.state(), JobState::Running);
    assert_eq!(sut.progress().total_runs, 1);
    assert_eq!(executor.invocations(), vec!["Game1:1"]);

    sut.stop();
    assert_eq!(sut.wait().await, JobState::Stopped);
}

#[tokio::test]
async fn empty_jobs_are_rejected_with_error_state() {
    let agent = StubAgent::new();
    let executor = ScriptedExecutor::passing();
    let sut = controller(agent, executor, RunPolicy::default());

    assert!(!sut.start(campaign(vec![], true)));
    assert_eq!(sut.state(), JobState::Error);

    let mut no_target = game("Game1", 1);
    no_target.game_path = String::new();
    assert!(!sut.start(single(no_target)));
    assert_eq!(sut.state(), JobState::Error);
}

#[tokio::test]
async fn continue_on_failure_visits_every_game_in_order() {
    let agent = StubAgent::new();
    let executor = ScriptedExecutor::failing_on(&[("Game2", 1)]);
    let sut = controller(agent.clone(), executor.clone(), RunPolicy::default());

    let job = campaign(vec![game("Game1", 1), game("Game2", 1), game("Game3", 1)], true);
    assert!(sut.start(job));
    assert_eq!(sut.wait().await, JobState::Completed);

    assert_eq!(
        executor.invocations(),
        vec!["Game1:1", "Game2:1", "Game3:1"]
    );
    assert_eq!(sut.progress().failed_games, vec!["Game2 (Run 1)"]);

    // The failed run killed its tracked process; the completed ones did not
    assert_eq!(agent.kills.lock().clone(), vec!["Game2.exe"]);
}

#[tokio::test]
async fn failure_aborts_the_campaign_when_continue_is_off() {
    let agent = StubAgent::new();
    let executor = ScriptedExecutor::failing_on(&[("Game2", 1)]);
    let sut = controller(agent.clone(), executor.clone(), RunPolicy::default());

    let job = campaign(vec![game("Game1", 1), game("Game2", 1), game("Game3", 1)], false);
    assert!(sut.start(job));
    assert_eq!(sut.wait().await, JobState::Failed);

    assert_eq!(executor.invocations(), vec!["Game1:1", "Game2:1"]);
    assert_eq!(sut.progress().failed_games, vec!["Game2 (Run 1)"]);
    assert_eq!(agent.kills.lock().clone(), vec!["Game2.exe"]);
}

#[tokio::test]
async fn failed_list_length_matches_observed_run_failures() {
    let agent = StubAgent::new();
    let executor = ScriptedExecutor::failing_on(&[("Game1", 1), ("Game3", 1)]);
    let sut = controller(agent, executor.clone(), RunPolicy::default());

    let job = campaign(vec![game("Game1", 1), game("Game2", 1), game("Game3", 1)], true);
    assert!(sut.start(job));
    assert_eq!(sut.wait().await, JobState::Completed);

    assert_eq!(
        sut.progress().failed_games,
        vec!["Game1 (Run 1)", "Game3 (Run 1)"]
    );
}

#[tokio::test]
async fn stop_during_delay_is_observed_within_a_second() {
    let agent = StubAgent::new();
    let executor = ScriptedExecutor::passing();
    let sut = controller(agent, executor.clone(), RunPolicy::default());

    let mut entry = game("Game1", 2);
    entry.run_delay_secs = 300;
    assert!(sut.start(single(entry)));

    // Let run 1 finish and the inter-run delay begin
    tokio::time::sleep(Duration::from_millis(200)).await;
    let stopped_at = Instant::now();
    sut.stop();

    assert_eq!(sut.wait().await, JobState::Stopped);
    assert!(stopped_at.elapsed() < Duration::from_secs(2));
    assert_eq!(executor.invocations(), vec!["Game1:1"]);
}

#[tokio::test]
async fn stop_mid_run_kills_the_tracked_process() {
    let agent = StubAgent::new();
    let executor = ScriptedExecutor::blocking(Duration::from_secs(30));
    let sut = controller(agent.clone(), executor.clone(), RunPolicy::default());

    assert!(sut.start(single(game("Game1", 1))));
    tokio::time::sleep(Duration::from_millis(100)).await;
    sut.stop();

    assert_eq!(sut.wait().await, JobState::Stopped);
    assert_eq!(agent.kills.lock().clone(), vec!["Game1.exe"]);
}

#[tokio::test]
async fn stop_is_idempotent() {
    let agent = StubAgent::new();
    let executor = ScriptedExecutor::blocking(Duration::from_secs(30));
    let sut = controller(agent, executor, RunPolicy::default());

    assert!(sut.start(single(game("Game1", 1))));
    tokio::time::sleep(Duration::from_millis(100)).await;
    sut.stop();
    sut.stop();
    assert_eq!(sut.wait().await, JobState::Stopped);
    sut.stop();
    assert_eq!(sut.state(), JobState::Stopped);
}

#[tokio::test]
async fn launch_warning_fails_the_run_by_default() {
    let agent = StubAgent::new();
    *agent.outcome.lock() = LaunchOutcome::Warning;
    let executor = ScriptedExecutor::passing();
    let sut = controller(agent.clone(), executor.clone(), RunPolicy::default());

    assert!(sut.start(single(game("Game1", 1))));
    assert_eq!(sut.wait().await, JobState::Failed);

    // The run never reached the executor, and cleanup was attempted
    assert!(executor.invocations().is_empty());
    assert_eq!(agent.kills.lock().clone(), vec!["Game1.exe"]);
}

#[tokio::test]
async fn launch_warning_can_proceed_under_policy() {
    let agent = StubAgent::new();
    *agent.outcome.lock() = LaunchOutcome::Warning;
    let executor = ScriptedExecutor::passing();
    let sut = controller(
        agent,
        executor.clone(),
        RunPolicy {
            proceed_on_unconfirmed_foreground: true,
        },
    );

    assert!(sut.start(single(game("Game1", 1))));
    assert_eq!(sut.wait().await, JobState::Completed);
    assert_eq!(executor.invocations(), vec!["Game1:1"]);
}

#[tokio::test]
async fn cancelled_launch_maps_to_stopped() {
    let agent = StubAgent::new();
    *agent.outcome.lock() = LaunchOutcome::Cancelled;
    let executor = ScriptedExecutor::passing();
    let sut = controller(agent, executor.clone(), RunPolicy::default());

    assert!(sut.start(single(game("Game1", 1))));
    assert_eq!(sut.wait().await, JobState::Stopped);
    assert!(executor.invocations().is_empty());
}

#[tokio::test]
async fn transport_errors_fail_the_job_without_retry() {
    let agent = StubAgent::new();
    *agent.fail_transport.lock() = true;
    let executor = ScriptedExecutor::passing();
    let sut = controller(agent.clone(), executor.clone(), RunPolicy::default());

    assert!(sut.start(single(game("Game1", 3))));
    assert_eq!(sut.wait().await, JobState::Failed);

    // No transport-level retries: one failed request ends the job
    assert!(agent.launches.lock().is_empty());
    assert!(executor.invocations().is_empty());
}

#[tokio::test]
async fn terminal_state_resets_to_running_on_next_start() {
    let agent = StubAgent::new();
    let executor = ScriptedExecutor::passing();
    let sut = controller(agent, executor.clone(), RunPolicy::default());

    assert!(sut.start(single(game("Game1", 1))));
    assert_eq!(sut.wait().await, JobState::Completed);

    assert!(sut.start(single(game("Game1", 1))));
    assert_eq!(sut.wait().await, JobState::Completed);
    assert_eq!(executor.invocations(), vec!["Game1:1", "Game1:1"]);
}
