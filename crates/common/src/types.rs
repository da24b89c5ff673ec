//! Core types for GameRig
//!
//! Wire types for the controller/agent launch protocol and the domain
//! types the controller persists and tracks.

use serde::{Deserialize, Serialize};

fn default_run_count() -> u32 {
    3
}

fn default_run_delay() -> u64 {
    30
}

fn default_game_delay() -> u64 {
    120
}

fn default_continue_on_failure() -> bool {
    true
}

fn default_campaign_name() -> String {
    "Default".to_string()
}

fn default_agent_port() -> u16 {
    8080
}

// ============================================================================
// Launch protocol
// ============================================================================

/// Outcome tag of a launch attempt
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchOutcome {
    Success,
    Warning,
    Error,
    Cancelled,
}

impl std::fmt::Display for LaunchOutcome {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchOutcome::Success => write!(f, "success"),
            LaunchOutcome::Warning => write!(f, "warning"),
            LaunchOutcome::Error => write!(f, "error"),
            LaunchOutcome::Cancelled => write!(f, "cancelled"),
        }
    }
}

/// How the target was started on the SUT
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LaunchMethod {
    /// Launched through the store client's protocol URI (no subprocess handle)
    StoreProtocol,
    /// Launched by direct process creation
    DirectExe,
}

impl std::fmt::Display for LaunchMethod {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            LaunchMethod::StoreProtocol => write!(f, "store_protocol"),
            LaunchMethod::DirectExe => write!(f, "direct_exe"),
        }
    }
}

/// Request body for `POST /launch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchRequest {
    /// Executable path, numeric store id, or store-protocol URI
    pub path: String,
    /// Expected process name to wait for after launch. Empty means derive
    /// it from the resolved executable name.
    #[serde(default)]
    pub process_id: String,
    /// Upper bound in seconds for the process-detection phase.
    /// Zero means use the agent's configured default.
    #[serde(default)]
    pub startup_wait: u64,
}

/// Response body for `POST /launch`. Immutable once returned.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LaunchResponse {
    pub status: LaunchOutcome,
    pub launch_method: LaunchMethod,
    /// Path the store id resolved to, when resolution happened
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resolved_path: Option<String>,
    /// Pid of the directly spawned subprocess, when one exists
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub subprocess_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_process_pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub game_process_name: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub foreground_confirmed: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub window_ready: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub warning: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl LaunchResponse {
    /// Terminal error response
    pub fn error(method: LaunchMethod, message: impl Into<String>) -> Self {
        Self {
            status: LaunchOutcome::Error,
            launch_method: method,
            resolved_path: None,
            subprocess_pid: None,
            game_process_pid: None,
            game_process_name: None,
            foreground_confirmed: None,
            window_ready: None,
            warning: None,
            error: Some(message.into()),
        }
    }

    /// Cooperative-abort response
    pub fn cancelled(method: LaunchMethod) -> Self {
        Self {
            status: LaunchOutcome::Cancelled,
            launch_method: method,
            resolved_path: None,
            subprocess_pid: None,
            game_process_pid: None,
            game_process_name: None,
            foreground_confirmed: None,
            window_ready: None,
            warning: None,
            error: None,
        }
    }
}

// ============================================================================
// Auxiliary agent endpoints
// ============================================================================

/// Status tag for the simple agent endpoints
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ApiStatus {
    Success,
    Error,
}

/// Request body for `POST /kill_process` and `POST /check_process`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProcessQuery {
    pub process_name: String,
}

/// Response body for `POST /kill_process`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KillProcessResponse {
    pub status: ApiStatus,
    pub killed: bool,
    pub process_name: String,
}

/// Response body for `POST /check_process`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CheckProcessResponse {
    pub status: ApiStatus,
    pub running: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub pid: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub name: Option<String>,
}

/// Response body for `POST /cancel_launch`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CancelResponse {
    pub status: ApiStatus,
    pub message: String,
}

/// State of the agent's tracked game process
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrackedProcessState {
    Running,
    NotFound,
    None,
}

/// Response body for `GET /status`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StatusResponse {
    pub status: ApiStatus,
    pub version: String,
    pub capabilities: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tracked_process: Option<String>,
}

/// Response body for `GET /health`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealthResponse {
    pub status: ApiStatus,
    pub version: String,
    pub game_process: TrackedProcessState,
}

// ============================================================================
// Jobs and campaigns
// ============================================================================

/// A single game in a campaign
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GameEntry {
    /// Display name (e.g. "Cyberpunk 2077")
    pub game_name: String,
    /// Workflow-config reference, opaque to the controller core
    #[serde(default)]
    pub config_path: String,
    /// Executable path or numeric store id on the SUT
    pub game_path: String,
    /// Expected process name for detection and cleanup
    #[serde(default)]
    pub process_id: String,
    /// Detection bound passed through to the agent; zero uses its default
    #[serde(default)]
    pub startup_wait_secs: u64,
    /// How many times to run this game
    #[serde(default = "default_run_count")]
    pub run_count: u32,
    /// Seconds between runs of this game
    #[serde(default = "default_run_delay")]
    pub run_delay_secs: u64,
}

/// Ordered list of games plus campaign-level policy
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CampaignSpec {
    #[serde(default = "default_campaign_name")]
    pub name: String,
    #[serde(default)]
    pub games: Vec<GameEntry>,
    /// Seconds to wait between games
    #[serde(default = "default_game_delay")]
    pub game_delay_secs: u64,
    /// Keep advancing past a failed game instead of aborting the campaign
    #[serde(default = "default_continue_on_failure")]
    pub continue_on_failure: bool,
}

impl Default for CampaignSpec {
    fn default() -> Self {
        Self {
            name: default_campaign_name(),
            games: Vec::new(),
            game_delay_secs: default_game_delay(),
            continue_on_failure: default_continue_on_failure(),
        }
    }
}

/// The unit of work a controller executes. The variant is selected once at
/// job start; workers never re-branch on mode per call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum AutomationJob {
    SingleGame { entry: GameEntry },
    Campaign { spec: CampaignSpec },
}

impl AutomationJob {
    /// Structurally empty jobs are rejected at start
    pub fn is_empty(&self) -> bool {
        match self {
            AutomationJob::SingleGame { entry } => entry.game_path.is_empty(),
            AutomationJob::Campaign { spec } => spec.games.is_empty(),
        }
    }

    /// Total run count: the sum of per-game run counts for campaigns
    pub fn total_runs(&self) -> u32 {
        match self {
            AutomationJob::SingleGame { entry } => entry.run_count,
            AutomationJob::Campaign { spec } => spec.games.iter().map(|g| g.run_count).sum(),
        }
    }

    pub fn total_games(&self) -> u32 {
        match self {
            AutomationJob::SingleGame { .. } => 1,
            AutomationJob::Campaign { spec } => spec.games.len() as u32,
        }
    }
}

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum JobState {
    Idle,
    Running,
    Completed,
    Failed,
    Stopped,
    Error,
}

impl Default for JobState {
    fn default() -> Self {
        Self::Idle
    }
}

impl JobState {
    /// Terminal states stay put until a new job resets to Running
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            JobState::Completed | JobState::Failed | JobState::Stopped | JobState::Error
        )
    }
}

impl std::fmt::Display for JobState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            JobState::Idle => write!(f, "idle"),
            JobState::Running => write!(f, "running"),
            JobState::Completed => write!(f, "completed"),
            JobState::Failed => write!(f, "failed"),
            JobState::Stopped => write!(f, "stopped"),
            JobState::Error => write!(f, "error"),
        }
    }
}

/// Report-only progress snapshot. Written by the worker, read by observers;
/// momentarily stale values are fine.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct RunProgress {
    pub current_run: u32,
    pub total_runs: u32,
    /// 1-based index of the current game, zero before any game starts
    pub current_game: u32,
    pub total_games: u32,
    #[serde(default)]
    pub current_game_name: String,
    /// Audit trail of `"<game> (Run <n>)"` entries
    #[serde(default)]
    pub failed_games: Vec<String>,
}

// ============================================================================
// Persisted fleet state
// ============================================================================

/// One SUT entry in the persisted fleet file
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SutRecord {
    pub name: String,
    pub host: String,
    #[serde(default = "default_agent_port")]
    pub port: u16,
    /// Single-game settings
    #[serde(default)]
    pub config_path: String,
    #[serde(default)]
    pub game_path: String,
    #[serde(default)]
    pub process_id: String,
    #[serde(default = "default_run_count")]
    pub run_count: u32,
    #[serde(default = "default_run_delay")]
    pub run_delay_secs: u64,
    /// Campaign settings
    #[serde(default)]
    pub campaign_mode: bool,
    #[serde(default)]
    pub campaign: CampaignSpec,
}

impl SutRecord {
    /// Build the job this record is configured to run
    pub fn job(&self) -> AutomationJob {
        if self.campaign_mode {
            AutomationJob::Campaign {
                spec: self.campaign.clone(),
            }
        } else {
            AutomationJob::SingleGame {
                entry: GameEntry {
                    game_name: self.name.clone(),
                    config_path: self.config_path.clone(),
                    game_path: self.game_path.clone(),
                    process_id: self.process_id.clone(),
                    startup_wait_secs: 0,
                    run_count: self.run_count,
                    run_delay_secs: self.run_delay_secs,
                },
            }
        }
    }
}

/// The persisted fleet file
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FleetFile {
    #[serde(default)]
    pub suts: Vec<SutRecord>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn launch_request_defaults() {
        let req: LaunchRequest = serde_json::from_str(r#"{"path": "271590"}"#).unwrap();
        assert_eq!(req.path, "271590");
        assert_eq!(req.process_id, "");
        assert_eq!(req.startup_wait, 0);
    }

    #[test]
    fn launch_response_skips_absent_fields() {
        let resp = LaunchResponse::cancelled(LaunchMethod::StoreProtocol);
        let json = serde_json::to_value(&resp).unwrap();
        assert_eq!(json["status"], "cancelled");
        assert_eq!(json["launch_method"], "store_protocol");
        assert!(json.get("game_process_pid").is_none());
        assert!(json.get("error").is_none());
    }

    #[test]
    fn game_entry_defaults() {
        let entry: GameEntry = serde_json::from_str(
            r#"{"game_name": "RDR2", "game_path": "1174180"}"#,
        )
        .unwrap();
        assert_eq!(entry.run_count, 3);
        assert_eq!(entry.run_delay_secs, 30);
        assert_eq!(entry.process_id, "");
    }

    #[test]
    fn sut_record_defaults() {
        let record: SutRecord =
            serde_json::from_str(r#"{"name": "sut-1", "host": "10.0.0.5"}"#).unwrap();
        assert_eq!(record.port, 8080);
        assert_eq!(record.run_count, 3);
        assert_eq!(record.run_delay_secs, 30);
        assert!(!record.campaign_mode);
        assert_eq!(record.campaign.game_delay_secs, 120);
        assert!(record.campaign.continue_on_failure);
    }

    #[test]
    fn campaign_total_runs_sums_per_game_counts() {
        let job = AutomationJob::Campaign {
            spec: CampaignSpec {
                games: vec![
                    GameEntry {
                        game_name: "A".into(),
                        config_path: String::new(),
                        game_path: "a.exe".into(),
                        process_id: String::new(),
                        startup_wait_secs: 0,
                        run_count: 2,
                        run_delay_secs: 0,
                    },
                    GameEntry {
                        game_name: "B".into(),
                        config_path: String::new(),
                        game_path: "b.exe".into(),
                        process_id: String::new(),
                        startup_wait_secs: 0,
                        run_count: 3,
                        run_delay_secs: 0,
                    },
                ],
                ..Default::default()
            },
        };
        assert_eq!(job.total_runs(), 5);
        assert_eq!(job.total_games(), 2);
        assert!(!job.is_empty());
    }

    #[test]
    fn empty_jobs_are_detected() {
        let campaign = AutomationJob::Campaign {
            spec: CampaignSpec::default(),
        };
        assert!(campaign.is_empty());

        let single = AutomationJob::SingleGame {
            entry: GameEntry {
                game_name: "X".into(),
                config_path: String::new(),
                game_path: String::new(),
                process_id: String::new(),
                startup_wait_secs: 0,
                run_count: 1,
                run_delay_secs: 0,
            },
        };
        assert!(single.is_empty());
    }
}
