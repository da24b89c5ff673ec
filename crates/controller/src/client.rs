//! HTTP client for the SUT agent

use async_trait::async_trait;
use gamerig_common::{
    CheckProcessResponse, Error, KillProcessResponse, LaunchRequest, LaunchResponse, ProcessQuery,
    Result, StatusResponse,
};
use std::time::Duration;
use tracing::debug;

/// Generous cap covering detection, both window waits, and all foreground
/// retries on the agent side.
const LAUNCH_TIMEOUT: Duration = Duration::from_secs(600);
const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);
const CANCEL_TIMEOUT: Duration = Duration::from_secs(2);
const PROBE_TIMEOUT: Duration = Duration::from_secs(5);

/// The agent operations a controller worker needs. Trait so workers are
/// testable against a stub agent.
#[async_trait]
pub trait AgentApi: Send + Sync {
    async fn launch(&self, req: &LaunchRequest) -> Result<LaunchResponse>;

    /// Best-effort: arms the agent's cancellation signal so an in-flight
    /// launch wait is released promptly.
    async fn cancel_launch(&self) -> Result<()>;

    async fn kill_process(&self, process_name: &str) -> Result<bool>;

    async fn check_process(&self, process_name: &str) -> Result<CheckProcessResponse>;
}

/// reqwest-backed agent client
pub struct AgentClient {
    base_url: String,
    http: reqwest::Client,
}

impl AgentClient {
    pub fn new(host: &str, port: u16) -> Self {
        Self {
            base_url: format!("http://{host}:{port}"),
            http: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// Connection probe against `/status`
    pub async fn probe(&self) -> Result<StatusResponse> {
        let resp = self
            .http
            .get(format!("{}/status", self.base_url))
            .timeout(PROBE_TIMEOUT)
            .send()
            .await
            .map_err(transport)?
            .error_for_status()
            .map_err(transport)?;
        resp.json().await.map_err(transport)
    }
}

#[async_trait]
impl AgentApi for AgentClient {
    async fn launch(&self, req: &LaunchRequest) -> Result<LaunchResponse> {
        debug!("POST {}/launch path={}", self.base_url, req.path);
        let resp = self
            .http
            .post(format!("{}/launch", self.base_url))
            .json(req)
            .timeout(LAUNCH_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        // Terminal errors still carry a launch payload; parse regardless
        // of the HTTP status code
        resp.json().await.map_err(transport)
    }

    async fn cancel_launch(&self) -> Result<()> {
        self.http
            .post(format!("{}/cancel_launch", self.base_url))
            .timeout(CANCEL_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        Ok(())
    }

    async fn kill_process(&self, process_name: &str) -> Result<bool> {
        let resp = self
            .http
            .post(format!("{}/kill_process", self.base_url))
            .json(&ProcessQuery {
                process_name: process_name.to_string(),
            })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        // Not-found means the process already exited, which is the goal
        if resp.status() == reqwest::StatusCode::NOT_FOUND {
            return Ok(true);
        }
        let body: KillProcessResponse = resp.json().await.map_err(transport)?;
        Ok(body.killed)
    }

    async fn check_process(&self, process_name: &str) -> Result<CheckProcessResponse> {
        let resp = self
            .http
            .post(format!("{}/check_process", self.base_url))
            .json(&ProcessQuery {
                process_name: process_name.to_string(),
            })
            .timeout(REQUEST_TIMEOUT)
            .send()
            .await
            .map_err(transport)?;
        resp.json().await.map_err(transport)
    }
}

fn transport(e: reqwest::Error) -> Error {
    Error::Transport(e.to_string())
}
