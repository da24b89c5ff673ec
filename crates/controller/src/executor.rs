//! Run execution seam
//!
//! The actual UI automation (screenshots, vision models, step
//! interpreters) lives outside this crate; the controller hands each run
//! to a `RunExecutor` once the launch engine has verified the game.

use async_trait::async_trait;
use gamerig_common::{GameEntry, Result};
use tokio_util::sync::CancellationToken;
use tracing::info;

/// What a single run produced
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ExecutionOutcome {
    Completed,
    Stopped,
    Failed { reason: String },
}

/// Everything an executor needs for one run
#[derive(Debug, Clone)]
pub struct RunContext {
    pub sut_name: String,
    pub game: GameEntry,
    pub run_number: u32,
    /// Local stop signal; executors must observe it in their own waits
    pub stop: CancellationToken,
}

/// External step-executor seam, selected once at job start
#[async_trait]
pub trait RunExecutor: Send + Sync {
    async fn execute(&self, ctx: RunContext) -> Result<ExecutionOutcome>;
}

/// Executor that treats a verified launch as the whole run. Useful for
/// smoke-checking fleet plumbing without a step interpreter attached.
pub struct LaunchOnlyExecutor;

#[async_trait]
impl RunExecutor for LaunchOnlyExecutor {
    async fn execute(&self, ctx: RunContext) -> Result<ExecutionOutcome> {
        info!(
            "run {} of {} verified by launch only",
            ctx.run_number, ctx.game.game_name
        );
        Ok(ExecutionOutcome::Completed)
    }
}
