//! GameRig Controller Library
//!
//! One `SutController` per target machine: job lifecycle, campaign
//! sequencing, cooperative stop, per-worker log routing, and the HTTP
//! client for the SUT agent.

pub mod campaign;
pub mod client;
pub mod config;
pub mod controller;
pub mod executor;
pub mod logs;

pub use client::{AgentApi, AgentClient};
pub use controller::{RunPolicy, SutController};
pub use executor::{ExecutionOutcome, LaunchOnlyExecutor, RunContext, RunExecutor};
pub use logs::{LogLine, LogRouter, LogSubscription};
