//! GameRig Common Library
//!
//! Shared protocol types, error taxonomy, and cancellation-aware wait
//! primitives for the GameRig controller and SUT agent.

pub mod error;
pub mod types;
pub mod wait;

// Re-export commonly used types
pub use error::{Error, Result};
pub use types::*;
pub use wait::{CancelSignal, WaitOutcome};

/// GameRig version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
