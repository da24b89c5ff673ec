//! Agent configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// HTTP listen address
    pub listen: String,

    /// Store client installation root. Library discovery starts here;
    /// `None` uses the conventional per-OS location.
    pub store_root: Option<PathBuf>,

    /// Process-detection settings
    pub detection: DetectionConfig,

    /// Window readiness and foreground settings
    pub window: WindowConfig,
}

impl Default for AgentConfig {
    fn default() -> Self {
        Self {
            listen: "0.0.0.0:8080".to_string(),
            store_root: None,
            detection: DetectionConfig::default(),
            window: WindowConfig::default(),
        }
    }
}

/// Process-detection settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DetectionConfig {
    /// Default cap in seconds for the detection phase when the request
    /// does not carry its own bound
    pub startup_wait_secs: u64,

    /// Poll interval while waiting for the game process to appear.
    /// Also bounds cancellation latency during detection.
    pub poll_interval_secs: u64,

    /// Settle time after spawning before the first poll
    pub spawn_settle_secs: u64,
}

impl Default for DetectionConfig {
    fn default() -> Self {
        Self {
            startup_wait_secs: 60,
            poll_interval_secs: 3,
            spawn_settle_secs: 3,
        }
    }
}

/// Window readiness and foreground settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct WindowConfig {
    /// Max seconds to wait for the window to become visible.
    /// Slow-loading titles need the full two minutes.
    pub visible_timeout_secs: u64,

    /// Max seconds to wait for the window's input queue to go idle
    pub ready_timeout_secs: u64,

    /// Poll interval for both window waits
    pub probe_interval_secs: u64,

    /// Foreground retry attempts after the first failed confirmation
    pub focus_retries: u32,

    /// Seconds between foreground retries
    pub retry_interval_secs: u64,

    /// Shorter window waits used on foreground retries
    pub retry_visible_timeout_secs: u64,
    pub retry_ready_timeout_secs: u64,
}

impl Default for WindowConfig {
    fn default() -> Self {
        Self {
            visible_timeout_secs: 120,
            ready_timeout_secs: 30,
            probe_interval_secs: 2,
            focus_retries: 5,
            retry_interval_secs: 10,
            retry_visible_timeout_secs: 15,
            retry_ready_timeout_secs: 10,
        }
    }
}

impl AgentConfig {
    /// Load configuration from file, falling back to defaults when absent
    pub fn load(path: &std::path::Path) -> anyhow::Result<Self> {
        if path.exists() {
            let content = std::fs::read_to_string(path)?;
            let config: Self = toml::from_str(&content)?;
            Ok(config)
        } else {
            Ok(Self::default())
        }
    }

    /// Save configuration to file
    pub fn save(&self, path: &std::path::Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_file_uses_defaults() {
        let config = AgentConfig::load(std::path::Path::new("/nonexistent/agent.toml")).unwrap();
        assert_eq!(config.detection.startup_wait_secs, 60);
        assert_eq!(config.window.visible_timeout_secs, 120);
        assert_eq!(config.window.focus_retries, 5);
    }

    #[test]
    fn save_load_round_trip() {
        let tmp = tempfile::TempDir::new().unwrap();
        let path = tmp.path().join("agent.toml");

        let mut config = AgentConfig::default();
        config.listen = "127.0.0.1:9999".to_string();
        config.detection.poll_interval_secs = 1;
        config.save(&path).unwrap();

        let loaded = AgentConfig::load(&path).unwrap();
        assert_eq!(loaded.listen, "127.0.0.1:9999");
        assert_eq!(loaded.detection.poll_interval_secs, 1);
    }
}
