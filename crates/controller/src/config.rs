//! Fleet persistence
//!
//! The controller's persisted state is a single JSON file listing SUTs
//! with their single-game and campaign settings. Missing optional fields
//! load as the documented defaults, so hand-edited or older files keep
//! working.

use gamerig_common::{FleetFile, Result};
use std::path::Path;

/// Load the fleet file, returning an empty fleet when it does not exist
pub fn load_fleet(path: &Path) -> Result<FleetFile> {
    if !path.exists() {
        return Ok(FleetFile::default());
    }
    let content = std::fs::read_to_string(path)?;
    Ok(serde_json::from_str(&content)?)
}

/// Save the fleet file, creating parent directories as needed
pub fn save_fleet(path: &Path, fleet: &FleetFile) -> Result<()> {
    if let Some(parent) = path.parent() {
        if !parent.as_os_str().is_empty() {
            std::fs::create_dir_all(parent)?;
        }
    }
    std::fs::write(path, serde_json::to_string_pretty(fleet)?)?;
    Ok(())
}
