//! Process discovery and termination on the SUT
//!
//! Matching is exact-only: many games spawn through a thin launcher whose
//! name contains the game's (PlayRDR2.exe vs RDR2.exe), so substring
//! matching would track the wrong process.

use std::time::{Duration, Instant};
use sysinfo::{Pid, ProcessRefreshKind, RefreshKind, Signal, System};
use tracing::{debug, info, warn};

/// A process matched on the SUT
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    pub pid: u32,
    pub name: String,
}

/// Seam over the OS process table so the launch engine is testable
/// without live processes.
pub trait ProcessInspector: Send + Sync {
    /// Find a running process whose reported name or executable file name
    /// equals `name` (case-insensitive, `.exe` suffix optional on either
    /// side). Exact matches only.
    fn find_exact(&self, name: &str) -> Option<ProcessInfo>;

    /// Terminate every process matching `name` under the same exact rule:
    /// graceful signal first, force-kill after a short grace period.
    /// Returns true if at least one process was terminated.
    fn terminate_by_name(&self, name: &str) -> bool;

    fn is_running(&self, pid: u32) -> bool;
}

/// Case-insensitive exact comparison of a candidate process against the
/// wanted name, with the `.exe` suffix normalized away on both sides.
fn matches_exact(candidate_name: &str, exe_file_name: Option<&str>, wanted: &str) -> bool {
    fn normalize(s: &str) -> String {
        let lower = s.to_ascii_lowercase();
        lower.strip_suffix(".exe").unwrap_or(&lower).to_string()
    }

    let wanted = normalize(wanted);
    if wanted.is_empty() {
        return false;
    }
    if normalize(candidate_name) == wanted {
        return true;
    }
    exe_file_name.map(normalize) == Some(wanted)
}

/// Inspector backed by the live process table
pub struct SystemInspector;

impl SystemInspector {
    fn snapshot() -> System {
        System::new_with_specifics(
            RefreshKind::new().with_processes(ProcessRefreshKind::new()),
        )
    }
}

impl ProcessInspector for SystemInspector {
    fn find_exact(&self, name: &str) -> Option<ProcessInfo> {
        let sys = Self::snapshot();
        for (pid, process) in sys.processes() {
            let exe_file = process
                .exe()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str());
            if matches_exact(process.name(), exe_file, name) {
                debug!("found process: {} (pid {})", process.name(), pid);
                return Some(ProcessInfo {
                    pid: pid.as_u32(),
                    name: process.name().to_string(),
                });
            }
        }
        None
    }

    fn terminate_by_name(&self, name: &str) -> bool {
        let sys = Self::snapshot();
        let mut signalled = Vec::new();

        for (pid, process) in sys.processes() {
            let exe_file = process
                .exe()
                .and_then(|p| p.file_name())
                .and_then(|n| n.to_str());
            if matches_exact(process.name(), exe_file, name) {
                info!("terminating process: {} (pid {})", process.name(), pid);
                if process.kill_with(Signal::Term).is_none() {
                    // Platform has no graceful signal; force immediately
                    process.kill();
                }
                signalled.push(pid.as_u32());
            }
        }

        if signalled.is_empty() {
            debug!("no process found with name: {}", name);
            return false;
        }

        // Grace period, then force-kill survivors
        let deadline = Instant::now() + Duration::from_secs(5);
        loop {
            let sys = Self::snapshot();
            let alive: Vec<u32> = signalled
                .iter()
                .copied()
                .filter(|pid| sys.process(Pid::from_u32(*pid)).is_some())
                .collect();
            if alive.is_empty() {
                break;
            }
            if Instant::now() >= deadline {
                for pid in &alive {
                    if let Some(process) = sys.process(Pid::from_u32(*pid)) {
                        warn!("force killing process: {} (pid {})", process.name(), pid);
                        process.kill();
                    }
                }
                break;
            }
            std::thread::sleep(Duration::from_millis(250));
        }

        true
    }

    fn is_running(&self, pid: u32) -> bool {
        let sys = Self::snapshot();
        sys.process(Pid::from_u32(pid)).is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn exact_match_is_case_insensitive() {
        assert!(matches_exact("RDR2.exe", None, "rdr2.exe"));
        assert!(matches_exact("rdr2.exe", None, "RDR2.EXE"));
    }

    #[test]
    fn exe_suffix_is_optional_on_either_side() {
        assert!(matches_exact("RDR2.exe", None, "RDR2"));
        assert!(matches_exact("RDR2", None, "RDR2.exe"));
    }

    #[test]
    fn launcher_superstring_never_matches() {
        assert!(!matches_exact("PlayRDR2.exe", None, "RDR2.exe"));
        assert!(!matches_exact("RDR2.exe", None, "PlayRDR2.exe"));
    }

    #[test]
    fn substring_never_matches() {
        assert!(!matches_exact("RDR2_launcher.exe", None, "RDR2.exe"));
        assert!(!matches_exact("steam.exe", None, "am.exe"));
    }

    #[test]
    fn exe_file_name_is_considered() {
        assert!(matches_exact("wrapper", Some("RDR2.exe"), "RDR2.exe"));
        assert!(!matches_exact("wrapper", Some("PlayRDR2.exe"), "RDR2.exe"));
    }

    #[test]
    fn empty_wanted_name_matches_nothing() {
        assert!(!matches_exact("RDR2.exe", None, ""));
        assert!(!matches_exact("", None, ""));
    }
}
