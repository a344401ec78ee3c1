//! The OS boundary of the engine: enumerating running processes.
//! [SysinfoProvider] is the production implementation; tests substitute a mock.

use anyhow::Result;
use sysinfo::{ProcessesToUpdate, System};

/// One running process as seen during a scan. Names and paths are lower-cased
/// at the boundary so the matching rules compare case-insensitively.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ProcessInfo {
    /// Reported file name of the process, e.g. `chrome.exe` or `nvim`.
    pub name: String,
    /// Full path to the executable. Empty when the OS refuses to reveal it.
    pub exe: String,
    pub pid: u32,
}

/// Contract for taking a snapshot of the running process set. Individual
/// processes that vanish or deny access mid-scan are skipped by the
/// implementation, never surfaced as scan failures.
#[cfg_attr(test, mockall::automock)]
pub trait ProcessProvider: Send + Sync + 'static {
    fn processes(&mut self) -> Result<Vec<ProcessInfo>>;
}

pub struct SysinfoProvider {
    system: System,
}

impl SysinfoProvider {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl Default for SysinfoProvider {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessProvider for SysinfoProvider {
    fn processes(&mut self) -> Result<Vec<ProcessInfo>> {
        self.system.refresh_processes(ProcessesToUpdate::All, true);

        let snapshot = self
            .system
            .processes()
            .iter()
            .filter_map(|(pid, process)| {
                let name = process.name().to_string_lossy().to_lowercase();
                if name.is_empty() {
                    return None;
                }
                let exe = process
                    .exe()
                    .map(|v| v.to_string_lossy().to_lowercase())
                    .unwrap_or_default();
                Some(ProcessInfo {
                    name,
                    exe,
                    pid: pid.as_u32(),
                })
            })
            .collect();

        Ok(snapshot)
    }
}
