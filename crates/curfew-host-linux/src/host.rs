//! Process enumeration and termination

use curfew_host_api::{HostError, HostResult, ProcessHost};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid as NixPid;
use std::collections::HashSet;
use std::ffi::OsStr;
use std::path::Path;
use std::sync::{Mutex, MutexGuard};
use std::time::Duration;
use sysinfo::{Pid, Process, System};
use tracing::{debug, warn};

/// Every name a process answers to: its short name, its executable's file
/// name and the file name of `argv[0]`. The kernel truncates the short
/// name to 15 bytes, so long names only match through the other two.
pub fn process_names(process: &Process) -> Vec<String> {
    let mut names = vec![process.name().to_string_lossy().into_owned()];

    let file_name = |path: &Path| path.file_name().map(|n| n.to_string_lossy().into_owned());

    if let Some(exe) = process.exe().and_then(file_name) {
        names.push(exe);
    }
    if let Some(arg0) = process.cmd().first() {
        if let Some(name) = file_name(Path::new(OsStr::new(arg0))) {
            names.push(name);
        }
    }

    names.retain(|n| !n.is_empty());
    names.dedup();
    names
}

/// Linux host backed by `/proc` (through sysinfo)
pub struct LinuxHost {
    system: Mutex<System>,
}

impl LinuxHost {
    pub fn new() -> Self {
        Self {
            system: Mutex::new(System::new()),
        }
    }

    fn refreshed(&self) -> HostResult<MutexGuard<'_, System>> {
        let mut system = self
            .system
            .lock()
            .map_err(|_| HostError::Internal("Process table lock poisoned".into()))?;
        system.refresh_all();
        Ok(system)
    }
}

impl Default for LinuxHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessHost for LinuxHost {
    fn running_process_names(&self) -> HostResult<HashSet<String>> {
        let system = self.refreshed()?;
        Ok(system
            .processes()
            .values()
            .flat_map(process_names)
            .collect())
    }

    fn kill_by_name(&self, name: &str) -> HostResult<usize> {
        let own_pid = std::process::id();
        let targets: Vec<Pid> = {
            let system = self.refreshed()?;
            system
                .processes()
                .iter()
                .filter(|(pid, process)| {
                    pid.as_u32() != own_pid && process_names(process).iter().any(|n| n == name)
                })
                .map(|(pid, _)| *pid)
                .collect()
        };

        let mut killed = 0;
        let mut last_error = None;
        for pid in targets {
            let raw = NixPid::from_raw(pid.as_u32() as i32);
            match signal::kill(raw, Signal::SIGKILL) {
                Ok(()) => {
                    debug!(pid = pid.as_u32(), name, "Sent SIGKILL");
                    killed += 1;
                }
                Err(nix::errno::Errno::ESRCH) => {
                    // Already gone
                }
                Err(e) => {
                    warn!(pid = pid.as_u32(), name, error = %e, "Failed to kill process");
                    last_error = Some(e);
                }
            }
        }

        match last_error {
            Some(e) if killed == 0 => Err(HostError::StopFailed(format!(
                "Failed to send SIGKILL to {}: {}",
                name, e
            ))),
            _ => Ok(killed),
        }
    }

    fn is_pid_alive(&self, pid: u32) -> bool {
        let Ok(raw) = i32::try_from(pid) else {
            return false;
        };
        match signal::kill(NixPid::from_raw(raw), None) {
            Ok(()) => true,
            // Exists, owned by someone else
            Err(nix::errno::Errno::EPERM) => true,
            Err(_) => false,
        }
    }

    fn uptime(&self) -> Option<Duration> {
        Some(Duration::from_secs(System::uptime()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_own_process_is_listed() {
        let host = LinuxHost::new();
        let names = host.running_process_names().unwrap();
        assert!(!names.is_empty());
    }

    #[test]
    fn test_own_pid_is_alive() {
        let host = LinuxHost::new();
        assert!(host.is_pid_alive(std::process::id()));
        assert!(!host.is_pid_alive(u32::MAX));
    }

    #[test]
    fn test_kill_unknown_name_is_zero() {
        let host = LinuxHost::new();
        assert_eq!(host.kill_by_name("no-such-process-curfew-test").unwrap(), 0);
    }

    #[test]
    fn test_kill_spawned_process() {
        let dir = tempfile::tempdir().unwrap();
        let sleeper = dir.path().join("curfew-sleeper");
        std::fs::copy("/bin/sleep", &sleeper).unwrap();

        let mut child = std::process::Command::new(&sleeper)
            .arg("30")
            .spawn()
            .unwrap();
        std::thread::sleep(Duration::from_millis(100));

        let host = LinuxHost::new();
        assert!(host.running_process_names().unwrap().contains("curfew-sleeper"));
        assert_eq!(host.kill_by_name("curfew-sleeper").unwrap(), 1);
        let status = child.wait().unwrap();
        assert!(!status.success());
    }

    #[test]
    fn test_uptime_known() {
        assert!(LinuxHost::new().uptime().is_some());
    }
}
