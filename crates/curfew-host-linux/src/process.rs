//! Monitor child process management

use curfew_host_api::{HostError, HostResult, MonitorHandle, MonitorLauncher};
use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use std::os::unix::process::CommandExt;
use std::path::PathBuf;
use std::process::{Child, Command, Stdio};
use tracing::{debug, info, warn};

/// Environment passed through to the child
const INHERITED_ENV: &[&str] = &[
    "PATH",
    "HOME",
    "LANG",
    "DISPLAY",
    "WAYLAND_DISPLAY",
    "XDG_RUNTIME_DIR",
    "XDG_DATA_HOME",
    "XDG_STATE_HOME",
    "DBUS_SESSION_BUS_ADDRESS",
    "PULSE_SERVER",
    "RUST_LOG",
    "CURFEW_DATA_DIR",
    "CURFEW_ENV",
    "CURFEW_MOCK_TIME",
];

/// Managed child process with process group
pub struct ManagedProcess {
    pub child: Child,
    pub pid: u32,
    pub pgid: u32,
}

impl ManagedProcess {
    /// Spawn a new process in its own session and process group
    pub fn spawn(argv: &[String], env: &[(String, String)]) -> HostResult<Self> {
        let Some((program, args)) = argv.split_first() else {
            return Err(HostError::SpawnFailed("Empty argv".into()));
        };

        let mut cmd = Command::new(program);
        cmd.args(args);

        cmd.env_clear();
        for key in INHERITED_ENV {
            if let Ok(value) = std::env::var(key) {
                cmd.env(key, value);
            }
        }
        for (k, v) in env {
            cmd.env(k, v);
        }

        cmd.stdin(Stdio::null());
        cmd.stdout(Stdio::null());
        cmd.stderr(Stdio::inherit());

        // SAFETY: setsid is async-signal-safe and is all that runs between fork and exec
        unsafe {
            cmd.pre_exec(|| {
                nix::unistd::setsid().map_err(std::io::Error::other)?;
                Ok(())
            });
        }

        let child = cmd.spawn().map_err(|e| {
            HostError::SpawnFailed(format!("Failed to spawn {}: {}", program, e))
        })?;

        let pid = child.id();
        let pgid = pid; // After setsid, pid == pgid

        debug!(pid = pid, pgid = pgid, program = %program, "Process spawned");

        Ok(Self { child, pid, pgid })
    }

    fn signal_group(&self, sig: Signal) -> HostResult<()> {
        let pgid = Pid::from_raw(-(self.pgid as i32)); // Negative for process group

        match signal::kill(pgid, sig) {
            Ok(()) => {
                debug!(pgid = self.pgid, signal = %sig, "Signalled process group");
                Ok(())
            }
            Err(nix::errno::Errno::ESRCH) => {
                // Process already gone
                Ok(())
            }
            Err(e) => Err(HostError::StopFailed(format!("Failed to send {}: {}", sig, e))),
        }
    }

    /// Send SIGTERM to the process group
    pub fn terminate(&self) -> HostResult<()> {
        self.signal_group(Signal::SIGTERM)
    }

    /// Send SIGKILL to the process group
    pub fn kill(&self) -> HostResult<()> {
        self.signal_group(Signal::SIGKILL)
    }

    /// Non-blocking exit check; reaps the child once it has exited
    pub fn has_exited(&mut self) -> bool {
        match self.child.try_wait() {
            Ok(Some(status)) => {
                info!(pid = self.pid, status = %status, "Process exited");
                true
            }
            Ok(None) => false,
            Err(e) => {
                warn!(pid = self.pid, error = %e, "Error checking process status");
                false
            }
        }
    }
}

/// Launches `curfewd` (or any monitor command) as a child process
pub struct ChildMonitorLauncher {
    argv: Vec<String>,
    env: Vec<(String, String)>,
}

impl ChildMonitorLauncher {
    pub fn new(program: impl Into<PathBuf>) -> Self {
        Self {
            argv: vec![program.into().to_string_lossy().into_owned()],
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.argv.push(arg.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }
}

impl MonitorLauncher for ChildMonitorLauncher {
    fn launch(&self) -> HostResult<Box<dyn MonitorHandle>> {
        let process = ManagedProcess::spawn(&self.argv, &self.env)?;
        Ok(Box::new(ChildMonitorHandle {
            process,
            exited: false,
        }))
    }
}

pub struct ChildMonitorHandle {
    process: ManagedProcess,
    exited: bool,
}

impl MonitorHandle for ChildMonitorHandle {
    fn pid(&self) -> u32 {
        self.process.pid
    }

    fn is_alive(&mut self) -> bool {
        if !self.exited {
            self.exited = self.process.has_exited();
        }
        !self.exited
    }

    fn terminate(&mut self) -> HostResult<()> {
        if self.exited {
            return Ok(());
        }
        self.process.terminate()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn spawn_simple_process() {
        let argv = vec!["true".to_string()];
        let mut proc = ManagedProcess::spawn(&argv, &[]).unwrap();

        let status = proc.child.wait().unwrap();
        assert!(status.success());
    }

    #[test]
    fn spawn_empty_argv_fails() {
        assert!(matches!(
            ManagedProcess::spawn(&[], &[]),
            Err(HostError::SpawnFailed(_))
        ));
    }

    #[test]
    fn launcher_handle_lifecycle() {
        let launcher = ChildMonitorLauncher::new("sleep").arg("60");
        let mut handle = launcher.launch().unwrap();
        assert!(handle.pid() > 0);
        assert!(handle.is_alive());

        handle.terminate().unwrap();
        let mut alive = true;
        for _ in 0..50 {
            std::thread::sleep(Duration::from_millis(20));
            if !handle.is_alive() {
                alive = false;
                break;
            }
        }
        assert!(!alive);
        assert!(handle.terminate().is_ok());
    }
}
