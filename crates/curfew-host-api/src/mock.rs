//! Mock host adapter for testing

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use crate::{
    AudioCue, AudioPlayer, HostError, HostResult, MonitorHandle, MonitorLauncher, Notifier,
    ProcessHost,
};

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

/// A notification the mock was asked to show
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MockNotification {
    pub title: String,
    pub message: String,
}

/// Mock host for unit and integration testing. Records every side effect.
#[derive(Clone)]
pub struct MockHost {
    running: Arc<Mutex<HashSet<String>>>,
    alive_pids: Arc<Mutex<HashSet<u32>>>,
    monitors: Arc<Mutex<HashMap<u32, bool>>>,
    next_pid: Arc<AtomicU32>,
    uptime: Arc<Mutex<Option<Duration>>>,

    kills: Arc<Mutex<Vec<String>>>,
    notifications: Arc<Mutex<Vec<MockNotification>>>,
    cues: Arc<Mutex<Vec<AudioCue>>>,
    launches: Arc<Mutex<Vec<u32>>>,
    terminations: Arc<Mutex<Vec<u32>>>,

    /// Configure process enumeration to fail
    pub fail_enumerate: Arc<Mutex<bool>>,

    /// Configure kill to fail
    pub fail_kill: Arc<Mutex<bool>>,

    /// Configure notifications to fail
    pub fail_notify: Arc<Mutex<bool>>,

    /// Configure audio to fail
    pub fail_audio: Arc<Mutex<bool>>,

    /// Configure monitor launch to fail
    pub fail_launch: Arc<Mutex<bool>>,
}

impl MockHost {
    pub fn new() -> Self {
        Self {
            running: Arc::new(Mutex::new(HashSet::new())),
            alive_pids: Arc::new(Mutex::new(HashSet::new())),
            monitors: Arc::new(Mutex::new(HashMap::new())),
            next_pid: Arc::new(AtomicU32::new(1000)),
            uptime: Arc::new(Mutex::new(None)),
            kills: Arc::new(Mutex::new(Vec::new())),
            notifications: Arc::new(Mutex::new(Vec::new())),
            cues: Arc::new(Mutex::new(Vec::new())),
            launches: Arc::new(Mutex::new(Vec::new())),
            terminations: Arc::new(Mutex::new(Vec::new())),
            fail_enumerate: Arc::new(Mutex::new(false)),
            fail_kill: Arc::new(Mutex::new(false)),
            fail_notify: Arc::new(Mutex::new(false)),
            fail_audio: Arc::new(Mutex::new(false)),
            fail_launch: Arc::new(Mutex::new(false)),
        }
    }

    /// Simulate a process starting
    pub fn start_process(&self, name: &str) {
        lock(&self.running).insert(name.to_string());
    }

    /// Simulate a process exiting on its own
    pub fn stop_process(&self, name: &str) {
        lock(&self.running).remove(name);
    }

    /// Mark an arbitrary PID as alive or dead
    pub fn set_pid_alive(&self, pid: u32, alive: bool) {
        let mut pids = lock(&self.alive_pids);
        if alive {
            pids.insert(pid);
        } else {
            pids.remove(&pid);
        }
    }

    /// Simulate a launched monitor crashing
    pub fn crash_monitor(&self, pid: u32) {
        if let Some(alive) = lock(&self.monitors).get_mut(&pid) {
            *alive = false;
        }
    }

    pub fn set_uptime(&self, uptime: Option<Duration>) {
        *lock(&self.uptime) = uptime;
    }

    /// Names passed to `kill_by_name`, in order
    pub fn kills(&self) -> Vec<String> {
        lock(&self.kills).clone()
    }

    pub fn notifications(&self) -> Vec<MockNotification> {
        lock(&self.notifications).clone()
    }

    pub fn cues(&self) -> Vec<AudioCue> {
        lock(&self.cues).clone()
    }

    /// PIDs of every launched monitor, in order
    pub fn launches(&self) -> Vec<u32> {
        lock(&self.launches).clone()
    }

    /// PIDs of every terminated monitor, in order
    pub fn terminations(&self) -> Vec<u32> {
        lock(&self.terminations).clone()
    }

    pub fn clear_records(&self) {
        lock(&self.kills).clear();
        lock(&self.notifications).clear();
        lock(&self.cues).clear();
        lock(&self.launches).clear();
        lock(&self.terminations).clear();
    }
}

impl Default for MockHost {
    fn default() -> Self {
        Self::new()
    }
}

impl ProcessHost for MockHost {
    fn running_process_names(&self) -> HostResult<HashSet<String>> {
        if *lock(&self.fail_enumerate) {
            return Err(HostError::EnumerationFailed("Mock enumeration failure".into()));
        }
        Ok(lock(&self.running).clone())
    }

    fn kill_by_name(&self, name: &str) -> HostResult<usize> {
        if *lock(&self.fail_kill) {
            return Err(HostError::StopFailed("Mock kill failure".into()));
        }
        lock(&self.kills).push(name.to_string());
        Ok(usize::from(lock(&self.running).remove(name)))
    }

    fn is_pid_alive(&self, pid: u32) -> bool {
        lock(&self.alive_pids).contains(&pid)
            || lock(&self.monitors).get(&pid).copied().unwrap_or(false)
    }

    fn uptime(&self) -> Option<Duration> {
        *lock(&self.uptime)
    }
}

impl Notifier for MockHost {
    fn show(&self, title: &str, message: &str) -> HostResult<()> {
        if *lock(&self.fail_notify) {
            return Err(HostError::NotificationFailed("Mock notification failure".into()));
        }
        lock(&self.notifications).push(MockNotification {
            title: title.to_string(),
            message: message.to_string(),
        });
        Ok(())
    }
}

impl AudioPlayer for MockHost {
    fn play(&self, cue: AudioCue) -> HostResult<()> {
        if *lock(&self.fail_audio) {
            return Err(HostError::AudioFailed("Mock audio failure".into()));
        }
        lock(&self.cues).push(cue);
        Ok(())
    }
}

impl MonitorLauncher for MockHost {
    fn launch(&self) -> HostResult<Box<dyn MonitorHandle>> {
        if *lock(&self.fail_launch) {
            return Err(HostError::SpawnFailed("Mock spawn failure".into()));
        }

        let pid = self.next_pid.fetch_add(1, Ordering::SeqCst);
        lock(&self.monitors).insert(pid, true);
        lock(&self.launches).push(pid);

        Ok(Box::new(MockMonitorHandle {
            pid,
            monitors: self.monitors.clone(),
            terminations: self.terminations.clone(),
        }))
    }
}

/// Handle to a mock monitor; shares state with its [`MockHost`]
pub struct MockMonitorHandle {
    pid: u32,
    monitors: Arc<Mutex<HashMap<u32, bool>>>,
    terminations: Arc<Mutex<Vec<u32>>>,
}

impl MonitorHandle for MockMonitorHandle {
    fn pid(&self) -> u32 {
        self.pid
    }

    fn is_alive(&mut self) -> bool {
        lock(&self.monitors).get(&self.pid).copied().unwrap_or(false)
    }

    fn terminate(&mut self) -> HostResult<()> {
        if let Some(alive) = lock(&self.monitors).get_mut(&self.pid) {
            *alive = false;
        }
        lock(&self.terminations).push(self.pid);
        Ok(())
    }
}
