//! Single-instance lock

use curfew_host_api::{HostError, HostResult};
use fs2::FileExt;
use std::fs::{File, OpenOptions};
use std::io::{Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};
use tracing::debug;

/// Exclusive advisory lock held for the life of the process. The lock
/// file holds the owner's PID.
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    pub fn acquire(path: impl AsRef<Path>) -> HostResult<Self> {
        let path = path.as_ref();
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }

        let mut file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .read(true)
            .write(true)
            .open(path)?;

        if file.try_lock_exclusive().is_err() {
            let holder = std::fs::read_to_string(path).unwrap_or_default();
            return Err(HostError::AlreadyRunning(format!(
                "{} is held by pid {}",
                path.display(),
                holder.trim()
            )));
        }

        file.set_len(0)?;
        file.seek(SeekFrom::Start(0))?;
        write!(file, "{}", std::process::id())?;
        file.flush()?;

        debug!(path = %path.display(), "Instance lock acquired");
        Ok(Self {
            file,
            path: path.to_path_buf(),
        })
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for InstanceLock {
    fn drop(&mut self) {
        let _ = FileExt::unlock(&self.file);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_second_acquire_fails() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("curfewd.lock");

        let first = InstanceLock::acquire(&path).unwrap();
        assert_eq!(
            std::fs::read_to_string(first.path()).unwrap(),
            std::process::id().to_string()
        );
        assert!(matches!(
            InstanceLock::acquire(&path),
            Err(HostError::AlreadyRunning(_))
        ));

        drop(first);
        assert!(InstanceLock::acquire(&path).is_ok());
    }
}
