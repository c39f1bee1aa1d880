use std::fs::{self, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::warn;

use crate::error::CredtrackError;

/// Exclusive lock file for a one-shot job; removed when dropped.
///
/// A lock left behind by a killed run is reclaimed once its recorded pid is
/// gone or the file is older than `stale_after`.
#[derive(Debug)]
pub struct JobLock {
    path: PathBuf,
}

impl JobLock {
    /// Fails with `JobLocked` when a live run holds `<dir>/.<job>.lock`.
    pub fn acquire(dir: &Path, job: &str, stale_after: Duration) -> Result<Self, CredtrackError> {
        fs::create_dir_all(dir)?;
        let path = dir.join(format!(".{job}.lock"));
        match Self::create(path) {
            Err(CredtrackError::JobLocked(path)) if is_stale(&path, stale_after) => {
                warn!(path = %path.display(), job, "reclaiming stale job lock");
                match fs::remove_file(&path) {
                    Ok(()) => {}
                    Err(e) if e.kind() == ErrorKind::NotFound => {}
                    Err(e) => return Err(e.into()),
                }
                Self::create(path)
            }
            other => other,
        }
    }

    fn create(path: PathBuf) -> Result<Self, CredtrackError> {
        let mut file = match OpenOptions::new().write(true).create_new(true).open(&path) {
            Ok(file) => file,
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                return Err(CredtrackError::JobLocked(path));
            }
            Err(e) => return Err(e.into()),
        };
        let lock = Self { path };
        writeln!(file, "{}", std::process::id())?;
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

impl Drop for JobLock {
    fn drop(&mut self) {
        if let Err(e) = fs::remove_file(&self.path) {
            warn!(path = %self.path.display(), error = %e, "failed to release job lock");
        }
    }
}

fn is_stale(path: &Path, stale_after: Duration) -> bool {
    let holder = fs::read_to_string(path)
        .ok()
        .and_then(|s| s.trim().parse::<u32>().ok());
    if holder.is_some_and(|pid| !process_alive(pid)) {
        return true;
    }
    fs::metadata(path)
        .and_then(|m| m.modified())
        .ok()
        .and_then(|modified| modified.elapsed().ok())
        .is_some_and(|age| age > stale_after)
}

#[cfg(target_os = "linux")]
fn process_alive(pid: u32) -> bool {
    Path::new("/proc").join(pid.to_string()).exists()
}

// No cheap liveness check elsewhere; rely on the age limit.
#[cfg(not(target_os = "linux"))]
fn process_alive(_pid: u32) -> bool {
    true
}
