use std::{
    fs::{self, File, OpenOptions},
    io::{ErrorKind, Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
    process, thread,
    time::{Duration, Instant},
};

use anyhow::{anyhow, Context, Result};
use chrono::Utc;
use fs2::FileExt;
use serde::{Deserialize, Serialize};

use crate::infrastructure::directories::ResolvedPaths;

const LOCK_FILENAME: &str = ".archiver.lock";
const WAIT_INTERVAL: Duration = Duration::from_millis(500);
const MAX_WAIT: Duration = Duration::from_secs(20);

/// Exclusive runtime lock so only one process ever talks to the rate-limited
/// message store. Released on drop.
#[derive(Debug)]
pub struct InstanceGuard {
    file: File,
    path: PathBuf,
}

impl InstanceGuard {
    pub fn acquire(paths: &ResolvedPaths) -> Result<Self> {
        Self::acquire_at(&paths.data_dir.join(LOCK_FILENAME), MAX_WAIT)
    }

    fn acquire_at(lock_path: &Path, max_wait: Duration) -> Result<Self> {
        if let Some(parent) = lock_path.parent() {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to ensure lock dir {}", parent.display()))?;
        }

        let start = Instant::now();
        loop {
            let mut file = OpenOptions::new()
                .create(true)
                .truncate(false)
                .read(true)
                .write(true)
                .open(lock_path)
                .with_context(|| format!("failed to open lock file {}", lock_path.display()))?;

            match file.try_lock_exclusive() {
                Ok(()) => {
                    write_lock_info(&mut file, process::id())?;
                    tracing::info!(
                        target: "lifecycle",
                        pid = process::id(),
                        path = %lock_path.display(),
                        "acquired archiver runtime lock"
                    );
                    return Ok(Self {
                        file,
                        path: lock_path.to_path_buf(),
                    });
                }
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    let holder = read_lock_info(&mut file);
                    tracing::warn!(
                        target: "lifecycle",
                        holder_pid = holder.as_ref().map(|info| info.pid),
                        "another archiver instance holds the lock; waiting"
                    );
                }
                Err(err) => return Err(err.into()),
            }

            if start.elapsed() >= max_wait {
                return Err(anyhow!(
                    "another archiver instance is running; waited {:?}",
                    max_wait
                ));
            }

            drop(file);
            thread::sleep(WAIT_INTERVAL);
        }
    }
}

impl Drop for InstanceGuard {
    fn drop(&mut self) {
        let _ = self.file.unlock();
        if let Err(err) = fs::remove_file(&self.path) {
            if err.kind() != ErrorKind::NotFound {
                tracing::warn!(
                    target: "lifecycle",
                    path = %self.path.display(),
                    error = %err,
                    "failed to remove lock file on shutdown"
                );
            }
        }
    }
}

#[derive(Debug, Serialize, Deserialize)]
struct LockInfo {
    pid: u32,
    started_at: i64,
}

fn write_lock_info(file: &mut File, pid: u32) -> Result<()> {
    let info = LockInfo {
        pid,
        started_at: Utc::now().timestamp_millis(),
    };
    let payload = serde_json::to_vec(&info)?;
    file.set_len(0)?;
    file.seek(SeekFrom::Start(0))?;
    file.write_all(&payload)?;
    file.sync_all()?;
    Ok(())
}

fn read_lock_info(file: &mut File) -> Option<LockInfo> {
    let mut raw = String::new();
    file.seek(SeekFrom::Start(0)).ok()?;
    file.read_to_string(&mut raw).ok()?;
    serde_json::from_str(&raw).ok()
}
