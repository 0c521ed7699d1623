//! Exclusive lock on the shared configuration directory.
//!
//! Registrations read `server.conf`, pick the next address and write it back;
//! two of them interleaving would hand out the same IP. Every mutating
//! operation therefore runs while holding a [`ConfigDirLock`].
//!
//! The lock is advisory (`flock` on Unix, `LockFileEx` on Windows) and is
//! released when the guard drops or the process dies. Acquisition polls with
//! a deadline instead of blocking forever, so a wedged holder produces an
//! [`Error::LockTimeout`] rather than a hang.

use crate::error::{Error, Result};
use fs2::FileExt;
use log::{debug, info, warn};
use std::{
    fs::{File, OpenOptions},
    io,
    path::{Path, PathBuf},
    thread,
    time::{Duration, Instant},
};

const POLL_INTERVAL: Duration = Duration::from_millis(100);

pub struct ConfigDirLock {
    file: File,
    path: PathBuf,
}

impl ConfigDirLock {
    /// Acquires the lock at `lock_path`, waiting at most `timeout`.
    ///
    /// # Errors
    ///
    /// - [`Error::Io`] if the lock file cannot be opened or locking fails for
    ///   a reason other than contention.
    /// - [`Error::LockTimeout`] if another holder keeps it past `timeout`.
    pub fn acquire(lock_path: &Path, timeout: Duration) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(lock_path)
            .map_err(Error::io(lock_path))?;

        let started = Instant::now();
        let mut announced = false;
        loop {
            match file.try_lock_exclusive() {
                Ok(()) => {
                    debug!("acquired {} after {:?}", lock_path.display(), started.elapsed());
                    return Ok(Self { file, path: lock_path.to_path_buf() });
                }
                Err(e) if is_contended(&e) => {
                    let waited = started.elapsed();
                    if waited >= timeout {
                        return Err(Error::LockTimeout { path: lock_path.to_path_buf(), waited });
                    }
                    if !announced {
                        info!("waiting for another registration to release {}", lock_path.display());
                        announced = true;
                    }
                    thread::sleep(POLL_INTERVAL.min(timeout - waited));
                }
                Err(e) => return Err(Error::Io { path: lock_path.to_path_buf(), source: e }),
            }
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }
}

fn is_contended(e: &io::Error) -> bool {
    e.kind() == io::ErrorKind::WouldBlock
        || e.raw_os_error() == fs2::lock_contended_error().raw_os_error()
}

impl Drop for ConfigDirLock {
    fn drop(&mut self) {
        if let Err(e) = FileExt::unlock(&self.file) {
            warn!("failed to release {}: {}", self.path.display(), e);
        } else {
            debug!("released {}", self.path.display());
        }
    }
}
