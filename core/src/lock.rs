//! Per-host run lock.
//!
//! Two runs against the same host would reset each other's remote working
//! tree. An exclusive `flock` on `<cache>/<host>.lock` serialises them.

use std::fs::File;
use std::io::Write;
use std::os::unix::io::AsRawFd;
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};

use tracing::debug;

use crate::error::{CdistError, Result};


/// Held for the duration of a run; the lock is released on drop.
#[derive(Debug)]
pub struct RunLock {
    file: File,
    path: PathBuf,
}


impl RunLock {
    /// Take the lock at `path`, polling until `timeout_ms` has passed.
    pub fn acquire(path: &Path, timeout_ms: u64) -> Result<Self> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| CdistError::io(parent, e))?;
        }
        let file = std::fs::OpenOptions::new()
            .create(true)
            .truncate(false)
            .write(true)
            .open(path)
            .map_err(|e| CdistError::io(path, e))?;

        let fd = file.as_raw_fd();
        let deadline = Instant::now() + Duration::from_millis(timeout_ms);
        loop {
            let ret = unsafe { libc::flock(fd, libc::LOCK_EX | libc::LOCK_NB) };
            if ret == 0 {
                break;
            }
            if Instant::now() >= deadline {
                return Err(CdistError::Lock(format!(
                    "another run holds {} (waited {}ms)",
                    path.display(),
                    timeout_ms
                )));
            }
            std::thread::sleep(Duration::from_millis(50));
        }

        let mut lock = RunLock {
            file,
            path: path.to_path_buf(),
        };
        lock.write_owner()?;
        debug!(lock = %path.display(), "run lock acquired");
        Ok(lock)
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn write_owner(&mut self) -> Result<()> {
        self.file
            .set_len(0)
            .and_then(|_| writeln!(self.file, "{}", std::process::id()))
            .map_err(|e| CdistError::io(&self.path, e))
    }
}


impl Drop for RunLock {
    fn drop(&mut self) {
        unsafe {
            libc::flock(self.file.as_raw_fd(), libc::LOCK_UN);
        }
    }
}
