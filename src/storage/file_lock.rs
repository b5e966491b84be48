use std::fs::{File, OpenOptions};
use std::path::Path;
use crate::core::error::{Error, ErrorKind, Result};

/// Advisory cross-process writer lock backed by a marker file.
///
/// The lock is held for as long as the value lives. A process that dies while
/// holding it releases the `flock` with its descriptors; the marker file itself
/// is left behind and is harmless.
#[derive(Debug)]
pub struct FileLock {
    pub file: File,
}

impl FileLock {
    /// Block until the exclusive lock is acquired. No timeout.
    pub fn acquire(lock_path: &Path) -> Result<Self> {
        let file = open_marker(lock_path)?;
        lock_exclusive(&file, false).map_err(|e| lock_error(lock_path, e))?;
        Ok(FileLock { file })
    }

    /// Non-blocking attempt. `Ok(None)` when another holder has the lock.
    pub fn try_acquire(lock_path: &Path) -> Result<Option<Self>> {
        let file = open_marker(lock_path)?;
        match lock_exclusive(&file, true) {
            Ok(()) => Ok(Some(FileLock { file })),
            Err(err) if err.kind() == std::io::ErrorKind::WouldBlock => Ok(None),
            Err(err) => Err(lock_error(lock_path, err)),
        }
    }
}

fn open_marker(lock_path: &Path) -> Result<File> {
    OpenOptions::new()
        .create(true)
        .truncate(false)
        .write(true)
        .open(lock_path)
        .map_err(|e| lock_error(lock_path, e))
}

fn lock_error(lock_path: &Path, err: std::io::Error) -> Error {
    Error::new(
        ErrorKind::Io,
        format!("failed to acquire lock {}: {}", lock_path.display(), err),
    )
}

#[cfg(unix)]
fn lock_exclusive(file: &File, non_blocking: bool) -> std::io::Result<()> {
    use std::os::unix::io::AsRawFd;
    use libc::{flock, LOCK_EX, LOCK_NB};

    let fd = file.as_raw_fd();
    let operation = if non_blocking { LOCK_EX | LOCK_NB } else { LOCK_EX };

    loop {
        if unsafe { flock(fd, operation) } == 0 {
            return Ok(());
        }
        let err = std::io::Error::last_os_error();
        if err.kind() != std::io::ErrorKind::Interrupted {
            return Err(err);
        }
    }
}

#[cfg(not(unix))]
fn lock_exclusive(_file: &File, _non_blocking: bool) -> std::io::Result<()> {
    Ok(())
}

impl Drop for FileLock {
    fn drop(&mut self) {
        #[cfg(unix)]
        {
            use std::os::unix::io::AsRawFd;
            use libc::{flock, LOCK_UN};

            let fd = self.file.as_raw_fd();
            unsafe {
                flock(fd, LOCK_UN);
            }
        }
    }
}
