use std::fs::{self, File};
use std::io::Write;
use std::path::Path;
use std::time::SystemTime;
use tracing::debug;
use crate::core::error::Result;

/// Replace `target` with `data` so that readers see either the old or the new
/// contents, never a prefix.
///
/// `data` goes to `tmp` first, is fsynced, then renamed over `target`.
/// Returns the modification time of the replaced file.
pub fn write_atomic(target: &Path, tmp: &Path, data: &[u8]) -> Result<SystemTime> {
    let staged = File::create(tmp).and_then(|mut file| {
        file.write_all(data)?;
        file.flush()?;
        file.sync_all()
    });

    if let Err(err) = staged.and_then(|()| fs::rename(tmp, target)) {
        let _ = fs::remove_file(tmp);
        return Err(err.into());
    }

    sync_parent_dir(target);

    Ok(fs::metadata(target)?.modified()?)
}

// Persist the rename itself. Not every filesystem allows fsync on a directory.
#[cfg(unix)]
fn sync_parent_dir(target: &Path) {
    if let Some(parent) = target.parent() {
        let synced = File::open(parent).and_then(|dir| dir.sync_all());
        if let Err(err) = synced {
            debug!(dir = %parent.display(), error = %err, "directory fsync skipped");
        }
    }
}

#[cfg(not(unix))]
fn sync_parent_dir(_target: &Path) {}
