/// Named cross-process exclusive flag backed by an advisory file lock.
///
/// Acquisition is a single non-blocking `try_lock` on the lock file, so two
/// processes starting at the same moment cannot both succeed. The OS drops the
/// lock when the holding process exits or crashes; the file itself is left in
/// place and simply re-locked by the next primary.
use std::fs::{File, OpenOptions, TryLockError};
use std::io::{self, Read, Seek, SeekFrom, Write};
use std::path::{Path, PathBuf};

#[derive(Debug)]
pub struct InstanceLock {
    file: File,
    path: PathBuf,
}

impl InstanceLock {
    /// Creates (if needed) and exclusively locks the file at `path`.
    ///
    /// Returns `Ok(None)` when another process already holds the lock and
    /// `Err` for anything else (missing permissions, unusable directory).
    pub fn try_acquire(path: &Path) -> io::Result<Option<Self>> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .truncate(false)
            .open(path)?;

        match file.try_lock() {
            Ok(()) => {}
            Err(TryLockError::WouldBlock) => return Ok(None),
            Err(TryLockError::Error(e)) => return Err(e),
        }

        let mut lock = Self {
            file,
            path: path.to_path_buf(),
        };
        // The pid is informational; failing to record it must not cost us the lock.
        if let Err(e) = lock.record_pid() {
            log::warn!("Failed to record pid in {}: {e}", lock.path.display());
        }
        Ok(Some(lock))
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn record_pid(&mut self) -> io::Result<()> {
        self.file.set_len(0)?;
        self.file.seek(SeekFrom::Start(0))?;
        write!(self.file, "{}", std::process::id())?;
        self.file.flush()
    }
}

/// Reads the pid recorded by the current holder of the lock at `path`.
///
/// Best effort: Windows refuses reads of a locked region, and a holder may
/// not have written its pid yet.
pub fn holder_pid(path: &Path) -> Option<u32> {
    let mut content = String::new();
    File::open(path).ok()?.read_to_string(&mut content).ok()?;
    content.trim().parse().ok()
}
