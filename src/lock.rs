// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Inter-process exclusion: a `.lock` sentinel file in the
//! collection directory, held with a non-blocking exclusive advisory lock
//! for the lifetime of an open dataset.

use crate::error::{Error, Result};
use fs4::FileExt;
use std::{
    fs::{File, OpenOptions},
    path::{Path, PathBuf},
};

/// Holds the exclusive advisory lock on a dataset's `.lock` file.
///
/// The lock is released when this value is dropped or when [`DatasetLock::close`]
/// is called explicitly (idempotent after the first call).
pub struct DatasetLock {
    file: Option<File>,
    path: PathBuf,
}

impl DatasetLock {
    /// Opens (creating if necessary) `<dir>/.lock` and attempts to acquire a
    /// non-blocking exclusive lock. Returns [`Error::Locked`] if another
    /// process already holds it.
    pub fn acquire(dir: &Path) -> Result<Self> {
        let path = dir.join(".lock");

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .create(true)
            .open(&path)
            .map_err(|e| Error::create(&path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => Ok(Self { file: Some(file), path }),
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Err(Error::Locked),
            Err(e) => Err(Error::write(&path, e)),
        }
    }

    /// Releases the lock and closes the file handle. A second call is a no-op.
    pub fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            file.unlock().map_err(|e| Error::write(&self.path, e))?;
        }
        Ok(())
    }

    /// Probes whether a dataset directory is currently locked by another
    /// process, without holding the lock afterwards.
    pub fn is_locked(dir: &Path) -> Result<bool> {
        let path = dir.join(".lock");

        if !path.exists() {
            return Ok(false);
        }

        let file = OpenOptions::new()
            .read(true)
            .write(true)
            .open(&path)
            .map_err(|e| Error::read(&path, e))?;

        match file.try_lock_exclusive() {
            Ok(()) => {
                file.unlock().map_err(|e| Error::write(&path, e))?;
                Ok(false)
            }
            Err(e) if e.kind() == std::io::ErrorKind::WouldBlock => Ok(true),
            Err(e) => Err(Error::write(&path, e)),
        }
    }
}

impl Drop for DatasetLock {
    fn drop(&mut self) {
        let _ = self.close();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn second_open_is_locked() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let _first = DatasetLock::acquire(dir.path())?;
        assert!(matches!(DatasetLock::acquire(dir.path()), Err(Error::Locked)));
        Ok(())
    }

    #[test]
    fn close_then_reopen_succeeds() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let mut first = DatasetLock::acquire(dir.path())?;
        first.close()?;
        let _second = DatasetLock::acquire(dir.path())?;
        Ok(())
    }

    #[test]
    fn probe_reports_lock_state() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        assert!(!DatasetLock::is_locked(dir.path())?);

        let _guard = DatasetLock::acquire(dir.path())?;
        assert!(DatasetLock::is_locked(dir.path())?);

        Ok(())
    }
}
