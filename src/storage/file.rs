// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! File storage primitive: a typed wrapper over a single OS
//! file offering init/size/reader-at-offset/writer-at-offset/append/truncate,
//! with errors classified by [`crate::error::IoKind`].

use crate::error::{Error, Result};
use std::{
    fs::{self, File, OpenOptions},
    io::{Seek, SeekFrom},
    path::{Path, PathBuf},
};

/// A handle to a single file on disk, used as the foundation of every
/// on-disk sub-store (`.dat`, `.met`, `.idx`, `.vec`, `.tag`, `.grp`).
#[derive(Debug)]
pub struct FileStorage {
    path: PathBuf,
}

impl FileStorage {
    /// Wraps `path` without touching the filesystem.
    #[must_use]
    pub fn new<P: Into<PathBuf>>(path: P) -> Self {
        Self { path: path.into() }
    }

    /// Returns the wrapped path.
    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Ensures the file exists. If `create_empty` is set, an empty file is
    /// created when absent; an existing path that is a directory is always
    /// rejected.
    pub fn init(&self, create_empty: bool) -> Result<()> {
        match fs::metadata(&self.path) {
            Ok(meta) => {
                if meta.is_dir() {
                    return Err(Error::path_is_dir(&self.path));
                }
                Ok(())
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                if create_empty {
                    OpenOptions::new()
                        .write(true)
                        .create(true)
                        .truncate(false)
                        .open(&self.path)
                        .map_err(|e| Error::create(&self.path, e))?;
                }
                Ok(())
            }
            Err(e) => Err(Error::stat(&self.path, e)),
        }
    }

    /// Byte length of the file, or 0 if it does not exist.
    pub fn size(&self) -> Result<u64> {
        match fs::metadata(&self.path) {
            Ok(meta) => Ok(meta.len()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(0),
            Err(e) => Err(Error::stat(&self.path, e)),
        }
    }

    /// Opens a fresh read handle seeked to `offset`.
    pub fn reader(&self, offset: u64) -> Result<File> {
        let mut file = File::open(&self.path).map_err(|e| Error::read(&self.path, e))?;
        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::seek(&self.path, e))?;
        Ok(file)
    }

    /// Opens a write handle positioned for overwrite at `offset`, or for
    /// append when `offset` is negative.
    pub fn writer(&self, offset: i64) -> Result<File> {
        let mut file = OpenOptions::new()
            .write(true)
            .create(true)
            .open(&self.path)
            .map_err(|e| Error::write(&self.path, e))?;

        if offset < 0 {
            file.seek(SeekFrom::End(0))
                .map_err(|e| Error::seek(&self.path, e))?;
        } else {
            file.seek(SeekFrom::Start(offset as u64))
                .map_err(|e| Error::seek(&self.path, e))?;
        }

        Ok(file)
    }

    /// `writer(-1)`: a handle positioned for append at the current end of file.
    pub fn appender(&self) -> Result<File> {
        self.writer(-1)
    }

    /// Truncates the file's length to zero, tolerating non-existence.
    pub fn truncate(&self) -> Result<()> {
        match OpenOptions::new().write(true).truncate(true).open(&self.path) {
            Ok(_) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(Error::write(&self.path, e)),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::{Read, Write};
    use test_log::test;

    #[test]
    fn init_creates_empty_file() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.dat");
        let storage = FileStorage::new(&path);
        storage.init(true)?;
        assert_eq!(0, storage.size()?);
        Ok(())
    }

    #[test]
    fn init_rejects_directory() {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path());
        assert!(matches!(storage.init(true), Err(Error::Io { .. })));
    }

    #[test]
    fn size_of_missing_file_is_zero() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().join("missing.dat"));
        assert_eq!(0, storage.size()?);
        Ok(())
    }

    #[test]
    fn appender_appends_at_end() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().join("x.dat"));
        storage.init(true)?;

        storage.appender()?.write_all(b"hello")?;
        storage.appender()?.write_all(b"world")?;

        assert_eq!(10, storage.size()?);

        let mut buf = Vec::new();
        storage.reader(0)?.read_to_end(&mut buf)?;
        assert_eq!(b"helloworld".to_vec(), buf);

        Ok(())
    }

    #[test]
    fn writer_overwrites_at_offset() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().join("x.dat"));
        storage.init(true)?;
        storage.appender()?.write_all(b"abcdefgh")?;

        storage.writer(2)?.write_all(b"XY")?;

        let mut buf = Vec::new();
        storage.reader(0)?.read_to_end(&mut buf)?;
        assert_eq!(b"abXYefgh".to_vec(), buf);

        Ok(())
    }

    #[test]
    fn truncate_tolerates_missing_file() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().join("missing.dat"));
        storage.truncate()?;
        Ok(())
    }

    #[test]
    fn truncate_zeroes_existing_file() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let storage = FileStorage::new(dir.path().join("x.dat"));
        storage.init(true)?;
        storage.appender()?.write_all(b"data")?;
        assert_eq!(4, storage.size()?);

        storage.truncate()?;
        assert_eq!(0, storage.size()?);

        Ok(())
    }
}
