// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Append-only byte log used by both `.dat` and `.met`.

use super::file::FileStorage;
use crate::error::{Error, Result};
use std::{
    cell::RefCell,
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// Sentinel `(offset, size)` returned by [`DataLog::append`] for empty input.
pub const EMPTY_SENTINEL: (i64, i64) = (-1, 0);

/// An append-only byte log with a bounded in-memory append buffer.
///
/// Backs both `.dat` and `.met`: the dataset orchestrator owns one instance
/// of each.
pub struct DataLog {
    storage: FileStorage,
    /// Persisted byte count.
    persisted: u64,
    /// In-memory append buffer.
    buffer: Vec<u8>,
    /// Start offset (within the logical file) of each buffered record.
    buffered_offsets: Vec<u64>,
    /// Flush threshold, in bytes. 0 forces every write straight to disk.
    threshold: u64,
    /// Lazily-opened, cached read handle — never closed until `close`.
    read_handle: RefCell<Option<File>>,
}

impl DataLog {
    /// Opens (or creates) the log at `path` with the given flush threshold.
    pub fn open(path: impl Into<PathBuf>, threshold: u64) -> Result<Self> {
        let storage = FileStorage::new(path.into());
        storage.init(true)?;
        let persisted = storage.size()?;

        Ok(Self {
            storage,
            persisted,
            buffer: Vec::new(),
            buffered_offsets: Vec::new(),
            threshold,
            read_handle: RefCell::new(None),
        })
    }

    /// The logical length of the log: persisted bytes plus buffered bytes.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.persisted + self.buffer.len() as u64
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    /// Appends `bytes`, returning the `(offset, size)` at which it was
    /// stored. Empty input is a no-op that returns [`EMPTY_SENTINEL`].
    pub fn append(&mut self, bytes: &[u8]) -> Result<(i64, i64)> {
        if bytes.is_empty() {
            return Ok(EMPTY_SENTINEL);
        }

        let would_overflow = self.buffer.len() as u64 + bytes.len() as u64 > self.threshold;

        if would_overflow {
            self.flush()?;
        }

        let offset = self.persisted + self.buffer.len() as u64;

        // Bypass the buffer entirely for a record that wouldn't fit even
        // in an empty buffer, or when buffering is disabled (threshold 0).
        if bytes.len() as u64 > self.threshold {
            log::trace!("{}: record of {} bytes bypasses append buffer", self.path().display(), bytes.len());

            let mut writer = self.storage.appender()?;
            writer
                .write_all(bytes)
                .map_err(|e| Error::append(self.path(), e))?;
            self.persisted += bytes.len() as u64;

            return Ok((offset as i64, bytes.len() as i64));
        }

        self.buffered_offsets.push(offset);
        self.buffer.extend_from_slice(bytes);

        Ok((offset as i64, bytes.len() as i64))
    }

    /// Reads exactly `length` bytes starting at `offset`. `offset < 0`
    /// returns an empty vector.
    pub fn read(&self, offset: i64, length: usize) -> Result<Vec<u8>> {
        if offset < 0 || length == 0 {
            return Ok(Vec::new());
        }

        let offset = offset as u64;

        if offset >= self.persisted {
            let start = (offset - self.persisted) as usize;
            let end = start + length;
            return self
                .buffer
                .get(start..end)
                .map(<[u8]>::to_vec)
                .ok_or_else(|| Error::invalid_offset(offset as i64));
        }

        let mut handle = self.read_handle.borrow_mut();
        if handle.is_none() {
            *handle = Some(self.storage.reader(0)?);
        }
        #[allow(clippy::unwrap_used)]
        let file = handle.as_mut().unwrap();

        file.seek(SeekFrom::Start(offset))
            .map_err(|e| Error::seek(self.path(), e))?;

        let mut buf = vec![0u8; length];
        file.read_exact(&mut buf)
            .map_err(|e| Error::read(self.path(), e))?;

        Ok(buf)
    }

    /// Overwrites `offset..offset+bytes.len()` with `bytes`. Never extends
    /// the logical length: callers must ensure the replacement fits inside
    /// the existing record's span.
    pub fn replace(&mut self, bytes: &[u8], offset: i64) -> Result<()> {
        if offset < 0 || offset as u64 > self.len() {
            return Err(Error::invalid_offset(offset));
        }

        let offset = offset as u64;
        let fits_in_buffer = offset >= self.persisted
            && (offset - self.persisted) as usize + bytes.len() <= self.buffer.len();

        if fits_in_buffer {
            let start = (offset - self.persisted) as usize;
            self.buffer[start..start + bytes.len()].copy_from_slice(bytes);
            return Ok(());
        }

        self.flush()?;

        let mut writer = self.storage.writer(offset as i64)?;
        writer
            .write_all(bytes)
            .map_err(|e| Error::write(self.path(), e))?;

        Ok(())
    }

    /// Appends the buffer to disk and clears it. No-op if the buffer is empty.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        log::trace!("{}: flushing {} buffered bytes", self.path().display(), self.buffer.len());

        let mut writer = self.storage.appender()?;
        writer
            .write_all(&self.buffer)
            .map_err(|e| Error::append(self.path(), e))?;

        self.persisted += self.buffer.len() as u64;
        self.buffer.clear();
        self.buffered_offsets.clear();

        Ok(())
    }

    /// Truncates the log to zero length, discarding any buffered data.
    pub fn truncate(&mut self) -> Result<()> {
        self.storage.truncate()?;
        self.persisted = 0;
        self.buffer.clear();
        self.buffered_offsets.clear();
        *self.read_handle.borrow_mut() = None;
        Ok(())
    }

    /// `true` iff the append buffer is empty.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Flushes, then drops the cached read handle.
    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        *self.read_handle.borrow_mut() = None;
        Ok(())
    }

    /// Reads the entire logical content of the log into memory. Used by
    /// `Dataset::optimize` to rebuild `.dat`/`.met`.
    pub fn read_all(&mut self) -> Result<Vec<u8>> {
        self.flush()?;
        let mut buf = Vec::with_capacity(self.persisted as usize);
        self.storage
            .reader(0)?
            .read_to_end(&mut buf)
            .map_err(|e| Error::read(self.path(), e))?;
        Ok(buf)
    }
}
