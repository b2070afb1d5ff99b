// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Fixed-width row file backing `.idx`, with a fully materialized in-memory
//! mirror.

use super::file::FileStorage;
use crate::{
    error::{Error, Result},
    record::{IndexRow, INDEX_ROW_WIDTH, MARKED_FOR_REMOVAL},
};
use std::{
    io::{Read, Write},
    path::{Path, PathBuf},
};

/// The index's in-memory mirror `R`, plus the append-buffer bookkeeping
/// needed to flush only the unsaved tail.
pub struct IndexStore {
    storage: FileStorage,
    rows: Vec<IndexRow>,
    /// Persisted row count. `rows[..persisted]` is always on disk already.
    persisted: u64,
    threshold: u64,
}

impl IndexStore {
    /// Opens (or creates) the index at `path`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexStorageCorrupted`] if the file size is not a
    /// multiple of [`INDEX_ROW_WIDTH`].
    pub fn open(path: impl Into<PathBuf>, threshold: u64) -> Result<Self> {
        let storage = FileStorage::new(path.into());
        storage.init(true)?;

        let size = storage.size()?;
        if size % INDEX_ROW_WIDTH as u64 != 0 {
            return Err(Error::IndexStorageCorrupted);
        }

        let mut rows = Vec::with_capacity((size / INDEX_ROW_WIDTH as u64) as usize);
        let mut buf = vec![0u8; size as usize];
        storage.reader(0)?.read_exact(&mut buf).map_err(|e| Error::read(storage.path(), e))?;

        for chunk in buf.chunks_exact(INDEX_ROW_WIDTH) {
            #[allow(clippy::unwrap_used)]
            let array: [u8; INDEX_ROW_WIDTH] = chunk.try_into().unwrap();
            rows.push(IndexRow::decode(&array));
        }

        let persisted = rows.len() as u64;

        Ok(Self { storage, rows, persisted, threshold })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    /// Total row count.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.rows.len() as u64
    }

    /// `true` iff every row in memory has been written to disk.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.persisted == self.rows.len() as u64
    }

    /// Appends `row`, returning its position.
    pub fn append(&mut self, row: IndexRow) -> Result<u64> {
        let pos = self.rows.len() as u64;
        self.rows.push(row);

        let unsaved = self.rows.len() as u64 - self.persisted;
        if self.threshold == 0 || unsaved >= self.threshold {
            self.flush()?;
        }

        Ok(pos)
    }

    /// Returns a copy of row `i`.
    pub fn get(&self, i: u64) -> Result<IndexRow> {
        self.rows
            .get(i as usize)
            .copied()
            .ok_or(Error::IndexOutOfRange { id: i, count: self.count() })
    }

    /// Overwrites row `i` in memory, and on disk if it was already persisted;
    /// otherwise flushes the buffered tail.
    pub fn replace(&mut self, i: u64, row: IndexRow) -> Result<()> {
        if i as usize >= self.rows.len() {
            return Err(Error::IndexOutOfRange { id: i, count: self.count() });
        }

        self.rows[i as usize] = row;

        if i < self.persisted {
            let mut writer = self.storage.writer((i * INDEX_ROW_WIDTH as u64) as i64)?;
            writer.write_all(&row.encode()).map_err(|e| Error::write(self.path(), e))?;
            Ok(())
        } else {
            self.flush()
        }
    }

    /// Sets `mask` bits in row `i`'s flags (bitwise OR), then persists it.
    pub fn set_flags(&mut self, i: u64, mask: u8) -> Result<()> {
        let mut row = self.get(i)?;
        row.flags |= mask;
        self.replace(i, row)
    }

    /// Clears `mask` bits in row `i`'s flags (bitwise AND-NOT), then persists it.
    pub fn reset_flags(&mut self, i: u64, mask: u8) -> Result<()> {
        let mut row = self.get(i)?;
        row.flags &= !mask;
        self.replace(i, row)
    }

    /// Rebuilds `R` keeping only non-removed rows, in their original relative
    /// order, and flushes the compacted result.
    ///
    /// Returns the old-index → new-index map for surviving rows, for callers
    /// that need to translate tag/group references.
    pub fn optimise(&mut self) -> Result<Vec<(u64, u64)>> {
        let mut survivors = Vec::with_capacity(self.rows.len());
        let mut mapping = Vec::new();

        for (old_idx, row) in self.rows.iter().enumerate() {
            if row.flags & MARKED_FOR_REMOVAL == 0 {
                mapping.push((old_idx as u64, survivors.len() as u64));
                survivors.push(*row);
            }
        }

        self.rows = survivors;
        self.persisted = 0;
        self.storage.truncate()?;
        self.flush()?;

        Ok(mapping)
    }

    /// Flushes the unsaved tail (`rows[persisted..]`) to disk.
    pub fn flush(&mut self) -> Result<()> {
        if self.is_persisted() {
            return Ok(());
        }

        log::trace!("{}: flushing {} unsaved index rows", self.path().display(), self.rows.len() as u64 - self.persisted);

        let mut writer = self.storage.appender()?;
        for row in &self.rows[self.persisted as usize..] {
            writer.write_all(&row.encode()).map_err(|e| Error::append(self.path(), e))?;
        }

        self.persisted = self.rows.len() as u64;
        Ok(())
    }

    /// Truncates the index to zero rows.
    pub fn truncate(&mut self) -> Result<()> {
        self.storage.truncate()?;
        self.rows.clear();
        self.persisted = 0;
        Ok(())
    }

    /// Flushes.
    pub fn close(&mut self) -> Result<()> {
        self.flush()
    }

    /// Yields `(i, &row)` for every row, in id order.
    pub fn iterate(&self) -> impl Iterator<Item = (u64, &IndexRow)> {
        self.rows.iter().enumerate().map(|(i, row)| (i as u64, row))
    }
}
