// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Fixed-width (`D * 4`-byte) append store backing `.vec`.

use super::file::FileStorage;
use crate::{
    bytes::{bytes_to_floats, floats_to_bytes},
    error::{Error, Result},
};
use std::{
    cell::RefCell,
    collections::HashSet,
    fs::File,
    io::{Read, Seek, SeekFrom, Write},
    path::{Path, PathBuf},
};

/// An `(index, vector)` pair yielded by [`VectorStore::iterate`].
pub type VectorEntry = (u64, Vec<f32>);

/// Fixed-dimension vector log with a bounded append buffer, in-place
/// replace, bulk delete-by-index-set, and chunked iteration.
pub struct VectorStore {
    storage: FileStorage,
    dimension: u32,
    /// Persisted element count.
    persisted: u64,
    /// Append buffer, as whole vectors (not yet flattened to bytes).
    buffer: Vec<Vec<f32>>,
    max_append_buffer: u64,
    max_buffer: u64,
    read_handle: RefCell<Option<File>>,
}

impl VectorStore {
    fn record_width(dimension: u32) -> u64 {
        u64::from(dimension) * 4
    }

    /// Opens (or creates) the vector store at `path`.
    pub fn open(
        path: impl Into<PathBuf>,
        dimension: u32,
        max_append_buffer: u64,
        max_buffer: u64,
    ) -> Result<Self> {
        let storage = FileStorage::new(path.into());
        storage.init(true)?;

        let width = Self::record_width(dimension).max(1);
        let persisted = storage.size()? / width;

        Ok(Self {
            storage,
            dimension,
            persisted,
            buffer: Vec::new(),
            max_append_buffer,
            max_buffer: max_buffer.max(1),
            read_handle: RefCell::new(None),
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    /// Total element count: persisted plus buffered.
    #[must_use]
    pub fn count(&self) -> u64 {
        self.persisted + self.buffer.len() as u64
    }

    /// Appends `v`, returning its assigned slot.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VectorDimensionMismatch`] if `v.len() != D`.
    pub fn append(&mut self, v: &[f32]) -> Result<u64> {
        if v.len() != self.dimension as usize {
            return Err(Error::VectorDimensionMismatch { expected: self.dimension, got: v.len() });
        }

        let slot = self.count();
        self.buffer.push(v.to_vec());

        if self.buffer.len() as u64 >= self.max_append_buffer {
            self.flush()?;
        }

        Ok(slot)
    }

    /// Returns an owned copy of the vector at slot `i`.
    pub fn get(&self, i: u64) -> Result<Vec<f32>> {
        if i >= self.count() {
            return Err(Error::invalid_offset(i as i64));
        }

        if i >= self.persisted {
            let idx = (i - self.persisted) as usize;
            return Ok(self.buffer[idx].clone());
        }

        let width = Self::record_width(self.dimension) as usize;

        let mut handle = self.read_handle.borrow_mut();
        if handle.is_none() {
            *handle = Some(self.storage.reader(0)?);
        }
        #[allow(clippy::unwrap_used)]
        let file = handle.as_mut().unwrap();

        file.seek(SeekFrom::Start(i * width as u64))
            .map_err(|e| Error::seek(self.path(), e))?;

        let mut buf = vec![0u8; width];
        file.read_exact(&mut buf).map_err(|e| Error::read(self.path(), e))?;

        Ok(bytes_to_floats(&buf))
    }

    /// Overwrites the vector at slot `i`.
    pub fn replace(&mut self, i: u64, v: &[f32]) -> Result<()> {
        if v.len() != self.dimension as usize {
            return Err(Error::VectorDimensionMismatch { expected: self.dimension, got: v.len() });
        }
        if i >= self.count() {
            return Err(Error::invalid_offset(i as i64));
        }

        if i < self.persisted {
            let width = Self::record_width(self.dimension);
            let mut writer = self.storage.writer((i * width) as i64)?;
            writer
                .write_all(&floats_to_bytes(v))
                .map_err(|e| Error::write(self.path(), e))?;
        } else {
            let idx = (i - self.persisted) as usize;
            self.buffer[idx] = v.to_vec();
            self.flush()?;
        }

        Ok(())
    }

    /// Flushes the append buffer to disk.
    pub fn flush(&mut self) -> Result<()> {
        if self.buffer.is_empty() {
            return Ok(());
        }

        let mut writer = self.storage.appender()?;
        for v in &self.buffer {
            writer
                .write_all(&floats_to_bytes(v))
                .map_err(|e| Error::append(self.path(), e))?;
        }

        self.persisted += self.buffer.len() as u64;
        self.buffer.clear();

        Ok(())
    }

    /// `true` iff the append buffer is empty.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        self.buffer.is_empty()
    }

    /// Truncates the store to zero elements.
    pub fn truncate(&mut self) -> Result<()> {
        self.storage.truncate()?;
        self.persisted = 0;
        self.buffer.clear();
        *self.read_handle.borrow_mut() = None;
        Ok(())
    }

    /// Flushes and drops the cached read handle.
    pub fn close(&mut self) -> Result<()> {
        self.flush()?;
        *self.read_handle.borrow_mut() = None;
        Ok(())
    }

    /// Flushes, reads the entire file, and writes back only the slots whose
    /// index is not in `indices`. `persisted` becomes the surviving count.
    pub fn delete(&mut self, indices: &HashSet<u64>) -> Result<()> {
        self.flush()?;

        let width = Self::record_width(self.dimension) as usize;
        let mut all = Vec::with_capacity((self.persisted as usize) * width);
        self.storage
            .reader(0)?
            .read_to_end(&mut all)
            .map_err(|e| Error::read(self.path(), e))?;

        let mut survivors = Vec::with_capacity(all.len());
        let mut kept = 0u64;

        for (slot, chunk) in all.chunks_exact(width).enumerate() {
            if !indices.contains(&(slot as u64)) {
                survivors.extend_from_slice(chunk);
                kept += 1;
            }
        }

        self.storage.truncate()?;
        self.storage
            .writer(0)?
            .write_all(&survivors)
            .map_err(|e| Error::write(self.path(), e))?;

        self.persisted = kept;
        *self.read_handle.borrow_mut() = None;

        Ok(())
    }

    /// Yields `(i, vector)` for every element: persisted elements first, in
    /// chunks of `max_buffer` vectors via a single sequential scan, then
    /// buffered elements.
    pub fn iterate(&mut self) -> Result<VectorStoreIter<'_>> {
        self.flush_read_handle_for_scan()?;
        Ok(VectorStoreIter {
            store: self,
            next_persisted: 0,
            chunk: Vec::new(),
            chunk_pos: 0,
            buffered_pos: 0,
            done_persisted: false,
        })
    }

    fn flush_read_handle_for_scan(&self) -> Result<()> {
        *self.read_handle.borrow_mut() = None;
        Ok(())
    }
}

/// Lending iterator over a [`VectorStore`]'s contents. Stops as soon as the
/// caller breaks out of the loop driving it.
pub struct VectorStoreIter<'a> {
    store: &'a VectorStore,
    next_persisted: u64,
    chunk: Vec<u8>,
    chunk_pos: usize,
    buffered_pos: usize,
    done_persisted: bool,
}

impl Iterator for VectorStoreIter<'_> {
    type Item = Result<VectorEntry>;

    fn next(&mut self) -> Option<Self::Item> {
        let width = VectorStore::record_width(self.store.dimension) as usize;

        if !self.done_persisted {
            if self.chunk_pos >= self.chunk.len() {
                if self.next_persisted >= self.store.persisted {
                    self.done_persisted = true;
                } else {
                    let remaining = self.store.persisted - self.next_persisted;
                    let take = remaining.min(self.store.max_buffer);

                    let mut reader = match self.store.storage.reader(self.next_persisted * width as u64) {
                        Ok(r) => r,
                        Err(e) => return Some(Err(e)),
                    };

                    let mut buf = vec![0u8; take as usize * width];
                    if let Err(e) = reader.read_exact(&mut buf) {
                        return Some(Err(Error::read(self.store.path(), e)));
                    }

                    self.chunk = buf;
                    self.chunk_pos = 0;
                }
            }

            if !self.done_persisted {
                let idx = self.next_persisted;
                let bytes = &self.chunk[self.chunk_pos..self.chunk_pos + width];
                self.chunk_pos += width;
                self.next_persisted += 1;
                return Some(Ok((idx, bytes_to_floats(bytes))));
            }
        }

        if self.buffered_pos < self.store.buffer.len() {
            let idx = self.store.persisted + self.buffered_pos as u64;
            let v = self.store.buffer[self.buffered_pos].clone();
            self.buffered_pos += 1;
            return Some(Ok((idx, v)));
        }

        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    fn open(dim: u32, max_append: u64) -> (tempfile::TempDir, VectorStore) {
        let dir = tempfile::tempdir().expect("tempdir");
        let store = VectorStore::open(dir.path().join("x.vec"), dim, max_append, 2).expect("open");
        (dir, store)
    }

    #[test]
    fn append_rejects_wrong_dimension() {
        let (_dir, mut store) = open(3, 64);
        assert!(matches!(
            store.append(&[1.0, 2.0]),
            Err(Error::VectorDimensionMismatch { expected: 3, got: 2 })
        ));
    }

    #[test]
    fn append_then_get_from_buffer_and_disk() -> Result<()> {
        let (_dir, mut store) = open(2, 1);
        let slot0 = store.append(&[1.0, 2.0])?;
        assert!(store.is_persisted());
        assert_eq!(vec![1.0, 2.0], store.get(slot0)?);

        let (_dir2, mut store2) = open(2, 64);
        let slot = store2.append(&[1.0, 2.0])?;
        assert!(!store2.is_persisted());
        assert_eq!(vec![1.0, 2.0], store2.get(slot)?);

        Ok(())
    }

    #[test]
    fn replace_persisted_in_place() -> Result<()> {
        let (_dir, mut store) = open(2, 1);
        let slot = store.append(&[1.0, 2.0])?;
        store.replace(slot, &[9.0, 9.0])?;
        assert_eq!(vec![9.0, 9.0], store.get(slot)?);
        Ok(())
    }

    #[test]
    fn replace_buffered_flushes() -> Result<()> {
        let (_dir, mut store) = open(2, 64);
        let slot = store.append(&[1.0, 2.0])?;
        store.replace(slot, &[9.0, 9.0])?;
        assert!(store.is_persisted());
        assert_eq!(vec![9.0, 9.0], store.get(slot)?);
        Ok(())
    }

    #[test]
    fn delete_compacts_and_renumbers() -> Result<()> {
        let (_dir, mut store) = open(1, 1);
        store.append(&[0.0])?;
        store.append(&[1.0])?;
        store.append(&[2.0])?;
        store.append(&[3.0])?;

        let mut to_delete = HashSet::new();
        to_delete.insert(1);
        to_delete.insert(2);
        store.delete(&to_delete)?;

        assert_eq!(2, store.count());
        assert_eq!(vec![0.0], store.get(0)?);
        assert_eq!(vec![3.0], store.get(1)?);

        Ok(())
    }

    #[test]
    fn iterate_yields_all_in_order() -> Result<()> {
        let (_dir, mut store) = open(1, 1);
        store.append(&[0.0])?;
        store.append(&[1.0])?;
        store.append(&[2.0])?;

        let collected: Result<Vec<_>> = store.iterate()?.collect();
        let collected = collected?;
        assert_eq!(vec![(0, vec![0.0]), (1, vec![1.0]), (2, vec![2.0])], collected);

        Ok(())
    }

    #[test]
    fn iterate_stops_when_caller_breaks() -> Result<()> {
        let (_dir, mut store) = open(1, 1);
        for i in 0..10 {
            store.append(&[i as f32])?;
        }

        let mut seen = Vec::new();
        for item in store.iterate()? {
            let (i, v) = item?;
            seen.push((i, v));
            if seen.len() == 3 {
                break;
            }
        }

        assert_eq!(3, seen.len());
        Ok(())
    }
}
