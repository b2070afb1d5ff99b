// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Bidirectional tag<->id map backing `.tag`, lazily loaded, whole-file
//! rewrite on flush.

use super::file::FileStorage;
use crate::{
    bytes::{read_i64, write_i64},
    error::{Error, Result},
};
use std::{
    collections::BTreeMap,
    io::{Read, Write},
    path::{Path, PathBuf},
};

/// The forward map (lowercased tag -> ordered ids) and its reverse (id ->
/// ordered tags), lazily materialized from a single on-disk encoding of the
/// forward map.
pub struct TagStore {
    storage: FileStorage,
    forward: BTreeMap<String, Vec<u64>>,
    reverse: BTreeMap<u64, Vec<String>>,
    dirty: bool,
    loaded: bool,
}

impl TagStore {
    /// Wraps (but does not yet load) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let storage = FileStorage::new(path.into());
        storage.init(true)?;

        Ok(Self {
            storage,
            forward: BTreeMap::new(),
            reverse: BTreeMap::new(),
            dirty: false,
            loaded: false,
        })
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        self.storage.path()
    }

    fn ensure_loaded(&mut self) -> Result<()> {
        if self.loaded {
            return Ok(());
        }

        log::trace!("{}: lazily loading tag store", self.path().display());

        let size = self.storage.size()?;
        let mut buf = vec![0u8; size as usize];
        self.storage.reader(0)?.read_exact(&mut buf).map_err(|e| Error::read(self.path(), e))?;

        self.forward = decode_forward_map(&buf);
        self.reverse = BTreeMap::new();
        for (tag, ids) in &self.forward {
            for &id in ids {
                self.reverse.entry(id).or_default().push(tag.clone());
            }
        }

        self.loaded = true;
        Ok(())
    }

    /// Adds `tag` to `id`. Trims whitespace and lowercases before storing.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DuplicatedTag`] if `id` already carries this tag, or
    /// [`Error::ConfigInvalid`] if the trimmed tag is empty.
    pub fn add(&mut self, id: u64, tag: &str) -> Result<()> {
        self.ensure_loaded()?;

        let tag = tag.trim().to_lowercase();
        if tag.is_empty() {
            return Err(Error::ConfigInvalid("tag must not be empty".into()));
        }

        let ids = self.forward.entry(tag.clone()).or_default();
        if ids.contains(&id) {
            return Err(Error::DuplicatedTag);
        }
        ids.push(id);
        self.reverse.entry(id).or_default().push(tag);
        self.dirty = true;

        Ok(())
    }

    /// Removes `tag` from `id`. Drops the tag entirely once no id carries it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::TagNotFound`] if `id` does not carry `tag`.
    pub fn remove(&mut self, id: u64, tag: &str) -> Result<()> {
        self.ensure_loaded()?;

        let tag = tag.trim().to_lowercase();

        let Some(ids) = self.forward.get_mut(&tag) else {
            return Err(Error::TagNotFound);
        };
        let Some(pos) = ids.iter().position(|&x| x == id) else {
            return Err(Error::TagNotFound);
        };
        ids.remove(pos);
        if ids.is_empty() {
            self.forward.remove(&tag);
        }

        if let Some(tags) = self.reverse.get_mut(&id) {
            tags.retain(|t| t != &tag);
            if tags.is_empty() {
                self.reverse.remove(&id);
            }
        }

        self.dirty = true;
        Ok(())
    }

    /// Removes every tag from `id`.
    pub fn remove_all(&mut self, id: u64) -> Result<()> {
        self.ensure_loaded()?;

        if let Some(tags) = self.reverse.remove(&id) {
            for tag in tags {
                if let Some(ids) = self.forward.get_mut(&tag) {
                    ids.retain(|&x| x != id);
                    if ids.is_empty() {
                        self.forward.remove(&tag);
                    }
                }
            }
            self.dirty = true;
        }

        Ok(())
    }

    /// Ids carrying `tag`, as a defensive copy.
    pub fn get_ids(&mut self, tag: &str) -> Result<Vec<u64>> {
        self.ensure_loaded()?;
        let tag = tag.trim().to_lowercase();
        Ok(self.forward.get(&tag).cloned().unwrap_or_default())
    }

    /// Tags carried by `id`, as a defensive copy.
    pub fn get_tags(&mut self, id: u64) -> Result<Vec<String>> {
        self.ensure_loaded()?;
        Ok(self.reverse.get(&id).cloned().unwrap_or_default())
    }

    /// Every distinct tag currently in use.
    pub fn get_all_tags(&mut self) -> Result<Vec<String>> {
        self.ensure_loaded()?;
        Ok(self.forward.keys().cloned().collect())
    }

    /// Number of ids carrying at least one tag.
    pub fn count(&mut self) -> Result<u64> {
        self.ensure_loaded()?;
        Ok(self.reverse.len() as u64)
    }

    /// Tag -> number of ids carrying it.
    pub fn get_tag_counts(&mut self) -> Result<BTreeMap<String, u64>> {
        self.ensure_loaded()?;
        Ok(self.forward.iter().map(|(tag, ids)| (tag.clone(), ids.len() as u64)).collect())
    }

    /// `true` iff there are no unwritten changes since the last flush.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !self.dirty
    }

    /// Rewrites the whole file from the in-memory forward map, if dirty.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        log::trace!("{}: rewriting tag store ({} tags)", self.path().display(), self.forward.len());

        let encoded = encode_forward_map(&self.forward);
        self.storage.truncate()?;
        self.storage.writer(0)?.write_all(&encoded).map_err(|e| Error::write(self.path(), e))?;

        self.dirty = false;
        Ok(())
    }

    /// Clears everything, in memory and on disk.
    pub fn truncate(&mut self) -> Result<()> {
        self.storage.truncate()?;
        self.forward.clear();
        self.reverse.clear();
        self.loaded = true;
        self.dirty = false;
        Ok(())
    }

    /// Flushes.
    pub fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

/// Length-prefixed encoding: `tag_count`, then per tag `tag_len, tag_bytes,
/// id_count, id*`.
fn encode_forward_map(map: &BTreeMap<String, Vec<u64>>) -> Vec<u8> {
    let mut out = Vec::new();
    write_i64(&mut out, map.len() as i64);

    for (tag, ids) in map {
        let bytes = tag.as_bytes();
        write_i64(&mut out, bytes.len() as i64);
        out.extend_from_slice(bytes);
        write_i64(&mut out, ids.len() as i64);
        for &id in ids {
            write_i64(&mut out, id as i64);
        }
    }

    out
}

fn decode_forward_map(buf: &[u8]) -> BTreeMap<String, Vec<u64>> {
    let mut map = BTreeMap::new();
    if buf.is_empty() {
        return map;
    }

    let mut offset = 0usize;
    let tag_count = read_i64(buf, offset);
    offset += 8;

    for _ in 0..tag_count {
        let tag_len = read_i64(buf, offset) as usize;
        offset += 8;
        let tag = String::from_utf8_lossy(&buf[offset..offset + tag_len]).into_owned();
        offset += tag_len;

        let id_count = read_i64(buf, offset);
        offset += 8;

        let mut ids = Vec::with_capacity(id_count as usize);
        for _ in 0..id_count {
            ids.push(read_i64(buf, offset) as u64);
            offset += 8;
        }

        map.insert(tag, ids);
    }

    map
}
