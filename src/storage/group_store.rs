// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Group membership map backing `.grp`, lazily loaded, whole-file rewrite of
//! the forward map plus `next_group_id` on flush.

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

/// One member of a group: a record id and its place within the group.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Member {
    id: u64,
    place: i64,
}

/// The forward map (group_id -> ordered members) and reverse map (id ->
/// group_id), plus the monotonically increasing `next_group_id` counter.
pub struct GroupStore {
    storage: FileStorage,
    forward: BTreeMap<u64, Vec<Member>>,
    reverse: BTreeMap<u64, u64>,
    next_group_id: u64,
    dirty: bool,
    loaded: bool,
}

impl GroupStore {
    /// Wraps (but does not yet load) the store at `path`.
    pub fn open(path: impl Into<PathBuf>) -> Result<Self> {
        let storage = FileStorage::new(path.into());
        storage.init(true)?;

        Ok(Self {
            storage,
            forward: BTreeMap::new(),
            reverse: BTreeMap::new(),
            next_group_id: 1,
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

        log::trace!("{}: lazily loading group store", self.path().display());

        let size = self.storage.size()?;
        let mut buf = vec![0u8; size as usize];
        self.storage.reader(0)?.read_exact(&mut buf).map_err(|e| Error::read(self.path(), e))?;

        let (forward, next_group_id) = decode(&buf);
        self.reverse = BTreeMap::new();
        for (&group_id, members) in &forward {
            for member in members {
                self.reverse.insert(member.id, group_id);
            }
        }
        self.forward = forward;
        self.next_group_id = next_group_id;

        self.loaded = true;
        Ok(())
    }

    /// Allocates a new group containing only `first_id` at place 0.
    pub fn create_group(&mut self, first_id: u64) -> Result<u64> {
        self.ensure_loaded()?;

        let group_id = self.next_group_id;
        self.next_group_id += 1;

        self.forward.insert(group_id, vec![Member { id: first_id, place: 0 }]);
        self.reverse.insert(first_id, group_id);
        self.dirty = true;

        Ok(group_id)
    }

    /// Checks whether a brand-new id could be assigned to `group_id` at
    /// `place` without mutating anything, so a caller can validate a group
    /// hint before committing any other write.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GroupNotFound`] if `group_id` does not exist, or
    /// [`Error::DuplicatedPlace`] if a member already occupies `place`.
    pub fn validate_new_member(&mut self, group_id: u64, place: i64) -> Result<()> {
        self.ensure_loaded()?;

        let members = self.forward.get(&group_id).ok_or(Error::GroupNotFound)?;
        if members.iter().any(|m| m.place == place) {
            return Err(Error::DuplicatedPlace);
        }

        Ok(())
    }

    /// Assigns `id` to `group_id` at `place`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GroupNotFound`] if `group_id` does not exist,
    /// [`Error::DuplicatedPlace`] if another member already occupies `place`,
    /// or [`Error::WrongGroup`] if `id` belongs to a different group.
    pub fn assign(&mut self, group_id: u64, id: u64, place: i64) -> Result<()> {
        self.ensure_loaded()?;

        if !self.forward.contains_key(&group_id) {
            return Err(Error::GroupNotFound);
        }

        if let Some(&current) = self.reverse.get(&id) {
            if current != group_id {
                return Err(Error::WrongGroup);
            }
        }

        #[allow(clippy::unwrap_used)]
        let members = self.forward.get_mut(&group_id).unwrap();

        if let Some(existing) = members.iter_mut().find(|m| m.id == id) {
            if members.iter().any(|m| m.place == place && m.id != id) {
                return Err(Error::DuplicatedPlace);
            }
            existing.place = place;
        } else {
            if members.iter().any(|m| m.place == place) {
                return Err(Error::DuplicatedPlace);
            }
            members.push(Member { id, place });
        }

        self.reverse.insert(id, group_id);
        self.dirty = true;

        Ok(())
    }

    /// Removes `id` from its group, if any. Drops the group entry entirely
    /// once it has no members left, but `next_group_id` is never reused.
    pub fn remove(&mut self, id: u64) -> Result<()> {
        self.ensure_loaded()?;

        let Some(group_id) = self.reverse.remove(&id) else {
            return Ok(());
        };

        if let Some(members) = self.forward.get_mut(&group_id) {
            members.retain(|m| m.id != id);
            if members.is_empty() {
                self.forward.remove(&group_id);
            }
        }

        self.dirty = true;
        Ok(())
    }

    /// The group `id` belongs to, or `-1` if unassigned.
    pub fn get_group(&mut self, id: u64) -> Result<i64> {
        self.ensure_loaded()?;
        Ok(self.reverse.get(&id).map_or(-1, |&g| g as i64))
    }

    /// Member ids of `group_id`, sorted by ascending place. A defensive copy.
    ///
    /// # Errors
    ///
    /// Returns [`Error::GroupNotFound`] if `group_id` does not exist.
    pub fn get_members(&mut self, group_id: u64) -> Result<Vec<u64>> {
        self.ensure_loaded()?;

        let members = self.forward.get(&group_id).ok_or(Error::GroupNotFound)?;
        let mut sorted = members.clone();
        sorted.sort_by_key(|m| m.place);

        Ok(sorted.into_iter().map(|m| m.id).collect())
    }

    /// Number of distinct non-empty groups.
    pub fn get_group_count(&mut self) -> Result<u64> {
        self.ensure_loaded()?;
        Ok(self.forward.len() as u64)
    }

    /// Number of records assigned to some group.
    pub fn count(&mut self) -> Result<u64> {
        self.ensure_loaded()?;
        Ok(self.reverse.len() as u64)
    }

    /// `true` iff there are no unwritten changes since the last flush.
    #[must_use]
    pub fn is_persisted(&self) -> bool {
        !self.dirty
    }

    /// Translates every member id through `id_map`, dropping members whose
    /// old id has no entry (their row was removed), and drops groups left
    /// with no members. Group ids and `next_group_id` are unchanged.
    ///
    /// Used by `Dataset::optimize` to remap group membership alongside tags
    /// once records are compacted; see `DESIGN.md` for why this remaps
    /// groups rather than leaving them untouched.
    pub fn remap_ids(&mut self, id_map: &BTreeMap<u64, u64>) -> Result<()> {
        self.ensure_loaded()?;

        let mut rebuilt = BTreeMap::new();

        for (&group_id, members) in &self.forward {
            let translated: Vec<Member> = members
                .iter()
                .filter_map(|m| id_map.get(&m.id).map(|&new_id| Member { id: new_id, place: m.place }))
                .collect();

            if !translated.is_empty() {
                rebuilt.insert(group_id, translated);
            }
        }

        self.reverse.clear();
        for (&group_id, members) in &rebuilt {
            for member in members {
                self.reverse.insert(member.id, group_id);
            }
        }

        self.forward = rebuilt;
        self.dirty = true;

        Ok(())
    }

    /// Rewrites the whole file (forward map + `next_group_id`), if dirty.
    pub fn flush(&mut self) -> Result<()> {
        if !self.dirty {
            return Ok(());
        }

        log::trace!("{}: rewriting group store ({} groups)", self.path().display(), self.forward.len());

        let encoded = encode(&self.forward, self.next_group_id);
        self.storage.truncate()?;
        self.storage.writer(0)?.write_all(&encoded).map_err(|e| Error::write(self.path(), e))?;

        self.dirty = false;
        Ok(())
    }

    /// Clears everything, in memory and on disk. `next_group_id` resets to 1.
    pub fn truncate(&mut self) -> Result<()> {
        self.storage.truncate()?;
        self.forward.clear();
        self.reverse.clear();
        self.next_group_id = 1;
        self.loaded = true;
        self.dirty = false;
        Ok(())
    }

    /// Flushes.
    pub fn close(&mut self) -> Result<()> {
        self.flush()
    }
}

/// `next_group_id`, then `group_count`, then per group `group_id,
/// member_count, (id, place)*`.
fn encode(map: &BTreeMap<u64, Vec<Member>>, next_group_id: u64) -> Vec<u8> {
    let mut out = Vec::new();
    write_i64(&mut out, next_group_id as i64);
    write_i64(&mut out, map.len() as i64);

    for (&group_id, members) in map {
        write_i64(&mut out, group_id as i64);
        write_i64(&mut out, members.len() as i64);
        for member in members {
            write_i64(&mut out, member.id as i64);
            write_i64(&mut out, member.place);
        }
    }

    out
}

fn decode(buf: &[u8]) -> (BTreeMap<u64, Vec<Member>>, u64) {
    if buf.is_empty() {
        return (BTreeMap::new(), 1);
    }

    let mut offset = 0usize;
    let next_group_id = read_i64(buf, offset) as u64;
    offset += 8;

    let group_count = read_i64(buf, offset);
    offset += 8;

    let mut map = BTreeMap::new();

    for _ in 0..group_count {
        let group_id = read_i64(buf, offset) as u64;
        offset += 8;
        let member_count = read_i64(buf, offset);
        offset += 8;

        let mut members = Vec::with_capacity(member_count as usize);
        for _ in 0..member_count {
            let id = read_i64(buf, offset) as u64;
            offset += 8;
            let place = read_i64(buf, offset);
            offset += 8;
            members.push(Member { id, place });
        }

        map.insert(group_id, members);
    }

    (map, next_group_id)
}
