// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The dataset orchestrator: ties the six sub-stores together under a single
//! coarse mutex and a file lock.

use crate::{
    config::DatasetOptions,
    error::{Error, Result},
    lock::DatasetLock,
    math::{cosine_sim_ranking, ScoredId, SortOrder},
    path,
    record::{AppendedItem, GroupHint, GroupInfo, IndexRow, NewItem, ReadMask, Record, MARKED_FOR_REMOVAL},
    storage::{DataLog, GroupStore, IndexStore, TagStore, VectorStore},
};
use std::{
    collections::{HashSet, BTreeMap},
    path::{Path, PathBuf},
    sync::Mutex,
};

/// Aggregate counters returned by [`Dataset::get_stats`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct DatasetStats {
    /// Total record count
    pub total_records: u64,
    /// Records carrying at least one tag
    pub records_with_tags: u64,
    /// Records with non-empty metadata
    pub records_with_metadata: u64,
    /// Records belonging to a group
    pub records_with_groups: u64,
    /// Records carrying a vector
    pub records_with_vectors: u64,
    /// Distinct non-empty groups
    pub total_groups: u64,
    /// Tag -> number of records carrying it
    pub tag_counts: BTreeMap<String, u64>,
}

struct Inner {
    lock: Option<DatasetLock>,
    closed: bool,
    data: DataLog,
    meta: DataLog,
    index: IndexStore,
    vectors: VectorStore,
    tags: TagStore,
    groups: GroupStore,
}

impl Inner {
    fn ensure_open(&self) -> Result<()> {
        if self.closed {
            Err(Error::Closed)
        } else {
            Ok(())
        }
    }
}

/// The six-file storage engine underneath one collection.
pub struct Dataset {
    dir: PathBuf,
    options: DatasetOptions,
    inner: Mutex<Inner>,
}

impl Dataset {
    /// Opens (creating sub-store files as needed) the dataset at
    /// `<path>/<name>/`, acquiring the directory's exclusive file lock.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Locked`] if another process already holds the lock,
    /// or [`Error::IndexStorageCorrupted`] if `.idx` is malformed.
    pub fn open(root: impl AsRef<Path>, name: &str, options: DatasetOptions) -> Result<Self> {
        let dir = path::collection_dir(root, name);
        std::fs::create_dir_all(&dir).map_err(|e| Error::create(&dir, e))?;

        log::debug!("opening dataset at {}", dir.display());

        let lock = DatasetLock::acquire(&dir)?;

        let data = DataLog::open(path::sub_store_path(&dir, name, "dat"), options.max_data_append_buffer_size)?;
        let meta = DataLog::open(path::sub_store_path(&dir, name, "met"), options.max_meta_data_append_buffer_size)?;
        let index = IndexStore::open(path::sub_store_path(&dir, name, "idx"), options.max_index_append_buffer_size)?;
        let vectors = VectorStore::open(
            path::sub_store_path(&dir, name, "vec"),
            options.vector_size,
            options.max_vector_append_buffer_size,
            options.max_vector_buffer_size,
        )?;
        let tags = TagStore::open(path::sub_store_path(&dir, name, "tag"))?;
        let groups = GroupStore::open(path::sub_store_path(&dir, name, "grp"))?;

        Ok(Self {
            dir,
            options,
            inner: Mutex::new(Inner { lock: Some(lock), closed: false, data, meta, index, vectors, tags, groups }),
        })
    }

    #[must_use]
    pub fn dir(&self) -> &Path {
        &self.dir
    }

    #[must_use]
    pub fn options(&self) -> DatasetOptions {
        self.options
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Inner> {
        #[allow(clippy::unwrap_used)]
        self.inner.lock().unwrap_or_else(std::sync::PoisonError::into_inner)
    }

    /// Appends a new record.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VectorDimensionMismatch`] if a vector is supplied
    /// with the wrong length, or a group error if the hint cannot be
    /// satisfied.
    pub fn append(&self, item: NewItem) -> Result<AppendedItem> {
        let mut inner = self.lock();
        inner.ensure_open()?;

        let hint = GroupHint::from_raw(item.group_id, item.place);
        if let GroupHint::Existing { group_id, place } = hint {
            inner.groups.validate_new_member(group_id, place)?;
        }

        let (offset, size) = inner.data.append(&item.data)?;
        let (meta_offset, meta_size) = inner.meta.append(&item.meta)?;

        let mut row = IndexRow {
            offset,
            size,
            meta_offset,
            meta_size,
            vector_slot: -1,
            data_descriptor: item.data_descriptor,
            meta_descriptor: item.meta_descriptor,
            flags: 0,
        };

        let id = inner.index.append(row)?;

        if let Some(vector) = &item.vector {
            let slot = inner.vectors.append(vector)?;
            row.vector_slot = i32::try_from(slot).unwrap_or(i32::MAX);
            inner.index.replace(id, row)?;
        }

        for tag in normalize_tags(&item.tags) {
            inner.tags.add(id, &tag)?;
        }

        let group_id = match hint {
            GroupHint::None => None,
            GroupHint::New => Some(inner.groups.create_group(id)?),
            GroupHint::Existing { group_id, place } => {
                inner.groups.assign(group_id, id, place)?;
                Some(group_id)
            }
        };

        Ok(AppendedItem { id, group_id })
    }

    /// Reads a record, loading only the fields selected by `mask`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::IndexOutOfRange`] if `id` is not a valid row index.
    pub fn read(&self, id: u64, mask: ReadMask) -> Result<Record> {
        let mut inner = self.lock();
        inner.ensure_open()?;

        let row = inner.index.get(id)?;

        let data = if mask.contains(ReadMask::DATA) {
            Some(inner.data.read(row.offset, row.size as usize)?)
        } else {
            None
        };

        let meta = if mask.contains(ReadMask::META) {
            Some(inner.meta.read(row.meta_offset, row.meta_size as usize)?)
        } else {
            None
        };

        let vector = if mask.contains(ReadMask::VECTOR) && row.vector_slot >= 0 {
            Some(inner.vectors.get(row.vector_slot as u64)?)
        } else {
            None
        };

        let tags = if mask.contains(ReadMask::TAGS) { Some(inner.tags.get_tags(id)?) } else { None };

        let group = if mask.contains(ReadMask::GROUP) {
            let group_id = inner.groups.get_group(id)?;
            if group_id < 0 {
                None
            } else {
                let members = inner.groups.get_members(group_id as u64)?;
                let place = members.iter().position(|&m| m == id).unwrap_or(0);
                Some(GroupInfo { group_id: group_id as u64, place: place as u64 })
            }
        } else {
            None
        };

        Ok(Record {
            id,
            data_descriptor: row.data_descriptor,
            meta_descriptor: row.meta_descriptor,
            flags: row.flags,
            data,
            meta,
            vector,
            tags,
            group,
        })
    }

    /// Overwrites a record's data blob and descriptor. Empty `bytes` clears
    /// the field.
    pub fn set_data(&self, id: u64, bytes: &[u8], descriptor: u8) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        set_blob(&mut inner.data, &mut inner.index, id, bytes, descriptor, BlobField::Data)
    }

    /// Overwrites a record's metadata blob and descriptor. Empty `bytes`
    /// clears the field.
    pub fn set_meta_data(&self, id: u64, bytes: &[u8], descriptor: u8) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        set_blob(&mut inner.meta, &mut inner.index, id, bytes, descriptor, BlobField::Meta)
    }

    /// Sets (or replaces) a record's vector.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VectorDimensionMismatch`] if `vector`'s length does
    /// not match the dataset's configured dimension.
    pub fn set_vector(&self, id: u64, vector: &[f32]) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;

        let mut row = inner.index.get(id)?;

        if row.vector_slot >= 0 {
            inner.vectors.replace(row.vector_slot as u64, vector)?;
        } else {
            let slot = inner.vectors.append(vector)?;
            row.vector_slot = i32::try_from(slot).unwrap_or(i32::MAX);
            inner.index.replace(id, row)?;
        }

        Ok(())
    }

    /// Adds tags to a record.
    pub fn add_tags(&self, id: u64, tags: &[String]) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        inner.index.get(id)?;

        for tag in tags {
            inner.tags.add(id, tag)?;
        }
        Ok(())
    }

    /// Removes tags from a record.
    pub fn remove_tags(&self, id: u64, tags: &[String]) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        inner.index.get(id)?;

        for tag in tags {
            inner.tags.remove(id, tag)?;
        }
        Ok(())
    }

    /// Assigns a record to a group at `place`, removing it from any prior
    /// group first.
    pub fn set_group(&self, id: u64, group_id: u64, place: i64) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        inner.index.get(id)?;

        let current = inner.groups.get_group(id)?;
        if current >= 0 && current as u64 != group_id {
            inner.groups.remove(id)?;
        }

        inner.groups.assign(group_id, id, place)
    }

    /// Removes a record from its group, if any. Idempotent.
    pub fn unset_group(&self, id: u64) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        inner.groups.remove(id)
    }

    /// Ids in `group_id`, sorted by ascending place.
    pub fn get_group_members(&self, group_id: u64) -> Result<Vec<u64>> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        inner.groups.get_members(group_id)
    }

    /// Marks a record for soft-deletion.
    pub fn delete(&self, id: u64) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        inner.index.set_flags(id, MARKED_FOR_REMOVAL)
    }

    /// Flushes all six sub-stores, in a fixed order.
    pub fn flush(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;
        flush_all(&mut inner)
    }

    /// Truncates all six sub-stores.
    pub fn truncate(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;

        inner.data.truncate()?;
        inner.meta.truncate()?;
        inner.index.truncate()?;
        inner.vectors.truncate()?;
        inner.tags.truncate()?;
        inner.groups.truncate()?;

        Ok(())
    }

    /// `true` iff every sub-store's append buffer is empty.
    pub fn is_persisted(&self) -> Result<bool> {
        let inner = self.lock();
        inner.ensure_open()?;
        Ok(inner.data.is_persisted()
            && inner.meta.is_persisted()
            && inner.index.is_persisted()
            && inner.vectors.is_persisted()
            && inner.tags.is_persisted()
            && inner.groups.is_persisted())
    }

    /// Total index row count.
    pub fn count(&self) -> Result<u64> {
        let inner = self.lock();
        inner.ensure_open()?;
        Ok(inner.index.count())
    }

    /// Aggregate counters.
    pub fn get_stats(&self) -> Result<DatasetStats> {
        let mut inner = self.lock();
        inner.ensure_open()?;

        let mut stats = DatasetStats { total_records: inner.index.count(), ..DatasetStats::default() };

        for (_, row) in inner.index.iterate().map(|(i, r)| (i, *r)).collect::<Vec<_>>() {
            if row.meta_size > 0 {
                stats.records_with_metadata += 1;
            }
            if row.vector_slot >= 0 {
                stats.records_with_vectors += 1;
            }
        }

        stats.records_with_tags = inner.tags.count()?;
        stats.tag_counts = inner.tags.get_tag_counts()?;
        stats.records_with_groups = inner.groups.count()?;
        stats.total_groups = inner.groups.get_group_count()?;

        Ok(stats)
    }

    /// Ranks every record carrying a vector against `query` by cosine
    /// similarity.
    ///
    /// # Errors
    ///
    /// Returns [`Error::VectorDimensionMismatch`] if `query`'s length does
    /// not match a candidate vector's length.
    pub fn vector_search(&self, query: &[f32], order: SortOrder, limit: usize) -> Result<Vec<ScoredId>> {
        let mut inner = self.lock();
        inner.ensure_open()?;

        let mut rows = Vec::new();
        for (id, row) in inner.index.iterate().map(|(i, r)| (i, *r)).collect::<Vec<_>>() {
            if row.vector_slot < 0 {
                continue;
            }
            rows.push((id, inner.vectors.get(row.vector_slot as u64)?));
        }

        cosine_sim_ranking(rows, query, order, limit)
    }

    /// Rebuilds `.dat`/`.met`/`.idx`, drops soft-deleted rows, and remaps
    /// tag and group references to the new dense ID space. See `DESIGN.md`
    /// for why group membership is remapped here rather than left alone.
    pub fn optimize(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;

        let data_path = path::sub_store_path(&self.dir, ".optimize", "dat.tmp");
        let meta_path = path::sub_store_path(&self.dir, ".optimize", "met.tmp");

        let result = run_optimize(self, &mut inner, &data_path, &meta_path);

        if result.is_err() {
            remove_temp_file(&data_path);
            remove_temp_file(&meta_path);
        }

        result
    }

    /// Flushes every sub-store, closes cached read handles, and releases the
    /// file lock. A second call returns [`Error::Closed`].
    pub fn close(&self) -> Result<()> {
        let mut inner = self.lock();
        inner.ensure_open()?;

        flush_all(&mut inner)?;

        inner.data.close()?;
        inner.meta.close()?;
        inner.index.close()?;
        inner.vectors.close()?;
        inner.tags.close()?;
        inner.groups.close()?;

        if let Some(mut lock) = inner.lock.take() {
            lock.close()?;
        }

        inner.closed = true;
        log::debug!("{}: closed", self.dir.display());

        Ok(())
    }

    /// Iterates every record's data blob, in id order. Holds the dataset
    /// mutex for its entire lifetime.
    pub fn data_iterator(&self) -> Result<DataIterator<'_>> {
        let inner = self.lock();
        inner.ensure_open()?;
        Ok(DataIterator { guard: inner, next_id: 0 })
    }

    /// Iterates every record's metadata blob, in id order.
    pub fn meta_iterator(&self) -> Result<MetaIterator<'_>> {
        let inner = self.lock();
        inner.ensure_open()?;
        Ok(MetaIterator { guard: inner, next_id: 0 })
    }

    /// Iterates `(id, vector)` for every record that carries a vector, in id
    /// order.
    pub fn vectors_iterator(&self) -> Result<VectorsIterator<'_>> {
        let inner = self.lock();
        inner.ensure_open()?;
        Ok(VectorsIterator { guard: inner, next_id: 0 })
    }
}

/// Lending iterator over every record's data blob.
pub struct DataIterator<'a> {
    guard: std::sync::MutexGuard<'a, Inner>,
    next_id: u64,
}

impl Iterator for DataIterator<'_> {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next_id;
        if id >= self.guard.index.count() {
            return None;
        }
        self.next_id += 1;

        let row = match self.guard.index.get(id) {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };

        Some(self.guard.data.read(row.offset, row.size as usize).map(|bytes| (id, bytes)))
    }
}

/// Lending iterator over every record's metadata blob.
pub struct MetaIterator<'a> {
    guard: std::sync::MutexGuard<'a, Inner>,
    next_id: u64,
}

impl Iterator for MetaIterator<'_> {
    type Item = Result<(u64, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.next_id;
        if id >= self.guard.index.count() {
            return None;
        }
        self.next_id += 1;

        let row = match self.guard.index.get(id) {
            Ok(row) => row,
            Err(e) => return Some(Err(e)),
        };

        Some(self.guard.meta.read(row.meta_offset, row.meta_size as usize).map(|bytes| (id, bytes)))
    }
}

/// Lending iterator over `(id, vector)` for records that carry a vector.
pub struct VectorsIterator<'a> {
    guard: std::sync::MutexGuard<'a, Inner>,
    next_id: u64,
}

impl Iterator for VectorsIterator<'_> {
    type Item = Result<(u64, Vec<f32>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            let id = self.next_id;
            if id >= self.guard.index.count() {
                return None;
            }
            self.next_id += 1;

            let row = match self.guard.index.get(id) {
                Ok(row) => row,
                Err(e) => return Some(Err(e)),
            };

            if row.vector_slot < 0 {
                continue;
            }

            return Some(self.guard.vectors.get(row.vector_slot as u64).map(|v| (id, v)));
        }
    }
}

/// The body of [`Dataset::optimize`]. Split out so the caller can clean up
/// both temp files on any error this returns.
fn run_optimize(dataset: &Dataset, inner: &mut Inner, data_path: &Path, meta_path: &Path) -> Result<()> {
    log::debug!("{}: starting optimize", dataset.dir.display());

    flush_all(inner)?;

    let rows: Vec<IndexRow> = inner.index.iterate().map(|(_, r)| *r).collect();
    let mut updated = rows.clone();

    // A temp file left behind by a prior failed optimize would otherwise be
    // reopened with its stale bytes counted as already persisted, offsetting
    // every blob appended below.
    let mut temp_data = DataLog::open(data_path, 0)?;
    temp_data.truncate()?;
    for (row, new_row) in rows.iter().zip(updated.iter_mut()) {
        if row.flags & MARKED_FOR_REMOVAL == 0 && row.size > 0 {
            let blob = inner.data.read(row.offset, row.size as usize)?;
            let (offset, size) = temp_data.append(&blob)?;
            new_row.offset = offset;
            new_row.size = size;
        }
    }
    temp_data.flush()?;
    swap_data_log(&mut inner.data, data_path, dataset.options.max_data_append_buffer_size)?;

    let mut temp_meta = DataLog::open(meta_path, 0)?;
    temp_meta.truncate()?;
    for (row, new_row) in rows.iter().zip(updated.iter_mut()) {
        if row.flags & MARKED_FOR_REMOVAL == 0 && row.meta_size > 0 {
            let blob = inner.meta.read(row.meta_offset, row.meta_size as usize)?;
            let (offset, size) = temp_meta.append(&blob)?;
            new_row.meta_offset = offset;
            new_row.meta_size = size;
        }
    }
    temp_meta.flush()?;
    swap_data_log(&mut inner.meta, meta_path, dataset.options.max_meta_data_append_buffer_size)?;

    for (i, row) in updated.iter().enumerate() {
        inner.index.replace(i as u64, *row)?;
    }

    let id_map: BTreeMap<u64, u64> = rows
        .iter()
        .enumerate()
        .filter(|(_, row)| row.flags & MARKED_FOR_REMOVAL == 0)
        .enumerate()
        .map(|(new_id, (old_id, _))| (old_id as u64, new_id as u64))
        .collect();

    inner.index.optimise()?;

    remap_tags(&mut inner.tags, &id_map)?;
    remap_groups(&mut inner.groups, &id_map)?;

    flush_all(inner)?;

    log::debug!("{}: optimize complete, {} surviving records", dataset.dir.display(), inner.index.count());

    Ok(())
}

/// Best-effort temp file removal; a missing file is not an error.
fn remove_temp_file(path: &Path) {
    if let Err(e) = std::fs::remove_file(path) {
        if e.kind() != std::io::ErrorKind::NotFound {
            log::warn!("{}: failed to remove temp file: {e}", path.display());
        }
    }
}

fn flush_all(inner: &mut Inner) -> Result<()> {
    inner.data.flush()?;
    inner.meta.flush()?;
    inner.index.flush()?;
    inner.vectors.flush()?;
    inner.tags.flush()?;
    inner.groups.flush()?;
    Ok(())
}

fn normalize_tags(tags: &[String]) -> Vec<String> {
    let mut seen = HashSet::new();
    let mut out = Vec::new();

    for tag in tags {
        let normalized = tag.trim().to_lowercase();
        if !normalized.is_empty() && seen.insert(normalized.clone()) {
            out.push(normalized);
        }
    }

    out
}

enum BlobField {
    Data,
    Meta,
}

fn set_blob(
    log: &mut DataLog,
    index: &mut IndexStore,
    id: u64,
    bytes: &[u8],
    descriptor: u8,
    field: BlobField,
) -> Result<()> {
    let mut row = index.get(id)?;

    let (current_offset, current_size) = match field {
        BlobField::Data => (row.offset, row.size),
        BlobField::Meta => (row.meta_offset, row.meta_size),
    };

    let (new_offset, new_size) = if bytes.is_empty() {
        (-1, 0)
    } else if bytes.len() as i64 <= current_size && current_offset >= 0 {
        log.replace(bytes, current_offset)?;
        (current_offset, bytes.len() as i64)
    } else {
        log.append(bytes)?
    };

    match field {
        BlobField::Data => {
            row.offset = new_offset;
            row.size = new_size;
            row.data_descriptor = descriptor;
        }
        BlobField::Meta => {
            row.meta_offset = new_offset;
            row.meta_size = new_size;
            row.meta_descriptor = descriptor;
        }
    }

    index.replace(id, row)
}

fn swap_data_log(live: &mut DataLog, temp_path: &Path, threshold: u64) -> Result<()> {
    let live_path = live.path().to_path_buf();
    live.close()?;
    std::fs::rename(temp_path, &live_path).map_err(|e| Error::write(&live_path, e))?;
    *live = DataLog::open(&live_path, threshold)?;
    Ok(())
}

fn remap_tags(tags: &mut TagStore, id_map: &BTreeMap<u64, u64>) -> Result<()> {
    let mut translated: Vec<(u64, String)> = Vec::new();

    for tag in tags.get_all_tags()? {
        for old_id in tags.get_ids(&tag)? {
            if let Some(&new_id) = id_map.get(&old_id) {
                translated.push((new_id, tag.clone()));
            }
        }
    }

    tags.truncate()?;
    for (new_id, tag) in translated {
        tags.add(new_id, &tag)?;
    }

    Ok(())
}

/// Mirrors `remap_tags` for groups, a deliberate deviation from the
/// documented no-op baseline: stale references would otherwise silently
/// point at the wrong (or a reused) record id after compaction.
fn remap_groups(groups: &mut GroupStore, id_map: &BTreeMap<u64, u64>) -> Result<()> {
    groups.remap_ids(id_map)
}
