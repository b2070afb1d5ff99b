// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The user-facing façade over a [`Dataset`]: JSON configuration persistence,
//! typed text item read/write, and metadata-key usage statistics.

use crate::{
    config::{CollectionConfig, DatasetOptions},
    dataset::Dataset,
    error::{Error, Result},
    math::{ScoredId, SortOrder},
    path,
    record::{descriptor, NewItem, ReadMask, Record},
};
use std::{collections::BTreeMap, path::Path};

/// A record as the collection façade hands it to callers: text data and
/// decoded JSON metadata rather than opaque blobs.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Item {
    /// Assigned record id
    pub id: u64,
    /// The record's text content, if its data descriptor is
    /// [`descriptor::TEXT`] and data was loaded
    pub text: Option<String>,
    /// Decoded application metadata, if metadata was loaded and is valid JSON
    pub metadata: Option<BTreeMap<String, serde_json::Value>>,
    /// The record's vector, if loaded and present
    pub vector: Option<Vec<f32>>,
    /// The record's tags, if loaded
    pub tags: Option<Vec<String>>,
}

/// A new text item to append, before an id has been assigned.
#[derive(Clone, Debug, Default)]
pub struct NewTextItem {
    /// Text content
    pub text: String,
    /// Application metadata, JSON-encoded into the opaque meta blob
    pub metadata: BTreeMap<String, serde_json::Value>,
    /// Optional fixed-dimension vector
    pub vector: Option<Vec<f32>>,
    /// Tags to attach
    pub tags: Vec<String>,
    /// Group id (-1 new, 0 none, >=1 existing)
    pub group_id: i64,
    /// Requested place within the group
    pub place: i64,
}

impl NewTextItem {
    fn into_new_item(self) -> Result<NewItem> {
        let meta = if self.metadata.is_empty() {
            Vec::new()
        } else {
            serde_json::to_vec(&self.metadata).map_err(|e| Error::ConfigInvalid(e.to_string()))?
        };

        Ok(NewItem {
            data: self.text.into_bytes(),
            data_descriptor: descriptor::TEXT,
            meta,
            meta_descriptor: descriptor::TEXT,
            vector: self.vector,
            tags: self.tags,
            group_id: self.group_id,
            place: self.place,
        })
    }
}

/// Tag -> usage count, and metadata key -> usage count, together.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct CollectionStats {
    /// Total record count
    pub total_records: u64,
    /// Tag -> number of records carrying it
    pub tag_counts: BTreeMap<String, u64>,
    /// Metadata key -> number of records whose decoded metadata carries it
    pub metadata_key_counts: BTreeMap<String, u64>,
}

/// A named collection: one dataset, plus its JSON configuration.
pub struct Collection {
    dataset: Dataset,
    config: CollectionConfig,
}

impl Collection {
    /// Creates a new collection directory, writes its configuration, and
    /// opens the dataset.
    pub fn create(root: impl AsRef<Path>, name: &str, options: DatasetOptions) -> Result<Self> {
        let dir = path::collection_dir(&root, name);
        std::fs::create_dir_all(&dir).map_err(|e| Error::create(&dir, e))?;

        let config = CollectionConfig::new(options);
        config.write(&config_path(&dir, name))?;

        let dataset = Dataset::open(root, name, options)?;

        Ok(Self { dataset, config })
    }

    /// Opens an existing collection, reading its configuration first so the
    /// dataset opens with the same options it was created with.
    pub fn open(root: impl AsRef<Path>, name: &str) -> Result<Self> {
        let dir = path::collection_dir(&root, name);
        let config = CollectionConfig::read(&config_path(&dir, name))?;
        let dataset = Dataset::open(root, name, config.dataset_options)?;

        Ok(Self { dataset, config })
    }

    #[must_use]
    pub fn dataset(&self) -> &Dataset {
        &self.dataset
    }

    #[must_use]
    pub fn config(&self) -> &CollectionConfig {
        &self.config
    }

    /// Appends a text item, JSON-encoding its metadata into the opaque meta
    /// blob.
    pub fn append_text(&self, item: NewTextItem) -> Result<u64> {
        let appended = self.dataset.append(item.into_new_item()?)?;
        Ok(appended.id)
    }

    /// Reads a record, decoding its data as text (when its descriptor is
    /// [`descriptor::TEXT`]) and its metadata as JSON.
    pub fn read_text(&self, id: u64, mask: ReadMask) -> Result<Item> {
        let record = self.dataset.read(id, mask)?;
        Ok(record_to_item(record))
    }

    /// Ranks every record carrying a vector against `query`.
    pub fn vector_search(&self, query: &[f32], order: SortOrder, limit: usize) -> Result<Vec<ScoredId>> {
        self.dataset.vector_search(query, order, limit)
    }

    /// Aggregates tag usage (from the dataset) and metadata-key usage (by
    /// iterating every record's decoded metadata) across the whole
    /// collection.
    pub fn get_stats(&self) -> Result<CollectionStats> {
        let dataset_stats = self.dataset.get_stats()?;

        let mut metadata_key_counts = BTreeMap::new();
        for entry in self.dataset.meta_iterator()? {
            let (_, bytes) = entry?;
            if bytes.is_empty() {
                continue;
            }
            if let Ok(decoded) = serde_json::from_slice::<BTreeMap<String, serde_json::Value>>(&bytes) {
                for key in decoded.keys() {
                    *metadata_key_counts.entry(key.clone()).or_insert(0) += 1;
                }
            }
        }

        Ok(CollectionStats {
            total_records: dataset_stats.total_records,
            tag_counts: dataset_stats.tag_counts,
            metadata_key_counts,
        })
    }

    /// Flushes the underlying dataset.
    pub fn flush(&self) -> Result<()> {
        self.dataset.flush()
    }

    /// Closes the underlying dataset.
    pub fn close(&self) -> Result<()> {
        self.dataset.close()
    }
}

fn config_path(dir: &Path, name: &str) -> std::path::PathBuf {
    dir.join(format!("{name}.json"))
}

fn record_to_item(record: Record) -> Item {
    let text = record
        .data
        .filter(|_| record.data_descriptor == descriptor::TEXT)
        .map(|bytes| String::from_utf8_lossy(&bytes).into_owned());

    let metadata = record.meta.and_then(|bytes| {
        if bytes.is_empty() {
            Some(BTreeMap::new())
        } else {
            serde_json::from_slice(&bytes).ok()
        }
    });

    Item { id: record.id, text, metadata, vector: record.vector, tags: record.tags }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn create_then_open_reuses_options() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let options = DatasetOptions::default().vector_size(3);

        {
            let collection = Collection::create(dir.path(), "notes", options)?;
            collection.close()?;
        }

        let reopened = Collection::open(dir.path(), "notes")?;
        assert_eq!(3, reopened.config().dataset_options.vector_size);

        Ok(())
    }

    #[test]
    fn append_and_read_text_roundtrips() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let collection = Collection::create(dir.path(), "notes", DatasetOptions::default().vector_size(2))?;

        let mut metadata = BTreeMap::new();
        metadata.insert("source".to_string(), serde_json::json!("unit-test"));

        let id = collection.append_text(NewTextItem {
            text: "hello world".into(),
            metadata: metadata.clone(),
            vector: Some(vec![1.0, 0.0]),
            tags: vec!["Greeting".into()],
            group_id: 0,
            place: 0,
        })?;

        let item = collection.read_text(id, ReadMask::ALL)?;
        assert_eq!(Some("hello world".to_string()), item.text);
        assert_eq!(Some(metadata), item.metadata);
        assert_eq!(Some(vec![1.0, 0.0]), item.vector);
        assert_eq!(Some(vec!["greeting".to_string()]), item.tags);

        Ok(())
    }

    #[test]
    fn stats_aggregate_tags_and_metadata_keys() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let collection = Collection::create(dir.path(), "notes", DatasetOptions::default().vector_size(1))?;

        let mut meta_a = BTreeMap::new();
        meta_a.insert("author".to_string(), serde_json::json!("a"));
        collection.append_text(NewTextItem {
            text: "one".into(),
            metadata: meta_a,
            tags: vec!["x".into()],
            ..Default::default()
        })?;

        let mut meta_b = BTreeMap::new();
        meta_b.insert("author".to_string(), serde_json::json!("b"));
        meta_b.insert("lang".to_string(), serde_json::json!("en"));
        collection.append_text(NewTextItem {
            text: "two".into(),
            metadata: meta_b,
            tags: vec!["x".into(), "y".into()],
            ..Default::default()
        })?;

        let stats = collection.get_stats()?;
        assert_eq!(2, stats.total_records);
        assert_eq!(Some(&2), stats.tag_counts.get("x"));
        assert_eq!(Some(&1), stats.tag_counts.get("y"));
        assert_eq!(Some(&2), stats.metadata_key_counts.get("author"));
        assert_eq!(Some(&1), stats.metadata_key_counts.get("lang"));

        Ok(())
    }
}
