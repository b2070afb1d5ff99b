// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Dataset options and the collection-level JSON configuration document
//! persisted beside each collection's data. Builder methods use
//! `#[must_use]` consuming setters returning `Self`.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::{collections::BTreeMap, fs::File, io::BufReader, path::Path};

/// Buffer-size and vector-dimension thresholds for a dataset. Field names
/// match the on-disk JSON keys exactly, since the format is user-facing and
/// not meant to be migrated silently.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct DatasetOptions {
    /// Flush threshold (bytes) for the `.dat` append buffer
    #[serde(rename = "MaxDataAppendBufferSize")]
    pub max_data_append_buffer_size: u64,

    /// Flush threshold (bytes) for the `.met` append buffer
    #[serde(rename = "MaxMetaDataAppendBufferSize")]
    pub max_meta_data_append_buffer_size: u64,

    /// Flush threshold (rows) for the `.idx` append buffer
    #[serde(rename = "MaxIndexAppendBufferSize")]
    pub max_index_append_buffer_size: u64,

    /// Fixed vector dimension `D`
    #[serde(rename = "VectorSize")]
    pub vector_size: u32,

    /// Iterator chunk size (in vectors) for the `.vec` store
    #[serde(rename = "MaxVectorBufferSize")]
    pub max_vector_buffer_size: u64,

    /// Flush threshold (vectors) for the `.vec` append buffer
    #[serde(rename = "MaxVectorAppendBufferSize")]
    pub max_vector_append_buffer_size: u64,
}

impl Default for DatasetOptions {
    fn default() -> Self {
        Self {
            max_data_append_buffer_size: 1 << 17,
            max_meta_data_append_buffer_size: 1 << 15,
            max_index_append_buffer_size: 64,
            vector_size: 768,
            max_vector_buffer_size: 64,
            max_vector_append_buffer_size: 64,
        }
    }
}

impl DatasetOptions {
    /// Starts from the documented defaults.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the `.dat` append-buffer flush threshold, in bytes.
    #[must_use]
    pub fn max_data_append_buffer_size(mut self, bytes: u64) -> Self {
        self.max_data_append_buffer_size = bytes;
        self
    }

    /// Sets the `.met` append-buffer flush threshold, in bytes.
    #[must_use]
    pub fn max_meta_data_append_buffer_size(mut self, bytes: u64) -> Self {
        self.max_meta_data_append_buffer_size = bytes;
        self
    }

    /// Sets the `.idx` append-buffer flush threshold, in rows.
    #[must_use]
    pub fn max_index_append_buffer_size(mut self, rows: u64) -> Self {
        self.max_index_append_buffer_size = rows;
        self
    }

    /// Sets the fixed vector dimension `D`.
    #[must_use]
    pub fn vector_size(mut self, dim: u32) -> Self {
        self.vector_size = dim;
        self
    }

    /// Sets the `.vec` iterator chunk size, in vectors.
    #[must_use]
    pub fn max_vector_buffer_size(mut self, vectors: u64) -> Self {
        self.max_vector_buffer_size = vectors;
        self
    }

    /// Sets the `.vec` append-buffer flush threshold, in vectors.
    #[must_use]
    pub fn max_vector_append_buffer_size(mut self, vectors: u64) -> Self {
        self.max_vector_append_buffer_size = vectors;
        self
    }
}

/// The JSON document persisted at `<dir>/<name>/<name>.json`.
#[derive(Clone, Debug, Default, Serialize, Deserialize)]
pub struct CollectionConfig {
    /// The dataset's buffer/dimension options
    pub dataset_options: DatasetOptions,

    /// Opaque per-embedder configuration, keyed by embedder name. Omitted
    /// from the written JSON when empty.
    #[serde(skip_serializing_if = "BTreeMap::is_empty", default)]
    pub embedders: BTreeMap<String, serde_json::Value>,

    /// Free-form human description. Omitted from the written JSON when absent.
    #[serde(skip_serializing_if = "Option::is_none", default)]
    pub description: Option<String>,
}

impl CollectionConfig {
    /// Builds a fresh config from the given options, with no embedders or
    /// description.
    #[must_use]
    pub fn new(dataset_options: DatasetOptions) -> Self {
        Self { dataset_options, embedders: BTreeMap::new(), description: None }
    }

    /// Writes this config, indented, to `path`.
    pub fn write(&self, path: &Path) -> Result<()> {
        log::debug!("writing collection config to {}", path.display());

        let file = File::create(path).map_err(|e| Error::create(path, e))?;
        serde_json::to_writer_pretty(file, self).map_err(|e| Error::ConfigInvalid(e.to_string()))
    }

    /// Reads a config from `path`.
    pub fn read(path: &Path) -> Result<Self> {
        log::debug!("reading collection config from {}", path.display());

        let file = File::open(path).map_err(|e| Error::read(path, e))?;
        serde_json::from_reader(BufReader::new(file)).map_err(|e| Error::ConfigInvalid(e.to_string()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use test_log::test;

    #[test]
    fn defaults_match_spec() {
        let opts = DatasetOptions::default();
        assert_eq!(1 << 17, opts.max_data_append_buffer_size);
        assert_eq!(1 << 15, opts.max_meta_data_append_buffer_size);
        assert_eq!(64, opts.max_index_append_buffer_size);
        assert_eq!(768, opts.vector_size);
        assert_eq!(64, opts.max_vector_buffer_size);
        assert_eq!(64, opts.max_vector_append_buffer_size);
    }

    #[test]
    fn roundtrips_through_json_file() -> Result<()> {
        let dir = tempfile::tempdir().expect("tempdir");
        let path = dir.path().join("x.json");

        let config = CollectionConfig::new(DatasetOptions::default().vector_size(3));
        config.write(&path)?;

        let loaded = CollectionConfig::read(&path)?;
        assert_eq!(3, loaded.dataset_options.vector_size);
        assert!(loaded.embedders.is_empty());
        assert!(loaded.description.is_none());

        Ok(())
    }

    #[test]
    fn omits_empty_embedders_and_description() {
        let config = CollectionConfig::new(DatasetOptions::default());
        let json = serde_json::to_string(&config).expect("serialize");
        assert!(!json.contains("embedders"));
        assert!(!json.contains("description"));
    }

    #[test]
    fn keeps_embedders_and_description_when_present() {
        let mut config = CollectionConfig::new(DatasetOptions::default());
        config
            .embedders
            .insert("openai".into(), serde_json::json!({"model": "x"}));
        config.description = Some("a test collection".into());

        let json = serde_json::to_string(&config).expect("serialize");
        assert!(json.contains("embedders"));
        assert!(json.contains("description"));
    }
}
