// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! An embedded, single-writer, vector-enabled record store.
//!
//! A *collection* persists a sequence of records, each carrying an opaque
//! data blob, an opaque metadata blob, zero or one fixed-dimension float
//! vector, a set of lowercased tags, and optional membership in an ordered
//! group. The storage engine underneath a collection is six interlocking
//! columnar files (`.dat`, `.met`, `.idx`, `.vec`, `.tag`, `.grp`) bound
//! together by a fixed-width index, serialized by a single coarse mutex,
//! and guarded by an advisory exclusive file lock for single-writer
//! enforcement.
//!
//! This crate covers exactly that engine: append, partial update, point
//! read, tag/group lookup, soft-delete, compacting optimization, and
//! brute-force cosine vector search. A command-line surface, a fluent item
//! builder beyond [`NewTextItem`], and an embedder HTTP client are callers'
//! concerns, not this crate's.
//!
//! # Example
//!
//! ```
//! use mindb_core::{Collection, DatasetOptions, NewTextItem, ReadMask};
//! # let dir = tempfile::tempdir()?;
//!
//! let options = DatasetOptions::new().vector_size(3);
//! let collection = Collection::create(dir.path(), "notes", options)?;
//!
//! let id = collection.append_text(NewTextItem {
//!     text: "hello".into(),
//!     vector: Some(vec![1.0, 0.0, 0.0]),
//!     tags: vec!["greeting".into()],
//!     ..Default::default()
//! })?;
//!
//! let item = collection.read_text(id, ReadMask::ALL)?;
//! assert_eq!(Some("hello".to_string()), item.text);
//! # Ok::<(), mindb_core::Error>(())
//! ```

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs, clippy::cargo)]
#![deny(clippy::unwrap_used)]
#![warn(clippy::pedantic, clippy::nursery)]
#![warn(clippy::expect_used)]
#![allow(clippy::missing_const_for_fn)]
#![warn(clippy::multiple_crate_versions)]
#![allow(clippy::option_if_let_else)]

mod bytes;
pub mod collection;
pub mod config;
pub mod dataset;
mod error;
mod lock;
pub mod math;
mod path;
pub mod record;
pub mod storage;

pub use collection::{Collection, CollectionStats, Item, NewTextItem};
pub use config::{CollectionConfig, DatasetOptions};
pub use dataset::{Dataset, DatasetStats};
pub use error::{Error, IoKind, Result};
pub use lock::DatasetLock;
pub use math::{cosine_sim_ranking, cosine_similarity, ScoredId, SortOrder};
pub use record::{
    descriptor, AppendedItem, GroupHint, GroupInfo, IndexRow, NewItem, Record, ReadMask,
    INDEX_ROW_WIDTH, MARKED_FOR_REMOVAL,
};
