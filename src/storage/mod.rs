// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The six on-disk sub-stores a dataset directory is made of.

pub mod data_log;
pub mod file;
pub mod group_store;
pub mod index_store;
pub mod tag_store;
pub mod vector_store;

pub use data_log::DataLog;
pub use file::FileStorage;
pub use group_store::GroupStore;
pub use index_store::IndexStore;
pub use tag_store::TagStore;
pub use vector_store::VectorStore;
