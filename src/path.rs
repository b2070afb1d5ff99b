// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::path::{Path, PathBuf};

/// Joins a collection's directory and name into the directory that holds its
/// six sub-store files, e.g. `<path>/<name>/`.
#[allow(clippy::module_name_repetitions)]
pub fn collection_dir<P: AsRef<Path>>(path: P, name: &str) -> PathBuf {
    path.as_ref().join(name)
}

/// Builds `<dir>/<name>.<ext>` for one of the dataset's sub-store files.
pub fn sub_store_path(dir: &Path, name: &str, ext: &str) -> PathBuf {
    dir.join(format!("{name}.{ext}"))
}
