// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

use std::path::PathBuf;

/// Which filesystem operation an [`Error::Io`] was raised from.
///
/// Kept distinct from the wrapped [`std::io::Error`] so callers can match on
/// what was attempted rather than parse `io::ErrorKind`.
#[derive(Debug)]
pub enum IoKind {
    /// `fstat`/`metadata` failed
    Stat,
    /// A read failed
    Read,
    /// A write failed
    Write,
    /// An append failed
    Append,
    /// A seek failed
    Seek,
    /// A file create failed
    Create,
    /// The path pointed at a directory where a file was expected
    PathIsDir,
    /// An offset outside the valid range for the operation was supplied
    InvalidOffset,
}

impl std::fmt::Display for IoKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Stat => "stat",
            Self::Read => "read",
            Self::Write => "write",
            Self::Append => "append",
            Self::Seek => "seek",
            Self::Create => "create",
            Self::PathIsDir => "path is a directory",
            Self::InvalidOffset => "invalid offset",
        };
        write!(f, "{s}")
    }
}

/// Represents errors that can occur in the storage engine.
#[derive(Debug)]
pub enum Error {
    /// I/O error of a particular kind, optionally against a known path
    Io {
        /// What was being attempted
        kind: IoKind,
        /// The path involved, if known
        path: Option<PathBuf>,
        /// The underlying OS error, if this wraps one (`InvalidOffset` does not)
        source: Option<std::io::Error>,
    },

    /// Another process already holds the dataset's exclusive lock
    Locked,

    /// The dataset (or one of its sub-stores) has already been closed
    Closed,

    /// A record id is out of range for the current index
    IndexOutOfRange {
        /// The id that was requested
        id: u64,
        /// The current number of index rows
        count: u64,
    },

    /// The `.idx` file size is not a multiple of the row width
    IndexStorageCorrupted,

    /// A vector did not have the collection's configured dimension
    VectorDimensionMismatch {
        /// Expected dimension
        expected: u32,
        /// Actual length supplied
        got: usize,
    },

    /// `add_tags` was asked to add a tag the record already carries
    DuplicatedTag,

    /// `remove_tags` was asked to remove a tag the record does not carry
    TagNotFound,

    /// A group operation referenced a group id that does not exist
    GroupNotFound,

    /// `set_group` tried to assign a place already taken by another member
    DuplicatedPlace,

    /// A record already belongs to a different group than the one requested
    WrongGroup,

    /// The on-disk or supplied configuration could not be parsed
    ConfigInvalid(String),
}

impl Error {
    pub(crate) fn stat(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io { kind: IoKind::Stat, path: Some(path.to_path_buf()), source: Some(source) }
    }

    pub(crate) fn read(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io { kind: IoKind::Read, path: Some(path.to_path_buf()), source: Some(source) }
    }

    pub(crate) fn write(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io { kind: IoKind::Write, path: Some(path.to_path_buf()), source: Some(source) }
    }

    pub(crate) fn append(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io { kind: IoKind::Append, path: Some(path.to_path_buf()), source: Some(source) }
    }

    pub(crate) fn seek(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io { kind: IoKind::Seek, path: Some(path.to_path_buf()), source: Some(source) }
    }

    pub(crate) fn create(path: &std::path::Path, source: std::io::Error) -> Self {
        Self::Io { kind: IoKind::Create, path: Some(path.to_path_buf()), source: Some(source) }
    }

    pub(crate) fn path_is_dir(path: &std::path::Path) -> Self {
        Self::Io { kind: IoKind::PathIsDir, path: Some(path.to_path_buf()), source: None }
    }

    pub(crate) fn invalid_offset(offset: i64) -> Self {
        Self::Io {
            kind: IoKind::InvalidOffset,
            path: None,
            source: Some(std::io::Error::new(
                std::io::ErrorKind::InvalidInput,
                format!("offset {offset} is out of bounds"),
            )),
        }
    }
}

impl std::fmt::Display for Error {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Io { kind, path, source } => {
                write!(f, "I/O {kind} failed")?;
                if let Some(path) = path {
                    write!(f, " at {}", path.display())?;
                }
                if let Some(source) = source {
                    write!(f, ": {source}")?;
                }
                Ok(())
            }
            Self::Locked => write!(f, "dataset is locked by another process"),
            Self::Closed => write!(f, "dataset is closed"),
            Self::IndexOutOfRange { id, count } => {
                write!(f, "record id {id} is out of range (have {count} records)")
            }
            Self::IndexStorageCorrupted => write!(f, "index file size is not a row-width multiple"),
            Self::VectorDimensionMismatch { expected, got } => {
                write!(f, "vector has dimension {got}, expected {expected}")
            }
            Self::DuplicatedTag => write!(f, "tag already present on this record"),
            Self::TagNotFound => write!(f, "tag not present on this record"),
            Self::GroupNotFound => write!(f, "group does not exist"),
            Self::DuplicatedPlace => write!(f, "place already occupied in this group"),
            Self::WrongGroup => write!(f, "record belongs to a different group"),
            Self::ConfigInvalid(msg) => write!(f, "invalid configuration: {msg}"),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Self::Io { source, .. } => source.as_ref().map(|e| e as _),
            _ => None,
        }
    }
}

/// Dataset result type
pub type Result<T> = std::result::Result<T, Error>;
