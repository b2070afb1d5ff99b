// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! The logical record shape a collection deals in, and the
//! fixed-width on-disk row that binds a record's sub-store locations
//! together.

/// Soft-delete flag bit. The only currently assigned bit in [`IndexRow::flags`].
pub const MARKED_FOR_REMOVAL: u8 = 0b0000_0001;

/// Data/metadata content type tag.
pub mod descriptor {
    /// Plain text content
    pub const TEXT: u8 = 1;
    /// Image content
    pub const IMAGE: u8 = 2;
}

/// Which optional fields a `read` call should load, as an independent bitmask.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq)]
pub struct ReadMask(u8);

impl ReadMask {
    /// Load the data blob.
    pub const DATA: Self = Self(0b0000_0001);
    /// Load the metadata blob.
    pub const META: Self = Self(0b0000_0010);
    /// Load the vector, if present.
    pub const VECTOR: Self = Self(0b0000_0100);
    /// Load the tag set.
    pub const TAGS: Self = Self(0b0000_1000);
    /// Load group membership info.
    pub const GROUP: Self = Self(0b0001_0000);
    /// Load every optional field.
    pub const ALL: Self = Self(0b0001_1111);
    /// Load only the index-derived fields (id, descriptors, flags).
    pub const NONE: Self = Self(0);

    /// Builds a mask from raw bits.
    #[must_use]
    pub fn from_bits(bits: u8) -> Self {
        Self(bits & Self::ALL.0)
    }

    /// Returns the raw bits.
    #[must_use]
    pub fn bits(self) -> u8 {
        self.0
    }

    /// Whether this mask requests the given field(s).
    #[must_use]
    pub fn contains(self, other: Self) -> bool {
        (self.0 & other.0) == other.0
    }
}

impl std::ops::BitOr for ReadMask {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

/// A request to place a newly-appended record into a group.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum GroupHint {
    /// `group_id == 0`: no group.
    None,
    /// `group_id == -1`: create a new group with this record as first member.
    New,
    /// `group_id >= 1`: assign this record into an existing group at `place`.
    Existing {
        /// The target group
        group_id: u64,
        /// The requested place within the group
        place: i64,
    },
}

impl GroupHint {
    /// Decodes the API-level `(group_id, place)` pair.
    #[must_use]
    pub fn from_raw(group_id: i64, place: i64) -> Self {
        match group_id {
            0 => Self::None,
            -1 => Self::New,
            id if id >= 1 => Self::Existing { group_id: id as u64, place },
            _ => Self::None,
        }
    }
}

/// An index row: one per logical record, in id order.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct IndexRow {
    /// Byte offset into `.dat`, or -1 if data is empty.
    pub offset: i64,
    /// Data length in bytes, or 0 if empty.
    pub size: i64,
    /// Byte offset into `.met`, or -1 if metadata is empty.
    pub meta_offset: i64,
    /// Metadata length in bytes, or 0 if empty.
    pub meta_size: i64,
    /// Position of this record's vector inside `.vec`, or -1 if none.
    pub vector_slot: i32,
    /// Data content type tag.
    pub data_descriptor: u8,
    /// Metadata content type tag.
    pub meta_descriptor: u8,
    /// Soft-delete and reserved flag bits.
    pub flags: u8,
}

impl IndexRow {
    /// An index row for a record with no data, no metadata, no vector, and
    /// no flags set yet — the shape `append` starts building from.
    #[must_use]
    pub fn empty() -> Self {
        Self {
            offset: -1,
            size: 0,
            meta_offset: -1,
            meta_size: 0,
            vector_slot: -1,
            data_descriptor: 0,
            meta_descriptor: 0,
            flags: 0,
        }
    }

    /// Whether [`MARKED_FOR_REMOVAL`] is set.
    #[must_use]
    pub fn is_removed(&self) -> bool {
        self.flags & MARKED_FOR_REMOVAL != 0
    }
}

/// Fixed on-disk width of one [`IndexRow`]: four signed 64-bit fields (32
/// bytes), one signed 32-bit field (4 bytes), and three packed 8-bit fields
/// plus a reserved padding byte to round out to an 8-byte-aligned width.
pub const INDEX_ROW_WIDTH: usize = 8 * 4 + 4 + 4;

impl IndexRow {
    /// Encodes this row into its fixed-width big-endian on-disk form.
    #[must_use]
    pub fn encode(&self) -> [u8; INDEX_ROW_WIDTH] {
        let mut buf = [0u8; INDEX_ROW_WIDTH];
        crate::bytes::write_i64_into(&mut buf[0..8], self.offset);
        crate::bytes::write_i64_into(&mut buf[8..16], self.size);
        crate::bytes::write_i64_into(&mut buf[16..24], self.meta_offset);
        crate::bytes::write_i64_into(&mut buf[24..32], self.meta_size);
        crate::bytes::write_i32_into(&mut buf[32..36], self.vector_slot);
        buf[36] = self.data_descriptor;
        buf[37] = self.meta_descriptor;
        buf[38] = self.flags;
        // buf[39] is reserved padding, left zero.
        buf
    }

    /// Decodes a row from its fixed-width on-disk form.
    #[must_use]
    pub fn decode(buf: &[u8; INDEX_ROW_WIDTH]) -> Self {
        Self {
            offset: crate::bytes::read_i64(buf, 0),
            size: crate::bytes::read_i64(buf, 8),
            meta_offset: crate::bytes::read_i64(buf, 16),
            meta_size: crate::bytes::read_i64(buf, 24),
            vector_slot: crate::bytes::read_i32(buf, 32),
            data_descriptor: buf[36],
            meta_descriptor: buf[37],
            flags: buf[38],
        }
    }
}

/// A fully materialized record as returned by `Dataset::read`.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Record {
    /// Assigned record id
    pub id: u64,
    /// Data content type tag
    pub data_descriptor: u8,
    /// Metadata content type tag
    pub meta_descriptor: u8,
    /// Soft-delete and reserved flag bits
    pub flags: u8,
    /// Data blob, loaded only if [`ReadMask::DATA`] was requested
    pub data: Option<Vec<u8>>,
    /// Metadata blob, loaded only if [`ReadMask::META`] was requested
    pub meta: Option<Vec<u8>>,
    /// Vector, loaded only if [`ReadMask::VECTOR`] was requested and present
    pub vector: Option<Vec<f32>>,
    /// Tags, loaded only if [`ReadMask::TAGS`] was requested
    pub tags: Option<Vec<String>>,
    /// Group membership, loaded only if [`ReadMask::GROUP`] was requested
    pub group: Option<GroupInfo>,
}

/// The group a record belongs to, and its rank within it.
///
/// `place` is the index of this record within the group's sorted-by-place
/// member list, not the raw value passed to `set_group`.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct GroupInfo {
    /// The group id
    pub group_id: u64,
    /// This record's rank within the group
    pub place: u64,
}

/// An item to be appended, before an id has been assigned.
#[derive(Clone, Debug, Default)]
pub struct NewItem {
    /// Data blob (may be empty)
    pub data: Vec<u8>,
    /// Data content type tag
    pub data_descriptor: u8,
    /// Metadata blob (may be empty)
    pub meta: Vec<u8>,
    /// Metadata content type tag
    pub meta_descriptor: u8,
    /// Optional fixed-dimension vector
    pub vector: Option<Vec<f32>>,
    /// Tags to attach
    pub tags: Vec<String>,
    /// Group id (-1 new, 0 none, >=1 existing)
    pub group_id: i64,
    /// Requested place within the group
    pub place: i64,
}

/// The result of `Dataset::append`: the item's assigned id and resolved group.
#[derive(Clone, Debug)]
pub struct AppendedItem {
    /// Assigned record id
    pub id: u64,
    /// Group the record ended up in, if any
    pub group_id: Option<u64>,
}
