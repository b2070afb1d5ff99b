// Copyright (c) 2024-present, fjall-rs
// This source code is licensed under both the Apache 2.0 and MIT License
// (found in the LICENSE-* files in the repository)

//! Bulk reinterpretation between float32 slices and byte slices, and
//! big-endian integer packing for the index row encoding.
//!
//! Only the read path from a file buffer may reinterpret bytes in place;
//! every conversion that crosses an API boundary here copies, so callers are
//! never exposed to a buffer that could be reallocated or a file descriptor
//! that could be reused out from under them.

use byteorder::{BigEndian, ByteOrder};

/// Converts a slice of `f32` into its little-endian byte representation.
///
/// Native-endianness round-trips (the vector store never needs to be portable
/// across architectures within a single run), but a fixed endianness is used
/// so that any future cross-host replication would not silently misbehave.
#[must_use]
pub fn floats_to_bytes(floats: &[f32]) -> Vec<u8> {
    let mut out = Vec::with_capacity(floats.len() * 4);
    for f in floats {
        out.extend_from_slice(&f.to_le_bytes());
    }
    out
}

/// Converts a byte slice (length must be a multiple of 4) back into owned
/// `f32`s.
#[must_use]
pub fn bytes_to_floats(bytes: &[u8]) -> Vec<f32> {
    bytes
        .chunks_exact(4)
        .map(|chunk| {
            let mut buf = [0u8; 4];
            buf.copy_from_slice(chunk);
            f32::from_le_bytes(buf)
        })
        .collect()
}

/// Packs a big-endian signed 64-bit integer.
pub fn write_i64(buf: &mut Vec<u8>, value: i64) {
    let mut tmp = [0u8; 8];
    BigEndian::write_i64(&mut tmp, value);
    buf.extend_from_slice(&tmp);
}

/// Packs a big-endian signed 32-bit integer.
pub fn write_i32(buf: &mut Vec<u8>, value: i32) {
    let mut tmp = [0u8; 4];
    BigEndian::write_i32(&mut tmp, value);
    buf.extend_from_slice(&tmp);
}

/// Writes a big-endian signed 64-bit integer into an 8-byte slice.
pub fn write_i64_into(slice: &mut [u8], value: i64) {
    BigEndian::write_i64(slice, value);
}

/// Writes a big-endian signed 32-bit integer into a 4-byte slice.
pub fn write_i32_into(slice: &mut [u8], value: i32) {
    BigEndian::write_i32(slice, value);
}

/// Reads a big-endian signed 64-bit integer at `offset`.
#[must_use]
pub fn read_i64(buf: &[u8], offset: usize) -> i64 {
    BigEndian::read_i64(&buf[offset..offset + 8])
}

/// Reads a big-endian signed 32-bit integer at `offset`.
#[must_use]
pub fn read_i32(buf: &[u8], offset: usize) -> i32 {
    BigEndian::read_i32(&buf[offset..offset + 4])
}
