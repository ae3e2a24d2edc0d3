// SPDX-License-Identifier: MPL-2.0
//! Unaligned big/little endian stores for CDB fields.
//!
//! Every helper panics if the slice is too short, like indexing does; callers always pass
//! fixed-size arrays whose bounds are known at the call site.
use byteorder::{BigEndian, ByteOrder, LittleEndian};

/// Stores `v` as a big endian 16-bit value at the start of `buf`.
#[inline]
pub fn put_be16(buf: &mut [u8], v: u16) {
    BigEndian::write_u16(buf, v);
}

/// Stores the low 24 bits of `v` big endian at the start of `buf`.
#[inline]
pub fn put_be24(buf: &mut [u8], v: u32) {
    BigEndian::write_u24(buf, v & 0x00ff_ffff);
}

/// Stores `v` as a big endian 32-bit value at the start of `buf`.
#[inline]
pub fn put_be32(buf: &mut [u8], v: u32) {
    BigEndian::write_u32(buf, v);
}

/// Stores `v` as a little endian 16-bit value at the start of `buf`.
#[inline]
pub fn put_le16(buf: &mut [u8], v: u16) {
    LittleEndian::write_u16(buf, v);
}
