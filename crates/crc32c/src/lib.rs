//! # CRC32C - Block Checksums
//!
//! CRC32C (Castagnoli) checksums for on-disk table blocks, plus the masking
//! transform applied to a checksum before it is persisted.
//!
//! ## Why mask?
//!
//! The CRC of a perfectly valid block can itself be zero, and a zeroed
//! checksum field is also what a torn or never-written trailer looks like.
//! Every checksum is therefore stored in its *masked* form and unmasked after
//! it is read back:
//!
//! ```text
//! write: crc = checksum(block) -> mask(crc)   -> trailer
//! read:  trailer -> unmask(stored) -> compare against checksum(block)
//! ```
//!
//! `mask` is a right-rotation by 15 bits followed by a wrapping add of
//! [`MASK_DELTA`]; `unmask` is its exact inverse.
//!
//! ## Example
//!
//! ```rust
//! use crc32c::{checksum, mask, unmask, Crc32c};
//!
//! let mut crc = Crc32c::new();
//! crc.update(b"hello ");
//! crc.update(b"world");
//! assert_eq!(crc.value(), checksum(b"hello world"));
//! assert_eq!(unmask(mask(crc.value())), crc.value());
//! ```

use std::hash::Hasher;

/// Reflected Castagnoli polynomial (`0x1EDC6F41` bit-reversed).
pub const CASTAGNOLI_POLY: u32 = 0x82f6_3b78;

/// Constant added to the rotated checksum by [`mask`].
pub const MASK_DELTA: u32 = 0xa282_ead8;

/// Slicing-by-8 lookup tables, built at compile time.
///
/// `TABLES[0]` is the classic byte-at-a-time table. `TABLES[k][i]` is the CRC
/// contribution of byte `i` followed by `k` zero bytes.
static TABLES: [[u32; 256]; 8] = build_tables();

const fn build_tables() -> [[u32; 256]; 8] {
    let mut tables = [[0u32; 256]; 8];

    let mut i = 0;
    while i < 256 {
        let mut crc = i as u32;
        let mut bit = 0;
        while bit < 8 {
            crc = if crc & 1 != 0 {
                (crc >> 1) ^ CASTAGNOLI_POLY
            } else {
                crc >> 1
            };
            bit += 1;
        }
        tables[0][i] = crc;
        i += 1;
    }

    let mut k = 1;
    while k < 8 {
        let mut i = 0;
        while i < 256 {
            let prev = tables[k - 1][i];
            tables[k][i] = (prev >> 8) ^ tables[0][(prev & 0xff) as usize];
            i += 1;
        }
        k += 1;
    }

    tables
}

/// Continues a CRC32C computation: returns the checksum of `A || data` given
/// `crc = checksum(A)`.
///
/// `extend(0, data)` is the checksum of `data` alone.
#[must_use]
pub fn extend(crc: u32, data: &[u8]) -> u32 {
    let t = &TABLES;
    let mut c = !crc;

    let mut chunks = data.chunks_exact(8);
    for chunk in &mut chunks {
        let lo = u32::from_le_bytes([chunk[0], chunk[1], chunk[2], chunk[3]]) ^ c;
        let hi = u32::from_le_bytes([chunk[4], chunk[5], chunk[6], chunk[7]]);
        c = t[7][(lo & 0xff) as usize]
            ^ t[6][((lo >> 8) & 0xff) as usize]
            ^ t[5][((lo >> 16) & 0xff) as usize]
            ^ t[4][(lo >> 24) as usize]
            ^ t[3][(hi & 0xff) as usize]
            ^ t[2][((hi >> 8) & 0xff) as usize]
            ^ t[1][((hi >> 16) & 0xff) as usize]
            ^ t[0][(hi >> 24) as usize];
    }

    for &byte in chunks.remainder() {
        c = t[0][((c ^ byte as u32) & 0xff) as usize] ^ (c >> 8);
    }

    !c
}

/// Returns the CRC32C checksum of `data`.
#[must_use]
pub fn checksum(data: &[u8]) -> u32 {
    extend(0, data)
}

/// Returns the masked representation of `crc`, suitable for storing on disk.
#[must_use]
pub fn mask(crc: u32) -> u32 {
    crc.rotate_right(15).wrapping_add(MASK_DELTA)
}

/// Inverse of [`mask`].
#[must_use]
pub fn unmask(masked: u32) -> u32 {
    masked.wrapping_sub(MASK_DELTA).rotate_left(15)
}

/// Incremental CRC32C accumulator.
///
/// Feeding consecutive slices of a byte sequence through [`update`](Crc32c::update)
/// produces exactly the same [`value`](Crc32c::value) as a single call with
/// the whole sequence.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct Crc32c {
    crc: u32,
}

impl Crc32c {
    /// Creates an accumulator with no input consumed.
    #[must_use]
    pub fn new() -> Self {
        Self { crc: 0 }
    }

    /// Feeds `data` into the checksum.
    pub fn update(&mut self, data: &[u8]) {
        self.crc = extend(self.crc, data);
    }

    /// Feeds `length` bytes of `buf` starting at `offset`.
    ///
    /// # Panics
    ///
    /// Panics if `offset + length` is past the end of `buf`.
    pub fn update_range(&mut self, buf: &[u8], offset: usize, length: usize) {
        self.update(&buf[offset..offset + length]);
    }

    /// Returns the checksum of everything fed so far.
    #[must_use]
    pub fn value(&self) -> u32 {
        self.crc
    }

    /// Returns [`mask`] applied to the current value.
    #[must_use]
    pub fn masked_value(&self) -> u32 {
        mask(self.crc)
    }

    /// Forgets all input.
    pub fn reset(&mut self) {
        self.crc = 0;
    }
}

impl Hasher for Crc32c {
    fn finish(&self) -> u64 {
        u64::from(self.crc)
    }

    fn write(&mut self, bytes: &[u8]) {
        self.update(bytes);
    }
}
