//! Table binary format constants, block handles, trailers and the footer.
//!
//! ## Block trailer (4 bytes)
//!
//! ```text
//! [masked_crc32c: u32 LE]
//! ```
//!
//! The checksum covers the block contents only. It is stored masked (see
//! [`crc32c::mask`]) so that an all-zero trailer never validates by accident.
//!
//! ## Footer (32 bytes) - magic `TBL1` (`0x5442_4c31`)
//!
//! ```text
//! [index_offset: u64][index_size: u32][entry_count: u64]
//! [block_count: u32][reserved: u32 = 0][magic: u32]
//! ```
//!
//! The reader always checks the magic, independent of checksum verification.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};
use std::io::{Result as IoResult, Write};

use crate::error::{Error, Result};

/// Magic number identifying table files (ASCII "TBL1").
pub const TABLE_MAGIC: u32 = 0x5442_4c31;

/// Size of the footer in bytes.
pub const FOOTER_BYTES: u64 = 8 + 4 + 8 + 4 + 4 + 4;

/// Size of the checksum trailer that follows every block.
pub const BLOCK_TRAILER_BYTES: usize = 4;

/// Target size of a data block before the builder cuts a new one.
pub const DEFAULT_BLOCK_SIZE: usize = 4 * 1024;

/// Upper bound on a single block. Prevents huge allocations on corrupt files.
pub const MAX_BLOCK_BYTES: u32 = 64 * 1024 * 1024;

/// Location of a block's contents within the file. `size` excludes the
/// trailer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BlockHandle {
    pub offset: u64,
    pub size: u32,
}

impl BlockHandle {
    /// First byte past the block's trailer, or `None` if that position does
    /// not fit in a `u64`.
    #[must_use]
    pub fn end_with_trailer(&self) -> Option<u64> {
        self.offset
            .checked_add(u64::from(self.size))?
            .checked_add(BLOCK_TRAILER_BYTES as u64)
    }
}

/// Parsed table footer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Footer {
    pub index: BlockHandle,
    pub entry_count: u64,
    pub block_count: u32,
}

impl Footer {
    pub fn write_to<W: Write>(&self, w: &mut W) -> IoResult<()> {
        w.write_u64::<LittleEndian>(self.index.offset)?;
        w.write_u32::<LittleEndian>(self.index.size)?;
        w.write_u64::<LittleEndian>(self.entry_count)?;
        w.write_u32::<LittleEndian>(self.block_count)?;
        w.write_u32::<LittleEndian>(0)?;
        w.write_u32::<LittleEndian>(TABLE_MAGIC)?;
        Ok(())
    }

    /// Decodes the last [`FOOTER_BYTES`] of a table file.
    ///
    /// # Errors
    ///
    /// Returns an [`Error::Io`] of kind `InvalidData` if the buffer has the
    /// wrong length or the magic does not match.
    pub fn decode(buf: &[u8]) -> Result<Self> {
        if buf.len() != FOOTER_BYTES as usize {
            return Err(Error::malformed(format!(
                "footer must be {} bytes, got {}",
                FOOTER_BYTES,
                buf.len()
            )));
        }
        let magic = LittleEndian::read_u32(&buf[28..32]);
        if magic != TABLE_MAGIC {
            return Err(Error::malformed(format!("bad table magic: {:#x}", magic)));
        }
        Ok(Self {
            index: BlockHandle {
                offset: LittleEndian::read_u64(&buf[0..8]),
                size: LittleEndian::read_u32(&buf[8..12]),
            },
            entry_count: LittleEndian::read_u64(&buf[12..20]),
            block_count: LittleEndian::read_u32(&buf[20..24]),
        })
    }
}

/// Writes `contents` followed by its masked CRC32C trailer.
pub fn write_block<W: Write>(w: &mut W, contents: &[u8]) -> IoResult<()> {
    w.write_all(contents)?;
    w.write_u32::<LittleEndian>(crc32c::mask(crc32c::checksum(contents)))?;
    Ok(())
}

/// Checks a block's contents against the masked checksum in its trailer.
///
/// # Errors
///
/// Returns [`Error::Corruption`] on mismatch.
pub fn verify_block(contents: &[u8], trailer: &[u8], offset: u64) -> Result<()> {
    let expected = crc32c::unmask(LittleEndian::read_u32(trailer));
    let actual = crc32c::checksum(contents);
    if actual != expected {
        return Err(Error::corruption(format!(
            "block checksum mismatch at offset {}: expected {:#010x}, got {:#010x}",
            offset, expected, actual
        )));
    }
    Ok(())
}
