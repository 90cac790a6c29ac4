//! Encoding of block contents.
//!
//! ```text
//! data block : repeated key_len (u32) | key | val_len (u32) | val
//! index block: repeated key_len (u32) | last_key | offset (u64) | size (u32)
//! ```
//!
//! Decoding never trusts a length field: anything that would run past the
//! end of the block is reported as malformed data.

use byteorder::{ByteOrder, LittleEndian, WriteBytesExt};

use crate::error::{Error, Result};
use crate::format::BlockHandle;

/// One index entry: the last key stored in a data block, and where that block
/// lives.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct IndexEntry {
    pub last_key: Vec<u8>,
    pub handle: BlockHandle,
}

pub(crate) fn encode_entry(buf: &mut Vec<u8>, key: &[u8], value: &[u8]) {
    // Writes into a Vec cannot fail.
    let _ = buf.write_u32::<LittleEndian>(key.len() as u32);
    buf.extend_from_slice(key);
    let _ = buf.write_u32::<LittleEndian>(value.len() as u32);
    buf.extend_from_slice(value);
}

pub(crate) fn encode_index(entries: &[IndexEntry]) -> Vec<u8> {
    let mut buf = Vec::new();
    for entry in entries {
        let _ = buf.write_u32::<LittleEndian>(entry.last_key.len() as u32);
        buf.extend_from_slice(&entry.last_key);
        let _ = buf.write_u64::<LittleEndian>(entry.handle.offset);
        let _ = buf.write_u32::<LittleEndian>(entry.handle.size);
    }
    buf
}

/// Bounds-checked reader over block contents.
struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn is_empty(&self) -> bool {
        self.pos >= self.buf.len()
    }

    fn take(&mut self, n: usize) -> Result<&'a [u8]> {
        let end = self
            .pos
            .checked_add(n)
            .filter(|&end| end <= self.buf.len())
            .ok_or_else(|| {
                Error::malformed(format!(
                    "truncated block: need {} bytes at {}, block has {}",
                    n,
                    self.pos,
                    self.buf.len()
                ))
            })?;
        let out = &self.buf[self.pos..end];
        self.pos = end;
        Ok(out)
    }

    fn u32(&mut self) -> Result<u32> {
        Ok(LittleEndian::read_u32(self.take(4)?))
    }

    fn u64(&mut self) -> Result<u64> {
        Ok(LittleEndian::read_u64(self.take(8)?))
    }

    fn bytes(&mut self) -> Result<Vec<u8>> {
        let len = self.u32()? as usize;
        Ok(self.take(len)?.to_vec())
    }
}

pub(crate) fn decode_entries(contents: &[u8]) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
    let mut cur = Cursor::new(contents);
    let mut entries = Vec::new();
    while !cur.is_empty() {
        let key = cur.bytes()?;
        let value = cur.bytes()?;
        entries.push((key, value));
    }
    Ok(entries)
}

pub(crate) fn decode_index(contents: &[u8]) -> Result<Vec<IndexEntry>> {
    let mut cur = Cursor::new(contents);
    let mut entries = Vec::new();
    while !cur.is_empty() {
        let last_key = cur.bytes()?;
        let offset = cur.u64()?;
        let size = cur.u32()?;
        entries.push(IndexEntry {
            last_key,
            handle: BlockHandle { offset, size },
        });
    }
    Ok(entries)
}
