use crate::*;
use std::path::Path;
use std::sync::Arc;

pub const MODES: [AccessMode; 2] = [AccessMode::Mmap, AccessMode::Buffered];

pub fn key(i: usize) -> Vec<u8> {
    format!("key{:04}", i).into_bytes()
}

pub fn value(i: usize) -> Vec<u8> {
    format!("value{}", i).into_bytes()
}

/// Writes `n` sequential entries with a small block size so that the table
/// spans several data blocks.
pub fn write_table(path: &Path, n: usize) -> Result<u64> {
    let mut builder = TableBuilder::with_block_size(path, bytewise(), 64)?;
    for i in 0..n {
        builder.add(&key(i), &value(i))?;
    }
    builder.finish()
}

pub fn open(path: &Path, mode: AccessMode, verify: bool) -> Result<Table> {
    Table::open(path, mode, bytewise(), verify)
}

pub fn flip_byte(path: &Path, offset: u64) {
    let mut data = std::fs::read(path).unwrap();
    data[offset as usize] ^= 0x5a;
    std::fs::write(path, &data).unwrap();
}

/// Orders keys from largest to smallest.
pub struct ReverseComparator;

impl Comparator for ReverseComparator {
    fn name(&self) -> &'static str {
        "reverse"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> std::cmp::Ordering {
        b.cmp(a)
    }
}

pub fn reverse() -> Arc<dyn Comparator> {
    Arc::new(ReverseComparator)
}
