use crate::*;
use sstable::TableBuilder;
use std::collections::HashMap;
use std::path::Path;
use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

pub const MODES: [AccessMode; 2] = [AccessMode::Mmap, AccessMode::Buffered];

pub fn key(i: usize) -> Vec<u8> {
    format!("key{:04}", i).into_bytes()
}

pub fn value(i: usize) -> Vec<u8> {
    format!("value{}", i).into_bytes()
}

/// Writes table `file_number` into `dir` with `n` entries spread over
/// several blocks. Every value is prefixed with the file number so tests can
/// tell tables apart.
pub fn write_table(dir: &Path, file_number: u64, n: usize) -> anyhow::Result<()> {
    let path = table_file_path(dir, file_number);
    let mut builder = TableBuilder::with_block_size(&path, bytewise(), 64)?;
    for i in 0..n {
        builder.add(&key(i), &tagged_value(file_number, i))?;
    }
    builder.finish()?;
    Ok(())
}

pub fn tagged_value(file_number: u64, i: usize) -> Vec<u8> {
    let mut v = format!("{}:", file_number).into_bytes();
    v.extend_from_slice(&value(i));
    v
}

pub fn options(capacity: usize, mode: AccessMode) -> Options {
    Options::default()
        .with_table_cache_size(capacity)
        .with_access_mode(mode)
        .with_verify_checksums(true)
}

pub fn disk_cache(dir: &Path, capacity: usize) -> TableCache {
    TableCache::new(dir, &options(capacity, AccessMode::Mmap), bytewise()).unwrap()
}

/// Wraps a [`DiskTableLoader`], counting opens per file number and
/// optionally sleeping before each open to widen race windows.
pub struct CountingLoader {
    inner: DiskTableLoader,
    delay: Duration,
    opens: Mutex<HashMap<u64, usize>>,
}

impl CountingLoader {
    pub fn new(dir: &Path, delay: Duration) -> Self {
        Self {
            inner: DiskTableLoader::new(dir, &options(1, AccessMode::Buffered), bytewise()),
            delay,
            opens: Mutex::new(HashMap::new()),
        }
    }

    pub fn opens(&self, file_number: u64) -> usize {
        self.opens.lock().get(&file_number).copied().unwrap_or(0)
    }

    pub fn total_opens(&self) -> usize {
        self.opens.lock().values().sum()
    }
}

impl TableLoader for CountingLoader {
    fn load(&self, file_number: u64) -> sstable::Result<Table> {
        *self.opens.lock().entry(file_number).or_insert(0) += 1;
        if !self.delay.is_zero() {
            thread::sleep(self.delay);
        }
        self.inner.load(file_number)
    }
}

pub fn counting_cache(dir: &Path, capacity: usize, delay: Duration) -> Arc<TableCache<CountingLoader>> {
    Arc::new(TableCache::with_loader(capacity, CountingLoader::new(dir, delay)).unwrap())
}

pub fn collect_keys(iter: CachedTableIterator) -> anyhow::Result<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    for item in iter {
        out.push(item?.0);
    }
    Ok(out)
}
