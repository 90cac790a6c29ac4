use std::cmp::Ordering;
use std::fs::{rename, File, OpenOptions};
use std::io::{BufWriter, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use tracing::debug;

use crate::block::{encode_entry, encode_index, IndexEntry};
use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::format::{
    write_block, BlockHandle, Footer, BLOCK_TRAILER_BYTES, DEFAULT_BLOCK_SIZE, FOOTER_BYTES,
    MAX_BLOCK_BYTES,
};

/// Streams sorted key/value pairs into a new table file.
///
/// The write is crash-safe: everything goes to `<path>.sst.tmp`, which is
/// fsynced and atomically renamed over `path` by [`finish`](TableBuilder::finish).
/// A builder that is dropped or [`abandon`](TableBuilder::abandon)ed removes
/// its temp file.
///
/// Every block, including the index block, is followed by the masked CRC32C
/// of its contents.
pub struct TableBuilder {
    path: PathBuf,
    tmp_path: PathBuf,
    file: Option<BufWriter<File>>,
    comparator: Arc<dyn Comparator>,
    block_size: usize,
    /// Contents of the data block being filled.
    block: Vec<u8>,
    last_key: Option<Vec<u8>>,
    index: Vec<IndexEntry>,
    /// Bytes written so far.
    offset: u64,
    entry_count: u64,
    finished: bool,
}

impl TableBuilder {
    /// Starts a table at `path` with the default block size.
    ///
    /// # Errors
    ///
    /// Returns an error if the temp file cannot be created.
    pub fn create<P: AsRef<Path>>(path: P, comparator: Arc<dyn Comparator>) -> Result<Self> {
        Self::with_block_size(path, comparator, DEFAULT_BLOCK_SIZE)
    }

    /// Starts a table whose data blocks are cut once they reach `block_size`
    /// bytes. A `block_size` of 0 puts every entry in its own block.
    pub fn with_block_size<P: AsRef<Path>>(
        path: P,
        comparator: Arc<dyn Comparator>,
        block_size: usize,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let tmp_path = path.with_extension("sst.tmp");
        let raw_file = OpenOptions::new()
            .create(true)
            .write(true)
            .truncate(true)
            .open(&tmp_path)?;

        Ok(Self {
            path,
            tmp_path,
            file: Some(BufWriter::new(raw_file)),
            comparator,
            block_size,
            block: Vec::with_capacity(block_size.min(1 << 20)),
            last_key: None,
            index: Vec::new(),
            offset: 0,
            entry_count: 0,
            finished: false,
        })
    }

    /// Writes a whole table from an iterator of pairs in ascending key order.
    ///
    /// Returns the size of the finished file.
    pub fn write_from_iterator<P, I>(path: P, comparator: Arc<dyn Comparator>, iter: I) -> Result<u64>
    where
        P: AsRef<Path>,
        I: IntoIterator<Item = (Vec<u8>, Vec<u8>)>,
    {
        let mut builder = Self::create(path, comparator)?;
        for (key, value) in iter {
            builder.add(&key, &value)?;
        }
        builder.finish()
    }

    /// Appends one entry.
    ///
    /// # Errors
    ///
    /// Returns [`Error::OutOfOrder`] if `key` is not strictly greater than the
    /// previous key under the builder's comparator,
    /// [`Error::EntryTooLarge`] if the encoded entry alone would exceed
    /// [`MAX_BLOCK_BYTES`], or an I/O error if a completed block cannot be
    /// written. A rejected entry leaves the builder unchanged.
    pub fn add(&mut self, key: &[u8], value: &[u8]) -> Result<()> {
        let max = MAX_BLOCK_BYTES as usize;
        let size = encoded_entry_len(key, value);
        if size > max {
            return Err(Error::EntryTooLarge { size, max });
        }
        if let Some(last) = &self.last_key {
            if self.comparator.compare(key, last) != Ordering::Greater {
                return Err(Error::OutOfOrder);
            }
        }

        // Keep every block within the limit the reader enforces.
        if self.block.len() + size > max {
            self.flush_block()?;
        }

        encode_entry(&mut self.block, key, value);
        self.last_key = Some(key.to_vec());
        self.entry_count += 1;

        if self.block.len() >= self.block_size {
            self.flush_block()?;
        }
        Ok(())
    }

    /// Number of entries added so far.
    #[must_use]
    pub fn entry_count(&self) -> u64 {
        self.entry_count
    }

    fn flush_block(&mut self) -> Result<()> {
        if self.block.is_empty() {
            return Ok(());
        }
        let handle = BlockHandle {
            offset: self.offset,
            size: block_len(self.block.len())?,
        };
        let file = self.file.as_mut().ok_or(Error::Closed)?;
        write_block(file, &self.block)?;
        self.advance(handle.size);

        // The block was non-empty, so at least one key has been added.
        let last_key = self.last_key.clone().unwrap_or_default();
        self.index.push(IndexEntry { last_key, handle });
        self.block.clear();
        Ok(())
    }

    fn advance(&mut self, size: u32) {
        self.offset += u64::from(size) + BLOCK_TRAILER_BYTES as u64;
    }

    /// Writes the index block and footer, syncs, and moves the file into
    /// place. Returns the final file size.
    pub fn finish(mut self) -> Result<u64> {
        self.flush_block()?;

        let index_contents = encode_index(&self.index);
        let footer = Footer {
            index: BlockHandle {
                offset: self.offset,
                size: block_len(index_contents.len())?,
            },
            entry_count: self.entry_count,
            block_count: self.index.len() as u32,
        };

        let mut file = self.file.take().ok_or(Error::Closed)?;
        write_block(&mut file, &index_contents)?;
        footer.write_to(&mut file)?;
        self.advance(footer.index.size);

        // Flush BufWriter, then sync the underlying file
        file.flush()?;
        file.into_inner().map_err(|e| e.into_error())?.sync_all()?;

        // Atomically move into place
        rename(&self.tmp_path, &self.path)?;
        self.finished = true;

        // Make the rename durable.
        if let Some(parent) = self.path.parent() {
            if let Ok(dir) = File::open(parent) {
                let _ = dir.sync_all();
            }
        }

        let size = self.offset + FOOTER_BYTES;
        debug!(
            path = %self.path.display(),
            entries = self.entry_count,
            blocks = self.index.len(),
            size,
            "table written"
        );
        Ok(size)
    }

    /// Gives up on the table and removes the temp file.
    pub fn abandon(mut self) {
        self.discard();
    }

    fn discard(&mut self) {
        self.file.take();
        if !self.finished {
            let _ = std::fs::remove_file(&self.tmp_path);
        }
    }
}

impl Drop for TableBuilder {
    fn drop(&mut self) {
        self.discard();
    }
}

fn encoded_entry_len(key: &[u8], value: &[u8]) -> usize {
    key.len().saturating_add(value.len()).saturating_add(8)
}

fn block_len(len: usize) -> Result<u32> {
    u32::try_from(len)
        .ok()
        .filter(|&n| n <= MAX_BLOCK_BYTES)
        .ok_or(Error::BlockTooLarge {
            size: len,
            max: MAX_BLOCK_BYTES as usize,
        })
}
