use std::borrow::Cow;
use std::cmp::Ordering;
use std::fmt;
use std::fs::File;
use std::io::{Read, Seek, SeekFrom};
use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::AccessMode;
use memmap2::Mmap;
use parking_lot::Mutex;
use tracing::{debug, trace};

use crate::block::{decode_entries, decode_index, IndexEntry};
use crate::comparator::Comparator;
use crate::error::{Error, Result};
use crate::format::{
    verify_block, BlockHandle, Footer, BLOCK_TRAILER_BYTES, FOOTER_BYTES, MAX_BLOCK_BYTES,
};
use crate::iterator::TableIterator;

/// The OS resource behind an open table.
enum TableFile {
    /// Whole file mapped read-only. The descriptor is closed right after
    /// mapping; the mapping keeps the pages reachable.
    Mapped(Mmap),
    /// Descriptor kept open; reads seek and read under the mutex.
    Buffered(Mutex<File>),
}

impl TableFile {
    fn open(file: File, mode: AccessMode) -> Result<Self> {
        match mode {
            AccessMode::Mmap => {
                // SAFETY: table files are immutable once renamed into place;
                // nothing in this process writes or truncates them while mapped.
                let mmap = unsafe { Mmap::map(&file)? };
                Ok(TableFile::Mapped(mmap))
            }
            AccessMode::Buffered => Ok(TableFile::Buffered(Mutex::new(file))),
        }
    }

    /// Reads `len` bytes at `offset`. The mapped variant borrows straight
    /// from the mapping.
    fn read(&self, offset: u64, len: usize, file_size: u64) -> Result<Cow<'_, [u8]>> {
        let end = offset
            .checked_add(len as u64)
            .filter(|&end| end <= file_size)
            .ok_or_else(|| {
                Error::malformed(format!(
                    "read of {} bytes at offset {} runs past end of file ({} bytes)",
                    len, offset, file_size
                ))
            })?;

        match self {
            TableFile::Mapped(mmap) => Ok(Cow::Borrowed(&mmap[offset as usize..end as usize])),
            TableFile::Buffered(file) => {
                let mut buf = vec![0u8; len];
                let mut f = file.lock();
                f.seek(SeekFrom::Start(offset))?;
                f.read_exact(&mut buf)?;
                Ok(Cow::Owned(buf))
            }
        }
    }
}

/// An open, immutable table file.
///
/// On [`open`](Table::open) the footer and the whole index block are loaded
/// into memory; data blocks are read on demand. The table can be shared
/// across threads behind an `Arc`: every read goes through `&self`.
///
/// When `verify_checksums` is set, every block read (index and data) is
/// checked against its masked CRC32C trailer and a mismatch is reported as
/// [`Error::Corruption`].
pub struct Table {
    path: PathBuf,
    access_mode: AccessMode,
    comparator: Arc<dyn Comparator>,
    verify_checksums: bool,
    footer: Footer,
    /// One entry per data block, in key order.
    index: Vec<IndexEntry>,
    file_size: u64,
    /// `None` once [`close`](Table::close) has run.
    file: Option<TableFile>,
}

impl Table {
    /// Opens the table at `path`.
    ///
    /// # Validation
    ///
    /// - The file must be at least [`FOOTER_BYTES`] long and end with the
    ///   table magic.
    /// - The index block and every block it references must lie inside the
    ///   file, before the footer.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Io`] if the file cannot be opened or read, or if its
    /// structure is malformed (kind `InvalidData`). Returns
    /// [`Error::Corruption`] only when `verify_checksums` is set and the index
    /// block fails its checksum.
    pub fn open<P: AsRef<Path>>(
        path: P,
        access_mode: AccessMode,
        comparator: Arc<dyn Comparator>,
        verify_checksums: bool,
    ) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let file = File::open(&path)?;
        let file_size = file.metadata()?.len();

        if file_size < FOOTER_BYTES {
            return Err(Error::malformed(format!(
                "table file too small: {} bytes",
                file_size
            )));
        }

        let table_file = TableFile::open(file, access_mode)?;

        let footer_offset = file_size - FOOTER_BYTES;
        let footer = Footer::decode(&table_file.read(
            footer_offset,
            FOOTER_BYTES as usize,
            file_size,
        )?)?;

        match footer.index.end_with_trailer() {
            Some(end) if end <= footer_offset => {}
            _ => {
                return Err(Error::malformed(format!(
                    "index block at offset {} ({} bytes) overlaps footer",
                    footer.index.offset, footer.index.size
                )))
            }
        }

        let mut table = Self {
            path,
            access_mode,
            comparator,
            verify_checksums,
            footer,
            index: Vec::new(),
            file_size,
            file: Some(table_file),
        };

        let contents = table.read_block_contents(footer.index)?;
        let index = decode_index(&contents)?;
        drop(contents);

        if index.len() != footer.block_count as usize {
            return Err(Error::malformed(format!(
                "index lists {} blocks, footer says {}",
                index.len(),
                footer.block_count
            )));
        }
        for entry in &index {
            let in_bounds = entry
                .handle
                .end_with_trailer()
                .is_some_and(|end| end <= footer.index.offset);
            if !in_bounds {
                return Err(Error::malformed(format!(
                    "data block at offset {} overlaps the index",
                    entry.handle.offset
                )));
            }
        }
        table.index = index;

        debug!(
            path = %table.path.display(),
            mode = %access_mode,
            blocks = table.index.len(),
            entries = footer.entry_count,
            verify_checksums,
            "opened table"
        );
        Ok(table)
    }

    #[must_use]
    pub fn path(&self) -> &Path {
        &self.path
    }

    #[must_use]
    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }

    #[must_use]
    pub fn verify_checksums(&self) -> bool {
        self.verify_checksums
    }

    #[must_use]
    pub fn comparator(&self) -> &Arc<dyn Comparator> {
        &self.comparator
    }

    #[must_use]
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Number of key/value entries in the table.
    #[must_use]
    pub fn len(&self) -> u64 {
        self.footer.entry_count
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.footer.entry_count == 0
    }

    #[must_use]
    pub fn block_count(&self) -> usize {
        self.index.len()
    }

    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.file.is_none()
    }

    /// Returns an iterator over all entries in ascending key order.
    pub fn iter(&self) -> TableIterator<&Table> {
        TableIterator::new(self)
    }

    /// Point lookup.
    ///
    /// Only the one data block that could hold `key` is read.
    ///
    /// # Errors
    ///
    /// Returns an error if the block cannot be read or fails verification.
    pub fn get(&self, key: &[u8]) -> Result<Option<Vec<u8>>> {
        let block = self.find_block(key);
        if block >= self.index.len() {
            return Ok(None);
        }
        let entries = self.read_block(block)?;
        let found = entries
            .binary_search_by(|(k, _)| self.comparator.compare(k, key))
            .ok()
            .map(|i| entries[i].1.clone());
        Ok(found)
    }

    /// Estimates the byte offset at which `key` is (or would be) stored.
    ///
    /// Uses only the in-memory index: the answer is the offset of the first
    /// data block whose last key is `>= key`. Keys past the end of the table
    /// map to the start of the index block, which is roughly the size of the
    /// data section.
    #[must_use]
    pub fn approximate_offset_of(&self, key: &[u8]) -> u64 {
        match self.index.get(self.find_block(key)) {
            Some(entry) => entry.handle.offset,
            None => self.footer.index.offset,
        }
    }

    /// Releases the memory mapping or file descriptor.
    ///
    /// Calling `close` on an already closed table does nothing. Reads after
    /// close fail with [`Error::Closed`]; index-only queries such as
    /// [`approximate_offset_of`](Table::approximate_offset_of) keep working.
    pub fn close(&mut self) -> Result<()> {
        if let Some(file) = self.file.take() {
            drop(file);
            debug!(path = %self.path.display(), mode = %self.access_mode, "closed table");
        }
        Ok(())
    }

    /// Index of the first data block whose last key is `>= key`, or
    /// `block_count()` if every key in the table is smaller.
    pub(crate) fn find_block(&self, key: &[u8]) -> usize {
        self.index
            .partition_point(|e| self.comparator.compare(&e.last_key, key) == Ordering::Less)
    }

    /// Reads and decodes data block `block`.
    pub(crate) fn read_block(&self, block: usize) -> Result<Vec<(Vec<u8>, Vec<u8>)>> {
        let handle = self.index[block].handle;
        trace!(path = %self.path.display(), block, offset = handle.offset, "read block");
        let contents = self.read_block_contents(handle)?;
        decode_entries(&contents)
    }

    fn read_block_contents(&self, handle: BlockHandle) -> Result<Cow<'_, [u8]>> {
        let file = self.file.as_ref().ok_or(Error::Closed)?;
        if handle.size > MAX_BLOCK_BYTES {
            return Err(Error::malformed(format!(
                "block at offset {} claims {} bytes",
                handle.offset, handle.size
            )));
        }

        let len = handle.size as usize + BLOCK_TRAILER_BYTES;
        let raw = file.read(handle.offset, len, self.file_size)?;

        if self.verify_checksums {
            let (contents, trailer) = raw.split_at(handle.size as usize);
            verify_block(contents, trailer, handle.offset)?;
        }

        Ok(match raw {
            Cow::Borrowed(bytes) => Cow::Borrowed(&bytes[..handle.size as usize]),
            Cow::Owned(mut bytes) => {
                bytes.truncate(handle.size as usize);
                Cow::Owned(bytes)
            }
        })
    }
}

impl fmt::Debug for Table {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Table")
            .field("path", &self.path)
            .field("access_mode", &self.access_mode)
            .field("comparator", &self.comparator.name())
            .field("verify_checksums", &self.verify_checksums)
            .field("entries", &self.footer.entry_count)
            .field("blocks", &self.index.len())
            .field("file_size", &self.file_size)
            .field("closed", &self.is_closed())
            .finish()
    }
}
