//! Sequential iteration over a [`Table`].
//!
//! The iterator is generic over how it holds the table: `&Table` for
//! borrowed iteration, or any owning handle that derefs to a `Table` (for
//! example an `Arc<Table>`), which keeps the table alive for as long as the
//! iterator exists.

use std::cmp::Ordering;
use std::iter::FusedIterator;
use std::ops::Deref;

use crate::error::Result;
use crate::reader::Table;

/// Lazily walks a table's data blocks, yielding `(key, value)` pairs in
/// ascending comparator order.
///
/// Blocks are read one at a time as the iterator advances. A read error is
/// yielded once, after which the iterator is exhausted.
pub struct TableIterator<T: Deref<Target = Table>> {
    table: T,
    /// Next data block to load.
    next_block: usize,
    /// Remaining entries of the current block.
    entries: std::vec::IntoIter<(Vec<u8>, Vec<u8>)>,
    done: bool,
}

impl<T: Deref<Target = Table>> TableIterator<T> {
    /// Creates an iterator positioned before the first entry.
    pub fn new(table: T) -> Self {
        Self {
            table,
            next_block: 0,
            entries: Vec::new().into_iter(),
            done: false,
        }
    }

    /// Repositions the iterator so that the next item is the first entry whose
    /// key is `>= target`.
    ///
    /// # Errors
    ///
    /// Returns an error if the target block cannot be read; the iterator is
    /// then exhausted.
    pub fn seek(&mut self, target: &[u8]) -> Result<()> {
        let block = self.table.find_block(target);
        self.done = false;
        self.entries = Vec::new().into_iter();
        self.next_block = block;

        if block >= self.table.block_count() {
            return Ok(());
        }

        let mut entries = match self.table.read_block(block) {
            Ok(entries) => entries,
            Err(e) => {
                self.done = true;
                return Err(e);
            }
        };
        let cmp = self.table.comparator();
        let skip = entries.partition_point(|(k, _)| cmp.compare(k, target) == Ordering::Less);
        entries.drain(..skip);

        self.entries = entries.into_iter();
        self.next_block = block + 1;
        Ok(())
    }

    /// The table being iterated.
    pub fn table(&self) -> &Table {
        &self.table
    }
}

impl<T: Deref<Target = Table>> Iterator for TableIterator<T> {
    type Item = Result<(Vec<u8>, Vec<u8>)>;

    fn next(&mut self) -> Option<Self::Item> {
        loop {
            if self.done {
                return None;
            }
            if let Some(entry) = self.entries.next() {
                return Some(Ok(entry));
            }
            if self.next_block >= self.table.block_count() {
                self.done = true;
                return None;
            }
            match self.table.read_block(self.next_block) {
                Ok(entries) => {
                    self.entries = entries.into_iter();
                    self.next_block += 1;
                }
                Err(e) => {
                    self.done = true;
                    return Some(Err(e));
                }
            }
        }
    }
}

impl<T: Deref<Target = Table>> FusedIterator for TableIterator<T> {}

impl<T: Deref<Target = Table>> std::fmt::Debug for TableIterator<T> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TableIterator")
            .field("path", &self.table.path())
            .field("next_block", &self.next_block)
            .field("buffered", &self.entries.len())
            .field("done", &self.done)
            .finish()
    }
}
