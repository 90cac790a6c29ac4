//! # SSTable - Sorted String Table
//!
//! Immutable, on-disk sorted tables and the handle used to read them.
//!
//! A table is written once by [`TableBuilder`] and afterwards only read, via
//! [`Table`]. A `Table` is opened with one of two access strategies (see
//! [`config::AccessMode`]):
//!
//! - **mmap**: the file is memory-mapped and blocks are sliced out of the map.
//! - **buffered**: a descriptor stays open and blocks are read with
//!   seek + read.
//!
//! ## File layout (v1)
//!
//! ```text
//! ┌───────────────────────────────────────────────────────────────┐
//! │ DATA BLOCKS                                                   │
//! │                                                               │
//! │ contents: key_len (u32) | key | val_len (u32) | val  ...      │
//! │ trailer:  masked crc32c (u32) of the contents                 │
//! │                                                               │
//! │ ... repeated for each block ...                               │
//! ├───────────────────────────────────────────────────────────────┤
//! │ INDEX BLOCK (one entry per data block)                        │
//! │                                                               │
//! │ contents: key_len (u32) | last_key | offset (u64) | size (u32)│
//! │ trailer:  masked crc32c (u32) of the contents                 │
//! ├───────────────────────────────────────────────────────────────┤
//! │ FOOTER (always last 32 bytes)                                 │
//! │                                                               │
//! │ index_offset (u64) | index_size (u32) | entry_count (u64)     │
//! │ block_count (u32) | reserved (u32) | magic (u32) "TBL1"       │
//! └───────────────────────────────────────────────────────────────┘
//! ```
//!
//! All integers are little-endian. Checksums are verified on every block
//! read when the table is opened with `verify_checksums`; the footer magic is
//! always checked.

mod block;
mod comparator;
mod error;
mod format;
mod iterator;
mod reader;
mod writer;

pub use block::IndexEntry;
pub use comparator::{bytewise, BytewiseComparator, Comparator};
pub use error::{Error, Result};
pub use format::{
    BlockHandle, Footer, BLOCK_TRAILER_BYTES, DEFAULT_BLOCK_SIZE, FOOTER_BYTES, MAX_BLOCK_BYTES,
    TABLE_MAGIC,
};
pub use iterator::TableIterator;
pub use reader::Table;
pub use writer::TableBuilder;

pub use config::AccessMode;

#[cfg(test)]
mod tests;
