//! # Table Cache
//!
//! Keeps a bounded set of table files open so that reads do not pay the open
//! cost on every access, and bounds the number of descriptors or mappings a
//! database holds.
//!
//! ```text
//! iterate(n) / approximate_offset_of(n, key) / get(n, key)
//!        |
//!        v
//! ┌──────────────────────────────────────────────┐
//! │ index (one mutex)                            │
//! │   resident: LRU of TableHandle    -> hit     │
//! │   loading:  n -> in-flight open   -> wait    │
//! └──────────────────────────────────────────────┘
//!        | miss, first caller
//!        v
//! TableLoader::load(n)   (no lock held)
//!        |
//!        v
//! insert, evict LRU entries past capacity
//!        |
//!        v
//! Reclaimer: closes a table when its last handle is dropped
//! ```
//!
//! Evicted and invalidated tables remain readable by whoever still holds a
//! handle or iterator. [`TableCache::shutdown`] waits for all of them.

mod cache;
mod error;
mod filename;
mod loader;
mod lru;
mod reclaim;

pub use cache::{CacheStats, CachedTableIterator, TableCache, TableHandle};
pub use error::{Error, Result};
pub use filename::{parse_table_file_name, table_file_name, table_file_path, TABLE_FILE_EXTENSION};
pub use loader::{DiskTableLoader, TableLoader};
pub use reclaim::{Closeable, ReclaimStats, Reclaimable, Reclaimer, Reservation};

pub use config::{AccessMode, Options};
pub use sstable::{bytewise, Comparator, Table};

#[cfg(test)]
mod tests;
