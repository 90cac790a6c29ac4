//! Opening tables on a cache miss.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use config::{AccessMode, Options};
use sstable::{Comparator, Table};

use crate::filename::table_file_path;

/// Opens the table for a file number. Called by the cache on a miss, at most
/// once per file number at a time, and never while the cache's lock is held.
pub trait TableLoader: Send + Sync {
    fn load(&self, file_number: u64) -> sstable::Result<Table>;
}

impl<F> TableLoader for F
where
    F: Fn(u64) -> sstable::Result<Table> + Send + Sync,
{
    fn load(&self, file_number: u64) -> sstable::Result<Table> {
        self(file_number)
    }
}

/// Opens `<db_dir>/<NNNNNN>.sst` with the configured access mode.
#[derive(Clone)]
pub struct DiskTableLoader {
    db_dir: PathBuf,
    access_mode: AccessMode,
    verify_checksums: bool,
    comparator: Arc<dyn Comparator>,
}

impl DiskTableLoader {
    pub fn new<P: AsRef<Path>>(db_dir: P, options: &Options, comparator: Arc<dyn Comparator>) -> Self {
        Self {
            db_dir: db_dir.as_ref().to_path_buf(),
            access_mode: options.access_mode,
            verify_checksums: options.verify_checksums,
            comparator,
        }
    }

    pub fn db_dir(&self) -> &Path {
        &self.db_dir
    }

    pub fn access_mode(&self) -> AccessMode {
        self.access_mode
    }
}

impl TableLoader for DiskTableLoader {
    fn load(&self, file_number: u64) -> sstable::Result<Table> {
        Table::open(
            table_file_path(&self.db_dir, file_number),
            self.access_mode,
            Arc::clone(&self.comparator),
            self.verify_checksums,
        )
    }
}

impl std::fmt::Debug for DiskTableLoader {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("DiskTableLoader")
            .field("db_dir", &self.db_dir)
            .field("access_mode", &self.access_mode)
            .field("verify_checksums", &self.verify_checksums)
            .field("comparator", &self.comparator.name())
            .finish()
    }
}
