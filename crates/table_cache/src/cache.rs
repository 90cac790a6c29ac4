use std::collections::HashMap;
use std::fmt;
use std::ops::Deref;
use std::panic::{self, AssertUnwindSafe};
use std::path::Path;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use config::{ConfigError, Options};
use parking_lot::{Condvar, Mutex};
use sstable::{Comparator, Table, TableIterator};
use tracing::{debug, info, trace, warn};

use crate::error::{Error, Result};
use crate::filename::table_file_name;
use crate::loader::{DiskTableLoader, TableLoader};
use crate::lru::LruIndex;
use crate::reclaim::{Reclaimable, Reclaimer, Reservation};

/// Iterator over a cached table. Holds its own reference to the table, so it
/// stays valid after the entry is evicted or invalidated.
pub type CachedTableIterator = TableIterator<TableHandle>;

/// A shared reference to an open table.
///
/// The table stays open while any handle exists, even after the cache has
/// dropped its entry. It is closed when the last handle goes away.
#[derive(Clone)]
pub struct TableHandle {
    file_number: u64,
    inner: Arc<Reclaimable<Table>>,
}

impl TableHandle {
    pub fn file_number(&self) -> u64 {
        self.file_number
    }

    /// Number of live handles to this table, including the cache's own.
    pub fn holders(&self) -> usize {
        Arc::strong_count(&self.inner)
    }

    /// Whether the cache has let go of this table.
    pub fn is_released(&self) -> bool {
        self.inner.is_deferred()
    }

    fn into_inner(self) -> Arc<Reclaimable<Table>> {
        self.inner
    }
}

impl Deref for TableHandle {
    type Target = Table;

    fn deref(&self) -> &Table {
        &self.inner
    }
}

impl fmt::Debug for TableHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("TableHandle")
            .field("file_number", &self.file_number)
            .field("holders", &self.holders())
            .field("released", &self.is_released())
            .finish()
    }
}

/// Counters describing cache activity since construction.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CacheStats {
    pub hits: u64,
    pub misses: u64,
    /// Tables physically opened by the loader.
    pub loads: u64,
    pub load_failures: u64,
    pub evictions: u64,
    /// Calls to `invalidate` that dropped a cached table, an in-flight
    /// load, or both.
    pub invalidations: u64,
    /// Entries currently in the cache.
    pub resident: usize,
    /// Tables open, cached or not.
    pub open_tables: usize,
    /// Tables dropped from the cache but still held by readers.
    pub pending_release: usize,
    pub closed: u64,
    pub close_failures: u64,
}

#[derive(Debug, Default)]
struct Counters {
    hits: AtomicU64,
    misses: AtomicU64,
    loads: AtomicU64,
    load_failures: AtomicU64,
    evictions: AtomicU64,
    invalidations: AtomicU64,
}

fn bump(counter: &AtomicU64) {
    counter.fetch_add(1, Ordering::Relaxed);
}

/// An open in progress. Callers that miss on the same file number while it
/// runs wait here for its outcome instead of opening the file again.
struct Inflight {
    outcome: Mutex<Option<Result<TableHandle>>>,
    ready: Condvar,
}

impl Inflight {
    fn new() -> Self {
        Self {
            outcome: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    fn publish(&self, outcome: Result<TableHandle>) {
        *self.outcome.lock() = Some(outcome);
        self.ready.notify_all();
    }

    fn wait(&self) -> Result<TableHandle> {
        let mut outcome = self.outcome.lock();
        loop {
            if let Some(result) = outcome.as_ref() {
                return result.clone();
            }
            self.ready.wait(&mut outcome);
        }
    }
}

struct Index {
    resident: LruIndex<TableHandle>,
    loading: HashMap<u64, Arc<Inflight>>,
    shut_down: bool,
}

enum Lookup {
    Hit(TableHandle),
    Wait(Arc<Inflight>),
    Load(Arc<Inflight>, Reservation),
}

/// A bounded cache of open tables, keyed by file number.
///
/// # Behavior
///
/// - **LRU**: at most `capacity` tables are cached. Inserting past that
///   evicts the least recently used entry.
/// - **Single-flight**: concurrent misses on the same file number share one
///   open. Failed opens are handed to every waiter and are not cached.
/// - **Deferred close**: evicted or invalidated tables stay open until the
///   last iterator or handle using them is dropped.
/// - **Drain on shutdown**: [`shutdown`](Self::shutdown) blocks until every
///   table, cached or handed out, has been closed.
///
/// The cache lock is never held while a file is opened or closed.
pub struct TableCache<L: TableLoader = DiskTableLoader> {
    capacity: usize,
    loader: L,
    index: Mutex<Index>,
    reclaimer: Reclaimer,
    counters: Counters,
}

impl TableCache<DiskTableLoader> {
    /// Creates a cache for the tables in `db_dir`, sized and configured by
    /// `options`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Config`] if `options` fail validation.
    pub fn new<P: AsRef<Path>>(
        db_dir: P,
        options: &Options,
        comparator: Arc<dyn Comparator>,
    ) -> Result<Self> {
        options.validate()?;
        let loader = DiskTableLoader::new(db_dir, options, comparator);
        Self::with_loader(options.table_cache_size, loader)
    }
}

impl<L: TableLoader> TableCache<L> {
    /// Creates a cache holding at most `capacity` tables, opened by `loader`.
    pub fn with_loader(capacity: usize, loader: L) -> Result<Self> {
        if capacity == 0 {
            return Err(ConfigError::ZeroCacheSize.into());
        }
        Ok(Self {
            capacity,
            loader,
            index: Mutex::new(Index {
                resident: LruIndex::new(),
                loading: HashMap::new(),
                shut_down: false,
            }),
            reclaimer: Reclaimer::new(),
            counters: Counters::default(),
        })
    }

    /// Returns an iterator over table `file_number`, opening it on a miss.
    ///
    /// The iterator keeps the table open on its own; eviction or
    /// invalidation while it is alive does not affect it.
    ///
    /// # Errors
    ///
    /// Returns [`Error::Table`] if the table cannot be opened, and
    /// [`Error::ShutDown`] after shutdown.
    pub fn iterate(&self, file_number: u64) -> Result<CachedTableIterator> {
        Ok(TableIterator::new(self.get_table(file_number)?))
    }

    /// Approximate byte offset in table `file_number` where `key` would be
    /// found, opening the table on a miss.
    pub fn approximate_offset_of(&self, file_number: u64, key: &[u8]) -> Result<u64> {
        Ok(self.get_table(file_number)?.approximate_offset_of(key))
    }

    /// Point lookup of `key` in table `file_number`.
    pub fn get(&self, file_number: u64, key: &[u8]) -> Result<Option<Vec<u8>>> {
        Ok(self.get_table(file_number)?.get(key)?)
    }

    /// Returns a handle to table `file_number`, opening it on a miss.
    pub fn get_table(&self, file_number: u64) -> Result<TableHandle> {
        let lookup = {
            let mut index = self.index.lock();
            if index.shut_down {
                return Err(Error::ShutDown);
            }
            if let Some(handle) = index.resident.get(file_number) {
                bump(&self.counters.hits);
                trace!(file_number, "table cache hit");
                Lookup::Hit(handle.clone())
            } else {
                bump(&self.counters.misses);
                match index.loading.get(&file_number) {
                    Some(inflight) => Lookup::Wait(Arc::clone(inflight)),
                    None => {
                        let inflight = Arc::new(Inflight::new());
                        index.loading.insert(file_number, Arc::clone(&inflight));
                        // Taken under the index lock so a concurrent shutdown
                        // either rejects this call or waits for the open.
                        Lookup::Load(inflight, self.reclaimer.reserve())
                    }
                }
            }
        };

        match lookup {
            Lookup::Hit(handle) => Ok(handle),
            Lookup::Wait(inflight) => {
                trace!(file_number, "waiting on in-flight table open");
                inflight.wait()
            }
            Lookup::Load(inflight, reservation) => self.load(file_number, &inflight, reservation),
        }
    }

    fn load(
        &self,
        file_number: u64,
        inflight: &Arc<Inflight>,
        reservation: Reservation,
    ) -> Result<TableHandle> {
        let opened = panic::catch_unwind(AssertUnwindSafe(|| self.loader.load(file_number)));
        let outcome = match opened {
            Ok(Ok(table)) => {
                bump(&self.counters.loads);
                debug!(file_number, path = %table.path().display(), "opened table");
                let inner = reservation.fill(table_file_name(file_number), table);
                Ok(TableHandle { file_number, inner })
            }
            Ok(Err(e)) => {
                bump(&self.counters.load_failures);
                warn!(file_number, error = %e, "failed to open table");
                Err(Error::Table(e))
            }
            Err(payload) => {
                bump(&self.counters.load_failures);
                drop(reservation);
                self.complete_load(
                    file_number,
                    inflight,
                    Err(Error::LoadPanicked { file_number }),
                );
                panic::resume_unwind(payload);
            }
        };
        self.complete_load(file_number, inflight, outcome.clone());
        outcome
    }

    /// Publishes the outcome of a load, inserting a successfully opened table
    /// unless its slot was invalidated or the cache shut down meanwhile.
    fn complete_load(&self, file_number: u64, inflight: &Arc<Inflight>, outcome: Result<TableHandle>) {
        let mut evicted = Vec::new();
        let mut orphaned = None;
        {
            let mut index = self.index.lock();
            let current = index
                .loading
                .get(&file_number)
                .is_some_and(|slot| Arc::ptr_eq(slot, inflight));
            if current {
                index.loading.remove(&file_number);
            }
            if let Ok(handle) = &outcome {
                if current && !index.shut_down {
                    if let Some(old) = index.resident.insert(file_number, handle.clone()) {
                        evicted.push(old);
                    }
                    while index.resident.len() > self.capacity {
                        match index.resident.pop_lru() {
                            Some((_, victim)) => evicted.push(victim),
                            None => break,
                        }
                    }
                } else {
                    orphaned = Some(handle.clone());
                }
            }
        }

        inflight.publish(outcome);

        for victim in evicted {
            bump(&self.counters.evictions);
            debug!(file_number = victim.file_number, "evicted table");
            self.reclaimer.defer(victim.into_inner());
        }
        if let Some(handle) = orphaned {
            debug!(file_number, "table opened after invalidation; not cached");
            self.reclaimer.defer(handle.into_inner());
        }
    }

    /// Drops the cache entry for `file_number`, typically because the file
    /// is about to be deleted.
    ///
    /// Readers already holding the table keep using it; it is closed after
    /// the last one finishes. An open in flight for this file number is
    /// detached and its result will not be cached. Returns `true` if there
    /// was anything to drop.
    pub fn invalidate(&self, file_number: u64) -> bool {
        let (removed, detached) = {
            let mut index = self.index.lock();
            (
                index.resident.remove(file_number),
                index.loading.remove(&file_number).is_some(),
            )
        };
        let found = removed.is_some() || detached;
        if found {
            bump(&self.counters.invalidations);
        }
        if detached {
            debug!(file_number, "invalidated table while loading; result will not be cached");
        }
        if let Some(handle) = removed {
            debug!(file_number, holders = handle.holders() - 1, "invalidated table");
            self.reclaimer.defer(handle.into_inner());
        }
        found
    }

    /// Stops serving requests and blocks until every table has been closed,
    /// including tables still held by outstanding iterators.
    ///
    /// Calls made after shutdown return [`Error::ShutDown`]. Calling
    /// `shutdown` again just waits for the drain.
    pub fn shutdown(&self) {
        self.begin_shutdown();
        self.reclaimer.wait_idle();
        info!(stats = ?self.stats(), "table cache drained");
    }

    /// Like [`shutdown`](Self::shutdown), but gives up waiting after
    /// `timeout`.
    ///
    /// # Errors
    ///
    /// Returns [`Error::DrainTimeout`] with the number of tables still open
    /// if the deadline passes first. The cache stays shut down either way
    /// and remaining tables are closed when their holders drop them.
    pub fn shutdown_timeout(&self, timeout: Duration) -> Result<()> {
        self.begin_shutdown();
        if self.reclaimer.wait_idle_timeout(timeout) {
            info!(stats = ?self.stats(), "table cache drained");
            Ok(())
        } else {
            let pending = self.reclaimer.live();
            warn!(pending, ?timeout, "table cache drain timed out");
            Err(Error::DrainTimeout { pending })
        }
    }

    fn begin_shutdown(&self) {
        let drained = {
            let mut index = self.index.lock();
            if !index.shut_down {
                info!(resident = index.resident.len(), "shutting down table cache");
            }
            index.shut_down = true;
            index.loading.clear();
            index.resident.drain()
        };
        for (_, handle) in drained {
            self.reclaimer.defer(handle.into_inner());
        }
    }

    pub fn is_shut_down(&self) -> bool {
        self.index.lock().shut_down
    }

    /// Whether `file_number` is currently cached. Does not affect recency.
    pub fn contains(&self, file_number: u64) -> bool {
        self.index.lock().resident.contains(file_number)
    }

    /// Cached file numbers, least recently used first.
    pub fn cached_file_numbers(&self) -> Vec<u64> {
        self.index.lock().resident.keys()
    }

    pub fn len(&self) -> usize {
        self.index.lock().resident.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    pub fn loader(&self) -> &L {
        &self.loader
    }

    pub fn stats(&self) -> CacheStats {
        let reclaim = self.reclaimer.stats();
        CacheStats {
            hits: self.counters.hits.load(Ordering::Relaxed),
            misses: self.counters.misses.load(Ordering::Relaxed),
            loads: self.counters.loads.load(Ordering::Relaxed),
            load_failures: self.counters.load_failures.load(Ordering::Relaxed),
            evictions: self.counters.evictions.load(Ordering::Relaxed),
            invalidations: self.counters.invalidations.load(Ordering::Relaxed),
            resident: self.len(),
            open_tables: reclaim.live,
            pending_release: reclaim.pending,
            closed: reclaim.closed,
            close_failures: reclaim.close_failures,
        }
    }
}

impl<L: TableLoader> fmt::Debug for TableCache<L> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let index = self.index.lock();
        f.debug_struct("TableCache")
            .field("capacity", &self.capacity)
            .field("resident", &index.resident.len())
            .field("loading", &index.loading.len())
            .field("shut_down", &index.shut_down)
            .field("open_tables", &self.reclaimer.live())
            .finish()
    }
}

impl<L: TableLoader> Drop for TableCache<L> {
    /// Releases the cache's own references without waiting. Tables still
    /// held by iterators are closed when those are dropped.
    fn drop(&mut self) {
        let index = self.index.get_mut();
        if index.shut_down {
            return;
        }
        index.shut_down = true;
        index.loading.clear();
        let drained = index.resident.drain();
        if !drained.is_empty() {
            debug!(count = drained.len(), "dropping table cache without shutdown");
        }
        for (_, handle) in drained {
            self.reclaimer.defer(handle.into_inner());
        }
    }
}
