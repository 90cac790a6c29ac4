//! Recency-ordered map keyed by file number.
//!
//! Each entry carries the tick of its last use; a `BTreeMap` from tick to key
//! gives the least recently used entry in `O(log n)`. Not thread-safe on its
//! own; the cache guards it with its index mutex.

use std::collections::{BTreeMap, HashMap};

#[derive(Debug)]
pub(crate) struct LruIndex<V> {
    entries: HashMap<u64, (V, u64)>,
    /// tick -> key, oldest first
    order: BTreeMap<u64, u64>,
    next_tick: u64,
}

impl<V> LruIndex<V> {
    pub(crate) fn new() -> Self {
        Self {
            entries: HashMap::new(),
            order: BTreeMap::new(),
            next_tick: 0,
        }
    }

    fn tick(&mut self) -> u64 {
        let tick = self.next_tick;
        self.next_tick += 1;
        tick
    }

    /// Looks up `key` and marks it most recently used.
    pub(crate) fn get(&mut self, key: u64) -> Option<&V> {
        let tick = self.next_tick;
        let (_, last_used) = self.entries.get_mut(&key)?;
        self.order.remove(last_used);
        *last_used = tick;
        self.order.insert(tick, key);
        self.next_tick += 1;
        self.entries.get(&key).map(|(v, _)| v)
    }

    pub(crate) fn contains(&self, key: u64) -> bool {
        self.entries.contains_key(&key)
    }

    /// Inserts `value` as most recently used, returning any value it replaced.
    pub(crate) fn insert(&mut self, key: u64, value: V) -> Option<V> {
        let tick = self.tick();
        let old = self.entries.insert(key, (value, tick));
        if let Some((_, old_tick)) = &old {
            self.order.remove(old_tick);
        }
        self.order.insert(tick, key);
        old.map(|(v, _)| v)
    }

    pub(crate) fn remove(&mut self, key: u64) -> Option<V> {
        let (value, tick) = self.entries.remove(&key)?;
        self.order.remove(&tick);
        Some(value)
    }

    /// Removes and returns the least recently used entry.
    pub(crate) fn pop_lru(&mut self) -> Option<(u64, V)> {
        let (_, key) = self.order.pop_first()?;
        let (value, _) = self.entries.remove(&key)?;
        Some((key, value))
    }

    /// Removes every entry, oldest first.
    pub(crate) fn drain(&mut self) -> Vec<(u64, V)> {
        let mut out = Vec::with_capacity(self.entries.len());
        while let Some(entry) = self.pop_lru() {
            out.push(entry);
        }
        out
    }

    pub(crate) fn len(&self) -> usize {
        self.entries.len()
    }

    /// Keys from least to most recently used.
    pub(crate) fn keys(&self) -> Vec<u64> {
        self.order.values().copied().collect()
    }
}
