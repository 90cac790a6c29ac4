use criterion::{criterion_group, criterion_main, BatchSize, Criterion};
use sstable::TableBuilder;
use std::path::Path;
use table_cache::{bytewise, table_file_path, AccessMode, Options, TableCache};
use tempfile::tempdir;

const N_TABLES: u64 = 16;
const N_KEYS: usize = 2_000;
const VALUE_SIZE: usize = 100;

fn build_tables(dir: &Path) {
    for n in 0..N_TABLES {
        let pairs = (0..N_KEYS).map(|i| (format!("key{:06}", i).into_bytes(), vec![b'x'; VALUE_SIZE]));
        TableBuilder::write_from_iterator(table_file_path(dir, n), bytewise(), pairs).unwrap();
    }
}

fn open_cache(dir: &Path, capacity: usize, mode: AccessMode) -> TableCache {
    let opts = Options::default()
        .with_table_cache_size(capacity)
        .with_access_mode(mode);
    TableCache::new(dir, &opts, bytewise()).unwrap()
}

fn table_cache_hit_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    build_tables(dir.path());

    for mode in [AccessMode::Mmap, AccessMode::Buffered] {
        let cache = open_cache(dir.path(), N_TABLES as usize, mode);
        for n in 0..N_TABLES {
            cache.get_table(n).unwrap();
        }

        let mut i = 0u64;
        c.bench_function(&format!("table_cache_get_hit_{}", mode), |b| {
            b.iter(|| {
                i = i.wrapping_add(1);
                cache.get(i % N_TABLES, b"key001000").unwrap()
            })
        });
    }
}

fn table_cache_miss_benchmark(c: &mut Criterion) {
    let dir = tempdir().unwrap();
    build_tables(dir.path());

    for mode in [AccessMode::Mmap, AccessMode::Buffered] {
        // Capacity 1 over a round-robin walk misses every time.
        let cache = open_cache(dir.path(), 1, mode);
        let mut i = 0u64;
        c.bench_function(&format!("table_cache_open_evict_{}", mode), |b| {
            b.iter(|| {
                i = i.wrapping_add(1);
                cache.approximate_offset_of(i % N_TABLES, b"key001000").unwrap()
            })
        });
    }
}

fn table_cache_scan_benchmark(c: &mut Criterion) {
    c.bench_function("table_cache_full_scan", |b| {
        b.iter_batched(
            || {
                let dir = tempdir().unwrap();
                build_tables(dir.path());
                let cache = open_cache(dir.path(), 4, AccessMode::Mmap);
                (dir, cache)
            },
            |(_dir, cache)| {
                let n = cache.iterate(0).unwrap().count();
                assert_eq!(n, N_KEYS);
            },
            BatchSize::LargeInput,
        );
    });
}

criterion_group!(
    benches,
    table_cache_hit_benchmark,
    table_cache_miss_benchmark,
    table_cache_scan_benchmark
);
criterion_main!(benches);
