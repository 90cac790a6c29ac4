use super::helpers::*;
use crate::*;
use anyhow::Result;
use std::sync::{Arc, Barrier};
use std::thread;
use std::time::Duration;
use tempfile::tempdir;

const THREADS: usize = 16;

#[test]
fn concurrent_misses_open_once() -> Result<()> {
    let dir = tempdir()?;
    write_table(dir.path(), 5, 20)?;
    let cache = counting_cache(dir.path(), 4, Duration::from_millis(50));
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_table(5)
            })
        })
        .collect();

    let handles: Vec<TableHandle> = workers
        .into_iter()
        .map(|w| w.join().unwrap())
        .collect::<crate::Result<_>>()?;

    assert_eq!(cache.loader().opens(5), 1);
    let first: *const Table = &*handles[0];
    assert!(handles.iter().all(|h| std::ptr::eq(&**h, first)));

    let stats = cache.stats();
    assert_eq!(stats.loads, 1);
    assert_eq!(stats.open_tables, 1);
    assert_eq!(stats.hits + stats.misses, THREADS as u64);
    Ok(())
}

#[test]
fn concurrent_misses_share_one_failure() -> Result<()> {
    let dir = tempdir()?;
    let cache = counting_cache(dir.path(), 4, Duration::from_millis(50));
    let barrier = Arc::new(Barrier::new(THREADS));

    let workers: Vec<_> = (0..THREADS)
        .map(|_| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_table(77)
            })
        })
        .collect();

    for worker in workers {
        let err = worker.join().unwrap().unwrap_err();
        assert!(err.is_io(), "expected io error, got {:?}", err);
    }
    assert_eq!(cache.loader().opens(77), 1);
    assert_eq!(cache.stats().load_failures, 1);

    // The failure is not remembered.
    assert!(cache.get_table(77).is_err());
    assert_eq!(cache.loader().opens(77), 2);
    Ok(())
}

#[test]
fn misses_on_different_files_load_in_parallel() -> Result<()> {
    let dir = tempdir()?;
    for n in 0..4 {
        write_table(dir.path(), n, 5)?;
    }
    let cache = counting_cache(dir.path(), 8, Duration::from_millis(100));
    let barrier = Arc::new(Barrier::new(4));

    let started = std::time::Instant::now();
    let workers: Vec<_> = (0..4u64)
        .map(|n| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || {
                barrier.wait();
                cache.get_table(n).map(|h| h.file_number())
            })
        })
        .collect();
    for (n, worker) in workers.into_iter().enumerate() {
        assert_eq!(worker.join().unwrap()?, n as u64);
    }

    // Four serialized opens would take at least 400ms.
    assert!(started.elapsed() < Duration::from_millis(380));
    assert_eq!(cache.loader().total_opens(), 4);
    Ok(())
}

#[test]
fn invalidate_during_load_skips_insert() -> Result<()> {
    let dir = tempdir()?;
    write_table(dir.path(), 3, 10)?;
    let cache = counting_cache(dir.path(), 4, Duration::from_millis(200));

    let loader_thread = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.get_table(3))
    };
    thread::sleep(Duration::from_millis(50));
    assert!(cache.invalidate(3));
    assert_eq!(cache.stats().invalidations, 1);

    let handle = loader_thread.join().unwrap()?;
    assert!(!cache.contains(3));
    assert_eq!(cache.stats().invalidations, 1);
    assert!(handle.is_released());
    assert_eq!(handle.get(&key(9))?, Some(tagged_value(3, 9)));

    drop(handle);
    assert_eq!(cache.stats().open_tables, 0);
    Ok(())
}

#[test]
fn shutdown_during_load_drains_late_table() -> Result<()> {
    let dir = tempdir()?;
    write_table(dir.path(), 2, 10)?;
    let cache = counting_cache(dir.path(), 4, Duration::from_millis(300));

    let loader_thread = {
        let cache = Arc::clone(&cache);
        thread::spawn(move || cache.get_table(2).map(|h| h.len()))
    };
    thread::sleep(Duration::from_millis(50));

    // Returns only once the late table has been opened and released.
    cache.shutdown();
    assert_eq!(cache.stats().open_tables, 0);
    assert_eq!(cache.stats().closed, 1);
    assert_eq!(loader_thread.join().unwrap()?, 10);
    assert!(cache.is_empty());
    Ok(())
}

#[test]
fn mixed_workload_closes_every_table_once() -> Result<()> {
    const FILES: u64 = 8;
    const ROUNDS: usize = 200;

    let dir = tempdir()?;
    for n in 0..FILES {
        write_table(dir.path(), n, 30)?;
    }
    let cache = counting_cache(dir.path(), 3, Duration::ZERO);
    let barrier = Arc::new(Barrier::new(8));

    let workers: Vec<_> = (0..8usize)
        .map(|t| {
            let cache = Arc::clone(&cache);
            let barrier = Arc::clone(&barrier);
            thread::spawn(move || -> Result<()> {
                barrier.wait();
                for round in 0..ROUNDS {
                    let n = ((t * 7 + round * 3) as u64) % FILES;
                    match round % 5 {
                        0 => {
                            cache.invalidate(n);
                        }
                        1 => {
                            let off = cache.approximate_offset_of(n, &key(29))?;
                            assert!(off > 0);
                        }
                        2 => {
                            assert_eq!(cache.get(n, &key(round % 30))?, Some(tagged_value(n, round % 30)));
                        }
                        _ => {
                            let mut iter = cache.iterate(n)?;
                            iter.seek(&key(25))?;
                            assert_eq!(collect_keys(iter)?.len(), 5);
                        }
                    }
                    assert!(cache.len() <= 3);
                }
                Ok(())
            })
        })
        .collect();

    for worker in workers {
        worker.join().unwrap()?;
    }

    cache.shutdown();
    let stats = cache.stats();
    assert_eq!(stats.open_tables, 0);
    assert_eq!(stats.pending_release, 0);
    assert_eq!(stats.close_failures, 0);
    assert_eq!(stats.closed, stats.loads);
    assert_eq!(stats.loads as usize, cache.loader().total_opens());
    Ok(())
}
