use super::helpers::*;
use crate::*;
use anyhow::Result;
use std::sync::Arc;
use tempfile::tempdir;

fn keys_of<T: std::ops::Deref<Target = Table>>(iter: TableIterator<T>) -> Result<Vec<Vec<u8>>> {
    let mut out = Vec::new();
    for item in iter {
        out.push(item?.0);
    }
    Ok(out)
}

#[test]
fn iterates_all_entries_in_order() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("all.sst");
    write_table(&path, 257)?;

    for mode in MODES {
        let table = open(&path, mode, true)?;
        let mut count = 0;
        for (i, item) in table.iter().enumerate() {
            let (k, v) = item?;
            assert_eq!(k, key(i));
            assert_eq!(v, value(i));
            count += 1;
        }
        assert_eq!(count, 257);
    }

    Ok(())
}

#[test]
fn iterator_is_fused() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("fused.sst");
    write_table(&path, 3)?;

    let table = open(&path, AccessMode::Mmap, false)?;
    let mut iter = table.iter();
    assert_eq!(iter.by_ref().count(), 3);
    assert!(iter.next().is_none());
    assert!(iter.next().is_none());

    Ok(())
}

#[test]
fn owned_handle_keeps_table_alive() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("owned.sst");
    write_table(&path, 100)?;

    let table = Arc::new(open(&path, AccessMode::Mmap, true)?);
    let iter = TableIterator::new(Arc::clone(&table));
    drop(table);

    assert_eq!(keys_of(iter)?.len(), 100);
    Ok(())
}

// -------------------- Seek --------------------

#[test]
fn seek_to_existing_key() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("seek.sst");
    write_table(&path, 100)?;

    for mode in MODES {
        let table = open(&path, mode, true)?;
        let mut iter = table.iter();
        iter.seek(&key(42))?;
        let rest = keys_of(iter)?;
        assert_eq!(rest.len(), 58);
        assert_eq!(rest[0], key(42));
        assert_eq!(rest[57], key(99));
    }

    Ok(())
}

#[test]
fn seek_between_keys_lands_on_next() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("seek_between.sst");
    write_table(&path, 100)?;

    let table = open(&path, AccessMode::Buffered, true)?;
    let mut iter = table.iter();
    iter.seek(b"key0042a")?;
    let (k, _) = iter.next().expect("entry after target")?;
    assert_eq!(k, key(43));

    Ok(())
}

#[test]
fn seek_before_first_and_past_last() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("seek_edges.sst");
    write_table(&path, 10)?;

    let table = open(&path, AccessMode::Mmap, true)?;

    let mut iter = table.iter();
    iter.seek(b"")?;
    assert_eq!(keys_of(iter)?.len(), 10);

    let mut iter = table.iter();
    iter.seek(b"zzz")?;
    assert!(iter.next().is_none());

    Ok(())
}

#[test]
fn seek_after_exhaustion_rewinds() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("seek_again.sst");
    write_table(&path, 20)?;

    let table = open(&path, AccessMode::Buffered, false)?;
    let mut iter = table.iter();
    assert_eq!(iter.by_ref().count(), 20);

    iter.seek(&key(15))?;
    assert_eq!(keys_of(iter)?, (15..20).map(key).collect::<Vec<_>>());

    Ok(())
}

#[test]
fn seek_reports_corruption() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("seek_corrupt.sst");
    write_table(&path, 20)?;
    flip_byte(&path, 15);

    let table = open(&path, AccessMode::Mmap, true)?;
    let mut iter = table.iter();
    let err = iter.seek(&key(0)).unwrap_err();
    assert!(err.is_corruption());
    assert!(iter.next().is_none());

    Ok(())
}

#[test]
fn empty_table_iterates_nothing() -> Result<()> {
    let dir = tempdir()?;
    let path = dir.path().join("empty_iter.sst");
    TableBuilder::create(&path, bytewise())?.finish()?;

    let table = open(&path, AccessMode::Mmap, true)?;
    let mut iter = table.iter();
    iter.seek(b"anything")?;
    assert!(iter.next().is_none());
    assert_eq!(table.approximate_offset_of(b"anything"), 0);

    Ok(())
}
