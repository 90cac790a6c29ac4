use crate::*;
use std::path::Path;

#[test]
fn names_are_zero_padded() {
    assert_eq!(table_file_name(0), "000000.sst");
    assert_eq!(table_file_name(42), "000042.sst");
    assert_eq!(table_file_name(123456), "123456.sst");
    assert_eq!(table_file_name(1234567), "1234567.sst");
}

#[test]
fn path_joins_db_dir() {
    let path = table_file_path(Path::new("/data/db"), 7);
    assert_eq!(path, Path::new("/data/db/000007.sst"));
}

#[test]
fn parse_accepts_table_names() {
    assert_eq!(parse_table_file_name("000042.sst"), Some(42));
    assert_eq!(parse_table_file_name("1234567.sst"), Some(1234567));
    assert_eq!(parse_table_file_name(&table_file_name(u64::MAX)), Some(u64::MAX));
}

#[test]
fn parse_rejects_other_files() {
    for name in [
        "000042.sst.tmp",
        "000042.log",
        ".sst",
        "sst",
        "abc.sst",
        "-1.sst",
        "000042sst",
        "MANIFEST",
        "99999999999999999999999.sst",
    ] {
        assert_eq!(parse_table_file_name(name), None, "{}", name);
    }
}
