//! Table file naming.
//!
//! A table with file number `n` lives at `<db_dir>/<n>.sst`, with `n`
//! zero-padded to six digits. Wider numbers are written in full.

use std::path::{Path, PathBuf};

/// Extension of table files.
pub const TABLE_FILE_EXTENSION: &str = "sst";

/// Returns the file name of table `file_number`, e.g. `000042.sst`.
pub fn table_file_name(file_number: u64) -> String {
    format!("{:06}.{}", file_number, TABLE_FILE_EXTENSION)
}

/// Returns the full path of table `file_number` inside `db_dir`.
pub fn table_file_path(db_dir: &Path, file_number: u64) -> PathBuf {
    db_dir.join(table_file_name(file_number))
}

/// Parses a table file name back into its file number.
///
/// Returns `None` for anything that is not `<digits>.sst`.
pub fn parse_table_file_name(name: &str) -> Option<u64> {
    let stem = name
        .strip_suffix(TABLE_FILE_EXTENSION)?
        .strip_suffix('.')?;
    if stem.is_empty() || !stem.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    stem.parse().ok()
}
