use std::io;
use std::sync::Arc;

use thiserror::Error;

/// Errors produced while building, opening or reading a table.
///
/// I/O failures and corruption are deliberately separate variants: a caller
/// may retry the former but should treat the latter as fatal for the file.
///
/// The type is `Clone` so that a single failed open can be reported to every
/// thread that was waiting on it.
#[derive(Debug, Error, Clone)]
pub enum Error {
    /// An underlying I/O error (missing file, permission denied, short read).
    ///
    /// A file whose structure cannot be parsed (too small, bad magic,
    /// truncated or out-of-range blocks) is reported here with
    /// [`io::ErrorKind::InvalidData`].
    #[error("io error: {0}")]
    Io(Arc<io::Error>),

    /// A block's contents do not match its stored checksum.
    #[error("corruption: {0}")]
    Corruption(String),

    /// A single entry is too large to fit in one block.
    #[error("entry of {size} bytes exceeds the {max} byte block limit")]
    EntryTooLarge { size: usize, max: usize },

    /// A finished block (in practice the index block) is over the limit.
    #[error("block of {size} bytes exceeds the {max} byte block limit")]
    BlockTooLarge { size: usize, max: usize },

    /// A key passed to the builder was not strictly greater than the
    /// previous one.
    #[error("keys must be added in strictly increasing order")]
    OutOfOrder,

    /// The table's file resource has already been released.
    #[error("table is closed")]
    Closed,
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(Arc::new(e))
    }
}

impl Error {
    pub(crate) fn corruption(msg: impl Into<String>) -> Self {
        Error::Corruption(msg.into())
    }

    pub(crate) fn malformed(msg: impl Into<String>) -> Self {
        Error::Io(Arc::new(io::Error::new(io::ErrorKind::InvalidData, msg.into())))
    }

    /// Returns `true` for [`Error::Corruption`].
    #[must_use]
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Corruption(_))
    }

    /// Returns `true` for [`Error::Io`].
    #[must_use]
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Io(_))
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
