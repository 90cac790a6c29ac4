use config::ConfigError;
use thiserror::Error;

/// Errors returned by [`TableCache`](crate::TableCache) operations.
///
/// The type is `Clone` so that a single failed open can be handed to every
/// caller that was waiting on it.
#[derive(Debug, Clone, Error)]
pub enum Error {
    /// Opening or reading the table failed.
    #[error(transparent)]
    Table(#[from] sstable::Error),

    /// The cache was configured with invalid options.
    #[error(transparent)]
    Config(#[from] ConfigError),

    /// The cache has been shut down and no longer serves requests.
    #[error("table cache is shut down")]
    ShutDown,

    /// Shutdown gave up waiting for outstanding table handles.
    #[error("{pending} table(s) still open when the shutdown deadline expired")]
    DrainTimeout { pending: usize },

    /// The table loader panicked while opening this file.
    #[error("loading table {file_number} panicked")]
    LoadPanicked { file_number: u64 },
}

impl Error {
    /// Returns `true` if the underlying table failed an integrity check.
    pub fn is_corruption(&self) -> bool {
        matches!(self, Error::Table(e) if e.is_corruption())
    }

    /// Returns `true` if the underlying table hit an I/O error.
    pub fn is_io(&self) -> bool {
        matches!(self, Error::Table(e) if e.is_io())
    }
}

pub type Result<T, E = Error> = std::result::Result<T, E>;
