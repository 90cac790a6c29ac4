//! # Config - Table Layer Options
//!
//! Settings that are fixed when a database is opened and passed unchanged to
//! the table cache and every table it opens.
//!
//! ## Environment
//!
//! [`Options::from_env`] reads:
//!
//! ```text
//! TABLE_CACHE_SIZE        max resident tables          (default: 990)
//! TABLE_ACCESS_MODE       "mmap" | "buffered"          (default: mmap on 64-bit)
//! TABLE_VERIFY_CHECKSUMS  verify every block read      (default: "false")
//! ```
//!
//! Unset variables fall back to the defaults; malformed values are errors.

use std::fmt;
use std::str::FromStr;

use thiserror::Error;

/// Open-file budget a database assumes by default.
pub const DEFAULT_MAX_OPEN_FILES: usize = 1000;

/// Descriptors held back from the table cache for the WAL, manifest, lock
/// file and friends.
pub const RESERVED_FILE_DESCRIPTORS: usize = 10;

/// Default number of tables the cache keeps open.
pub const DEFAULT_TABLE_CACHE_SIZE: usize = DEFAULT_MAX_OPEN_FILES - RESERVED_FILE_DESCRIPTORS;

pub const ENV_TABLE_CACHE_SIZE: &str = "TABLE_CACHE_SIZE";
pub const ENV_TABLE_ACCESS_MODE: &str = "TABLE_ACCESS_MODE";
pub const ENV_TABLE_VERIFY_CHECKSUMS: &str = "TABLE_VERIFY_CHECKSUMS";

/// Errors produced while building or validating [`Options`].
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum ConfigError {
    /// An environment variable held a value that could not be parsed.
    #[error("invalid value {value:?} for {key}")]
    InvalidValue { key: String, value: String },

    /// The table cache must be able to hold at least one table.
    #[error("table cache size must be greater than zero")]
    ZeroCacheSize,
}

/// How a table file is accessed once opened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AccessMode {
    /// The whole file is memory-mapped; block reads are slices of the map.
    Mmap,
    /// A file descriptor is kept open; block reads are positioned reads.
    Buffered,
}

impl AccessMode {
    /// Memory mapping on 64-bit targets, where address space is plentiful;
    /// positioned reads elsewhere.
    #[must_use]
    pub fn platform_default() -> Self {
        if cfg!(target_pointer_width = "64") {
            AccessMode::Mmap
        } else {
            AccessMode::Buffered
        }
    }

    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            AccessMode::Mmap => "mmap",
            AccessMode::Buffered => "buffered",
        }
    }
}

impl fmt::Display for AccessMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for AccessMode {
    type Err = ();

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "mmap" | "mapped" => Ok(AccessMode::Mmap),
            "buffered" | "file" | "pread" => Ok(AccessMode::Buffered),
            _ => Err(()),
        }
    }
}

/// Table-layer options.
///
/// All three settings are fixed for the lifetime of a table cache.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Maximum number of tables kept open by the cache.
    pub table_cache_size: usize,
    /// Memory-mapped or buffered table access.
    pub access_mode: AccessMode,
    /// Verify the CRC32C trailer of every block read.
    pub verify_checksums: bool,
}

impl Default for Options {
    fn default() -> Self {
        Self {
            table_cache_size: DEFAULT_TABLE_CACHE_SIZE,
            access_mode: AccessMode::platform_default(),
            verify_checksums: false,
        }
    }
}

impl Options {
    #[must_use]
    pub fn with_table_cache_size(mut self, size: usize) -> Self {
        self.table_cache_size = size;
        self
    }

    #[must_use]
    pub fn with_access_mode(mut self, mode: AccessMode) -> Self {
        self.access_mode = mode;
        self
    }

    #[must_use]
    pub fn with_verify_checksums(mut self, verify: bool) -> Self {
        self.verify_checksums = verify;
        self
    }

    /// Checks invariants that the table cache relies on.
    ///
    /// # Errors
    ///
    /// Returns [`ConfigError::ZeroCacheSize`] if `table_cache_size` is 0.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.table_cache_size == 0 {
            return Err(ConfigError::ZeroCacheSize);
        }
        Ok(())
    }

    /// Builds options from the process environment, starting from the
    /// defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if a variable is set to a malformed value or the
    /// result fails [`validate`](Options::validate).
    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Same as [`from_env`](Options::from_env) but reads variables through
    /// `lookup`.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut opts = Options::default();

        if let Some(raw) = lookup(ENV_TABLE_CACHE_SIZE) {
            opts.table_cache_size = raw
                .trim()
                .parse()
                .map_err(|_| invalid(ENV_TABLE_CACHE_SIZE, &raw))?;
        }
        if let Some(raw) = lookup(ENV_TABLE_ACCESS_MODE) {
            opts.access_mode = raw
                .parse()
                .map_err(|_| invalid(ENV_TABLE_ACCESS_MODE, &raw))?;
        }
        if let Some(raw) = lookup(ENV_TABLE_VERIFY_CHECKSUMS) {
            opts.verify_checksums =
                parse_bool(&raw).ok_or_else(|| invalid(ENV_TABLE_VERIFY_CHECKSUMS, &raw))?;
        }

        opts.validate()?;
        Ok(opts)
    }
}

fn invalid(key: &str, value: &str) -> ConfigError {
    ConfigError::InvalidValue {
        key: key.to_string(),
        value: value.to_string(),
    }
}

fn parse_bool(raw: &str) -> Option<bool> {
    match raw.trim().to_ascii_lowercase().as_str() {
        "1" | "true" | "yes" | "on" => Some(true),
        "0" | "false" | "no" | "off" => Some(false),
        _ => None,
    }
}
