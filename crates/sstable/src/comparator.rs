use std::cmp::Ordering;
use std::sync::Arc;

/// A total order over keys.
///
/// Tables never interpret keys themselves; every ordering decision (builder
/// order checks, index search, iterator seeks) goes through the comparator
/// the table was opened with.
pub trait Comparator: Send + Sync {
    /// Stable name, used in diagnostics.
    fn name(&self) -> &'static str;

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering;
}

/// Lexicographic byte order.
#[derive(Debug, Default, Clone, Copy)]
pub struct BytewiseComparator;

impl Comparator for BytewiseComparator {
    fn name(&self) -> &'static str {
        "bytewise"
    }

    fn compare(&self, a: &[u8], b: &[u8]) -> Ordering {
        a.cmp(b)
    }
}

/// Returns a shared [`BytewiseComparator`].
#[must_use]
pub fn bytewise() -> Arc<dyn Comparator> {
    Arc::new(BytewiseComparator)
}
