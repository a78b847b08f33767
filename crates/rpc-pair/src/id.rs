//! Correlation id allocation.

use std::sync::atomic::{AtomicU64, Ordering};

static NEXT_ID: AtomicU64 = AtomicU64::new(1);

/// Returns a globally unique suffix for a correlation id. Uniqueness only needs to
/// hold within a pair, but a process-wide counter trivially gives the stronger
/// cross-pair-traceable property for free.
pub(crate) fn next() -> u64 {
    NEXT_ID.fetch_add(1, Ordering::Relaxed)
}

/// Formats a correlation id of the form `"<pair-name>:<monotonic-int>"`.
pub(crate) fn format(pair_name: &str) -> String {
    format!("{pair_name}:{}", next())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn ids_are_unique_and_prefixed() {
        let a = format("left");
        let b = format("left");
        assert_ne!(a, b);
        assert!(a.starts_with("left:"));
        assert!(b.starts_with("left:"));
    }

    #[test]
    fn counter_is_shared_across_pairs() {
        let a = format("left");
        let b = format("right");
        let a_n: u64 = a.rsplit(':').next().unwrap().parse().unwrap();
        let b_n: u64 = b.rsplit(':').next().unwrap().parse().unwrap();
        assert_ne!(a_n, b_n);
    }
}
