//! Invalidation marker protocol for lazy-invalidation replication (§4.2.1).
//!
//! Grounded on `other_examples/.../codegraph-cache-src-invalidation.rs`'s
//! `InvalidationManager` shape (a map from key to invalidation state plus
//! an explicit invalidate/revalidate pair of operations), specialized to
//! a file-renaming marker protocol rather than cache-entry
//! eviction.

use dashmap::DashMap;

pub const DEFAULT_SUFFIX: &str = "_invalid";

/// Appends the invalidation suffix before the file's extension, e.g.
/// `foo.txt` -> `foo_invalid.txt`. Extensionless names get the suffix
/// appended directly.
pub fn append_invalid_suffix(name: &str, suffix: &str) -> String {
    match name.rfind('.') {
        Some(dot) if dot > 0 => format!("{}{}{}", &name[..dot], suffix, &name[dot..]),
        _ => format!("{name}{suffix}"),
    }
}

/// The left inverse of [`append_invalid_suffix`]. Returns `name` unchanged
/// (allocated fresh either way) if it does not carry the suffix.
pub fn strip_invalid_suffix(name: &str, suffix: &str) -> String {
    match name.rfind('.') {
        Some(dot) if name[..dot].ends_with(suffix) => {
            let stem = &name[..dot - suffix.len()];
            let ext = &name[dot..];
            format!("{stem}{ext}")
        }
        _ => name.strip_suffix(suffix).unwrap_or(name).to_string(),
    }
}

/// Per-file valid/invalid bookkeeping, shared across all replicas of one
/// [`crate::replication::ReplicationEngine`] (the `InvalidationRecord`
/// is per-engine, not per-replica: all replicas of one master go stale or
/// fresh together as the master's content changes).
#[derive(Default)]
pub struct InvalidationRecord {
    invalid: DashMap<String, bool>,
}

impl InvalidationRecord {
    pub fn new() -> Self {
        Self { invalid: DashMap::new() }
    }

    pub fn is_invalid(&self, name: &str) -> bool {
        self.invalid.get(name).map(|v| *v).unwrap_or(false)
    }

    pub fn mark_invalid(&self, name: &str) {
        self.invalid.insert(name.to_string(), true);
    }

    pub fn mark_valid(&self, name: &str) {
        self.invalid.remove(name);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn suffix_round_trips_for_any_name() {
        for name in ["foo.txt", "noext", "a.b.c", ".hidden"] {
            let marked = append_invalid_suffix(name, DEFAULT_SUFFIX);
            assert_eq!(strip_invalid_suffix(&marked, DEFAULT_SUFFIX), name, "name={name}");
        }
    }

    #[test]
    fn append_places_suffix_before_extension() {
        assert_eq!(append_invalid_suffix("foo.txt", DEFAULT_SUFFIX), "foo_invalid.txt");
        assert_eq!(append_invalid_suffix("foo", DEFAULT_SUFFIX), "foo_invalid");
    }

    #[test]
    fn strip_is_noop_on_unmarked_name() {
        assert_eq!(strip_invalid_suffix("foo.txt", DEFAULT_SUFFIX), "foo.txt");
    }

    #[test]
    fn invalidation_record_tracks_flags() {
        let record = InvalidationRecord::new();
        assert!(!record.is_invalid("a.txt"));
        record.mark_invalid("a.txt");
        assert!(record.is_invalid("a.txt"));
        record.mark_valid("a.txt");
        assert!(!record.is_invalid("a.txt"));
    }
}
