//! Content checksums and rendezvous (coordinator-selection) hashing.
//!
//! Neither use case needs cryptographic strength — integrity here is
//! scoped down to a content checksum for sync diffing, not tamper
//! detection — so both are built on `std::hash::Hasher` rather than
//! pulling in a crypto-hash crate.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};

/// A 128-bit content checksum, built from two differently-seeded 64-bit
/// hashes of the same bytes so a single-hash collision doesn't collide the
/// checksum.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct Checksum(pub u64, pub u64);

impl Checksum {
    pub fn of(bytes: &[u8]) -> Self {
        let mut h1 = DefaultHasher::new();
        bytes.hash(&mut h1);
        let mut h2 = DefaultHasher::new();
        0x9E3779B97F4A7C15u64.hash(&mut h2);
        bytes.hash(&mut h2);
        Self(h1.finish(), h2.finish())
    }
}

impl std::fmt::Display for Checksum {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{:016x}{:016x}", self.0, self.1)
    }
}

/// Computes the rendezvous-hash leader for `request` among `sorted_members`
/// (already sorted by member id, per §4.4). Returns `None` for an empty
/// membership set.
pub fn rendezvous_leader<'a, T: AsRef<str>>(
    request: &str,
    sorted_members: &'a [T],
) -> Option<&'a T> {
    if sorted_members.is_empty() {
        return None;
    }
    let mut hasher = DefaultHasher::new();
    request.hash(&mut hasher);
    let index = (hasher.finish() as usize) % sorted_members.len();
    sorted_members.get(index)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn checksum_is_pure_function_of_bytes() {
        assert_eq!(Checksum::of(b"hello"), Checksum::of(b"hello"));
        assert_ne!(Checksum::of(b"hello"), Checksum::of(b"world"));
    }

    #[test]
    fn rendezvous_leader_is_deterministic_given_same_membership() {
        let members = vec!["a".to_string(), "b".to_string(), "c".to_string()];
        let l1 = rendezvous_leader("req-1", &members).cloned();
        let l2 = rendezvous_leader("req-1", &members).cloned();
        assert_eq!(l1, l2);
        assert!(l1.is_some());
    }

    #[test]
    fn rendezvous_leader_none_for_empty_membership() {
        let members: Vec<String> = Vec::new();
        assert!(rendezvous_leader("req", &members).is_none());
    }
}
