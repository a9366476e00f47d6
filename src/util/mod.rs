pub mod safe_list;

pub use safe_list::SafeList;

use std::time::{SystemTime, UNIX_EPOCH};

/// Wall-clock seconds since the epoch, for `Data::system_time_sec`.
pub fn wall_clock_secs() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs() as i64)
        .unwrap_or(0)
}

/// Monotonic seconds since an arbitrary but fixed reference point, for
/// `Data::monotonic_time_sec`. Backed by `CLOCK_MONOTONIC` via `nix`.
pub fn monotonic_secs() -> i64 {
    nix::time::clock_gettime(nix::time::ClockId::CLOCK_MONOTONIC)
        .map(|ts| ts.tv_sec())
        .unwrap_or(0)
}

/// 64-bit Jenkins one-at-a-time ("lookup3"-family) hash used to mint
/// collector session identifiers.
pub fn jenkins_hash(data: &[u8]) -> u64 {
    let mut hash: u64 = 0;
    for &byte in data {
        hash = hash.wrapping_add(byte as u64);
        hash = hash.wrapping_add(hash << 10);
        hash ^= hash >> 6;
    }
    hash = hash.wrapping_add(hash << 3);
    hash ^= hash >> 11;
    hash = hash.wrapping_add(hash << 15);
    hash
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn jenkins_hash_is_deterministic() {
        assert_eq!(jenkins_hash(b"hello"), jenkins_hash(b"hello"));
    }

    #[test]
    fn jenkins_hash_distinguishes_inputs() {
        assert_ne!(jenkins_hash(b"hello-a"), jenkins_hash(b"hello-b"));
    }
}
