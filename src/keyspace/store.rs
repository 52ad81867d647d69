//! The Keyspace Engine
//!
//! One map from key to entry, guarded by a single coarse mutex. Every
//! operation locks, runs its whole critical section without suspending,
//! and unlocks before any I/O happens, so each operation is linearizable
//! with respect to every other: multi-key reads and writes observe and
//! produce consistent snapshots, and no reader ever sees a torn write.
//!
//! ## Expiry
//!
//! A key's deadline is an absolute monotonic timestamp
//! ([`std::time::Instant`]), so system clock skew never stretches or
//! truncates a TTL. Two reclamation mechanisms coexist:
//!
//! 1. **Lazy**: every read path checks the deadline and drops the entry
//!    on the fly.
//! 2. **Eventual**: [`sweep`](Keyspace::sweep) pops due deadlines from a
//!    min-heap in bounded batches; the background sweeper task calls it
//!    on a timer so keys that are never touched again still get
//!    reclaimed.
//!
//! Heap entries are never removed eagerly. When a key is rewritten or
//! deleted, its old heap entry goes stale and is recognized during the
//! sweep by comparing the recorded deadline against the live entry.

use crate::keyspace::glob::glob_match;
use bytes::Bytes;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use std::sync::Mutex;
use std::time::{Duration, Instant};

/// The stored record for one key.
#[derive(Debug, Clone)]
pub struct Entry {
    /// The value bytes
    pub value: Bytes,
    /// Absolute deadline; `None` means the entry never expires
    pub expires_at: Option<Instant>,
}

impl Entry {
    /// True while the entry is observable at `now`.
    #[inline]
    fn live_at(&self, now: Instant) -> bool {
        self.expires_at.map_or(true, |deadline| now < deadline)
    }
}

/// Result of a TTL query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Ttl {
    /// Key absent (or already past its deadline)
    Missing,
    /// Key present with no deadline
    NoExpiry,
    /// Key present; this much time remains
    Remaining(Duration),
}

#[derive(Debug, Default)]
struct Inner {
    entries: HashMap<Bytes, Entry>,
    /// Min-heap of (deadline, key) pairs for the sweeper. May contain
    /// stale pairs for rewritten or deleted keys.
    deadlines: BinaryHeap<Reverse<(Instant, Bytes)>>,
}

impl Inner {
    /// Lazy expiry: evicts the entry if its deadline has passed, then
    /// returns the live entry if one remains.
    fn live_entry(&mut self, key: &Bytes, now: Instant) -> Option<&Entry> {
        if self.entries.get(key).is_some_and(|e| !e.live_at(now)) {
            self.entries.remove(key);
        }
        self.entries.get(key)
    }
}

/// The key/value store shared by every connection.
///
/// Wrap it in an [`std::sync::Arc`] and hand clones to the command layer
/// and the sweeper; all methods take `&self` and lock internally.
///
/// # Example
///
/// ```
/// use emberkv::keyspace::Keyspace;
/// use bytes::Bytes;
///
/// let ks = Keyspace::new();
/// ks.set(Bytes::from("name"), Bytes::from("Alice"), None);
/// assert_eq!(ks.get(&Bytes::from("name")), Some(Bytes::from("Alice")));
/// ```
#[derive(Debug, Default)]
pub struct Keyspace {
    inner: Mutex<Inner>,
}

impl Keyspace {
    pub fn new() -> Self {
        Self::default()
    }

    /// Looks up a key. Returns `None` for absent or expired keys;
    /// an expired entry is evicted on the way out.
    pub fn get(&self, key: &Bytes) -> Option<Bytes> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        inner.live_entry(key, now).map(|e| e.value.clone())
    }

    /// Stores a value, replacing any previous entry for the key. With
    /// `ttl` absent the new entry never expires; a previous deadline does
    /// not carry over.
    pub fn set(&self, key: Bytes, value: Bytes, ttl: Option<Duration>) {
        let mut inner = self.inner.lock().unwrap();
        let expires_at = ttl.map(|ttl| Instant::now() + ttl);
        if let Some(deadline) = expires_at {
            inner.deadlines.push(Reverse((deadline, key.clone())));
        }
        inner.entries.insert(key, Entry { value, expires_at });
    }

    /// Looks up many keys in one critical section. The result has the
    /// same length and order as `keys` and may mix hits and `None`s.
    pub fn mget(&self, keys: &[Bytes]) -> Vec<Option<Bytes>> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        keys.iter()
            .map(|key| inner.live_entry(key, now).map(|e| e.value.clone()))
            .collect()
    }

    /// Stores many pairs atomically: no reader can observe a subset of
    /// the writes. Prior deadlines on touched keys are cleared.
    pub fn mset(&self, pairs: Vec<(Bytes, Bytes)>) {
        let mut inner = self.inner.lock().unwrap();
        for (key, value) in pairs {
            inner.entries.insert(
                key,
                Entry {
                    value,
                    expires_at: None,
                },
            );
        }
    }

    /// Removes keys, returning how many existed (and were unexpired) at
    /// the time of removal. Expired entries are dropped but not counted.
    pub fn delete(&self, keys: &[Bytes]) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        let mut removed = 0;
        for key in keys {
            if let Some(entry) = inner.entries.remove(key) {
                if entry.live_at(now) {
                    removed += 1;
                }
            }
        }
        removed
    }

    /// Counts, with multiplicity, how many of `keys` are present and
    /// unexpired. `exists([a, a])` on a present `a` is 2.
    pub fn exists(&self, keys: &[Bytes]) -> u64 {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        keys.iter()
            .filter(|key| inner.live_entry(key, now).is_some())
            .count() as u64
    }

    /// Sets or overwrites the deadline on a live key. Returns false for
    /// absent keys; an expired key is evicted, never resurrected.
    pub fn expire(&self, key: &Bytes, ttl: Duration) -> bool {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        if inner.live_entry(key, now).is_none() {
            return false;
        }
        let deadline = now + ttl;
        if let Some(entry) = inner.entries.get_mut(key) {
            entry.expires_at = Some(deadline);
        }
        inner.deadlines.push(Reverse((deadline, key.clone())));
        true
    }

    /// Reports the remaining TTL of a key. Never returns a negative
    /// remainder for a live entry.
    pub fn ttl(&self, key: &Bytes) -> Ttl {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();
        match inner.live_entry(key, now) {
            None => Ttl::Missing,
            Some(entry) => match entry.expires_at {
                None => Ttl::NoExpiry,
                Some(deadline) => Ttl::Remaining(deadline.saturating_duration_since(now)),
            },
        }
    }

    /// Returns all live keys matching `pattern` (see [`glob_match`]).
    /// Expired keys never appear and are evicted during the scan.
    ///
    /// This walks the whole keyspace under the mutex, so it is O(n) and
    /// blocks concurrent operations for the duration of the scan.
    pub fn keys(&self, pattern: &[u8]) -> Vec<Bytes> {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        let mut dead = Vec::new();
        let mut matched = Vec::new();
        for (key, entry) in &inner.entries {
            if !entry.live_at(now) {
                dead.push(key.clone());
            } else if glob_match(pattern, key) {
                matched.push(key.clone());
            }
        }
        for key in &dead {
            inner.entries.remove(key);
        }

        matched
    }

    /// Removes every entry and all pending expiry bookkeeping.
    pub fn flush(&self) {
        let mut inner = self.inner.lock().unwrap();
        inner.entries.clear();
        inner.deadlines.clear();
    }

    /// Evicts due keys, popping at most `batch` heap entries so the
    /// critical section stays bounded. Returns the number of entries
    /// actually evicted; stale heap pairs consume budget but evict
    /// nothing.
    pub fn sweep(&self, batch: usize) -> usize {
        let mut inner = self.inner.lock().unwrap();
        let now = Instant::now();

        let mut evicted = 0;
        let mut budget = batch;
        while budget > 0 {
            let due = matches!(
                inner.deadlines.peek(),
                Some(Reverse((deadline, _))) if *deadline <= now
            );
            if !due {
                break;
            }
            if let Some(Reverse((deadline, key))) = inner.deadlines.pop() {
                budget -= 1;
                // Stale pair: the key was rewritten, re-expired or
                // already gone. Only the recorded deadline counts.
                let current = inner.entries.get(&key).and_then(|e| e.expires_at);
                if current == Some(deadline) {
                    inner.entries.remove(&key);
                    evicted += 1;
                }
            }
        }
        evicted
    }

    /// Number of stored entries, including ones past their deadline that
    /// have not been reclaimed yet.
    pub fn len(&self) -> usize {
        self.inner.lock().unwrap().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;
    use std::thread;

    fn b(s: &str) -> Bytes {
        Bytes::copy_from_slice(s.as_bytes())
    }

    #[test]
    fn set_and_get() {
        let ks = Keyspace::new();
        ks.set(b("key"), b("value"), None);
        assert_eq!(ks.get(&b("key")), Some(b("value")));
    }

    #[test]
    fn get_missing() {
        let ks = Keyspace::new();
        assert_eq!(ks.get(&b("nope")), None);
    }

    #[test]
    fn empty_value_is_not_nil() {
        let ks = Keyspace::new();
        ks.set(b("key"), Bytes::new(), None);
        assert_eq!(ks.get(&b("key")), Some(Bytes::new()));
    }

    #[test]
    fn binary_keys_and_values() {
        let ks = Keyspace::new();
        let key = Bytes::from_static(b"\x00\x01\xfe\xff");
        let value: Bytes = (0u8..=255).collect::<Vec<u8>>().into();
        ks.set(key.clone(), value.clone(), None);
        assert_eq!(ks.get(&key), Some(value));
    }

    #[test]
    fn delete_counts_only_live_keys() {
        let ks = Keyspace::new();
        ks.set(b("a"), b("1"), None);
        ks.set(b("b"), b("2"), Some(Duration::from_millis(20)));
        thread::sleep(Duration::from_millis(60));

        // "b" is past its deadline: removed but not counted.
        assert_eq!(ks.delete(&[b("a"), b("b"), b("c")]), 1);
        assert_eq!(ks.delete(&[b("a")]), 0);
    }

    #[test]
    fn exists_counts_with_multiplicity() {
        let ks = Keyspace::new();
        ks.set(b("a"), b("1"), None);
        assert_eq!(ks.exists(&[b("a"), b("a"), b("a")]), 3);
        assert_eq!(ks.exists(&[b("a"), b("x"), b("a")]), 2);
        assert_eq!(ks.exists(&[b("x")]), 0);
    }

    #[test]
    fn expired_key_reads_as_missing() {
        let ks = Keyspace::new();
        ks.set(b("key"), b("value"), Some(Duration::from_millis(30)));
        assert_eq!(ks.get(&b("key")), Some(b("value")));

        thread::sleep(Duration::from_millis(80));
        assert_eq!(ks.get(&b("key")), None);
        assert_eq!(ks.exists(&[b("key")]), 0);
    }

    #[test]
    fn set_without_ttl_clears_deadline() {
        let ks = Keyspace::new();
        ks.set(b("key"), b("v1"), Some(Duration::from_millis(30)));
        ks.set(b("key"), b("v2"), None);

        thread::sleep(Duration::from_millis(80));
        assert_eq!(ks.get(&b("key")), Some(b("v2")));
        assert_eq!(ks.ttl(&b("key")), Ttl::NoExpiry);
    }

    #[test]
    fn mget_mixes_hits_and_misses() {
        let ks = Keyspace::new();
        ks.set(b("a"), b("1"), None);
        ks.set(b("c"), b("3"), None);
        assert_eq!(
            ks.mget(&[b("a"), b("x"), b("c")]),
            vec![Some(b("1")), None, Some(b("3"))]
        );
    }

    #[test]
    fn mset_clears_prior_deadlines() {
        let ks = Keyspace::new();
        ks.set(b("a"), b("old"), Some(Duration::from_millis(30)));
        ks.mset(vec![(b("a"), b("new")), (b("b"), b("2"))]);

        thread::sleep(Duration::from_millis(80));
        assert_eq!(ks.get(&b("a")), Some(b("new")));
        assert_eq!(ks.get(&b("b")), Some(b("2")));
    }

    #[test]
    fn expire_and_ttl() {
        let ks = Keyspace::new();
        assert_eq!(ks.ttl(&b("missing")), Ttl::Missing);
        assert!(!ks.expire(&b("missing"), Duration::from_secs(10)));

        ks.set(b("key"), b("v"), None);
        assert_eq!(ks.ttl(&b("key")), Ttl::NoExpiry);

        assert!(ks.expire(&b("key"), Duration::from_secs(60)));
        match ks.ttl(&b("key")) {
            Ttl::Remaining(left) => assert!(left <= Duration::from_secs(60)),
            other => panic!("expected remaining ttl, got {:?}", other),
        }
    }

    #[test]
    fn expire_does_not_resurrect() {
        let ks = Keyspace::new();
        ks.set(b("key"), b("v"), Some(Duration::from_millis(20)));
        thread::sleep(Duration::from_millis(60));

        assert!(!ks.expire(&b("key"), Duration::from_secs(60)));
        assert_eq!(ks.get(&b("key")), None);
    }

    #[test]
    fn expire_overwrites_deadline() {
        let ks = Keyspace::new();
        ks.set(b("key"), b("v"), Some(Duration::from_millis(20)));
        assert!(ks.expire(&b("key"), Duration::from_secs(60)));

        thread::sleep(Duration::from_millis(60));
        assert_eq!(ks.get(&b("key")), Some(b("v")));
    }

    #[test]
    fn keys_filters_by_pattern() {
        let ks = Keyspace::new();
        ks.set(b("a"), b("1"), None);
        ks.set(b("b"), b("2"), None);
        ks.set(b("ab"), b("3"), None);

        let mut matched = ks.keys(b"a*");
        matched.sort();
        assert_eq!(matched, vec![b("a"), b("ab")]);

        assert_eq!(ks.keys(b"*").len(), 3);
        assert!(ks.keys(b"[").is_empty());
    }

    #[test]
    fn keys_hides_and_evicts_expired() {
        let ks = Keyspace::new();
        ks.set(b("live"), b("1"), None);
        ks.set(b("dying"), b("2"), Some(Duration::from_millis(20)));
        thread::sleep(Duration::from_millis(60));

        assert_eq!(ks.keys(b"*"), vec![b("live")]);
        // The scan itself reclaimed the expired entry.
        assert_eq!(ks.len(), 1);
    }

    #[test]
    fn flush_clears_entries_and_bookkeeping() {
        let ks = Keyspace::new();
        ks.set(b("a"), b("1"), Some(Duration::from_millis(10)));
        ks.set(b("b"), b("2"), None);
        ks.flush();

        assert!(ks.is_empty());
        thread::sleep(Duration::from_millis(40));
        // No deadlines survive a flush, so there is nothing to sweep.
        assert_eq!(ks.sweep(100), 0);
    }

    #[test]
    fn sweep_is_bounded_per_batch() {
        let ks = Keyspace::new();
        for i in 0..50 {
            ks.set(b(&format!("key{}", i)), b("v"), Some(Duration::from_millis(10)));
        }
        thread::sleep(Duration::from_millis(50));

        assert_eq!(ks.sweep(20), 20);
        assert_eq!(ks.len(), 30);
        assert_eq!(ks.sweep(100), 30);
        assert!(ks.is_empty());
    }

    #[test]
    fn sweep_skips_stale_heap_pairs() {
        let ks = Keyspace::new();
        ks.set(b("key"), b("v1"), Some(Duration::from_millis(10)));
        // Rewrite without TTL: the old heap pair is now stale.
        ks.set(b("key"), b("v2"), None);
        thread::sleep(Duration::from_millis(40));

        assert_eq!(ks.sweep(10), 0);
        assert_eq!(ks.get(&b("key")), Some(b("v2")));
    }

    #[test]
    fn sweep_ignores_future_deadlines() {
        let ks = Keyspace::new();
        ks.set(b("key"), b("v"), Some(Duration::from_secs(60)));
        assert_eq!(ks.sweep(10), 0);
        assert_eq!(ks.len(), 1);
    }

    #[test]
    fn concurrent_writers_and_readers() {
        let ks = Arc::new(Keyspace::new());
        let mut handles = vec![];

        for i in 0..8 {
            let ks = Arc::clone(&ks);
            handles.push(thread::spawn(move || {
                for j in 0..200 {
                    let key = b(&format!("key-{}-{}", i, j));
                    ks.set(key.clone(), b("value"), None);
                    assert_eq!(ks.get(&key), Some(b("value")));
                }
            }));
        }
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(ks.len(), 8 * 200);
    }

    #[test]
    fn mset_is_never_observed_half_applied() {
        let ks = Arc::new(Keyspace::new());
        ks.mset(vec![(b("a"), b("0")), (b("b"), b("0"))]);

        let writer = {
            let ks = Arc::clone(&ks);
            thread::spawn(move || {
                for i in 1..500 {
                    let v = b(&i.to_string());
                    ks.mset(vec![(b("a"), v.clone()), (b("b"), v)]);
                }
            })
        };

        for _ in 0..500 {
            let vals = ks.mget(&[b("a"), b("b")]);
            assert_eq!(vals[0], vals[1], "observed a torn multi-key write");
        }
        writer.join().unwrap();
    }
}
