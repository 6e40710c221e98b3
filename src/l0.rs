//! In-process cache: capacity-bounded, strict-expiry LRU map with tri-state
//! lookup.
//!
//! Adapts `enterprise::cache::tier::LruCache` to a
//! synchronous, non-suspending, O(1)-amortized contract: no
//! `tokio::sync::RwLock`, no background sweepers, and an intrusive
//! doubly-linked list (arena-backed) instead of that cache's `Vec<K>`
//! access-order scan, which was O(n) per touch.

use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::Mutex;

/// Outcome of an L0 lookup.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LookupStatus {
    /// Present and fresh at the time of the call.
    Hit,
    /// Not present.
    Miss,
    /// Was present but its `expiresAtMillis` had already passed; the
    /// caller still receives the stale value, and the entry is removed as
    /// part of this same lookup.
    Expired,
}

/// Result of an L0 `get`.
pub struct LookupResult<V> {
    /// HIT / MISS / EXPIRED.
    pub status: LookupStatus,
    /// The stored value on HIT or EXPIRED; `None` on MISS.
    pub value: Option<V>,
}

struct Node<K, V> {
    key: K,
    value: V,
    expires_at_millis: i64,
    prev: Option<usize>,
    next: Option<usize>,
}

struct Inner<K, V> {
    capacity: usize,
    index: HashMap<K, usize>,
    slots: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    most_recent: Option<usize>,
    least_recent: Option<usize>,
}

impl<K, V> Inner<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    fn new(capacity: usize) -> Self {
        Self {
            capacity: capacity.max(1),
            index: HashMap::new(),
            slots: Vec::new(),
            free: Vec::new(),
            most_recent: None,
            least_recent: None,
        }
    }

    fn detach(&mut self, slot: usize) {
        let (prev, next) = {
            let node = self.slots[slot].as_ref().unwrap();
            (node.prev, node.next)
        };
        match prev {
            Some(p) => self.slots[p].as_mut().unwrap().next = next,
            None => self.most_recent = next,
        }
        match next {
            Some(n) => self.slots[n].as_mut().unwrap().prev = prev,
            None => self.least_recent = prev,
        }
    }

    fn push_most_recent(&mut self, slot: usize) {
        let old_head = self.most_recent;
        {
            let node = self.slots[slot].as_mut().unwrap();
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            self.slots[h].as_mut().unwrap().prev = Some(slot);
        }
        self.most_recent = Some(slot);
        if self.least_recent.is_none() {
            self.least_recent = Some(slot);
        }
    }

    fn remove_slot(&mut self, slot: usize) -> Node<K, V> {
        self.detach(slot);
        let node = self.slots[slot].take().unwrap();
        self.index.remove(&node.key);
        self.free.push(slot);
        node
    }

    fn evict_least_recent(&mut self) {
        if let Some(slot) = self.least_recent {
            self.remove_slot(slot);
        }
    }

    fn alloc(&mut self, node: Node<K, V>) -> usize {
        if let Some(slot) = self.free.pop() {
            self.slots[slot] = Some(node);
            slot
        } else {
            self.slots.push(Some(node));
            self.slots.len() - 1
        }
    }

    fn get(&mut self, key: &K, now_millis: i64) -> LookupResult<V> {
        let Some(&slot) = self.index.get(key) else {
            return LookupResult { status: LookupStatus::Miss, value: None };
        };

        let expired = self.slots[slot].as_ref().unwrap().expires_at_millis <= now_millis;
        if expired {
            let node = self.remove_slot(slot);
            return LookupResult { status: LookupStatus::Expired, value: Some(node.value) };
        }

        self.detach(slot);
        self.push_most_recent(slot);
        let value = self.slots[slot].as_ref().unwrap().value.clone();
        LookupResult { status: LookupStatus::Hit, value: Some(value) }
    }

    fn set(&mut self, key: K, value: V, expires_at_millis: i64) {
        if let Some(&slot) = self.index.get(&key) {
            self.remove_slot(slot);
        } else if self.index.len() >= self.capacity {
            self.evict_least_recent();
        }

        let node = Node {
            key: key.clone(),
            value,
            expires_at_millis,
            prev: None,
            next: None,
        };
        let slot = self.alloc(node);
        self.index.insert(key, slot);
        self.push_most_recent(slot);
    }

    fn clear(&mut self) {
        self.index.clear();
        self.slots.clear();
        self.free.clear();
        self.most_recent = None;
        self.least_recent = None;
    }

    fn len(&self) -> usize {
        self.index.len()
    }
}

/// Snapshot of L0 occupancy, returned by `info()`.
#[derive(Debug, Clone, Copy)]
pub struct L0Info {
    /// Current number of live entries.
    pub len: usize,
    /// Configured maximum.
    pub capacity: usize,
}

/// In-process L0 cache. All operations are synchronous and non-suspending;
/// there are no timers, background threads, or sweepers — expiry and
/// eviction are both resolved inline during `get`/`set`.
pub struct InMemoryL0<K, V> {
    inner: Mutex<Inner<K, V>>,
}

impl<K, V> InMemoryL0<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// Construct an L0 cache with the given entry capacity (floored at 1).
    pub fn new(capacity: usize) -> Self {
        Self { inner: Mutex::new(Inner::new(capacity)) }
    }

    /// Tri-state lookup. On `Expired`, the entry is removed as part of this
    /// same call; on `Hit`, the entry moves to most-recent.
    pub fn get(&self, key: &K, now_millis: i64) -> LookupResult<V> {
        self.inner.lock().get(key, now_millis)
    }

    /// Insert or replace `key`. If the map is at capacity after accounting
    /// for the new key, the least-recently-used entry is evicted first.
    pub fn set(&self, key: K, value: V, expires_at_millis: i64) {
        self.inner.lock().set(key, value, expires_at_millis);
    }

    /// Remove all entries.
    pub fn clear(&self) {
        self.inner.lock().clear();
    }

    /// Current occupancy and configured capacity.
    pub fn info(&self) -> L0Info {
        let inner = self.inner.lock();
        L0Info { len: inner.len(), capacity: inner.capacity }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn tri_state_correctness() {
        let l0: InMemoryL0<&str, &str> = InMemoryL0::new(1000);
        l0.set("abc", "x", 2_000_000_000_000);

        let hit = l0.get(&"abc", 1_999_000_000_000);
        assert_eq!(hit.status, LookupStatus::Hit);
        assert_eq!(hit.value, Some("x"));

        let expired = l0.get(&"abc", 2_000_000_000_001);
        assert_eq!(expired.status, LookupStatus::Expired);
        assert_eq!(expired.value, Some("x"));

        let miss = l0.get(&"abc", 2_000_000_000_002);
        assert_eq!(miss.status, LookupStatus::Miss);
        assert_eq!(miss.value, None);
    }

    #[test]
    fn lru_eviction_of_three() {
        let l0: InMemoryL0<&str, &str> = InMemoryL0::new(3);
        l0.set("k1", "v1", i64::MAX);
        l0.set("k2", "v2", i64::MAX);
        l0.set("k3", "v3", i64::MAX);
        l0.set("k4", "v4", i64::MAX);

        assert_eq!(l0.get(&"k1", 0).status, LookupStatus::Miss);
        assert_eq!(l0.get(&"k2", 0).status, LookupStatus::Hit);
        assert_eq!(l0.get(&"k3", 0).status, LookupStatus::Hit);
        assert_eq!(l0.get(&"k4", 0).status, LookupStatus::Hit);
    }

    #[test]
    fn access_moves_to_most_recent() {
        let l0: InMemoryL0<&str, i32> = InMemoryL0::new(3);
        l0.set("k0", 0, i64::MAX);
        l0.set("k1", 1, i64::MAX);
        l0.set("k2", 2, i64::MAX);
        l0.get(&"k0", 0);
        l0.set("k3", 3, i64::MAX);

        assert_eq!(l0.get(&"k0", 0).status, LookupStatus::Hit);
        assert_eq!(l0.get(&"k1", 0).status, LookupStatus::Miss);
    }

    #[test]
    fn capacity_never_exceeds_configured_maximum() {
        let l0: InMemoryL0<i32, i32> = InMemoryL0::new(5);
        for i in 0..50 {
            l0.set(i, i, i64::MAX);
        }
        assert_eq!(l0.info().len, 5);
    }

    #[test]
    fn round_trip_preserves_value() {
        let l0: InMemoryL0<&str, Vec<u8>> = InMemoryL0::new(10);
        let value = vec![1, 2, 3, 4];
        l0.set("k", value.clone(), i64::MAX);
        assert_eq!(l0.get(&"k", 0).value, Some(value));
    }

    #[test]
    fn set_on_existing_key_moves_to_most_recent() {
        let l0: InMemoryL0<&str, i32> = InMemoryL0::new(2);
        l0.set("a", 1, i64::MAX);
        l0.set("b", 2, i64::MAX);
        l0.set("a", 10, i64::MAX); // re-set existing key, should now be MRU
        l0.set("c", 3, i64::MAX); // evicts LRU, which should be "b"

        assert_eq!(l0.get(&"b", 0).status, LookupStatus::Miss);
        assert_eq!(l0.get(&"a", 0).value, Some(10));
    }

    proptest::proptest! {
        #[test]
        fn occupancy_never_exceeds_capacity_and_last_insert_always_survives(
            capacity in 1usize..20,
            inserts in proptest::collection::vec(0i32..200, 0..200),
        ) {
            let l0: InMemoryL0<i32, i32> = InMemoryL0::new(capacity);
            for key in &inserts {
                l0.set(*key, *key, i64::MAX);
                proptest::prop_assert!(l0.info().len <= capacity);
            }
            if let Some(last) = inserts.last() {
                proptest::prop_assert_eq!(l0.get(last, 0).status, LookupStatus::Hit);
            }
        }
    }
}
