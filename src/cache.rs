//! Fixed-capacity map that evicts the oldest inserted entry first.
//!
//! Eviction order is insertion order only: reading an entry or putting a new
//! value under an existing key leaves its position untouched. There is no TTL.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

#[derive(Debug, Clone)]
pub struct BoundedCache<K, V> {
    capacity: usize,
    entries: HashMap<K, V>,
    order: VecDeque<K>,
}

impl<K, V> BoundedCache<K, V>
where
    K: Eq + Hash + Clone,
{
    /// A capacity of zero is bumped to one so every `put` is observable.
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            capacity,
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
        }
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.entries.get(key)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Insert `value` under `key`, evicting the oldest entry when full.
    ///
    /// Returns the evicted key, if any.
    pub fn put(&mut self, key: K, value: V) -> Option<K> {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
            return None;
        }
        let mut evicted = None;
        if self.entries.len() >= self.capacity {
            if let Some(oldest) = self.order.pop_front() {
                self.entries.remove(&oldest);
                evicted = Some(oldest);
            }
        }
        self.order.push_back(key.clone());
        self.entries.insert(key, value);
        evicted
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_first_inserted_after_overflow() {
        let mut cache = BoundedCache::new(3);
        for key in ["a", "b", "c"] {
            assert_eq!(cache.put(key, key.len()), None);
        }
        assert_eq!(cache.put("d", 1), Some("a"));
        assert_eq!(cache.len(), 3);
        assert!(!cache.contains(&"a"));
        assert!(cache.contains(&"b"));
        assert!(cache.contains(&"d"));
    }

    #[test]
    fn reads_do_not_refresh_position() {
        let mut cache = BoundedCache::new(2);
        cache.put(1, "one");
        cache.put(2, "two");
        assert_eq!(cache.get(&1), Some(&"one"));
        cache.put(3, "three");
        assert!(cache.get(&1).is_none(), "oldest entry goes even if recently read");
        assert_eq!(cache.get(&2), Some(&"two"));
    }

    #[test]
    fn reput_keeps_original_priority() {
        let mut cache = BoundedCache::new(2);
        cache.put("x", 1);
        cache.put("y", 2);
        assert_eq!(cache.put("x", 10), None);
        assert_eq!(cache.get(&"x"), Some(&10));
        assert_eq!(cache.len(), 2);
        assert_eq!(cache.put("z", 3), Some("x"));
        assert_eq!(cache.get(&"y"), Some(&2));
    }

    #[test]
    fn zero_capacity_holds_one_entry() {
        let mut cache = BoundedCache::new(0);
        assert_eq!(cache.capacity(), 1);
        cache.put('a', ());
        cache.put('b', ());
        assert_eq!(cache.len(), 1);
        assert!(cache.contains(&'b'));
    }

    #[test]
    fn n_plus_one_puts_leave_n_entries() {
        for capacity in 1..=8usize {
            let mut cache = BoundedCache::new(capacity);
            for key in 0..=capacity {
                cache.put(key, key * 2);
            }
            assert_eq!(cache.len(), capacity);
            assert!(cache.get(&0).is_none());
            assert_eq!(cache.get(&capacity), Some(&(capacity * 2)));
        }
    }
}
