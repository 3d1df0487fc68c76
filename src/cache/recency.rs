use lru::LruCache;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::{borrow::Borrow, hash::Hash, num::NonZeroUsize};

/// Snapshot of a [`RecencyCache`]'s counters.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CacheStats {
    pub capacity: usize,
    pub len: usize,
    pub hits: u64,
    pub misses: u64,
}

impl CacheStats {
    pub fn hit_rate_pct(&self) -> f32 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            (self.hits as f32 / total as f32) * 100.0
        }
    }
}

#[derive(Debug)]
struct Inner<K: Hash + Eq, V> {
    entries: LruCache<K, V>,
    hits: u64,
    misses: u64,
}

/// Fixed-capacity cache with least-recently-used eviction.
///
/// Reads through [`RecencyCache::get`] promote the entry. Background writers use
/// [`RecencyCache::update`] / [`RecencyCache::update_with`], which only touch entries already
/// present and leave the recency order alone.
#[derive(Debug)]
pub struct RecencyCache<K: Hash + Eq, V: Clone> {
    inner: Mutex<Inner<K, V>>,
}

impl<K: Hash + Eq, V: Clone> RecencyCache<K, V> {
    /// A capacity of zero is treated as one.
    pub fn new(capacity: usize) -> Self {
        let capacity = NonZeroUsize::new(capacity).unwrap_or(NonZeroUsize::MIN);
        RecencyCache {
            inner: Mutex::new(Inner {
                entries: LruCache::new(capacity),
                hits: 0,
                misses: 0,
            }),
        }
    }

    /// Clone of the cached value, promoting it to most-recently-used.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut inner = self.inner.lock();
        let found = inner.entries.get(key).cloned();
        if found.is_some() {
            inner.hits += 1;
        } else {
            inner.misses += 1;
        }
        found
    }

    /// Clone of the cached value without touching recency or counters.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().entries.peek(key).cloned()
    }

    /// Insert as most-recently-used. Returns the entry evicted to make room, if any.
    pub fn put(&self, key: K, value: V) -> Option<(K, V)> {
        let mut inner = self.inner.lock();
        match inner.entries.push(key, value) {
            // `push` also hands back the replaced value when the key already existed.
            Some((old_key, old_value)) if !inner.entries.contains(&old_key) => {
                Some((old_key, old_value))
            }
            _ => None,
        }
    }

    /// [`RecencyCache::put`] only if `admit` holds, evaluated under the cache lock so no writer
    /// can patch the cache between the check and the insert. Eviction is not reported.
    pub fn put_if<F>(&self, key: K, value: V, admit: F) -> bool
    where
        F: FnOnce() -> bool,
    {
        let mut inner = self.inner.lock();
        if !admit() {
            return false;
        }
        inner.entries.push(key, value);
        true
    }

    /// Replace an existing entry in place without promoting it. Absent keys are left absent.
    pub fn update<Q>(&self, key: &Q, value: V) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.update_with(key, |slot| *slot = value)
    }

    /// Mutate an existing entry in place without promoting it.
    pub fn update_with<Q, F>(&self, key: &Q, f: F) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&mut V),
    {
        let mut inner = self.inner.lock();
        match inner.entries.peek_mut(key) {
            Some(slot) => {
                f(slot);
                true
            }
            None => false,
        }
    }

    /// Visit every resident entry without promoting any of them.
    pub fn update_each<F>(&self, mut f: F)
    where
        F: FnMut(&K, &mut V),
    {
        let mut inner = self.inner.lock();
        for (key, value) in inner.entries.iter_mut() {
            f(key, value);
        }
    }

    pub fn remove<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().entries.pop(key)
    }

    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.lock().entries.contains(key)
    }

    pub fn clear(&self) {
        self.inner.lock().entries.clear();
    }

    pub fn len(&self) -> usize {
        self.inner.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        let inner = self.inner.lock();
        CacheStats {
            capacity: inner.entries.cap().get(),
            len: inner.entries.len(),
            hits: inner.hits,
            misses: inner.misses,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn evicts_least_recently_used() {
        let cache = RecencyCache::new(2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        assert_eq!(cache.get("a"), Some(1));
        let evicted = cache.put("c".to_string(), 3);
        assert_eq!(evicted, Some(("b".to_string(), 2)));
        assert!(cache.contains("a"));
        assert!(!cache.contains("b"));
        assert_eq!(cache.len(), 2);
    }

    #[test]
    fn replacing_a_key_is_not_an_eviction() {
        let cache = RecencyCache::new(2);
        cache.put("a".to_string(), 1);
        assert_eq!(cache.put("a".to_string(), 2), None);
        assert_eq!(cache.peek("a"), Some(2));
    }

    #[test]
    fn update_does_not_promote() {
        let cache = RecencyCache::new(2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        // "a" is least recent; refreshing it in place must keep it that way.
        assert!(cache.update("a", 10));
        cache.put("c".to_string(), 3);
        assert!(!cache.contains("a"));
        assert_eq!(cache.peek("b"), Some(2));
    }

    #[test]
    fn update_ignores_absent_keys() {
        let cache: RecencyCache<String, i32> = RecencyCache::new(2);
        assert!(!cache.update("ghost", 1));
        assert!(!cache.update_with("ghost", |v| *v += 1));
        assert!(cache.is_empty());
    }

    #[test]
    fn put_if_checks_under_the_lock() {
        let cache = RecencyCache::new(2);
        assert!(!cache.put_if("a".to_string(), 1, || false));
        assert!(cache.is_empty());
        assert!(cache.put_if("a".to_string(), 1, || true));
        assert_eq!(cache.peek("a"), Some(1));
    }

    #[test]
    fn update_each_keeps_recency() {
        let cache = RecencyCache::new(2);
        cache.put("a".to_string(), 1);
        cache.put("b".to_string(), 2);
        cache.update_each(|key, value| {
            if key == "a" {
                *value += 10;
            }
        });
        assert_eq!(cache.peek("a"), Some(11));
        cache.put("c".to_string(), 3);
        assert!(!cache.contains("a"));
        assert_eq!(cache.peek("b"), Some(2));
    }

    #[test]
    fn counts_hits_and_misses() {
        let cache = RecencyCache::new(0);
        cache.put(1u32, "one");
        assert_eq!(cache.get(&1), Some("one"));
        assert_eq!(cache.get(&2), None);
        let stats = cache.stats();
        assert_eq!(stats.capacity, 1);
        assert_eq!((stats.hits, stats.misses), (1, 1));
        assert_eq!(stats.hit_rate_pct(), 50.0);
        assert_eq!(cache.remove(&1), Some("one"));
        assert!(cache.is_empty());
    }
}
