//! Memoization of constructed readers.
//!
//! Entries are never invalidated implicitly: if files change on disk while a
//! cached reader is alive, call [`ReaderCache::clear`].
use std::collections::HashMap;
use std::hash::Hash;
use std::rc::Rc;

use crate::error::Result;

#[derive(Debug)]
pub struct ReaderCache<K, V> {
    entries: HashMap<K, Rc<V>>,
    enabled: bool,
}

impl<K, V> Default for ReaderCache<K, V> {
    fn default() -> Self {
        Self { entries: HashMap::new(), enabled: true }
    }
}

impl<K: Eq + Hash + Clone, V> ReaderCache<K, V> {
    pub fn new() -> Self {
        Self::default()
    }

    /// Return the cached value for `key`, building it with `make` on a miss.
    ///
    /// While the cache is disabled every call builds a fresh value and
    /// nothing is stored.
    pub fn get_or_create<F>(&mut self, key: &K, make: F) -> Result<Rc<V>>
    where
        F: FnOnce() -> Result<V>,
    {
        if !self.enabled {
            return Ok(Rc::new(make()?));
        }
        if let Some(v) = self.entries.get(key) {
            return Ok(Rc::clone(v));
        }
        let v = Rc::new(make()?);
        self.entries.insert(key.clone(), Rc::clone(&v));
        Ok(v)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
    }

    pub fn enable(&mut self) {
        self.enabled = true;
    }

    /// Stop caching; optionally drop everything cached so far.
    pub fn disable(&mut self, clear: bool) {
        self.enabled = false;
        if clear {
            self.clear();
        }
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::EegError;

    #[test]
    fn hit_returns_same_instance() {
        let mut cache = ReaderCache::new();
        let a = cache.get_or_create(&1, || Ok(String::from("a"))).unwrap();
        let b = cache.get_or_create(&1, || Ok(String::from("b"))).unwrap();
        assert!(Rc::ptr_eq(&a, &b));
        assert_eq!(*b, "a");
        assert_eq!(cache.len(), 1);
    }

    #[test]
    fn disabled_cache_builds_every_time() {
        let mut cache = ReaderCache::new();
        cache.get_or_create(&"k", || Ok(1)).unwrap();
        cache.disable(false);
        assert_eq!(cache.len(), 1);
        assert_eq!(*cache.get_or_create(&"k", || Ok(2)).unwrap(), 2);
        cache.disable(true);
        assert!(cache.is_empty());
        cache.enable();
        assert_eq!(*cache.get_or_create(&"k", || Ok(3)).unwrap(), 3);
    }

    #[test]
    fn failed_builds_are_not_cached() {
        let mut cache: ReaderCache<u8, u8> = ReaderCache::new();
        assert!(cache.get_or_create(&0, || Err(EegError::MissingData("x".into()))).is_err());
        assert!(cache.is_empty());
    }
}
