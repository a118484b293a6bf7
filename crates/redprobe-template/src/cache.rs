//! Bounded template cache — LRU with optional TTL
//!
//! The cache holds weak references to registry-owned templates: once the
//! registry drops a template, the entry self-invalidates on the next lookup.
//! Callers must treat it as a best-effort accelerator, never a source of
//! truth.

use redprobe_core::Template;
use serde::Serialize;
use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};
use std::time::{Duration, Instant};
use tracing::trace;

struct CacheEntry {
    template: Weak<Template>,
    inserted_at: Instant,
    /// Logical access clock; bumped on every hit without taking the write
    /// lock, so readers never block each other.
    last_access: AtomicU64,
}

#[derive(Clone, Copy, Debug, Default, Serialize)]
pub struct CacheStats {
    pub size: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
    pub expirations: u64,
}

pub struct TemplateCache {
    entries: RwLock<HashMap<String, CacheEntry>>,
    capacity: usize,
    ttl: Option<Duration>,
    clock: AtomicU64,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
    expirations: AtomicU64,
}

impl TemplateCache {
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            entries: RwLock::new(HashMap::new()),
            capacity: capacity.max(1),
            ttl,
            clock: AtomicU64::new(0),
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
            expirations: AtomicU64::new(0),
        }
    }

    /// Look up a template. Expired or dead entries count as misses and are
    /// lazily deleted.
    pub fn get(&self, id: &str) -> Option<Arc<Template>> {
        let outcome = {
            let entries = self.entries.read().unwrap_or_else(|e| e.into_inner());
            match entries.get(id) {
                None => Lookup::Miss,
                Some(entry) => {
                    if self
                        .ttl
                        .is_some_and(|ttl| entry.inserted_at.elapsed() > ttl)
                    {
                        Lookup::Expired
                    } else {
                        match entry.template.upgrade() {
                            Some(template) => {
                                let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
                                entry.last_access.store(tick, Ordering::Relaxed);
                                Lookup::Hit(template)
                            }
                            // Registry dropped the template out from under us.
                            None => Lookup::Dead,
                        }
                    }
                }
            }
        };

        match outcome {
            Lookup::Hit(template) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(template)
            }
            Lookup::Miss => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
            Lookup::Expired => {
                self.expirations.fetch_add(1, Ordering::Relaxed);
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.delete(id);
                None
            }
            Lookup::Dead => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                self.delete(id);
                None
            }
        }
    }

    /// Insert or replace an entry, evicting the least-recently-used entry
    /// when over capacity.
    pub fn set(&self, id: &str, template: &Arc<Template>) {
        let tick = self.clock.fetch_add(1, Ordering::Relaxed) + 1;
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        entries.insert(
            id.to_string(),
            CacheEntry {
                template: Arc::downgrade(template),
                inserted_at: Instant::now(),
                last_access: AtomicU64::new(tick),
            },
        );
        while entries.len() > self.capacity {
            let victim = entries
                .iter()
                .filter(|(key, _)| key.as_str() != id)
                .min_by_key(|(_, e)| e.last_access.load(Ordering::Relaxed))
                .map(|(key, _)| key.clone());
            match victim {
                Some(key) => {
                    entries.remove(&key);
                    self.evictions.fetch_add(1, Ordering::Relaxed);
                    trace!(evicted = %key, "cache eviction");
                }
                None => break,
            }
        }
    }

    pub fn delete(&self, id: &str) -> bool {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .is_some()
    }

    pub fn clear(&self) {
        self.entries
            .write()
            .unwrap_or_else(|e| e.into_inner())
            .clear();
    }

    /// Drop entries older than `max_age`; returns how many were removed.
    pub fn prune(&self, max_age: Duration) -> usize {
        let mut entries = self.entries.write().unwrap_or_else(|e| e.into_inner());
        let before = entries.len();
        entries.retain(|_, e| e.inserted_at.elapsed() <= max_age && e.template.upgrade().is_some());
        let removed = before - entries.len();
        self.expirations.fetch_add(removed as u64, Ordering::Relaxed);
        removed
    }

    pub fn len(&self) -> usize {
        self.entries.read().unwrap_or_else(|e| e.into_inner()).len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            size: self.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
            expirations: self.expirations.load(Ordering::Relaxed),
        }
    }
}

enum Lookup {
    Hit(Arc<Template>),
    Miss,
    Expired,
    Dead,
}

#[cfg(test)]
mod tests {
    use super::*;
    use redprobe_core::Severity;

    fn template(id: &str) -> Arc<Template> {
        Arc::new(Template {
            id: id.into(),
            name: "T".into(),
            version: "1.0".into(),
            description: String::new(),
            category: String::new(),
            severity: Severity::Info,
            tags: vec![],
            variables: Default::default(),
            prompt: "ping".into(),
            detection: vec![],
            metadata: Default::default(),
        })
    }

    #[test]
    fn get_set_delete() {
        let cache = TemplateCache::new(4, None);
        let t = template("a_v1.0");
        cache.set("a_v1.0", &t);
        assert!(cache.get("a_v1.0").is_some());
        assert!(cache.delete("a_v1.0"));
        assert!(cache.get("a_v1.0").is_none());
    }

    #[test]
    fn capacity_is_never_exceeded() {
        let cache = TemplateCache::new(2, None);
        let keep = [template("a"), template("b"), template("c")];
        cache.set("a", &keep[0]);
        cache.set("b", &keep[1]);
        // touch "a" so "b" becomes the LRU victim
        assert!(cache.get("a").is_some());
        cache.set("c", &keep[2]);
        assert_eq!(cache.len(), 2);
        assert!(cache.get("b").is_none());
        assert!(cache.get("a").is_some());
        assert!(cache.get("c").is_some());
        assert_eq!(cache.stats().evictions, 1);
    }

    #[test]
    fn expired_entries_are_never_returned() {
        let cache = TemplateCache::new(4, Some(Duration::from_millis(0)));
        let t = template("a");
        cache.set("a", &t);
        std::thread::sleep(Duration::from_millis(5));
        assert!(cache.get("a").is_none());
        assert_eq!(cache.stats().expirations, 1);
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn dead_weak_reference_is_a_miss() {
        let cache = TemplateCache::new(4, None);
        {
            let t = template("a");
            cache.set("a", &t);
        }
        assert!(cache.get("a").is_none());
        assert_eq!(cache.len(), 0);
    }

    #[test]
    fn prune_removes_stale_entries() {
        let cache = TemplateCache::new(4, None);
        let t = template("a");
        cache.set("a", &t);
        std::thread::sleep(Duration::from_millis(5));
        assert_eq!(cache.prune(Duration::from_millis(1)), 1);
        assert_eq!(cache.prune(Duration::from_millis(1)), 0);
    }

    #[test]
    fn stats_track_hits_and_misses() {
        let cache = TemplateCache::new(4, None);
        let t = template("a");
        cache.set("a", &t);
        cache.get("a");
        cache.get("ghost");
        let stats = cache.stats();
        assert_eq!(stats.hits, 1);
        assert_eq!(stats.misses, 1);
        assert_eq!(stats.capacity, 4);
    }
}
