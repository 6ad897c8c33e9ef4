// Copyright (c) Microsoft Corporation.
// Licensed under the MIT License.

use std::collections::HashMap;
use std::time::Duration;

use parking_lot::Mutex;
use tokio::time::Instant;

use super::Fingerprint;

/// Result of [`DedupCache::get_or_insert_with`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Lookup<V> {
    /// A live entry was found and may be reused.
    Existing(V),
    /// No reusable entry existed; `value` was stored under the returned `id`.
    Inserted {
        /// Identifies this insertion for [`DedupCache::replace_if`] and [`DedupCache::remove_if`].
        id: u64,
        /// The stored value.
        value: V,
    },
}

#[derive(Debug)]
struct Entry<V> {
    value: V,
    id: u64,
    expires_at: Instant,
}

#[derive(Debug)]
struct Entries<V> {
    map: HashMap<Fingerprint, Entry<V>>,
    next_id: u64,
    next_sweep: Option<Instant>,
}

/// A time-bounded map from [`Fingerprint`] to a shareable value.
///
/// Entries expire `ttl` after insertion. Expired entries are never returned and are evicted lazily:
/// on the next access to the same key, by [`purge_expired`][Self::purge_expired], or by the sweep
/// that inserts run at most once per `ttl`. No timers are kept, and a cache that keeps seeing new
/// keys holds at most the keys inserted during the last two `ttl` windows.
///
/// # Examples
///
/// ```
/// use std::time::Duration;
/// use ripcord::Request;
/// use ripcord::dedup::{DedupCache, Fingerprint};
///
/// let cache = DedupCache::new(Duration::from_secs(5));
/// let key = Fingerprint::of(&Request::get("/users/7"));
///
/// cache.put(key.clone(), "alice");
///
/// assert_eq!(cache.get(&key), Some("alice"));
/// ```
#[derive(Debug)]
pub struct DedupCache<V> {
    ttl: Duration,
    entries: Mutex<Entries<V>>,
}

impl<V: Clone> DedupCache<V> {
    /// Creates an empty cache whose entries live for `ttl`.
    #[must_use]
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            entries: Mutex::new(Entries {
                map: HashMap::new(),
                next_id: 0,
                next_sweep: None,
            }),
        }
    }

    /// Returns the default entry lifetime.
    #[must_use]
    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    /// Returns the live value stored under `key`.
    #[must_use]
    pub fn get(&self, key: &Fingerprint) -> Option<V> {
        self.get_at(key, Instant::now())
    }

    /// Stores `value` under `key` for the default lifetime, replacing any previous entry.
    pub fn put(&self, key: Fingerprint, value: V) -> u64 {
        self.put_with_ttl(key, value, self.ttl)
    }

    /// Stores `value` under `key` for `ttl`, replacing any previous entry.
    pub fn put_with_ttl(&self, key: Fingerprint, value: V, ttl: Duration) -> u64 {
        self.put_at(key, value, ttl, Instant::now())
    }

    /// Atomically returns a reusable live entry or stores a new one.
    ///
    /// A live entry is returned when `reuse` accepts it. Otherwise `make` is called with the id of
    /// the new entry and its result replaces whatever was stored under `key`.
    pub fn get_or_insert_with(&self, key: Fingerprint, reuse: impl FnOnce(&V) -> bool, make: impl FnOnce(u64) -> V) -> Lookup<V> {
        self.get_or_insert_with_at(key, reuse, make, Instant::now())
    }

    /// Replaces the value of the entry inserted as `id`, keeping its expiry.
    ///
    /// Returns `false` when the entry expired or was replaced by a newer insertion.
    pub fn replace_if(&self, key: &Fingerprint, id: u64, value: V) -> bool {
        self.replace_if_at(key, id, value, Instant::now())
    }

    /// Removes the entry inserted as `id`, leaving newer insertions untouched.
    pub fn remove_if(&self, key: &Fingerprint, id: u64) -> bool {
        let mut entries = self.entries.lock();

        if entries.map.get(key).is_some_and(|entry| entry.id == id) {
            entries.map.remove(key);
            return true;
        }

        false
    }

    /// Returns the number of stored entries, including expired ones not yet evicted.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.lock().map.len()
    }

    /// Returns `true` when nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Evicts every expired entry.
    pub fn purge_expired(&self) {
        self.purge_expired_at(Instant::now());
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.lock().map.clear();
    }

    fn get_at(&self, key: &Fingerprint, now: Instant) -> Option<V> {
        let mut entries = self.entries.lock();

        let expired = match entries.map.get(key) {
            Some(entry) if entry.expires_at > now => return Some(entry.value.clone()),
            Some(_) => true,
            None => false,
        };

        if expired {
            entries.map.remove(key);
        }

        None
    }

    fn put_at(&self, key: Fingerprint, value: V, ttl: Duration, now: Instant) -> u64 {
        let mut entries = self.entries.lock();
        entries.sweep_if_due(now, self.ttl);
        let id = entries.allocate_id();

        entries.map.insert(
            key,
            Entry {
                value,
                id,
                expires_at: now + ttl,
            },
        );

        id
    }

    fn get_or_insert_with_at(
        &self,
        key: Fingerprint,
        reuse: impl FnOnce(&V) -> bool,
        make: impl FnOnce(u64) -> V,
        now: Instant,
    ) -> Lookup<V> {
        let mut entries = self.entries.lock();
        entries.sweep_if_due(now, self.ttl);

        if let Some(entry) = entries.map.get(&key)
            && entry.expires_at > now
            && reuse(&entry.value)
        {
            return Lookup::Existing(entry.value.clone());
        }

        let id = entries.allocate_id();
        let value = make(id);

        entries.map.insert(
            key,
            Entry {
                value: value.clone(),
                id,
                expires_at: now + self.ttl,
            },
        );

        Lookup::Inserted { id, value }
    }

    fn replace_if_at(&self, key: &Fingerprint, id: u64, value: V, now: Instant) -> bool {
        let mut entries = self.entries.lock();

        match entries.map.get_mut(key) {
            Some(entry) if entry.id == id && entry.expires_at > now => {
                entry.value = value;
                true
            }
            _ => false,
        }
    }

    fn purge_expired_at(&self, now: Instant) {
        self.entries.lock().map.retain(|_, entry| entry.expires_at > now);
    }
}

impl<V> Entries<V> {
    fn sweep_if_due(&mut self, now: Instant, interval: Duration) {
        if self.next_sweep.is_some_and(|due| now < due) {
            return;
        }

        self.map.retain(|_, entry| entry.expires_at > now);
        self.next_sweep = Some(now + interval);
    }

    fn allocate_id(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id = self.next_id.wrapping_add(1);
        id
    }
}
