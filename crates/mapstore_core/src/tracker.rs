//! Working copies and the per-transaction change tracker.
//!
//! The backend owns stored values and a transaction owns working copies.
//! Callers only ever hold [`Tracked`] handles to a working copy, so nothing a
//! caller does can reach the backend except through commit.

use parking_lot::{RwLock, RwLockReadGuard, RwLockWriteGuard};
use std::collections::HashMap;
use std::fmt;
use std::hash::Hash;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

struct TrackedInner<V> {
    entity: RwLock<V>,
    dirty: AtomicBool,
}

/// Handle to a transaction's working copy of one entity.
///
/// Cloning the handle does not clone the entity: every clone refers to the
/// same working copy. Two reads of one key within a transaction return
/// handles for which [`Tracked::ptr_eq`] holds.
///
/// Mutable access through [`Tracked::write`] marks the copy dirty; only dirty
/// copies are written back at commit. Guards must not be held across calls
/// into the owning transaction.
pub struct Tracked<V> {
    inner: Arc<TrackedInner<V>>,
}

impl<V> Tracked<V> {
    pub(crate) fn new(entity: V) -> Self {
        Self {
            inner: Arc::new(TrackedInner {
                entity: RwLock::new(entity),
                dirty: AtomicBool::new(false),
            }),
        }
    }

    pub(crate) fn new_dirty(entity: V) -> Self {
        let tracked = Self::new(entity);
        tracked.mark_dirty();
        tracked
    }

    /// Shared access to the working copy.
    pub fn read(&self) -> RwLockReadGuard<'_, V> {
        self.inner.entity.read()
    }

    /// Exclusive access to the working copy. Marks it dirty.
    pub fn write(&self) -> RwLockWriteGuard<'_, V> {
        self.mark_dirty();
        self.inner.entity.write()
    }

    /// Runs `f` with mutable access to the working copy.
    pub fn update<R>(&self, f: impl FnOnce(&mut V) -> R) -> R {
        f(&mut self.write())
    }

    /// Returns true if both handles refer to the same working copy.
    #[must_use]
    pub fn ptr_eq(&self, other: &Self) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }

    /// Returns true if the working copy was mutably accessed.
    #[must_use]
    pub fn is_dirty(&self) -> bool {
        self.inner.dirty.load(Ordering::Acquire)
    }

    pub(crate) fn mark_dirty(&self) {
        self.inner.dirty.store(true, Ordering::Release);
    }

    pub(crate) fn replace(&self, entity: V) {
        *self.write() = entity;
    }
}

impl<V: Clone> Tracked<V> {
    /// Clones the current state of the working copy into a detached value.
    #[must_use]
    pub fn snapshot(&self) -> V {
        self.read().clone()
    }
}

impl<V> Clone for Tracked<V> {
    fn clone(&self) -> Self {
        Self {
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<V: fmt::Debug> fmt::Debug for Tracked<V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Tracked")
            .field("entity", &*self.read())
            .field("dirty", &self.is_dirty())
            .finish()
    }
}

/// Caches one working copy per key for the lifetime of a transaction.
pub struct ChangeTracker<K, V> {
    entries: HashMap<K, Tracked<V>>,
}

impl<K, V> ChangeTracker<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    /// Creates an empty tracker.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: HashMap::new(),
        }
    }

    /// Returns the working copy for `key`, cloning `entity` into a new one
    /// on first registration.
    pub fn register(&mut self, key: K, entity: &V) -> Tracked<V> {
        self.entries
            .entry(key)
            .or_insert_with(|| Tracked::new(entity.clone()))
            .clone()
    }

    /// Like [`ChangeTracker::register`], taking ownership of a value that is
    /// already a private copy.
    pub(crate) fn adopt(&mut self, key: K, entity: V) -> Tracked<V> {
        self.entries
            .entry(key)
            .or_insert_with(|| Tracked::new(entity))
            .clone()
    }

    /// Replaces whatever is cached under `key` with `tracked`.
    pub(crate) fn insert(&mut self, key: K, tracked: Tracked<V>) {
        self.entries.insert(key, tracked);
    }

    /// The cached working copy for `key`.
    #[must_use]
    pub fn get(&self, key: &K) -> Option<&Tracked<V>> {
        self.entries.get(key)
    }

    /// Returns true if `key` has a working copy.
    #[must_use]
    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    /// Forgets the working copy for `key`.
    pub fn remove(&mut self, key: &K) -> Option<Tracked<V>> {
        self.entries.remove(key)
    }

    /// Number of tracked keys.
    #[must_use]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    /// Returns true if nothing is tracked.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Iterates over tracked keys and their working copies.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &Tracked<V>)> {
        self.entries.iter()
    }

    /// Drops every working copy.
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}

impl<K, V> Default for ChangeTracker<K, V>
where
    K: Eq + Hash,
    V: Clone,
{
    fn default() -> Self {
        Self::new()
    }
}

impl<K: fmt::Debug, V> fmt::Debug for ChangeTracker<K, V> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_set().entries(self.entries.keys()).finish()
    }
}
