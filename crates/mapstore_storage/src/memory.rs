//! In-memory backend.

use crate::backend::{Applied, AppliedKind, MapBackend, WriteBatch, WriteOp};
use crate::error::{StorageError, StorageResult};
use parking_lot::RwLock;
use std::collections::BTreeMap;
use std::sync::atomic::{AtomicBool, Ordering};

/// An in-memory backend keyed by an ordered map.
///
/// Iteration order is key order. Every batch is applied under a single
/// write lock, so concurrent commits are serialized and never observed
/// half-applied.
///
/// This backend is suitable for:
/// - Unit and integration tests
/// - Ephemeral stores that don't need persistence (sessions, caches)
///
/// # Example
///
/// ```rust
/// use mapstore_storage::{InMemoryBackend, MapBackend, WriteBatch};
///
/// let backend = InMemoryBackend::with_entries(vec![(1u32, "a"), (2, "b")]);
/// assert_eq!(backend.len().unwrap(), 2);
///
/// let mut batch = WriteBatch::new();
/// batch.delete(1);
/// backend.apply(batch).unwrap();
/// assert!(!backend.contains(&1).unwrap());
/// ```
#[derive(Debug)]
pub struct InMemoryBackend<K, V> {
    entries: RwLock<BTreeMap<K, V>>,
    closed: AtomicBool,
}

impl<K: Ord, V> InMemoryBackend<K, V> {
    /// Creates a new empty backend.
    #[must_use]
    pub fn new() -> Self {
        Self {
            entries: RwLock::new(BTreeMap::new()),
            closed: AtomicBool::new(false),
        }
    }

    /// Creates a backend pre-populated with entries.
    ///
    /// Useful for seeding fixtures.
    #[must_use]
    pub fn with_entries(entries: impl IntoIterator<Item = (K, V)>) -> Self {
        Self {
            entries: RwLock::new(entries.into_iter().collect()),
            closed: AtomicBool::new(false),
        }
    }

    /// Closes the backend. Every later call fails with [`StorageError::Closed`].
    pub fn close(&self) {
        self.closed.store(true, Ordering::SeqCst);
    }

    /// Returns true once [`InMemoryBackend::close`] has been called.
    #[must_use]
    pub fn is_closed(&self) -> bool {
        self.closed.load(Ordering::SeqCst)
    }

    /// Removes every entry.
    pub fn clear(&self) {
        self.entries.write().clear();
    }

    fn ensure_open(&self) -> StorageResult<()> {
        if self.is_closed() {
            Err(StorageError::Closed)
        } else {
            Ok(())
        }
    }
}

impl<K: Ord, V> Default for InMemoryBackend<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MapBackend<K, V> for InMemoryBackend<K, V>
where
    K: Ord + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn read(&self, key: &K) -> StorageResult<Option<V>> {
        self.ensure_open()?;
        Ok(self.entries.read().get(key).cloned())
    }

    fn contains(&self, key: &K) -> StorageResult<bool> {
        self.ensure_open()?;
        Ok(self.entries.read().contains_key(key))
    }

    fn select(&self, filter: &dyn Fn(&K, &V) -> bool) -> StorageResult<Vec<(K, V)>> {
        self.ensure_open()?;
        let entries = self.entries.read();
        Ok(entries
            .iter()
            .filter(|(k, v)| filter(k, v))
            .map(|(k, v)| (k.clone(), v.clone()))
            .collect())
    }

    fn count(&self, filter: &dyn Fn(&K, &V) -> bool) -> StorageResult<usize> {
        self.ensure_open()?;
        Ok(self.entries.read().iter().filter(|(k, v)| filter(k, v)).count())
    }

    fn apply(&self, batch: WriteBatch<K, V>) -> StorageResult<Vec<Applied<K>>> {
        self.ensure_open()?;
        let mut entries = self.entries.write();
        let mut applied = Vec::with_capacity(batch.len());

        for (key, op) in batch {
            match op {
                WriteOp::Put(value) => {
                    let kind = if entries.insert(key.clone(), value).is_some() {
                        AppliedKind::Replaced
                    } else {
                        AppliedKind::Inserted
                    };
                    applied.push(Applied { key, kind });
                }
                WriteOp::Delete => {
                    if entries.remove(&key).is_some() {
                        applied.push(Applied {
                            key,
                            kind: AppliedKind::Removed,
                        });
                    }
                }
            }
        }

        Ok(applied)
    }

    fn remove_where(&self, filter: &dyn Fn(&K, &V) -> bool) -> StorageResult<Vec<K>> {
        self.ensure_open()?;
        let mut entries = self.entries.write();
        let doomed: Vec<K> = entries
            .iter()
            .filter(|(k, v)| filter(k, v))
            .map(|(k, _)| k.clone())
            .collect();
        for key in &doomed {
            entries.remove(key);
        }
        Ok(doomed)
    }

    fn len(&self) -> StorageResult<usize> {
        self.ensure_open()?;
        Ok(self.entries.read().len())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn seeded() -> InMemoryBackend<u32, String> {
        InMemoryBackend::with_entries((1..=5).map(|i| (i, format!("v{i}"))))
    }

    #[test]
    fn memory_new_is_empty() {
        let backend: InMemoryBackend<u32, String> = InMemoryBackend::new();
        assert_eq!(backend.len().unwrap(), 0);
        assert!(backend.is_empty().unwrap());
    }

    #[test]
    fn read_returns_copy() {
        let backend = seeded();
        let mut value = backend.read(&1).unwrap().unwrap();
        value.push_str("-mutated");
        assert_eq!(backend.read(&1).unwrap().unwrap(), "v1");
    }

    #[test]
    fn read_missing_key() {
        let backend = seeded();
        assert_eq!(backend.read(&42).unwrap(), None);
        assert!(!backend.contains(&42).unwrap());
    }

    #[test]
    fn select_is_in_key_order() {
        let backend = seeded();
        let odd = backend.select(&|k, _| k % 2 == 1).unwrap();
        let keys: Vec<u32> = odd.iter().map(|(k, _)| *k).collect();
        assert_eq!(keys, vec![1, 3, 5]);
        assert_eq!(backend.count(&|k, _| k % 2 == 1).unwrap(), 3);
    }

    #[test]
    fn apply_reports_what_changed() {
        let backend = seeded();
        let mut batch = WriteBatch::new();
        batch.put(1, "new".to_string());
        batch.put(9, "nine".to_string());
        batch.delete(2);
        batch.delete(100);

        let applied = backend.apply(batch).unwrap();
        assert_eq!(
            applied,
            vec![
                Applied { key: 1, kind: AppliedKind::Replaced },
                Applied { key: 9, kind: AppliedKind::Inserted },
                Applied { key: 2, kind: AppliedKind::Removed },
            ]
        );
        assert_eq!(backend.len().unwrap(), 5);
        assert_eq!(backend.read(&1).unwrap().as_deref(), Some("new"));
    }

    #[test]
    fn remove_where_returns_removed_keys() {
        let backend = seeded();
        let removed = backend.remove_where(&|k, _| *k > 3).unwrap();
        assert_eq!(removed, vec![4, 5]);
        assert_eq!(backend.len().unwrap(), 3);
    }

    #[test]
    fn closed_backend_rejects_everything() {
        let backend = seeded();
        backend.close();
        assert!(matches!(backend.read(&1), Err(StorageError::Closed)));
        assert!(matches!(
            backend.apply(WriteBatch::new()),
            Err(StorageError::Closed)
        ));
    }

    #[test]
    fn clear_empties_backend() {
        let backend = seeded();
        backend.clear();
        assert!(backend.is_empty().unwrap());
    }

    proptest! {
        #[test]
        fn apply_matches_model(ops in prop::collection::vec((0u8..16, any::<Option<u16>>()), 0..64)) {
            let backend: InMemoryBackend<u8, u16> = InMemoryBackend::new();
            let mut model = BTreeMap::new();
            for (key, value) in ops {
                let mut batch = WriteBatch::new();
                match value {
                    Some(v) => { batch.put(key, v); model.insert(key, v); }
                    None => { batch.delete(key); model.remove(&key); }
                }
                backend.apply(batch).unwrap();
            }
            let stored: BTreeMap<u8, u16> = backend.select(&|_, _| true).unwrap().into_iter().collect();
            prop_assert_eq!(stored, model);
        }
    }
}
