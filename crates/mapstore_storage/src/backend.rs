//! Backend trait definition and commit batches.

use crate::error::StorageResult;
use std::collections::HashMap;
use std::hash::Hash;

/// A single buffered write inside a [`WriteBatch`].
#[derive(Debug, Clone, PartialEq)]
pub enum WriteOp<V> {
    /// Insert or replace the value stored under the key.
    Put(V),
    /// Remove the key. Removing an absent key is not an error.
    Delete,
}

/// An ordered set of writes applied to a backend as one unit.
///
/// A batch holds at most one operation per key; a later operation on the
/// same key replaces the earlier one in place.
#[derive(Debug, Clone)]
pub struct WriteBatch<K, V> {
    ops: Vec<(K, WriteOp<V>)>,
    /// Position of each key in `ops`.
    index: HashMap<K, usize>,
}

impl<K: Hash + Eq + Clone, V> WriteBatch<K, V> {
    /// Creates an empty batch.
    #[must_use]
    pub fn new() -> Self {
        Self {
            ops: Vec::new(),
            index: HashMap::new(),
        }
    }

    /// Records a put.
    pub fn put(&mut self, key: K, value: V) {
        self.push(key, WriteOp::Put(value));
    }

    /// Records a delete.
    pub fn delete(&mut self, key: K) {
        self.push(key, WriteOp::Delete);
    }

    fn push(&mut self, key: K, op: WriteOp<V>) {
        if let Some(&pos) = self.index.get(&key) {
            self.ops[pos].1 = op;
        } else {
            self.index.insert(key.clone(), self.ops.len());
            self.ops.push((key, op));
        }
    }
}

impl<K, V> WriteBatch<K, V> {
    /// Returns the number of operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.ops.len()
    }

    /// Returns true if the batch holds no operations.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.ops.is_empty()
    }

    /// Iterates over the operations in insertion order.
    pub fn iter(&self) -> impl Iterator<Item = (&K, &WriteOp<V>)> {
        self.ops.iter().map(|(k, op)| (k, op))
    }
}

impl<K: Hash + Eq + Clone, V> Default for WriteBatch<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> IntoIterator for WriteBatch<K, V> {
    type Item = (K, WriteOp<V>);
    type IntoIter = std::vec::IntoIter<(K, WriteOp<V>)>;

    fn into_iter(self) -> Self::IntoIter {
        self.ops.into_iter()
    }
}

/// What a batch operation actually did to the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AppliedKind {
    /// The key did not exist before.
    Inserted,
    /// An existing value was replaced.
    Replaced,
    /// An existing value was removed.
    Removed,
}

/// Outcome of one applied operation, reported back to the caller.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Applied<K> {
    /// The affected key.
    pub key: K,
    /// What happened to it.
    pub kind: AppliedKind,
}

/// Authoritative committed state of one entity kind.
///
/// Backends store values of type `V` under keys of type `K`. They are
/// shared by every transaction of the entity kind and are only mutated by
/// [`MapBackend::apply`] (transaction commit) and
/// [`MapBackend::remove_where`] (storage-level bulk removal).
///
/// # Invariants
///
/// - Values returned from any method are owned copies; callers can never
///   reach the backend's own storage
/// - `select` and `keys` yield entries in the backend's iteration order,
///   which must be stable between calls when no commit intervenes
/// - `apply` is atomic: either every operation of the batch becomes
///   visible or none does, and concurrent batches never interleave
/// - Deleting an absent key is a no-op and is not reported as applied
pub trait MapBackend<K, V>: Send + Sync {
    /// Reads the value stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn read(&self, key: &K) -> StorageResult<Option<V>>;

    /// Returns true if a value is stored under `key`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn contains(&self, key: &K) -> StorageResult<bool>;

    /// Returns copies of every entry accepted by `filter`, in iteration order.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn select(&self, filter: &dyn Fn(&K, &V) -> bool) -> StorageResult<Vec<(K, V)>>;

    /// Counts the entries accepted by `filter` without copying them.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn count(&self, filter: &dyn Fn(&K, &V) -> bool) -> StorageResult<usize>;

    /// Applies a batch atomically and reports what changed.
    ///
    /// # Errors
    ///
    /// Returns an error if the batch could not be applied. In that case no
    /// operation of the batch is visible.
    fn apply(&self, batch: WriteBatch<K, V>) -> StorageResult<Vec<Applied<K>>>;

    /// Removes every entry accepted by `filter` and returns the removed keys.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal could not be performed.
    fn remove_where(&self, filter: &dyn Fn(&K, &V) -> bool) -> StorageResult<Vec<K>>;

    /// Returns the number of stored entries.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn len(&self) -> StorageResult<usize>;

    /// Returns true if the backend stores nothing.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend cannot be read.
    fn is_empty(&self) -> StorageResult<bool> {
        Ok(self.len()? == 0)
    }
}
