//! Views over tracked working copies.

use mapstore_core::{KeyConverter, MapEntity, MapKey, Tracked};
use std::fmt;
use std::sync::Arc;

/// Key types usable by the domain stores.
///
/// The `ID` searchable field compares against the key's `Display` form,
/// which for every shipped converter equals its `key_to_string` form.
pub trait ModelKey: MapKey + fmt::Display {}

impl<T> ModelKey for T where T: MapKey + fmt::Display {}

/// A domain view of one tracked entity.
///
/// Views are thin: every getter reads the transaction's working copy and
/// every setter writes it, so changes reach the backend when the unit of
/// work commits. The key converter is injected so ids are rendered the same
/// way the owning storage parses them.
pub struct View<E: MapEntity> {
    entity: Tracked<E>,
    keys: Arc<dyn KeyConverter<E::Key>>,
}

impl<E: MapEntity> View<E> {
    /// Wraps a working copy.
    pub fn new(entity: Tracked<E>, keys: Arc<dyn KeyConverter<E::Key>>) -> Self {
        Self { entity, keys }
    }

    /// The entity id as a string.
    pub fn id(&self) -> String {
        self.keys.key_to_string(self.entity.read().id())
    }

    /// The underlying working copy.
    pub fn tracked(&self) -> &Tracked<E> {
        &self.entity
    }

    /// A detached copy of the current state.
    pub fn snapshot(&self) -> E {
        self.entity.snapshot()
    }

    /// Returns true if both views wrap the same working copy.
    pub fn same_entity(&self, other: &Self) -> bool {
        self.entity.ptr_eq(&other.entity)
    }

    pub(crate) fn get<R>(&self, f: impl FnOnce(&E) -> R) -> R {
        f(&self.entity.read())
    }

    pub(crate) fn set<R>(&self, f: impl FnOnce(&mut E) -> R) -> R {
        self.entity.update(f)
    }
}

impl<E: MapEntity> Clone for View<E> {
    fn clone(&self) -> Self {
        Self {
            entity: self.entity.clone(),
            keys: Arc::clone(&self.keys),
        }
    }
}

impl<E: MapEntity> fmt::Debug for View<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("View").field(&self.id()).finish()
    }
}

impl<E: MapEntity> fmt::Display for View<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.id())
    }
}
