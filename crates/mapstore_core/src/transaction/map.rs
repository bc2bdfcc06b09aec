//! Map transaction state.

use super::query::QueryIter;
use super::unit_of_work::CompletionToken;
use crate::criteria::CriteriaBuilder;
use crate::entity::MapEntity;
use crate::error::{CoreError, CoreResult};
use crate::key::KeyConverter;
use crate::storage::Shared;
use crate::tracker::{ChangeTracker, Tracked};
use crate::types::{TransactionId, TransactionState, UnitOfWorkId};
use mapstore_storage::WriteBatch;
use std::collections::HashSet;
use std::sync::Arc;
use tracing::{debug, trace, warn};

/// Pending changes to one entity kind, applied to the backend at commit.
///
/// Reads see the backend overlaid with this transaction's own creates,
/// updates and deletes. Nothing reaches the backend before the unit of work
/// the transaction is enlisted in commits.
pub struct MapTransaction<E: MapEntity> {
    id: TransactionId,
    state: TransactionState,
    shared: Arc<Shared<E>>,
    tracker: ChangeTracker<E::Key, E>,
    /// Pending creates in creation order.
    created: Vec<E::Key>,
    created_set: HashSet<E::Key>,
    deleted: HashSet<E::Key>,
    bulk_deletes: usize,
    uow: Option<UnitOfWorkId>,
}

impl<E: MapEntity> MapTransaction<E> {
    pub(crate) fn new(id: TransactionId, shared: Arc<Shared<E>>) -> Self {
        Self {
            id,
            state: TransactionState::Active,
            shared,
            tracker: ChangeTracker::new(),
            created: Vec::new(),
            created_set: HashSet::new(),
            deleted: HashSet::new(),
            bulk_deletes: 0,
            uow: None,
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Returns the current state.
    #[must_use]
    pub fn state(&self) -> TransactionState {
        self.state
    }

    /// Checks if the transaction is still active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.state == TransactionState::Active
    }

    /// Name of the entity kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.shared.kind
    }

    /// The key converter of the owning storage.
    #[must_use]
    pub fn key_converter(&self) -> &dyn KeyConverter<E::Key> {
        self.shared.keys.as_ref()
    }

    /// The unit of work this transaction is enlisted in.
    #[must_use]
    pub fn unit_of_work(&self) -> Option<UnitOfWorkId> {
        self.uow
    }

    pub(crate) fn set_unit_of_work(&mut self, uow: UnitOfWorkId) {
        self.uow = Some(uow);
    }

    /// Registers a new entity under `key` and returns its working copy.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::DuplicateKey`] if an entity is already visible
    /// under `key`, or [`CoreError::IdentityMismatch`] if the entity reports
    /// a different key.
    pub fn create(&mut self, key: E::Key, entity: E) -> CoreResult<Tracked<E>> {
        self.ensure_active()?;
        self.check_identity(&key, &entity)?;
        if self.exists(&key)? {
            return Err(CoreError::duplicate_key(
                self.kind(),
                self.shared.keys.key_to_string(&key),
            ));
        }
        trace!(txid = %self.id, kind = %self.shared.kind, key = ?key, "create");

        self.deleted.remove(&key);
        let tracked = Tracked::new_dirty(entity);
        self.tracker.insert(key.clone(), tracked.clone());
        self.created_set.insert(key.clone());
        self.created.push(key);
        Ok(tracked)
    }

    /// Returns the working copy for `key`, loading it from the backend on
    /// first access. Pending deletes read as absent.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn read(&mut self, key: &E::Key) -> CoreResult<Option<Tracked<E>>> {
        self.ensure_active()?;
        if self.deleted.contains(key) {
            return Ok(None);
        }
        if let Some(tracked) = self.tracker.get(key) {
            return Ok(Some(tracked.clone()));
        }
        trace!(txid = %self.id, kind = %self.shared.kind, key = ?key, "load");
        Ok(self
            .shared
            .backend
            .read(key)?
            .map(|entity| self.tracker.adopt(key.clone(), entity)))
    }

    /// Returns true if an entity is visible under `key`.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn exists(&self, key: &E::Key) -> CoreResult<bool> {
        self.ensure_active()?;
        if self.deleted.contains(key) {
            return Ok(false);
        }
        if self.tracker.contains(key) {
            return Ok(true);
        }
        Ok(self.shared.backend.contains(key)?)
    }

    /// Replaces the content of the working copy for `key`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyRemoved`] if `key` is pending deletion,
    /// [`CoreError::NotFound`] if nothing is stored under it, and
    /// [`CoreError::IdentityMismatch`] if the entity reports another key.
    pub fn update(&mut self, key: &E::Key, entity: E) -> CoreResult<Tracked<E>> {
        self.ensure_active()?;
        self.check_identity(key, &entity)?;
        if self.deleted.contains(key) {
            return Err(CoreError::KeyRemoved {
                kind: self.shared.kind.clone(),
                key: self.shared.keys.key_to_string(key),
            });
        }
        let tracked = self.read(key)?.ok_or_else(|| CoreError::NotFound {
            kind: self.shared.kind.clone(),
            key: self.shared.keys.key_to_string(key),
        })?;
        tracked.replace(entity);
        Ok(tracked)
    }

    /// Starts tracking a detached copy of an existing entity.
    ///
    /// If the entity's key is already tracked, the existing working copy is
    /// returned and `entity` is ignored.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::KeyRemoved`] for a pending-deleted key and
    /// [`CoreError::NotFound`] if nothing is stored under the key.
    pub fn register(&mut self, entity: &E) -> CoreResult<Tracked<E>> {
        self.ensure_active()?;
        let key = entity.id();
        if self.deleted.contains(key) {
            return Err(CoreError::KeyRemoved {
                kind: self.shared.kind.clone(),
                key: self.shared.keys.key_to_string(key),
            });
        }
        if !self.tracker.contains(key) && !self.shared.backend.contains(key)? {
            return Err(CoreError::NotFound {
                kind: self.shared.kind.clone(),
                key: self.shared.keys.key_to_string(key),
            });
        }
        Ok(self.tracker.register(key.clone(), entity))
    }

    /// Marks `key` for deletion, discarding any pending create or update.
    ///
    /// Returns whether an entity was visible under `key`. Deleting a pending
    /// create cancels it.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn delete(&mut self, key: &E::Key) -> CoreResult<bool> {
        self.ensure_active()?;
        if self.deleted.contains(key) {
            return Ok(false);
        }
        trace!(txid = %self.id, kind = %self.shared.kind, key = ?key, "delete");

        let was_created = self.created_set.remove(key);
        if was_created {
            self.created.retain(|k| k != key);
        }
        let was_tracked = self.tracker.remove(key).is_some();
        let in_backend = self.shared.backend.contains(key)?;
        if in_backend {
            self.deleted.insert(key.clone());
        }
        Ok(was_created || was_tracked || in_backend)
    }

    /// Deletes every visible entity matching `criteria`.
    ///
    /// `scratch_key` only labels the operation in the log; any key will do
    /// and it may be reused. Returns the number of deleted entities.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn delete_matching(
        &mut self,
        scratch_key: E::Key,
        criteria: &CriteriaBuilder<E::Field>,
    ) -> CoreResult<usize> {
        self.ensure_active()?;

        let mut keys: Vec<E::Key> = self
            .backend_matches(criteria)?
            .into_iter()
            .map(|(key, _)| key)
            .collect();
        keys.extend(self.created_matches(criteria));

        for key in &keys {
            self.delete(key)?;
        }
        debug!(
            txid = %self.id,
            kind = %self.shared.kind,
            scratch = ?scratch_key,
            removed = keys.len(),
            criteria = %criteria,
            "bulk delete"
        );
        self.bulk_deletes += 1;
        Ok(keys.len())
    }

    /// Counts the visible entities matching `criteria`.
    ///
    /// Always equal to the number of elements
    /// [`MapTransaction::get_updated_not_removed`] yields for the same
    /// criteria at the same point in the transaction.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn get_count(&self, criteria: &CriteriaBuilder<E::Field>) -> CoreResult<usize> {
        self.ensure_active()?;
        let in_backend = self
            .shared
            .backend
            .count(&|key, value| self.view_filter(criteria, key, value))?;
        Ok(in_backend + self.created_matches(criteria).count())
    }

    /// Queries the visible entities matching `criteria`.
    ///
    /// Backend entries come first in backend iteration order, followed by
    /// pending creates in creation order. Each element is this
    /// transaction's working copy, tracked as it is yielded. Matching
    /// backend rows are selected eagerly; see [`QueryIter`].
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn get_updated_not_removed<'t>(
        &'t mut self,
        criteria: &'t CriteriaBuilder<E::Field>,
    ) -> CoreResult<QueryIter<'t, E>> {
        self.ensure_active()?;
        let rows = self.backend_matches(criteria)?;
        trace!(txid = %self.id, kind = %self.shared.kind, criteria = %criteria, rows = rows.len(), "query");
        let created = self.created.clone();
        Ok(QueryIter::new(&mut self.tracker, criteria, rows, created))
    }

    /// Number of writes a commit would apply right now.
    #[must_use]
    pub fn pending_writes(&self) -> usize {
        let updates = self
            .tracker
            .iter()
            .filter(|(key, tracked)| tracked.is_dirty() && !self.created_set.contains(*key))
            .count();
        self.created.len() + updates + self.deleted.len()
    }

    /// Applies all pending changes to the backend as one batch.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::IdentityMismatch`] if a working copy changed its
    /// key (nothing is applied), or the backend's error.
    pub fn commit(&mut self, _token: &CompletionToken) -> CoreResult<()> {
        self.ensure_active()?;
        if self.shared.config.verify_identity_on_commit {
            if let Err(err) = self.verify_identities() {
                debug!(txid = %self.id, kind = %self.shared.kind, error = %err, "commit rejected");
                self.finish(TransactionState::RolledBack);
                return Err(err);
            }
        }

        let batch = self.build_batch();
        let writes = batch.len();
        let applied = match self.shared.backend.apply(batch) {
            Ok(applied) => applied,
            Err(err) => {
                debug!(txid = %self.id, kind = %self.shared.kind, error = %err, "backend rejected commit");
                self.finish(TransactionState::RolledBack);
                return Err(err.into());
            }
        };

        if self.shared.config.emit_change_events {
            let keys = &self.shared.keys;
            self.shared.feed.publish(
                self.id,
                &self.shared.kind,
                applied
                    .into_iter()
                    .map(|a| (keys.key_to_string(&a.key), a.kind.into())),
            );
        }

        debug!(
            txid = %self.id,
            kind = %self.shared.kind,
            writes,
            bulk_deletes = self.bulk_deletes,
            "committed"
        );
        self.finish(TransactionState::Committed);
        Ok(())
    }

    /// Discards all pending changes. No-op once completed.
    pub fn rollback(&mut self, _token: &CompletionToken) {
        if self.state.is_terminal() {
            return;
        }
        debug!(
            txid = %self.id,
            kind = %self.shared.kind,
            discarded = self.pending_writes(),
            "rolled back"
        );
        self.finish(TransactionState::RolledBack);
    }

    fn ensure_active(&self) -> CoreResult<()> {
        if self.state.is_terminal() {
            return Err(CoreError::TransactionClosed {
                txid: self.id,
                state: self.state,
            });
        }
        Ok(())
    }

    fn check_identity(&self, key: &E::Key, entity: &E) -> CoreResult<()> {
        if entity.id() == key {
            return Ok(());
        }
        Err(CoreError::IdentityMismatch {
            kind: self.shared.kind.clone(),
            expected: self.shared.keys.key_to_string(key),
            actual: self.shared.keys.key_to_string(entity.id()),
        })
    }

    fn verify_identities(&self) -> CoreResult<()> {
        self.tracker
            .iter()
            .try_for_each(|(key, tracked)| self.check_identity(key, &tracked.read()))
    }

    /// Whether a backend entry belongs to the combined view and matches.
    /// Tracked entries are judged by their working copy.
    fn view_filter(&self, criteria: &CriteriaBuilder<E::Field>, key: &E::Key, value: &E) -> bool {
        if self.deleted.contains(key) || self.created_set.contains(key) {
            return false;
        }
        match self.tracker.get(key) {
            Some(tracked) => criteria.matches(&*tracked.read()),
            None => criteria.matches(value),
        }
    }

    fn backend_matches(&self, criteria: &CriteriaBuilder<E::Field>) -> CoreResult<Vec<(E::Key, E)>> {
        let rows = self
            .shared
            .backend
            .select(&|key, value| self.view_filter(criteria, key, value))?;
        if self.shared.config.is_oversized_scan(rows.len()) {
            warn!(
                kind = %self.shared.kind,
                rows = rows.len(),
                criteria = %criteria,
                "query matched an unusually large number of entries"
            );
        }
        Ok(rows)
    }

    fn created_matches<'a>(
        &'a self,
        criteria: &'a CriteriaBuilder<E::Field>,
    ) -> impl Iterator<Item = E::Key> + 'a {
        self.created.iter().filter_map(move |key| {
            let tracked = self.tracker.get(key)?;
            criteria.matches(&*tracked.read()).then(|| key.clone())
        })
    }

    fn build_batch(&self) -> WriteBatch<E::Key, E> {
        let mut batch = WriteBatch::new();
        for key in &self.created {
            if let Some(tracked) = self.tracker.get(key) {
                batch.put(key.clone(), tracked.snapshot());
            }
        }

        let mut updated: Vec<(&E::Key, &Tracked<E>)> = self
            .tracker
            .iter()
            .filter(|(key, tracked)| tracked.is_dirty() && !self.created_set.contains(*key))
            .collect();
        updated.sort_by(|a, b| a.0.cmp(b.0));
        for (key, tracked) in updated {
            batch.put(key.clone(), tracked.snapshot());
        }

        let mut deleted: Vec<&E::Key> = self.deleted.iter().collect();
        deleted.sort();
        for key in deleted {
            batch.delete(key.clone());
        }
        batch
    }

    fn finish(&mut self, state: TransactionState) {
        self.tracker.clear();
        self.created.clear();
        self.created_set.clear();
        self.deleted.clear();
        self.bulk_deletes = 0;
        self.state = state;
    }
}

impl<E: MapEntity> std::fmt::Debug for MapTransaction<E> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MapTransaction")
            .field("id", &self.id)
            .field("kind", &self.shared.kind)
            .field("state", &self.state)
            .field("tracked", &self.tracker.len())
            .field("created", &self.created.len())
            .field("deleted", &self.deleted.len())
            .finish()
    }
}
