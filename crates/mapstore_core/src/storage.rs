//! Per-kind storage: the factory for transactions and criteria.

use crate::change_feed::{ChangeEvent, ChangeFeed, ChangeType};
use crate::config::StorageConfig;
use crate::criteria::CriteriaBuilder;
use crate::entity::MapEntity;
use crate::error::CoreResult;
use crate::key::KeyConverter;
use crate::transaction::{MapTransaction, Phase, SharedTransaction, UnitOfWork};
use crate::types::TransactionId;
use mapstore_storage::MapBackend;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::mpsc::Receiver;
use std::sync::Arc;
use tracing::debug;

/// State shared by a storage and all of its transactions.
pub(crate) struct Shared<E: MapEntity> {
    pub(crate) kind: String,
    pub(crate) backend: Arc<dyn MapBackend<E::Key, E>>,
    pub(crate) keys: Arc<dyn KeyConverter<E::Key>>,
    pub(crate) feed: ChangeFeed,
    pub(crate) config: StorageConfig,
}

/// Storage for one entity kind.
///
/// Long-lived: one instance per kind, shared by every domain store of that
/// kind. Owns the backend handle, the key converter and the commit change
/// feed.
pub struct MapStorage<E: MapEntity> {
    shared: Arc<Shared<E>>,
    next_txid: AtomicU64,
}

impl<E: MapEntity> MapStorage<E> {
    /// Creates a storage with the default configuration.
    pub fn new(
        kind: impl Into<String>,
        backend: Arc<dyn MapBackend<E::Key, E>>,
        keys: Arc<dyn KeyConverter<E::Key>>,
    ) -> Self {
        Self::with_config(kind, backend, keys, StorageConfig::default())
    }

    /// Creates a storage with an explicit configuration.
    pub fn with_config(
        kind: impl Into<String>,
        backend: Arc<dyn MapBackend<E::Key, E>>,
        keys: Arc<dyn KeyConverter<E::Key>>,
        config: StorageConfig,
    ) -> Self {
        let kind = kind.into();
        debug!(kind = %kind, "storage opened");
        Self {
            shared: Arc::new(Shared {
                kind,
                backend,
                keys,
                feed: ChangeFeed::with_max_history(config.change_history),
                config,
            }),
            next_txid: AtomicU64::new(1),
        }
    }

    /// Name of the entity kind.
    #[must_use]
    pub fn kind(&self) -> &str {
        &self.shared.kind
    }

    /// The storage configuration.
    #[must_use]
    pub fn config(&self) -> &StorageConfig {
        &self.shared.config
    }

    /// The key converter.
    #[must_use]
    pub fn key_converter(&self) -> &dyn KeyConverter<E::Key> {
        self.shared.keys.as_ref()
    }

    /// A shareable handle to the key converter, for domain adapters.
    #[must_use]
    pub fn key_converter_handle(&self) -> Arc<dyn KeyConverter<E::Key>> {
        Arc::clone(&self.shared.keys)
    }

    /// Creates a transaction enlisted in `uow`'s regular phase.
    pub fn create_transaction(&self, uow: &UnitOfWork) -> SharedTransaction<E> {
        self.create_transaction_in(uow, Phase::Regular)
    }

    /// Creates a transaction enlisted in the given phase of `uow`.
    pub fn create_transaction_in(&self, uow: &UnitOfWork, phase: Phase) -> SharedTransaction<E> {
        let tx = self.begin();
        tx.attach(uow, phase);
        tx
    }

    /// Creates a transaction that is not yet enlisted anywhere. It completes
    /// only once [`SharedTransaction::enlist`] hands it to a unit of work.
    pub fn begin(&self) -> SharedTransaction<E> {
        let id = TransactionId::new(self.next_txid.fetch_add(1, Ordering::SeqCst));
        debug!(txid = %id, kind = %self.shared.kind, "begin");
        SharedTransaction::new(MapTransaction::new(id, Arc::clone(&self.shared)))
    }

    /// Returns an empty criteria builder for this kind.
    #[must_use]
    pub fn create_criteria_builder(&self) -> CriteriaBuilder<E::Field> {
        CriteriaBuilder::new()
    }

    /// Removes every committed entity matching `criteria`, immediately and
    /// outside any transaction. Returns the number removed.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn delete_matching(&self, criteria: &CriteriaBuilder<E::Field>) -> CoreResult<usize> {
        let removed = self
            .shared
            .backend
            .remove_where(&|_, value| criteria.matches(value))?;
        debug!(
            kind = %self.shared.kind,
            removed = removed.len(),
            criteria = %criteria,
            "storage-level delete"
        );
        if self.shared.config.emit_change_events && !removed.is_empty() {
            let keys = &self.shared.keys;
            self.shared.feed.publish(
                TransactionId::new(0),
                &self.shared.kind,
                removed
                    .iter()
                    .map(|key| (keys.key_to_string(key), ChangeType::Delete)),
            );
        }
        Ok(removed.len())
    }

    /// Counts committed entities matching `criteria`.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn count(&self, criteria: &CriteriaBuilder<E::Field>) -> CoreResult<usize> {
        Ok(self
            .shared
            .backend
            .count(&|_, value| criteria.matches(value))?)
    }

    /// Subscribes to committed changes.
    pub fn subscribe(&self) -> Receiver<ChangeEvent> {
        self.shared.feed.subscribe()
    }

    /// Returns committed changes after `cursor`, up to `limit`.
    pub fn poll_changes(&self, cursor: u64, limit: usize) -> Vec<ChangeEvent> {
        self.shared.feed.poll(cursor, limit)
    }
}

impl<E: MapEntity> fmt::Debug for MapStorage<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MapStorage")
            .field("kind", &self.shared.kind)
            .field("config", &self.shared.config)
            .finish_non_exhaustive()
    }
}
