//! Transactions shared between their owner and a unit of work.

use super::map::MapTransaction;
use super::unit_of_work::{CompletionToken, Participant, Phase, UnitOfWork};
use crate::entity::MapEntity;
use crate::error::{CoreError, CoreResult};
use crate::types::TransactionId;
use parking_lot::{Mutex, MutexGuard};
use std::fmt;
use std::sync::Arc;

/// A [`MapTransaction`] enlisted in a [`UnitOfWork`].
///
/// The domain store holds one handle and the unit of work another. Lock the
/// transaction for each operation; do not hold the guard while completing
/// the unit of work.
pub struct SharedTransaction<E: MapEntity> {
    id: TransactionId,
    inner: Arc<Mutex<MapTransaction<E>>>,
}

impl<E: MapEntity> SharedTransaction<E> {
    pub(crate) fn new(tx: MapTransaction<E>) -> Self {
        Self {
            id: tx.id(),
            inner: Arc::new(Mutex::new(tx)),
        }
    }

    /// Returns the transaction ID.
    #[must_use]
    pub fn id(&self) -> TransactionId {
        self.id
    }

    /// Locks the transaction for use.
    pub fn lock(&self) -> MutexGuard<'_, MapTransaction<E>> {
        self.inner.lock()
    }

    /// Enlists the transaction in `uow`.
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::InvalidOperation`] if the transaction is already
    /// enlisted in a unit of work.
    pub fn enlist(&self, uow: &UnitOfWork, phase: Phase) -> CoreResult<()> {
        if let Some(existing) = self.inner.lock().unit_of_work() {
            return Err(CoreError::invalid_operation(format!(
                "{} is already enlisted in {existing}",
                self.id
            )));
        }
        self.attach(uow, phase);
        Ok(())
    }

    pub(crate) fn attach(&self, uow: &UnitOfWork, phase: Phase) {
        self.inner.lock().set_unit_of_work(uow.id());
        uow.enlist_in(
            phase,
            Enlisted {
                inner: Arc::clone(&self.inner),
            },
        );
    }
}

impl<E: MapEntity> Clone for SharedTransaction<E> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            inner: Arc::clone(&self.inner),
        }
    }
}

impl<E: MapEntity> fmt::Debug for SharedTransaction<E> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_tuple("SharedTransaction").field(&self.id).finish()
    }
}

/// The unit of work's handle.
struct Enlisted<E: MapEntity> {
    inner: Arc<Mutex<MapTransaction<E>>>,
}

impl<E: MapEntity> Participant for Enlisted<E> {
    fn commit(&mut self, token: &CompletionToken) -> CoreResult<()> {
        self.inner.lock().commit(token)
    }

    fn rollback(&mut self, token: &CompletionToken) {
        self.inner.lock().rollback(token);
    }
}
