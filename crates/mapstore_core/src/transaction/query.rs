//! Query results over a transaction's combined view.

use crate::criteria::CriteriaBuilder;
use crate::entity::MapEntity;
use crate::tracker::{ChangeTracker, Tracked};
use std::vec;

/// Iterator returned by [`super::MapTransaction::get_updated_not_removed`].
///
/// Matching backend rows are copied out when the query starts, so the
/// backend is not locked while iterating. Only their registration with the
/// change tracker is deferred until they are yielded. Pending creates are
/// matched against their working copy when the iterator reaches them.
pub struct QueryIter<'t, E: MapEntity> {
    tracker: &'t mut ChangeTracker<E::Key, E>,
    criteria: &'t CriteriaBuilder<E::Field>,
    rows: vec::IntoIter<(E::Key, E)>,
    created: vec::IntoIter<E::Key>,
}

impl<'t, E: MapEntity> QueryIter<'t, E> {
    pub(crate) fn new(
        tracker: &'t mut ChangeTracker<E::Key, E>,
        criteria: &'t CriteriaBuilder<E::Field>,
        rows: Vec<(E::Key, E)>,
        created: Vec<E::Key>,
    ) -> Self {
        Self {
            tracker,
            criteria,
            rows: rows.into_iter(),
            created: created.into_iter(),
        }
    }
}

impl<E: MapEntity> Iterator for QueryIter<'_, E> {
    type Item = Tracked<E>;

    fn next(&mut self) -> Option<Self::Item> {
        if let Some((key, entity)) = self.rows.next() {
            return Some(self.tracker.adopt(key, entity));
        }
        for key in self.created.by_ref() {
            if let Some(tracked) = self.tracker.get(&key) {
                if self.criteria.matches(&*tracked.read()) {
                    return Some(tracked.clone());
                }
            }
        }
        None
    }

    fn size_hint(&self) -> (usize, Option<usize>) {
        let rows = self.rows.len();
        (rows, Some(rows + self.created.len()))
    }
}
