//! Unit of work: the completion lifecycle participants enlist into.

use crate::error::{CoreError, CoreResult};
use crate::types::UnitOfWorkId;
use parking_lot::Mutex;
use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use tracing::{debug, warn};

/// Proof that completion is being driven by a [`UnitOfWork`].
///
/// Only this module can construct a token, so participants can only be
/// committed or rolled back by the unit of work they are enlisted in.
pub struct CompletionToken {
    _private: (),
}

/// Something that commits or rolls back together with a unit of work.
pub trait Participant: Send {
    /// Applies the participant's pending work.
    ///
    /// # Errors
    ///
    /// Any error aborts the unit of work; participants not yet committed are
    /// rolled back.
    fn commit(&mut self, token: &CompletionToken) -> CoreResult<()>;

    /// Discards the participant's pending work. Must be a no-op if the
    /// participant already completed.
    fn rollback(&mut self, token: &CompletionToken);
}

/// Completion phase a participant is enlisted in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Phase {
    /// Completes with the unit of work.
    #[default]
    Regular,
    /// Completes after every regular participant committed.
    AfterCompletion,
}

/// A unit of work (one request, one session).
///
/// Participants are committed in enlistment order, regular phase first. The
/// first failure rolls back every participant that has not committed yet. A
/// unit of work dropped without being completed rolls back.
pub struct UnitOfWork {
    id: UnitOfWorkId,
    regular: Mutex<Vec<Box<dyn Participant>>>,
    after_completion: Mutex<Vec<Box<dyn Participant>>>,
    rollback_only: AtomicBool,
    completed: bool,
}

impl UnitOfWork {
    /// Starts a new unit of work.
    #[must_use]
    pub fn new() -> Self {
        let id = UnitOfWorkId::new();
        debug!(uow = %id, "begin");
        Self {
            id,
            regular: Mutex::new(Vec::new()),
            after_completion: Mutex::new(Vec::new()),
            rollback_only: AtomicBool::new(false),
            completed: false,
        }
    }

    /// Returns the unit of work's ID.
    #[must_use]
    pub fn id(&self) -> UnitOfWorkId {
        self.id
    }

    /// Enlists a participant in the regular phase.
    pub fn enlist(&self, participant: impl Participant + 'static) {
        self.enlist_in(Phase::Regular, participant);
    }

    /// Enlists a participant in the after-completion phase.
    pub fn enlist_after_completion(&self, participant: impl Participant + 'static) {
        self.enlist_in(Phase::AfterCompletion, participant);
    }

    /// Enlists a participant in the given phase.
    pub fn enlist_in(&self, phase: Phase, participant: impl Participant + 'static) {
        let list = match phase {
            Phase::Regular => &self.regular,
            Phase::AfterCompletion => &self.after_completion,
        };
        list.lock().push(Box::new(participant));
    }

    /// Number of enlisted participants across both phases.
    #[must_use]
    pub fn participant_count(&self) -> usize {
        self.regular.lock().len() + self.after_completion.lock().len()
    }

    /// Marks the unit of work so that [`UnitOfWork::commit`] rolls back.
    pub fn set_rollback_only(&self) {
        self.rollback_only.store(true, Ordering::SeqCst);
    }

    /// Returns true if the unit of work can no longer commit.
    #[must_use]
    pub fn is_rollback_only(&self) -> bool {
        self.rollback_only.load(Ordering::SeqCst)
    }

    /// Commits every participant.
    ///
    /// Completion consumes the unit of work, so nothing can enlist into it
    /// while its participants are being committed:
    ///
    /// ```compile_fail
    /// use mapstore_core::UnitOfWork;
    ///
    /// let uow = UnitOfWork::new();
    /// let handle = &uow;
    /// uow.commit().unwrap();
    /// handle.participant_count();
    /// ```
    ///
    /// # Errors
    ///
    /// Returns [`CoreError::TransactionAborted`] if the unit of work was
    /// marked rollback-only, or the first participant error.
    pub fn commit(mut self) -> CoreResult<()> {
        self.completed = true;
        let token = CompletionToken { _private: () };
        let mut regular = std::mem::take(self.regular.get_mut());
        let mut after = std::mem::take(self.after_completion.get_mut());

        if self.is_rollback_only() {
            debug!(uow = %self.id, "rollback-only, rolling back");
            rollback_all(&mut regular, &token);
            rollback_all(&mut after, &token);
            return Err(CoreError::transaction_aborted(format!(
                "{} was marked rollback-only",
                self.id
            )));
        }

        commit_in_order(&mut regular, &token).inspect_err(|_| {
            rollback_all(&mut after, &token);
        })?;
        commit_in_order(&mut after, &token)?;

        debug!(uow = %self.id, participants = regular.len() + after.len(), "committed");
        Ok(())
    }

    /// Rolls back every participant.
    pub fn rollback(mut self) {
        self.completed = true;
        self.rollback_pending();
        debug!(uow = %self.id, "rolled back");
    }

    fn rollback_pending(&mut self) {
        let token = CompletionToken { _private: () };
        rollback_all(self.regular.get_mut(), &token);
        rollback_all(self.after_completion.get_mut(), &token);
        self.regular.get_mut().clear();
        self.after_completion.get_mut().clear();
    }
}

/// Commits participants in order. On failure, the failed participant and
/// every later one are rolled back.
fn commit_in_order(
    participants: &mut [Box<dyn Participant>],
    token: &CompletionToken,
) -> CoreResult<()> {
    for i in 0..participants.len() {
        if let Err(err) = participants[i].commit(token) {
            debug!(error = %err, "participant failed to commit");
            rollback_all(&mut participants[i..], token);
            return Err(err);
        }
    }
    Ok(())
}

fn rollback_all(participants: &mut [Box<dyn Participant>], token: &CompletionToken) {
    for participant in participants {
        participant.rollback(token);
    }
}

impl Default for UnitOfWork {
    fn default() -> Self {
        Self::new()
    }
}

impl Drop for UnitOfWork {
    fn drop(&mut self) {
        if !self.completed {
            let pending = self.participant_count();
            if pending > 0 {
                warn!(uow = %self.id, participants = pending, "unit of work dropped without completion, rolling back");
            }
            self.rollback_pending();
        }
    }
}

impl fmt::Debug for UnitOfWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("UnitOfWork")
            .field("id", &self.id)
            .field("participants", &self.participant_count())
            .field("rollback_only", &self.is_rollback_only())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[derive(Debug, Clone, PartialEq, Eq)]
    enum Outcome {
        Committed(&'static str),
        RolledBack(&'static str),
    }

    struct Recorder {
        name: &'static str,
        fail: bool,
        done: bool,
        log: Arc<Mutex<Vec<Outcome>>>,
    }

    impl Recorder {
        fn new(name: &'static str, log: &Arc<Mutex<Vec<Outcome>>>) -> Self {
            Self {
                name,
                fail: false,
                done: false,
                log: Arc::clone(log),
            }
        }

        fn failing(mut self) -> Self {
            self.fail = true;
            self
        }
    }

    impl Participant for Recorder {
        fn commit(&mut self, _token: &CompletionToken) -> CoreResult<()> {
            if self.fail {
                return Err(CoreError::invalid_operation(self.name));
            }
            self.done = true;
            self.log.lock().push(Outcome::Committed(self.name));
            Ok(())
        }

        fn rollback(&mut self, _token: &CompletionToken) {
            if !self.done {
                self.done = true;
                self.log.lock().push(Outcome::RolledBack(self.name));
            }
        }
    }

    fn log() -> Arc<Mutex<Vec<Outcome>>> {
        Arc::new(Mutex::new(Vec::new()))
    }

    #[test]
    fn commits_regular_then_after_completion() {
        let log = log();
        let uow = UnitOfWork::new();
        uow.enlist_after_completion(Recorder::new("late", &log));
        uow.enlist(Recorder::new("a", &log));
        uow.enlist(Recorder::new("b", &log));

        uow.commit().unwrap();

        assert_eq!(
            *log.lock(),
            vec![
                Outcome::Committed("a"),
                Outcome::Committed("b"),
                Outcome::Committed("late"),
            ]
        );
    }

    #[test]
    fn failure_rolls_back_the_rest() {
        let log = log();
        let uow = UnitOfWork::new();
        uow.enlist(Recorder::new("a", &log));
        uow.enlist(Recorder::new("b", &log).failing());
        uow.enlist(Recorder::new("c", &log));
        uow.enlist_after_completion(Recorder::new("late", &log));

        let err = uow.commit().unwrap_err();

        assert!(matches!(err, CoreError::InvalidOperation { .. }));
        assert_eq!(
            *log.lock(),
            vec![
                Outcome::Committed("a"),
                Outcome::RolledBack("b"),
                Outcome::RolledBack("c"),
                Outcome::RolledBack("late"),
            ]
        );
    }

    #[test]
    fn rollback_only_aborts() {
        let log = log();
        let uow = UnitOfWork::new();
        uow.enlist(Recorder::new("a", &log));
        uow.set_rollback_only();

        let err = uow.commit().unwrap_err();

        assert!(matches!(err, CoreError::TransactionAborted { .. }));
        assert_eq!(*log.lock(), vec![Outcome::RolledBack("a")]);
    }

    #[test]
    fn explicit_rollback() {
        let log = log();
        let uow = UnitOfWork::new();
        uow.enlist(Recorder::new("a", &log));
        uow.rollback();
        assert_eq!(*log.lock(), vec![Outcome::RolledBack("a")]);
    }

    #[test]
    fn drop_rolls_back() {
        let log = log();
        {
            let uow = UnitOfWork::new();
            uow.enlist(Recorder::new("a", &log));
            assert_eq!(uow.participant_count(), 1);
        }
        assert_eq!(*log.lock(), vec![Outcome::RolledBack("a")]);
    }

    #[test]
    fn ids_are_unique() {
        assert_ne!(UnitOfWork::new().id(), UnitOfWork::new().id());
    }
}
