//! Transactions and their completion lifecycle.
//!
//! A [`MapTransaction`] buffers every change to one entity kind:
//! - **Isolation**: callers work on private working copies, never on
//!   backend values
//! - **Read-your-writes**: reads and queries see the backend overlaid with
//!   pending creates, updates and deletes
//! - **Atomicity**: commit applies one batch, or nothing
//!
//! Transactions complete only through the [`UnitOfWork`] they are enlisted
//! in: `Active -> Committed | RolledBack`, exactly once.

mod map;
mod query;
mod shared;
mod unit_of_work;

pub use map::MapTransaction;
pub use query::QueryIter;
pub use shared::SharedTransaction;
pub use unit_of_work::{CompletionToken, Participant, Phase, UnitOfWork};
