//! # mapstore core
//!
//! Transactional entity engine for mapstore.
//!
//! This crate provides:
//! - Key conversion between engine keys and external string ids
//! - Criteria builders over typed searchable fields
//! - Change tracking with private working copies
//! - Map transactions enlisted in a unit of work
//! - Per-kind storages with a commit change feed
//!
//! ```rust,ignore
//! let storage = MapStorage::new("groups", backend, Arc::new(UuidKeyConverter));
//!
//! let uow = UnitOfWork::new();
//! let tx = storage.create_transaction(&uow);
//! let key = storage.key_converter().yield_new_unique_key()?;
//! tx.lock().create(key, Group::new(key, "admins"))?;
//! uow.commit()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod change_feed;
mod config;
pub mod criteria;
mod entity;
mod error;
mod events;
mod key;
mod storage;
mod tracker;
mod transaction;
mod types;

pub use change_feed::{ChangeEvent, ChangeFeed, ChangeType};
pub use config::StorageConfig;
pub use criteria::{CriteriaBuilder, Operator, ValueKind};
pub use entity::{FieldValue, MapEntity, SearchableField};
pub use error::{CoreError, CoreResult};
pub use events::{EventBus, Subscription};
pub use key::{KeyConverter, MapKey, SequenceKeyConverter, StringKeyConverter, UuidKeyConverter};
pub use storage::MapStorage;
pub use tracker::{ChangeTracker, Tracked};
pub use transaction::{
    CompletionToken, MapTransaction, Participant, Phase, QueryIter, SharedTransaction, UnitOfWork,
};
pub use types::{TransactionId, TransactionState, UnitOfWorkId};

/// Re-exported backend layer.
pub use mapstore_storage as backend;

/// Version of this crate.
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
