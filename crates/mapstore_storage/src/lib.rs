//! # mapstore Storage
//!
//! Backend contract and the reference in-memory backend for mapstore.
//!
//! This crate is the lowest layer of the workspace. A backend owns the
//! authoritative committed state of one entity kind and knows nothing about
//! transactions, working copies or criteria: it stores values by key, answers
//! filtered scans, and applies a commit batch atomically.
//!
//! ## Design Principles
//!
//! - Backends hand out owned copies, never references into their state
//! - A [`WriteBatch`] is applied all-or-nothing
//! - Backends must be `Send + Sync`; they are shared by every transaction of
//!   an entity kind
//! - Durability is a property of the backend, not of the engine above it
//!
//! ## Example
//!
//! ```rust
//! use mapstore_storage::{InMemoryBackend, MapBackend, WriteBatch};
//!
//! let backend: InMemoryBackend<u64, String> = InMemoryBackend::new();
//! let mut batch = WriteBatch::new();
//! batch.put(1, "one".to_string());
//! backend.apply(batch).unwrap();
//! assert_eq!(backend.read(&1).unwrap(), Some("one".to_string()));
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod backend;
mod error;
mod memory;

pub use backend::{Applied, AppliedKind, MapBackend, WriteBatch, WriteOp};
pub use error::{StorageError, StorageResult};
pub use memory::InMemoryBackend;
