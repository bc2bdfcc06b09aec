//! # mapstore testkit
//!
//! Test utilities for mapstore.
//!
//! This crate provides:
//! - A sample entity kind and storage fixtures
//! - A backend with failure injection and a manual clock
//! - Property-based test generators using proptest
//!
//! ## Usage
//!
//! ```rust,ignore
//! use mapstore_testkit::prelude::*;
//!
//! #[test]
//! fn test_with_storage() {
//!     with_storage(|storage| {
//!         commit_with(storage, |tx| {
//!             tx.create("b1".into(), Book::new("b1", "Dune", 1965))?;
//!             Ok(())
//!         });
//!     });
//! }
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

pub mod fixtures;
pub mod generators;

/// Prelude module for convenient imports
pub mod prelude {
    pub use crate::fixtures::*;
    pub use crate::generators::*;
}

pub use fixtures::*;
pub use generators::*;
