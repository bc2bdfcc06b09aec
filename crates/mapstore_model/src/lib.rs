//! # mapstore model
//!
//! Domain stores built on the mapstore engine: authorization resources and
//! resource servers, root authentication sessions, and groups.
//!
//! Every store is opened for one [`UnitOfWork`](mapstore_core::UnitOfWork)
//! and works through a transaction enlisted in it. Stores hand out views
//! over the transaction's working copies; changes made through a view are
//! written back when the unit of work commits.
//!
//! ```rust,ignore
//! let storages = AuthorizationStorages::in_memory(Arc::new(UuidKeyConverter));
//! let uow = UnitOfWork::new();
//! let stores = storages.store_factory(&uow);
//! let server = stores.resource_servers().create(&client_id)?;
//! let photos = stores.resources().create(None, "photos", &server.id(), "alice")?;
//! photos.update_scopes(["view", "edit"]);
//! uow.commit()?;
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod auth_session;
mod clock;
mod error;
mod group;
mod page;
mod resource;
mod resource_server;
mod view;

pub use auth_session::{
    AuthSessionConfig, AuthenticationSession, RootAuthSession, RootAuthSessionField,
    RootAuthSessionStore, RootAuthSessionView,
};
pub use clock::{Clock, SystemClock};
pub use error::{ModelError, ModelResult};
pub use group::{Group, GroupField, GroupStore, GroupStoreFactory, GroupView, RoleRemovedEvent};
pub use page::Page;
pub use resource::{FilterOption, Resource, ResourceField, ResourceStore, ResourceView};
pub use resource_server::{
    AuthorizationStorages, DecisionStrategy, PolicyEnforcementMode, ResourceServer,
    ResourceServerField, ResourceServerStore, ResourceServerView, StoreFactory,
};
pub use view::{ModelKey, View};
