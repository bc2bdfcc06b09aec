//! Resource servers and the per-unit-of-work store factory.

use crate::error::{ModelError, ModelResult};
use crate::resource::{Resource, ResourceStore};
use crate::view::{ModelKey, View};
use mapstore_core::{
    FieldValue, KeyConverter, MapEntity, MapStorage, SearchableField, SharedTransaction,
    Tracked, UnitOfWork, ValueKind,
};
use mapstore_storage::InMemoryBackend;
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use tracing::debug;

/// Prefix of identifiers that belong to a federated provider.
const FEDERATED_PREFIX: &str = "f:";

/// How a resource server enforces its policies.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PolicyEnforcementMode {
    /// Deny requests no policy grants.
    #[default]
    Enforcing,
    /// Allow requests no policy covers.
    Permissive,
    /// Do not evaluate policies.
    Disabled,
}

/// How permission decisions are combined.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DecisionStrategy {
    /// Every permission must grant.
    #[default]
    Unanimous,
    /// One granting permission suffices.
    Affirmative,
    /// Grants must outnumber denials.
    Consensus,
}

/// A client acting as a resource server. Its id is the client id.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ResourceServer<K> {
    /// Identity, shared with the client.
    pub id: K,
    /// Whether resources can be managed remotely.
    #[serde(default)]
    pub allow_remote_resource_management: bool,
    /// Enforcement mode.
    #[serde(default)]
    pub policy_enforcement_mode: PolicyEnforcementMode,
    /// Decision strategy.
    #[serde(default)]
    pub decision_strategy: DecisionStrategy,
}

impl<K> ResourceServer<K> {
    /// A server with default settings.
    pub fn new(id: K) -> Self {
        Self {
            id,
            allow_remote_resource_management: false,
            policy_enforcement_mode: PolicyEnforcementMode::default(),
            decision_strategy: DecisionStrategy::default(),
        }
    }
}

/// Searchable fields of [`ResourceServer`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceServerField {
    /// Id in its string form.
    Id,
}

impl SearchableField for ResourceServerField {
    fn name(&self) -> &'static str {
        "ID"
    }

    fn kind(&self) -> ValueKind {
        ValueKind::Str
    }
}

impl<K: ModelKey> MapEntity for ResourceServer<K> {
    type Key = K;
    type Field = ResourceServerField;

    fn id(&self) -> &K {
        &self.id
    }

    fn field_value(&self, field: ResourceServerField) -> FieldValue<'_> {
        match field {
            ResourceServerField::Id => FieldValue::from(self.id.to_string()),
        }
    }
}

/// A view of a resource server inside a store's transaction.
pub type ResourceServerView<K> = View<ResourceServer<K>>;

impl<K: ModelKey> View<ResourceServer<K>> {
    /// Whether resources can be managed remotely.
    pub fn is_allow_remote_resource_management(&self) -> bool {
        self.get(|s| s.allow_remote_resource_management)
    }

    /// Sets remote resource management.
    pub fn set_allow_remote_resource_management(&self, allow: bool) {
        self.set(|s| s.allow_remote_resource_management = allow);
    }

    /// Enforcement mode.
    pub fn policy_enforcement_mode(&self) -> PolicyEnforcementMode {
        self.get(|s| s.policy_enforcement_mode)
    }

    /// Sets the enforcement mode.
    pub fn set_policy_enforcement_mode(&self, mode: PolicyEnforcementMode) {
        self.set(|s| s.policy_enforcement_mode = mode);
    }

    /// Decision strategy.
    pub fn decision_strategy(&self) -> DecisionStrategy {
        self.get(|s| s.decision_strategy)
    }

    /// Sets the decision strategy.
    pub fn set_decision_strategy(&self, strategy: DecisionStrategy) {
        self.set(|s| s.decision_strategy = strategy);
    }
}

/// Resource server operations bound to one unit of work.
pub struct ResourceServerStore<K: ModelKey> {
    storage: Arc<MapStorage<ResourceServer<K>>>,
    tx: SharedTransaction<ResourceServer<K>>,
    resources: ResourceStore<K>,
}

impl<K: ModelKey> ResourceServerStore<K> {
    /// Opens a transaction on `storage` enlisted in `uow`. Deletes cascade
    /// through `resources`.
    pub fn new(
        storage: Arc<MapStorage<ResourceServer<K>>>,
        resources: ResourceStore<K>,
        uow: &UnitOfWork,
    ) -> Self {
        let tx = storage.create_transaction(uow);
        Self {
            storage,
            tx,
            resources,
        }
    }

    /// Creates the resource server of a client.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::NotSupported`] for federated client ids,
    /// [`ModelError::InvalidId`] if the id is not a valid key and
    /// [`ModelError::Duplicate`] if the client already has a server.
    pub fn create(&self, client_id: &str) -> ModelResult<ResourceServerView<K>> {
        if client_id.starts_with(FEDERATED_PREFIX) {
            return Err(ModelError::not_supported(format!(
                "resource server for federated client {client_id}"
            )));
        }
        let key = self.storage.key_converter().from_string(client_id)?;

        let mut tx = self.tx.lock();
        if tx.read(&key)?.is_some() {
            return Err(ModelError::duplicate(format!(
                "resource server for client {client_id} already exists"
            )));
        }
        let tracked = tx.create(key.clone(), ResourceServer::new(key))?;
        Ok(self.view(tracked))
    }

    /// Deletes a server and every resource it owns. Returns false if the
    /// server did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidId`] if `id` is not a valid key.
    pub fn delete(&self, id: &str) -> ModelResult<bool> {
        let key = self.storage.key_converter().from_string(id)?;
        let resources = self.resources.find_by_resource_server(id)?;
        for resource in &resources {
            self.resources.delete(&resource.id())?;
        }
        let existed = self.tx.lock().delete(&key)?;
        debug!(id, existed, resources = resources.len(), "deleted resource server");
        Ok(existed)
    }

    /// Finds a server by id. Ids that are not valid keys find nothing.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn find_by_id(&self, id: &str) -> ModelResult<Option<ResourceServerView<K>>> {
        let Some(key) = self.storage.key_converter().from_string_safe(id) else {
            return Ok(None);
        };
        let found = self.tx.lock().read(&key)?;
        Ok(found.map(|t| self.view(t)))
    }

    /// Finds the server of a client.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn find_by_client(&self, client_id: &str) -> ModelResult<Option<ResourceServerView<K>>> {
        self.find_by_id(client_id)
    }

    fn view(&self, tracked: Tracked<ResourceServer<K>>) -> ResourceServerView<K> {
        View::new(tracked, self.storage.key_converter_handle())
    }
}

/// The storages behind the authorization stores.
pub struct AuthorizationStorages<K: ModelKey> {
    /// Resource servers.
    pub resource_servers: Arc<MapStorage<ResourceServer<K>>>,
    /// Resources.
    pub resources: Arc<MapStorage<Resource<K>>>,
}

impl<K: ModelKey> AuthorizationStorages<K> {
    /// In-memory storages sharing one key converter.
    pub fn in_memory(keys: Arc<dyn KeyConverter<K>>) -> Self {
        Self {
            resource_servers: Arc::new(MapStorage::new(
                "resource_servers",
                Arc::new(InMemoryBackend::new()),
                Arc::clone(&keys),
            )),
            resources: Arc::new(MapStorage::new(
                "resources",
                Arc::new(InMemoryBackend::new()),
                keys,
            )),
        }
    }

    /// Opens the stores for one unit of work.
    pub fn store_factory(&self, uow: &UnitOfWork) -> StoreFactory<K> {
        let resources = ResourceStore::new(Arc::clone(&self.resources), uow);
        let resource_servers =
            ResourceServerStore::new(Arc::clone(&self.resource_servers), resources.clone(), uow);
        StoreFactory {
            resource_servers,
            resources,
        }
    }
}

/// The authorization stores of one unit of work.
pub struct StoreFactory<K: ModelKey> {
    resource_servers: ResourceServerStore<K>,
    resources: ResourceStore<K>,
}

impl<K: ModelKey> StoreFactory<K> {
    /// Resource server store.
    pub fn resource_servers(&self) -> &ResourceServerStore<K> {
        &self.resource_servers
    }

    /// Resource store.
    pub fn resources(&self) -> &ResourceStore<K> {
        &self.resources
    }
}
