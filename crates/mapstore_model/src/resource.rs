//! Authorization resources.

use crate::error::{ModelError, ModelResult};
use crate::page::Page;
use crate::view::{ModelKey, View};
use mapstore_core::{
    CriteriaBuilder, FieldValue, MapEntity, MapStorage, Operator, SearchableField,
    SharedTransaction, Tracked, UnitOfWork, ValueKind,
};
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tracing::trace;

/// A protected resource owned by a resource server.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Resource<K> {
    /// Identity.
    pub id: K,
    /// Name, unique per server and owner.
    pub name: String,
    /// Human readable name.
    #[serde(default)]
    pub display_name: Option<String>,
    /// Id of the owning resource server.
    pub resource_server_id: String,
    /// Owner id (a user, or the resource server itself).
    pub owner: String,
    /// Resource type.
    #[serde(default, rename = "type")]
    pub resource_type: Option<String>,
    /// URIs the resource protects.
    #[serde(default)]
    pub uris: BTreeSet<String>,
    /// Ids of the scopes the resource supports.
    #[serde(default)]
    pub scope_ids: BTreeSet<String>,
    /// Icon location.
    #[serde(default)]
    pub icon_uri: Option<String>,
    /// Whether the owner manages access.
    #[serde(default)]
    pub owner_managed_access: bool,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

impl<K> Resource<K> {
    /// A resource with only the required attributes set.
    pub fn new(
        id: K,
        name: impl Into<String>,
        resource_server_id: impl Into<String>,
        owner: impl Into<String>,
    ) -> Self {
        Self {
            id,
            name: name.into(),
            display_name: None,
            resource_server_id: resource_server_id.into(),
            owner: owner.into(),
            resource_type: None,
            uris: BTreeSet::new(),
            scope_ids: BTreeSet::new(),
            icon_uri: None,
            owner_managed_access: false,
            attributes: BTreeMap::new(),
        }
    }
}

/// Searchable fields of [`Resource`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ResourceField {
    /// Id in its string form.
    Id,
    /// Name.
    Name,
    /// Owning server id.
    ResourceServerId,
    /// Owner id.
    Owner,
    /// Protected URIs.
    Uri,
    /// Supported scope ids.
    ScopeId,
    /// Resource type.
    Type,
    /// Owner managed access flag.
    OwnerManagedAccess,
}

impl SearchableField for ResourceField {
    fn name(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Name => "NAME",
            Self::ResourceServerId => "RESOURCE_SERVER_ID",
            Self::Owner => "OWNER",
            Self::Uri => "URI",
            Self::ScopeId => "SCOPE_ID",
            Self::Type => "TYPE",
            Self::OwnerManagedAccess => "OWNER_MANAGED_ACCESS",
        }
    }

    fn kind(&self) -> ValueKind {
        match self {
            Self::Uri | Self::ScopeId => ValueKind::StrSet,
            Self::OwnerManagedAccess => ValueKind::Bool,
            _ => ValueKind::Str,
        }
    }
}

impl<K: ModelKey> MapEntity for Resource<K> {
    type Key = K;
    type Field = ResourceField;

    fn id(&self) -> &K {
        &self.id
    }

    fn field_value(&self, field: ResourceField) -> FieldValue<'_> {
        match field {
            ResourceField::Id => FieldValue::from(self.id.to_string()),
            ResourceField::Name => FieldValue::str(&self.name),
            ResourceField::ResourceServerId => FieldValue::str(&self.resource_server_id),
            ResourceField::Owner => FieldValue::str(&self.owner),
            ResourceField::Uri => FieldValue::many(&self.uris),
            ResourceField::ScopeId => FieldValue::many(&self.scope_ids),
            ResourceField::Type => FieldValue::opt_str(self.resource_type.as_deref()),
            ResourceField::OwnerManagedAccess => FieldValue::Bool(self.owner_managed_access),
        }
    }
}

/// A view of a resource inside a store's transaction.
pub type ResourceView<K> = View<Resource<K>>;

impl<K: ModelKey> View<Resource<K>> {
    /// Name.
    pub fn name(&self) -> String {
        self.get(|r| r.name.clone())
    }

    /// Renames the resource.
    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.set(|r| r.name = name);
    }

    /// Display name.
    pub fn display_name(&self) -> Option<String> {
        self.get(|r| r.display_name.clone())
    }

    /// Sets the display name.
    pub fn set_display_name(&self, display_name: Option<String>) {
        self.set(|r| r.display_name = display_name);
    }

    /// Owning server id.
    pub fn resource_server_id(&self) -> String {
        self.get(|r| r.resource_server_id.clone())
    }

    /// Owner id.
    pub fn owner(&self) -> String {
        self.get(|r| r.owner.clone())
    }

    /// Resource type.
    pub fn resource_type(&self) -> Option<String> {
        self.get(|r| r.resource_type.clone())
    }

    /// Sets the resource type.
    pub fn set_resource_type(&self, resource_type: Option<String>) {
        self.set(|r| r.resource_type = resource_type);
    }

    /// Protected URIs.
    pub fn uris(&self) -> BTreeSet<String> {
        self.get(|r| r.uris.clone())
    }

    /// Replaces the protected URIs.
    pub fn update_uris<I, S>(&self, uris: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let uris = uris.into_iter().map(Into::into).collect();
        self.set(|r| r.uris = uris);
    }

    /// Supported scope ids.
    pub fn scope_ids(&self) -> BTreeSet<String> {
        self.get(|r| r.scope_ids.clone())
    }

    /// Replaces the supported scope ids.
    pub fn update_scopes<I, S>(&self, scope_ids: I)
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let scope_ids = scope_ids.into_iter().map(Into::into).collect();
        self.set(|r| r.scope_ids = scope_ids);
    }

    /// Icon location.
    pub fn icon_uri(&self) -> Option<String> {
        self.get(|r| r.icon_uri.clone())
    }

    /// Sets the icon location.
    pub fn set_icon_uri(&self, icon_uri: Option<String>) {
        self.set(|r| r.icon_uri = icon_uri);
    }

    /// Owner managed access flag.
    pub fn is_owner_managed_access(&self) -> bool {
        self.get(|r| r.owner_managed_access)
    }

    /// Sets the owner managed access flag.
    pub fn set_owner_managed_access(&self, enabled: bool) {
        self.set(|r| r.owner_managed_access = enabled);
    }

    /// All attributes.
    pub fn attributes(&self) -> BTreeMap<String, Vec<String>> {
        self.get(|r| r.attributes.clone())
    }

    /// First value of an attribute.
    pub fn single_attribute(&self, name: &str) -> Option<String> {
        self.get(|r| r.attributes.get(name).and_then(|v| v.first().cloned()))
    }

    /// Replaces an attribute's values.
    pub fn set_attribute(&self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        self.set(|r| {
            r.attributes.insert(name, values);
        });
    }

    /// Removes an attribute.
    pub fn remove_attribute(&self, name: &str) {
        self.set(|r| {
            r.attributes.remove(name);
        });
    }
}

/// Filters accepted by [`ResourceStore::find_by_resource_server_filtered`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub enum FilterOption {
    /// Id is one of the values.
    Id,
    /// Supports one of the scope ids.
    ScopeId,
    /// Owner is one of the values.
    Owner,
    /// Protects one of the URIs.
    Uri,
    /// Protects at least one URI. Values are ignored.
    UriNotNull,
    /// Owner managed access equals the first value (`"true"` or not).
    OwnerManagedAccess,
    /// Name equals the first value.
    ExactName,
    /// Name contains the first value, ignoring case.
    Name,
}

/// Resource operations bound to one unit of work.
pub struct ResourceStore<K: ModelKey> {
    storage: Arc<MapStorage<Resource<K>>>,
    tx: SharedTransaction<Resource<K>>,
}

impl<K: ModelKey> ResourceStore<K> {
    /// Opens a transaction on `storage` enlisted in `uow`.
    pub fn new(storage: Arc<MapStorage<Resource<K>>>, uow: &UnitOfWork) -> Self {
        let tx = storage.create_transaction(uow);
        Self { storage, tx }
    }

    /// Creates a resource.
    ///
    /// `id` is generated when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Duplicate`] if the server already has a
    /// resource with this name and owner, or the id is taken, and
    /// [`ModelError::InvalidId`] if `id` is not a valid key.
    pub fn create(
        &self,
        id: Option<&str>,
        name: &str,
        resource_server_id: &str,
        owner: &str,
    ) -> ModelResult<ResourceView<K>> {
        let keys = self.storage.key_converter();
        let clash = self
            .for_server(Some(resource_server_id))?
            .compare(ResourceField::Name, Operator::Eq, name)?
            .compare(ResourceField::Owner, Operator::Eq, owner)?;

        let mut tx = self.tx.lock();
        if tx.get_count(&clash)? > 0 {
            return Err(ModelError::duplicate(format!(
                "resource {name} already exists for server {resource_server_id} and owner {owner}"
            )));
        }

        let key = match id {
            Some(id) => keys.from_string(id)?,
            None => keys.yield_new_unique_key()?,
        };
        let entity = Resource::new(key.clone(), name, resource_server_id, owner);
        let tracked = tx.create(key, entity)?;
        trace!(name, resource_server_id, owner, "created resource");
        Ok(self.view(tracked))
    }

    /// Deletes a resource. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidId`] if `id` is not a valid key.
    pub fn delete(&self, id: &str) -> ModelResult<bool> {
        let key = self.storage.key_converter().from_string(id)?;
        Ok(self.tx.lock().delete(&key)?)
    }

    /// Finds a resource by id, optionally restricted to one server.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn find_by_id(
        &self,
        id: &str,
        resource_server_id: Option<&str>,
    ) -> ModelResult<Option<ResourceView<K>>> {
        let criteria = self
            .for_server(resource_server_id)?
            .compare(ResourceField::Id, Operator::Eq, id)?;
        Ok(self.query(&criteria)?.into_iter().next())
    }

    /// Resources of an owner, ordered by id.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn find_by_owner(
        &self,
        owner: &str,
        resource_server_id: Option<&str>,
        page: Page,
    ) -> ModelResult<Vec<ResourceView<K>>> {
        let criteria = self
            .for_server(resource_server_id)?
            .compare(ResourceField::Owner, Operator::Eq, owner)?;
        let mut found = self.query_tracked(&criteria)?;
        found.sort_by_cached_key(|r| r.read().id.clone());
        Ok(page.apply(found.into_iter()).map(|t| self.view(t)).collect())
    }

    /// Resources protecting `uri`.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn find_by_uri(
        &self,
        uri: &str,
        resource_server_id: Option<&str>,
    ) -> ModelResult<Vec<ResourceView<K>>> {
        let criteria = self
            .for_server(resource_server_id)?
            .compare(ResourceField::Uri, Operator::Eq, uri)?;
        self.query(&criteria)
    }

    /// Every resource of a server.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn find_by_resource_server(
        &self,
        resource_server_id: &str,
    ) -> ModelResult<Vec<ResourceView<K>>> {
        self.query(&self.for_server(Some(resource_server_id))?)
    }

    /// Resources of a server matching every filter, ordered by name.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidArgument`] if a filter that needs a
    /// value has none.
    pub fn find_by_resource_server_filtered(
        &self,
        filters: &BTreeMap<FilterOption, Vec<String>>,
        resource_server_id: Option<&str>,
        page: Page,
    ) -> ModelResult<Vec<ResourceView<K>>> {
        let mut criteria = self.for_server(resource_server_id)?;
        for (option, values) in filters {
            criteria = filter_criteria(criteria, *option, values)?;
        }
        let mut found = self.query_tracked(&criteria)?;
        found.sort_by_cached_key(|r| r.read().name.clone());
        Ok(page.apply(found.into_iter()).map(|t| self.view(t)).collect())
    }

    /// Resources supporting any of `scope_ids`.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn find_by_scope(
        &self,
        scope_ids: &[String],
        resource_server_id: Option<&str>,
    ) -> ModelResult<Vec<ResourceView<K>>> {
        let criteria = self.for_server(resource_server_id)?.compare_any(
            ResourceField::ScopeId,
            Operator::In,
            scope_ids,
        )?;
        self.query(&criteria)
    }

    /// The resource of a server named `name` owned by the server itself.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn find_by_name(
        &self,
        name: &str,
        resource_server_id: &str,
    ) -> ModelResult<Option<ResourceView<K>>> {
        self.find_by_name_and_owner(name, resource_server_id, resource_server_id)
    }

    /// The resource of a server with this name and owner.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn find_by_name_and_owner(
        &self,
        name: &str,
        owner: &str,
        resource_server_id: &str,
    ) -> ModelResult<Option<ResourceView<K>>> {
        let criteria = self
            .for_server(Some(resource_server_id))?
            .compare(ResourceField::Owner, Operator::Eq, owner)?
            .compare(ResourceField::Name, Operator::Eq, name)?;
        Ok(self.query(&criteria)?.into_iter().next())
    }

    /// Resources of a type, optionally restricted to one owner.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn find_by_type(
        &self,
        resource_type: &str,
        owner: Option<&str>,
        resource_server_id: Option<&str>,
    ) -> ModelResult<Vec<ResourceView<K>>> {
        let mut criteria = self
            .for_server(resource_server_id)?
            .compare(ResourceField::Type, Operator::Eq, resource_type)?;
        if let Some(owner) = owner {
            criteria = criteria.compare(ResourceField::Owner, Operator::Eq, owner)?;
        }
        self.query(&criteria)
    }

    /// Resources of a type not owned by the server itself.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn find_by_type_instance(
        &self,
        resource_type: &str,
        resource_server_id: &str,
    ) -> ModelResult<Vec<ResourceView<K>>> {
        let criteria = self
            .for_server(Some(resource_server_id))?
            .compare(ResourceField::Owner, Operator::Ne, resource_server_id)?
            .compare(ResourceField::Type, Operator::Eq, resource_type)?;
        self.query(&criteria)
    }

    fn for_server(
        &self,
        resource_server_id: Option<&str>,
    ) -> ModelResult<CriteriaBuilder<ResourceField>> {
        let criteria = self.storage.create_criteria_builder();
        Ok(match resource_server_id {
            Some(id) => criteria.compare(ResourceField::ResourceServerId, Operator::Eq, id)?,
            None => criteria,
        })
    }

    fn query_tracked(
        &self,
        criteria: &CriteriaBuilder<ResourceField>,
    ) -> ModelResult<Vec<Tracked<Resource<K>>>> {
        let mut tx = self.tx.lock();
        let found = tx.get_updated_not_removed(criteria)?.collect();
        Ok(found)
    }

    fn query(&self, criteria: &CriteriaBuilder<ResourceField>) -> ModelResult<Vec<ResourceView<K>>> {
        Ok(self
            .query_tracked(criteria)?
            .into_iter()
            .map(|t| self.view(t))
            .collect())
    }

    fn view(&self, tracked: Tracked<Resource<K>>) -> ResourceView<K> {
        View::new(tracked, self.storage.key_converter_handle())
    }
}

impl<K: ModelKey> Clone for ResourceStore<K> {
    fn clone(&self) -> Self {
        Self {
            storage: Arc::clone(&self.storage),
            tx: self.tx.clone(),
        }
    }
}

fn filter_criteria(
    criteria: CriteriaBuilder<ResourceField>,
    option: FilterOption,
    values: &[String],
) -> ModelResult<CriteriaBuilder<ResourceField>> {
    let first = || {
        values
            .first()
            .ok_or_else(|| ModelError::invalid_argument(format!("filter {option:?} needs a value")))
    };
    Ok(match option {
        FilterOption::Id => criteria.compare_any(ResourceField::Id, Operator::In, values)?,
        FilterOption::ScopeId => criteria.compare_any(ResourceField::ScopeId, Operator::In, values)?,
        FilterOption::Owner => criteria.compare_any(ResourceField::Owner, Operator::In, values)?,
        FilterOption::Uri => criteria.compare_any(ResourceField::Uri, Operator::In, values)?,
        FilterOption::UriNotNull => criteria.exists(ResourceField::Uri)?,
        FilterOption::OwnerManagedAccess => criteria.compare(
            ResourceField::OwnerManagedAccess,
            Operator::Eq,
            first()?.eq_ignore_ascii_case("true"),
        )?,
        FilterOption::ExactName => criteria.compare(ResourceField::Name, Operator::Eq, first()?)?,
        FilterOption::Name => {
            criteria.compare(ResourceField::Name, Operator::ILike, format!("%{}%", first()?))?
        }
    })
}
