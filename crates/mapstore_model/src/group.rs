//! Groups and the role-removal cascade.

use crate::error::{ModelError, ModelResult};
use crate::page::Page;
use crate::view::{ModelKey, View};
use mapstore_core::{
    CriteriaBuilder, EventBus, FieldValue, MapEntity, MapStorage, Operator, SearchableField,
    SharedTransaction, Subscription, Tracked, UnitOfWork, UnitOfWorkId, ValueKind,
};
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::sync::Arc;
use tracing::debug;

/// A group of users within a realm.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Group<K> {
    /// Identity.
    pub id: K,
    /// Realm the group belongs to.
    pub realm_id: String,
    /// Name, unique among siblings.
    pub name: String,
    /// Id of the parent group; top-level groups have none.
    #[serde(default)]
    pub parent_id: Option<String>,
    /// Ids of the roles granted to members.
    #[serde(default)]
    pub granted_roles: BTreeSet<String>,
    /// Free-form attributes.
    #[serde(default)]
    pub attributes: BTreeMap<String, Vec<String>>,
}

/// Searchable fields of [`Group`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum GroupField {
    /// Id in its string form.
    Id,
    /// Realm id.
    RealmId,
    /// Name.
    Name,
    /// Parent group id.
    ParentId,
    /// Granted role ids.
    AssignedRole,
}

impl SearchableField for GroupField {
    fn name(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::RealmId => "REALM_ID",
            Self::Name => "NAME",
            Self::ParentId => "PARENT_ID",
            Self::AssignedRole => "ASSIGNED_ROLE",
        }
    }

    fn kind(&self) -> ValueKind {
        match self {
            Self::AssignedRole => ValueKind::StrSet,
            _ => ValueKind::Str,
        }
    }
}

impl<K: ModelKey> MapEntity for Group<K> {
    type Key = K;
    type Field = GroupField;

    fn id(&self) -> &K {
        &self.id
    }

    fn field_value(&self, field: GroupField) -> FieldValue<'_> {
        match field {
            GroupField::Id => FieldValue::from(self.id.to_string()),
            GroupField::RealmId => FieldValue::str(&self.realm_id),
            GroupField::Name => FieldValue::str(&self.name),
            GroupField::ParentId => FieldValue::opt_str(self.parent_id.as_deref()),
            GroupField::AssignedRole => FieldValue::many(&self.granted_roles),
        }
    }
}

/// A view of a group inside a store's transaction.
pub type GroupView<K> = View<Group<K>>;

impl<K: ModelKey> View<Group<K>> {
    /// Realm id.
    pub fn realm_id(&self) -> String {
        self.get(|g| g.realm_id.clone())
    }

    /// Name.
    pub fn name(&self) -> String {
        self.get(|g| g.name.clone())
    }

    /// Renames the group.
    pub fn set_name(&self, name: impl Into<String>) {
        let name = name.into();
        self.set(|g| g.name = name);
    }

    /// Parent group id.
    pub fn parent_id(&self) -> Option<String> {
        self.get(|g| g.parent_id.clone())
    }

    /// Granted role ids.
    pub fn role_mappings(&self) -> BTreeSet<String> {
        self.get(|g| g.granted_roles.clone())
    }

    /// Returns true if members are granted `role_id`.
    pub fn has_role(&self, role_id: &str) -> bool {
        self.get(|g| g.granted_roles.contains(role_id))
    }

    /// Grants a role to members.
    pub fn grant_role(&self, role_id: impl Into<String>) {
        let role_id = role_id.into();
        self.set(|g| {
            g.granted_roles.insert(role_id);
        });
    }

    /// Revokes a role. Returns false if it was not granted.
    pub fn delete_role_mapping(&self, role_id: &str) -> bool {
        self.set(|g| g.granted_roles.remove(role_id))
    }

    /// All attributes.
    pub fn attributes(&self) -> BTreeMap<String, Vec<String>> {
        self.get(|g| g.attributes.clone())
    }

    /// Replaces an attribute's values.
    pub fn set_attribute(&self, name: impl Into<String>, values: Vec<String>) {
        let name = name.into();
        self.set(|g| {
            g.attributes.insert(name, values);
        });
    }
}

/// A role was removed from a realm or one of its clients.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RoleRemovedEvent {
    /// Realm the role belonged to.
    pub realm_id: String,
    /// Id of the removed role.
    pub role_id: String,
}

/// Group operations bound to one unit of work.
pub struct GroupStore<K: ModelKey> {
    storage: Arc<MapStorage<Group<K>>>,
    tx: SharedTransaction<Group<K>>,
}

impl<K: ModelKey> GroupStore<K> {
    /// Opens a transaction on `storage` enlisted in `uow`.
    pub fn new(storage: Arc<MapStorage<Group<K>>>, uow: &UnitOfWork) -> Self {
        let tx = storage.create_transaction(uow);
        Self { storage, tx }
    }

    /// Creates a group. `id` is generated when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::Duplicate`] if the id is taken or a sibling
    /// has the same name, and [`ModelError::InvalidId`] if `id` is not a
    /// valid key.
    pub fn create(
        &self,
        realm_id: &str,
        id: Option<&str>,
        name: &str,
        parent_id: Option<&str>,
    ) -> ModelResult<GroupView<K>> {
        let keys = self.storage.key_converter();
        let key = match id {
            Some(id) => keys.from_string(id)?,
            None => keys.yield_new_unique_key()?,
        };
        let siblings = self.siblings(realm_id, parent_id)?;
        let same_name = siblings.compare(GroupField::Name, Operator::Eq, name)?;

        let mut tx = self.tx.lock();
        if tx.read(&key)?.is_some() {
            return Err(ModelError::duplicate(format!(
                "group {} already exists",
                keys.key_to_string(&key)
            )));
        }
        if tx.get_count(&same_name)? > 0 {
            return Err(ModelError::duplicate(format!(
                "sibling group named {name} already exists"
            )));
        }
        let entity = Group {
            id: key.clone(),
            realm_id: realm_id.to_owned(),
            name: name.to_owned(),
            parent_id: parent_id.map(str::to_owned),
            granted_roles: BTreeSet::new(),
            attributes: BTreeMap::new(),
        };
        let tracked = tx.create(key, entity)?;
        Ok(self.view(tracked))
    }

    /// Finds a group of `realm_id`. Ids that are not valid keys, and groups
    /// of other realms, find nothing.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn get(&self, realm_id: &str, id: &str) -> ModelResult<Option<GroupView<K>>> {
        let Some(key) = self.storage.key_converter().from_string_safe(id) else {
            return Ok(None);
        };
        let found = self.tx.lock().read(&key)?;
        Ok(found
            .filter(|g| g.read().realm_id == realm_id)
            .map(|t| self.view(t)))
    }

    /// Groups of a realm whose name contains `search`, ignoring case,
    /// ordered by name.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn search_by_name(
        &self,
        realm_id: &str,
        search: &str,
        page: Page,
    ) -> ModelResult<Vec<GroupView<K>>> {
        let criteria = self
            .realm_criteria(realm_id)?
            .compare(GroupField::Name, Operator::ILike, format!("%{search}%"))?;
        let mut found = self.query_tracked(&criteria)?;
        found.sort_by_cached_key(|g| g.read().name.clone());
        Ok(page.apply(found.into_iter()).map(|t| self.view(t)).collect())
    }

    /// Top-level groups of a realm, ordered by name.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn top_level(&self, realm_id: &str, page: Page) -> ModelResult<Vec<GroupView<K>>> {
        let mut found = self.query_tracked(&self.siblings(realm_id, None)?)?;
        found.sort_by_cached_key(|g| g.read().name.clone());
        Ok(page.apply(found.into_iter()).map(|t| self.view(t)).collect())
    }

    /// Direct subgroups of a group, ordered by name.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn subgroups(&self, realm_id: &str, parent_id: &str) -> ModelResult<Vec<GroupView<K>>> {
        let mut found = self.query_tracked(&self.siblings(realm_id, Some(parent_id))?)?;
        found.sort_by_cached_key(|g| g.read().name.clone());
        Ok(found.into_iter().map(|t| self.view(t)).collect())
    }

    /// Number of groups in a realm.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn count(&self, realm_id: &str) -> ModelResult<usize> {
        let criteria = self.realm_criteria(realm_id)?;
        Ok(self.tx.lock().get_count(&criteria)?)
    }

    /// Removes a group and, recursively, its subgroups. Returns false if
    /// the group does not exist in `realm_id`.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn remove(&self, realm_id: &str, id: &str) -> ModelResult<bool> {
        let Some(group) = self.get(realm_id, id)? else {
            return Ok(false);
        };
        for child in self.subgroups(realm_id, id)? {
            self.remove(realm_id, &child.id())?;
        }
        let key = group.get(|g| g.id.clone());
        Ok(self.tx.lock().delete(&key)?)
    }

    /// Revokes `role_id` from every group of `realm_id` that grants it.
    /// Returns how many groups changed.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn pre_remove_role(&self, realm_id: &str, role_id: &str) -> ModelResult<usize> {
        let criteria = self
            .realm_criteria(realm_id)?
            .compare(GroupField::AssignedRole, Operator::Eq, role_id)?;
        let groups = self.query_tracked(&criteria)?;
        for group in &groups {
            group.update(|g| g.granted_roles.remove(role_id));
        }
        debug!(realm_id, role_id, groups = groups.len(), "revoked removed role from groups");
        Ok(groups.len())
    }

    fn realm_criteria(&self, realm_id: &str) -> ModelResult<CriteriaBuilder<GroupField>> {
        Ok(self
            .storage
            .create_criteria_builder()
            .compare(GroupField::RealmId, Operator::Eq, realm_id)?)
    }

    fn siblings(
        &self,
        realm_id: &str,
        parent_id: Option<&str>,
    ) -> ModelResult<CriteriaBuilder<GroupField>> {
        let criteria = self.realm_criteria(realm_id)?;
        Ok(match parent_id {
            Some(parent) => criteria.compare(GroupField::ParentId, Operator::Eq, parent)?,
            None => criteria.not_exists(GroupField::ParentId)?,
        })
    }

    fn query_tracked(
        &self,
        criteria: &CriteriaBuilder<GroupField>,
    ) -> ModelResult<Vec<Tracked<Group<K>>>> {
        let mut tx = self.tx.lock();
        let found = tx.get_updated_not_removed(criteria)?.collect();
        Ok(found)
    }

    fn view(&self, tracked: Tracked<Group<K>>) -> GroupView<K> {
        View::new(tracked, self.storage.key_converter_handle())
    }
}

/// Group transactions of the units of work still in progress.
type OpenTransactions<K> = Mutex<HashMap<UnitOfWorkId, SharedTransaction<Group<K>>>>;

/// Opens [`GroupStore`]s and keeps groups consistent with role removal.
///
/// Every store the factory opens for the same unit of work shares one
/// transaction, so changes made through any of them are visible to the
/// others. While the factory is alive, every [`RoleRemovedEvent`] published
/// on the bus revokes the role from the realm's groups through that same
/// transaction.
pub struct GroupStoreFactory<K: ModelKey> {
    storage: Arc<MapStorage<Group<K>>>,
    open: Arc<OpenTransactions<K>>,
    _role_removed: Subscription,
}

impl<K: ModelKey> GroupStoreFactory<K> {
    /// Creates the factory and subscribes it to `roles_removed`.
    pub fn new(
        storage: Arc<MapStorage<Group<K>>>,
        roles_removed: &EventBus<RoleRemovedEvent>,
    ) -> Self {
        let open: Arc<OpenTransactions<K>> = Arc::new(Mutex::new(HashMap::new()));
        let handler_storage = Arc::clone(&storage);
        let handler_open = Arc::clone(&open);
        let subscription = roles_removed.subscribe(move |uow, event: &RoleRemovedEvent| {
            store_for(&handler_storage, &handler_open, uow)
                .pre_remove_role(&event.realm_id, &event.role_id)?;
            Ok(())
        });
        Self {
            storage,
            open,
            _role_removed: subscription,
        }
    }

    /// Returns the store of `uow`, opening its transaction on first use.
    pub fn create(&self, uow: &UnitOfWork) -> GroupStore<K> {
        store_for(&self.storage, &self.open, uow)
    }
}

fn store_for<K: ModelKey>(
    storage: &Arc<MapStorage<Group<K>>>,
    open: &OpenTransactions<K>,
    uow: &UnitOfWork,
) -> GroupStore<K> {
    let mut open = open.lock();
    open.retain(|_, tx| tx.lock().is_active());
    let tx = open
        .entry(uow.id())
        .or_insert_with(|| storage.create_transaction(uow))
        .clone();
    GroupStore {
        storage: Arc::clone(storage),
        tx,
    }
}
