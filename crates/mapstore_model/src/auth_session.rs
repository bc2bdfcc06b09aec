//! Root authentication sessions and their expiry.

use crate::clock::Clock;
use crate::error::{ModelError, ModelResult};
use crate::view::{ModelKey, View};
use mapstore_core::{
    CriteriaBuilder, FieldValue, MapEntity, MapStorage, Operator, Phase, SearchableField,
    SharedTransaction, Tracked, UnitOfWork, ValueKind,
};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;
use uuid::Uuid;

/// Length of generated tab ids.
const TAB_ID_LEN: usize = 11;

/// One browser tab's authentication flow.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AuthenticationSession {
    /// Client the flow authenticates for.
    pub client_uuid: String,
    /// Notes recorded during the flow.
    #[serde(default)]
    pub auth_notes: BTreeMap<String, String>,
}

/// The authentication state of one browser, across its tabs.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RootAuthSession<K> {
    /// Identity.
    pub id: K,
    /// Realm the session belongs to.
    pub realm_id: String,
    /// Last activity, in milliseconds since the Unix epoch.
    pub timestamp: i64,
    /// Tab flows by tab id.
    #[serde(default)]
    pub auth_sessions: BTreeMap<String, AuthenticationSession>,
}

/// Searchable fields of [`RootAuthSession`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum RootAuthSessionField {
    /// Id in its string form.
    Id,
    /// Realm id.
    RealmId,
    /// Last activity timestamp.
    Timestamp,
}

impl SearchableField for RootAuthSessionField {
    fn name(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::RealmId => "REALM_ID",
            Self::Timestamp => "TIMESTAMP",
        }
    }

    fn kind(&self) -> ValueKind {
        match self {
            Self::Id | Self::RealmId => ValueKind::Str,
            Self::Timestamp => ValueKind::Int,
        }
    }
}

impl<K: ModelKey> MapEntity for RootAuthSession<K> {
    type Key = K;
    type Field = RootAuthSessionField;

    fn id(&self) -> &K {
        &self.id
    }

    fn field_value(&self, field: RootAuthSessionField) -> FieldValue<'_> {
        match field {
            RootAuthSessionField::Id => FieldValue::from(self.id.to_string()),
            RootAuthSessionField::RealmId => FieldValue::str(&self.realm_id),
            RootAuthSessionField::Timestamp => FieldValue::Int(self.timestamp),
        }
    }
}

/// A view of a root authentication session.
pub type RootAuthSessionView<K> = View<RootAuthSession<K>>;

impl<K: ModelKey> View<RootAuthSession<K>> {
    /// Realm id.
    pub fn realm_id(&self) -> String {
        self.get(|s| s.realm_id.clone())
    }

    /// Last activity timestamp.
    pub fn timestamp(&self) -> i64 {
        self.get(|s| s.timestamp)
    }

    /// Sets the last activity timestamp.
    pub fn set_timestamp(&self, timestamp: i64) {
        self.set(|s| s.timestamp = timestamp);
    }

    /// Tab flows by tab id.
    pub fn authentication_sessions(&self) -> BTreeMap<String, AuthenticationSession> {
        self.get(|s| s.auth_sessions.clone())
    }

    /// The flow of one tab.
    pub fn authentication_session(&self, tab_id: &str) -> Option<AuthenticationSession> {
        self.get(|s| s.auth_sessions.get(tab_id).cloned())
    }

    /// Starts a flow for `client_uuid` in a new tab and returns the tab id.
    pub fn create_authentication_session(&self, client_uuid: impl Into<String>) -> String {
        let mut tab_id = Uuid::new_v4().simple().to_string();
        tab_id.truncate(TAB_ID_LEN);
        let session = AuthenticationSession {
            client_uuid: client_uuid.into(),
            auth_notes: BTreeMap::new(),
        };
        let id = tab_id.clone();
        self.set(|s| {
            s.auth_sessions.insert(id, session);
        });
        tab_id
    }

    /// Records a note on a tab's flow. Returns false if the tab is unknown.
    pub fn set_auth_note(
        &self,
        tab_id: &str,
        name: impl Into<String>,
        value: impl Into<String>,
    ) -> bool {
        let (name, value) = (name.into(), value.into());
        self.set(|s| match s.auth_sessions.get_mut(tab_id) {
            Some(session) => {
                session.auth_notes.insert(name, value);
                true
            }
            None => false,
        })
    }

    /// Ends a tab's flow. Returns false if the tab is unknown.
    pub fn remove_authentication_session(&self, tab_id: &str) -> bool {
        self.set(|s| s.auth_sessions.remove(tab_id).is_some())
    }

    /// Drops every tab flow and stamps the session with `timestamp`.
    pub fn restart(&self, timestamp: i64) {
        self.set(|s| {
            s.auth_sessions.clear();
            s.timestamp = timestamp;
        });
    }
}

/// Settings of [`RootAuthSessionStore`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AuthSessionConfig {
    /// How long a session survives without activity.
    pub session_lifespan: Duration,
}

impl Default for AuthSessionConfig {
    fn default() -> Self {
        Self {
            session_lifespan: Duration::from_secs(30 * 60),
        }
    }
}

impl AuthSessionConfig {
    /// Default settings.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the session lifespan.
    #[must_use]
    pub const fn session_lifespan(mut self, lifespan: Duration) -> Self {
        self.session_lifespan = lifespan;
        self
    }
}

/// Root authentication session operations bound to one unit of work.
///
/// The transaction is enlisted after completion, so session writes are
/// applied only once every regular participant has committed.
pub struct RootAuthSessionStore<K: ModelKey> {
    storage: Arc<MapStorage<RootAuthSession<K>>>,
    tx: SharedTransaction<RootAuthSession<K>>,
    clock: Arc<dyn Clock>,
    config: AuthSessionConfig,
}

impl<K: ModelKey> RootAuthSessionStore<K> {
    /// Opens a transaction on `storage` enlisted after completion in `uow`.
    pub fn new(
        storage: Arc<MapStorage<RootAuthSession<K>>>,
        uow: &UnitOfWork,
        clock: Arc<dyn Clock>,
        config: AuthSessionConfig,
    ) -> Self {
        let tx = storage.create_transaction_in(uow, Phase::AfterCompletion);
        Self {
            storage,
            tx,
            clock,
            config,
        }
    }

    /// Creates a session in `realm_id`. `id` is generated when `None`.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidId`] if `id` is not a valid key and
    /// [`ModelError::Duplicate`] if it is taken.
    pub fn create(&self, realm_id: &str, id: Option<&str>) -> ModelResult<RootAuthSessionView<K>> {
        let keys = self.storage.key_converter();
        let key = match id {
            Some(id) => keys.from_string(id)?,
            None => keys.yield_new_unique_key()?,
        };

        let mut tx = self.tx.lock();
        if tx.read(&key)?.is_some() {
            return Err(ModelError::duplicate(format!(
                "root authentication session {} already exists",
                keys.key_to_string(&key)
            )));
        }
        let entity = RootAuthSession {
            id: key.clone(),
            realm_id: realm_id.to_owned(),
            timestamp: self.clock.now_millis(),
            auth_sessions: BTreeMap::new(),
        };
        let tracked = tx.create(key, entity)?;
        Ok(self.view(tracked))
    }

    /// Finds a session of `realm_id`. Ids that are not valid keys, and
    /// sessions of other realms, find nothing.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn get(&self, realm_id: &str, id: &str) -> ModelResult<Option<RootAuthSessionView<K>>> {
        let Some(key) = self.storage.key_converter().from_string_safe(id) else {
            return Ok(None);
        };
        let found = self.tx.lock().read(&key)?;
        Ok(found
            .filter(|s| s.read().realm_id == realm_id)
            .map(|t| self.view(t)))
    }

    /// Removes a session. Returns false if it did not exist.
    ///
    /// # Errors
    ///
    /// Returns [`ModelError::InvalidId`] if `id` is not a valid key.
    pub fn remove(&self, id: &str) -> ModelResult<bool> {
        let key = self.storage.key_converter().from_string(id)?;
        Ok(self.tx.lock().delete(&key)?)
    }

    /// Removes the sessions of `realm_id` idle for longer than the
    /// configured lifespan. Returns how many were removed.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn remove_expired(&self, realm_id: &str) -> ModelResult<usize> {
        let lifespan = i64::try_from(self.config.session_lifespan.as_millis()).unwrap_or(i64::MAX);
        let expired = self.clock.now_millis().saturating_sub(lifespan);
        let criteria = self
            .realm_criteria(realm_id)?
            .compare(RootAuthSessionField::Timestamp, Operator::Lt, expired)?;

        let scratch = self.storage.key_converter().yield_new_unique_key()?;
        let removed = self.tx.lock().delete_matching(scratch, &criteria)?;
        debug!(realm_id, expired, removed, "removed expired root authentication sessions");
        Ok(removed)
    }

    /// Removes every session of a deleted realm, outside any transaction.
    ///
    /// # Errors
    ///
    /// Backend errors are passed through.
    pub fn on_realm_removed(&self, realm_id: &str) -> ModelResult<usize> {
        let removed = self.storage.delete_matching(&self.realm_criteria(realm_id)?)?;
        debug!(realm_id, removed, "removed root authentication sessions of realm");
        Ok(removed)
    }

    fn realm_criteria(&self, realm_id: &str) -> ModelResult<CriteriaBuilder<RootAuthSessionField>> {
        Ok(self
            .storage
            .create_criteria_builder()
            .compare(RootAuthSessionField::RealmId, Operator::Eq, realm_id)?)
    }

    fn view(&self, tracked: Tracked<RootAuthSession<K>>) -> RootAuthSessionView<K> {
        View::new(tracked, self.storage.key_converter_handle())
    }
}
