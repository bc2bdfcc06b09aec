//! Root authentication session store behavior.

use mapstore_core::{
    CompletionToken, CoreError, CoreResult, MapStorage, Participant, StringKeyConverter,
    UnitOfWork,
};
use mapstore_model::{
    AuthSessionConfig, Clock, ModelError, RootAuthSession, RootAuthSessionStore,
};
use mapstore_storage::InMemoryBackend;
use mapstore_testkit::ManualClock;
use std::sync::Arc;
use std::time::Duration;

const LIFESPAN: Duration = Duration::from_secs(60);

struct Fixture {
    storage: Arc<MapStorage<RootAuthSession<String>>>,
    clock: Arc<ManualClock>,
}

impl Fixture {
    fn new() -> Self {
        Self {
            storage: Arc::new(MapStorage::new(
                "root_auth_sessions",
                Arc::new(InMemoryBackend::new()),
                Arc::new(StringKeyConverter),
            )),
            clock: Arc::new(ManualClock::default()),
        }
    }

    fn store(&self, uow: &UnitOfWork) -> RootAuthSessionStore<String> {
        let clock: Arc<dyn Clock> = self.clock.clone();
        RootAuthSessionStore::new(
            Arc::clone(&self.storage),
            uow,
            clock,
            AuthSessionConfig::new().session_lifespan(LIFESPAN),
        )
    }

    fn committed(&self, f: impl FnOnce(&RootAuthSessionStore<String>)) {
        let uow = UnitOfWork::new();
        f(&self.store(&uow));
        uow.commit().unwrap();
    }
}

struct Failing;

impl Participant for Failing {
    fn commit(&mut self, _token: &CompletionToken) -> CoreResult<()> {
        Err(CoreError::invalid_operation("regular participant failed"))
    }

    fn rollback(&mut self, _token: &CompletionToken) {}
}

#[test]
fn create_stamps_and_get_is_realm_scoped() {
    let fx = Fixture::new();
    fx.committed(|store| {
        let session = store.create("r1", Some("s1")).unwrap();
        assert_eq!(session.timestamp(), fx.clock.now_millis());
        assert!(matches!(
            store.create("r1", Some("s1")),
            Err(ModelError::Duplicate(_))
        ));
    });

    let uow = UnitOfWork::new();
    let store = fx.store(&uow);
    assert!(store.get("r1", "s1").unwrap().is_some());
    assert!(store.get("r2", "s1").unwrap().is_none());
    assert!(store.get("r1", "").unwrap().is_none());
    assert!(matches!(
        store.create("r1", Some("s1")),
        Err(ModelError::Duplicate(_))
    ));
}

#[test]
fn tab_flows_live_inside_the_root_session() {
    let fx = Fixture::new();
    let mut tab = String::new();
    fx.committed(|store| {
        let session = store.create("r1", Some("s1")).unwrap();
        tab = session.create_authentication_session("client-a");
        assert!(session.set_auth_note(&tab, "step", "password"));
        assert!(!session.set_auth_note("missing", "step", "x"));
    });

    let uow = UnitOfWork::new();
    let store = fx.store(&uow);
    let session = store.get("r1", "s1").unwrap().unwrap();
    let flow = session.authentication_session(&tab).unwrap();
    assert_eq!(flow.client_uuid, "client-a");
    assert_eq!(flow.auth_notes.get("step").map(String::as_str), Some("password"));

    assert!(session.remove_authentication_session(&tab));
    assert!(session.authentication_sessions().is_empty());
    session.restart(42);
    assert_eq!(session.timestamp(), 42);
}

#[test]
fn remove_expired_deletes_only_idle_sessions_of_the_realm() {
    let fx = Fixture::new();
    fx.committed(|store| {
        store.create("r1", Some("old")).unwrap();
        store.create("r2", Some("other-realm")).unwrap();
    });
    fx.clock.advance(LIFESPAN + Duration::from_secs(1));
    fx.committed(|store| {
        store.create("r1", Some("fresh")).unwrap();
    });

    let uow = UnitOfWork::new();
    let store = fx.store(&uow);
    assert_eq!(store.remove_expired("r1").unwrap(), 1);
    assert!(store.get("r1", "old").unwrap().is_none());
    assert!(store.get("r1", "fresh").unwrap().is_some());
    uow.commit().unwrap();

    let uow = UnitOfWork::new();
    let store = fx.store(&uow);
    assert!(store.get("r1", "old").unwrap().is_none());
    assert!(store.get("r2", "other-realm").unwrap().is_some());
}

#[test]
fn realm_removal_bypasses_the_unit_of_work() {
    let fx = Fixture::new();
    fx.committed(|store| {
        store.create("r1", Some("a")).unwrap();
        store.create("r1", Some("b")).unwrap();
        store.create("r2", Some("c")).unwrap();
    });

    let uow = UnitOfWork::new();
    let store = fx.store(&uow);
    assert_eq!(store.on_realm_removed("r1").unwrap(), 2);
    uow.rollback();

    let uow = UnitOfWork::new();
    let store = fx.store(&uow);
    assert!(store.get("r1", "a").unwrap().is_none());
    assert!(store.get("r2", "c").unwrap().is_some());
}

#[test]
fn session_writes_wait_for_regular_participants() {
    let fx = Fixture::new();

    let uow = UnitOfWork::new();
    let store = fx.store(&uow);
    store.create("r1", Some("s1")).unwrap();
    uow.enlist(Failing);
    assert!(uow.commit().is_err());

    let uow = UnitOfWork::new();
    let store = fx.store(&uow);
    assert!(store.get("r1", "s1").unwrap().is_none());
    assert!(store.remove("s1").is_ok_and(|existed| !existed));
}
