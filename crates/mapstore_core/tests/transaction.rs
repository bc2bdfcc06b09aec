//! Integration tests for map transactions and their unit of work.

use mapstore_core::{
    ChangeType, CoreError, CriteriaBuilder, MapStorage, Operator, Phase, StringKeyConverter,
    TransactionState, UnitOfWork,
};
use mapstore_storage::{MapBackend, StorageError};
use mapstore_testkit::{commit_with, scenarios, Book, BookField, FailingBackend, TestStorage};
use std::sync::Arc;

fn key(id: &str) -> String {
    id.to_string()
}

fn library() -> TestStorage {
    TestStorage::seeded(scenarios::library())
}

fn scifi() -> CriteriaBuilder<BookField> {
    CriteriaBuilder::new()
        .compare(BookField::Tag, Operator::Eq, "scifi")
        .unwrap()
}

fn ids(books: impl IntoIterator<Item = mapstore_core::Tracked<Book>>) -> Vec<String> {
    books.into_iter().map(|b| b.read().id.clone()).collect()
}

#[test]
fn working_copy_does_not_alias_backend() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);

    let book = tx.lock().read(&key("b1")).unwrap().unwrap();
    book.write().title = "Changed".into();

    assert_eq!(storage.committed("b1").unwrap().title, "Dune");
    uow.rollback();
    assert_eq!(storage.committed("b1").unwrap().title, "Dune");
}

#[test]
fn repeated_reads_return_the_same_working_copy() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    let other = storage.create_transaction(&uow);

    let first = tx.lock().read(&key("b2")).unwrap().unwrap();
    let second = tx.lock().read(&key("b2")).unwrap().unwrap();
    let foreign = other.lock().read(&key("b2")).unwrap().unwrap();

    assert!(first.ptr_eq(&second));
    assert!(!first.ptr_eq(&foreign));

    first.write().year = 1816;
    assert_eq!(second.read().year, 1816);
    assert_eq!(foreign.read().year, 1815);
}

#[test]
fn query_results_are_the_tracked_copies() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    let mut tx = tx.lock();

    let read = tx.read(&key("b3")).unwrap().unwrap();
    let queried: Vec<_> = tx.get_updated_not_removed(&scifi()).unwrap().collect();

    let b3 = queried.iter().find(|b| b.read().id == "b3").unwrap();
    assert!(b3.ptr_eq(&read));
    let again = tx.read(&key("b5")).unwrap().unwrap();
    assert!(queried.iter().any(|b| b.ptr_eq(&again)));
}

#[test]
fn delete_then_read_is_absent() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    let mut tx = tx.lock();

    assert!(tx.delete(&key("b1")).unwrap());
    assert!(tx.read(&key("b1")).unwrap().is_none());
    assert!(!tx.exists(&key("b1")).unwrap());
    assert!(!tx.delete(&key("b1")).unwrap());
    assert!(!tx.delete(&key("missing")).unwrap());
    assert_eq!(tx.get_count(&scifi()).unwrap(), 2);
}

#[test]
fn count_matches_query_length() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    let mut tx = tx.lock();

    tx.create(key("b6"), Book::new("b6", "Solaris", 1961).tagged("scifi"))
        .unwrap();
    tx.create(key("b7"), Book::new("b7", "Ulysses", 1922)).unwrap();
    tx.delete(&key("b3")).unwrap();
    tx.read(&key("b1")).unwrap().unwrap().write().tags.clear();
    tx.read(&key("b2")).unwrap().unwrap().write().tags.push("scifi".into());

    let all = CriteriaBuilder::new();
    let modern = CriteriaBuilder::new()
        .compare(BookField::Year, Operator::Ge, 1950)
        .unwrap();
    let unknown_author = CriteriaBuilder::new().not_exists(BookField::Author).unwrap();

    for criteria in [all, scifi(), modern, unknown_author] {
        let count = tx.get_count(&criteria).unwrap();
        let listed = tx.get_updated_not_removed(&criteria).unwrap().count();
        assert_eq!(count, listed, "criteria {criteria}");
    }
}

#[test]
fn pending_changes_are_visible_to_queries() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    let mut tx = tx.lock();

    tx.create(key("z9"), Book::new("z9", "Foundation", 1951).tagged("scifi"))
        .unwrap();
    tx.create(key("a0"), Book::new("a0", "Solaris", 1961).tagged("scifi"))
        .unwrap();
    tx.read(&key("b1")).unwrap().unwrap().write().tags.clear();

    let found = ids(tx.get_updated_not_removed(&scifi()).unwrap());
    assert_eq!(found, vec!["b3", "b5", "z9", "a0"]);
}

#[test]
fn commit_is_visible_to_later_transactions() {
    let storage = library();

    let uow = UnitOfWork::new();
    let writer = storage.create_transaction(&uow);
    writer
        .lock()
        .create(key("b6"), Book::new("b6", "Solaris", 1961))
        .unwrap();
    writer.lock().read(&key("b1")).unwrap().unwrap().write().year = 1966;

    let concurrent = UnitOfWork::new();
    let reader = storage.create_transaction(&concurrent);
    assert!(reader.lock().read(&key("b6")).unwrap().is_none());

    uow.commit().unwrap();

    let later = UnitOfWork::new();
    let tx = storage.create_transaction(&later);
    assert_eq!(
        tx.lock().read(&key("b6")).unwrap().unwrap().read().title,
        "Solaris"
    );
    assert_eq!(tx.lock().read(&key("b1")).unwrap().unwrap().read().year, 1966);
}

#[test]
fn bulk_delete_removes_matching_entities() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);

    let removed = tx
        .lock()
        .delete_matching(key("bulk-1"), &scifi())
        .unwrap();
    assert_eq!(removed, 3);
    assert_eq!(tx.lock().get_count(&CriteriaBuilder::new()).unwrap(), 2);
    assert_eq!(storage.committed_len(), 5);

    uow.commit().unwrap();
    assert_eq!(storage.committed_len(), 2);
    assert!(storage.committed("b2").is_some());
    assert!(storage.committed("b4").is_some());
}

#[test]
fn bulk_delete_accepts_any_scratch_key() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    let mut tx = tx.lock();

    // An entity key and a repeated placeholder are both fine.
    let old = CriteriaBuilder::new()
        .compare(BookField::Year, Operator::Lt, 1900)
        .unwrap();
    let first = tx.delete_matching(key("b1"), &old).unwrap();
    let second = tx.delete_matching(key("placeholder"), &scifi()).unwrap();
    let third = tx.delete_matching(key("placeholder"), &scifi()).unwrap();

    assert_eq!((first, second, third), (2, 3, 0));
    assert!(!tx.exists(&key("placeholder")).unwrap());
    assert_eq!(tx.get_count(&CriteriaBuilder::new()).unwrap(), 0);
}

#[test]
fn create_rejects_duplicates() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    let mut tx = tx.lock();

    let err = tx.create(key("b1"), Book::new("b1", "Again", 2000)).unwrap_err();
    assert!(matches!(err, CoreError::DuplicateKey { ref key, .. } if key == "b1"));

    tx.create(key("n1"), Book::new("n1", "New", 2000)).unwrap();
    assert!(matches!(
        tx.create(key("n1"), Book::new("n1", "New", 2000)),
        Err(CoreError::DuplicateKey { .. })
    ));
}

#[test]
fn create_rejects_identity_mismatch() {
    let storage = TestStorage::new();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);

    let err = tx
        .lock()
        .create(key("a"), Book::new("b", "Wrong", 2000))
        .unwrap_err();
    assert!(matches!(err, CoreError::IdentityMismatch { .. }));
}

#[test]
fn create_then_delete_cancels_out() {
    let storage = library();
    let events = storage.subscribe();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);

    tx.lock()
        .create(key("tmp"), Book::new("tmp", "Draft", 2024))
        .unwrap();
    assert!(tx.lock().delete(&key("tmp")).unwrap());
    assert_eq!(tx.lock().pending_writes(), 0);

    uow.commit().unwrap();
    assert!(storage.committed("tmp").is_none());
    assert!(events.try_recv().is_err());
}

#[test]
fn recreate_after_delete_replaces() {
    let storage = library();
    let events = storage.subscribe();

    commit_with(&storage, |tx| {
        tx.delete(&key("b2"))?;
        tx.create(key("b2"), Book::new("b2", "Persuasion", 1817))?;
        Ok(())
    });

    assert_eq!(storage.committed("b2").unwrap().title, "Persuasion");
    let event = events.try_recv().unwrap();
    assert_eq!(event.change_type, ChangeType::Update);
    assert!(events.try_recv().is_err());
}

#[test]
fn update_semantics() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    let mut tx = tx.lock();

    let updated = tx
        .update(&key("b1"), Book::new("b1", "Dune Messiah", 1969))
        .unwrap();
    assert!(updated.ptr_eq(&tx.read(&key("b1")).unwrap().unwrap()));

    tx.delete(&key("b2")).unwrap();
    assert!(matches!(
        tx.update(&key("b2"), Book::new("b2", "Emma", 1815)),
        Err(CoreError::KeyRemoved { .. })
    ));
    assert!(matches!(
        tx.update(&key("nope"), Book::new("nope", "?", 1)),
        Err(CoreError::NotFound { .. })
    ));
    assert!(tx.read(&key("b2")).unwrap().is_none());
}

#[test]
fn register_tracks_detached_copies() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    let mut tx = tx.lock();

    let detached = storage.committed("b4").unwrap();
    let tracked = tx.register(&detached).unwrap();
    assert!(tracked.ptr_eq(&tx.read(&key("b4")).unwrap().unwrap()));
    assert!(tracked.ptr_eq(&tx.register(&detached).unwrap()));

    assert!(matches!(
        tx.register(&Book::new("ghost", "Ghost", 1)),
        Err(CoreError::NotFound { .. })
    ));
}

#[test]
fn only_touched_copies_are_written_back() {
    let storage = library();
    let events = storage.subscribe();

    commit_with(&storage, |tx| {
        let _untouched = tx.read(&key("b1"))?;
        let touched = tx.read(&key("b2"))?.expect("b2 exists");
        touched.update(|b| b.available = false);
        Ok(())
    });

    let changed: Vec<_> = events.try_iter().map(|e| e.key).collect();
    assert_eq!(changed, vec!["b2"]);
    assert!(!storage.committed("b2").unwrap().available);
}

#[test]
fn commit_publishes_events_in_batch_order() {
    let storage = library();
    let events = storage.subscribe();

    commit_with(&storage, |tx| {
        tx.delete(&key("b1"))?;
        tx.read(&key("b3"))?.expect("b3 exists").write().year = 1985;
        tx.create(key("b9"), Book::new("b9", "Kindred", 1979))?;
        Ok(())
    });

    let seen: Vec<_> = events
        .try_iter()
        .map(|e| (e.key, e.change_type))
        .collect();
    assert_eq!(
        seen,
        vec![
            ("b9".to_string(), ChangeType::Insert),
            ("b3".to_string(), ChangeType::Update),
            ("b1".to_string(), ChangeType::Delete),
        ]
    );
    assert_eq!(storage.poll_changes(0, 10).len(), 3);
}

#[test]
fn closed_transaction_rejects_operations() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    uow.commit().unwrap();

    let err = tx.lock().read(&key("b1")).unwrap_err();
    assert!(matches!(
        err,
        CoreError::TransactionClosed {
            state: TransactionState::Committed,
            ..
        }
    ));

    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    uow.rollback();
    assert_eq!(tx.lock().state(), TransactionState::RolledBack);
    assert!(tx.lock().get_count(&scifi()).is_err());
}

#[test]
fn changed_identity_fails_commit() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    tx.lock().read(&key("b1")).unwrap().unwrap().write().id = "other".into();
    tx.lock().delete(&key("b2")).unwrap();

    let err = uow.commit().unwrap_err();

    assert!(matches!(err, CoreError::IdentityMismatch { .. }));
    assert_eq!(tx.lock().state(), TransactionState::RolledBack);
    assert!(storage.committed("b2").is_some());
    assert!(storage.committed("other").is_none());
}

#[test]
fn backend_errors_pass_through_unchanged() {
    let backend = Arc::new(FailingBackend::<String, Book>::new());
    let storage: MapStorage<Book> = MapStorage::new(
        "books",
        Arc::clone(&backend) as Arc<dyn MapBackend<String, Book>>,
        Arc::new(StringKeyConverter),
    );

    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    tx.lock()
        .create(key("a"), Book::new("a", "A", 2000))
        .unwrap();
    backend.fail_next_apply();

    let err = uow.commit().unwrap_err();
    assert!(matches!(err, CoreError::Storage(StorageError::Backend(_))));
    assert_eq!(tx.lock().state(), TransactionState::RolledBack);
    assert!(backend.is_empty().unwrap());

    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    backend.fail_reads(true);
    assert!(matches!(
        tx.lock().read(&key("a")),
        Err(CoreError::Storage(StorageError::Backend(_)))
    ));
}

#[test]
fn rollback_only_discards_everything() {
    let storage = library();
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    tx.lock().delete(&key("b1")).unwrap();
    uow.set_rollback_only();

    assert!(matches!(
        uow.commit(),
        Err(CoreError::TransactionAborted { .. })
    ));
    assert!(storage.committed("b1").is_some());
    assert_eq!(tx.lock().state(), TransactionState::RolledBack);
}

#[test]
fn dropped_unit_of_work_rolls_back() {
    let storage = library();
    let tx = {
        let uow = UnitOfWork::new();
        let tx = storage.create_transaction(&uow);
        tx.lock().delete(&key("b1")).unwrap();
        tx
    };
    assert_eq!(tx.lock().state(), TransactionState::RolledBack);
    assert!(storage.committed("b1").is_some());
}

#[test]
fn enlistment_is_exclusive() {
    let storage = library();
    let first = UnitOfWork::new();
    let second = UnitOfWork::new();

    let tx = storage.create_transaction(&first);
    assert_eq!(tx.lock().unit_of_work(), Some(first.id()));
    assert!(matches!(
        tx.enlist(&second, Phase::Regular),
        Err(CoreError::InvalidOperation { .. })
    ));

    let loose = storage.begin();
    loose.enlist(&second, Phase::AfterCompletion).unwrap();
    loose
        .lock()
        .create(key("late"), Book::new("late", "Late", 2001))
        .unwrap();
    assert_eq!(second.participant_count(), 1);
    second.commit().unwrap();
    assert!(storage.committed("late").is_some());
}

#[test]
fn transaction_ids_increase() {
    let storage = library();
    let uow = UnitOfWork::new();
    let a = storage.create_transaction(&uow);
    let b = storage.create_transaction(&uow);
    assert!(a.id() < b.id());
    assert_eq!(a.lock().kind(), "books");
}
