//! Test fixtures and storage helpers.
//!
//! Provides a small sample entity kind ([`Book`]) and convenience functions
//! for setting up storages over it, plus backends and clocks with knobs for
//! failure and time injection.

use mapstore_core::{
    FieldValue, MapEntity, MapStorage, SearchableField, StorageConfig, StringKeyConverter,
    UnitOfWork, ValueKind,
};
use mapstore_model::Clock;
use mapstore_storage::{
    Applied, InMemoryBackend, MapBackend, StorageError, StorageResult, WriteBatch,
};
use serde::{Deserialize, Serialize};
use std::sync::atomic::{AtomicBool, AtomicI64, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Sample entity kind used across engine tests.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Book {
    /// Identity key.
    pub id: String,
    /// Title.
    pub title: String,
    /// Author, if known.
    #[serde(default)]
    pub author: Option<String>,
    /// Publication year.
    pub year: i64,
    /// Free-form tags.
    #[serde(default)]
    pub tags: Vec<String>,
    /// Whether the book can be lent.
    #[serde(default)]
    pub available: bool,
}

impl Book {
    /// Creates an available book with no author and no tags.
    pub fn new(id: impl Into<String>, title: impl Into<String>, year: i64) -> Self {
        Self {
            id: id.into(),
            title: title.into(),
            author: None,
            year,
            tags: Vec::new(),
            available: true,
        }
    }

    /// Sets the author.
    #[must_use]
    pub fn by(mut self, author: impl Into<String>) -> Self {
        self.author = Some(author.into());
        self
    }

    /// Adds a tag.
    #[must_use]
    pub fn tagged(mut self, tag: impl Into<String>) -> Self {
        self.tags.push(tag.into());
        self
    }
}

/// Searchable fields of [`Book`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum BookField {
    /// The id.
    Id,
    /// The title.
    Title,
    /// The author; absent when unknown.
    Author,
    /// The publication year.
    Year,
    /// Any of the tags.
    Tag,
    /// The availability flag.
    Available,
}

impl SearchableField for BookField {
    fn name(&self) -> &'static str {
        match self {
            Self::Id => "ID",
            Self::Title => "TITLE",
            Self::Author => "AUTHOR",
            Self::Year => "YEAR",
            Self::Tag => "TAG",
            Self::Available => "AVAILABLE",
        }
    }

    fn kind(&self) -> ValueKind {
        match self {
            Self::Id | Self::Title | Self::Author => ValueKind::Str,
            Self::Year => ValueKind::Int,
            Self::Tag => ValueKind::StrSet,
            Self::Available => ValueKind::Bool,
        }
    }
}

impl MapEntity for Book {
    type Key = String;
    type Field = BookField;

    fn id(&self) -> &String {
        &self.id
    }

    fn field_value(&self, field: BookField) -> FieldValue<'_> {
        match field {
            BookField::Id => FieldValue::str(&self.id),
            BookField::Title => FieldValue::str(&self.title),
            BookField::Author => FieldValue::opt_str(self.author.as_deref()),
            BookField::Year => FieldValue::Int(self.year),
            BookField::Tag => FieldValue::many(&self.tags),
            BookField::Available => FieldValue::Bool(self.available),
        }
    }
}

/// Parses a JSON array of books.
///
/// # Panics
///
/// Panics on malformed JSON.
pub fn books_from_json(json: &str) -> Vec<Book> {
    serde_json::from_str(json).expect("invalid book fixture JSON")
}

/// A book storage together with direct access to its backend.
pub struct TestStorage {
    /// The storage under test.
    pub storage: MapStorage<Book>,
    /// The backend, for inspecting committed state.
    pub backend: Arc<InMemoryBackend<String, Book>>,
}

impl TestStorage {
    /// Creates an empty storage.
    pub fn new() -> Self {
        Self::with_config(StorageConfig::default())
    }

    /// Creates an empty storage with a specific configuration.
    pub fn with_config(config: StorageConfig) -> Self {
        let backend = Arc::new(InMemoryBackend::new());
        let storage = MapStorage::with_config(
            "books",
            Arc::clone(&backend) as Arc<dyn MapBackend<String, Book>>,
            Arc::new(StringKeyConverter),
            config,
        );
        Self { storage, backend }
    }

    /// Creates a storage whose backend already holds `books`.
    pub fn seeded(books: impl IntoIterator<Item = Book>) -> Self {
        let backend = Arc::new(InMemoryBackend::with_entries(
            books.into_iter().map(|b| (b.id.clone(), b)),
        ));
        let storage = MapStorage::new(
            "books",
            Arc::clone(&backend) as Arc<dyn MapBackend<String, Book>>,
            Arc::new(StringKeyConverter),
        );
        Self { storage, backend }
    }

    /// Returns the committed copy of a book.
    ///
    /// # Panics
    ///
    /// Panics if the backend fails.
    pub fn committed(&self, id: &str) -> Option<Book> {
        self.backend
            .read(&id.to_string())
            .expect("backend read failed")
    }

    /// Number of committed books.
    ///
    /// # Panics
    ///
    /// Panics if the backend fails.
    pub fn committed_len(&self) -> usize {
        self.backend.len().expect("backend len failed")
    }
}

impl Default for TestStorage {
    fn default() -> Self {
        Self::new()
    }
}

impl std::ops::Deref for TestStorage {
    type Target = MapStorage<Book>;

    fn deref(&self) -> &Self::Target {
        &self.storage
    }
}

/// Runs a test with a fresh, empty book storage.
///
/// # Example
///
/// ```rust,ignore
/// use mapstore_testkit::with_storage;
///
/// #[test]
/// fn my_test() {
///     with_storage(|storage| {
///         let uow = UnitOfWork::new();
///         let tx = storage.create_transaction(&uow);
///         // ... test operations
///     });
/// }
/// ```
pub fn with_storage<F, R>(f: F) -> R
where
    F: FnOnce(&TestStorage) -> R,
{
    let storage = TestStorage::new();
    f(&storage)
}

/// Runs `f` inside a unit of work and commits it.
///
/// # Panics
///
/// Panics if `f` or the commit fails.
pub fn commit_with<F>(storage: &MapStorage<Book>, f: F)
where
    F: FnOnce(&mut mapstore_core::MapTransaction<Book>) -> mapstore_core::CoreResult<()>,
{
    let uow = UnitOfWork::new();
    let tx = storage.create_transaction(&uow);
    f(&mut tx.lock()).expect("transaction body failed");
    uow.commit().expect("commit failed");
}

/// Test scenario helpers.
pub mod scenarios {
    use super::*;

    /// Five books with distinct years and a mix of tags, authors and
    /// availability.
    pub fn library() -> Vec<Book> {
        vec![
            Book::new("b1", "Dune", 1965).by("Herbert").tagged("scifi"),
            Book::new("b2", "Emma", 1815).by("Austen").tagged("classic"),
            Book::new("b3", "Neuromancer", 1984)
                .by("Gibson")
                .tagged("scifi")
                .tagged("cyberpunk"),
            Book {
                available: false,
                ..Book::new("b4", "Beowulf", 1000).tagged("classic")
            },
            Book::new("b5", "Hyperion", 1989).by("Simmons").tagged("scifi"),
        ]
    }

    /// `count` generated books with ids `book-0000` upwards.
    pub fn numbered(count: usize) -> Vec<Book> {
        (0..count)
            .map(|i| {
                let tag = if i % 2 == 0 { "even" } else { "odd" };
                Book::new(format!("book-{i:04}"), format!("Title {i}"), 1900 + (i % 100) as i64)
                    .tagged(tag)
            })
            .collect()
    }
}

/// A backend that fails on demand.
///
/// Wraps an [`InMemoryBackend`]; every call succeeds until one of the
/// failure switches is set.
pub struct FailingBackend<K, V> {
    inner: InMemoryBackend<K, V>,
    fail_apply: AtomicBool,
    fail_reads: AtomicBool,
}

impl<K: Ord, V> FailingBackend<K, V> {
    /// Creates an empty backend with all switches off.
    pub fn new() -> Self {
        Self {
            inner: InMemoryBackend::new(),
            fail_apply: AtomicBool::new(false),
            fail_reads: AtomicBool::new(false),
        }
    }

    /// Makes the next [`MapBackend::apply`] call fail.
    pub fn fail_next_apply(&self) {
        self.fail_apply.store(true, Ordering::SeqCst);
    }

    /// Makes every read-side call fail while set.
    pub fn fail_reads(&self, value: bool) {
        self.fail_reads.store(value, Ordering::SeqCst);
    }

    fn check_reads(&self) -> StorageResult<()> {
        if self.fail_reads.load(Ordering::SeqCst) {
            return Err(StorageError::backend("injected read failure"));
        }
        Ok(())
    }
}

impl<K: Ord, V> Default for FailingBackend<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K, V> MapBackend<K, V> for FailingBackend<K, V>
where
    K: Ord + Clone + Send + Sync,
    V: Clone + Send + Sync,
{
    fn read(&self, key: &K) -> StorageResult<Option<V>> {
        self.check_reads()?;
        self.inner.read(key)
    }

    fn contains(&self, key: &K) -> StorageResult<bool> {
        self.check_reads()?;
        self.inner.contains(key)
    }

    fn select(&self, filter: &dyn Fn(&K, &V) -> bool) -> StorageResult<Vec<(K, V)>> {
        self.check_reads()?;
        self.inner.select(filter)
    }

    fn count(&self, filter: &dyn Fn(&K, &V) -> bool) -> StorageResult<usize> {
        self.check_reads()?;
        self.inner.count(filter)
    }

    fn apply(&self, batch: WriteBatch<K, V>) -> StorageResult<Vec<Applied<K>>> {
        if self.fail_apply.swap(false, Ordering::SeqCst) {
            return Err(StorageError::backend("injected apply failure"));
        }
        self.inner.apply(batch)
    }

    fn remove_where(&self, filter: &dyn Fn(&K, &V) -> bool) -> StorageResult<Vec<K>> {
        self.inner.remove_where(filter)
    }

    fn len(&self) -> StorageResult<usize> {
        self.inner.len()
    }
}

/// A clock that only moves when told to.
#[derive(Debug)]
pub struct ManualClock {
    millis: AtomicI64,
}

impl ManualClock {
    /// Creates a clock reading `millis`.
    pub fn at(millis: i64) -> Self {
        Self {
            millis: AtomicI64::new(millis),
        }
    }

    /// Moves the clock forward.
    pub fn advance(&self, by: Duration) {
        let by = i64::try_from(by.as_millis()).unwrap_or(i64::MAX);
        self.millis.fetch_add(by, Ordering::SeqCst);
    }

    /// Sets the clock.
    pub fn set(&self, millis: i64) {
        self.millis.store(millis, Ordering::SeqCst);
    }
}

impl Default for ManualClock {
    fn default() -> Self {
        Self::at(1_700_000_000_000)
    }
}

impl Clock for ManualClock {
    fn now_millis(&self) -> i64 {
        self.millis.load(Ordering::SeqCst)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use mapstore_core::Operator;

    #[test]
    fn library_fixture_is_consistent() {
        let books = scenarios::library();
        assert_eq!(books.len(), 5);
        let storage = TestStorage::seeded(books);
        assert_eq!(storage.committed_len(), 5);
        assert_eq!(storage.committed("b2").unwrap().title, "Emma");
    }

    #[test]
    fn book_fields() {
        let criteria = mapstore_core::CriteriaBuilder::new()
            .compare(BookField::Tag, Operator::Eq, "cyberpunk")
            .unwrap()
            .not_exists(BookField::Author)
            .unwrap();
        let books = scenarios::library();
        assert!(!books.iter().any(|b| criteria.matches(b)));
    }

    #[test]
    fn failing_backend_switches() {
        let backend = FailingBackend::<String, Book>::new();
        backend.fail_reads(true);
        assert!(backend.contains(&"x".to_string()).is_err());
        backend.fail_reads(false);
        assert!(!backend.contains(&"x".to_string()).unwrap());

        backend.fail_next_apply();
        assert!(backend.apply(WriteBatch::new()).is_err());
        assert!(backend.apply(WriteBatch::new()).is_ok());
    }

    #[test]
    fn manual_clock() {
        let clock = ManualClock::at(1_000);
        clock.advance(Duration::from_secs(2));
        assert_eq!(clock.now_millis(), 3_000);
        clock.set(5);
        assert_eq!(clock.now_millis(), 5);
    }

    #[test]
    fn books_from_json_defaults() {
        let books = books_from_json(r#"[{"id":"x","title":"X","year":2000}]"#);
        assert_eq!(books[0].author, None);
        assert!(!books[0].available);
    }
}
