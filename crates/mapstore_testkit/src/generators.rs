//! Property-based test generators using proptest.
//!
//! Provides strategies for generating books, key strings and sequences of
//! transaction operations for model-based tests.

use crate::fixtures::Book;
use proptest::prelude::*;

/// Strategy for book ids drawn from a small pool, so that generated
/// operations collide often.
pub fn book_id_strategy() -> impl Strategy<Value = String> {
    (0u8..12).prop_map(|n| format!("b{n}"))
}

/// Strategy for short titles.
pub fn title_strategy() -> impl Strategy<Value = String> {
    prop::string::string_regex("[A-Za-z]{1,12}").expect("Invalid regex")
}

/// Strategy for a book with the given id.
pub fn book_with_id(id: String) -> impl Strategy<Value = Book> {
    (
        title_strategy(),
        prop::option::of(prop::string::string_regex("[A-Z][a-z]{2,8}").expect("Invalid regex")),
        1000i64..2030,
        prop::collection::vec(prop::sample::select(vec!["scifi", "classic", "poetry"]), 0..3),
        any::<bool>(),
    )
        .prop_map(move |(title, author, year, tags, available)| Book {
            id: id.clone(),
            title,
            author,
            year,
            tags: tags.into_iter().map(String::from).collect(),
            available,
        })
}

/// Strategy for an arbitrary book.
pub fn book_strategy() -> impl Strategy<Value = Book> {
    book_id_strategy().prop_flat_map(book_with_id)
}

/// One step of a generated transaction.
#[derive(Debug, Clone)]
pub enum TxOp {
    /// Create a book.
    Create(Book),
    /// Read a book by id.
    Read(String),
    /// Change the title of a book through its working copy.
    Retitle(String, String),
    /// Delete a book.
    Delete(String),
}

/// Strategy for a single transaction operation.
pub fn tx_op_strategy() -> impl Strategy<Value = TxOp> {
    prop_oneof![
        3 => book_strategy().prop_map(TxOp::Create),
        2 => book_id_strategy().prop_map(TxOp::Read),
        2 => (book_id_strategy(), title_strategy()).prop_map(|(id, t)| TxOp::Retitle(id, t)),
        2 => book_id_strategy().prop_map(TxOp::Delete),
    ]
}

/// Strategy for a sequence of operations.
pub fn tx_ops_strategy(max_len: usize) -> impl Strategy<Value = Vec<TxOp>> {
    prop::collection::vec(tx_op_strategy(), 0..max_len)
}

/// Strategy for a backend seed with unique ids.
pub fn seed_strategy() -> impl Strategy<Value = Vec<Book>> {
    prop::collection::btree_set(book_id_strategy(), 0..8).prop_flat_map(|ids| {
        ids.into_iter()
            .map(book_with_id)
            .collect::<Vec<_>>()
    })
}
