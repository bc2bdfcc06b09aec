//! Benchmark utilities.

use mapstore_testkit::{Book, TestStorage};
use rand::seq::SliceRandom;
use rand::Rng;

const TAGS: &[&str] = &["scifi", "classic", "poetry", "history", "cyberpunk"];

/// Generates `count` books with ids `b0..`, random years and one or two
/// random tags.
pub fn random_books(count: usize) -> Vec<Book> {
    let mut rng = rand::thread_rng();
    (0..count)
        .map(|i| {
            let year = rng.gen_range(1800..2024);
            let mut book = Book::new(format!("b{i}"), format!("Title {i}"), year);
            let tags = rng.gen_range(1..=2);
            for tag in TAGS.choose_multiple(&mut rng, tags) {
                book = book.tagged(*tag);
            }
            book
        })
        .collect()
}

/// A storage holding `count` committed random books.
pub fn seeded_storage(count: usize) -> TestStorage {
    TestStorage::seeded(random_books(count))
}
