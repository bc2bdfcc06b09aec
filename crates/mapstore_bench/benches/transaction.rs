//! Transaction benchmarks: queries through the working-copy overlay and
//! commits through a unit of work.

use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use mapstore_bench::seeded_storage;
use mapstore_core::{CriteriaBuilder, Operator, UnitOfWork};
use mapstore_testkit::{Book, BookField};

fn scifi() -> CriteriaBuilder<BookField> {
    CriteriaBuilder::new()
        .compare(BookField::Tag, Operator::Eq, "scifi")
        .unwrap()
}

/// Benchmark counting matches with a few pending writes in the overlay.
fn bench_get_count(c: &mut Criterion) {
    let mut group = c.benchmark_group("tx_get_count");
    let criteria = scifi();

    for size in [100, 1_000, 10_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let storage = seeded_storage(size);
            let uow = UnitOfWork::new();
            let shared = storage.create_transaction(&uow);
            let mut tx = shared.lock();
            tx.delete(&"b1".to_string()).unwrap();
            tx.create("new".to_string(), Book::new("new", "New", 2024).tagged("scifi"))
                .unwrap();

            b.iter(|| black_box(tx.get_count(&criteria).unwrap()));
        });
    }

    group.finish();
}

/// Benchmark iterating matches, which tracks every yielded entity.
fn bench_query(c: &mut Criterion) {
    let mut group = c.benchmark_group("tx_query");
    let criteria = scifi();

    for size in [100, 1_000].iter() {
        group.throughput(Throughput::Elements(*size as u64));
        group.bench_with_input(BenchmarkId::from_parameter(size), size, |b, &size| {
            let storage = seeded_storage(size);
            b.iter(|| {
                let uow = UnitOfWork::new();
                let shared = storage.create_transaction(&uow);
                let mut tx = shared.lock();
                let n = tx.get_updated_not_removed(&criteria).unwrap().count();
                drop(tx);
                uow.rollback();
                black_box(n)
            });
        });
    }

    group.finish();
}

/// Benchmark committing a unit of work that creates, updates and deletes.
fn bench_commit(c: &mut Criterion) {
    let mut group = c.benchmark_group("uow_commit");

    for writes in [10, 100].iter() {
        group.throughput(Throughput::Elements(*writes as u64 * 3));
        group.bench_with_input(BenchmarkId::from_parameter(writes), writes, |b, &writes| {
            let storage = seeded_storage(writes * 2);
            let mut round = 0usize;
            b.iter(|| {
                round += 1;
                let uow = UnitOfWork::new();
                let shared = storage.create_transaction(&uow);
                {
                    let mut tx = shared.lock();
                    for i in 0..writes {
                        let id = format!("r{round}-{i}");
                        tx.create(id.clone(), Book::new(id, "Fresh", 2024)).unwrap();
                        if let Some(book) = tx.read(&format!("b{i}")).unwrap() {
                            book.write().year += 1;
                        }
                        tx.delete(&format!("r{}-{i}", round - 1)).unwrap();
                    }
                }
                uow.commit().unwrap();
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_get_count, bench_query, bench_commit);
criterion_main!(benches);
