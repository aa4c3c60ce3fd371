// ============================================================================
// Matching Benchmarks
// ============================================================================
//
// Benchmark Categories:
// 1. Matching Core - Matcher::submit against pre-built books
// 2. Order Book Operations - Snapshot and depth aggregation
// 3. Exchange Surface - End-to-end placement through the asset worker
// ============================================================================

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};
use rust_decimal::Decimal;
use std::sync::Arc;
use tokenbook::prelude::*;

fn spec() -> AssetSpec {
    AssetSpec::new(AssetId::new("PROP-001"), 2, Decimal::ONE)
}

fn order(owner: &str, side: Side, price: i64, quantity: i64, seq: u64) -> Arc<Order> {
    let order = Arc::new(Order::new(
        AssetId::new("PROP-001"),
        OwnerId::new(owner),
        side,
        Decimal::from(price),
        Decimal::from(quantity),
        None,
    ));
    order.set_sequence(seq);
    order
}

/// Book with `levels` one-lot sell orders at ascending prices from 100.
fn populated_book(levels: u64) -> (OrderBook, Matcher) {
    let mut book = OrderBook::new(AssetId::new("PROP-001"));
    let mut matcher = Matcher::new(spec());

    for i in 0..levels {
        let sell = order(
            &format!("seller{}", i),
            Side::Sell,
            100 + i as i64,
            1,
            i + 1,
        );
        matcher.submit(&mut book, sell);
    }

    (book, matcher)
}

// ============================================================================
// Matching Core Benchmarks
// ============================================================================

fn benchmark_crossing_submit(c: &mut Criterion) {
    let mut group = c.benchmark_group("crossing_submit");

    for levels in [100u64, 1000].iter() {
        group.bench_with_input(
            BenchmarkId::from_parameter(levels),
            levels,
            |b, &levels| {
                // Fresh book per iteration: the buy consumes 5 levels
                b.iter_batched(
                    || populated_book(levels),
                    |(mut book, mut matcher)| {
                        let buy = order("taker", Side::Buy, 104, 5, levels + 1);
                        black_box(matcher.submit(&mut book, buy));
                    },
                    BatchSize::LargeInput,
                );
            },
        );
    }

    group.finish();
}

fn benchmark_no_cross_submit(c: &mut Criterion) {
    c.bench_function("no_cross_submit", |b| {
        let (mut book, mut matcher) = populated_book(1000);
        let mut seq = 10_000u64;

        b.iter(|| {
            // Bid below every ask: walks nothing, rests in the book
            seq += 1;
            let buy = order("taker", Side::Buy, 50, 1, seq);
            black_box(matcher.submit(&mut book, buy));
        });
    });
}

// ============================================================================
// Order Book Operations Benchmarks
// ============================================================================

fn benchmark_depth_snapshot(c: &mut Criterion) {
    c.bench_function("depth_snapshot", |b| {
        let mut book = OrderBook::new(AssetId::new("PROP-001"));

        // 100 levels per side, uncrossed
        for i in 0..100u64 {
            book.insert(order(
                &format!("buyer{}", i),
                Side::Buy,
                99 - i as i64,
                1,
                i + 1,
            ));
            book.insert(order(
                &format!("seller{}", i),
                Side::Sell,
                101 + i as i64,
                1,
                i + 101,
            ));
        }

        b.iter(|| {
            black_box(book.depth_snapshot(10));
        });
    });
}

// ============================================================================
// Exchange Surface Benchmarks
// ============================================================================

fn benchmark_exchange_place(c: &mut Criterion) {
    c.bench_function("exchange_place_no_cross", |b| {
        let catalog = Arc::new(StaticCatalog::new().with_asset(spec()));
        let exchange = Exchange::new(catalog);
        let mut price = 1_000_000i64;

        b.iter(|| {
            // Descending non-crossing bids: validation, channel round trip,
            // rest in the book
            price -= 1;
            black_box(
                exchange
                    .place_order(
                        AssetId::new("PROP-001"),
                        OwnerId::new("benchmark_user"),
                        Side::Buy,
                        Decimal::from(price),
                        Decimal::ONE,
                    )
                    .unwrap(),
            );
        });
    });
}

criterion_group!(
    benches,
    benchmark_crossing_submit,
    benchmark_no_cross_submit,
    benchmark_depth_snapshot,
    benchmark_exchange_place,
);
criterion_main!(benches);
