// Copyright 2026 Layne Penney
// SPDX-License-Identifier: AGPL-3.0-or-later

//! Benchmarks for attribute serialization and the intercept path.
//!
//! Run with: `cargo bench --bench serializer`

use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use serde::Serialize;
use std::collections::BTreeMap;
use std::hint::black_box;
use std::sync::Arc;

use endpoint_tracer::{
    AttributeSerializer, CallIdentity, InMemoryInstrumenter, Interceptor, NoopInstrumenter,
    SerializerLimits,
};

#[derive(Serialize)]
struct Order {
    id: u64,
    customer: String,
    lines: Vec<OrderLine>,
    tags: BTreeMap<String, String>,
}

#[derive(Serialize)]
struct OrderLine {
    sku: String,
    quantity: u32,
    unit_price: f64,
}

fn order(lines: usize) -> Order {
    Order {
        id: 1001,
        customer: "Alice".to_string(),
        lines: (0..lines)
            .map(|i| OrderLine {
                sku: format!("SKU-{i:05}"),
                quantity: (i % 7) as u32 + 1,
                unit_price: 9.99 + i as f64,
            })
            .collect(),
        tags: (0..4)
            .map(|i| (format!("tag{i}"), "value".to_string()))
            .collect(),
    }
}

/// Serialization cost by payload size, including truncation.
fn bench_serialize(c: &mut Criterion) {
    let serializer = AttributeSerializer::default();

    let mut group = c.benchmark_group("serialize");
    for lines in [1usize, 16, 256] {
        let value = order(lines);
        group.throughput(Throughput::Elements(lines as u64));
        group.bench_with_input(BenchmarkId::new("order", lines), &value, |b, value| {
            b.iter(|| serializer.serialize(black_box(value)));
        });
    }

    let tight = AttributeSerializer::new(SerializerLimits {
        max_depth: 2,
        max_items: 8,
        max_string_len: 16,
        max_output_len: 256,
    });
    let large = order(256);
    group.bench_function("order_tight_limits", |b| {
        b.iter(|| tight.serialize(black_box(&large)));
    });

    group.finish();
}

/// Overhead of one intercepted call per backend.
fn bench_intercept(c: &mut Criterion) {
    let identity = CallIdentity::new("fr.example.OrderService", "placeOrder", "(long,int)");

    let mut group = c.benchmark_group("intercept");
    group.throughput(Throughput::Elements(1));

    let inert = Interceptor::new(Arc::new(NoopInstrumenter));
    group.bench_function("noop_backend", |b| {
        b.iter(|| inert.intercept(&identity, black_box(&(1001u64, 3u32)), || 42u64));
    });

    let backend = Arc::new(InMemoryInstrumenter::new());
    let recording = Interceptor::new(backend.clone());
    group.bench_function("in_memory_backend", |b| {
        b.iter(|| {
            let value = recording.intercept(&identity, black_box(&(1001u64, 3u32)), || 42u64);
            backend.reset();
            value
        });
    });

    group.finish();
}

criterion_group!(benches, bench_serialize, bench_intercept);
criterion_main!(benches);
