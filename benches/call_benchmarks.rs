//! Benchmarks for adapter invocation and collection.
//!
//! - Primitive calls: conversion overhead with no representatives involved
//! - Object calls: identity lookup, adoption and copying on the return slot
//! - Collection: finalizing and releasing batches of adopted objects
//!
//! ```bash
//! cargo bench --bench call_benchmarks
//! ```

use criterion::{BatchSize, Criterion, Throughput, criterion_group, criterion_main};
use std::hint::black_box;
use tether::{Bridge, CallAdapter};
use tether_core::{HostValue, OwnershipPolicy, PrimitiveKind, Signature, Slot, SlotType, TypeHash};

const INT: SlotType = SlotType::Primitive(PrimitiveKind::Int32);

#[derive(Debug, Clone)]
struct Particle {
    x: f64,
    y: f64,
}

fn setup() -> (Bridge, TypeHash) {
    let mut bridge = Bridge::new();
    let particle = bridge
        .register_type::<Particle>("Particle")
        .duplicable()
        .build()
        .expect("register Particle");
    (bridge, particle)
}

fn make_particle(bridge: &mut Bridge, particle: TypeHash) -> CallAdapter {
    bridge
        .bind(
            CallAdapter::builder("make_particle", Signature::function([], SlotType::Object(particle)))
                .policy(OwnershipPolicy::Adopted(Slot::Return))
                .native(|call| {
                    let addr = call.allocate(Particle { x: 0.0, y: 1.0 })?;
                    call.set_return_object(Some(addr));
                    Ok(())
                }),
        )
        .expect("bind make_particle")
}

fn primitive_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("primitive");
    let (mut bridge, _) = setup();
    let add = bridge
        .bind(
            CallAdapter::builder("add", Signature::function([INT, INT], INT)).native(|call| {
                let sum = call.arg::<i32>(0)?.wrapping_add(call.arg::<i32>(1)?);
                call.set_return(sum);
                Ok(())
            }),
        )
        .expect("bind add");
    let args = [HostValue::Int(20), HostValue::Int(22)];

    group.throughput(Throughput::Elements(1));
    group.bench_function("add_i32", |b| {
        b.iter(|| black_box(add.invoke(&mut bridge, black_box(&args))))
    });
    group.finish();
}

fn object_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("object");
    let (mut bridge, particle) = setup();
    let shared = bridge.allocate(Particle { x: 3.0, y: 4.0 }).expect("allocate");

    let peek = bridge
        .bind(
            CallAdapter::builder("peek", Signature::function([], SlotType::Object(particle))).native(
                move |call| {
                    call.set_return_object(Some(shared));
                    Ok(())
                },
            ),
        )
        .expect("bind peek");
    let rooted = peek.invoke(&mut bridge, &[]).expect("peek");
    bridge.host_mut().set_global("shared", rooted[0].clone());

    group.bench_function("borrowed_return_reused", |b| {
        b.iter(|| black_box(peek.invoke(&mut bridge, &[])))
    });

    let length = bridge
        .bind(
            CallAdapter::builder(
                "Particle::length",
                Signature::method(particle, [], SlotType::Primitive(PrimitiveKind::Double)),
            )
            .native(|call| {
                let p = call.this::<Particle>()?;
                let length = (p.x * p.x + p.y * p.y).sqrt();
                call.set_return(length);
                Ok(())
            }),
        )
        .expect("bind length");
    group.bench_function("method_on_receiver", |b| {
        b.iter(|| black_box(length.invoke(&mut bridge, black_box(&rooted))))
    });

    let make = make_particle(&mut bridge, particle);
    group.bench_function("adopted_return_then_collect", |b| {
        b.iter(|| {
            black_box(make.invoke(&mut bridge, &[]).ok());
            bridge.collect_garbage();
        })
    });

    let copy = bridge
        .bind(
            CallAdapter::builder("copy", Signature::function([], SlotType::Object(particle)))
                .policy(OwnershipPolicy::Copied(Slot::Return))
                .native(move |call| {
                    call.set_return_object(Some(shared));
                    Ok(())
                }),
        )
        .expect("bind copy");
    group.bench_function("copied_return_then_collect", |b| {
        b.iter(|| {
            black_box(copy.invoke(&mut bridge, &[]).ok());
            bridge.collect_garbage();
        })
    });
    group.finish();
}

fn collection_benchmarks(c: &mut Criterion) {
    let mut group = c.benchmark_group("collection");
    for count in [100usize, 1_000] {
        group.throughput(Throughput::Elements(count as u64));
        group.bench_function(format!("release_{count}_adopted"), |b| {
            b.iter_batched(
                || {
                    let (mut bridge, particle) = setup();
                    let make = make_particle(&mut bridge, particle);
                    for _ in 0..count {
                        let _ = make.invoke(&mut bridge, &[]);
                    }
                    bridge
                },
                |mut bridge| black_box(bridge.collect_garbage()),
                BatchSize::SmallInput,
            )
        });
    }
    group.finish();
}

criterion_group!(
    benches,
    primitive_benchmarks,
    object_benchmarks,
    collection_benchmarks
);
criterion_main!(benches);
