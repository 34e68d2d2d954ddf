//! Index maintenance benchmarks.
//!
//! Measures how entity registration, component churn and removal scale with
//! the number of registered filters, and compares an indexed filter lookup
//! against a brute-force scan of the same entity set.
//!
//! Run with: `cargo bench --bench index_benchmarks`

use criterion::{black_box, criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion};

use prefab_ecs::prelude::*;

// ---------------------------------------------------------------------------
// Benchmark component types
// ---------------------------------------------------------------------------

macro_rules! marker_components {
    ($($ty:ident),*) => {
        $(
            #[derive(Debug, Clone)]
            struct $ty;
            impl Component for $ty {
                const KIND: ComponentKind = ComponentKind::new(stringify!($ty));
            }
        )*
    };
}

marker_components!(Transform, Camera, Quad, Label, Collider, Button);

const KINDS: [ComponentKind; 6] = [
    Transform::KIND,
    Camera::KIND,
    Quad::KIND,
    Label::KIND,
    Collider::KIND,
    Button::KIND,
];

// ---------------------------------------------------------------------------
// Helpers
// ---------------------------------------------------------------------------

fn new_manager() -> EntityManager {
    let mut manager = EntityManager::new();
    manager.register_component::<Transform>().unwrap();
    manager.register_component::<Camera>().unwrap();
    manager.register_component::<Quad>().unwrap();
    manager.register_component::<Label>().unwrap();
    manager.register_component::<Collider>().unwrap();
    manager.register_component::<Button>().unwrap();
    manager
}

/// Register `count` distinct component-set filters (every non-empty subset
/// of the kinds, cycling).
fn register_filters(manager: &mut EntityManager, count: usize) {
    for mask in (1u32..64).cycle().take(count) {
        let kinds: Vec<ComponentKind> = KINDS
            .iter()
            .enumerate()
            .filter(|(i, _)| mask & (1 << i) != 0)
            .map(|(_, k)| *k)
            .collect();
        manager.acquire_filter(&kinds);
    }
}

fn ui_entity(i: usize) -> Entity {
    let mut e = Entity::new(format!("widget{i}"))
        .with_component(Transform)
        .with_component(Quad);
    if i % 2 == 0 {
        e.add_component(Label);
    }
    if i % 5 == 0 {
        e.add_component(Button);
    }
    e
}

fn populated(entity_count: usize, filter_count: usize) -> (EntityManager, Vec<EntityId>) {
    let mut manager = new_manager();
    register_filters(&mut manager, filter_count);
    let ids = (0..entity_count)
        .map(|i| manager.add_entity(ui_entity(i)).unwrap())
        .collect();
    (manager, ids)
}

// ---------------------------------------------------------------------------
// Benchmarks
// ---------------------------------------------------------------------------

fn bench_add_entity_vs_filters(c: &mut Criterion) {
    let mut group = c.benchmark_group("add_entity_vs_filter_count");

    for &filters in &[0usize, 4, 16, 63] {
        group.bench_with_input(BenchmarkId::from_parameter(filters), &filters, |b, &filters| {
            b.iter_batched(
                || {
                    let mut manager = new_manager();
                    register_filters(&mut manager, filters);
                    manager
                },
                |mut manager| {
                    for i in 0..1_000 {
                        black_box(manager.add_entity(ui_entity(i)).unwrap());
                    }
                    manager
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_component_churn(c: &mut Criterion) {
    let mut group = c.benchmark_group("component_churn_vs_filter_count");

    for &filters in &[4usize, 16, 63] {
        let (mut manager, ids) = populated(1_000, filters);
        group.bench_with_input(BenchmarkId::from_parameter(filters), &filters, |b, _| {
            b.iter(|| {
                for id in ids.iter().take(100) {
                    manager.add_component(*id, Collider).unwrap();
                    black_box(manager.remove_component(*id, Collider::KIND));
                }
            });
        });
    }

    group.finish();
}

fn bench_remove_entity(c: &mut Criterion) {
    let mut group = c.benchmark_group("remove_entity_vs_filter_count");

    for &filters in &[4usize, 63] {
        group.bench_with_input(BenchmarkId::from_parameter(filters), &filters, |b, &filters| {
            b.iter_batched(
                || populated(1_000, filters),
                |(mut manager, ids)| {
                    for id in ids {
                        black_box(manager.remove_entity(id));
                    }
                    manager
                },
                BatchSize::SmallInput,
            );
        });
    }

    group.finish();
}

fn bench_indexed_vs_scan(c: &mut Criterion) {
    let (mut manager, _) = populated(10_000, 16);
    let kinds = [Label::KIND, Button::KIND];
    manager.acquire_filter(&kinds);

    c.bench_function("query_indexed_10k", |b| {
        b.iter(|| black_box(manager.get_all_using_components(&kinds)));
    });

    c.bench_function("query_scan_10k", |b| {
        b.iter(|| {
            let hits: Vec<EntityId> = manager
                .entities()
                .filter(|(_, e)| kinds.iter().all(|k| e.has_component(*k)))
                .map(|(id, _)| id)
                .collect();
            black_box(hits)
        });
    });
}

// ---------------------------------------------------------------------------
// Criterion groups and main
// ---------------------------------------------------------------------------

criterion_group!(
    benches,
    bench_add_entity_vs_filters,
    bench_component_churn,
    bench_remove_entity,
    bench_indexed_vs_scan,
);
criterion_main!(benches);
