//! Benchmarks for the tier scheduler.
//!
//! Benchmarks cover:
//! - Classification throughput
//! - Backfill runs, sequential and parallel
//! - Batch issuance against a classified population
//! - Dispatching a batch through an async executor

use criterion::{criterion_group, criterion_main, BatchSize, BenchmarkId, Criterion, Throughput};
use std::hint::black_box;
use std::sync::Arc;

use async_trait::async_trait;
use chrono::{DateTime, TimeZone, Utc};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use tokio::runtime::Runtime;

use prometheus_tier_scheduler::builders::{Engine, EngineBuilder};
use prometheus_tier_scheduler::config::{AuthorizationLevel, EngineConfig};
use prometheus_tier_scheduler::core::{BackfillMode, BatchTicket, Classifier, EconomicAttributes, Entity};
use prometheus_tier_scheduler::infra::{InMemoryEntityStore, InMemoryNotificationSink};
use prometheus_tier_scheduler::runtime::{dispatch_batch, OutreachExecutor, OutreachOutcome};
use prometheus_tier_scheduler::util::money::Cents;

// ============================================================================
// Helpers
// ============================================================================

fn bench_now() -> DateTime<Utc> {
    Utc.with_ymd_and_hms(2024, 6, 3, 10, 0, 0).single().unwrap_or_else(Utc::now)
}

fn random_population(size: u64, seed: u64) -> Vec<Entity> {
    let mut rng = StdRng::seed_from_u64(seed);
    (1..=size)
        .map(|id| {
            let attrs = EconomicAttributes {
                primary_amount: Cents::from_dollars(rng.random_range(1_000..120_000)),
                secondary_value: Cents::from_dollars(rng.random_range(0..30_000)),
                urgency_deadline: None,
                has_phone: rng.random_bool(0.8),
                has_email: rng.random_bool(0.6),
                cross_referenced: rng.random_bool(0.1),
            };
            Entity::new(id, attrs)
        })
        .collect()
}

fn bench_config(target: u32, workers: usize) -> EngineConfig {
    let mut cfg = EngineConfig {
        daily_capacity_target: target,
        authorization_level: AuthorizationLevel::Full,
        ..EngineConfig::default()
    };
    cfg.backfill.workers = workers;
    cfg.backfill.max_entities = usize::MAX;
    cfg
}

fn classified_engine(size: u64, target: u32) -> Engine {
    let engine = EngineBuilder::new(bench_config(target, 0))
        .with_entity_store(Arc::new(InMemoryEntityStore::with_entities(random_population(size, 7))))
        .with_notifier(Arc::new(InMemoryNotificationSink::default()))
        .build()
        .unwrap();
    engine.backfill.run(BackfillMode::Unclassified, bench_now()).unwrap();
    engine
}

struct InstantExecutor;

#[async_trait]
impl OutreachExecutor for InstantExecutor {
    async fn contact(&self, _ticket: &BatchTicket) -> OutreachOutcome {
        OutreachOutcome::Delivered { at: bench_now() }
    }
}

// ============================================================================
// Classification
// ============================================================================

fn bench_classify(c: &mut Criterion) {
    let mut group = c.benchmark_group("classify");
    let classifier = Classifier::default();
    let day = bench_now().date_naive();

    for size in [100_u64, 1_000, 10_000] {
        let population = random_population(size, 1);
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::from_parameter(size), &population, |b, population| {
            b.iter(|| {
                for entity in population {
                    black_box(classifier.classify(&entity.attributes, day));
                }
            });
        });
    }
    group.finish();
}

// ============================================================================
// Backfill
// ============================================================================

fn bench_backfill(c: &mut Criterion) {
    let mut group = c.benchmark_group("backfill");
    group.sample_size(20);

    for workers in [1_usize, 4] {
        let size = 5_000_u64;
        group.throughput(Throughput::Elements(size));
        group.bench_with_input(BenchmarkId::new("workers", workers), &workers, |b, &workers| {
            b.iter_batched(
                || {
                    EngineBuilder::new(bench_config(50, workers))
                        .with_entity_store(Arc::new(InMemoryEntityStore::with_entities(random_population(size, 3))))
                        .with_notifier(Arc::new(InMemoryNotificationSink::default()))
                        .build()
                        .unwrap()
                },
                |engine| black_box(engine.backfill.run(BackfillMode::Unclassified, bench_now()).unwrap()),
                BatchSize::LargeInput,
            );
        });
    }
    group.finish();
}

// ============================================================================
// Batch issuance
// ============================================================================

fn bench_get_next_batch(c: &mut Criterion) {
    let mut group = c.benchmark_group("get_next_batch");

    for size in [1_000_u64, 10_000] {
        let engine = classified_engine(size, 10_000);
        group.bench_with_input(BenchmarkId::from_parameter(size), &engine, |b, engine| {
            b.iter(|| {
                let batch = engine.orchestrator.get_next_batch(25, bench_now()).unwrap();
                for ticket in &batch.tickets {
                    engine.orchestrator.release(ticket.ticket_id, bench_now()).unwrap();
                }
                black_box(batch)
            });
        });
    }
    group.finish();
}

fn bench_dispatch(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let mut group = c.benchmark_group("dispatch");

    group.bench_function("dispatch_25", |b| {
        b.to_async(&rt).iter_batched(
            || {
                let engine = classified_engine(1_000, 100);
                let batch = engine.orchestrator.get_next_batch(25, bench_now()).unwrap();
                (engine, batch)
            },
            |(engine, batch)| async move {
                black_box(dispatch_batch(&engine.orchestrator, &InstantExecutor, &batch).await)
            },
            BatchSize::LargeInput,
        );
    });
    group.finish();
}

criterion_group!(benches, bench_classify, bench_backfill, bench_get_next_batch, bench_dispatch);
criterion_main!(benches);
