use criterion::{criterion_group, criterion_main, BenchmarkId, Criterion, Throughput};
use ibg_advisor::ibg::{build, fix, IbgAnalyzer, IndexId, IndexSet, InteractionBank};
use ibg_advisor::{AdvisorConfig, PlanTableOracle, WorkloadRunner};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::hint::black_box;
use std::sync::Arc;
use std::time::Duration;

fn plan_table(rng: &mut StdRng, width: u32, plans: usize) -> PlanTableOracle {
    (0..plans).fold(PlanTableOracle::new(10_000.0), |oracle, _| {
        let size = rng.random_range(1..=4.min(width));
        let ids: Vec<IndexId> = (0..size).map(|_| rng.random_range(0..width)).collect();
        oracle.with_plan(ids, rng.random_range(100..10_000) as f64)
    })
}

fn bench_construction(c: &mut Criterion) {
    let mut group = c.benchmark_group("ibg_construction");
    group.measurement_time(Duration::from_secs(5));

    for width in [4u32, 8, 12].iter() {
        let mut rng = StdRng::seed_from_u64(42);
        let oracle = plan_table(&mut rng, *width, 24);
        let candidates = IndexSet::from_ids(0..*width);
        let nodes = build(0, candidates.clone(), oracle.clone(), true)
            .unwrap()
            .node_count();
        group.throughput(Throughput::Elements(nodes as u64));

        for covering in [true, false] {
            let name = if covering { "covering" } else { "oracle_only" };
            group.bench_with_input(BenchmarkId::new(name, width), width, |b, _| {
                b.iter(|| {
                    let graph = build(0, candidates.clone(), oracle.clone(), covering).unwrap();
                    black_box(graph.node_count())
                });
            });
        }
    }

    group.finish();
}

fn bench_analysis(c: &mut Criterion) {
    let mut group = c.benchmark_group("ibg_analysis");

    for width in [4u32, 8, 12].iter() {
        let mut rng = StdRng::seed_from_u64(7);
        let candidates = IndexSet::from_ids(0..*width);
        let graph = Arc::new(build(0, candidates.clone(), plan_table(&mut rng, *width, 24), true).unwrap());

        group.bench_with_input(BenchmarkId::new("analyze", width), width, |b, _| {
            b.iter(|| {
                let bank = InteractionBank::new(candidates.clone());
                IbgAnalyzer::new(Arc::clone(&graph)).analyze(&bank).unwrap();
                black_box(bank.len())
            });
        });

        group.bench_with_input(BenchmarkId::new("fix", width), width, |b, _| {
            b.iter(|| {
                let mut graph = build(0, candidates.clone(), plan_table(&mut StdRng::seed_from_u64(7), *width, 24), true).unwrap();
                black_box(fix(&mut graph).unwrap())
            });
        });
    }

    group.finish();
}

fn bench_workload(c: &mut Criterion) {
    let mut group = c.benchmark_group("workload");
    group.sample_size(20);

    let mut rng = StdRng::seed_from_u64(1);
    let candidates = IndexSet::from_ids(0..8);
    let tables: Vec<_> = (0..16).map(|_| plan_table(&mut rng, 8, 16)).collect();

    for concurrent in [true, false] {
        let name = if concurrent { "concurrent" } else { "sequential" };
        let config = AdvisorConfig {
            concurrent_analysis: concurrent,
            ..AdvisorConfig::default()
        };
        group.bench_function(name, |b| {
            b.iter(|| {
                let bank = InteractionBank::new(candidates.clone());
                let inputs = tables.iter().map(|t| (candidates.clone(), t.clone())).collect();
                WorkloadRunner::new(config.clone()).run(inputs, &bank).unwrap();
                black_box(bank.stable_partition(0.01))
            });
        });
    }

    group.finish();
}

criterion_group!(benches, bench_construction, bench_analysis, bench_workload);
criterion_main!(benches);
