use criterion::{BenchmarkId, Criterion, Throughput, black_box, criterion_group, criterion_main};

use percol_core::{GraphEngine, NodeId};

/// (nodes, edge budget) tiers, the largest matching the integration
/// tests' stress scale.
const TIERS: &[(usize, usize)] = &[(200, 2_000), (2_000, 20_000)];

fn bench_generate(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine.generate");
    for &(nodes, edges) in TIERS {
        group.throughput(Throughput::Elements(edges as u64));
        group.bench_with_input(
            BenchmarkId::from_parameter(format!("{nodes}n_{edges}e")),
            &(nodes, edges),
            |b, &(nodes, edges)| {
                b.iter(|| {
                    black_box(
                        GraphEngine::generate_with_seed(nodes, edges, 3.0, 0xBEEF)
                            .expect("generate"),
                    )
                });
            },
        );
    }
    group.finish();
}

fn bench_mutation_cycle(c: &mut Criterion) {
    let mut group = c.benchmark_group("engine.mutate");
    let base = GraphEngine::generate_with_seed(2_000, 20_000, 3.0, 0xBEEF).expect("generate");

    group.bench_function("add_dynamic_500n_5000e", |b| {
        b.iter_batched(
            || base.clone(),
            |mut engine| black_box(engine.add_dynamic(500, 5_000)),
            criterion::BatchSize::LargeInput,
        );
    });

    let victims: Vec<NodeId> = base
        .store()
        .nodes()
        .iter()
        .copied()
        .filter(|v| v % 10 == 0)
        .collect();
    group.bench_function("del_nodes_from_tenth", |b| {
        b.iter_batched(
            || base.clone(),
            |mut engine| black_box(engine.del_nodes_from(&victims)),
            criterion::BatchSize::LargeInput,
        );
    });

    group.finish();
}

criterion_group!(benches, bench_generate, bench_mutation_cycle);
criterion_main!(benches);
