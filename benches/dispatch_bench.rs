use bridgenet::base::responsestate::ResponseState;
use bridgenet::dispatch::registry::DispatchRegistry;
use criterion::{black_box, criterion_group, criterion_main, BenchmarkId, Criterion};
use std::sync::Arc;

fn benchmark_register_resolve_remove(c: &mut Criterion) {
    let registry: DispatchRegistry<u64> = DispatchRegistry::new();
    let exchange = Arc::new(0u64);

    // One exchange lifetime as seen by the registry
    c.bench_function("registry_lifecycle", |b| {
        b.iter(|| {
            let seq = registry.next_sequence();
            registry.register(seq, &exchange).unwrap();
            black_box(registry.resolve(seq));
            registry.remove(seq)
        })
    });
}

fn benchmark_resolve_under_load(c: &mut Criterion) {
    let mut group = c.benchmark_group("registry_resolve");
    for in_flight in [16usize, 256, 4096] {
        let registry: DispatchRegistry<u64> = DispatchRegistry::new();
        let live: Vec<_> = (0..in_flight)
            .map(|i| {
                let exchange = Arc::new(i as u64);
                let seq = registry.next_sequence();
                registry.register(seq, &exchange).unwrap();
                (seq, exchange)
            })
            .collect();
        let probe = live[in_flight / 2].0;

        group.bench_with_input(BenchmarkId::from_parameter(in_flight), &probe, |b, &seq| {
            b.iter(|| black_box(registry.resolve(seq)))
        });
    }
    group.finish();
}

fn benchmark_state_transitions(c: &mut Criterion) {
    let path = [
        ResponseState::HeadersPending,
        ResponseState::HeadersReceived,
        ResponseState::BodyStreaming,
        ResponseState::Completed,
    ];
    c.bench_function("response_state_path", |b| {
        b.iter(|| {
            let mut state = ResponseState::Created;
            for next in path {
                if black_box(state).can_transition_to(next) {
                    state = next;
                }
            }
            state
        })
    });
}

criterion_group!(
    benches,
    benchmark_register_resolve_remove,
    benchmark_resolve_under_load,
    benchmark_state_transitions
);
criterion_main!(benches);
