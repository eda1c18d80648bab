//! 조정 계획 계산 벤치마크
//!
//! 어플라이언스에 규칙이 많이 쌓였을 때 plan() 비용을 측정합니다.

use criterion::{BenchmarkId, Criterion, black_box, criterion_group, criterion_main};
use portfwd_core::types::ForwardRule;
use portfwd_forwarding::plan;

fn actual_rules(count: usize) -> Vec<ForwardRule> {
    (0..count)
        .map(|i| {
            ForwardRule::new(
                format!("ns{}-pod{}", i % 20, i),
                format!("10.0.{}.{}", i / 250, i % 250),
                u16::try_from(20_000 + i % 40_000).unwrap_or(u16::MAX),
            )
        })
        .collect()
}

fn bench_plan(c: &mut Criterion) {
    let mut group = c.benchmark_group("plan");
    for count in [10usize, 100, 1000] {
        let actual = actual_rules(count);
        let desired = vec![
            ForwardRule::new("ns3-pod3", "10.0.0.99", 25565),
            ForwardRule::new("ns3-pod3", "10.0.0.99", 25575),
        ];
        group.bench_with_input(BenchmarkId::from_parameter(count), &actual, |b, actual| {
            b.iter(|| plan(black_box(&desired), black_box(actual)))
        });
    }
    group.finish();
}

criterion_group!(benches, bench_plan);
criterion_main!(benches);
