use criterion::{black_box, criterion_group, criterion_main, Criterion};
use dashmap::DashMap;
use tokio::runtime::Runtime;

use agent_governance_bus::strategy::{CompositeStrategy, ProcessingStrategy, StaticProcessingStrategy};
use agent_governance_bus::types::AgentMessage;

fn clean_message() -> AgentMessage {
    let mut msg = AgentMessage::new("agent-a", "agent-b", "tenant-a");
    msg.content.insert("body".to_string(), "please review this PR".to_string());
    msg
}

fn bench_static_strategy(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    let strategy = StaticProcessingStrategy::new(true);
    let handlers = DashMap::new();

    c.bench_function("static_strategy_process", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut message = clean_message();
                black_box(strategy.process(&mut message, &handlers).await)
            })
        })
    });
}

fn bench_composite_fallback(c: &mut Criterion) {
    let rt = Runtime::new().unwrap();
    // The terminal static-hash strategy alone is enough to exercise the
    // ordered-fallback loop's per-child availability check without needing
    // a live OPA/policy endpoint.
    let composite = CompositeStrategy::new(vec![Box::new(StaticProcessingStrategy::new(true))]);
    let handlers = DashMap::new();

    c.bench_function("composite_strategy_validate_only", |b| {
        b.iter(|| {
            rt.block_on(async {
                let message = clean_message();
                black_box(composite.validate_only(&message).await)
            })
        })
    });

    c.bench_function("composite_strategy_process", |b| {
        b.iter(|| {
            rt.block_on(async {
                let mut message = clean_message();
                black_box(composite.process(&mut message, &handlers).await)
            })
        })
    });
}

criterion_group!(benches, bench_static_strategy, bench_composite_fallback);
criterion_main!(benches);
