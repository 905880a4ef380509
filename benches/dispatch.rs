//! Dispatch benchmark suite.
//!
//! Measures the hot paths between the socket and the subscribers:
//! - socket.io frame decoding
//! - variable cache merges
//! - push fan-out to 1, 10 and 100 subscribers over the loopback transport
//! - rule action template expansion
//!
//! Run with: cargo bench --bench dispatch
//! Results saved to: target/criterion/

use std::hint::black_box;

use criterion::{BenchmarkId, Criterion, criterion_group, criterion_main};
use serde_json::json;
use tokio::runtime::Runtime;

use pimatic_bridge::controller::VariableCache;
use pimatic_bridge::protocol::EnginePacket;
use pimatic_bridge::protocol::event::{VARIABLE_VALUE_CHANGED, VARIABLES};
use pimatic_bridge::template::expand;
use pimatic_bridge::{Controller, MemoryTransport, Subscriber};

// ============================================================================
// Benchmark Parameters
// ============================================================================

const SUBSCRIBER_COUNTS: &[usize] = &[1, 10, 100];
const PUSHES_PER_ITERATION: usize = 100;

// ============================================================================
// Benchmark: Frame Decoding
// ============================================================================

fn bench_decode(c: &mut Criterion) {
    let frame = r#"42["variableValueChanged",{"variableName":"temperature","variableValue":21.5}]"#;
    let sync = format!(
        "42[\"variables\",{}]",
        json!((0..50)
            .map(|i| json!({"name": format!("var{i}"), "value": i, "unit": "W", "type": "value"}))
            .collect::<Vec<_>>())
    );

    let mut group = c.benchmark_group("decode");
    group.bench_function("value_changed", |b| {
        b.iter(|| EnginePacket::decode(black_box(frame)));
    });
    group.bench_function("variables_50", |b| {
        b.iter(|| EnginePacket::decode(black_box(&sync)));
    });
    group.finish();
}

// ============================================================================
// Benchmark: Cache Merge
// ============================================================================

fn bench_cache(c: &mut Criterion) {
    let mut cache = VariableCache::new();
    let mut value = 0_u64;

    c.bench_function("cache_merge_push", |b| {
        b.iter(|| {
            value += 1;
            cache.merge_push(black_box("temperature"), json!(value))
        });
    });
}

// ============================================================================
// Benchmark: Push Fan-out
// ============================================================================

fn bench_fan_out(c: &mut Criterion) {
    let rt = Runtime::new().expect("Failed to create runtime");

    let mut group = c.benchmark_group("fan_out");
    group.sample_size(20);

    for &count in SUBSCRIBER_COUNTS {
        group.bench_with_input(
            BenchmarkId::new("subscribers", count),
            &count,
            |b, &subscriber_count| {
                b.to_async(&rt)
                    .iter(|| async move { fan_out(subscriber_count).await });
            },
        );
    }

    group.finish();
}

/// Delivers a batch of pushes to every subscriber and waits for all of them.
async fn fan_out(subscriber_count: usize) -> usize {
    let transport = MemoryTransport::new();
    let controller = Controller::builder()
        .transport(transport.clone())
        .build()
        .expect("Failed to build controller");

    let mut receivers = Vec::with_capacity(subscriber_count);
    let mut subscribers = Vec::with_capacity(subscriber_count);
    for _ in 0..subscriber_count {
        let (subscriber, rx) = Subscriber::channel();
        controller.register_variable("power", &subscriber);
        subscribers.push(subscriber);
        receivers.push(rx);
    }

    transport.connect();
    transport.inject(VARIABLES, json!([{"name": "power", "value": 0}]));
    for i in 0..PUSHES_PER_ITERATION {
        transport.inject(
            VARIABLE_VALUE_CHANGED,
            json!({"variableName": "power", "variableValue": i}),
        );
    }

    let mut received = 0;
    for rx in &mut receivers {
        // Connected, the sync record, then every push.
        for _ in 0..PUSHES_PER_ITERATION + 2 {
            if rx.recv().await.is_some() {
                received += 1;
            }
        }
    }

    controller.close();
    received
}

// ============================================================================
// Benchmark: Template Expansion
// ============================================================================

fn bench_template(c: &mut Criterion) {
    let input = json!({
        "payload": {"state": "on", "level": 40},
        "room": {"light": "lamp1"},
    });

    c.bench_function("template_expand", |b| {
        b.iter(|| {
            expand(
                black_box("dim ${room.light} to ${payload.level} and switch ${payload.state}"),
                &input,
            )
        });
    });
}

criterion_group!(benches, bench_decode, bench_cache, bench_template, bench_fan_out);
criterion_main!(benches);
