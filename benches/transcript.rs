use criterion::{Criterion, criterion_group, criterion_main};
use serde_json::{Value, json};
use std::hint::black_box;

use relayrs::ContextWindowBuilder;

fn bench_context_window(c: &mut Criterion) {
    let mut group = c.benchmark_group("context_window");

    let records: Vec<Value> = (0..50)
        .rev()
        .map(|n| {
            json!({
                "id": n,
                "started_at": format!("2026-08-01T10:{:02}:00Z", n % 60),
                "input_data": {"prompt": format!("question {n}")},
                "output_data": {"text": format!("answer {n}")},
            })
        })
        .collect();
    let wrapped = json!({"activations": records});

    group.bench_function("build_default_window", |b| {
        let builder = ContextWindowBuilder::new();
        b.iter(|| builder.build(black_box(&wrapped), Some("question 49")));
    });

    group.bench_function("build_wide_window", |b| {
        let builder = ContextWindowBuilder::new()
            .with_max_messages(50)
            .with_max_lines(100);
        b.iter(|| builder.build(black_box(&wrapped), Some("question 49")));
    });

    group.bench_function("build_from_error_string", |b| {
        let builder = ContextWindowBuilder::new();
        let raw = json!("Error: Unable to retrieve activations");
        b.iter(|| builder.build(black_box(&raw), None));
    });

    group.finish();
}

criterion_group!(benches, bench_context_window);
criterion_main!(benches);
