//! Record-path latency. The trace is meant to stay enabled in production,
//! so a record must cost no more than a handful of byte stores.

use criterion::{black_box, criterion_group, criterion_main, Criterion};

use crashguard_core::trace::{split_u32, TraceBuffer};

fn bench_record(c: &mut Criterion) {
    let mut group = c.benchmark_group("trace_record");

    group.bench_function("no_args", |b| {
        let mut t: TraceBuffer<1008> = TraceBuffer::new();
        b.iter(|| t.record(black_box(0x42), &[]));
    });

    group.bench_function("two_args", |b| {
        let mut t: TraceBuffer<1008> = TraceBuffer::new();
        b.iter(|| t.record(black_box(0x42), black_box(&[0xAB, 0xCD])));
    });

    group.bench_function("four_args", |b| {
        let mut t: TraceBuffer<1008> = TraceBuffer::new();
        let args = split_u32(0xDEAD_BEEF);
        b.iter(|| t.record(black_box(0x42), black_box(&args)));
    });

    group.finish();
}

fn bench_image_refresh(c: &mut Criterion) {
    c.bench_function("trace_image_refresh", |b| {
        let mut t: TraceBuffer<1008> = TraceBuffer::new();
        t.record(1, &[2, 3]);
        b.iter(|| black_box(t.image()[0]));
    });
}

criterion_group!(benches, bench_record, bench_image_refresh);
criterion_main!(benches);
