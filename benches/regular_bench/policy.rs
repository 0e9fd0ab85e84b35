use std::hint::black_box;

use criterion::Criterion;

use gencoord::{CollectorPolicy, DegenPoint};

pub fn bench(c: &mut Criterion) {
    let policy = CollectorPolicy::new(true);

    c.bench_function("policy - record young success", |b| {
        b.iter(|| policy.record_success_concurrent(black_box(true), black_box(false)))
    });

    c.bench_function("policy - record degenerated", |b| {
        b.iter(|| {
            policy.record_alloc_failure_to_degenerated(black_box(DegenPoint::Mark));
            policy.record_success_degenerated(true, false);
        })
    });

    // Readers poll the full GC count while the control thread records cycles.
    c.bench_function("policy - full gc count", |b| {
        b.iter(|| black_box(policy.get_fullgc_count()))
    });
}
