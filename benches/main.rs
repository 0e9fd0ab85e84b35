use criterion::criterion_group;
use criterion::criterion_main;
use criterion::Criterion;

#[cfg(feature = "mock_test")]
pub mod mock_bench;

#[cfg(not(feature = "mock_test"))]
pub mod regular_bench;

pub fn bench_main(c: &mut Criterion) {
    cfg_if::cfg_if! {
        if #[cfg(feature = "mock_test")] {
            // The mock heap is only available with the "mock_test" feature.
            mock_bench::bench(c);
        } else {
            eprintln!("Only running benchmarks that do not need a heap.");
            eprintln!("  Rerun with `cargo bench --features mock_test` to run the marking benchmarks.");
            regular_bench::bench(c);
        }
    }
}

criterion_group!(benches, bench_main);
criterion_main!(benches);
