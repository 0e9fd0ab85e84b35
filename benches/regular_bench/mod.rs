use criterion::Criterion;

mod policy;

pub fn bench(c: &mut Criterion) {
    policy::bench(c);
}
