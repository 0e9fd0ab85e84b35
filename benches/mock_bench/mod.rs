use criterion::Criterion;

mod cycle;
mod mark;

pub fn bench(c: &mut Criterion) {
    // Allow running a single benchmark: GENCOORD_BENCH=mark cargo bench --features mock_test
    match std::env::var("GENCOORD_BENCH").as_deref() {
        Ok("mark") => mark::bench(c),
        Ok("cycle") => cycle::bench(c),
        Ok(name) => panic!("Unknown benchmark {:?}", name),
        Err(_) => {
            mark::bench(c);
            cycle::bench(c);
        }
    }
}
