use criterion::{BenchmarkId, Criterion};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

use gencoord::plan::{ConcurrentMark, GCState, Generation, MarkResult};
use gencoord::scheduler::WorkerGroup;
use gencoord::util::test_util::mock_heap::{MockHeap, MockHeapBuilder};
use gencoord::vm::{MarkingContext, RegionAffiliation};
use gencoord::{GenerationType, ObjectReference, Options};

const OBJECTS: usize = 1 << 16;

/// A random young object graph with a few long arrays.
fn heap() -> (MockHeap, Vec<ObjectReference>) {
    let mut rng = ChaCha8Rng::seed_from_u64(42);
    let mut b = MockHeapBuilder::new();
    let regions: Vec<usize> = (0..16).map(|_| b.region(RegionAffiliation::Young)).collect();
    let objects: Vec<(usize, usize)> = (0..OBJECTS)
        .map(|i| {
            let region = regions[i % regions.len()];
            if i % 1024 == 0 {
                (b.array(region, 4096), 4096)
            } else {
                let fields = rng.random_range(0..4);
                (b.object(region, fields), fields)
            }
        })
        .collect();
    for &(id, fields) in objects.iter() {
        for field in 0..fields {
            if rng.random_bool(0.5) {
                let (to, _) = objects[rng.random_range(0..objects.len())];
                b.link(id, field, to);
            }
        }
    }
    let heap = b.build();
    let roots = objects
        .iter()
        .step_by(512)
        .map(|(id, _)| heap.object(*id))
        .collect();
    (heap, roots)
}

pub fn bench(c: &mut Criterion) {
    let (heap, roots) = heap();
    let mut group = c.benchmark_group("mark");
    group.sample_size(20);
    for workers in [1, 2, 4] {
        let options = Options {
            threads: workers,
            ..Options::default()
        };
        let gc_state = GCState::default();
        gc_state.set_active_generation(Some(GenerationType::Young));
        let generation = Generation::new(GenerationType::Young, workers);
        let group_workers = WorkerGroup::new(workers);
        group.bench_with_input(BenchmarkId::from_parameter(workers), &workers, |b, _| {
            b.iter(|| {
                heap.reset(GenerationType::Young);
                let mark = ConcurrentMark::new(&heap, &gc_state, &generation, &options);
                mark.mark_roots(&group_workers, &roots);
                assert_eq!(mark.concurrent_mark(&group_workers), MarkResult::Completed);
                mark.finish_mark(&group_workers);
            })
        });
    }
    group.finish();
}
