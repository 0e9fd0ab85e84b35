use std::sync::Arc;

use criterion::Criterion;

use gencoord::plan::GCCause;
use gencoord::util::test_util::mock_heap::{MockHeap, MockHeapBuilder};
use gencoord::vm::RegionAffiliation;
use gencoord::{CycleController, CycleOutcome, GenerationType, ObjectReference, Options};

/// Young lists hanging off old objects: every young cycle marks the lists and every old cycle
/// marks the old objects.
fn heap() -> (Arc<MockHeap>, Vec<ObjectReference>) {
    let mut b = MockHeapBuilder::new();
    let young = b.region(RegionAffiliation::Young);
    let old = b.region(RegionAffiliation::Old);
    let mut heads = vec![];
    for _ in 0..256 {
        let head = b.object(young, 2);
        let holder = b.object(old, 1);
        b.link(head, 1, holder);
        let mut prev = head;
        for _ in 0..64 {
            let next = b.object(young, 2);
            b.link(prev, 0, next);
            prev = next;
        }
        heads.push(head);
    }
    let heap = Arc::new(b.build());
    let roots = heads.iter().map(|id| heap.object(*id)).collect();
    (heap, roots)
}

pub fn bench(c: &mut Criterion) {
    let (heap, roots) = heap();
    let options = Options {
        threads: 2,
        ..Options::default()
    };
    let controller = CycleController::new(heap, options, true, 1 << 20);

    c.bench_function("cycle - young", |b| {
        b.iter(|| {
            let outcome = controller.run_cycle(GenerationType::Young, GCCause::Heuristics, &roots);
            assert_eq!(outcome, CycleOutcome::Concurrent { abbreviated: false });
        })
    });

    // Bootstrap and old marking back to back.
    c.bench_function("cycle - old", |b| {
        b.iter(|| {
            let outcome = controller.run_cycle(GenerationType::Old, GCCause::Heuristics, &roots);
            assert_eq!(outcome, CycleOutcome::OldMarked);
        })
    });
}
