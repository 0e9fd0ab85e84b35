use super::*;
use crate::plan::generation::Generation;
use crate::scheduler::MarkTask;
use crate::util::test_util::mock_heap::{MockHeap, MockHeapBuilder};
use crate::util::test_util::panic_after;
use crate::vm::{MarkingContext, RegionAffiliation, ReferenceType};
use rand::{Rng, SeedableRng};
use rand_chacha::ChaCha8Rng;

struct Fixture {
    heap: MockHeap,
    gc_state: GCState,
    generation: Generation,
    options: Options,
    workers: WorkerGroup,
}

impl Fixture {
    fn new(heap: MockHeap, generation: GenerationType, workers: usize) -> Self {
        let options = Options {
            threads: workers,
            mark_loop_stride: 16,
            array_chunk_size: 64,
            ..Options::default()
        };
        let gc_state = GCState::default();
        gc_state.set_active_generation(Some(generation));
        Fixture {
            heap,
            gc_state,
            generation: Generation::new(generation, workers),
            options,
            workers: WorkerGroup::new(workers),
        }
    }

    fn mark(&self) -> ConcurrentMark<'_, MockHeap> {
        ConcurrentMark::new(&self.heap, &self.gc_state, &self.generation, &self.options)
    }

    fn roots(&self, ids: &[usize]) -> Vec<ObjectReference> {
        ids.iter().map(|id| self.heap.object(*id)).collect()
    }

    /// Mark roots, mark concurrently and finish.
    fn run(&self, roots: &[usize]) -> MarkResult {
        let mark = self.mark();
        mark.mark_roots(&self.workers, &self.roots(roots));
        match mark.concurrent_mark(&self.workers) {
            MarkResult::Completed => mark.finish_mark(&self.workers),
            MarkResult::Cancelled => MarkResult::Cancelled,
        }
    }
}

/// A random heap: young and old regions, objects with up to four fields, some arrays.
fn random_heap(seed: u64, objects: usize) -> (MockHeap, Vec<usize>) {
    let mut rng = ChaCha8Rng::seed_from_u64(seed);
    let mut b = MockHeapBuilder::new();
    let regions: Vec<usize> = (0..6)
        .map(|i| {
            b.region(if i < 4 {
                RegionAffiliation::Young
            } else {
                RegionAffiliation::Old
            })
        })
        .collect();
    let mut sizes = vec![];
    for _ in 0..objects {
        let region = regions[rng.random_range(0..regions.len())];
        if rng.random_bool(0.05) {
            let len = rng.random_range(0..300);
            b.array(region, len);
            sizes.push(len);
        } else {
            let fields = rng.random_range(0..5);
            b.object(region, fields);
            sizes.push(fields);
        }
    }
    for (from, fields) in sizes.iter().enumerate() {
        for f in 0..*fields {
            if rng.random_bool(0.6) {
                b.link(from, f, rng.random_range(0..objects));
            }
        }
    }
    let roots = (0..8).map(|_| rng.random_range(0..objects)).collect();
    (b.build(), roots)
}

#[test]
fn chain_is_marked() {
    let mut b = MockHeapBuilder::new();
    let r = b.region(RegionAffiliation::Young);
    let ids: Vec<usize> = (0..10).map(|_| b.object(r, 1)).collect();
    for w in ids.windows(2) {
        b.link(w[0], 0, w[1]);
    }
    let unreachable = b.object(r, 0);
    let f = Fixture::new(b.build(), GenerationType::Young, 1);

    assert_eq!(f.run(&[ids[0]]), MarkResult::Completed);
    for id in ids.iter() {
        assert!(f.heap.is_marked_id(*id));
        assert_eq!(f.heap.scan_count(*id), 1);
    }
    assert!(!f.heap.is_marked_id(unreachable));
    // One mark loop for the concurrent phase, one for the final mark.
    assert_eq!(f.heap.rp().mark_closures(), 2);
}

#[test]
fn random_graphs_reach_the_fixed_point() {
    for workers in 1..=4 {
        for seed in 0..4 {
            let (heap, roots) = random_heap(seed, 2000);
            let f = Fixture::new(heap, GenerationType::GlobalGen, workers);
            let expected = f.heap.reachable(&roots, GenerationType::GlobalGen);

            let result = panic_after(20_000, move || {
                let r = f.run(&roots);
                (r, f)
            });
            let (result, f) = result;
            assert_eq!(result, MarkResult::Completed);
            assert_eq!(f.heap.marked_ids(), expected, "workers {} seed {}", workers, seed);
            for id in expected.iter() {
                assert_eq!(f.heap.scan_count(*id), 1, "object {} scanned once", id);
            }
            assert!(f.generation.task_queues().is_empty());

            // Every marked object contributed its size to its region exactly once.
            for region in 0..6 {
                let expected_words: usize = expected
                    .iter()
                    .filter(|id| f.heap.object_region(**id) == region)
                    .map(|id| f.heap.object_words(*id))
                    .sum();
                assert_eq!(f.heap.region_live_words(region), expected_words);
            }
        }
    }
}

#[test]
fn work_is_conserved() {
    let (heap, roots) = random_heap(42, 3000);
    let f = Fixture::new(heap, GenerationType::GlobalNonGen, 4);
    let expected = f.heap.reachable(&roots, GenerationType::GlobalNonGen);
    let mark = f.mark();
    mark.mark_roots(&f.workers, &f.roots(&roots));
    assert_eq!(mark.concurrent_mark(&f.workers), MarkResult::Completed);
    let stats = mark.stats().total();
    // Every pushed task was processed, and each marked object was pushed once.
    assert_eq!(stats.pushed, stats.processed);
    assert_eq!(stats.pushed - stats.array_chunks, expected.len());
    assert!(mark.task_queues().is_empty());
}

#[test]
fn young_marking_ignores_old_objects() {
    let mut b = MockHeapBuilder::new();
    let young = b.region(RegionAffiliation::Young);
    let old = b.region(RegionAffiliation::Old);
    let root = b.object(young, 2);
    let y = b.object(young, 0);
    let o = b.object(old, 1);
    let behind_old = b.object(young, 0);
    b.link(root, 0, y);
    b.link(root, 1, o);
    b.link(o, 0, behind_old);
    let f = Fixture::new(b.build(), GenerationType::Young, 2);

    assert_eq!(f.run(&[root]), MarkResult::Completed);
    assert!(f.heap.is_marked_id(root));
    assert!(f.heap.is_marked_id(y));
    assert!(!f.heap.is_marked_id(o));
    assert!(!f.heap.is_marked_id(behind_old));
}

#[test]
fn young_marking_hands_old_objects_to_old_queues() {
    let mut b = MockHeapBuilder::new();
    let young = b.region(RegionAffiliation::Young);
    let old = b.region(RegionAffiliation::Old);
    let root = b.object(young, 1);
    let o = b.object(old, 0);
    let old_root = b.object(old, 0);
    b.link(root, 0, o);
    let f = Fixture::new(b.build(), GenerationType::Young, 2);
    let old_gen = Generation::new(GenerationType::Old, 2);
    f.generation
        .set_old_gen_task_queues(Some(old_gen.task_queues().clone()));

    assert_eq!(f.run(&[root, old_root]), MarkResult::Completed);
    // Old objects are marked and queued for the old marking, but not scanned by young.
    assert!(f.heap.is_marked_id(o));
    assert!(f.heap.is_marked_id(old_root));
    assert_eq!(f.heap.scan_count(o), 0);
    assert_eq!(old_gen.task_queues().tasks(), 2);
}

#[test]
fn leftover_queues_are_drained() {
    let mut b = MockHeapBuilder::new();
    let r = b.region(RegionAffiliation::Young);
    let ids: Vec<usize> = (0..20).map(|_| b.object(r, 1)).collect();
    for i in 0..10 {
        b.link(ids[i], 0, ids[i + 10]);
    }
    let heap = b.build();
    let gc_state = GCState::default();
    gc_state.set_active_generation(Some(GenerationType::Young));
    let generation = Generation::new(GenerationType::Young, 4);
    let options = Options {
        mark_loop_stride: 3,
        ..Options::default()
    };
    // An earlier phase with four workers left tasks in every queue.
    for (i, id) in ids[..10].iter().enumerate() {
        let object = heap.object(*id);
        assert!(heap.mark(object));
        generation
            .task_queues()
            .queue(i % 4)
            .owner()
            .push(MarkTask::new(object));
    }
    let workers = WorkerGroup::new(4);
    workers.update_active_workers(2);

    let mark = ConcurrentMark::new(&heap, &gc_state, &generation, &options);
    assert_eq!(mark.concurrent_mark(&workers), MarkResult::Completed);
    for id in ids.iter() {
        assert!(heap.is_marked_id(*id));
        assert_eq!(heap.scan_count(*id), 1);
    }
    assert!(generation.task_queues().is_empty());
}

#[test]
fn large_arrays_are_scanned_in_chunks() {
    let mut b = MockHeapBuilder::new();
    let r = b.region(RegionAffiliation::Young);
    let array = b.array(r, 1000);
    let elements: Vec<usize> = (0..1000).map(|_| b.object(r, 0)).collect();
    for (i, e) in elements.iter().enumerate() {
        b.link(array, i, *e);
    }
    let f = Fixture::new(b.build(), GenerationType::Young, 3);
    let mark = f.mark();
    mark.mark_roots(&f.workers, &f.roots(&[array]));
    assert_eq!(mark.concurrent_mark(&f.workers), MarkResult::Completed);

    assert_eq!(f.heap.scan_count(array), 1);
    assert_eq!(f.heap.elements_scanned(array), 1000);
    assert!(elements.iter().all(|e| f.heap.is_marked_id(*e)));
    // 1000 elements in chunks of 64: 15 chunks are split off.
    assert_eq!(mark.stats().total().array_chunks, 15);
}

#[test]
fn satb_snapshot_is_marked() {
    let mut b = MockHeapBuilder::new();
    let r = b.region(RegionAffiliation::Young);
    let root = b.object(r, 1);
    let hidden = b.object(r, 1);
    let behind = b.object(r, 0);
    b.link(root, 0, hidden);
    b.link(hidden, 0, behind);
    let f = Fixture::new(b.build(), GenerationType::Young, 2);
    let satb = f.heap.satb_queue_set();
    satb.set_active_all_threads(true);
    let mutator = satb.register_thread();

    let mark = f.mark();
    mark.mark_roots(&f.workers, &f.roots(&[root]));
    // Before marking scans the root, a mutator unlinks `hidden`. The barrier records it.
    f.heap.store_field(&mutator, root, 0, None);
    assert_eq!(mark.concurrent_mark(&f.workers), MarkResult::Completed);
    assert_eq!(mark.finish_mark(&f.workers), MarkResult::Completed);
    satb.set_active_all_threads(false);

    assert!(f.heap.is_marked_id(hidden));
    assert!(f.heap.is_marked_id(behind));
    assert!(mark.stats().total().satb_drained >= 1);
}

#[test]
fn satb_entries_outside_the_generation_are_discarded() {
    let mut b = MockHeapBuilder::new();
    let young = b.region(RegionAffiliation::Young);
    let old = b.region(RegionAffiliation::Old);
    let trash = b.region(RegionAffiliation::Young);
    let root = b.object(young, 0);
    let o = b.object(old, 0);
    let t = b.object(trash, 0);
    let f = Fixture::new(b.build(), GenerationType::Young, 1);
    f.heap.set_region_active(trash, false);
    let satb = f.heap.satb_queue_set();
    satb.set_active_all_threads(true);
    let mutator = satb.register_thread();
    satb.enqueue(&mutator, f.heap.object(o));
    satb.enqueue(&mutator, f.heap.object(t));

    assert_eq!(f.run(&[root]), MarkResult::Completed);
    assert!(!f.heap.is_marked_id(o));
    assert!(!f.heap.is_marked_id(t));
    satb.set_active_all_threads(false);
}

#[test]
fn mutator_stores_during_concurrent_mark() {
    const CHAIN: usize = 301;
    // Not a multiple of the buffer size: the mutator exits with a partial buffer.
    const UNLINKED: usize = 151;
    let mut b = MockHeapBuilder::new();
    b.satb_buffer_size(4);
    let regions: Vec<usize> = (0..3).map(|_| b.region(RegionAffiliation::Young)).collect();
    let chain: Vec<usize> = (0..CHAIN).map(|i| b.object(regions[i % 3], 2)).collect();
    for w in chain.windows(2) {
        b.link(w[0], 0, w[1]);
    }
    let mut leaves = vec![];
    for (i, id) in chain.iter().enumerate() {
        let leaf = b.object(regions[(i + 1) % 3], 1);
        let tail = b.object(regions[(i + 2) % 3], 0);
        b.link(*id, 1, leaf);
        b.link(leaf, 0, tail);
        leaves.push(leaf);
    }
    let f = Fixture::new(b.build(), GenerationType::Young, 4);
    let snapshot = f.heap.reachable(&[chain[0]], GenerationType::Young);
    assert_eq!(snapshot.len(), 3 * CHAIN);
    f.heap.satb_queue_set().set_active_all_threads(true);

    // Unlink a leaf, then relink the slot to a leaf from the far end of the chain.
    let stores: Vec<(usize, usize)> = (0..UNLINKED)
        .map(|i| (chain[i], leaves[CHAIN - 1 - i]))
        .collect();
    let root = chain[0];
    let (results, f) = panic_after(20_000, move || {
        let mark = f.mark();
        mark.mark_roots(&f.workers, &f.roots(&[root]));
        let heap = &f.heap;
        let concurrent = std::thread::scope(|s| {
            s.spawn(move || {
                let mutator = heap.satb_queue_set().register_thread();
                for (id, relinked) in stores.iter() {
                    heap.store_field(&mutator, *id, 1, None);
                    heap.store_field(&mutator, *id, 1, Some(*relinked));
                }
            });
            mark.concurrent_mark(&f.workers)
        });
        let results = (concurrent, mark.finish_mark(&f.workers));
        drop(mark);
        (results, f)
    });
    assert_eq!(results, (MarkResult::Completed, MarkResult::Completed));
    f.heap.satb_queue_set().set_active_all_threads(false);

    assert_eq!(f.heap.marked_ids(), snapshot);
    for id in snapshot.iter() {
        assert_eq!(f.heap.scan_count(*id), 1, "object {} scanned more than once", id);
    }
    for (id, leaf) in chain[..UNLINKED].iter().zip(leaves.iter().rev()) {
        assert_eq!(f.heap.field(*id, 1), Some(*leaf));
    }
    assert_eq!(f.heap.field(chain[UNLINKED], 1), Some(leaves[UNLINKED]));
}

#[test]
fn forwarded_references_are_healed() {
    let mut b = MockHeapBuilder::new();
    let r = b.region(RegionAffiliation::Young);
    let root = b.object(r, 1);
    let from = b.object(r, 0);
    let to = b.object(r, 0);
    b.link(root, 0, from);
    let f = Fixture::new(b.build(), GenerationType::Young, 1);
    f.heap.forward(from, to);

    assert_eq!(f.run(&[root]), MarkResult::Completed);
    assert_eq!(f.heap.field(root, 0), Some(to));
    assert!(f.heap.is_marked_id(to));
    assert!(!f.heap.is_marked_id(from));
}

#[test]
fn old_marking_does_not_heal_references() {
    let mut b = MockHeapBuilder::new();
    let r = b.region(RegionAffiliation::Old);
    let root = b.object(r, 1);
    let from = b.object(r, 0);
    let to = b.object(r, 0);
    b.link(root, 0, from);
    let f = Fixture::new(b.build(), GenerationType::Old, 1);
    f.heap.forward(from, to);

    assert_eq!(f.run(&[root]), MarkResult::Completed);
    assert_eq!(f.heap.field(root, 0), Some(from));
    assert!(f.heap.is_marked_id(from));
}

#[test]
fn cancelled_marking_stops() {
    let (heap, roots) = random_heap(7, 5000);
    let f = Fixture::new(heap, GenerationType::GlobalGen, 4);
    f.heap.cancel_after_scans(3);
    let (result, f) = panic_after(20_000, move || (f.run(&roots), f));
    assert_eq!(result, MarkResult::Cancelled);
    assert!(f.heap.cancelled_gc());
}

#[test]
fn cancellation_is_ignored_by_final_mark() {
    let mut b = MockHeapBuilder::new();
    let r = b.region(RegionAffiliation::Young);
    let root = b.object(r, 1);
    let child = b.object(r, 0);
    b.link(root, 0, child);
    let f = Fixture::new(b.build(), GenerationType::Young, 2);
    f.heap.cancel_gc();

    let mark = f.mark();
    mark.mark_roots(&f.workers, &f.roots(&[root]));
    assert_eq!(mark.finish_mark(&f.workers), MarkResult::Completed);
    assert!(f.heap.is_marked_id(child));
}

#[test]
fn empty_marking_terminates() {
    let (heap, _) = random_heap(1, 10);
    let f = Fixture::new(heap, GenerationType::GlobalGen, 4);
    let (result, _f) = panic_after(5_000, move || (f.run(&[]), f));
    assert_eq!(result, MarkResult::Completed);
}

#[test]
fn strings_are_deduplicated_once() {
    let mut b = MockHeapBuilder::new();
    let r = b.region(RegionAffiliation::Young);
    let root = b.object(r, 3);
    let young_string = b.string(r, false);
    let aged_string = b.string(r, true);
    b.link(root, 0, young_string);
    b.link(root, 1, aged_string);
    b.link(root, 2, aged_string);

    let heap = b.build();
    let mut f = Fixture::new(heap, GenerationType::Young, 1);
    f.options.string_dedup = StringDedupMode::EnqueueDedup;
    assert_eq!(f.run(&[root]), MarkResult::Completed);
    assert_eq!(f.heap.dedup_queue(), vec![f.heap.object(aged_string)]);

    f.heap.reset_marks();
    f.options.string_dedup = StringDedupMode::AlwaysDedup;
    assert_eq!(f.run(&[root]), MarkResult::Completed);
    // The aged string was already requested.
    assert_eq!(
        f.heap.dedup_queue(),
        vec![f.heap.object(aged_string), f.heap.object(young_string)]
    );
}

#[test]
fn class_holders_are_traced_when_unloading() {
    let mut b = MockHeapBuilder::new();
    let r = b.region(RegionAffiliation::Young);
    let root = b.object(r, 0);
    let holder = b.object(r, 0);
    b.set_class_holder(root, holder);
    let f = Fixture::new(b.build(), GenerationType::Young, 1);

    assert_eq!(f.run(&[root]), MarkResult::Completed);
    assert!(!f.heap.is_marked_id(holder));

    f.heap.reset_marks();
    f.heap.set_unload_classes(true);
    assert_eq!(f.run(&[root]), MarkResult::Completed);
    assert!(f.heap.is_marked_id(holder));
}

#[test]
fn discovered_referents_are_not_traced() {
    let mut b = MockHeapBuilder::new();
    let r = b.region(RegionAffiliation::Young);
    let root = b.reference(r, ReferenceType::Weak);
    let referent = b.object(r, 0);
    b.link(root, 0, referent);
    let f = Fixture::new(b.build(), GenerationType::Young, 1);
    f.heap.rp().set_enabled(true);

    assert_eq!(f.run(&[root]), MarkResult::Completed);
    assert!(!f.heap.is_marked_id(referent));
    assert_eq!(f.heap.rp().discovered(), vec![f.heap.object(root)]);
    assert_eq!(
        f.heap.rp().process_stats().discovered[ReferenceType::Weak],
        1
    );
}

#[test]
fn suspendible_workers_leave_while_waiting() {
    let (heap, roots) = random_heap(3, 500);
    let mut f = Fixture::new(heap, GenerationType::GlobalGen, 3);
    f.options.suspendible_workers = true;
    let (result, f) = panic_after(10_000, move || (f.run(&roots), f));
    assert_eq!(result, MarkResult::Completed);
    assert_eq!(f.heap.sts().members(), 0);
    assert!(f.heap.sts().joins() >= 3);
}
