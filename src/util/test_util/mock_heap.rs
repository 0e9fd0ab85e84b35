//! An in-memory heap that implements [`GCBinding`] for tests and benchmarks.
//!
//! Objects are identified by a dense id. The `ObjectReference` of object `id` is
//! `(id + 1) * 8`. Every object lives in one region and occupies `2 + fields` words laid out
//! in allocation order, so coalesce-and-fill can walk a region object by object.

use std::collections::{HashSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicIsize, AtomicU8, AtomicUsize, Ordering};
use std::sync::Mutex;

use enum_map::EnumMap;

use crate::plan::generation::GenerationType;
use crate::util::address::BYTES_IN_WORD;
use crate::util::satb::{SATBMarkQueue, SATBMarkQueueSet};
use crate::util::ObjectReference;
use crate::vm::*;

const HEADER_WORDS: usize = 2;

#[derive(Clone, Debug)]
struct ObjectSpec {
    region: usize,
    fields: Vec<Option<usize>>,
    is_array: bool,
    reference_type: ReferenceType,
    is_string: bool,
    dedup_age: bool,
    class_holder: Option<usize>,
}

/// Builds a [`MockHeap`].
#[derive(Default)]
pub struct MockHeapBuilder {
    regions: Vec<(RegionAffiliation, bool)>,
    objects: Vec<ObjectSpec>,
    satb_buffer_size: Option<usize>,
}

impl MockHeapBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn region(&mut self, affiliation: RegionAffiliation) -> usize {
        self.regions.push((affiliation, false));
        self.regions.len() - 1
    }

    pub fn humongous_region(&mut self, affiliation: RegionAffiliation) -> usize {
        self.regions.push((affiliation, true));
        self.regions.len() - 1
    }

    fn add(&mut self, spec: ObjectSpec) -> usize {
        assert!(spec.region < self.regions.len(), "No region {}", spec.region);
        self.objects.push(spec);
        self.objects.len() - 1
    }

    /// An ordinary object with `fields` null reference fields.
    pub fn object(&mut self, region: usize, fields: usize) -> usize {
        self.add(ObjectSpec {
            region,
            fields: vec![None; fields],
            is_array: false,
            reference_type: ReferenceType::None,
            is_string: false,
            dedup_age: false,
            class_holder: None,
        })
    }

    /// A reference array with `length` null elements.
    pub fn array(&mut self, region: usize, length: usize) -> usize {
        let id = self.object(region, length);
        self.objects[id].is_array = true;
        id
    }

    /// A reference object of kind `ty` whose only field is the referent.
    pub fn reference(&mut self, region: usize, ty: ReferenceType) -> usize {
        let id = self.object(region, 1);
        self.objects[id].reference_type = ty;
        id
    }

    pub fn string(&mut self, region: usize, dedup_age: bool) -> usize {
        let id = self.object(region, 0);
        self.objects[id].is_string = true;
        self.objects[id].dedup_age = dedup_age;
        id
    }

    pub fn link(&mut self, from: usize, field: usize, to: usize) {
        self.objects[from].fields[field] = Some(to);
    }

    pub fn set_class_holder(&mut self, object: usize, holder: usize) {
        self.objects[object].class_holder = Some(holder);
    }

    pub fn satb_buffer_size(&mut self, size: usize) {
        self.satb_buffer_size = Some(size);
    }

    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    pub fn build(self) -> MockHeap {
        let mut layouts: Vec<Vec<Extent>> = vec![vec![]; self.regions.len()];
        let objects: Vec<MockObject> = self
            .objects
            .into_iter()
            .enumerate()
            .map(|(id, spec)| {
                let layout = &mut layouts[spec.region];
                let start = layout.last().map_or(0, |e: &Extent| e.start + e.words);
                let words = HEADER_WORDS + spec.fields.len();
                layout.push(Extent {
                    start,
                    words,
                    object: Some(id),
                });
                MockObject {
                    region: spec.region,
                    words,
                    fields: spec
                        .fields
                        .iter()
                        .map(|f| AtomicUsize::new(f.map_or(0, |to| MockHeap::raw(to))))
                        .collect(),
                    is_array: spec.is_array,
                    reference_type: spec.reference_type,
                    is_string: spec.is_string,
                    dedup_age: spec.dedup_age,
                    class_holder: spec.class_holder,
                }
            })
            .collect();
        let regions = self
            .regions
            .iter()
            .zip(layouts)
            .map(|((affiliation, humongous), layout)| MockRegion {
                affiliation: AtomicU8::new(encode(*affiliation)),
                active: AtomicBool::new(true),
                humongous: *humongous,
                live_words: AtomicUsize::new(0),
                fill_progress: Mutex::new(FillProgress::Unfilled),
                layout: Mutex::new(layout),
                fills: Mutex::new(vec![]),
            })
            .collect();
        let n = objects.len();
        MockHeap {
            objects,
            regions,
            marks: (0..n).map(|_| AtomicBool::new(false)).collect(),
            scans: (0..n).map(|_| AtomicUsize::new(0)).collect(),
            elements_scanned: (0..n).map(|_| AtomicUsize::new(0)).collect(),
            forwarding: (0..n).map(|_| AtomicUsize::new(0)).collect(),
            dedup_requested: (0..n).map(|_| AtomicBool::new(false)).collect(),
            has_forwarded: AtomicBool::new(false),
            unload_classes: AtomicBool::new(false),
            cancelled: AtomicBool::new(false),
            cancel_after_scans: AtomicIsize::new(-1),
            cancel_checks: AtomicUsize::new(0),
            dedup_queue: Mutex::new(vec![]),
            satb: SATBMarkQueueSet::new(self.satb_buffer_size.unwrap_or(4)),
            sts: MockSuspendibleThreadSet::default(),
            rp: MockReferenceProcessor::default(),
            heap_lock: Mutex::new(()),
            old_candidates: AtomicUsize::new(0),
            old_candidates_after_mark: AtomicUsize::new(0),
            fill_candidates: Mutex::new(vec![]),
            fill_candidates_after_mark: Mutex::new(vec![]),
            cset_regions: AtomicUsize::new(1),
            evacuation_failures: AtomicUsize::new(0),
            evacuations: AtomicUsize::new(0),
            full_compactions: AtomicUsize::new(0),
            free_set_rebuilds: AtomicUsize::new(0),
            region_state_updates: AtomicUsize::new(0),
        }
    }
}

fn encode(affiliation: RegionAffiliation) -> u8 {
    match affiliation {
        RegionAffiliation::Free => 0,
        RegionAffiliation::Young => 1,
        RegionAffiliation::Old => 2,
    }
}

fn decode(v: u8) -> RegionAffiliation {
    match v {
        0 => RegionAffiliation::Free,
        1 => RegionAffiliation::Young,
        2 => RegionAffiliation::Old,
        _ => unreachable!(),
    }
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
struct Extent {
    start: usize,
    words: usize,
    /// `None` for a filler.
    object: Option<usize>,
}

struct MockObject {
    region: usize,
    words: usize,
    fields: Vec<AtomicUsize>,
    is_array: bool,
    reference_type: ReferenceType,
    is_string: bool,
    dedup_age: bool,
    class_holder: Option<usize>,
}

struct MockRegion {
    affiliation: AtomicU8,
    active: AtomicBool,
    humongous: bool,
    live_words: AtomicUsize,
    fill_progress: Mutex<FillProgress>,
    layout: Mutex<Vec<Extent>>,
    fills: Mutex<Vec<(usize, usize)>>,
}

/// A slot is a pointer to a field word of a mock object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub struct MockSlot(*const AtomicUsize);

unsafe impl Send for MockSlot {}
unsafe impl Sync for MockSlot {}

impl Slot for MockSlot {
    fn load(&self) -> Option<ObjectReference> {
        ObjectReference::from_raw(unsafe { &*self.0 }.load(Ordering::Acquire))
    }

    fn store(&self, object: ObjectReference) {
        unsafe { &*self.0 }.store(object.to_raw(), Ordering::Release)
    }

    fn compare_exchange(&self, old: ObjectReference, new: ObjectReference) -> bool {
        unsafe { &*self.0 }
            .compare_exchange(
                old.to_raw(),
                new.to_raw(),
                Ordering::AcqRel,
                Ordering::Acquire,
            )
            .is_ok()
    }
}

/// Counts members and checks that workers only leave after joining.
#[derive(Default)]
pub struct MockSuspendibleThreadSet {
    members: AtomicIsize,
    joins: AtomicUsize,
}

impl MockSuspendibleThreadSet {
    pub fn members(&self) -> isize {
        self.members.load(Ordering::SeqCst)
    }

    pub fn joins(&self) -> usize {
        self.joins.load(Ordering::SeqCst)
    }
}

impl SuspendibleThreadSet for MockSuspendibleThreadSet {
    fn join(&self) {
        self.joins.fetch_add(1, Ordering::SeqCst);
        self.members.fetch_add(1, Ordering::SeqCst);
    }

    fn leave(&self) {
        let before = self.members.fetch_sub(1, Ordering::SeqCst);
        assert!(before > 0, "Left the suspendible thread set without joining");
    }
}

/// Discovers every reference object it is offered (when enabled).
#[derive(Default)]
pub struct MockReferenceProcessor {
    enabled: AtomicBool,
    discovered: Mutex<Vec<ObjectReference>>,
    stats: Mutex<EnumMap<ReferenceType, usize>>,
    mark_closures: AtomicUsize,
}

impl MockReferenceProcessor {
    pub fn set_enabled(&self, enabled: bool) {
        self.enabled.store(enabled, Ordering::SeqCst);
    }

    pub fn discovered(&self) -> Vec<ObjectReference> {
        self.discovered.lock().unwrap().clone()
    }

    pub fn mark_closures(&self) -> usize {
        self.mark_closures.load(Ordering::SeqCst)
    }
}

impl ReferenceProcessor for MockReferenceProcessor {
    fn set_mark_closure(&self, _worker_id: usize, _generation: GenerationType) {
        self.mark_closures.fetch_add(1, Ordering::SeqCst);
    }

    fn discover_reference(&self, reference: ObjectReference, ty: ReferenceType) -> bool {
        if !self.enabled.load(Ordering::SeqCst) {
            return false;
        }
        self.discovered.lock().unwrap().push(reference);
        self.stats.lock().unwrap()[ty] += 1;
        true
    }

    fn abandon_partial_discovery(&self) {
        self.discovered.lock().unwrap().clear();
        self.stats.lock().unwrap().clear();
    }

    fn process_stats(&self) -> ReferenceProcessStats {
        ReferenceProcessStats {
            discovered: self.stats.lock().unwrap().clone(),
        }
    }
}

pub struct MockHeap {
    objects: Vec<MockObject>,
    regions: Vec<MockRegion>,
    marks: Vec<AtomicBool>,
    scans: Vec<AtomicUsize>,
    elements_scanned: Vec<AtomicUsize>,
    forwarding: Vec<AtomicUsize>,
    dedup_requested: Vec<AtomicBool>,
    has_forwarded: AtomicBool,
    unload_classes: AtomicBool,
    cancelled: AtomicBool,
    cancel_after_scans: AtomicIsize,
    cancel_checks: AtomicUsize,
    dedup_queue: Mutex<Vec<ObjectReference>>,
    satb: SATBMarkQueueSet,
    sts: MockSuspendibleThreadSet,
    rp: MockReferenceProcessor,
    heap_lock: Mutex<()>,
    old_candidates: AtomicUsize,
    old_candidates_after_mark: AtomicUsize,
    fill_candidates: Mutex<Vec<usize>>,
    fill_candidates_after_mark: Mutex<Vec<usize>>,
    cset_regions: AtomicUsize,
    evacuation_failures: AtomicUsize,
    evacuations: AtomicUsize,
    full_compactions: AtomicUsize,
    free_set_rebuilds: AtomicUsize,
    region_state_updates: AtomicUsize,
}

impl MockHeap {
    fn raw(id: usize) -> usize {
        (id + 1) * BYTES_IN_WORD
    }

    /// The reference of object `id`.
    pub fn object(&self, id: usize) -> ObjectReference {
        debug_assert!(id < self.objects.len());
        unsafe { ObjectReference::from_raw_unchecked(Self::raw(id)) }
    }

    pub fn id_of(&self, object: ObjectReference) -> usize {
        object.to_raw() / BYTES_IN_WORD - 1
    }

    pub fn num_objects(&self) -> usize {
        self.objects.len()
    }

    // --- Inspection ---

    pub fn is_marked_id(&self, id: usize) -> bool {
        self.marks[id].load(Ordering::SeqCst)
    }

    pub fn marked_ids(&self) -> HashSet<usize> {
        (0..self.objects.len())
            .filter(|id| self.is_marked_id(*id))
            .collect()
    }

    /// How many times the fields of object `id` were scanned from the start.
    pub fn scan_count(&self, id: usize) -> usize {
        self.scans[id].load(Ordering::SeqCst)
    }

    /// How many array elements of object `id` were scanned in total.
    pub fn elements_scanned(&self, id: usize) -> usize {
        self.elements_scanned[id].load(Ordering::SeqCst)
    }

    pub fn field(&self, id: usize, field: usize) -> Option<usize> {
        ObjectReference::from_raw(self.objects[id].fields[field].load(Ordering::SeqCst))
            .map(|o| self.id_of(o))
    }

    pub fn region_live_words(&self, region: usize) -> usize {
        self.regions[region].live_words.load(Ordering::SeqCst)
    }

    pub fn object_words(&self, id: usize) -> usize {
        self.objects[id].words
    }

    pub fn object_region(&self, id: usize) -> usize {
        self.objects[id].region
    }

    pub fn dedup_queue(&self) -> Vec<ObjectReference> {
        self.dedup_queue.lock().unwrap().clone()
    }

    pub fn sts(&self) -> &MockSuspendibleThreadSet {
        &self.sts
    }

    pub fn rp(&self) -> &MockReferenceProcessor {
        &self.rp
    }

    /// Fillers written into `region`, as `(start, words)`.
    pub fn fills(&self, region: usize) -> Vec<(usize, usize)> {
        self.regions[region].fills.lock().unwrap().clone()
    }

    pub fn evacuations(&self) -> usize {
        self.evacuations.load(Ordering::SeqCst)
    }

    pub fn full_compactions(&self) -> usize {
        self.full_compactions.load(Ordering::SeqCst)
    }

    pub fn free_set_rebuilds(&self) -> usize {
        self.free_set_rebuilds.load(Ordering::SeqCst)
    }

    pub fn region_state_updates(&self) -> usize {
        self.region_state_updates.load(Ordering::SeqCst)
    }

    /// Number of cancellation checks made by marking workers.
    pub fn cancel_checks(&self) -> usize {
        self.cancel_checks.load(Ordering::SeqCst)
    }

    /// The objects reachable from `roots` that marking of `generation` must mark: reachable
    /// through objects of the generation only.
    pub fn reachable(&self, roots: &[usize], generation: GenerationType) -> HashSet<usize> {
        let mut seen = HashSet::new();
        let mut work: VecDeque<usize> = VecDeque::new();
        let visit = |id: usize, seen: &mut HashSet<usize>, work: &mut VecDeque<usize>| {
            if generation.contains(&self.region_info(self.objects[id].region)) && seen.insert(id)
            {
                work.push_back(id);
            }
        };
        for root in roots {
            visit(*root, &mut seen, &mut work);
        }
        while let Some(id) = work.pop_front() {
            for f in 0..self.objects[id].fields.len() {
                if let Some(to) = self.field(id, f) {
                    visit(to, &mut seen, &mut work);
                }
            }
        }
        seen
    }

    // --- Mutation ---

    /// A mutator store: write `to` into a field, recording the overwritten value in the SATB
    /// buffer of `queue`.
    pub fn store_field(&self, queue: &SATBMarkQueue, id: usize, field: usize, to: Option<usize>) {
        let new = to.map_or(0, Self::raw);
        let old = self.objects[id].fields[field].swap(new, Ordering::AcqRel);
        if let Some(old) = ObjectReference::from_raw(old) {
            self.satb.enqueue(queue, old);
        }
    }

    /// Forward object `from` to `to`, as an evacuation would.
    pub fn forward(&self, from: usize, to: usize) {
        self.forwarding[from].store(Self::raw(to), Ordering::SeqCst);
        self.has_forwarded.store(true, Ordering::SeqCst);
    }

    pub fn set_unload_classes(&self, unload: bool) {
        self.unload_classes.store(unload, Ordering::SeqCst);
    }

    pub fn set_region_active(&self, region: usize, active: bool) {
        self.regions[region].active.store(active, Ordering::SeqCst);
    }

    pub fn set_region_affiliation(&self, region: usize, affiliation: RegionAffiliation) {
        self.regions[region]
            .affiliation
            .store(encode(affiliation), Ordering::SeqCst);
    }

    /// Cancel the cycle after `n` more object scans. Every step of a coalesce-and-fill region
    /// walk counts as a scan too.
    pub fn cancel_after_scans(&self, n: isize) {
        self.cancel_after_scans.store(n, Ordering::SeqCst);
    }

    /// Clear mark bits and scan counters of every object.
    pub fn reset_marks(&self) {
        for i in 0..self.objects.len() {
            self.marks[i].store(false, Ordering::SeqCst);
            self.scans[i].store(0, Ordering::SeqCst);
            self.elements_scanned[i].store(0, Ordering::SeqCst);
        }
    }

    /// Set the outcome of the next old marking: the number of mixed evacuation candidates and
    /// the regions that will need coalesce-and-fill.
    pub fn set_old_mark_outcome(&self, candidates: usize, fill_regions: Vec<usize>) {
        self.old_candidates_after_mark.store(candidates, Ordering::SeqCst);
        *self.fill_candidates_after_mark.lock().unwrap() = fill_regions;
    }

    pub fn set_old_candidates(&self, candidates: usize) {
        self.old_candidates.store(candidates, Ordering::SeqCst);
    }

    pub fn set_fill_candidates(&self, regions: Vec<usize>) {
        *self.fill_candidates.lock().unwrap() = regions;
    }

    pub fn set_cset_regions(&self, regions: usize) {
        self.cset_regions.store(regions, Ordering::SeqCst);
    }

    /// Make the next `n` evacuations fail.
    pub fn fail_evacuations(&self, n: usize) {
        self.evacuation_failures.store(n, Ordering::SeqCst);
    }

    fn count_scan(&self) {
        let before = self.cancel_after_scans.fetch_sub(1, Ordering::SeqCst);
        if before == 1 {
            self.cancel_gc();
        } else if before <= 0 {
            // Not armed.
            self.cancel_after_scans.store(-1, Ordering::SeqCst);
        }
    }
}

impl MarkingContext for MockHeap {
    fn mark(&self, object: ObjectReference) -> bool {
        !self.marks[self.id_of(object)].swap(true, Ordering::AcqRel)
    }

    fn is_marked(&self, object: ObjectReference) -> bool {
        self.marks[self.id_of(object)].load(Ordering::Acquire)
    }

    fn reset(&self, generation: GenerationType) {
        for (id, o) in self.objects.iter().enumerate() {
            if generation.contains(&self.region_info(o.region)) {
                self.marks[id].store(false, Ordering::SeqCst);
                self.scans[id].store(0, Ordering::SeqCst);
                self.elements_scanned[id].store(0, Ordering::SeqCst);
            }
        }
        for index in 0..self.regions.len() {
            if generation.contains(&self.region_info(index)) {
                self.regions[index].live_words.store(0, Ordering::SeqCst);
            }
        }
    }
}

impl RegionService for MockHeap {
    fn num_regions(&self) -> usize {
        self.regions.len()
    }

    fn region_info(&self, index: usize) -> RegionInfo {
        let r = &self.regions[index];
        RegionInfo {
            index,
            affiliation: decode(r.affiliation.load(Ordering::SeqCst)),
            active: r.active.load(Ordering::SeqCst),
            humongous: r.humongous,
        }
    }

    fn heap_lock(&self) -> &Mutex<()> {
        &self.heap_lock
    }

    fn unprocessed_old_collection_candidates(&self) -> usize {
        self.old_candidates.load(Ordering::SeqCst)
    }

    fn select_mixed_collection_candidates(&self, max: usize) -> usize {
        let mut taken = 0;
        let _ = self
            .old_candidates
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |c| {
                taken = c.min(max);
                Some(c - taken)
            });
        taken
    }

    fn has_coalesce_and_fill_candidates(&self) -> bool {
        !self.fill_candidates.lock().unwrap().is_empty()
    }

    fn coalesce_and_fill_candidates(&self) -> Vec<usize> {
        self.fill_candidates.lock().unwrap().clone()
    }

    fn abandon_collection_candidates(&self) {
        self.old_candidates.store(0, Ordering::SeqCst);
        self.fill_candidates.lock().unwrap().clear();
    }

    fn prepare_for_old_collections(&self) {
        assert!(
            self.heap_lock.try_lock().is_err(),
            "Candidates are chosen under the heap lock"
        );
        self.old_candidates.store(
            self.old_candidates_after_mark.load(Ordering::SeqCst),
            Ordering::SeqCst,
        );
        *self.fill_candidates.lock().unwrap() =
            self.fill_candidates_after_mark.lock().unwrap().clone();
    }

    fn choose_collection_set(&self, _generation: GenerationType) -> usize {
        self.cset_regions.load(Ordering::SeqCst)
    }

    fn update_region_states_after_mark(&self, _generation: GenerationType) {
        self.region_state_updates.fetch_add(1, Ordering::SeqCst);
    }

    fn rebuild_free_set(&self, _concurrent: bool) {
        assert!(
            self.heap_lock.try_lock().is_err(),
            "The free set is rebuilt under the heap lock"
        );
        self.free_set_rebuilds.fetch_add(1, Ordering::SeqCst);
    }

    fn live_bytes(&self, generation: GenerationType) -> usize {
        (0..self.regions.len())
            .filter(|r| generation.contains(&self.region_info(*r)))
            .map(|r| self.region_live_words(r) * BYTES_IN_WORD)
            .sum()
    }

    fn fill_progress(&self, region: usize) -> FillProgress {
        *self.regions[region].fill_progress.lock().unwrap()
    }

    fn set_fill_progress(&self, region: usize, progress: FillProgress) {
        *self.regions[region].fill_progress.lock().unwrap() = progress;
    }

    fn object_at_or_after(&self, region: usize, from_word: usize) -> Option<ObjectExtent> {
        self.count_scan();
        let layout = self.regions[region].layout.lock().unwrap();
        layout
            .iter()
            .find(|e| e.start >= from_word)
            .map(|e| ObjectExtent {
                start: e.start,
                words: e.words,
                live: e.object.is_some_and(|id| self.is_marked_id(id)),
            })
    }

    fn fill_with_dead_object(&self, region: usize, start_word: usize, words: usize) {
        let mut layout = self.regions[region].layout.lock().unwrap();
        let first = layout
            .iter()
            .position(|e| e.start == start_word)
            .expect("A filler must start at an object boundary");
        let mut end = first;
        let mut covered = 0;
        while covered < words {
            let e = layout[end];
            assert!(
                e.object.map_or(true, |id| !self.is_marked_id(id)),
                "Filling over a live object"
            );
            covered += e.words;
            end += 1;
        }
        assert_eq!(covered, words, "A filler must end at an object boundary");
        layout.splice(
            first..end,
            [Extent {
                start: start_word,
                words,
                object: None,
            }],
        );
        self.regions[region]
            .fills
            .lock()
            .unwrap()
            .push((start_word, words));
    }
}

impl GCBinding for MockHeap {
    type Slot = MockSlot;
    type MarkingContext = MockHeap;
    type ReferenceProcessor = MockReferenceProcessor;
    type RegionService = MockHeap;

    fn marking_context(&self) -> &MockHeap {
        self
    }

    fn ref_processor(&self, _generation: GenerationType) -> &MockReferenceProcessor {
        &self.rp
    }

    fn regions(&self) -> &MockHeap {
        self
    }

    fn satb_queue_set(&self) -> &SATBMarkQueueSet {
        &self.satb
    }

    fn suspendible_thread_set(&self) -> &dyn SuspendibleThreadSet {
        &self.sts
    }

    fn region_of(&self, object: ObjectReference) -> RegionInfo {
        self.region_info(self.objects[self.id_of(object)].region)
    }

    fn object_size_words(&self, object: ObjectReference) -> usize {
        self.objects[self.id_of(object)].words
    }

    fn scan_object<F: FnMut(MockSlot)>(
        &self,
        object: ObjectReference,
        skip_referent: bool,
        mut f: F,
    ) {
        let id = self.id_of(object);
        let o = &self.objects[id];
        debug_assert!(!o.is_array);
        self.scans[id].fetch_add(1, Ordering::SeqCst);
        self.count_scan();
        for (i, field) in o.fields.iter().enumerate() {
            if skip_referent && i == 0 && o.reference_type != ReferenceType::None {
                continue;
            }
            f(MockSlot(field as *const AtomicUsize));
        }
    }

    fn object_array_length(&self, object: ObjectReference) -> Option<usize> {
        let o = &self.objects[self.id_of(object)];
        o.is_array.then_some(o.fields.len())
    }

    fn scan_array_range<F: FnMut(MockSlot)>(
        &self,
        object: ObjectReference,
        from: usize,
        to: usize,
        mut f: F,
    ) {
        let id = self.id_of(object);
        if from == 0 {
            self.scans[id].fetch_add(1, Ordering::SeqCst);
            self.count_scan();
        }
        self.elements_scanned[id].fetch_add(to - from, Ordering::SeqCst);
        for field in &self.objects[id].fields[from..to] {
            f(MockSlot(field as *const AtomicUsize));
        }
    }

    fn class_holder(&self, object: ObjectReference) -> Option<ObjectReference> {
        self.objects[self.id_of(object)]
            .class_holder
            .map(|h| self.object(h))
    }

    fn reference_type(&self, object: ObjectReference) -> ReferenceType {
        self.objects[self.id_of(object)].reference_type
    }

    fn is_string(&self, object: ObjectReference) -> bool {
        self.objects[self.id_of(object)].is_string
    }

    fn is_dedup_candidate_age(&self, object: ObjectReference) -> bool {
        self.objects[self.id_of(object)].dedup_age
    }

    fn try_request_dedup(&self, object: ObjectReference) -> bool {
        !self.dedup_requested[self.id_of(object)].swap(true, Ordering::AcqRel)
    }

    fn enqueue_dedup_requests(&self, requests: Vec<ObjectReference>) {
        self.dedup_queue.lock().unwrap().extend(requests);
    }

    fn has_forwarded_objects(&self) -> bool {
        self.has_forwarded.load(Ordering::SeqCst)
    }

    fn resolve_forwarded(&self, object: ObjectReference) -> ObjectReference {
        ObjectReference::from_raw(self.forwarding[self.id_of(object)].load(Ordering::SeqCst))
            .unwrap_or(object)
    }

    fn unload_classes(&self) -> bool {
        self.unload_classes.load(Ordering::SeqCst)
    }

    fn increase_live_data(&self, region: usize, words: usize) {
        self.regions[region]
            .live_words
            .fetch_add(words, Ordering::SeqCst);
    }

    fn cancelled_gc(&self) -> bool {
        self.cancelled.load(Ordering::SeqCst)
    }

    fn cancel_gc(&self) {
        self.cancelled.store(true, Ordering::SeqCst);
    }

    fn clear_cancelled_gc(&self) {
        self.cancelled.store(false, Ordering::SeqCst);
    }

    fn check_cancelled_gc_and_yield(&self, _sts_active: bool) -> bool {
        self.cancel_checks.fetch_add(1, Ordering::SeqCst);
        self.cancelled_gc()
    }

    fn evacuate_and_update_refs(&self, _generation: GenerationType, _concurrent: bool) -> bool {
        self.evacuations.fetch_add(1, Ordering::SeqCst);
        self.evacuation_failures
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_err()
    }

    fn full_compact(&self) {
        self.full_compactions.fetch_add(1, Ordering::SeqCst);
    }
}
