use std::marker::PhantomData;

use crate::plan::generation::{GenerationType, StringDedupMode};
use crate::scheduler::{MarkTask, QueueOwner};
use crate::util::statistics::WorkerMarkStats;
use crate::util::ObjectReference;
use crate::vm::{GCBinding, MarkingContext, ReferenceProcessor, ReferenceType, Slot};

/// Deduplication requests are handed to the binding in batches of this size.
const DEDUP_BATCH_SIZE: usize = 64;

/// A generation known at compile time. The mark loop is monomorphized per generation so the
/// region filter in [`MarkRefsClosure::mark_through_ref`] is resolved statically.
pub trait GenerationKind: Send + Sync + 'static {
    const TYPE: GenerationType;
}

pub struct Young;
pub struct Old;
pub struct GlobalGen;
pub struct GlobalNonGen;

impl GenerationKind for Young {
    const TYPE: GenerationType = GenerationType::Young;
}
impl GenerationKind for Old {
    const TYPE: GenerationType = GenerationType::Old;
}
impl GenerationKind for GlobalGen {
    const TYPE: GenerationType = GenerationType::GlobalGen;
}
impl GenerationKind for GlobalNonGen {
    const TYPE: GenerationType = GenerationType::GlobalNonGen;
}

/// The strategy of a mark closure, fixed for a whole mark loop.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct MarkMode {
    /// Heal slots that point to forwarded objects.
    pub update_refs: bool,
    /// Trace the class holder of every object.
    pub visit_metadata: bool,
    pub dedup: StringDedupMode,
}

/// Live words per region, accumulated by one worker and added to the regions at the end of its
/// mark loop.
pub struct LivenessCache {
    live_words: Vec<usize>,
}

impl LivenessCache {
    pub fn new(num_regions: usize) -> Self {
        LivenessCache {
            live_words: vec![0; num_regions],
        }
    }

    pub fn add(&mut self, region: usize, words: usize) {
        self.live_words[region] += words;
    }

    pub fn flush<B: GCBinding>(&mut self, binding: &B) {
        for (region, words) in self.live_words.iter_mut().enumerate() {
            if *words > 0 {
                binding.increase_live_data(region, *words);
                *words = 0;
            }
        }
    }
}

/// The mark closure of one worker. It owns the worker's queue (and old queue, if old marking
/// is in progress while marking young) for the duration of the mark loop.
pub struct MarkRefsClosure<'a, B: GCBinding, G: GenerationKind> {
    binding: &'a B,
    queue: QueueOwner<'a>,
    old_queue: Option<QueueOwner<'a>>,
    mode: MarkMode,
    dedup_requests: Vec<ObjectReference>,
    pub(crate) stats: WorkerMarkStats,
    _generation: PhantomData<G>,
}

impl<'a, B: GCBinding, G: GenerationKind> MarkRefsClosure<'a, B, G> {
    pub fn new(
        binding: &'a B,
        queue: QueueOwner<'a>,
        old_queue: Option<QueueOwner<'a>>,
        mode: MarkMode,
    ) -> Self {
        debug_assert!(
            !(G::TYPE.is_old() && mode.update_refs),
            "Old marking does not update references"
        );
        MarkRefsClosure {
            binding,
            queue,
            old_queue,
            mode,
            dedup_requests: vec![],
            stats: WorkerMarkStats::default(),
            _generation: PhantomData,
        }
    }

    pub fn mode(&self) -> MarkMode {
        self.mode
    }

    pub fn pop(&mut self) -> Option<MarkTask> {
        self.queue.pop()
    }

    /// Visit one reference slot.
    pub fn do_slot(&mut self, slot: B::Slot) {
        let Some(mut object) = slot.load() else {
            return;
        };
        if self.mode.update_refs {
            let forwarded = self.binding.resolve_forwarded(object);
            if forwarded != object {
                // A failed exchange means a mutator stored a new value. Its SATB barrier
                // recorded the old one, so the new value is left alone.
                slot.compare_exchange(object, forwarded);
                object = forwarded;
            }
        }
        self.mark_through_ref(object);
    }

    /// Mark an object and queue it for scanning if this call marked it. References outside the
    /// generation being marked are dropped, except that young marking hands old objects to the
    /// old queues while an old marking is in progress.
    pub fn mark_through_ref(&mut self, object: ObjectReference) {
        let region = self.binding.region_of(object);
        if G::TYPE.contains(&region) {
            Self::mark_ref(self.binding, &mut self.queue, &mut self.stats, object);
        } else if G::TYPE.is_young() && region.active && region.is_old() {
            match self.old_queue.as_mut() {
                Some(old_queue) => {
                    Self::mark_ref(self.binding, old_queue, &mut self.stats, object)
                }
                None => self.stats.discarded += 1,
            }
        } else {
            self.stats.discarded += 1;
        }
    }

    fn mark_ref(
        binding: &B,
        queue: &mut QueueOwner<'_>,
        stats: &mut WorkerMarkStats,
        object: ObjectReference,
    ) {
        if binding.marking_context().mark(object) {
            queue.push(MarkTask::new(object));
            stats.pushed += 1;
        }
    }

    /// Mark through the entries of one SATB buffer.
    pub fn drain_satb_buffer(&mut self, buffer: &[ObjectReference]) {
        self.stats.satb_drained += buffer.len();
        for object in buffer.iter().copied() {
            self.mark_through_ref(object);
        }
    }

    /// Process one task: scan an object for the first time, or scan one chunk of an array.
    pub fn do_task(&mut self, task: MarkTask, live: &mut LivenessCache, array_chunk_size: usize) {
        let object = task.object();
        debug_assert!(
            self.binding.marking_context().is_marked(object),
            "{} is queued but not marked",
            object
        );
        self.stats.processed += 1;

        if let Some(chunk) = task.chunk() {
            self.do_chunked_array(object, chunk.from, chunk.to, array_chunk_size);
            return;
        }

        let region = self.binding.region_of(object);
        live.add(region.index, self.binding.object_size_words(object));
        self.dedup(object);

        if self.mode.visit_metadata {
            if let Some(holder) = self.binding.class_holder(object) {
                self.mark_through_ref(holder);
            }
        }

        if let Some(length) = self.binding.object_array_length(object) {
            self.do_chunked_array(object, 0, length, array_chunk_size);
        } else {
            let ty = self.binding.reference_type(object);
            let discovered = ty != ReferenceType::None
                && self
                    .binding
                    .ref_processor(G::TYPE)
                    .discover_reference(object, ty);
            let binding = self.binding;
            binding.scan_object(object, discovered, |slot| self.do_slot(slot));
        }
    }

    /// Scan `from..to` of an array. A range longer than one chunk is split: the suffix is pushed
    /// back as a new task for this or another worker before the first chunk is scanned.
    fn do_chunked_array(
        &mut self,
        object: ObjectReference,
        from: usize,
        to: usize,
        array_chunk_size: usize,
    ) {
        let end = if to - from > array_chunk_size {
            let split = from + array_chunk_size;
            self.queue.push(MarkTask::array_chunk(object, split, to));
            self.stats.pushed += 1;
            self.stats.array_chunks += 1;
            split
        } else {
            to
        };
        if from < end {
            let binding = self.binding;
            binding.scan_array_range(object, from, end, |slot| self.do_slot(slot));
        }
    }

    fn dedup(&mut self, object: ObjectReference) {
        let requested = match self.mode.dedup {
            StringDedupMode::NoDedup => return,
            StringDedupMode::EnqueueDedup => {
                self.binding.is_string(object)
                    && self.binding.is_dedup_candidate_age(object)
                    && self.binding.try_request_dedup(object)
            }
            StringDedupMode::AlwaysDedup => {
                self.binding.is_string(object) && self.binding.try_request_dedup(object)
            }
        };
        if requested {
            self.dedup_requests.push(object);
            if self.dedup_requests.len() >= DEDUP_BATCH_SIZE {
                self.flush_dedup_requests();
            }
        }
    }

    pub fn flush_dedup_requests(&mut self) {
        if !self.dedup_requests.is_empty() {
            let requests = std::mem::take(&mut self.dedup_requests);
            self.binding.enqueue_dedup_requests(requests);
        }
    }
}
