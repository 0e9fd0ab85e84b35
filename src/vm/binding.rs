use crate::plan::generation::GenerationType;
use crate::util::satb::SATBMarkQueueSet;
use crate::util::ObjectReference;
use crate::vm::reference::{ReferenceProcessor, ReferenceType};
use crate::vm::region::{RegionInfo, RegionService};
use crate::vm::slot::Slot;
use crate::vm::sts::SuspendibleThreadSet;

/// The mark bitmap of the binding.
pub trait MarkingContext: Send + Sync {
    /// Atomically set the mark bit. Return `true` if this call marked the object, `false` if it
    /// was already marked. For any object, exactly one caller gets `true` per marking.
    fn mark(&self, object: ObjectReference) -> bool;

    fn is_marked(&self, object: ObjectReference) -> bool;

    /// Clear the mark bits of every object in `generation`.
    fn reset(&self, generation: GenerationType);
}

/// The `GCBinding` trait is the heap service: everything the engines need from the VM and the
/// rest of the collector.
///
/// All methods may be called concurrently by marking workers unless noted otherwise.
pub trait GCBinding: Sized + 'static + Send + Sync {
    /// The type of reference slots.
    type Slot: Slot;
    type MarkingContext: MarkingContext;
    type ReferenceProcessor: ReferenceProcessor;
    type RegionService: RegionService;

    // --- Services ---

    fn marking_context(&self) -> &Self::MarkingContext;

    fn ref_processor(&self, generation: GenerationType) -> &Self::ReferenceProcessor;

    fn regions(&self) -> &Self::RegionService;

    fn satb_queue_set(&self) -> &SATBMarkQueueSet;

    fn suspendible_thread_set(&self) -> &dyn SuspendibleThreadSet;

    // --- Object model ---

    /// The region that contains `object`.
    fn region_of(&self, object: ObjectReference) -> RegionInfo;

    fn object_size_words(&self, object: ObjectReference) -> usize;

    /// Visit the reference slots of a non-array object. If `skip_referent` is set, the referent
    /// slot of a discovered reference object is not visited.
    fn scan_object<F: FnMut(Self::Slot)>(
        &self,
        object: ObjectReference,
        skip_referent: bool,
        f: F,
    );

    /// The length of a reference array, or `None` if `object` is not a reference array.
    fn object_array_length(&self, object: ObjectReference) -> Option<usize>;

    /// Visit the slots of the elements `from..to` of a reference array.
    fn scan_array_range<F: FnMut(Self::Slot)>(
        &self,
        object: ObjectReference,
        from: usize,
        to: usize,
        f: F,
    );

    /// The object that keeps the class of `object` alive, if classes can be unloaded.
    fn class_holder(&self, object: ObjectReference) -> Option<ObjectReference>;

    fn reference_type(&self, object: ObjectReference) -> ReferenceType;

    // --- String deduplication ---

    fn is_string(&self, object: ObjectReference) -> bool;

    /// The string has survived enough collections to be a deduplication candidate.
    fn is_dedup_candidate_age(&self, object: ObjectReference) -> bool;

    /// Atomically flag the string as requested for deduplication. Return `true` if this call
    /// set the flag.
    fn try_request_dedup(&self, object: ObjectReference) -> bool;

    /// Hand a batch of deduplication requests to the deduplication thread.
    fn enqueue_dedup_requests(&self, requests: Vec<ObjectReference>);

    // --- Forwarding and class unloading ---

    /// The heap still contains forwarded objects from an earlier evacuation, so slots must be
    /// healed while marking.
    fn has_forwarded_objects(&self) -> bool;

    fn resolve_forwarded(&self, object: ObjectReference) -> ObjectReference;

    /// Classes are unloaded in this cycle, so class metadata is traced as well.
    fn unload_classes(&self) -> bool;

    // --- Liveness ---

    /// Add `words` live words to the live data of `region`.
    fn increase_live_data(&self, region: usize, words: usize);

    // --- Cancellation ---

    /// Has the current cycle been cancelled? Cancellation is sticky until cleared.
    fn cancelled_gc(&self) -> bool;

    /// Request cancellation of the running concurrent cycle.
    fn cancel_gc(&self);

    fn clear_cancelled_gc(&self);

    /// Yield to a pending safepoint if `sts_active`, then return whether the cycle has been
    /// cancelled.
    fn check_cancelled_gc_and_yield(&self, sts_active: bool) -> bool;

    // --- Phases outside this crate ---

    /// Evacuate the collection set and update references. Return `false` if evacuation failed
    /// (e.g. out of memory) and the cycle must degenerate.
    fn evacuate_and_update_refs(&self, generation: GenerationType, concurrent: bool) -> bool;

    /// Compact the whole heap after a full marking.
    fn full_compact(&self);
}
