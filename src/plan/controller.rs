//! The cycle driver.
//!
//! [`CycleController`] runs one cycle per call on the calling (control) thread. A concurrent
//! cycle that gets cancelled continues as a degenerated cycle at the point it reached, and a
//! degenerated cycle that cannot evacuate is upgraded to a full collection.

use std::sync::Arc;

use crate::plan::gc_state::GCState;
use crate::plan::generation::{Generation, GenerationType};
use crate::plan::mark::{ConcurrentMark, MarkResult};
use crate::plan::old_generation::{OldGeneration, OldGenerationState};
use crate::plan::session::{GCCause, GCSession};
use crate::policy::{CollectorPolicy, DegenPoint};
use crate::scheduler::WorkerGroup;
use crate::util::options::Options;
use crate::util::ObjectReference;
use crate::vm::{GCBinding, MarkingContext, RegionService};

/// Old regions added to the collection set of one mixed cycle.
const MIXED_REGIONS_PER_CYCLE: usize = 8;

/// How a cycle concluded.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum CycleOutcome {
    /// The concurrent cycle completed. An abbreviated cycle found no regions worth evacuating.
    Concurrent { abbreviated: bool },
    /// The concurrent cycle was cancelled at `point` and finished in a stop-the-world pause.
    Degenerated { point: DegenPoint, abbreviated: bool },
    /// The degenerated cycle could not evacuate and a full collection ran instead.
    DegeneratedUpgradedToFull,
    Full,
    /// Old marking completed.
    OldMarked,
    /// Coalesce-and-fill of the old regions completed.
    OldFilled,
    /// Old marking or coalesce-and-fill was preempted. It resumes in the next old cycle.
    OldInterrupted,
    /// No cycle ran.
    Skipped,
}

pub struct CycleController<B: GCBinding> {
    binding: Arc<B>,
    options: Options,
    policy: Arc<CollectorPolicy>,
    workers: WorkerGroup,
    gc_state: Arc<GCState>,
    young: Arc<Generation>,
    global: Generation,
    /// `None` in non-generational mode.
    old: Option<OldGeneration<B>>,
}

impl<B: GCBinding> CycleController<B> {
    /// Create a controller. In generational mode the heap has `old_capacity` bytes of old
    /// space.
    pub fn new(binding: Arc<B>, options: Options, generational: bool, old_capacity: usize) -> Self {
        match crate::util::logger::try_init() {
            Ok(_) => debug!("gencoord initialized the logger."),
            Err(_) => debug!(
                "gencoord failed to initialize the logger. Possibly a logger has been initialized by user."
            ),
        }
        let threads = options.threads;
        let policy = Arc::new(CollectorPolicy::new(generational));
        let gc_state = Arc::new(GCState::default());
        let young = Arc::new(Generation::new(GenerationType::Young, threads));
        let global = Generation::new(
            if generational {
                GenerationType::GlobalGen
            } else {
                GenerationType::GlobalNonGen
            },
            threads,
        );
        let old = generational.then(|| {
            OldGeneration::new(
                binding.clone(),
                gc_state.clone(),
                young.clone(),
                policy.clone(),
                &options,
                old_capacity,
            )
        });
        info!(
            "Cycle controller: {} mode, {} workers",
            if generational {
                "generational"
            } else {
                "single generation"
            },
            threads
        );
        CycleController {
            binding,
            workers: WorkerGroup::new(threads),
            options,
            policy,
            gc_state,
            young,
            global,
            old,
        }
    }

    pub fn policy(&self) -> &Arc<CollectorPolicy> {
        &self.policy
    }

    pub fn gc_state(&self) -> &GCState {
        &self.gc_state
    }

    pub fn workers(&self) -> &WorkerGroup {
        &self.workers
    }

    pub fn young_generation(&self) -> &Generation {
        &self.young
    }

    pub fn old_generation(&self) -> Option<&OldGeneration<B>> {
        self.old.as_ref()
    }

    fn old(&self) -> &OldGeneration<B> {
        self.old
            .as_ref()
            .expect("The old generation only exists in generational mode")
    }

    fn generation(&self, generation: GenerationType) -> &Generation {
        match generation {
            GenerationType::Young => &self.young,
            GenerationType::Old => self.old().generation(),
            GenerationType::GlobalGen | GenerationType::GlobalNonGen => &self.global,
        }
    }

    /// Stop starting cycles.
    pub fn shutdown(&self) {
        info!("Cycle controller shutting down");
        self.policy.record_shutdown();
    }

    /// Run a concurrent cycle of `generation`. Old cycles continue the old generation from its
    /// current state: coalesce-and-fill, bootstrap or old marking.
    pub fn run_cycle(
        &self,
        generation: GenerationType,
        cause: GCCause,
        roots: &[ObjectReference],
    ) -> CycleOutcome {
        assert_eq!(
            generation == GenerationType::GlobalNonGen,
            self.old.is_none(),
            "{:?} cycles are not available in this mode",
            generation
        );
        if self.policy.is_at_shutdown() {
            debug!("Not starting a {} cycle at shutdown", generation.name());
            return CycleOutcome::Skipped;
        }
        match cause {
            GCCause::ExplicitRequest => self.policy.record_explicit_to_concurrent(),
            GCCause::ImplicitRequest => self.policy.record_implicit_to_concurrent(),
            GCCause::Heuristics | GCCause::AllocationFailure => {}
        }

        let _session = GCSession::new(&self.policy, generation, cause);
        let outcome = if generation.is_old() {
            self.run_old_cycle(roots)
        } else {
            self.run_concurrent_cycle(generation, roots)
        };
        info!("{} cycle outcome: {:?}", generation.name(), outcome);
        outcome
    }

    /// Run a stop-the-world collection of the whole heap.
    pub fn run_full_cycle(&self, cause: GCCause, roots: &[ObjectReference]) -> CycleOutcome {
        if self.policy.is_at_shutdown() {
            debug!("Not starting a full cycle at shutdown");
            return CycleOutcome::Skipped;
        }
        match cause {
            GCCause::ExplicitRequest => self.policy.record_explicit_to_full(),
            GCCause::ImplicitRequest => self.policy.record_implicit_to_full(),
            GCCause::AllocationFailure => self.policy.record_alloc_failure_to_full(),
            GCCause::Heuristics => {}
        }
        let _session = GCSession::new(&self.policy, self.global.generation_type(), cause);
        self.full_gc(roots);
        self.policy.record_success_full();
        CycleOutcome::Full
    }

    fn start_mark(&self, generation: GenerationType) {
        self.binding.marking_context().reset(generation);
        self.gc_state.set_active_generation(Some(generation));
        self.gc_state.set_concurrent_young_mark_in_progress(true);
        self.gc_state.sync_satb_barrier(self.binding.satb_queue_set());
    }

    fn end_mark(&self, generation: GenerationType, concurrent: bool) {
        self.gc_state.set_active_generation(None);
        self.gc_state.set_concurrent_young_mark_in_progress(false);
        self.gc_state.sync_satb_barrier(self.binding.satb_queue_set());
        if generation == GenerationType::GlobalGen {
            self.after_global_mark(concurrent);
        }
    }

    fn new_mark<'a>(&'a self, generation: &'a Generation) -> ConcurrentMark<'a, B> {
        ConcurrentMark::new(&*self.binding, &self.gc_state, generation, &self.options)
    }

    fn run_concurrent_cycle(
        &self,
        generation: GenerationType,
        roots: &[ObjectReference],
    ) -> CycleOutcome {
        if generation.is_global() {
            self.abandon_old_generation();
        } else if self
            .old
            .as_ref()
            .is_some_and(|old| old.state() == OldGenerationState::Marking)
        {
            // Old marking is paused. Young marking would drop the old pointers the mutators
            // recorded for it.
            self.old().transfer_pointers_from_satb(&self.workers);
        }

        if self.binding.cancelled_gc() {
            return self.degenerated_cycle(generation, DegenPoint::OutsideCycle, roots);
        }

        self.start_mark(generation);
        let mark = self.new_mark(self.generation(generation));
        mark.mark_roots(&self.workers, roots);
        if self.binding.cancelled_gc() {
            return self.degenerated_cycle(generation, DegenPoint::Roots, roots);
        }
        if mark.concurrent_mark(&self.workers) == MarkResult::Cancelled {
            return self.degenerated_cycle(generation, DegenPoint::Mark, roots);
        }
        mark.finish_mark(&self.workers);
        self.end_mark(generation, true);

        let cset = self.choose_collection_set(generation);
        let abbreviated = cset == 0;
        if !abbreviated && !self.binding.evacuate_and_update_refs(generation, true) {
            return self.degenerated_cycle(generation, DegenPoint::Evac, roots);
        }
        self.rebuild_free_set(true);
        self.after_evacuation(generation);
        self.policy
            .record_success_concurrent(generation.is_young(), abbreviated);
        CycleOutcome::Concurrent { abbreviated }
    }

    /// Finish a cancelled cycle in a stop-the-world pause, starting from `point`.
    fn degenerated_cycle(
        &self,
        generation: GenerationType,
        point: DegenPoint,
        roots: &[ObjectReference],
    ) -> CycleOutcome {
        info!(
            "Degenerated {} cycle at {}",
            generation.name(),
            point.description()
        );
        self.policy.record_alloc_failure_to_degenerated(point);
        self.binding.clear_cancelled_gc();

        let marked = matches!(point, DegenPoint::Evac | DegenPoint::UpdateRefs);
        if !marked {
            if point == DegenPoint::OutsideCycle {
                self.start_mark(generation);
            }
            let mark = self.new_mark(self.generation(generation));
            if matches!(point, DegenPoint::OutsideCycle | DegenPoint::Roots) {
                mark.mark_roots(&self.workers, roots);
            }
            // Marking continues from whatever the cancelled concurrent mark left in the queues.
            mark.finish_mark(&self.workers);
            self.end_mark(generation, false);
        }

        let abbreviated = !marked && self.choose_collection_set(generation) == 0;
        if !abbreviated && !self.binding.evacuate_and_update_refs(generation, false) {
            info!("Degenerated {} cycle upgrades to full", generation.name());
            self.policy.record_degenerated_upgrade_to_full();
            self.full_gc(roots);
            return CycleOutcome::DegeneratedUpgradedToFull;
        }
        self.rebuild_free_set(false);
        self.after_evacuation(generation);
        self.policy
            .record_success_degenerated(generation.is_young(), abbreviated);
        CycleOutcome::Degenerated { point, abbreviated }
    }

    fn full_gc(&self, roots: &[ObjectReference]) {
        self.binding.clear_cancelled_gc();
        self.abandon_old_generation();
        self.young.clear_task_queues();
        self.global.clear_task_queues();

        let generation = self.global.generation_type();
        self.binding.marking_context().reset(generation);
        self.gc_state.set_active_generation(Some(generation));
        let mark = self.new_mark(&self.global);
        mark.mark_roots(&self.workers, roots);
        mark.finish_mark(&self.workers);
        self.gc_state.set_active_generation(None);

        self.binding.full_compact();
        // Compaction leaves no usable old mark bitmap behind.
        self.gc_state.set_old_bitmap_stable(false);
        self.rebuild_free_set(false);
    }

    /// Drop the state of an old collection in progress before the whole heap is collected.
    fn abandon_old_generation(&self) {
        let Some(old) = self.old.as_ref() else {
            return;
        };
        if self.gc_state.is_concurrent_old_mark_in_progress() {
            info!("Abandoning old marking");
            old.transfer_pointers_from_satb(&self.workers);
            old.cancel_marking();
            self.policy.record_interrupted_old();
        }
        self.binding.regions().abandon_collection_candidates();
        self.gc_state.set_prepare_for_old_mark_in_progress(false);
        old.transition_to(OldGenerationState::WaitingForBootstrap);
    }

    /// A global mark of a generational heap also completes the old mark bitmap.
    fn after_global_mark(&self, concurrent: bool) {
        let old = self.old();
        let regions = self.binding.regions();
        self.gc_state.set_old_bitmap_stable(true);
        old.set_live_bytes_after_last_mark(regions.live_bytes(GenerationType::Old));
        old.prepare_regions_and_collection_set(concurrent);
        if regions.unprocessed_old_collection_candidates() > 0 {
            old.transition_to(OldGenerationState::Evacuating);
        } else if regions.has_coalesce_and_fill_candidates() {
            old.transition_to(OldGenerationState::Filling);
        }
    }

    fn choose_collection_set(&self, generation: GenerationType) -> usize {
        let regions = self.binding.regions();
        let mut cset = regions.choose_collection_set(generation);
        if generation.is_young() && self.old().state() == OldGenerationState::Evacuating {
            let mixed = regions.select_mixed_collection_candidates(MIXED_REGIONS_PER_CYCLE);
            if mixed > 0 {
                debug!("Mixed cycle with {} old regions", mixed);
                self.policy.record_mixed_cycle();
                cset += mixed;
            }
        }
        cset
    }

    /// Once mixed cycles have evacuated every candidate, the remaining old regions are made
    /// parsable by the next old cycle.
    fn after_evacuation(&self, generation: GenerationType) {
        if !generation.is_young() {
            return;
        }
        let old = self.old();
        let regions = self.binding.regions();
        if old.state() == OldGenerationState::Evacuating
            && regions.unprocessed_old_collection_candidates() == 0
        {
            if regions.has_coalesce_and_fill_candidates() {
                old.transition_to(OldGenerationState::Filling);
            } else {
                old.transition_to(OldGenerationState::WaitingForBootstrap);
            }
        }
    }

    fn rebuild_free_set(&self, concurrent: bool) {
        let regions = self.binding.regions();
        let _lock = regions.heap_lock().lock().unwrap();
        regions.rebuild_free_set(concurrent);
    }

    fn run_old_cycle(&self, roots: &[ObjectReference]) -> CycleOutcome {
        let old = self.old();
        match old.state() {
            OldGenerationState::Evacuating => {
                debug!("Old collection candidates are still being evacuated");
                return CycleOutcome::Skipped;
            }
            OldGenerationState::Filling => {
                if !old.entry_coalesce_and_fill(&self.workers) {
                    // Stay in this state and resume the fill later.
                    self.binding.clear_cancelled_gc();
                    self.policy.record_interrupted_old();
                    return CycleOutcome::OldInterrupted;
                }
                old.transition_to(OldGenerationState::WaitingForBootstrap);
                return CycleOutcome::OldFilled;
            }
            OldGenerationState::WaitingForBootstrap => {
                old.bootstrap();
                self.bootstrap_old_marking(roots);
                if old.state() != OldGenerationState::Marking {
                    info!("Bootstrap cycle for old generation was abandoned");
                    return CycleOutcome::OldInterrupted;
                }
            }
            OldGenerationState::Bootstrapping => {
                self.bootstrap_old_marking(roots);
                if old.state() != OldGenerationState::Marking {
                    info!("Bootstrap cycle for old generation was abandoned");
                    return CycleOutcome::OldInterrupted;
                }
            }
            OldGenerationState::Marking => {}
        }
        self.resume_old_marking()
    }

    /// Run the young cycle that seeds the old mark queues with the old objects it finds.
    fn bootstrap_old_marking(&self, roots: &[ObjectReference]) {
        let old = self.old();
        old.start_marking();
        let outcome = self.run_concurrent_cycle(GenerationType::Young, roots);
        debug!("Old bootstrap cycle: {:?}", outcome);
        // A bootstrap upgraded to a full collection abandons old marking.
        if old.state() == OldGenerationState::Bootstrapping {
            old.transition_to(OldGenerationState::Marking);
        }
    }

    fn resume_old_marking(&self) -> CycleOutcome {
        let old = self.old();
        let regions = self.binding.regions();

        self.gc_state.set_active_generation(Some(GenerationType::Old));
        let mark = self.new_mark(old.generation());
        if mark.concurrent_mark(&self.workers) == MarkResult::Cancelled {
            self.gc_state.set_active_generation(None);
            self.binding.clear_cancelled_gc();
            info!("Old marking was interrupted");
            self.policy.record_interrupted_old();
            return CycleOutcome::OldInterrupted;
        }
        mark.finish_mark(&self.workers);
        self.gc_state.set_active_generation(None);

        old.set_live_bytes_after_last_mark(regions.live_bytes(GenerationType::Old));
        old.finish_marking();
        old.prepare_regions_and_collection_set(true);
        if regions.unprocessed_old_collection_candidates() > 0 {
            old.transition_to(OldGenerationState::Evacuating);
        } else if regions.has_coalesce_and_fill_candidates() {
            old.transition_to(OldGenerationState::Filling);
        } else {
            old.transition_to(OldGenerationState::WaitingForBootstrap);
        }
        old.record_success_concurrent(false);
        CycleOutcome::OldMarked
    }
}
