//! The old generation lifecycle.
//!
//! Old marking runs concurrently across many young cycles, so the old generation moves through
//! a small state machine:
//!
//! * `WaitingForBootstrap -> Bootstrapping`: the old mark bitmap is reset. The next young cycle
//!   seeds the old mark queues with the old objects it finds.
//! * `Bootstrapping -> Marking`: old marking runs between young cycles, which keep pushing old
//!   objects to the old queues.
//! * `Marking -> Evacuating`: the final old mark found mixed collection candidates. Young cycles
//!   evacuate them a few at a time.
//! * `Evacuating | WaitingForBootstrap -> Filling`: the dead objects of old regions that were
//!   not evacuated are coalesced into fillers. Filling can be preempted and resumed.
//! * `Filling -> WaitingForBootstrap`: every candidate region is parsable again.
//!
//! The old regions are made parsable before the old mark bitmap is reset, because the
//! remembered set scan of young cycles walks old regions using that bitmap. Global and full
//! cycles may move the old generation back to `WaitingForBootstrap` from any state.

use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::Arc;

use atomic::Atomic;
use bytemuck::NoUninit;
use strum_macros::IntoStaticStr;

use crate::plan::gc_state::GCState;
use crate::plan::generation::{Generation, GenerationType, StringDedupMode};
use crate::plan::mark::closure::{MarkMode, MarkRefsClosure, Old};
use crate::policy::CollectorPolicy;
use crate::scheduler::{GCTask, TaskQueueSet, WorkerGroup};
use crate::util::options::Options;
use crate::vm::{
    FillProgress, GCBinding, MarkingContext, ReferenceProcessor, RegionInfo, RegionService,
};

/// Fractions of live data are expressed in units of `1 / FRACTIONAL_DENOMINATOR`.
pub const FRACTIONAL_DENOMINATOR: usize = 65536;
/// The old generation may grow by half of its live data before the first old cycle.
pub const INITIAL_GROWTH_BEFORE_COMPACTION: usize = FRACTIONAL_DENOMINATOR / 2;
/// Before the first old marking, the old generation is assumed to be 1/16 live.
pub const INITIAL_LIVE_FRACTION: usize = FRACTIONAL_DENOMINATOR / 16;

#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash, NoUninit, IntoStaticStr)]
pub enum OldGenerationState {
    WaitingForBootstrap,
    /// Old regions are being made parsable by coalesce-and-fill.
    Filling,
    /// The old mark bitmap has been reset. The next young cycle seeds the old mark queues.
    Bootstrapping,
    Marking,
    /// Old marking found mixed collection candidates that young cycles will evacuate.
    Evacuating,
}

impl OldGenerationState {
    pub fn name(self) -> &'static str {
        match self {
            OldGenerationState::WaitingForBootstrap => "Waiting for Bootstrap",
            OldGenerationState::Filling => "Coalescing",
            OldGenerationState::Bootstrapping => "Bootstrapping",
            OldGenerationState::Marking => "Marking",
            OldGenerationState::Evacuating => "Evacuating",
        }
    }
}

impl fmt::Display for OldGenerationState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// A transition whose preconditions do not hold.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InvalidTransition {
    pub from: OldGenerationState,
    pub to: OldGenerationState,
    pub reason: &'static str,
}

impl fmt::Display for InvalidTransition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Invalid old generation transition from {} to {}: {}",
            self.from, self.to, self.reason
        )
    }
}

impl std::error::Error for InvalidTransition {}

pub struct OldGeneration<B: GCBinding> {
    generation: Generation,
    binding: Arc<B>,
    gc_state: Arc<GCState>,
    young: Arc<Generation>,
    policy: Arc<CollectorPolicy>,
    /// Written under the heap lock, read without it.
    state: Atomic<OldGenerationState>,
    /// How much the old generation may grow, as a fraction of its live data after the last old
    /// marking, before another old cycle is triggered.
    growth_before_compaction: AtomicUsize,
    min_growth_before_compaction: usize,
    live_bytes_after_last_mark: AtomicUsize,
    verify_transitions: bool,
}

impl<B: GCBinding> OldGeneration<B> {
    /// Create the old generation of a heap with `capacity` bytes of old space.
    pub fn new(
        binding: Arc<B>,
        gc_state: Arc<GCState>,
        young: Arc<Generation>,
        policy: Arc<CollectorPolicy>,
        options: &Options,
        capacity: usize,
    ) -> Self {
        OldGeneration {
            generation: Generation::new(GenerationType::Old, options.threads),
            binding,
            gc_state,
            young,
            policy,
            state: Atomic::new(OldGenerationState::WaitingForBootstrap),
            growth_before_compaction: AtomicUsize::new(INITIAL_GROWTH_BEFORE_COMPACTION),
            min_growth_before_compaction: options.min_old_gen_growth_percent
                * FRACTIONAL_DENOMINATOR
                / 100,
            live_bytes_after_last_mark: AtomicUsize::new(
                capacity * INITIAL_LIVE_FRACTION / FRACTIONAL_DENOMINATOR,
            ),
            verify_transitions: options.verify_old_transitions,
        }
    }

    pub fn generation(&self) -> &Generation {
        &self.generation
    }

    pub fn task_queues(&self) -> &Arc<TaskQueueSet> {
        self.generation.task_queues()
    }

    pub fn state(&self) -> OldGenerationState {
        self.state.load(Ordering::Acquire)
    }

    pub fn state_name(state: OldGenerationState) -> &'static str {
        state.name()
    }

    /// The old generation owns every region that is not young.
    pub fn contains_region(&self, region: &RegionInfo) -> bool {
        !region.is_young()
    }

    pub fn live_bytes_after_last_mark(&self) -> usize {
        self.live_bytes_after_last_mark.load(Ordering::Relaxed)
    }

    /// Record the live data found by an old marking. Every completed old marking halves the
    /// allowed growth, down to the configured minimum.
    pub fn set_live_bytes_after_last_mark(&self, bytes: usize) {
        self.live_bytes_after_last_mark.store(bytes, Ordering::Relaxed);
        let growth = self.growth_before_compaction.load(Ordering::Relaxed) / 2;
        self.growth_before_compaction.store(
            growth.max(self.min_growth_before_compaction),
            Ordering::Relaxed,
        );
    }

    pub fn growth_before_compaction(&self) -> usize {
        self.growth_before_compaction.load(Ordering::Relaxed)
    }

    /// Old usage in bytes above which the next old cycle should start.
    pub fn usage_trigger_threshold(&self) -> usize {
        let live = self.live_bytes_after_last_mark();
        live + live * self.growth_before_compaction() / FRACTIONAL_DENOMINATOR
    }

    /// Check the preconditions of moving to `new_state`.
    pub fn validate_transition(
        &self,
        new_state: OldGenerationState,
    ) -> Result<(), InvalidTransition> {
        use OldGenerationState::*;

        let from = self.state();
        let regions = self.binding.regions();
        let check = |ok: bool, reason: &'static str| {
            if ok {
                Ok(())
            } else {
                Err(InvalidTransition {
                    from,
                    to: new_state,
                    reason,
                })
            }
        };
        match new_state {
            Filling => {
                check(
                    from != Bootstrapping,
                    "Cannot begin making old regions parsable after bootstrapping",
                )?;
                check(
                    self.gc_state.is_old_bitmap_stable(),
                    "Cannot begin filling without first completing marking",
                )?;
                check(
                    regions.has_coalesce_and_fill_candidates(),
                    "Cannot begin filling without something to fill",
                )
            }
            WaitingForBootstrap => {
                check(
                    !self.gc_state.is_concurrent_old_mark_in_progress(),
                    "Cannot become ready for bootstrap during old mark",
                )?;
                check(
                    regions.unprocessed_old_collection_candidates() == 0,
                    "Cannot become ready for bootstrap with collection candidates",
                )?;
                check(
                    self.young.old_gen_task_queues().is_none(),
                    "Cannot become ready for bootstrap when still set up for bootstrapping",
                )
            }
            Bootstrapping => {
                check(
                    from == WaitingForBootstrap,
                    "Cannot reset the bitmap without making old regions parsable",
                )?;
                check(
                    regions.unprocessed_old_collection_candidates() == 0,
                    "Cannot bootstrap with mixed collection candidates",
                )?;
                check(
                    !self.gc_state.is_prepare_for_old_mark_in_progress(),
                    "Cannot still be making old regions parsable",
                )?;
                check(
                    self.young.old_gen_task_queues().is_none(),
                    "Cannot bootstrap while young still has old mark queues",
                )
            }
            Marking => {
                check(
                    from == Bootstrapping,
                    "Must have finished bootstrapping before marking",
                )?;
                check(
                    self.young.old_gen_task_queues().is_some(),
                    "Young generation needs old mark queues",
                )?;
                check(
                    self.gc_state.is_concurrent_old_mark_in_progress(),
                    "Should be marking old now",
                )
            }
            Evacuating => {
                check(
                    from == WaitingForBootstrap || from == Marking,
                    "Cannot have old collection candidates without first marking",
                )?;
                check(
                    regions.unprocessed_old_collection_candidates() > 0,
                    "Must have collection candidates here",
                )
            }
        }
    }

    /// Move to `new_state` under the heap lock. The caller must not hold the heap lock.
    ///
    /// # Panics
    ///
    /// Panics if transition verification is enabled and the preconditions of the new state do
    /// not hold.
    pub fn transition_to(&self, new_state: OldGenerationState) {
        let _lock = self.binding.regions().heap_lock().lock().unwrap();
        let current = self.state();
        if current == new_state {
            return;
        }
        info!(
            "Old generation transition from {} to {}",
            current, new_state
        );
        if self.verify_transitions {
            if let Err(e) = self.validate_transition(new_state) {
                panic!("{}", e);
            }
        }
        self.state.store(new_state, Ordering::Release);
    }

    /// Reset the old mark bitmap before a new old marking.
    pub fn prepare_gc(&self) {
        assert_ne!(
            self.state(),
            OldGenerationState::Filling,
            "Cannot reset old without making it parsable"
        );
        self.binding.marking_context().reset(GenerationType::Old);
        self.gc_state.set_old_bitmap_stable(false);
    }

    /// Move to `Bootstrapping` and reset the bitmap. The next young cycle must call
    /// [`OldGeneration::start_marking`] so its marking seeds the old queues.
    ///
    /// The transition is checked first, so a rejected bootstrap leaves the marks intact.
    pub fn bootstrap(&self) {
        self.transition_to(OldGenerationState::Bootstrapping);
        self.prepare_gc();
    }

    /// Install the old queues in the young generation and raise the old marking flag.
    pub fn start_marking(&self) {
        debug_assert_eq!(self.state(), OldGenerationState::Bootstrapping);
        self.young.set_old_gen_task_queues(Some(self.task_queues().clone()));
        self.gc_state.set_concurrent_old_mark_in_progress(true);
        self.gc_state.sync_satb_barrier(self.binding.satb_queue_set());
    }

    /// Tear down the marking state after the final old mark. The old bitmap is now complete.
    pub fn finish_marking(&self) {
        debug_assert!(self.task_queues().is_empty());
        self.young.set_old_gen_task_queues(None);
        self.gc_state.set_concurrent_old_mark_in_progress(false);
        self.gc_state.set_old_bitmap_stable(true);
        self.gc_state.sync_satb_barrier(self.binding.satb_queue_set());
    }

    /// Abandon an old marking: drop its SATB entries, queued work and discovered references.
    pub fn cancel_marking(&self) {
        if self.gc_state.is_concurrent_old_mark_in_progress() {
            info!("Abandon SATB buffers");
            self.binding.satb_queue_set().abandon_partial_marking();
        }
        self.generation.clear_task_queues();
        self.binding
            .ref_processor(GenerationType::Old)
            .abandon_partial_discovery();
        self.young.set_old_gen_task_queues(None);
        self.gc_state.set_concurrent_old_mark_in_progress(false);
        self.gc_state.sync_satb_barrier(self.binding.satb_queue_set());
    }

    /// Coalesce-and-fill with the active workers of `workers`.
    pub fn entry_coalesce_and_fill(&self, workers: &WorkerGroup) -> bool {
        info!(
            "Concurrent Coalesce and Fill ({}) using {} workers",
            self.generation.name(),
            workers.active_workers()
        );
        self.coalesce_and_fill(workers)
    }

    /// Make the old regions parsable: replace every run of dead objects in the fill candidates
    /// with one filler. Return `true` if all candidates are done, `false` if the work was
    /// preempted by a cancellation. A preempted fill is resumed by the next call, which sees
    /// the same candidates and continues where each region stopped.
    pub fn coalesce_and_fill(&self, workers: &WorkerGroup) -> bool {
        self.transition_to(OldGenerationState::Filling);
        self.gc_state.set_prepare_for_old_mark_in_progress(true);

        let regions = self.binding.regions();
        let candidates = regions.coalesce_and_fill_candidates();
        debug_assert!(candidates.len() <= regions.num_regions());
        debug!(
            "Starting (or resuming) coalesce-and-fill of {} old heap regions",
            candidates.len()
        );

        let task = CoalesceAndFillTask {
            binding: &*self.binding,
            regions: &candidates,
            nworkers: workers.active_workers(),
            preempted: AtomicBool::new(false),
        };
        workers.run_task(&task);

        if task.is_completed() {
            regions.abandon_collection_candidates();
            self.gc_state.set_prepare_for_old_mark_in_progress(false);
            true
        } else {
            // The bitmap must not be reset before filling is done: it tells live objects from
            // dead ones.
            debug!("Suspending coalesce-and-fill of old heap regions");
            false
        }
    }

    /// Move the old pointers recorded in SATB buffers to the old mark queues, so a young cycle
    /// that runs while old marking is paused does not drop them. Entries that do not point into
    /// an active old region are discarded. Return the number of discarded entries.
    pub fn transfer_pointers_from_satb(&self, workers: &WorkerGroup) -> usize {
        assert!(
            self.gc_state.is_concurrent_old_mark_in_progress(),
            "Only necessary during old marking"
        );
        info!("Transfer SATB buffers");
        self.binding.satb_queue_set().flush_all_queues();

        let task = PurgeSATBTask {
            binding: &*self.binding,
            task_queues: self.task_queues(),
            trashed: AtomicUsize::new(0),
        };
        workers.run_task(&task);

        let trashed = task.trashed.load(Ordering::Relaxed);
        info!("Purged {} oops from old generation SATB buffers", trashed);
        trashed
    }

    /// Update region states after the final old mark, then choose the mixed collection and
    /// coalesce-and-fill candidates and rebuild the free set.
    pub fn prepare_regions_and_collection_set(&self, concurrent: bool) {
        let regions = self.binding.regions();
        regions.update_region_states_after_mark(GenerationType::Old);
        {
            let _lock = regions.heap_lock().lock().unwrap();
            regions.prepare_for_old_collections();
        }
        {
            // No collection set was chosen, but immediate garbage may have been freed.
            let _lock = regions.heap_lock().lock().unwrap();
            regions.rebuild_free_set(concurrent);
        }
    }

    pub fn record_success_concurrent(&self, abbreviated: bool) {
        debug!(
            "Old cycle completed{}",
            if abbreviated { " (abbreviated)" } else { "" }
        );
        self.policy.record_success_old();
    }
}

/// Coalesce-and-fill of the candidate regions. Worker `i` handles candidates `i`, `i + n`,
/// `i + 2n`, ... for `n` workers.
struct CoalesceAndFillTask<'a, B: GCBinding> {
    binding: &'a B,
    regions: &'a [usize],
    nworkers: usize,
    preempted: AtomicBool,
}

impl<B: GCBinding> CoalesceAndFillTask<'_, B> {
    fn is_completed(&self) -> bool {
        !self.preempted.load(Ordering::Acquire)
    }
}

impl<B: GCBinding> GCTask for CoalesceAndFillTask<'_, B> {
    fn name(&self) -> &'static str {
        "ConcurrentCoalesceAndFill"
    }

    fn work(&self, worker_id: usize) {
        let regions = self.binding.regions();
        for region in self.regions.iter().skip(worker_id).step_by(self.nworkers) {
            if self.preempted.load(Ordering::Acquire) {
                return;
            }
            if regions.region_info(*region).humongous {
                continue;
            }
            if !fill_and_coalesce(self.binding, *region) {
                self.preempted.store(true, Ordering::Release);
                return;
            }
        }
    }
}

/// Walk one region from where its last fill stopped and coalesce every run of dead objects into
/// one filler. Return `false` if the walk was preempted.
fn fill_and_coalesce<B: GCBinding>(binding: &B, region: usize) -> bool {
    let regions = binding.regions();
    let mut cursor = match regions.fill_progress(region) {
        FillProgress::Filled => return true,
        FillProgress::Unfilled => 0,
        FillProgress::Filling { resume_at } => resume_at,
    };
    let mut dead_run: Option<usize> = None;

    while let Some(extent) = regions.object_at_or_after(region, cursor) {
        if binding.cancelled_gc() {
            // The pending dead run has not been filled yet. Start over from its beginning.
            let resume_at = dead_run.unwrap_or(extent.start);
            regions.set_fill_progress(region, FillProgress::Filling { resume_at });
            return false;
        }
        if extent.live {
            if let Some(start) = dead_run.take() {
                regions.fill_with_dead_object(region, start, extent.start - start);
            }
        } else if dead_run.is_none() {
            dead_run = Some(extent.start);
        }
        cursor = extent.start + extent.words;
    }
    if let Some(start) = dead_run {
        regions.fill_with_dead_object(region, start, cursor - start);
    }
    regions.set_fill_progress(region, FillProgress::Filled);
    true
}

/// Drains the completed SATB buffers into the old queues.
struct PurgeSATBTask<'a, B: GCBinding> {
    binding: &'a B,
    task_queues: &'a TaskQueueSet,
    trashed: AtomicUsize,
}

impl<B: GCBinding> GCTask for PurgeSATBTask<'_, B> {
    fn name(&self) -> &'static str {
        "PurgeSATB"
    }

    fn work(&self, worker_id: usize) {
        let mode = MarkMode {
            update_refs: false,
            visit_metadata: false,
            dedup: StringDedupMode::NoDedup,
        };
        let mut cl = MarkRefsClosure::<B, Old>::new(
            self.binding,
            self.task_queues.queue(worker_id).owner(),
            None,
            mode,
        );
        let satb = self.binding.satb_queue_set();
        while satb.apply_closure_to_completed_buffer(|buffer| cl.drain_satb_buffer(buffer)) {}
        self.trashed.fetch_add(cl.stats.discarded, Ordering::Relaxed);
    }
}
