//! The parallel marking engine.
//!
//! Every worker runs [`ConcurrentMark::mark_loop`] on its own queue. A worker first drains the
//! leftover queues (queues beyond the number of active workers, filled by an earlier phase with
//! more workers), then repeats: check for cancellation, drain completed SATB buffers, process up
//! to one stride of tasks from its own queue or stolen from peers. A stride without any task
//! makes the worker offer termination. The phase completes when all workers agree that no work
//! is left, at which point every object reachable from the roots and the SATB snapshot (and
//! owned by the generation being marked) is marked and scanned exactly once.

pub mod closure;

use std::sync::atomic::{AtomicBool, Ordering};

use crate::plan::gc_state::GCState;
use crate::plan::generation::{Generation, GenerationType, StringDedupMode};
use crate::scheduler::{GCTask, TaskQueueSet, TaskTerminator, TerminatorTerminator, WorkerGroup};
use crate::util::options::Options;
use crate::util::statistics::MarkStats;
use crate::util::ObjectReference;
use crate::vm::{
    GCBinding, ReferenceProcessor, RegionService, SuspendibleThreadSetJoiner,
    SuspendibleThreadSetLeaver,
};

use self::closure::{
    GenerationKind, GlobalGen, GlobalNonGen, LivenessCache, MarkMode, MarkRefsClosure, Old,
    Young,
};

/// How a mark loop ended.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum MarkResult {
    /// All workers agreed that no marking work is left.
    Completed,
    /// The cycle was cancelled. The marking state is partial and must be abandoned.
    Cancelled,
}

/// Stops waiting for termination once the cycle is cancelled.
struct CancelledTerminatorTerminator<'a, B: GCBinding> {
    binding: &'a B,
}

impl<B: GCBinding> TerminatorTerminator for CancelledTerminatorTerminator<'_, B> {
    fn should_exit_termination(&self) -> bool {
        self.binding.cancelled_gc()
    }
}

/// The marking of one generation.
pub struct ConcurrentMark<'a, B: GCBinding> {
    binding: &'a B,
    gc_state: &'a GCState,
    generation_type: GenerationType,
    task_queues: &'a TaskQueueSet,
    old_gen_task_queues: Option<std::sync::Arc<TaskQueueSet>>,
    options: &'a Options,
    stats: MarkStats,
}

impl<'a, B: GCBinding> ConcurrentMark<'a, B> {
    pub fn new(
        binding: &'a B,
        gc_state: &'a GCState,
        generation: &'a Generation,
        options: &'a Options,
    ) -> Self {
        let task_queues = generation.task_queues();
        ConcurrentMark {
            binding,
            gc_state,
            generation_type: generation.generation_type(),
            task_queues,
            old_gen_task_queues: generation.old_gen_task_queues(),
            options,
            stats: MarkStats::new(task_queues.size()),
        }
    }

    pub fn generation_type(&self) -> GenerationType {
        self.generation_type
    }

    pub fn task_queues(&self) -> &TaskQueueSet {
        self.task_queues
    }

    pub fn stats(&self) -> &MarkStats {
        &self.stats
    }

    fn mark_mode(&self, dedup: StringDedupMode) -> MarkMode {
        MarkMode {
            // Old marking runs between young cycles that never leave forwarded objects in old
            // regions, so it never heals slots.
            update_refs: !self.generation_type.is_old() && self.binding.has_forwarded_objects(),
            visit_metadata: self.binding.unload_classes(),
            dedup,
        }
    }

    /// Is there any work a worker could pick up?
    fn has_visible_work(&self) -> bool {
        !self.task_queues.is_empty() || self.binding.satb_queue_set().completed_buffers_num() > 0
    }

    /// Mark the roots on all active workers. Root `i` is marked by worker `i % workers`, into
    /// that worker's queue.
    pub fn mark_roots(&self, workers: &WorkerGroup, roots: &[ObjectReference]) {
        let n = workers.active_workers();
        self.task_queues.reserve(n);
        let task = MarkRootsTask { mark: self, roots };
        workers.run_task(&task);
        debug!(
            "{} marking: {} roots, {} tasks queued",
            self.generation_type.name(),
            roots.len(),
            self.task_queues.tasks()
        );
    }

    fn mark_roots_work<G: GenerationKind>(
        &self,
        worker_id: usize,
        nworkers: usize,
        roots: &[ObjectReference],
    ) {
        let mode = self.mark_mode(self.options.string_dedup);
        let mut cl = self.new_closure::<G>(worker_id, mode);
        for root in roots.iter().skip(worker_id).step_by(nworkers) {
            cl.mark_through_ref(*root);
        }
        self.stats.merge(worker_id, cl.stats);
    }

    fn new_closure<G: GenerationKind>(
        &self,
        worker_id: usize,
        mode: MarkMode,
    ) -> MarkRefsClosure<'_, B, G> {
        let queue = self.task_queues.queue(worker_id).owner();
        let old_queue = self
            .old_gen_task_queues
            .as_deref()
            .filter(|_| G::TYPE.is_young())
            .map(|queues| queues.queue(worker_id).owner());
        MarkRefsClosure::new(self.binding, queue, old_queue, mode)
    }

    /// Concurrent marking on all active workers. Cancellable.
    pub fn concurrent_mark(&self, workers: &WorkerGroup) -> MarkResult {
        self.run_marking(workers, true)
    }

    /// Final marking at a safepoint: flush the partial SATB buffers of all threads and mark to
    /// completion. Not cancellable.
    pub fn finish_mark(&self, workers: &WorkerGroup) -> MarkResult {
        self.binding.satb_queue_set().flush_all_queues();
        let result = self.run_marking(workers, false);
        debug_assert_eq!(result, MarkResult::Completed);
        assert!(
            self.task_queues.is_empty(),
            "{} marking finished with work left in the queues",
            self.generation_type.name()
        );
        let stats = self.stats.total();
        info!(
            "{} marking finished: {}",
            self.generation_type.name(),
            stats
        );
        result
    }

    fn run_marking(&self, workers: &WorkerGroup, cancellable: bool) -> MarkResult {
        let nworkers = workers.active_workers();
        self.task_queues.reserve(nworkers);
        let task = MarkingTask {
            mark: self,
            terminator: TaskTerminator::new(nworkers),
            cancellable,
            dedup: self.options.string_dedup,
            cancelled: AtomicBool::new(false),
        };
        workers.run_task(&task);
        if task.cancelled.load(Ordering::Acquire) {
            MarkResult::Cancelled
        } else {
            MarkResult::Completed
        }
    }

    /// Run the mark loop of one worker.
    pub fn mark_loop(
        &self,
        worker_id: usize,
        terminator: &TaskTerminator,
        cancellable: bool,
        dedup: StringDedupMode,
    ) -> MarkResult {
        match self.generation_type {
            GenerationType::Young => {
                self.mark_loop_prework::<Young>(worker_id, terminator, cancellable, dedup)
            }
            GenerationType::Old => {
                self.mark_loop_prework::<Old>(worker_id, terminator, cancellable, dedup)
            }
            GenerationType::GlobalGen => {
                self.mark_loop_prework::<GlobalGen>(worker_id, terminator, cancellable, dedup)
            }
            GenerationType::GlobalNonGen => {
                self.mark_loop_prework::<GlobalNonGen>(worker_id, terminator, cancellable, dedup)
            }
        }
    }

    fn mark_loop_prework<G: GenerationKind>(
        &self,
        worker_id: usize,
        terminator: &TaskTerminator,
        cancellable: bool,
        dedup: StringDedupMode,
    ) -> MarkResult {
        let mut cl = self.new_closure::<G>(worker_id, self.mark_mode(dedup));
        let mut live = LivenessCache::new(self.binding.regions().num_regions());

        let result = self.mark_loop_work(&mut cl, &mut live, worker_id, terminator, cancellable);
        trace!(
            "{} mark loop of worker {} exits: {:?}",
            G::TYPE.name(),
            worker_id,
            result
        );

        live.flush(self.binding);
        cl.flush_dedup_requests();
        self.stats.merge(worker_id, cl.stats);
        result
    }

    fn mark_loop_work<G: GenerationKind>(
        &self,
        cl: &mut MarkRefsClosure<'_, B, G>,
        live: &mut LivenessCache,
        worker_id: usize,
        terminator: &TaskTerminator,
        cancellable: bool,
    ) -> MarkResult {
        let stride = self.options.mark_loop_stride;
        let chunk_size = self.options.array_chunk_size;
        let queues = self.task_queues;
        let sts_active = cancellable && self.options.suspendible_workers;

        debug_assert_eq!(
            self.gc_state.active_generation(),
            Some(G::TYPE),
            "Marking {} while another generation is active",
            G::TYPE.name()
        );
        self.binding
            .ref_processor(G::TYPE)
            .set_mark_closure(worker_id, G::TYPE);

        assert_eq!(
            queues.get_reserved(),
            terminator.n_threads(),
            "Need to reserve one queue per active worker"
        );

        // Leftover queues. Tasks found there are processed by this worker. New work goes to its
        // own queue, which is picked up by the loop below.
        let mut claimed = queues.claim_next();
        while let Some(q) = claimed {
            if cancellable && self.binding.check_cancelled_gc_and_yield(sts_active) {
                return MarkResult::Cancelled;
            }
            let mut leftover = q.owner();
            let mut drained = false;
            for _ in 0..stride {
                match leftover.pop() {
                    Some(t) => cl.do_task(t, live, chunk_size),
                    None => {
                        drained = true;
                        break;
                    }
                }
            }
            if drained {
                debug_assert!(leftover.is_empty());
                claimed = queues.claim_next();
            }
        }

        let satb = self.binding.satb_queue_set();
        let tt = CancelledTerminatorTerminator {
            binding: self.binding,
        };
        loop {
            if cancellable && self.binding.check_cancelled_gc_and_yield(sts_active) {
                return MarkResult::Cancelled;
            }
            while satb.apply_closure_to_completed_buffer(|buffer| cl.drain_satb_buffer(buffer)) {}

            let mut work = 0;
            for _ in 0..stride {
                let task = match cl.pop() {
                    Some(t) => Some(t),
                    None => {
                        let stolen = queues.steal(worker_id);
                        if stolen.is_some() {
                            cl.stats.stolen += 1;
                        }
                        stolen
                    }
                };
                match task {
                    Some(t) => {
                        cl.do_task(t, live, chunk_size);
                        work += 1;
                    }
                    None => break,
                }
            }

            if work == 0 {
                // Leave the suspendible thread set while waiting, otherwise the idle worker
                // would hold up safepoints.
                let _leaver = SuspendibleThreadSetLeaver::new(
                    self.binding.suspendible_thread_set(),
                    sts_active,
                );
                let terminated = terminator.offer_termination(
                    worker_id,
                    &|| self.has_visible_work(),
                    cancellable.then_some(&tt as &dyn TerminatorTerminator),
                );
                if terminated {
                    return MarkResult::Completed;
                }
            }
        }
    }
}

/// Marks the roots, one slice per worker.
struct MarkRootsTask<'m, 'a, B: GCBinding> {
    mark: &'m ConcurrentMark<'a, B>,
    roots: &'m [ObjectReference],
}

impl<B: GCBinding> GCTask for MarkRootsTask<'_, '_, B> {
    fn name(&self) -> &'static str {
        "MarkRoots"
    }

    fn work(&self, worker_id: usize) {
        let mark = self.mark;
        let n = mark.task_queues.get_reserved();
        match mark.generation_type {
            GenerationType::Young => mark.mark_roots_work::<Young>(worker_id, n, self.roots),
            GenerationType::Old => mark.mark_roots_work::<Old>(worker_id, n, self.roots),
            GenerationType::GlobalGen => {
                mark.mark_roots_work::<GlobalGen>(worker_id, n, self.roots)
            }
            GenerationType::GlobalNonGen => {
                mark.mark_roots_work::<GlobalNonGen>(worker_id, n, self.roots)
            }
        }
    }
}

/// Runs the mark loop on every active worker.
struct MarkingTask<'m, 'a, B: GCBinding> {
    mark: &'m ConcurrentMark<'a, B>,
    terminator: TaskTerminator,
    cancellable: bool,
    dedup: StringDedupMode,
    cancelled: AtomicBool,
}

impl<B: GCBinding> GCTask for MarkingTask<'_, '_, B> {
    fn name(&self) -> &'static str {
        if self.cancellable {
            "ConcurrentMarking"
        } else {
            "FinalMarking"
        }
    }

    fn work(&self, worker_id: usize) {
        let binding = self.mark.binding;
        let _joiner = SuspendibleThreadSetJoiner::new(
            binding.suspendible_thread_set(),
            self.cancellable && self.mark.options.suspendible_workers,
        );
        let result = self
            .mark
            .mark_loop(worker_id, &self.terminator, self.cancellable, self.dedup);
        if result == MarkResult::Cancelled {
            self.cancelled.store(true, Ordering::Release);
        }
    }
}

#[cfg(test)]
mod tests;
