//! Per-worker marking statistics.

use atomic_refcell::AtomicRefCell;
use std::fmt;
use std::ops::AddAssign;

/// Counters of one worker for one marking phase. Workers accumulate into a local copy and merge
/// it into [`MarkStats`] once, when they leave the mark loop.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct WorkerMarkStats {
    /// Objects and array chunks pushed to a task queue.
    pub pushed: usize,
    /// Tasks taken from any queue and processed.
    pub processed: usize,
    /// Tasks stolen from other workers' queues.
    pub stolen: usize,
    /// Entries read from completed SATB buffers.
    pub satb_drained: usize,
    /// References dropped because they point outside the generation being marked.
    pub discarded: usize,
    /// Array chunks split off a large array.
    pub array_chunks: usize,
}

impl AddAssign for WorkerMarkStats {
    fn add_assign(&mut self, other: Self) {
        self.pushed += other.pushed;
        self.processed += other.processed;
        self.stolen += other.stolen;
        self.satb_drained += other.satb_drained;
        self.discarded += other.discarded;
        self.array_chunks += other.array_chunks;
    }
}

impl fmt::Display for WorkerMarkStats {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "pushed: {}, processed: {}, stolen: {}, satb: {}, discarded: {}, array chunks: {}",
            self.pushed,
            self.processed,
            self.stolen,
            self.satb_drained,
            self.discarded,
            self.array_chunks
        )
    }
}

const STAT_BORROWED_MSG: &str = "MarkStats is already borrowed by another worker";

/// Marking statistics, one slot per worker. A slot is only written by the worker with the
/// same ordinal.
pub struct MarkStats {
    workers: Vec<AtomicRefCell<WorkerMarkStats>>,
}

impl MarkStats {
    pub fn new(num_workers: usize) -> Self {
        MarkStats {
            workers: (0..num_workers)
                .map(|_| AtomicRefCell::new(WorkerMarkStats::default()))
                .collect(),
        }
    }

    pub fn merge(&self, worker_id: usize, stats: WorkerMarkStats) {
        *self.workers[worker_id]
            .try_borrow_mut()
            .expect(STAT_BORROWED_MSG) += stats;
    }

    pub fn worker(&self, worker_id: usize) -> WorkerMarkStats {
        *self.workers[worker_id].borrow()
    }

    /// Sum over all workers.
    pub fn total(&self) -> WorkerMarkStats {
        let mut total = WorkerMarkStats::default();
        for w in self.workers.iter() {
            total += *w.borrow();
        }
        total
    }

    pub fn reset(&self) {
        for w in self.workers.iter() {
            *w.try_borrow_mut().expect(STAT_BORROWED_MSG) = WorkerMarkStats::default();
        }
    }
}
