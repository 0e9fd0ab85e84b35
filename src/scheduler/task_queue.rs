//! Per-worker task queues and the set that workers steal from.

use crossbeam::deque::{Steal, Stealer, Worker};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Mutex, MutexGuard};

use super::task::MarkTask;

/// The queue of one worker. The owner pushes and pops at one end through [`QueueOwner`],
/// every other worker steals from the other end.
pub struct ObjToScanQueue {
    worker: Mutex<Worker<MarkTask>>,
    stealer: Stealer<MarkTask>,
}

impl ObjToScanQueue {
    fn new() -> Self {
        let worker = Worker::new_lifo();
        let stealer = worker.stealer();
        ObjToScanQueue {
            worker: Mutex::new(worker),
            stealer,
        }
    }

    /// Take ownership of the queue. At most one worker owns a queue at any time: the worker with
    /// the same ordinal during marking, or whoever claimed the queue as a leftover.
    pub fn owner(&self) -> QueueOwner<'_> {
        QueueOwner {
            worker: self.worker.lock().unwrap(),
        }
    }

    pub fn steal(&self) -> Steal<MarkTask> {
        self.stealer.steal()
    }

    pub fn is_empty(&self) -> bool {
        self.stealer.is_empty()
    }

    pub fn len(&self) -> usize {
        self.stealer.len()
    }
}

/// The owner end of an [`ObjToScanQueue`].
pub struct QueueOwner<'a> {
    worker: MutexGuard<'a, Worker<MarkTask>>,
}

impl QueueOwner<'_> {
    pub fn push(&mut self, task: MarkTask) {
        self.worker.push(task);
    }

    pub fn pop(&mut self) -> Option<MarkTask> {
        self.worker.pop()
    }

    pub fn is_empty(&self) -> bool {
        self.worker.is_empty()
    }

    /// Drop all tasks.
    pub fn clear(&mut self) -> usize {
        let mut dropped = 0;
        while self.worker.pop().is_some() {
            dropped += 1;
        }
        dropped
    }
}

/// A fixed set of queues, one per potential worker.
///
/// Before a marking phase with `n` workers, `reserve(n)` hands queue `i < n` to worker `i`. The
/// queues at `n..` are leftovers (e.g. filled by an earlier phase with more workers) and are
/// claimed one by one through [`TaskQueueSet::claim_next`].
pub struct TaskQueueSet {
    queues: Vec<ObjToScanQueue>,
    reserved: AtomicUsize,
    claimed: AtomicUsize,
}

impl TaskQueueSet {
    pub fn new(n: usize) -> Self {
        debug_assert!(n > 0);
        TaskQueueSet {
            queues: (0..n).map(|_| ObjToScanQueue::new()).collect(),
            reserved: AtomicUsize::new(0),
            claimed: AtomicUsize::new(0),
        }
    }

    pub fn size(&self) -> usize {
        self.queues.len()
    }

    pub fn queue(&self, index: usize) -> &ObjToScanQueue {
        &self.queues[index]
    }

    /// Reserve the first `n` queues for `n` workers and reset the leftover claim cursor.
    pub fn reserve(&self, n: usize) {
        assert!(
            n <= self.size(),
            "Cannot reserve {} queues out of {}",
            n,
            self.size()
        );
        self.reserved.store(n, Ordering::Relaxed);
        self.claimed.store(n, Ordering::Release);
    }

    pub fn get_reserved(&self) -> usize {
        self.reserved.load(Ordering::Relaxed)
    }

    /// Claim the next unreserved queue. Each leftover queue is handed out at most once per
    /// reservation.
    pub fn claim_next(&self) -> Option<&ObjToScanQueue> {
        let size = self.size();
        if self.claimed.load(Ordering::Acquire) >= size {
            return None;
        }
        let index = self.claimed.fetch_add(1, Ordering::AcqRel);
        self.queues.get(index)
    }

    /// Steal one task from any queue other than the queue of `worker_id`.
    ///
    /// `Steal::Retry` means the victim was contended, not that it was empty, so the victim is
    /// retried. `None` is only returned after every other queue was seen empty.
    pub fn steal(&self, worker_id: usize) -> Option<MarkTask> {
        let n = self.size();
        for k in 1..n {
            let victim = &self.queues[(worker_id + k) % n];
            loop {
                match victim.steal() {
                    Steal::Success(task) => return Some(task),
                    Steal::Empty => break,
                    Steal::Retry => continue,
                }
            }
        }
        None
    }

    pub fn is_empty(&self) -> bool {
        self.queues.iter().all(|q| q.is_empty())
    }

    /// Number of tasks in all queues. Only accurate when no worker is running.
    pub fn tasks(&self) -> usize {
        self.queues.iter().map(|q| q.len()).sum()
    }

    /// Drop every task in every queue. Must not be called while a worker owns a queue.
    pub fn clear(&self) -> usize {
        self.queues.iter().map(|q| q.owner().clear()).sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::util::ObjectReference;
    use std::collections::HashSet;

    fn task(i: usize) -> MarkTask {
        MarkTask::new(ObjectReference::from_raw(i << 3).unwrap())
    }

    #[test]
    fn owner_is_lifo() {
        let set = TaskQueueSet::new(1);
        let mut q = set.queue(0).owner();
        q.push(task(1));
        q.push(task(2));
        assert_eq!(q.pop(), Some(task(2)));
        assert_eq!(q.pop(), Some(task(1)));
        assert_eq!(q.pop(), None);
    }

    #[test]
    fn claim_leftover_queues_once() {
        let set = TaskQueueSet::new(4);
        set.reserve(2);
        assert_eq!(set.get_reserved(), 2);
        assert!(std::ptr::eq(set.claim_next().unwrap(), set.queue(2)));
        assert!(std::ptr::eq(set.claim_next().unwrap(), set.queue(3)));
        assert!(set.claim_next().is_none());
        assert!(set.claim_next().is_none());

        set.reserve(4);
        assert!(set.claim_next().is_none());
    }

    #[test]
    #[should_panic]
    fn reserve_too_many() {
        let set = TaskQueueSet::new(2);
        set.reserve(3);
    }

    #[test]
    fn steal_skips_own_queue() {
        let set = TaskQueueSet::new(3);
        set.queue(0).owner().push(task(1));
        assert_eq!(set.steal(0), None);
        assert_eq!(set.steal(2), Some(task(1)));
        assert!(set.is_empty());
    }

    #[test]
    fn concurrent_stealing_loses_nothing() {
        let set = TaskQueueSet::new(4);
        {
            let mut q = set.queue(0).owner();
            for i in 1..=1000 {
                q.push(task(i));
            }
        }
        let seen = Mutex::new(HashSet::new());
        std::thread::scope(|s| {
            for w in 1..4 {
                let set = &set;
                let seen = &seen;
                s.spawn(move || {
                    while let Some(t) = set.steal(w) {
                        assert!(seen.lock().unwrap().insert(t.object()));
                    }
                });
            }
        });
        assert_eq!(seen.lock().unwrap().len(), 1000);
        assert_eq!(set.tasks(), 0);
    }

    #[test]
    fn clear_drops_everything() {
        let set = TaskQueueSet::new(2);
        set.queue(0).owner().push(task(1));
        set.queue(1).owner().push(task(2));
        assert_eq!(set.tasks(), 2);
        assert_eq!(set.clear(), 2);
        assert!(set.is_empty());
    }
}
