//! Snapshot-at-the-beginning buffers.
//!
//! While concurrent marking is active, the mutator write barrier records the reference a store
//! is about to overwrite in a thread-local [`SATBMarkQueue`]. A full local buffer is handed to
//! the shared [`SATBMarkQueueSet`], where marking workers pick it up and mark through every
//! entry. At a safepoint the partial local buffers of all threads are flushed as well, so the
//! final mark sees every snapshot reference.

use crate::util::ObjectReference;
use crossbeam::queue::SegQueue;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

type Buffer = Vec<ObjectReference>;

/// The thread-local half of the SATB barrier. One per mutator thread.
///
/// The local buffer is only touched by its owning thread, except at a safepoint when the
/// collector flushes or abandons it. The mutex is therefore uncontended.
pub struct SATBMarkQueue {
    buffer: Arc<Mutex<Buffer>>,
}

impl SATBMarkQueue {
    /// Number of references in the local buffer that have not been handed off yet.
    pub fn len(&self) -> usize {
        self.buffer.lock().unwrap().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

/// The shared set of completed SATB buffers.
pub struct SATBMarkQueueSet {
    buffer_size: usize,
    active: AtomicBool,
    completed: SegQueue<Buffer>,
    /// Number of buffers in `completed`. Raised before the buffer is pushed, so it never
    /// reads lower than the number of buffers a producer has handed off.
    completed_buffers: AtomicUsize,
    /// Local buffers of registered threads, used for flushing at a safepoint. An entry
    /// outlives its thread until the buffer has been flushed or abandoned.
    queues: Mutex<Vec<Arc<Mutex<Buffer>>>>,
}

impl SATBMarkQueueSet {
    pub fn new(buffer_size: usize) -> Self {
        debug_assert!(buffer_size > 0);
        SATBMarkQueueSet {
            buffer_size,
            active: AtomicBool::new(false),
            completed: SegQueue::new(),
            completed_buffers: AtomicUsize::new(0),
            queues: Mutex::new(vec![]),
        }
    }

    /// Create the thread-local queue for a new mutator thread.
    pub fn register_thread(&self) -> SATBMarkQueue {
        let buffer = Arc::new(Mutex::new(Vec::with_capacity(self.buffer_size)));
        let mut queues = self.queues.lock().unwrap();
        queues.retain(|q| Arc::strong_count(q) > 1 || !q.lock().unwrap().is_empty());
        queues.push(buffer.clone());
        SATBMarkQueue { buffer }
    }

    pub fn is_active(&self) -> bool {
        self.active.load(Ordering::Acquire)
    }

    /// Turn the barrier on or off for all threads.
    pub fn set_active_all_threads(&self, active: bool) {
        let was_active = self.active.swap(active, Ordering::AcqRel);
        debug_assert!(
            was_active != active,
            "SATB barrier is already {}",
            if active { "active" } else { "inactive" }
        );
    }

    /// Record a pre-write value. This is the slow path of the write barrier: the entry is
    /// dropped when marking is not active.
    pub fn enqueue(&self, queue: &SATBMarkQueue, object: ObjectReference) {
        if !self.is_active() {
            return;
        }
        let full = {
            let mut buffer = queue.buffer.lock().unwrap();
            buffer.push(object);
            if buffer.len() >= self.buffer_size {
                Some(std::mem::replace(
                    &mut *buffer,
                    Vec::with_capacity(self.buffer_size),
                ))
            } else {
                None
            }
        };
        if let Some(full) = full {
            self.enqueue_completed_buffer(full);
        }
    }

    fn enqueue_completed_buffer(&self, buffer: Buffer) {
        if buffer.is_empty() {
            return;
        }
        self.completed_buffers.fetch_add(1, Ordering::AcqRel);
        self.completed.push(buffer);
    }

    /// Number of completed buffers waiting to be processed. A buffer is counted as soon as
    /// its producer starts handing it off.
    pub fn completed_buffers_num(&self) -> usize {
        self.completed_buffers.load(Ordering::Acquire)
    }

    /// Take one completed buffer and apply `f` to its entries. Return `false` if there was no
    /// completed buffer. Each buffer is handed to exactly one caller.
    pub fn apply_closure_to_completed_buffer<F>(&self, mut f: F) -> bool
    where
        F: FnMut(&[ObjectReference]),
    {
        match self.completed.pop() {
            Some(buffer) => {
                self.completed_buffers.fetch_sub(1, Ordering::AcqRel);
                f(&buffer);
                true
            }
            None => false,
        }
    }

    /// Move the partial buffers of all threads to the completed set, including the buffers
    /// left behind by threads that have exited. Must be called when the mutators are stopped,
    /// or while they are known not to store references.
    pub fn flush_all_queues(&self) {
        let mut queues = self.queues.lock().unwrap();
        let mut flushed = 0;
        queues.retain(|buffer| {
            // Read liveness first: once the owner is gone nothing can refill the buffer.
            let live = Arc::strong_count(buffer) > 1;
            let partial = std::mem::take(&mut *buffer.lock().unwrap());
            if !partial.is_empty() {
                flushed += 1;
                self.enqueue_completed_buffer(partial);
            }
            live
        });
        trace!("Flushed {} partial SATB buffers", flushed);
    }

    /// Drop every recorded entry, both completed and thread-local.
    pub fn abandon_partial_marking(&self) {
        let mut dropped = 0;
        while self.completed.pop().is_some() {
            self.completed_buffers.fetch_sub(1, Ordering::AcqRel);
            dropped += 1;
        }
        let mut queues = self.queues.lock().unwrap();
        queues.retain(|buffer| {
            let live = Arc::strong_count(buffer) > 1;
            buffer.lock().unwrap().clear();
            live
        });
        debug!("Abandoned {} completed SATB buffers", dropped);
    }
}
