//! The termination protocol of a parallel marking phase.
//!
//! A worker that found no work in its own queue, the leftover queues, its peers' queues and the
//! SATB buffers offers termination. The phase terminates when every worker has offered and the
//! last one confirms that no work is left anywhere. A waiting worker that sees new work, or is
//! asked to exit by its [`TerminatorTerminator`], withdraws its offer and goes back to marking.

use crossbeam::utils::Backoff;
use std::sync::{Condvar, Mutex};
use std::time::Duration;

/// How long a waiting worker sleeps before it looks for new work again.
const WAIT_FOR_WORK: Duration = Duration::from_millis(1);

/// Asked by waiting workers whether they should stop waiting, e.g. because the cycle was
/// cancelled.
pub trait TerminatorTerminator {
    fn should_exit_termination(&self) -> bool;
}

struct TerminatorSync {
    /// Workers that currently offer termination.
    offered: usize,
    terminated: bool,
}

pub struct TaskTerminator {
    n_threads: usize,
    sync: Mutex<TerminatorSync>,
    blocker: Condvar,
}

impl TaskTerminator {
    pub fn new(n_threads: usize) -> Self {
        debug_assert!(n_threads > 0);
        TaskTerminator {
            n_threads,
            sync: Mutex::new(TerminatorSync {
                offered: 0,
                terminated: false,
            }),
            blocker: Condvar::new(),
        }
    }

    pub fn n_threads(&self) -> usize {
        self.n_threads
    }

    /// Offer termination.
    ///
    /// `peek` returns `true` if any work is visible (a non-empty queue or a completed SATB
    /// buffer). Return `true` if all workers agreed to terminate, `false` if this worker should
    /// resume marking.
    pub fn offer_termination(
        &self,
        ordinal: usize,
        peek: &dyn Fn() -> bool,
        terminator: Option<&dyn TerminatorTerminator>,
    ) -> bool {
        let mut sync = self.sync.lock().unwrap();
        if sync.terminated {
            return true;
        }

        sync.offered += 1;
        debug_assert!(sync.offered <= self.n_threads);
        trace!(
            "Worker {} offered termination. offered/total: {}/{}",
            ordinal,
            sync.offered,
            self.n_threads
        );

        if sync.offered == self.n_threads {
            // Nobody else is marking. If there is no visible work, nobody can create more.
            if !peek() {
                trace!("Worker {} terminates the phase", ordinal);
                sync.terminated = true;
                self.blocker.notify_all();
                return true;
            }
            sync.offered -= 1;
            return false;
        }

        let backoff = Backoff::new();
        loop {
            if sync.terminated {
                return true;
            }
            if peek() || terminator.is_some_and(|t| t.should_exit_termination()) {
                sync.offered -= 1;
                trace!("Worker {} withdrew its termination offer", ordinal);
                return false;
            }
            if backoff.is_completed() {
                sync = self
                    .blocker
                    .wait_timeout(sync, WAIT_FOR_WORK)
                    .unwrap()
                    .0;
            } else {
                drop(sync);
                backoff.snooze();
                sync = self.sync.lock().unwrap();
            }
        }
    }

    /// Prepare the terminator for another phase with the same number of workers.
    pub fn reset_for_reuse(&self) {
        let mut sync = self.sync.lock().unwrap();
        debug_assert!(
            sync.offered == 0 || sync.terminated,
            "Reset while workers are still offering"
        );
        sync.offered = 0;
        sync.terminated = false;
    }
}
