use std::sync::atomic::{AtomicUsize, Ordering};

/// A piece of parallel GC work. `work` is called once by every active worker, with the worker
/// ordinal `0..active_workers`.
pub trait GCTask: Sync {
    fn name(&self) -> &'static str;

    fn work(&self, worker_id: usize);
}

/// The pool of GC workers. A task runs on `active_workers` threads and `run_task` returns when
/// all of them have finished.
pub struct WorkerGroup {
    total_workers: usize,
    active_workers: AtomicUsize,
}

impl WorkerGroup {
    pub fn new(total_workers: usize) -> Self {
        assert!(total_workers > 0, "A worker group needs at least one worker");
        WorkerGroup {
            total_workers,
            active_workers: AtomicUsize::new(total_workers),
        }
    }

    pub fn total_workers(&self) -> usize {
        self.total_workers
    }

    pub fn active_workers(&self) -> usize {
        self.active_workers.load(Ordering::Relaxed)
    }

    /// Set the number of workers used by the next tasks, clamped to `1..=total_workers`.
    pub fn update_active_workers(&self, n: usize) -> usize {
        let n = n.clamp(1, self.total_workers);
        self.active_workers.store(n, Ordering::Relaxed);
        debug!("Using {} of {} workers", n, self.total_workers);
        n
    }

    pub fn run_task(&self, task: &dyn GCTask) {
        self.run_task_with(task, self.active_workers())
    }

    /// Run `task` on `n` workers.
    pub fn run_task_with(&self, task: &dyn GCTask, n: usize) {
        debug_assert!(n > 0 && n <= self.total_workers);
        trace!("Running {} on {} workers", task.name(), n);
        if n == 1 {
            task.work(0);
            return;
        }
        std::thread::scope(|s| {
            for ordinal in 0..n {
                std::thread::Builder::new()
                    .name(format!("gencoord-worker-{}", ordinal))
                    .spawn_scoped(s, move || task.work(ordinal))
                    .expect("Failed to spawn a GC worker thread");
            }
        });
    }
}
