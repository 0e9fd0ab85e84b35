use atomic::{Atomic, Ordering};
use std::sync::atomic::AtomicBool;

use super::generation::GenerationType;
use crate::util::satb::SATBMarkQueueSet;

/// Collector-wide phase flags. They are read without locks by workers and by the old
/// generation transition checks.
pub struct GCState {
    /// The generation of the marking that is running, if any.
    active_generation: Atomic<Option<GenerationType>>,
    /// A young or global concurrent marking is in progress.
    concurrent_young_mark_in_progress: AtomicBool,
    /// An old marking is in progress (bootstrapped, not finished and not cancelled).
    concurrent_old_mark_in_progress: AtomicBool,
    /// The old mark bitmap holds the result of a completed old marking.
    old_bitmap_stable: AtomicBool,
    /// Old regions are being made parsable by coalesce-and-fill.
    prepare_for_old_mark_in_progress: AtomicBool,
}

impl Default for GCState {
    fn default() -> Self {
        GCState {
            active_generation: Atomic::new(None),
            concurrent_young_mark_in_progress: AtomicBool::new(false),
            concurrent_old_mark_in_progress: AtomicBool::new(false),
            old_bitmap_stable: AtomicBool::new(true),
            prepare_for_old_mark_in_progress: AtomicBool::new(false),
        }
    }
}

impl GCState {
    pub fn active_generation(&self) -> Option<GenerationType> {
        self.active_generation.load(Ordering::Acquire)
    }

    pub fn set_active_generation(&self, generation: Option<GenerationType>) {
        self.active_generation.store(generation, Ordering::Release);
    }

    pub fn is_concurrent_young_mark_in_progress(&self) -> bool {
        self.concurrent_young_mark_in_progress.load(Ordering::Acquire)
    }

    pub fn set_concurrent_young_mark_in_progress(&self, in_progress: bool) {
        self.concurrent_young_mark_in_progress
            .store(in_progress, Ordering::Release);
    }

    pub fn is_concurrent_old_mark_in_progress(&self) -> bool {
        self.concurrent_old_mark_in_progress.load(Ordering::Acquire)
    }

    pub fn set_concurrent_old_mark_in_progress(&self, in_progress: bool) {
        self.concurrent_old_mark_in_progress
            .store(in_progress, Ordering::Release);
    }

    pub fn is_old_bitmap_stable(&self) -> bool {
        self.old_bitmap_stable.load(Ordering::Acquire)
    }

    pub fn set_old_bitmap_stable(&self, stable: bool) {
        self.old_bitmap_stable.store(stable, Ordering::Release);
    }

    pub fn is_prepare_for_old_mark_in_progress(&self) -> bool {
        self.prepare_for_old_mark_in_progress.load(Ordering::Acquire)
    }

    pub fn set_prepare_for_old_mark_in_progress(&self, in_progress: bool) {
        self.prepare_for_old_mark_in_progress
            .store(in_progress, Ordering::Release);
    }

    /// Is any concurrent marking running?
    pub fn is_concurrent_mark_in_progress(&self) -> bool {
        self.is_concurrent_young_mark_in_progress() || self.is_concurrent_old_mark_in_progress()
    }

    /// Keep the SATB barrier active exactly while some marking is in progress. An old marking
    /// keeps it active across the young cycles that run while it is paused.
    pub fn sync_satb_barrier(&self, satb: &SATBMarkQueueSet) {
        let active = self.is_concurrent_mark_in_progress();
        if satb.is_active() != active {
            satb.set_active_all_threads(active);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn active_generation_round_trips() {
        let state = GCState::default();
        assert_eq!(state.active_generation(), None);
        state.set_active_generation(Some(GenerationType::Old));
        assert_eq!(state.active_generation(), Some(GenerationType::Old));
        state.set_active_generation(None);
        assert_eq!(state.active_generation(), None);
    }

    #[test]
    fn satb_barrier_follows_marking() {
        let state = GCState::default();
        let satb = SATBMarkQueueSet::new(4);
        state.set_concurrent_old_mark_in_progress(true);
        state.sync_satb_barrier(&satb);
        assert!(satb.is_active());

        state.set_concurrent_young_mark_in_progress(true);
        state.sync_satb_barrier(&satb);
        state.set_concurrent_young_mark_in_progress(false);
        state.sync_satb_barrier(&satb);
        assert!(satb.is_active());

        state.set_concurrent_old_mark_in_progress(false);
        state.sync_satb_barrier(&satb);
        assert!(!satb.is_active());
    }
}
