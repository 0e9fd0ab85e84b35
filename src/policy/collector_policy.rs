use std::fmt;
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

use enum_map::{Enum, EnumMap};
use strum_macros::IntoStaticStr;

/// Where a concurrent cycle was when it degenerated into a stop-the-world cycle.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum, IntoStaticStr)]
pub enum DegenPoint {
    OutsideCycle,
    Roots,
    Mark,
    Evac,
    UpdateRefs,
}

impl DegenPoint {
    pub fn description(self) -> &'static str {
        match self {
            DegenPoint::OutsideCycle => "Outside of Cycle",
            DegenPoint::Roots => "Roots",
            DegenPoint::Mark => "Mark",
            DegenPoint::Evac => "Evacuation",
            DegenPoint::UpdateRefs => "Update References",
        }
    }
}

/// Counts how collection cycles concluded.
///
/// The counters are written by the control thread only. Mutators may poll
/// [`CollectorPolicy::get_fullgc_count`] and the streak counters while a cycle runs, so every
/// counter is an atomic word and is never torn.
pub struct CollectorPolicy {
    generational: bool,

    success_concurrent_gcs: AtomicUsize,
    abbreviated_concurrent_gcs: AtomicUsize,
    mixed_gcs: AtomicUsize,
    success_old_gcs: AtomicUsize,
    interrupted_old_gcs: AtomicUsize,
    success_degenerated_gcs: AtomicUsize,
    abbreviated_degenerated_gcs: AtomicUsize,
    success_full_gcs: AtomicUsize,

    alloc_failure_degenerated: AtomicUsize,
    alloc_failure_degenerated_upgrade_to_full: AtomicUsize,
    alloc_failure_full: AtomicUsize,
    /// `success_full_gcs + alloc_failure_degenerated_upgrade_to_full`, maintained as one word so
    /// that a reader never sees one half of the sum updated without the other.
    fullgc_count: AtomicUsize,

    explicit_concurrent: AtomicUsize,
    explicit_full: AtomicUsize,
    implicit_concurrent: AtomicUsize,
    implicit_full: AtomicUsize,

    consecutive_young_gcs: AtomicUsize,
    consecutive_degenerated_gcs: AtomicUsize,
    cycle_counter: AtomicUsize,
    degen_points: EnumMap<DegenPoint, AtomicUsize>,

    in_shutdown: AtomicBool,
}

macro_rules! counter_getters {
    ($($name:ident),* $(,)?) => {
        $(
            pub fn $name(&self) -> usize {
                self.$name.load(Ordering::Relaxed)
            }
        )*
    };
}

fn bump(counter: &AtomicUsize) {
    counter.fetch_add(1, Ordering::Relaxed);
}

fn percent_of(part: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        part as f64 * 100.0 / total as f64
    }
}

impl CollectorPolicy {
    pub fn new(generational: bool) -> Self {
        CollectorPolicy {
            generational,
            success_concurrent_gcs: AtomicUsize::new(0),
            abbreviated_concurrent_gcs: AtomicUsize::new(0),
            mixed_gcs: AtomicUsize::new(0),
            success_old_gcs: AtomicUsize::new(0),
            interrupted_old_gcs: AtomicUsize::new(0),
            success_degenerated_gcs: AtomicUsize::new(0),
            abbreviated_degenerated_gcs: AtomicUsize::new(0),
            success_full_gcs: AtomicUsize::new(0),
            alloc_failure_degenerated: AtomicUsize::new(0),
            alloc_failure_degenerated_upgrade_to_full: AtomicUsize::new(0),
            alloc_failure_full: AtomicUsize::new(0),
            fullgc_count: AtomicUsize::new(0),
            explicit_concurrent: AtomicUsize::new(0),
            explicit_full: AtomicUsize::new(0),
            implicit_concurrent: AtomicUsize::new(0),
            implicit_full: AtomicUsize::new(0),
            consecutive_young_gcs: AtomicUsize::new(0),
            consecutive_degenerated_gcs: AtomicUsize::new(0),
            cycle_counter: AtomicUsize::new(0),
            degen_points: EnumMap::default(),
            in_shutdown: AtomicBool::new(false),
        }
    }

    pub fn is_generational(&self) -> bool {
        self.generational
    }

    pub fn record_cycle_start(&self) {
        bump(&self.cycle_counter);
    }

    pub fn record_mixed_cycle(&self) {
        bump(&self.mixed_gcs);
    }

    pub fn record_explicit_to_concurrent(&self) {
        bump(&self.explicit_concurrent);
    }

    pub fn record_explicit_to_full(&self) {
        bump(&self.explicit_full);
    }

    pub fn record_implicit_to_concurrent(&self) {
        bump(&self.implicit_concurrent);
    }

    pub fn record_implicit_to_full(&self) {
        bump(&self.implicit_full);
    }

    pub fn record_alloc_failure_to_full(&self) {
        bump(&self.alloc_failure_full);
    }

    pub fn record_alloc_failure_to_degenerated(&self, point: DegenPoint) {
        bump(&self.alloc_failure_degenerated);
        bump(&self.degen_points[point]);
    }

    pub fn record_degenerated_upgrade_to_full(&self) {
        self.consecutive_degenerated_gcs.store(0, Ordering::Relaxed);
        bump(&self.alloc_failure_degenerated_upgrade_to_full);
        bump(&self.fullgc_count);
    }

    pub fn record_success_concurrent(&self, is_young: bool, is_abbreviated: bool) {
        self.update_young(is_young);
        self.consecutive_degenerated_gcs.store(0, Ordering::Relaxed);
        bump(&self.success_concurrent_gcs);
        if is_abbreviated {
            bump(&self.abbreviated_concurrent_gcs);
        }
    }

    pub fn record_success_degenerated(&self, is_young: bool, is_abbreviated: bool) {
        self.update_young(is_young);
        bump(&self.success_degenerated_gcs);
        bump(&self.consecutive_degenerated_gcs);
        if is_abbreviated {
            bump(&self.abbreviated_degenerated_gcs);
        }
    }

    pub fn record_success_old(&self) {
        self.consecutive_young_gcs.store(0, Ordering::Relaxed);
        bump(&self.success_old_gcs);
    }

    pub fn record_interrupted_old(&self) {
        self.consecutive_young_gcs.store(0, Ordering::Relaxed);
        bump(&self.interrupted_old_gcs);
    }

    pub fn record_success_full(&self) {
        self.consecutive_degenerated_gcs.store(0, Ordering::Relaxed);
        self.consecutive_young_gcs.store(0, Ordering::Relaxed);
        bump(&self.success_full_gcs);
        bump(&self.fullgc_count);
    }

    fn update_young(&self, is_young: bool) {
        if is_young {
            bump(&self.consecutive_young_gcs);
        } else {
            self.consecutive_young_gcs.store(0, Ordering::Relaxed);
        }
    }

    /// Latch the shutdown flag. Cycles are no longer started once it is set.
    pub fn record_shutdown(&self) {
        self.in_shutdown.store(true, Ordering::Release);
    }

    pub fn is_at_shutdown(&self) -> bool {
        self.in_shutdown.load(Ordering::Acquire)
    }

    /// Full collections so far, including degenerated cycles upgraded to full. Mutators poll
    /// this to find out whether a full collection happened while they were waiting.
    pub fn get_fullgc_count(&self) -> usize {
        self.fullgc_count.load(Ordering::Acquire)
    }

    pub fn consecutive_young_gc_count(&self) -> usize {
        self.consecutive_young_gcs.load(Ordering::Relaxed)
    }

    pub fn consecutive_degenerated_gc_count(&self) -> usize {
        self.consecutive_degenerated_gcs.load(Ordering::Relaxed)
    }

    pub fn degen_point_count(&self, point: DegenPoint) -> usize {
        self.degen_points[point].load(Ordering::Relaxed)
    }

    counter_getters!(
        success_concurrent_gcs,
        abbreviated_concurrent_gcs,
        mixed_gcs,
        success_old_gcs,
        interrupted_old_gcs,
        success_degenerated_gcs,
        abbreviated_degenerated_gcs,
        success_full_gcs,
        alloc_failure_degenerated,
        alloc_failure_degenerated_upgrade_to_full,
        alloc_failure_full,
        explicit_concurrent,
        explicit_full,
        implicit_concurrent,
        implicit_full,
        cycle_counter,
    );

    pub fn completed_gcs(&self) -> usize {
        self.success_full_gcs()
            + self.success_degenerated_gcs()
            + self.success_concurrent_gcs()
            + self.success_old_gcs()
    }
}

impl fmt::Display for CollectorPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        writeln!(
            f,
            "Under allocation pressure, concurrent cycles may cancel, and either continue the cycle"
        )?;
        writeln!(
            f,
            "under a stop-the-world pause or result in a stop-the-world full GC. Abbreviated cycles"
        )?;
        writeln!(
            f,
            "are those which found enough regions with no live objects to skip evacuation."
        )?;
        writeln!(f)?;

        let completed = self.completed_gcs();
        let concurrent = self.success_concurrent_gcs();
        writeln!(f, "{:5} Completed GCs", completed)?;
        writeln!(
            f,
            "{:5} Successful Concurrent GCs ({:.2}%)",
            concurrent,
            percent_of(concurrent, completed)
        )?;
        writeln!(
            f,
            "  {:5} invoked explicitly ({:.2}%)",
            self.explicit_concurrent(),
            percent_of(self.explicit_concurrent(), concurrent)
        )?;
        writeln!(
            f,
            "  {:5} invoked implicitly ({:.2}%)",
            self.implicit_concurrent(),
            percent_of(self.implicit_concurrent(), concurrent)
        )?;
        writeln!(
            f,
            "  {:5} abbreviated ({:.2}%)",
            self.abbreviated_concurrent_gcs(),
            percent_of(self.abbreviated_concurrent_gcs(), concurrent)
        )?;
        writeln!(f)?;

        if self.generational {
            writeln!(
                f,
                "{:5} Completed Old GCs ({:.2}%)",
                self.success_old_gcs(),
                percent_of(self.success_old_gcs(), completed)
            )?;
            writeln!(f, "  {:5} mixed", self.mixed_gcs())?;
            writeln!(f, "  {:5} interruptions", self.interrupted_old_gcs())?;
            writeln!(f)?;
        }

        let upgraded = self.alloc_failure_degenerated_upgrade_to_full();
        let degenerated = upgraded + self.success_degenerated_gcs();
        writeln!(
            f,
            "{:5} Degenerated GCs ({:.2}%)",
            degenerated,
            percent_of(degenerated, completed)
        )?;
        writeln!(
            f,
            "  {:5} upgraded to Full GC ({:.2}%)",
            upgraded,
            percent_of(upgraded, degenerated)
        )?;
        writeln!(
            f,
            "  {:5} caused by allocation failure ({:.2}%)",
            self.alloc_failure_degenerated(),
            percent_of(self.alloc_failure_degenerated(), degenerated)
        )?;
        writeln!(
            f,
            "  {:5} abbreviated ({:.2}%)",
            self.abbreviated_degenerated_gcs(),
            percent_of(self.abbreviated_degenerated_gcs(), degenerated)
        )?;
        for (point, count) in self.degen_points.iter() {
            let count = count.load(Ordering::Relaxed);
            if count > 0 {
                writeln!(
                    f,
                    "    {:5} happened at {}",
                    count,
                    point.description()
                )?;
            }
        }
        writeln!(f)?;

        let full = self.success_full_gcs();
        writeln!(
            f,
            "{:5} Full GCs ({:.2}%)",
            full,
            percent_of(full, completed)
        )?;
        writeln!(
            f,
            "  {:5} invoked explicitly ({:.2}%)",
            self.explicit_full(),
            percent_of(self.explicit_full(), full)
        )?;
        writeln!(
            f,
            "  {:5} invoked implicitly ({:.2}%)",
            self.implicit_full(),
            percent_of(self.implicit_full(), full)
        )?;
        writeln!(
            f,
            "  {:5} caused by allocation failure ({:.2}%)",
            self.alloc_failure_full(),
            percent_of(self.alloc_failure_full(), full)
        )?;
        writeln!(
            f,
            "  {:5} upgraded from Degenerated GC ({:.2}%)",
            upgraded,
            percent_of(upgraded, full)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Arc;

    #[test]
    fn young_streak_is_reset_by_old() {
        let policy = CollectorPolicy::new(true);
        policy.record_success_concurrent(true, false);
        policy.record_success_concurrent(true, false);
        assert_eq!(policy.consecutive_young_gc_count(), 2);
        policy.record_success_old();
        assert_eq!(policy.consecutive_young_gc_count(), 0);
        policy.record_success_degenerated(true, false);
        assert_eq!(policy.consecutive_young_gc_count(), 1);
        assert_eq!(policy.consecutive_degenerated_gc_count(), 1);
    }

    #[test]
    fn global_cycles_reset_young_streak() {
        let policy = CollectorPolicy::new(true);
        policy.record_success_concurrent(true, false);
        policy.record_success_concurrent(false, false);
        assert_eq!(policy.consecutive_young_gc_count(), 0);
        policy.record_success_degenerated(true, false);
        policy.record_interrupted_old();
        assert_eq!(policy.consecutive_young_gc_count(), 0);
        assert_eq!(policy.interrupted_old_gcs(), 1);
    }

    #[test]
    fn degenerated_streak() {
        let policy = CollectorPolicy::new(false);
        policy.record_success_degenerated(false, false);
        policy.record_success_degenerated(false, true);
        assert_eq!(policy.consecutive_degenerated_gc_count(), 2);
        policy.record_success_concurrent(false, false);
        assert_eq!(policy.consecutive_degenerated_gc_count(), 0);

        policy.record_success_degenerated(false, false);
        policy.record_degenerated_upgrade_to_full();
        assert_eq!(policy.consecutive_degenerated_gc_count(), 0);

        policy.record_success_degenerated(false, false);
        policy.record_success_full();
        assert_eq!(policy.consecutive_degenerated_gc_count(), 0);
    }

    #[test]
    fn abbreviated_counts_are_split() {
        let policy = CollectorPolicy::new(false);
        policy.record_success_concurrent(false, true);
        policy.record_success_concurrent(false, false);
        policy.record_success_degenerated(false, true);
        assert_eq!(policy.abbreviated_concurrent_gcs(), 1);
        assert_eq!(policy.abbreviated_degenerated_gcs(), 1);
        assert_eq!(policy.success_concurrent_gcs(), 2);
        assert_eq!(policy.success_degenerated_gcs(), 1);
        assert_eq!(policy.completed_gcs(), 3);
    }

    #[test]
    fn degen_points_are_counted() {
        let policy = CollectorPolicy::new(false);
        policy.record_alloc_failure_to_degenerated(DegenPoint::Mark);
        policy.record_alloc_failure_to_degenerated(DegenPoint::Mark);
        policy.record_alloc_failure_to_degenerated(DegenPoint::Evac);
        assert_eq!(policy.alloc_failure_degenerated(), 3);
        assert_eq!(policy.degen_point_count(DegenPoint::Mark), 2);
        assert_eq!(policy.degen_point_count(DegenPoint::Evac), 1);
        assert_eq!(policy.degen_point_count(DegenPoint::Roots), 0);
    }

    #[test]
    fn fullgc_count_includes_upgrades() {
        let policy = CollectorPolicy::new(false);
        assert_eq!(policy.get_fullgc_count(), 0);
        policy.record_success_full();
        policy.record_degenerated_upgrade_to_full();
        policy.record_degenerated_upgrade_to_full();
        assert_eq!(policy.get_fullgc_count(), 3);
        assert_eq!(
            policy.get_fullgc_count(),
            policy.success_full_gcs() + policy.alloc_failure_degenerated_upgrade_to_full()
        );
    }

    #[test]
    fn fullgc_count_is_monotonic_for_readers() {
        const RECORDS: usize = 10_000;
        let policy = Arc::new(CollectorPolicy::new(false));
        std::thread::scope(|s| {
            s.spawn(|| {
                for i in 0..RECORDS {
                    if i % 3 == 0 {
                        policy.record_degenerated_upgrade_to_full();
                    } else {
                        policy.record_success_full();
                    }
                }
            });
            s.spawn(|| {
                let mut last = 0;
                while last < RECORDS {
                    let now = policy.get_fullgc_count();
                    assert!(now >= last, "Full GC count went back from {} to {}", last, now);
                    last = now;
                }
            });
        });
        assert_eq!(policy.get_fullgc_count(), RECORDS);
        assert_eq!(
            policy.success_full_gcs() + policy.alloc_failure_degenerated_upgrade_to_full(),
            RECORDS
        );
    }

    #[test]
    fn shutdown_latches() {
        let policy = CollectorPolicy::new(false);
        assert!(!policy.is_at_shutdown());
        policy.record_shutdown();
        policy.record_shutdown();
        assert!(policy.is_at_shutdown());
    }

    #[test]
    fn summary_mentions_old_only_when_generational() {
        let policy = CollectorPolicy::new(true);
        policy.record_success_concurrent(true, true);
        policy.record_success_old();
        policy.record_mixed_cycle();
        policy.record_alloc_failure_to_degenerated(DegenPoint::Roots);
        policy.record_success_degenerated(true, false);
        let summary = policy.to_string();
        assert!(summary.contains("    3 Completed GCs"));
        assert!(summary.contains("    1 Completed Old GCs (33.33%)"));
        assert!(summary.contains("      1 mixed"));
        assert!(summary.contains("happened at Roots"));
        assert!(!summary.contains("happened at Mark"));

        let single = CollectorPolicy::new(false);
        assert!(!single.to_string().contains("Old GCs"));
    }

    #[test]
    fn cycle_counter_and_causes() {
        let policy = CollectorPolicy::new(false);
        policy.record_cycle_start();
        policy.record_explicit_to_concurrent();
        policy.record_cycle_start();
        policy.record_implicit_to_full();
        policy.record_alloc_failure_to_full();
        assert_eq!(policy.cycle_counter(), 2);
        assert_eq!(policy.explicit_concurrent(), 1);
        assert_eq!(policy.implicit_full(), 1);
        assert_eq!(policy.alloc_failure_full(), 1);
        assert_eq!(policy.explicit_full(), 0);
    }
}
