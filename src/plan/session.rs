use std::time::Instant;

use strum_macros::IntoStaticStr;

use crate::plan::generation::GenerationType;
use crate::policy::CollectorPolicy;

/// Why a cycle was started.
#[derive(Copy, Clone, Debug, PartialEq, Eq, IntoStaticStr)]
pub enum GCCause {
    /// The heuristics decided a cycle is due.
    Heuristics,
    /// An allocation could not be satisfied.
    AllocationFailure,
    /// The application asked for a collection.
    ExplicitRequest,
    /// The runtime asked for a collection, e.g. before unloading classes.
    ImplicitRequest,
}

/// Bookkeeping for one collection cycle. The cycle starts when the session is created and ends
/// when it is dropped.
pub struct GCSession<'a> {
    policy: &'a CollectorPolicy,
    generation: GenerationType,
    cause: GCCause,
    cycle: usize,
    start: Instant,
}

impl<'a> GCSession<'a> {
    pub fn new(policy: &'a CollectorPolicy, generation: GenerationType, cause: GCCause) -> Self {
        policy.record_cycle_start();
        let cycle = policy.cycle_counter();
        info!(
            "GC({}) {} cycle started: {}",
            cycle,
            generation.name(),
            <&'static str>::from(cause)
        );
        GCSession {
            policy,
            generation,
            cause,
            cycle,
            start: Instant::now(),
        }
    }

    pub fn cycle(&self) -> usize {
        self.cycle
    }

    pub fn cause(&self) -> GCCause {
        self.cause
    }

    pub fn generation(&self) -> GenerationType {
        self.generation
    }
}

impl Drop for GCSession<'_> {
    fn drop(&mut self) {
        info!(
            "GC({}) {} cycle finished in {} us ({} cycles, {} full)",
            self.cycle,
            self.generation.name(),
            self.start.elapsed().as_micros(),
            self.policy.cycle_counter(),
            self.policy.get_fullgc_count()
        );
    }
}
