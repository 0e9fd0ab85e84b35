//! gencoord coordinates the collection cycles of a concurrent, generational, region-based
//! tracing garbage collector.
//!
//! The crate contains three engines and the glue that sequences them:
//!
//! * the parallel marking engine ([`plan::mark`]) that drives a pool of workers over
//!   work-stealing task queues ([`scheduler`]) until a global fixed point, draining
//!   snapshot-at-the-beginning buffers ([`util::satb`]) captured by the write barrier,
//! * the old generation lifecycle state machine ([`plan::old_generation`]) that sequences
//!   bootstrap, concurrent old marking, mixed evacuation candidates and coalesce-and-fill,
//! * the collector policy ([`policy::collector_policy`]) that records how every cycle concluded
//!   and exposes the counters adaptive heuristics consume.
//!
//! [`plan::controller::CycleController`] ties them together: it records the cycle start, runs a
//! concurrent cycle, and degenerates or escalates to a full collection when the concurrent cycle
//! is cancelled.
//!
//! Everything the collector does not own itself (object layout, mark bitmap, regions, free set,
//! reference processing, thread infrastructure) is reached through the traits in [`vm`]. A VM
//! binding implements [`vm::GCBinding`] to plug the engines into its heap.
//!
//! Logging goes through the `log` crate. [`CycleController::new`] installs the built-in
//! `env_logger` through [`util::logger::try_init`] unless the binding has set a logger already.

#[macro_use]
extern crate log;

pub mod plan;
pub mod policy;
pub mod scheduler;
pub mod util;
pub mod vm;

pub use crate::plan::controller::{CycleController, CycleOutcome};
pub use crate::plan::generation::{GenerationType, StringDedupMode};
pub use crate::plan::old_generation::{OldGeneration, OldGenerationState};
pub use crate::policy::collector_policy::{CollectorPolicy, DegenPoint};
pub use crate::util::address::ObjectReference;
pub use crate::util::options::Options;
