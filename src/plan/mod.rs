//! Cycle coordination: generations, the marking engine, the old generation lifecycle and the
//! driver that sequences concurrent, degenerated and full cycles.
//!
//! A cycle is driven by a [`CycleController`](crate::plan::controller::CycleController). It
//! opens a [`GCSession`](crate::plan::session::GCSession), runs the marking of one generation
//! with [`ConcurrentMark`](crate::plan::mark::ConcurrentMark), and moves the
//! [`OldGeneration`](crate::plan::old_generation::OldGeneration) through its states when old
//! marking is involved.

pub mod controller;
pub mod gc_state;
pub mod generation;
pub mod mark;
pub mod old_generation;
pub mod session;

pub use self::controller::{CycleController, CycleOutcome};
pub use self::gc_state::GCState;
pub use self::generation::{Generation, GenerationType, StringDedupMode};
pub use self::mark::{ConcurrentMark, MarkResult};
pub use self::old_generation::{InvalidTransition, OldGeneration, OldGenerationState};
pub use self::session::{GCCause, GCSession};
