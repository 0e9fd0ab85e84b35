use enum_map::{Enum, EnumMap};
use strum_macros::IntoStaticStr;

use crate::plan::generation::GenerationType;
use crate::util::ObjectReference;

/// The kind of a reference object, or `None` for an ordinary object.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, Enum, IntoStaticStr)]
pub enum ReferenceType {
    None,
    Soft,
    Weak,
    Final,
    Phantom,
}

/// Numbers of discovered reference objects per kind.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ReferenceProcessStats {
    pub discovered: EnumMap<ReferenceType, usize>,
}

impl ReferenceProcessStats {
    pub fn total(&self) -> usize {
        self.discovered.values().sum()
    }
}

/// Reference processing of the binding. There is one processor per generation.
pub trait ReferenceProcessor: Send + Sync {
    /// A worker is about to trace `generation`. Discovery by that worker is attributed to it.
    fn set_mark_closure(&self, worker_id: usize, generation: GenerationType);

    /// Try to discover a reference object. Return `true` if the processor took it, in which
    /// case the referent must not be traced as a strong field.
    fn discover_reference(&self, reference: ObjectReference, ty: ReferenceType) -> bool;

    /// Drop partially discovered references after a cancelled marking.
    fn abandon_partial_discovery(&self);

    fn process_stats(&self) -> ReferenceProcessStats;
}
