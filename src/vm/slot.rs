//! The [`Slot`] trait lets the binding decide how a reference field is laid out and how it is
//! read and updated.

use std::fmt::Debug;
use std::hash::Hash;

use crate::util::ObjectReference;

/// `Slot` points to a location that may hold an object reference: a field of a heap object or
/// an element of a reference array.
///
/// A `Slot` value has pointer semantics. Copying it yields another handle to the same location.
/// The marking engine reads a slot, and while the heap still contains forwarded objects it
/// heals the slot to the forwardee with [`Slot::compare_exchange`], so a racing mutator store is
/// never overwritten.
pub trait Slot: Copy + Send + Sync + Debug + PartialEq + Eq + Hash {
    /// Load the object reference held by the slot. Return `None` for null or for a value that
    /// is not a reference.
    fn load(&self) -> Option<ObjectReference>;

    /// Store an object reference into the slot.
    fn store(&self, object: ObjectReference);

    /// Atomically replace `old` with `new`. Return `true` if the slot held `old`.
    fn compare_exchange(&self, old: ObjectReference, new: ObjectReference) -> bool;
}
