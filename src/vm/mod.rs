//! The interface between the engines and the VM binding.
//!
//! A binding implements [`GCBinding`]. Through it the engines reach the object model, the mark
//! bitmap ([`MarkingContext`]), the regions ([`RegionService`]), reference processing
//! ([`ReferenceProcessor`]), the SATB queue set and the suspendible thread set.

mod binding;
pub mod reference;
pub mod region;
pub mod slot;
pub mod sts;

pub use self::binding::{GCBinding, MarkingContext};
pub use self::reference::{ReferenceProcessStats, ReferenceProcessor, ReferenceType};
pub use self::region::{FillProgress, ObjectExtent, RegionAffiliation, RegionInfo, RegionService};
pub use self::slot::Slot;
pub use self::sts::{SuspendibleThreadSet, SuspendibleThreadSetJoiner, SuspendibleThreadSetLeaver};
