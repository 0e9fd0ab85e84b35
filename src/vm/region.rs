//! Region level services provided by the binding: region affiliation, old collection candidates,
//! free set rebuilding and the per-region access needed by coalesce-and-fill.

use std::sync::Mutex;

use crate::plan::generation::GenerationType;

/// The generation a region currently belongs to.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash)]
pub enum RegionAffiliation {
    Free,
    Young,
    Old,
}

/// A snapshot of the properties of a region that marking needs.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct RegionInfo {
    pub index: usize,
    pub affiliation: RegionAffiliation,
    /// Inactive regions (trash, or the from-space of an earlier evacuation) hold no objects
    /// that can be marked.
    pub active: bool,
    pub humongous: bool,
}

impl RegionInfo {
    pub fn is_young(&self) -> bool {
        self.affiliation == RegionAffiliation::Young
    }

    pub fn is_old(&self) -> bool {
        self.affiliation == RegionAffiliation::Old
    }

    pub fn is_affiliated(&self) -> bool {
        self.affiliation != RegionAffiliation::Free
    }
}

/// How far coalesce-and-fill has come in a region. The progress is kept per region so a
/// preempted fill resumes where it stopped.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Default)]
pub enum FillProgress {
    #[default]
    Unfilled,
    /// Filling was interrupted. Everything below `resume_at` (a word offset into the region, at
    /// an object boundary) is already coalesced.
    Filling { resume_at: usize },
    Filled,
}

/// An object, or a run of words occupied by one, in a region. Offsets are in words from the
/// region start.
#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub struct ObjectExtent {
    pub start: usize,
    pub words: usize,
    /// Marked in the last completed old marking.
    pub live: bool,
}

/// Region service of the binding.
///
/// The candidate bookkeeping belongs to the old generation heuristic in the binding. The core
/// only reads the candidate counts, asks for the candidate lists, and tells the heuristic when
/// to rebuild or drop them.
pub trait RegionService: Send + Sync {
    fn num_regions(&self) -> usize;

    fn region_info(&self, index: usize) -> RegionInfo;

    /// The coarse lock that serializes region state changes, free set rebuilding and old
    /// generation transitions.
    fn heap_lock(&self) -> &Mutex<()>;

    // --- Old collection candidates ---

    /// Old regions selected for mixed evacuation that have not been evacuated yet.
    fn unprocessed_old_collection_candidates(&self) -> usize;

    /// Move up to `max` old candidates into the next collection set. Return how many were
    /// moved.
    fn select_mixed_collection_candidates(&self, max: usize) -> usize;

    fn has_coalesce_and_fill_candidates(&self) -> bool;

    /// Old regions that need their dead objects coalesced and filled.
    fn coalesce_and_fill_candidates(&self) -> Vec<usize>;

    /// Forget all old collection and fill candidates.
    fn abandon_collection_candidates(&self);

    /// Choose old candidates from the result of the last old marking. Called with the heap lock
    /// held.
    fn prepare_for_old_collections(&self);

    /// Choose the collection set of a young or global cycle. Return the number of regions in it.
    fn choose_collection_set(&self, generation: GenerationType) -> usize;

    // --- After marking ---

    /// Update region states (e.g. retire regions without live data) after a marking.
    fn update_region_states_after_mark(&self, generation: GenerationType);

    /// Rebuild the free set. Called with the heap lock held.
    fn rebuild_free_set(&self, concurrent: bool);

    /// Live bytes recorded for the regions of `generation`.
    fn live_bytes(&self, generation: GenerationType) -> usize;

    // --- Coalesce and fill ---

    fn fill_progress(&self, region: usize) -> FillProgress;

    fn set_fill_progress(&self, region: usize, progress: FillProgress);

    /// The first object (or filler) that starts at or after `from_word` in `region`.
    fn object_at_or_after(&self, region: usize, from_word: usize) -> Option<ObjectExtent>;

    /// Replace `words` words of dead objects starting at `start_word` with one filler object
    /// that keeps the region parsable.
    fn fill_with_dead_object(&self, region: usize, start_word: usize, words: usize);
}
