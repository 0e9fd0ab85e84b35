use bytemuck::NoUninit;
use std::sync::{Arc, Mutex};
use strum_macros::{Display, EnumString, IntoStaticStr};

use crate::scheduler::TaskQueueSet;
use crate::vm::RegionInfo;

/// The generation a cycle (or a marking) works on.
#[repr(u8)]
#[derive(Debug, PartialEq, Eq, Copy, Clone, Hash, NoUninit, IntoStaticStr)]
pub enum GenerationType {
    Young = 1,
    Old,
    /// The whole heap in generational mode.
    GlobalGen,
    /// The whole heap in non-generational mode.
    GlobalNonGen,
}

unsafe impl bytemuck::ZeroableInOption for GenerationType {}

unsafe impl bytemuck::PodInOption for GenerationType {}

impl GenerationType {
    /// The name used in log messages.
    pub fn name(self) -> &'static str {
        match self {
            GenerationType::Young => "Young",
            GenerationType::Old => "Old",
            GenerationType::GlobalGen | GenerationType::GlobalNonGen => "Global",
        }
    }

    pub fn is_young(self) -> bool {
        self == GenerationType::Young
    }

    pub fn is_old(self) -> bool {
        self == GenerationType::Old
    }

    pub fn is_global(self) -> bool {
        matches!(self, GenerationType::GlobalGen | GenerationType::GlobalNonGen)
    }

    /// Does this generation own the objects in `region`? Objects in inactive regions belong to
    /// no generation.
    pub fn contains(self, region: &RegionInfo) -> bool {
        if !region.active {
            return false;
        }
        match self {
            GenerationType::Young => region.is_young(),
            GenerationType::Old => region.is_old(),
            GenerationType::GlobalGen | GenerationType::GlobalNonGen => region.is_affiliated(),
        }
    }
}

/// String deduplication during marking.
#[derive(Copy, Clone, Debug, PartialEq, Eq, EnumString, Display)]
pub enum StringDedupMode {
    NoDedup,
    /// Request deduplication for strings that reached the deduplication age.
    EnqueueDedup,
    /// Request deduplication for every string.
    AlwaysDedup,
}

/// The marking state a generation owns: its task queues, and for the young generation the
/// queues of the old generation while an old marking is in progress.
pub struct Generation {
    generation_type: GenerationType,
    task_queues: Arc<TaskQueueSet>,
    /// Installed while an old marking is in progress. Young marking pushes the old objects it
    /// finds to these queues instead of ignoring them.
    old_gen_task_queues: Mutex<Option<Arc<TaskQueueSet>>>,
}

impl Generation {
    pub fn new(generation_type: GenerationType, max_workers: usize) -> Self {
        Generation {
            generation_type,
            task_queues: Arc::new(TaskQueueSet::new(max_workers)),
            old_gen_task_queues: Mutex::new(None),
        }
    }

    pub fn generation_type(&self) -> GenerationType {
        self.generation_type
    }

    pub fn name(&self) -> &'static str {
        self.generation_type.name()
    }

    pub fn task_queues(&self) -> &Arc<TaskQueueSet> {
        &self.task_queues
    }

    pub fn old_gen_task_queues(&self) -> Option<Arc<TaskQueueSet>> {
        self.old_gen_task_queues.lock().unwrap().clone()
    }

    pub fn set_old_gen_task_queues(&self, queues: Option<Arc<TaskQueueSet>>) {
        debug_assert!(
            queues.is_none() || self.generation_type.is_young(),
            "Only the young generation marks into the old queues"
        );
        *self.old_gen_task_queues.lock().unwrap() = queues;
    }

    pub fn reserve_task_queues(&self, workers: usize) {
        self.task_queues.reserve(workers);
    }

    /// Drop all pending marking work of this generation.
    pub fn clear_task_queues(&self) {
        let dropped = self.task_queues.clear();
        if dropped > 0 {
            debug!(
                "{} generation dropped {} pending mark tasks",
                self.name(),
                dropped
            );
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::vm::RegionAffiliation;

    fn region(affiliation: RegionAffiliation, active: bool) -> RegionInfo {
        RegionInfo {
            index: 0,
            affiliation,
            active,
            humongous: false,
        }
    }

    #[test]
    fn generation_contains_region() {
        let young = region(RegionAffiliation::Young, true);
        let old = region(RegionAffiliation::Old, true);
        let free = region(RegionAffiliation::Free, true);
        let trash = region(RegionAffiliation::Old, false);

        assert!(GenerationType::Young.contains(&young));
        assert!(!GenerationType::Young.contains(&old));
        assert!(GenerationType::Old.contains(&old));
        assert!(!GenerationType::Old.contains(&trash));
        assert!(GenerationType::GlobalGen.contains(&young));
        assert!(GenerationType::GlobalNonGen.contains(&old));
        assert!(!GenerationType::GlobalGen.contains(&free));
    }

    #[test]
    fn dedup_mode_from_str() {
        assert_eq!(
            "EnqueueDedup".parse::<StringDedupMode>().unwrap(),
            StringDedupMode::EnqueueDedup
        );
        assert!("Sometimes".parse::<StringDedupMode>().is_err());
    }

    #[test]
    fn old_queues_are_installed_in_young() {
        let young = Generation::new(GenerationType::Young, 2);
        let old = Generation::new(GenerationType::Old, 2);
        assert!(young.old_gen_task_queues().is_none());
        young.set_old_gen_task_queues(Some(old.task_queues().clone()));
        assert!(Arc::ptr_eq(
            &young.old_gen_task_queues().unwrap(),
            old.task_queues()
        ));
        young.set_old_gen_task_queues(None);
        assert!(young.old_gen_task_queues().is_none());
    }
}
