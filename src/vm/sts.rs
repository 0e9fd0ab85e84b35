/// The suspendible thread set: concurrent GC workers that are members must reach a yield point
/// before a safepoint can begin.
pub trait SuspendibleThreadSet: Send + Sync {
    fn join(&self);
    fn leave(&self);
}

/// Join the set for the lifetime of the guard.
pub struct SuspendibleThreadSetJoiner<'a> {
    sts: Option<&'a dyn SuspendibleThreadSet>,
}

impl<'a> SuspendibleThreadSetJoiner<'a> {
    pub fn new(sts: &'a dyn SuspendibleThreadSet, active: bool) -> Self {
        if active {
            sts.join();
        }
        SuspendibleThreadSetJoiner {
            sts: active.then_some(sts),
        }
    }
}

impl Drop for SuspendibleThreadSetJoiner<'_> {
    fn drop(&mut self) {
        if let Some(sts) = self.sts {
            sts.leave();
        }
    }
}

/// Leave the set for the lifetime of the guard, e.g. while waiting for termination, so a
/// safepoint is not held up by idle workers.
pub struct SuspendibleThreadSetLeaver<'a> {
    sts: Option<&'a dyn SuspendibleThreadSet>,
}

impl<'a> SuspendibleThreadSetLeaver<'a> {
    pub fn new(sts: &'a dyn SuspendibleThreadSet, active: bool) -> Self {
        if active {
            sts.leave();
        }
        SuspendibleThreadSetLeaver {
            sts: active.then_some(sts),
        }
    }
}

impl Drop for SuspendibleThreadSetLeaver<'_> {
    fn drop(&mut self) {
        if let Some(sts) = self.sts {
            sts.join();
        }
    }
}
