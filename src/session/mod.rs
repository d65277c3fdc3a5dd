/// Public facade owning the surface, caches and collaborators.
pub(crate) mod composer;
/// One composition run from load to capture.
pub(crate) mod job;
/// `Idle -> Processing -> Completed | Failed`.
pub(crate) mod state;
