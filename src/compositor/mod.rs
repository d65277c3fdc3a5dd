/// Per-tick driver.
pub(crate) mod driver;
/// Single in-flight draw guard.
pub(crate) mod slot;
/// Effective clip durations.
pub(crate) mod timeline;
