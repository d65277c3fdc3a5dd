pub(crate) mod engine;
pub(crate) mod overlay;
pub(crate) mod wrap;
