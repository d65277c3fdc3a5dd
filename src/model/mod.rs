pub(crate) mod color;
pub(crate) mod opts;
pub(crate) mod request;
