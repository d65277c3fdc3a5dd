pub(crate) mod core;
pub(crate) mod error;
pub(crate) mod ledger;
pub(crate) mod math;
