//! Application runtime composition modules.

pub(crate) mod config;
pub(crate) mod credentials;
pub(crate) mod input;
pub(crate) mod progress;
pub(crate) mod runtime;
pub(crate) mod summary;
pub(crate) mod terminal;
