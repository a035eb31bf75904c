//! CLI command implementations.

pub mod bindings;
pub mod build;
pub mod host;
pub mod target;
