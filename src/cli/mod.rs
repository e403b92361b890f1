//! CLI command implementations.

pub mod config;
pub mod destroy;
pub mod status;
