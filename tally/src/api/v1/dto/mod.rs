//! Wire types for the v1 API. Field names are camelCase on the wire.

pub mod commands;

pub use commands::*;
