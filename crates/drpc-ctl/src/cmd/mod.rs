//! CLI command modules.

pub mod call;
pub mod serve;
