//! CLI command modules.

pub mod discovery;
pub mod http;
pub mod status;
