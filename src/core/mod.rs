//! Core functionality shared across the proxy: error types, configuration,
//! and the request/response data structures.

pub mod config;
pub mod error;
pub mod types;
