//! # Request Orchestration
//!
//! The fetch-or-serve decision layer: date gating, cache short-circuiting,
//! negative caching for dated resources, and freshness-derived TTLs for the
//! notifications feed.

pub mod date_gate;
pub mod fetch;
pub mod notifications;
pub mod upstream;
