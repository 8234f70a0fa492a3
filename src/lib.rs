//! Keepsake - memoization for expensive and rate-limited operations
//!
//! Results are cached in process memory and, when a TTL is given, in a
//! SQLite file shared across runs. See [`cache::Storage`] for the entry point.

pub mod cache;
pub mod cli;
pub mod clock;
pub mod config;
