//! Repository Module
//!
//! Data access layer for the Postgres queue.

pub mod job;

// Re-export for convenience
pub use job as job_repository;
