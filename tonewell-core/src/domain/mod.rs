//! Core domain types
//!
//! These types are shared between the queue (for persistence), the worker
//! (for execution) and the CLI (for ingestion and inspection).

pub mod device;
pub mod job;
pub mod owner;

pub use device::{Device, UnknownDevice};
pub use job::{JobRecord, JobStatus, estimate_wait_minutes};
pub use owner::{Owner, OwnerError};
