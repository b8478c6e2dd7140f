//! Tonewell Queue
//!
//! Durable FIFO of recording jobs, partitioned by device.
//!
//! - [`JobQueue`]: the contract workers and the ingestor program against
//! - [`PgJobQueue`]: Postgres storage with `LISTEN`/`NOTIFY` wake-up
//! - [`MemoryJobQueue`]: in-process storage (feature `memory`)

pub mod db;
pub mod error;
mod postgres;
mod queue;
pub mod repository;

#[cfg(any(test, feature = "memory"))]
mod memory;

pub use error::QueueError;
pub use postgres::PgJobQueue;
pub use queue::JobQueue;

#[cfg(any(test, feature = "memory"))]
pub use memory::MemoryJobQueue;
