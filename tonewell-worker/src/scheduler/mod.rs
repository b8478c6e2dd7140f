//! Scheduler layer for the worker
//!
//! Fetches jobs for the worker's device and feeds them to the pipeline.

pub mod poller;

pub use poller::JobPoller;
