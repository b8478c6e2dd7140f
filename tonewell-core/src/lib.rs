//! Tonewell Core
//!
//! Core types shared by every tonewell service.
//!
//! This crate contains:
//! - Domain types: the persisted job record, its status machine, owners and devices
//! - Score handling: duration measurement and structural validation of submitted scores

pub mod domain;
pub mod score;

#[cfg(any(test, feature = "test-utils"))]
pub mod test_support;
