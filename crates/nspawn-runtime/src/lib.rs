//! Task lifecycle management for nspawn containers.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod busctl;
pub mod driver;
pub mod executor;
pub mod handle;
pub mod host;
