//! # nspawn-machine
//!
//! Everything the driver knows about a machine before and around its
//! process:
//! - **Config**: the declarative container configuration, its validation
//!   rules, and its rendering into `systemd-nspawn` arguments.
//! - **Image**: resolution of an image reference to a path on disk.
//! - **Bus**: the management bus capability and its untyped property bags.
//! - **Descriptor**: typed decoding of machine and image property bags.
//! - **Poll**: descriptor lookup with a deadline and image pull progress.

#![cfg_attr(test, allow(clippy::expect_used, clippy::unwrap_used, clippy::panic))]

pub mod bus;
pub mod compat;
pub mod config;
pub mod descriptor;
pub mod image;
pub mod poll;

#[cfg(test)]
mod testing;
