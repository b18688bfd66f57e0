//! Shared data model and error taxonomy for the trusted-path bridge.
//!
//! This crate has no transport, no I/O beyond what's needed to build an
//! [`fsindex::FsIndex`], and no async runtime dependency — it is the
//! vocabulary both `op15-bridge` and `op15-agent` build on.

pub mod action_log;
pub mod config;
pub mod error;
pub mod fsindex;
pub mod permissions;
pub mod session;

pub use error::{DenyReason, Error, Result};
