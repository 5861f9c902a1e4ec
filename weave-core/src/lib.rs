#![forbid(unsafe_code)]

//! Core utilities for the Weave secure session stack.
//!
//! This crate intentionally stays lightweight and pure Rust.
//! Public modules export typed identifiers, the shared error taxonomy,
//! the clock and persistent-storage contracts, and configuration
//! helpers used across the workspace.

pub mod clock;
pub mod config;
pub mod error;
pub mod storage;
pub mod types;

// Re-export commonly used types
pub use clock::{Clock, SystemClock, TestClock};
pub use error::{Error, Result};
pub use storage::{MemoryStorage, Storage};
pub use types::{FabricId, FabricIndex, GroupId, NodeId, PeerAddress, SessionId, TimestampMs};
