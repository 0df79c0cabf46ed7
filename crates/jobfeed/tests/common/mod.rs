//! Shared test utilities for jobfeed integration tests.
//!
//! - `TestHarness`: a store (in-memory or SQLite in a temp dir), a manual
//!   clock and the queue wired to both
//! - builders for postings, sources, providers and config files

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::{at, Backend, TestHarness};
