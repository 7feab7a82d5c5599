//! Shared utilities for archiparse integration tests.
//!
//! - `TestHarness`: temp upload directory, file database, service and pool
//! - builders for IFCXML documents and pre-seeded jobs

pub mod builders;
pub mod harness;

pub use builders::*;
pub use harness::TestHarness;
