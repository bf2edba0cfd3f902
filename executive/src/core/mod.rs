//! Deterministic, pure logic shared by the agent core.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests.

pub mod budget;
pub mod cancel;
pub mod context;
pub mod invariants;
pub mod options;
pub mod plan;
pub mod text;
pub mod types;
