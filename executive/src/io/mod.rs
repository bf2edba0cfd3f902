//! Side-effecting adapters: configuration, child processes, the generation
//! engine, prompt rendering, sandboxing and memory.

pub mod config;
pub mod engine;
pub mod ids;
pub mod memory;
pub mod process;
pub mod prompt;
pub mod sandbox;
