//! Autonomous task agent: plan a goal, execute the steps, audit the outcome.
//!
//! A run turns a free-text goal into a short plan, executes each step either
//! by asking the generation engine directly or by routing it to tools, and
//! finishes with a self-audit. Tools that run code or commands do so in a
//! disposable sandbox with no network, a memory ceiling and a wall-clock
//! timeout, torn down on every path.
//!
//! - **[`core`]**: Pure, deterministic logic (data model, plan parsing and
//!   validation, execution context, generation options). No I/O.
//! - **[`io`]**: Side-effecting adapters (config, child processes, generation
//!   engine, prompts, sandbox backends, memory).
//! - **[`tools`]**: Tool capabilities and the registry that dispatches to them.
//! - **[`orchestrator`]**: The plan/execute/audit loop tying it together.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
pub mod observer;
pub mod orchestrator;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
pub mod tools;
