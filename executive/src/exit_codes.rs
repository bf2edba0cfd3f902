//! Stable exit codes for `executive` commands.

/// Command succeeded; for `run`, every planned step ran and succeeded.
pub const OK: i32 = 0;
/// Invalid configuration or input, or an error that prevented a report.
pub const INVALID: i32 = 1;
/// The run finished but at least one step failed (or the sandboxed command exited non-zero).
pub const FAILED: i32 = 2;
/// The run stopped early: truncated at `max_iterations` or cancelled.
pub const INCOMPLETE: i32 = 3;
