//! Conversion engine process management.
//!
//! - `locate`: executable discovery across install layouts.
//! - `memory`: JVM heap ceiling heuristic.
//! - `supervisor`: spawn, stdio tasks, kill, and exit reporting.

pub mod locate;
pub mod memory;
pub mod supervisor;
