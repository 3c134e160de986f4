//! On-disk artifacts exchanged with the engine.
//!
//! Staging is synchronous filesystem work; callers run it on the blocking
//! pool with `tokio::task::spawn_blocking`.

pub mod archive;
pub mod copy;
pub mod naming;
pub mod package;
pub mod paths;
pub mod preload;
pub mod progress;

/// Counts from a staging pass.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct StageSummary {
    /// Files written.
    pub files: u64,
    /// Directories created.
    pub directories: u64,
    /// Entries left out (outside the world root or excluded).
    pub skipped: u64,
}
