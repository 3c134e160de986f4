#![forbid(unsafe_code)]

//! Session host for the `chunker-cli` world conversion engine.
//!
//! Each client session supervises one `chunker-cli messenger` process,
//! exchanges line-delimited JSON with it, and stages the world archives and
//! directories the engine reads and writes.

pub mod client;
pub mod config;
pub mod errors;
pub mod protocol;
pub mod registry;
pub mod session;
pub mod stager;
pub mod transport;
pub mod worker;

pub use config::HostConfig;
pub use errors::{AppError, Result};
