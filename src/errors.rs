//! Error types shared across the host.

use std::fmt::{Display, Formatter};

use tokio_util::codec::LinesCodecError;

use crate::protocol::codec::MAX_LINE_BYTES;

/// Shared host result type.
pub type Result<T> = std::result::Result<T, AppError>;

/// Host error enumeration covering all session, protocol, and staging failures.
#[derive(Debug)]
pub enum AppError {
    /// Configuration parsing or validation failure.
    Config(String),
    /// No engine binary could be resolved from the search order.
    ExecutableNotFound(String),
    /// The engine binary was found but the process could not be launched.
    Spawn(String),
    /// A worker line could not be decoded or a request could not be written.
    Protocol(String),
    /// The supplied archive does not contain a recognized world.
    ArchiveFormat(String),
    /// The supplied archive exceeds the configured size limit.
    ArchiveTooLarge(String),
    /// Input could not be staged into the session directory.
    Staging(String),
    /// The output directory could not be packaged.
    Packaging(String),
    /// A path failed validation against its owning root directory.
    PathViolation(String),
    /// Requested entity does not exist.
    NotFound(String),
    /// Caller is not allowed to access the requested session artifact.
    Unauthorized(String),
    /// The session has already been closed.
    SessionClosed(String),
    /// File-system or I/O operation failure.
    Io(String),
}

impl Display for AppError {
    fn fmt(&self, f: &mut Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Config(msg) => write!(f, "config: {msg}"),
            Self::ExecutableNotFound(msg) => write!(f, "executable not found: {msg}"),
            Self::Spawn(msg) => write!(f, "spawn: {msg}"),
            Self::Protocol(msg) => write!(f, "protocol: {msg}"),
            Self::ArchiveFormat(msg) => write!(f, "archive format: {msg}"),
            Self::ArchiveTooLarge(msg) => write!(f, "archive too large: {msg}"),
            Self::Staging(msg) => write!(f, "staging: {msg}"),
            Self::Packaging(msg) => write!(f, "packaging: {msg}"),
            Self::PathViolation(msg) => write!(f, "path violation: {msg}"),
            Self::NotFound(msg) => write!(f, "not found: {msg}"),
            Self::Unauthorized(msg) => write!(f, "unauthorized: {msg}"),
            Self::SessionClosed(msg) => write!(f, "session closed: {msg}"),
            Self::Io(msg) => write!(f, "io: {msg}"),
        }
    }
}

impl std::error::Error for AppError {}

impl From<toml::de::Error> for AppError {
    fn from(err: toml::de::Error) -> Self {
        Self::Config(format!("invalid config: {err}"))
    }
}

impl From<std::io::Error> for AppError {
    fn from(err: std::io::Error) -> Self {
        Self::Io(err.to_string())
    }
}

impl From<LinesCodecError> for AppError {
    fn from(err: LinesCodecError) -> Self {
        match err {
            LinesCodecError::MaxLineLengthExceeded => {
                Self::Protocol(format!("line too long: exceeded {MAX_LINE_BYTES} bytes"))
            }
            LinesCodecError::Io(err) => Self::Io(err.to_string()),
        }
    }
}

impl From<zip::result::ZipError> for AppError {
    fn from(err: zip::result::ZipError) -> Self {
        Self::Staging(format!("zip: {err}"))
    }
}
