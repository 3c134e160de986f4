//! Engine stdout reader task.
//!
//! Reads newline-delimited JSON replies from the engine's stdout, classifies
//! each into a [`Frame`], and forwards the frames through a tokio [`mpsc`]
//! channel to the owning session's dispatch loop.
//!
//! The reader is driven by [`FramedRead`] backed by [`LineCodec`], so reply
//! objects split across arbitrary pipe reads are reassembled before parsing.

use futures_util::StreamExt;
use tokio::io::AsyncRead;
use tokio::sync::mpsc;
use tokio_util::codec::FramedRead;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::codec::LineCodec;
use crate::protocol::message::{decode_line, Frame};
use crate::AppError;

/// Engine reader task: reads NDJSON lines from `stdout` and emits [`Frame`]s.
///
/// Malformed lines, non-object lines and over-long lines are logged and
/// skipped; they never terminate the reader. The task returns on EOF, on an
/// unrecoverable I/O error, when `frame_tx` is closed, or when `cancel`
/// fires.
pub async fn run_reader<R>(
    session_id: String,
    stdout: R,
    frame_tx: mpsc::Sender<Frame>,
    cancel: CancellationToken,
) where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stdout, LineCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "engine reader: cancellation received, stopping");
                break;
            }

            item = framed.next() => {
                match item {
                    None => {
                        debug!(session_id, "engine reader: EOF detected");
                        break;
                    }

                    Some(Err(AppError::Protocol(ref msg))) => {
                        warn!(
                            session_id,
                            error = msg.as_str(),
                            "engine reader: framing error, skipping"
                        );
                    }

                    Some(Err(e)) => {
                        warn!(session_id, error = %e, "engine reader: IO error, stopping");
                        break;
                    }

                    Some(Ok(line)) => {
                        debug!(session_id, line = line.trim(), "engine output");
                        match decode_line(&line) {
                            Ok(Some(frame)) => {
                                if frame_tx.send(frame).await.is_err() {
                                    debug!(session_id, "engine reader: frame_tx closed, stopping");
                                    break;
                                }
                            }
                            Ok(None) => {}
                            Err(e) => {
                                warn!(
                                    session_id,
                                    error = %e,
                                    raw_line = %line,
                                    "engine reader: parse error, skipping line"
                                );
                            }
                        }
                    }
                }
            }
        }
    }
}

/// Engine stderr logger task.
///
/// Every line is logged at ERROR except the JVM's `Picked up …` echo of its
/// option environment variables, which is informational.
pub async fn run_stderr_logger<R>(session_id: String, stderr: R, cancel: CancellationToken)
where
    R: AsyncRead + Unpin + Send,
{
    let mut framed = FramedRead::new(stderr, LineCodec::new());

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => break,

            item = framed.next() => {
                match item {
                    None | Some(Err(AppError::Io(_))) => break,
                    Some(Err(_)) => {}
                    Some(Ok(line)) => log_stderr_line(&session_id, &line),
                }
            }
        }
    }
}

/// Severity assigned to one line of engine stderr.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StderrSeverity {
    Info,
    Error,
    /// Blank lines are not logged.
    Skip,
}

/// Classify one stderr line.
#[must_use]
pub fn classify_stderr(line: &str) -> StderrSeverity {
    let value = line.trim();
    if value.is_empty() {
        StderrSeverity::Skip
    } else if value.starts_with("Picked up") {
        StderrSeverity::Info
    } else {
        StderrSeverity::Error
    }
}

fn log_stderr_line(session_id: &str, line: &str) {
    match classify_stderr(line) {
        StderrSeverity::Info => tracing::info!(session_id, "info from engine: {}", line.trim()),
        StderrSeverity::Error => tracing::error!(session_id, "error from engine: {}", line.trim()),
        StderrSeverity::Skip => {}
    }
}
