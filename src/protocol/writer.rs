//! Engine stdin writer task.
//!
//! Receives [`WorkerRequest`]s from a tokio [`mpsc`] channel, serialises each
//! to a single-line JSON string, and writes the line plus one `\n` to the
//! engine's stdin. A single task owns stdin, so writes never interleave.

use tokio::io::{AsyncWrite, AsyncWriteExt};
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::protocol::message::WorkerRequest;
use crate::{AppError, Result};

/// Engine writer task: serialises outbound requests and writes to `stdin`.
///
/// The task exits cleanly when `cancel` fires or all senders are dropped.
///
/// # Errors
///
/// - [`AppError::Protocol`]`("failed to serialise request: …")` if a request
///   cannot be encoded.
/// - [`AppError::Protocol`]`("write failed: …")` if the engine's stdin is
///   closed (the process has exited).
pub async fn run_writer<W>(
    session_id: String,
    stdin: W,
    mut request_rx: mpsc::Receiver<WorkerRequest>,
    cancel: CancellationToken,
) -> Result<()>
where
    W: AsyncWrite + Unpin + Send,
{
    let mut stdin = stdin;

    loop {
        tokio::select! {
            biased;

            () = cancel.cancelled() => {
                debug!(session_id, "engine writer: cancellation received, stopping");
                break;
            }

            request = request_rx.recv() => {
                let Some(request) = request else {
                    debug!(session_id, "engine writer: request channel closed, stopping");
                    break;
                };

                let mut line = request.to_line()?;
                debug!(session_id, request_id = request.request_id(), line = %line, "writing to engine");
                line.push('\n');

                stdin.write_all(line.as_bytes()).await.map_err(|e| {
                    warn!(session_id, error = %e, "engine writer: write to stdin failed");
                    AppError::Protocol(format!("write failed: {e}"))
                })?;
                stdin.flush().await.map_err(|e| {
                    AppError::Protocol(format!("flush failed: {e}"))
                })?;
            }
        }
    }

    Ok(())
}
