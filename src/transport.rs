//! Line transport for the client channel.
//!
//! One JSON object per line in each direction. Inbound lines carry a session
//! id and an event; outbound frames produced by every session funnel through
//! a single writer task so lines never interleave. End of input shuts the
//! host down: every live session is closed before [`serve`] returns.

use futures_util::{SinkExt, StreamExt};
use tokio::io::{AsyncRead, AsyncWrite};
use tokio::sync::mpsc;
use tokio_util::codec::{FramedRead, FramedWrite};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::client::{ClientEvent, Inbound, Outbound};
use crate::protocol::codec::LineCodec;
use crate::session::{Session, SessionContext};
use crate::{AppError, Result};

/// Serve the client channel until `input` reaches EOF or `shutdown` fires,
/// then close every live session and flush the remaining frames.
///
/// `outbound` must be the receiver paired with the sink in `ctx`.
///
/// # Errors
///
/// Returns [`AppError::Io`] if reading the client channel fails.
pub async fn serve<R, W>(
    input: R,
    output: W,
    ctx: SessionContext,
    outbound: mpsc::UnboundedReceiver<Outbound>,
    shutdown: CancellationToken,
) -> Result<()>
where
    R: AsyncRead + Unpin + Send,
    W: AsyncWrite + Unpin + Send + 'static,
{
    let writer_stop = CancellationToken::new();
    let writer = tokio::spawn(run_client_writer(output, outbound, writer_stop.clone()));

    let mut lines = FramedRead::new(input, LineCodec::new());
    let mut outcome = Ok(());

    info!("client channel ready");
    loop {
        let line = tokio::select! {
            () = shutdown.cancelled() => {
                info!("shutdown requested");
                break;
            }
            item = lines.next() => match item {
                None => {
                    info!("client channel closed");
                    break;
                }
                Some(Err(AppError::Protocol(msg))) => {
                    warn!(error = %msg, "skipping client line");
                    continue;
                }
                Some(Err(err)) => {
                    error!(%err, "client channel read failed");
                    outcome = Err(err);
                    break;
                }
                Some(Ok(line)) => line,
            },
        };

        if line.trim().is_empty() {
            continue;
        }

        match Inbound::parse(&line) {
            Ok(inbound) => route(&ctx, inbound).await,
            Err(err) => warn!(%err, "ignoring client frame"),
        }
    }

    ctx.registry.shutdown().await;

    writer_stop.cancel();
    if let Err(err) = writer.await {
        warn!(%err, "client writer task failed");
    }

    outcome
}

async fn route(ctx: &SessionContext, inbound: Inbound) {
    let Inbound { session, event } = inbound;

    if matches!(event, ClientEvent::Connect) {
        if let Err(err) = Session::connect(&session, ctx).await {
            warn!(session_id = %session, %err, "session did not open");
        }
        return;
    }

    match ctx.registry.get(&session).await {
        Some(live) => live.deliver(event),
        None => debug!(session_id = %session, "event for unknown session dropped"),
    }
}

/// Write outbound frames until `stop` fires, then drain what is queued.
async fn run_client_writer<W>(
    output: W,
    mut outbound: mpsc::UnboundedReceiver<Outbound>,
    stop: CancellationToken,
) where
    W: AsyncWrite + Unpin + Send,
{
    let mut framed = FramedWrite::new(output, LineCodec::new());

    loop {
        let frame = tokio::select! {
            frame = outbound.recv() => match frame {
                Some(frame) => frame,
                None => break,
            },
            () = stop.cancelled() => {
                while let Ok(frame) = outbound.try_recv() {
                    if write_frame(&mut framed, &frame).await.is_err() {
                        return;
                    }
                }
                break;
            }
        };

        if write_frame(&mut framed, &frame).await.is_err() {
            return;
        }
    }

    if let Err(err) = framed.close().await {
        debug!(%err, "client channel close failed");
    }
}

async fn write_frame<W>(framed: &mut FramedWrite<W, LineCodec>, frame: &Outbound) -> Result<()>
where
    W: AsyncWrite + Unpin,
{
    let line = serde_json::to_string(frame)
        .map_err(|err| AppError::Protocol(format!("failed to serialise client frame: {err}")))?;
    framed.send(line).await.map_err(|err| {
        error!(session_id = %frame.session, %err, "client channel write failed");
        err
    })
}
