//! Client sessions.
//!
//! A session pairs one client with one engine process and one staging
//! directory. [`Session::connect`] validates the id and spawns the engine;
//! failure produces a single close notice with [`SPAWN_FAILURE_CODE`] and no
//! session value ever exists. A connected session then moves through
//! `Open → Closing → Closed`:
//!
//! - **Open**: client commands are handled one at a time; engine replies are
//!   correlated and relayed in the order the engine wrote them.
//! - **Closing**: triggered by the client, by engine exit, or by host
//!   shutdown, whichever comes first. Teardown runs once.
//! - **Closed**: further close calls resolve to the first close's code and
//!   late engine replies are dropped.

pub mod command;
mod handlers;
pub mod settings;

use std::io;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::{Arc, Mutex, OnceLock, PoisonError};

use serde_json::Value;
use tokio::sync::{mpsc, oneshot};
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, info_span, warn, Instrument};

use crate::client::{ClientEvent, ClientFrame, ClientSink};
use crate::protocol::correlator::{Correlator, ResponseMapper};
use crate::protocol::message::{Frame, Reply, WorkerRequest};
use crate::registry::SessionRegistry;
use crate::session::command::ClientCommand;
use crate::session::settings::SessionSettings;
use crate::stager::paths::session_dir;
use crate::worker::supervisor::{spawn_worker, LaunchOptions, WorkerHandle};
use crate::{AppError, Result};

/// Close code reported when the engine could not be started.
pub const SPAWN_FAILURE_CODE: i32 = -100;

/// Lifecycle state of a session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Accepting commands.
    Open,
    /// Teardown in progress.
    Closing,
    /// Teardown finished.
    Closed,
}

/// Per-session limits taken from host configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SessionLimits {
    /// Largest input archive accepted, in bytes.
    pub max_archive_bytes: u64,
}

/// Everything needed to start a session.
#[derive(Debug, Clone)]
pub struct SessionContext {
    /// Where frames for the client go.
    pub client: Arc<dyn ClientSink>,
    /// Registry the session joins while open.
    pub registry: SessionRegistry,
    /// Engine launch options.
    pub launch: LaunchOptions,
    /// Parent of all per-session staging directories.
    pub staging_root: PathBuf,
    /// Per-session limits.
    pub limits: SessionLimits,
}

/// A live client session.
#[derive(Debug)]
pub struct Session {
    id: String,
    staging_dir: PathBuf,
    client: Arc<dyn ClientSink>,
    registry: SessionRegistry,
    limits: SessionLimits,
    state: Mutex<SessionState>,
    connected: AtomicBool,
    worker: WorkerHandle,
    correlator: tokio::sync::Mutex<Correlator>,
    settings: tokio::sync::Mutex<SessionSettings>,
    inbox: mpsc::UnboundedSender<Value>,
    listener: CancellationToken,
    close_started: AtomicBool,
    close_code: OnceLock<Option<i32>>,
    closed: CancellationToken,
}

impl Session {
    /// Start a session: spawn its engine, create its staging directory,
    /// register it, and announce it to the client.
    ///
    /// # Errors
    ///
    /// Returns [`AppError::PathViolation`] for an id that cannot name a
    /// staging directory, or the spawn or staging error, after the client
    /// has been sent a close notice with [`SPAWN_FAILURE_CODE`]. Returns
    /// [`AppError::Protocol`] without notifying the client if a session
    /// with this id is already live.
    pub async fn connect(id: &str, ctx: &SessionContext) -> Result<Arc<Self>> {
        let span = info_span!("session", session_id = %id);
        Self::connect_inner(id, ctx).instrument(span).await
    }

    async fn connect_inner(id: &str, ctx: &SessionContext) -> Result<Arc<Self>> {
        let staging_dir = match session_dir(&ctx.staging_root, id) {
            Ok(dir) => dir,
            Err(err) => {
                warn!(%err, "rejected session id");
                send_spawn_failure(ctx.client.as_ref(), id, &err);
                return Err(err);
            }
        };
        if ctx.registry.contains(id).await {
            return Err(AppError::Protocol(format!("session {id} is already open")));
        }
        debug!("starting session");

        let process = match spawn_worker(id, &ctx.launch).await {
            Ok(process) => process,
            Err(err) => {
                warn!(%err, "engine failed to start");
                send_spawn_failure(ctx.client.as_ref(), id, &err);
                return Err(err);
            }
        };

        if let Err(err) = tokio::fs::create_dir_all(&staging_dir).await {
            process.handle.kill();
            let err = AppError::Staging(format!(
                "cannot create staging directory {}: {err}",
                staging_dir.display()
            ));
            warn!(%err, "session staging failed");
            send_spawn_failure(ctx.client.as_ref(), id, &err);
            return Err(err);
        }

        let (inbox_tx, inbox_rx) = mpsc::unbounded_channel();
        let session = Arc::new(Self {
            id: id.to_owned(),
            staging_dir,
            client: Arc::clone(&ctx.client),
            registry: ctx.registry.clone(),
            limits: ctx.limits,
            state: Mutex::new(SessionState::Open),
            connected: AtomicBool::new(true),
            worker: process.handle,
            correlator: tokio::sync::Mutex::new(Correlator::new()),
            settings: tokio::sync::Mutex::new(SessionSettings::default()),
            inbox: inbox_tx,
            listener: CancellationToken::new(),
            close_started: AtomicBool::new(false),
            close_code: OnceLock::new(),
            closed: CancellationToken::new(),
        });

        ctx.registry.insert(Arc::clone(&session)).await;
        session.send_raw(ClientFrame::Open);

        let span = info_span!("session", session_id = %id);
        tokio::spawn(
            Arc::clone(&session)
                .run_dispatch(process.frames, process.exit)
                .instrument(span.clone()),
        );
        tokio::spawn(Arc::clone(&session).run_commands(inbox_rx).instrument(span));

        info!(
            staging_dir = %session.staging_dir.display(),
            pid = session.worker.pid(),
            "session open"
        );
        Ok(session)
    }

    /// Session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Directory holding this session's artifacts.
    #[must_use]
    pub fn staging_dir(&self) -> &Path {
        &self.staging_dir
    }

    /// Current lifecycle state.
    #[must_use]
    pub fn state(&self) -> SessionState {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Whether frames are still delivered to the client.
    #[must_use]
    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    /// Whether the engine has been asked to stop.
    #[must_use]
    pub fn is_worker_killed(&self) -> bool {
        self.worker.is_killed()
    }

    /// Route a client event to this session.
    ///
    /// Commands queue for the command loop; a close starts teardown
    /// immediately so it is not held behind a long-running command.
    pub fn deliver(self: &Arc<Self>, event: ClientEvent) {
        match event {
            ClientEvent::Message { data } => {
                if !self.is_connected() {
                    debug!(session_id = %self.id, "dropping command for closed session");
                    return;
                }
                if self.inbox.send(data).is_err() {
                    debug!(session_id = %self.id, "command loop stopped, dropping command");
                }
            }
            ClientEvent::Close { code } => {
                let session = Arc::clone(self);
                tokio::spawn(async move {
                    session.close(code).await;
                });
            }
            ClientEvent::Connect => {
                warn!(session_id = %self.id, "ignoring connect for an open session");
            }
        }
    }

    /// Close the session with `code`, returning the code the session was
    /// actually closed with.
    ///
    /// The first call emits the close notice, stops the command loop, kills
    /// the engine, removes the staging directory, and deregisters the
    /// session. Later and concurrent calls wait for that teardown and
    /// resolve to the first call's code.
    pub async fn close(&self, code: Option<i32>) -> Option<i32> {
        if self.close_started.swap(true, Ordering::AcqRel) {
            self.closed.cancelled().await;
            return self.close_code.get().copied().flatten();
        }

        let _ = self.close_code.set(code);
        self.set_state(SessionState::Closing);
        info!(session_id = %self.id, ?code, "closing session");

        self.send_raw(ClientFrame::Close { code, error: None });
        self.connected.store(false, Ordering::Release);
        self.listener.cancel();
        self.worker.kill();

        let dropped = self.correlator.lock().await.clear();
        if dropped > 0 {
            debug!(session_id = %self.id, dropped, "discarded outstanding response mappers");
        }

        match tokio::fs::remove_dir_all(&self.staging_dir).await {
            Ok(()) => debug!(session_id = %self.id, "staging directory removed"),
            Err(err) if err.kind() == io::ErrorKind::NotFound => {}
            Err(err) => warn!(
                session_id = %self.id,
                staging_dir = %self.staging_dir.display(),
                %err,
                "failed to remove staging directory"
            ),
        }

        self.registry.remove(&self.id).await;
        self.set_state(SessionState::Closed);
        self.closed.cancel();
        info!(session_id = %self.id, "session closed");
        code
    }

    /// Wait until teardown has finished.
    pub async fn closed(&self) {
        self.closed.cancelled().await;
    }

    fn set_state(&self, state: SessionState) {
        *self.state.lock().unwrap_or_else(PoisonError::into_inner) = state;
    }

    fn send_raw(&self, frame: ClientFrame) {
        if self.is_connected() {
            self.client.send(&self.id, frame);
        }
    }

    fn send_reply(&self, reply: Reply) {
        self.send_raw(ClientFrame::Message {
            data: reply.into_value(),
        });
    }

    /// Register `mapper` (if any) and write `request` to the engine.
    async fn send_to_worker(&self, request: WorkerRequest, mapper: Option<ResponseMapper>) {
        let request_id = request.request_id().to_owned();
        if let Some(mapper) = mapper {
            self.correlator.lock().await.register(&request_id, mapper);
        }

        debug!(session_id = %self.id, request_id = %request_id, "writing request to engine");
        if let Err(err) = self.worker.send(request).await {
            warn!(session_id = %self.id, request_id = %request_id, %err, "failed to write request to engine");
        }
    }

    /// Relay engine replies until stdout closes, then close with the exit
    /// code.
    async fn run_dispatch(
        self: Arc<Self>,
        mut frames: mpsc::Receiver<Frame>,
        exit: oneshot::Receiver<Option<i32>>,
    ) {
        while let Some(frame) = frames.recv().await {
            if !self.is_connected() {
                continue;
            }
            let settled = self.correlator.lock().await.settle(frame);
            let reply = settled.resolve().await;
            self.send_reply(reply);
        }

        let code = exit.await.ok().flatten();
        debug!(session_id = %self.id, ?code, "engine output finished");
        self.close(code).await;
    }

    /// Handle client commands one at a time until the listener is detached.
    async fn run_commands(self: Arc<Self>, mut inbox: mpsc::UnboundedReceiver<Value>) {
        loop {
            let data = tokio::select! {
                () = self.listener.cancelled() => break,
                data = inbox.recv() => match data {
                    Some(data) => data,
                    None => break,
                },
            };

            let command = ClientEvent::command_value(data)
                .and_then(|value| {
                    serde_json::from_value::<ClientCommand>(value)
                        .map_err(|err| AppError::Protocol(format!("unrecognised command: {err}")))
                });

            match command {
                Ok(command) => self.handle_command(command).await,
                Err(err) => warn!(session_id = %self.id, %err, "ignoring client command"),
            }
        }
        debug!(session_id = %self.id, "command loop stopped");
    }
}

fn send_spawn_failure(client: &dyn ClientSink, session_id: &str, err: &AppError) {
    client.send(
        session_id,
        ClientFrame::Close {
            code: Some(SPAWN_FAILURE_CODE),
            error: Some(err.to_string()),
        },
    );
}
