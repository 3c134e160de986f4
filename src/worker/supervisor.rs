//! Engine process supervision.
//!
//! Spawns one `chunker-cli messenger` process per session with:
//! - `kill_on_drop(true)` so an abandoned handle never leaks a process;
//! - JVM options (including a computed heap ceiling) passed through
//!   `_JAVA_OPTIONS`;
//! - one task each for the stdin writer, the stdout reader, the stderr
//!   logger, and the exit monitor.
//!
//! Process exit is reported once on [`WorkerProcess::exit`] after the
//! stdout reader has drained, so every reply the engine wrote before dying
//! is still delivered.

use std::path::PathBuf;
use std::process::{ExitStatus, Stdio};
use std::time::Duration;

use tokio::process::{Child, Command};
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, warn};

use crate::protocol::message::{Frame, WorkerRequest};
use crate::protocol::reader::{run_reader, run_stderr_logger};
use crate::protocol::writer::run_writer;
use crate::worker::locate::{locate_engine, EngineLaunch};
use crate::worker::memory::{with_heap_ceiling, MemoryBasis};
use crate::{AppError, Result};

/// Fixed mode argument that puts the engine into line-protocol mode.
pub const ENGINE_MODE_ARG: &str = "messenger";

/// Environment variable the JVM reads extra options from.
pub const JAVA_OPTIONS_ENV: &str = "_JAVA_OPTIONS";

/// Time allowed for a terminated engine to exit before it is force-killed.
const TERMINATE_GRACE: Duration = Duration::from_secs(5);

/// Time allowed for stdout to drain after the process has exited.
const DRAIN_GRACE: Duration = Duration::from_secs(5);

/// Capacity of the request and frame channels.
const CHANNEL_CAPACITY: usize = 64;

/// Options used to locate and launch the engine.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct LaunchOptions {
    /// Explicit executable, or a directory to search when it ends in a
    /// separator.
    pub executable_override: Option<PathBuf>,
    /// Default install directory searched when no file override is given.
    pub install_dir: PathBuf,
    /// JVM options; a heap ceiling is appended when none is present.
    pub java_options: String,
}

/// Cloneable handle used to talk to and stop a running engine.
#[derive(Debug, Clone)]
pub struct WorkerHandle {
    session_id: String,
    requests: mpsc::Sender<WorkerRequest>,
    kill: CancellationToken,
    pid: Option<u32>,
}

impl WorkerHandle {
    /// Queue `request` for the engine's stdin.
    ///
    /// # Errors
    ///
    /// - [`AppError::SessionClosed`] if the engine has been killed.
    /// - [`AppError::Protocol`] if the writer task has stopped.
    pub async fn send(&self, request: WorkerRequest) -> Result<()> {
        if self.kill.is_cancelled() {
            return Err(AppError::SessionClosed(format!(
                "engine for session {} was stopped",
                self.session_id
            )));
        }

        self.requests
            .send(request)
            .await
            .map_err(|_| AppError::Protocol("engine stdin is closed".into()))
    }

    /// Stop the engine. Idempotent and non-blocking; the exit monitor
    /// performs the actual termination.
    pub fn kill(&self) {
        if !self.kill.is_cancelled() {
            info!(session_id = %self.session_id, "stopping engine process");
            self.kill.cancel();
        }
    }

    /// Whether [`kill`](Self::kill) has been called.
    #[must_use]
    pub fn is_killed(&self) -> bool {
        self.kill.is_cancelled()
    }

    /// OS process id, when the platform reported one.
    #[must_use]
    pub fn pid(&self) -> Option<u32> {
        self.pid
    }
}

/// A freshly spawned engine.
#[derive(Debug)]
pub struct WorkerProcess {
    /// Handle for writing requests and stopping the process.
    pub handle: WorkerHandle,
    /// Classified replies read from stdout; closes when stdout is drained.
    pub frames: mpsc::Receiver<Frame>,
    /// Exit code, sent once after `frames` has closed. `None` when the
    /// process was ended by a signal.
    pub exit: oneshot::Receiver<Option<i32>>,
}

/// Locate, size, and spawn the engine for `session_id`.
///
/// # Errors
///
/// - [`AppError::ExecutableNotFound`] if no engine binary can be resolved.
/// - [`AppError::Spawn`] if the OS refuses to start the process or its pipes
///   cannot be captured.
pub async fn spawn_worker(session_id: &str, options: &LaunchOptions) -> Result<WorkerProcess> {
    let launch = locate_engine(options.executable_override.as_deref(), &options.install_dir).await?;
    let java_options = with_heap_ceiling(&options.java_options, MemoryBasis::detect);

    let mut cmd = match &launch {
        EngineLaunch::Jar(jar) => {
            let mut cmd = Command::new("java");
            cmd.arg("-jar").arg(jar);
            cmd
        }
        EngineLaunch::Native(exe) => Command::new(exe),
    };

    cmd.arg(ENGINE_MODE_ARG)
        .env(JAVA_OPTIONS_ENV, &java_options)
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = cmd
        .spawn()
        .map_err(|err| AppError::Spawn(format!("failed to spawn engine: {err}")))?;

    let stdin = child
        .stdin
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture engine stdin".into()))?;
    let stdout = child
        .stdout
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture engine stdout".into()))?;
    let stderr = child
        .stderr
        .take()
        .ok_or_else(|| AppError::Spawn("failed to capture engine stderr".into()))?;

    let pid = child.id();
    info!(
        session_id,
        executable = %launch.path().display(),
        pid,
        java_options = %java_options,
        "engine process started"
    );

    let kill = CancellationToken::new();
    let io_cancel = CancellationToken::new();

    let (request_tx, request_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (frame_tx, frame_rx) = mpsc::channel(CHANNEL_CAPACITY);
    let (exit_tx, exit_rx) = oneshot::channel();

    let writer_session = session_id.to_owned();
    let writer_cancel = io_cancel.clone();
    tokio::spawn(async move {
        if let Err(err) = run_writer(writer_session.clone(), stdin, request_rx, writer_cancel).await {
            warn!(session_id = %writer_session, %err, "engine writer stopped");
        }
    });

    let reader = tokio::spawn(run_reader(
        session_id.to_owned(),
        stdout,
        frame_tx,
        io_cancel.clone(),
    ));

    tokio::spawn(run_stderr_logger(
        session_id.to_owned(),
        stderr,
        io_cancel.clone(),
    ));

    tokio::spawn(monitor_exit(
        session_id.to_owned(),
        child,
        reader,
        kill.clone(),
        io_cancel,
        exit_tx,
    ));

    Ok(WorkerProcess {
        handle: WorkerHandle {
            session_id: session_id.to_owned(),
            requests: request_tx,
            kill,
            pid,
        },
        frames: frame_rx,
        exit: exit_rx,
    })
}

/// Await process exit (or a kill request), drain stdout, then report the
/// exit code.
async fn monitor_exit(
    session_id: String,
    mut child: Child,
    mut reader: JoinHandle<()>,
    kill: CancellationToken,
    io_cancel: CancellationToken,
    exit_tx: oneshot::Sender<Option<i32>>,
) {
    let status = tokio::select! {
        status = child.wait() => status,
        () = kill.cancelled() => terminate(&session_id, &mut child).await,
    };

    let code = match status {
        Ok(status) => {
            info!(session_id, code = status.code(), success = status.success(), "engine process exited");
            status.code()
        }
        Err(err) => {
            error!(session_id, %err, "error waiting for engine process");
            None
        }
    };

    if tokio::time::timeout(DRAIN_GRACE, &mut reader).await.is_err() {
        warn!(session_id, "engine stdout still open after exit, abandoning reader");
    }
    io_cancel.cancel();

    if exit_tx.send(code).is_err() {
        debug!(session_id, "exit receiver dropped before engine exit was reported");
    }
}

/// Ask the engine to stop, force-killing it after [`TERMINATE_GRACE`].
async fn terminate(session_id: &str, child: &mut Child) -> std::io::Result<ExitStatus> {
    #[cfg(unix)]
    if let Some(pid) = child.id().and_then(|pid| i32::try_from(pid).ok()) {
        use nix::sys::signal::{kill, Signal};
        use nix::unistd::Pid;

        match kill(Pid::from_raw(pid), Signal::SIGTERM) {
            Ok(()) => match tokio::time::timeout(TERMINATE_GRACE, child.wait()).await {
                Ok(status) => return status,
                Err(_) => {
                    warn!(session_id, "engine did not exit within grace period, forcing kill");
                }
            },
            Err(err) => warn!(session_id, %err, "failed to signal engine process"),
        }
    }

    if let Err(err) = child.start_kill() {
        debug!(session_id, %err, "engine already gone when force-killing");
    }
    child.wait().await
}
