//! Command handlers.
//!
//! Each flow command prepares its staging directory, writes one request to
//! the engine, and registers a response mapper that enriches the engine's
//! answer before it reaches the client. Staging failures are reported in the
//! same terminal `error` shape the engine uses.

use std::io;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use base64::engine::general_purpose::STANDARD as BASE64;
use base64::Engine as _;
use serde_json::{json, Map, Value};
use tracing::{debug, error, info, warn};

use crate::protocol::correlator::ResponseMapper;
use crate::protocol::message::{ConvertRequest, Reply, WorkerRequest};
use crate::registry::Locator;
use crate::session::command::{ClientCommand, ConvertOptions, FlowCommand};
use crate::session::Session;
use crate::stager::archive::stage_archive;
use crate::stager::copy::{copy_file_with_progress, copy_for_editing, stage_directory};
use crate::stager::naming::output_file_name;
use crate::stager::package::package_directory;
use crate::stager::preload::read_preloaded_settings;
use crate::{AppError, Result};

const INPUT_DIR: &str = "input";
const SETTINGS_DIR: &str = "settings";
const PREVIEW_DIR: &str = "preview";
const OUTPUT_DIR: &str = "output";

/// Settings document the engine writes into the settings directory.
const SETTINGS_DATA_FILE: &str = "data.json";

/// Preview image the engine writes into the preview directory.
const PREVIEW_FILE: &str = "map.bin";

/// Progress shown while the host finishes work the engine cannot measure.
const FINISHING_PROGRESS: f64 = 0.999;

const ZIPPING_STAGE: &str = "Zipping output";

const MSG_INPUT_NOT_FOUND: &str = "Failed to find input world.";
const MSG_NO_WORLD: &str = "Provided file does not contain a Minecraft world.";
const MSG_ARCHIVE_TOO_LARGE: &str =
    "This zip file is too large to open, please unzip the file and try opening it as a folder.";
const MSG_ARCHIVE_UNREADABLE: &str =
    "Failed to open selected file, please ensure you don't have it open anywhere else.";
const MSG_FOLDER_UNREADABLE: &str =
    "Failed to open selected folder, please ensure you don't have it open anywhere else.";
const MSG_STAGING_FAILED: &str = "Failed to prepare the session directory.";
const MSG_SETTINGS_UNREADABLE: &str = "Failed to read world settings.";
const MSG_PREVIEW_UNREADABLE: &str = "Failed to read map preview.";
const MSG_EDIT_COPY_FAILED: &str = "Failed to copy the world for editing.";
const MSG_PACKAGING_FAILED: &str = "Failed to create output ZIP.";
const MSG_SAVE_FAILED: &str = "Failed to save file.";

#[derive(Debug, Clone, Copy)]
enum InputKind {
    Archive,
    Directory,
}

impl Session {
    pub(super) async fn handle_command(self: &Arc<Self>, command: ClientCommand) {
        let request_id = command.request_id().to_owned();
        debug!(session_id = %self.id, request_id = %request_id, "handling command");

        match command {
            ClientCommand::Flow(flow) => self.handle_flow(flow).await,
            ClientCommand::Settings(update) => {
                self.settings.lock().await.apply_settings(update);
                self.send_reply(Reply::response(&request_id));
            }
            ClientCommand::Mappings(update) => {
                self.settings.lock().await.apply_mappings(update);
                self.send_reply(Reply::response(&request_id));
            }
        }
    }

    async fn handle_flow(self: &Arc<Self>, flow: FlowCommand) {
        match flow {
            FlowCommand::Cancel { request_id } => {
                info!(session_id = %self.id, request_id = %request_id, "cancelling engine task");
                let request = WorkerRequest::Kill {
                    request_id,
                    anonymous_id: self.id.clone(),
                };
                self.send_to_worker(request, None).await;
            }
            FlowCommand::Save {
                request_id,
                url,
                destination,
            } => self.save(&request_id, &url, destination).await,
            FlowCommand::SelectWorld { request_id, path } => {
                self.select_world(&request_id, path).await;
            }
            FlowCommand::GenerateSettings { request_id } => self.generate_settings(request_id).await,
            FlowCommand::GeneratePreview { request_id } => self.generate_preview(request_id).await,
            FlowCommand::Convert(options) => self.convert(options).await,
        }
    }

    async fn select_world(self: &Arc<Self>, request_id: &str, path: PathBuf) {
        let input = self.staging_dir.join(INPUT_DIR);
        if let Err(err) = recreate_dir(&input).await {
            error!(session_id = %self.id, %err, "failed to prepare input directory");
            self.send_reply(Reply::error(request_id, MSG_STAGING_FAILED, Some(err.to_string())));
            return;
        }

        let kind = match tokio::fs::metadata(&path).await {
            Ok(meta) if meta.is_file() => InputKind::Archive,
            Ok(meta) if meta.is_dir() => InputKind::Directory,
            _ => {
                warn!(session_id = %self.id, path = %path.display(), "input world not found");
                self.send_reply(Reply::error(request_id, MSG_INPUT_NOT_FOUND, None));
                return;
            }
        };

        info!(session_id = %self.id, path = %path.display(), ?kind, "staging input world");
        let progress = self.progress_sink(request_id);
        let max_archive_bytes = self.limits.max_archive_bytes;
        let dest = input.clone();
        let staged = run_blocking(move || match kind {
            InputKind::Archive => stage_archive(&path, &dest, max_archive_bytes, progress),
            InputKind::Directory => stage_directory(&path, &dest, progress),
        })
        .await;

        if let Err(err) = staged {
            error!(session_id = %self.id, %err, "failed to stage input world");
            self.send_reply(staging_error(request_id, kind, &err));
            return;
        }
        if self.discard_if_closed().await {
            return;
        }

        self.send_reply(Reply::progress_state(request_id, FINISHING_PROGRESS, None));

        let preload_dir = input.clone();
        let preloaded = match run_blocking(move || Ok(read_preloaded_settings(&preload_dir))).await {
            Ok(Ok(preloaded)) => preloaded,
            Ok(Err(failure)) => {
                warn!(session_id = %self.id, file = %failure.file_name, cause = %failure.cause, "invalid preloaded settings");
                let message = format!("Failed to parse {} as preloaded data.", failure.file_name);
                self.send_reply(Reply::error(request_id, &message, Some(failure.cause)));
                return;
            }
            Err(err) => {
                self.send_reply(Reply::error(request_id, MSG_STAGING_FAILED, Some(err.to_string())));
                return;
            }
        };

        let session_id = self.id.clone();
        let mapper = ResponseMapper::new(move |mut reply: Reply| async move {
            let version = reply.fields.remove("output").unwrap_or(Value::Null);
            reply.set(
                "output",
                json!({
                    "version": version,
                    "preloaded_settings": Value::Object(preloaded),
                    "session": session_id,
                }),
            );
            reply
        });

        let request = WorkerRequest::DetectVersion {
            request_id: request_id.to_owned(),
            anonymous_id: self.id.clone(),
            input_path: input,
        };
        self.send_to_worker(request, Some(mapper)).await;
    }

    async fn generate_settings(self: &Arc<Self>, request_id: String) {
        let output = self.staging_dir.join(SETTINGS_DIR);
        if !self.prepare_output(&request_id, &output).await {
            return;
        }

        let data_file = output.join(SETTINGS_DATA_FILE);
        let mapper_request = request_id.clone();
        let mapper = ResponseMapper::new(move |mut reply: Reply| async move {
            match read_json_object(&data_file).await {
                Ok(data) => {
                    reply.edit_output(|output| merge_settings(output, data));
                    reply
                }
                Err(err) => {
                    error!(request_id = %mapper_request, %err, "failed to read engine settings output");
                    Reply::error(&mapper_request, MSG_SETTINGS_UNREADABLE, Some(err.to_string()))
                }
            }
        });

        let request = WorkerRequest::Settings {
            request_id,
            anonymous_id: self.id.clone(),
            input_path: self.staging_dir.join(INPUT_DIR),
            output_path: output,
        };
        self.send_to_worker(request, Some(mapper)).await;
    }

    async fn generate_preview(self: &Arc<Self>, request_id: String) {
        let output = self.staging_dir.join(PREVIEW_DIR);
        if !self.prepare_output(&request_id, &output).await {
            return;
        }

        let preview_file = output.join(PREVIEW_FILE);
        let mapper_request = request_id.clone();
        let mapper = ResponseMapper::new(move |mut reply: Reply| async move {
            match tokio::fs::read(&preview_file).await {
                Ok(bytes) => {
                    reply.set("output", Value::String(BASE64.encode(bytes)));
                    reply
                }
                Err(err) => {
                    error!(request_id = %mapper_request, %err, "failed to read engine preview output");
                    Reply::error(&mapper_request, MSG_PREVIEW_UNREADABLE, Some(err.to_string()))
                }
            }
        });

        let request = WorkerRequest::Preview {
            request_id,
            anonymous_id: self.id.clone(),
            input_path: self.staging_dir.join(INPUT_DIR),
            output_path: output,
        };
        self.send_to_worker(request, Some(mapper)).await;
    }

    async fn convert(self: &Arc<Self>, options: ConvertOptions) {
        let request_id = options.request_id.clone();
        let input = self.staging_dir.join(INPUT_DIR);
        let output = self.staging_dir.join(OUTPUT_DIR);
        if !self.prepare_output(&request_id, &output).await {
            return;
        }

        if options.is_editing() {
            let (src, dest) = (input.clone(), output.clone());
            let copied = run_blocking(move || copy_for_editing(&src, &dest)).await;
            if self.discard_if_closed().await {
                return;
            }
            match copied {
                Ok(summary) => debug!(session_id = %self.id, files = summary.files, "copied input for editing"),
                Err(err) => {
                    error!(session_id = %self.id, %err, "failed to copy input for editing");
                    self.send_reply(Reply::error(&request_id, MSG_EDIT_COPY_FAILED, Some(err.to_string())));
                    return;
                }
            }
        }

        let settings = self.settings.lock().await.clone();
        let flags = options.flags();
        let request = WorkerRequest::Convert(ConvertRequest {
            request_id: request_id.clone(),
            anonymous_id: self.id.clone(),
            input_path: input,
            output_path: output.clone(),
            output_type: options.output_type.clone(),
            input_to_output_dimension: settings.dimension_mappings,
            mappings: settings.block_mappings,
            nbt_settings: settings.world_settings,
            pruning_list: settings.pruning_settings,
            copy_nbt: flags.copy_nbt,
            skip_maps: flags.skip_maps,
            skip_loot_tables: flags.skip_loot_tables,
            skip_item_conversion: flags.skip_item_conversion,
            custom_identifiers: flags.custom_identifiers,
            skip_block_connections: flags.skip_block_connections,
            enable_compact: flags.enable_compact,
            discard_empty_chunks: flags.discard_empty_chunks,
            prevent_y_biome_blending: flags.prevent_y_biome_blending,
        });

        let session = Arc::downgrade(self);
        let output_type = options.output_type;
        let mapper = ResponseMapper::new(move |reply: Reply| async move {
            match session.upgrade() {
                Some(session) => session.package_output(reply, &request_id, &output_type, output).await,
                None => reply,
            }
        });

        self.send_to_worker(request, Some(mapper)).await;
    }

    /// Package the converted world and point the response at the archive.
    async fn package_output(&self, mut reply: Reply, request_id: &str, output_type: &str, output: PathBuf) -> Reply {
        self.send_reply(Reply::progress_state(request_id, FINISHING_PROGRESS, Some(ZIPPING_STAGE)));

        let name = self.settings.lock().await.output_name.clone();
        let file_name = output_file_name(name.as_deref(), output_type);
        let archive = self.staging_dir.join(&file_name);

        let packaged = run_blocking(move || package_directory(&output, &archive)).await;
        if self.discard_if_closed().await {
            return reply;
        }
        match packaged {
            Ok(_) => {
                let download = Locator::format(&self.id, &file_name);
                info!(session_id = %self.id, request_id, download = %download, "conversion packaged");
                reply.edit_output(|output| {
                    output.insert("download".into(), Value::String(download));
                });
                reply
            }
            Err(err) => {
                error!(session_id = %self.id, request_id, %err, "failed to package converted world");
                Reply::error(request_id, MSG_PACKAGING_FAILED, Some(err.to_string()))
            }
        }
    }

    async fn save(self: &Arc<Self>, request_id: &str, url: &str, destination: PathBuf) {
        let source = match self.registry.resolve_locator(url, &self.id).await {
            Ok(source) => source,
            Err(err) => {
                warn!(session_id = %self.id, url, %err, "rejected save locator");
                self.send_reply(Reply::error(request_id, MSG_SAVE_FAILED, Some(err.to_string())));
                return;
            }
        };

        let progress = self.progress_sink(request_id);
        let dest = destination.clone();
        match run_blocking(move || copy_file_with_progress(&source, &dest, progress)).await {
            Ok(bytes) => {
                info!(session_id = %self.id, destination = %destination.display(), bytes, "artifact saved");
                self.send_reply(Reply::response(request_id));
            }
            Err(err) => {
                error!(session_id = %self.id, %err, "failed to save artifact");
                self.send_reply(Reply::error(request_id, MSG_SAVE_FAILED, Some(err.to_string())));
            }
        }
    }

    /// Recreate an engine output directory, replying with an error on
    /// failure. Returns whether the directory is ready.
    async fn prepare_output(&self, request_id: &str, dir: &Path) -> bool {
        match recreate_dir(dir).await {
            Ok(()) => true,
            Err(err) => {
                error!(session_id = %self.id, dir = %dir.display(), %err, "failed to prepare output directory");
                self.send_reply(Reply::error(request_id, MSG_STAGING_FAILED, Some(err.to_string())));
                false
            }
        }
    }

    /// Remove anything a handler staged after the session closed under it.
    async fn discard_if_closed(&self) -> bool {
        if self.is_connected() {
            return false;
        }
        debug!(session_id = %self.id, "session closed during staging, discarding artifacts");
        if let Err(err) = tokio::fs::remove_dir_all(&self.staging_dir).await {
            if err.kind() != io::ErrorKind::NotFound {
                warn!(session_id = %self.id, %err, "failed to discard staged artifacts");
            }
        }
        true
    }

    fn progress_sink(self: &Arc<Self>, request_id: &str) -> impl FnMut(f64) + Send + 'static {
        let session = Arc::clone(self);
        let request_id = request_id.to_owned();
        move |fraction| session.send_reply(Reply::progress(&request_id, fraction))
    }
}

/// Translate a staging failure into the reply the client shows.
fn staging_error(request_id: &str, kind: InputKind, err: &AppError) -> Reply {
    match (kind, err) {
        (_, AppError::ArchiveFormat(_)) => Reply::error(request_id, MSG_NO_WORLD, None),
        (_, AppError::ArchiveTooLarge(detail)) => {
            Reply::error(request_id, MSG_ARCHIVE_TOO_LARGE, Some(detail.clone()))
        }
        (InputKind::Archive, err) => {
            Reply::error(request_id, MSG_ARCHIVE_UNREADABLE, Some(err.to_string()))
        }
        (InputKind::Directory, err) => {
            Reply::error(request_id, MSG_FOLDER_UNREADABLE, Some(err.to_string()))
        }
    }
}

/// Fold the engine's settings document into the response output: keys are
/// merged, `maps` is ordered by numeric `id`, and `dimensions` is reduced to
/// its names.
fn merge_settings(output: &mut Map<String, Value>, data: Map<String, Value>) {
    output.extend(data);

    if let Some(Value::Array(maps)) = output.get_mut("maps") {
        maps.sort_by(|a, b| map_id(a).total_cmp(&map_id(b)));
    }

    if let Some(Value::Object(dimensions)) = output.get("dimensions") {
        let names = dimensions.keys().cloned().map(Value::String).collect();
        output.insert("dimensions".into(), Value::Array(names));
    }
}

fn map_id(map: &Value) -> f64 {
    map.get("id").and_then(Value::as_f64).unwrap_or(f64::MAX)
}

async fn read_json_object(path: &Path) -> Result<Map<String, Value>> {
    let raw = tokio::fs::read(path).await?;
    match serde_json::from_slice(&raw) {
        Ok(Value::Object(map)) => Ok(map),
        Ok(_) => Err(AppError::Protocol(format!("{} is not a json object", path.display()))),
        Err(err) => Err(AppError::Protocol(format!("malformed json in {}: {err}", path.display()))),
    }
}

/// Remove `dir` if present and create it empty. The parent must exist.
async fn recreate_dir(dir: &Path) -> io::Result<()> {
    match tokio::fs::remove_dir_all(dir).await {
        Ok(()) => {}
        Err(err) if err.kind() == io::ErrorKind::NotFound => {}
        Err(err) => return Err(err),
    }
    tokio::fs::create_dir(dir).await
}

/// Run stager work on the blocking pool.
async fn run_blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| AppError::Staging(format!("staging task failed: {err}")))?
}
