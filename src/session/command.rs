//! Commands a client sends to its session, decoded once at the boundary.

use std::path::PathBuf;

use serde::Deserialize;
use serde_json::Value;

/// A client command, grouped by category.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ClientCommand {
    /// Actions that drive the conversion flow.
    Flow(FlowCommand),
    /// Conversion settings.
    Settings(SettingsCommand),
    /// Block and dimension mappings.
    Mappings(MappingsCommand),
}

impl ClientCommand {
    /// Correlation id of the command.
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::Flow(flow) => flow.request_id(),
            Self::Settings(
                SettingsCommand::SetWorldSettings { request_id, .. }
                | SettingsCommand::SetPruningSettings { request_id, .. }
                | SettingsCommand::SetOutputName { request_id, .. },
            )
            | Self::Mappings(
                MappingsCommand::SetBlockMappings { request_id, .. }
                | MappingsCommand::SetDimensionMappings { request_id, .. },
            ) => request_id,
        }
    }
}

/// Flow actions.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum FlowCommand {
    /// Ask the engine to cancel an outstanding request.
    #[serde(rename_all = "camelCase")]
    Cancel { request_id: String },
    /// Copy a packaged artifact out of the session.
    #[serde(rename_all = "camelCase")]
    Save {
        request_id: String,
        /// `session://<id>/<file>` locator returned by `convert`.
        url: String,
        /// Destination file path.
        destination: PathBuf,
    },
    /// Stage a world archive or directory as the session input.
    #[serde(rename_all = "camelCase")]
    SelectWorld { request_id: String, path: PathBuf },
    /// Have the engine describe the staged world's settings.
    #[serde(rename_all = "camelCase")]
    GenerateSettings { request_id: String },
    /// Have the engine render a map preview.
    #[serde(rename_all = "camelCase")]
    GeneratePreview { request_id: String },
    /// Convert the staged world.
    Convert(ConvertOptions),
}

impl FlowCommand {
    /// Correlation id of the command.
    #[must_use]
    pub fn request_id(&self) -> &str {
        match self {
            Self::Cancel { request_id }
            | Self::Save { request_id, .. }
            | Self::SelectWorld { request_id, .. }
            | Self::GenerateSettings { request_id }
            | Self::GeneratePreview { request_id } => request_id,
            Self::Convert(options) => &options.request_id,
        }
    }
}

/// Options of a `convert` command. Flags are tri-state: absent means the
/// engine default.
#[derive(Debug, Clone, Default, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct ConvertOptions {
    pub request_id: String,
    /// Target format, e.g. `BEDROCK_R20` or `JAVA_1_20_5`.
    pub output_type: String,
    #[serde(default)]
    pub editing: Option<bool>,
    #[serde(default)]
    pub map_conversion: Option<bool>,
    #[serde(default)]
    pub loot_table_conversion: Option<bool>,
    #[serde(default)]
    pub item_conversion: Option<bool>,
    #[serde(default)]
    pub custom_identifiers: Option<bool>,
    #[serde(default)]
    pub block_connections: Option<bool>,
    #[serde(default)]
    pub enable_compact: Option<bool>,
    #[serde(default)]
    pub discard_empty_chunks: Option<bool>,
    #[serde(default)]
    pub prevent_y_biome_blending: Option<bool>,
}

/// Engine switches derived from [`ConvertOptions`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[allow(clippy::struct_excessive_bools)]
pub struct ConvertFlags {
    pub copy_nbt: bool,
    pub skip_maps: bool,
    pub skip_loot_tables: bool,
    pub skip_item_conversion: bool,
    pub custom_identifiers: bool,
    pub skip_block_connections: bool,
    pub enable_compact: bool,
    pub discard_empty_chunks: bool,
    pub prevent_y_biome_blending: bool,
}

impl ConvertOptions {
    /// Whether the converted world is written over a copy of the input.
    #[must_use]
    pub fn is_editing(&self) -> bool {
        self.editing == Some(true)
    }

    /// Translate the client's options into engine switches.
    ///
    /// Conversions the client explicitly disabled are skipped; custom
    /// identifiers and compaction stay on unless disabled; empty-chunk
    /// discarding and biome blending prevention must be enabled explicitly.
    #[must_use]
    pub fn flags(&self) -> ConvertFlags {
        let disabled = |flag: Option<bool>| flag == Some(false);
        let enabled = |flag: Option<bool>| flag == Some(true);

        ConvertFlags {
            copy_nbt: self.is_editing(),
            skip_maps: disabled(self.map_conversion),
            skip_loot_tables: disabled(self.loot_table_conversion),
            skip_item_conversion: disabled(self.item_conversion),
            custom_identifiers: !disabled(self.custom_identifiers),
            skip_block_connections: disabled(self.block_connections),
            enable_compact: !disabled(self.enable_compact),
            discard_empty_chunks: enabled(self.discard_empty_chunks),
            prevent_y_biome_blending: enabled(self.prevent_y_biome_blending),
        }
    }
}

/// Settings updates.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum SettingsCommand {
    /// Replace the world (NBT) settings.
    #[serde(rename_all = "camelCase")]
    SetWorldSettings {
        request_id: String,
        #[serde(default)]
        settings: Option<Value>,
    },
    /// Replace the dimension pruning settings.
    #[serde(rename_all = "camelCase")]
    SetPruningSettings {
        request_id: String,
        #[serde(default)]
        settings: Option<Value>,
    },
    /// Set the name of the packaged output.
    #[serde(rename_all = "camelCase")]
    SetOutputName {
        request_id: String,
        #[serde(default)]
        name: Option<String>,
    },
}

/// Mapping updates.
#[derive(Debug, Clone, Deserialize, PartialEq)]
#[serde(tag = "method", rename_all = "snake_case")]
pub enum MappingsCommand {
    /// Replace the block mappings.
    #[serde(rename_all = "camelCase")]
    SetBlockMappings {
        request_id: String,
        #[serde(default)]
        mappings: Option<Value>,
    },
    /// Replace the input-to-output dimension remap.
    #[serde(rename_all = "camelCase")]
    SetDimensionMappings {
        request_id: String,
        #[serde(default)]
        dimensions: Option<Value>,
    },
}
